use std::path::Path;

use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Permission bits for files anyone may read, such as the root certificate.
pub const PUBLIC_FILE_MODE: u32 = 0o644;
/// Permission bits for files holding private keys.
pub const PRIVATE_FILE_MODE: u32 = 0o600;

/// Writes `contents` to `path`, creating or truncating it, and enforces `mode` on unix.
pub async fn write_file(path: &Path, contents: &[u8], mode: u32) -> std::io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(mode);

    let mut file = options.open(path).await?;
    file.write_all(contents).await?;
    file.sync_all().await?;

    // mode only applies on creation, an existing file keeps its old bits
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await?;
    }
    #[cfg(not(unix))]
    let _ = mode;

    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    #[tokio::test]
    async fn test_write_file_enforces_mode_on_existing_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("secret.pem");
        std::fs::write(&path, "old").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o666)).unwrap();

        write_file(&path, b"new", PRIVATE_FILE_MODE).await.unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new");
    }
}
