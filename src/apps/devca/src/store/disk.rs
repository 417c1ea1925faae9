use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::{CertificateStore, ensure_unique_serial, sorted_records};
use crate::cert::{CertificateAuthority, IssueRequest, IssuedCertificate, issue_certificate};
use crate::error::{CaError, CaResult};
use crate::utils::{PRIVATE_FILE_MODE, write_file};

/// Name of the JSON file holding every issued record.
pub const STORE_FILE_NAME: &str = "certificates.json";
const PROBE_FILE_NAME: &str = ".devca-write-probe";

/// Keeps issued certificates in memory and mirrors the whole index to a JSON file.
///
/// The file is rewritten on every commit through a temporary file and a rename,
/// and a failed write removes the record from memory again before the error is
/// returned, so memory and disk never disagree.
#[derive(Debug)]
pub struct DiskStore {
    records: RwLock<HashMap<String, IssuedCertificate>>,
    store_dir: PathBuf,
}

impl DiskStore {
    pub async fn open<P: AsRef<Path>>(store_dir: P) -> CaResult<Self> {
        let store_dir = store_dir.as_ref().to_path_buf();

        fs::create_dir_all(&store_dir).await.map_err(|e| {
            CaError::Configuration(format!(
                "cannot create store directory {}: {e}",
                store_dir.display()
            ))
        })?;
        Self::probe_writable(&store_dir).await?;

        let records = Self::load_records(&store_dir.join(STORE_FILE_NAME)).await?;
        debug!("Loaded {} certificate records from {:?}", records.len(), store_dir);

        Ok(Self {
            records: RwLock::new(records),
            store_dir,
        })
    }

    async fn probe_writable(store_dir: &Path) -> CaResult<()> {
        let probe = store_dir.join(PROBE_FILE_NAME);
        let unwritable = |e: std::io::Error| {
            CaError::Configuration(format!(
                "store directory {} is not writable: {e}",
                store_dir.display()
            ))
        };
        fs::write(&probe, b"").await.map_err(unwritable)?;
        fs::remove_file(&probe).await.map_err(unwritable)?;
        Ok(())
    }

    /// A missing or blank file means no records yet.
    async fn load_records(path: &Path) -> CaResult<HashMap<String, IssuedCertificate>> {
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => return Err(CaError::persistence(path, e)),
        };
        if content.trim().is_empty() {
            return Ok(HashMap::new());
        }
        serde_json::from_str(&content).map_err(|e| CaError::persistence(path, e))
    }

    async fn persist(&self, records: &HashMap<String, IssuedCertificate>) -> CaResult<()> {
        let path = self.store_path();
        let tmp_path = self.store_dir.join(format!("{STORE_FILE_NAME}.tmp"));

        let content = serde_json::to_vec_pretty(records).map_err(|e| CaError::persistence(&path, e))?;
        write_file(&tmp_path, &content, PRIVATE_FILE_MODE)
            .await
            .map_err(|e| CaError::persistence(&tmp_path, e))?;
        if let Err(e) = fs::rename(&tmp_path, &path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(CaError::persistence(&path, e));
        }
        Ok(())
    }

    pub fn store_dir(&self) -> &Path {
        &self.store_dir
    }

    pub fn store_path(&self) -> PathBuf {
        self.store_dir.join(STORE_FILE_NAME)
    }
}

#[async_trait]
impl CertificateStore for DiskStore {
    async fn generate_and_store(
        &self,
        ca: &CertificateAuthority,
        request: &IssueRequest,
    ) -> CaResult<IssuedCertificate> {
        let record = issue_certificate(ca, request).await?;

        let mut records = self.records.write().await;
        ensure_unique_serial(&records, &record)?;
        records.insert(record.serial_number.clone(), record.clone());

        if let Err(e) = self.persist(&records).await {
            records.remove(&record.serial_number);
            warn!("Rolled back certificate {}: {}", record.serial_number, e);
            return Err(e);
        }
        debug!("Stored certificate {} in {:?}", record.serial_number, self.store_dir);

        Ok(record)
    }

    async fn get_all(&self) -> Vec<IssuedCertificate> {
        sorted_records(&*self.records.read().await)
    }

    async fn get_by_serial(&self, serial: &str) -> Option<IssuedCertificate> {
        self.records.read().await.get(serial).cloned()
    }

    async fn count(&self) -> usize {
        self.records.read().await.len()
    }
}
