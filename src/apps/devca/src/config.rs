use anyhow::Result;
use clap::Args;
use confique::Config;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::cert::CommonNameFallback;

/// Leaf key size when none is configured, independent of the root key size.
pub const DEFAULT_LEAF_KEY_SIZE: u32 = 2048;

/// Utility function to expand $HOME in a PathBuf
pub fn expand_home_in_path(path: &PathBuf) -> Result<PathBuf> {
    let home_dir = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    let path_str = path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in path"))?;

    if path_str.contains("$HOME") {
        let expanded = path_str.replace("$HOME", home_dir.to_str().unwrap_or("."));
        Ok(PathBuf::from(expanded))
    } else {
        Ok(path.clone())
    }
}

#[derive(Config, Clone, Serialize, Deserialize)]
#[config(layer_attr(derive(Args, Serialize, Clone)))]
pub struct AppConfig {
    #[config(nested, layer_attr(command(flatten)))]
    pub ca: CaConfig,

    #[config(nested, layer_attr(command(flatten)))]
    pub store: StoreConfig,
}

#[derive(Clone, Config, Deserialize, Serialize)]
#[config(layer_attr(derive(Args, Clone, Serialize,)))]
pub struct CaConfig {
    /// Common name of the root certificate
    #[config(default = "Development Root CA", layer_attr(arg(long)))]
    pub common_name: String,

    /// Organization written into the root certificate subject
    #[config(default = "Development CA", layer_attr(arg(long)))]
    pub organization: String,

    /// Organizational unit written into the root certificate subject
    #[config(layer_attr(arg(long)))]
    pub organizational_unit: Option<String>,

    /// Country code written into the root certificate subject
    #[config(default = "US", layer_attr(arg(long)))]
    pub country: String,

    /// State or province written into the root certificate subject
    #[config(layer_attr(arg(long)))]
    pub province: Option<String>,

    /// Locality written into the root certificate subject
    #[config(layer_attr(arg(long)))]
    pub locality: Option<String>,

    /// The size of the generated root key, in bits
    #[config(default = 2048, layer_attr(arg(long)))]
    pub key_size: u32,

    /// The size of generated leaf keys (defaults to 2048 whatever the root key size)
    #[config(layer_attr(arg(long)))]
    pub leaf_key_size: Option<u32>,

    /// How long the root certificate stays valid, in days
    #[config(default = 3650, layer_attr(arg(long)))]
    pub validity_days: u32,

    /// The directory where the root certificate and key are stored.
    /// When unset the root is generated in memory on every start.
    #[config(env = "DEVCA_CERT_DIR", layer_attr(arg(long)))]
    pub cert_dir: Option<PathBuf>,

    /// Suffix appended to the service name to form the common name when every
    /// SAN is an IP literal. When unset the first SAN is used verbatim.
    #[config(layer_attr(arg(long)))]
    pub cn_fallback_suffix: Option<String>,
}

#[derive(Clone, Config, Deserialize, Serialize)]
#[config(layer_attr(derive(Args, Clone, Serialize,)))]
pub struct StoreConfig {
    /// The directory where issued certificates are recorded.
    /// When unset issued certificates are only kept in memory.
    #[config(env = "DEVCA_STORE_DIR", layer_attr(arg(long)))]
    pub store_dir: Option<PathBuf>,
}

impl CaConfig {
    pub fn leaf_key_size(&self) -> u32 {
        self.leaf_key_size.unwrap_or(DEFAULT_LEAF_KEY_SIZE)
    }

    pub fn cn_fallback(&self) -> CommonNameFallback {
        match &self.cn_fallback_suffix {
            Some(suffix) => CommonNameFallback::ServiceSuffix(suffix.clone()),
            None => CommonNameFallback::FirstEntry,
        }
    }
}

impl AppConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Configuration made only of the built-in defaults: RAM-only CA and store.
    pub fn defaults() -> Result<Self> {
        Ok(AppConfig::builder().load()?)
    }

    /// Resolve all potential $HOME placeholders in configuration paths
    pub fn with_resolved_paths(mut self) -> Result<Self> {
        if let Some(cert_dir) = &self.ca.cert_dir {
            self.ca.cert_dir = Some(expand_home_in_path(cert_dir)?);
        }
        if let Some(store_dir) = &self.store.store_dir {
            self.store.store_dir = Some(expand_home_in_path(store_dir)?);
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_home_in_path() {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        let expanded = expand_home_in_path(&PathBuf::from("$HOME/.devca/certs")).unwrap();
        assert_eq!(expanded, home.join(".devca/certs"));

        let untouched = expand_home_in_path(&PathBuf::from("/tmp/certs")).unwrap();
        assert_eq!(untouched, PathBuf::from("/tmp/certs"));
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("config.toml");

        let mut config = AppConfig::defaults().unwrap();
        config.ca.organization = "Acme Dev".to_string();
        config.ca.cn_fallback_suffix = Some(".svc.local".to_string());
        config.store.store_dir = Some(temp_dir.path().join("store"));
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded.ca.organization, "Acme Dev");
        assert_eq!(loaded.ca.key_size, 2048);
        assert_eq!(loaded.store.store_dir, Some(temp_dir.path().join("store")));
        assert_eq!(
            loaded.ca.cn_fallback(),
            CommonNameFallback::ServiceSuffix(".svc.local".to_string())
        );
    }

    #[test]
    fn test_leaf_key_size_is_independent_of_root_key_size() {
        let mut config = AppConfig::defaults().unwrap();
        config.ca.key_size = 3072;
        assert_eq!(config.ca.leaf_key_size(), 2048);

        config.ca.leaf_key_size = Some(4096);
        assert_eq!(config.ca.leaf_key_size(), 4096);
    }
}
