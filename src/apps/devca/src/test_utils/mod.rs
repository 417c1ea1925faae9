use std::path::Path;

use x509_parser::pem::Pem;

use crate::cert::CertificateAuthority;
use crate::config::{AppConfig, CaConfig};

/// Default CA configuration, persisted to `cert_dir` when given.
pub fn ca_config(cert_dir: Option<&Path>) -> CaConfig {
    let mut config = AppConfig::defaults().unwrap().ca;
    config.cert_dir = cert_dir.map(Path::to_path_buf);
    config
}

/// An in-memory CA with the default configuration.
pub async fn test_ca() -> CertificateAuthority {
    CertificateAuthority::new(&ca_config(None)).await.unwrap()
}

pub fn sans(entries: &[&str]) -> Vec<String> {
    entries.iter().map(|s| s.to_string()).collect()
}

pub fn parse_pem_certificate(pem: &str) -> Pem {
    let (_, pem) = x509_parser::pem::parse_x509_pem(pem.as_bytes()).unwrap();
    assert_eq!(pem.label, "CERTIFICATE");
    pem
}
