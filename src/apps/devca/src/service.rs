use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::cert::{CertificateAuthority, IssueRequest, IssuedCertificate};
use crate::config::AppConfig;
use crate::error::{CaError, CaResult};
use crate::store::{CertificateStore, open_store};
use crate::trust;

/// What a caller receives for one issued certificate.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedBundle {
    pub serial_number: String,
    pub certificate_pem: String,
    pub private_key_pem: String,
    pub ca_certificate_pem: String,
}

/// The certificate authority together with the store recording what it issued.
#[derive(Clone)]
pub struct DevCa {
    ca: Arc<CertificateAuthority>,
    store: Arc<dyn CertificateStore>,
}

impl std::fmt::Debug for DevCa {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DevCa")
            .field("ca", &self.ca)
            .field("store", &"<CertificateStore>")
            .finish()
    }
}

impl DevCa {
    pub fn new(ca: Arc<CertificateAuthority>, store: Arc<dyn CertificateStore>) -> Self {
        Self { ca, store }
    }

    pub async fn from_config(config: &AppConfig) -> CaResult<Self> {
        let ca = CertificateAuthority::new(&config.ca).await?;
        info!("Certificate Authority initialized");
        let store = open_store(&config.store).await?;
        Ok(Self::new(Arc::new(ca), store))
    }

    pub async fn issue_certificate(&self, request: &IssueRequest) -> CaResult<IssuedBundle> {
        let record = self.store.generate_and_store(&self.ca, request).await?;
        info!(
            "Issued certificate {} for service {}",
            record.serial_number, record.service_name
        );
        Ok(IssuedBundle {
            serial_number: record.serial_number,
            certificate_pem: record.certificate,
            private_key_pem: record.private_key,
            ca_certificate_pem: self.ca.root_certificate_pem().await,
        })
    }

    pub async fn list_issued(&self) -> Vec<IssuedCertificate> {
        self.store.get_all().await
    }

    pub async fn get_by_serial(&self, serial: &str) -> Option<IssuedCertificate> {
        self.store.get_by_serial(serial).await
    }

    pub async fn count(&self) -> usize {
        self.store.count().await
    }

    pub async fn root_certificate_pem(&self) -> String {
        self.ca.root_certificate_pem().await
    }

    pub fn authority(&self) -> &CertificateAuthority {
        &self.ca
    }

    /// A client config trusting this CA, presenting the certificate `serial` when given.
    pub async fn client_config(&self, serial: Option<&str>) -> CaResult<rustls::ClientConfig> {
        let identity = match serial {
            Some(serial) => Some(self.require_record(serial).await?),
            None => None,
        };
        trust::client_config(&self.root_certificate_pem().await, identity.as_ref())
    }

    /// A server config presenting the certificate `serial`.
    pub async fn server_config(
        &self,
        serial: &str,
        require_client_auth: bool,
    ) -> CaResult<rustls::ServerConfig> {
        let record = self.require_record(serial).await?;
        trust::server_config(&self.root_certificate_pem().await, &record, require_client_auth)
    }

    async fn require_record(&self, serial: &str) -> CaResult<IssuedCertificate> {
        self.get_by_serial(serial).await.ok_or_else(|| {
            CaError::Configuration(format!("no certificate with serial {serial}"))
        })
    }
}
