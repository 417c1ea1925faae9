//! Records of issued certificates, keyed by serial number.
//!
//! Both variants run the issuance algorithm without holding their own lock and
//! only take the write lock to commit the finished record, so key generation
//! from concurrent callers proceeds in parallel.

pub mod disk;
pub mod memory;

pub use disk::DiskStore;
pub use memory::MemoryStore;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::cert::{CertificateAuthority, IssueRequest, IssuedCertificate};
use crate::config::StoreConfig;
use crate::error::{CaError, CaResult};

#[async_trait]
pub trait CertificateStore: Send + Sync {
    /// Issues a certificate for `request` and commits it. On error nothing is stored.
    async fn generate_and_store(
        &self,
        ca: &CertificateAuthority,
        request: &IssueRequest,
    ) -> CaResult<IssuedCertificate>;

    /// An independent copy of every record, oldest first.
    async fn get_all(&self) -> Vec<IssuedCertificate>;

    async fn get_by_serial(&self, serial: &str) -> Option<IssuedCertificate>;

    async fn count(&self) -> usize;
}

/// Opens the store variant selected by `config`.
pub async fn open_store(config: &StoreConfig) -> CaResult<Arc<dyn CertificateStore>> {
    match &config.store_dir {
        Some(store_dir) => {
            let store = DiskStore::open(store_dir).await?;
            info!(
                "Opened certificate store at {:?} with {} records",
                store_dir,
                store.count().await
            );
            Ok(Arc::new(store))
        }
        None => {
            info!("Using in-memory certificate store");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

pub(crate) fn sorted_records(records: &HashMap<String, IssuedCertificate>) -> Vec<IssuedCertificate> {
    let mut all: Vec<IssuedCertificate> = records.values().cloned().collect();
    all.sort_by(|a, b| {
        a.issued_at
            .cmp(&b.issued_at)
            .then_with(|| a.serial_number.cmp(&b.serial_number))
    });
    all
}

pub(crate) fn ensure_unique_serial(
    records: &HashMap<String, IssuedCertificate>,
    record: &IssuedCertificate,
) -> CaResult<()> {
    if records.contains_key(&record.serial_number) {
        return Err(CaError::Generation(format!(
            "serial number collision: {}",
            record.serial_number
        )));
    }
    Ok(())
}
