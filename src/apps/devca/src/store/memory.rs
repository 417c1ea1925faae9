use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::{CertificateStore, ensure_unique_serial, sorted_records};
use crate::cert::{CertificateAuthority, IssueRequest, IssuedCertificate, issue_certificate};
use crate::error::CaResult;

/// Keeps issued certificates in RAM for the life of the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, IssuedCertificate>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CertificateStore for MemoryStore {
    async fn generate_and_store(
        &self,
        ca: &CertificateAuthority,
        request: &IssueRequest,
    ) -> CaResult<IssuedCertificate> {
        let record = issue_certificate(ca, request).await?;

        let mut records = self.records.write().await;
        ensure_unique_serial(&records, &record)?;
        records.insert(record.serial_number.clone(), record.clone());
        debug!("Stored certificate {} in memory", record.serial_number);

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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{sans, test_ca};
    use std::collections::HashSet;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_generate_and_lookup() {
        let ca = test_ca().await;
        let store = MemoryStore::new();

        let record = store
            .generate_and_store(&ca, &IssueRequest::new("api", sans(&["api.local", "127.0.0.1"])))
            .await
            .unwrap();

        assert_eq!(store.count().await, 1);
        assert_eq!(store.get_by_serial(&record.serial_number).await, Some(record.clone()));
        assert_eq!(store.get_by_serial("12345").await, None);
        assert_eq!(store.get_all().await, vec![record]);
    }

    #[tokio::test]
    async fn test_get_all_returns_independent_copy() {
        let ca = test_ca().await;
        let store = MemoryStore::new();
        store
            .generate_and_store(&ca, &IssueRequest::new("api", sans(&["api.local"])))
            .await
            .unwrap();

        let mut copy = store.get_all().await;
        copy[0].service_name = "tampered".to_string();
        copy.clear();

        let all = store.get_all().await;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].service_name, "api");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_issuance_loses_nothing() {
        let ca = Arc::new(test_ca().await);
        let store = Arc::new(MemoryStore::new());

        let tasks = (0..8).map(|i| {
            let ca = ca.clone();
            let store = store.clone();
            tokio::spawn(async move {
                let request = IssueRequest::new(format!("svc-{i}"), sans(&["svc.local"]));
                store.generate_and_store(&ca, &request).await.unwrap()
            })
        });
        let records: Vec<IssuedCertificate> = futures::future::join_all(tasks)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        let serials: HashSet<_> = records.iter().map(|r| r.serial_number.clone()).collect();
        assert_eq!(serials.len(), 8);
        assert_eq!(store.count().await, 8);
        for serial in serials {
            assert!(store.get_by_serial(&serial).await.is_some());
        }
    }
}
