use std::collections::HashSet;
use std::sync::Arc;

use devca::{
    AppConfig, CaError, CertificateAuthority, CertificateStore, DevCa, DiskStore, IssueRequest,
    MemoryStore,
};

fn sans(entries: &[&str]) -> Vec<String> {
    entries.iter().map(|s| s.to_string()).collect()
}

async fn in_memory_ca() -> CertificateAuthority {
    let config = AppConfig::defaults().unwrap();
    CertificateAuthority::new(&config.ca).await.unwrap()
}

fn common_name(pem: &str) -> String {
    let (_, pem) = x509_parser::pem::parse_x509_pem(pem.as_bytes()).unwrap();
    let cert = pem.parse_x509().unwrap();
    cert.subject()
        .iter_common_name()
        .next()
        .unwrap()
        .as_str()
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn test_common_name_selection_through_store() {
    let ca = in_memory_ca().await;
    let store = MemoryStore::new();

    let cases = [
        (vec!["api.example.com", "192.168.1.100", "127.0.0.1"], "api.example.com"),
        (vec!["10.0.0.1", "10.0.0.2"], "10.0.0.1"),
        (vec!["127.0.0.1", "local.test"], "local.test"),
    ];
    for (entries, expected) in cases {
        let record = store
            .generate_and_store(&ca, &IssueRequest::new("svc", sans(&entries)))
            .await
            .unwrap();
        assert_eq!(common_name(&record.certificate), expected);
    }
    assert_eq!(store.count().await, 3);
}

#[tokio::test]
async fn test_disk_store_round_trip() {
    let ca = in_memory_ca().await;
    let temp_dir = tempfile::tempdir().unwrap();

    let store = DiskStore::open(temp_dir.path()).await.unwrap();
    for i in 0..4 {
        let host = format!("svc-{i}.local");
        store
            .generate_and_store(&ca, &IssueRequest::new(format!("svc-{i}"), sans(&[host.as_str()])))
            .await
            .unwrap();
    }
    let before = store.get_all().await;
    drop(store);

    let reopened = DiskStore::open(temp_dir.path()).await.unwrap();
    assert_eq!(reopened.get_all().await, before);
}

#[tokio::test]
async fn test_empty_san_list_is_rejected_by_both_stores() {
    let ca = in_memory_ca().await;
    let temp_dir = tempfile::tempdir().unwrap();
    let stores: Vec<Box<dyn CertificateStore>> = vec![
        Box::new(MemoryStore::new()),
        Box::new(DiskStore::open(temp_dir.path()).await.unwrap()),
    ];

    for store in &stores {
        let err = store
            .generate_and_store(&ca, &IssueRequest::new("svc", vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, CaError::Validation(_)));
        assert_eq!(store.count().await, 0);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_issuance_through_facade() {
    let temp_dir = tempfile::tempdir().unwrap();
    let mut config = AppConfig::defaults().unwrap();
    config.ca.cert_dir = Some(temp_dir.path().join("certs"));
    config.store.store_dir = Some(temp_dir.path().join("store"));
    let devca = Arc::new(DevCa::from_config(&config).await.unwrap());

    let tasks = (0..8).map(|i| {
        let devca = devca.clone();
        tokio::spawn(async move {
            devca
                .issue_certificate(&IssueRequest::new(format!("svc-{i}"), sans(&["svc.local"])))
                .await
                .unwrap()
        })
    });
    let bundles: Vec<_> = futures::future::join_all(tasks)
        .await
        .into_iter()
        .map(|task| task.unwrap())
        .collect();

    let serials: HashSet<_> = bundles.iter().map(|b| b.serial_number.clone()).collect();
    assert_eq!(serials.len(), 8);
    assert_eq!(devca.count().await, 8);

    let restarted = DevCa::from_config(&config).await.unwrap();
    assert_eq!(restarted.count().await, 8);
    for serial in &serials {
        assert!(restarted.get_by_serial(serial).await.is_some());
    }
}
