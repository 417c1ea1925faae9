// Library interface for devca
// This exposes the internal modules for testing and external use

pub mod cert;
pub mod cli;
pub mod config;
pub mod error;
pub mod service;
pub mod store;
pub mod trust;
pub mod utils;

#[cfg(test)]
pub mod test_utils;

// Re-export commonly used types for convenience
pub use cert::{CertificateAuthority, IssueRequest, IssuedCertificate};
pub use config::AppConfig;
pub use error::{CaError, CaResult};
pub use service::{DevCa, IssuedBundle};
pub use store::{CertificateStore, DiskStore, MemoryStore};
