pub mod ca;
pub mod issue;
pub mod key;
pub mod san;

pub use ca::{CaOrigin, CertificateAuthority};
pub use issue::{IssueRequest, IssuedCertificate, LEAF_VALIDITY_DAYS, issue_certificate};
pub use san::{CommonNameFallback, SanEntry, SubjectAltNames};

pub(crate) use crate::error::{CaError, CaResult};
