//! Error types for devca.

use std::path::PathBuf;

use thiserror::Error;

/// Errors returned by the certificate authority and the certificate stores.
#[derive(Debug, Error)]
pub enum CaError {
    /// Bad or unwritable persistence directory, or unusable TLS material.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The issuance request was rejected before any key was generated.
    #[error("validation error: {0}")]
    Validation(String),

    /// Key, serial number or signature generation failed.
    #[error("certificate generation failed: {0}")]
    Generation(String),

    /// Reading, writing or parsing a persisted file failed.
    #[error("persistence error at {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type CaResult<T> = Result<T, CaError>;

impl CaError {
    pub(crate) fn persistence(path: impl Into<PathBuf>, source: impl Into<std::io::Error>) -> Self {
        CaError::Persistence {
            path: path.into(),
            source: source.into(),
        }
    }

    pub(crate) fn generation(stage: &str, err: impl std::fmt::Display) -> Self {
        CaError::Generation(format!("{stage}: {err}"))
    }
}

impl From<rcgen::Error> for CaError {
    fn from(e: rcgen::Error) -> Self {
        CaError::generation("signing", e)
    }
}

impl From<rsa::Error> for CaError {
    fn from(e: rsa::Error) -> Self {
        CaError::generation("key generation", e)
    }
}

impl From<rsa::pkcs8::Error> for CaError {
    fn from(e: rsa::pkcs8::Error) -> Self {
        CaError::generation("key encoding", e)
    }
}

impl From<rsa::pkcs1::Error> for CaError {
    fn from(e: rsa::pkcs1::Error) -> Self {
        CaError::generation("key encoding", e)
    }
}
