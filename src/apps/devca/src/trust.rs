//! rustls configurations that trust the development CA.
//!
//! Every function returns a fresh, caller-owned config built on an explicit
//! ring provider; no process-wide default is installed or modified.

use std::sync::Arc;

use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{ClientConfig, RootCertStore, ServerConfig};

use crate::cert::IssuedCertificate;
use crate::error::{CaError, CaResult};

fn provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

fn invalid(what: &str, e: impl std::fmt::Display) -> CaError {
    CaError::Configuration(format!("{what}: {e}"))
}

pub fn read_certificates(pem: &str) -> CaResult<Vec<CertificateDer<'static>>> {
    let certs = rustls_pemfile::certs(&mut pem.as_bytes())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| invalid("invalid certificate PEM", e))?;
    if certs.is_empty() {
        return Err(CaError::Configuration("no certificate in PEM".to_string()));
    }
    Ok(certs)
}

pub fn read_private_key(pem: &str) -> CaResult<PrivateKeyDer<'static>> {
    rustls_pemfile::private_key(&mut pem.as_bytes())
        .map_err(|e| invalid("invalid private key PEM", e))?
        .ok_or_else(|| CaError::Configuration("no private key in PEM".to_string()))
}

pub fn root_store(ca_pem: &str) -> CaResult<RootCertStore> {
    let mut roots = RootCertStore::empty();
    for cert in read_certificates(ca_pem)? {
        roots
            .add(cert)
            .map_err(|e| invalid("unusable CA certificate", e))?;
    }
    Ok(roots)
}

/// The leaf followed by the CA certificate.
fn certificate_chain(
    ca_pem: &str,
    record: &IssuedCertificate,
) -> CaResult<Vec<CertificateDer<'static>>> {
    let mut chain = read_certificates(&record.certificate)?;
    chain.extend(read_certificates(ca_pem)?);
    Ok(chain)
}

/// A client config trusting only `ca_pem`, presenting `identity` when given.
pub fn client_config(ca_pem: &str, identity: Option<&IssuedCertificate>) -> CaResult<ClientConfig> {
    let builder = ClientConfig::builder_with_provider(provider())
        .with_safe_default_protocol_versions()
        .map_err(|e| invalid("TLS client", e))?
        .with_root_certificates(root_store(ca_pem)?);

    match identity {
        Some(record) => builder
            .with_client_auth_cert(
                certificate_chain(ca_pem, record)?,
                read_private_key(&record.private_key)?,
            )
            .map_err(|e| invalid("client certificate", e)),
        None => Ok(builder.with_no_client_auth()),
    }
}

/// A server config presenting `record`, optionally requiring clients signed by `ca_pem`.
pub fn server_config(
    ca_pem: &str,
    record: &IssuedCertificate,
    require_client_auth: bool,
) -> CaResult<ServerConfig> {
    let provider = provider();
    let builder = ServerConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(|e| invalid("TLS server", e))?;

    let builder = if require_client_auth {
        let verifier =
            WebPkiClientVerifier::builder_with_provider(Arc::new(root_store(ca_pem)?), provider)
                .build()
                .map_err(|e| invalid("client verifier", e))?;
        builder.with_client_cert_verifier(verifier)
    } else {
        builder.with_no_client_auth()
    };

    builder
        .with_single_cert(
            certificate_chain(ca_pem, record)?,
            read_private_key(&record.private_key)?,
        )
        .map_err(|e| invalid("server certificate", e))
}
