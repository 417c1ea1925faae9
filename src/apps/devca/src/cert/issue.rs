use chrono::{DateTime, SubsecRound, Utc};
use rcgen::{
    CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, IsCa, KeyUsagePurpose,
    SanType, SerialNumber,
};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::key;
use super::san::{SubjectAltNames, parse_service_ip};
use super::{CaError, CaResult, CertificateAuthority};

/// Lifetime of every leaf certificate, independent of the root's validity.
pub const LEAF_VALIDITY_DAYS: i64 = 365;

/// A request for one leaf certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueRequest {
    pub service_name: String,
    /// Legacy single service IP, prepended to the IP SANs.
    pub service_ip: Option<String>,
    pub sans: Vec<String>,
}

impl IssueRequest {
    pub fn new(service_name: impl Into<String>, sans: Vec<String>) -> Self {
        Self {
            service_name: service_name.into(),
            service_ip: None,
            sans,
        }
    }

    pub fn with_service_ip(mut self, service_ip: impl Into<String>) -> Self {
        self.service_ip = Some(service_ip.into());
        self
    }
}

/// An issued leaf certificate as recorded by the stores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedCertificate {
    pub service_name: String,
    pub domains: Vec<String>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub certificate: String,
    pub private_key: String,
    pub serial_number: String,
}

/// Draws a positive 126-bit serial number and its decimal rendering.
pub(crate) fn random_serial() -> CaResult<(SerialNumber, String)> {
    let mut bytes = [0u8; 16];
    SystemRandom::new()
        .fill(&mut bytes)
        .map_err(|_| CaError::Generation("serial number: system random source failed".to_string()))?;
    // top bit clear keeps the INTEGER positive, the next bit set keeps it minimal
    bytes[0] = (bytes[0] & 0x7f) | 0x40;

    let decimal = u128::from_be_bytes(bytes).to_string();
    Ok((SerialNumber::from(bytes.to_vec()), decimal))
}

fn to_offset_date_time(at: DateTime<Utc>) -> CaResult<time::OffsetDateTime> {
    time::OffsetDateTime::from_unix_timestamp(at.timestamp())
        .map_err(|e| CaError::generation("validity", e))
}

/// Builds and signs one leaf certificate for `request`.
///
/// Validation happens before any key is generated. The CA is only locked
/// while the final signature is computed.
pub async fn issue_certificate(
    ca: &CertificateAuthority,
    request: &IssueRequest,
) -> CaResult<IssuedCertificate> {
    if request.service_name.trim().is_empty() {
        return Err(CaError::Validation("service name must not be empty".to_string()));
    }
    let service_ip = parse_service_ip(request.service_ip.as_deref())?;
    let names = SubjectAltNames::classify(
        &request.service_name,
        service_ip,
        &request.sans,
        ca.cn_fallback(),
    )?;

    let mut subject_alt_names =
        Vec::with_capacity(names.hostnames.len() + names.ip_addresses.len());
    for hostname in &names.hostnames {
        let dns_name = rcgen::string::Ia5String::try_from(hostname.clone()).map_err(|_| {
            CaError::Validation(format!("{hostname:?} is not a valid DNS name"))
        })?;
        subject_alt_names.push(SanType::DnsName(dns_name));
    }
    subject_alt_names.extend(names.ip_addresses.iter().copied().map(SanType::IpAddress));

    let leaf_key = key::generate_rsa_key_blocking(ca.leaf_key_size()).await?;
    let (serial, serial_number) = random_serial()?;

    let issued_at = Utc::now().trunc_subsecs(0);
    let expires_at = issued_at + chrono::Duration::days(LEAF_VALIDITY_DAYS);

    let mut distinguished_name = DistinguishedName::new();
    distinguished_name.push(DnType::CommonName, names.common_name.as_str());

    let mut params = CertificateParams::default();
    params.distinguished_name = distinguished_name;
    params.subject_alt_names = subject_alt_names;
    params.serial_number = Some(serial);
    params.is_ca = IsCa::NoCa;
    params.key_usages = vec![
        KeyUsagePurpose::DigitalSignature,
        KeyUsagePurpose::KeyEncipherment,
    ];
    params.extended_key_usages = vec![
        ExtendedKeyUsagePurpose::ServerAuth,
        ExtendedKeyUsagePurpose::ClientAuth,
    ];
    params.use_authority_key_identifier_extension = true;
    params.not_before = to_offset_date_time(issued_at)?;
    params.not_after = to_offset_date_time(expires_at)?;

    let cert = ca.sign(&params, &leaf_key.key_pair).await?;
    debug!(
        "Issued certificate {} for {} (CN={})",
        serial_number, request.service_name, names.common_name
    );

    Ok(IssuedCertificate {
        service_name: request.service_name.clone(),
        domains: request.sans.clone(),
        issued_at,
        expires_at,
        certificate: cert.pem(),
        private_key: leaf_key.pem,
        serial_number,
    })
}
