//! Subject-Alternative-Name classification and Common-Name selection.

use std::net::IpAddr;

use super::{CaError, CaResult};

/// A single SAN entry, tagged once at parse time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SanEntry {
    Hostname(String),
    IpAddress(IpAddr),
}

impl SanEntry {
    pub fn parse(entry: &str) -> Self {
        match entry.parse::<IpAddr>() {
            Ok(ip) => SanEntry::IpAddress(ip),
            Err(_) => SanEntry::Hostname(entry.to_string()),
        }
    }

    pub fn is_ip(&self) -> bool {
        matches!(self, SanEntry::IpAddress(_))
    }
}

/// How the Common Name is chosen when every SAN is an IP literal.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CommonNameFallback {
    /// Use the first SAN entry verbatim.
    #[default]
    FirstEntry,
    /// Use the service name with the given suffix appended.
    ServiceSuffix(String),
}

/// The partitioned SAN list of one issuance request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectAltNames {
    pub common_name: String,
    pub hostnames: Vec<String>,
    pub ip_addresses: Vec<IpAddr>,
}

impl SubjectAltNames {
    /// Splits `sans` into hostnames and IP literals, preserving order.
    ///
    /// A legacy `service_ip` is prepended to the IP set unless the list
    /// already contains it. The Common Name is the first entry that is not
    /// an IP literal; when there is none, `fallback` decides.
    pub fn classify(
        service_name: &str,
        service_ip: Option<IpAddr>,
        sans: &[String],
        fallback: &CommonNameFallback,
    ) -> CaResult<Self> {
        if sans.is_empty() {
            return Err(CaError::Validation(
                "at least one subject alternative name is required".to_string(),
            ));
        }

        let entries: Vec<SanEntry> = sans.iter().map(|s| SanEntry::parse(s)).collect();

        let mut ip_addresses = Vec::new();
        let mut hostnames = Vec::new();
        for entry in &entries {
            match entry {
                SanEntry::IpAddress(ip) => ip_addresses.push(*ip),
                SanEntry::Hostname(name) => hostnames.push(name.clone()),
            }
        }

        if let Some(ip) = service_ip {
            if !ip_addresses.contains(&ip) {
                ip_addresses.insert(0, ip);
            }
        }

        let common_name = match hostnames.first() {
            Some(name) => name.clone(),
            None => match fallback {
                CommonNameFallback::FirstEntry => sans[0].clone(),
                CommonNameFallback::ServiceSuffix(suffix) => format!("{service_name}{suffix}"),
            },
        };

        Ok(Self {
            common_name,
            hostnames,
            ip_addresses,
        })
    }
}

/// Parses the legacy service IP; a blank value counts as absent.
pub fn parse_service_ip(service_ip: Option<&str>) -> CaResult<Option<IpAddr>> {
    match service_ip.map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => raw
            .parse::<IpAddr>()
            .map(Some)
            .map_err(|_| CaError::Validation(format!("service IP {raw:?} is not an IP address"))),
    }
}
