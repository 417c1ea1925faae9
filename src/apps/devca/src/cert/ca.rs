use super::issue::random_serial;
use super::key;
use super::{CaError, CaResult, CommonNameFallback};
use crate::config::CaConfig;
use crate::utils::{PRIVATE_FILE_MODE, PUBLIC_FILE_MODE, write_file};
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, IsCa, Issuer, KeyPair,
    KeyUsagePurpose, PublicKeyData,
};
use rustls::pki_types::CertificateDer;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// How the root material of a [`CertificateAuthority`] came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaOrigin {
    Generated,
    Loaded,
}

struct RootMaterial {
    issuer: Issuer<'static, KeyPair>,
    cert_pem: String,
    cert_der: CertificateDer<'static>,
    origin: CaOrigin,
}

pub struct CertificateAuthority {
    root: RwLock<RootMaterial>,
    cert_dir: Option<PathBuf>,
    leaf_key_size: u32,
    cn_fallback: CommonNameFallback,
}

impl std::fmt::Debug for CertificateAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateAuthority")
            .field("cert_dir", &self.cert_dir)
            .field("leaf_key_size", &self.leaf_key_size)
            .field("cn_fallback", &self.cn_fallback)
            .field("root", &"<RootMaterial>")
            .finish()
    }
}

pub fn get_root_cert_path(cert_dir: &Path) -> PathBuf {
    cert_dir.join("ca.crt")
}

pub fn get_root_key_path(cert_dir: &Path) -> PathBuf {
    cert_dir.join("ca.key")
}

impl CertificateAuthority {
    /// Loads the root from `config.cert_dir` when both files are present and valid,
    /// otherwise generates a fresh root and writes it there.
    pub async fn new(config: &CaConfig) -> CaResult<Self> {
        key::check_key_size(config.key_size)?;
        key::check_key_size(config.leaf_key_size())?;

        let root = match &config.cert_dir {
            Some(cert_dir) => {
                fs::create_dir_all(cert_dir).await.map_err(|e| {
                    CaError::Configuration(format!(
                        "cannot create certificate directory {}: {e}",
                        cert_dir.display()
                    ))
                })?;

                match Self::load_root_certificate(cert_dir).await? {
                    Some(root) => {
                        info!("Loaded existing root certificate from {:?}", cert_dir);
                        root
                    }
                    None => {
                        info!("Generating new root certificate");
                        let (root, key_pem) = Self::generate_root_certificate(config).await?;
                        Self::save_root_certificate(&root.cert_pem, &key_pem, cert_dir).await?;
                        root
                    }
                }
            }
            None => {
                info!("Generating in-memory root certificate");
                Self::generate_root_certificate(config).await?.0
            }
        };

        Ok(Self {
            root: RwLock::new(root),
            cert_dir: config.cert_dir.clone(),
            leaf_key_size: config.leaf_key_size(),
            cn_fallback: config.cn_fallback(),
        })
    }

    async fn generate_root_certificate(config: &CaConfig) -> CaResult<(RootMaterial, String)> {
        let key = key::generate_rsa_key_blocking(config.key_size).await?;
        let (serial, serial_string) = random_serial()?;

        let mut distinguished_name = DistinguishedName::new();
        distinguished_name.push(DnType::CommonName, config.common_name.as_str());
        distinguished_name.push(DnType::OrganizationName, config.organization.as_str());
        if let Some(unit) = &config.organizational_unit {
            distinguished_name.push(DnType::OrganizationalUnitName, unit.as_str());
        }
        distinguished_name.push(DnType::CountryName, config.country.as_str());
        if let Some(province) = &config.province {
            distinguished_name.push(DnType::StateOrProvinceName, province.as_str());
        }
        if let Some(locality) = &config.locality {
            distinguished_name.push(DnType::LocalityName, locality.as_str());
        }

        let mut params = CertificateParams::default();
        params.distinguished_name = distinguished_name;
        params.serial_number = Some(serial);
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];

        let not_before = time::OffsetDateTime::now_utc();
        params.not_before = not_before;
        params.not_after = not_before + time::Duration::days(i64::from(config.validity_days));

        let cert = params.self_signed(&key.key_pair)?;
        debug!("Generated root certificate with serial {}", serial_string);

        let root = RootMaterial {
            cert_pem: cert.pem(),
            cert_der: cert.der().clone(),
            issuer: Issuer::new(params, key.key_pair),
            origin: CaOrigin::Generated,
        };
        Ok((root, key.pem))
    }

    /// Returns `None` when either file is missing or the pair does not form a usable CA.
    async fn load_root_certificate(cert_dir: &Path) -> CaResult<Option<RootMaterial>> {
        let cert_path = get_root_cert_path(cert_dir);
        let key_path = get_root_key_path(cert_dir);
        if !cert_path.exists() || !key_path.exists() {
            debug!("No root certificate found in {:?}", cert_dir);
            return Ok(None);
        }

        let cert_pem = fs::read_to_string(&cert_path)
            .await
            .map_err(|e| CaError::persistence(&cert_path, e))?;
        let key_pem = fs::read_to_string(&key_path)
            .await
            .map_err(|e| CaError::persistence(&key_path, e))?;

        match Self::parse_root_material(cert_pem, &key_pem) {
            Ok(root) => Ok(Some(root)),
            Err(reason) => {
                warn!("Ignoring root certificate in {:?}: {}", cert_dir, reason);
                Ok(None)
            }
        }
    }

    fn parse_root_material(cert_pem: String, key_pem: &str) -> Result<RootMaterial, String> {
        let (_, pem) = x509_parser::pem::parse_x509_pem(cert_pem.as_bytes())
            .map_err(|e| format!("invalid certificate PEM: {e}"))?;
        if pem.label != "CERTIFICATE" {
            return Err(format!("unexpected PEM block {:?}", pem.label));
        }
        let cert = pem
            .parse_x509()
            .map_err(|e| format!("invalid certificate: {e}"))?;
        if !cert.is_ca() {
            return Err("certificate is not a CA".to_string());
        }

        let key_pair = key::key_pair_from_pem(key_pem).map_err(|e| format!("invalid key: {e}"))?;
        if cert.public_key().subject_public_key.data.as_ref() != key_pair.der_bytes() {
            return Err("key does not match certificate".to_string());
        }

        let cert_der = CertificateDer::from(pem.contents.clone());
        let issuer = Issuer::from_ca_cert_der(&cert_der, key_pair)
            .map_err(|e| format!("unusable CA certificate: {e}"))?;

        Ok(RootMaterial {
            issuer,
            cert_pem,
            cert_der,
            origin: CaOrigin::Loaded,
        })
    }

    async fn save_root_certificate(cert_pem: &str, key_pem: &str, cert_dir: &Path) -> CaResult<()> {
        let cert_path = get_root_cert_path(cert_dir);
        let key_path = get_root_key_path(cert_dir);

        write_file(&cert_path, cert_pem.as_bytes(), PUBLIC_FILE_MODE)
            .await
            .map_err(|e| CaError::persistence(&cert_path, e))?;
        write_file(&key_path, key_pem.as_bytes(), PRIVATE_FILE_MODE)
            .await
            .map_err(|e| CaError::persistence(&key_path, e))?;

        info!("Root certificate saved to {:?}", cert_path);
        Ok(())
    }

    /// Re-reads the root material from the certificate directory.
    pub async fn reload(&self) -> CaResult<()> {
        let cert_dir = self.cert_dir.as_deref().ok_or_else(|| {
            CaError::Configuration("cannot reload an in-memory certificate authority".to_string())
        })?;
        let root = Self::load_root_certificate(cert_dir).await?.ok_or_else(|| {
            CaError::Configuration(format!("no usable root certificate in {}", cert_dir.display()))
        })?;

        *self.root.write().await = root;
        info!("Reloaded root certificate from {:?}", cert_dir);
        Ok(())
    }

    /// Signs `params` for `public_key`, holding the read lock only for the signature.
    pub(crate) async fn sign(
        &self,
        params: &CertificateParams,
        public_key: &KeyPair,
    ) -> CaResult<rcgen::Certificate> {
        let root = self.root.read().await;
        Ok(params.signed_by(public_key, &root.issuer)?)
    }

    pub async fn root_certificate_pem(&self) -> String {
        self.root.read().await.cert_pem.clone()
    }

    pub async fn root_certificate_der(&self) -> Vec<u8> {
        self.root.read().await.cert_der.to_vec()
    }

    pub async fn origin(&self) -> CaOrigin {
        self.root.read().await.origin
    }

    pub fn cert_dir(&self) -> Option<&Path> {
        self.cert_dir.as_deref()
    }

    pub fn leaf_key_size(&self) -> u32 {
        self.leaf_key_size
    }

    pub fn cn_fallback(&self) -> &CommonNameFallback {
        &self.cn_fallback
    }
}
