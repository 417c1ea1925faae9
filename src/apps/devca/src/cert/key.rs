use rcgen::KeyPair;
use rsa::RsaPrivateKey;
use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey};
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey, LineEnding};
use rustls::pki_types::PrivatePkcs8KeyDer;

use super::{CaError, CaResult};

pub const MIN_RSA_BITS: u32 = 2048;
pub const MAX_RSA_BITS: u32 = 4096;

/// An RSA key usable for signing, with its PKCS#1 PEM encoding.
pub struct RsaKey {
    pub key_pair: KeyPair,
    pub pem: String,
}

pub fn check_key_size(bits: u32) -> CaResult<()> {
    if !(MIN_RSA_BITS..=MAX_RSA_BITS).contains(&bits) {
        return Err(CaError::Configuration(format!(
            "RSA key size must be between {MIN_RSA_BITS} and {MAX_RSA_BITS} bits, got {bits}"
        )));
    }
    Ok(())
}

pub fn generate_rsa_key(bits: u32) -> CaResult<RsaKey> {
    let mut rng = rand::rngs::OsRng;
    let private_key = RsaPrivateKey::new(&mut rng, bits as usize)?;
    RsaKey::from_private_key(&private_key)
}

/// Generates a key on the blocking pool so concurrent callers do not stall the runtime.
pub async fn generate_rsa_key_blocking(bits: u32) -> CaResult<RsaKey> {
    tokio::task::spawn_blocking(move || generate_rsa_key(bits))
        .await
        .map_err(|e| CaError::generation("key generation", e))?
}

impl RsaKey {
    fn from_private_key(private_key: &RsaPrivateKey) -> CaResult<Self> {
        let pkcs8 = private_key.to_pkcs8_der()?;
        let key_pair = KeyPair::from_pkcs8_der_and_sign_algo(
            &PrivatePkcs8KeyDer::from(pkcs8.as_bytes()),
            &rcgen::PKCS_RSA_SHA256,
        )?;
        let pem = private_key.to_pkcs1_pem(LineEnding::LF)?.to_string();
        Ok(Self { key_pair, pem })
    }
}

/// Reads a PKCS#1 `RSA PRIVATE KEY` or a PKCS#8 `PRIVATE KEY` holding an RSA key.
pub fn key_pair_from_pem(pem: &str) -> CaResult<KeyPair> {
    let private_key = match RsaPrivateKey::from_pkcs1_pem(pem) {
        Ok(private_key) => private_key,
        Err(_) => RsaPrivateKey::from_pkcs8_pem(pem)?,
    };
    Ok(RsaKey::from_private_key(&private_key)?.key_pair)
}
