//! RSA key loading.
//!
//! PEM input may be PKCS#8 (`BEGIN PRIVATE KEY` / `BEGIN PUBLIC KEY`) or
//! PKCS#1 (`BEGIN RSA ...`).

use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::{RsaPrivateKey, RsaPublicKey};
use std::path::{Path, PathBuf};

use crate::config::SigningConfig;
use crate::signing::SigningError;

/// Public key together with the PEM text served to clients.
#[derive(Debug, Clone)]
pub struct PublicKeyMaterial {
    pub key: RsaPublicKey,
    pub pem: String,
}

/// Source of the process signing keys.
pub trait KeyProvider: Send + Sync {
    fn load_private_key(&self) -> Result<RsaPrivateKey, SigningError>;
    fn load_public_key(&self) -> Result<PublicKeyMaterial, SigningError>;
}

pub fn parse_private_key_pem(pem: &str) -> Result<RsaPrivateKey, SigningError> {
    RsaPrivateKey::from_pkcs8_pem(pem)
        .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
        .map_err(|e| SigningError::InvalidKey(format!("private key: {e}")))
}

pub fn parse_public_key_pem(pem: &str) -> Result<RsaPublicKey, SigningError> {
    RsaPublicKey::from_public_key_pem(pem)
        .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
        .map_err(|e| SigningError::InvalidKey(format!("public key: {e}")))
}

/// Keys read from PEM files on disk.
#[derive(Debug, Clone)]
pub struct PemFileKeyProvider {
    private_key_path: PathBuf,
    public_key_path: PathBuf,
}

impl PemFileKeyProvider {
    pub fn new(private_key_path: impl Into<PathBuf>, public_key_path: impl Into<PathBuf>) -> Self {
        Self {
            private_key_path: private_key_path.into(),
            public_key_path: public_key_path.into(),
        }
    }

    pub fn from_config(config: &SigningConfig) -> Self {
        Self::new(&config.private_key_path, &config.public_key_path)
    }
}

fn read_pem(path: &Path) -> Result<String, SigningError> {
    std::fs::read_to_string(path).map_err(|source| SigningError::Io {
        path: path.to_path_buf(),
        source,
    })
}

impl KeyProvider for PemFileKeyProvider {
    fn load_private_key(&self) -> Result<RsaPrivateKey, SigningError> {
        parse_private_key_pem(&read_pem(&self.private_key_path)?)
    }

    fn load_public_key(&self) -> Result<PublicKeyMaterial, SigningError> {
        let pem = read_pem(&self.public_key_path)?;
        Ok(PublicKeyMaterial {
            key: parse_public_key_pem(&pem)?,
            pem,
        })
    }
}

/// Keys held in memory.
#[derive(Clone)]
pub struct PemKeyProvider {
    private_pem: String,
    public_pem: String,
}

impl PemKeyProvider {
    pub fn new(private_pem: impl Into<String>, public_pem: impl Into<String>) -> Self {
        Self {
            private_pem: private_pem.into(),
            public_pem: public_pem.into(),
        }
    }
}

impl KeyProvider for PemKeyProvider {
    fn load_private_key(&self) -> Result<RsaPrivateKey, SigningError> {
        parse_private_key_pem(&self.private_pem)
    }

    fn load_public_key(&self) -> Result<PublicKeyMaterial, SigningError> {
        Ok(PublicKeyMaterial {
            key: parse_public_key_pem(&self.public_pem)?,
            pem: self.public_pem.clone(),
        })
    }
}
