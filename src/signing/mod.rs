//! Signed, compressed log responses.
//!
//! # Data Flow
//! ```text
//! payload (serde_json::Value)
//!     → envelope.rs (canonical JSON → RSA PKCS#1 v1.5 SHA-256 → base64)
//!     → SignedEnvelope { success, payload, signature } serialized
//!     → compression.rs (br > gzip > identity per Accept-Encoding)
//!     → SignedResponse { bytes, content_encoding, signature_type }
//! ```
//!
//! Keys are loaded once at startup through a [`KeyProvider`]; a gateway
//! that cannot load them does not start.

pub mod compression;
pub mod envelope;
pub mod keys;

use std::path::PathBuf;
use thiserror::Error;

pub use compression::ContentEncoding;
pub use envelope::{
    canonical_json, SignatureVerifier, SignedEnvelope, SignedResponse, Signer, SIGNATURE_TYPE,
};
pub use keys::{KeyProvider, PemFileKeyProvider, PemKeyProvider, PublicKeyMaterial};

#[derive(Debug, Error)]
pub enum SigningError {
    #[error("failed to read key {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid {0}")]
    InvalidKey(String),
    #[error("public key does not match private key")]
    KeyMismatch,
    #[error("signing failed: {0}")]
    Signature(String),
    #[error("failed to serialize envelope: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to compress response: {0}")]
    Compression(std::io::Error),
}
