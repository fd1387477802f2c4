//! Canonical JSON, RSA-SHA256 signatures and the signed envelope.
//!
//! The signature covers the canonical form of the payload only: object
//! keys sorted recursively, no insignificant whitespace. Verifiers must
//! recompute the same form, so key order on the wire never matters.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::signature::{SignatureEncoding, Signer as _, Verifier as _};
use rsa::RsaPublicKey;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha256;

use crate::signing::compression::{compress, negotiate, ContentEncoding};
use crate::signing::keys::{parse_public_key_pem, KeyProvider};
use crate::signing::SigningError;

/// Value of the `X-Signature-Type` header.
pub const SIGNATURE_TYPE: &str = "RSA-SHA256";

/// Serialize `value` with object keys sorted at every level.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));
            out.push('{');
            for (i, (key, value)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(value, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Wire form of a signed response body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedEnvelope {
    pub success: bool,
    pub payload: Value,
    /// Base64 RSA-SHA256 signature over `canonical_json(payload)`.
    pub signature: String,
}

/// Encoded response ready to send.
#[derive(Debug, Clone)]
pub struct SignedResponse {
    pub bytes: Vec<u8>,
    pub content_encoding: ContentEncoding,
    pub signature_type: &'static str,
}

/// Checks signatures against the public key.
#[derive(Debug, Clone)]
pub struct SignatureVerifier {
    key: VerifyingKey<Sha256>,
}

impl SignatureVerifier {
    pub fn new(public_key: RsaPublicKey) -> Self {
        Self {
            key: VerifyingKey::new(public_key),
        }
    }

    pub fn from_public_key_pem(pem: &str) -> Result<Self, SigningError> {
        Ok(Self::new(parse_public_key_pem(pem)?))
    }

    /// True only if `signature` is valid for the canonical form of `payload`.
    pub fn verify(&self, payload: &Value, signature: &str) -> bool {
        let Ok(raw) = STANDARD.decode(signature) else {
            return false;
        };
        let Ok(signature) = Signature::try_from(raw.as_slice()) else {
            return false;
        };
        self.key
            .verify(canonical_json(payload).as_bytes(), &signature)
            .is_ok()
    }

    pub fn verify_envelope(&self, envelope: &SignedEnvelope) -> bool {
        self.verify(&envelope.payload, &envelope.signature)
    }
}

/// Process-wide response signer.
pub struct Signer {
    key: SigningKey<Sha256>,
    verifier: SignatureVerifier,
    public_key_pem: String,
}

impl Signer {
    /// Load both keys. Fails when either is unreadable or they do not pair.
    pub fn from_provider(provider: &dyn KeyProvider) -> Result<Self, SigningError> {
        let private_key = provider.load_private_key()?;
        let public = provider.load_public_key()?;
        if RsaPublicKey::from(&private_key) != public.key {
            return Err(SigningError::KeyMismatch);
        }

        Ok(Self {
            key: SigningKey::new(private_key),
            verifier: SignatureVerifier::new(public.key),
            public_key_pem: public.pem,
        })
    }

    pub fn public_key_pem(&self) -> &str {
        &self.public_key_pem
    }

    pub fn verifier(&self) -> &SignatureVerifier {
        &self.verifier
    }

    /// Base64 signature over the canonical form of `payload`.
    pub fn sign(&self, payload: &Value) -> Result<String, SigningError> {
        let signature = self
            .key
            .try_sign(canonical_json(payload).as_bytes())
            .map_err(|e| SigningError::Signature(e.to_string()))?;
        Ok(STANDARD.encode(signature.to_bytes()))
    }

    pub fn envelope(&self, payload: Value) -> Result<SignedEnvelope, SigningError> {
        let signature = self.sign(&payload)?;
        Ok(SignedEnvelope {
            success: true,
            payload,
            signature,
        })
    }

    /// Sign `payload`, serialize the envelope and encode it for the client.
    pub fn build_signed_response(
        &self,
        payload: Value,
        accept_encoding: Option<&str>,
    ) -> Result<SignedResponse, SigningError> {
        let envelope = self.envelope(payload)?;
        let body = serde_json::to_vec(&envelope)?;
        let content_encoding = negotiate(accept_encoding);
        let bytes = compress(content_encoding, &body).map_err(SigningError::Compression)?;

        Ok(SignedResponse {
            bytes,
            content_encoding,
            signature_type: SIGNATURE_TYPE,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signing::compression::decompress;
    use crate::signing::keys::PemKeyProvider;
    use serde_json::json;

    const PRIVATE_PEM: &str = include_str!("../../tests/fixtures/private.pem");
    const PUBLIC_PEM: &str = include_str!("../../tests/fixtures/public.pem");

    fn signer() -> Signer {
        Signer::from_provider(&PemKeyProvider::new(PRIVATE_PEM, PUBLIC_PEM)).unwrap()
    }

    #[test]
    fn test_canonical_json_sorts_recursively() {
        let value = json!({ "b": 1, "a": { "z": [ { "y": true, "x": null } ], "c": "s" } });
        assert_eq!(
            canonical_json(&value),
            r#"{"a":{"c":"s","z":[{"x":null,"y":true}]},"b":1}"#
        );
    }

    #[test]
    fn test_signature_round_trip_and_key_order_independence() {
        let signer = signer();
        let payload = json!({ "content": "line", "lines": 100, "start": 0 });
        let signature = signer.sign(&payload).unwrap();

        let reordered: Value =
            serde_json::from_str(r#"{"start":0,"lines":100,"content":"line"}"#).unwrap();
        assert!(signer.verifier().verify(&reordered, &signature));
    }

    #[test]
    fn test_tampering_is_detected() {
        let signer = signer();
        let payload = json!({ "content": "line", "lines": 100 });
        let signature = signer.sign(&payload).unwrap();

        let tampered = json!({ "content": "line!", "lines": 100 });
        assert!(!signer.verifier().verify(&tampered, &signature));
        assert!(!signer.verifier().verify(&payload, "not base64!"));
        assert!(!signer.verifier().verify(&payload, &STANDARD.encode([0u8; 256])));
    }

    #[test]
    fn test_build_signed_response_negotiates_and_verifies() {
        let signer = signer();
        let payload = json!({ "content": "a\nb", "totalLines": 2 });

        for (accept, expected) in [
            (Some("gzip, br"), ContentEncoding::Brotli),
            (Some("gzip"), ContentEncoding::Gzip),
            (None, ContentEncoding::Identity),
        ] {
            let response = signer.build_signed_response(payload.clone(), accept).unwrap();
            assert_eq!(response.content_encoding, expected);
            assert_eq!(response.signature_type, "RSA-SHA256");

            let body = decompress(response.content_encoding, &response.bytes).unwrap();
            let envelope: SignedEnvelope = serde_json::from_slice(&body).unwrap();
            assert!(envelope.success);
            assert_eq!(envelope.payload, payload);
            assert!(signer.verifier().verify_envelope(&envelope));
        }
    }

    #[test]
    fn test_verifier_from_public_pem() {
        let signer = signer();
        let verifier = SignatureVerifier::from_public_key_pem(PUBLIC_PEM).unwrap();
        let payload = json!({ "k": "v" });
        assert!(verifier.verify(&payload, &signer.sign(&payload).unwrap()));
    }
}
