use crate::cert::decoder::PublicKey;
use crate::utils::errors::{CrtshError, Result};
use pem::{EncodeConfig, LineEnding, Pem};
use sha1::{Digest, Sha1};
use sha2::Sha256;
use std::fmt;
use x509_parser::prelude::{FromDer, SubjectPublicKeyInfo};

pub const RSA_PUBLIC_KEY_LABEL: &str = "RSA PUBLIC KEY";
pub const PUBLIC_KEY_LABEL: &str = "PUBLIC KEY";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAlgorithm {
    Sha1,
    Sha256,
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DigestAlgorithm::Sha1 => f.write_str("sha1"),
            DigestAlgorithm::Sha256 => f.write_str("sha256"),
        }
    }
}

/// Digest of the full certificate bytes as lowercase hex without separators
/// (e.g. abcd01...), the format used by crt.sh and SSL Labs.
pub fn fingerprint(raw: &[u8], algorithm: DigestAlgorithm) -> String {
    match algorithm {
        DigestAlgorithm::Sha1 => hex::encode(Sha1::digest(raw)),
        DigestAlgorithm::Sha256 => hex::encode(Sha256::digest(raw)),
    }
}

/// PEM-encode a public key as its SubjectPublicKeyInfo DER.
///
/// RSA keys are labelled "RSA PUBLIC KEY" and elliptic-curve keys "PUBLIC KEY".
/// Existing consumers depend on that labelling even though the payload is
/// SubjectPublicKeyInfo in both cases.
pub fn format_public_key(key: &PublicKey) -> Result<String> {
    let label = match key {
        PublicKey::Rsa { .. } => RSA_PUBLIC_KEY_LABEL,
        PublicKey::EllipticCurve { .. } => PUBLIC_KEY_LABEL,
        PublicKey::Other { algorithm, .. } => {
            return Err(CrtshError::KeyFormat(format!(
                "no PEM encoding for {algorithm} public keys"
            )))
        }
    };

    let der = canonical_spki_der(key.spki_der())?;
    let block = Pem::new(label, der);
    Ok(pem::encode_config(
        &block,
        EncodeConfig::new().set_line_ending(LineEnding::LF),
    ))
}

/// Re-read the stored SubjectPublicKeyInfo and return exactly its DER encoding.
fn canonical_spki_der(der: &[u8]) -> Result<Vec<u8>> {
    match SubjectPublicKeyInfo::from_der(der) {
        Ok((rem, spki)) if rem.is_empty() => Ok(spki.raw.to_vec()),
        Ok((rem, _)) => Err(CrtshError::KeyFormat(format!(
            "public key has {} bytes of trailing data",
            rem.len()
        ))),
        Err(e) => Err(CrtshError::KeyFormat(format!(
            "public key DER encoding error: {e}"
        ))),
    }
}
