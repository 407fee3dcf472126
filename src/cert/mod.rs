pub mod decoder;
pub mod format;
pub mod serial;

pub use decoder::{decode, Certificate, DistinguishedName, NameAttribute, PublicKey};
pub use format::{fingerprint, format_public_key, DigestAlgorithm};
pub use serial::{format_byte_string, format_serial_number};
