use chrono::{DateTime, Utc};
use serde::Serialize;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use x509_parser::der_parser::oid::Oid;
use x509_parser::num_bigint::BigUint;
use x509_parser::prelude::*;
use x509_parser::public_key::PublicKey as ParsedPublicKey;

// Public key algorithm OIDs
const OID_RSA_ENCRYPTION: &str = "1.2.840.113549.1.1.1";
const OID_EC_PUBLIC_KEY: &str = "1.2.840.10045.2.1";
const OID_DSA: &str = "1.2.840.10040.4.1";
const OID_ED25519: &str = "1.3.101.112";

// Named curves
const OID_CURVE_P256: &str = "1.2.840.10045.3.1.7";
const OID_CURVE_P384: &str = "1.3.132.0.34";
const OID_CURVE_P521: &str = "1.3.132.0.35";
const OID_CURVE_P224: &str = "1.3.132.0.33";

const SIGNATURE_ALGORITHMS: &[(&str, &str)] = &[
    ("1.2.840.113549.1.1.2", "MD2-RSA"),
    ("1.2.840.113549.1.1.4", "MD5-RSA"),
    ("1.2.840.113549.1.1.5", "SHA1-RSA"),
    ("1.2.840.113549.1.1.10", "RSASSA-PSS"),
    ("1.2.840.113549.1.1.11", "SHA256-RSA"),
    ("1.2.840.113549.1.1.12", "SHA384-RSA"),
    ("1.2.840.113549.1.1.13", "SHA512-RSA"),
    ("1.2.840.10040.4.3", "DSA-SHA1"),
    ("2.16.840.1.101.3.4.3.2", "DSA-SHA256"),
    ("1.2.840.10045.4.1", "ECDSA-SHA1"),
    ("1.2.840.10045.4.3.2", "ECDSA-SHA256"),
    ("1.2.840.10045.4.3.3", "ECDSA-SHA384"),
    ("1.2.840.10045.4.3.4", "ECDSA-SHA512"),
    ("1.3.101.112", "Ed25519"),
];

const NAME_ATTRIBUTES: &[(&str, &str)] = &[
    ("2.5.4.3", "CN"),
    ("2.5.4.5", "serialNumber"),
    ("2.5.4.6", "C"),
    ("2.5.4.7", "L"),
    ("2.5.4.8", "ST"),
    ("2.5.4.9", "street"),
    ("2.5.4.10", "O"),
    ("2.5.4.11", "OU"),
    ("2.5.4.17", "postalCode"),
    ("1.2.840.113549.1.9.1", "emailAddress"),
    ("0.9.2342.19200300.100.1.25", "DC"),
    ("1.3.6.1.4.1.311.60.2.1.3", "jurisdictionC"),
    ("2.5.4.15", "businessCategory"),
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NameAttribute {
    pub key: String,
    pub value: String,
}

/// Distinguished name as an ordered list of attributes, in certificate order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DistinguishedName {
    pub attributes: Vec<NameAttribute>,
}

impl DistinguishedName {
    pub fn values<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.attributes
            .iter()
            .filter(move |attr| attr.key == key)
            .map(|attr| attr.value.as_str())
    }

    pub fn common_name(&self) -> Option<&str> {
        self.values("CN").next()
    }
}

/// Subject public key, tagged by algorithm. Each variant keeps the
/// SubjectPublicKeyInfo DER it was decoded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicKey {
    Rsa {
        modulus: Vec<u8>,
        exponent: Vec<u8>,
        spki_der: Vec<u8>,
    },
    EllipticCurve {
        curve: Option<String>,
        point: Vec<u8>,
        spki_der: Vec<u8>,
    },
    Other {
        algorithm: String,
        spki_der: Vec<u8>,
    },
}

impl PublicKey {
    pub fn spki_der(&self) -> &[u8] {
        match self {
            PublicKey::Rsa { spki_der, .. }
            | PublicKey::EllipticCurve { spki_der, .. }
            | PublicKey::Other { spki_der, .. } => spki_der,
        }
    }
}

/// Decoded X.509 certificate. `Certificate::default()` is the zero value
/// handed out for undecodable input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Certificate {
    pub version: u32,
    pub serial_number: Option<BigUint>,
    pub subject: DistinguishedName,
    pub issuer: DistinguishedName,
    pub not_before: Option<DateTime<Utc>>,
    pub not_after: Option<DateTime<Utc>>,
    pub dns_names: Vec<String>,
    pub ip_addresses: Vec<IpAddr>,
    pub email_addresses: Vec<String>,
    pub uris: Vec<String>,
    pub public_key: Option<PublicKey>,
    pub public_key_algorithm: String,
    pub signature_algorithm: String,
    pub is_ca: bool,
}

impl Certificate {
    pub fn is_zero(&self) -> bool {
        self == &Certificate::default()
    }
}

/// Decode DER certificate bytes. Malformed input yields the zero certificate.
pub fn decode(raw: &[u8]) -> Certificate {
    match X509Certificate::from_der(raw) {
        Ok((rem, cert)) if rem.is_empty() => extract_certificate(&cert),
        Ok((rem, _)) => {
            tracing::debug!(
                "Certificate has {} bytes of trailing data, using zero value",
                rem.len()
            );
            Certificate::default()
        }
        Err(e) => {
            tracing::debug!("Certificate DER parsing error: {e}, using zero value");
            Certificate::default()
        }
    }
}

fn extract_certificate(cert: &X509Certificate) -> Certificate {
    let mut decoded = Certificate {
        version: cert.version().0 + 1,
        serial_number: Some(cert.serial.clone()),
        subject: extract_name(cert.subject()),
        issuer: extract_name(cert.issuer()),
        not_before: DateTime::from_timestamp(cert.validity().not_before.timestamp(), 0),
        not_after: DateTime::from_timestamp(cert.validity().not_after.timestamp(), 0),
        signature_algorithm: signature_algorithm_name(&cert.signature_algorithm.algorithm),
        ..Certificate::default()
    };

    let spki = cert.public_key();
    let (algorithm, key) = extract_public_key(spki);
    decoded.public_key_algorithm = algorithm;
    decoded.public_key = Some(key);

    for ext in cert.extensions() {
        match ext.parsed_extension() {
            ParsedExtension::SubjectAlternativeName(san) => {
                for name in &san.general_names {
                    match name {
                        GeneralName::DNSName(dns) => decoded.dns_names.push(dns.to_string()),
                        GeneralName::RFC822Name(email) => {
                            decoded.email_addresses.push(email.to_string())
                        }
                        GeneralName::URI(uri) => decoded.uris.push(uri.to_string()),
                        GeneralName::IPAddress(ip) => match ip_from_bytes(ip) {
                            Some(addr) => decoded.ip_addresses.push(addr),
                            None => tracing::trace!("Skipping IP SAN of length {}", ip.len()),
                        },
                        _ => {}
                    }
                }
            }
            ParsedExtension::BasicConstraints(bc) => decoded.is_ca = bc.ca,
            _ => {}
        }
    }

    decoded
}

fn extract_name(name: &X509Name) -> DistinguishedName {
    let attributes = name
        .iter_attributes()
        .filter_map(|attr| {
            let oid = attr.attr_type().to_id_string();
            match attr.as_str() {
                Ok(value) => Some(NameAttribute {
                    key: attribute_key(&oid),
                    value: value.to_string(),
                }),
                Err(e) => {
                    tracing::trace!("Skipping non-string name attribute {oid}: {e}");
                    None
                }
            }
        })
        .collect();

    DistinguishedName { attributes }
}

fn attribute_key(oid: &str) -> String {
    NAME_ATTRIBUTES
        .iter()
        .find(|(known, _)| *known == oid)
        .map(|(_, key)| key.to_string())
        .unwrap_or_else(|| oid.to_string())
}

fn signature_algorithm_name(oid: &Oid) -> String {
    let oid = oid.to_id_string();
    SIGNATURE_ALGORITHMS
        .iter()
        .find(|(known, _)| *known == oid)
        .map(|(_, name)| name.to_string())
        .unwrap_or(oid)
}

fn curve_name(oid: &str) -> String {
    match oid {
        OID_CURVE_P224 => "P-224".to_string(),
        OID_CURVE_P256 => "P-256".to_string(),
        OID_CURVE_P384 => "P-384".to_string(),
        OID_CURVE_P521 => "P-521".to_string(),
        other => other.to_string(),
    }
}

fn extract_public_key(spki: &SubjectPublicKeyInfo) -> (String, PublicKey) {
    let algorithm_oid = spki.algorithm.algorithm.to_id_string();
    let spki_der = spki.raw.to_vec();

    let algorithm = match algorithm_oid.as_str() {
        OID_RSA_ENCRYPTION => "RSA",
        OID_EC_PUBLIC_KEY => "ECDSA",
        OID_ED25519 => "Ed25519",
        OID_DSA => "DSA",
        _ => "Unknown",
    }
    .to_string();

    let key = match spki.parsed() {
        Ok(ParsedPublicKey::RSA(rsa)) => PublicKey::Rsa {
            modulus: rsa.modulus.to_vec(),
            exponent: rsa.exponent.to_vec(),
            spki_der,
        },
        Ok(ParsedPublicKey::EC(point)) => PublicKey::EllipticCurve {
            curve: spki
                .algorithm
                .parameters
                .as_ref()
                .and_then(|params| params.as_oid().ok())
                .map(|oid| curve_name(&oid.to_id_string())),
            point: point.data().to_vec(),
            spki_der,
        },
        Ok(_) => PublicKey::Other {
            algorithm: algorithm.clone(),
            spki_der,
        },
        Err(e) => {
            tracing::debug!("Unable to parse {algorithm_oid} public key: {e}");
            PublicKey::Other {
                algorithm: algorithm.clone(),
                spki_der,
            }
        }
    };

    (algorithm, key)
}

fn ip_from_bytes(bytes: &[u8]) -> Option<IpAddr> {
    if let Ok(octets) = <[u8; 4]>::try_from(bytes) {
        return Some(IpAddr::V4(Ipv4Addr::from(octets)));
    }
    <[u8; 16]>::try_from(bytes)
        .ok()
        .map(|octets| IpAddr::V6(Ipv6Addr::from(octets)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixture_der(pem_text: &str) -> Vec<u8> {
        ::pem::parse(pem_text).unwrap().contents().to_vec()
    }

    const RSA_PEM: &str = include_str!("../../testdata/rsa.pem");
    const EC_PEM: &str = include_str!("../../testdata/ec.pem");
    const ED25519_PEM: &str = include_str!("../../testdata/ed25519.pem");

    #[test]
    fn test_decode_rsa_certificate() {
        let cert = decode(&fixture_der(RSA_PEM));

        assert_eq!(cert.version, 3);
        assert_eq!(cert.serial_number, Some(BigUint::from(0x0123_4567_89ab_cdefu64)));
        assert_eq!(cert.subject.common_name(), Some("rsa.example.com"));
        assert_eq!(
            cert.subject.attributes,
            vec![
                NameAttribute { key: "C".into(), value: "US".into() },
                NameAttribute { key: "O".into(), value: "Example Org".into() },
                NameAttribute { key: "CN".into(), value: "rsa.example.com".into() },
            ]
        );
        assert_eq!(cert.issuer, cert.subject);
        assert_eq!(
            cert.not_before,
            Some(Utc.with_ymd_and_hms(2026, 10, 19, 1, 3, 57).unwrap())
        );
        assert_eq!(
            cert.not_after,
            Some(Utc.with_ymd_and_hms(2036, 10, 16, 1, 3, 57).unwrap())
        );
        assert_eq!(cert.dns_names, vec!["rsa.example.com", "www.rsa.example.com"]);
        assert_eq!(cert.ip_addresses, vec!["192.0.2.10".parse::<IpAddr>().unwrap()]);
        assert_eq!(cert.email_addresses, vec!["admin@example.com"]);
        assert_eq!(cert.uris, vec!["https://example.com/"]);
        assert_eq!(cert.signature_algorithm, "SHA256-RSA");
        assert_eq!(cert.public_key_algorithm, "RSA");
        assert!(!cert.is_ca);

        match cert.public_key {
            Some(PublicKey::Rsa { modulus, exponent, .. }) => {
                assert_eq!(exponent, vec![0x01, 0x00, 0x01]);
                assert!(modulus.len() >= 128);
            }
            other => panic!("expected RSA key, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_ec_certificate() {
        let cert = decode(&fixture_der(EC_PEM));

        assert_eq!(cert.serial_number, Some(BigUint::from(7u32)));
        assert_eq!(cert.subject.common_name(), Some("Example EC Root"));
        assert!(cert.is_ca);
        assert_eq!(cert.signature_algorithm, "ECDSA-SHA384");
        assert_eq!(cert.public_key_algorithm, "ECDSA");
        assert_eq!(cert.ip_addresses, vec!["2001:db8::1".parse::<IpAddr>().unwrap()]);
        assert!(cert.dns_names.is_empty());

        match cert.public_key {
            Some(PublicKey::EllipticCurve { curve, point, .. }) => {
                assert_eq!(curve.as_deref(), Some("P-256"));
                assert_eq!(point.len(), 65);
                assert_eq!(point[0], 0x04);
            }
            other => panic!("expected EC key, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_ed25519_is_other_key() {
        let cert = decode(&fixture_der(ED25519_PEM));

        assert_eq!(cert.public_key_algorithm, "Ed25519");
        assert_eq!(cert.signature_algorithm, "Ed25519");
        assert!(matches!(cert.public_key, Some(PublicKey::Other { .. })));
    }

    #[test]
    fn test_decode_truncated_yields_zero_value() {
        let der = fixture_der(RSA_PEM);
        let cert = decode(&der[..der.len() / 2]);
        assert!(cert.is_zero());
        assert_eq!(cert.serial_number, None);
        assert!(cert.public_key.is_none());
    }

    #[test]
    fn test_decode_garbage_and_empty() {
        assert!(decode(&[]).is_zero());
        assert!(decode(b"definitely not a certificate").is_zero());

        let mut der = fixture_der(EC_PEM);
        der.push(0x00);
        assert!(decode(&der).is_zero());
    }
}
