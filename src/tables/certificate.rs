use crate::cert::decoder::{decode, Certificate};
use crate::cert::format::{fingerprint, format_public_key, DigestAlgorithm};
use crate::cert::serial::{format_byte_string, format_serial_number};
use crate::db::row::{get_int, get_text, get_timestamp, require_int};
use crate::db::Database;
use crate::query::{
    coerce, ColumnDescriptor, ColumnType, CompiledQuery, Operator, QualValue, QueryBuilder,
    Qualifier,
};
use crate::tables::{opt_value, timestamp_value, KeyColumn, TableDef, TableRow};
use crate::utils::errors::Result;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::PgRow;
use std::ops::ControlFlow;
use std::sync::OnceLock;

const BASE_QUERY: &str = "
    select distinct on (certificate_id)
        certificate_id,
        issuer_ca_id,
        name_type,
        name_value,
        certificate,
        case when isfinite(x509_notAfter(certificate)) then x509_notAfter(certificate) end as not_after
    from
        certificate_and_identities
";

const COLUMNS: &[ColumnDescriptor] = &[
    ColumnDescriptor::new("id", ColumnType::Int, "Unique ID of the certificate in crt.sh."),
    ColumnDescriptor::new(
        "dns_names",
        ColumnType::Json,
        "DNS names represented by the certificate, e.g. example.com.",
    ),
    ColumnDescriptor::new(
        "not_before",
        ColumnType::Timestamp,
        "The certificate is invalid before this time.",
    ),
    ColumnDescriptor::new(
        "not_after",
        ColumnType::Timestamp,
        "The certificate is invalid after this time.",
    ),
    ColumnDescriptor::new(
        "subject",
        ColumnType::Json,
        "Attributes of the certificate subject, e.g. CN, O, OU.",
    ),
    ColumnDescriptor::new(
        "email_addresses",
        ColumnType::Json,
        "Email addresses associated with the certificate.",
    ),
    ColumnDescriptor::new(
        "fingerprint_sha1",
        ColumnType::String,
        "SHA1 fingerprint of the certificate, e.g. abcd12...",
    ),
    ColumnDescriptor::new(
        "fingerprint_sha256",
        ColumnType::String,
        "SHA256 fingerprint of the certificate, e.g. abcd12...",
    ),
    ColumnDescriptor::new(
        "ip_addresses",
        ColumnType::Json,
        "IP addresses associated with the certificate.",
    ),
    ColumnDescriptor::new(
        "is_ca",
        ColumnType::Bool,
        "True if this certificate is a Certificate Authority.",
    ),
    ColumnDescriptor::new(
        "issuer",
        ColumnType::Json,
        "Attributes of the Certificate Authority who issued the certificate.",
    ),
    ColumnDescriptor::new(
        "issuer_ca_id",
        ColumnType::Int,
        "ID of the Certificate Authority who issued the certificate.",
    ),
    ColumnDescriptor::new(
        "public_key",
        ColumnType::String,
        "Public key of the certificate in PEM format.",
    ),
    ColumnDescriptor::new(
        "public_key_algorithm",
        ColumnType::String,
        "Algorithm used for the public key, e.g. RSA.",
    ),
    ColumnDescriptor::new(
        "query",
        ColumnType::String,
        "The query provided for the certificate search.",
    ),
    ColumnDescriptor::new(
        "serial_number",
        ColumnType::String,
        "Unique identifier assigned by the Certificate Authority who issued the certificate.",
    ),
    ColumnDescriptor::new(
        "signature_algorithm",
        ColumnType::String,
        "Algorithm used for the signature, e.g. SHA256-RSA.",
    ),
    ColumnDescriptor::new("uris", ColumnType::Json, "URIs associated with the certificate."),
    ColumnDescriptor::new("version", ColumnType::Int, "Version of the certificate, e.g. 3."),
    ColumnDescriptor::new(
        "certificate",
        ColumnType::String,
        "Full raw certificate as colon separated hex.",
    ),
];

/// Columns computed from the certificate bytes rather than read from the database.
pub const DERIVED_COLUMNS: &[&str] = &[
    "dns_names",
    "not_before",
    "subject",
    "email_addresses",
    "fingerprint_sha1",
    "fingerprint_sha256",
    "ip_addresses",
    "is_ca",
    "issuer",
    "public_key",
    "public_key_algorithm",
    "serial_number",
    "signature_algorithm",
    "uris",
    "version",
    "certificate",
];

pub static TABLE: TableDef = TableDef {
    name: "crtsh_certificate",
    description: "Certificates recorded in transparency logs.",
    columns: COLUMNS,
    default_columns: &["id", "dns_names", "not_before", "not_after", "subject"],
    key_columns: &[
        KeyColumn::any_of("id", Operator::EQ_ONLY),
        KeyColumn::any_of("query", Operator::EQ_ONLY),
        KeyColumn::optional("not_after", Operator::ALL),
    ],
};

/// A certificate row. The raw bytes are decoded on first access to a derived column.
#[derive(Debug)]
pub struct CertificateRow {
    pub id: i64,
    pub issuer_ca_id: Option<i64>,
    pub name_type: Option<String>,
    pub name_value: Option<String>,
    pub raw: Vec<u8>,
    pub not_after: Option<DateTime<Utc>>,
    /// The full-text search this row was found with, if any.
    pub query: Option<String>,
    decoded: OnceLock<Certificate>,
}

impl CertificateRow {
    pub fn new(id: i64, raw: Vec<u8>) -> Self {
        Self {
            id,
            issuer_ca_id: None,
            name_type: None,
            name_value: None,
            raw,
            not_after: None,
            query: None,
            decoded: OnceLock::new(),
        }
    }

    pub fn certificate(&self) -> &Certificate {
        self.decoded.get_or_init(|| decode(&self.raw))
    }

    pub fn is_decoded(&self) -> bool {
        self.decoded.get().is_some()
    }
}

impl TableRow for CertificateRow {
    fn column_value(&self, column: &str) -> Value {
        match column {
            "id" => self.id.into(),
            "issuer_ca_id" => opt_value(self.issuer_ca_id),
            "not_after" => timestamp_value(self.not_after),
            "query" => opt_value(self.query.clone()),
            "fingerprint_sha1" | "fingerprint_sha256" | "certificate" => {
                derived_column(&self.raw, &Certificate::default(), column).unwrap_or(Value::Null)
            }
            _ => derived_column(&self.raw, self.certificate(), column).unwrap_or(Value::Null),
        }
    }
}

/// Value of a column computed from raw certificate bytes and their decoded
/// form. `None` when `column` is not derived.
pub fn derived_column(raw: &[u8], cert: &Certificate, column: &str) -> Option<Value> {
    let value = match column {
        "dns_names" => string_list(&cert.dns_names),
        "not_before" => timestamp_value(cert.not_before),
        "subject" => serde_json::to_value(&cert.subject).unwrap_or_default(),
        "email_addresses" => string_list(&cert.email_addresses),
        "fingerprint_sha1" => fingerprint(raw, DigestAlgorithm::Sha1).into(),
        "fingerprint_sha256" => fingerprint(raw, DigestAlgorithm::Sha256).into(),
        "ip_addresses" => Value::Array(
            cert.ip_addresses
                .iter()
                .map(|ip| Value::String(ip.to_string()))
                .collect(),
        ),
        "is_ca" => cert.is_ca.into(),
        "issuer" => serde_json::to_value(&cert.issuer).unwrap_or_default(),
        "public_key" => match &cert.public_key {
            Some(key) => match format_public_key(key) {
                Ok(pem) => pem.into(),
                Err(e) => {
                    tracing::error!("public_key: {e}");
                    Value::Null
                }
            },
            None => Value::Null,
        },
        "public_key_algorithm" => cert.public_key_algorithm.as_str().into(),
        "serial_number" => opt_value(format_serial_number(cert.serial_number.as_ref())),
        "signature_algorithm" => cert.signature_algorithm.as_str().into(),
        "uris" => string_list(&cert.uris),
        "version" => cert.version.into(),
        "certificate" => format_byte_string(raw).into(),
        _ => return None,
    };
    Some(value)
}

fn string_list(values: &[String]) -> Value {
    Value::Array(values.iter().cloned().map(Value::String).collect())
}

fn scan(row: &PgRow) -> std::result::Result<CertificateRow, sqlx::Error> {
    let id = require_int(row, "certificate_id")?;
    let raw: Vec<u8> = sqlx::Row::try_get(row, "certificate")?;

    let mut cert_row = CertificateRow::new(id, raw);
    cert_row.issuer_ca_id = get_int(row, "issuer_ca_id")?;
    cert_row.name_type = get_text(row, "name_type")?;
    cert_row.name_value = get_text(row, "name_value")?;
    cert_row.not_after = get_timestamp(row, "not_after")?;
    Ok(cert_row)
}

/// Build the certificate search. `id` and `query` accept equality only;
/// `not_after` is compared against the notAfter of the stored certificate.
pub fn build_query(qualifiers: &[Qualifier], limit: Option<i64>) -> CompiledQuery {
    let mut builder = QueryBuilder::new(BASE_QUERY);

    for column in ["id", "query", "not_after"] {
        for qual in qualifiers.iter().filter(|q| q.column == column) {
            let Some(param) = TABLE
                .column(column)
                .and_then(|descriptor| coerce(descriptor.column_type, &qual.value))
            else {
                tracing::debug!("Skipping qualifier {}", qual);
                continue;
            };

            match column {
                "id" | "query" if qual.operator != Operator::Eq => {
                    tracing::debug!("Skipping qualifier {}, only = is supported", qual);
                }
                "id" => {
                    let n = builder.bind(param);
                    builder.clause(format!("certificate_id = ${n}"));
                }
                "query" => {
                    let n = builder.bind(param);
                    builder.clause(format!(
                        "plainto_tsquery('certwatch', ${n}) @@ identities(certificate)"
                    ));
                    builder.clause(format!("name_value ilike ('%' || ${n} || '%')"));
                }
                _ => {
                    let n = builder.bind(param);
                    builder.clause(format!("x509_notAfter(certificate) {} ${n}", qual.operator));
                }
            }
        }
    }

    let compiled = builder.build(limit);
    tracing::debug!("Compiled query: {}", compiled.collapsed_sql());
    tracing::debug!("Query parameters: {:?}", compiled.params);
    compiled
}

/// The search text of the first `query = ...` qualifier.
fn query_text(qualifiers: &[Qualifier]) -> Option<String> {
    qualifiers.iter().find_map(|q| match (&q.value, q.column.as_str()) {
        (QualValue::String(text), "query") if q.operator == Operator::Eq => Some(text.clone()),
        _ => None,
    })
}

pub async fn list<E>(
    db: &Database,
    qualifiers: &[Qualifier],
    limit: Option<i64>,
    mut emit: E,
) -> Result<usize>
where
    E: FnMut(CertificateRow) -> ControlFlow<()>,
{
    let query = build_query(qualifiers, limit);
    let text = query_text(qualifiers);
    db.stream_rows(TABLE.name, &query, scan, |mut row: CertificateRow| {
        row.query = text.clone();
        emit(row)
    })
    .await
}
