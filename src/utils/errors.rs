use thiserror::Error;

#[derive(Error, Debug)]
pub enum CrtshError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Invalid qualifier: {0}")]
    InvalidQualifier(String),

    #[error("Unknown table: {0}")]
    UnknownTable(String),

    #[error("Unknown column '{column}' in table {table}")]
    UnknownColumn { table: String, column: String },

    #[error("Table {table} requires a qualifier on one of: {columns}")]
    MissingRequiredQualifier { table: String, columns: String },

    #[error("Public key formatting error: {0}")]
    KeyFormat(String),

    #[error("Certificate input error: {0}")]
    CertInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, CrtshError>;
