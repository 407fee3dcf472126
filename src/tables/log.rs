use crate::cert::serial::format_byte_string;
use crate::db::row::{get_bool, get_bytes, get_int, get_text, get_timestamp, require_int, require_text};
use crate::db::Database;
use crate::query::{compile, ColumnDescriptor, ColumnType, Qualifier};
use crate::tables::{opt_value, timestamp_value, TableDef, TableRow};
use crate::utils::errors::Result;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::PgRow;
use std::ops::ControlFlow;

const BASE_QUERY: &str = "
    select
        id,
        operator,
        url,
        name,
        public_key,
        is_active,
        case when isfinite(latest_update) then latest_update end as latest_update,
        case when isfinite(latest_sth_timestamp) then latest_sth_timestamp end as latest_sth_timestamp,
        mmd_in_seconds,
        tree_size,
        batch_size,
        chunk_size,
        google_uptime,
        chrome_version_added,
        chrome_inclusion_status,
        chrome_issue_number,
        chrome_final_tree_size,
        case when isfinite(chrome_disqualified_at) then chrome_disqualified_at end as chrome_disqualified_at,
        apple_inclusion_status,
        case when isfinite(apple_last_status_change) then apple_last_status_change end as apple_last_status_change
    from
        ct_log
";

const COLUMNS: &[ColumnDescriptor] = &[
    ColumnDescriptor::new("id", ColumnType::Int, "ID of the log."),
    ColumnDescriptor::new("operator", ColumnType::String, "Operator of the log."),
    ColumnDescriptor::new("name", ColumnType::String, "Name of the log."),
    ColumnDescriptor::new("url", ColumnType::String, "URL of the log."),
    ColumnDescriptor::new("is_active", ColumnType::Bool, "True if the log is active."),
    ColumnDescriptor::new(
        "apple_inclusion_status",
        ColumnType::String,
        "Status of this log with Apple.",
    ),
    ColumnDescriptor::new(
        "chrome_inclusion_status",
        ColumnType::String,
        "Status of this log in Google Chrome.",
    ),
    ColumnDescriptor::new(
        "apple_last_status_change",
        ColumnType::Timestamp,
        "Timestamp when the status of this log last changed with Apple.",
    ),
    ColumnDescriptor::new("batch_size", ColumnType::Int, "Batch size of the log."),
    ColumnDescriptor::new(
        "chrome_disqualified_at",
        ColumnType::Timestamp,
        "Timestamp when Google Chrome disqualified the log.",
    ),
    ColumnDescriptor::new(
        "chrome_final_tree_size",
        ColumnType::Int,
        "Final tree size of the log according to Google Chrome.",
    ),
    ColumnDescriptor::new(
        "chrome_issue_number",
        ColumnType::Int,
        "Issue number discussing inclusion of the log in Google Chrome.",
    ),
    ColumnDescriptor::new(
        "chrome_version_added",
        ColumnType::Int,
        "Version when the log was included in Google Chrome, if any.",
    ),
    ColumnDescriptor::new("chunk_size", ColumnType::Int, "Chunk size of the log."),
    ColumnDescriptor::new(
        "google_uptime",
        ColumnType::String,
        "Uptime percentage of the log according to Google.",
    ),
    ColumnDescriptor::new(
        "latest_update",
        ColumnType::Timestamp,
        "Latest time when the log was contacted by crt.sh.",
    ),
    ColumnDescriptor::new(
        "latest_sth_timestamp",
        ColumnType::Timestamp,
        "Latest Signed Tree Head (STH) timestamp of the log.",
    ),
    ColumnDescriptor::new("mmd_in_seconds", ColumnType::Int, "Maximum Merge Delay of the log."),
    ColumnDescriptor::new(
        "public_key",
        ColumnType::String,
        "Public key of the log as colon separated hex.",
    ),
    ColumnDescriptor::new(
        "tree_size",
        ColumnType::Int,
        "Total number of entries in the log's Merkle tree.",
    ),
];

pub static TABLE: TableDef = TableDef {
    name: "crtsh_log",
    description: "Certificate transparency logs monitored by crt.sh.",
    columns: COLUMNS,
    default_columns: &[
        "id",
        "operator",
        "name",
        "url",
        "is_active",
        "apple_inclusion_status",
        "chrome_inclusion_status",
    ],
    key_columns: &[],
};

#[derive(Debug, Clone, PartialEq)]
pub struct LogRow {
    pub id: i64,
    pub operator: String,
    pub url: String,
    pub name: String,
    pub public_key: Option<Vec<u8>>,
    pub is_active: Option<bool>,
    pub latest_update: Option<DateTime<Utc>>,
    pub latest_sth_timestamp: Option<DateTime<Utc>>,
    pub mmd_in_seconds: Option<i64>,
    pub tree_size: Option<i64>,
    pub batch_size: Option<i64>,
    pub chunk_size: Option<i64>,
    pub google_uptime: Option<String>,
    pub chrome_version_added: Option<i64>,
    pub chrome_inclusion_status: Option<String>,
    pub chrome_issue_number: Option<i64>,
    pub chrome_final_tree_size: Option<i64>,
    pub chrome_disqualified_at: Option<DateTime<Utc>>,
    pub apple_inclusion_status: Option<String>,
    pub apple_last_status_change: Option<DateTime<Utc>>,
}

fn scan(row: &PgRow) -> std::result::Result<LogRow, sqlx::Error> {
    Ok(LogRow {
        id: require_int(row, "id")?,
        operator: require_text(row, "operator")?,
        url: require_text(row, "url")?,
        name: require_text(row, "name")?,
        public_key: get_bytes(row, "public_key")?,
        is_active: get_bool(row, "is_active")?,
        latest_update: get_timestamp(row, "latest_update")?,
        latest_sth_timestamp: get_timestamp(row, "latest_sth_timestamp")?,
        mmd_in_seconds: get_int(row, "mmd_in_seconds")?,
        tree_size: get_int(row, "tree_size")?,
        batch_size: get_int(row, "batch_size")?,
        chunk_size: get_int(row, "chunk_size")?,
        google_uptime: get_text(row, "google_uptime")?,
        chrome_version_added: get_int(row, "chrome_version_added")?,
        chrome_inclusion_status: get_text(row, "chrome_inclusion_status")?,
        chrome_issue_number: get_int(row, "chrome_issue_number")?,
        chrome_final_tree_size: get_int(row, "chrome_final_tree_size")?,
        chrome_disqualified_at: get_timestamp(row, "chrome_disqualified_at")?,
        apple_inclusion_status: get_text(row, "apple_inclusion_status")?,
        apple_last_status_change: get_timestamp(row, "apple_last_status_change")?,
    })
}

impl TableRow for LogRow {
    fn column_value(&self, column: &str) -> Value {
        match column {
            "id" => self.id.into(),
            "operator" => self.operator.as_str().into(),
            "name" => self.name.as_str().into(),
            "url" => self.url.as_str().into(),
            "is_active" => opt_value(self.is_active),
            "apple_inclusion_status" => opt_value(self.apple_inclusion_status.clone()),
            "chrome_inclusion_status" => opt_value(self.chrome_inclusion_status.clone()),
            "apple_last_status_change" => timestamp_value(self.apple_last_status_change),
            "batch_size" => opt_value(self.batch_size),
            "chrome_disqualified_at" => timestamp_value(self.chrome_disqualified_at),
            "chrome_final_tree_size" => opt_value(self.chrome_final_tree_size),
            "chrome_issue_number" => opt_value(self.chrome_issue_number),
            "chrome_version_added" => opt_value(self.chrome_version_added),
            "chunk_size" => opt_value(self.chunk_size),
            "google_uptime" => opt_value(self.google_uptime.clone()),
            "latest_update" => timestamp_value(self.latest_update),
            "latest_sth_timestamp" => timestamp_value(self.latest_sth_timestamp),
            "mmd_in_seconds" => opt_value(self.mmd_in_seconds),
            "public_key" => opt_value(self.public_key.as_deref().map(format_byte_string)),
            "tree_size" => opt_value(self.tree_size),
            _ => Value::Null,
        }
    }
}

pub async fn list<E>(
    db: &Database,
    qualifiers: &[Qualifier],
    limit: Option<i64>,
    emit: E,
) -> Result<usize>
where
    E: FnMut(LogRow) -> ControlFlow<()>,
{
    let query = compile(BASE_QUERY, COLUMNS, qualifiers, limit);
    db.stream_rows(TABLE.name, &query, scan, emit).await
}
