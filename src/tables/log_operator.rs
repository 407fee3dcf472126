use crate::db::row::require_text;
use crate::db::Database;
use crate::query::{compile, ColumnDescriptor, ColumnType, Qualifier};
use crate::tables::{TableDef, TableRow};
use crate::utils::errors::Result;
use serde_json::Value;
use sqlx::postgres::PgRow;
use std::ops::ControlFlow;

const BASE_QUERY: &str = "select operator from ct_log_operator";

const COLUMNS: &[ColumnDescriptor] = &[ColumnDescriptor::new(
    "operator",
    ColumnType::String,
    "Name of the operator.",
)];

pub static TABLE: TableDef = TableDef {
    name: "crtsh_log_operator",
    description: "Log operators used by crt.sh.",
    columns: COLUMNS,
    default_columns: &["operator"],
    key_columns: &[],
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogOperatorRow {
    pub operator: String,
}

fn scan(row: &PgRow) -> std::result::Result<LogOperatorRow, sqlx::Error> {
    Ok(LogOperatorRow {
        operator: require_text(row, "operator")?,
    })
}

impl TableRow for LogOperatorRow {
    fn column_value(&self, column: &str) -> Value {
        match column {
            "operator" => self.operator.as_str().into(),
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
    E: FnMut(LogOperatorRow) -> ControlFlow<()>,
{
    let query = compile(BASE_QUERY, COLUMNS, qualifiers, limit);
    db.stream_rows(TABLE.name, &query, scan, emit).await
}
