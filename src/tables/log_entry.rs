use crate::db::row::{get_timestamp, require_int};
use crate::db::Database;
use crate::query::{compile, ColumnDescriptor, ColumnType, Operator, Qualifier};
use crate::tables::{timestamp_value, KeyColumn, TableDef, TableRow};
use crate::utils::errors::Result;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::PgRow;
use std::ops::ControlFlow;

const BASE_QUERY: &str = "
    select
        certificate_id,
        entry_id,
        case when isfinite(entry_timestamp) then entry_timestamp end as entry_timestamp,
        ct_log_id
    from
        ct_log_entry
";

const COLUMNS: &[ColumnDescriptor] = &[
    ColumnDescriptor::new("ct_log_id", ColumnType::Int, "The log this entry is defined in."),
    ColumnDescriptor::new("entry_id", ColumnType::Int, "Unique ID of the entry."),
    ColumnDescriptor::new("entry_timestamp", ColumnType::Timestamp, "Timestamp of the entry."),
    ColumnDescriptor::new(
        "certificate_id",
        ColumnType::Int,
        "Certificate the entry represents.",
    ),
];

pub static TABLE: TableDef = TableDef {
    name: "crtsh_log_entry",
    description: "Certificate transparency log entries recorded for each certificate.",
    columns: COLUMNS,
    default_columns: &["ct_log_id", "entry_id", "entry_timestamp", "certificate_id"],
    key_columns: &[
        KeyColumn::any_of("certificate_id", Operator::ALL),
        KeyColumn::any_of("entry_id", Operator::ALL),
        KeyColumn::optional("entry_timestamp", Operator::ALL),
        KeyColumn::optional("ct_log_id", Operator::ALL),
    ],
};

#[derive(Debug, Clone, PartialEq)]
pub struct LogEntryRow {
    pub certificate_id: i64,
    pub entry_id: i64,
    pub entry_timestamp: Option<DateTime<Utc>>,
    pub ct_log_id: i64,
}

fn scan(row: &PgRow) -> std::result::Result<LogEntryRow, sqlx::Error> {
    Ok(LogEntryRow {
        certificate_id: require_int(row, "certificate_id")?,
        entry_id: require_int(row, "entry_id")?,
        entry_timestamp: get_timestamp(row, "entry_timestamp")?,
        ct_log_id: require_int(row, "ct_log_id")?,
    })
}

impl TableRow for LogEntryRow {
    fn column_value(&self, column: &str) -> Value {
        match column {
            "ct_log_id" => self.ct_log_id.into(),
            "entry_id" => self.entry_id.into(),
            "entry_timestamp" => timestamp_value(self.entry_timestamp),
            "certificate_id" => self.certificate_id.into(),
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
    E: FnMut(LogEntryRow) -> ControlFlow<()>,
{
    let query = compile(BASE_QUERY, COLUMNS, qualifiers, limit);
    db.stream_rows(TABLE.name, &query, scan, emit).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{QualValue, SqlParam};

    #[test]
    fn test_clauses_follow_column_order() {
        // certificate_id is declared last, so its clause comes last
        let quals = vec![
            Qualifier::new("certificate_id", Operator::Eq, QualValue::Int(6_000_000_000)),
            Qualifier::new("ct_log_id", Operator::Ne, QualValue::Int(1)),
        ];
        let query = compile(BASE_QUERY, COLUMNS, &quals, Some(50));

        assert!(query
            .collapsed_sql()
            .ends_with("from ct_log_entry where ct_log_id <> $1 and certificate_id = $2 limit $3"));
        assert_eq!(
            query.params,
            vec![SqlParam::Int(1), SqlParam::Int(6_000_000_000), SqlParam::Int(50)]
        );
    }
}
