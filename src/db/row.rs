//! Column readers that tolerate the integer widths and timestamp flavours used
//! across the crt.sh schema.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::Row;

type ScanResult<T> = std::result::Result<T, sqlx::Error>;

/// Read an integer column of any width (int2, int4, int8).
pub fn get_int(row: &PgRow, column: &str) -> ScanResult<Option<i64>> {
    if let Ok(value) = row.try_get::<Option<i64>, _>(column) {
        return Ok(value);
    }
    if let Ok(value) = row.try_get::<Option<i32>, _>(column) {
        return Ok(value.map(i64::from));
    }
    row.try_get::<Option<i16>, _>(column)
        .map(|value| value.map(i64::from))
}

/// Read a non-null integer column.
pub fn require_int(row: &PgRow, column: &str) -> ScanResult<i64> {
    get_int(row, column)?.ok_or_else(|| unexpected_null(column))
}

pub fn get_text(row: &PgRow, column: &str) -> ScanResult<Option<String>> {
    row.try_get(column)
}

pub fn require_text(row: &PgRow, column: &str) -> ScanResult<String> {
    get_text(row, column)?.ok_or_else(|| unexpected_null(column))
}

pub fn get_bool(row: &PgRow, column: &str) -> ScanResult<Option<bool>> {
    row.try_get(column)
}

pub fn get_bytes(row: &PgRow, column: &str) -> ScanResult<Option<Vec<u8>>> {
    row.try_get(column)
}

pub fn get_json(row: &PgRow, column: &str) -> ScanResult<Option<Value>> {
    row.try_get(column)
}

/// Read a `timestamptz` or `timestamp` column; the latter is taken as UTC.
pub fn get_timestamp(row: &PgRow, column: &str) -> ScanResult<Option<DateTime<Utc>>> {
    if let Ok(value) = row.try_get::<Option<DateTime<Utc>>, _>(column) {
        return Ok(value);
    }
    row.try_get::<Option<NaiveDateTime>, _>(column)
        .map(|value| value.map(|naive| naive.and_utc()))
}

fn unexpected_null(column: &str) -> sqlx::Error {
    sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: format!("unexpected NULL in column {column}").into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unexpected_null_names_column() {
        let err = unexpected_null("ca_id");
        assert!(err.to_string().contains("ca_id"));
    }
}
