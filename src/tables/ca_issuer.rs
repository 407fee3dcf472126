use crate::db::row::{get_bool, get_int, get_json, get_text, get_timestamp, require_int, require_text};
use crate::db::Database;
use crate::query::{compile, ColumnDescriptor, ColumnType, Operator, Qualifier};
use crate::tables::{opt_value, timestamp_value, KeyColumn, TableDef, TableRow};
use crate::utils::errors::Result;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::PgRow;
use std::ops::ControlFlow;

const BASE_QUERY: &str = "
    select
        ca_id,
        url,
        result,
        to_jsonb(ca_certificate_ids) as ca_certificate_ids,
        first_certificate_id,
        is_active,
        content_type,
        case when isfinite(next_check_due) then next_check_due end as next_check_due,
        case when isfinite(last_checked) then last_checked end as last_checked
    from ca_issuer
";

const COLUMNS: &[ColumnDescriptor] = &[
    ColumnDescriptor::new(
        "ca_id",
        ColumnType::Int,
        "Unique ID of the CA represented by this issuer record.",
    ),
    ColumnDescriptor::new("url", ColumnType::String, "CA Issuers URL checked by crt.sh."),
    ColumnDescriptor::new("result", ColumnType::String, "Outcome of the last check."),
    ColumnDescriptor::new(
        "ca_certificate_ids",
        ColumnType::Json,
        "IDs of the CA certificates found at the URL.",
    ),
    ColumnDescriptor::new(
        "first_certificate_id",
        ColumnType::Int,
        "ID of the first certificate that referenced the URL.",
    ),
    ColumnDescriptor::new("is_active", ColumnType::Bool, "True if the URL is still checked."),
    ColumnDescriptor::new(
        "content_type",
        ColumnType::String,
        "Content type returned by the URL.",
    ),
    ColumnDescriptor::new(
        "next_check_due",
        ColumnType::Timestamp,
        "Time the URL is next due to be checked.",
    ),
    ColumnDescriptor::new(
        "last_checked",
        ColumnType::Timestamp,
        "Time the URL was last checked.",
    ),
];

pub static TABLE: TableDef = TableDef {
    name: "crtsh_ca_issuer",
    description: "Certificate Authority Issuers known to crt.sh, including the status of their last check.",
    columns: COLUMNS,
    default_columns: &["ca_id", "url", "result", "is_active", "last_checked"],
    key_columns: &[
        KeyColumn::optional("ca_id", Operator::ALL),
        KeyColumn::optional("next_check_due", Operator::ALL),
        KeyColumn::optional("last_checked", Operator::ALL),
        KeyColumn::optional("url", Operator::ALL),
        KeyColumn::optional("result", Operator::ALL),
        KeyColumn::optional("first_certificate_id", Operator::ALL),
        KeyColumn::optional("is_active", Operator::EQUALITY),
        KeyColumn::optional("content_type", Operator::ALL),
    ],
};

#[derive(Debug, Clone, PartialEq)]
pub struct CaIssuerRow {
    pub ca_id: i64,
    pub url: String,
    pub result: Option<String>,
    pub ca_certificate_ids: Option<Value>,
    pub first_certificate_id: Option<i64>,
    pub is_active: Option<bool>,
    pub content_type: Option<String>,
    pub next_check_due: Option<DateTime<Utc>>,
    pub last_checked: Option<DateTime<Utc>>,
}

fn scan(row: &PgRow) -> std::result::Result<CaIssuerRow, sqlx::Error> {
    Ok(CaIssuerRow {
        ca_id: require_int(row, "ca_id")?,
        url: require_text(row, "url")?,
        result: get_text(row, "result")?,
        ca_certificate_ids: get_json(row, "ca_certificate_ids")?,
        first_certificate_id: get_int(row, "first_certificate_id")?,
        is_active: get_bool(row, "is_active")?,
        content_type: get_text(row, "content_type")?,
        next_check_due: get_timestamp(row, "next_check_due")?,
        last_checked: get_timestamp(row, "last_checked")?,
    })
}

impl TableRow for CaIssuerRow {
    fn column_value(&self, column: &str) -> Value {
        match column {
            "ca_id" => self.ca_id.into(),
            "url" => self.url.as_str().into(),
            "result" => opt_value(self.result.clone()),
            "ca_certificate_ids" => self.ca_certificate_ids.clone().unwrap_or(Value::Null),
            "first_certificate_id" => opt_value(self.first_certificate_id),
            "is_active" => opt_value(self.is_active),
            "content_type" => opt_value(self.content_type.clone()),
            "next_check_due" => timestamp_value(self.next_check_due),
            "last_checked" => timestamp_value(self.last_checked),
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
    E: FnMut(CaIssuerRow) -> ControlFlow<()>,
{
    let query = compile(BASE_QUERY, COLUMNS, qualifiers, limit);
    db.stream_rows(TABLE.name, &query, scan, emit).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{QualValue, SqlParam};
    use chrono::TimeZone;

    #[test]
    fn test_timestamp_qualifier_binds_datetime() {
        let since = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let quals = vec![
            Qualifier::new("last_checked", Operator::Ge, QualValue::Timestamp(since)),
            Qualifier::new("ca_id", Operator::Eq, QualValue::Int(183267)),
        ];
        let query = compile(BASE_QUERY, COLUMNS, &quals, None);

        assert!(query
            .collapsed_sql()
            .ends_with("from ca_issuer where ca_id = $1 and last_checked >= $2"));
        assert_eq!(
            query.params,
            vec![
                SqlParam::Int(183267),
                SqlParam::Timestamp(since)
            ]
        );
    }

    #[test]
    fn test_json_column_is_never_compiled() {
        let quals = vec![Qualifier::new(
            "ca_certificate_ids",
            Operator::Eq,
            QualValue::String("[1]".to_string()),
        )];
        let query = compile(BASE_QUERY, COLUMNS, &quals, None);
        assert_eq!(query.sql, BASE_QUERY);
        assert!(query.params.is_empty());
    }

    #[test]
    fn test_column_values() {
        let row = CaIssuerRow {
            ca_id: 1,
            url: "http://example.com/ca.crt".to_string(),
            result: None,
            ca_certificate_ids: Some(serde_json::json!([7, 8])),
            first_certificate_id: Some(99),
            is_active: Some(false),
            content_type: None,
            next_check_due: None,
            last_checked: Some(Utc.with_ymd_and_hms(2023, 5, 6, 7, 8, 9).unwrap()),
        };

        assert_eq!(row.column_value("ca_certificate_ids"), serde_json::json!([7, 8]));
        assert_eq!(row.column_value("result"), Value::Null);
        assert_eq!(row.column_value("last_checked"), Value::from("2023-05-06T07:08:09Z"));
        assert_eq!(row.column_value("next_check_due"), Value::Null);
    }
}
