use crate::db::row::{get_bool, get_int, require_int, require_text};
use crate::db::Database;
use crate::query::{compile, ColumnDescriptor, ColumnType, Operator, Qualifier};
use crate::tables::{opt_value, KeyColumn, TableDef, TableRow};
use crate::utils::errors::Result;
use serde_json::Value;
use sqlx::postgres::PgRow;
use std::ops::ControlFlow;

// The num_issued/num_expired arrays hold [certificates, precertificates].
// last_not_after and next_not_after are bookkeeping for the expiry counters
// and are left out.
const BASE_QUERY: &str = "
    with ca_expanded as (
        select
            id,
            num_issued[1] as num_certs_issued,
            num_issued[2] as num_precerts_issued,
            num_expired[1] as num_certs_expired,
            num_expired[2] as num_precerts_expired,
            linting_applies,
            name
        from ca
    )
    select * from ca_expanded
";

const COLUMNS: &[ColumnDescriptor] = &[
    ColumnDescriptor::new("id", ColumnType::Int, "Unique identifier of the CA."),
    ColumnDescriptor::new("name", ColumnType::String, "Name of the CA."),
    ColumnDescriptor::new(
        "num_certs_issued",
        ColumnType::Int,
        "Number of certificates issued by the CA.",
    ),
    ColumnDescriptor::new(
        "num_precerts_issued",
        ColumnType::Int,
        "Number of pre-certificates issued by the CA.",
    ),
    ColumnDescriptor::new(
        "num_certs_expired",
        ColumnType::Int,
        "Number of certificates from the CA that have expired.",
    ),
    ColumnDescriptor::new(
        "num_precerts_expired",
        ColumnType::Int,
        "Number of pre-certificates from the CA that have expired.",
    ),
    ColumnDescriptor::new(
        "linting_applies",
        ColumnType::Bool,
        "True if crt.sh lints certificates issued by the CA.",
    ),
];

pub static TABLE: TableDef = TableDef {
    name: "crtsh_ca",
    description: "Certificate Authorities known to crt.sh, with issuance and expiry counts.",
    columns: COLUMNS,
    default_columns: &["id", "name", "num_certs_issued", "num_certs_expired"],
    key_columns: &[
        KeyColumn::optional("id", Operator::ALL),
        KeyColumn::optional("name", Operator::ALL),
        KeyColumn::optional("num_certs_issued", Operator::ALL),
        KeyColumn::optional("num_precerts_issued", Operator::ALL),
        KeyColumn::optional("num_certs_expired", Operator::ALL),
        KeyColumn::optional("num_precerts_expired", Operator::ALL),
        KeyColumn::optional("linting_applies", Operator::EQUALITY),
    ],
};

#[derive(Debug, Clone, PartialEq)]
pub struct CaRow {
    pub id: i64,
    pub name: String,
    pub num_certs_issued: Option<i64>,
    pub num_precerts_issued: Option<i64>,
    pub num_certs_expired: Option<i64>,
    pub num_precerts_expired: Option<i64>,
    pub linting_applies: Option<bool>,
}

fn scan(row: &PgRow) -> std::result::Result<CaRow, sqlx::Error> {
    Ok(CaRow {
        id: require_int(row, "id")?,
        name: require_text(row, "name")?,
        num_certs_issued: get_int(row, "num_certs_issued")?,
        num_precerts_issued: get_int(row, "num_precerts_issued")?,
        num_certs_expired: get_int(row, "num_certs_expired")?,
        num_precerts_expired: get_int(row, "num_precerts_expired")?,
        linting_applies: get_bool(row, "linting_applies")?,
    })
}

impl TableRow for CaRow {
    fn column_value(&self, column: &str) -> Value {
        match column {
            "id" => self.id.into(),
            "name" => self.name.as_str().into(),
            "num_certs_issued" => opt_value(self.num_certs_issued),
            "num_precerts_issued" => opt_value(self.num_precerts_issued),
            "num_certs_expired" => opt_value(self.num_certs_expired),
            "num_precerts_expired" => opt_value(self.num_precerts_expired),
            "linting_applies" => opt_value(self.linting_applies),
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
    E: FnMut(CaRow) -> ControlFlow<()>,
{
    let query = compile(BASE_QUERY, COLUMNS, qualifiers, limit);
    db.stream_rows(TABLE.name, &query, scan, emit).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QualValue;

    #[test]
    fn test_counter_columns_compile_against_cte() {
        let quals = vec![
            Qualifier::new("num_certs_issued", Operator::Gt, QualValue::Int(1_000_000)),
            Qualifier::new("name", Operator::Eq, QualValue::String("R3".to_string())),
        ];
        let query = compile(BASE_QUERY, COLUMNS, &quals, Some(5));

        assert!(query
            .collapsed_sql()
            .ends_with("select * from ca_expanded where name = $1 and num_certs_issued > $2 limit $3"));
        assert_eq!(query.params.len(), 3);
    }

    #[test]
    fn test_column_values() {
        let row = CaRow {
            id: 16418,
            name: "C=US, O=Let's Encrypt, CN=R3".to_string(),
            num_certs_issued: Some(10),
            num_precerts_issued: None,
            num_certs_expired: Some(2),
            num_precerts_expired: None,
            linting_applies: Some(true),
        };

        assert_eq!(row.column_value("id"), Value::from(16418));
        assert_eq!(row.column_value("num_precerts_issued"), Value::Null);
        assert_eq!(row.column_value("linting_applies"), Value::Bool(true));
        assert_eq!(row.column_value("no_such_column"), Value::Null);
    }
}
