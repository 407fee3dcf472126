use crate::query::qual::{ColumnDescriptor, ColumnType, QualValue, Qualifier};
use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt;

/// A positional parameter bound to a compiled query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlParam {
    Text(String),
    Int(i64),
    Bool(bool),
    Timestamp(DateTime<Utc>),
}

impl fmt::Display for SqlParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlParam::Text(s) => write!(f, "{s:?}"),
            SqlParam::Timestamp(ts) => {
                write!(f, "\"{}\"", ts.to_rfc3339_opts(SecondsFormat::Secs, true))
            }
            SqlParam::Int(i) => write!(f, "{i}"),
            SqlParam::Bool(b) => write!(f, "{b}"),
        }
    }
}

/// SQL text plus its parameters; the Nth `$n` placeholder binds `params[n - 1]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledQuery {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

impl CompiledQuery {
    /// Single-line rendering of the SQL for log output.
    pub fn collapsed_sql(&self) -> String {
        self.sql.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

/// Accumulates `and`-joined where clauses and hands out placeholder numbers.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    base: String,
    clauses: Vec<String>,
    params: Vec<SqlParam>,
}

impl QueryBuilder {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            clauses: Vec::new(),
            params: Vec::new(),
        }
    }

    /// Push a parameter and return its 1-based placeholder index.
    pub fn bind(&mut self, param: SqlParam) -> usize {
        self.params.push(param);
        self.params.len()
    }

    pub fn clause(&mut self, clause: impl Into<String>) {
        self.clauses.push(clause.into());
    }

    pub fn build(mut self, limit: Option<i64>) -> CompiledQuery {
        if self.clauses.is_empty() && limit.is_none() {
            return CompiledQuery {
                sql: self.base,
                params: self.params,
            };
        }

        let mut sql = self.base.trim_end().to_string();
        if !self.clauses.is_empty() {
            sql.push_str(" where ");
            sql.push_str(&self.clauses.join(" and "));
        }

        if let Some(limit) = limit {
            let n = self.bind(SqlParam::Int(limit));
            sql.push_str(&format!(" limit ${n}"));
        }

        CompiledQuery {
            sql,
            params: self.params,
        }
    }
}

/// Coerce a qualifier value for a column of the given declared type.
///
/// Returns `None` when the declared type has no SQL parameter form (JSON) or
/// the value does not match the declared type; such qualifiers are skipped.
pub fn coerce(column_type: ColumnType, value: &QualValue) -> Option<SqlParam> {
    match (column_type, value) {
        (ColumnType::String, QualValue::String(s)) => Some(SqlParam::Text(s.clone())),
        (ColumnType::Timestamp, QualValue::Timestamp(ts)) => Some(SqlParam::Timestamp(*ts)),
        (ColumnType::Int, QualValue::Int(i)) => Some(SqlParam::Int(*i)),
        (ColumnType::Bool, QualValue::Bool(b)) => Some(SqlParam::Bool(*b)),
        _ => None,
    }
}

/// Compile qualifiers against `columns` into a where clause and limit appended to `base`.
///
/// Clauses follow column order, then qualifier order within a column.
/// Qualifiers naming a column outside `columns` are ignored.
pub fn compile(
    base: &str,
    columns: &[ColumnDescriptor],
    qualifiers: &[Qualifier],
    limit: Option<i64>,
) -> CompiledQuery {
    let mut builder = QueryBuilder::new(base);

    for column in columns {
        for qual in qualifiers.iter().filter(|q| q.column == column.name) {
            let Some(param) = coerce(column.column_type, &qual.value) else {
                tracing::debug!(
                    "Skipping qualifier {} on {} column {}",
                    qual,
                    column.column_type,
                    column.name
                );
                continue;
            };
            let n = builder.bind(param);
            builder.clause(format!("{} {} ${}", column.name, qual.operator, n));
        }
    }

    let compiled = builder.build(limit);
    tracing::debug!("Compiled query: {}", compiled.collapsed_sql());
    tracing::debug!("Query parameters: {:?}", compiled.params);
    compiled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::qual::Operator;
    use chrono::{TimeZone, Utc};

    const COLUMNS: &[ColumnDescriptor] = &[
        ColumnDescriptor::new("id", ColumnType::Int, ""),
        ColumnDescriptor::new("name", ColumnType::String, ""),
        ColumnDescriptor::new("is_active", ColumnType::Bool, ""),
        ColumnDescriptor::new("last_checked", ColumnType::Timestamp, ""),
        ColumnDescriptor::new("ids", ColumnType::Json, ""),
    ];

    #[test]
    fn test_single_qualifier_with_limit() {
        let quals = vec![Qualifier::new("id", Operator::Eq, QualValue::Int(5))];
        let compiled = compile("select * from t", COLUMNS, &quals, Some(10));

        assert_eq!(compiled.sql, "select * from t where id = $1 limit $2");
        assert_eq!(compiled.params, vec![SqlParam::Int(5), SqlParam::Int(10)]);
    }

    #[test]
    fn test_no_qualifiers_no_limit_returns_base_unchanged() {
        let base = "\n\t\tselect * from t\n\t";
        let compiled = compile(base, COLUMNS, &[], None);

        assert_eq!(compiled.sql, base);
        assert!(compiled.params.is_empty());
    }

    #[test]
    fn test_limit_only() {
        let compiled = compile("select * from t\n", COLUMNS, &[], Some(3));
        assert_eq!(compiled.sql, "select * from t limit $1");
        assert_eq!(compiled.params, vec![SqlParam::Int(3)]);
    }

    #[test]
    fn test_trailing_whitespace_gets_single_separator() {
        let quals = vec![Qualifier::new("name", Operator::Eq, QualValue::String("x".into()))];
        let compiled = compile("select * from t\n\t", COLUMNS, &quals, None);
        assert_eq!(compiled.sql, "select * from t where name = $1");
    }

    #[test]
    fn test_orders_by_column_then_qualifier() {
        let ts = Utc.with_ymd_and_hms(2022, 6, 2, 12, 0, 0).unwrap();
        let quals = vec![
            Qualifier::new("last_checked", Operator::Ge, QualValue::Timestamp(ts)),
            Qualifier::new("id", Operator::Gt, QualValue::Int(1)),
            Qualifier::new("is_active", Operator::Eq, QualValue::Bool(true)),
            Qualifier::new("id", Operator::Lt, QualValue::Int(100)),
        ];
        let compiled = compile("select * from t", COLUMNS, &quals, None);

        assert_eq!(
            compiled.sql,
            "select * from t where id > $1 and id < $2 and is_active = $3 and last_checked >= $4"
        );
        assert_eq!(
            compiled.params,
            vec![
                SqlParam::Int(1),
                SqlParam::Int(100),
                SqlParam::Bool(true),
                SqlParam::Timestamp(ts),
            ]
        );
    }

    #[test]
    fn test_unknown_columns_are_ignored() {
        let quals = vec![
            Qualifier::new("nope", Operator::Eq, QualValue::Int(1)),
            Qualifier::new("name", Operator::Ne, QualValue::String("a".into())),
        ];
        let with_unknown = compile("select * from t", COLUMNS, &quals, Some(5));
        let without = compile("select * from t", COLUMNS, &quals[1..], Some(5));
        assert_eq!(with_unknown, without);
    }

    #[test]
    fn test_uncoercible_qualifiers_are_skipped() {
        let quals = vec![
            Qualifier::new("ids", Operator::Eq, QualValue::String("[1]".into())),
            Qualifier::new("id", Operator::Eq, QualValue::String("5".into())),
            Qualifier::new("name", Operator::Eq, QualValue::String("ok".into())),
        ];
        let compiled = compile("select * from t", COLUMNS, &quals, Some(1));

        assert_eq!(compiled.sql, "select * from t where name = $1 limit $2");
        assert_eq!(compiled.params.len(), 2);
    }

    #[test]
    fn test_placeholders_line_up_with_params() {
        let quals: Vec<Qualifier> = (0..7)
            .map(|i| Qualifier::new("id", Operator::Ne, QualValue::Int(i)))
            .collect();
        let compiled = compile("select id from t", COLUMNS, &quals, Some(50));

        assert_eq!(compiled.params.len(), quals.len() + 1);
        for (i, param) in compiled.params.iter().enumerate() {
            let n = i + 1;
            assert!(compiled.sql.contains(&format!("${n}")));
            if n <= quals.len() {
                assert!(compiled.sql.contains(&format!("id <> ${n}")));
                assert_eq!(param, &SqlParam::Int(i as i64));
            }
        }
        assert!(compiled.sql.ends_with(" limit $8"));
        assert!(!compiled.sql.contains("$9"));
    }

    #[test]
    fn test_values_never_reach_sql_text() {
        let quals = vec![Qualifier::new(
            "name",
            Operator::Eq,
            QualValue::String("'; drop table ca; --".into()),
        )];
        let compiled = compile("select * from ca", COLUMNS, &quals, None);
        assert!(!compiled.sql.contains("drop table"));
        assert_eq!(
            compiled.params,
            vec![SqlParam::Text("'; drop table ca; --".to_string())]
        );
    }

    #[test]
    fn test_builder_reuses_placeholder() {
        let mut builder = QueryBuilder::new("select * from c");
        let n = builder.bind(SqlParam::Text("example.com".into()));
        builder.clause(format!("a @@ ${n}"));
        builder.clause(format!("b ilike ${n}"));
        let compiled = builder.build(Some(2));

        assert_eq!(compiled.sql, "select * from c where a @@ $1 and b ilike $1 limit $2");
        assert_eq!(compiled.params.len(), 2);
    }

    #[test]
    fn test_timestamp_param_keeps_datetime() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let quals = vec![Qualifier::new("last_checked", Operator::Lt, QualValue::Timestamp(ts))];
        let compiled = compile("select * from t", COLUMNS, &quals, None);

        assert_eq!(compiled.params, vec![SqlParam::Timestamp(ts)]);
        assert_eq!(compiled.params[0].to_string(), "\"2024-01-01T00:00:00Z\"");
    }
}
