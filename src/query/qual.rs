use crate::utils::errors::{CrtshError, Result};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Declared type of a table column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    String,
    Int,
    Bool,
    Timestamp,
    Json,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::String => "STRING",
            ColumnType::Int => "INT",
            ColumnType::Bool => "BOOL",
            ColumnType::Timestamp => "TIMESTAMP",
            ColumnType::Json => "JSON",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub name: &'static str,
    pub column_type: ColumnType,
    pub description: &'static str,
}

impl ColumnDescriptor {
    pub const fn new(name: &'static str, column_type: ColumnType, description: &'static str) -> Self {
        Self {
            name,
            column_type,
            description,
        }
    }
}

/// Comparison operators accepted in a qualifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Operator {
    pub const ALL: &'static [Operator] = &[
        Operator::Gt,
        Operator::Ge,
        Operator::Eq,
        Operator::Lt,
        Operator::Le,
        Operator::Ne,
    ];

    pub const EQUALITY: &'static [Operator] = &[Operator::Eq, Operator::Ne];

    pub const EQ_ONLY: &'static [Operator] = &[Operator::Eq];

    pub fn as_sql(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "<>",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
        }
    }

    /// Whether `ordering` (row value compared to the qualifier value) satisfies the operator.
    pub fn accepts(&self, ordering: Ordering) -> bool {
        match self {
            Operator::Eq => ordering == Ordering::Equal,
            Operator::Ne => ordering != Ordering::Equal,
            Operator::Lt => ordering == Ordering::Less,
            Operator::Le => ordering != Ordering::Greater,
            Operator::Gt => ordering == Ordering::Greater,
            Operator::Ge => ordering != Ordering::Less,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

impl FromStr for Operator {
    type Err = CrtshError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "=" => Ok(Operator::Eq),
            "<>" | "!=" => Ok(Operator::Ne),
            "<" => Ok(Operator::Lt),
            "<=" => Ok(Operator::Le),
            ">" => Ok(Operator::Gt),
            ">=" => Ok(Operator::Ge),
            _ => Err(CrtshError::InvalidQualifier(format!(
                "unsupported operator '{s}'"
            ))),
        }
    }
}

/// Typed scalar carried by a qualifier.
#[derive(Debug, Clone, PartialEq)]
pub enum QualValue {
    String(String),
    Int(i64),
    Bool(bool),
    Timestamp(DateTime<Utc>),
}

impl QualValue {
    /// Parse user input according to the declared type of the target column.
    pub fn parse(column_type: ColumnType, raw: &str) -> Result<Self> {
        match column_type {
            ColumnType::String => Ok(QualValue::String(raw.to_string())),
            ColumnType::Int => raw
                .trim()
                .parse::<i64>()
                .map(QualValue::Int)
                .map_err(|e| CrtshError::InvalidQualifier(format!("'{raw}' is not an integer: {e}"))),
            ColumnType::Bool => match raw.trim().to_lowercase().as_str() {
                "true" | "t" | "yes" | "1" => Ok(QualValue::Bool(true)),
                "false" | "f" | "no" | "0" => Ok(QualValue::Bool(false)),
                _ => Err(CrtshError::InvalidQualifier(format!(
                    "'{raw}' is not a boolean"
                ))),
            },
            ColumnType::Timestamp => parse_timestamp(raw.trim()).map(QualValue::Timestamp),
            ColumnType::Json => Err(CrtshError::InvalidQualifier(
                "JSON columns cannot be filtered".to_string(),
            )),
        }
    }

    /// Compare a row value against this qualifier value. `None` when the two are not comparable.
    pub fn compare(&self, row_value: &Value) -> Option<Ordering> {
        match (self, row_value) {
            (QualValue::String(expected), Value::String(actual)) => Some(actual.as_str().cmp(expected)),
            (QualValue::Int(expected), Value::Number(actual)) => {
                actual.as_i64().map(|actual| actual.cmp(expected))
            }
            (QualValue::Bool(expected), Value::Bool(actual)) => Some(actual.cmp(expected)),
            (QualValue::Timestamp(expected), Value::String(actual)) => DateTime::parse_from_rfc3339(actual)
                .ok()
                .map(|actual| actual.with_timezone(&Utc).cmp(expected)),
            _ => None,
        }
    }
}

impl fmt::Display for QualValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QualValue::String(s) => write!(f, "'{s}'"),
            QualValue::Int(i) => write!(f, "{i}"),
            QualValue::Bool(b) => write!(f, "{b}"),
            QualValue::Timestamp(ts) => write!(f, "{}", ts.to_rfc3339_opts(SecondsFormat::Secs, true)),
        }
    }
}

/// Accepts RFC 3339 timestamps or a bare `YYYY-MM-DD` date (midnight UTC).
fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| CrtshError::InvalidQualifier(format!("'{raw}' is not an RFC 3339 timestamp")))
}

/// A single column filter.
#[derive(Debug, Clone, PartialEq)]
pub struct Qualifier {
    pub column: String,
    pub operator: Operator,
    pub value: QualValue,
}

impl Qualifier {
    pub fn new(column: impl Into<String>, operator: Operator, value: QualValue) -> Self {
        Self {
            column: column.into(),
            operator,
            value,
        }
    }

    /// Evaluate the qualifier against a row value. Null or incomparable values never match.
    pub fn matches(&self, row_value: &Value) -> bool {
        self.value
            .compare(row_value)
            .is_some_and(|ordering| self.operator.accepts(ordering))
    }
}

impl fmt::Display for Qualifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.column, self.operator, self.value)
    }
}

/// Untyped filter expression as typed by a user, e.g. `not_after>=2024-01-01`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterExpr {
    pub column: String,
    pub operator: Operator,
    pub value: String,
}

impl FromStr for FilterExpr {
    type Err = CrtshError;

    fn from_str(expr: &str) -> Result<Self> {
        let start = expr
            .find(['<', '>', '=', '!'])
            .ok_or_else(|| CrtshError::InvalidQualifier(format!("no operator in '{expr}'")))?;

        let rest = &expr[start..];
        let op_len = ["<>", "!=", "<=", ">=", "=", "<", ">"]
            .iter()
            .find(|op| rest.starts_with(*op))
            .map(|op| op.len())
            .ok_or_else(|| CrtshError::InvalidQualifier(format!("no operator in '{expr}'")))?;

        let column = expr[..start].trim();
        if column.is_empty() {
            return Err(CrtshError::InvalidQualifier(format!(
                "missing column name in '{expr}'"
            )));
        }

        Ok(Self {
            column: column.to_string(),
            operator: rest[..op_len].parse()?,
            value: rest[op_len..].trim().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_filter_expr_prefers_two_char_operators() {
        let expr: FilterExpr = "not_after>=2024-01-01".parse().unwrap();
        assert_eq!(expr.column, "not_after");
        assert_eq!(expr.operator, Operator::Ge);
        assert_eq!(expr.value, "2024-01-01");

        let expr: FilterExpr = "name <> Let's Encrypt".parse().unwrap();
        assert_eq!(expr.operator, Operator::Ne);
        assert_eq!(expr.value, "Let's Encrypt");

        let expr: FilterExpr = "id!=7".parse().unwrap();
        assert_eq!(expr.operator, Operator::Ne);
    }

    #[test]
    fn test_filter_expr_keeps_operators_inside_value() {
        let expr: FilterExpr = "query=a=b".parse().unwrap();
        assert_eq!(expr.column, "query");
        assert_eq!(expr.operator, Operator::Eq);
        assert_eq!(expr.value, "a=b");
    }

    #[test]
    fn test_filter_expr_rejects_malformed() {
        assert!("id".parse::<FilterExpr>().is_err());
        assert!("=5".parse::<FilterExpr>().is_err());
        assert!("id!5".parse::<FilterExpr>().is_err());
    }

    #[test]
    fn test_qual_value_parse() {
        assert_eq!(QualValue::parse(ColumnType::Int, " 42").unwrap(), QualValue::Int(42));
        assert_eq!(QualValue::parse(ColumnType::Bool, "T").unwrap(), QualValue::Bool(true));
        assert_eq!(
            QualValue::parse(ColumnType::Timestamp, "2022-06-02").unwrap(),
            QualValue::Timestamp(Utc.with_ymd_and_hms(2022, 6, 2, 0, 0, 0).unwrap())
        );
        assert_eq!(
            QualValue::parse(ColumnType::Timestamp, "2022-06-02T10:30:00+02:00").unwrap(),
            QualValue::Timestamp(Utc.with_ymd_and_hms(2022, 6, 2, 8, 30, 0).unwrap())
        );
        assert!(QualValue::parse(ColumnType::Int, "abc").is_err());
        assert!(QualValue::parse(ColumnType::Bool, "maybe").is_err());
        assert!(QualValue::parse(ColumnType::Json, "{}").is_err());
    }

    #[test]
    fn test_qualifier_matches_row_values() {
        let q = Qualifier::new("id", Operator::Ge, QualValue::Int(10));
        assert!(q.matches(&json!(10)));
        assert!(q.matches(&json!(11)));
        assert!(!q.matches(&json!(9)));
        assert!(!q.matches(&Value::Null));

        let q = Qualifier::new(
            "not_after",
            Operator::Lt,
            QualValue::Timestamp(Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap()),
        );
        assert!(q.matches(&json!("2029-12-31T23:59:59Z")));
        assert!(!q.matches(&json!("2030-01-01T00:00:00Z")));

        let q = Qualifier::new("is_active", Operator::Ne, QualValue::Bool(true));
        assert!(q.matches(&json!(false)));
        assert!(!q.matches(&json!("false")));
    }
}
