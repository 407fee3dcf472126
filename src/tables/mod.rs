pub mod ca;
pub mod ca_issuer;
pub mod certificate;
pub mod log;
pub mod log_entry;
pub mod log_operator;

use crate::db::Database;
use crate::query::{ColumnDescriptor, FilterExpr, Operator, QualValue, Qualifier};
use crate::utils::errors::{CrtshError, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use std::fmt;
use std::ops::ControlFlow;
use std::str::FromStr;

/// Whether a key column must carry a qualifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Require {
    Optional,
    /// At least one of the table's `AnyOf` key columns needs a qualifier.
    AnyOf,
}

/// A column whose qualifiers are pushed down into SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyColumn {
    pub name: &'static str,
    pub operators: &'static [Operator],
    pub require: Require,
}

impl KeyColumn {
    pub const fn optional(name: &'static str, operators: &'static [Operator]) -> Self {
        Self {
            name,
            operators,
            require: Require::Optional,
        }
    }

    pub const fn any_of(name: &'static str, operators: &'static [Operator]) -> Self {
        Self {
            name,
            operators,
            require: Require::AnyOf,
        }
    }
}

#[derive(Debug)]
pub struct TableDef {
    pub name: &'static str,
    pub description: &'static str,
    pub columns: &'static [ColumnDescriptor],
    /// Columns shown when the caller does not choose any.
    pub default_columns: &'static [&'static str],
    pub key_columns: &'static [KeyColumn],
}

impl TableDef {
    pub fn column(&self, name: &str) -> Option<&'static ColumnDescriptor> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn key_column(&self, name: &str) -> Option<&'static KeyColumn> {
        self.key_columns.iter().find(|k| k.name == name)
    }
}

/// A fetched row that can render any of its table's columns.
pub trait TableRow {
    /// JSON value of `column`; `Null` for absent values and unknown columns.
    fn column_value(&self, column: &str) -> Value;
}

/// Qualifiers split into those sent to the database and those the caller
/// has to apply to returned rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryPlan {
    pub pushed: Vec<Qualifier>,
    pub residual: Vec<Qualifier>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Ca,
    CaIssuer,
    Certificate,
    Log,
    LogEntry,
    LogOperator,
}

impl Table {
    pub const ALL: [Table; 6] = [
        Table::Ca,
        Table::CaIssuer,
        Table::Certificate,
        Table::Log,
        Table::LogEntry,
        Table::LogOperator,
    ];

    pub fn definition(&self) -> &'static TableDef {
        match self {
            Table::Ca => &ca::TABLE,
            Table::CaIssuer => &ca_issuer::TABLE,
            Table::Certificate => &certificate::TABLE,
            Table::Log => &log::TABLE,
            Table::LogEntry => &log_entry::TABLE,
            Table::LogOperator => &log_operator::TABLE,
        }
    }

    pub fn name(&self) -> &'static str {
        self.definition().name
    }

    /// Build a typed qualifier from a filter expression such as `id>=5`.
    pub fn parse_qualifier(&self, expr: &str) -> Result<Qualifier> {
        let filter: FilterExpr = expr.parse()?;
        let def = self.definition();
        let column = def.column(&filter.column).ok_or_else(|| CrtshError::UnknownColumn {
            table: def.name.to_string(),
            column: filter.column.clone(),
        })?;

        let value = QualValue::parse(column.column_type, &filter.value)?;
        Ok(Qualifier::new(column.name, filter.operator, value))
    }

    /// Decide which qualifiers are pushed down and check required key columns.
    pub fn plan(&self, qualifiers: Vec<Qualifier>) -> Result<QueryPlan> {
        let def = self.definition();
        let mut plan = QueryPlan::default();

        for qual in qualifiers {
            let pushable = def
                .key_column(&qual.column)
                .is_some_and(|key| key.operators.contains(&qual.operator));
            if pushable {
                plan.pushed.push(qual);
            } else {
                plan.residual.push(qual);
            }
        }

        let any_of: Vec<&str> = def
            .key_columns
            .iter()
            .filter(|k| k.require == Require::AnyOf)
            .map(|k| k.name)
            .collect();

        if !any_of.is_empty() && !plan.pushed.iter().any(|q| any_of.contains(&q.column.as_str())) {
            return Err(CrtshError::MissingRequiredQualifier {
                table: def.name.to_string(),
                columns: any_of.join(", "),
            });
        }

        Ok(plan)
    }

    /// Fetch rows matching the pushed-down qualifiers and pass each one to `emit`
    /// until it returns `ControlFlow::Break`.
    pub async fn list(
        &self,
        db: &Database,
        qualifiers: &[Qualifier],
        limit: Option<i64>,
        emit: &mut dyn FnMut(Box<dyn TableRow>) -> ControlFlow<()>,
    ) -> Result<usize> {
        match self {
            Table::Ca => ca::list(db, qualifiers, limit, |row| emit(Box::new(row))).await,
            Table::CaIssuer => {
                ca_issuer::list(db, qualifiers, limit, |row| emit(Box::new(row))).await
            }
            Table::Certificate => {
                certificate::list(db, qualifiers, limit, |row| emit(Box::new(row))).await
            }
            Table::Log => log::list(db, qualifiers, limit, |row| emit(Box::new(row))).await,
            Table::LogEntry => {
                log_entry::list(db, qualifiers, limit, |row| emit(Box::new(row))).await
            }
            Table::LogOperator => {
                log_operator::list(db, qualifiers, limit, |row| emit(Box::new(row))).await
            }
        }
    }
}

impl FromStr for Table {
    type Err = CrtshError;

    /// Accepts the full name (`crtsh_ca`) or the short form (`ca`).
    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_lowercase();
        Table::ALL
            .into_iter()
            .find(|t| t.name() == wanted || t.name().strip_prefix("crtsh_") == Some(wanted.as_str()))
            .ok_or_else(|| CrtshError::UnknownTable(s.to_string()))
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub(crate) fn timestamp_value(ts: Option<DateTime<Utc>>) -> Value {
    ts.map(|ts| Value::String(ts.to_rfc3339_opts(SecondsFormat::Secs, true)))
        .unwrap_or(Value::Null)
}

pub(crate) fn opt_value<T: Into<Value>>(value: Option<T>) -> Value {
    value.map(Into::into).unwrap_or(Value::Null)
}
