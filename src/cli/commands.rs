use crate::cert::decoder::decode;
use crate::cli::args::*;
use crate::cli::completions::{handle_completion_command, handle_completion_helper_command};
use crate::db::{Database, DatabaseConfig};
use crate::query::Qualifier;
use crate::tables::certificate::{derived_column, DERIVED_COLUMNS};
use crate::tables::{timestamp_value, Require, Table, TableDef, TableRow};
use crate::utils::errors::{CrtshError, Result};
use crate::utils::output::{build_record, OutputFormat, Record};
use serde_json::Value;
use std::io;
use std::ops::ControlFlow;
use std::path::Path;

pub async fn handle_command(cli: Cli) -> Result<()> {
    // Initialize logging - always to stderr
    if !cli.quiet {
        let log_level = match cli.verbose {
            0 => "crtsh_rs=warn",  // Default: warnings only
            1 => "crtsh_rs=info",  // -v: info level
            2 => "crtsh_rs=debug", // -vv: debug level
            _ => "crtsh_rs=trace", // -vvv+: trace level
        };

        tracing_subscriber::fmt()
            .with_writer(io::stderr)
            .with_env_filter(log_level)
            .init();
    }

    let output = OutputFormat::new(cli.format);
    let config = cli.database_config();

    match cli.command {
        Commands::Tables => handle_tables_command(&output),
        Commands::Columns { ref table } => handle_columns_command(table, &output),
        Commands::Query {
            ref table,
            ref filters,
            limit,
            ref columns,
        } => handle_query_command(&config, table, filters, limit, columns.as_deref(), &output).await,
        Commands::Decode { ref file } => handle_decode_command(file, &output),
        Commands::Completion { ref command } => handle_completion_command(command),
        Commands::CompletionHelper { ref command } => {
            handle_completion_helper_command(command, &output)
        }
    }
}

fn handle_tables_command(output: &OutputFormat) -> Result<()> {
    let columns = ["table", "description"];
    let records: Vec<Record> = Table::ALL
        .iter()
        .map(|table| {
            let def = table.definition();
            build_record(&columns, |column| match column {
                "table" => def.name.into(),
                _ => def.description.into(),
            })
        })
        .collect();

    output.print_records(&columns, &records)
}

fn handle_columns_command(table: &str, output: &OutputFormat) -> Result<()> {
    let table: Table = table.parse()?;
    let def = table.definition();

    let columns = ["column", "type", "operators", "required", "description"];
    let records: Vec<Record> = def
        .columns
        .iter()
        .map(|descriptor| {
            let key = def.key_column(descriptor.name);
            build_record(&columns, |column| match column {
                "column" => descriptor.name.into(),
                "type" => descriptor.column_type.as_str().into(),
                "operators" => key
                    .map(|k| {
                        k.operators
                            .iter()
                            .map(|op| op.as_sql())
                            .collect::<Vec<_>>()
                            .join(" ")
                    })
                    .unwrap_or_default()
                    .into(),
                "required" => (key.map(|k| k.require) == Some(Require::AnyOf)).into(),
                _ => descriptor.description.into(),
            })
        })
        .collect();

    output.print_records(&columns, &records)
}

async fn handle_query_command(
    config: &DatabaseConfig,
    table: &str,
    filters: &[String],
    limit: Option<i64>,
    columns: Option<&str>,
    output: &OutputFormat,
) -> Result<()> {
    let table: Table = table.parse()?;
    let selected = parse_columns(table.definition(), columns)?;

    let qualifiers = filters
        .iter()
        .map(|expr| table.parse_qualifier(expr))
        .collect::<Result<Vec<_>>>()?;
    let plan = table.plan(qualifiers)?;

    for qual in &plan.residual {
        tracing::info!("{table}: {qual} is not pushed down, filtering returned rows");
    }

    // Rows are filtered after the query, so the limit is applied here instead
    let pushed_limit = if plan.residual.is_empty() { limit } else { None };
    let mut collector = RowCollector::new(
        &selected,
        &plan.residual,
        limit.and_then(|l| usize::try_from(l).ok()),
    );

    let db = Database::connect(config).await?;
    table
        .list(&db, &plan.pushed, pushed_limit, &mut |row: Box<dyn TableRow>| {
            collector.push(&*row)
        })
        .await?;

    output.print_records(&selected, &collector.records)
}

/// Gathers output records, applying residual qualifiers and the row limit.
struct RowCollector<'a> {
    selected: &'a [&'static str],
    residual: &'a [Qualifier],
    max_rows: Option<usize>,
    records: Vec<Record>,
}

impl<'a> RowCollector<'a> {
    fn new(selected: &'a [&'static str], residual: &'a [Qualifier], max_rows: Option<usize>) -> Self {
        Self {
            selected,
            residual,
            max_rows,
            records: Vec::new(),
        }
    }

    fn is_full(&self) -> bool {
        self.max_rows.is_some_and(|max| self.records.len() >= max)
    }

    /// Keep `row` if it passes every residual qualifier. Breaks once the limit is reached.
    fn push(&mut self, row: &dyn TableRow) -> ControlFlow<()> {
        if self.is_full() {
            return ControlFlow::Break(());
        }

        let keep = self
            .residual
            .iter()
            .all(|qual| qual.matches(&row.column_value(&qual.column)));
        if keep {
            tracing::trace!("emitting row {}", self.records.len() + 1);
            self.records
                .push(build_record(self.selected, |column| row.column_value(column)));
        }

        if self.is_full() {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    }
}

fn handle_decode_command(file: &Path, output: &OutputFormat) -> Result<()> {
    let raw = read_certificate_file(file)?;
    let cert = decode(&raw);
    if cert.is_zero() {
        return Err(CrtshError::CertInput(format!(
            "{} is not a valid X.509 certificate",
            file.display()
        )));
    }

    let mut record = build_record(DERIVED_COLUMNS, |column| {
        derived_column(&raw, &cert, column).unwrap_or(Value::Null)
    });
    record.insert("not_after".to_string(), timestamp_value(cert.not_after));

    output.print_record(&record)
}

/// Read a certificate as DER bytes. PEM input is recognised by its
/// `-----BEGIN` armour; only the first block is used.
fn read_certificate_file(file: &Path) -> Result<Vec<u8>> {
    let data = std::fs::read(file)?;
    certificate_der(&data)
}

fn certificate_der(data: &[u8]) -> Result<Vec<u8>> {
    let is_pem = data
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .is_some_and(|start| data[start..].starts_with(b"-----BEGIN"));
    if !is_pem {
        return Ok(data.to_vec());
    }

    let block = pem::parse(data).map_err(|e| CrtshError::CertInput(format!("PEM error: {e}")))?;
    if block.tag() != "CERTIFICATE" {
        return Err(CrtshError::CertInput(format!(
            "expected a CERTIFICATE PEM block, found {}",
            block.tag()
        )));
    }
    Ok(block.contents().to_vec())
}

/// Parse the `--columns` option. A leading `+` appends to the table's
/// default columns; otherwise the list replaces them.
fn parse_columns(def: &TableDef, columns: Option<&str>) -> Result<Vec<&'static str>> {
    let requested: Vec<&str> = match columns {
        None => return Ok(def.default_columns.to_vec()),
        Some(columns_str) => columns_str
            .strip_prefix('+')
            .unwrap_or(columns_str)
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect(),
    };

    let mut result: Vec<&'static str> = match columns {
        Some(columns_str) if columns_str.starts_with('+') => def.default_columns.to_vec(),
        _ => Vec::new(),
    };

    for name in requested {
        let column = def.column(name).ok_or_else(|| CrtshError::UnknownColumn {
            table: def.name.to_string(),
            column: name.to_string(),
        })?;
        if !result.contains(&column.name) {
            result.push(column.name);
        }
    }

    if result.is_empty() {
        return Ok(def.default_columns.to_vec());
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_columns_defaults() {
        let def = Table::Certificate.definition();
        assert_eq!(parse_columns(def, None).unwrap(), def.default_columns.to_vec());
        assert_eq!(parse_columns(def, Some(" , ")).unwrap(), def.default_columns.to_vec());
    }

    #[test]
    fn test_parse_columns_override_and_append() {
        let def = Table::Certificate.definition();
        assert_eq!(
            parse_columns(def, Some("id, serial_number")).unwrap(),
            vec!["id", "serial_number"]
        );

        let appended = parse_columns(def, Some("+fingerprint_sha256,id")).unwrap();
        assert_eq!(appended.len(), def.default_columns.len() + 1);
        assert_eq!(appended.last(), Some(&"fingerprint_sha256"));
    }

    #[test]
    fn test_parse_columns_rejects_unknown() {
        let def = Table::Log.definition();
        let err = parse_columns(def, Some("id,colour")).unwrap_err();
        assert!(matches!(err, CrtshError::UnknownColumn { ref column, .. } if column == "colour"));
    }

    #[test]
    fn test_certificate_der_from_pem_and_der() {
        let pem_text = include_str!("../../testdata/ec.pem");
        let der = certificate_der(pem_text.as_bytes()).unwrap();
        assert_eq!(der[0], 0x30);
        assert!(!decode(&der).is_zero());

        assert_eq!(certificate_der(&der).unwrap(), der);
    }

    #[test]
    fn test_certificate_der_rejects_other_pem_blocks() {
        let key = pem::encode(&pem::Pem::new("PUBLIC KEY", vec![0x30, 0x00]));
        assert!(matches!(
            certificate_der(key.as_bytes()),
            Err(CrtshError::CertInput(_))
        ));
    }

    #[test]
    fn test_decode_missing_file() {
        let output = OutputFormat::new(crate::utils::output::OutputKind::Json);
        let err = handle_decode_command(Path::new("/nonexistent/cert.der"), &output).unwrap_err();
        assert!(matches!(err, CrtshError::Io(_)));
    }

    struct FakeRow {
        id: i64,
        is_active: bool,
    }

    impl TableRow for FakeRow {
        fn column_value(&self, column: &str) -> Value {
            match column {
                "id" => self.id.into(),
                "is_active" => self.is_active.into(),
                _ => Value::Null,
            }
        }
    }

    #[test]
    fn test_collector_filters_and_stops_at_limit() {
        use crate::query::{Operator, QualValue};

        let residual = vec![Qualifier::new("is_active", Operator::Eq, QualValue::Bool(true))];
        let mut collector = RowCollector::new(&["id"], &residual, Some(2));

        assert!(collector.push(&FakeRow { id: 1, is_active: true }).is_continue());
        assert!(collector.push(&FakeRow { id: 2, is_active: false }).is_continue());
        assert!(collector.push(&FakeRow { id: 3, is_active: true }).is_break());
        assert!(collector.push(&FakeRow { id: 4, is_active: true }).is_break());

        let ids: Vec<Option<Value>> = collector.records.iter().map(|r| r.get("id").cloned()).collect();
        assert_eq!(ids, vec![Some(Value::from(1)), Some(Value::from(3))]);
    }

    #[test]
    fn test_collector_zero_limit_and_unlimited() {
        let mut none = RowCollector::new(&["id"], &[], Some(0));
        assert!(none.push(&FakeRow { id: 1, is_active: true }).is_break());
        assert!(none.records.is_empty());

        let mut all = RowCollector::new(&["id"], &[], None);
        for id in 0..5 {
            assert!(all.push(&FakeRow { id, is_active: false }).is_continue());
        }
        assert_eq!(all.records.len(), 5);
    }
}
