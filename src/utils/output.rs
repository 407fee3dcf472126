use crate::utils::errors::Result;
use clap::ValueEnum;
use ordermap::OrderMap;
use serde_json::Value;
use std::fmt::Display;

/// One output row, keyed by column name in display order.
pub type Record = OrderMap<String, Value>;

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputKind {
    /// Column-aligned text with a header line
    #[default]
    Table,
    /// Tab-separated values without a header
    Raw,
    Json,
    Yaml,
}

/// Output format configuration
#[derive(Clone, Debug)]
pub struct OutputFormat {
    pub kind: OutputKind,
}

/// Build a record holding `columns` in the given order.
pub fn build_record<F>(columns: &[&str], value_of: F) -> Record
where
    F: Fn(&str) -> Value,
{
    columns
        .iter()
        .map(|column| (column.to_string(), value_of(column)))
        .collect()
}

/// Text form of a value inside a table cell. Newlines are escaped so a PEM
/// block stays on one line.
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.replace('\n', "\\n"),
        other => other.to_string(),
    }
}

impl OutputFormat {
    pub fn new(kind: OutputKind) -> Self {
        Self { kind }
    }

    pub fn print_records(&self, columns: &[&str], records: &[Record]) -> Result<()> {
        let rendered = self.render_records(columns, records)?;
        print!("{rendered}");
        Ok(())
    }

    /// Render records in the configured format. Table output starts with a
    /// header line, even when there are no records.
    pub fn render_records(&self, columns: &[&str], records: &[Record]) -> Result<String> {
        match self.kind {
            OutputKind::Json => Ok(format!("{}\n", serde_json::to_string_pretty(records)?)),
            OutputKind::Yaml => Ok(serde_yaml::to_string(records)?),
            OutputKind::Table | OutputKind::Raw => {
                let mut data: Vec<Vec<String>> = Vec::with_capacity(records.len() + 1);
                if self.kind == OutputKind::Table {
                    data.push(columns.iter().map(|c| c.to_uppercase()).collect());
                }
                data.extend(records.iter().map(|record| {
                    columns
                        .iter()
                        .map(|column| record.get(*column).map(cell_text).unwrap_or_default())
                        .collect()
                }));
                Ok(self.render_table(&data))
            }
        }
    }

    /// Print a single record as `key value` lines, or as one object for JSON and YAML.
    pub fn print_record(&self, record: &Record) -> Result<()> {
        match self.kind {
            OutputKind::Json => println!("{}", serde_json::to_string_pretty(record)?),
            OutputKind::Yaml => print!("{}", serde_yaml::to_string(record)?),
            OutputKind::Table | OutputKind::Raw => {
                let pairs: Vec<(String, String)> = record
                    .iter()
                    .map(|(key, value)| (key.clone(), cell_text(value)))
                    .collect();
                self.print_key_value(&pairs);
            }
        }
        Ok(())
    }

    /// Print tabular data - either raw (tab-separated) or formatted (column-aligned)
    pub fn print_table<T>(&self, data: &[Vec<T>])
    where
        T: Display + AsRef<str>,
    {
        print!("{}", self.render_table(data));
    }

    /// Print single-column data
    pub fn print_list<T>(&self, items: &[T])
    where
        T: Display,
    {
        for item in items {
            println!("{item}");
        }
    }

    /// Print key-value pairs
    pub fn print_key_value<K, V>(&self, pairs: &[(K, V)])
    where
        K: Display + AsRef<str>,
        V: Display + AsRef<str>,
    {
        let data: Vec<Vec<String>> = pairs
            .iter()
            .map(|(k, v)| vec![k.to_string(), v.to_string()])
            .collect();

        self.print_table(&data);
    }

    fn render_table<T>(&self, data: &[Vec<T>]) -> String
    where
        T: Display + AsRef<str>,
    {
        if data.is_empty() {
            return String::new();
        }

        if self.kind == OutputKind::Raw {
            return data
                .iter()
                .map(|row| {
                    let cells: Vec<&str> = row.iter().map(|cell| cell.as_ref()).collect();
                    format!("{}\n", cells.join("\t"))
                })
                .collect();
        }

        // Column-aligned like `column -t`
        let num_cols = data.iter().map(Vec::len).max().unwrap_or(0);
        let mut col_widths = vec![0; num_cols];

        for row in data {
            for (i, cell) in row.iter().enumerate() {
                col_widths[i] = col_widths[i].max(cell.as_ref().chars().count());
            }
        }

        let mut out = String::new();
        for row in data {
            let formatted_cells: Vec<String> = row
                .iter()
                .enumerate()
                .map(|(i, cell)| {
                    if i == row.len() - 1 {
                        // Last column - no padding needed
                        cell.to_string()
                    } else {
                        format!("{:<width$}", cell.as_ref(), width = col_widths[i])
                    }
                })
                .collect();

            out.push_str(formatted_cells.join("  ").trim_end());
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_records() -> Vec<Record> {
        vec![
            build_record(&["id", "name"], |column| match column {
                "id" => json!(1),
                _ => json!("short"),
            }),
            build_record(&["id", "name"], |column| match column {
                "id" => json!(16418),
                _ => Value::Null,
            }),
        ]
    }

    #[test]
    fn test_raw_output() {
        let format = OutputFormat::new(OutputKind::Raw);
        let data = vec![
            vec!["short", "medium", "very_long_column"],
            vec!["a", "bb", "ccc"],
        ];

        assert_eq!(
            format.render_table(&data),
            "short\tmedium\tvery_long_column\na\tbb\tccc\n"
        );
    }

    #[test]
    fn test_formatted_output() {
        let format = OutputFormat::new(OutputKind::Table);
        let data = vec![
            vec!["short", "medium", "very_long_column"],
            vec!["a", "bb", "ccc"],
        ];

        assert_eq!(
            format.render_table(&data),
            "short  medium  very_long_column\na      bb      ccc\n"
        );
    }

    #[test]
    fn test_table_records_have_header() {
        let format = OutputFormat::new(OutputKind::Table);
        let out = format.render_records(&["id", "name"], &sample_records()).unwrap();
        assert_eq!(out, "ID     NAME\n1      short\n16418\n");

        let empty = format.render_records(&["id"], &[]).unwrap();
        assert_eq!(empty, "ID\n");
    }

    #[test]
    fn test_json_keeps_column_order() {
        let format = OutputFormat::new(OutputKind::Json);
        let out = format.render_records(&["id", "name"], &sample_records()).unwrap();
        let parsed: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed[0]["name"], json!("short"));
        assert_eq!(parsed[1]["name"], Value::Null);
        assert!(out.find("\"id\"").unwrap() < out.find("\"name\"").unwrap());
    }

    #[test]
    fn test_yaml_output() {
        let format = OutputFormat::new(OutputKind::Yaml);
        let out = format.render_records(&["id", "name"], &sample_records()).unwrap();
        assert!(out.contains("id: 16418"));
        assert!(out.contains("name: short"));
    }

    #[test]
    fn test_cell_text() {
        assert_eq!(cell_text(&Value::Null), "");
        assert_eq!(cell_text(&json!("a\nb")), "a\\nb");
        assert_eq!(cell_text(&json!(["x", "y"])), "[\"x\",\"y\"]");
        assert_eq!(cell_text(&json!(true)), "true");
    }
}
