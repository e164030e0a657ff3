//! Search result encoding (JSON array, CSV, NDJSON)
//!
//! The encoder emits its opening bytes together with the first row, so a
//! search that fails before producing a row has written nothing.

use crate::query::ExportFormat;
use serde_json::{Map, Value};

pub struct RowEncoder {
    format: ExportFormat,
    columns: &'static [&'static str],
    rows: u64,
}

impl RowEncoder {
    pub fn new(format: ExportFormat, columns: &'static [&'static str]) -> Self {
        Self {
            format,
            columns,
            rows: 0,
        }
    }

    pub fn rows_written(&self) -> u64 {
        self.rows
    }

    /// Encode one row. `values` are in column order.
    pub fn encode_row(&mut self, values: Vec<Value>) -> Result<String, serde_json::Error> {
        debug_assert_eq!(values.len(), self.columns.len());

        let mut out = if self.rows == 0 { self.opening() } else { String::new() };

        match self.format {
            ExportFormat::Json => {
                if self.rows > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(&self.object(values))?);
            }
            ExportFormat::Ndjson => {
                out.push_str(&serde_json::to_string(&self.object(values))?);
                out.push('\n');
            }
            ExportFormat::Csv => {
                let fields: Vec<String> = values.iter().map(csv_field).collect();
                out.push_str(&fields.join(","));
                out.push_str("\r\n");
            }
        }

        self.rows += 1;
        Ok(out)
    }

    /// Closing bytes. Emits a complete empty document when no row was written.
    pub fn finish(&self) -> String {
        let mut out = if self.rows == 0 { self.opening() } else { String::new() };
        if self.format == ExportFormat::Json {
            out.push(']');
        }
        out
    }

    fn opening(&self) -> String {
        match self.format {
            ExportFormat::Json => "[".to_string(),
            ExportFormat::Ndjson => String::new(),
            ExportFormat::Csv => {
                let header: Vec<String> = self.columns.iter().map(|c| csv_escape(c)).collect();
                format!("{}\r\n", header.join(","))
            }
        }
    }

    fn object(&self, values: Vec<Value>) -> Value {
        let map: Map<String, Value> = self
            .columns
            .iter()
            .map(|c| c.to_string())
            .zip(values)
            .collect();
        Value::Object(map)
    }
}

fn csv_field(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => csv_escape(s),
        Value::Bool(_) | Value::Number(_) => value.to_string(),
        Value::Array(_) | Value::Object(_) => csv_escape(&value.to_string()),
    }
}

/// RFC 4180 quoting
fn csv_escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
