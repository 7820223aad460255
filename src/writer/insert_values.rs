use std::fs::File;
use std::path::Path;

use serde_json::Value;
use tracing::debug;

use super::{FileFormat, OutputFile};
use crate::columnar::{batch_to_records, check_record, value_text};
use crate::config::InsertValuesConfig;
use crate::error::Result;
use crate::item::BufferedItem;
use crate::record::Record;
use crate::schema::{DataType, TableSchema};

/// Writes `INSERT INTO ... VALUES` statements, one statement per encoded batch.
#[derive(Debug)]
pub struct InsertValuesEncoder {
    output: OutputFile,
    columns: TableSchema,
    table_name: String,
    items_count: u64,
}

impl InsertValuesEncoder {
    pub fn open(columns: &TableSchema, file: File, path: &Path, config: &InsertValuesConfig) -> Self {
        let table_name = config.table_name.clone().unwrap_or_else(|| {
            path.file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("items")
                .to_string()
        });
        Self {
            output: OutputFile::new(file, path),
            columns: columns.clone(),
            table_name,
            items_count: 0,
        }
    }

    pub const fn items_count(&self) -> u64 {
        self.items_count
    }

    pub const fn columns(&self) -> &TableSchema {
        &self.columns
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn update_columns(&mut self, columns: &TableSchema) {
        self.columns = columns.clone();
    }

    fn header(&self) -> String {
        let names: Vec<String> = self.columns.names().map(escape_identifier).collect();
        format!(
            "INSERT INTO {}({})\nVALUES\n",
            escape_identifier(&self.table_name),
            names.join(",")
        )
    }

    fn row_literal(&self, record: &Record) -> String {
        let values: Vec<String> = self
            .columns
            .iter()
            .map(|column| {
                let value = record.get(&column.name).unwrap_or(&Value::Null);
                match (column.data_type, value) {
                    (_, Value::Null) => "NULL".to_string(),
                    (DataType::Bool, Value::Bool(true)) => "TRUE".to_string(),
                    (DataType::Bool, Value::Bool(false)) => "FALSE".to_string(),
                    (DataType::Bigint | DataType::Double, v) => v.to_string(),
                    (DataType::Binary, Value::String(hex)) => format!("X'{hex}'"),
                    _ => escape_literal(&value_text(column, value).unwrap_or_default()),
                }
            })
            .collect();
        format!("({})", values.join(","))
    }

    pub fn encode_batch(&mut self, units: &[BufferedItem]) -> Result<usize> {
        let mut rows: Vec<String> = Vec::new();
        for unit in units {
            match unit {
                BufferedItem::Record(record) => {
                    check_record(record, &self.columns, FileFormat::InsertValues)?;
                    rows.push(self.row_literal(record));
                }
                BufferedItem::Batch(batch) => {
                    for record in batch_to_records(batch, &self.columns, FileFormat::InsertValues)? {
                        rows.push(self.row_literal(&record));
                    }
                }
            }
        }
        if rows.is_empty() {
            return Ok(0);
        }

        let mut statement = self.header();
        statement.push_str(&rows.join(",\n"));
        statement.push_str(";\n");
        self.output.append(statement.as_bytes())?;

        let count = rows.len();
        self.items_count += count as u64;
        debug!(path = %self.output.path().display(), rows = count, "encoded insert_values batch");
        Ok(count)
    }

    pub fn close(self) -> Result<u64> {
        Ok(self.items_count)
    }
}

fn escape_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn escape_literal(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}
