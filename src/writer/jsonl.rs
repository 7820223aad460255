use std::fs::File;
use std::path::Path;

use tracing::debug;

use super::{FileFormat, OutputFile};
use crate::columnar::{batch_to_records, check_record};
use crate::error::{Error, Result};
use crate::item::BufferedItem;
use crate::record::Record;
use crate::schema::TableSchema;

/// Writes one JSON object per line.
#[derive(Debug)]
pub struct JsonlEncoder {
    output: OutputFile,
    columns: TableSchema,
    items_count: u64,
}

impl JsonlEncoder {
    pub fn open(columns: &TableSchema, file: File, path: &Path) -> Self {
        Self {
            output: OutputFile::new(file, path),
            columns: columns.clone(),
            items_count: 0,
        }
    }

    pub const fn items_count(&self) -> u64 {
        self.items_count
    }

    pub const fn columns(&self) -> &TableSchema {
        &self.columns
    }

    pub fn update_columns(&mut self, columns: &TableSchema) {
        self.columns = columns.clone();
    }

    fn push_record(output: &mut String, record: &Record) -> Result<()> {
        let line = serde_json::to_string(record)
            .map_err(|e| Error::encoding(FileFormat::Jsonl, e.to_string()))?;
        output.push_str(&line);
        output.push('\n');
        Ok(())
    }

    pub fn encode_batch(&mut self, units: &[BufferedItem]) -> Result<usize> {
        // Serialize the whole batch first so a bad value leaves the file untouched,
        // then write it with a single call.
        let mut output = String::with_capacity(units.len() * 200);
        let mut rows = 0;
        for unit in units {
            match unit {
                BufferedItem::Record(record) => {
                    check_record(record, &self.columns, FileFormat::Jsonl)?;
                    Self::push_record(&mut output, record)?;
                    rows += 1;
                }
                BufferedItem::Batch(batch) => {
                    for record in batch_to_records(batch, &self.columns, FileFormat::Jsonl)? {
                        Self::push_record(&mut output, &record)?;
                    }
                    rows += batch.num_rows();
                }
            }
        }

        self.output.append(output.as_bytes())?;
        self.items_count += rows as u64;
        debug!(path = %self.output.path().display(), rows, "encoded jsonl batch");
        Ok(rows)
    }

    pub fn close(self) -> Result<u64> {
        Ok(self.items_count)
    }
}
