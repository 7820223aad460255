use std::borrow::Cow;
use std::fs::File;
use std::path::Path;

use ::csv::WriterBuilder;
use serde_json::Value;
use tracing::debug;

use super::{FileFormat, OutputFile};
use crate::columnar::{batch_to_records, check_record, value_text};
use crate::config::CsvConfig;
use crate::error::{Error, Result};
use crate::item::BufferedItem;
use crate::record::Record;
use crate::schema::{DataType, TableSchema};

/// Writes rows as delimited text (CSV/TSV) in column order.
#[derive(Debug)]
pub struct CsvEncoder {
    output: OutputFile,
    columns: TableSchema,
    delimiter: u8,
    items_count: u64,
}

impl CsvEncoder {
    pub fn open(columns: &TableSchema, file: File, path: &Path, config: &CsvConfig) -> Result<Self> {
        let delimiter = u8::try_from(config.delimiter)
            .ok()
            .filter(u8::is_ascii)
            .ok_or_else(|| Error::InvalidConfig {
                details: Cow::Owned(format!(
                    "csv delimiter {:?} is not an ascii character",
                    config.delimiter
                )),
            })?;
        let mut encoder = Self {
            output: OutputFile::new(file, path),
            columns: columns.clone(),
            delimiter,
            items_count: 0,
        };
        if config.include_header {
            encoder.write_header()?;
        }
        Ok(encoder)
    }

    pub const fn items_count(&self) -> u64 {
        self.items_count
    }

    pub const fn columns(&self) -> &TableSchema {
        &self.columns
    }

    fn text_writer(&self) -> ::csv::Writer<Vec<u8>> {
        WriterBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(false)
            .from_writer(Vec::new())
    }

    fn into_bytes(writer: ::csv::Writer<Vec<u8>>) -> Result<Vec<u8>> {
        writer
            .into_inner()
            .map_err(|e| Error::encoding(FileFormat::Csv, e.to_string()))
    }

    fn write_header(&mut self) -> Result<()> {
        let mut header = self.text_writer();
        header
            .write_record(self.columns.names())
            .map_err(|e| Error::encoding(FileFormat::Csv, e.to_string()))?;
        let bytes = Self::into_bytes(header)?;
        self.output.append(&bytes)
    }

    fn push_record(&self, out: &mut ::csv::Writer<Vec<u8>>, record: &Record) -> Result<()> {
        let mut fields = Vec::with_capacity(self.columns.len());
        for column in &self.columns {
            let value = record.get(&column.name).unwrap_or(&Value::Null);
            if column.data_type == DataType::Binary && !value.is_null() {
                return Err(Error::encoding(
                    FileFormat::Csv,
                    format!("column `{}` holds binary data", column.name),
                ));
            }
            fields.push(value_text(column, value).unwrap_or_default());
        }
        out.write_record(&fields)
            .map_err(|e| Error::encoding(FileFormat::Csv, e.to_string()))
    }

    pub fn encode_batch(&mut self, units: &[BufferedItem]) -> Result<usize> {
        let mut out = self.text_writer();
        let mut rows = 0;
        for unit in units {
            match unit {
                BufferedItem::Record(record) => {
                    check_record(record, &self.columns, FileFormat::Csv)?;
                    self.push_record(&mut out, record)?;
                    rows += 1;
                }
                BufferedItem::Batch(batch) => {
                    for record in batch_to_records(batch, &self.columns, FileFormat::Csv)? {
                        self.push_record(&mut out, &record)?;
                    }
                    rows += batch.num_rows();
                }
            }
        }
        let bytes = Self::into_bytes(out)?;

        self.output.append(&bytes)?;
        self.items_count += rows as u64;
        debug!(path = %self.output.path().display(), rows, "encoded csv batch");
        Ok(rows)
    }

    pub fn close(self) -> Result<u64> {
        Ok(self.items_count)
    }
}
