use std::fmt;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use ::parquet::arrow::ArrowWriter;
use ::parquet::file::properties::WriterProperties;
use arrow::record_batch::RecordBatch;
use tracing::debug;

use super::FileFormat;
use crate::columnar::{conform_batch, records_to_batch};
use crate::config::ParquetConfig;
use crate::error::{Error, Result};
use crate::item::BufferedItem;
use crate::record::Record;
use crate::schema::TableSchema;

/// Writes Arrow batches into a Parquet file. The footer is written on close.
///
/// Each `encode_batch` hands the writer a single batch. Row groups already
/// written cannot be taken back, so after a failed write the encoder is
/// poisoned: every later `encode_batch` and `close` fails with
/// [`Error::WriteFailure`].
pub struct ParquetEncoder {
    writer: ArrowWriter<File>,
    path: PathBuf,
    columns: TableSchema,
    items_count: u64,
    poisoned: bool,
}

impl ParquetEncoder {
    pub fn open(
        columns: &TableSchema,
        file: File,
        path: &Path,
        config: &ParquetConfig,
    ) -> Result<Self> {
        let props = WriterProperties::builder()
            .set_max_row_group_size(config.row_group_size)
            .build();
        let writer = ArrowWriter::try_new(file, columns.to_arrow(), Some(props))
            .map_err(|e| Error::from_parquet(path, e))?;
        Ok(Self {
            writer,
            path: path.to_path_buf(),
            columns: columns.clone(),
            items_count: 0,
            poisoned: false,
        })
    }

    pub const fn items_count(&self) -> u64 {
        self.items_count
    }

    pub const fn columns(&self) -> &TableSchema {
        &self.columns
    }

    /// Turns the units into batches shaped like the file schema.
    /// Runs of consecutive records become a single batch.
    fn to_batches(&self, units: &[BufferedItem]) -> Result<Vec<RecordBatch>> {
        let mut batches = Vec::new();
        let mut pending: Vec<&Record> = Vec::new();
        for unit in units {
            match unit {
                BufferedItem::Record(record) => pending.push(record),
                BufferedItem::Batch(batch) => {
                    if !pending.is_empty() {
                        batches.push(records_to_batch(&pending, &self.columns, FileFormat::Parquet)?);
                        pending.clear();
                    }
                    batches.push(conform_batch(batch, &self.columns, FileFormat::Parquet)?);
                }
            }
        }
        if !pending.is_empty() {
            batches.push(records_to_batch(&pending, &self.columns, FileFormat::Parquet)?);
        }
        Ok(batches)
    }

    fn check_poisoned(&self) -> Result<()> {
        if self.poisoned {
            return Err(Error::write_failure(
                &self.path,
                io::Error::new(io::ErrorKind::Other, "parquet writer failed earlier"),
            ));
        }
        Ok(())
    }

    pub fn encode_batch(&mut self, units: &[BufferedItem]) -> Result<usize> {
        self.check_poisoned()?;
        let batches = self.to_batches(units)?;
        if batches.is_empty() {
            return Ok(0);
        }
        let batch = RecordBatch::concat(&self.columns.to_arrow(), &batches)
            .map_err(|e| Error::encoding(FileFormat::Parquet, e.to_string()))?;

        if let Err(err) = self.writer.write(&batch) {
            self.poisoned = true;
            return Err(Error::from_parquet(&self.path, err));
        }
        let rows = batch.num_rows();
        self.items_count += rows as u64;
        debug!(path = %self.path.display(), rows, units = batches.len(), "encoded parquet batch");
        Ok(rows)
    }

    pub fn close(self) -> Result<u64> {
        self.check_poisoned()?;
        self.writer
            .close()
            .map_err(|e| Error::from_parquet(&self.path, e))?;
        Ok(self.items_count)
    }
}

impl fmt::Debug for ParquetEncoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParquetEncoder")
            .field("path", &self.path)
            .field("columns", &self.columns)
            .field("items_count", &self.items_count)
            .field("poisoned", &self.poisoned)
            .finish_non_exhaustive()
    }
}
