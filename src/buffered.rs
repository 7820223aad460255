//! The buffered data writer: accepts data items of any shape, counts their
//! rows, and hands them to a format encoder in batches.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::WriterConfig;
use crate::error::{Error, Result};
use crate::item::{BufferedItem, DataItem};
use crate::schema::TableSchema;
use crate::writer::{FileFormat, FormatEncoder};

/// What a closed writer produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriterMetrics {
    pub file_path: PathBuf,
    pub items_count: u64,
    pub file_size: u64,
}

/// Buffers data items for one output file and flushes them through a [`FormatEncoder`].
///
/// The encoder and the file are created on the first flush. Rows are encoded
/// in the order they were written.
#[derive(Debug)]
pub struct BufferedDataWriter {
    format: FileFormat,
    path: PathBuf,
    config: WriterConfig,
    encoder: Option<FormatEncoder>,
    buffered_items: Vec<BufferedItem>,
    buffered_items_count: usize,
    columns: Option<TableSchema>,
}

impl BufferedDataWriter {
    pub fn new(format: FileFormat, path: impl Into<PathBuf>, config: WriterConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            format,
            path: path.into(),
            config,
            encoder: None, // created on first flush
            buffered_items: Vec::new(),
            buffered_items_count: 0,
            columns: None,
        })
    }

    pub const fn format(&self) -> FileFormat {
        self.format
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub const fn config(&self) -> &WriterConfig {
        &self.config
    }

    /// Rows held in the buffer, not yet handed to the encoder.
    pub const fn buffered_items_count(&self) -> usize {
        self.buffered_items_count
    }

    /// The active encoder, once the first flush has opened it.
    pub const fn encoder(&self) -> Option<&FormatEncoder> {
        self.encoder.as_ref()
    }

    /// The merged columns of every write so far.
    pub const fn columns(&self) -> Option<&TableSchema> {
        self.columns.as_ref()
    }

    /// Buffers `item`, described by `columns`.
    ///
    /// Fails with [`Error::SchemaMismatch`] without touching any state when
    /// `columns` conflicts with what was written before. May flush when the
    /// buffer reaches `buffer_max_items`.
    ///
    /// An error from that flush arrives after `item` was buffered and counted.
    /// Retry with [`flush`](Self::flush), not by writing the item again.
    pub fn write_data_item(&mut self, item: impl Into<DataItem>, columns: &TableSchema) -> Result<()> {
        self.update_columns(columns)?;

        let item = item.into();
        let rows = item.row_count();
        self.buffered_items.extend(item.into_buffered());
        self.buffered_items_count += rows;

        if self
            .config
            .buffer_max_items
            .is_some_and(|max| self.buffered_items_count >= max)
        {
            debug!(path = %self.path.display(), rows = self.buffered_items_count, "buffer full");
            self.flush()?;
        }
        Ok(())
    }

    pub(crate) fn update_columns(&mut self, columns: &TableSchema) -> Result<()> {
        let Some(current) = &self.columns else {
            self.columns = Some(columns.clone());
            return Ok(());
        };
        let (merged, added) = current.merge(columns)?;
        if !added {
            return Ok(());
        }
        if let Some(encoder) = &mut self.encoder {
            encoder.update_columns(&merged)?;
        }
        self.columns = Some(merged);
        Ok(())
    }

    fn open_encoder(&self) -> Result<FormatEncoder> {
        let columns = self.columns.clone().unwrap_or_default();
        let file = File::create(&self.path).map_err(|source| Error::Io {
            path: self.path.clone(),
            source,
        })?;
        debug!(path = %self.path.display(), format = %self.format, columns = columns.len(), "opened encoder");
        FormatEncoder::open(self.format, &columns, file, &self.path, &self.config)
    }

    /// Encodes everything buffered in one call. A no-op on an empty buffer.
    /// On failure the buffer and its count are left as they were.
    pub fn flush(&mut self) -> Result<()> {
        if self.buffered_items.is_empty() {
            return Ok(());
        }

        let encoder = match self.encoder.take() {
            Some(encoder) => encoder,
            None => self.open_encoder()?,
        };
        let encoder = self.encoder.insert(encoder);
        let rows = encoder.encode_batch(&self.buffered_items)?;
        debug_assert_eq!(rows, self.buffered_items_count);

        debug!(
            path = %self.path.display(),
            rows,
            items_count = encoder.items_count(),
            "flushed buffer"
        );
        self.buffered_items.clear();
        self.buffered_items_count = 0;
        Ok(())
    }

    /// Flushes, then closes the encoder. Returns `None` when no file was produced.
    pub fn close(mut self) -> Result<Option<WriterMetrics>> {
        self.finish()
    }

    /// Closes the encoder without flushing. Buffered rows are discarded.
    pub fn abort(mut self) {
        self.discard();
    }

    pub(crate) fn finish(&mut self) -> Result<Option<WriterMetrics>> {
        self.flush()?;
        let encoder = match self.encoder.take() {
            Some(encoder) => encoder,
            None if self.config.write_empty_file => self.open_encoder()?,
            None => {
                info!(path = %self.path.display(), "no rows written, no file produced");
                return Ok(None);
            }
        };

        let items_count = encoder.close()?;
        let file_size = fs::metadata(&self.path)
            .map_err(|source| Error::Io {
                path: self.path.clone(),
                source,
            })?
            .len();
        info!(
            path = %self.path.display(),
            format = %self.format,
            items_count,
            file_size,
            "closed writer"
        );
        Ok(Some(WriterMetrics {
            file_path: self.path.clone(),
            items_count,
            file_size,
        }))
    }

    pub(crate) fn discard(&mut self) {
        if self.buffered_items_count > 0 {
            warn!(
                path = %self.path.display(),
                rows = self.buffered_items_count,
                "discarding buffered rows"
            );
        }
        self.buffered_items.clear();
        self.buffered_items_count = 0;
        if let Some(encoder) = self.encoder.take() {
            if let Err(err) = encoder.close() {
                warn!(path = %self.path.display(), error = %err, "failed to close encoder");
            }
        }
    }
}
