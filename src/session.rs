//! Scoped ownership of a [`BufferedDataWriter`] bound to one output file.

use std::path::PathBuf;

use crate::buffered::{BufferedDataWriter, WriterMetrics};
use crate::config::WriterConfig;
use crate::error::Result;
use crate::schema::TableSchema;
use crate::writer::FileFormat;

/// Owns a writer and makes sure its encoder is closed on every exit path.
///
/// Dropping a session that was not closed releases the encoder without
/// flushing; rows still buffered are lost and a warning is logged.
#[derive(Debug)]
pub struct WriterSession {
    writer: BufferedDataWriter,
}

impl WriterSession {
    pub fn with_config(
        config: WriterConfig,
        format: FileFormat,
        path: impl Into<PathBuf>,
        columns: &TableSchema,
    ) -> Result<Self> {
        let mut writer = BufferedDataWriter::new(format, path, config)?;
        if !columns.is_empty() {
            writer.update_columns(columns)?;
        }
        Ok(Self { writer })
    }

    pub const fn writer(&self) -> &BufferedDataWriter {
        &self.writer
    }

    pub fn writer_mut(&mut self) -> &mut BufferedDataWriter {
        &mut self.writer
    }

    /// Flushes what is buffered and closes the encoder.
    pub fn close(mut self) -> Result<Option<WriterMetrics>> {
        self.writer.finish()
    }

    /// Closes the encoder without flushing.
    pub fn abort(mut self) {
        self.writer.discard();
    }
}

impl Drop for WriterSession {
    fn drop(&mut self) {
        // no-op after close: the encoder has already been taken
        self.writer.discard();
    }
}

/// Opens a session with the default writer configuration.
pub fn get_writer(
    format: FileFormat,
    path: impl Into<PathBuf>,
    columns: &TableSchema,
) -> Result<WriterSession> {
    WriterSession::with_config(WriterConfig::default(), format, path, columns)
}

/// Runs `f` against a fresh writer. The file is closed when `f` succeeds and
/// the writer is aborted when it fails.
pub fn with_writer<T, F>(
    config: WriterConfig,
    format: FileFormat,
    path: impl Into<PathBuf>,
    columns: &TableSchema,
    f: F,
) -> Result<(T, Option<WriterMetrics>)>
where
    F: FnOnce(&mut BufferedDataWriter) -> Result<T>,
{
    let mut session = WriterSession::with_config(config, format, path, columns)?;
    match f(session.writer_mut()) {
        Ok(value) => {
            let metrics = session.close()?;
            Ok((value, metrics))
        }
        Err(err) => {
            session.abort();
            Err(err)
        }
    }
}
