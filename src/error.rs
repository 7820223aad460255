use std::borrow::Cow;
use std::io;
use std::path::PathBuf;

use parquet::errors::ParquetError;

use crate::writer::FileFormat;

/// Result type used across the item writer.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the buffered writer and its format encoders.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A later write supplied columns that conflict with the ones already in use.
    #[error("schema mismatch on column `{column}`: {details}")]
    SchemaMismatch {
        column: String,
        details: Cow<'static, str>,
    },

    /// A batch holds a value the active format cannot represent. The whole batch is rejected.
    #[error("cannot encode {format} batch: {details}")]
    Encoding {
        format: FileFormat,
        details: Cow<'static, str>,
    },

    /// The output target rejected a write (disk full, permissions, closed handle).
    #[error("write to {} failed: {source}", path.display())]
    WriteFailure {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failure opening an output file or reading an input file.
    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Writer configuration values that cannot be honoured.
    #[error("invalid writer configuration: {details}")]
    InvalidConfig { details: Cow<'static, str> },
}

impl Error {
    pub(crate) fn encoding(format: FileFormat, details: impl Into<Cow<'static, str>>) -> Self {
        Self::Encoding {
            format,
            details: details.into(),
        }
    }

    pub(crate) fn schema_mismatch(
        column: impl Into<String>,
        details: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::SchemaMismatch {
            column: column.into(),
            details: details.into(),
        }
    }

    pub(crate) fn write_failure(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::WriteFailure {
            path: path.into(),
            source,
        }
    }

    /// Parquet reports both I/O and encoding problems through one error type;
    /// anything coming out of the file writer is treated as a write failure.
    pub(crate) fn from_parquet(path: impl Into<PathBuf>, err: ParquetError) -> Self {
        Self::write_failure(path, io::Error::new(io::ErrorKind::Other, err.to_string()))
    }

    #[must_use]
    pub const fn is_schema_mismatch(&self) -> bool {
        matches!(self, Self::SchemaMismatch { .. })
    }

    #[must_use]
    pub const fn is_encoding(&self) -> bool {
        matches!(self, Self::Encoding { .. })
    }

    #[must_use]
    pub const fn is_write_failure(&self) -> bool {
        matches!(self, Self::WriteFailure { .. })
    }
}
