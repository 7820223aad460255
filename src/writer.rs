use std::borrow::Cow;
use std::fmt;
use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::WriterConfig;
use crate::error::{Error, Result};
use crate::item::BufferedItem;
use crate::schema::TableSchema;

pub mod csv;
pub mod insert_values;
pub mod jsonl;
pub mod parquet;

pub use self::csv::CsvEncoder;
pub use self::insert_values::InsertValuesEncoder;
pub use self::jsonl::JsonlEncoder;
pub use self::parquet::ParquetEncoder;

/// On-disk formats a writer can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileFormat {
    /// Line-delimited JSON objects.
    Jsonl,
    /// Delimited text with a header row.
    Csv,
    /// Columnar binary.
    Parquet,
    /// SQL `INSERT ... VALUES` statements.
    InsertValues,
}

impl FileFormat {
    pub const ALL: [Self; 4] = [Self::Jsonl, Self::Csv, Self::Parquet, Self::InsertValues];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Jsonl => "jsonl",
            Self::Csv => "csv",
            Self::Parquet => "parquet",
            Self::InsertValues => "insert_values",
        }
    }

    /// File extension used for files of this format.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        self.as_str()
    }

    /// Whether an open file of this format can take columns added after it was opened.
    /// CSV headers and Parquet schemas are fixed once written.
    #[must_use]
    pub const fn supports_schema_evolution(self) -> bool {
        matches!(self, Self::Jsonl | Self::InsertValues)
    }

    /// Guesses the format from a file extension.
    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        let ext = path.as_ref().extension()?.to_str()?;
        match ext {
            "json" => Some(Self::Jsonl),
            other => other.parse().ok(),
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| Error::InvalidConfig {
                details: Cow::Owned(format!("unknown file format `{s}`")),
            })
    }
}

/// The output file of a text encoder. Writes go straight to the file with no
/// buffer in between, so a failed append leaves nothing queued. The file is
/// also cut back to the end of the last successful append when it can be.
#[derive(Debug)]
pub(crate) struct OutputFile {
    file: File,
    path: PathBuf,
    committed: u64,
}

impl OutputFile {
    pub(crate) fn new(file: File, path: &Path) -> Self {
        Self {
            file,
            path: path.to_path_buf(),
            committed: 0,
        }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Appends `bytes` in full or fails with [`Error::WriteFailure`].
    pub(crate) fn append(&mut self, bytes: &[u8]) -> Result<()> {
        if let Err(source) = self.file.write_all(bytes) {
            self.rollback();
            return Err(Error::write_failure(&self.path, source));
        }
        self.committed += bytes.len() as u64;
        Ok(())
    }

    fn rollback(&mut self) {
        let offset = self.committed;
        let rolled_back = self
            .file
            .set_len(offset)
            .and_then(|()| self.file.seek(SeekFrom::Start(offset)));
        if let Err(err) = rolled_back {
            // pipes and character devices cannot be truncated
            debug!(path = %self.path.display(), offset, error = %err, "output not rolled back");
        }
    }
}

/// The encoder for one open output file. Knows nothing about buffering:
/// every `encode_batch` call writes exactly the units it is given.
#[derive(Debug)]
pub enum FormatEncoder {
    Jsonl(JsonlEncoder),
    Csv(CsvEncoder),
    Parquet(ParquetEncoder),
    InsertValues(InsertValuesEncoder),
}

impl FormatEncoder {
    /// Opens an encoder of `format` that owns `file` for its whole lifetime.
    pub fn open(
        format: FileFormat,
        columns: &TableSchema,
        file: File,
        path: &Path,
        config: &WriterConfig,
    ) -> Result<Self> {
        Ok(match format {
            FileFormat::Jsonl => Self::Jsonl(JsonlEncoder::open(columns, file, path)),
            FileFormat::Csv => Self::Csv(CsvEncoder::open(columns, file, path, &config.csv)?),
            FileFormat::Parquet => {
                Self::Parquet(ParquetEncoder::open(columns, file, path, &config.parquet)?)
            }
            FileFormat::InsertValues => Self::InsertValues(InsertValuesEncoder::open(
                columns,
                file,
                path,
                &config.insert_values,
            )),
        })
    }

    #[must_use]
    pub const fn format(&self) -> FileFormat {
        match self {
            Self::Jsonl(_) => FileFormat::Jsonl,
            Self::Csv(_) => FileFormat::Csv,
            Self::Parquet(_) => FileFormat::Parquet,
            Self::InsertValues(_) => FileFormat::InsertValues,
        }
    }

    /// Rows physically written so far. Cumulative, never reset.
    #[must_use]
    pub fn items_count(&self) -> u64 {
        match self {
            Self::Jsonl(e) => e.items_count(),
            Self::Csv(e) => e.items_count(),
            Self::Parquet(e) => e.items_count(),
            Self::InsertValues(e) => e.items_count(),
        }
    }

    #[must_use]
    pub fn columns(&self) -> &TableSchema {
        match self {
            Self::Jsonl(e) => e.columns(),
            Self::Csv(e) => e.columns(),
            Self::Parquet(e) => e.columns(),
            Self::InsertValues(e) => e.columns(),
        }
    }

    /// Encodes `units` in order. All or nothing: on error no rows are counted.
    pub fn encode_batch(&mut self, units: &[BufferedItem]) -> Result<usize> {
        match self {
            Self::Jsonl(e) => e.encode_batch(units),
            Self::Csv(e) => e.encode_batch(units),
            Self::Parquet(e) => e.encode_batch(units),
            Self::InsertValues(e) => e.encode_batch(units),
        }
    }

    /// Replaces the columns of an open encoder. Only formats that support
    /// schema evolution accept this.
    pub fn update_columns(&mut self, columns: &TableSchema) -> Result<()> {
        let format = self.format();
        if !format.supports_schema_evolution() {
            let added = columns
                .names()
                .find(|name| self.columns().get(name).is_none())
                .unwrap_or_default()
                .to_string();
            return Err(Error::schema_mismatch(
                added,
                format!("{format} files cannot add columns once opened"),
            ));
        }
        match self {
            Self::Jsonl(e) => e.update_columns(columns),
            Self::InsertValues(e) => e.update_columns(columns),
            Self::Csv(_) | Self::Parquet(_) => {}
        }
        Ok(())
    }

    /// Writes any trailer/footer and releases the file. Returns the final items count.
    pub fn close(self) -> Result<u64> {
        match self {
            Self::Jsonl(e) => e.close(),
            Self::Csv(e) => e.close(),
            Self::Parquet(e) => e.close(),
            Self::InsertValues(e) => e.close(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_names_round_trip() {
        for format in FileFormat::ALL {
            assert_eq!(format.as_str().parse::<FileFormat>().unwrap(), format);
        }
        assert!("xml".parse::<FileFormat>().is_err());
    }

    #[test]
    fn format_from_path() {
        assert_eq!(FileFormat::from_path("out/a.parquet"), Some(FileFormat::Parquet));
        assert_eq!(FileFormat::from_path("a.json"), Some(FileFormat::Jsonl));
        assert_eq!(FileFormat::from_path("a.insert_values"), Some(FileFormat::InsertValues));
        assert_eq!(FileFormat::from_path("a"), None);
    }

    #[test]
    fn schema_evolution_support() {
        assert!(FileFormat::Jsonl.supports_schema_evolution());
        assert!(FileFormat::InsertValues.supports_schema_evolution());
        assert!(!FileFormat::Csv.supports_schema_evolution());
        assert!(!FileFormat::Parquet.supports_schema_evolution());
    }
}
