use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::naming::Naming;
use crate::schema::{ColumnSchema, TableSchema};
use crate::writer::FileFormat;

/// Rows buffered before the writer flushes on its own.
pub const DEFAULT_BUFFER_MAX_ITEMS: usize = 5000;
pub const DEFAULT_ROW_GROUP_SIZE: usize = 1024 * 1024;

/// Tuning for a [`crate::BufferedDataWriter`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    /// Flush once this many rows are buffered. `None` flushes only on request.
    pub buffer_max_items: Option<usize>,
    /// Produce a valid empty file when a writer is closed without any rows.
    pub write_empty_file: bool,
    pub csv: CsvConfig,
    pub parquet: ParquetConfig,
    pub insert_values: InsertValuesConfig,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            buffer_max_items: Some(DEFAULT_BUFFER_MAX_ITEMS),
            write_empty_file: false,
            csv: CsvConfig::default(),
            parquet: ParquetConfig::default(),
            insert_values: InsertValuesConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CsvConfig {
    pub delimiter: char,
    pub include_header: bool,
}

impl Default for CsvConfig {
    fn default() -> Self {
        Self {
            delimiter: ',',
            include_header: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParquetConfig {
    /// Upper bound on rows per row group.
    pub row_group_size: usize,
}

impl Default for ParquetConfig {
    fn default() -> Self {
        Self {
            row_group_size: DEFAULT_ROW_GROUP_SIZE,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InsertValuesConfig {
    /// Target table of the statements. Defaults to the output file stem.
    pub table_name: Option<String>,
}

impl WriterConfig {
    pub fn validate(&self) -> crate::Result<()> {
        let invalid = |details: &'static str| Error::InvalidConfig {
            details: Cow::Borrowed(details),
        };
        if self.buffer_max_items == Some(0) {
            return Err(invalid("buffer_max_items must be at least 1"));
        }
        if !self.csv.delimiter.is_ascii() {
            return Err(Error::InvalidConfig {
                details: Cow::Owned(format!(
                    "csv delimiter {:?} is not an ascii character",
                    self.csv.delimiter
                )),
            });
        }
        if self.parquet.row_group_size == 0 {
            return Err(invalid("parquet row_group_size must be at least 1"));
        }
        if self
            .insert_values
            .table_name
            .as_deref()
            .is_some_and(|t| t.trim().is_empty())
        {
            return Err(invalid("insert_values table_name must not be empty"));
        }
        Ok(())
    }
}

/// A conversion run of the `itemw` binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub name: String,
    pub input: InputConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub naming: Naming,
    /// Declared output columns. When empty they are inferred from the input.
    #[serde(default)]
    pub columns: Vec<ColumnSchema>,
    #[serde(default)]
    pub writer: WriterConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    Jsonl,
    Parquet,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    /// File path or glob pattern.
    pub path: String,
    /// Taken from the file extension when omitted.
    pub kind: Option<InputKind>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Rows read up front to infer columns when none are declared.
    #[serde(default = "default_infer_rows")]
    pub infer_rows: usize,
}

fn default_batch_size() -> usize {
    1000
}

fn default_infer_rows() -> usize {
    10_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub path: PathBuf,
    /// Taken from the file extension when omitted.
    pub format: Option<FileFormat>,
}

impl InputConfig {
    pub fn kind_for(&self, path: &Path) -> anyhow::Result<InputKind> {
        if let Some(kind) = self.kind {
            return Ok(kind);
        }
        match path.extension().and_then(|e| e.to_str()) {
            Some("jsonl" | "json") => Ok(InputKind::Jsonl),
            Some("parquet") => Ok(InputKind::Parquet),
            _ => anyhow::bail!("Cannot tell input kind of {:?}; set input.kind", path),
        }
    }
}

impl OutputConfig {
    pub fn resolved_format(&self) -> anyhow::Result<FileFormat> {
        self.format
            .or_else(|| FileFormat::from_path(&self.path))
            .with_context(|| format!("Cannot tell output format of {:?}; set output.format", self.path))
    }
}

impl RunConfig {
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> anyhow::Result<Self> {
        let config: RunConfig =
            serde_yaml::from_str(content).context("Failed to parse YAML configuration")?;

        config.validate()?;
        Ok(config)
    }

    /// Declared columns with names passed through the configured naming convention.
    pub fn table_schema(&self) -> TableSchema {
        TableSchema::from_columns(self.columns.iter().cloned()).normalize_names(&self.naming)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.name.trim().is_empty() {
            anyhow::bail!("Run name must not be empty");
        }
        if self.input.batch_size == 0 {
            anyhow::bail!("input.batch_size must be at least 1");
        }
        self.naming.validate().context("Invalid naming section")?;

        let mut names = std::collections::HashSet::new();
        for column in &self.columns {
            if !names.insert(self.naming.normalize_identifier(&column.name)) {
                anyhow::bail!("Duplicate column after normalization: {}", column.name);
            }
        }

        self.output.resolved_format()?;
        self.writer.validate().context("Invalid writer section")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::DataType;

    const CONFIG: &str = r#"
name: events
input:
  path: data/*.jsonl
output:
  path: out/events.parquet
naming:
  max_length: 32
columns:
  - name: userId
    type: bigint
    nullable: false
  - name: Created At
    type: timestamp
writer:
  buffer_max_items: 100
  parquet:
    row_group_size: 10
"#;

    #[test]
    fn parses_run_config() {
        let config = RunConfig::from_yaml_str(CONFIG).unwrap();
        assert_eq!(config.input.batch_size, 1000);
        assert_eq!(config.input.infer_rows, 10_000);
        assert_eq!(config.output.resolved_format().unwrap(), FileFormat::Parquet);
        assert_eq!(config.writer.buffer_max_items, Some(100));
        assert_eq!(config.writer.parquet.row_group_size, 10);
        assert!(config.writer.csv.include_header);

        let schema = config.table_schema();
        let names: Vec<_> = schema.names().collect();
        assert_eq!(names, ["user_id", "created_at"]);
        assert_eq!(schema.get("user_id").unwrap().data_type, DataType::Bigint);
        assert!(!schema.get("user_id").unwrap().nullable);
    }

    #[test]
    fn rejects_colliding_columns() {
        let yaml = r#"
name: dup
input: { path: a.jsonl }
output: { path: b.csv }
columns:
  - { name: userId, type: text }
  - { name: user_id, type: text }
"#;
        assert!(RunConfig::from_yaml_str(yaml).is_err());
    }

    #[test]
    fn rejects_too_short_max_length() {
        let yaml = "name: x\ninput: { path: a.jsonl }\noutput: { path: b.csv }\nnaming: { max_length: 4 }\n";
        let err = RunConfig::from_yaml_str(yaml).unwrap_err();
        assert!(format!("{err:#}").contains("max_length"), "{err:#}");
    }

    #[test]
    fn rejects_unknown_output_format() {
        let yaml = "name: x\ninput: { path: a.jsonl }\noutput: { path: b.xml }\n";
        assert!(RunConfig::from_yaml_str(yaml).is_err());
    }

    #[test]
    fn writer_config_defaults_and_validation() {
        let config = WriterConfig::default();
        assert_eq!(config.buffer_max_items, Some(DEFAULT_BUFFER_MAX_ITEMS));
        assert!(config.validate().is_ok());

        let zero = WriterConfig {
            buffer_max_items: Some(0),
            ..WriterConfig::default()
        };
        assert!(matches!(zero.validate(), Err(Error::InvalidConfig { .. })));

        let mut tab = WriterConfig::default();
        tab.csv.delimiter = '\t';
        assert!(tab.validate().is_ok());
        tab.csv.delimiter = 'é';
        assert!(tab.validate().is_err());
    }
}
