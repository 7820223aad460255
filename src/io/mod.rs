use anyhow::{Context, Result};
use arrow::datatypes::{Field, Schema};
use arrow::record_batch::RecordBatch;
use item_writer::{DataItem, Naming, Record};
use parquet::file::reader::SerializedFileReader;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use item_writer::config::InputKind;

/// Expands a path or glob pattern into the matching files, sorted.
pub fn expand_inputs(pattern: &str) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in glob::glob(pattern).with_context(|| format!("Invalid input pattern: {pattern}"))? {
        let path = entry.context("Failed to read input path")?;
        if path.is_file() {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// Reads one input file as a sequence of data items of at most `batch_size` rows.
pub fn read_input(
    path: &Path,
    kind: InputKind,
    batch_size: usize,
) -> Result<Box<dyn Iterator<Item = Result<DataItem>>>> {
    match kind {
        InputKind::Jsonl => Ok(Box::new(read_jsonl(path, batch_size)?)),
        InputKind::Parquet => read_parquet(path, batch_size),
    }
}

/// Lazily reads a JSONL file in chunks of records.
pub struct JsonlChunks {
    lines: Lines<BufReader<File>>,
    path: PathBuf,
    line_no: usize,
    batch_size: usize,
}

fn read_jsonl(path: &Path, batch_size: usize) -> Result<JsonlChunks> {
    let file = File::open(path).with_context(|| format!("Failed to open input: {:?}", path))?;
    Ok(JsonlChunks {
        lines: BufReader::new(file).lines(),
        path: path.to_path_buf(),
        line_no: 0,
        batch_size,
    })
}

impl JsonlChunks {
    fn parse_line(&self, line: &str) -> Result<Record> {
        let value: serde_json::Value = serde_json::from_str(line)
            .with_context(|| format!("{}:{}: invalid JSON", self.path.display(), self.line_no))?;
        Record::from_value(value).with_context(|| {
            format!("{}:{}: expected a JSON object", self.path.display(), self.line_no)
        })
    }
}

impl Iterator for JsonlChunks {
    type Item = Result<DataItem>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut records = Vec::with_capacity(self.batch_size);
        while records.len() < self.batch_size {
            let line = match self.lines.next() {
                Some(Ok(line)) => line,
                Some(Err(e)) => return Some(Err(e.into())),
                None if records.is_empty() => return None,
                None => break,
            };
            self.line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            match self.parse_line(&line) {
                Ok(record) => records.push(record),
                Err(e) => return Some(Err(e)),
            }
        }
        Some(Ok(DataItem::Records(records)))
    }
}

fn read_parquet(path: &Path, batch_size: usize) -> Result<Box<dyn Iterator<Item = Result<DataItem>>>> {
    let file = File::open(path).with_context(|| format!("Failed to open input: {:?}", path))?;
    let file_reader = Arc::new(SerializedFileReader::new(file)?);
    let mut arrow_reader = parquet::arrow::ParquetFileArrowReader::new(file_reader);

    let batches = parquet::arrow::ArrowReader::get_record_reader(&mut arrow_reader, batch_size)?;
    Ok(Box::new(batches.map(|batch| {
        batch.map(DataItem::Batch).map_err(anyhow::Error::from)
    })))
}

/// Passes record keys and batch field names through `naming`.
pub fn normalize_item(item: DataItem, naming: &Naming) -> Result<DataItem> {
    Ok(match item {
        DataItem::Record(record) => DataItem::Record(record.normalize_keys(naming)),
        DataItem::Records(records) => DataItem::Records(
            records
                .into_iter()
                .map(|r| r.normalize_keys(naming))
                .collect(),
        ),
        DataItem::Batch(batch) => DataItem::Batch(normalize_batch(&batch, naming)?),
        DataItem::Batches(batches) => DataItem::Batches(
            batches
                .iter()
                .map(|b| normalize_batch(b, naming))
                .collect::<Result<_>>()?,
        ),
    })
}

fn normalize_batch(batch: &RecordBatch, naming: &Naming) -> Result<RecordBatch> {
    let schema = batch.schema();
    let fields: Vec<Field> = schema
        .fields()
        .iter()
        .map(|f| {
            Field::new(
                &naming.normalize_identifier(f.name()),
                f.data_type().clone(),
                f.is_nullable(),
            )
        })
        .collect();
    RecordBatch::try_new(Arc::new(Schema::new(fields)), batch.columns().to_vec())
        .context("Failed to rename batch fields")
}
