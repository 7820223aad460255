use anyhow::{Context, Result};
use arrow::compute::cast;
use arrow::record_batch::RecordBatch;
use indicatif::{ProgressBar, ProgressStyle};
use item_writer::config::RunConfig;
use item_writer::{new_column, ColumnSchema, DataItem, DataType, TableSchema, WriterSession};
use serde_json::Value;
use std::path::PathBuf;

use crate::io;

mod manifest;
pub use manifest::Manifest;

pub fn run(config: &RunConfig) -> Result<Manifest> {
    println!("Running: {}", config.name);

    let inputs = io::expand_inputs(&config.input.path)?;
    if inputs.is_empty() {
        anyhow::bail!("No input files match {}", config.input.path);
    }
    let format = config.output.resolved_format()?;
    let output = &config.output.path;
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output directory: {:?}", parent))?;
    }

    let declared = config.table_schema();
    println!("  Reading {} input files", inputs.len());
    let initial = if declared.is_empty() {
        println!(
            "  No columns declared, inferring them from the first {} rows",
            config.input.infer_rows
        );
        sample_columns(config, &inputs)?
    } else {
        declared.clone()
    };

    let pb = ProgressBar::new(inputs.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files ({percent}%)",
            )
            .context("Invalid progress bar template")?,
    );

    let mut manifest = Manifest::new(config.name.clone(), format);
    let mut session = WriterSession::with_config(config.writer.clone(), format, output, &initial)?;

    for path in &inputs {
        let kind = config.input.kind_for(path)?;
        let mut rows = 0;
        for item in io::read_input(path, kind, config.input.batch_size)? {
            let item = io::normalize_item(item?, &config.naming)?;
            let columns = if declared.is_empty() {
                let known = session.writer().columns().cloned().unwrap_or_default();
                infer_columns(&item, &known)?
            } else {
                declared.clone()
            };
            let item = cast_batches(item, &columns)?;
            rows += item.row_count();
            session
                .writer_mut()
                .write_data_item(item, &columns)
                .with_context(|| format!("Failed to write rows from {:?}", path))?;
        }
        manifest.add_input(path, rows);
        pb.inc(1);
    }
    pb.finish_with_message("All inputs read");

    manifest.output = session.close().context("Failed to close output")?;
    match &manifest.output {
        Some(metrics) => println!(
            "  ✓ Wrote {} rows ({} bytes) to {}",
            metrics.items_count,
            metrics.file_size,
            metrics.file_path.display()
        ),
        None => println!("  No rows to write, no output file produced"),
    }

    let manifest_path = Manifest::path_for(output);
    manifest.write_to_file(&manifest_path)?;
    println!("  ✓ Manifest written to: {}", manifest_path.display());

    Ok(manifest)
}

/// Columns inferred from the first `input.infer_rows` rows of the inputs.
fn sample_columns(config: &RunConfig, inputs: &[PathBuf]) -> Result<TableSchema> {
    let limit = config.input.infer_rows;
    let mut columns = TableSchema::new();
    let mut null_only = Vec::new();
    let mut sampled = 0;
    'inputs: for path in inputs {
        let kind = config.input.kind_for(path)?;
        for item in io::read_input(path, kind, config.input.batch_size)? {
            if sampled >= limit {
                break 'inputs;
            }
            let item = io::normalize_item(item?, &config.naming)?;
            sampled += item.row_count();
            let (seen, nulls) = item_types(&item, &columns)?;
            for column in &seen {
                columns.insert(column.clone());
            }
            null_only.extend(nulls);
        }
    }
    fill_null_only(&mut columns, &TableSchema::new(), null_only);
    Ok(columns)
}

/// Columns describing `item`, widened against the `known` columns.
fn infer_columns(item: &DataItem, known: &TableSchema) -> Result<TableSchema> {
    let (mut columns, null_only) = item_types(item, known)?;
    fill_null_only(&mut columns, known, null_only);
    Ok(columns)
}

/// Types the keys of `item`. Also returns the keys seen only as null.
fn item_types(item: &DataItem, known: &TableSchema) -> Result<(TableSchema, Vec<String>)> {
    let mut columns = TableSchema::new();
    let mut null_only = Vec::new();
    let records = match item {
        DataItem::Record(record) => std::slice::from_ref(record),
        DataItem::Records(records) => records.as_slice(),
        DataItem::Batch(batch) => {
            for column in &TableSchema::from_arrow(&batch.schema())? {
                widen(&mut columns, known, column.clone());
            }
            return Ok((columns, null_only));
        }
        DataItem::Batches(batches) => {
            for batch in batches {
                for column in &TableSchema::from_arrow(&batch.schema())? {
                    widen(&mut columns, known, column.clone());
                }
            }
            return Ok((columns, null_only));
        }
    };
    for record in records {
        for (name, value) in record.iter() {
            match value_type(value) {
                Some(seen) => widen(&mut columns, known, new_column(name.clone(), seen)),
                None => null_only.push(name.clone()),
            }
        }
    }
    Ok((columns, null_only))
}

/// Adds `column`, widening its type against what `columns` or `known` hold for it.
fn widen(columns: &mut TableSchema, known: &TableSchema, mut column: ColumnSchema) {
    let current = columns.get(&column.name).or_else(|| known.get(&column.name));
    if let Some(current) = current {
        column.data_type = unify(current.data_type, column.data_type);
    }
    columns.insert(column);
}

/// Integers and doubles widen to double. Any other conflict becomes complex.
fn unify(current: DataType, seen: DataType) -> DataType {
    match (current, seen) {
        (a, b) if a == b => a,
        (DataType::Bigint | DataType::Double, DataType::Bigint | DataType::Double) => {
            DataType::Double
        }
        _ => DataType::Complex,
    }
}

/// Keys seen only as null keep their known type, or become text.
fn fill_null_only(columns: &mut TableSchema, known: &TableSchema, null_only: Vec<String>) {
    for name in null_only {
        if columns.get(&name).is_none() {
            let data_type = known.get(&name).map_or(DataType::Text, |c| c.data_type);
            columns.insert(new_column(name, data_type));
        }
    }
}

fn value_type(value: &Value) -> Option<DataType> {
    match value {
        Value::Null => None,
        Value::Bool(_) => Some(DataType::Bool),
        Value::Number(n) if n.is_i64() => Some(DataType::Bigint),
        Value::Number(_) => Some(DataType::Double),
        Value::String(_) => Some(DataType::Text),
        Value::Array(_) | Value::Object(_) => Some(DataType::Complex),
    }
}

/// Casts batch fields onto the arrow types of their columns.
fn cast_batches(item: DataItem, columns: &TableSchema) -> Result<DataItem> {
    Ok(match item {
        DataItem::Batch(batch) => DataItem::Batch(cast_batch(&batch, columns)?),
        DataItem::Batches(batches) => DataItem::Batches(
            batches
                .iter()
                .map(|b| cast_batch(b, columns))
                .collect::<Result<_>>()?,
        ),
        records => records,
    })
}

fn cast_batch(batch: &RecordBatch, columns: &TableSchema) -> Result<RecordBatch> {
    let schema = batch.schema();
    let mut fields = Vec::with_capacity(schema.fields().len());
    let mut arrays = Vec::with_capacity(schema.fields().len());
    for (field, array) in schema.fields().iter().zip(batch.columns()) {
        match columns.get(field.name()) {
            Some(column) if !column.data_type.accepts_arrow(array.data_type()) => {
                let target = column.data_type.to_arrow();
                let cast_array = cast(array, &target).with_context(|| {
                    format!("Cannot cast field {} to {}", field.name(), column.data_type)
                })?;
                fields.push(arrow::datatypes::Field::new(
                    field.name(),
                    target,
                    field.is_nullable(),
                ));
                arrays.push(cast_array);
            }
            _ => {
                fields.push(field.clone());
                arrays.push(array.clone());
            }
        }
    }
    RecordBatch::try_new(
        std::sync::Arc::new(arrow::datatypes::Schema::new(fields)),
        arrays,
    )
    .context("Failed to rebuild batch")
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Int32Array;
    use arrow::datatypes::{DataType as ArrowType, Field, Schema};
    use item_writer::Record;
    use std::io::Write;
    use std::sync::Arc;

    #[test]
    fn infers_record_columns() {
        let records = vec![
            Record::new().with("id", 1).with("score", 1).with("note", Value::Null),
            Record::new().with("id", 2).with("score", 2.5).with("tags", serde_json::json!(["a"])),
        ];
        let columns = infer_columns(&DataItem::Records(records), &TableSchema::new()).unwrap();
        let names: Vec<_> = columns.names().collect();
        assert_eq!(names, ["id", "score", "tags", "note"]);
        assert_eq!(columns.get("id").unwrap().data_type, DataType::Bigint);
        assert_eq!(columns.get("score").unwrap().data_type, DataType::Double);
        assert_eq!(columns.get("tags").unwrap().data_type, DataType::Complex);
        assert_eq!(columns.get("note").unwrap().data_type, DataType::Text);
    }

    #[test]
    fn narrow_integers_are_widened() {
        let schema = Arc::new(Schema::new(vec![Field::new("n", ArrowType::Int32, true)]));
        let batch =
            RecordBatch::try_new(schema, vec![Arc::new(Int32Array::from(vec![1, 2]))]).unwrap();
        let columns = infer_columns(&DataItem::Batch(batch.clone()), &TableSchema::new()).unwrap();
        assert_eq!(columns.get("n").unwrap().data_type, DataType::Bigint);

        let cast = cast_batch(&batch, &columns).unwrap();
        assert_eq!(cast.schema().field(0).data_type(), &ArrowType::Int64);
        assert_eq!(cast.num_rows(), 2);
    }

    #[test]
    fn later_chunks_widen_against_known_columns() {
        let known = TableSchema::from_columns([
            new_column("score", DataType::Double),
            new_column("tag", DataType::Complex),
            new_column("note", DataType::Bigint),
        ]);
        let records = vec![Record::new()
            .with("score", 3)
            .with("tag", "plain")
            .with("note", Value::Null)];
        let columns = infer_columns(&DataItem::Records(records), &known).unwrap();
        assert_eq!(columns.get("score").unwrap().data_type, DataType::Double);
        assert_eq!(columns.get("tag").unwrap().data_type, DataType::Complex);
        assert_eq!(columns.get("note").unwrap().data_type, DataType::Bigint);
    }

    #[test]
    fn sampled_rows_span_chunks_and_files() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("a.jsonl");
        let mut file = std::fs::File::create(&first).unwrap();
        for n in 0..3 {
            writeln!(file, "{{\"score\": {n}, \"note\": null}}").unwrap();
        }
        std::fs::write(dir.path().join("b.jsonl"), "{\"score\": 2.5, \"note\": \"x\"}\n").unwrap();

        let yaml = format!(
            "name: t\ninput: {{ path: \"{}/*.jsonl\", batch_size: 2 }}\noutput: {{ path: out.jsonl }}\n",
            dir.path().display()
        );
        let config = RunConfig::from_yaml_str(&yaml).unwrap();
        let inputs = io::expand_inputs(&config.input.path).unwrap();
        let columns = sample_columns(&config, &inputs).unwrap();
        assert_eq!(columns.get("score").unwrap().data_type, DataType::Double);
        assert_eq!(columns.get("note").unwrap().data_type, DataType::Text);

        let mut limited = config.clone();
        limited.input.infer_rows = 2;
        let columns = sample_columns(&limited, &inputs).unwrap();
        assert_eq!(columns.get("score").unwrap().data_type, DataType::Bigint);
    }
}
