//! Conversions between records and Arrow batches, checked against a [`TableSchema`].

use std::sync::Arc;

use arrow::array::{
    new_null_array, Array, ArrayRef, BinaryArray, BooleanArray, Date32Array, Float32Array,
    Float64Array, Int16Array, Int32Array, Int64Array, Int8Array, LargeBinaryArray,
    LargeStringArray, StringArray, TimestampMicrosecondArray, TimestampMillisecondArray,
    TimestampNanosecondArray, TimestampSecondArray, UInt16Array, UInt32Array, UInt64Array,
    UInt8Array,
};
use arrow::datatypes::{DataType as ArrowType, TimeUnit};
use arrow::record_batch::RecordBatch;
use serde_json::{Number, Value};

use crate::error::{Error, Result};
use crate::record::Record;
use crate::schema::{
    date_days, decode_hex, encode_hex, format_date_days, format_timestamp_micros,
    timestamp_micros, ColumnSchema, DataType, TableSchema,
};
use crate::writer::FileFormat;

/// Checks every field of `record` against `columns`.
pub(crate) fn check_record(record: &Record, columns: &TableSchema, format: FileFormat) -> Result<()> {
    for (name, value) in record.iter() {
        let column = columns
            .get(name)
            .ok_or_else(|| Error::encoding(format, format!("field `{name}` is not a known column")))?;
        column
            .check_value(value)
            .map_err(|details| Error::encoding(format, details))?;
    }
    for column in columns {
        if !column.nullable && record.get(&column.name).is_none() {
            return Err(Error::encoding(
                format,
                format!("missing value for non-nullable column `{}`", column.name),
            ));
        }
    }
    Ok(())
}

/// Renders a checked record value as text for the delimited and statement formats.
/// `None` stands for null.
pub(crate) fn value_text(column: &ColumnSchema, value: &Value) -> Option<String> {
    if value.is_null() {
        return None;
    }
    Some(match (column.data_type, value) {
        (DataType::Complex, v) => v.to_string(),
        (DataType::Timestamp, v) => timestamp_micros(v)
            .and_then(format_timestamp_micros)
            .unwrap_or_else(|| v.to_string()),
        (_, Value::String(s)) => s.clone(),
        (_, v) => v.to_string(),
    })
}

/// Builds one batch from checked records, with one array per column in column order.
pub(crate) fn records_to_batch(
    records: &[&Record],
    columns: &TableSchema,
    format: FileFormat,
) -> Result<RecordBatch> {
    for record in records {
        check_record(record, columns, format)?;
    }

    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(columns.len());
    for column in columns {
        let values = records
            .iter()
            .map(|r| r.get(&column.name).filter(|v| !v.is_null()));
        let array: ArrayRef = match column.data_type {
            DataType::Text => Arc::new(StringArray::from(
                values.map(|v| v.and_then(Value::as_str)).collect::<Vec<_>>(),
            )),
            DataType::Complex => {
                let texts: Vec<Option<String>> = values.map(|v| v.map(Value::to_string)).collect();
                Arc::new(StringArray::from(
                    texts.iter().map(Option::as_deref).collect::<Vec<_>>(),
                ))
            }
            DataType::Bigint => Arc::new(Int64Array::from(
                values.map(|v| v.and_then(Value::as_i64)).collect::<Vec<_>>(),
            )),
            DataType::Double => Arc::new(Float64Array::from(
                values.map(|v| v.and_then(Value::as_f64)).collect::<Vec<_>>(),
            )),
            DataType::Bool => Arc::new(BooleanArray::from(
                values.map(|v| v.and_then(Value::as_bool)).collect::<Vec<_>>(),
            )),
            DataType::Timestamp => Arc::new(TimestampMicrosecondArray::from(
                values.map(|v| v.and_then(timestamp_micros)).collect::<Vec<_>>(),
            )),
            DataType::Date => Arc::new(Date32Array::from(
                values.map(|v| v.and_then(date_days)).collect::<Vec<_>>(),
            )),
            DataType::Binary => {
                let bytes: Vec<Option<Vec<u8>>> = values
                    .map(|v| v.and_then(Value::as_str).and_then(decode_hex))
                    .collect();
                Arc::new(BinaryArray::from(
                    bytes.iter().map(Option::as_deref).collect::<Vec<_>>(),
                ))
            }
        };
        arrays.push(array);
    }

    RecordBatch::try_new(columns.to_arrow(), arrays)
        .map_err(|e| Error::encoding(format, e.to_string()))
}

/// Reshapes a caller's batch onto `columns`: fields are reordered, missing
/// nullable columns are filled with nulls. Extra fields, type mismatches and
/// nulls in non-nullable columns are rejected.
pub(crate) fn conform_batch(
    batch: &RecordBatch,
    columns: &TableSchema,
    format: FileFormat,
) -> Result<RecordBatch> {
    let schema = batch.schema();
    for field in schema.fields() {
        if columns.get(field.name()).is_none() {
            return Err(Error::encoding(
                format,
                format!("batch field `{}` is not a known column", field.name()),
            ));
        }
    }

    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(columns.len());
    for column in columns {
        let array = match schema.index_of(&column.name) {
            Ok(idx) => {
                let array = batch.column(idx).clone();
                if !column.data_type.accepts_arrow(array.data_type()) {
                    return Err(Error::encoding(
                        format,
                        format!(
                            "batch field `{}` has arrow type {:?}, column expects {}",
                            column.name,
                            array.data_type(),
                            column.data_type
                        ),
                    ));
                }
                array
            }
            Err(_) => new_null_array(&column.data_type.to_arrow(), batch.num_rows()),
        };
        if !column.nullable && array.null_count() > 0 {
            return Err(Error::encoding(
                format,
                format!("null value in non-nullable column `{}`", column.name),
            ));
        }
        arrays.push(array);
    }

    RecordBatch::try_new(columns.to_arrow(), arrays)
        .map_err(|e| Error::encoding(format, e.to_string()))
}

/// Converts every row of `batch` into a record, then checks it against `columns`.
pub(crate) fn batch_to_records(
    batch: &RecordBatch,
    columns: &TableSchema,
    format: FileFormat,
) -> Result<Vec<Record>> {
    let schema = batch.schema();
    let mut records = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        let mut record = Record::new();
        for (idx, field) in schema.fields().iter().enumerate() {
            let is_complex = columns
                .get(field.name())
                .is_some_and(|c| c.data_type == DataType::Complex);
            // complex values travel as JSON text inside arrow
            let value = match arrow_value(batch.column(idx), row, format)? {
                Value::String(text) if is_complex => {
                    serde_json::from_str(&text).unwrap_or(Value::String(text))
                }
                other => other,
            };
            record.set(field.name().clone(), value);
        }
        check_record(&record, columns, format)?;
        records.push(record);
    }
    Ok(records)
}

fn downcast<'a, T: 'static>(array: &'a ArrayRef, format: FileFormat) -> Result<&'a T> {
    array.as_any().downcast_ref::<T>().ok_or_else(|| {
        Error::encoding(
            format,
            format!("array does not match its arrow type {:?}", array.data_type()),
        )
    })
}

fn float_value(v: f64, format: FileFormat) -> Result<Value> {
    Number::from_f64(v)
        .map(Value::Number)
        .ok_or_else(|| Error::encoding(format, format!("non-finite float {v}")))
}

fn timestamp_value(micros: i64, format: FileFormat) -> Result<Value> {
    format_timestamp_micros(micros)
        .map(Value::String)
        .ok_or_else(|| Error::encoding(format, format!("timestamp {micros} is out of range")))
}

fn arrow_value(array: &ArrayRef, row: usize, format: FileFormat) -> Result<Value> {
    if array.is_null(row) {
        return Ok(Value::Null);
    }
    Ok(match array.data_type() {
        ArrowType::Utf8 => Value::from(downcast::<StringArray>(array, format)?.value(row)),
        ArrowType::LargeUtf8 => {
            Value::from(downcast::<LargeStringArray>(array, format)?.value(row))
        }
        ArrowType::Boolean => Value::from(downcast::<BooleanArray>(array, format)?.value(row)),
        ArrowType::Int8 => Value::from(downcast::<Int8Array>(array, format)?.value(row)),
        ArrowType::Int16 => Value::from(downcast::<Int16Array>(array, format)?.value(row)),
        ArrowType::Int32 => Value::from(downcast::<Int32Array>(array, format)?.value(row)),
        ArrowType::Int64 => Value::from(downcast::<Int64Array>(array, format)?.value(row)),
        ArrowType::UInt8 => Value::from(downcast::<UInt8Array>(array, format)?.value(row)),
        ArrowType::UInt16 => Value::from(downcast::<UInt16Array>(array, format)?.value(row)),
        ArrowType::UInt32 => Value::from(downcast::<UInt32Array>(array, format)?.value(row)),
        ArrowType::UInt64 => Value::from(downcast::<UInt64Array>(array, format)?.value(row)),
        ArrowType::Float32 => {
            float_value(f64::from(downcast::<Float32Array>(array, format)?.value(row)), format)?
        }
        ArrowType::Float64 => {
            float_value(downcast::<Float64Array>(array, format)?.value(row), format)?
        }
        ArrowType::Timestamp(TimeUnit::Second, _) => timestamp_value(
            downcast::<TimestampSecondArray>(array, format)?.value(row).saturating_mul(1_000_000),
            format,
        )?,
        ArrowType::Timestamp(TimeUnit::Millisecond, _) => timestamp_value(
            downcast::<TimestampMillisecondArray>(array, format)?.value(row).saturating_mul(1_000),
            format,
        )?,
        ArrowType::Timestamp(TimeUnit::Microsecond, _) => timestamp_value(
            downcast::<TimestampMicrosecondArray>(array, format)?.value(row),
            format,
        )?,
        ArrowType::Timestamp(TimeUnit::Nanosecond, _) => timestamp_value(
            downcast::<TimestampNanosecondArray>(array, format)?.value(row) / 1_000,
            format,
        )?,
        ArrowType::Date32 => {
            let days = downcast::<Date32Array>(array, format)?.value(row);
            format_date_days(days).map(Value::String).ok_or_else(|| {
                Error::encoding(format, format!("date {days} is out of range"))
            })?
        }
        ArrowType::Binary => {
            Value::String(encode_hex(downcast::<BinaryArray>(array, format)?.value(row)))
        }
        ArrowType::LargeBinary => {
            Value::String(encode_hex(downcast::<LargeBinaryArray>(array, format)?.value(row)))
        }
        other => {
            return Err(Error::encoding(
                format,
                format!("unsupported arrow type {other:?}"),
            ))
        }
    })
}
