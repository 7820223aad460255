//! Column schema: the ordered set of columns a writer encodes.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use arrow::datatypes::{DataType as ArrowType, Field, Schema, SchemaRef, TimeUnit};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::{Date, Month, OffsetDateTime};

use crate::error::{Error, Result};
use crate::naming::Naming;

/// Logical column types understood by every format encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Text,
    Bigint,
    Double,
    Bool,
    Timestamp,
    Date,
    Binary,
    /// Nested JSON value, stored as JSON text by non-JSON formats.
    Complex,
}

impl DataType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Bigint => "bigint",
            Self::Double => "double",
            Self::Bool => "bool",
            Self::Timestamp => "timestamp",
            Self::Date => "date",
            Self::Binary => "binary",
            Self::Complex => "complex",
        }
    }

    /// Arrow type used for this column in columnar batches.
    #[must_use]
    pub fn to_arrow(self) -> ArrowType {
        match self {
            Self::Text | Self::Complex => ArrowType::Utf8,
            Self::Bigint => ArrowType::Int64,
            Self::Double => ArrowType::Float64,
            Self::Bool => ArrowType::Boolean,
            Self::Timestamp => ArrowType::Timestamp(TimeUnit::Microsecond, None),
            Self::Date => ArrowType::Date32,
            Self::Binary => ArrowType::Binary,
        }
    }

    /// Maps an Arrow type back onto a logical type, if it has one.
    #[must_use]
    pub fn from_arrow(data_type: &ArrowType) -> Option<Self> {
        Some(match data_type {
            ArrowType::Utf8 | ArrowType::LargeUtf8 => Self::Text,
            ArrowType::Int8
            | ArrowType::Int16
            | ArrowType::Int32
            | ArrowType::Int64
            | ArrowType::UInt8
            | ArrowType::UInt16
            | ArrowType::UInt32 => Self::Bigint,
            ArrowType::Float32 | ArrowType::Float64 => Self::Double,
            ArrowType::Boolean => Self::Bool,
            ArrowType::Timestamp(_, _) => Self::Timestamp,
            ArrowType::Date32 => Self::Date,
            ArrowType::Binary | ArrowType::LargeBinary => Self::Binary,
            _ => return None,
        })
    }

    /// Whether an Arrow array of `data_type` can be written to a column of this type as is.
    #[must_use]
    pub fn accepts_arrow(self, data_type: &ArrowType) -> bool {
        self.to_arrow() == *data_type
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "text" => Self::Text,
            "bigint" => Self::Bigint,
            "double" => Self::Double,
            "bool" => Self::Bool,
            "timestamp" => Self::Timestamp,
            "date" => Self::Date,
            "binary" => Self::Binary,
            "complex" => Self::Complex,
            other => {
                return Err(Error::InvalidConfig {
                    details: Cow::Owned(format!("unknown column type `{other}`")),
                })
            }
        })
    }
}

/// One column: normalized name, type and nullability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: DataType,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
}

const fn default_nullable() -> bool {
    true
}

impl ColumnSchema {
    #[must_use]
    pub const fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    fn to_field(&self) -> Field {
        Field::new(&self.name, self.data_type.to_arrow(), self.nullable)
    }

    /// Checks that a record value fits this column.
    pub(crate) fn check_value(&self, value: &Value) -> std::result::Result<(), String> {
        if value.is_null() {
            return if self.nullable {
                Ok(())
            } else {
                Err(format!("column `{}` is not nullable", self.name))
            };
        }
        let fits = match self.data_type {
            DataType::Text => value.is_string(),
            DataType::Bigint => value.as_i64().is_some(),
            DataType::Double => value.is_number(),
            DataType::Bool => value.is_boolean(),
            DataType::Timestamp => timestamp_micros(value).is_some(),
            DataType::Date => date_days(value).is_some(),
            DataType::Binary => value.as_str().and_then(decode_hex).is_some(),
            DataType::Complex => true,
        };
        if fits {
            Ok(())
        } else {
            Err(format!(
                "value {value} does not fit column `{}` of type {}",
                self.name, self.data_type
            ))
        }
    }
}

/// Creates a nullable column entry.
#[must_use]
pub fn new_column(name: impl Into<String>, data_type: DataType) -> ColumnSchema {
    ColumnSchema {
        name: name.into(),
        data_type,
        nullable: true,
    }
}

/// Ordered mapping from column name to column metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TableSchema {
    columns: Vec<ColumnSchema>,
}

impl TableSchema {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a schema from columns; a later column with the same name replaces the earlier one.
    pub fn from_columns(columns: impl IntoIterator<Item = ColumnSchema>) -> Self {
        let mut schema = Self::new();
        for column in columns {
            schema.insert(column);
        }
        schema
    }

    /// Derives columns from an Arrow schema. Fields without a logical type are reported as a mismatch.
    pub fn from_arrow(schema: &Schema) -> Result<Self> {
        let mut columns = Vec::with_capacity(schema.fields().len());
        for field in schema.fields() {
            let data_type = DataType::from_arrow(field.data_type()).ok_or_else(|| {
                Error::schema_mismatch(
                    field.name().clone(),
                    format!("arrow type {:?} has no column type", field.data_type()),
                )
            })?;
            columns.push(ColumnSchema {
                name: field.name().clone(),
                data_type,
                nullable: field.is_nullable(),
            });
        }
        Ok(Self::from_columns(columns))
    }

    #[must_use]
    pub fn with_column(mut self, column: ColumnSchema) -> Self {
        self.insert(column);
        self
    }

    pub fn insert(&mut self, column: ColumnSchema) {
        match self.columns.iter_mut().find(|c| c.name == column.name) {
            Some(existing) => *existing = column,
            None => self.columns.push(column),
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.name == name)
    }

    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ColumnSchema> {
        self.columns.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Returns a copy with every column name passed through `naming`.
    #[must_use]
    pub fn normalize_names(&self, naming: &Naming) -> Self {
        Self::from_columns(self.columns.iter().map(|c| ColumnSchema {
            name: naming.normalize_identifier(&c.name),
            ..c.clone()
        }))
    }

    /// Arrow schema with one field per column, in column order.
    #[must_use]
    pub fn to_arrow(&self) -> SchemaRef {
        Arc::new(Schema::new(self.columns.iter().map(ColumnSchema::to_field).collect()))
    }

    /// Merges `other` into this schema.
    ///
    /// Returns the merged schema and whether it gained columns. A column present
    /// in both with a different type is a [`Error::SchemaMismatch`].
    pub fn merge(&self, other: &Self) -> Result<(Self, bool)> {
        let mut merged = self.clone();
        let mut added = false;
        for column in &other.columns {
            match self.get(&column.name) {
                Some(existing) if existing.data_type != column.data_type => {
                    return Err(Error::schema_mismatch(
                        column.name.clone(),
                        format!(
                            "type changed from {} to {}",
                            existing.data_type, column.data_type
                        ),
                    ));
                }
                Some(_) => {}
                None => {
                    merged.columns.push(column.clone());
                    added = true;
                }
            }
        }
        Ok((merged, added))
    }
}

impl<'a> IntoIterator for &'a TableSchema {
    type Item = &'a ColumnSchema;
    type IntoIter = std::slice::Iter<'a, ColumnSchema>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.iter()
    }
}

impl FromIterator<ColumnSchema> for TableSchema {
    fn from_iter<I: IntoIterator<Item = ColumnSchema>>(iter: I) -> Self {
        Self::from_columns(iter)
    }
}

/// Microseconds since the Unix epoch from an RFC 3339 string or an integer.
pub(crate) fn timestamp_micros(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => {
            let parsed = OffsetDateTime::parse(s, &Rfc3339).ok()?;
            i64::try_from(parsed.unix_timestamp_nanos() / 1_000).ok()
        }
        _ => None,
    }
}

const UNIX_EPOCH_JULIAN_DAY: i32 = 2_440_588;

/// Days since the Unix epoch from a `YYYY-MM-DD` string.
pub(crate) fn date_days(value: &Value) -> Option<i32> {
    let s = value.as_str()?;
    if s.len() != 10 {
        return None;
    }
    let mut parts = s.splitn(3, '-');
    let year: i32 = parts.next()?.parse().ok()?;
    let month: u8 = parts.next()?.parse().ok()?;
    let day: u8 = parts.next()?.parse().ok()?;
    let date = Date::from_calendar_date(year, Month::try_from(month).ok()?, day).ok()?;
    date.to_julian_day().checked_sub(UNIX_EPOCH_JULIAN_DAY)
}

pub(crate) fn format_timestamp_micros(micros: i64) -> Option<String> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(micros) * 1_000)
        .ok()?
        .format(&Rfc3339)
        .ok()
}

/// `None` for day counts outside the supported calendar range.
pub(crate) fn format_date_days(days: i32) -> Option<String> {
    let julian_day = days.checked_add(UNIX_EPOCH_JULIAN_DAY)?;
    Date::from_julian_day(julian_day).ok().map(|d| d.to_string())
}

pub(crate) fn decode_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    s.as_bytes()
        .chunks(2)
        .map(|pair| {
            let hi = (pair[0] as char).to_digit(16)?;
            let lo = (pair[1] as char).to_digit(16)?;
            u8::try_from(hi * 16 + lo).ok()
        })
        .collect()
}

pub(crate) fn encode_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> TableSchema {
        TableSchema::from_columns([
            new_column("id", DataType::Bigint).not_null(),
            new_column("name", DataType::Text),
        ])
    }

    #[test]
    fn insert_keeps_order_and_replaces() {
        let schema = schema().with_column(new_column("id", DataType::Bigint));
        assert_eq!(schema.names().collect::<Vec<_>>(), ["id", "name"]);
        assert!(schema.get("id").unwrap().nullable);
    }

    #[test]
    fn merge_adds_new_columns() {
        let other = TableSchema::from_columns([new_column("score", DataType::Double)]);
        let (merged, added) = schema().merge(&other).unwrap();
        assert!(added);
        assert_eq!(merged.names().collect::<Vec<_>>(), ["id", "name", "score"]);

        let (same, added) = schema().merge(&schema()).unwrap();
        assert!(!added);
        assert_eq!(same, schema());
    }

    #[test]
    fn merge_rejects_type_conflict() {
        let other = TableSchema::from_columns([new_column("name", DataType::Bigint)]);
        let err = schema().merge(&other).unwrap_err();
        assert!(err.is_schema_mismatch());
    }

    #[test]
    fn check_value_by_type() {
        let id = new_column("id", DataType::Bigint).not_null();
        assert!(id.check_value(&json!(7)).is_ok());
        assert!(id.check_value(&json!(7.5)).is_err());
        assert!(id.check_value(&Value::Null).is_err());

        let ts = new_column("ts", DataType::Timestamp);
        assert!(ts.check_value(&json!("2024-01-05T10:00:00Z")).is_ok());
        assert!(ts.check_value(&json!(1_700_000_000_000_000_i64)).is_ok());
        assert!(ts.check_value(&json!("yesterday")).is_err());

        let day = new_column("day", DataType::Date);
        assert!(day.check_value(&json!("2024-02-29")).is_ok());
        assert!(day.check_value(&json!("2023-02-29")).is_err());

        let blob = new_column("blob", DataType::Binary);
        assert!(blob.check_value(&json!("00ff")).is_ok());
        assert!(blob.check_value(&json!("0g")).is_err());
    }

    #[test]
    fn temporal_round_trip() {
        let micros = timestamp_micros(&json!("1970-01-02T00:00:00Z")).unwrap();
        assert_eq!(micros, 86_400_000_000);
        assert_eq!(
            format_timestamp_micros(micros).as_deref(),
            Some("1970-01-02T00:00:00Z")
        );
        assert_eq!(date_days(&json!("1970-01-11")), Some(10));
        assert_eq!(format_date_days(10).as_deref(), Some("1970-01-11"));
        assert_eq!(format_date_days(-1).as_deref(), Some("1969-12-31"));
        assert_eq!(format_date_days(i32::MAX), None);
        assert_eq!(format_date_days(i32::MIN), None);
    }

    #[test]
    fn arrow_mapping() {
        let arrow = schema().to_arrow();
        assert_eq!(arrow.field(0).data_type(), &ArrowType::Int64);
        assert!(!arrow.field(0).is_nullable());
        assert_eq!(TableSchema::from_arrow(&arrow).unwrap(), schema());
    }

    #[test]
    fn normalize_names_uses_convention() {
        let raw = TableSchema::from_columns([new_column("User Name", DataType::Text)]);
        let normalized = raw.normalize_names(&Naming::default());
        assert!(normalized.get("user_name").is_some());
    }
}
