//! Buffered multi-format item writer.
//!
//! Records and Arrow batches are buffered by a [`BufferedDataWriter`] and
//! flushed through a [`FormatEncoder`] into JSONL, CSV, Parquet or SQL
//! `INSERT` files. Identifiers are normalized with a [`Naming`] convention.

pub mod buffered;
mod columnar;
pub mod config;
pub mod error;
pub mod item;
pub mod naming;
pub mod record;
pub mod schema;
pub mod session;
pub mod writer;

pub use buffered::{BufferedDataWriter, WriterMetrics};
pub use config::WriterConfig;
pub use error::{Error, Result};
pub use item::{BufferedItem, DataItem};
pub use naming::{Naming, NamingConvention};
pub use record::Record;
pub use schema::{new_column, ColumnSchema, DataType, TableSchema};
pub use session::{get_writer, with_writer, WriterSession};
pub use writer::{FileFormat, FormatEncoder};
