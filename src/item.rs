//! Data items accepted by the buffered writer and their normalized buffered form.

use arrow::record_batch::RecordBatch;

use crate::record::Record;

/// Any shape a caller may hand to [`crate::BufferedDataWriter::write_data_item`].
#[derive(Debug, Clone)]
pub enum DataItem {
    Record(Record),
    Records(Vec<Record>),
    Batch(RecordBatch),
    Batches(Vec<RecordBatch>),
}

/// A normalized unit held in the writer's buffer.
#[derive(Debug, Clone)]
pub enum BufferedItem {
    Record(Record),
    Batch(RecordBatch),
}

impl BufferedItem {
    #[must_use]
    pub fn num_rows(&self) -> usize {
        match self {
            Self::Record(_) => 1,
            Self::Batch(batch) => batch.num_rows(),
        }
    }
}

impl DataItem {
    /// Number of rows this item contributes to the buffered count.
    #[must_use]
    pub fn row_count(&self) -> usize {
        match self {
            Self::Record(_) => 1,
            Self::Records(records) => records.len(),
            Self::Batch(batch) => batch.num_rows(),
            Self::Batches(batches) => batches.iter().map(RecordBatch::num_rows).sum(),
        }
    }

    /// Splits the item into buffered units, preserving order.
    ///
    /// Zero-row batches carry nothing to encode and are dropped here.
    pub(crate) fn into_buffered(self) -> Vec<BufferedItem> {
        match self {
            Self::Record(record) => vec![BufferedItem::Record(record)],
            Self::Records(records) => records.into_iter().map(BufferedItem::Record).collect(),
            Self::Batch(batch) if batch.num_rows() == 0 => Vec::new(),
            Self::Batch(batch) => vec![BufferedItem::Batch(batch)],
            Self::Batches(batches) => batches
                .into_iter()
                .filter(|b| b.num_rows() > 0)
                .map(BufferedItem::Batch)
                .collect(),
        }
    }
}

impl From<Record> for DataItem {
    fn from(record: Record) -> Self {
        Self::Record(record)
    }
}

impl From<Vec<Record>> for DataItem {
    fn from(records: Vec<Record>) -> Self {
        Self::Records(records)
    }
}

impl From<RecordBatch> for DataItem {
    fn from(batch: RecordBatch) -> Self {
        Self::Batch(batch)
    }
}

impl From<Vec<RecordBatch>> for DataItem {
    fn from(batches: Vec<RecordBatch>) -> Self {
        Self::Batches(batches)
    }
}
