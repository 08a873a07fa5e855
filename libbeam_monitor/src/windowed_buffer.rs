use std::sync::Arc;

use super::error::BufferError;
use super::rolling::Record;

/// Column names of the records held by a buffer, as shown by the rendering sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema(Arc<[String]>);

impl Schema {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(columns.into_iter().map(Into::into).collect())
    }

    pub fn columns(&self) -> &[String] {
        &self.0
    }
}

/// An immutable view of a buffer at one point in time.
///
/// Snapshots share their storage with the buffer (copy-on-write), so taking one is
/// cheap and it never changes after being handed out.
#[derive(Debug, Clone)]
pub struct BufferSnapshot<R> {
    schema: Schema,
    records: Arc<Vec<R>>,
}

impl<R: Record> BufferSnapshot<R> {
    pub fn new(schema: Schema, records: Vec<R>) -> Self {
        Self {
            schema,
            records: Arc::new(records),
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn records(&self) -> &[R] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Timestamps of the first and last record
    pub fn span(&self) -> Option<(f64, f64)> {
        Some((
            self.records.first()?.timestamp(),
            self.records.last()?.timestamp(),
        ))
    }
}

/// A batch of records tagged with the columns they were produced for
#[derive(Debug, Clone)]
pub struct RecordBatch<R> {
    pub schema: Schema,
    pub records: Vec<R>,
}

/// Reduce `records` to `capacity` elements picked at a fixed stride.
///
/// The first and last record are always kept so the result spans the same time
/// range as the input.
pub fn decimate<R: Clone>(records: &[R], capacity: usize) -> Vec<R> {
    let len = records.len();
    if len <= capacity {
        return records.to_vec();
    }
    match capacity {
        0 => Vec::new(),
        1 => records[len - 1..].to_vec(),
        _ => (0..capacity)
            .map(|i| records[i * (len - 1) / (capacity - 1)].clone())
            .collect(),
    }
}

/// WindowedBuffer is the bounded, append-only sequence handed to the rendering sink.
///
/// Appends that would overflow the capacity decimate the combined history at a fixed
/// stride instead of truncating it, so a plot always shows the whole session. The
/// contents are replaced wholesale on every append or clear, which makes both atomic
/// with respect to snapshots taken through [`WindowedBuffer::read`].
#[derive(Debug, Clone)]
pub struct WindowedBuffer<R> {
    schema: Schema,
    capacity: usize,
    records: Arc<Vec<R>>,
}

impl<R: Record> WindowedBuffer<R> {
    pub fn new(schema: Schema, capacity: usize) -> Self {
        Self {
            schema,
            capacity,
            records: Arc::new(Vec::new()),
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Append records in the buffer's own schema.
    ///
    /// Records older than the current tail are merged into place so the buffer stays
    /// sorted by timestamp.
    pub fn append(&mut self, records: impl IntoIterator<Item = R>) {
        let incoming: Vec<R> = records.into_iter().collect();
        if incoming.is_empty() {
            return;
        }
        let mut combined = Vec::with_capacity(self.records.len() + incoming.len());
        combined.extend_from_slice(&self.records);
        let joins_in_order = match (combined.last(), incoming.first()) {
            (Some(last), Some(first)) => last.timestamp() <= first.timestamp(),
            _ => true,
        };
        let in_order = joins_in_order
            && incoming
                .windows(2)
                .all(|w| w[0].timestamp() <= w[1].timestamp());
        combined.extend(incoming);
        if !in_order {
            combined.sort_by(|a, b| a.timestamp().total_cmp(&b.timestamp()));
        }
        if combined.len() > self.capacity {
            combined = decimate(&combined, self.capacity);
        }
        self.records = Arc::new(combined);
    }

    /// Append a batch produced for a specific set of columns.
    ///
    /// A batch whose schema differs from the buffer's is a programming error: debug
    /// builds panic, release builds log it, reinitialise the buffer with the batch's
    /// schema and keep going.
    pub fn append_batch(&mut self, batch: RecordBatch<R>) {
        if batch.schema != self.schema {
            let err = BufferError::SchemaMismatch {
                expected: self.schema.columns().to_vec(),
                found: batch.schema.columns().to_vec(),
            };
            if cfg!(debug_assertions) {
                panic!("{err}");
            }
            log::warn!("{err}; reinitialising the buffer");
            self.reset_schema(batch.schema);
        }
        self.append(batch.records);
    }

    /// Remove every record, keeping the schema
    pub fn clear(&mut self) {
        self.records = Arc::new(Vec::new());
    }

    /// Remove every record and install a new schema in one step
    pub fn reset_schema(&mut self, schema: Schema) {
        self.schema = schema;
        self.clear();
    }

    pub fn read(&self) -> BufferSnapshot<R> {
        BufferSnapshot {
            schema: self.schema.clone(),
            records: Arc::clone(&self.records),
        }
    }
}
