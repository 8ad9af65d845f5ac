use mongodb::bson::Document;
use tracing::{debug, info, warn};

use crate::raptors::etl::error::{EtlError, Result};
use crate::raptors::etl::frame::Frame;
use crate::raptors::etl::io::store::DocumentStore;
use crate::raptors::etl::model::Cell;

/// Field that may hold whole numbers too large for an `Int64`.
pub const OVERFLOW_PRONE_FIELD: &str = "opportunity_id";

/// Counts observed around a purge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PurgeReport {
    /// Documents in the collection when the writer was opened.
    pub existing: u64,
    /// Documents matching the purge filter, as announced in the warning.
    pub planned: u64,
    pub removed: u64,
    /// Documents left after the purge.
    pub remaining: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteReport {
    pub inserted: usize,
    /// Rows inserted on the second attempt after text coercion.
    pub retried: usize,
    /// Documents in the collection once the write finished.
    pub total: u64,
}

/// Writes frames into one collection of a [`DocumentStore`].
pub struct CollectionWriter<'a> {
    store: &'a dyn DocumentStore,
    collection: String,
    records_before: u64,
}

impl<'a> CollectionWriter<'a> {
    pub fn open(store: &'a dyn DocumentStore, collection: &str) -> Result<Self> {
        let records_before = store.count(collection, Document::new())?;
        Ok(Self {
            store,
            collection: collection.to_string(),
            records_before,
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn records_before(&self) -> u64 {
        self.records_before
    }

    pub fn count(&self, filter: &Document) -> Result<u64> {
        debug!(collection = %self.collection, ?filter, "counting documents");
        self.store.count(&self.collection, filter.clone())
    }

    /// Announces and performs the removal of every document matching
    /// `filter`. An empty filter clears the collection.
    pub fn purge(&self, filter: Document) -> Result<PurgeReport> {
        let planned = self.count(&filter)?;
        warn!(
            collection = %self.collection,
            "{} row(s) existing! {} row(s) planned for trashing",
            self.records_before,
            planned
        );
        let removed = self.store.delete_many(&self.collection, filter)?;
        let remaining = self.count(&Document::new())?;
        Ok(PurgeReport {
            existing: self.records_before,
            planned,
            removed,
            remaining,
        })
    }

    /// Inserts the frame row by row. A row failing with a numeric overflow
    /// gets its overflow-prone field coerced to text and is retried once.
    pub fn write(&self, frame: &Frame) -> Result<WriteReport> {
        info!(collection = %self.collection, rows = frame.rows.len(), "writing data");
        let mut inserted = 0;
        let mut retried = 0;

        for row_idx in 0..frame.rows.len() {
            let document = match frame.row_document(row_idx) {
                Ok(document) => document,
                Err(EtlError::NumericOverflow { field }) => {
                    warn!(row = row_idx, %field, "numeric overflow, retrying with {OVERFLOW_PRONE_FIELD} as text");
                    retried += 1;
                    coerced_document(frame, row_idx)?
                }
                Err(error) => return Err(error),
            };
            self.store.insert_one(&self.collection, document)?;
            inserted += 1;

            if inserted % 1000 == 0 {
                debug!(inserted, total = frame.rows.len(), "insert progress");
            }
        }

        let total = self.count(&Document::new())?;
        info!(collection = %self.collection, total, "collection now has {total} document(s)");
        Ok(WriteReport {
            inserted,
            retried,
            total,
        })
    }
}

fn coerced_document(frame: &Frame, row_idx: usize) -> Result<Document> {
    let mut row = Frame {
        columns: frame.columns.clone(),
        rows: vec![frame.rows[row_idx].clone()],
    };
    row.make_new_column(OVERFLOW_PRONE_FIELD, OVERFLOW_PRONE_FIELD, |cell| match cell {
        Cell::Int(_) | Cell::Float(_) => cell.render().map(Cell::Text).unwrap_or(Cell::Null),
        other => other.clone(),
    });
    row.row_document(0)
}
