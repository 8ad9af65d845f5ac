//! Generic readers that load a [`Frame`] from a spreadsheet, a collection,
//! or a set of aggregation pipelines, plus the domain readers built on top.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use mongodb::bson::{Bson, Document};
use tracing::info;

use crate::raptors::etl::error::{EtlError, Result};
use crate::raptors::etl::frame::Frame;
use crate::raptors::etl::io::excel_read;
use crate::raptors::etl::io::store::{DocumentStore, hidden_fields};

pub mod mappers;
pub mod sales;

pub use mappers::{Mapper, MasterUniqueNames, Sl5ToSegments, TechSpec1};
pub use sales::{EntBookingDump, SalesDump, SfdcDump, UnmappedReport};

/// One query per parameter value, results appended.
#[derive(Debug, Clone)]
pub struct LoopParams {
    pub field: String,
    pub params: Vec<Bson>,
}

fn log_shape(frame: &Frame) {
    let (rows, cols) = frame.shape();
    info!("{rows} row(s) {cols} col(s) have been read");
}

/// Reads a worksheet.
#[derive(Debug, Clone)]
pub struct SheetReader {
    path: PathBuf,
    sheet: Option<String>,
}

impl SheetReader {
    pub fn new(path: impl Into<PathBuf>, sheet: Option<String>) -> Self {
        Self {
            path: path.into(),
            sheet,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn validate(&self) -> Result<()> {
        excel_read::validate(&self.path, self.sheet.as_deref())
    }

    pub fn read(&self) -> Result<Frame> {
        let frame = excel_read::read_frame(&self.path, self.sheet.as_deref())?;
        log_shape(&frame);
        Ok(frame)
    }
}

/// Reads documents of one collection, hiding `_id` and `timestamp`.
pub struct CollectionReader<'a> {
    store: &'a dyn DocumentStore,
    collection: String,
}

impl<'a> CollectionReader<'a> {
    pub fn new(store: &'a dyn DocumentStore, collection: &str) -> Self {
        Self {
            store,
            collection: collection.to_string(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn read(&self, filter: Document) -> Result<Frame> {
        let documents = self
            .store
            .find(&self.collection, filter, Some(hidden_fields()))?;
        let frame = Frame::from_documents(&documents);
        log_shape(&frame);
        Ok(frame)
    }

    /// Runs `filter` once per loop parameter with `field` set to it.
    pub fn read_looped(&self, filter: Document, loop_params: &LoopParams) -> Result<Frame> {
        let mut frame = Frame::default();
        for param in &loop_params.params {
            let mut query = filter.clone();
            query.insert(loop_params.field.clone(), param.clone());
            let documents = self
                .store
                .find(&self.collection, query, Some(hidden_fields()))?;
            if !documents.is_empty() {
                frame.append(Frame::from_documents(&documents));
            }
        }
        log_shape(&frame);
        Ok(frame)
    }

    /// First document of the collection as a string → string map, without
    /// `_id`.
    pub fn read_dict(&self) -> Result<BTreeMap<String, String>> {
        let documents = self.store.find(&self.collection, Document::new(), None)?;
        let document = documents
            .into_iter()
            .next()
            .ok_or_else(|| EtlError::CollectionMissing(self.collection.clone()))?;

        let mut mapper = BTreeMap::new();
        for key in document.keys().filter(|key| key.as_str() != "_id") {
            mapper.insert(key.clone(), document.get_str(key)?.to_string());
        }
        Ok(mapper)
    }
}

/// Reads the output of several aggregation pipelines.
pub struct AggregationReader<'a> {
    store: &'a dyn DocumentStore,
    collection: String,
}

impl<'a> AggregationReader<'a> {
    pub fn new(store: &'a dyn DocumentStore, collection: &str) -> Self {
        Self {
            store,
            collection: collection.to_string(),
        }
    }

    pub fn read(&self, pipelines: &[Vec<Document>]) -> Result<Frame> {
        let mut frame = Frame::default();
        for pipeline in pipelines {
            let documents = self.store.aggregate(&self.collection, pipeline.clone())?;
            if !documents.is_empty() {
                frame.append(Frame::from_documents(&documents));
            }
        }
        log_shape(&frame);
        Ok(frame)
    }
}

/// Aggregated `booking_dump` rows used by the booking report.
pub struct BookingDump<'a> {
    reader: AggregationReader<'a>,
}

impl<'a> BookingDump<'a> {
    pub const COLLECTION: &'static str = "booking_dump";

    pub fn new(store: &'a dyn DocumentStore) -> Self {
        Self {
            reader: AggregationReader::new(store, Self::COLLECTION),
        }
    }

    pub fn read(&self, pipelines: &[Vec<Document>]) -> Result<Frame> {
        self.reader.read(pipelines)
    }
}
