//! Lookup tables joined against the dumps.

use std::collections::BTreeMap;

use mongodb::bson::Document;

use crate::raptors::etl::error::{EtlError, Result};
use crate::raptors::etl::frame::Frame;
use crate::raptors::etl::io::store::DocumentStore;
use crate::raptors::etl::readers::CollectionReader;

/// A lookup table with the column it joins on.
pub trait Mapper {
    const COLLECTION: &'static str;
    const KEY: &'static str;
    const DESCRIPTION: &'static str;

    fn frame(&self) -> &Frame;
}

/// Reads a whole lookup table; an empty one is treated as missing.
fn read_collection(store: &dyn DocumentStore, collection: &str) -> Result<Frame> {
    let frame = CollectionReader::new(store, collection).read(Document::new())?;
    if frame.is_empty() {
        return Err(EtlError::CollectionMissing(collection.to_string()));
    }
    Ok(frame)
}

/// Internal business entity → technology architecture.
#[derive(Debug, Clone, Default)]
pub struct TechSpec1 {
    pub frame: Frame,
}

impl Mapper for TechSpec1 {
    const COLLECTION: &'static str = "tech_spec1";
    const KEY: &'static str = "internal_sub_business_entity_name";
    const DESCRIPTION: &'static str = "Technology";

    fn frame(&self) -> &Frame {
        &self.frame
    }
}

impl TechSpec1 {
    pub fn read(store: &dyn DocumentStore) -> Result<Self> {
        Ok(Self {
            frame: read_collection(store, Self::COLLECTION)?,
        })
    }

    pub fn remove_redundancy(&mut self) {
        self.frame
            .remove_duplicates(&[Self::KEY], "Redundancy removal");
    }
}

/// Sales level 5 → regional manager, owner director and segment.
#[derive(Debug, Clone, Default)]
pub struct Sl5ToSegments {
    pub frame: Frame,
}

impl Mapper for Sl5ToSegments {
    const COLLECTION: &'static str = "sl5_to_segments";
    const KEY: &'static str = "sales_level_5";
    const DESCRIPTION: &'static str = "Segment";

    fn frame(&self) -> &Frame {
        &self.frame
    }
}

impl Sl5ToSegments {
    pub fn read(store: &dyn DocumentStore) -> Result<Self> {
        Ok(Self {
            frame: read_collection(store, Self::COLLECTION)?,
        })
    }
}

/// Raw customer spellings → canonical account and group names.
#[derive(Debug, Clone, Default)]
pub struct MasterUniqueNames {
    pub frame: Frame,
}

impl Mapper for MasterUniqueNames {
    const COLLECTION: &'static str = "master_unique_names";
    const KEY: &'static str = "customer_name";
    const DESCRIPTION: &'static str = "Uniquenames";

    fn frame(&self) -> &Frame {
        &self.frame
    }
}

impl MasterUniqueNames {
    const NAMES: &'static str = "names";

    pub fn read(store: &dyn DocumentStore) -> Result<Self> {
        Ok(Self {
            frame: read_collection(store, Self::COLLECTION)?,
        })
    }

    pub fn upcase_names(&mut self) {
        self.frame.upcase_column(Self::NAMES);
    }

    pub fn upcase_acc_names(&mut self) {
        self.frame.upcase_column("acc_name");
    }

    pub fn upcase_grp_names(&mut self) {
        self.frame.upcase_column("grp_name");
    }

    pub fn remove_redundancy(&mut self) {
        self.frame
            .remove_duplicates(&[Self::NAMES], "Redundancy removal");
    }

    /// Renames `names` to the join key `customer_name`.
    pub fn transform_names_to_customer_name(&mut self) {
        let mapper = BTreeMap::from([(Self::NAMES.to_string(), Self::KEY.to_string())]);
        self.frame.rename_columns(&mapper);
    }

    /// Upcases, dedupes and renames so the table is ready to join.
    pub fn prepare(&mut self) {
        self.upcase_names();
        self.upcase_acc_names();
        self.upcase_grp_names();
        self.remove_redundancy();
        self.transform_names_to_customer_name();
    }
}
