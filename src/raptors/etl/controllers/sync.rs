use std::path::PathBuf;

use mongodb::bson::{Bson, Document};
use tracing::{info, instrument};

use crate::raptors::etl::config::Config;
use crate::raptors::etl::error::{EtlError, Result};
use crate::raptors::etl::frame::Frame;
use crate::raptors::etl::io::collection_write::{CollectionWriter, PurgeReport, WriteReport};
use crate::raptors::etl::io::store::DocumentStore;
use crate::raptors::etl::model::Cell;
use crate::raptors::etl::query::make_or;
use crate::raptors::etl::readers::{CollectionReader, SfdcDump, SheetReader};

/// Column dropped from sensitive dumps once renamed.
pub const UNMAPPED_COLUMN: &str = "not_to_be_mapped";
pub const WEEK_FIELD: &str = "fiscal_week_id";
pub const BOOKING_COLUMNS_COLLECTION: &str = "booking_dump_cols";
pub const SFDC_COLUMNS_COLLECTION: &str = "sfdc_dump_cols";

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub input: PathBuf,
    pub sheet: Option<String>,
    pub collection: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub rows_read: usize,
    pub purge: PurgeReport,
    pub write: WriteReport,
}

/// Whether `collection` is purged week by week.
pub fn is_sensitive(config: &Config, collection: &str) -> bool {
    config
        .sync
        .sensitive_collections
        .iter()
        .any(|name| name == collection)
}

pub fn is_sfdc(collection: &str) -> bool {
    collection == SfdcDump::COLLECTION
}

/// Collection holding the column rename map for `collection`, if any.
fn rename_map_collection(config: &Config, collection: &str) -> Option<&'static str> {
    if is_sensitive(config, collection) {
        Some(BOOKING_COLUMNS_COLLECTION)
    } else if is_sfdc(collection) {
        Some(SFDC_COLUMNS_COLLECTION)
    } else {
        None
    }
}

/// Purge filter: `$or` over the incoming fiscal weeks for sensitive
/// destinations, the whole collection otherwise. A sensitive frame must
/// carry the week column; `None` when that column holds no values.
pub fn purge_filter(config: &Config, collection: &str, frame: &Frame) -> Result<Option<Document>> {
    if !is_sensitive(config, collection) {
        return Ok(Some(Document::new()));
    }
    if frame.column_index(WEEK_FIELD).is_none() {
        return Err(EtlError::ColumnMissing {
            context: format!("sync into '{collection}'"),
            column: WEEK_FIELD.to_string(),
        });
    }
    let weeks = frame
        .uniques(WEEK_FIELD)
        .iter()
        .filter(|cell| !cell.is_null())
        .map(|cell| cell.to_bson(WEEK_FIELD))
        .collect::<Result<Vec<Bson>>>()?;
    if weeks.is_empty() {
        return Ok(None);
    }
    Ok(Some(make_or(&weeks, WEEK_FIELD)))
}

/// Loads a spreadsheet into `options.collection`, replacing what it
/// supersedes.
#[instrument(
    level = "info",
    skip(store, config),
    fields(input = %options.input.display(), collection = %options.collection)
)]
pub fn sync(store: &dyn DocumentStore, config: &Config, options: &SyncOptions) -> Result<SyncReport> {
    let reader = SheetReader::new(&options.input, options.sheet.clone());
    reader.validate()?;
    let mut frame = reader.read()?;
    let rows_read = frame.rows.len();

    frame.downcase_colnames();
    frame.fill_not_applicables(Cell::Int(0));

    let collection = options.collection.as_str();
    if let Some(map_collection) = rename_map_collection(config, collection) {
        info!("renaming columns from {map_collection}");
        let mapper = CollectionReader::new(store, map_collection).read_dict()?;
        frame.rename_columns(&mapper);
        if is_sensitive(config, collection) {
            frame.delete_columns(&[UNMAPPED_COLUMN]);
        }
        frame.add_timestamp();
    }

    let filter = purge_filter(config, collection, &frame)?;
    let writer = CollectionWriter::open(store, collection)?;
    let purge = match filter {
        Some(filter) => writer.purge(filter)?,
        None => {
            info!("no {WEEK_FIELD} values found, nothing to purge");
            PurgeReport {
                existing: writer.records_before(),
                planned: 0,
                removed: 0,
                remaining: writer.records_before(),
            }
        }
    };
    let write = writer.write(&frame)?;

    Ok(SyncReport {
        rows_read,
        purge,
        write,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::doc;

    #[test]
    fn sensitive_collections_come_from_config() {
        let mut config = Config::default();
        assert!(is_sensitive(&config, "ent_dump_from_finance"));
        assert!(!is_sensitive(&config, "sfdc_raw_dump"));

        config.sync.sensitive_collections = vec!["bookings_2019".to_string()];
        assert!(is_sensitive(&config, "bookings_2019"));
        assert!(!is_sensitive(&config, "ent_dump_from_finance"));
    }

    #[test]
    fn rename_map_depends_on_destination() {
        let config = Config::default();
        assert_eq!(
            rename_map_collection(&config, "ent_dump_from_finance_old"),
            Some(BOOKING_COLUMNS_COLLECTION)
        );
        assert_eq!(
            rename_map_collection(&config, "sfdc_raw_dump"),
            Some(SFDC_COLUMNS_COLLECTION)
        );
        assert_eq!(rename_map_collection(&config, "tech_spec1"), None);
    }

    #[test]
    fn sensitive_purge_targets_incoming_weeks() {
        let config = Config::default();
        let frame = Frame::from_rows(
            vec!["fiscal_week_id"],
            vec![
                vec![Cell::Float(201805.0)],
                vec![Cell::Int(201806)],
                vec![Cell::Float(201805.0)],
            ],
        );

        let filter = purge_filter(&config, "ent_dump_from_finance", &frame).unwrap();

        assert_eq!(
            filter,
            Some(doc! { "$or": [ { "fiscal_week_id": 201805_i64 }, { "fiscal_week_id": 201806_i64 } ] })
        );
        assert_eq!(
            purge_filter(&config, "tech_spec1", &frame).unwrap(),
            Some(Document::new())
        );
        let no_weeks = Frame::new(vec![WEEK_FIELD.to_string()]);
        assert_eq!(
            purge_filter(&config, "ent_dump_from_finance", &no_weeks).unwrap(),
            None
        );
    }

    #[test]
    fn sensitive_purge_requires_the_week_column() {
        let config = Config::default();
        let frame = Frame::from_rows(vec!["customer_name"], vec![vec![Cell::text("acme")]]);

        let error = purge_filter(&config, "ent_dump_from_finance", &frame).unwrap_err();

        assert!(matches!(
            error,
            EtlError::ColumnMissing { ref column, .. } if column == WEEK_FIELD
        ));
        assert_eq!(
            purge_filter(&config, "sfdc_raw_dump", &frame).unwrap(),
            Some(Document::new())
        );
    }
}
