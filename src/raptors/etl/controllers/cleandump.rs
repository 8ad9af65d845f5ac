use std::path::PathBuf;

use mongodb::bson::{Bson, Document, doc};
use tracing::{info, instrument};

use crate::raptors::etl::config::{Config, expand_home};
use crate::raptors::etl::error::{EtlError, Result};
use crate::raptors::etl::frame::Frame;
use crate::raptors::etl::io::collection_write::{CollectionWriter, PurgeReport, WriteReport};
use crate::raptors::etl::io::store::DocumentStore;
use crate::raptors::etl::query::{fiscal_months, years_back};
use crate::raptors::etl::readers::{
    CollectionReader, EntBookingDump, LoopParams, MasterUniqueNames, SalesDump, SfdcDump,
    Sl5ToSegments, TechSpec1, UnmappedReport,
};

pub const BOOKING_DESTINATION: &str = "booking_dump";
pub const SFDC_DESTINATION: &str = "sfdc_dump";
/// Sales level 3 kept by `--comm`.
pub const COMMERCIAL_SALES_LEVEL_3: &str = "INDIA_COMM_1";
const DEFAULT_HISTORY: u32 = 2;

#[derive(Debug, Clone, Default)]
pub struct CleanBookingOptions {
    /// Explicit fiscal years; takes precedence over `history`.
    pub years: Vec<i32>,
    /// Number of years back from the configured current year.
    pub history: u32,
    pub comm: bool,
    pub destination: Option<String>,
}

impl CleanBookingOptions {
    pub fn resolve_years(&self, config: &Config) -> Vec<i32> {
        if !self.years.is_empty() {
            return self.years.clone();
        }
        let history = if self.history > 0 {
            self.history
        } else {
            DEFAULT_HISTORY
        };
        years_back(config.fiscal.current_year, history)
    }
}

#[derive(Debug, Clone, Default)]
pub struct CleanSfdcOptions {
    pub comm: bool,
    pub destination: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanReport {
    pub rows_read: usize,
    pub unmapped: UnmappedReport,
    pub purge: PurgeReport,
    pub write: WriteReport,
}

fn sales_level_filter(comm: bool) -> Document {
    if comm {
        doc! { "sales_level_3": COMMERCIAL_SALES_LEVEL_3 }
    } else {
        Document::new()
    }
}

fn unmapped_dir(config: &Config) -> PathBuf {
    expand_home(&config.paths.unmapped_dir)
}

/// An empty source read means there is nothing to rebuild from.
fn require_rows(frame: &Frame, collection: &str) -> Result<()> {
    if frame.is_empty() {
        return Err(EtlError::CollectionMissing(collection.to_string()));
    }
    Ok(())
}

/// Clears `destination` and writes the cleaned frame into it.
fn replace_destination(
    store: &dyn DocumentStore,
    destination: &str,
    frame: &Frame,
) -> Result<(PurgeReport, WriteReport)> {
    let writer = CollectionWriter::open(store, destination)?;
    let purge = writer.purge(Document::new())?;
    let write = writer.write(frame)?;
    Ok((purge, write))
}

/// Rebuilds `booking_dump` from `ent_dump_from_finance`.
#[instrument(level = "info", skip(store, config))]
pub fn clean_booking_dump(
    store: &dyn DocumentStore,
    config: &Config,
    options: &CleanBookingOptions,
) -> Result<CleanReport> {
    let years = options.resolve_years(config);
    let loop_params = LoopParams {
        field: "fiscal_period_id".to_string(),
        params: fiscal_months(&years).into_iter().map(Bson::Int64).collect(),
    };

    info!("reading '{}' data", EntBookingDump::COLLECTION);
    let frame = CollectionReader::new(store, EntBookingDump::COLLECTION)
        .read_looped(sales_level_filter(options.comm), &loop_params)?;
    require_rows(&frame, EntBookingDump::COLLECTION)?;
    let rows_read = frame.rows.len();
    let mut dump = EntBookingDump::new(frame);

    dump.rename_columns_neatly();
    dump.upcase_customer_names();
    dump.upcase_partner_names();
    dump.make_fiscal_year_id_column();
    dump.make_fiscal_quarter_column();
    dump.make_fiscal_month_id_column();
    dump.make_prod_serv_column();
    dump.make_cloud_flag_column();
    dump.make_tier_code_column();
    dump.validate_sl4();

    info!("reading mapping data");
    let mut technologies = TechSpec1::read(store)?;
    let segments = Sl5ToSegments::read(store)?;
    let mut unique_names = MasterUniqueNames::read(store)?;

    technologies.remove_redundancy();
    unique_names.prepare();
    dump.map_technologies(&technologies)?;
    dump.map_segments(&segments)?;
    dump.map_unique_names(&unique_names)?;
    let unmapped = dump.validate_mapping(&unmapped_dir(config))?;

    let destination = options.destination.as_deref().unwrap_or(BOOKING_DESTINATION);
    let (purge, write) = replace_destination(store, destination, &dump.frame)?;
    Ok(CleanReport {
        rows_read,
        unmapped,
        purge,
        write,
    })
}

/// Rebuilds `sfdc_dump` from `sfdc_raw_dump`.
#[instrument(level = "info", skip(store, config))]
pub fn clean_sfdc_dump(
    store: &dyn DocumentStore,
    config: &Config,
    options: &CleanSfdcOptions,
) -> Result<CleanReport> {
    info!("reading '{}' data", SfdcDump::COLLECTION);
    let frame = CollectionReader::new(store, SfdcDump::COLLECTION)
        .read(sales_level_filter(options.comm))?;
    require_rows(&frame, SfdcDump::COLLECTION)?;
    let rows_read = frame.rows.len();
    let mut dump = SfdcDump::new(frame);

    dump.upcase_customer_names();
    dump.make_fiscal_year_id_column();
    dump.make_fiscal_quarter_column();
    dump.make_fiscal_quarter_id_column();
    dump.make_fiscal_month_id_column();
    dump.make_prod_serv_column();
    dump.make_past_due_column();

    info!("reading mapping data");
    let mut technologies = TechSpec1::read(store)?;
    let segments = Sl5ToSegments::read(store)?;

    technologies.remove_redundancy();
    dump.map_technologies(&technologies)?;
    dump.map_segments(&segments)?;
    let unmapped = dump.validate_mapping(&unmapped_dir(config))?;

    let destination = options.destination.as_deref().unwrap_or(SFDC_DESTINATION);
    let (purge, write) = replace_destination(store, destination, &dump.frame)?;
    Ok(CleanReport {
        rows_read,
        unmapped,
        purge,
        write,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raptors::etl::io::memory::MemoryStore;

    fn config_with_unmapped_dir(dir: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.paths.unmapped_dir = dir.to_path_buf();
        config
    }

    fn mapper_store() -> MemoryStore {
        MemoryStore::new("test")
            .with_collection(
                "tech_spec1",
                vec![
                    doc! { "internal_sub_business_entity_name": "SWITCHING", "arch2": "EN" },
                    doc! { "internal_sub_business_entity_name": "SWITCHING", "arch2": "DUP" },
                ],
            )
            .with_collection(
                "sl5_to_segments",
                vec![doc! { "sales_level_5": "SL5_A", "rm_name": "Asha", "segment": "Mid" }],
            )
            .with_collection(
                "master_unique_names",
                vec![doc! { "names": "acme", "acc_name": "acme corp", "grp_name": "acme grp" }],
            )
    }

    #[test]
    fn years_default_to_two_back_from_current() {
        let config = Config::default();
        assert_eq!(CleanBookingOptions::default().resolve_years(&config), vec![2018, 2017]);

        let options = CleanBookingOptions {
            history: 3,
            ..CleanBookingOptions::default()
        };
        assert_eq!(options.resolve_years(&config), vec![2018, 2017, 2016]);

        let options = CleanBookingOptions {
            years: vec![2016],
            history: 3,
            ..CleanBookingOptions::default()
        };
        assert_eq!(options.resolve_years(&config), vec![2016]);
    }

    #[test]
    fn booking_dump_is_cleaned_mapped_and_replaced() {
        let temp_dir = tempfile::tempdir().expect("temporary directory");
        let store = mapper_store()
            .with_collection(
                "ent_dump_from_finance",
                vec![
                    doc! {
                        "fiscal_period_id": 201803_i64,
                        "fiscal_quarter_id": "2018Q1",
                        "sales_level_3": "INDIA_COMM_1",
                        "sales_level_4": "INDIA_COMM_STH",
                        "sales_level_5": "SL5_A",
                        "customer_name": "Acme",
                        "partner_name": "reseller",
                        "internal_sub_business_entity_name": "SWITCHING",
                        "services_indicator": "N",
                        "bookings_adjustments_code": "L1",
                        "bookings_adjustments_type": "DSV",
                        "tms_sales_allocated_bookings_base_list": 100,
                        "tbm": "agent",
                    },
                    doc! {
                        "fiscal_period_id": 201803_i64,
                        "fiscal_quarter_id": "2018Q1",
                        "sales_level_3": "OTHER",
                    },
                    doc! {
                        "fiscal_period_id": 201501_i64,
                        "fiscal_quarter_id": "2015Q1",
                        "sales_level_3": "INDIA_COMM_1",
                    },
                ],
            )
            .with_collection("booking_dump", vec![doc! { "stale": true }]);
        let options = CleanBookingOptions {
            comm: true,
            ..CleanBookingOptions::default()
        };

        let report =
            clean_booking_dump(&store, &config_with_unmapped_dir(temp_dir.path()), &options)
                .expect("cleaned");

        assert_eq!(report.rows_read, 1);
        assert_eq!(report.unmapped.total(), 0);
        assert_eq!(report.purge.removed, 1);
        assert_eq!(report.write.total, 1);

        let stored = store.documents("booking_dump");
        let row = &stored[0];
        assert_eq!(row.get_str("customer_name").unwrap(), "ACME");
        assert_eq!(row.get_str("partner_name").unwrap(), "RESELLER");
        assert_eq!(row.get_str("sales_level_4").unwrap(), "INDIA_COMM_SW_GEO");
        assert_eq!(row.get_str("sales_agent").unwrap(), "agent");
        assert_eq!(row.get_str("fiscal_year_id").unwrap(), "2018");
        assert_eq!(row.get_str("fiscal_quarter").unwrap(), "Q1");
        assert_eq!(row.get_str("fiscal_month_id").unwrap(), "03");
        assert_eq!(row.get_str("cloud_flag").unwrap(), "N");
        assert_eq!(row.get_str("tier_code").unwrap(), "POS");
        assert_eq!(row.get_str("arch2").unwrap(), "EN");
        assert_eq!(row.get_str("segment").unwrap(), "Mid");
        assert_eq!(row.get_str("acc_name").unwrap(), "ACME CORP");
    }

    #[test]
    fn empty_source_leaves_destination_untouched() {
        let temp_dir = tempfile::tempdir().expect("temporary directory");
        let config = config_with_unmapped_dir(temp_dir.path());
        let store = mapper_store().with_collection(
            "booking_dump",
            vec![doc! { "kept": 1 }, doc! { "kept": 2 }],
        );

        let error = clean_booking_dump(&store, &config, &CleanBookingOptions::default())
            .unwrap_err();
        assert!(matches!(
            error,
            EtlError::CollectionMissing(ref name) if name == "ent_dump_from_finance"
        ));
        assert_eq!(store.documents("booking_dump").len(), 2);

        let store = store
            .with_collection(
                "sfdc_raw_dump",
                vec![doc! { "fiscal_period": "Q3-2018", "sales_level_3": "OTHER" }],
            )
            .with_collection("sfdc_dump", vec![doc! { "kept": 1 }]);
        let options = CleanSfdcOptions {
            comm: true,
            ..CleanSfdcOptions::default()
        };
        let error = clean_sfdc_dump(&store, &config, &options).unwrap_err();
        assert!(matches!(
            error,
            EtlError::CollectionMissing(ref name) if name == "sfdc_raw_dump"
        ));
        assert_eq!(store.documents("sfdc_dump").len(), 1);
    }

    #[test]
    fn missing_lookups_abort_before_writing() {
        let temp_dir = tempfile::tempdir().expect("temporary directory");
        let store = MemoryStore::new("test")
            .with_collection(
                "sfdc_raw_dump",
                vec![doc! {
                    "fiscal_period": "Q3-2018",
                    "sales_level_5": "SL5_A",
                    "internal_sub_business_entity_name": "SWITCHING",
                }],
            )
            .with_collection("sfdc_dump", vec![doc! { "previous": 1 }]);

        let error = clean_sfdc_dump(
            &store,
            &config_with_unmapped_dir(temp_dir.path()),
            &CleanSfdcOptions::default(),
        )
        .unwrap_err();

        assert!(matches!(
            error,
            EtlError::CollectionMissing(ref name) if name == "tech_spec1"
        ));
        assert_eq!(store.documents("sfdc_dump"), vec![doc! { "previous": 1 }]);
    }

    #[test]
    fn dump_without_join_key_aborts_before_writing() {
        let temp_dir = tempfile::tempdir().expect("temporary directory");
        let store = mapper_store()
            .with_collection(
                "sfdc_raw_dump",
                vec![doc! {
                    "fiscal_period": "Q3-2018",
                    "internal_sub_business_entity_name": "SWITCHING",
                }],
            )
            .with_collection("sfdc_dump", vec![doc! { "previous": 1 }]);

        let error = clean_sfdc_dump(
            &store,
            &config_with_unmapped_dir(temp_dir.path()),
            &CleanSfdcOptions::default(),
        )
        .unwrap_err();

        assert!(matches!(
            error,
            EtlError::ColumnMissing { ref column, .. } if column == "sales_level_5"
        ));
        assert_eq!(store.documents("sfdc_dump").len(), 1);
    }

    #[test]
    fn duplicated_segments_abort_before_writing() {
        let temp_dir = tempfile::tempdir().expect("temporary directory");
        let store = mapper_store()
            .with_collection(
                "sl5_to_segments",
                vec![
                    doc! { "sales_level_5": "SL5_A", "rm_name": "Asha" },
                    doc! { "sales_level_5": "SL5_A", "rm_name": "Ravi" },
                ],
            )
            .with_collection(
                "sfdc_raw_dump",
                vec![doc! {
                    "fiscal_period": "Q3-2018",
                    "fiscal_month": 7,
                    "sales_level_5": "SL5_A",
                    "internal_sub_business_entity_name": "SWITCHING",
                }],
            )
            .with_collection("sfdc_dump", vec![doc! { "previous": 1 }]);

        let error = clean_sfdc_dump(
            &store,
            &config_with_unmapped_dir(temp_dir.path()),
            &CleanSfdcOptions::default(),
        )
        .unwrap_err();

        assert!(matches!(
            error,
            EtlError::MappingRowsExceeded { before: 1, after: 2, .. }
        ));
        assert_eq!(store.documents("sfdc_dump").len(), 1);
    }

    #[test]
    fn sfdc_dump_reports_unmapped_rows() {
        let temp_dir = tempfile::tempdir().expect("temporary directory");
        let store = mapper_store().with_collection(
            "sfdc_raw_dump",
            vec![
                doc! {
                    "fiscal_period": "Q3-2018",
                    "fiscal_month": 7,
                    "no_of_days_past_ebd": 4,
                    "sales_level_5": "SL5_A",
                    "internal_sub_business_entity_name": "ROUTING",
                    "technology_service_code": "Service",
                },
            ],
        );
        let options = CleanSfdcOptions {
            destination: Some("sfdc_dump_test".to_string()),
            ..CleanSfdcOptions::default()
        };

        let report = clean_sfdc_dump(&store, &config_with_unmapped_dir(temp_dir.path()), &options)
            .expect("cleaned");

        assert_eq!(report.unmapped.technologies, 1);
        assert_eq!(report.unmapped.segments, 0);
        assert!(temp_dir.path().join("unmapped_technologies.xlsx").is_file());
        let stored = store.documents("sfdc_dump_test");
        assert_eq!(stored[0].get_str("fiscal_quarter_id").unwrap(), "2018Q3");
        assert_eq!(stored[0].get_str("past_due").unwrap(), "TRUE");
        assert_eq!(stored[0].get_str("prod_serv").unwrap(), "services");
    }
}
