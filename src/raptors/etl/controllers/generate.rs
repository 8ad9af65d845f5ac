use std::path::PathBuf;

use mongodb::bson::{Bson, Document};
use tracing::{info, instrument};

use crate::raptors::etl::config::{Config, expand_home};
use crate::raptors::etl::error::{EtlError, Result};
use crate::raptors::etl::io::excel_write;
use crate::raptors::etl::io::store::DocumentStore;
use crate::raptors::etl::query::{
    QueryConfig, apply_field_config, fiscal_months, make_pipeline, owner_filter,
    parse_field_config, timestamped_filename, years_back,
};
use crate::raptors::etl::readers::BookingDump;

pub const BOOKING_REPORT: &str = "booking";

/// Group-by fields of the booking report before any field config.
pub const BOOKING_UNIQ_FIELDS: [&str; 25] = [
    "fiscal_year_id",
    "fiscal_quarter_id",
    "fiscal_month_id",
    "fiscal_week_id",
    "sales_level_4",
    "sales_level_5",
    "sales_level_6",
    "sales_agent",
    "rm_name",
    "od_name",
    "segment",
    "country",
    "region",
    "state",
    "prod_serv",
    "recurring_offer_flag",
    "tier_code",
    "grp_ver",
    "grp_ver2",
    "product_classification",
    "arch1",
    "arch2",
    "tech_name1",
    "tech_name2",
    "tech_name3",
];

pub const BOOKING_VAL_FIELDS: [&str; 3] = ["booking_net", "base_list", "standard_cost"];

#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    pub name: String,
    pub owner: String,
    /// Years of monthly pipelines, at least one.
    pub history: u32,
    pub current_year: Option<i32>,
    /// `a:field` / `r:field` entries.
    pub field_config: Vec<String>,
    /// Target directory; the configured home directory when absent.
    pub filepath: Option<PathBuf>,
    pub sheet: Option<String>,
    pub csv: bool,
}

/// A planned booking report: fields, one pipeline per fiscal month, and the
/// target file.
#[derive(Debug, Clone, PartialEq)]
pub struct BookingReport {
    pub owner: String,
    pub uniq_fields: Vec<String>,
    pub val_fields: Vec<String>,
    pub pipelines: Vec<Vec<Document>>,
    pub filename: PathBuf,
}

impl BookingReport {
    pub fn plan(config: &Config, options: &GenerateOptions) -> Result<Self> {
        if !options.name.eq_ignore_ascii_case(BOOKING_REPORT) {
            return Err(EtlError::UnknownReport(options.name.clone()));
        }
        let owner = options.owner.to_lowercase();

        let mut uniq_fields: Vec<String> =
            BOOKING_UNIQ_FIELDS.iter().map(|field| field.to_string()).collect();
        let mut val_fields: Vec<String> =
            BOOKING_VAL_FIELDS.iter().map(|field| field.to_string()).collect();
        let configs = parse_field_config(&options.field_config)?;
        apply_field_config(&configs, &mut uniq_fields, &mut val_fields);

        let mut qconfig: QueryConfig = Vec::new();
        if let Some((field, value)) = owner_filter(&owner) {
            qconfig.push((field.to_string(), vec![Bson::from(value)]));
        }

        let current_year = options.current_year.unwrap_or(config.fiscal.current_year);
        let years = years_back(current_year, options.history.max(1));
        let pipelines = fiscal_months(&years)
            .into_iter()
            .map(|month| {
                let mut month_config = qconfig.clone();
                month_config.push(("fiscal_period_id".to_string(), vec![Bson::Int64(month)]));
                make_pipeline(&month_config, &uniq_fields, &val_fields)
            })
            .collect();

        let directory = options
            .filepath
            .as_deref()
            .map(expand_home)
            .unwrap_or_else(|| config.paths.home_dir());
        let prefix = format!("{owner}_{}", BookingDump::COLLECTION);
        let filename = directory.join(timestamped_filename(&prefix, ".xlsx"));

        Ok(Self {
            owner,
            uniq_fields,
            val_fields,
            pipelines,
            filename,
        })
    }

    /// Every field the report carries, group fields first.
    pub fn all_fields(&self) -> Vec<String> {
        self.uniq_fields
            .iter()
            .chain(&self.val_fields)
            .cloned()
            .collect()
    }
}

/// Aggregates `booking_dump` for the planned report and writes the result.
/// Returns the written file.
#[instrument(level = "info", skip(store, report), fields(owner = %report.owner))]
pub fn write_report(
    store: &dyn DocumentStore,
    report: &BookingReport,
    sheet: Option<&str>,
    csv: bool,
) -> Result<PathBuf> {
    info!(pipelines = report.pipelines.len(), "reading data");
    let frame = BookingDump::new(store).read(&report.pipelines)?;

    if csv {
        return excel_write::write_csv(&report.filename, &frame);
    }
    info!("data will be written to {}", report.filename.display());
    excel_write::write_frame(&report.filename, sheet, &frame)?;
    Ok(report.filename.clone())
}

pub fn generate(
    store: &dyn DocumentStore,
    config: &Config,
    options: &GenerateOptions,
) -> Result<PathBuf> {
    let report = BookingReport::plan(config, options)?;
    write_report(store, &report, options.sheet.as_deref(), options.csv)
}
