//! Cleaning rules for the booking (`ent_dump_from_finance`) and SFDC
//! (`sfdc_raw_dump`) dumps.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::{info, warn};

use crate::raptors::etl::error::Result;
use crate::raptors::etl::frame::{Frame, head_chars, tail_chars};
use crate::raptors::etl::io::excel_write;
use crate::raptors::etl::model::Cell;
use crate::raptors::etl::readers::mappers::{Mapper, MasterUniqueNames, Sl5ToSegments, TechSpec1};

/// Unmapped-row counts found after the mapping joins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnmappedReport {
    pub technologies: usize,
    pub segments: usize,
    pub unique_customers: usize,
}

impl UnmappedReport {
    pub fn total(&self) -> usize {
        self.technologies + self.segments + self.unique_customers
    }
}

/// Behaviour shared by both dumps.
pub trait SalesDump {
    fn frame(&self) -> &Frame;
    fn frame_mut(&mut self) -> &mut Frame;

    fn upcase_customer_names(&mut self) {
        self.frame_mut().upcase_column("customer_name");
    }

    fn downcase_customer_names(&mut self) {
        self.frame_mut().downcase_column("customer_name");
    }

    fn upcase_partner_names(&mut self) {
        self.frame_mut().upcase_column("partner_name");
    }

    fn downcase_partner_names(&mut self) {
        self.frame_mut().downcase_column("partner_name");
    }

    fn map_technologies(&mut self, mapper: &TechSpec1) -> Result<()> {
        map_with(self.frame_mut(), mapper)
    }

    fn map_segments(&mut self, mapper: &Sl5ToSegments) -> Result<()> {
        map_with(self.frame_mut(), mapper)
    }

    fn map_unique_names(&mut self, mapper: &MasterUniqueNames) -> Result<()> {
        map_with(self.frame_mut(), mapper)
    }

    /// Folds legacy sales-level-4 names into their current territory.
    fn validate_sl4(&mut self) {
        info!("validating sales_level_4 column");
        let column = "sales_level_4";
        let frame = self.frame_mut();
        let is = |value: &'static str| move |cell: &Cell| cell.as_str() == Some(value);
        let masks = vec![
            (
                Cell::text("INDIA_COMM_SW_GEO"),
                frame.mask(column, |cell| {
                    matches!(cell.as_str(), Some("INDIA_COMM_WST" | "INDIA_COMM_STH"))
                }),
            ),
            (
                Cell::text("INDIA_COMM_NE_GEO"),
                frame.mask(column, is("INDIA_COMM_NORTH_EAST")),
            ),
            (
                Cell::text("INDIA_COMM_MISC"),
                frame.mask(column, is("INDIA_COMM_1-MISCL4")),
            ),
        ];
        frame.fill_column_by_mask(masks, column);
    }
}

fn map_with<M: Mapper>(frame: &mut Frame, mapper: &M) -> Result<()> {
    frame.left_join(mapper.frame(), M::KEY, M::DESCRIPTION)
}

fn starts_with_any(cell: &Cell, prefixes: &[&str]) -> bool {
    cell.render()
        .is_some_and(|value| prefixes.iter().any(|prefix| value.starts_with(prefix)))
}

/// Counts rows whose `marker` column is null and, when any exist, writes
/// `columns` of those rows to `file_name` inside `out_dir`.
fn report_unmapped(
    frame: &Frame,
    marker: &str,
    columns: &[&str],
    label: &str,
    out_dir: &Path,
    file_name: &str,
) -> Result<usize> {
    let mask = frame.mask(marker, Cell::is_null);
    let unmapped = mask.iter().filter(|selected| **selected).count();
    if unmapped > 0 {
        warn!("{unmapped} row(s) of unmapped {label} data found");
        let rows = frame.filter_rows(&mask).select(columns);
        excel_write::write_frame(&out_dir.join(file_name), None, &rows)?;
    }
    Ok(unmapped)
}

fn report_unmapped_technologies(frame: &Frame, out_dir: &Path) -> Result<usize> {
    report_unmapped(
        frame,
        "arch2",
        &["internal_sub_business_entity_name", "arch2"],
        "'internal_sub_business_entity_name'",
        out_dir,
        "unmapped_technologies.xlsx",
    )
}

fn report_unmapped_segments(frame: &Frame, out_dir: &Path) -> Result<usize> {
    report_unmapped(
        frame,
        "rm_name",
        &["sales_level_5", "rm_name"],
        "'sales_level_5'",
        out_dir,
        "unmapped_segments.xlsx",
    )
}

/// Cleaned view of `ent_dump_from_finance`.
#[derive(Debug, Clone, Default)]
pub struct EntBookingDump {
    pub frame: Frame,
}

impl SalesDump for EntBookingDump {
    fn frame(&self) -> &Frame {
        &self.frame
    }

    fn frame_mut(&mut self) -> &mut Frame {
        &mut self.frame
    }
}

impl EntBookingDump {
    pub const COLLECTION: &'static str = "ent_dump_from_finance";

    pub fn new(frame: Frame) -> Self {
        Self { frame }
    }

    pub fn renamable_columns() -> BTreeMap<String, String> {
        BTreeMap::from([
            (
                "tms_sales_allocated_bookings_base_list".to_string(),
                "base_list".to_string(),
            ),
            ("tbm".to_string(), "sales_agent".to_string()),
        ])
    }

    pub fn rename_columns_neatly(&mut self) {
        self.frame.rename_columns(&Self::renamable_columns());
    }

    pub fn make_fiscal_year_id_column(&mut self) {
        self.frame
            .make_new_column("fiscal_quarter_id", "fiscal_year_id", |cell| head_chars(cell, 4));
    }

    pub fn make_fiscal_quarter_column(&mut self) {
        self.frame
            .make_new_column("fiscal_quarter_id", "fiscal_quarter", |cell| tail_chars(cell, 2));
    }

    pub fn make_fiscal_month_id_column(&mut self) {
        self.frame
            .make_new_column("fiscal_period_id", "fiscal_month_id", |cell| tail_chars(cell, 2));
    }

    pub fn make_prod_serv_column(&mut self) {
        info!("making 'prod_serv' column");
        self.frame.map_values(
            "services_indicator",
            "prod_serv",
            &[("N", "products"), ("Y", "services")],
        );
    }

    pub fn make_cloud_flag_column(&mut self) {
        info!("making 'cloud_flag' column");
        let leased = self
            .frame
            .mask("bookings_adjustments_code", |cell| starts_with_any(cell, &["L"]));
        let owned: Vec<bool> = leased.iter().map(|flag| !flag).collect();
        self.frame.fill_column_by_mask(
            vec![(Cell::text("N"), leased), (Cell::text("Y"), owned)],
            "cloud_flag",
        );
    }

    pub fn make_tier_code_column(&mut self) {
        info!("making 'tier_code' column");
        let pos = self.frame.mask("bookings_adjustments_type", |cell| {
            starts_with_any(cell, &["POS", "DSV"])
        });
        let paper: Vec<bool> = pos.iter().map(|flag| !flag).collect();
        self.frame.fill_column_by_mask(
            vec![(Cell::text("POS"), pos), (Cell::text("New Paper"), paper)],
            "tier_code",
        );
    }

    /// Writes the unmapped-row workbooks into `out_dir`.
    pub fn validate_mapping(&self, out_dir: &Path) -> Result<UnmappedReport> {
        Ok(UnmappedReport {
            technologies: report_unmapped_technologies(&self.frame, out_dir)?,
            segments: report_unmapped_segments(&self.frame, out_dir)?,
            unique_customers: report_unmapped(
                &self.frame,
                "acc_name",
                &["customer_name", "grp_name"],
                "unique customers",
                out_dir,
                "unmapped_unique_customers.xlsx",
            )?,
        })
    }
}

/// Cleaned view of `sfdc_raw_dump`.
#[derive(Debug, Clone, Default)]
pub struct SfdcDump {
    pub frame: Frame,
}

impl SalesDump for SfdcDump {
    fn frame(&self) -> &Frame {
        &self.frame
    }

    fn frame_mut(&mut self) -> &mut Frame {
        &mut self.frame
    }
}

impl SfdcDump {
    pub const COLLECTION: &'static str = "sfdc_raw_dump";

    pub fn new(frame: Frame) -> Self {
        Self { frame }
    }

    /// `past_due` is TRUE once the expected booking date has passed.
    pub fn make_past_due_column(&mut self) {
        info!("validating 'past_due' column");
        let column = "no_of_days_past_ebd";
        let early = self
            .frame
            .mask(column, |cell| cell.as_f64().is_some_and(|days| days < 0.0));
        let late = self
            .frame
            .mask(column, |cell| cell.as_f64().is_some_and(|days| days >= 0.0));
        self.frame.fill_column_by_mask(
            vec![(Cell::text("FALSE"), early), (Cell::text("TRUE"), late)],
            "past_due",
        );
    }

    pub fn make_fiscal_year_id_column(&mut self) {
        self.frame
            .make_new_column("fiscal_period", "fiscal_year_id", |cell| tail_chars(cell, 4));
    }

    pub fn make_fiscal_quarter_column(&mut self) {
        self.frame
            .make_new_column("fiscal_period", "fiscal_quarter", |cell| head_chars(cell, 2));
    }

    pub fn make_fiscal_quarter_id_column(&mut self) {
        self.frame
            .make_new_column("fiscal_period", "fiscal_quarter_id", |cell| {
                match (tail_chars(cell, 4), head_chars(cell, 2)) {
                    (Cell::Text(year), Cell::Text(quarter)) => Cell::Text(year + &quarter),
                    _ => Cell::Null,
                }
            });
    }

    pub fn make_fiscal_month_id_column(&mut self) {
        self.frame
            .make_new_column("fiscal_month", "fiscal_month_id", Cell::clone);
    }

    pub fn make_prod_serv_column(&mut self) {
        info!("making 'prod_serv' column");
        self.frame.map_values(
            "technology_service_code",
            "prod_serv",
            &[("Technology", "products"), ("Service", "services")],
        );
    }

    pub fn validate_mapping(&self, out_dir: &Path) -> Result<UnmappedReport> {
        Ok(UnmappedReport {
            technologies: report_unmapped_technologies(&self.frame, out_dir)?,
            segments: report_unmapped_segments(&self.frame, out_dir)?,
            unique_customers: 0,
        })
    }
}
