use std::path::{Path, PathBuf};

use rust_xlsxwriter::{Workbook, Worksheet};
use tracing::info;

use crate::raptors::etl::error::Result;
use crate::raptors::etl::frame::Frame;
use crate::raptors::etl::model::Cell;

/// Sheet name used when the caller does not supply one.
pub const DEFAULT_SHEET: &str = "Sheet1";

/// Writes the frame as the only sheet of a new workbook at `path`.
pub fn write_frame(path: &Path, sheet: Option<&str>, frame: &Frame) -> Result<()> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(sheet.unwrap_or(DEFAULT_SHEET))?;

    for (col_idx, header) in frame.columns.iter().enumerate() {
        worksheet.write_string(0, col_idx as u16, header)?;
    }

    for (row_idx, row) in frame.rows.iter().enumerate() {
        for (col_idx, cell) in row.iter().enumerate() {
            write_cell(worksheet, (row_idx + 1) as u32, col_idx as u16, cell)?;
        }
    }

    workbook.save(path)?;
    info!(rows = frame.rows.len(), path = %path.display(), "workbook written");
    Ok(())
}

/// Writes the frame as CSV next to `path`, swapping its extension.
pub fn write_csv(path: &Path, frame: &Frame) -> Result<PathBuf> {
    let path = path.with_extension("csv");
    let mut writer = csv::Writer::from_path(&path)?;
    writer.write_record(&frame.columns)?;
    for row in &frame.rows {
        writer.write_record(row.iter().map(|cell| cell.render().unwrap_or_default()))?;
    }
    writer.flush()?;
    info!(rows = frame.rows.len(), path = %path.display(), "csv written");
    Ok(path)
}

/// Largest magnitude an xlsx number holds without rounding.
const MAX_EXACT_INT: u64 = 1 << 53;

fn write_cell(worksheet: &mut Worksheet, row: u32, col: u16, cell: &Cell) -> Result<()> {
    match cell {
        Cell::Null => {}
        Cell::Bool(value) => {
            worksheet.write_boolean(row, col, *value)?;
        }
        Cell::Int(value) if value.unsigned_abs() <= MAX_EXACT_INT => {
            worksheet.write_number(row, col, *value as f64)?;
        }
        Cell::Int(value) => {
            worksheet.write_string(row, col, value.to_string())?;
        }
        Cell::Float(value) => {
            worksheet.write_number(row, col, *value)?;
        }
        Cell::Text(value) => {
            worksheet.write_string(row, col, value)?;
        }
        Cell::Timestamp(value) => {
            worksheet.write_string(row, col, value.format("%Y-%m-%d %H:%M:%S").to_string())?;
        }
    }
    Ok(())
}
