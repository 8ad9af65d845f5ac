use std::path::Path;

use calamine::{DataType, Range, Reader, open_workbook_auto};
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};

use crate::raptors::etl::error::{EtlError, Result};
use crate::raptors::etl::frame::Frame;
use crate::raptors::etl::model::Cell;

/// Checks that the workbook exists and, when given, that it holds `sheet`.
pub fn validate(path: &Path, sheet: Option<&str>) -> Result<()> {
    if !path.is_file() {
        return Err(EtlError::ExcelFileMissing(path.to_path_buf()));
    }
    if let Some(sheet) = sheet {
        let workbook = open_workbook_auto(path)?;
        if !workbook.sheet_names().iter().any(|name| name == sheet) {
            return Err(EtlError::ExcelSheetMissing {
                path: path.to_path_buf(),
                sheet: sheet.to_string(),
            });
        }
    }
    Ok(())
}

/// Reads `sheet` (or the first sheet) into a frame. The first row supplies
/// the column names.
pub fn read_frame(path: &Path, sheet: Option<&str>) -> Result<Frame> {
    let mut workbook = open_workbook_auto(path)?;
    let range = match sheet {
        Some(name) => workbook.worksheet_range(name),
        None => workbook.worksheet_range_at(0),
    };
    let range = range.ok_or_else(|| EtlError::ExcelSheetMissing {
        path: path.to_path_buf(),
        sheet: sheet.unwrap_or("<first>").to_string(),
    })??;
    Ok(range_to_frame(&range))
}

fn range_to_frame(range: &Range<DataType>) -> Frame {
    let mut rows = range.rows();
    let columns: Vec<String> = match rows.next() {
        Some(header) => header
            .iter()
            .enumerate()
            .map(|(idx, cell)| match cell_to_value(cell) {
                Cell::Null => format!("unnamed_{idx}"),
                value => value.to_string(),
            })
            .collect(),
        None => return Frame::default(),
    };

    let data = rows
        .filter(|row| row.iter().any(|cell| !matches!(cell, DataType::Empty)))
        .map(|row| {
            let mut cells: Vec<Cell> = row.iter().map(cell_to_value).collect();
            cells.resize(columns.len(), Cell::Null);
            cells
        })
        .collect();

    Frame {
        columns,
        rows: data,
    }
}

fn cell_to_value(cell: &DataType) -> Cell {
    match cell {
        DataType::String(value) if value.trim().is_empty() => Cell::Null,
        DataType::String(value) => Cell::Text(value.clone()),
        DataType::Float(value) => Cell::Float(*value),
        DataType::Int(value) => Cell::Int(*value),
        DataType::Bool(value) => Cell::Bool(*value),
        DataType::DateTime(serial) => excel_serial_to_utc(*serial)
            .map(Cell::Timestamp)
            .unwrap_or(Cell::Null),
        DataType::Empty | DataType::Error(_) => Cell::Null,
        other => Cell::Text(other.to_string()),
    }
}

/// Converts an Excel date serial (days since 1899-12-30) into UTC.
fn excel_serial_to_utc(serial: f64) -> Option<DateTime<Utc>> {
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let millis = (serial * 86_400_000.0).round() as i64;
    epoch
        .checked_add_signed(Duration::milliseconds(millis))
        .map(|value| Utc.from_utc_datetime(&value))
}
