use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::Utc;
use mongodb::bson::Document;
use tracing::info;

use crate::raptors::etl::error::{EtlError, Result};
use crate::raptors::etl::model::{Cell, CellKey};

/// Column added by [`Frame::add_timestamp`].
pub const TIMESTAMP_COLUMN: &str = "timestamp";

/// An in-memory table of cells. Column names may repeat after a rename; the
/// first occurrence wins on lookups.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

/// Ordered list of `(filler, mask)` pairs; later masks win.
pub type Masks = Vec<(Cell, Vec<bool>)>;

impl Frame {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Builds a frame from string column names and rows.
    pub fn from_rows<S: Into<String>>(columns: Vec<S>, rows: Vec<Vec<Cell>>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows,
        }
    }

    /// Builds a frame from documents, collecting columns in first-seen order.
    pub fn from_documents(documents: &[Document]) -> Self {
        let mut columns: Vec<String> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();
        for document in documents {
            for key in document.keys() {
                if !positions.contains_key(key) {
                    positions.insert(key.clone(), columns.len());
                    columns.push(key.clone());
                }
            }
        }

        let rows = documents
            .iter()
            .map(|document| {
                columns
                    .iter()
                    .map(|column| document.get(column).map(Cell::from_bson).unwrap_or(Cell::Null))
                    .collect()
            })
            .collect();

        Self { columns, rows }
    }

    /// Converts every row into a document, in column order.
    pub fn to_documents(&self) -> Result<Vec<Document>> {
        (0..self.rows.len()).map(|idx| self.row_document(idx)).collect()
    }

    /// Converts one row into a document.
    pub fn row_document(&self, row_idx: usize) -> Result<Document> {
        let mut document = Document::new();
        for (column, cell) in self.columns.iter().zip(&self.rows[row_idx]) {
            if document.contains_key(column) {
                continue;
            }
            document.insert(column.clone(), cell.to_bson(column)?);
        }
        Ok(document)
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows.len(), self.columns.len())
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    /// Value at `row_idx` in `column`; absent columns read as `Null`.
    pub fn get(&self, row_idx: usize, column: &str) -> &Cell {
        static NULL: Cell = Cell::Null;
        self.column_index(column)
            .and_then(|col_idx| self.rows.get(row_idx).and_then(|row| row.get(col_idx)))
            .unwrap_or(&NULL)
    }

    /// All cells of a column; absent columns read as `Null`.
    pub fn column(&self, name: &str) -> Vec<Cell> {
        match self.column_index(name) {
            Some(col_idx) => self.rows.iter().map(|row| row[col_idx].clone()).collect(),
            None => vec![Cell::Null; self.rows.len()],
        }
    }

    /// Renames every column whose name is a key of `mapper`.
    pub fn rename_columns(&mut self, mapper: &BTreeMap<String, String>) {
        for column in &mut self.columns {
            if let Some(renamed) = mapper.get(column) {
                *column = renamed.clone();
            }
        }
    }

    pub fn upcase_colnames(&mut self) {
        for column in &mut self.columns {
            *column = column.to_uppercase();
        }
    }

    pub fn downcase_colnames(&mut self) {
        for column in &mut self.columns {
            *column = column.to_lowercase();
        }
    }

    /// Returns the index of `name`, appending a `Null` column when missing.
    fn ensure_column(&mut self, name: &str) -> usize {
        match self.column_index(name) {
            Some(col_idx) => col_idx,
            None => {
                self.columns.push(name.to_string());
                for row in &mut self.rows {
                    row.push(Cell::Null);
                }
                self.columns.len() - 1
            }
        }
    }

    /// Derives `target` from `source` cell by cell. A missing source column
    /// reads as `Null`.
    pub fn make_new_column<F>(&mut self, source: &str, target: &str, derive: F)
    where
        F: Fn(&Cell) -> Cell,
    {
        let values: Vec<Cell> = self.column(source).iter().map(derive).collect();
        let target_idx = self.ensure_column(target);
        for (row, value) in self.rows.iter_mut().zip(values) {
            row[target_idx] = value;
        }
    }

    /// Dictionary lookup on `source`; values without an entry become `Null`.
    pub fn map_values(&mut self, source: &str, target: &str, mapper: &[(&str, &str)]) {
        self.make_new_column(source, target, |cell| {
            cell.as_str()
                .and_then(|value| mapper.iter().find(|(from, _)| *from == value))
                .map(|(_, to)| Cell::text(*to))
                .unwrap_or(Cell::Null)
        });
    }

    pub fn upcase_column(&mut self, column: &str) {
        self.transform_text(column, str::to_uppercase);
    }

    pub fn downcase_column(&mut self, column: &str) {
        self.transform_text(column, str::to_lowercase);
    }

    fn transform_text(&mut self, column: &str, transform: fn(&str) -> String) {
        let Some(col_idx) = self.column_index(column) else {
            return;
        };
        for row in &mut self.rows {
            if let Cell::Text(value) = &mut row[col_idx] {
                *value = transform(value);
            }
        }
    }

    /// Keeps the first row for each combination of `subset` values.
    pub fn remove_duplicates(&mut self, subset: &[&str], description: &str) {
        let (rows, cols) = self.shape();
        info!("before performing {description} mapping, the frame contained {rows} row(s) {cols} col(s)");

        let indices: Vec<Option<usize>> =
            subset.iter().map(|column| self.column_index(column)).collect();
        let mut seen: HashSet<Vec<CellKey>> = HashSet::new();
        self.rows.retain(|row| {
            let key = indices
                .iter()
                .map(|idx| idx.map(|idx| row[idx].key()).unwrap_or(CellKey::Null))
                .collect();
            seen.insert(key)
        });

        let (rows, cols) = self.shape();
        info!("after performing {description} mapping, the frame contains {rows} row(s) {cols} col(s)");
    }

    /// Left-merges `other` on `on`. Overlapping non-key columns receive `_x`
    /// and `_y` suffixes. Fails when the row count changes.
    pub fn left_join(&mut self, other: &Frame, on: &str, description: &str) -> Result<()> {
        let (before, cols) = self.shape();
        info!("before performing {description} mapping, the frame contained {before} row(s) {cols} col(s)");

        let missing = |side: &str| EtlError::ColumnMissing {
            context: format!("{description} mapping ({side})"),
            column: on.to_string(),
        };
        let left_key_idx = self.column_index(on).ok_or_else(|| missing("left"))?;
        let right_key_idx = other.column_index(on).ok_or_else(|| missing("right"))?;
        let right_columns: Vec<usize> = (0..other.columns.len())
            .filter(|idx| *idx != right_key_idx)
            .collect();

        let left_names: HashSet<&str> = self.columns.iter().map(String::as_str).collect();
        let right_names: HashSet<&str> = right_columns
            .iter()
            .map(|idx| other.columns[*idx].as_str())
            .collect();

        let mut columns: Vec<String> = self
            .columns
            .iter()
            .map(|column| {
                if column != on && right_names.contains(column.as_str()) {
                    format!("{column}_x")
                } else {
                    column.clone()
                }
            })
            .collect();
        for idx in &right_columns {
            let column = &other.columns[*idx];
            if left_names.contains(column.as_str()) {
                columns.push(format!("{column}_y"));
            } else {
                columns.push(column.clone());
            }
        }

        let mut lookup: HashMap<CellKey, Vec<usize>> = HashMap::new();
        for (row_idx, row) in other.rows.iter().enumerate() {
            lookup.entry(row[right_key_idx].key()).or_default().push(row_idx);
        }

        let mut rows = Vec::with_capacity(self.rows.len());
        for row in &self.rows {
            match lookup.get(&row[left_key_idx].key()) {
                Some(matches) => {
                    for right_idx in matches {
                        let mut merged = row.clone();
                        merged.extend(
                            right_columns
                                .iter()
                                .map(|idx| other.rows[*right_idx][*idx].clone()),
                        );
                        rows.push(merged);
                    }
                }
                None => {
                    let mut merged = row.clone();
                    merged.extend(right_columns.iter().map(|_| Cell::Null));
                    rows.push(merged);
                }
            }
        }

        self.columns = columns;
        self.rows = rows;

        let (after, cols) = self.shape();
        info!("after performing {description} mapping, the frame contains {after} row(s) {cols} col(s)");
        if after != before {
            return Err(EtlError::MappingRowsExceeded {
                description: description.to_string(),
                before,
                after,
            });
        }
        Ok(())
    }

    /// Drops every column carrying one of the given names.
    pub fn delete_columns(&mut self, names: &[&str]) {
        let keep: Vec<bool> = self
            .columns
            .iter()
            .map(|column| !names.contains(&column.as_str()))
            .collect();
        let mut flags = keep.iter();
        self.columns.retain(|_| *flags.next().unwrap_or(&true));
        for row in &mut self.rows {
            let mut flags = keep.iter();
            row.retain(|_| *flags.next().unwrap_or(&true));
        }
    }

    /// Replaces every `Null` with `value`.
    pub fn fill_not_applicables(&mut self, value: Cell) {
        for row in &mut self.rows {
            for cell in row.iter_mut().filter(|cell| cell.is_null()) {
                *cell = value.clone();
            }
        }
    }

    /// Distinct values of `field` in first-seen order.
    pub fn uniques(&self, field: &str) -> Vec<Cell> {
        let mut seen = HashSet::new();
        self.column(field)
            .into_iter()
            .filter(|cell| seen.insert(cell.key()))
            .collect()
    }

    /// Boolean mask from a predicate over one column.
    pub fn mask<F>(&self, column: &str, predicate: F) -> Vec<bool>
    where
        F: Fn(&Cell) -> bool,
    {
        self.column(column).iter().map(predicate).collect()
    }

    /// Writes each filler into `column` where its mask is set.
    pub fn fill_column_by_mask(&mut self, masks: Masks, column: &str) {
        let col_idx = self.ensure_column(column);
        for (filler, mask) in masks {
            for (row, selected) in self.rows.iter_mut().zip(mask) {
                if selected {
                    row[col_idx] = filler.clone();
                }
            }
        }
    }

    /// Appends the rows of `other`, aligning columns by name.
    pub fn append(&mut self, other: Frame) {
        if self.columns.is_empty() && self.rows.is_empty() {
            *self = other;
            return;
        }
        let positions: Vec<usize> = other
            .columns
            .iter()
            .map(|column| self.ensure_column(column))
            .collect();
        let width = self.columns.len();
        for row in other.rows {
            let mut aligned = vec![Cell::Null; width];
            for (cell, position) in row.into_iter().zip(&positions) {
                aligned[*position] = cell;
            }
            self.rows.push(aligned);
        }
    }

    /// Sets the `timestamp` column to the current time for every row.
    pub fn add_timestamp(&mut self) {
        let now = Cell::Timestamp(Utc::now());
        self.make_new_column(TIMESTAMP_COLUMN, TIMESTAMP_COLUMN, |_| now.clone());
    }

    /// Rows whose mask entry is set.
    pub fn filter_rows(&self, mask: &[bool]) -> Frame {
        let rows = self
            .rows
            .iter()
            .zip(mask)
            .filter(|(_, selected)| **selected)
            .map(|(row, _)| row.clone())
            .collect();
        Frame {
            columns: self.columns.clone(),
            rows,
        }
    }

    /// Projection onto `columns`; absent columns read as `Null`.
    pub fn select(&self, columns: &[&str]) -> Frame {
        let indices: Vec<Option<usize>> =
            columns.iter().map(|column| self.column_index(column)).collect();
        let rows = self
            .rows
            .iter()
            .map(|row| {
                indices
                    .iter()
                    .map(|idx| idx.map(|idx| row[idx].clone()).unwrap_or(Cell::Null))
                    .collect()
            })
            .collect();
        Frame {
            columns: columns.iter().map(|column| column.to_string()).collect(),
            rows,
        }
    }
}

/// First `count` characters of the rendered cell.
pub fn head_chars(cell: &Cell, count: usize) -> Cell {
    cell.render()
        .map(|value| Cell::Text(value.chars().take(count).collect()))
        .unwrap_or(Cell::Null)
}

/// Last `count` characters of the rendered cell.
pub fn tail_chars(cell: &Cell, count: usize) -> Cell {
    cell.render()
        .map(|value| {
            let skip = value.chars().count().saturating_sub(count);
            Cell::Text(value.chars().skip(skip).collect())
        })
        .unwrap_or(Cell::Null)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Frame {
        Frame::from_rows(
            vec!["customer_name", "sales_level_5", "amount"],
            vec![
                vec![Cell::text("acme"), Cell::text("SL5_A"), Cell::Int(10)],
                vec![Cell::text("globex"), Cell::text("SL5_B"), Cell::Null],
                vec![Cell::text("initech"), Cell::text("SL5_C"), Cell::Float(2.5)],
            ],
        )
    }

    #[test]
    fn left_join_adds_columns_and_nulls_for_unmatched_rows() {
        let mut frame = sample();
        let segments = Frame::from_rows(
            vec!["sales_level_5", "rm_name"],
            vec![
                vec![Cell::text("SL5_A"), Cell::text("Asha")],
                vec![Cell::text("SL5_B"), Cell::text("Ravi")],
            ],
        );

        frame.left_join(&segments, "sales_level_5", "Segment").expect("joined");

        assert_eq!(frame.shape(), (3, 4));
        assert_eq!(frame.get(0, "rm_name"), &Cell::text("Asha"));
        assert_eq!(frame.get(2, "rm_name"), &Cell::Null);
    }

    #[test]
    fn left_join_aborts_when_rows_multiply() {
        let mut frame = sample();
        let segments = Frame::from_rows(
            vec!["sales_level_5", "rm_name"],
            vec![
                vec![Cell::text("SL5_A"), Cell::text("Asha")],
                vec![Cell::text("SL5_A"), Cell::text("Ravi")],
            ],
        );

        let error = frame
            .left_join(&segments, "sales_level_5", "Segment")
            .unwrap_err();
        assert!(matches!(
            error,
            EtlError::MappingRowsExceeded { before: 3, after: 4, .. }
        ));
    }

    #[test]
    fn left_join_suffixes_overlapping_columns() {
        let mut frame = sample();
        let other = Frame::from_rows(
            vec!["customer_name", "amount"],
            vec![vec![Cell::text("acme"), Cell::Int(99)]],
        );

        frame.left_join(&other, "customer_name", "Overlap").expect("joined");

        assert_eq!(
            frame.columns,
            vec!["customer_name", "sales_level_5", "amount_x", "amount_y"]
        );
        assert_eq!(frame.get(0, "amount_y"), &Cell::Int(99));
    }

    #[test]
    fn left_join_requires_the_key_on_both_sides() {
        let mut frame = sample();
        let keyless = Frame::from_rows(
            vec!["rm_name"],
            vec![vec![Cell::text("Asha")]],
        );

        let error = frame
            .left_join(&keyless, "sales_level_5", "Segment")
            .unwrap_err();
        assert!(matches!(
            error,
            EtlError::ColumnMissing { ref column, .. } if column == "sales_level_5"
        ));
        assert_eq!(frame, sample());

        let error = frame
            .left_join(&sample(), "internal_sub_business_entity_name", "Technology")
            .unwrap_err();
        assert!(matches!(error, EtlError::ColumnMissing { .. }));
        assert_eq!(frame, sample());
    }

    #[test]
    fn rename_keeps_every_value() {
        let mut frame = sample();
        let before: Vec<Cell> = frame.column("amount");
        let mapper = BTreeMap::from([("amount".to_string(), "base_list".to_string())]);

        frame.rename_columns(&mapper);

        assert_eq!(frame.column("base_list"), before);
        assert_eq!(frame.column_index("amount"), None);
        assert_eq!(frame.shape(), (3, 3));
    }

    #[test]
    fn duplicate_renamed_columns_are_all_deleted() {
        let mut frame = sample();
        let mapper = BTreeMap::from([
            ("sales_level_5".to_string(), "not_to_be_mapped".to_string()),
            ("amount".to_string(), "not_to_be_mapped".to_string()),
        ]);
        frame.rename_columns(&mapper);
        frame.delete_columns(&["not_to_be_mapped"]);

        assert_eq!(frame.columns, vec!["customer_name"]);
        assert!(frame.rows.iter().all(|row| row.len() == 1));
    }

    #[test]
    fn remove_duplicates_keeps_first_row() {
        let mut frame = Frame::from_rows(
            vec!["names", "acc_name"],
            vec![
                vec![Cell::text("ACME"), Cell::text("first")],
                vec![Cell::text("ACME"), Cell::text("second")],
                vec![Cell::text("GLOBEX"), Cell::text("third")],
            ],
        );
        frame.remove_duplicates(&["names"], "Redundancy removal");
        assert_eq!(frame.column("acc_name"), vec![Cell::text("first"), Cell::text("third")]);
    }

    #[test]
    fn masks_apply_in_order_and_create_column() {
        let mut frame = sample();
        let upper = frame.mask("customer_name", |cell| cell.as_str() == Some("acme"));
        let everything = vec![true; 3];
        frame.fill_column_by_mask(
            vec![(Cell::text("Y"), everything), (Cell::text("N"), upper)],
            "cloud_flag",
        );
        assert_eq!(
            frame.column("cloud_flag"),
            vec![Cell::text("N"), Cell::text("Y"), Cell::text("Y")]
        );
    }

    #[test]
    fn append_aligns_columns() {
        let mut frame = Frame::from_rows(vec!["a"], vec![vec![Cell::Int(1)]]);
        frame.append(Frame::from_rows(vec!["b", "a"], vec![vec![Cell::Int(3), Cell::Int(2)]]));
        assert_eq!(frame.columns, vec!["a", "b"]);
        assert_eq!(frame.rows[0], vec![Cell::Int(1), Cell::Null]);
        assert_eq!(frame.rows[1], vec![Cell::Int(2), Cell::Int(3)]);
    }

    #[test]
    fn fill_and_case_helpers_leave_numbers_alone() {
        let mut frame = sample();
        frame.fill_not_applicables(Cell::Int(0));
        frame.upcase_column("customer_name");
        frame.upcase_column("amount");
        assert_eq!(frame.get(1, "amount"), &Cell::Int(0));
        assert_eq!(frame.get(0, "customer_name"), &Cell::text("ACME"));
    }

    #[test]
    fn slicing_helpers_work_on_rendered_numbers() {
        assert_eq!(head_chars(&Cell::text("2018Q1"), 4), Cell::text("2018"));
        assert_eq!(tail_chars(&Cell::Float(201803.0), 2), Cell::text("03"));
        assert_eq!(tail_chars(&Cell::Null, 2), Cell::Null);
    }

    #[test]
    fn uniques_preserve_first_seen_order() {
        let frame = Frame::from_rows(
            vec!["fiscal_week_id"],
            vec![vec![Cell::Int(3)], vec![Cell::Int(1)], vec![Cell::Float(3.0)]],
        );
        assert_eq!(frame.uniques("fiscal_week_id"), vec![Cell::Int(3), Cell::Int(1)]);
    }
}
