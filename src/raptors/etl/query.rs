//! Builders for MongoDB filters and aggregation stages, plus the small
//! parsing helpers the report generators share.

use chrono::Local;
use mongodb::bson::{Bson, Document, doc};

use crate::raptors::etl::error::{EtlError, Result};

/// Field/value configuration turned into a `$match` stage. Insertion order
/// is kept.
pub type QueryConfig = Vec<(String, Vec<Bson>)>;

/// `{ "$or": [ { field: value }, ... ] }`
pub fn make_or(values: &[Bson], field: &str) -> Document {
    let clauses: Vec<Bson> = values
        .iter()
        .map(|value| {
            let mut clause = Document::new();
            clause.insert(field, value.clone());
            Bson::Document(clause)
        })
        .collect();
    doc! { "$or": clauses }
}

/// `{ field: { "$in": [values] }, ... }`
pub fn make_query(config: &QueryConfig) -> Document {
    let mut query = Document::new();
    for (field, values) in config {
        query.insert(field.clone(), doc! { "$in": values.clone() });
    }
    query
}

/// `$group` body keyed on `uniq_fields` and summing `val_fields`.
pub fn make_group(uniq_fields: &[String], val_fields: &[String]) -> Document {
    let mut id = Document::new();
    for field in uniq_fields {
        id.insert(field.clone(), format!("${field}"));
    }
    let mut group = doc! { "_id": id };
    for field in val_fields {
        group.insert(field.clone(), doc! { "$sum": format!("${field}") });
    }
    group
}

/// `$project` body flattening the group key back into top-level fields.
pub fn make_project(uniq_fields: &[String], val_fields: &[String]) -> Document {
    let mut project = doc! { "_id": 0 };
    for field in uniq_fields {
        project.insert(field.clone(), format!("$_id.{field}"));
    }
    for field in val_fields {
        project.insert(field.clone(), 1);
    }
    project
}

/// Full `[$match, $group, $project]` pipeline.
pub fn make_pipeline(
    config: &QueryConfig,
    uniq_fields: &[String],
    val_fields: &[String],
) -> Vec<Document> {
    vec![
        doc! { "$match": make_query(config) },
        doc! { "$group": make_group(uniq_fields, val_fields) },
        doc! { "$project": make_project(uniq_fields, val_fields) },
    ]
}

/// Sales-level restriction attached to a report owner.
pub fn owner_filter(owner: &str) -> Option<(&'static str, &'static str)> {
    match owner.to_lowercase().as_str() {
        "sudhir" | "comm" | "commercial" | "nayar" => Some(("sales_level_3", "INDIA_COMM_1")),
        "mukund" | "mukundhan" | "sw_geo" | "sw-geo" => {
            Some(("sales_level_4", "INDIA_COMM_SW_GEO"))
        }
        "tm" | "tirthankar" | "sl_tl" | "sl-tl" => Some(("sales_level_4", "INDIA_COMM_SL_TL")),
        "vipul" | "ne_geo" | "ne-geo" => Some(("sales_level_4", "INDIA_COMM_NE_GEO")),
        "fakhruddhin" | "fakhrudhin" | "bd" | "bangladesh" => {
            Some(("sales_level_4", "INDIA_COMM_BD"))
        }
        _ => None,
    }
}

/// Whether a field config entry adds or removes a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSwitch {
    Add,
    Remove,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldConfig {
    pub switch: FieldSwitch,
    pub field: String,
}

/// Parses `a:field` / `r:field` entries; `,` and `|` also separate.
pub fn parse_field_config<S: AsRef<str>>(args: &[S]) -> Result<Vec<FieldConfig>> {
    args.iter()
        .map(|arg| {
            let arg = arg.as_ref();
            let mut parts = arg.splitn(2, [':', ',', '|']);
            let switch = parts.next().unwrap_or_default().trim().to_lowercase();
            let field = parts.next().unwrap_or_default().trim();
            if field.is_empty() {
                return Err(EtlError::InvalidFieldConfig(arg.to_string()));
            }
            let switch = match switch.as_str() {
                "a" => FieldSwitch::Add,
                "r" => FieldSwitch::Remove,
                _ => return Err(EtlError::InvalidFieldConfig(arg.to_string())),
            };
            Ok(FieldConfig {
                switch,
                field: field.to_string(),
            })
        })
        .collect()
}

/// Applies parsed field configs: additions extend the group fields,
/// removals drop from the group fields first, then from the value fields.
pub fn apply_field_config(
    configs: &[FieldConfig],
    uniq_fields: &mut Vec<String>,
    val_fields: &mut Vec<String>,
) {
    for config in configs {
        match config.switch {
            FieldSwitch::Add => uniq_fields.push(config.field.clone()),
            FieldSwitch::Remove => {
                if let Some(idx) = uniq_fields.iter().position(|f| *f == config.field) {
                    uniq_fields.remove(idx);
                } else if let Some(idx) = val_fields.iter().position(|f| *f == config.field) {
                    val_fields.remove(idx);
                }
            }
        }
    }
}

/// `[current, current - 1, ...]`, `history` entries long.
pub fn years_back(current: i32, history: u32) -> Vec<i32> {
    let history = i32::try_from(history).unwrap_or(i32::MAX);
    (0..history).map(|offset| current.saturating_sub(offset)).collect()
}

/// `YYYYMM` for every month of each year, in year order.
pub fn fiscal_months(years: &[i32]) -> Vec<i64> {
    years
        .iter()
        .flat_map(|year| (1..=12).map(move |month| i64::from(*year) * 100 + month))
        .collect()
}

/// Local time formatted as `dd-mm-YYYY-HHMM`.
pub fn time_string() -> String {
    Local::now().format("%d-%m-%Y-%H%M").to_string()
}

/// `{prefix}_{dd-mm-YYYY-HHMM}{extension}`
pub fn timestamped_filename(prefix: &str, extension: &str) -> String {
    format!("{prefix}_{}{extension}", time_string())
}
