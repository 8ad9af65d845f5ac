//! In-memory [`DocumentStore`] that evaluates the subset of MongoDB filters
//! and aggregation stages this tool emits: equality, `$in`, `$nin`, `$eq`,
//! `$ne`, comparisons, `$exists`, `$or`, `$and`, and the `$match`, `$group`
//! (`$sum`) and `$project` stages.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::BTreeMap;

use mongodb::bson::oid::ObjectId;
use mongodb::bson::{Bson, Document};

use crate::raptors::etl::error::Result;
use crate::raptors::etl::io::store::DocumentStore;

#[derive(Debug, Default)]
pub struct MemoryStore {
    name: String,
    collections: RefCell<BTreeMap<String, Vec<Document>>>,
}

impl MemoryStore {
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            name: database.into(),
            collections: RefCell::new(BTreeMap::new()),
        }
    }

    /// Seeds `collection` with `documents`, replacing previous content.
    pub fn with_collection(self, collection: &str, documents: Vec<Document>) -> Self {
        self.collections
            .borrow_mut()
            .insert(collection.to_string(), documents);
        self
    }

    /// Snapshot of a collection's documents.
    pub fn documents(&self, collection: &str) -> Vec<Document> {
        self.collections
            .borrow()
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }
}

impl DocumentStore for MemoryStore {
    fn database_name(&self) -> &str {
        &self.name
    }

    fn find(
        &self,
        collection: &str,
        filter: Document,
        projection: Option<Document>,
    ) -> Result<Vec<Document>> {
        let documents = self
            .documents(collection)
            .into_iter()
            .filter(|document| matches_filter(document, &filter))
            .map(|document| match &projection {
                Some(projection) => project(&document, projection),
                None => document,
            })
            .collect();
        Ok(documents)
    }

    fn aggregate(&self, collection: &str, pipeline: Vec<Document>) -> Result<Vec<Document>> {
        let mut documents = self.documents(collection);
        for stage in &pipeline {
            for (operator, body) in stage {
                let Bson::Document(body) = body else {
                    continue;
                };
                documents = match operator.as_str() {
                    "$match" => documents
                        .into_iter()
                        .filter(|document| matches_filter(document, body))
                        .collect(),
                    "$group" => group(&documents, body),
                    "$project" => documents
                        .iter()
                        .map(|document| project(document, body))
                        .collect(),
                    _ => documents,
                };
            }
        }
        Ok(documents)
    }

    fn count(&self, collection: &str, filter: Document) -> Result<u64> {
        Ok(self
            .collections
            .borrow()
            .get(collection)
            .map(|documents| {
                documents
                    .iter()
                    .filter(|document| matches_filter(document, &filter))
                    .count() as u64
            })
            .unwrap_or(0))
    }

    fn delete_many(&self, collection: &str, filter: Document) -> Result<u64> {
        let mut collections = self.collections.borrow_mut();
        let Some(documents) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let before = documents.len();
        documents.retain(|document| !matches_filter(document, &filter));
        Ok((before - documents.len()) as u64)
    }

    fn insert_one(&self, collection: &str, mut document: Document) -> Result<()> {
        if !document.contains_key("_id") {
            document.insert("_id", ObjectId::new());
        }
        self.collections
            .borrow_mut()
            .entry(collection.to_string())
            .or_default()
            .push(document);
        Ok(())
    }
}

fn lookup<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut parts = path.split('.');
    let mut current = document.get(parts.next()?)?;
    for part in parts {
        match current {
            Bson::Document(inner) => current = inner.get(part)?,
            _ => return None,
        }
    }
    Some(current)
}

fn matches_filter(document: &Document, filter: &Document) -> bool {
    filter.iter().all(|(key, condition)| match key.as_str() {
        "$or" => clauses(condition)
            .iter()
            .any(|clause| matches_filter(document, clause)),
        "$and" => clauses(condition)
            .iter()
            .all(|clause| matches_filter(document, clause)),
        field => matches_condition(lookup(document, field), condition),
    })
}

fn clauses(condition: &Bson) -> Vec<Document> {
    match condition {
        Bson::Array(items) => items
            .iter()
            .filter_map(|item| item.as_document().cloned())
            .collect(),
        _ => Vec::new(),
    }
}

fn is_operator_document(condition: &Bson) -> bool {
    match condition {
        Bson::Document(inner) => {
            !inner.is_empty() && inner.keys().all(|key| key.starts_with('$'))
        }
        _ => false,
    }
}

fn matches_condition(value: Option<&Bson>, condition: &Bson) -> bool {
    if !is_operator_document(condition) {
        return equals_or_null(value, condition);
    }
    let Bson::Document(operators) = condition else {
        return false;
    };
    operators.iter().all(|(operator, operand)| match operator.as_str() {
        "$eq" => equals_or_null(value, operand),
        "$ne" => !equals_or_null(value, operand),
        "$in" => match operand {
            Bson::Array(items) => items.iter().any(|item| equals_or_null(value, item)),
            _ => false,
        },
        "$nin" => match operand {
            Bson::Array(items) => !items.iter().any(|item| equals_or_null(value, item)),
            _ => true,
        },
        "$gt" => compare(value, operand) == Some(Ordering::Greater),
        "$gte" => matches!(
            compare(value, operand),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        "$lt" => compare(value, operand) == Some(Ordering::Less),
        "$lte" => matches!(
            compare(value, operand),
            Some(Ordering::Less | Ordering::Equal)
        ),
        "$exists" => value.is_some() == operand.as_bool().unwrap_or(true),
        _ => false,
    })
}

fn equals_or_null(value: Option<&Bson>, expected: &Bson) -> bool {
    match value {
        Some(Bson::Array(items)) if !matches!(expected, Bson::Array(_)) => {
            items.iter().any(|item| values_equal(item, expected))
        }
        Some(value) => values_equal(value, expected),
        None => matches!(expected, Bson::Null),
    }
}

fn as_number(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(value) => Some(f64::from(*value)),
        Bson::Int64(value) => Some(*value as f64),
        Bson::Double(value) => Some(*value),
        _ => None,
    }
}

fn values_equal(lhs: &Bson, rhs: &Bson) -> bool {
    match (as_number(lhs), as_number(rhs)) {
        (Some(lhs), Some(rhs)) => lhs == rhs,
        _ => match (lhs, rhs) {
            (Bson::Document(lhs), Bson::Document(rhs)) => {
                lhs.len() == rhs.len()
                    && lhs
                        .iter()
                        .all(|(key, value)| rhs.get(key).is_some_and(|other| values_equal(value, other)))
            }
            (Bson::Array(lhs), Bson::Array(rhs)) => {
                lhs.len() == rhs.len() && lhs.iter().zip(rhs).all(|(l, r)| values_equal(l, r))
            }
            _ => lhs == rhs,
        },
    }
}

fn compare(value: Option<&Bson>, operand: &Bson) -> Option<Ordering> {
    let value = value?;
    match (as_number(value), as_number(operand)) {
        (Some(lhs), Some(rhs)) => lhs.partial_cmp(&rhs),
        _ => match (value, operand) {
            (Bson::String(lhs), Bson::String(rhs)) => Some(lhs.cmp(rhs)),
            (Bson::DateTime(lhs), Bson::DateTime(rhs)) => Some(lhs.cmp(rhs)),
            _ => None,
        },
    }
}

/// Evaluates `"$path"` references; anything else is a literal.
fn evaluate(document: &Document, expression: &Bson) -> Option<Bson> {
    match expression {
        Bson::String(reference) if reference.starts_with('$') => {
            lookup(document, &reference[1..]).cloned()
        }
        Bson::Document(fields) => {
            let mut evaluated = Document::new();
            for (key, field) in fields {
                if let Some(value) = evaluate(document, field) {
                    evaluated.insert(key.clone(), value);
                }
            }
            Some(Bson::Document(evaluated))
        }
        other => Some(other.clone()),
    }
}

fn group(documents: &[Document], body: &Document) -> Vec<Document> {
    let id_expression = body.get("_id").cloned().unwrap_or(Bson::Null);
    let mut groups: Vec<(Bson, Vec<&Document>)> = Vec::new();
    for document in documents {
        let key = evaluate(document, &id_expression).unwrap_or(Bson::Null);
        match groups.iter_mut().find(|(existing, _)| values_equal(existing, &key)) {
            Some((_, members)) => members.push(document),
            None => groups.push((key, vec![document])),
        }
    }

    groups
        .into_iter()
        .map(|(key, members)| {
            let mut output = Document::new();
            output.insert("_id", key);
            for (field, accumulator) in body {
                if field == "_id" {
                    continue;
                }
                let Some(expression) = accumulator.as_document().and_then(|acc| acc.get("$sum"))
                else {
                    continue;
                };
                output.insert(field.clone(), sum(&members, expression));
            }
            output
        })
        .collect()
}

fn sum(members: &[&Document], expression: &Bson) -> Bson {
    let mut int_total: i64 = 0;
    let mut float_total: f64 = 0.0;
    let mut saw_float = false;
    for member in members {
        match evaluate(member, expression) {
            Some(Bson::Int32(value)) => int_total += i64::from(value),
            Some(Bson::Int64(value)) => int_total += value,
            Some(Bson::Double(value)) => {
                float_total += value;
                saw_float = true;
            }
            _ => {}
        }
    }
    if saw_float {
        Bson::Double(float_total + int_total as f64)
    } else {
        Bson::Int64(int_total)
    }
}

fn flag(value: &Bson) -> Option<bool> {
    match value {
        Bson::Boolean(value) => Some(*value),
        other => as_number(other).map(|number| number != 0.0),
    }
}

fn project(document: &Document, projection: &Document) -> Document {
    let inclusive = projection
        .iter()
        .any(|(key, value)| key != "_id" && flag(value) != Some(false));

    if !inclusive {
        let mut output = document.clone();
        for (key, value) in projection {
            if flag(value) == Some(false) {
                output.remove(key);
            }
        }
        return output;
    }

    let mut output = Document::new();
    let keep_id = projection.get("_id").and_then(flag).unwrap_or(true);
    if keep_id {
        if let Some(id) = document.get("_id") {
            output.insert("_id", id.clone());
        }
    }
    for (key, value) in projection {
        if key == "_id" {
            continue;
        }
        let projected = match flag(value) {
            Some(true) => lookup(document, key).cloned(),
            Some(false) => None,
            None => evaluate(document, value),
        };
        if let Some(projected) = projected {
            output.insert(key.clone(), projected);
        }
    }
    output
}
