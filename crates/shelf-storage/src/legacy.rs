//! Reader for the single-file JSON catalog that predates the workbook.

use std::path::Path;

use serde_json::Value;
use shelf_core::{CatalogKind, Category};
use tracing::warn;

use crate::record::{assemble, category_from_record, item_from_record, CategoryRow, ItemRow, RawRecord};
use crate::StoreError;

fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(values) => values
            .iter()
            .map(value_text)
            .filter(|v| !v.trim().is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}

fn to_record(object: &serde_json::Map<String, Value>) -> RawRecord {
    let mut record = RawRecord::default();
    for (key, value) in object {
        // JSON tag arrays survive as a JSON string so quoted commas stay intact
        let text = match (key.as_str(), value) {
            ("tags" | "topics" | "keywords", Value::Array(_)) => value.to_string(),
            _ => value_text(value),
        };
        record.insert(key, text);
    }
    record
}

fn push_items(
    kind: CatalogKind,
    category_id: Option<&str>,
    list: Option<&Value>,
    items: &mut Vec<ItemRow>,
) {
    let Some(list) = list.and_then(Value::as_array) else {
        return;
    };
    for (position, entry) in list.iter().enumerate() {
        let Some(object) = entry.as_object() else {
            warn!(position, "skipping legacy record that is not an object");
            continue;
        };
        let mut record = to_record(object);
        if let Some(category_id) = category_id {
            record.insert("category_id", category_id.to_string());
        }
        if object.get("order").is_none() {
            record.insert("order", position.to_string());
        }
        match item_from_record(kind, &record) {
            Some(row) => items.push(row),
            None => warn!(position, "skipping legacy record without identity"),
        }
    }
}

/// Parses `{"categories":[{id,name,icon,projects|papers:[...]}]}` or the flat
/// `{"projects":[...]}` form. Malformed records are skipped with a warning.
pub fn parse_legacy(kind: CatalogKind, json: &Value) -> Vec<Category> {
    let item_key = kind.items_sheet();
    let mut categories: Vec<CategoryRow> = Vec::new();
    let mut items: Vec<ItemRow> = Vec::new();

    match json.get("categories").and_then(Value::as_array) {
        Some(list) => {
            for (position, entry) in list.iter().enumerate() {
                let Some(object) = entry.as_object() else {
                    warn!(position, "skipping legacy category that is not an object");
                    continue;
                };
                let mut record = to_record(object);
                if object.get("order").is_none() {
                    record.insert("order", position.to_string());
                }
                let Some(row) = category_from_record(kind, &record) else {
                    warn!(position, "skipping legacy category without id or name");
                    continue;
                };
                let id = row.category.id.clone();
                categories.push(row);
                push_items(kind, Some(&id), object.get(item_key), &mut items);
            }
        }
        None => push_items(kind, None, json.get(item_key), &mut items),
    }

    assemble(kind, categories, items)
}

pub fn read_legacy(path: &Path, kind: CatalogKind) -> Result<Vec<Category>, StoreError> {
    let raw = std::fs::read_to_string(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let json: Value = serde_json::from_str(&raw).map_err(|source| StoreError::Legacy {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse_legacy(kind, &json))
}
