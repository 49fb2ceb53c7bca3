//! CLI presentation: text and json formatters per command.

use crate::cli::route::value_to_json;
use crate::schema::Schema;
use crate::types::{ManagedObject, Value};
use comfy_table::Table;
use serde::Serialize;
use std::collections::BTreeSet;

/// What `status` reports.
#[derive(Debug, Clone, Serialize)]
pub struct StoreStatus {
    pub location: String,
    pub schema: String,
    pub fingerprint: String,
    pub read_only: bool,
    pub auto_merge_incoming: bool,
    /// Object count per entity, in schema order.
    pub counts: Vec<(String, usize)>,
}

pub fn format_status_text(status: &StoreStatus) -> String {
    let mut s = format!(
        "Store: {}\nSchema: {} ({})\nRead-only: {}\nAuto-merge incoming: {}",
        status.location,
        status.schema,
        &status.fingerprint[..status.fingerprint.len().min(16)],
        status.read_only,
        status.auto_merge_incoming
    );
    if status.counts.is_empty() {
        s.push_str("\n\nNo entities defined.");
    } else {
        s.push_str("\n\nObjects:");
        for (entity, count) in &status.counts {
            s.push_str(&format!("\n  {}: {}", entity, count));
        }
    }
    s
}

pub fn format_status_json(status: &StoreStatus) -> Result<String, serde_json::Error> {
    let counts: serde_json::Map<String, serde_json::Value> = status
        .counts
        .iter()
        .map(|(entity, count)| (entity.clone(), serde_json::json!(count)))
        .collect();
    serde_json::to_string_pretty(&serde_json::json!({
        "location": status.location,
        "schema": status.schema,
        "fingerprint": status.fingerprint,
        "read_only": status.read_only,
        "auto_merge_incoming": status.auto_merge_incoming,
        "counts": counts,
    }))
}

pub fn format_schema_table(schema: &Schema) -> String {
    if schema.entities.is_empty() {
        return format!("Schema '{}' defines no entities.", schema.name);
    }
    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.set_header(vec!["Entity", "Attribute", "Type", "Optional", "Default"]);
    for (entity_name, entity) in &schema.entities {
        for (attr_name, attr) in &entity.attributes {
            table.add_row(vec![
                entity_name.clone(),
                attr_name.clone(),
                attr.kind.name().to_string(),
                if attr.optional { "yes" } else { "no" }.to_string(),
                attr.default
                    .as_ref()
                    .map(Value::to_string)
                    .unwrap_or_default(),
            ]);
        }
    }
    format!("Schema: {}\n{}", schema.name, table)
}

pub fn format_objects_text(entity: &str, objects: &[ManagedObject]) -> String {
    if objects.is_empty() {
        return format!("No {} objects.", entity);
    }
    let columns: BTreeSet<&str> = objects
        .iter()
        .flat_map(|object| object.fields.keys().map(String::as_str))
        .collect();

    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_FULL);
    let mut header = vec!["id".to_string()];
    header.extend(columns.iter().map(|c| c.to_string()));
    table.set_header(header);
    for object in objects {
        let mut row = vec![object.id.to_string()];
        row.extend(columns.iter().map(|column| {
            object
                .get(column)
                .map(Value::to_string)
                .unwrap_or_default()
        }));
        table.add_row(row);
    }
    format!("{} ({}):\n{}", entity, objects.len(), table)
}

pub fn format_objects_json(objects: &[ManagedObject]) -> Result<String, serde_json::Error> {
    let rows: Vec<serde_json::Value> = objects
        .iter()
        .map(|object| {
            let fields: serde_json::Map<String, serde_json::Value> = object
                .fields
                .iter()
                .map(|(name, value)| (name.clone(), value_to_json(value)))
                .collect();
            serde_json::json!({
                "id": object.id.to_string(),
                "entity": object.entity,
                "fields": fields,
            })
        })
        .collect();
    serde_json::to_string_pretty(&rows)
}
