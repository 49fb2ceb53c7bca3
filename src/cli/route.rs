//! CLI route: single route table and run context. Dispatches to the stack
//! and presentation.

use crate::cli::parse::{Cli, Commands, OutputFormat};
use crate::cli::presentation::{
    format_objects_json, format_objects_text, format_schema_table, format_status_json,
    format_status_text, StoreStatus,
};
use crate::config::{ConfigLoader, TandemConfig};
use crate::error::{CommandError, ContextError};
use crate::schema::{AttributeKind, Schema};
use crate::stack::{Stack, StackOptions};
use crate::types::{Fields, Value};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// One object in an import file.
#[derive(Debug, Deserialize)]
struct ImportRecord {
    entity: String,
    #[serde(default)]
    fields: serde_json::Map<String, serde_json::Value>,
}

/// Runtime context for CLI execution: configuration and an open stack.
pub struct RunContext {
    config: TandemConfig,
    stack: Stack,
}

impl RunContext {
    /// Load configuration, apply CLI overrides and open the stack.
    pub fn new(cli: &Cli) -> Result<Self, CommandError> {
        let mut config = match &cli.config {
            Some(path) => ConfigLoader::load_from_file(path)?,
            None => ConfigLoader::load(&cli.workspace)?,
        };
        apply_overrides(&mut config, cli);

        let stack = Stack::open(StackOptions::from_config(&config))?;
        Ok(Self { config, stack })
    }

    pub fn config(&self) -> &TandemConfig {
        &self.config
    }

    pub fn stack(&self) -> &Stack {
        &self.stack
    }

    /// Execute a CLI command via the single route table.
    pub fn execute(&self, command: &Commands) -> Result<String, CommandError> {
        match command {
            Commands::Status { format } => self.handle_status(*format),
            Commands::Schema => Ok(format_schema_table(self.stack.schema()?)),
            Commands::Import { file } => self.handle_import(file),
            Commands::List { entity, format } => self.handle_list(entity, *format),
        }
    }

    fn handle_status(&self, format: OutputFormat) -> Result<String, CommandError> {
        let schema = self.stack.schema()?;
        let coordinator = self.stack.main_coordinator()?;
        let mut counts = Vec::with_capacity(schema.entities.len());
        for entity in schema.entities.keys() {
            let records = coordinator
                .load_entity(entity)
                .map_err(ContextError::from)?;
            counts.push((entity.clone(), records.len()));
        }
        let status = StoreStatus {
            location: self.stack.store_location()?.display().to_string(),
            schema: schema.name.clone(),
            fingerprint: schema.fingerprint(),
            read_only: self.stack.read_only(),
            auto_merge_incoming: self.stack.auto_merge_incoming(),
            counts,
        };
        match format {
            OutputFormat::Text => Ok(format_status_text(&status)),
            OutputFormat::Json => Ok(format_status_json(&status)?),
        }
    }

    fn handle_import(&self, file: &Path) -> Result<String, CommandError> {
        let raw = std::fs::read_to_string(file).map_err(|source| CommandError::Read {
            path: file.to_path_buf(),
            source,
        })?;
        let records: Vec<ImportRecord> =
            serde_json::from_str(&raw).map_err(|e| CommandError::InvalidImport {
                path: file.to_path_buf(),
                message: e.to_string(),
            })?;

        let schema = self.stack.schema()?;
        let mut objects = Vec::with_capacity(records.len());
        for (index, record) in records.into_iter().enumerate() {
            let fields = convert_fields(schema, &record).map_err(|message| {
                CommandError::InvalidImport {
                    path: file.to_path_buf(),
                    message: format!("record {}: {}", index, message),
                }
            })?;
            objects.push((record.entity, fields));
        }
        let count = objects.len();

        let context = self.stack.import_context()?;
        context.perform_blocking(move |graph| -> Result<(), ContextError> {
            for (entity, fields) in objects {
                graph.insert(&entity, fields)?;
            }
            Ok(())
        })??;
        context.save_blocking()?;

        info!(file = %file.display(), count, "Import completed");
        Ok(format!("Imported {} object(s) from {}", count, file.display()))
    }

    fn handle_list(&self, entity: &str, format: OutputFormat) -> Result<String, CommandError> {
        if self.stack.schema()?.entity(entity).is_none() {
            return Err(CommandError::UnknownEntity(entity.to_string()));
        }
        let context = self.stack.scratch_context()?;
        let entity_name = entity.to_string();
        let objects = context.perform_blocking(move |graph| graph.fetch_all(&entity_name))??;
        debug!(entity, count = objects.len(), "Listed objects");
        match format {
            OutputFormat::Text => Ok(format_objects_text(entity, &objects)),
            OutputFormat::Json => Ok(format_objects_json(&objects)?),
        }
    }
}

fn apply_overrides(config: &mut TandemConfig, cli: &Cli) {
    if let Some(store) = &cli.store {
        config.store.location = Some(absolute(&cli.workspace, store));
    }
    if let Some(schema) = &cli.schema {
        config.store.schema = Some(schema.clone());
    }
    if let Some(bundle) = &cli.bundle {
        config.store.bundle = absolute(&cli.workspace, bundle);
    }
}

fn absolute(root: &Path, path: &Path) -> PathBuf {
    if path.is_relative() {
        root.join(path)
    } else {
        path.to_path_buf()
    }
}

fn convert_fields(schema: &Schema, record: &ImportRecord) -> Result<Fields, String> {
    let entity = schema
        .entity(&record.entity)
        .ok_or_else(|| format!("unknown entity '{}'", record.entity))?;
    record
        .fields
        .iter()
        .map(|(name, json)| {
            let kind = entity.attributes.get(name).map(|attr| attr.kind);
            json_to_value(json, kind)
                .map(|value| (name.clone(), value))
                .map_err(|message| format!("{}.{}: {}", record.entity, name, message))
        })
        .collect()
}

/// Convert a JSON value, coercing toward the attribute kind when known:
/// integers widen to floats, and hex strings become bytes.
pub fn json_to_value(json: &serde_json::Value, kind: Option<AttributeKind>) -> Result<Value, String> {
    match (json, kind) {
        (serde_json::Value::Null, _) => Ok(Value::Null),
        (serde_json::Value::Bool(b), _) => Ok(Value::Bool(*b)),
        (serde_json::Value::Number(n), Some(AttributeKind::Float)) => n
            .as_f64()
            .map(Value::Float)
            .ok_or_else(|| format!("{} is not a float", n)),
        (serde_json::Value::Number(n), _) => match n.as_i64() {
            Some(i) => Ok(Value::Integer(i)),
            None => n
                .as_f64()
                .map(Value::Float)
                .ok_or_else(|| format!("{} is out of range", n)),
        },
        (serde_json::Value::String(s), Some(AttributeKind::Bytes)) => {
            hex::decode(s.trim_start_matches("0x"))
                .map(Value::Bytes)
                .map_err(|e| format!("invalid hex bytes: {}", e))
        }
        (serde_json::Value::String(s), _) => Ok(Value::Text(s.clone())),
        (serde_json::Value::Array(_), _) | (serde_json::Value::Object(_), _) => {
            Err("nested values are not supported".to_string())
        }
    }
}

pub fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Integer(i) => serde_json::json!(i),
        Value::Float(f) => serde_json::json!(f),
        Value::Text(s) => serde_json::Value::String(s.clone()),
        Value::Bytes(bytes) => serde_json::Value::String(format!("0x{}", hex::encode(bytes))),
    }
}
