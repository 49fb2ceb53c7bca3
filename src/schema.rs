//! Schema Definitions
//!
//! A schema names the entities a store may hold and the typed attributes of
//! each. Schemas live as TOML documents in a bundle directory; a stack either
//! loads one by name or merges every schema found in the bundle.

use crate::error::{SchemaError, ValidationError};
use crate::types::{Fields, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Extension of schema files inside a bundle.
pub const SCHEMA_EXTENSION: &str = "toml";

/// Attribute types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeKind {
    Bool,
    Integer,
    Float,
    Text,
    Bytes,
}

impl AttributeKind {
    pub fn name(self) -> &'static str {
        match self {
            AttributeKind::Bool => "bool",
            AttributeKind::Integer => "integer",
            AttributeKind::Float => "float",
            AttributeKind::Text => "text",
            AttributeKind::Bytes => "bytes",
        }
    }

    pub fn accepts(self, value: &Value) -> bool {
        matches!(
            (self, value),
            (AttributeKind::Bool, Value::Bool(_))
                | (AttributeKind::Integer, Value::Integer(_))
                | (AttributeKind::Float, Value::Float(_))
                | (AttributeKind::Text, Value::Text(_))
                | (AttributeKind::Bytes, Value::Bytes(_))
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDescription {
    #[serde(rename = "type")]
    pub kind: AttributeKind,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub default: Option<Value>,
}

impl AttributeDescription {
    pub fn required(kind: AttributeKind) -> Self {
        Self {
            kind,
            optional: false,
            default: None,
        }
    }

    pub fn optional(kind: AttributeKind) -> Self {
        Self {
            kind,
            optional: true,
            default: None,
        }
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    /// Value a freshly inserted object gets when the caller left it out.
    fn initial_value(&self) -> Option<Value> {
        match &self.default {
            Some(value) => Some(value.clone()),
            None if self.optional => Some(Value::Null),
            None => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityDescription {
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeDescription>,
}

impl EntityDescription {
    pub fn with_attribute(mut self, name: impl Into<String>, attr: AttributeDescription) -> Self {
        self.attributes.insert(name.into(), attr);
        self
    }
}

/// A resolved schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub entities: BTreeMap<String, EntityDescription>,
}

impl Schema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entities: BTreeMap::new(),
        }
    }

    pub fn with_entity(mut self, name: impl Into<String>, entity: EntityDescription) -> Self {
        self.entities.insert(name.into(), entity);
        self
    }

    pub fn entity(&self, name: &str) -> Option<&EntityDescription> {
        self.entities.get(name)
    }

    /// Content hash over the entity definitions. The schema name is excluded,
    /// so a merged bundle and an equivalent single file hash alike.
    pub fn fingerprint(&self) -> String {
        // BTreeMap ordering keeps the encoding canonical
        let encoded = bincode::serialize(&self.entities).unwrap_or_default();
        blake3::hash(&encoded).to_hex().to_string()
    }

    /// Load one schema file.
    pub fn from_file(path: &Path) -> Result<Self, SchemaError> {
        let content = std::fs::read_to_string(path).map_err(|e| SchemaError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let mut schema: Schema = toml::from_str(&content).map_err(|e| SchemaError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        if schema.name.is_empty() {
            schema.name = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string();
        }
        schema.check_defaults()?;
        Ok(schema)
    }

    /// Resolve a schema from a bundle directory.
    ///
    /// With a name, loads `<name>.toml` from anywhere inside the bundle.
    /// Without one, merges every schema file in the bundle.
    pub fn resolve(bundle: &Path, name: Option<&str>) -> Result<Self, SchemaError> {
        let files = bundle_files(bundle);
        match name {
            Some(name) => {
                let path = files
                    .iter()
                    .find(|p| p.file_stem() == Some(OsStr::new(name)))
                    .ok_or_else(|| SchemaError::NotFound {
                        name: name.to_string(),
                        bundle: bundle.to_path_buf(),
                    })?;
                Schema::from_file(path)
            }
            None => {
                if files.is_empty() {
                    return Err(SchemaError::EmptyBundle(bundle.to_path_buf()));
                }
                let schemas = files
                    .iter()
                    .map(|p| Schema::from_file(p))
                    .collect::<Result<Vec<_>, _>>()?;
                Schema::merged(schemas)
            }
        }
    }

    /// Merge several schemas into one. Entity names must be unique.
    pub fn merged(schemas: Vec<Schema>) -> Result<Self, SchemaError> {
        let mut names = Vec::with_capacity(schemas.len());
        let mut owners: BTreeMap<String, String> = BTreeMap::new();
        let mut entities = BTreeMap::new();
        for schema in schemas {
            for (entity_name, entity) in schema.entities {
                if let Some(first) = owners.get(&entity_name) {
                    return Err(SchemaError::DuplicateEntity {
                        entity: entity_name,
                        first: first.clone(),
                        second: schema.name,
                    });
                }
                owners.insert(entity_name.clone(), schema.name.clone());
                entities.insert(entity_name, entity);
            }
            names.push(schema.name);
        }
        debug!(schemas = ?names, entities = entities.len(), "Merged schemas");
        Ok(Schema {
            name: names.join("+"),
            entities,
        })
    }

    /// Apply declared defaults for attributes the caller did not supply.
    pub fn apply_defaults(&self, entity: &str, fields: &mut Fields) {
        if let Some(description) = self.entity(entity) {
            for (name, attr) in &description.attributes {
                if !fields.contains_key(name) {
                    if let Some(value) = attr.initial_value() {
                        fields.insert(name.clone(), value);
                    }
                }
            }
        }
    }

    /// Validate one object's fields against its entity.
    pub fn validate(&self, entity: &str, fields: &Fields) -> Result<(), ValidationError> {
        let description = self
            .entity(entity)
            .ok_or_else(|| ValidationError::UnknownEntity(entity.to_string()))?;

        for name in fields.keys() {
            if !description.attributes.contains_key(name) {
                return Err(ValidationError::UnknownAttribute {
                    entity: entity.to_string(),
                    attribute: name.clone(),
                });
            }
        }

        for (name, attr) in &description.attributes {
            match fields.get(name) {
                None | Some(Value::Null) => {
                    if !attr.optional {
                        return Err(ValidationError::MissingAttribute {
                            entity: entity.to_string(),
                            attribute: name.clone(),
                        });
                    }
                }
                Some(value) if !attr.kind.accepts(value) => {
                    return Err(ValidationError::TypeMismatch {
                        entity: entity.to_string(),
                        attribute: name.clone(),
                        expected: attr.kind.name().to_string(),
                        actual: value.type_name().to_string(),
                    });
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    fn check_defaults(&self) -> Result<(), SchemaError> {
        for (entity_name, entity) in &self.entities {
            for (attr_name, attr) in &entity.attributes {
                if let Some(default) = &attr.default {
                    if !default.is_null() && !attr.kind.accepts(default) {
                        return Err(SchemaError::Invalid {
                            schema: self.name.clone(),
                            message: format!(
                                "default of {}.{} is {}, expected {}",
                                entity_name,
                                attr_name,
                                default.type_name(),
                                attr.kind.name()
                            ),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

/// Schema files inside a bundle, sorted for a deterministic merge order.
fn bundle_files(bundle: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(bundle)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| path.extension() == Some(OsStr::new(SCHEMA_EXTENSION)))
        .collect();
    files.sort();
    files
}
