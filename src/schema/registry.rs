//! Schema registry
//!
//! Parses and validates the table configuration. Read-only after `load`.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

use super::{FieldType, FieldValue, Record, ShardRule};

/// A named, typed column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,

    #[serde(rename = "type")]
    pub field_type: FieldType,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }
}

/// One table as written in the configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TableConfig {
    pub name: String,
    pub fields: Vec<FieldDef>,
    pub index_of_id: usize,
    #[serde(default)]
    pub shard: Option<ShardRule>,
}

/// The whole configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaConfig {
    pub tables: Vec<TableConfig>,
}

impl SchemaConfig {
    /// Append a table (builder style, mostly for tests and embedding)
    pub fn table(
        mut self,
        name: impl Into<String>,
        fields: Vec<FieldDef>,
        index_of_id: usize,
        shard: Option<ShardRule>,
    ) -> Self {
        self.tables.push(TableConfig {
            name: name.into(),
            fields,
            index_of_id,
            shard,
        });
        self
    }
}

/// A validated table definition
#[derive(Debug, Clone)]
pub struct TableDef {
    name: String,
    fields: Vec<FieldDef>,
    index_of_id: usize,
    shard: Option<ShardRule>,
}

impl TableDef {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn index_of_id(&self) -> usize {
        self.index_of_id
    }

    pub fn id_field(&self) -> &FieldDef {
        &self.fields[self.index_of_id]
    }

    pub fn shard_rule(&self) -> Option<&ShardRule> {
        self.shard.as_ref()
    }

    pub fn is_sharded(&self) -> bool {
        self.shard.is_some()
    }

    /// Position of a field by name
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Shard key for an id
    pub fn shard_key(&self, id: &FieldValue) -> Result<String> {
        ShardRule::resolve(self.shard.as_ref(), &id.to_string())
    }

    /// Check a record's length and per-position types
    ///
    /// `position` is the record's index in the caller's batch, reported back
    /// in the error.
    pub fn validate_record(&self, position: usize, record: &Record) -> Result<()> {
        if record.len() != self.fields.len() {
            return Err(StoreError::SchemaMismatch {
                table: self.name.clone(),
                record: position,
                field: "<length>".to_string(),
                reason: format!(
                    "expected {} fields, got {}",
                    self.fields.len(),
                    record.len()
                ),
            });
        }

        for (field, value) in self.fields.iter().zip(record.iter()) {
            if value.field_type() != field.field_type {
                return Err(StoreError::SchemaMismatch {
                    table: self.name.clone(),
                    record: position,
                    field: field.name.clone(),
                    reason: format!("expected {}, got {}", field.field_type, value.field_type()),
                });
            }
            self.check_finite(position, field, value)?;
        }

        Ok(())
    }

    /// Check that an id has the id field's type
    pub fn validate_id(&self, position: usize, id: &FieldValue) -> Result<()> {
        let field = self.id_field();
        if id.field_type() != field.field_type {
            return Err(StoreError::SchemaMismatch {
                table: self.name.clone(),
                record: position,
                field: field.name.clone(),
                reason: format!("id must be a {}, got {}", field.field_type, id.field_type()),
            });
        }
        self.check_finite(position, field, id)
    }

    /// JSON has no NaN or infinity; such a value would not survive a save
    fn check_finite(&self, position: usize, field: &FieldDef, value: &FieldValue) -> Result<()> {
        match value {
            FieldValue::Number(n) if !n.is_finite() => Err(StoreError::SchemaMismatch {
                table: self.name.clone(),
                record: position,
                field: field.name.clone(),
                reason: "number must be finite".to_string(),
            }),
            _ => Ok(()),
        }
    }
}

/// Immutable registry of all tables
#[derive(Debug, Clone, Default)]
pub struct Schema {
    tables: HashMap<String, TableDef>,
}

impl Schema {
    /// Validate a configuration and build the registry
    pub fn load(config: SchemaConfig) -> Result<Self> {
        let mut tables = HashMap::with_capacity(config.tables.len());

        for table in config.tables {
            Self::check_table(&table)?;

            if tables.contains_key(&table.name) {
                return Err(StoreError::InvalidSchema(format!(
                    "duplicate table '{}'",
                    table.name
                )));
            }

            tables.insert(
                table.name.clone(),
                TableDef {
                    name: table.name,
                    fields: table.fields,
                    index_of_id: table.index_of_id,
                    shard: table.shard,
                },
            );
        }

        Ok(Self { tables })
    }

    /// Parse a JSON configuration document
    pub fn from_json(json: &str) -> Result<Self> {
        let config: SchemaConfig = serde_json::from_str(json)
            .map_err(|e| StoreError::InvalidSchema(e.to_string()))?;
        Self::load(config)
    }

    /// Read and parse a JSON configuration file
    pub fn from_path(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Look up a table
    pub fn table(&self, name: &str) -> Result<&TableDef> {
        self.tables
            .get(name)
            .ok_or_else(|| StoreError::UnknownTable(name.to_string()))
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableDef> {
        self.tables.values()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn check_table(table: &TableConfig) -> Result<()> {
        let invalid = |reason: String| -> Result<()> {
            Err(StoreError::InvalidSchema(format!("table '{}': {}", table.name, reason)))
        };

        // Table names become directory names
        if table.name.is_empty()
            || !table
                .name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return invalid("name must contain only [0-9A-Za-z_-]".to_string());
        }

        if table.fields.is_empty() {
            return invalid("no fields defined".to_string());
        }

        if table.index_of_id >= table.fields.len() {
            return invalid(format!(
                "indexOfId {} is out of range for {} fields",
                table.index_of_id,
                table.fields.len()
            ));
        }

        for (i, field) in table.fields.iter().enumerate() {
            if table.fields[..i].iter().any(|f| f.name == field.name) {
                return invalid(format!("duplicate field '{}'", field.name));
            }
        }

        if let Some(rule) = &table.shard {
            if let Err(reason) = rule.validate() {
                return invalid(reason);
            }
        }

        Ok(())
    }
}
