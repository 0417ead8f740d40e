//! Schema descriptors for record types
//!
//! A schema names the backing source, its primary key, and optional per-field
//! rules. Fields that are not declared are accepted as-is.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};
use crate::value::Value;

/// Custom field validator; returns a message on rejection
pub type Validator = Arc<dyn Fn(&Value) -> Result<(), String> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    Integer,
    Float,
    Text,
    Boolean,
    Json,
    Any,
}

impl FieldType {
    /// Whether a non-null value has this type
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            FieldType::Integer => value.is_i64() || value.is_u64(),
            FieldType::Float => value.is_number(),
            FieldType::Text => value.is_string(),
            FieldType::Boolean => value.is_boolean(),
            FieldType::Json | FieldType::Any => true,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::Integer => "integer",
            FieldType::Float => "float",
            FieldType::Text => "text",
            FieldType::Boolean => "boolean",
            FieldType::Json => "json",
            FieldType::Any => "any",
        };
        f.write_str(name)
    }
}

#[derive(Clone)]
pub struct FieldDef {
    pub name: String,
    pub field_type: FieldType,
    pub nullable: bool,
    pub max_length: Option<usize>,
    validator: Option<Validator>,
}

impl FieldDef {
    pub fn new(name: &str, field_type: FieldType) -> Self {
        Self {
            name: name.to_string(),
            field_type,
            nullable: true,
            max_length: None,
            validator: None,
        }
    }

    /// Reject null values for this field
    pub fn required(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn max_length(mut self, max: usize) -> Self {
        self.max_length = Some(max);
        self
    }

    pub fn validate_with<F>(mut self, validator: F) -> Self
    where
        F: Fn(&Value) -> Result<(), String> + Send + Sync + 'static,
    {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// Check a candidate value against this field's rules
    pub fn check(&self, value: &Value) -> Result<(), String> {
        if value.is_null() {
            return if self.nullable {
                Ok(())
            } else {
                Err("must not be null".to_string())
            };
        }

        if !self.field_type.accepts(value) {
            return Err(format!("expected {}", self.field_type));
        }

        if let (Some(max), Some(text)) = (self.max_length, value.as_str()) {
            if text.chars().count() > max {
                return Err(format!("must be at most {} characters", max));
            }
        }

        match &self.validator {
            Some(validator) => validator(value),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for FieldDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDef")
            .field("name", &self.name)
            .field("field_type", &self.field_type)
            .field("nullable", &self.nullable)
            .field("max_length", &self.max_length)
            .field("custom_validator", &self.validator.is_some())
            .finish()
    }
}

/// Schema descriptor for one record type
#[derive(Debug, Clone)]
pub struct Schema {
    pub table: String,
    pub primary_key: String,
    pub fields: Vec<FieldDef>,
    pub timestamps: bool,
}

impl Schema {
    pub fn new(table: &str, primary_key: &str) -> Self {
        Self {
            table: table.to_string(),
            primary_key: primary_key.to_string(),
            fields: Vec::new(),
            timestamps: false,
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// Add or replace a field definition
    pub fn add_field(&mut self, field: FieldDef) {
        match self.fields.iter_mut().find(|f| f.name == field.name) {
            Some(existing) => *existing = field,
            None => self.fields.push(field),
        }
    }

    /// Validate a value for a field; undeclared fields always pass
    pub fn validate(&self, field: &str, value: &Value) -> ModelResult<()> {
        match self.field(field) {
            Some(def) => def
                .check(value)
                .map_err(|message| ModelError::validation(field, message)),
            None => Ok(()),
        }
    }
}
