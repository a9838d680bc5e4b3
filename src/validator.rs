//! JSON Schema validation of transformed records.
//!
//! The schema is resolved and compiled once at startup. Each record is then
//! checked against the compiled form; the first violation is reported.

use crate::error::{StartupError, ValidationError};
use crate::pipeline::context::Record;
use jsonschema::error::ValidationErrorKind;
use jsonschema::Validator;
use serde_json::Value;
use std::path::Path;
use tracing::debug;

pub struct SchemaValidator {
    compiled: Validator,
    origin: String,
}

impl std::fmt::Debug for SchemaValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaValidator")
            .field("origin", &self.origin)
            .finish()
    }
}

impl SchemaValidator {
    /// Resolve a schema reference: an `http(s)://` or `file://` URL, a file
    /// path, or the schema document itself.
    pub fn load(reference: &str) -> Result<Self, StartupError> {
        let text = resolve(reference)?;
        let schema: Value = serde_json::from_str(&text)
            .map_err(|e| StartupError::config("schema", format!("not valid JSON: {}", e)))?;
        Self::from_value(&schema, reference)
    }

    pub fn from_value(schema: &Value, origin: &str) -> Result<Self, StartupError> {
        let compiled = Validator::new(schema)
            .map_err(|e| StartupError::config("schema", format!("failed to compile schema: {}", e)))?;
        debug!(origin, "compiled schema");
        Ok(SchemaValidator {
            compiled,
            origin: origin.to_string(),
        })
    }

    pub fn validate(&self, record: &Record) -> Result<(), ValidationError> {
        let value = Value::Object(record.clone());
        let result = self.compiled.validate(&value);
        if let Err(mut errors) = result {
            if let Some(error) = errors.next() {
                let schema_path = error.schema_path.to_string();
                let constraint = schema_path
                    .rsplit('/')
                    .find(|segment| !segment.is_empty())
                    .unwrap_or("schema")
                    .to_string();
                let path = error.instance_path.to_string();
                let field = match &error.kind {
                    ValidationErrorKind::Required { property } => {
                        let property = property
                            .as_str()
                            .map(str::to_string)
                            .unwrap_or_else(|| property.to_string());
                        if path.is_empty() {
                            property
                        } else {
                            format!("{}/{}", path, property)
                        }
                    }
                    _ if path.is_empty() => "/".to_string(),
                    _ => path,
                };
                return Err(ValidationError {
                    field,
                    constraint,
                    message: error.to_string(),
                    value: error.instance.to_string(),
                });
            }
        }
        Ok(())
    }
}

fn resolve(reference: &str) -> Result<String, StartupError> {
    let trimmed = reference.trim();
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        debug!(url = trimmed, "fetching schema");
        let response = reqwest::blocking::get(trimmed)
            .and_then(|response| response.error_for_status())
            .map_err(|e| StartupError::config("schema", format!("could not fetch {}: {}", trimmed, e)))?;
        return response
            .text()
            .map_err(|e| StartupError::config("schema", format!("could not read {}: {}", trimmed, e)));
    }

    if let Some(path) = trimmed.strip_prefix("file://") {
        return std::fs::read_to_string(path)
            .map_err(|e| StartupError::config("schema", format!("could not read {}: {}", path, e)));
    }

    if trimmed.starts_with('{') {
        return Ok(trimmed.to_string());
    }

    let path = Path::new(trimmed);
    std::fs::read_to_string(path)
        .map_err(|e| StartupError::config("schema", format!("could not read {}: {}", trimmed, e)))
}
