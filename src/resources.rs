// src/resources.rs - Configuration resources loaded once at startup
use indexmap::IndexMap;
use serde_json::Value;
use std::path::Path;
use tracing::debug;

use crate::error::StartupError;
use crate::pattern_extraction::NamePattern;
use crate::pipeline::config::PipelineConfig;
use crate::pipeline::context::Record;
use crate::pipeline::script::ScriptTemplate;
use crate::validator::SchemaValidator;

/// Read-only resources shared by every worker
#[derive(Debug, Default)]
pub struct Resources {
    pub name_pattern: Option<NamePattern>,
    pub key_map: Option<IndexMap<String, String>>,
    pub merge: Option<Record>,
    pub wrapper: Option<Record>,
    pub script: Option<ScriptTemplate>,
    pub schema: Option<SchemaValidator>,
}

impl Resources {
    pub fn load(config: &PipelineConfig) -> Result<Self, StartupError> {
        let mut resources = Resources::default();

        if let Some(value) = &config.name_pattern {
            let text = read_inline_or_file(value);
            let pattern = NamePattern::from_json(&text)
                .map_err(|e| StartupError::config("name-pattern", format!("{:#}", e)))?;
            resources.name_pattern = Some(pattern);
        }

        if let Some(value) = &config.key_map {
            let object = load_json_object("key-map", value)?;
            let mut map = IndexMap::with_capacity(object.len());
            for (old, new) in object {
                match new {
                    Value::String(new) => {
                        map.insert(old, new);
                    }
                    other => {
                        return Err(StartupError::config(
                            "key-map",
                            format!("new name for '{}' must be a string, found {}", old, other),
                        ))
                    }
                }
            }
            resources.key_map = Some(map);
        }

        if let Some(value) = &config.merge {
            resources.merge = Some(load_json_object("merge", value)?);
        }

        if let Some(value) = &config.wrapper {
            resources.wrapper = Some(load_json_object("wrapper", value)?);
        }

        if let Some(value) = &config.script {
            let script = ScriptTemplate::load(value)?;
            debug!(functions = ?script.function_names(), "loaded script");
            resources.script = Some(script);
        }

        if let Some(value) = &config.schema {
            resources.schema = Some(SchemaValidator::load(value)?);
        }

        Ok(resources)
    }
}

/// Content of `value` as a file when it names a readable file, else the value itself
pub fn read_inline_or_file(value: &str) -> String {
    let path = Path::new(value);
    if path.is_file() {
        if let Ok(content) = std::fs::read_to_string(path) {
            return content;
        }
    }
    value.to_string()
}

/// Inline `{"k": v}` JSON, or a file holding a JSON object
pub fn load_json_object(flag: &'static str, value: &str) -> Result<Record, StartupError> {
    let trimmed = value.trim();
    let text = if trimmed.starts_with('{') {
        trimmed.to_string()
    } else {
        std::fs::read_to_string(trimmed)
            .map_err(|e| StartupError::config(flag, format!("could not read '{}': {}", trimmed, e)))?
    };

    match serde_json::from_str::<Value>(&text) {
        Ok(Value::Object(object)) => Ok(object),
        Ok(other) => Err(StartupError::config(
            flag,
            format!("expected a JSON object, found {}", json_type(&other)),
        )),
        Err(e) => Err(StartupError::config(flag, format!("invalid JSON: {}", e))),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::config::FormatConfig;
    use std::io::Write;

    #[test]
    fn test_inline_and_file_objects() {
        let inline = load_json_object("merge", r#" {"source": "batch"} "#).unwrap();
        assert_eq!(inline["source"], "batch");

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"env": "prod"}}"#).unwrap();
        let from_file = load_json_object("merge", file.path().to_str().unwrap()).unwrap();
        assert_eq!(from_file["env"], "prod");
    }

    #[test]
    fn test_non_object_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[1, 2]").unwrap();
        let err = load_json_object("wrapper", file.path().to_str().unwrap()).unwrap_err();
        assert!(err.to_string().contains("--wrapper"));
        assert!(load_json_object("wrapper", "/missing/wrapper.json").is_err());
    }

    #[test]
    fn test_key_map_keeps_order() {
        let mut config = PipelineConfig::new(FormatConfig::Json);
        config.key_map = Some(r#"{"z": "last", "a": "first"}"#.to_string());
        let resources = Resources::load(&config).unwrap();
        let map = resources.key_map.unwrap();
        let keys: Vec<&String> = map.keys().collect();
        assert_eq!(keys, vec!["z", "a"]);
    }

    #[test]
    fn test_key_map_values_must_be_strings() {
        let mut config = PipelineConfig::new(FormatConfig::Json);
        config.key_map = Some(r#"{"a": 1}"#.to_string());
        assert!(Resources::load(&config).is_err());
    }

    #[test]
    fn test_inline_name_pattern() {
        let mut config = PipelineConfig::new(FormatConfig::Json);
        config.name_pattern = Some(r#"{"pattern":"^(\\w+)$","output":"{\"n\":\"%1\"}"}"#.to_string());
        let resources = Resources::load(&config).unwrap();
        assert!(resources.name_pattern.is_some());
    }
}
