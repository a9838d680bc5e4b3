// src/pattern_extraction.rs - Filename metadata extraction
use anyhow::{anyhow, Result};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Deserialize;
use serde_json::Value;

use crate::pipeline::context::Record;

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"%(\d+)").expect("valid placeholder regex"));

/// How an expanded template is merged into the record
#[derive(Debug, Clone, PartialEq)]
pub enum PatternOutput {
    /// JSON object template, top-level keys merged into the record
    Template(String),
    /// Older single-field form: the expanded string is stored under `key`
    Field { template: String, key: String },
}

#[derive(Deserialize)]
struct PatternFile {
    pattern: String,
    output: Value,
    #[serde(default)]
    key: Option<String>,
}

/// Regex over file names plus an output template with `%0..%N` placeholders
#[derive(Debug, Clone)]
pub struct NamePattern {
    regex: Regex,
    output: PatternOutput,
}

impl NamePattern {
    pub fn new(pattern: &str, output: PatternOutput) -> Result<Self> {
        let regex = Regex::new(pattern)
            .map_err(|e| anyhow!("Failed to compile name pattern '{}': {}", pattern, e))?;
        Ok(NamePattern { regex, output })
    }

    /// Parse the `{"pattern": ..., "output": ...}` document
    pub fn from_json(text: &str) -> Result<Self> {
        let file: PatternFile = serde_json::from_str(text)
            .map_err(|e| anyhow!("Invalid name pattern document: {}", e))?;

        let template = match file.output {
            Value::String(s) => s,
            // An object template is accepted too, placeholders live in its string values
            other @ Value::Object(_) => serde_json::to_string(&other)?,
            other => return Err(anyhow!("Name pattern output must be a string or object, found {}", other)),
        };

        let output = match file.key {
            Some(key) => PatternOutput::Field { template, key },
            None => PatternOutput::Template(template),
        };

        NamePattern::new(&file.pattern, output)
    }

    /// Match `file_name` and merge the expanded template into `record`.
    /// Returns false when the name does not match.
    pub fn apply(&self, file_name: &str, record: &mut Record) -> Result<bool> {
        let Some(captures) = self.regex.captures(file_name) else {
            return Ok(false);
        };

        match &self.output {
            PatternOutput::Template(template) => {
                let expanded = expand(template, &captures, true);
                let value: Value = serde_json::from_str(&expanded).map_err(|e| {
                    anyhow!("Expanded name pattern is not valid JSON ({}): {}", e, expanded)
                })?;
                match value {
                    Value::Object(fields) => {
                        for (key, val) in fields {
                            record.insert(key, val);
                        }
                    }
                    other => {
                        return Err(anyhow!(
                            "Expanded name pattern must be a JSON object, got {}",
                            other
                        ))
                    }
                }
            }
            PatternOutput::Field { template, key } => {
                let expanded = expand(template, &captures, false);
                record.insert(key.clone(), Value::String(expanded));
            }
        }

        Ok(true)
    }
}

/// Replace `%N` with capture group N. Unknown indices are left alone.
fn expand(template: &str, captures: &Captures, json_escape: bool) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| {
            let index: usize = match caps[1].parse() {
                Ok(index) => index,
                Err(_) => return caps[0].to_string(),
            };
            if index >= captures.len() {
                return caps[0].to_string();
            }
            let text = captures.get(index).map(|m| m.as_str()).unwrap_or("");
            if json_escape {
                escape_json_fragment(text)
            } else {
                text.to_string()
            }
        })
        .into_owned()
}

// Escape a capture so it can sit inside a JSON string literal
fn escape_json_fragment(text: &str) -> String {
    let quoted = Value::String(text.to_string()).to_string();
    quoted[1..quoted.len() - 1].to_string()
}
