// src/input_format.rs - Format strategies: classify and parse raw input

use crate::error::ParseError;
use crate::pipeline::context::{RawUnit, Record};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::path::Path;

// Lazy check for inline JSON: an opening/closing bracket line or a {"key":value} shape.
// Text uses the same heuristic.
static RAW_JSON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?m)^\[|\{".+":.+\}|\]$"#).expect("valid inline JSON regex"));

static NEWLINES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\r\n|\n\r|\n|\r").expect("valid newline regex"));

/// Capability shared by every input format
pub trait FormatStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// True when an argument is inline content of this format rather than a path
    fn is_raw_inline(&self, content: &str) -> bool;

    /// True when the file name carries one of this format's extensions
    fn is_supported_file(&self, name: &str) -> bool;

    /// Turn one raw unit into zero or more records
    fn parse(&self, unit: &RawUnit) -> Result<Vec<Record>, ParseError>;
}

fn has_extension(name: &str, extensions: &[&str]) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            extensions.iter().any(|candidate| *candidate == ext)
        })
        .unwrap_or(false)
}

/// Delimiter separated values
#[derive(Debug, Clone)]
pub struct CsvFormat {
    delimiter: u8,
    comment: Option<u8>,
    header: Option<Vec<String>>,
    skip: usize,
    raw_inline: Regex,
}

impl CsvFormat {
    pub fn new(delimiter: u8, comment: Option<u8>, header: Option<Vec<String>>, skip: usize) -> Self {
        let delimiter_str = regex::escape(&(delimiter as char).to_string());
        let raw_inline = Regex::new(&format!("(?m)^(.*){}(.*)$", delimiter_str))
            .expect("escaped delimiter always forms a valid regex");

        CsvFormat {
            delimiter,
            comment,
            header,
            skip,
            raw_inline,
        }
    }

    fn error(&self, unit: &RawUnit, message: impl std::fmt::Display) -> ParseError {
        ParseError::Csv(format!("{}: {}", unit.name, message))
    }
}

impl Default for CsvFormat {
    fn default() -> Self {
        CsvFormat::new(b',', Some(b'#'), None, 0)
    }
}

impl FormatStrategy for CsvFormat {
    fn name(&self) -> &'static str {
        "csv"
    }

    fn is_raw_inline(&self, content: &str) -> bool {
        self.raw_inline.is_match(content)
    }

    fn is_supported_file(&self, name: &str) -> bool {
        has_extension(name, &["csv", "tsv", "txt"])
    }

    fn parse(&self, unit: &RawUnit) -> Result<Vec<Record>, ParseError> {
        let text = std::str::from_utf8(&unit.data)
            .map_err(|e| self.error(unit, format!("invalid UTF-8: {}", e)))?;

        let content = skip_leading_lines(text, self.skip);

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .comment(self.comment)
            .has_headers(false)
            .flexible(true)
            .from_reader(content.as_bytes());
        // The reader drops empty lines itself; whitespace-only lines come back as one blank field
        let mut rows = reader
            .records()
            .filter(|row| !matches!(row, Ok(row) if row.len() == 1 && row[0].trim().is_empty()));

        let header: Vec<String> = match &self.header {
            Some(header) => header.clone(),
            None => match rows.next() {
                Some(row) => row
                    .map_err(|e| self.error(unit, e))?
                    .iter()
                    .map(|field| field.trim().to_string())
                    .collect(),
                None => return Ok(Vec::new()),
            },
        };

        if header.iter().all(|h| h.is_empty()) {
            return Err(self.error(unit, "CSV header cannot be empty"));
        }

        let mut records = Vec::new();
        for (index, row) in rows.enumerate() {
            let row = row.map_err(|e| self.error(unit, e))?;
            if row.len() != header.len() {
                return Err(self.error(
                    unit,
                    format!(
                        "data row {} has {} fields but the header has {}",
                        index + 1,
                        row.len(),
                        header.len()
                    ),
                ));
            }

            let mut record = Record::new();
            for (key, value) in header.iter().zip(row.iter()) {
                record.insert(key.clone(), Value::String(value.to_string()));
            }
            records.push(record);
        }

        Ok(records)
    }
}

/// Everything after the first `skip` non-blank lines, byte for byte
fn skip_leading_lines(text: &str, skip: usize) -> &str {
    let mut remaining = skip;
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        if remaining == 0 {
            break;
        }
        if !line.trim().is_empty() {
            remaining -= 1;
        }
        offset += line.len();
    }
    &text[offset..]
}

/// A single JSON object per unit
#[derive(Debug, Clone, Default)]
pub struct JsonFormat;

impl JsonFormat {
    pub fn new() -> Self {
        Self
    }
}

impl FormatStrategy for JsonFormat {
    fn name(&self) -> &'static str {
        "json"
    }

    fn is_raw_inline(&self, content: &str) -> bool {
        RAW_JSON.is_match(content)
    }

    fn is_supported_file(&self, name: &str) -> bool {
        has_extension(name, &["json", "geojson", "topojson"])
    }

    fn parse(&self, unit: &RawUnit) -> Result<Vec<Record>, ParseError> {
        let value: Value = serde_json::from_slice(&unit.data)
            .map_err(|e| ParseError::Json(format!("{}: {}", unit.name, e)))?;

        match value {
            Value::Object(map) => Ok(vec![map]),
            other => Err(ParseError::Json(format!(
                "{}: top-level value must be an object, found {}",
                unit.name,
                json_kind(&other)
            ))),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Free text wrapped under a single key
#[derive(Debug, Clone)]
pub struct TextFormat {
    key: String,
    pattern: Option<Regex>,
}

impl TextFormat {
    pub fn new(key: impl Into<String>, pattern: Option<Regex>) -> Self {
        TextFormat {
            key: key.into(),
            pattern,
        }
    }

    /// Keep only the segments matching the extraction pattern
    fn extract<'t>(&self, text: &'t str) -> std::borrow::Cow<'t, str> {
        match &self.pattern {
            None => std::borrow::Cow::Borrowed(text),
            Some(pattern) => {
                let segments: Vec<&str> = pattern
                    .captures_iter(text)
                    .filter_map(|caps| caps.get(1).or_else(|| caps.get(0)))
                    .map(|m| m.as_str())
                    .collect();
                std::borrow::Cow::Owned(segments.join(" "))
            }
        }
    }
}

impl FormatStrategy for TextFormat {
    fn name(&self) -> &'static str {
        "text"
    }

    fn is_raw_inline(&self, content: &str) -> bool {
        RAW_JSON.is_match(content)
    }

    fn is_supported_file(&self, name: &str) -> bool {
        has_extension(name, &["txt"])
    }

    fn parse(&self, unit: &RawUnit) -> Result<Vec<Record>, ParseError> {
        let text = String::from_utf8_lossy(&unit.data);
        let extracted = self.extract(&text);
        let collapsed = NEWLINES.replace_all(&extracted, " ");

        let mut record = Record::new();
        record.insert(
            self.key.clone(),
            Value::String(collapsed.trim().to_string()),
        );
        Ok(vec![record])
    }
}

/// The active format, chosen once from the subcommand
#[derive(Debug, Clone)]
pub enum InputFormat {
    Csv(CsvFormat),
    Json(JsonFormat),
    Text(TextFormat),
}

impl InputFormat {
    pub fn strategy(&self) -> &dyn FormatStrategy {
        match self {
            InputFormat::Csv(format) => format,
            InputFormat::Json(format) => format,
            InputFormat::Text(format) => format,
        }
    }
}

impl FormatStrategy for InputFormat {
    fn name(&self) -> &'static str {
        self.strategy().name()
    }

    fn is_raw_inline(&self, content: &str) -> bool {
        self.strategy().is_raw_inline(content)
    }

    fn is_supported_file(&self, name: &str) -> bool {
        self.strategy().is_supported_file(name)
    }

    fn parse(&self, unit: &RawUnit) -> Result<Vec<Record>, ParseError> {
        self.strategy().parse(unit)
    }
}
