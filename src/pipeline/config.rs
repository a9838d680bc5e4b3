use crate::error::StartupError;
use crate::input_format::{CsvFormat, InputFormat, JsonFormat, TextFormat};
use crate::resources::read_inline_or_file;
use regex::Regex;
use std::path::PathBuf;

pub const DEFAULT_CONCURRENCY: usize = 2;

/// Format selected by the subcommand, with its own flags
#[derive(Debug, Clone, PartialEq)]
pub enum FormatConfig {
    Csv {
        delimiter: String,
        comment: String,
        header: Option<String>,
        skip: usize,
    },
    Json,
    Text {
        key: String,
        pattern: Option<String>,
    },
}

impl FormatConfig {
    /// Resolve flags into the active format strategy
    pub fn build(&self) -> Result<InputFormat, StartupError> {
        match self {
            FormatConfig::Csv {
                delimiter,
                comment,
                header,
                skip,
            } => {
                let delimiter = parse_char_flag(delimiter)
                    .ok_or_else(|| StartupError::config("delimiter", "expected a single character"))?;
                let comment = if comment.is_empty() {
                    None
                } else {
                    Some(parse_char_flag(comment).ok_or_else(|| {
                        StartupError::config("comment", "expected a single character")
                    })?)
                };
                // A readable file provides the header, otherwise the value is the header itself
                let header = match header {
                    Some(value) => {
                        let text = read_inline_or_file(value);
                        Some(split_list(text.trim()))
                    }
                    None => None,
                };
                Ok(InputFormat::Csv(CsvFormat::new(delimiter, comment, header, *skip)))
            }
            FormatConfig::Json => Ok(InputFormat::Json(JsonFormat::new())),
            FormatConfig::Text { key, pattern } => {
                let pattern = match pattern {
                    Some(value) => {
                        let source = read_inline_or_file(value);
                        Some(Regex::new(source.trim()).map_err(|e| {
                            StartupError::config("pattern", format!("invalid regex: {}", e))
                        })?)
                    }
                    None => None,
                };
                Ok(InputFormat::Text(TextFormat::new(key.clone(), pattern)))
            }
        }
    }

    /// Flag values of this format that may name files on disk
    fn file_flags(&self) -> Vec<&str> {
        match self {
            FormatConfig::Csv { header, .. } => header.iter().map(String::as_str).collect(),
            FormatConfig::Json => Vec::new(),
            FormatConfig::Text { pattern, .. } => pattern.iter().map(String::as_str).collect(),
        }
    }
}

/// Configuration for one run of the pipeline
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub format: FormatConfig,
    pub inputs: Vec<String>,
    pub concurrency: usize,
    pub recursive: bool,
    /// Name given to inline and piped units
    pub default_name: String,
    pub include: Option<Vec<String>>,
    pub exclude: Vec<String>,
    pub key_map: Option<String>,
    pub merge: Option<String>,
    pub wrapper: Option<String>,
    pub payload_key: String,
    pub name_pattern: Option<String>,
    pub uuid: bool,
    pub uuid_keys: Option<Vec<String>>,
    pub uuid_key: String,
    pub script: Option<String>,
    pub schema: Option<String>,
    pub output: Option<PathBuf>,
    pub address: Option<String>,
    pub http_verb: String,
}

impl PipelineConfig {
    pub fn new(format: FormatConfig) -> Self {
        PipelineConfig {
            format,
            inputs: Vec::new(),
            concurrency: DEFAULT_CONCURRENCY,
            recursive: false,
            default_name: "inline".to_string(),
            include: None,
            exclude: Vec::new(),
            key_map: None,
            merge: None,
            wrapper: None,
            payload_key: "data".to_string(),
            name_pattern: None,
            uuid: false,
            uuid_keys: None,
            uuid_key: "id".to_string(),
            script: None,
            schema: None,
            output: None,
            address: None,
            http_verb: "POST".to_string(),
        }
    }

    /// Values of every flag that may reference a configuration file.
    /// Discovery never treats these files as input.
    pub fn configuration_values(&self) -> Vec<&str> {
        let mut values: Vec<&str> = [
            &self.key_map,
            &self.merge,
            &self.name_pattern,
            &self.wrapper,
            &self.schema,
            &self.script,
        ]
        .into_iter()
        .filter_map(|value| value.as_deref())
        .collect();
        values.extend(self.format.file_flags());
        values
    }
}

/// Split a comma separated flag value, trimming each item
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

/// Like `split_list`, but a list with no entries means the flag was not given
pub fn split_optional_list(value: Option<&str>) -> Option<Vec<String>> {
    value.map(split_list).filter(|items| !items.is_empty())
}

/// Single byte flag value; accepts the escapes `\t`, `\n` and `\\`
pub fn parse_char_flag(value: &str) -> Option<u8> {
    match value {
        "\\t" | "\t" => Some(b'\t'),
        "\\n" => Some(b'\n'),
        "\\\\" => Some(b'\\'),
        _ => {
            let bytes = value.as_bytes();
            if bytes.len() == 1 {
                Some(bytes[0])
            } else {
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_list_trims() {
        assert_eq!(split_list(" a, b ,c,"), vec!["a", "b", "c"]);
        assert!(split_list("").is_empty());
    }

    #[test]
    fn test_parse_char_flag() {
        assert_eq!(parse_char_flag(","), Some(b','));
        assert_eq!(parse_char_flag("\\t"), Some(b'\t'));
        assert_eq!(parse_char_flag(";;"), None);
        assert_eq!(parse_char_flag(""), None);
    }

    #[test]
    fn test_inline_header_is_split() {
        let format = FormatConfig::Csv {
            delimiter: ",".to_string(),
            comment: "#".to_string(),
            header: Some("h1, h2".to_string()),
            skip: 0,
        };
        let format = format.build().unwrap();
        let unit = crate::pipeline::context::RawUnit::new("inline", "1,2");
        let records = crate::input_format::FormatStrategy::parse(&format, &unit).unwrap();
        assert_eq!(records[0]["h2"], "2");
    }

    #[test]
    fn test_configuration_values() {
        let mut config = PipelineConfig::new(FormatConfig::Text {
            key: "text".to_string(),
            pattern: Some("pattern.re".to_string()),
        });
        config.merge = Some("merge.json".to_string());
        config.script = Some("transform.star".to_string());

        let values = config.configuration_values();
        assert!(values.contains(&"merge.json"));
        assert!(values.contains(&"transform.star"));
        assert!(values.contains(&"pattern.re"));
        assert_eq!(values.len(), 3);
    }
}
