// src/pipeline/context.rs
use std::path::Path;

/// A structured document flowing through the pipeline.
///
/// Backed by `serde_json::Map`, which keeps insertion order (the
/// `preserve_order` feature) so published documents read in the order the
/// source and the transform steps produced them.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// One undifferentiated chunk of input: a file's content or an inline argument.
#[derive(Debug, Clone, PartialEq)]
pub struct RawUnit {
    pub name: String,
    pub data: Vec<u8>,
}

impl RawUnit {
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        RawUnit {
            name: name.into(),
            data: data.into(),
        }
    }
}

/// A parsed record together with the name of the unit it came from.
#[derive(Debug, Clone)]
pub struct SourcedRecord {
    pub source: String,
    pub record: Record,
}

impl SourcedRecord {
    pub fn new(source: impl Into<String>, record: Record) -> Self {
        SourcedRecord {
            source: source.into(),
            record,
        }
    }
}

/// Context passed to each processor for a record
pub struct RecordContext<'a> {
    /// Name of the raw unit (path or configured inline name)
    pub source: &'a str,
}

impl<'a> RecordContext<'a> {
    pub fn new(source: &'a str) -> Self {
        RecordContext { source }
    }

    /// Base file name of the source, used for filename metadata
    pub fn file_name(&self) -> &'a str {
        Path::new(self.source)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(self.source)
    }
}
