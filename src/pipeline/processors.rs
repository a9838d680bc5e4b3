// src/pipeline/processors.rs - Transform chain steps
use crate::error::TransformError;
use crate::identifier::{record_id, subset_id};
use crate::pattern_extraction::NamePattern;
use crate::pipeline::config::PipelineConfig;
use crate::pipeline::context::{Record, RecordContext};
use crate::pipeline::script::ScriptTemplate;
use crate::resources::Resources;
use indexmap::IndexMap;
use serde_json::Value;
use tracing::trace;

/// One step of the transform chain
pub trait RecordProcessor: Send + Sync {
    fn process(&self, record: Record, ctx: &RecordContext) -> Result<Record, TransformError>;
    fn name(&self) -> &str;
}

/// Injects fields captured from the source file name
pub struct FilenameMetadataProcessor {
    pattern: NamePattern,
}

impl FilenameMetadataProcessor {
    pub fn new(pattern: NamePattern) -> Self {
        FilenameMetadataProcessor { pattern }
    }
}

impl RecordProcessor for FilenameMetadataProcessor {
    fn process(&self, mut record: Record, ctx: &RecordContext) -> Result<Record, TransformError> {
        let matched = self
            .pattern
            .apply(ctx.file_name(), &mut record)
            .map_err(|e| TransformError::from_error(self.name(), e))?;
        if !matched {
            trace!(source = ctx.source, "name pattern did not match");
        }
        Ok(record)
    }

    fn name(&self) -> &str {
        "filename-metadata"
    }
}

/// Keeps only the listed keys. Keys absent from the record are omitted.
pub struct IncludeProcessor {
    keys: Vec<String>,
}

impl IncludeProcessor {
    pub fn new(keys: Vec<String>) -> Self {
        IncludeProcessor { keys }
    }
}

impl RecordProcessor for IncludeProcessor {
    fn process(&self, mut record: Record, _ctx: &RecordContext) -> Result<Record, TransformError> {
        let mut kept = Record::new();
        for key in &self.keys {
            if let Some(value) = record.remove(key) {
                kept.insert(key.clone(), value);
            }
        }
        Ok(kept)
    }

    fn name(&self) -> &str {
        "include"
    }
}

pub struct ExcludeProcessor {
    keys: Vec<String>,
}

impl ExcludeProcessor {
    pub fn new(keys: Vec<String>) -> Self {
        ExcludeProcessor { keys }
    }
}

impl RecordProcessor for ExcludeProcessor {
    fn process(&self, mut record: Record, _ctx: &RecordContext) -> Result<Record, TransformError> {
        for key in &self.keys {
            record.remove(key);
        }
        Ok(record)
    }

    fn name(&self) -> &str {
        "exclude"
    }
}

/// Renames keys old -> new, in map order
pub struct RenameProcessor {
    mapping: IndexMap<String, String>,
}

impl RenameProcessor {
    pub fn new(mapping: IndexMap<String, String>) -> Self {
        RenameProcessor { mapping }
    }
}

impl RecordProcessor for RenameProcessor {
    fn process(&self, mut record: Record, _ctx: &RecordContext) -> Result<Record, TransformError> {
        for (old, new) in &self.mapping {
            if let Some(value) = record.remove(old) {
                record.insert(new.clone(), value);
            }
        }
        Ok(record)
    }

    fn name(&self) -> &str {
        "rename"
    }
}

/// Shallow merge; merge values win
pub struct MergeProcessor {
    fields: Record,
}

impl MergeProcessor {
    pub fn new(fields: Record) -> Self {
        MergeProcessor { fields }
    }
}

impl RecordProcessor for MergeProcessor {
    fn process(&self, mut record: Record, _ctx: &RecordContext) -> Result<Record, TransformError> {
        for (key, value) in &self.fields {
            record.insert(key.clone(), value.clone());
        }
        Ok(record)
    }

    fn name(&self) -> &str {
        "merge"
    }
}

/// Places the record under `payload_key` inside a copy of the wrapper
pub struct WrapProcessor {
    wrapper: Record,
    payload_key: String,
}

impl WrapProcessor {
    pub fn new(wrapper: Record, payload_key: impl Into<String>) -> Self {
        WrapProcessor {
            wrapper,
            payload_key: payload_key.into(),
        }
    }
}

impl RecordProcessor for WrapProcessor {
    fn process(&self, record: Record, _ctx: &RecordContext) -> Result<Record, TransformError> {
        let mut wrapped = self.wrapper.clone();
        wrapped.insert(self.payload_key.clone(), Value::Object(record));
        Ok(wrapped)
    }

    fn name(&self) -> &str {
        "wrap"
    }
}

/// Stores a deterministic id derived from the record or a key subset
pub struct IdentifierProcessor {
    keys: Option<Vec<String>>,
    id_key: String,
}

impl IdentifierProcessor {
    pub fn new(keys: Option<Vec<String>>, id_key: impl Into<String>) -> Self {
        IdentifierProcessor {
            keys,
            id_key: id_key.into(),
        }
    }
}

impl RecordProcessor for IdentifierProcessor {
    fn process(&self, mut record: Record, _ctx: &RecordContext) -> Result<Record, TransformError> {
        let id = match &self.keys {
            Some(keys) => subset_id(&record, keys).map_err(|missing| {
                TransformError::new(self.name(), format!("could not build id on key '{}'", missing))
            })?,
            None => record_id(&record),
        };
        record.insert(self.id_key.clone(), Value::String(id));
        Ok(record)
    }

    fn name(&self) -> &str {
        "identifier"
    }
}

pub struct ScriptProcessor {
    template: ScriptTemplate,
}

impl ScriptProcessor {
    pub fn new(template: ScriptTemplate) -> Self {
        ScriptProcessor { template }
    }
}

impl RecordProcessor for ScriptProcessor {
    fn process(&self, record: Record, _ctx: &RecordContext) -> Result<Record, TransformError> {
        self.template.invoke(record)
    }

    fn name(&self) -> &str {
        "script"
    }
}

/// Ordered steps applied to every record. The first failing step drops the record.
#[derive(Default)]
pub struct TransformChain {
    processors: Vec<Box<dyn RecordProcessor>>,
}

impl TransformChain {
    pub fn new() -> Self {
        TransformChain::default()
    }

    pub fn add_processor(&mut self, processor: Box<dyn RecordProcessor>) {
        self.processors.push(processor);
    }

    /// Build the fixed step order from configuration, taking the cached
    /// resources the steps need. The schema stays in `resources`.
    pub fn from_config(config: &PipelineConfig, resources: &mut Resources) -> Self {
        let mut chain = TransformChain::new();

        if let Some(pattern) = resources.name_pattern.take() {
            chain.add_processor(Box::new(FilenameMetadataProcessor::new(pattern)));
        }
        if let Some(keys) = &config.include {
            chain.add_processor(Box::new(IncludeProcessor::new(keys.clone())));
        }
        if !config.exclude.is_empty() {
            chain.add_processor(Box::new(ExcludeProcessor::new(config.exclude.clone())));
        }
        if let Some(mapping) = resources.key_map.take() {
            chain.add_processor(Box::new(RenameProcessor::new(mapping)));
        }
        if let Some(fields) = resources.merge.take() {
            chain.add_processor(Box::new(MergeProcessor::new(fields)));
        }
        if let Some(wrapper) = resources.wrapper.take() {
            chain.add_processor(Box::new(WrapProcessor::new(wrapper, config.payload_key.clone())));
        }
        if config.uuid || config.uuid_keys.is_some() {
            chain.add_processor(Box::new(IdentifierProcessor::new(
                config.uuid_keys.clone(),
                config.uuid_key.clone(),
            )));
        }
        if let Some(template) = resources.script.take() {
            chain.add_processor(Box::new(ScriptProcessor::new(template)));
        }

        chain
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.processors.iter().map(|p| p.name()).collect()
    }

    pub fn apply(&self, record: Record, ctx: &RecordContext) -> Result<Record, TransformError> {
        let mut current = record;
        for processor in &self.processors {
            current = processor.process(current, ctx)?;
        }
        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::config::FormatConfig;
    use serde_json::json;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => panic!("test record must be an object"),
        }
    }

    fn chain(config: &PipelineConfig) -> TransformChain {
        let mut resources = Resources::load(config).unwrap();
        TransformChain::from_config(config, &mut resources)
    }

    #[test]
    fn test_include_runs_before_exclude() {
        let mut config = PipelineConfig::new(FormatConfig::Json);
        config.include = Some(vec!["a".to_string(), "b".to_string()]);
        config.exclude = vec!["b".to_string()];

        let out = chain(&config)
            .apply(record(json!({"a": 1, "b": 2, "c": 3})), &RecordContext::new("inline"))
            .unwrap();
        assert_eq!(Value::Object(out), json!({"a": 1}));
    }

    #[test]
    fn test_include_omits_missing_keys() {
        let processor = IncludeProcessor::new(vec!["a".to_string(), "missing".to_string()]);
        let out = processor
            .process(record(json!({"a": 1, "b": 2})), &RecordContext::new("inline"))
            .unwrap();
        assert_eq!(Value::Object(out), json!({"a": 1}));
    }

    #[test]
    fn test_rename_then_merge_then_wrap() {
        let mut config = PipelineConfig::new(FormatConfig::Json);
        config.key_map = Some(r#"{"old": "new"}"#.to_string());
        config.merge = Some(r#"{"new": "merged", "extra": true}"#.to_string());
        config.wrapper = Some(r#"{"kind": "doc"}"#.to_string());
        config.payload_key = "body".to_string();

        let chain = chain(&config);
        assert_eq!(chain.step_names(), vec!["rename", "merge", "wrap"]);

        let out = chain
            .apply(record(json!({"old": 1, "keep": 2})), &RecordContext::new("inline"))
            .unwrap();
        assert_eq!(
            Value::Object(out),
            json!({"kind": "doc", "body": {"keep": 2, "new": "merged", "extra": true}})
        );
    }

    #[test]
    fn test_rename_absent_key_is_noop() {
        let mut mapping = IndexMap::new();
        mapping.insert("missing".to_string(), "renamed".to_string());
        let out = RenameProcessor::new(mapping)
            .process(record(json!({"a": 1})), &RecordContext::new("inline"))
            .unwrap();
        assert_eq!(Value::Object(out), json!({"a": 1}));
    }

    #[test]
    fn test_wrapper_is_copied_per_record() {
        let processor = WrapProcessor::new(record(json!({"v": 1})), "data");
        let ctx = RecordContext::new("inline");
        let first = processor.process(record(json!({"n": 1})), &ctx).unwrap();
        let second = processor.process(record(json!({"n": 2})), &ctx).unwrap();
        assert_eq!(first["data"], json!({"n": 1}));
        assert_eq!(second["data"], json!({"n": 2}));
    }

    #[test]
    fn test_identifier_on_key_subset() {
        let processor = IdentifierProcessor::new(Some(vec!["k".to_string()]), "id");
        let ctx = RecordContext::new("inline");
        let first = processor.process(record(json!({"k": 1, "x": "a"})), &ctx).unwrap();
        let second = processor.process(record(json!({"k": 1, "x": "b"})), &ctx).unwrap();
        assert_eq!(first["id"], second["id"]);

        let err = processor.process(record(json!({"x": 1})), &ctx).unwrap_err();
        assert_eq!(err.step, "identifier");
    }

    #[test]
    fn test_custom_id_key() {
        let processor = IdentifierProcessor::new(None, "_key");
        let out = processor
            .process(record(json!({"a": 1})), &RecordContext::new("inline"))
            .unwrap();
        assert!(out.contains_key("_key"));
        assert!(!out.contains_key("id"));
    }

    #[test]
    fn test_filename_metadata_uses_base_name() {
        let mut config = PipelineConfig::new(FormatConfig::Json);
        config.name_pattern =
            Some(r#"{"pattern":"^(\\d+)-(\\w+)\\.json$","output":"{\"num\":\"%1\",\"tag\":\"%2\"}"}"#.to_string());

        let out = chain(&config)
            .apply(record(json!({"a": 1})), &RecordContext::new("in/42-report.json"))
            .unwrap();
        assert_eq!(Value::Object(out), json!({"a": 1, "num": "42", "tag": "report"}));
    }

    #[test]
    fn test_failing_step_stops_chain() {
        let mut config = PipelineConfig::new(FormatConfig::Json);
        config.uuid_keys = Some(vec!["missing".to_string()]);
        config.merge = Some(r#"{"merged": true}"#.to_string());

        let err = chain(&config)
            .apply(record(json!({"a": 1})), &RecordContext::new("inline"))
            .unwrap_err();
        assert_eq!(err.step, "identifier");
    }

    #[test]
    fn test_script_runs_last() {
        let mut config = PipelineConfig::new(FormatConfig::Json);
        config.uuid = true;
        config.script = Some(
            "def check(doc):\n    doc[\"had_id\"] = \"id\" in doc\n    return doc\n\nfunctions = {\"check\": check}\n"
                .to_string(),
        );

        let out = chain(&config)
            .apply(record(json!({"a": 1})), &RecordContext::new("inline"))
            .unwrap();
        assert_eq!(out["had_id"], json!(true));
    }
}
