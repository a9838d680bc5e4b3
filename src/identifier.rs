// src/identifier.rs - Deterministic document ids
use serde_json::Value;
use uuid::Uuid;

use crate::pipeline::context::Record;

/// Serialize with object keys sorted at every level, so equal content
/// always yields equal bytes regardless of insertion order.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[key.as_str()], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Name-based (SHA-1, DNS namespace) UUID of the given bytes
pub fn derive_id(bytes: &[u8]) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_DNS, bytes).to_string()
}

/// Id of a whole record
pub fn record_id(record: &Record) -> String {
    derive_id(canonical_json(&Value::Object(record.clone())).as_bytes())
}

/// Id over a subset of keys. Returns the first missing key on failure.
pub fn subset_id(record: &Record, keys: &[String]) -> Result<String, String> {
    let mut subset = Record::new();
    for key in keys {
        match record.get(key) {
            Some(value) => {
                subset.insert(key.clone(), value.clone());
            }
            None => return Err(key.clone()),
        }
    }
    Ok(record_id(&subset))
}

/// Textual form of an existing id value
pub fn id_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => panic!("test record must be an object"),
        }
    }

    #[test]
    fn test_canonical_json_sorts_nested_keys() {
        let value = json!({"b": 1, "a": {"d": [true, null], "c": "x"}});
        assert_eq!(canonical_json(&value), r#"{"a":{"c":"x","d":[true,null]},"b":1}"#);
    }

    #[test]
    fn test_id_ignores_key_order() {
        let first = record(json!({"a": 1, "b": "two"}));
        let second = record(json!({"b": "two", "a": 1}));
        assert_eq!(record_id(&first), record_id(&second));
    }

    #[test]
    fn test_id_changes_with_content() {
        let first = record(json!({"a": 1}));
        let second = record(json!({"a": 2}));
        assert_ne!(record_id(&first), record_id(&second));
    }

    #[test]
    fn test_id_is_uuid_v5() {
        let id = derive_id(b"{\"a\":1}");
        let parsed = Uuid::parse_str(&id).unwrap();
        assert_eq!(parsed.get_version_num(), 5);
        assert_eq!(id, derive_id(b"{\"a\":1}"));
    }

    #[test]
    fn test_subset_id() {
        let full = record(json!({"a": 1, "b": 2, "c": 3}));
        let reduced = record(json!({"a": 1, "b": 2}));
        let keys = vec!["a".to_string(), "b".to_string()];
        assert_eq!(subset_id(&full, &keys).unwrap(), record_id(&reduced));

        let missing = vec!["a".to_string(), "z".to_string()];
        assert_eq!(subset_id(&full, &missing).unwrap_err(), "z");
    }
}
