// src/pipeline/script.rs - User script transform
use crate::error::{StartupError, TransformError};
use crate::pipeline::context::Record;
use crate::resources::read_inline_or_file;
use anyhow::anyhow;
use starlark::environment::{Globals, GlobalsBuilder, Module};
use starlark::eval::Evaluator;
use starlark::starlark_module;
use starlark::syntax::{AstModule, Dialect};
use starlark::values::dict::DictRef;
use starlark::values::Value;

/// Name of the dict the script must define
const FUNCTIONS: &str = "functions";

#[starlark_module]
fn script_helpers(builder: &mut starlark::environment::GlobalsBuilder) {
    fn regex_match(pattern: String, text: String) -> anyhow::Result<bool> {
        let regex = regex::Regex::new(&pattern)?;
        Ok(regex.is_match(&text))
    }

    fn regex_replace(pattern: String, replacement: String, text: String) -> anyhow::Result<String> {
        let regex = regex::Regex::new(&pattern)?;
        Ok(regex.replace_all(&text, replacement.as_str()).into_owned())
    }
}

fn dialect() -> Dialect {
    Dialect {
        enable_f_strings: true,
        ..Dialect::Extended
    }
}

/// Compiled-once user script.
///
/// The script defines a dict named `functions` mapping names to one-argument
/// functions. Each function receives the record as a dict and returns the
/// replacement record; functions run in the dict's insertion order.
///
/// Every invocation evaluates the script in a fresh module, so concurrent
/// workers share nothing but the immutable source and globals.
#[derive(Clone)]
pub struct ScriptTemplate {
    source: String,
    globals: Globals,
    function_names: Vec<String>,
}

impl std::fmt::Debug for ScriptTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptTemplate")
            .field("function_names", &self.function_names)
            .finish()
    }
}

impl ScriptTemplate {
    /// Load from a file path, or treat the value as the script itself
    pub fn load(value: &str) -> Result<Self, StartupError> {
        Self::from_source(read_inline_or_file(value))
    }

    pub fn from_source(source: String) -> Result<Self, StartupError> {
        let globals = GlobalsBuilder::standard().with(script_helpers).build();

        let module = Module::new();
        let function_names = {
            let mut eval = Evaluator::new(&module);
            let ast = AstModule::parse("script", source.clone(), &dialect())
                .map_err(|e| StartupError::Script(format!("parse error: {}", e)))?;
            eval.eval_module(ast, &globals)
                .map_err(|e| StartupError::Script(format!("evaluation error: {}", e)))?;

            let functions = module.get(FUNCTIONS).ok_or_else(|| {
                StartupError::Script(format!("script must define a '{}' dict", FUNCTIONS))
            })?;
            collect_functions(functions).map_err(|e| StartupError::Script(e.to_string()))?
                .into_iter()
                .map(|(name, _)| name)
                .collect::<Vec<_>>()
        };

        Ok(ScriptTemplate {
            source,
            globals,
            function_names,
        })
    }

    pub fn function_names(&self) -> &[String] {
        &self.function_names
    }

    /// Run every script function over the record, in order
    pub fn invoke(&self, record: Record) -> Result<Record, TransformError> {
        self.run(record)
            .map_err(|e| TransformError::from_error("script", e))
    }

    fn run(&self, record: Record) -> anyhow::Result<Record> {
        // Create fresh module for each record
        let module = Module::new();
        let mut eval = Evaluator::new(&module);

        let ast = AstModule::parse("script", self.source.clone(), &dialect())
            .map_err(|e| anyhow!("Script parse error: {}", e))?;
        eval.eval_module(ast, &self.globals)
            .map_err(|e| anyhow!("Script execution error: {}", e))?;

        let functions = module
            .get(FUNCTIONS)
            .ok_or_else(|| anyhow!("'{}' is not defined", FUNCTIONS))?;

        let mut current = serde_json::Value::Object(record);
        for (name, function) in collect_functions(functions)? {
            let argument = json_to_starlark_value(module.heap(), current)?;
            let result = eval
                .eval_function(function, &[argument], &[])
                .map_err(|e| anyhow!("function '{}' failed: {}", name, e))?;

            if result.is_none() {
                return Err(anyhow!("function '{}' returned None", name));
            }
            current = starlark_to_json_value(result)?;
            if !current.is_object() {
                return Err(anyhow!(
                    "function '{}' must return a dict, got {}",
                    name,
                    result.get_type()
                ));
            }
        }

        match current {
            serde_json::Value::Object(record) => Ok(record),
            _ => Err(anyhow!("script did not produce a record")),
        }
    }
}

fn collect_functions<'v>(functions: Value<'v>) -> anyhow::Result<Vec<(String, Value<'v>)>> {
    let dict = DictRef::from_value(functions)
        .ok_or_else(|| anyhow!("'{}' must be a dict, got {}", FUNCTIONS, functions.get_type()))?;

    let mut collected = Vec::with_capacity(dict.len());
    for (key, value) in dict.iter() {
        let name = match key.unpack_str() {
            Some(s) => s.to_string(),
            None => key.to_string(),
        };
        if value.get_type() != "function" {
            return Err(anyhow!("'{}' entry '{}' is not a function", FUNCTIONS, name));
        }
        collected.push((name, value));
    }
    Ok(collected)
}

fn json_to_starlark_value(
    heap: &starlark::values::Heap,
    json: serde_json::Value,
) -> anyhow::Result<Value<'_>> {
    match json {
        serde_json::Value::Null => Ok(Value::new_none()),
        serde_json::Value::Bool(b) => Ok(Value::new_bool(b)),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(heap.alloc(i))
            } else if let Some(f) = n.as_f64() {
                Ok(heap.alloc(f))
            } else {
                Ok(heap.alloc(n.to_string()))
            }
        }
        serde_json::Value::String(s) => Ok(heap.alloc(s)),
        serde_json::Value::Array(arr) => {
            let values: Result<Vec<Value>, anyhow::Error> = arr
                .into_iter()
                .map(|v| json_to_starlark_value(heap, v))
                .collect();
            Ok(heap.alloc(values?))
        }
        serde_json::Value::Object(obj) => {
            use starlark::collections::SmallMap;
            use starlark::values::dict::Dict;

            let mut content = SmallMap::new();
            for (k, v) in obj {
                let key = heap.alloc(k);
                let value = json_to_starlark_value(heap, v)?;
                content.insert_hashed(key.get_hashed().map_err(|e| anyhow!("{}", e))?, value);
            }
            Ok(heap.alloc(Dict::new(content)))
        }
    }
}

fn starlark_to_json_value(value: Value) -> anyhow::Result<serde_json::Value> {
    use starlark::values::list::ListRef;
    use starlark::values::tuple::TupleRef;

    if value.is_none() {
        Ok(serde_json::Value::Null)
    } else if let Some(b) = value.unpack_bool() {
        Ok(serde_json::Value::Bool(b))
    } else if let Some(i) = value.unpack_i32() {
        Ok(serde_json::Value::from(i))
    } else if let Some(s) = value.unpack_str() {
        Ok(serde_json::Value::String(s.to_string()))
    } else if value.get_type() == "int" {
        // Outside i32 range
        let text = value.to_string();
        text.parse::<i64>()
            .map(serde_json::Value::from)
            .or_else(|_| text.parse::<u64>().map(serde_json::Value::from))
            .map_err(|_| anyhow!("integer {} does not fit in a JSON number", text))
    } else if value.get_type() == "float" {
        let number = value
            .to_string()
            .parse::<f64>()
            .map_err(|e| anyhow!("invalid float {}: {}", value, e))?;
        serde_json::Number::from_f64(number)
            .map(serde_json::Value::Number)
            .ok_or_else(|| anyhow!("float {} cannot be represented in JSON", value))
    } else if let Some(list) = ListRef::from_value(value) {
        let arr: Result<Vec<serde_json::Value>, _> =
            list.iter().map(starlark_to_json_value).collect();
        Ok(serde_json::Value::Array(arr?))
    } else if let Some(tuple) = TupleRef::from_value(value) {
        let arr: Result<Vec<serde_json::Value>, _> =
            tuple.content().iter().copied().map(starlark_to_json_value).collect();
        Ok(serde_json::Value::Array(arr?))
    } else if let Some(dict) = DictRef::from_value(value) {
        let mut obj = serde_json::Map::new();
        for (k, v) in dict.iter() {
            let key = match k.unpack_str() {
                Some(s) => s.to_string(),
                None => k.to_string(),
            };
            obj.insert(key, starlark_to_json_value(v)?);
        }
        Ok(serde_json::Value::Object(obj))
    } else {
        Ok(serde_json::Value::String(value.to_string()))
    }
}
