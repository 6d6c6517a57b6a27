//! Data-tree normalization
//!
//! Runs after context merging and before redaction so the redactor only
//! ever sees primitives, arrays, and maps. Depth is capped with a sentinel
//! value; error values are flattened into a stable map shape.

use serde_json::{Map, Value};

/// Nesting bound beyond which values collapse into [`DEPTH_SENTINEL`].
pub const MAX_DEPTH: usize = 8;

pub const DEPTH_SENTINEL: &str = "[MaxDepth]";

/// Normalize a merged data map in place.
pub fn normalize_map(map: &mut Map<String, Value>) {
    for value in map.values_mut() {
        normalize_value(value, 1);
    }
}

fn normalize_value(value: &mut Value, depth: usize) {
    if depth > MAX_DEPTH {
        *value = Value::String(DEPTH_SENTINEL.to_string());
        return;
    }
    match value {
        Value::Object(map) => {
            for nested in map.values_mut() {
                normalize_value(nested, depth + 1);
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                normalize_value(item, depth + 1);
            }
        }
        _ => {}
    }
}

/// Flatten an error into `{name, message, chain}` where `chain` lists the
/// messages of the `source()` chain, outermost first.
pub fn error_value<E>(err: &E) -> Value
where
    E: std::error::Error + ?Sized,
{
    let mut map = Map::new();
    map.insert(
        "name".to_string(),
        Value::String(std::any::type_name::<E>().to_string()),
    );
    map.insert("message".to_string(), Value::String(err.to_string()));

    let mut chain = Vec::new();
    let mut source = err.source();
    while let Some(cause) = source {
        chain.push(Value::String(cause.to_string()));
        source = cause.source();
    }
    if !chain.is_empty() {
        map.insert("chain".to_string(), Value::Array(chain));
    }

    Value::Object(map)
}
