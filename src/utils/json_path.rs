//! Dot-notation JSON path access, used to apply `<adapter>.*` provider-hint
//! overrides onto shaped request bodies (e.g. `options.temperature`).

use serde_json::{Map, Value};

/// Read a nested value by dot-separated path.
pub fn get_path<'a>(obj: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = obj;
    for part in path.split('.') {
        if part.is_empty() {
            return None;
        }
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

/// Set a nested value by dot-separated path, creating intermediate objects.
/// Intermediate non-object values are replaced.
pub fn set_path(obj: &mut Value, path: &str, value: Value) {
    if path.is_empty() {
        return;
    }
    if !obj.is_object() {
        *obj = Value::Object(Map::new());
    }

    let parts: Vec<&str> = path.split('.').collect();
    let mut current = obj.as_object_mut().expect("root coerced to object above");
    for part in &parts[..parts.len() - 1] {
        if !current.get(*part).map(Value::is_object).unwrap_or(false) {
            current.insert((*part).to_string(), Value::Object(Map::new()));
        }
        current = current
            .get_mut(*part)
            .and_then(Value::as_object_mut)
            .expect("intermediate coerced to object above");
    }
    current.insert(parts[parts.len() - 1].to_string(), value);
}
