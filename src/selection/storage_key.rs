use std::collections::BTreeMap;

use serde_json::Value;

use super::{Argument, FieldHandle};
use crate::types::Variables;

/// Computes the canonical storage key of a field.
///
/// Arguments are substituted, sorted by name and rendered as compact JSON, so
/// the key does not depend on the order arguments were written in. Arguments
/// resolving to `null` are omitted.
pub fn storage_key(name: &str, args: &[Argument], variables: &Variables) -> String {
    if args.is_empty() {
        return name.to_owned();
    }
    let values: BTreeMap<String, Value> = args
        .iter()
        .map(|arg| (arg.name.clone(), arg.value.resolve(variables)))
        .collect();
    format_storage_key(name, &values)
}

/// Storage key of the value a handle derives from a field.
pub fn handle_storage_key(
    handle: &FieldHandle,
    field_name: &str,
    args: &[Argument],
    variables: &Variables,
) -> String {
    let base = match &handle.key {
        Some(key) if !key.is_empty() => format!("__{key}_{}", handle.handle),
        _ => format!("__{field_name}_{}", handle.handle),
    };
    let Some(filters) = &handle.filters else {
        return base;
    };
    let values: BTreeMap<String, Value> = args
        .iter()
        .filter(|arg| filters.iter().any(|f| f == &arg.name))
        .map(|arg| (arg.name.clone(), arg.value.resolve(variables)))
        .collect();
    format_storage_key(&base, &values)
}

/// Renders `name(arg:value,...)` from already-resolved argument values.
pub fn format_storage_key(name: &str, values: &BTreeMap<String, Value>) -> String {
    let mut rendered = Vec::with_capacity(values.len());
    for (arg, value) in values {
        if value.is_null() {
            continue;
        }
        rendered.push(format!("{arg}:{}", canonical_json(value)));
    }
    if rendered.is_empty() {
        name.to_owned()
    } else {
        format!("{name}({})", rendered.join(","))
    }
}

fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, String> =
                map.iter().map(|(k, v)| (k, canonical_json(v))).collect();
            let body: Vec<String> = sorted
                .into_iter()
                .map(|(k, v)| format!("{}:{v}", Value::String(k.clone())))
                .collect();
            format!("{{{}}}", body.join(","))
        }
        Value::Array(items) => {
            let body: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", body.join(","))
        }
        other => other.to_string(),
    }
}
