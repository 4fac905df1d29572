//! Default extraction from raw schema documents

use serde_json::Value as JsonValue;

use super::DefaultValues;

/// Collect every `default` declared in `schema`, keyed by its path
///
/// - `properties` children append `.name`
/// - `patternProperties` children append `.[<regex>]`, the regex kept verbatim
/// - `items` appends `.[0]`, standing for any array index
pub fn extract_defaults(schema: &JsonValue) -> DefaultValues {
    let mut defaults = DefaultValues::new();
    extract_recursive(schema, "", &mut defaults);
    defaults
}

fn extract_recursive(schema: &JsonValue, path: &str, defaults: &mut DefaultValues) {
    let Some(obj) = schema.as_object() else {
        return;
    };

    if let Some(default) = obj.get("default") {
        defaults.insert(path, default.clone());
    }

    if let Some(props) = obj.get("properties").and_then(|p| p.as_object()) {
        for (name, child) in props {
            extract_recursive(child, &join(path, name), defaults);
        }
    }

    if let Some(patterns) = obj.get("patternProperties").and_then(|p| p.as_object()) {
        for (pattern, child) in patterns {
            extract_recursive(child, &join(path, &format!("[{}]", pattern)), defaults);
        }
    }

    if let Some(items) = obj.get("items") {
        extract_recursive(items, &join(path, "[0]"), defaults);
    }
}

fn join(path: &str, segment: &str) -> String {
    if path.is_empty() {
        segment.to_string()
    } else {
        format!("{}.{}", path, segment)
    }
}
