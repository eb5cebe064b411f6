//! Removal of empty fields from outgoing requests.
//!
//! Sails reads a missing key and a `null` key differently, so anything that
//! is `null`, an empty string, or an empty object is dropped before a request
//! leaves the client.

use serde_json::{Map, Value};

/// `true` for `null`, `""` and `{}`.
///
/// Empty arrays and `false`/`0` are real values and are kept.
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Drop empty entries from a map, recursing one level into object values.
///
/// A nested object that becomes empty after its own sweep is dropped as well.
pub fn strip_empty(map: Map<String, Value>) -> Map<String, Value> {
    sweep(map, 1)
}

fn sweep(map: Map<String, Value>, depth: usize) -> Map<String, Value> {
    map.into_iter()
        .map(|(key, value)| match value {
            Value::Object(inner) if depth > 0 => (key, Value::Object(sweep(inner, depth - 1))),
            other => (key, other),
        })
        .filter(|(_, value)| !is_empty_value(value))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn empty_values() {
        assert!(is_empty_value(&Value::Null));
        assert!(is_empty_value(&json!("")));
        assert!(is_empty_value(&json!({})));
        assert!(!is_empty_value(&json!([])));
        assert!(!is_empty_value(&json!(0)));
        assert!(!is_empty_value(&json!(false)));
        assert!(!is_empty_value(&json!("x")));
    }

    #[test]
    fn strips_top_level_and_one_nested_level() {
        let cleaned = strip_empty(obj(json!({
            "keep": 1,
            "gone": null,
            "blank": "",
            "nested": { "a": null, "b": "", "c": 2, "deep": { "x": null } },
            "collapses": { "only": null },
        })));

        assert_eq!(
            Value::Object(cleaned),
            json!({
                "keep": 1,
                "nested": { "c": 2, "deep": { "x": null } },
            })
        );
    }
}
