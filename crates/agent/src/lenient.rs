//! Loose readers for model-produced JSON.

use serde_json::{Map, Value};

/// String form of a scalar; `None` for null. Non-string values are rendered as JSON.
pub(crate) fn stringify(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// A string or an array of strings, as a list.
pub(crate) fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items.iter().filter_map(stringify).collect(),
        Some(Value::String(s)) => vec![s.clone()],
        _ => Vec::new(),
    }
}

/// Object of scalars as ordered string pairs; nulls dropped.
pub(crate) fn string_map(value: Option<&Value>) -> impl Iterator<Item = (String, String)> + '_ {
    value
        .and_then(Value::as_object)
        .into_iter()
        .flat_map(Map::iter)
        .filter_map(|(k, v)| stringify(v).map(|v| (k.clone(), v)))
}

pub(crate) fn str_field<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    map.get(key).and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalars_are_stringified_and_nulls_dropped() {
        let value = json!({"a": "x", "b": 5, "c": null, "d": true});
        let pairs: Vec<_> = string_map(Some(&value)).collect();
        assert_eq!(
            pairs,
            vec![
                ("a".to_string(), "x".to_string()),
                ("b".to_string(), "5".to_string()),
                ("d".to_string(), "true".to_string()),
            ]
        );
    }

    #[test]
    fn single_strings_become_one_element_lists() {
        assert_eq!(string_list(Some(&json!("orders"))), vec!["orders"]);
        assert_eq!(string_list(Some(&json!(["a", 1, null]))), vec!["a", "1"]);
        assert!(string_list(None).is_empty());
    }
}
