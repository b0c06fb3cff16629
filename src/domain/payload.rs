//! Lenient read access to a parsed Markdown payload.
//!
//! The extractor hands back an untyped `serde_json::Value`. Summaries and the
//! view builder only need a handful of fields and must never fail on a
//! malformed one, so these accessors treat missing or wrongly-typed fields as
//! empty instead of erroring.

use serde_json::{Map, Value};

/// Borrowed view over a parsed payload.
#[derive(Debug, Clone, Copy)]
pub struct Payload<'a> {
    root: &'a Value,
}

impl<'a> Payload<'a> {
    pub fn new(root: &'a Value) -> Self {
        Self { root }
    }

    fn array(&self, key: &str) -> &'a [Value] {
        self.root
            .get(key)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn history_data(&self) -> &'a [Value] {
        self.array("history_data")
    }

    pub fn future_cov(&self) -> &'a [Value] {
        self.array("future_cov")
    }

    pub fn covariates(&self) -> &'a [Value] {
        self.array("covariates")
    }

    pub fn known_covariates_names(&self) -> &'a [Value] {
        self.array("known_covariates_names")
    }

    pub fn category_cov_name(&self) -> &'a [Value] {
        self.array("category_cov_name")
    }

    pub fn freq(&self) -> Option<&'a str> {
        self.root.get("freq").and_then(Value::as_str)
    }
}

/// Series identifier of a row: `item_id`, else `id`.
///
/// Strings are used verbatim, numbers and booleans stringified. Empty or
/// non-scalar identifiers yield `None`.
pub fn series_id(row: &Value) -> Option<String> {
    row.as_object().and_then(series_id_of)
}

/// Same as [`series_id`] for an already-unwrapped object.
pub fn series_id_of(obj: &Map<String, Value>) -> Option<String> {
    let raw = match obj.get("item_id") {
        Some(Value::Null) | None => obj.get("id")?,
        Some(v) => v,
    };
    scalar_text(raw).filter(|s| !s.is_empty())
}

/// Timestamp of a row as a sortable string (empty when missing).
pub fn row_timestamp(row: &Value) -> String {
    row.get("timestamp")
        .and_then(scalar_text)
        .unwrap_or_default()
}

/// Finite numeric target of a row.
///
/// Numeric strings are accepted; anything else (missing, null, NaN-like,
/// infinite) yields `None`.
pub fn row_target(row: &Value) -> Option<f64> {
    number_of(row.get("target")?)
}

/// Interpret a JSON value as a finite number.
pub fn number_of(value: &Value) -> Option<f64> {
    let v = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    v.is_finite().then_some(v)
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn series_id_prefers_item_id_and_stringifies_numbers() {
        assert_eq!(series_id(&json!({"item_id": "A", "id": "B"})), Some("A".to_string()));
        assert_eq!(series_id(&json!({"id": 7})), Some("7".to_string()));
        assert_eq!(series_id(&json!({"item_id": null, "id": "B"})), Some("B".to_string()));
        assert_eq!(series_id(&json!({"item_id": ""})), None);
        assert_eq!(series_id(&json!({"target": 1.0})), None);
        assert_eq!(series_id(&json!("not a row")), None);
    }

    #[test]
    fn targets_must_be_finite_numbers() {
        assert_eq!(row_target(&json!({"target": 1.5})), Some(1.5));
        assert_eq!(row_target(&json!({"target": "2.5"})), Some(2.5));
        assert_eq!(row_target(&json!({"target": "NaN"})), None);
        assert_eq!(row_target(&json!({"target": "inf"})), None);
        assert_eq!(row_target(&json!({"target": null})), None);
        assert_eq!(row_target(&json!({})), None);
    }

    #[test]
    fn wrongly_typed_fields_read_as_empty() {
        let v = json!({"history_data": {"not": "a list"}, "freq": 3});
        let p = Payload::new(&v);
        assert!(p.history_data().is_empty());
        assert!(p.future_cov().is_empty());
        assert_eq!(p.freq(), None);
    }
}
