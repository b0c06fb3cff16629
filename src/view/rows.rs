//! Classification of backend prediction rows.
//!
//! The backend returns rows as flat JSON objects whose quantile columns are
//! keyed by their numeric label. Each key is sorted into one of three bins:
//! the fixed keys (`item_id`, `timestamp`, `mean`), numeric quantiles (the
//! key is `0.` followed by digits and lies strictly inside `(0, 1)`), or
//! everything else.

use serde_json::{Map, Value};

use crate::domain::payload::{number_of, series_id_of};
use crate::domain::{PredictionRow, QuantileValue};

const FIXED_KEYS: [&str; 3] = ["item_id", "timestamp", "mean"];

/// Quantile level encoded by a column key, if it is one.
pub fn quantile_level(key: &str) -> Option<f64> {
    let digits = key.strip_prefix("0.")?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let level = key.parse::<f64>().ok()?;
    (level.is_finite() && level > 0.0 && level < 1.0).then_some(level)
}

/// Classify one raw prediction row.
pub fn classify_row(raw: &Map<String, Value>) -> PredictionRow {
    let mut quantiles = Vec::new();
    let mut extra = Map::new();

    for (key, value) in raw {
        if FIXED_KEYS.contains(&key.as_str()) {
            continue;
        }
        match quantile_level(key) {
            Some(level) => quantiles.push(QuantileValue {
                label: key.clone(),
                level,
                value: number_of(value),
            }),
            None => {
                extra.insert(key.clone(), value.clone());
            }
        }
    }
    quantiles.sort_by(|a, b| a.level.total_cmp(&b.level));

    let timestamp = match raw.get("timestamp") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    };

    PredictionRow {
        item_id: series_id_of(raw),
        timestamp,
        mean: raw.get("mean").and_then(number_of),
        quantiles,
        extra,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().unwrap().clone()
    }

    #[test]
    fn splits_fixed_quantile_and_other_keys() {
        let row = classify_row(&obj(json!({
            "item_id": "A",
            "timestamp": "2024-01-05",
            "mean": 3.5,
            "0.9": 5.0,
            "0.1": 2.0,
            "0.5": null,
            "target_name": "sales",
            "1": 7
        })));

        assert_eq!(row.item_id.as_deref(), Some("A"));
        assert_eq!(row.timestamp.as_deref(), Some("2024-01-05"));
        assert_eq!(row.mean, Some(3.5));

        let labels: Vec<_> = row.quantiles.iter().map(|q| q.label.as_str()).collect();
        assert_eq!(labels, vec!["0.1", "0.5", "0.9"]);
        assert_eq!(row.quantile_value("0.1"), Some(2.0));
        assert!(row.has_quantile("0.5"));
        assert_eq!(row.quantile_value("0.5"), None);

        assert_eq!(row.extra.len(), 2);
        assert!(row.extra.contains_key("target_name"));
        assert!(row.extra.contains_key("1"));
    }

    #[test]
    fn rejects_out_of_range_levels() {
        assert_eq!(quantile_level("0.25"), Some(0.25));
        assert_eq!(quantile_level("0"), None);
        assert_eq!(quantile_level("1.0"), None);
        assert_eq!(quantile_level("mean"), None);
        assert_eq!(quantile_level("NaN"), None);
    }

    #[test]
    fn only_plain_decimal_keys_are_quantiles() {
        assert_eq!(quantile_level("0.05"), Some(0.05));
        for key in [".5", "5e-1", " 0.5", "0.5 ", "0.", "0.5e0", "+0.5", "00.5"] {
            assert_eq!(quantile_level(key), None, "{key:?}");
        }

        let row = classify_row(&obj(json!({
            "item_id": "A", "0.2": 1.0, ".5": 2.0, "5e-1": 2.0, "0.8": 3.0
        })));
        let labels: Vec<_> = row.quantiles.iter().map(|q| q.label.as_str()).collect();
        assert_eq!(labels, vec!["0.2", "0.8"]);
        assert!(row.extra.contains_key(".5") && row.extra.contains_key("5e-1"));
    }

    #[test]
    fn row_without_identifier_keeps_other_fields() {
        let row = classify_row(&obj(json!({"timestamp": "t", "mean": "n/a"})));
        assert_eq!(row.item_id, None);
        assert_eq!(row.mean, None);
        assert!(row.quantiles.is_empty());
    }
}
