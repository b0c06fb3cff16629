//! Payload summary used for pre-submission hints.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;

use crate::domain::Payload;
use crate::domain::payload::series_id;
use crate::io::markdown::extract_json_from_markdown;

/// Descriptive statistics about an uploaded payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PayloadSummary {
    pub series_count: usize,
    pub history_rows: usize,
    pub has_future_cov: bool,
    pub known_covariates_count: usize,
    pub category_covariates_count: usize,
    /// Shortest series, 0 when there are no series.
    pub min_series_length: usize,
    /// Longest series, 0 when there are no series.
    pub max_series_length: usize,
    pub freq: Option<String>,
}

/// Summarize an already-parsed payload.
pub fn summarize(payload: &Value) -> PayloadSummary {
    let p = Payload::new(payload);
    let history = p.history_data();

    let mut counts: HashMap<String, usize> = HashMap::new();
    for row in history {
        if let Some(id) = series_id(row) {
            *counts.entry(id).or_insert(0) += 1;
        }
    }

    let min_series_length = counts.values().copied().min().unwrap_or(0);
    let max_series_length = counts.values().copied().max().unwrap_or(0);

    PayloadSummary {
        series_count: counts.len(),
        history_rows: history.len(),
        has_future_cov: !p.future_cov().is_empty() || !p.covariates().is_empty(),
        known_covariates_count: p.known_covariates_names().len(),
        category_covariates_count: p.category_cov_name().len(),
        min_series_length,
        max_series_length,
        freq: p.freq().map(str::to_string),
    }
}

/// Summarize a Markdown document, or `None` if its payload does not parse.
pub fn try_summarize_markdown(markdown: &str) -> Option<PayloadSummary> {
    match extract_json_from_markdown(markdown) {
        Ok(payload) => Some(summarize(&payload)),
        Err(err) => {
            tracing::debug!(%err, "payload summary unavailable");
            None
        }
    }
}

/// Warn when the horizon exceeds the shortest series.
pub fn prediction_length_hint(summary: &PayloadSummary, prediction_length: u32) -> Option<String> {
    let min_len = summary.min_series_length;
    if min_len == 0 || (prediction_length as usize) <= min_len {
        return None;
    }
    Some(format!(
        "The shortest series has {min_len} rows but prediction_length={prediction_length}. \
         If the backend reports \"time series too short\", add history or lower prediction_length."
    ))
}

/// Render the summary as a small block of `key: value` lines.
pub fn format_summary(summary: &PayloadSummary) -> String {
    let mut out = String::new();
    out.push_str(&format!("series: {}\n", summary.series_count));
    out.push_str(&format!("history_rows: {}\n", summary.history_rows));
    out.push_str(&format!("has_covariates: {}\n", summary.has_future_cov));
    out.push_str(&format!("known_covariates: {}\n", summary.known_covariates_count));
    if summary.category_covariates_count > 0 {
        out.push_str(&format!(
            "categorical_covariates: {}\n",
            summary.category_covariates_count
        ));
    }
    if let Some(freq) = &summary.freq {
        out.push_str(&format!("freq: {freq}\n"));
    }
    out.push_str(&format!(
        "series_len(min/max): {}/{}\n",
        summary.min_series_length, summary.max_series_length
    ));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_history_reports_zeros() {
        let s = summarize(&json!({"history_data": []}));
        assert_eq!(s.series_count, 0);
        assert_eq!(s.history_rows, 0);
        assert_eq!(s.min_series_length, 0);
        assert_eq!(s.max_series_length, 0);
        assert!(!s.has_future_cov);
    }

    #[test]
    fn counts_series_and_lengths() {
        let payload = json!({
            "freq": "D",
            "known_covariates_names": ["price", "promo"],
            "category_cov_name": ["promo"],
            "history_data": [
                {"timestamp": "2024-01-01", "item_id": "A", "target": 1},
                {"timestamp": "2024-01-02", "item_id": "A", "target": 2},
                {"timestamp": "2024-01-03", "item_id": "A", "target": 3},
                {"timestamp": "2024-01-01", "id": "B", "target": 5},
                {"timestamp": "2024-01-01", "target": 9}
            ],
            "future_cov": [{"timestamp": "2024-01-04", "item_id": "A", "price": 1.0}]
        });
        let s = summarize(&payload);
        assert_eq!(s.series_count, 2);
        assert_eq!(s.history_rows, 5);
        assert!(s.has_future_cov);
        assert_eq!(s.known_covariates_count, 2);
        assert_eq!(s.category_covariates_count, 1);
        assert_eq!(s.min_series_length, 1);
        assert_eq!(s.max_series_length, 3);
        assert_eq!(s.freq.as_deref(), Some("D"));
    }

    #[test]
    fn covariates_field_counts_as_future_cov() {
        let s = summarize(&json!({"history_data": [], "covariates": [{"item_id": "A"}]}));
        assert!(s.has_future_cov);
    }

    #[test]
    fn malformed_markdown_has_no_summary() {
        assert_eq!(try_summarize_markdown("```json\n{\"history_data\": ["), None);
    }

    #[test]
    fn hint_only_when_horizon_exceeds_shortest_series() {
        let s = summarize(&json!({"history_data": [
            {"item_id": "A", "target": 1}, {"item_id": "A", "target": 2}
        ]}));
        assert!(prediction_length_hint(&s, 2).is_none());
        assert!(prediction_length_hint(&s, 3).unwrap().contains("prediction_length=3"));

        let empty = summarize(&json!({}));
        assert!(prediction_length_hint(&empty, 100).is_none());
    }
}
