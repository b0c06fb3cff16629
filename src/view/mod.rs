//! Series view builder.
//!
//! Joins the history embedded in the Markdown payload with the prediction
//! rows returned by the backend and produces one visualization-ready entry
//! per series:
//!
//! 1. re-extract the payload (a parse failure makes the view unavailable)
//! 2. group history by series id, drop unusable rows, sort by timestamp
//! 3. keep only the trailing `max(1, floor(prediction_length * multiplier))` points
//! 4. group classified prediction rows by series id, sort by timestamp
//! 5. pick a confidence band from the quantile columns of the first row
//! 6. list the union of series ids in lexicographic order

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value};

use crate::domain::payload::{row_target, row_timestamp, series_id};
use crate::domain::{
    Band, DEFAULT_HISTORY_MULTIPLIER, HistoryPoint, Payload, PredictionRow, SeriesData, SeriesView,
};
use crate::io::markdown::{ParseError, extract_json_from_markdown};

pub mod rows;

pub use rows::{classify_row, quantile_level};

/// Preferred band bounds when both columns are present.
const PREFERRED_BAND: (&str, &str) = ("0.1", "0.9");

/// Main forecast line column.
const P50_KEY: &str = "0.5";

/// Inputs of [`build_series_view`].
#[derive(Debug, Clone)]
pub struct ViewRequest<'a> {
    pub markdown_text: &'a str,
    pub predictions: &'a [Map<String, Value>],
    pub quantiles: &'a [f64],
    pub prediction_length: u32,
    pub history_multiplier: f64,
}

impl<'a> ViewRequest<'a> {
    pub fn new(
        markdown_text: &'a str,
        predictions: &'a [Map<String, Value>],
        quantiles: &'a [f64],
        prediction_length: u32,
    ) -> Self {
        Self {
            markdown_text,
            predictions,
            quantiles,
            prediction_length,
            history_multiplier: DEFAULT_HISTORY_MULTIPLIER,
        }
    }

    pub fn with_history_multiplier(mut self, multiplier: f64) -> Self {
        self.history_multiplier = multiplier;
        self
    }
}

/// Build the per-series view for one forecast result.
pub fn build_series_view(req: &ViewRequest<'_>) -> Result<SeriesView, ParseError> {
    let payload = extract_json_from_markdown(req.markdown_text)?;
    let history = group_history(Payload::new(&payload).history_data());

    let window = window_size(req.prediction_length, req.history_multiplier);
    let history: BTreeMap<String, Vec<HistoryPoint>> = history
        .into_iter()
        .map(|(id, points)| (id, window_history(points, window)))
        .collect();

    let predictions = group_predictions(req.predictions);

    let item_ids: Vec<String> = history
        .keys()
        .chain(predictions.keys())
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let mut history = history;
    let mut predictions = predictions;
    let mut by_item_id = BTreeMap::new();
    for id in &item_ids {
        let preds = predictions.remove(id).unwrap_or_default();
        let band = preds.first().and_then(select_band);
        by_item_id.insert(
            id.clone(),
            SeriesData {
                history: history.remove(id).unwrap_or_default(),
                predictions: preds,
                band,
            },
        );
    }

    tracing::debug!(series = item_ids.len(), window, "built series view");
    Ok(SeriesView {
        item_ids,
        by_item_id,
        quantiles: req.quantiles.to_vec(),
    })
}

/// Number of history points kept per series.
pub fn window_size(prediction_length: u32, multiplier: f64) -> usize {
    let raw = (f64::from(prediction_length) * multiplier).floor();
    if raw.is_finite() && raw >= 1.0 { raw as usize } else { 1 }
}

/// Group history rows by series id and sort each series by timestamp.
///
/// Rows without an id or without a finite target are dropped.
pub fn group_history(rows: &[Value]) -> BTreeMap<String, Vec<HistoryPoint>> {
    let mut out: BTreeMap<String, Vec<HistoryPoint>> = BTreeMap::new();
    for row in rows {
        let Some(id) = series_id(row) else { continue };
        let Some(target) = row_target(row) else { continue };
        out.entry(id).or_default().push(HistoryPoint {
            timestamp: row_timestamp(row),
            target,
        });
    }
    for points in out.values_mut() {
        points.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
    }
    out
}

/// Keep the most recent `window` points of a sorted series.
pub fn window_history(mut points: Vec<HistoryPoint>, window: usize) -> Vec<HistoryPoint> {
    if points.len() > window {
        points.drain(..points.len() - window);
    }
    points
}

/// Classify prediction rows and group them by series id, sorted by timestamp.
pub fn group_predictions(rows: &[Map<String, Value>]) -> BTreeMap<String, Vec<PredictionRow>> {
    let mut out: BTreeMap<String, Vec<PredictionRow>> = BTreeMap::new();
    for raw in rows {
        let row = classify_row(raw);
        let Some(id) = row.item_id.clone() else { continue };
        out.entry(id).or_default().push(row);
    }
    for rows in out.values_mut() {
        rows.sort_by(|a, b| a.timestamp_key().cmp(b.timestamp_key()));
    }
    out
}

/// Choose the shaded band for a series from its first prediction row.
///
/// `0.1`/`0.9` wins when both exist; otherwise the lowest and highest quantile
/// columns are used if at least two distinct levels are present.
pub fn select_band(first: &PredictionRow) -> Option<Band> {
    let (low, high) = PREFERRED_BAND;
    if first.has_quantile(low) && first.has_quantile(high) {
        return Some(Band {
            low_key: low.to_string(),
            high_key: high.to_string(),
        });
    }

    // `quantiles` is sorted by level.
    let lowest = first.quantiles.first()?;
    let highest = first.quantiles.last()?;
    if lowest.level >= highest.level {
        return None;
    }
    Some(Band {
        low_key: lowest.label.clone(),
        high_key: highest.label.clone(),
    })
}

impl SeriesData {
    /// Main forecast line: the median column, else `mean`, else a gap.
    pub fn p50_line(&self) -> Vec<(String, Option<f64>)> {
        self.predictions
            .iter()
            .map(|p| {
                let y = p.quantile_value(P50_KEY).or(p.mean);
                (p.timestamp_key().to_string(), y)
            })
            .collect()
    }

    /// `(timestamp, low, high)` for rows where both band bounds are numeric.
    pub fn band_points(&self) -> Vec<(String, f64, f64)> {
        let Some(band) = &self.band else {
            return Vec::new();
        };
        self.predictions
            .iter()
            .filter_map(|p| {
                let lo = p.quantile_value(&band.low_key)?;
                let hi = p.quantile_value(&band.high_key)?;
                Some((p.timestamp_key().to_string(), lo, hi))
            })
            .collect()
    }

    /// Sorted, de-duplicated timestamps across history and predictions.
    pub fn timeline(&self) -> Vec<String> {
        self.history
            .iter()
            .map(|h| h.timestamp.clone())
            .chain(self.predictions.iter().map(|p| p.timestamp_key().to_string()))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn markdown(payload: Value) -> String {
        format!("# input\n\n```json\n{}\n```\n", serde_json::to_string_pretty(&payload).unwrap())
    }

    fn rows(v: Value) -> Vec<Map<String, Value>> {
        v.as_array()
            .unwrap()
            .iter()
            .map(|r| r.as_object().unwrap().clone())
            .collect()
    }

    fn history_rows(id: &str, n: usize) -> Vec<Value> {
        (0..n)
            .map(|i| json!({"timestamp": format!("2024-01-{:02}", i + 1), "item_id": id, "target": i as f64}))
            .collect()
    }

    #[test]
    fn two_series_fit_inside_the_window() {
        let mut history = history_rows("B", 3);
        history.extend(history_rows("A", 5));
        let md = markdown(json!({"history_data": history}));
        let preds = rows(json!([
            {"item_id": "B", "timestamp": "2024-01-04", "mean": 1.0},
            {"item_id": "A", "timestamp": "2024-01-06", "mean": 1.0}
        ]));

        let view = build_series_view(&ViewRequest::new(&md, &preds, &[0.1, 0.5, 0.9], 2)).unwrap();
        assert_eq!(view.item_ids, vec!["A", "B"]);
        assert_eq!(view.series("A").unwrap().history.len(), 5);
        assert_eq!(view.series("B").unwrap().history.len(), 3);
    }

    #[test]
    fn window_keeps_most_recent_points() {
        let mut history = history_rows("A", 10);
        history.reverse();
        let md = markdown(json!({"history_data": history}));

        let view = build_series_view(&ViewRequest::new(&md, &[], &[], 1).with_history_multiplier(3.0)).unwrap();
        let kept: Vec<_> = view.series("A").unwrap().history.iter().map(|h| h.timestamp.as_str()).collect();
        assert_eq!(kept, vec!["2024-01-08", "2024-01-09", "2024-01-10"]);
    }

    #[test]
    fn window_size_never_drops_below_one() {
        assert_eq!(window_size(2, 4.0), 8);
        assert_eq!(window_size(3, 1.5), 4);
        assert_eq!(window_size(1, 0.1), 1);
        assert_eq!(window_size(0, 4.0), 1);
        assert_eq!(window_size(5, f64::NAN), 1);
    }

    #[test]
    fn window_bound_holds_for_many_lengths() {
        for n in 0..20 {
            for p in 1..6u32 {
                for m in [0.5, 1.0, 2.5, 4.0] {
                    let points = group_history(&history_rows("A", n)).remove("A").unwrap_or_default();
                    let w = window_size(p, m);
                    let kept = window_history(points.clone(), w);
                    assert!(kept.len() <= w);
                    assert_eq!(kept.len(), n.min(w));
                    assert_eq!(kept.as_slice(), &points[points.len() - kept.len()..]);
                }
            }
        }
    }

    #[test]
    fn unusable_history_rows_are_dropped() {
        let grouped = group_history(&[
            json!({"timestamp": "2024-01-02", "item_id": "A", "target": 2.0}),
            json!({"timestamp": "2024-01-01", "item_id": "A", "target": "bad"}),
            json!({"timestamp": "2024-01-01", "target": 1.0}),
            json!({"timestamp": "2024-01-01", "id": "A", "target": 1.0}),
        ]);
        let a = &grouped["A"];
        assert_eq!(a.len(), 2);
        assert_eq!(a[0].timestamp, "2024-01-01");
        assert_eq!(grouped.len(), 1);
    }

    #[test]
    fn band_prefers_p10_p90() {
        let preds = rows(json!([{"item_id": "A", "timestamp": "t", "0.1": 1, "0.5": 2, "0.9": 3}]));
        let band = select_band(&classify_row(&preds[0])).unwrap();
        assert_eq!((band.low_key.as_str(), band.high_key.as_str()), ("0.1", "0.9"));
    }

    #[test]
    fn band_falls_back_to_outer_quantiles() {
        let preds = rows(json!([{"item_id": "A", "timestamp": "t", "0.8": 3, "0.2": 1}]));
        let band = select_band(&classify_row(&preds[0])).unwrap();
        assert_eq!((band.low_key.as_str(), band.high_key.as_str()), ("0.2", "0.8"));

        let preds = rows(json!([{"item_id": "A", "timestamp": "t", "0.05": 1, "0.5": 2, "0.95": 3}]));
        let band = select_band(&classify_row(&preds[0])).unwrap();
        assert_eq!(band.label(), "0.05-0.95");
    }

    #[test]
    fn no_band_without_two_quantiles() {
        let preds = rows(json!([{"item_id": "A", "timestamp": "t", "mean": 1}]));
        assert!(select_band(&classify_row(&preds[0])).is_none());

        let preds = rows(json!([{"item_id": "A", "timestamp": "t", "0.5": 1}]));
        assert!(select_band(&classify_row(&preds[0])).is_none());
    }

    #[test]
    fn series_only_in_predictions_still_listed() {
        let md = markdown(json!({"history_data": history_rows("A", 2)}));
        let preds = rows(json!([
            {"item_id": "C", "timestamp": "2024-01-05", "0.5": 4.0, "mean": 3.0},
            {"item_id": "C", "timestamp": "2024-01-04", "0.5": null, "mean": 2.0},
            {"timestamp": "2024-01-04", "mean": 2.0}
        ]));
        let view = build_series_view(&ViewRequest::new(&md, &preds, &[], 2)).unwrap();

        assert_eq!(view.item_ids, vec!["A", "C"]);
        let a = view.series("A").unwrap();
        assert!(a.predictions.is_empty());
        assert!(a.band.is_none());

        let c = view.series("C").unwrap();
        assert!(c.history.is_empty());
        assert_eq!(
            c.p50_line(),
            vec![("2024-01-04".to_string(), Some(2.0)), ("2024-01-05".to_string(), Some(4.0))]
        );
    }

    #[test]
    fn band_points_skip_missing_bounds() {
        let md = markdown(json!({"history_data": []}));
        let preds = rows(json!([
            {"item_id": "A", "timestamp": "1", "0.1": 1.0, "0.9": 3.0},
            {"item_id": "A", "timestamp": "2", "0.1": null, "0.9": 4.0}
        ]));
        let view = build_series_view(&ViewRequest::new(&md, &preds, &[], 2)).unwrap();
        assert_eq!(view.series("A").unwrap().band_points(), vec![("1".to_string(), 1.0, 3.0)]);
    }

    #[test]
    fn payload_without_series_gives_empty_view() {
        let md = markdown(json!({"history_data": [{"timestamp": "2024-01-01", "target": 1.0}]}));
        let view = build_series_view(&ViewRequest::new(&md, &[], &[0.5], 2)).unwrap();
        assert!(view.is_empty());
        assert!(!view.item_ids.iter().any(|id| id.is_empty()));

        let two = markdown(json!({"history_data": history_rows("A", 2)}));
        assert!(!build_series_view(&ViewRequest::new(&two, &[], &[0.5], 2)).unwrap().is_empty());
    }

    #[test]
    fn malformed_markdown_makes_view_unavailable() {
        let result = build_series_view(&ViewRequest::new("```json\n{\"history_data\": [", &[], &[], 2));
        assert!(result.is_err());
    }
}
