//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - built from CLI flags or TUI settings
//! - sent to the forecasting backend as query parameters
//! - decoded from backend responses and saved/reloaded as JSON

use std::collections::BTreeMap;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Quantiles requested when the user supplies none.
pub const DEFAULT_QUANTILES: [f64; 3] = [0.1, 0.5, 0.9];

/// Default history window relative to the forecast horizon.
pub const DEFAULT_HISTORY_MULTIPLIER: f64 = 4.0;

/// Days a saved fine-tuned model stays available on the backend.
pub const MODEL_RETENTION_DAYS: i64 = 14;

/// Which backend endpoint to call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ForecastMode {
    /// Pretrained model, no additional training.
    Zeroshot,
    /// Train on the uploaded series first, then forecast.
    Finetune,
}

impl ForecastMode {
    pub fn path(self) -> &'static str {
        match self {
            ForecastMode::Zeroshot => "/zeroshot/",
            ForecastMode::Finetune => "/finetune/",
        }
    }

    pub fn async_path(self) -> &'static str {
        match self {
            ForecastMode::Zeroshot => "/zeroshot/async",
            ForecastMode::Finetune => "/finetune/async",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            ForecastMode::Zeroshot => "Zero-shot",
            ForecastMode::Finetune => "Finetune",
        }
    }

    pub fn toggle(self) -> Self {
        match self {
            ForecastMode::Zeroshot => ForecastMode::Finetune,
            ForecastMode::Finetune => ForecastMode::Zeroshot,
        }
    }
}

/// Frequency codes accepted by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
pub enum Freq {
    #[value(name = "D")]
    D,
    #[value(name = "H")]
    H,
    #[value(name = "W")]
    W,
    #[value(name = "M")]
    M,
}

impl Freq {
    pub const ALL: [Freq; 4] = [Freq::D, Freq::H, Freq::W, Freq::M];

    pub fn as_str(self) -> &'static str {
        match self {
            Freq::D => "D",
            Freq::H => "H",
            Freq::W => "W",
            Freq::M => "M",
        }
    }
}

/// Accuracy metrics the backend can compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "UPPERCASE")]
pub enum Metric {
    #[value(name = "WQL")]
    Wql,
    #[value(name = "WAPE")]
    Wape,
    #[value(name = "IC")]
    Ic,
    #[value(name = "IR")]
    Ir,
}

impl Metric {
    pub const ALL: [Metric; 4] = [Metric::Wql, Metric::Wape, Metric::Ic, Metric::Ir];

    pub fn as_str(self) -> &'static str {
        match self {
            Metric::Wql => "WQL",
            Metric::Wape => "WAPE",
            Metric::Ic => "IC",
            Metric::Ir => "IR",
        }
    }

    /// Short explanation shown next to the value.
    pub fn description(self) -> &'static str {
        match self {
            Metric::Wql => "weighted quantile loss, lower is better",
            Metric::Wape => "weighted absolute percentage error, lower is better",
            Metric::Ic => "information coefficient, higher is better",
            Metric::Ir => "information ratio, higher is better",
        }
    }

    /// Loss metrics are reported as magnitudes.
    pub fn is_loss(self) -> bool {
        matches!(self, Metric::Wql | Metric::Wape)
    }

    /// Parse a user-supplied name (trimmed, case-insensitive).
    pub fn parse_name(raw: &str) -> Option<Metric> {
        let name = raw.trim().to_ascii_uppercase();
        Metric::ALL.into_iter().find(|m| m.as_str() == name)
    }
}

/// Fine-tune specific request parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinetuneParams {
    pub num_steps: u32,
    pub learning_rate: f64,
    pub batch_size: u32,
    pub save_model: bool,
    /// Reuse a previously saved model instead of retraining.
    pub model_id: Option<String>,
}

impl Default for FinetuneParams {
    fn default() -> Self {
        Self {
            num_steps: 1000,
            learning_rate: 1e-4,
            batch_size: 32,
            save_model: true,
            model_id: None,
        }
    }
}

/// A full forecast request as understood by the client.
///
/// This is derived from CLI flags or TUI settings (plus defaults).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastParams {
    pub prediction_length: u32,
    pub quantiles: Vec<f64>,
    pub metrics: Vec<Metric>,
    pub with_cov: bool,
    pub freq: Option<Freq>,
    pub context_length: Option<u32>,
    pub finetune: FinetuneParams,
}

impl Default for ForecastParams {
    fn default() -> Self {
        Self {
            prediction_length: 28,
            quantiles: DEFAULT_QUANTILES.to_vec(),
            metrics: vec![Metric::Wql, Metric::Wape],
            with_cov: false,
            freq: None,
            context_length: Some(512),
            finetune: FinetuneParams::default(),
        }
    }
}

impl ForecastParams {
    /// Quantiles actually sent to the backend.
    ///
    /// Non-finite values and values outside `(0, 1)` are dropped; an empty
    /// selection falls back to `DEFAULT_QUANTILES`.
    pub fn effective_quantiles(&self) -> Vec<f64> {
        let q = normalize_quantiles(&self.quantiles);
        if q.is_empty() { DEFAULT_QUANTILES.to_vec() } else { q }
    }

    /// Model id to reuse, if a non-blank one was supplied.
    pub fn reuse_model_id(&self) -> Option<&str> {
        self.finetune
            .model_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// Keep only finite quantile levels strictly inside `(0, 1)`.
pub fn normalize_quantiles(raw: &[f64]) -> Vec<f64> {
    raw.iter()
        .copied()
        .filter(|q| q.is_finite() && *q > 0.0 && *q < 1.0)
        .collect()
}

/// Label used for a quantile column (`0.1` -> `"0.1"`).
///
/// Matches how the backend names its quantile columns.
pub fn quantile_label(q: f64) -> String {
    format!("{q}")
}

/// Successful forecast response body.
///
/// Zero-shot and fine-tune responses share this shape; fine-tune adds the
/// `model_*` fields when a model was saved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForecastResponse {
    #[serde(default)]
    pub predictions: Vec<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantiles: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prediction_length: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prediction_shape: Option<Vec<usize>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_used: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_saved_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_retention_days_left: Option<i64>,
}

impl ForecastResponse {
    /// Quantiles to display: the response's own list, else the requested one.
    pub fn active_quantiles(&self, params: &ForecastParams) -> Vec<f64> {
        match &self.quantiles {
            Some(q) if !q.is_empty() => q.clone(),
            _ => params.effective_quantiles(),
        }
    }

    /// Horizon to window history against: response value, else requested.
    pub fn effective_prediction_length(&self, params: &ForecastParams) -> u32 {
        self.prediction_length.unwrap_or(params.prediction_length)
    }
}

/// Lifecycle state of an asynchronous backend job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    #[serde(other)]
    Unknown,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::Unknown => "unknown",
        }
    }
}

/// Job record returned by `/<mode>/async` and `/jobs/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: String,
    #[serde(default)]
    pub kind: Option<String>,
    pub status: JobStatus,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub finished_at: Option<String>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
    #[serde(default)]
    pub params: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_url: Option<String>,
}

/// One observed history point after cleaning.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryPoint {
    pub timestamp: String,
    pub target: f64,
}

/// One numeric-quantile column of a prediction row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuantileValue {
    /// Column key exactly as the backend sent it (e.g. `"0.1"`).
    pub label: String,
    /// Parsed quantile level in `(0, 1)`.
    pub level: f64,
    /// `None` when the cell is null or not numeric.
    pub value: Option<f64>,
}

/// A backend prediction row with its keys classified.
///
/// Fixed keys (`item_id`, `timestamp`, `mean`) are lifted into fields,
/// numeric-quantile keys into `quantiles` (sorted by level), and everything
/// else is kept verbatim in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionRow {
    pub item_id: Option<String>,
    pub timestamp: Option<String>,
    pub mean: Option<f64>,
    pub quantiles: Vec<QuantileValue>,
    pub extra: Map<String, Value>,
}

impl PredictionRow {
    pub fn quantile(&self, label: &str) -> Option<&QuantileValue> {
        self.quantiles.iter().find(|q| q.label == label)
    }

    pub fn has_quantile(&self, label: &str) -> bool {
        self.quantile(label).is_some()
    }

    /// Numeric value of a quantile column, if present and numeric.
    pub fn quantile_value(&self, label: &str) -> Option<f64> {
        self.quantile(label).and_then(|q| q.value)
    }

    pub fn timestamp_key(&self) -> &str {
        self.timestamp.as_deref().unwrap_or("")
    }
}

/// Confidence band bounds, as quantile column labels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Band {
    pub low_key: String,
    pub high_key: String,
}

impl Band {
    pub fn label(&self) -> String {
        format!("{}-{}", self.low_key, self.high_key)
    }
}

/// Visualization-ready data for one series.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SeriesData {
    pub history: Vec<HistoryPoint>,
    pub predictions: Vec<PredictionRow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub band: Option<Band>,
}

/// Per-series visualization model for one forecast result.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SeriesView {
    /// Sorted union of series ids from history and predictions.
    pub item_ids: Vec<String>,
    pub by_item_id: BTreeMap<String, SeriesData>,
    /// Active quantile levels, used to order table columns.
    pub quantiles: Vec<f64>,
}

impl SeriesView {
    pub fn series(&self, item_id: &str) -> Option<&SeriesData> {
        self.by_item_id.get(item_id)
    }

    pub fn is_empty(&self) -> bool {
        self.item_ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_quantiles_drop_out_of_range_and_fall_back() {
        let mut params = ForecastParams::default();
        params.quantiles = vec![0.0, 0.25, 1.0, f64::NAN, 0.75, -0.1];
        assert_eq!(params.effective_quantiles(), vec![0.25, 0.75]);

        params.quantiles = vec![1.5];
        assert_eq!(params.effective_quantiles(), DEFAULT_QUANTILES.to_vec());
    }

    #[test]
    fn quantile_label_matches_backend_columns() {
        assert_eq!(quantile_label(0.1), "0.1");
        assert_eq!(quantile_label(0.5), "0.5");
        assert_eq!(quantile_label(0.05), "0.05");
    }

    #[test]
    fn metric_names_parse_case_insensitively() {
        assert_eq!(Metric::parse_name(" wql "), Some(Metric::Wql));
        assert_eq!(Metric::parse_name("Ir"), Some(Metric::Ir));
        assert_eq!(Metric::parse_name("MAPE"), None);
    }

    #[test]
    fn blank_model_id_is_not_reused() {
        let mut params = ForecastParams::default();
        params.finetune.model_id = Some("   ".to_string());
        assert_eq!(params.reuse_model_id(), None);
        params.finetune.model_id = Some(" ft-123 ".to_string());
        assert_eq!(params.reuse_model_id(), Some("ft-123"));
    }

    #[test]
    fn job_status_tolerates_unknown_values() {
        let record: JobRecord = serde_json::from_str(
            r#"{"job_id":"j1","kind":"zeroshot","status":"paused","params":{}}"#,
        )
        .unwrap();
        assert_eq!(record.status, JobStatus::Unknown);
        assert!(!record.status.is_terminal());
    }

    #[test]
    fn response_falls_back_to_requested_settings() {
        let params = ForecastParams::default();
        let resp = ForecastResponse::default();
        assert_eq!(resp.active_quantiles(&params), DEFAULT_QUANTILES.to_vec());
        assert_eq!(resp.effective_prediction_length(&params), 28);

        let resp = ForecastResponse {
            quantiles: Some(vec![0.2, 0.8]),
            prediction_length: Some(7),
            ..ForecastResponse::default()
        };
        assert_eq!(resp.active_quantiles(&params), vec![0.2, 0.8]);
        assert_eq!(resp.effective_prediction_length(&params), 7);
    }
}
