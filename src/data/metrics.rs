//! Typed reading of the backend `metrics` object.
//!
//! The same logical metric has shown up under more than one key path across
//! backend versions. All accepted shapes are listed once, per metric, in
//! [`metric_paths`]; the first path that resolves wins.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::Metric;

/// JSON pointer paths tried, in order, for each metric.
pub fn metric_paths(metric: Metric) -> &'static [&'static str] {
    match metric {
        Metric::Wql => &["/WQL", "/mean/WQL"],
        Metric::Wape => &["/WAPE", "/mean/WAPE"],
        Metric::Ic => &["/IC", "/mean/IC"],
        Metric::Ir => &["/IR", "/mean/IR"],
    }
}

/// A resolved metric value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum MetricValue {
    Number(f64),
    /// Non-numeric payload (string, null, object), shown verbatim.
    Other(String),
}

/// One degraded-computation note attached by the backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricWarning {
    #[serde(default)]
    pub metric: Option<String>,
    #[serde(default)]
    pub reason: Option<Value>,
    #[serde(default)]
    pub detail: Option<Value>,
    #[serde(default)]
    pub min_series_length: Option<Value>,
    #[serde(default)]
    pub required_min_length: Option<Value>,
}

impl std::fmt::Display for MetricWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(metric) = self.metric.as_deref().filter(|m| !m.is_empty()) {
            write!(f, "[{metric}]")?;
        }
        match &self.reason {
            Some(r) if !r.is_null() => write!(f, "{}", value_text(r))?,
            _ => write!(f, "unknown")?,
        }
        if let Some(d) = self.detail.as_ref().filter(|v| !v.is_null()) {
            write!(f, " detail={}", value_text(d))?;
        }
        if let Some(v) = &self.min_series_length {
            write!(f, " min_series_length={}", value_text(v))?;
        }
        if let Some(v) = &self.required_min_length {
            write!(f, " required_min_length={}", value_text(v))?;
        }
        Ok(())
    }
}

/// Reconciled metrics of one forecast result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum MetricsReport {
    /// The backend did not compute metrics.
    Skipped { reason: String },
    /// Values in `Metric::ALL` order; `None` when no path resolved.
    Values {
        values: Vec<(Metric, Option<MetricValue>)>,
        warnings: Vec<MetricWarning>,
    },
}

impl MetricsReport {
    /// Reconcile a raw `metrics` object. `None` when the response had none.
    pub fn from_json(metrics: Option<&Value>) -> Option<Self> {
        let metrics = metrics.filter(|m| !m.is_null())?;

        if metrics.get("skipped").and_then(Value::as_bool) == Some(true) {
            let reason = metrics
                .get("reason")
                .filter(|r| !r.is_null())
                .map(value_text)
                .unwrap_or_else(|| "unknown".to_string());
            return Some(MetricsReport::Skipped { reason });
        }

        let values = Metric::ALL
            .into_iter()
            .map(|m| (m, lookup(metrics, m)))
            .collect();

        let warnings = metrics
            .get("warnings")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .map(|w| serde_json::from_value(w.clone()).unwrap_or_default())
                    .collect()
            })
            .unwrap_or_default();

        Some(MetricsReport::Values { values, warnings })
    }

    pub fn value(&self, metric: Metric) -> Option<&MetricValue> {
        match self {
            MetricsReport::Skipped { .. } => None,
            MetricsReport::Values { values, .. } => values
                .iter()
                .find(|(m, _)| *m == metric)
                .and_then(|(_, v)| v.as_ref()),
        }
    }
}

/// Resolve one metric. Loss metrics are reported as magnitudes.
pub fn lookup(metrics: &Value, metric: Metric) -> Option<MetricValue> {
    let raw = metric_paths(metric)
        .iter()
        .find_map(|path| metrics.pointer(path).filter(|v| !v.is_null()))?;

    Some(match raw.as_f64() {
        Some(v) if metric.is_loss() => MetricValue::Number(v.abs()),
        Some(v) => MetricValue::Number(v),
        None => MetricValue::Other(value_text(raw)),
    })
}

/// Render a metric value the way the result panel shows it.
pub fn format_metric(metric: Metric, value: Option<&MetricValue>) -> String {
    match value {
        Some(MetricValue::Number(v)) => format!("{v:.6} ({})", metric.description()),
        Some(MetricValue::Other(s)) => s.clone(),
        None => "-".to_string(),
    }
}

/// Multi-line text block for a metrics report.
pub fn format_metrics_report(report: Option<&MetricsReport>) -> String {
    let mut out = String::new();
    match report {
        None => out.push_str("Metrics: (none)\n"),
        Some(MetricsReport::Skipped { reason }) => {
            out.push_str(&format!("Metrics: skipped ({reason})\n"));
        }
        Some(MetricsReport::Values { values, warnings }) => {
            out.push_str("Metrics:\n");
            for (metric, value) in values {
                out.push_str(&format!(
                    "  {:<5} {}\n",
                    metric.as_str(),
                    format_metric(*metric, value.as_ref())
                ));
            }
            if !warnings.is_empty() {
                let joined: Vec<String> = warnings.iter().map(ToString::to_string).collect();
                out.push_str(&format!("  Warnings: {}\n", joined.join("; ")));
            }
        }
    }
    out
}

fn value_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
