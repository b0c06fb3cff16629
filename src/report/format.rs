//! Formatted terminal output for forecast runs.
//!
//! We keep formatting code in one place so:
//! - the client and view code stays clean and testable
//! - output changes are localized (important for future snapshot tests)

use chrono::{DateTime, NaiveDateTime, TimeDelta};
use serde_json::{Map, Value};

use crate::data::metrics::{format_metrics_report, MetricsReport};
use crate::domain::{ForecastMode, ForecastParams, ForecastResponse, JobRecord, MODEL_RETENTION_DAYS};
use crate::io::export::{cell_text, csv_columns};

/// Header printed before a run's results.
pub fn format_run_header(file_name: &str, mode: ForecastMode, params: &ForecastParams) -> String {
    let mut out = String::new();

    out.push_str(&format!("=== tsf - Forecast ({}) ===\n", mode.display_name()));
    out.push_str(&format!("File: {file_name}\n"));
    out.push_str(&format!(
        "Horizon: {} | quantiles: {} | metrics: {}\n",
        params.prediction_length,
        fmt_vec(&params.effective_quantiles()),
        if params.metrics.is_empty() {
            "(none)".to_string()
        } else {
            params.metrics.iter().map(|m| m.as_str()).collect::<Vec<_>>().join(",")
        }
    ));
    out.push_str(&format!(
        "Freq: {} | context: {} | covariates: {}\n",
        params.freq.map(|f| f.as_str()).unwrap_or("auto"),
        params
            .context_length
            .map(|c| c.to_string())
            .unwrap_or_else(|| "default".to_string()),
        if params.with_cov { "on" } else { "off" }
    ));

    if mode == ForecastMode::Finetune {
        let ft = &params.finetune;
        match params.reuse_model_id() {
            Some(id) => out.push_str(&format!("Reusing model: {id}\n")),
            None => out.push_str(&format!(
                "Finetune: steps={} lr={} batch={} save={}\n",
                ft.num_steps, ft.learning_rate, ft.batch_size, ft.save_model
            )),
        }
    }

    out
}

/// Response metadata plus the metrics block.
pub fn format_response_summary(response: &ForecastResponse, params: &ForecastParams) -> String {
    let mut out = String::new();

    out.push_str(&format!(
        "Predictions: {} rows | horizon {} | quantiles {}\n",
        response.predictions.len(),
        response.effective_prediction_length(params),
        fmt_vec(&response.active_quantiles(params)),
    ));
    if let Some(model) = &response.model_used {
        out.push_str(&format!("Model: {model}\n"));
    }
    if let Some(at) = &response.generated_at {
        out.push_str(&format!("Generated: {at}\n"));
    }
    if let Some(shape) = &response.prediction_shape {
        let dims: Vec<String> = shape.iter().map(ToString::to_string).collect();
        out.push_str(&format!("Shape: [{}]\n", dims.join(", ")));
    }

    out.push('\n');
    out.push_str(&format_metrics_report(
        MetricsReport::from_json(response.metrics.as_ref()).as_ref(),
    ));

    out
}

/// Notice shown when a fine-tuned model was saved, with how to reuse it.
pub fn format_model_notice(response: &ForecastResponse) -> Option<String> {
    let id = response.model_id.as_deref().filter(|id| !id.is_empty())?;

    let mut out = format!("Fine-tuned model saved: {id}\n");
    if let Some(at) = &response.model_saved_at {
        out.push_str(&format!("Saved at: {at}\n"));
    }
    let left = response
        .model_retention_days_left
        .map(|d| format!("{d} days left"))
        .unwrap_or_else(|| format!("retained {MODEL_RETENTION_DAYS} days"));
    out.push_str(&format!("Retention: {left}\n"));
    out.push_str(&format!("Reuse with: tsf run <FILE> --mode finetune --model-id {id}\n"));
    Some(out)
}

/// Prediction rows as a plain table, columns ordered like the CSV export.
pub fn format_predictions_table(rows: &[Map<String, Value>], quantiles: &[f64], max_rows: usize) -> String {
    if rows.is_empty() {
        return "(no predictions)\n".to_string();
    }

    let columns = csv_columns(rows, quantiles);
    let width = |c: &str| if c == "timestamp" { 20 } else { 12 };

    let mut out = String::new();
    let header: Vec<String> = columns.iter().map(|c| format!("{:<w$}", truncate(c, width(c)), w = width(c))).collect();
    out.push_str(header.join(" ").trim_end());
    out.push('\n');

    let rule: Vec<String> = columns.iter().map(|c| "-".repeat(width(c))).collect();
    out.push_str(&rule.join(" "));
    out.push('\n');

    for row in rows.iter().take(max_rows) {
        let cells: Vec<String> = columns
            .iter()
            .map(|c| format!("{:<w$}", truncate(&fmt_cell(row.get(c)), width(c)), w = width(c)))
            .collect();
        out.push_str(cells.join(" ").trim_end());
        out.push('\n');
    }

    if rows.len() > max_rows {
        out.push_str(&format!("... {} more rows\n", rows.len() - max_rows));
    }

    out
}

/// One-line-per-field description of a backend job.
pub fn format_job(record: &JobRecord) -> String {
    let mut out = String::new();
    out.push_str(&format!("Job {}\n", record.job_id));
    out.push_str(&format!("- status  : {}\n", record.status.as_str()));
    if let Some(kind) = &record.kind {
        out.push_str(&format!("- kind    : {kind}\n"));
    }
    for (label, value) in [
        ("created ", &record.created_at),
        ("started ", &record.started_at),
        ("finished", &record.finished_at),
    ] {
        if let Some(v) = value {
            out.push_str(&format!("- {label}: {v}\n"));
        }
    }
    if let Some(elapsed) = job_elapsed(record) {
        out.push_str(&format!("- elapsed : {}s\n", elapsed.num_seconds()));
    }
    if let Some(err) = &record.error {
        let (_, message) = crate::data::client::error_fields(err);
        out.push_str(&format!("- error   : {message}\n"));
    }
    out
}

/// Run time of a job (`finished_at - started_at`), when both stamps parse.
pub fn job_elapsed(record: &JobRecord) -> Option<TimeDelta> {
    let started = parse_job_time(record.started_at.as_deref()?)?;
    let finished = parse_job_time(record.finished_at.as_deref()?)?;
    let elapsed = finished - started;
    (elapsed >= TimeDelta::zero()).then_some(elapsed)
}

/// Job stamps are local wall-clock time without an offset; RFC 3339 is accepted too.
fn parse_job_time(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").ok()
}

fn fmt_cell(value: Option<&Value>) -> String {
    match value {
        Some(Value::Number(n)) => match n.as_f64() {
            Some(v) if n.is_f64() => format!("{v:.4}"),
            _ => n.to_string(),
        },
        other => cell_text(other),
    }
}

fn fmt_vec(v: &[f64]) -> String {
    let parts: Vec<String> = v.iter().map(|x| format!("{x}")).collect();
    format!("[{}]", parts.join(", "))
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out = String::new();
    for (i, ch) in s.chars().enumerate() {
        if i + 1 >= max {
            break;
        }
        out.push(ch);
    }
    out.push('.');
    out
}
