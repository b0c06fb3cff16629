//! Export prediction rows to CSV or JSON, and save/reload raw responses.
//!
//! The exports are meant to be easy to consume in spreadsheets or downstream scripts.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::domain::{quantile_label, ForecastResponse};
use crate::error::AppError;

const LEADING_COLUMNS: [&str; 3] = ["item_id", "timestamp", "mean"];

/// CSV header for a set of prediction rows.
///
/// `item_id`, `timestamp`, `mean` first, then the active quantile columns
/// that actually occur (in active-list order), then every other key in the
/// order it was first seen.
pub fn csv_columns(rows: &[Map<String, Value>], active_quantiles: &[f64]) -> Vec<String> {
    let mut seen: Vec<&str> = Vec::new();
    for row in rows {
        for key in row.keys() {
            if !seen.contains(&key.as_str()) {
                seen.push(key);
            }
        }
    }

    let mut columns: Vec<String> = Vec::with_capacity(seen.len());
    let take = |key: &str, columns: &mut Vec<String>| {
        if seen.contains(&key) && !columns.iter().any(|c| c == key) {
            columns.push(key.to_string());
        }
    };

    for key in LEADING_COLUMNS {
        take(key, &mut columns);
    }
    for q in active_quantiles {
        take(&quantile_label(*q), &mut columns);
    }
    for key in &seen {
        take(key, &mut columns);
    }
    columns
}

/// Text of one CSV cell. Null and missing are empty; nested values are compact JSON.
pub fn cell_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Where an empty CSV export lands instead: the same path with `.json`.
pub fn json_fallback_path(path: &Path) -> PathBuf {
    let is_csv = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
    if is_csv {
        path.with_extension("json")
    } else {
        let mut raw = path.as_os_str().to_owned();
        raw.push(".json");
        PathBuf::from(raw)
    }
}

/// Write prediction rows as CSV and return the path actually written.
///
/// With no rows there is nothing to put in a header, so a JSON `[]` is
/// written to [`json_fallback_path`] instead.
pub fn write_predictions_csv(
    path: &Path,
    rows: &[Map<String, Value>],
    active_quantiles: &[f64],
) -> Result<PathBuf, AppError> {
    if rows.is_empty() {
        let fallback = json_fallback_path(path);
        write_predictions_json(&fallback, rows)?;
        return Ok(fallback);
    }

    let columns = csv_columns(rows, active_quantiles);
    let mut wtr = csv::Writer::from_path(path)
        .map_err(|e| AppError::input(format!("Failed to create export CSV '{}': {e}", path.display())))?;

    wtr.write_record(&columns)
        .map_err(|e| AppError::input(format!("Failed to write export CSV header: {e}")))?;

    for row in rows {
        let record: Vec<String> = columns.iter().map(|c| cell_text(row.get(c))).collect();
        wtr.write_record(&record)
            .map_err(|e| AppError::input(format!("Failed to write export CSV row: {e}")))?;
    }

    wtr.flush()
        .map_err(|e| AppError::input(format!("Failed to flush export CSV: {e}")))?;

    tracing::info!(path = %path.display(), rows = rows.len(), "exported predictions csv");
    Ok(path.to_path_buf())
}

/// Write prediction rows as a pretty-printed JSON array.
pub fn write_predictions_json(path: &Path, rows: &[Map<String, Value>]) -> Result<PathBuf, AppError> {
    write_pretty(path, &rows)?;
    tracing::info!(path = %path.display(), rows = rows.len(), "exported predictions json");
    Ok(path.to_path_buf())
}

/// Save the full backend response so it can be re-rendered with `tsf view`.
pub fn write_response_json(path: &Path, response: &ForecastResponse) -> Result<(), AppError> {
    write_pretty(path, response)
}

pub fn read_response_json(path: &Path) -> Result<ForecastResponse, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::input(format!("Failed to open response JSON '{}': {e}", path.display())))?;
    serde_json::from_reader(file)
        .map_err(|e| AppError::input(format!("Invalid response JSON '{}': {e}", path.display())))
}

fn write_pretty<T: serde::Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::input(format!("Failed to create '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(BufWriter::new(file), value)
        .map_err(|e| AppError::input(format!("Failed to write '{}': {e}", path.display())))
}
