//! Markdown payload extraction.
//!
//! Input files are Markdown documents carrying one fenced ```` ```json ````
//! block. This module finds that block and parses it, and provides a cheap
//! pre-check that only looks at the head of a file before it is read in full.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::error::{AppError, EXIT_PARSE};

/// Bytes inspected by the pre-check.
pub const PRECHECK_BYTES: usize = 8192;

/// Literal fence opener looked for by the pre-check.
const FENCE_MARKER: &str = "```json";

/// First ```` ```json ```` fence, case-insensitive, content captured lazily
/// up to the next closing fence.
static JSON_FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)```json\s*(.*?)\s*```").expect("fence pattern is valid"));

/// The payload text could not be parsed as JSON.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Embedded JSON is not valid: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<ParseError> for AppError {
    fn from(err: ParseError) -> Self {
        AppError::new(EXIT_PARSE, err.to_string())
    }
}

/// Extract and parse the JSON payload of a Markdown document.
///
/// Uses the first ```` ```json ```` fence; without one the whole text is
/// treated as JSON. The result is not type-checked beyond being valid JSON.
///
/// Numbers that overflow `f64` (e.g. `1e400`) are rejected by the JSON parser,
/// so such a payload fails as a whole rather than dropping the one row.
pub fn extract_json_from_markdown(markdown: &str) -> Result<Value, ParseError> {
    let raw = JSON_FENCE_RE
        .captures(markdown)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or(markdown)
        .trim();
    Ok(serde_json::from_str(raw)?)
}

/// Result of the fence pre-check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Precheck {
    pub ok: bool,
    pub message: String,
}

/// Heuristic fence test over an in-memory slice.
pub fn precheck_text(head: &str) -> Precheck {
    let ok = head.contains(FENCE_MARKER) || JSON_FENCE_RE.is_match(head);
    let message = if ok {
        "Detected a ```json block (pre-check passed)."
    } else {
        "No ```json block detected: fill in the input template before uploading."
    };
    Precheck {
        ok,
        message: message.to_string(),
    }
}

/// Inspect only the first `bytes` bytes of `path` for a JSON fence.
///
/// A fence starting past the window is reported as missing; that is the
/// accepted cost of not reading large files.
pub fn precheck_has_json_fence(path: &Path, bytes: usize) -> Result<Precheck, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::input(format!("Failed to open '{}': {e}", path.display())))?;
    let mut head = Vec::with_capacity(bytes.min(PRECHECK_BYTES));
    file.take(bytes as u64)
        .read_to_end(&mut head)
        .map_err(|e| AppError::input(format!("Failed to read '{}': {e}", path.display())))?;
    Ok(precheck_text(&String::from_utf8_lossy(&head)))
}

/// Read the full text of a Markdown file.
pub fn read_markdown(path: &Path) -> Result<String, AppError> {
    std::fs::read_to_string(path)
        .map_err(|e| AppError::input(format!("Failed to read '{}': {e}", path.display())))
}

/// A selected input file plus what we know about it so far.
///
/// The full text is only loaded when the pre-check passes, unless a caller
/// explicitly asks for it with [`MarkdownFile::ensure_text`].
#[derive(Debug, Clone)]
pub struct MarkdownFile {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub precheck: Precheck,
    pub text: Option<String>,
}

impl MarkdownFile {
    /// Validate, pre-check and (if the pre-check passes) read `path`.
    pub fn load(path: &Path) -> Result<Self, AppError> {
        let path = crate::cli::picker::validate_markdown_path(path)?;
        let size_bytes = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        let precheck = precheck_has_json_fence(&path, PRECHECK_BYTES)?;
        tracing::info!(path = %path.display(), size_bytes, ok = precheck.ok, "pre-checked input");

        let text = if precheck.ok { Some(read_markdown(&path)?) } else { None };
        Ok(Self {
            path,
            size_bytes,
            precheck,
            text,
        })
    }

    /// Load the full text even if the pre-check did not pass.
    pub fn ensure_text(&mut self) -> Result<&str, AppError> {
        if self.text.is_none() {
            self.text = Some(read_markdown(&self.path)?);
        }
        Ok(self.text.as_deref().unwrap_or_default())
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    pub fn size_kib(&self) -> u64 {
        self.size_bytes.div_ceil(1024)
    }
}

/// Input template printed by `tsf template`.
pub const SAMPLE_MARKDOWN: &str = r#"# Chronos Forecast Input

```json
{
  "freq": "D",
  "known_covariates_names": ["price", "promo_flag", "weekday"],
  "history_data": [
    {"timestamp": "2022-09-24", "item_id": "item_1", "target": 10.0, "price": 1.20, "promo_flag": 0, "weekday": 6},
    {"timestamp": "2022-09-25", "item_id": "item_1", "target": 11.0, "price": 1.22, "promo_flag": 0, "weekday": 0}
  ],
  "future_cov": [
    {"timestamp": "2022-10-01", "item_id": "item_1", "price": 1.36, "promo_flag": 0, "weekday": 6},
    {"timestamp": "2022-10-02", "item_id": "item_1", "price": 1.37, "promo_flag": 0, "weekday": 0}
  ]
}
```
"#;
