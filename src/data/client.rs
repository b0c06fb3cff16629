//! HTTP client for the forecasting backend.

use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use reqwest::blocking::{multipart, Client, RequestBuilder, Response};
use serde_json::Value;
use thiserror::Error;

use crate::domain::{ForecastMode, ForecastParams, ForecastResponse, JobRecord, JobStatus};
use crate::error::{AppError, EXIT_BACKEND, EXIT_INPUT};

pub const DEFAULT_BASE_URL: &str = "http://localhost:5001";
const DEFAULT_ZEROSHOT_TIMEOUT_SECS: u64 = 10 * 60;
const DEFAULT_FINETUNE_TIMEOUT_SECS: u64 = 30 * 60;
const JOB_POLL_INTERVAL: Duration = Duration::from_secs(2);
const FALLBACK_MESSAGE: &str = "Request failed";

/// Failures while talking to the backend.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("could not attach {path}: {source}")]
    File {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{}", format_api_error(.code.as_deref(), .message))]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },
    #[error("could not decode backend response: {0}")]
    Decode(String),
    #[error("request timed out after {}s", .0.as_secs())]
    Timeout(Duration),
    #[error("job {job_id} failed: {message}")]
    JobFailed { job_id: String, message: String },
}

impl From<ClientError> for AppError {
    fn from(err: ClientError) -> Self {
        let code = match err {
            ClientError::File { .. } => EXIT_INPUT,
            _ => EXIT_BACKEND,
        };
        AppError::new(code, err.to_string())
    }
}

/// Connection settings, read from `.env` and the process environment.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub base_url: String,
    pub zeroshot_timeout: Duration,
    pub finetune_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            zeroshot_timeout: Duration::from_secs(DEFAULT_ZEROSHOT_TIMEOUT_SECS),
            finetune_timeout: Duration::from_secs(DEFAULT_FINETUNE_TIMEOUT_SECS),
            poll_interval: JOB_POLL_INTERVAL,
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let secs = |key: &str, default: u64| -> Result<Duration, AppError> {
            match get(key) {
                None => Ok(Duration::from_secs(default)),
                Some(raw) => raw
                    .parse::<u64>()
                    .ok()
                    .filter(|s| *s > 0)
                    .map(Duration::from_secs)
                    .ok_or_else(|| {
                        AppError::input(format!("{key} must be a positive number of seconds, got '{raw}'."))
                    }),
            }
        };

        let base_url = get("FORECAST_API_BASE_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        Ok(Self {
            base_url,
            zeroshot_timeout: secs("FORECAST_ZEROSHOT_TIMEOUT_SECS", DEFAULT_ZEROSHOT_TIMEOUT_SECS)?,
            finetune_timeout: secs("FORECAST_FINETUNE_TIMEOUT_SECS", DEFAULT_FINETUNE_TIMEOUT_SECS)?,
            poll_interval: JOB_POLL_INTERVAL,
        })
    }

    pub fn timeout_for(&self, mode: ForecastMode) -> Duration {
        match mode {
            ForecastMode::Zeroshot => self.zeroshot_timeout,
            ForecastMode::Finetune => self.finetune_timeout,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

pub struct ForecastClient {
    client: Client,
    config: ClientConfig,
}

impl ForecastClient {
    pub fn new(config: ClientConfig) -> Result<Self, AppError> {
        // Per-request timeouts are applied in `send`.
        let client = Client::builder()
            .timeout(None)
            .build()
            .map_err(|e| AppError::new(EXIT_BACKEND, format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    pub fn from_env() -> Result<Self, AppError> {
        Self::new(ClientConfig::from_env()?)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Upload the Markdown file and wait for the forecast.
    pub fn submit(
        &self,
        mode: ForecastMode,
        file: &Path,
        params: &ForecastParams,
    ) -> Result<ForecastResponse, ClientError> {
        let url = self.config.url(mode.path());
        tracing::info!(mode = mode.display_name(), %url, "submitting forecast");

        let req = self.upload(&url, file, mode, params)?;
        let resp = self.send(req, self.config.timeout_for(mode))?;
        let body: ForecastResponse = resp.json().map_err(|e| ClientError::Decode(e.to_string()))?;

        tracing::info!(rows = body.predictions.len(), "forecast received");
        Ok(body)
    }

    /// Queue the forecast as a backend job and return its initial record.
    pub fn submit_async(
        &self,
        mode: ForecastMode,
        file: &Path,
        params: &ForecastParams,
    ) -> Result<JobRecord, ClientError> {
        let url = self.config.url(mode.async_path());
        tracing::info!(mode = mode.display_name(), %url, "submitting forecast job");

        let req = self.upload(&url, file, mode, params)?;
        let resp = self.send(req, self.config.timeout_for(mode))?;
        let record: JobRecord = resp.json().map_err(|e| ClientError::Decode(e.to_string()))?;

        tracing::info!(job_id = %record.job_id, status = record.status.as_str(), "job queued");
        Ok(record)
    }

    pub fn fetch_job(&self, job_id: &str) -> Result<JobRecord, ClientError> {
        let url = self.config.url(&format!("/jobs/{job_id}"));
        let req = self.client.get(&url);
        let resp = self.send(req, self.config.poll_interval.max(Duration::from_secs(30)))?;
        resp.json().map_err(|e| ClientError::Decode(e.to_string()))
    }

    /// Poll a job until it reaches a terminal status or `timeout` elapses.
    ///
    /// `on_update` sees every record fetched, including the terminal one.
    pub fn wait_for_job(
        &self,
        job_id: &str,
        timeout: Duration,
        mut on_update: impl FnMut(&JobRecord),
    ) -> Result<JobRecord, ClientError> {
        let deadline = Instant::now() + timeout;
        loop {
            let record = self.fetch_job(job_id)?;
            tracing::debug!(job_id, status = record.status.as_str(), "job polled");
            on_update(&record);
            if record.status.is_terminal() {
                return Ok(record);
            }
            if Instant::now() + self.config.poll_interval > deadline {
                return Err(ClientError::Timeout(timeout));
            }
            thread::sleep(self.config.poll_interval);
        }
    }

    /// Queue a job, wait for it, and decode its result.
    pub fn submit_and_wait(
        &self,
        mode: ForecastMode,
        file: &Path,
        params: &ForecastParams,
        on_update: impl FnMut(&JobRecord),
    ) -> Result<ForecastResponse, ClientError> {
        let queued = self.submit_async(mode, file, params)?;
        let done = self.wait_for_job(&queued.job_id, self.config.timeout_for(mode), on_update)?;
        job_response(&done)
    }

    fn upload(
        &self,
        url: &str,
        file: &Path,
        mode: ForecastMode,
        params: &ForecastParams,
    ) -> Result<RequestBuilder, ClientError> {
        let form = multipart::Form::new()
            .file("file", file)
            .map_err(|source| ClientError::File {
                path: file.display().to_string(),
                source,
            })?;
        Ok(self
            .client
            .post(url)
            .query(&build_query(mode, params))
            .multipart(form))
    }

    fn send(&self, req: RequestBuilder, timeout: Duration) -> Result<Response, ClientError> {
        let resp = req.timeout(timeout).send().map_err(|e| {
            if e.is_timeout() {
                ClientError::Timeout(timeout)
            } else {
                ClientError::Http(e)
            }
        })?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let text = resp.text().unwrap_or_default();
        let body = serde_json::from_str::<Value>(&text).unwrap_or(Value::Null);
        let (code, message) = error_fields(&body);
        tracing::warn!(status = status.as_u16(), code = code.as_deref().unwrap_or("-"), "backend error");
        Err(ClientError::Api {
            status: status.as_u16(),
            code,
            message,
        })
    }
}

/// Query string shared by the synchronous and async endpoints.
///
/// Quantiles and metrics are repeated keys. An empty metric selection is
/// sent as a single empty `metrics` entry so the backend skips metrics
/// instead of applying its defaults.
pub fn build_query(mode: ForecastMode, params: &ForecastParams) -> Vec<(String, String)> {
    let mut q: Vec<(String, String)> = vec![
        ("prediction_length".into(), params.prediction_length.to_string()),
        ("with_cov".into(), params.with_cov.to_string()),
    ];

    if mode == ForecastMode::Finetune {
        let ft = &params.finetune;
        q.push(("finetune_num_steps".into(), ft.num_steps.to_string()));
        q.push(("finetune_learning_rate".into(), ft.learning_rate.to_string()));
        q.push(("finetune_batch_size".into(), ft.batch_size.to_string()));
        q.push(("save_model".into(), ft.save_model.to_string()));
        if let Some(id) = params.reuse_model_id() {
            q.push(("model_id".into(), id.to_string()));
        }
    }

    if let Some(ctx) = params.context_length.filter(|c| *c > 0) {
        q.push(("context_length".into(), ctx.to_string()));
    }
    if let Some(freq) = params.freq {
        q.push(("freq".into(), freq.as_str().to_string()));
    }

    for level in params.effective_quantiles() {
        q.push(("quantiles".into(), level.to_string()));
    }

    if params.metrics.is_empty() {
        q.push(("metrics".into(), String::new()));
    } else {
        for m in &params.metrics {
            q.push(("metrics".into(), m.as_str().to_string()));
        }
    }

    q
}

/// Remediation hint for a known backend error code.
pub fn hint_for(code: &str) -> Option<&'static str> {
    match code {
        "DATA_FORMAT_ERROR" => Some("Make sure the Markdown contains a ```json block that parses as JSON."),
        "DATA_MISSING_COLUMNS" => Some("Make sure history_data rows include at least timestamp, item_id and target."),
        "FUTURE_COV_MISMATCH" => Some("Make sure future_cov has exactly prediction_length rows per item_id."),
        "VALIDATION_ERROR" => Some("Check parameter ranges (prediction_length, quantiles, ...)."),
        "MODEL_NOT_READY" => Some("Backend dependencies or model are not ready; check the backend setup and CHRONOS_MODEL_PATH."),
        "MODEL_LOAD_FAILED" => Some("Model failed to load; check the model directory contains config.json and model.safetensors."),
        _ => None,
    }
}

/// Render a backend failure as one user-facing string.
pub fn format_api_error(code: Option<&str>, message: &str) -> String {
    match code {
        Some(code) => match hint_for(code) {
            Some(hint) => format!("[{code}] {message}\nHint: {hint}"),
            None => format!("[{code}] {message}"),
        },
        None => message.to_string(),
    }
}

/// Pull `(code, message)` out of an error body.
///
/// `error_code` wins over `code`, `message` over `detail`. A non-string
/// `detail` (e.g. a validation error list) is rendered as compact JSON.
pub fn error_fields(body: &Value) -> (Option<String>, String) {
    let pick = |keys: [&str; 2]| {
        keys.iter()
            .find_map(|k| body.get(*k).filter(|v| !v.is_null()))
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
    };
    let code = pick(["error_code", "code"]);
    let message = pick(["message", "detail"]).unwrap_or_else(|| FALLBACK_MESSAGE.to_string());
    (code, message)
}

/// Decode the forecast carried by a terminal job record.
pub fn job_response(record: &JobRecord) -> Result<ForecastResponse, ClientError> {
    match record.status {
        JobStatus::Succeeded => {
            let result = record
                .result
                .clone()
                .ok_or_else(|| ClientError::Decode(format!("job {} has no result", record.job_id)))?;
            serde_json::from_value(result).map_err(|e| ClientError::Decode(e.to_string()))
        }
        JobStatus::Failed => Err(ClientError::JobFailed {
            job_id: record.job_id.clone(),
            message: record
                .error
                .as_ref()
                .map(|e| error_fields(e).1)
                .unwrap_or_else(|| FALLBACK_MESSAGE.to_string()),
        }),
        other => Err(ClientError::Decode(format!(
            "job {} is still {}",
            record.job_id,
            other.as_str()
        ))),
    }
}
