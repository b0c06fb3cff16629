//! Shared "forecast pipeline" logic used by both CLI and TUI front-ends.
//!
//! Keeping this in one place avoids duplicating the core workflow:
//! load file -> submit (sync or as a job) -> combine with payload history
//!
//! The CLI and the TUI can then focus on presentation (printing vs widgets).

use crate::data::client::{ClientError, ForecastClient};
use crate::domain::{ForecastMode, ForecastParams, ForecastResponse, JobRecord, SeriesView};
use crate::io::markdown::MarkdownFile;
use crate::report::summary::{try_summarize_markdown, PayloadSummary};
use crate::view::{build_series_view, ViewRequest};

/// All computed outputs of a single forecast run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub response: ForecastResponse,
    /// `None` when the payload history could not be re-read.
    pub view: Option<SeriesView>,
    pub summary: Option<PayloadSummary>,
}

/// How to reach the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// One blocking request.
    Direct,
    /// Queue a job and poll it.
    Job,
}

/// Submit `file` and return the raw response.
pub fn submit(
    client: &ForecastClient,
    file: &MarkdownFile,
    mode: ForecastMode,
    params: &ForecastParams,
    dispatch: Dispatch,
    on_job: impl FnMut(&JobRecord),
) -> Result<ForecastResponse, ClientError> {
    match dispatch {
        Dispatch::Direct => client.submit(mode, &file.path, params),
        Dispatch::Job => client.submit_and_wait(mode, &file.path, params, on_job),
    }
}

/// Execute the full pipeline: submit, then build the view from the file's text.
pub fn run_forecast(
    client: &ForecastClient,
    file: &MarkdownFile,
    mode: ForecastMode,
    params: &ForecastParams,
    dispatch: Dispatch,
    on_job: impl FnMut(&JobRecord),
) -> Result<RunOutput, ClientError> {
    let response = submit(client, file, mode, params, dispatch, on_job)?;
    Ok(assemble(file.text.as_deref(), response, params))
}

/// Combine an already-received response with the payload text.
///
/// Parse failures are not errors here: the view and summary just stay empty.
pub fn assemble(markdown_text: Option<&str>, response: ForecastResponse, params: &ForecastParams) -> RunOutput {
    let view = markdown_text.and_then(|text| view_from_response(text, &response, params));
    let summary = markdown_text.and_then(try_summarize_markdown);
    RunOutput {
        response,
        view,
        summary,
    }
}

/// Build the per-series view for a response, or `None` if the payload does not parse.
pub fn view_from_response(
    markdown_text: &str,
    response: &ForecastResponse,
    params: &ForecastParams,
) -> Option<SeriesView> {
    let quantiles = response.active_quantiles(params);
    let req = ViewRequest::new(
        markdown_text,
        &response.predictions,
        &quantiles,
        response.effective_prediction_length(params),
    );
    match build_series_view(&req) {
        Ok(view) => Some(view),
        Err(err) => {
            tracing::debug!(%err, "series view unavailable");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const MD: &str = "```json\n{\"history_data\": [\
        {\"item_id\": \"A\", \"timestamp\": \"2024-01-01\", \"target\": 1},\
        {\"item_id\": \"A\", \"timestamp\": \"2024-01-02\", \"target\": 2}\
    ]}\n```\n";

    fn response() -> ForecastResponse {
        ForecastResponse {
            predictions: vec![
                json!({"item_id": "A", "timestamp": "2024-01-03", "mean": 2.5, "0.1": 2.0, "0.5": 2.4, "0.9": 3.0})
                    .as_object()
                    .unwrap()
                    .clone(),
            ],
            prediction_length: Some(1),
            ..ForecastResponse::default()
        }
    }

    #[test]
    fn assemble_builds_view_and_summary() {
        let out = assemble(Some(MD), response(), &ForecastParams::default());
        let view = out.view.unwrap();
        assert_eq!(view.item_ids, vec!["A"]);
        let a = view.series("A").unwrap();
        assert_eq!(a.history.len(), 2);
        assert_eq!(a.band.as_ref().map(|b| b.label()), Some("0.1-0.9".to_string()));
        assert_eq!(out.summary.unwrap().series_count, 1);
    }

    #[test]
    fn unparsable_payload_leaves_view_empty() {
        let out = assemble(Some("```json\n{oops"), response(), &ForecastParams::default());
        assert!(out.view.is_none());
        assert!(out.summary.is_none());
        assert_eq!(out.response.predictions.len(), 1);

        let out = assemble(None, response(), &ForecastParams::default());
        assert!(out.view.is_none());
    }
}
