//! Ratatui-based terminal UI.
//!
//! The TUI provides a file picker, a mode toggle and a settings panel for the
//! request parameters, then renders metrics and a per-series forecast chart.
//! Requests run on a worker thread so the screen keeps redrawing while the
//! backend works; only one request is in flight at a time.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;
use std::time::Duration;

use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
};

use crate::app::session::{ForecastResult, ResultSlot, Submission};
use crate::cli::TuiArgs;
use crate::cli::picker::{discover_markdown_files, pretty_path};
use crate::data::client::ForecastClient;
use crate::data::metrics::{MetricsReport, format_metric};
use crate::domain::{ForecastMode, ForecastParams, ForecastResponse, Freq, Metric, SeriesView};
use crate::error::{AppError, EXIT_BACKEND};
use crate::io::markdown::MarkdownFile;
use crate::report::summary::{PayloadSummary, prediction_length_hint, try_summarize_markdown};

mod plotters_chart;

use plotters_chart::{ChartData, ForecastChart};

const QUANTILE_PRESETS: [&[f64]; 4] = [
    &[0.1, 0.5, 0.9],
    &[0.05, 0.5, 0.95],
    &[0.2, 0.5, 0.8],
    &[0.1, 0.25, 0.5, 0.75, 0.9],
];

const METRIC_PRESETS: [&[Metric]; 4] = [
    &[Metric::Wql, Metric::Wape],
    &[Metric::Wql, Metric::Wape, Metric::Ic, Metric::Ir],
    &[Metric::Wql],
    &[],
];

const LEARNING_RATES: [f64; 5] = [1e-5, 5e-5, 1e-4, 5e-4, 1e-3];

/// File written by the `e` key.
const EXPORT_CSV: &str = "predictions.csv";

/// Start the TUI.
pub fn run(args: TuiArgs) -> Result<(), AppError> {
    let client = ForecastClient::from_env()?;
    let mut app = App::new(
        Arc::new(client),
        args.mode,
        crate::cli::params_from_args(&args.forecast),
    );
    if let Some(path) = &args.file {
        app.open_file(path);
    }

    let _guard = TerminalGuard::new()?;

    let backend = CrosstermBackend::new(io::stdout());
    let mut terminal = Terminal::new(backend)
        .map_err(|e| AppError::new(EXIT_BACKEND, format!("Failed to initialize terminal: {e}")))?;

    app.event_loop(&mut terminal)
}

/// Ensures the terminal is restored (raw mode, alternate screen) on exit.
struct TerminalGuard;

impl TerminalGuard {
    fn new() -> Result<Self, AppError> {
        enable_raw_mode().map_err(|e| AppError::new(EXIT_BACKEND, format!("Failed to enable raw mode: {e}")))?;
        if let Err(e) = execute!(io::stdout(), EnterAlternateScreen) {
            let _ = disable_raw_mode();
            return Err(AppError::new(EXIT_BACKEND, format!("Failed to enter alternate screen: {e}")));
        }
        Ok(Self)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
    }
}

/// Editable settings rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    PredictionLength,
    Quantiles,
    Metrics,
    Freq,
    WithCov,
    ContextLength,
    AsyncJob,
    Steps,
    LearningRate,
    BatchSize,
    SaveModel,
    ModelId,
}

impl Field {
    fn for_mode(mode: ForecastMode) -> &'static [Field] {
        const COMMON: [Field; 7] = [
            Field::PredictionLength,
            Field::Quantiles,
            Field::Metrics,
            Field::Freq,
            Field::WithCov,
            Field::ContextLength,
            Field::AsyncJob,
        ];
        const FINETUNE: [Field; 12] = [
            Field::PredictionLength,
            Field::Quantiles,
            Field::Metrics,
            Field::Freq,
            Field::WithCov,
            Field::ContextLength,
            Field::AsyncJob,
            Field::Steps,
            Field::LearningRate,
            Field::BatchSize,
            Field::SaveModel,
            Field::ModelId,
        ];
        match mode {
            ForecastMode::Zeroshot => &COMMON,
            ForecastMode::Finetune => &FINETUNE,
        }
    }
}

/// Messages from the request worker.
enum WorkerMsg {
    Job { job_id: String, status: &'static str },
    Done(Result<ForecastResponse, String>),
}

struct Pending {
    ticket: Submission,
    mode: ForecastMode,
    params: ForecastParams,
    rx: Receiver<WorkerMsg>,
}

struct App {
    client: Arc<ForecastClient>,
    mode: ForecastMode,
    params: ForecastParams,
    async_job: bool,
    selected_field: usize,

    candidates: Vec<PathBuf>,
    candidate_idx: usize,
    file: Option<MarkdownFile>,
    summary: Option<PayloadSummary>,

    slot: ResultSlot,
    view: Option<SeriesView>,
    series_idx: usize,

    pending: Option<Pending>,
    loading: bool,
    status: String,
    error: Option<String>,
}

impl App {
    fn new(client: Arc<ForecastClient>, mode: ForecastMode, params: ForecastParams) -> Self {
        Self {
            client,
            mode,
            params,
            async_job: false,
            selected_field: 0,
            candidates: Vec::new(),
            candidate_idx: 0,
            file: None,
            summary: None,
            slot: ResultSlot::new(),
            view: None,
            series_idx: 0,
            pending: None,
            loading: false,
            status: "Press o to pick a Markdown file.".to_string(),
            error: None,
        }
    }

    fn event_loop<B: ratatui::backend::Backend>(&mut self, terminal: &mut Terminal<B>) -> Result<(), AppError> {
        let mut needs_redraw = true;
        loop {
            if self.poll_worker() || self.loading {
                needs_redraw = true;
            }

            if needs_redraw {
                terminal
                    .draw(|f| self.draw(f))
                    .map_err(|e| AppError::new(EXIT_BACKEND, format!("Terminal draw error: {e}")))?;
                needs_redraw = false;
            }

            if !event::poll(Duration::from_millis(100))
                .map_err(|e| AppError::new(EXIT_BACKEND, format!("Event poll error: {e}")))?
            {
                continue;
            }

            match event::read().map_err(|e| AppError::new(EXIT_BACKEND, format!("Event read error: {e}")))? {
                Event::Key(key) => {
                    if key.kind != KeyEventKind::Press {
                        continue;
                    }
                    if self.handle_key(key.code) {
                        break;
                    }
                    needs_redraw = true;
                }
                Event::Resize(_, _) => {
                    needs_redraw = true;
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Returns `true` when the app should exit.
    fn handle_key(&mut self, code: KeyCode) -> bool {
        match code {
            KeyCode::Char('q') => return true,
            KeyCode::Char('o') => self.pick_next_file(),
            KeyCode::Tab => {
                self.mode = self.mode.toggle();
                self.selected_field = self.selected_field.min(self.fields().len() - 1);
                self.status = format!("mode: {}", self.mode.display_name());
            }
            KeyCode::Up => {
                self.selected_field = self.selected_field.saturating_sub(1);
            }
            KeyCode::Down => {
                if self.selected_field + 1 < self.fields().len() {
                    self.selected_field += 1;
                }
            }
            KeyCode::Left => self.adjust_field(-1),
            KeyCode::Right => self.adjust_field(1),
            KeyCode::Enter => self.submit(),
            KeyCode::Char('[') => self.step_series(-1),
            KeyCode::Char(']') => self.step_series(1),
            KeyCode::Char('e') => self.export_csv(Path::new(EXPORT_CSV)),
            KeyCode::Char('u') => self.reuse_model_id(),
            _ => {}
        }
        false
    }

    fn fields(&self) -> &'static [Field] {
        Field::for_mode(self.mode)
    }

    fn pick_next_file(&mut self) {
        if self.candidates.is_empty() {
            self.candidates = discover_markdown_files();
            self.candidate_idx = 0;
        } else {
            self.candidate_idx = (self.candidate_idx + 1) % self.candidates.len();
        }

        let Some(path) = self.candidates.get(self.candidate_idx).cloned() else {
            self.error = Some("No .md files found under the current directory.".to_string());
            return;
        };
        self.open_file(&path);
    }

    fn open_file(&mut self, path: &Path) {
        self.slot.clear_on_file_change();
        self.view = None;
        self.series_idx = 0;
        self.summary = None;
        self.error = None;

        match MarkdownFile::load(path) {
            Ok(file) => {
                self.summary = file.text.as_deref().and_then(try_summarize_markdown);
                self.status = format!("{}: {}", pretty_path(&file.path), file.precheck.message);
                if !file.precheck.ok {
                    self.error = Some(file.precheck.message.clone());
                }
                self.file = Some(file);
            }
            Err(err) => {
                self.file = None;
                self.error = Some(err.to_string());
            }
        }
    }

    fn adjust_field(&mut self, delta: i32) {
        let Some(&field) = self.fields().get(self.selected_field) else {
            return;
        };
        let p = &mut self.params;
        match field {
            Field::PredictionLength => {
                p.prediction_length = step_u32(p.prediction_length, delta, 1, 1);
            }
            Field::Quantiles => {
                let idx = QUANTILE_PRESETS.iter().position(|q| *q == p.quantiles.as_slice());
                p.quantiles = QUANTILE_PRESETS[cycle(idx, QUANTILE_PRESETS.len(), delta)].to_vec();
            }
            Field::Metrics => {
                let idx = METRIC_PRESETS.iter().position(|m| *m == p.metrics.as_slice());
                p.metrics = METRIC_PRESETS[cycle(idx, METRIC_PRESETS.len(), delta)].to_vec();
            }
            Field::Freq => {
                // `None` (backend infers) sits before the codes.
                let idx = p.freq.and_then(|f| Freq::ALL.iter().position(|x| *x == f)).map(|i| i + 1);
                let next = cycle(idx.or(Some(0)), Freq::ALL.len() + 1, delta);
                p.freq = if next == 0 { None } else { Some(Freq::ALL[next - 1]) };
            }
            Field::WithCov => p.with_cov = !p.with_cov,
            Field::ContextLength => {
                let cur = p.context_length.unwrap_or(0);
                let next = step_u32(cur, delta, 64, 0);
                p.context_length = (next > 0).then_some(next);
            }
            Field::AsyncJob => self.async_job = !self.async_job,
            Field::Steps => {
                p.finetune.num_steps = step_u32(p.finetune.num_steps, delta, 100, 100);
            }
            Field::LearningRate => {
                let idx = LEARNING_RATES
                    .iter()
                    .position(|lr| (*lr - p.finetune.learning_rate).abs() < f64::EPSILON);
                p.finetune.learning_rate = LEARNING_RATES[cycle(idx, LEARNING_RATES.len(), delta)];
            }
            Field::BatchSize => {
                p.finetune.batch_size = step_u32(p.finetune.batch_size, delta, 8, 8);
            }
            Field::SaveModel => p.finetune.save_model = !p.finetune.save_model,
            Field::ModelId => {
                p.finetune.model_id = None;
                self.status = "Model reuse cleared; the next run fine-tunes again.".to_string();
            }
        }
    }

    fn reuse_model_id(&mut self) {
        let Some(id) = self
            .slot
            .current()
            .and_then(|r| r.response.model_id.clone())
        else {
            self.status = "No saved model in the current result.".to_string();
            return;
        };
        self.mode = ForecastMode::Finetune;
        self.status = format!("Reusing model {id} for the next run.");
        self.params.finetune.model_id = Some(id);
    }

    fn submit(&mut self) {
        if self.loading {
            self.status = "A request is already running.".to_string();
            return;
        }
        let Some(file) = &self.file else {
            self.error = Some("Pick a Markdown file (.md) with a ```json block first (press o).".to_string());
            return;
        };
        if !file.precheck.ok {
            self.error = Some(file.precheck.message.clone());
            return;
        }

        let ticket = self.slot.begin_submission();
        self.view = None;
        self.series_idx = 0;
        self.error = None;
        self.loading = true;
        self.status = format!("Running {} forecast...", self.mode.display_name());

        let (tx, rx) = mpsc::channel();
        let client = Arc::clone(&self.client);
        let path = file.path.clone();
        let mode = self.mode;
        let params = self.params.clone();
        let async_job = self.async_job;

        thread::spawn(move || {
            let result = if async_job {
                client.submit_and_wait(mode, &path, &params, |job| {
                    let _ = tx.send(WorkerMsg::Job {
                        job_id: job.job_id.clone(),
                        status: job.status.as_str(),
                    });
                })
            } else {
                client.submit(mode, &path, &params)
            };
            let _ = tx.send(WorkerMsg::Done(result.map_err(|e| e.to_string())));
        });

        self.pending = Some(Pending {
            ticket,
            mode,
            params: self.params.clone(),
            rx,
        });
    }

    /// Drain worker messages. Returns `true` if anything changed.
    fn poll_worker(&mut self) -> bool {
        let Some(pending) = &self.pending else {
            return false;
        };

        let mut changed = false;
        let mut finished: Option<Result<ForecastResponse, String>> = None;
        loop {
            match pending.rx.try_recv() {
                Ok(WorkerMsg::Job { job_id, status }) => {
                    self.status = format!("Job {job_id}: {status}");
                    changed = true;
                }
                Ok(WorkerMsg::Done(result)) => {
                    finished = Some(result);
                    break;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    finished = Some(Err("Request worker stopped unexpectedly.".to_string()));
                    break;
                }
            }
        }

        if let Some(result) = finished {
            if let Some(pending) = self.pending.take() {
                self.finish(pending, result);
            }
            changed = true;
        }
        changed
    }

    fn finish(&mut self, pending: Pending, result: Result<ForecastResponse, String>) {
        self.loading = false;
        let response = match result {
            Ok(response) => response,
            Err(message) => {
                self.status = "Request failed.".to_string();
                self.error = Some(message);
                return;
            }
        };

        let model_id = response.model_id.clone();
        let stored = self.slot.store(
            pending.ticket,
            ForecastResult {
                mode: pending.mode,
                params: pending.params,
                response,
            },
        );
        if !stored {
            self.status = "Discarded a result for a previous file.".to_string();
            return;
        }

        self.rebuild_view();
        self.status = match model_id {
            Some(id) => format!("Fine-tune complete, model_id={id} (u to reuse)."),
            None => "Forecast complete.".to_string(),
        };
    }

    fn rebuild_view(&mut self) {
        let (Some(result), Some(file)) = (self.slot.current(), &self.file) else {
            self.view = None;
            return;
        };
        self.view = file.text.as_deref().and_then(|text| {
            crate::app::pipeline::view_from_response(text, &result.response, &result.params)
        });
        self.series_idx = 0;
    }

    fn step_series(&mut self, delta: i32) {
        let Some(view) = &self.view else {
            return;
        };
        let n = view.item_ids.len();
        if n == 0 {
            return;
        }
        self.series_idx = cycle(Some(self.series_idx), n, delta);
        self.status = format!("series: {}", view.item_ids[self.series_idx]);
    }

    fn export_csv(&mut self, path: &Path) {
        let Some(result) = self.slot.current() else {
            self.status = "Nothing to export yet.".to_string();
            return;
        };
        let quantiles = result.response.active_quantiles(&result.params);
        match crate::io::export::write_predictions_csv(path, &result.response.predictions, &quantiles) {
            Ok(written) => self.status = format!("Exported {}", written.display()),
            Err(err) => self.error = Some(err.to_string()),
        }
    }

    fn draw(&mut self, frame: &mut ratatui::Frame<'_>) {
        let size = frame.area();
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(5), Constraint::Min(0), Constraint::Length(3)])
            .split(size);

        self.draw_header(frame, chunks[0]);
        self.draw_body(frame, chunks[1]);
        self.draw_footer(frame, chunks[2]);
    }

    fn draw_header(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let mut lines: Vec<Line> = Vec::new();
        lines.push(Line::from(vec![
            Span::styled("tsf", Style::default().fg(Color::Cyan)),
            Span::raw(format!(" | {} forecast", self.mode.display_name())),
            if self.loading {
                Span::styled("  [running]", Style::default().fg(Color::Yellow))
            } else {
                Span::raw("")
            },
        ]));

        let file_line = match &self.file {
            Some(f) => format!("file: {} ({} KiB) | {}", pretty_path(&f.path), f.size_kib(), f.precheck.message),
            None => "file: - (press o)".to_string(),
        };
        lines.push(Line::from(Span::styled(file_line, Style::default().fg(Color::Gray))));

        if let Some(s) = &self.summary {
            lines.push(Line::from(Span::styled(
                format!(
                    "series={} rows={} len(min/max)={}/{} covariates={} known={} freq={}",
                    s.series_count,
                    s.history_rows,
                    s.min_series_length,
                    s.max_series_length,
                    if s.has_future_cov { "yes" } else { "no" },
                    s.known_covariates_count,
                    s.freq.as_deref().unwrap_or("auto"),
                ),
                Style::default().fg(Color::Gray),
            )));
            if let Some(hint) = prediction_length_hint(s, self.params.prediction_length) {
                lines.push(Line::from(Span::styled(hint, Style::default().fg(Color::Yellow))));
            }
        }

        let p = Paragraph::new(Text::from(lines)).block(Block::default().borders(Borders::ALL));
        frame.render_widget(p, area);
    }

    fn draw_body(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Length(40), Constraint::Min(0)])
            .split(area);

        self.draw_settings(frame, columns[0]);

        let right = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(9), Constraint::Min(0)])
            .split(columns[1]);

        self.draw_metrics(frame, right[0]);
        self.draw_chart(frame, right[1]);
    }

    fn draw_settings(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let items: Vec<ListItem> = self
            .fields()
            .iter()
            .map(|f| ListItem::new(self.field_text(*f)))
            .collect();

        let list = List::new(items)
            .block(Block::default().title("Settings").borders(Borders::ALL))
            .highlight_style(Style::default().fg(Color::Black).bg(Color::White))
            .highlight_symbol("» ");

        let mut state = ratatui::widgets::ListState::default();
        state.select(Some(self.selected_field));
        frame.render_stateful_widget(list, area, &mut state);
    }

    fn field_text(&self, field: Field) -> String {
        let p = &self.params;
        let on_off = |b: bool| if b { "on" } else { "off" };
        match field {
            Field::PredictionLength => format!("Horizon: {}", p.prediction_length),
            Field::Quantiles => {
                let q: Vec<String> = p.quantiles.iter().map(|q| q.to_string()).collect();
                format!("Quantiles: {}", q.join(","))
            }
            Field::Metrics => {
                if p.metrics.is_empty() {
                    "Metrics: (none)".to_string()
                } else {
                    let m: Vec<&str> = p.metrics.iter().map(|m| m.as_str()).collect();
                    format!("Metrics: {}", m.join(","))
                }
            }
            Field::Freq => format!("Freq: {}", p.freq.map(|f| f.as_str()).unwrap_or("auto")),
            Field::WithCov => format!("Covariates: {}", on_off(p.with_cov)),
            Field::ContextLength => match p.context_length {
                Some(c) => format!("Context: {c}"),
                None => "Context: backend default".to_string(),
            },
            Field::AsyncJob => format!("Run as job: {}", on_off(self.async_job)),
            Field::Steps => format!("Steps: {}", p.finetune.num_steps),
            Field::LearningRate => format!("Learning rate: {:e}", p.finetune.learning_rate),
            Field::BatchSize => format!("Batch size: {}", p.finetune.batch_size),
            Field::SaveModel => format!("Save model: {}", on_off(p.finetune.save_model)),
            Field::ModelId => format!("Reuse model: {}", p.reuse_model_id().unwrap_or("-")),
        }
    }

    fn draw_metrics(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let block = Block::default().title("Metrics").borders(Borders::ALL);

        let Some(result) = self.slot.current() else {
            let msg = if self.loading { "Waiting for the backend..." } else { "No result yet." };
            frame.render_widget(
                Paragraph::new(msg).style(Style::default().fg(Color::Gray)).block(block),
                area,
            );
            return;
        };

        let mut lines: Vec<Line> = Vec::new();
        match MetricsReport::from_json(result.response.metrics.as_ref()) {
            None => lines.push(Line::from("(no metrics in response)")),
            Some(MetricsReport::Skipped { reason }) => {
                lines.push(Line::from(Span::styled(
                    format!("Metrics skipped: {reason}"),
                    Style::default().fg(Color::Yellow),
                )));
            }
            Some(report @ MetricsReport::Values { .. }) => {
                for metric in Metric::ALL {
                    lines.push(Line::from(vec![
                        Span::styled(format!("{:<5}", metric.as_str()), Style::default().add_modifier(Modifier::BOLD)),
                        Span::raw(format_metric(metric, report.value(metric))),
                    ]));
                }
                let warnings = match &report {
                    MetricsReport::Values { warnings, .. } => warnings.as_slice(),
                    MetricsReport::Skipped { .. } => &[],
                };
                if !warnings.is_empty() {
                    let joined: Vec<String> = warnings.iter().map(ToString::to_string).collect();
                    lines.push(Line::from(Span::styled(
                        format!("Warnings: {}", joined.join("; ")),
                        Style::default().fg(Color::Yellow),
                    )));
                }
            }
        }

        if let Some(id) = &result.response.model_id {
            let left = result
                .response
                .model_retention_days_left
                .map(|d| format!(", {d} days left"))
                .unwrap_or_default();
            lines.push(Line::from(Span::styled(
                format!("Saved model: {id}{left} (u to reuse)"),
                Style::default().fg(Color::Green),
            )));
        }

        let p = Paragraph::new(Text::from(lines)).block(block).wrap(Wrap { trim: true });
        frame.render_widget(p, area);
    }

    fn draw_chart(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let selected = self
            .view
            .as_ref()
            .and_then(|v| v.item_ids.get(self.series_idx).map(|id| (v, id)));

        let title = match selected {
            Some((v, id)) => {
                let band = v
                    .series(id)
                    .and_then(|s| s.band.as_ref())
                    .map(|b| format!(" | band {}", b.label()))
                    .unwrap_or_default();
                format!("Series {id} ({}/{}){band}", self.series_idx + 1, v.item_ids.len())
            }
            None => "Forecast".to_string(),
        };
        let block = Block::default().title(title).borders(Borders::ALL);
        let inner = block.inner(area);
        frame.render_widget(block, area);
        frame.render_widget(Clear, inner);

        let Some(series) = selected.and_then(|(v, id)| v.series(id)) else {
            let msg = match (&self.view, self.slot.current()) {
                (_, None) if self.loading => "Running...",
                (_, None) => "Run a forecast (Enter) to see the chart.",
                (None, Some(_)) => "History unavailable: the payload could not be parsed.",
                (Some(_), Some(_)) => "No series in the result.",
            };
            let p = Paragraph::new(msg).style(Style::default().fg(Color::Yellow));
            frame.render_widget(p, inner);
            return;
        };

        let data = ChartData::from_series(series);
        frame.render_widget(
            ForecastChart {
                data: &data,
                y_label: "target",
            },
            inner,
        );
    }

    fn draw_footer(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let help = "o file  Tab mode  ↑/↓ select  ←/→ adjust  Enter run  [/] series  e export  u reuse  q quit";
        let (text, color) = match &self.error {
            Some(err) => (err.replace('\n', " | "), Color::Red),
            None => (self.status.clone(), Color::Yellow),
        };
        let line = Line::from(vec![
            Span::styled(help, Style::default().fg(Color::Gray)),
            Span::raw(" | "),
            Span::styled(text, Style::default().fg(color)),
        ]);
        let p = Paragraph::new(line).block(Block::default().borders(Borders::ALL));
        frame.render_widget(p, area);
    }
}

/// Step an index through `0..len`, wrapping. An unknown position starts at 0.
fn cycle(current: Option<usize>, len: usize, delta: i32) -> usize {
    if len == 0 {
        return 0;
    }
    let Some(cur) = current else {
        return 0;
    };
    let len = len as i64;
    (cur as i64 + i64::from(delta)).rem_euclid(len) as usize
}

fn step_u32(value: u32, delta: i32, step: u32, min: u32) -> u32 {
    let next = if delta >= 0 {
        value.saturating_add(step)
    } else {
        value.saturating_sub(step)
    };
    next.max(min)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::client::ClientConfig;
    use serde_json::json;

    fn app() -> App {
        let client = ForecastClient::new(ClientConfig::default()).unwrap();
        App::new(Arc::new(client), ForecastMode::Zeroshot, ForecastParams::default())
    }

    fn write_md(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    const MD: &str = "```json\n{\"history_data\": [\
        {\"item_id\": \"A\", \"timestamp\": \"2024-01-01\", \"target\": 1},\
        {\"item_id\": \"B\", \"timestamp\": \"2024-01-01\", \"target\": 2}\
    ]}\n```\n";

    fn response() -> ForecastResponse {
        let rows = json!([
            {"item_id": "A", "timestamp": "2024-01-02", "0.1": 0.5, "0.5": 1.0, "0.9": 1.5},
            {"item_id": "B", "timestamp": "2024-01-02", "0.1": 1.5, "0.5": 2.0, "0.9": 2.5}
        ]);
        ForecastResponse {
            predictions: rows
                .as_array()
                .unwrap()
                .iter()
                .map(|r| r.as_object().unwrap().clone())
                .collect(),
            model_id: Some("ft-9".into()),
            ..ForecastResponse::default()
        }
    }

    /// Install a pending request whose worker has already answered.
    fn answer(app: &mut App, result: Result<ForecastResponse, String>) {
        let ticket = app.slot.begin_submission();
        let (tx, rx) = mpsc::channel();
        tx.send(WorkerMsg::Done(result)).unwrap();
        app.loading = true;
        app.pending = Some(Pending {
            ticket,
            mode: app.mode,
            params: app.params.clone(),
            rx,
        });
    }

    #[test]
    fn cycle_wraps_both_ways() {
        assert_eq!(cycle(Some(0), 3, -1), 2);
        assert_eq!(cycle(Some(2), 3, 1), 0);
        assert_eq!(cycle(None, 3, 1), 0);
        assert_eq!(cycle(Some(1), 0, 1), 0);
    }

    #[test]
    fn settings_adjust_within_bounds() {
        let mut app = app();
        app.adjust_field(-1);
        assert_eq!(app.params.prediction_length, 27);
        app.params.prediction_length = 1;
        app.adjust_field(-1);
        assert_eq!(app.params.prediction_length, 1);

        app.selected_field = 3;
        app.adjust_field(1);
        assert_eq!(app.params.freq, Some(Freq::D));
        app.adjust_field(-1);
        assert_eq!(app.params.freq, None);

        app.selected_field = 2;
        app.adjust_field(-1);
        assert!(app.params.metrics.is_empty());
    }

    #[test]
    fn enter_without_file_is_blocked() {
        let mut app = app();
        app.submit();
        assert!(!app.loading);
        assert!(app.error.as_deref().unwrap().contains("Markdown"));
    }

    #[test]
    fn file_without_fence_blocks_submission() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_md(dir.path(), "empty.md", "# nothing here\n");
        let mut app = app();
        app.open_file(&path);
        assert!(app.error.is_some());

        app.error = None;
        app.submit();
        assert!(!app.loading);
        assert!(app.error.is_some());
    }

    #[test]
    fn completed_request_fills_slot_and_view() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_md(dir.path(), "in.md", MD);
        let mut app = app();
        app.open_file(&path);
        assert_eq!(app.summary.as_ref().map(|s| s.series_count), Some(2));

        answer(&mut app, Ok(response()));
        assert!(app.poll_worker());
        assert!(!app.loading);
        assert!(app.status.contains("ft-9"));

        let view = app.view.as_ref().unwrap();
        assert_eq!(view.item_ids, vec!["A", "B"]);
        app.step_series(1);
        assert_eq!(app.series_idx, 1);
        app.step_series(1);
        assert_eq!(app.series_idx, 0);

        app.reuse_model_id();
        assert_eq!(app.mode, ForecastMode::Finetune);
        assert_eq!(app.params.reuse_model_id(), Some("ft-9"));
    }

    #[test]
    fn failed_request_reports_message() {
        let mut app = app();
        answer(&mut app, Err("[MODEL_NOT_READY] not ready".into()));
        app.poll_worker();
        assert!(!app.loading);
        assert!(app.slot.current().is_none());
        assert_eq!(app.error.as_deref(), Some("[MODEL_NOT_READY] not ready"));
    }

    #[test]
    fn switching_file_drops_in_flight_result() {
        let dir = tempfile::tempdir().unwrap();
        let first = write_md(dir.path(), "a.md", MD);
        let second = write_md(dir.path(), "b.md", MD);
        let mut app = app();
        app.open_file(&first);

        answer(&mut app, Ok(response()));
        app.open_file(&second);
        app.poll_worker();

        assert!(!app.loading);
        assert!(app.slot.current().is_none());
        assert!(app.view.is_none());
    }

    #[test]
    fn export_writes_current_result() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_md(dir.path(), "in.md", MD);
        let mut app = app();
        app.open_file(&path);
        answer(&mut app, Ok(response()));
        app.poll_worker();

        let out = dir.path().join("out.csv");
        app.export_csv(&out);
        let text = std::fs::read_to_string(&out).unwrap();
        assert!(text.starts_with("item_id,timestamp,0.1,0.5,0.9"));
    }
}
