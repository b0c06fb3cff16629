//! Command-line parsing for the forecast client.
//!
//! The goal of this module is to keep **argument parsing** and **command dispatch**
//! separate from the client/view code.

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

use crate::domain::{FinetuneParams, ForecastMode, ForecastParams, Freq, Metric};

pub mod picker;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(
    name = "tsf",
    version,
    about = "Time-series forecast client (Markdown payload -> zero-shot / fine-tune backend)"
)]
pub struct Cli {
    /// Increase log verbosity on stderr (-v info, -vv debug). `RUST_LOG` wins if set.
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Validate a Markdown input and print a payload summary.
    Check(CheckArgs),
    /// Submit a Markdown input, print metrics/plots, and optionally export.
    Run(RunArgs),
    /// Show (and optionally wait for) a backend job.
    Job(JobArgs),
    /// Re-render a saved response against its Markdown input, offline.
    View(ViewArgs),
    /// Print the Markdown input template.
    Template,
    /// Launch the interactive TUI.
    ///
    /// This uses the same underlying pipeline as `tsf run`, but renders results
    /// in a terminal UI using Ratatui.
    Tui(TuiArgs),
}

#[derive(Debug, Args, Clone)]
pub struct CheckArgs {
    /// Markdown file (.md) with a ```json block.
    pub file: PathBuf,

    /// Horizon to compare against the shortest series.
    #[arg(short = 'p', long, default_value_t = 28)]
    pub prediction_length: u32,
}

/// Request parameters shared by `run` and `tui`.
#[derive(Debug, Args, Clone)]
pub struct ForecastArgs {
    /// Forecast horizon (steps).
    #[arg(short = 'p', long, default_value_t = 28, value_parser = clap::value_parser!(u32).range(1..))]
    pub prediction_length: u32,

    /// Output quantiles, comma-separated. Values outside (0, 1) are dropped.
    #[arg(short = 'q', long, value_delimiter = ',', default_values_t = [0.1, 0.5, 0.9])]
    pub quantiles: Vec<f64>,

    /// Metrics to compute (WQL, WAPE, IC, IR), comma-separated.
    #[arg(long, value_enum, value_delimiter = ',', ignore_case = true, default_values_t = [Metric::Wql, Metric::Wape])]
    pub metrics: Vec<Metric>,

    /// Skip metric computation entirely.
    #[arg(long, conflicts_with = "metrics")]
    pub no_metrics: bool,

    /// Series frequency (D, H, W, M). Inferred by the backend when omitted.
    #[arg(long, value_enum, ignore_case = true)]
    pub freq: Option<Freq>,

    /// Use covariates (covariates + known_covariates_names).
    #[arg(long)]
    pub with_cov: bool,

    /// Context length; 0 leaves it to the backend.
    #[arg(long, default_value_t = 512)]
    pub context_length: u32,

    /// Fine-tune steps.
    #[arg(long, default_value_t = 1000)]
    pub steps: u32,

    /// Fine-tune learning rate.
    #[arg(long, default_value_t = 1e-4)]
    pub learning_rate: f64,

    /// Fine-tune batch size.
    #[arg(long, default_value_t = 32)]
    pub batch_size: u32,

    /// Do not keep the fine-tuned model on the backend.
    #[arg(long)]
    pub no_save_model: bool,

    /// Reuse a saved fine-tuned model instead of training again.
    #[arg(long)]
    pub model_id: Option<String>,
}

/// Terminal rendering options.
#[derive(Debug, Args, Clone)]
pub struct PlotArgs {
    /// Disable the terminal plots.
    #[arg(long)]
    pub no_plot: bool,

    /// Plot width (columns).
    #[arg(long, default_value_t = 100)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 20)]
    pub height: usize,

    /// Only render this series (default: all).
    #[arg(long)]
    pub series: Option<String>,

    /// Prediction rows shown in the table.
    #[arg(long, default_value_t = 20)]
    pub rows: usize,
}

#[derive(Debug, Args, Clone)]
pub struct RunArgs {
    /// Markdown file (.md) with a ```json block.
    pub file: PathBuf,

    #[arg(short = 'm', long, value_enum, default_value_t = ForecastMode::Zeroshot)]
    pub mode: ForecastMode,

    #[command(flatten)]
    pub forecast: ForecastArgs,

    /// Submit as a backend job and poll until it finishes.
    #[arg(long = "async")]
    pub async_job: bool,

    /// Submit even if no ```json block was detected.
    #[arg(long)]
    pub force: bool,

    /// Write prediction rows as JSON.
    #[arg(long, value_name = "PATH")]
    pub export_json: Option<PathBuf>,

    /// Write prediction rows as CSV (an empty result is written as JSON).
    #[arg(long, value_name = "PATH")]
    pub export_csv: Option<PathBuf>,

    /// Save the full response for `tsf view`.
    #[arg(long, value_name = "PATH")]
    pub save_response: Option<PathBuf>,

    #[command(flatten)]
    pub plot: PlotArgs,
}

#[derive(Debug, Args, Clone)]
pub struct JobArgs {
    pub job_id: String,

    /// Poll until the job succeeds or fails.
    #[arg(long)]
    pub wait: bool,

    /// Mode whose timeout bounds `--wait`.
    #[arg(short = 'm', long, value_enum, default_value_t = ForecastMode::Zeroshot)]
    pub mode: ForecastMode,

    /// Print the full record as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args, Clone)]
pub struct ViewArgs {
    /// Markdown file the response was produced from.
    pub file: PathBuf,

    /// Response JSON written by `tsf run --save-response`.
    #[arg(long, value_name = "JSON")]
    pub response: PathBuf,

    /// Horizon used when the response does not carry one.
    #[arg(short = 'p', long, default_value_t = 28)]
    pub prediction_length: u32,

    #[command(flatten)]
    pub plot: PlotArgs,
}

#[derive(Debug, Args, Clone)]
pub struct TuiArgs {
    /// Markdown file to open at start.
    pub file: Option<PathBuf>,

    #[arg(short = 'm', long, value_enum, default_value_t = ForecastMode::Zeroshot)]
    pub mode: ForecastMode,

    #[command(flatten)]
    pub forecast: ForecastArgs,
}

/// Request parameters from CLI flags.
pub fn params_from_args(args: &ForecastArgs) -> ForecastParams {
    ForecastParams {
        prediction_length: args.prediction_length,
        quantiles: args.quantiles.clone(),
        metrics: if args.no_metrics { Vec::new() } else { dedup_metrics(&args.metrics) },
        with_cov: args.with_cov,
        freq: args.freq,
        context_length: (args.context_length > 0).then_some(args.context_length),
        finetune: FinetuneParams {
            num_steps: args.steps,
            learning_rate: args.learning_rate,
            batch_size: args.batch_size,
            save_model: !args.no_save_model,
            model_id: args.model_id.clone(),
        },
    }
}

fn dedup_metrics(metrics: &[Metric]) -> Vec<Metric> {
    let mut out = Vec::with_capacity(metrics.len());
    for m in metrics {
        if !out.contains(m) {
            out.push(*m);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn run_defaults_match_forecast_defaults() {
        let cli = parse(&["tsf", "run", "input.md"]);
        let Command::Run(run) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(run.mode, ForecastMode::Zeroshot);
        assert_eq!(params_from_args(&run.forecast), ForecastParams::default());
    }

    #[test]
    fn metrics_parse_case_insensitively_and_dedup() {
        let cli = parse(&["tsf", "run", "in.md", "--metrics", "wql,IC,Wql", "-q", "0.2,0.8"]);
        let Command::Run(run) = cli.command else {
            panic!("expected run");
        };
        let params = params_from_args(&run.forecast);
        assert_eq!(params.metrics, vec![Metric::Wql, Metric::Ic]);
        assert_eq!(params.quantiles, vec![0.2, 0.8]);
    }

    #[test]
    fn unknown_metric_is_rejected() {
        assert!(Cli::try_parse_from(["tsf", "run", "in.md", "--metrics", "MAPE"]).is_err());
    }

    #[test]
    fn finetune_flags_map_to_params() {
        let cli = parse(&[
            "tsf", "run", "in.md", "-m", "finetune", "--no-save-model", "--model-id", "ft-7",
            "--context-length", "0", "--no-metrics", "--freq", "w",
        ]);
        let Command::Run(run) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(run.mode, ForecastMode::Finetune);
        let params = params_from_args(&run.forecast);
        assert!(!params.finetune.save_model);
        assert_eq!(params.reuse_model_id(), Some("ft-7"));
        assert_eq!(params.context_length, None);
        assert!(params.metrics.is_empty());
        assert_eq!(params.freq, Some(Freq::W));
    }

    #[test]
    fn verbosity_is_global() {
        let cli = parse(&["tsf", "check", "in.md", "-vv"]);
        assert_eq!(cli.verbose, 2);
    }
}
