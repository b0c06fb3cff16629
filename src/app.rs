//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments and sets up logging
//! - loads and pre-checks the Markdown input
//! - submits forecasts (directly or as backend jobs)
//! - prints reports/plots
//! - writes optional exports

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{CheckArgs, Command, JobArgs, PlotArgs, RunArgs, ViewArgs, params_from_args};
use crate::data::client::ForecastClient;
use crate::domain::{ForecastParams, JobStatus};
use crate::error::AppError;
use crate::io::markdown::{MarkdownFile, SAMPLE_MARKDOWN, extract_json_from_markdown};
use crate::report::summary::{format_summary, prediction_length_hint, summarize};

pub mod pipeline;
pub mod session;

use pipeline::{Dispatch, RunOutput};

/// Entry point for the `tsf` binary.
pub fn run() -> Result<(), AppError> {
    // We want `tsf` and `tsf -m finetune` to behave like `tsf tui ...`.
    //
    // Clap requires a subcommand name, so we do a small, explicit rewrite of the
    // argv list before parsing.
    let argv = rewrite_args(std::env::args().collect());
    let cli = crate::cli::Cli::parse_from(argv);

    // The TUI owns the terminal; log lines would corrupt the screen.
    if !matches!(cli.command, Command::Tui(_)) {
        init_tracing(cli.verbose);
    }

    match cli.command {
        Command::Check(args) => handle_check(args),
        Command::Run(args) => handle_run(args),
        Command::Job(args) => handle_job(args),
        Command::View(args) => handle_view(args),
        Command::Template => {
            print!("{SAMPLE_MARKDOWN}");
            Ok(())
        }
        Command::Tui(args) => crate::tui::run(args),
    }
}

fn init_tracing(verbosity: u8) {
    let default = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // A second init (e.g. in tests) is harmless.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn handle_check(args: CheckArgs) -> Result<(), AppError> {
    let file = MarkdownFile::load(&args.file)?;
    println!("File: {} ({} KiB)", file.file_name(), file.size_kib());
    println!("{}", file.precheck.message);
    if !file.precheck.ok {
        return Err(AppError::input(format!(
            "{}: no ```json block in the first {} bytes.",
            file.file_name(),
            crate::io::markdown::PRECHECK_BYTES
        )));
    }

    let text = file.text.as_deref().unwrap_or_default();
    let payload = extract_json_from_markdown(text)?;
    let summary = summarize(&payload);

    println!();
    print!("{}", format_summary(&summary));
    if let Some(hint) = prediction_length_hint(&summary, args.prediction_length) {
        println!();
        println!("Warning: {hint}");
    }
    Ok(())
}

fn handle_run(args: RunArgs) -> Result<(), AppError> {
    let params = params_from_args(&args.forecast);
    let mut file = MarkdownFile::load(&args.file)?;

    if !file.precheck.ok {
        if !args.force {
            return Err(AppError::input(format!(
                "{} (use --force to submit anyway)",
                file.precheck.message
            )));
        }
        eprintln!("Warning: {}", file.precheck.message);
        file.ensure_text()?;
    }

    println!("{}", crate::report::format_run_header(&file.file_name(), args.mode, &params));

    let hint = file
        .text
        .as_deref()
        .and_then(crate::report::try_summarize_markdown)
        .and_then(|summary| prediction_length_hint(&summary, params.prediction_length));
    if let Some(hint) = hint {
        eprintln!("Warning: {hint}");
    }

    let client = ForecastClient::from_env()?;
    let dispatch = if args.async_job { Dispatch::Job } else { Dispatch::Direct };

    let mut last_status: Option<JobStatus> = None;
    let output = pipeline::run_forecast(&client, &file, args.mode, &params, dispatch, |job| {
        if last_status != Some(job.status) {
            eprintln!("Job {}: {}", job.job_id, job.status.as_str());
            last_status = Some(job.status);
        }
    })?;

    print_output(&output, &params, &args.plot);

    let rows = &output.response.predictions;
    let quantiles = output.response.active_quantiles(&params);
    if let Some(path) = &args.export_json {
        let written = crate::io::export::write_predictions_json(path, rows)?;
        println!("Wrote {}", written.display());
    }
    if let Some(path) = &args.export_csv {
        let written = crate::io::export::write_predictions_csv(path, rows, &quantiles)?;
        println!("Wrote {}", written.display());
    }
    if let Some(path) = &args.save_response {
        crate::io::export::write_response_json(path, &output.response)?;
        println!("Saved response to {}", path.display());
    }

    Ok(())
}

fn handle_job(args: JobArgs) -> Result<(), AppError> {
    let client = ForecastClient::from_env()?;
    let record = if args.wait {
        let timeout = client.config().timeout_for(args.mode);
        client.wait_for_job(&args.job_id, timeout, |job| {
            tracing::info!(job_id = %job.job_id, status = job.status.as_str(), "job status");
        })?
    } else {
        client.fetch_job(&args.job_id)?
    };

    if args.json {
        let text = serde_json::to_string_pretty(&record)
            .map_err(|e| AppError::backend(format!("Failed to encode job record: {e}")))?;
        println!("{text}");
    } else {
        print!("{}", crate::report::format_job(&record));
    }

    if record.status == JobStatus::Failed {
        return Err(crate::data::client::job_response(&record)
            .err()
            .map(AppError::from)
            .unwrap_or_else(|| AppError::backend("Job failed.")));
    }
    Ok(())
}

fn handle_view(args: ViewArgs) -> Result<(), AppError> {
    let mut file = MarkdownFile::load(&args.file)?;
    let text = file.ensure_text()?.to_string();
    let response = crate::io::export::read_response_json(&args.response)?;

    let params = ForecastParams {
        prediction_length: args.prediction_length,
        ..ForecastParams::default()
    };
    let output = pipeline::assemble(Some(&text), response, &params);
    print_output(&output, &params, &args.plot);
    Ok(())
}

/// Print metrics, the model notice, the prediction table and per-series plots.
fn print_output(output: &RunOutput, params: &ForecastParams, plot: &PlotArgs) {
    let response = &output.response;

    print!("{}", crate::report::format_response_summary(response, params));
    if let Some(notice) = crate::report::format_model_notice(response) {
        println!();
        print!("{notice}");
    }

    println!();
    print!(
        "{}",
        crate::report::format_predictions_table(
            &response.predictions,
            &response.active_quantiles(params),
            plot.rows
        )
    );

    if plot.no_plot {
        return;
    }
    let Some(view) = &output.view else {
        println!();
        println!("(history unavailable: the payload could not be parsed, plots skipped)");
        return;
    };
    if view.is_empty() {
        println!();
        println!("(no series in the payload or the response, plots skipped)");
        return;
    }

    for id in &view.item_ids {
        if plot.series.as_ref().is_some_and(|wanted| wanted != id) {
            continue;
        }
        if let Some(series) = view.series(id) {
            println!();
            print!("{}", crate::plot::render_series_plot(id, series, plot.width, plot.height));
        }
    }
}

/// Rewrite argv so `tsf` defaults to `tsf tui`.
///
/// Rules:
/// - `tsf`                      -> `tsf tui`
/// - `tsf -m finetune ...`      -> `tsf tui -m finetune ...`
/// - `tsf --help/--version/-h`  -> unchanged (show top-level help/version)
/// - `tsf -v run ...`           -> unchanged (leading verbosity flags are skipped)
fn rewrite_args(mut argv: Vec<String>) -> Vec<String> {
    // `-v` is global, so it may precede the subcommand.
    let first = argv
        .iter()
        .skip(1)
        .position(|arg| !is_verbosity_flag(arg))
        .map(|i| i + 1);

    let Some(first) = first else {
        argv.push("tui".to_string());
        return argv;
    };
    let arg1 = argv[first].clone();

    let is_top_level_help_or_version = matches!(
        arg1.as_str(),
        "-h" | "--help" | "-V" | "--version" | "help"
    );
    if is_top_level_help_or_version {
        return argv;
    }

    let is_subcommand = matches!(
        arg1.as_str(),
        "check" | "run" | "job" | "view" | "template" | "tui"
    );
    if is_subcommand {
        return argv;
    }

    // A leading flag is treated as "tui flags".
    if arg1.starts_with('-') {
        argv.insert(first, "tui".to_string());
        return argv;
    }

    argv
}

fn is_verbosity_flag(arg: &str) -> bool {
    arg == "--verbose" || (arg.len() > 1 && arg.starts_with('-') && arg[1..].bytes().all(|b| b == b'v'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn bare_invocation_opens_tui() {
        assert_eq!(rewrite_args(argv(&["tsf"])), argv(&["tsf", "tui"]));
        assert_eq!(
            rewrite_args(argv(&["tsf", "-m", "finetune"])),
            argv(&["tsf", "tui", "-m", "finetune"])
        );
    }

    #[test]
    fn leading_verbosity_flags_are_skipped() {
        let args = argv(&["tsf", "-v", "run", "in.md"]);
        assert_eq!(rewrite_args(args.clone()), args);
        let cli = crate::cli::Cli::try_parse_from(rewrite_args(args)).unwrap();
        assert_eq!(cli.verbose, 1);
        assert!(matches!(cli.command, Command::Run(_)));

        assert_eq!(
            rewrite_args(argv(&["tsf", "-vv", "-m", "finetune"])),
            argv(&["tsf", "-vv", "tui", "-m", "finetune"])
        );
        assert_eq!(rewrite_args(argv(&["tsf", "--verbose"])), argv(&["tsf", "--verbose", "tui"]));

        let cli = crate::cli::Cli::try_parse_from(rewrite_args(argv(&["tsf", "-vv", "-m", "finetune"]))).unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Command::Tui(_)));
    }

    #[test]
    fn subcommands_and_help_are_untouched() {
        for args in [
            vec!["tsf", "run", "in.md"],
            vec!["tsf", "--help"],
            vec!["tsf", "template"],
        ] {
            assert_eq!(rewrite_args(argv(&args)), argv(&args));
        }
    }
}
