// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod runs;
pub mod sink;

use toml::Value;
use tracing::{info, warn};

use crate::cli::CliArgs;
use crate::config::{load_and_validate, BatchConfig};
use crate::engine::{BatchReport, ExecutionController, PlannedRun};
use crate::errors::Result;
use crate::runs::{Parameters, Run};
use crate::sink::StreamSinkFactory;

pub use crate::engine::{BatchHandle, ControllerState, StopHandle};
pub use crate::errors::BatchError;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - batch file loading and CLI overrides
/// - run staging and filtering
/// - the execution controller
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = load_and_validate(&args.config)?;
    let controller = build_controller(cfg, &args)?;

    if args.dry_run {
        print_dry_run(&controller, &args.run_numbers)?;
        return Ok(());
    }

    // Ctrl-C -> stop(): children run in their own process groups, so the
    // terminal's SIGINT only reaches us.
    let ctrl_c = {
        let stop = controller.stop_handle();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl+C");
                return;
            }
            info!("Ctrl+C received; stopping batch");
            stop.stop();
        })
    };

    let outcome = controller.run(&args.run_numbers).await;
    ctrl_c.abort();

    if let Some(report) = outcome? {
        print_summary(&report);
    }
    Ok(())
}

/// Apply CLI overrides and the sink choice, stage the configured runs and
/// apply `--filter`.
pub fn build_controller(cfg: BatchConfig, args: &CliArgs) -> Result<ExecutionController> {
    let BatchConfig {
        parameters,
        command,
        runs,
    } = cfg;

    let parameters = Parameters::overlay(&parameters, cli_overrides(args));
    let mut controller = ExecutionController::new(parameters, command)?;
    if args.stream {
        controller = controller.with_sinks(StreamSinkFactory);
    }
    controller.stage(runs)?;

    if !args.filters.is_empty() {
        let selected: Vec<Run> = controller
            .get_runs(&args.filters, !args.match_all)
            .into_iter()
            .cloned()
            .collect();
        let dropped: Vec<Run> = controller
            .registry()
            .iter()
            .filter(|run| !selected.contains(run))
            .cloned()
            .collect();
        info!(
            kept = selected.len(),
            dropped = dropped.len(),
            filters = ?args.filters,
            "applied run filter"
        );
        controller.remove_runs(&dropped);
    }

    Ok(controller)
}

fn cli_overrides(args: &CliArgs) -> Vec<(String, Value)> {
    let mut overrides = Vec::new();
    if let Some(n) = args.async_runs {
        overrides.push(("async_runs".to_string(), Value::Integer(i64::from(n))));
    }
    if let Some(dir) = &args.output_dir {
        overrides.push((
            "output_dir".to_string(),
            Value::String(dir.to_string_lossy().into_owned()),
        ));
    }
    overrides
}

/// Print the planned command lines without spawning anything.
fn print_dry_run(controller: &ExecutionController, run_numbers: &[String]) -> Result<()> {
    let plan: Vec<PlannedRun> = controller.plan(run_numbers)?;

    println!("batchrun dry-run");
    println!("  parameters = {}", controller.parameters());
    println!(
        "  async_runs = {}",
        controller.parameters().async_runs()?
    );
    println!();

    println!("planned runs ({}):", plan.len());
    for planned in &plan {
        println!("  - {}", planned.label);
        println!("      command: {}", planned.argv.join(" "));
    }

    Ok(())
}

fn print_summary(report: &BatchReport) {
    println!(
        "batchrun: {} planned, {} succeeded, {} cancelled, {} not started",
        report.planned,
        report.succeeded,
        report.cancelled,
        report.skipped()
    );
}
