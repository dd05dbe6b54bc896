use anyhow::Context;
use bridge::bridge::ProductBridge;
use bridge::model::BridgeModel;
use clap::Parser;
use seacore::calibration::JsonCalibrationStore;
use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::runtime::Builder as TokioBuilder;
use tokio::signal;
use workflow::config::WorkflowConfig;
use workflow::runner::Runner;

mod bridge;
mod generator;
mod workflow;

#[derive(Parser)]
#[command(author, version, about = "Runs spectrum-monitoring actions against a simulated sensor")]
struct Args {
    /// Load a workflow config from YAML instead of the built-in schedule
    #[arg(long)]
    workflow: Option<PathBuf>,
    /// Calibration table to read and update; overrides the workflow's entry
    #[arg(long)]
    calibration_file: Option<PathBuf>,
    /// Identifier of the first task in the schedule
    #[arg(long, default_value_t = 1)]
    task_id: u64,
    /// Write the full results as JSON to this path
    #[arg(long)]
    report: Option<PathBuf>,
    /// Serve results over HTTP until Ctrl+C
    #[arg(long, default_value_t = false)]
    serve: bool,
    #[arg(long, default_value = "127.0.0.1:9000")]
    bind: SocketAddr,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let workflow_config = match &args.workflow {
        Some(path) => WorkflowConfig::load(path)?,
        None => WorkflowConfig::demo(),
    };
    let store = match args
        .calibration_file
        .as_ref()
        .or(workflow_config.calibration_file.as_ref())
    {
        Some(path) => JsonCalibrationStore::load(path)
            .with_context(|| format!("loading calibration table {}", path.display()))?,
        None => JsonCalibrationStore::in_memory(),
    };

    let runner = Runner::new(workflow_config, store);
    let result = runner.execute(args.task_id)?;

    for outcome in &result.outcomes {
        let status = if outcome.succeeded { "ok" } else { "FAILED" };
        println!(
            "task {} [{}] {} -> {}",
            outcome.task_id, status, outcome.action, outcome.detail
        );
    }
    println!(
        "measurements {}, calibrations {}",
        result.measurements.len(),
        result.calibrations.len()
    );
    if let Some(path) = runner.store().path() {
        println!("calibration table {}", path.display());
    }

    if let Some(report_path) = &args.report {
        if let Some(parent) = report_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let report = serde_json::to_string_pretty(&result).context("serializing report")?;
        fs::write(report_path, report)
            .with_context(|| format!("writing report {}", report_path.display()))?;
    }

    if args.serve {
        let bridge = ProductBridge::new();
        bridge.publish(&BridgeModel::from(&result))?;
        bridge.start(args.bind)?;
        bridge.publish_status("HTTP bridge running (Ctrl+C to stop)...");
        let runtime = TokioBuilder::new_current_thread()
            .enable_all()
            .build()
            .context("creating runtime for signal handling")?;
        runtime.block_on(async {
            signal::ctrl_c().await.context("awaiting Ctrl+C to exit")?;
            Ok::<(), anyhow::Error>(())
        })?;
    }

    Ok(())
}
