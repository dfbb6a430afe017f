//! # printforge server application
//!
//! Wires configuration, logging, and the orchestrator facade together and
//! exposes the tool surface over stdio: one JSON request per line in, one
//! JSON response per line out. Probe subcommands check each external
//! collaborator (printer, slicer, camera) independently.
//!
//! ## Usage
//!
//! ```bash
//! # Serve the tool surface on stdin/stdout
//! printforge serve
//!
//! # Probe the collaborators
//! printforge check-printer
//! printforge check-slicer
//! printforge check-camera
//! ```

use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use config_types::Config;
use printforge_server::{requests, Facade};

/// Print-lifecycle orchestration server
#[derive(Parser, Debug)]
#[command(name = "printforge")]
#[command(version)]
#[command(about = "Drives an FDM printer from description to finished print", long_about = None)]
struct Cli {
    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the tool surface over stdin/stdout
    Serve,

    /// Check the printer broker connection
    CheckPrinter,

    /// Check the slicer CLI installation
    CheckSlicer,

    /// Check the camera stream
    CheckCamera,
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = Config::from_env();
    if let Err(e) = config.validate() {
        error!("invalid configuration: {e}");
        return ExitCode::FAILURE;
    }

    let result = match cli.command {
        Commands::Serve => serve(config).await,
        Commands::CheckPrinter => check_printer(config).await,
        Commands::CheckSlicer => check_slicer(config).await,
        Commands::CheckCamera => check_camera(config).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:?}");
            ExitCode::FAILURE
        }
    }
}

/// Serves newline-delimited JSON tool requests until stdin closes or ctrl-c.
async fn serve(config: Config) -> Result<()> {
    let facade = Facade::new(config)
        .await
        .context("failed to initialize components")?;

    info!("printforge v{} serving on stdio", env!("CARGO_PKG_VERSION"));

    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    let mut lines = stdin.lines();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("stdin read failed")?,
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
        };
        let Some(line) = line else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let response = dispatch(&facade, &line).await;
        stdout.write_all(response.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }

    Ok(())
}

/// Routes one request line to the facade.
///
/// Request shape: `{"tool": "<name>", "input": {...}}`.
async fn dispatch(facade: &Facade, line: &str) -> String {
    let request: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(e) => return json!({ "error": format!("invalid request: {e}") }).to_string(),
    };

    let Some(tool) = request.get("tool").and_then(Value::as_str) else {
        return json!({ "error": "request is missing 'tool'" }).to_string();
    };
    let input = request.get("input").cloned().unwrap_or(json!({}));

    // One arm per tool; input deserialization errors surface in-band
    macro_rules! call {
        ($type:ty, $call:expr) => {
            match serde_json::from_value::<$type>(input) {
                Ok(input) => $call(input).await,
                Err(e) => json!({ "error": format!("invalid input: {e}") }).to_string(),
            }
        };
        (sync $type:ty, $call:expr) => {
            match serde_json::from_value::<$type>(input) {
                Ok(input) => $call(input),
                Err(e) => json!({ "error": format!("invalid input: {e}") }).to_string(),
            }
        };
    }

    match tool {
        "parse_description" => {
            call!(sync requests::ParseDescription, |i| facade.parse_description(i))
        }
        "suggest_materials" => {
            call!(sync requests::SuggestMaterials, |i| facade.suggest_materials(i))
        }
        "recommend_nozzle" => {
            call!(sync requests::RecommendNozzle, |i| facade.recommend_nozzle(i))
        }
        "optimize_parameters" => {
            call!(sync requests::OptimizeParameters, |i| facade.optimize_parameters(i))
        }
        "plan_scale" => call!(sync requests::PlanScale, |i| facade.plan_scale(i)),
        "start_workflow" => call!(requests::StartWorkflow, |i| facade.start_workflow(i)),
        "workflow_status" => call!(requests::WorkflowId, |i| facade.workflow_status(i)),
        "approve_checkpoint" => {
            call!(requests::ApproveCheckpoint, |i| facade.approve_checkpoint(i))
        }
        "slice_model" => call!(requests::SliceModel, |i| facade.slice_model(i)),
        "printer_connect" => facade.printer_connect().await,
        "printer_status" => facade.printer_status().await,
        "printer_control" => call!(requests::PrinterControl, |i| facade.printer_control(i)),
        "submit_print" => call!(requests::SubmitPrint, |i| facade.submit_print(i)),
        "capture_frame" => call!(requests::CaptureFrame, |i| facade.capture_frame(i)),
        "analyze_frame" => call!(requests::AnalyzeFrame, |i| facade.analyze_frame(i)),
        "monitor_print" => call!(requests::MonitorPrint, |i| facade.monitor_print(i)),
        "create_iteration" => call!(requests::CreateIteration, |i| facade.create_iteration(i)),
        "list_iterations" => call!(requests::ListIterations, |i| facade.list_iterations(i)),
        "iteration_statistics" => {
            call!(requests::ModelName, |i| facade.iteration_statistics(i))
        }
        "record_outcome" => call!(requests::RecordOutcome, |i| facade.record_outcome(i)),
        "recommend_adjustments" => {
            call!(requests::RecommendAdjustments, |i| facade.recommend_adjustments(i))
        }
        other => json!({ "error": format!("unknown tool '{other}'") }).to_string(),
    }
}

/// Probes the printer broker.
async fn check_printer(config: Config) -> Result<()> {
    config.printer.validate()?;

    let mut controller = printforge_printer::PrintController::new(&config.printer);
    match controller.connect(Some(Duration::from_secs(10))).await? {
        true => {
            info!("printer reachable at {}", config.printer.ip_address);
            if let Some(status) = controller.refresh_status().await {
                println!("{}", status.summary());
            } else {
                warn!("connected but no status report arrived");
            }
            controller.disconnect().await;
            Ok(())
        }
        false => anyhow::bail!(
            "could not reach the printer at {}; check IP and access code",
            config.printer.ip_address
        ),
    }
}

/// Probes the slicer CLI.
async fn check_slicer(config: Config) -> Result<()> {
    let slicer = printforge_slicer::SlicerInvocation::new(&config.slicer);
    let (available, message) = slicer.is_available().await;
    if available {
        info!("{message}");
        println!("{message}");
        Ok(())
    } else {
        anyhow::bail!(message)
    }
}

/// Probes the camera stream with a single capture.
async fn check_camera(config: Config) -> Result<()> {
    config.printer.validate()?;

    let endpoint =
        printforge_vision::CameraEndpoint::from_config(&config.printer, &config.camera);
    let mut session = printforge_vision::CameraSession::from_endpoint(endpoint);

    if !session.open(Duration::from_secs(10)).await {
        anyhow::bail!("camera stream is not reachable");
    }
    match session.capture_one().await {
        Some(frame) => {
            println!(
                "captured frame {} ({}x{})",
                frame.frame_number, frame.width, frame.height
            );
            session.close().await;
            Ok(())
        }
        None => anyhow::bail!("camera opened but no frame arrived"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from(["printforge", "-vv", "serve"]);
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Commands::Serve));

        let cli = Cli::parse_from(["printforge", "check-slicer"]);
        assert!(matches!(cli.command, Commands::CheckSlicer));
    }

    #[tokio::test]
    async fn test_dispatch_rejects_malformed_requests() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.database_path = dir.path().join("prints.db");
        let facade = Facade::new(config).await.unwrap();

        let response = dispatch(&facade, "not json").await;
        assert!(response.contains("error"));

        let response = dispatch(&facade, r#"{"input": {}}"#).await;
        assert!(response.contains("missing 'tool'"));

        let response = dispatch(&facade, r#"{"tool": "time_travel", "input": {}}"#).await;
        assert!(response.contains("unknown tool"));
    }

    #[tokio::test]
    async fn test_dispatch_routes_to_facade() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.database_path = dir.path().join("prints.db");
        let facade = Facade::new(config).await.unwrap();

        let response = dispatch(
            &facade,
            r#"{"tool": "parse_description", "input": {"description": "a 65mm diameter hook"}}"#,
        )
        .await;
        let value: Value = serde_json::from_str(&response).unwrap();
        assert_eq!(value["dimensions"]["diameter"], 65.0);

        let response = dispatch(
            &facade,
            r#"{"tool": "suggest_materials", "input": {"waterproof": true}}"#,
        )
        .await;
        let value: Value = serde_json::from_str(&response).unwrap();
        assert!(value.as_array().unwrap().len() > 0);
    }
}
