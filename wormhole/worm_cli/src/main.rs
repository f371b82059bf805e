use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use futures::StreamExt;
use shared_event_bus::FileEventPublisher;
use shared_logging::LogLevel;
use tokio::runtime::Runtime;
use wormhole_simulationengine::{
    predict, AttemptStage, Outlook, ProgressSnapshot, RunEvent, RunOptions, ShaftConfig,
    ShaftSimulator, SimulationReportBuilder, SimulationTelemetry,
};

#[derive(Parser, Debug)]
#[command(name = "worm", version, about = "Worm-in-a-shaft escape simulator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Runs a simulation, printing every step.
    Run(RunArgs),
    /// Prints the predicted outcome without running.
    Predict(ShaftArgs),
}

/// Shaft parameters. Flags override the config file, which overrides defaults.
#[derive(Args, Debug, Default)]
struct ShaftArgs {
    /// JSON file with `depth`, `climbDistance`, `fallDistance`, `pauseTime`.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Shaft depth.
    #[arg(long)]
    depth: Option<f64>,
    /// Distance climbed per attempt.
    #[arg(long)]
    climb: Option<f64>,
    /// Distance lost after each attempt.
    #[arg(long)]
    fall: Option<f64>,
    /// Seconds between attempts.
    #[arg(long)]
    pause: Option<f64>,
}

#[derive(Args, Debug)]
struct RunArgs {
    #[command(flatten)]
    shaft: ShaftArgs,
    /// Stop after this many attempts.
    #[arg(long)]
    max_attempts: Option<u64>,
    /// JSON-lines log file.
    #[arg(long)]
    log_file: Option<PathBuf>,
    /// Include per-step records in the log file.
    #[arg(long)]
    verbose: bool,
    /// JSON-lines event file.
    #[arg(long)]
    event_log: Option<PathBuf>,
    /// Print the final report as JSON instead of text.
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => handle_run(args),
        Commands::Predict(args) => {
            let config = resolve_config(&args)?;
            println!("{}", describe_outlook(&config));
            Ok(())
        }
    }
}

fn resolve_config(args: &ShaftArgs) -> Result<ShaftConfig> {
    let mut config = match &args.config {
        Some(path) => ShaftConfig::from_path(path)?,
        None => ShaftConfig::default(),
    };
    if let Some(depth) = args.depth {
        config.depth = depth;
    }
    if let Some(climb) = args.climb {
        config.climb_distance = climb;
    }
    if let Some(fall) = args.fall {
        config.fall_distance = fall;
    }
    if let Some(pause) = args.pause {
        config.pause_time = pause;
    }
    anyhow::ensure!(config.depth > 0.0, "depth must be positive");
    anyhow::ensure!(config.fall_distance >= 0.0, "fall distance must not be negative");
    anyhow::ensure!(config.pause_time >= 0.0, "pause time must not be negative");
    Ok(config)
}

fn describe_outlook(config: &ShaftConfig) -> String {
    match predict(config) {
        Outlook::Escapes {
            attempts,
            halfway_attempt,
        } => {
            let halfway = halfway_attempt.map_or_else(
                || "never reaches halfway".to_string(),
                |n| format!("reaches halfway on attempt {n}"),
            );
            format!("escapes after {attempts} attempts, {halfway}")
        }
        Outlook::Stalls { reason } => format!("never escapes: {}", reason.describe()),
    }
}

fn build_telemetry(args: &RunArgs) -> Result<Option<SimulationTelemetry>> {
    if args.log_file.is_none() && args.event_log.is_none() {
        return Ok(None);
    }
    let level = if args.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };
    let mut builder = SimulationTelemetry::builder("worm").min_level(level);
    if let Some(path) = &args.log_file {
        builder = builder.log_path(path);
    }
    if let Some(path) = &args.event_log {
        let publisher = FileEventPublisher::new(path)
            .with_context(|| format!("cannot open event log {}", path.display()))?;
        builder = builder.event_publisher(Arc::new(publisher));
    }
    Ok(Some(builder.build()?))
}

fn render_step(config: &ShaftConfig, snapshot: &ProgressSnapshot) -> String {
    match snapshot.stage {
        AttemptStage::Climb => format!(
            "attempt {:>3}: climbed to {:.1} of {:.1}",
            snapshot.attempts, snapshot.position, config.depth
        ),
        AttemptStage::Halfway => format!(
            "attempt {:>3}: halfway there ({:.1})",
            snapshot.attempts,
            config.halfway_mark()
        ),
        AttemptStage::Fall => format!(
            "attempt {:>3}: slipped back to {:.1}",
            snapshot.attempts, snapshot.position
        ),
    }
}

fn handle_run(args: RunArgs) -> Result<()> {
    let config = resolve_config(&args.shaft)?;
    if let (Some(reason), None) = (config.risk(), args.max_attempts) {
        bail!(
            "this shaft never lets the worm out ({}); pass --max-attempts to run it anyway",
            reason.describe()
        );
    }

    let mut builder = ShaftSimulator::builder();
    if let Some(telemetry) = build_telemetry(&args)? {
        builder = builder.telemetry(telemetry);
    }
    let engine = builder.build();
    let mut options = RunOptions::default();
    if let Some(max) = args.max_attempts {
        options = options.with_max_attempts(max);
    }

    let runtime = Runtime::new()?;
    let (result, trace) = runtime.block_on(async {
        let mut events = engine.spawn(config, options);
        let mut trace = Vec::new();
        while let Some(event) = events.next().await {
            match event {
                RunEvent::Progress(snapshot) => {
                    if !args.json {
                        println!("{}", render_step(&config, &snapshot));
                    }
                    trace.push(snapshot);
                }
                RunEvent::Finished(result) => return Ok((result, trace)),
            }
        }
        bail!("simulation task stopped without a result")
    })?;

    let report = SimulationReportBuilder::new(&config, &result)
        .trace(trace)
        .build();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    if result.success {
        println!("The worm escaped the shaft!");
    }
    println!("{}", report.summary());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn flags_override_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("shaft.json");
        std::fs::write(&path, r#"{"depth": 30, "climbDistance": 6}"#).unwrap();
        let args = ShaftArgs {
            config: Some(path),
            fall: Some(2.0),
            ..ShaftArgs::default()
        };
        let config = resolve_config(&args).unwrap();
        assert_eq!(config, ShaftConfig::new(30.0, 6.0, 2.0, 1.0));
    }

    #[test]
    fn rejects_invalid_depth() {
        let args = ShaftArgs {
            depth: Some(0.0),
            ..ShaftArgs::default()
        };
        assert!(resolve_config(&args).is_err());
    }

    #[test]
    fn describes_outlooks() {
        assert_eq!(
            describe_outlook(&ShaftConfig::default()),
            "escapes after 9 attempts, reaches halfway on attempt 4"
        );
        assert!(describe_outlook(&ShaftConfig::new(10.0, 2.0, 5.0, 0.0)).starts_with("never"));
    }

    #[test]
    fn renders_steps() {
        let config = ShaftConfig::default();
        let line = render_step(
            &config,
            &ProgressSnapshot {
                stage: AttemptStage::Fall,
                position: -1.5,
                attempts: 12,
                reached_halfway: false,
            },
        );
        assert_eq!(line, "attempt  12: slipped back to -1.5");
    }

    #[test]
    fn cli_parses_run_flags() {
        let cli = Cli::try_parse_from([
            "worm",
            "run",
            "--depth",
            "10",
            "--climb",
            "2",
            "--fall",
            "5",
            "--max-attempts",
            "20",
            "--json",
        ])
        .unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.max_attempts, Some(20));
        assert!(args.json);
        assert_eq!(resolve_config(&args.shaft).unwrap().fall_distance, 5.0);
    }
}
