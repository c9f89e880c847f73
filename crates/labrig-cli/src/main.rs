//! labrig CLI
//!
//! Commands:
//! - `labrig run <experiment.toml>` - Run the configured pipeline and print its report
//! - `labrig prepare <experiment.toml>` - Bring the data store and backend up
//! - `labrig teardown <experiment.toml>` - Stop the backend, then the data store
//! - `labrig exec -- <command>` - Run one shell command under a hard timeout
//! - `labrig forward <experiment.toml> <events.jsonl>` - Replay telemetry events to the collector

mod experiment;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use labrig_core::logging::level_for;
use labrig_core::{init_tracing, CommandExecutor, DatabasePreparer, ProcessRunner};
use labrig_dispatch::{Dispatcher, HttpSink, StatsSnapshot, TelemetryEvent};
use labrig_pipeline::{Pipeline, PipelineReport, StageFactory, StageServices};

use crate::experiment::ExperimentFile;

#[derive(Parser)]
#[command(name = "labrig")]
#[command(author = "Labrig Contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Reproducible experiment runs against a supervised backend", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline described by an experiment file
    Run {
        /// Experiment file (TOML)
        config: PathBuf,

        /// Override the working directory from the file
        #[arg(long)]
        work_dir: Option<PathBuf>,

        /// Override the revision from the file
        #[arg(long)]
        revision: Option<String>,
    },

    /// Start the data store and the backend
    Prepare {
        /// Experiment file (TOML)
        config: PathBuf,
    },

    /// Stop the backend, then the data store
    Teardown {
        /// Experiment file (TOML)
        config: PathBuf,
    },

    /// Run a shell command and print its outcome as JSON
    Exec {
        /// Hard timeout in seconds
        #[arg(long, default_value = "600")]
        timeout: u64,

        /// Directory to run in
        #[arg(long)]
        cwd: Option<PathBuf>,

        /// Do not echo output lines while they stream
        #[arg(short, long)]
        quiet: bool,

        /// The command and its arguments
        #[arg(trailing_var_arg = true, required = true)]
        command: Vec<String>,
    },

    /// Forward a JSON-lines file of telemetry events to the collector
    Forward {
        /// Experiment file (TOML); only `[dispatcher]` is read
        config: PathBuf,

        /// One JSON event per line
        events: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json, level_for(cli.verbose));

    match cli.command {
        Commands::Run {
            config,
            work_dir,
            revision,
        } => {
            let report = cmd_run(&config, work_dir, revision).await?;
            print_json(&report)
        }
        Commands::Prepare { config } => cmd_prepare(&config).await,
        Commands::Teardown { config } => cmd_teardown(&config).await,
        Commands::Exec {
            timeout,
            cwd,
            quiet,
            command,
        } => cmd_exec(&command, cwd.as_deref(), timeout, quiet).await,
        Commands::Forward { config, events } => {
            let stats = cmd_forward(&config, &events).await?;
            print_json(&stats)
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn preparer_for(file: &ExperimentFile, executor: Arc<dyn CommandExecutor>) -> DatabasePreparer {
    DatabasePreparer::from_settings(file.datastore.clone(), file.backend.clone(), executor)
}

async fn cmd_run(
    config: &Path,
    work_dir: Option<PathBuf>,
    revision: Option<String>,
) -> Result<PipelineReport> {
    let file = ExperimentFile::load(config)?;

    let executor: Arc<dyn CommandExecutor> = Arc::new(ProcessRunner::new());
    let preparer = Arc::new(preparer_for(&file, executor.clone()));
    let factory = StageFactory::new(StageServices::new(executor).with_preparer(preparer));
    let pipeline =
        Pipeline::from_spec(&file.pipeline, &factory).context("Failed to build pipeline")?;

    let mut ctx = file.context.to_context();
    if let Some(dir) = work_dir {
        ctx = ctx.with_work_dir(dir);
    }
    if let Some(rev) = revision {
        ctx = ctx.with_revision(rev);
    }

    info!(
        run_id = %ctx.run_id(),
        modules = pipeline.modules().len(),
        "Starting run"
    );
    let report = pipeline.run(&mut ctx).await.context("Pipeline failed")?;
    info!(
        run_id = %report.run_id,
        stages = report.stage_count(),
        duration_ms = report.duration_ms,
        "Run finished"
    );
    Ok(report)
}

async fn cmd_prepare(config: &Path) -> Result<()> {
    let file = ExperimentFile::load(config)?;
    let preparer = preparer_for(&file, Arc::new(ProcessRunner::new()));

    let start = preparer
        .prepare()
        .await
        .context("Failed to prepare services")?;
    println!("{start:?}");
    Ok(())
}

async fn cmd_teardown(config: &Path) -> Result<()> {
    let file = ExperimentFile::load(config)?;
    let preparer = preparer_for(&file, Arc::new(ProcessRunner::new()));

    let stop = preparer
        .teardown()
        .await
        .context("Failed to tear down services")?;
    println!("{stop:?}");
    Ok(())
}

async fn cmd_exec(command: &[String], cwd: Option<&Path>, timeout: u64, quiet: bool) -> Result<()> {
    let runner = ProcessRunner::new().with_echo(!quiet);
    let line = command.join(" ");

    let outcome = runner
        .run(&line, cwd, timeout)
        .await
        .with_context(|| format!("Failed to run `{line}`"))?;
    print_json(&outcome)?;

    if !outcome.succeeded() {
        std::process::exit(outcome.exit_code.clamp(1, 255));
    }
    Ok(())
}

async fn cmd_forward(config: &Path, events: &Path) -> Result<StatsSnapshot> {
    let file = ExperimentFile::load(config)?;
    let raw = tokio::fs::read_to_string(events)
        .await
        .with_context(|| format!("Failed to read {}", events.display()))?;

    let mut parsed = Vec::new();
    for (index, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let event: TelemetryEvent = serde_json::from_str(line)
            .with_context(|| format!("Invalid event on line {}", index + 1))?;
        parsed.push(event);
    }

    let sink = HttpSink::from_settings(&file.dispatcher).context("Failed to build HTTP sink")?;
    let dispatcher = Dispatcher::start(file.dispatcher.clone(), Arc::new(sink));
    info!(events = parsed.len(), endpoint = %file.dispatcher.endpoint, "Forwarding events");

    for event in parsed {
        if !dispatcher.submit(event) {
            warn!("Event dropped: queue full");
        }
    }

    dispatcher.shutdown().await;
    Ok(dispatcher.stats())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn experiment(body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_cli_parses_exec_trailing_command() {
        let cli = Cli::try_parse_from([
            "labrig", "exec", "--timeout", "5", "--", "echo", "-n", "hi",
        ])
        .unwrap();
        match cli.command {
            Commands::Exec {
                timeout, command, ..
            } => {
                assert_eq!(timeout, 5);
                assert_eq!(command, vec!["echo", "-n", "hi"]);
            }
            _ => panic!("expected exec"),
        }
    }

    #[test]
    fn test_cli_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["labrig", "run", "lab.toml", "--json", "-v"]).unwrap();
        assert!(cli.json);
        assert!(cli.verbose);
    }

    #[test]
    fn test_teardown_help_names_both_services() {
        use clap::CommandFactory;

        let cli = Cli::command();
        let about = cli
            .find_subcommand("teardown")
            .and_then(|c| c.get_about())
            .map(|a| a.to_string())
            .unwrap();
        assert!(about.contains("backend"));
        assert!(about.contains("data store"));
    }

    #[test]
    fn test_cli_exec_requires_command() {
        assert!(Cli::try_parse_from(["labrig", "exec"]).is_err());
    }

    #[tokio::test]
    async fn test_cmd_run_shell_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let file = experiment(
            r#"
[[pipeline.modules]]
name = "smoke"
repetitions = 2

[[pipeline.modules.main]]
kind = "shell"
params = { command = "echo tick >> ticks.txt" }
"#,
        );

        let report = cmd_run(file.path(), Some(dir.path().to_path_buf()), None)
            .await
            .unwrap();
        assert_eq!(report.stage_count(), 2);

        let ticks = std::fs::read_to_string(dir.path().join("ticks.txt")).unwrap();
        assert_eq!(ticks.lines().count(), 2);
    }

    #[tokio::test]
    async fn test_cmd_run_surfaces_stage_failure() {
        let dir = tempfile::tempdir().unwrap();
        let file = experiment(
            r#"
[[pipeline.modules]]
name = "broken"

[[pipeline.modules.main]]
kind = "shell"
params = { command = "exit 3" }
"#,
        );

        let err = cmd_run(file.path(), Some(dir.path().to_path_buf()), None)
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("Pipeline failed"));
    }

    #[tokio::test]
    async fn test_cmd_run_rejects_unknown_stage_kind() {
        let file = experiment(
            r#"
[[pipeline.modules]]
name = "typo"

[[pipeline.modules.main]]
kind = "shel"
"#,
        );

        let err = cmd_run(file.path(), None, None).await.unwrap_err();
        assert!(format!("{err:#}").contains("Failed to build pipeline"));
    }

    #[tokio::test]
    async fn test_cmd_forward_rejects_bad_event_line() {
        let file = experiment("[dispatcher]\nendpoint = \"http://127.0.0.1:9/events\"\n");
        let events = experiment("{\"not\": \"an event\"}\n");

        let err = cmd_forward(file.path(), events.path()).await.unwrap_err();
        assert!(format!("{err:#}").contains("line 1"));
    }
}
