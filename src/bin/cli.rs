use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use testing_flows::prelude::*;
use testing_flows::workflow::action::unroutable_steps;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "testing-flows")]
#[command(about = "Run declarative test flows", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single flow file
    Run {
        /// Path to the flow YAML or JSON file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Parameter override, `key=value` (value parsed as JSON when possible)
        #[arg(short, long = "param", value_name = "KEY=VALUE")]
        params: Vec<String>,

        /// YAML or JSON mapping of parameter overrides
        #[arg(long, value_name = "FILE")]
        params_file: Option<PathBuf>,

        /// Path to runner.yaml backend config
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Run every flow in a directory, one after another
    RunDir {
        /// Path to the flows directory
        #[arg(value_name = "DIR")]
        dir: PathBuf,

        /// Path to runner.yaml config file (default: <DIR>/runner.yaml)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Stop on first failure
        #[arg(short, long)]
        fail_fast: bool,
    },

    /// List flows in a directory
    List {
        /// Path to the flows directory
        #[arg(value_name = "DIR")]
        dir: PathBuf,
    },

    /// Validate flow files without running them
    Validate {
        /// Path to flow file or directory
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        "testing_flows=debug"
    } else {
        "testing_flows=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            tracing::error!(error = %e, "Runner failed");
            eprintln!("Error: {:#}", e);
            ExitCode::from(2)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<bool> {
    match cli.command {
        Commands::Run {
            file,
            params,
            params_file,
            config,
        } => run_single(file, params, params_file, config).await,
        Commands::RunDir {
            dir,
            config,
            fail_fast,
        } => run_directory(dir, config, fail_fast).await,
        Commands::List { dir } => list_workflows(dir),
        Commands::Validate { path } => validate(path),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<RunnerConfig> {
    match path {
        Some(path) => RunnerConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(RunnerConfig::default()),
    }
}

/// Overrides from `--params-file` first, then each `--param`
fn parse_overrides(params: &[String], params_file: Option<&Path>) -> anyhow::Result<ParamStore> {
    let mut store = ParamStore::new();

    if let Some(path) = params_file {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read params file {}", path.display()))?;
        let values: Map<String, Value> = serde_yaml::from_str(&content)
            .with_context(|| format!("Params file {} is not a mapping", path.display()))?;
        store.merge(&ParamStore::from(values));
    }

    for param in params {
        let (key, raw) = param
            .split_once('=')
            .with_context(|| format!("Invalid --param '{}', expected key=value", param))?;
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        store.insert(key.trim(), value);
    }

    Ok(store)
}

async fn run_single(
    file: PathBuf,
    params: Vec<String>,
    params_file: Option<PathBuf>,
    config: Option<PathBuf>,
) -> anyhow::Result<bool> {
    if !file.exists() {
        anyhow::bail!("Flow file not found: {}", file.display());
    }

    let workflow = WorkflowLoader::load_file(&file)?;
    let overrides = parse_overrides(&params, params_file.as_deref())?;
    let executor = Executor::with_config(load_config(config.as_deref())?)?;

    match executor.run(&workflow, Some(&overrides)).await {
        Ok(outcome) => {
            println!("{}", serde_json::to_string_pretty(&outcome.into_value())?);
            Ok(true)
        }
        Err(e) => {
            eprintln!("✗ {}: {}", workflow.display_name(), e);
            Ok(false)
        }
    }
}

#[tracing::instrument(fields(flows_dir = %dir.display()))]
async fn run_directory(
    dir: PathBuf,
    config_path: Option<PathBuf>,
    fail_fast: bool,
) -> anyhow::Result<bool> {
    if !dir.exists() {
        tracing::error!(path = %dir.display(), "Directory not found");
        anyhow::bail!("Directory not found: {}", dir.display());
    }

    println!("Running flows from: {}\n", dir.display());

    let config_file = config_path.unwrap_or_else(|| dir.join("runner.yaml"));
    let config = if config_file.exists() {
        println!("Using config: {}\n", config_file.display());
        load_config(Some(&config_file))?
    } else {
        RunnerConfig::default()
    };

    let workflows = WorkflowLoader::load_directory(&dir)?;
    let executor = Executor::with_config(config)?;

    let mut passed = 0;
    let mut failed = 0;
    for (path, workflow) in &workflows {
        match executor.run(workflow, None).await {
            Ok(_) => {
                passed += 1;
                println!("  ✓ {}", workflow.display_name());
            }
            Err(e) => {
                failed += 1;
                println!("  ✗ {} ({})", workflow.display_name(), path.display());
                println!("      Error: {}", e);
                if fail_fast {
                    break;
                }
            }
        }
    }

    let skipped = workflows.len() - passed - failed;
    println!("\n=== Results ===\n");
    println!("Overall: {}", if failed == 0 { "PASS" } else { "FAIL" });
    println!("Passed: {}, Failed: {}, Skipped: {}", passed, failed, skipped);

    Ok(failed == 0)
}

fn list_workflows(dir: PathBuf) -> anyhow::Result<bool> {
    if !dir.exists() {
        anyhow::bail!("Directory not found: {}", dir.display());
    }

    let workflows = WorkflowLoader::load_directory(&dir)?;

    if workflows.is_empty() {
        println!("No flows found in: {}", dir.display());
        return Ok(true);
    }

    println!("Flows in {}:\n", dir.display());
    for (path, workflow) in &workflows {
        let file = path.file_name().map(|f| f.to_string_lossy()).unwrap_or_default();
        println!(
            "  {} ({} steps) [{}]",
            workflow.display_name(),
            workflow.steps.len(),
            file
        );
    }

    Ok(true)
}

fn validate(path: PathBuf) -> anyhow::Result<bool> {
    if !path.exists() {
        anyhow::bail!("Path not found: {}", path.display());
    }

    let workflows = if path.is_dir() {
        WorkflowLoader::load_directory(&path)?
    } else {
        vec![(path.clone(), WorkflowLoader::load_file(&path)?)]
    };

    if workflows.is_empty() {
        println!("No flows found in: {}", path.display());
        return Ok(true);
    }

    let mut valid = true;
    for (file, workflow) in &workflows {
        let problems = unroutable_steps(workflow);
        if problems.is_empty() {
            println!("✓ {} is valid", file.display());
            continue;
        }

        valid = false;
        println!("✗ {}", file.display());
        for (index, error) in problems {
            println!("      step {}: {}", index + 1, error);
        }
    }

    Ok(valid)
}
