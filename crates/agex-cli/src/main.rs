//! AGEX - Agentic Executor CLI
//!
//! The `agex` command plans and runs agent tasks, executes code fragments in
//! the sandbox, and replays stored results.
//!
//! ## Commands
//!
//! - `run`: plan and execute a task
//! - `exec`: run a code fragment or file in the sandbox
//! - `plan`: print the plan for a task without executing it
//! - `tools`: print the registered tool schemas
//! - `replay`: verify and print a stored result

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::{info, Level};

use agex_core::obs::TaskSpan;
use agex_core::{
    read_result_artifact, write_result_artifact, AgenticExecutor, CodeSandbox, ExecutionMode,
    ExecutorConfig, Interpreter, Params,
};

#[derive(Parser)]
#[command(name = "agex")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Agentic Executor: dependency-ordered tool and sandbox execution", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Executor configuration file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Iteration ceiling of the orchestration loop
    #[arg(long, global = true, env = "AGEX_MAX_STEPS")]
    max_steps: Option<u32>,

    /// Sandbox wall-clock limit in milliseconds
    #[arg(long, global = true, env = "AGEX_SANDBOX_TIMEOUT_MS")]
    sandbox_timeout_ms: Option<u64>,

    /// Dispatch each ready set concurrently
    #[arg(long, global = true)]
    parallel: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Plan and execute a task
    Run {
        /// Task description
        task: String,

        /// Context entries passed to the planner
        #[arg(short = 'c', long = "context", value_parser = parse_key_value)]
        context: Vec<(String, String)>,

        /// Print the full result as JSON instead of the summary
        #[arg(long)]
        output_json: bool,

        /// Persist the result under this directory
        #[arg(long)]
        artifact_dir: Option<PathBuf>,
    },

    /// Run a code fragment in the sandbox
    Exec {
        /// File to execute
        #[arg(conflicts_with = "code", required_unless_present = "code")]
        file: Option<PathBuf>,

        /// Inline source to execute
        #[arg(long)]
        code: Option<String>,

        /// Override the sandbox timeout for this run
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Use the POSIX shell interpreter instead of Python
        #[arg(long)]
        shell: bool,
    },

    /// Print the plan for a task without executing it
    Plan {
        /// Task description
        task: String,

        /// Context entries passed to the planner
        #[arg(short = 'c', long = "context", value_parser = parse_key_value)]
        context: Vec<(String, String)>,
    },

    /// Print the registered tool schemas as JSON
    Tools,

    /// Verify and print a stored result
    Replay {
        /// Run ID to replay
        run_id: String,

        /// Root directory containing stored results
        #[arg(long, default_value = ".agex/runs")]
        artifact_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    agex_core::telemetry::init_tracing(cli.json, level);

    let config = load_config(
        cli.config.as_deref(),
        cli.max_steps,
        cli.sandbox_timeout_ms,
        cli.parallel,
    )?;

    match cli.command {
        Commands::Run {
            task,
            context,
            output_json,
            artifact_dir,
        } => cmd_run(config, &task, context, output_json, artifact_dir.as_deref()).await,
        Commands::Exec {
            file,
            code,
            timeout_ms,
            shell,
        } => cmd_exec(config, file.as_deref(), code.as_deref(), timeout_ms, shell).await,
        Commands::Plan { task, context } => cmd_plan(config, &task, context),
        Commands::Tools => cmd_tools(config),
        Commands::Replay {
            run_id,
            artifact_dir,
        } => cmd_replay(&run_id, &artifact_dir),
    }
}

/// Parse a `key=value` context entry.
fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in '{raw}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

fn context_params(entries: Vec<(String, String)>) -> Params {
    entries
        .into_iter()
        .map(|(k, v)| (k, Value::String(v)))
        .collect()
}

/// Config file (or defaults) with command-line overrides applied.
fn load_config(
    path: Option<&Path>,
    max_steps: Option<u32>,
    sandbox_timeout_ms: Option<u64>,
    parallel: bool,
) -> Result<ExecutorConfig> {
    let mut config = match path {
        Some(path) => ExecutorConfig::from_json_file(path)
            .with_context(|| format!("Failed to load config from {:?}", path))?,
        None => ExecutorConfig::default(),
    };
    if let Some(max_steps) = max_steps {
        config.max_steps = max_steps;
    }
    if let Some(timeout_ms) = sandbox_timeout_ms {
        config.sandbox.timeout_ms = timeout_ms;
    }
    if parallel {
        config.mode = ExecutionMode::Parallel;
    }
    config.validate().context("Invalid executor configuration")?;
    Ok(config)
}

async fn cmd_run(
    config: ExecutorConfig,
    task: &str,
    context: Vec<(String, String)>,
    output_json: bool,
    artifact_dir: Option<&Path>,
) -> Result<()> {
    let executor = AgenticExecutor::from_config(config);
    let result = executor.execute(task, context_params(context)).await;

    if output_json {
        println!(
            "{}",
            serde_json::to_string_pretty(&result).context("Failed to serialize result")?
        );
    } else {
        println!("{}", result.summary());
    }

    if let Some(dir) = artifact_dir {
        let path = write_result_artifact(&result, dir)
            .with_context(|| format!("Failed to write result artifact under {:?}", dir))?;
        info!(path = %path.display(), "result artifact written");
    }

    if !result.success {
        anyhow::bail!("Task did not succeed ({})", result.outcome);
    }
    Ok(())
}

async fn cmd_exec(
    mut config: ExecutorConfig,
    file: Option<&Path>,
    code: Option<&str>,
    timeout_ms: Option<u64>,
    shell: bool,
) -> Result<()> {
    if let Some(timeout_ms) = timeout_ms {
        config.sandbox.timeout_ms = timeout_ms;
    }
    if shell {
        config.sandbox.interpreter = Interpreter::shell();
    }

    let sandbox =
        CodeSandbox::acquire(config.sandbox).context("Failed to prepare the sandbox")?;
    let result = match (file, code) {
        (_, Some(code)) => sandbox.execute(code).await,
        (Some(file), None) => sandbox.execute_file(file).await,
        (None, None) => anyhow::bail!("Either a file or --code is required"),
    };
    sandbox.release();

    if !result.stdout.is_empty() {
        print!("{}", result.stdout);
    }
    if !result.stderr.is_empty() {
        eprint!("{}", result.stderr);
    }
    eprintln!(
        "[{}] {:.3}s",
        result.status,
        result.execution_time.as_secs_f64()
    );

    if !result.is_success() {
        anyhow::bail!("Sandbox execution finished with status {}", result.status);
    }
    Ok(())
}

fn cmd_plan(config: ExecutorConfig, task: &str, context: Vec<(String, String)>) -> Result<()> {
    let executor = AgenticExecutor::from_config(config);
    let plan = executor
        .plan(task, &context_params(context))
        .context("Failed to plan task")?;
    println!("{}", plan.summary());
    Ok(())
}

fn cmd_tools(config: ExecutorConfig) -> Result<()> {
    let executor = AgenticExecutor::from_config(config);
    let schemas = executor.registry().schemas();
    println!(
        "{}",
        serde_json::to_string_pretty(&schemas).context("Failed to serialize tool schemas")?
    );
    Ok(())
}

fn cmd_replay(run_id: &str, artifact_dir: &Path) -> Result<()> {
    let _span = TaskSpan::enter(run_id, "replay");
    let result = read_result_artifact(run_id, artifact_dir)
        .with_context(|| format!("Failed to replay run {run_id} from {:?}", artifact_dir))?;
    println!("{}", result.summary());
    println!("Replay digest verified for run {}", result.run_id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_run_with_context() {
        let cli = Cli::try_parse_from([
            "agex", "--parallel", "run", "read file", "-c", "path=a.txt", "-c", "x=1=2",
        ])
        .unwrap();
        assert!(cli.parallel);
        match cli.command {
            Commands::Run { task, context, .. } => {
                assert_eq!(task, "read file");
                assert_eq!(
                    context,
                    vec![
                        ("path".to_string(), "a.txt".to_string()),
                        ("x".to_string(), "1=2".to_string())
                    ]
                );
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_parse_key_value_rejects_missing_equals() {
        assert!(parse_key_value("novalue").is_err());
        assert!(parse_key_value("=v").is_err());
    }

    #[test]
    fn test_exec_requires_file_or_code() {
        assert!(Cli::try_parse_from(["agex", "exec"]).is_err());
        assert!(Cli::try_parse_from(["agex", "exec", "--code", "print(1)"]).is_ok());
    }

    #[test]
    fn test_load_config_overrides() {
        let config = load_config(None, Some(3), Some(900), true).unwrap();
        assert_eq!(config.max_steps, 3);
        assert_eq!(config.sandbox.timeout_ms, 900);
        assert_eq!(config.mode, ExecutionMode::Parallel);
    }

    #[test]
    fn test_load_config_rejects_zero_steps() {
        assert!(load_config(None, Some(0), None, false).is_err());
    }

    #[tokio::test]
    async fn test_replay_roundtrip_through_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let executor = AgenticExecutor::with_defaults();
        let result = executor
            .run_plan(agex_core::ExecutionPlan::new("noop", Params::new()))
            .await;
        write_result_artifact(&result, dir.path()).unwrap();
        cmd_replay(&result.run_id, dir.path()).unwrap();
    }
}
