//! CLI for the worker/verifier attempt loop.
//!
//! `foreman list` shows spec folders with status and dependency eligibility.
//! `foreman run <spec>` consults the eligibility gate, then drives the
//! attempt loop while streaming agent output live. Ctrl-C cancels the
//! in-flight agent invocation.

use std::path::{Path, PathBuf};
use std::process;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use foreman::core::eligibility::{evaluate, status_index};
use foreman::core::types::{AgentChoice, Effort, Mode, SpecMetadata};
use foreman::exit_codes;
use foreman::io::executor::CodexExecutor;
use foreman::io::metadata::{METADATA_FILE, load_metadata};
use foreman::io::settings::{load_settings, resolve_defaults};
use foreman::io::spec_store::{discover_specs, resolve_spec_dir};
use foreman::io::stream::{CancelToken, StreamEvent, StreamSource};
use foreman::logging;
use foreman::run::{ConfigError, ExhaustedError, Runner, RunnerOptions};

#[derive(Parser)]
#[command(
    name = "foreman",
    version,
    about = "Worker/verifier attempt loop for spec folders"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List spec folders with status and dependency eligibility.
    List {
        /// Directory holding spec folders and prompt templates.
        #[arg(long, default_value = "docs/specs")]
        specs_root: PathBuf,
    },
    /// Run the implement/verify loop for one spec.
    Run(RunArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Spec directory: absolute, root-relative, or specs-root-relative.
    spec: String,

    /// Working directory for agent invocations.
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Directory holding spec folders and prompt templates.
    #[arg(long, default_value = "docs/specs")]
    specs_root: PathBuf,

    /// Attempt budget (overrides settings and MAX_ATTEMPTS).
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Run mode: strict or lenient.
    #[arg(long)]
    mode: Option<Mode>,

    /// Worker model (overrides settings and CODEX_MODEL_IMPL).
    #[arg(long)]
    worker_model: Option<String>,

    /// Worker reasoning effort: low, medium, or high.
    #[arg(long)]
    worker_effort: Option<Effort>,

    /// Verifier model (overrides settings and CODEX_MODEL_VER).
    #[arg(long)]
    verifier_model: Option<String>,

    /// Verifier reasoning effort: low, medium, or high.
    #[arg(long)]
    verifier_effort: Option<Effort>,

    /// Per-invocation timeout in seconds. Unbounded when omitted.
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Run even when the spec is not cleanly eligible.
    #[arg(long)]
    force: bool,
}

fn main() {
    logging::init();
    match dispatch() {
        Ok(code) => process::exit(code),
        Err(err) => {
            eprintln!("{err:#}");
            process::exit(exit_codes::INVALID);
        }
    }
}

fn dispatch() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::List { specs_root } => cmd_list(&specs_root),
        Command::Run(args) => cmd_run(args),
    }
}

fn cmd_list(specs_root: &Path) -> Result<i32> {
    let folders = discover_specs(specs_root)?;
    if folders.is_empty() {
        println!("no spec folders under {}", specs_root.display());
        return Ok(exit_codes::OK);
    }

    let records: Vec<SpecMetadata> = folders.iter().map(|f| f.metadata.clone()).collect();
    let index = status_index(&records);

    println!("{:<28} {:<12} {:<6} UNMET", "ID", "STATUS", "RUN");
    for folder in &folders {
        let eligibility = evaluate(&folder.metadata, &index);
        let run = if eligibility.is_clean() {
            "yes"
        } else if eligibility.runnable {
            "deps"
        } else {
            "no"
        };
        let unmet = if eligibility.unmet_deps.is_empty() {
            "-".to_string()
        } else {
            eligibility.unmet_deps.join(", ")
        };
        println!(
            "{:<28} {:<12} {:<6} {}",
            folder.metadata.id, folder.metadata.status, run, unmet
        );
    }
    Ok(exit_codes::OK)
}

fn cmd_run(args: RunArgs) -> Result<i32> {
    let settings = load_settings(&args.specs_root)?;
    let defaults = resolve_defaults(&settings);

    let worker = AgentChoice::new(
        args.worker_model.unwrap_or(defaults.worker_model),
        args.worker_effort.unwrap_or(Effort::Medium),
    )
    .map_err(|msg| ConfigError::new(format!("worker choice: {msg}")))?;
    let verifier = AgentChoice::new(
        args.verifier_model.unwrap_or(defaults.verifier_model),
        args.verifier_effort.unwrap_or(Effort::Medium),
    )
    .map_err(|msg| ConfigError::new(format!("verifier choice: {msg}")))?;

    // Dependency gate. The loop itself never checks dependencies, so the
    // refusal (and the --force override) lives here.
    let spec_dir = resolve_spec_dir(&args.spec, &args.root, &args.specs_root)?;
    let target = load_metadata(&spec_dir.join(METADATA_FILE))?;
    let folders = discover_specs(&args.specs_root)?;
    let records: Vec<SpecMetadata> = folders.iter().map(|f| f.metadata.clone()).collect();
    let eligibility = evaluate(&target, &status_index(&records));
    if !args.force {
        if !eligibility.runnable {
            eprintln!(
                "spec {} is already {}; use --force to rerun",
                target.id, target.status
            );
            return Ok(exit_codes::BLOCKED);
        }
        if !eligibility.unmet_deps.is_empty() {
            eprintln!(
                "spec {} has unmet dependencies: {}; use --force to override",
                target.id,
                eligibility.unmet_deps.join(", ")
            );
            return Ok(exit_codes::BLOCKED);
        }
    }

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        ctrlc::set_handler(move || cancel.cancel()).context("install ctrl-c handler")?;
    }

    // The loop blocks on each invocation; a separate thread drains the
    // observer channel so output stays live.
    let (tx, rx) = mpsc::channel();
    let printer = thread::spawn(move || {
        for event in rx {
            match event {
                StreamEvent::Line(line) => match line.source {
                    StreamSource::Stdout => println!("{}", line.text),
                    StreamSource::Stderr => eprintln!("{}", line.text),
                },
                StreamEvent::Finished(_) => {}
            }
        }
    });

    let options = RunnerOptions {
        root: args.root.clone(),
        specs_root: args.specs_root.clone(),
        mode: args.mode.unwrap_or(defaults.mode),
        max_attempts: args.max_attempts.unwrap_or(defaults.max_attempts),
        worker,
        verifier,
        default_acceptance_commands: defaults.acceptance_commands,
        invocation_timeout: args.timeout_secs.map(Duration::from_secs),
        ..RunnerOptions::default()
    };
    let executor = CodexExecutor::default();
    let runner = Runner::new(&executor, options)
        .with_observer(tx)
        .with_cancel(cancel);
    let result = runner.run(&args.spec);
    drop(runner);
    let _ = printer.join();

    match result {
        Ok(outcome) => {
            println!("spec accepted after {} attempt(s)", outcome.attempts);
            Ok(exit_codes::OK)
        }
        Err(err) => {
            if let Some(exhausted) = err.downcast_ref::<ExhaustedError>() {
                eprintln!("{err:#}");
                if !exhausted.remaining.is_empty() {
                    eprintln!("remaining tasks:");
                    for task in &exhausted.remaining {
                        eprintln!("- {task}");
                    }
                }
                return Ok(exit_codes::EXHAUSTED);
            }
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_run_defaults() {
        let cli = Cli::parse_from(["foreman", "run", "spec-a"]);
        match cli.command {
            Command::Run(args) => {
                assert_eq!(args.spec, "spec-a");
                assert_eq!(args.root, PathBuf::from("."));
                assert_eq!(args.specs_root, PathBuf::from("docs/specs"));
                assert!(args.max_attempts.is_none());
                assert!(args.mode.is_none());
                assert!(!args.force);
            }
            Command::List { .. } => panic!("expected run command"),
        }
    }

    #[test]
    fn parse_run_with_overrides() {
        let cli = Cli::parse_from([
            "foreman",
            "run",
            "spec-a",
            "--max-attempts",
            "5",
            "--mode",
            "lenient",
            "--worker-model",
            "gpt-5.1",
            "--worker-effort",
            "high",
            "--force",
        ]);
        match cli.command {
            Command::Run(args) => {
                assert_eq!(args.max_attempts, Some(5));
                assert_eq!(args.mode, Some(Mode::Lenient));
                assert_eq!(args.worker_model.as_deref(), Some("gpt-5.1"));
                assert_eq!(args.worker_effort, Some(Effort::High));
                assert!(args.force);
            }
            Command::List { .. } => panic!("expected run command"),
        }
    }

    #[test]
    fn parse_list() {
        let cli = Cli::parse_from(["foreman", "list", "--specs-root", "work/specs"]);
        match cli.command {
            Command::List { specs_root } => {
                assert_eq!(specs_root, PathBuf::from("work/specs"));
            }
            Command::Run(_) => panic!("expected list command"),
        }
    }
}
