//! Executor abstraction for agent invocation.
//!
//! The [`AgentExecutor`] trait decouples the attempt loop from the actual
//! agent backend (currently `codex exec`). Tests use scripted executors that
//! return predetermined outputs without spawning processes.

use std::path::PathBuf;
use std::process::Command;
use std::sync::mpsc::Sender;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::core::types::AgentChoice;
use crate::io::process::run_command_streamed;
use crate::io::stream::{CancelToken, Cancelled, StreamEvent};

/// Parameters for one executor invocation.
#[derive(Debug, Clone)]
pub struct ExecRequest {
    /// Argument list for the agent binary (role-specific).
    pub args: Vec<String>,
    /// Prompt text delivered on the process's stdin.
    pub prompt: String,
    /// Working directory for the agent process.
    pub workdir: PathBuf,
    /// Maximum time to wait for the invocation; `None` waits indefinitely.
    pub timeout: Option<Duration>,
    /// Truncate captured output beyond this many bytes.
    pub output_limit_bytes: usize,
}

/// Abstraction over agent execution backends.
///
/// Implementations must return the agent's combined stdout as text, forward
/// completed output lines to `observer` when one is given, and terminate the
/// underlying process promptly when `cancel` fires (surfacing [`Cancelled`]).
pub trait AgentExecutor {
    fn exec(
        &self,
        request: &ExecRequest,
        observer: Option<&Sender<StreamEvent>>,
        cancel: &CancelToken,
    ) -> Result<String>;
}

/// Build worker-pass arguments: read-write access so the agent can modify the
/// codebase.
pub fn worker_args(choice: &AgentChoice) -> Vec<String> {
    vec![
        "exec".to_string(),
        "--dangerously-bypass-approvals-and-sandbox".to_string(),
        "--model".to_string(),
        choice.model.clone(),
        "--reasoning".to_string(),
        choice.effort.as_str().to_string(),
        "--stdin".to_string(),
    ]
}

/// Build verifier-pass arguments: read-only sandbox, the verifier only judges.
pub fn verifier_args(choice: &AgentChoice) -> Vec<String> {
    vec![
        "exec".to_string(),
        "--sandbox".to_string(),
        "read-only".to_string(),
        "--model".to_string(),
        choice.model.clone(),
        "--reasoning".to_string(),
        choice.effort.as_str().to_string(),
        "--stdin".to_string(),
    ]
}

/// Executor that spawns the `codex` CLI.
#[derive(Debug, Clone)]
pub struct CodexExecutor {
    pub binary: String,
}

impl Default for CodexExecutor {
    fn default() -> Self {
        Self {
            binary: "codex".to_string(),
        }
    }
}

impl AgentExecutor for CodexExecutor {
    #[instrument(skip_all, fields(binary = %self.binary, streaming = observer.is_some()))]
    fn exec(
        &self,
        request: &ExecRequest,
        observer: Option<&Sender<StreamEvent>>,
        cancel: &CancelToken,
    ) -> Result<String> {
        info!(workdir = %request.workdir.display(), "starting agent invocation");

        let mut cmd = Command::new(&self.binary);
        cmd.args(&request.args).current_dir(&request.workdir);

        let output = run_command_streamed(
            cmd,
            Some(request.prompt.as_bytes()),
            request.timeout,
            request.output_limit_bytes,
            observer,
            cancel,
        )
        .with_context(|| format!("run {} {}", self.binary, request.args.join(" ")))?;

        if output.cancelled {
            warn!("agent invocation cancelled");
            return Err(Cancelled.into());
        }
        if output.timed_out {
            warn!(timeout_secs = request.timeout.map(|t| t.as_secs()), "agent invocation timed out");
            return Err(anyhow!(
                "{} timed out after {:?}",
                self.binary,
                request.timeout
            ));
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "agent invocation failed");
            return Err(anyhow!(
                "{} exited with status {:?}",
                self.binary,
                output.status.code()
            ));
        }

        debug!("agent invocation completed");
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
