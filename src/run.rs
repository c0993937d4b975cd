//! Orchestration of the worker/verifier attempt loop for a single spec.
//!
//! One run performs up to `max_attempts` rounds of {worker prompt -> worker
//! exec -> verifier prompt -> verifier exec -> verdict -> persist}, feeding
//! the verifier's remaining tasks back into the next worker prompt. The loop
//! is synchronous: invocations within an attempt are sequential, and so are
//! attempts. It never checks dependencies; callers consult the eligibility
//! gate first.

use std::path::PathBuf;
use std::sync::mpsc::Sender;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{debug, info, instrument};

use crate::core::template::fill_template;
use crate::core::types::{
    AgentChoice, AttemptResult, Mode, RunOutcome, SpecMetadata, SpecStatus, VerifierStatus,
};
use crate::core::verdict::{Verdict, parse_verifier_output};
use crate::io::executor::{AgentExecutor, ExecRequest, verifier_args, worker_args};
use crate::io::metadata::save_metadata;
use crate::io::report::write_report;
use crate::io::spec_store::{load_spec_resources, resolve_spec_dir};
use crate::io::stream::{CancelToken, StreamEvent};

/// Invalid runner configuration or unreadable spec resources. Surfaced before
/// any attempt runs; nothing has been mutated when this is returned.
#[derive(Debug, thiserror::Error)]
#[error("invalid run configuration: {message}")]
pub struct ConfigError {
    pub message: String,
}

impl ConfigError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Every attempt was consumed without `STATUS: ok`. The expected failure
/// path: the spec record is left `in-progress` with the last remaining tasks
/// recorded so a later run can resume from the same context.
#[derive(Debug, thiserror::Error)]
#[error("exhausted {attempts} attempts without STATUS: ok")]
pub struct ExhaustedError {
    pub attempts: u32,
    pub remaining: Vec<String>,
}

/// Configuration for one [`Runner`].
#[derive(Debug, Clone)]
pub struct RunnerOptions {
    /// Working directory for agent invocations.
    pub root: PathBuf,
    /// Directory holding spec folders and the prompt templates.
    pub specs_root: PathBuf,
    pub mode: Mode,
    pub max_attempts: u32,
    pub worker: AgentChoice,
    pub verifier: AgentChoice,
    /// Acceptance commands used when a spec's metadata lists none.
    pub default_acceptance_commands: Vec<String>,
    /// Per-invocation wall clock bound; `None` waits indefinitely.
    pub invocation_timeout: Option<Duration>,
    pub output_limit_bytes: usize,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            specs_root: PathBuf::from("docs/specs"),
            mode: Mode::default(),
            max_attempts: 2,
            worker: AgentChoice::default(),
            verifier: AgentChoice::default(),
            default_acceptance_commands: Vec::new(),
            invocation_timeout: None,
            output_limit_bytes: 1_000_000,
        }
    }
}

/// Drives the attempt loop against an [`AgentExecutor`].
pub struct Runner<'a, E: AgentExecutor> {
    executor: &'a E,
    options: RunnerOptions,
    clock: fn() -> DateTime<Utc>,
    observer: Option<Sender<StreamEvent>>,
    cancel: CancelToken,
}

impl<'a, E: AgentExecutor> Runner<'a, E> {
    pub fn new(executor: &'a E, options: RunnerOptions) -> Self {
        Self {
            executor,
            options,
            clock: Utc::now,
            observer: None,
            cancel: CancelToken::new(),
        }
    }

    /// Substitute the time source (tests).
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    /// Forward agent output lines to an observer channel. The channel closes
    /// when the runner is dropped; consumers should poll it from their own
    /// thread since the loop itself blocks on each invocation.
    pub fn with_observer(mut self, tx: Sender<StreamEvent>) -> Self {
        self.observer = Some(tx);
        self
    }

    /// Attach a cancellation token; cancelling kills the in-flight agent
    /// process and fails the run.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Execute the attempt loop for the given spec argument.
    ///
    /// Returns [`RunOutcome`] on verifier acceptance. Fails with
    /// [`ConfigError`] before any attempt, with [`ExhaustedError`] when the
    /// attempt budget runs out, and aborts immediately on executor or
    /// protocol failures. Per attempt: one metadata write, one report write,
    /// two agent invocations; side effects are never rolled back.
    #[instrument(skip_all, fields(spec = spec_arg, max_attempts = self.options.max_attempts))]
    pub fn run(&self, spec_arg: &str) -> Result<RunOutcome> {
        if spec_arg.trim().is_empty() {
            return Err(ConfigError::new("spec argument is required").into());
        }
        if self.options.max_attempts == 0 {
            return Err(ConfigError::new("max attempts must be at least 1").into());
        }
        self.options
            .worker
            .validate()
            .map_err(|msg| ConfigError::new(format!("worker choice: {msg}")))?;
        self.options
            .verifier
            .validate()
            .map_err(|msg| ConfigError::new(format!("verifier choice: {msg}")))?;

        let spec_dir = resolve_spec_dir(spec_arg, &self.options.root, &self.options.specs_root)
            .map_err(|err| ConfigError::new(format!("{err:#}")))?;
        let mut spec = load_spec_resources(
            &spec_dir,
            &self.options.specs_root,
            &self.options.default_acceptance_commands,
        )
        .map_err(|err| ConfigError::new(format!("{err:#}")))?;

        info!(id = %spec.id, name = %spec.name, "starting run");

        let mut remaining: Vec<String> = Vec::new();
        for attempt in 1..=self.options.max_attempts {
            debug!(attempt, "starting attempt");
            let remaining_json =
                serde_json::to_string_pretty(&remaining).context("encode remaining tasks")?;

            let worker_prompt = fill_template(
                &spec.implement_template,
                &[
                    ("{{SPEC_ID}}", spec.id.as_str()),
                    ("{{SPEC_NAME}}", spec.name.as_str()),
                    ("{{SPEC_BODY}}", spec.body.as_str()),
                    (
                        "{{ACCEPTANCE_COMMANDS}}",
                        spec.acceptance_commands_text.as_str(),
                    ),
                    ("{{PREVIOUS_REMAINING_TASKS}}", remaining_json.as_str()),
                    ("{{MODE}}", self.options.mode.as_str()),
                ],
            );
            let worker_output = self
                .invoke(worker_args(&self.options.worker), worker_prompt)
                .context("worker execution failed")?;

            let review_prompt = fill_template(
                &spec.review_template,
                &[
                    ("{{SPEC_ID}}", spec.id.as_str()),
                    ("{{SPEC_NAME}}", spec.name.as_str()),
                    ("{{SPEC_BODY}}", spec.body.as_str()),
                    ("{{ACCEPTANCE_CHECKLIST}}", spec.checklist.as_str()),
                    (
                        "{{ACCEPTANCE_COMMANDS}}",
                        spec.acceptance_commands_text.as_str(),
                    ),
                    ("{{IMPLEMENTATION_REPORT}}", worker_output.as_str()),
                    ("{{MODE}}", self.options.mode.as_str()),
                ],
            );
            let verifier_output = self
                .invoke(verifier_args(&self.options.verifier), review_prompt)
                .context("verifier execution failed")?;

            // A malformed verifier response aborts the run: it signals a
            // broken contract, not a transient task failure.
            let verdict = parse_verifier_output(&verifier_output)?;

            let now = (self.clock)();
            apply_verdict(&mut spec.metadata, &verdict, &worker_output, attempt, now);
            save_metadata(&spec.metadata_path, &spec.metadata)?;
            write_report(
                &spec,
                self.options.mode,
                self.options.max_attempts,
                attempt,
                verdict.status,
                &verdict.remaining_tasks,
                &worker_output,
            )?;

            if verdict.status == VerifierStatus::Ok {
                info!(attempt, "verifier accepted, spec done");
                return Ok(RunOutcome {
                    attempts: attempt,
                    last: AttemptResult {
                        attempt,
                        status: verdict.status,
                        remaining_tasks: verdict.remaining_tasks,
                        worker_output,
                    },
                });
            }

            info!(
                attempt,
                remaining = verdict.remaining_tasks.len(),
                "verifier reported remaining tasks"
            );
            remaining = verdict.remaining_tasks;
        }

        Err(ExhaustedError {
            attempts: self.options.max_attempts,
            remaining,
        }
        .into())
    }

    fn invoke(&self, args: Vec<String>, prompt: String) -> Result<String> {
        let request = ExecRequest {
            args,
            prompt,
            workdir: self.options.root.clone(),
            timeout: self.options.invocation_timeout,
            output_limit_bytes: self.options.output_limit_bytes,
        };
        self.executor
            .exec(&request, self.observer.as_ref(), &self.cancel)
    }
}

fn apply_verdict(
    meta: &mut SpecMetadata,
    verdict: &Verdict,
    worker_output: &str,
    attempt: u32,
    now: DateTime<Utc>,
) {
    meta.last_run = Some(now);
    let stamp = now.to_rfc3339_opts(SecondsFormat::Secs, true);
    match verdict.status {
        VerifierStatus::Ok => {
            meta.status = SpecStatus::Done;
            let summary = summarize_worker_output(worker_output);
            meta.append_note(&format!("[{stamp}] attempt {attempt} ok - {summary}"));
        }
        VerifierStatus::Missing => {
            meta.status = SpecStatus::InProgress;
            // An empty list is a valid non-terminal state: the verifier
            // declined to accept but named nothing concrete.
            let summary = if verdict.remaining_tasks.is_empty() {
                "none".to_string()
            } else {
                verdict.remaining_tasks.join("; ")
            };
            meta.append_note(&format!(
                "[{stamp}] attempt {attempt} remaining tasks: {summary}"
            ));
        }
    }
}

fn summarize_worker_output(worker_output: &str) -> &str {
    worker_output
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("worker output empty")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::verdict::VerdictError;
    use crate::io::metadata::load_metadata;
    use crate::io::spec_store::IMPLEMENT_TEMPLATE_FILE;
    use crate::test_support::{ScriptedExecutor, ScriptedOutput, TestSpecs};
    use chrono::TimeZone;
    use std::fs;

    fn fixed_clock() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 4, 1, 12, 0, 0).unwrap()
    }

    fn options_for(specs: &TestSpecs) -> RunnerOptions {
        RunnerOptions {
            root: specs.specs_root().to_path_buf(),
            specs_root: specs.specs_root().to_path_buf(),
            ..RunnerOptions::default()
        }
    }

    /// A first-attempt `ok` stops after exactly one worker+verifier pair and
    /// marks the record done.
    #[test]
    fn run_succeeds_on_first_ok() {
        let specs = TestSpecs::new().expect("fixture");
        specs
            .add_spec("spec-demo", "# Demo spec\nDo the thing.\n", &["make all"])
            .expect("spec");
        let executor = ScriptedExecutor::with_outputs(&[
            "worker log\nall good\n",
            "STATUS: ok\n{\"remainingTasks\":[]}\n",
        ]);

        let runner = Runner::new(&executor, options_for(&specs)).with_clock(fixed_clock);
        let outcome = runner.run("spec-demo").expect("run");

        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.last.status, VerifierStatus::Ok);
        assert_eq!(outcome.last.worker_output, "worker log\nall good\n");
        assert_eq!(executor.calls().len(), 2);

        let meta = load_metadata(&specs.metadata_path("spec-demo")).expect("meta");
        assert_eq!(meta.status, SpecStatus::Done);
        assert_eq!(meta.last_run, Some(fixed_clock()));
        assert!(meta.notes.contains("attempt 1 ok - all good"));

        let report =
            fs::read_to_string(specs.specs_root().join("spec-demo/implementation-report.md"))
                .expect("report");
        assert!(report.contains("Final verifier status: ok"));
        assert!(report.contains("\"remainingTasks\": []"));
    }

    /// A verifier that never accepts consumes exactly `max_attempts` pairs
    /// and leaves the record in progress with the tasks noted.
    #[test]
    fn run_exhausts_attempts_on_persistent_missing() {
        let specs = TestSpecs::new().expect("fixture");
        specs.add_spec("spec-demo", "# Demo\n", &[]).expect("spec");
        let mut outputs = Vec::new();
        for _ in 0..3 {
            outputs.push(ScriptedOutput::Text("worker pass\n".to_string()));
            outputs.push(ScriptedOutput::Text(
                "STATUS: missing\n{\"remainingTasks\":[\"x\"]}\n".to_string(),
            ));
        }
        let executor = ScriptedExecutor::new(outputs);

        let options = RunnerOptions {
            max_attempts: 3,
            ..options_for(&specs)
        };
        let err = Runner::new(&executor, options)
            .with_clock(fixed_clock)
            .run("spec-demo")
            .expect_err("exhausted");

        let exhausted = err.downcast_ref::<ExhaustedError>().expect("typed error");
        assert_eq!(exhausted.attempts, 3);
        assert_eq!(exhausted.remaining, vec!["x"]);
        assert_eq!(executor.calls().len(), 6);

        let meta = load_metadata(&specs.metadata_path("spec-demo")).expect("meta");
        assert_eq!(meta.status, SpecStatus::InProgress);
        assert!(meta.notes.contains("remaining tasks: x"));
    }

    /// Attempt k's worker prompt must carry the JSON array produced by
    /// attempt k-1's verifier (and `[]` on the first attempt).
    #[test]
    fn worker_prompt_carries_previous_remaining_tasks() {
        let specs = TestSpecs::new().expect("fixture");
        specs.add_spec("spec-demo", "# Demo\n", &[]).expect("spec");
        let executor = ScriptedExecutor::with_outputs(&[
            "worker pass one\n",
            "STATUS: missing\n{\"remainingTasks\":[\"wire config\",\"add tests\"]}\n",
            "worker pass two\n",
            "STATUS: ok\n{\"remainingTasks\":[]}\n",
        ]);

        let outcome = Runner::new(&executor, options_for(&specs))
            .with_clock(fixed_clock)
            .run("spec-demo")
            .expect("run");
        assert_eq!(outcome.attempts, 2);

        let calls = executor.calls();
        assert!(calls[0].prompt.contains("[]"));
        let expected = serde_json::to_string_pretty(&vec![
            "wire config".to_string(),
            "add tests".to_string(),
        ])
        .expect("encode");
        assert!(calls[2].prompt.contains(&expected));

        // Role separation: worker writes, verifier is read-only.
        assert!(
            calls[0]
                .args
                .contains(&"--dangerously-bypass-approvals-and-sandbox".to_string())
        );
        assert!(calls[1].args.contains(&"--sandbox".to_string()));
    }

    /// An unrecognized status line aborts the run before any metadata write
    /// for that attempt.
    #[test]
    fn unrecognized_status_aborts_without_metadata_write() {
        let specs = TestSpecs::new().expect("fixture");
        specs.add_spec("spec-demo", "# Demo\n", &[]).expect("spec");
        let executor =
            ScriptedExecutor::with_outputs(&["worker pass\n", "STATUS: unknown\n{}\n"]);

        let err = Runner::new(&executor, options_for(&specs))
            .with_clock(fixed_clock)
            .run("spec-demo")
            .expect_err("protocol violation");

        match err.downcast_ref::<VerdictError>() {
            Some(VerdictError::UnrecognizedStatus(line)) => {
                assert_eq!(line, "STATUS: unknown");
            }
            other => panic!("expected UnrecognizedStatus, got {other:?}"),
        }

        let meta = load_metadata(&specs.metadata_path("spec-demo")).expect("meta");
        assert_eq!(meta.status, SpecStatus::Todo);
        assert!(meta.last_run.is_none());
        assert!(meta.notes.is_empty());
    }

    #[test]
    fn malformed_payload_is_not_treated_as_success() {
        let specs = TestSpecs::new().expect("fixture");
        specs.add_spec("spec-demo", "# Demo\n", &[]).expect("spec");
        let executor = ScriptedExecutor::with_outputs(&["worker pass\n", "STATUS: ok\nnot json\n"]);

        let err = Runner::new(&executor, options_for(&specs))
            .with_clock(fixed_clock)
            .run("spec-demo")
            .expect_err("protocol violation");
        assert!(matches!(
            err.downcast_ref::<VerdictError>(),
            Some(VerdictError::MalformedPayload(_))
        ));

        let meta = load_metadata(&specs.metadata_path("spec-demo")).expect("meta");
        assert_eq!(meta.status, SpecStatus::Todo);
    }

    /// `missing` with an empty list is a valid non-terminal state recorded
    /// as "none".
    #[test]
    fn missing_with_empty_list_notes_none() {
        let specs = TestSpecs::new().expect("fixture");
        specs.add_spec("spec-demo", "# Demo\n", &[]).expect("spec");
        let executor =
            ScriptedExecutor::with_outputs(&["worker pass\n", "STATUS: missing\n{}\n"]);

        let options = RunnerOptions {
            max_attempts: 1,
            ..options_for(&specs)
        };
        let err = Runner::new(&executor, options)
            .with_clock(fixed_clock)
            .run("spec-demo")
            .expect_err("exhausted");
        assert!(err.downcast_ref::<ExhaustedError>().is_some());

        let meta = load_metadata(&specs.metadata_path("spec-demo")).expect("meta");
        assert_eq!(meta.status, SpecStatus::InProgress);
        assert!(meta.notes.contains("remaining tasks: none"));
    }

    #[test]
    fn empty_spec_argument_is_a_config_error() {
        let specs = TestSpecs::new().expect("fixture");
        let executor = ScriptedExecutor::with_outputs(&[]);

        let err = Runner::new(&executor, options_for(&specs))
            .run("  ")
            .expect_err("config error");
        assert!(err.downcast_ref::<ConfigError>().is_some());
        assert!(executor.calls().is_empty());
    }

    #[test]
    fn zero_max_attempts_is_a_config_error() {
        let specs = TestSpecs::new().expect("fixture");
        specs.add_spec("spec-demo", "# Demo\n", &[]).expect("spec");
        let executor = ScriptedExecutor::with_outputs(&[]);

        let options = RunnerOptions {
            max_attempts: 0,
            ..options_for(&specs)
        };
        let err = Runner::new(&executor, options)
            .run("spec-demo")
            .expect_err("config error");
        assert!(err.downcast_ref::<ConfigError>().is_some());
        assert!(executor.calls().is_empty());
    }

    #[test]
    fn missing_template_is_a_config_error() {
        let specs = TestSpecs::new().expect("fixture");
        specs.add_spec("spec-demo", "# Demo\n", &[]).expect("spec");
        fs::remove_file(specs.specs_root().join(IMPLEMENT_TEMPLATE_FILE)).expect("remove");
        let executor = ScriptedExecutor::with_outputs(&[]);

        let err = Runner::new(&executor, options_for(&specs))
            .run("spec-demo")
            .expect_err("config error");
        let config = err.downcast_ref::<ConfigError>().expect("typed error");
        assert!(config.message.contains("prompt template"));
        assert!(executor.calls().is_empty());
    }

    /// Executor failure aborts the whole run; the attempt writes nothing.
    #[test]
    fn worker_failure_aborts_run_without_metadata_write() {
        let specs = TestSpecs::new().expect("fixture");
        specs.add_spec("spec-demo", "# Demo\n", &[]).expect("spec");
        let executor =
            ScriptedExecutor::new(vec![ScriptedOutput::Error("agent crashed".to_string())]);

        let err = Runner::new(&executor, options_for(&specs))
            .with_clock(fixed_clock)
            .run("spec-demo")
            .expect_err("exec failure");
        assert!(format!("{err:#}").contains("worker execution failed"));

        let meta = load_metadata(&specs.metadata_path("spec-demo")).expect("meta");
        assert_eq!(meta.status, SpecStatus::Todo);
        assert!(meta.last_run.is_none());
    }
}
