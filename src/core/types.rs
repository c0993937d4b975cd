//! Shared deterministic types for the attempt loop.
//!
//! These types define stable contracts between core components. They should not
//! depend on external state or I/O and must remain deterministic across runs.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a spec, as persisted in its `metadata.json`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SpecStatus {
    Todo,
    InProgress,
    Done,
    Blocked,
}

impl SpecStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SpecStatus::Todo => "todo",
            SpecStatus::InProgress => "in-progress",
            SpecStatus::Done => "done",
            SpecStatus::Blocked => "blocked",
        }
    }
}

impl fmt::Display for SpecStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The `metadata.json` schema for a spec folder.
///
/// `notes` is an append-only log; use [`SpecMetadata::append_note`] rather than
/// assigning to it directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecMetadata {
    pub id: String,
    pub name: String,
    pub status: SpecStatus,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub notes: String,
    #[serde(default)]
    pub acceptance_commands: Vec<String>,
}

impl SpecMetadata {
    /// Append a single note line, keeping earlier notes intact.
    pub fn append_note(&mut self, note: &str) {
        let note = note.trim();
        if note.is_empty() {
            return;
        }
        if self.notes.trim().is_empty() {
            self.notes = note.to_string();
        } else {
            self.notes = format!("{}\n{}", self.notes.trim(), note);
        }
    }
}

/// Run mode forwarded to both agent prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Strict,
    Lenient,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Strict => "strict",
            Mode::Lenient => "lenient",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "strict" => Ok(Mode::Strict),
            "lenient" => Ok(Mode::Lenient),
            other => Err(format!("unknown mode '{other}' (expected strict or lenient)")),
        }
    }
}

/// Reasoning effort requested from the agent backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effort {
    Low,
    Medium,
    High,
}

impl Effort {
    pub fn as_str(self) -> &'static str {
        match self {
            Effort::Low => "low",
            Effort::Medium => "medium",
            Effort::High => "high",
        }
    }
}

impl fmt::Display for Effort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Effort {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Effort::Low),
            "medium" => Ok(Effort::Medium),
            "high" => Ok(Effort::High),
            other => Err(format!(
                "unknown reasoning effort '{other}' (expected low, medium, or high)"
            )),
        }
    }
}

/// Model used when no override is configured.
pub const DEFAULT_MODEL: &str = "gpt-5.1-codex";

/// Allowed (model, reasoning effort) pairs for agent invocations.
pub const AGENT_CHOICES: &[(&str, &[Effort])] = &[
    ("gpt-5.1-codex", &[Effort::Low, Effort::Medium, Effort::High]),
    ("gpt-5.1-codex-mini", &[Effort::Low, Effort::Medium]),
    ("gpt-5.1", &[Effort::Medium, Effort::High]),
];

/// Configuration for one agent invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentChoice {
    pub model: String,
    pub effort: Effort,
}

impl Default for AgentChoice {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            effort: Effort::Medium,
        }
    }
}

impl AgentChoice {
    /// Build a choice, rejecting pairs outside [`AGENT_CHOICES`].
    pub fn new(model: impl Into<String>, effort: Effort) -> Result<Self, String> {
        let choice = Self {
            model: model.into(),
            effort,
        };
        choice.validate()?;
        Ok(choice)
    }

    pub fn validate(&self) -> Result<(), String> {
        for (model, efforts) in AGENT_CHOICES {
            if *model == self.model {
                if efforts.contains(&self.effort) {
                    return Ok(());
                }
                return Err(format!(
                    "reasoning effort '{}' is not allowed for model '{}'",
                    self.effort, self.model
                ));
            }
        }
        Err(format!("model '{}' is not in the allowed set", self.model))
    }
}

/// Verifier-declared status for one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerifierStatus {
    Ok,
    Missing,
}

impl VerifierStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            VerifierStatus::Ok => "ok",
            VerifierStatus::Missing => "missing",
        }
    }
}

impl fmt::Display for VerifierStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one worker+verifier round. Produced once per round, never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptResult {
    /// Attempt number, 1-based.
    pub attempt: u32,
    pub status: VerifierStatus,
    /// Remaining task descriptions reported by the verifier, in order.
    pub remaining_tasks: Vec<String>,
    /// Raw combined stdout of the worker pass.
    pub worker_output: String,
}

/// Final result of a successful run.
///
/// Exhaustion and protocol/config failures are reported as typed errors, not
/// as a variant here; see the runner module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    /// Total worker+verifier rounds performed.
    pub attempts: u32,
    pub last: AttemptResult,
}
