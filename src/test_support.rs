//! Test-only helpers: scripted executors and on-disk spec fixtures.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;

use anyhow::{Result, anyhow};

use crate::core::types::{SpecMetadata, SpecStatus};
use crate::io::executor::{AgentExecutor, ExecRequest};
use crate::io::metadata::{METADATA_FILE, save_metadata};
use crate::io::spec_store::{
    CHECKLIST_FILE, IMPLEMENT_TEMPLATE_FILE, REVIEW_TEMPLATE_FILE, SPEC_FILE,
};
use crate::io::stream::{CancelToken, StreamEvent};

const IMPLEMENT_TEMPLATE: &str = "\
# Worker task for {{SPEC_ID}} - {{SPEC_NAME}}

Mode: {{MODE}}

<spec>
{{SPEC_BODY}}
</spec>

Acceptance commands:
{{ACCEPTANCE_COMMANDS}}

Previous remaining tasks:
{{PREVIOUS_REMAINING_TASKS}}
";

const REVIEW_TEMPLATE: &str = "\
# Verifier task for {{SPEC_ID}} - {{SPEC_NAME}}

Mode: {{MODE}}

<spec>
{{SPEC_BODY}}
</spec>

Checklist:
{{ACCEPTANCE_CHECKLIST}}

Acceptance commands:
{{ACCEPTANCE_COMMANDS}}

Worker report:
{{IMPLEMENTATION_REPORT}}
";

/// One recorded executor invocation.
#[derive(Debug, Clone)]
pub struct ScriptedCall {
    pub args: Vec<String>,
    pub prompt: String,
}

/// Predetermined response for one invocation.
#[derive(Debug, Clone)]
pub enum ScriptedOutput {
    Text(String),
    Error(String),
}

/// Executor returning scripted responses in order, recording every call.
pub struct ScriptedExecutor {
    responses: RefCell<VecDeque<ScriptedOutput>>,
    calls: RefCell<Vec<ScriptedCall>>,
}

impl ScriptedExecutor {
    pub fn new(responses: Vec<ScriptedOutput>) -> Self {
        Self {
            responses: RefCell::new(responses.into()),
            calls: RefCell::new(Vec::new()),
        }
    }

    /// Convenience constructor for all-success scripts.
    pub fn with_outputs(outputs: &[&str]) -> Self {
        Self::new(
            outputs
                .iter()
                .map(|text| ScriptedOutput::Text((*text).to_string()))
                .collect(),
        )
    }

    pub fn calls(&self) -> Vec<ScriptedCall> {
        self.calls.borrow().clone()
    }
}

impl AgentExecutor for ScriptedExecutor {
    fn exec(
        &self,
        request: &ExecRequest,
        _observer: Option<&Sender<StreamEvent>>,
        _cancel: &CancelToken,
    ) -> Result<String> {
        self.calls.borrow_mut().push(ScriptedCall {
            args: request.args.clone(),
            prompt: request.prompt.clone(),
        });
        match self.responses.borrow_mut().pop_front() {
            Some(ScriptedOutput::Text(text)) => Ok(text),
            Some(ScriptedOutput::Error(message)) => Err(anyhow!(message)),
            None => Err(anyhow!(
                "unexpected agent invocation #{}",
                self.calls.borrow().len()
            )),
        }
    }
}

/// Temporary specs root with both prompt templates in place.
pub struct TestSpecs {
    temp: tempfile::TempDir,
}

impl TestSpecs {
    pub fn new() -> Result<Self> {
        let temp = tempfile::tempdir()?;
        fs::write(temp.path().join(IMPLEMENT_TEMPLATE_FILE), IMPLEMENT_TEMPLATE)?;
        fs::write(temp.path().join(REVIEW_TEMPLATE_FILE), REVIEW_TEMPLATE)?;
        Ok(Self { temp })
    }

    pub fn specs_root(&self) -> &Path {
        self.temp.path()
    }

    /// Create a spec folder named after `id` with status `todo`.
    pub fn add_spec(&self, id: &str, body: &str, commands: &[&str]) -> Result<PathBuf> {
        let dir = self.temp.path().join(id);
        fs::create_dir_all(&dir)?;
        fs::write(dir.join(SPEC_FILE), body)?;
        let meta = SpecMetadata {
            id: id.to_string(),
            name: String::new(),
            status: SpecStatus::Todo,
            depends_on: Vec::new(),
            last_run: None,
            notes: String::new(),
            acceptance_commands: commands.iter().map(|c| (*c).to_string()).collect(),
        };
        save_metadata(&dir.join(METADATA_FILE), &meta)?;
        Ok(dir)
    }

    /// Add an acceptance checklist to an existing spec folder.
    pub fn add_checklist(&self, id: &str, contents: &str) -> Result<()> {
        fs::write(self.temp.path().join(id).join(CHECKLIST_FILE), contents)?;
        Ok(())
    }

    pub fn metadata_path(&self, id: &str) -> PathBuf {
        self.temp.path().join(id).join(METADATA_FILE)
    }
}
