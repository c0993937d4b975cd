//! Optional CLI settings stored next to the specs (`.cli-settings.json`),
//! plus the environment overrides consulted before a run.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::types::{DEFAULT_MODEL, Mode};

/// Settings file name at the specs root.
pub const SETTINGS_FILE: &str = ".cli-settings.json";

/// Environment override for the attempt budget.
pub const ENV_MAX_ATTEMPTS: &str = "MAX_ATTEMPTS";
/// Environment override for the worker model.
pub const ENV_WORKER_MODEL: &str = "CODEX_MODEL_IMPL";
/// Environment override for the verifier model.
pub const ENV_VERIFIER_MODEL: &str = "CODEX_MODEL_VER";

const DEFAULT_MAX_ATTEMPTS: u32 = 2;

/// Human-edited settings shared by every spec under one specs root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    pub mode: Option<Mode>,
    pub acceptance_commands: Vec<String>,
    pub default_max_attempts: Option<u32>,
    pub codex_model_run_impl: Option<String>,
    pub codex_model_run_ver: Option<String>,
}

/// Load settings from the specs root; a missing file means defaults.
pub fn load_settings(specs_root: &Path) -> Result<Settings> {
    let path = specs_root.join(SETTINGS_FILE);
    if !path.exists() {
        debug!(path = %path.display(), "no settings file, using defaults");
        return Ok(Settings::default());
    }
    let contents =
        fs::read_to_string(&path).with_context(|| format!("read settings {}", path.display()))?;
    let settings: Settings = serde_json::from_str(&contents)
        .with_context(|| format!("parse settings {}", path.display()))?;
    Ok(settings)
}

/// Run defaults after settings and environment are combined. CLI flags still
/// override these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunDefaults {
    pub mode: Mode,
    pub max_attempts: u32,
    pub worker_model: String,
    pub verifier_model: String,
    pub acceptance_commands: Vec<String>,
}

/// Resolve defaults from settings plus the process environment.
pub fn resolve_defaults(settings: &Settings) -> RunDefaults {
    resolve_defaults_with(settings, |key| std::env::var(key).ok())
}

/// Same as [`resolve_defaults`] with an injectable environment lookup.
pub fn resolve_defaults_with(
    settings: &Settings,
    lookup: impl Fn(&str) -> Option<String>,
) -> RunDefaults {
    let max_attempts = match lookup(ENV_MAX_ATTEMPTS) {
        Some(raw) => match raw.parse::<u32>() {
            Ok(value) if value > 0 => value,
            _ => {
                warn!(value = %raw, "ignoring invalid {ENV_MAX_ATTEMPTS} override");
                settings.default_max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS)
            }
        },
        None => settings.default_max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS),
    };

    let worker_model = lookup(ENV_WORKER_MODEL)
        .or_else(|| settings.codex_model_run_impl.clone())
        .unwrap_or_else(|| DEFAULT_MODEL.to_string());
    let verifier_model = lookup(ENV_VERIFIER_MODEL)
        .or_else(|| settings.codex_model_run_ver.clone())
        .unwrap_or_else(|| DEFAULT_MODEL.to_string());

    RunDefaults {
        mode: settings.mode.unwrap_or_default(),
        max_attempts,
        worker_model,
        verifier_model,
        acceptance_commands: settings.acceptance_commands.clone(),
    }
}
