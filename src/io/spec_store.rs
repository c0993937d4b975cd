//! Spec folder discovery and resource loading.
//!
//! A spec folder holds `SPEC.md`, `metadata.json`, and optionally
//! `acceptance-checklist.md`. The specs root additionally carries the two
//! prompt templates shared by every spec.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, warn};

use crate::core::template::unknown_placeholders;
use crate::core::types::SpecMetadata;
use crate::io::metadata::{METADATA_FILE, load_metadata};

/// File name of the spec body inside a spec folder.
pub const SPEC_FILE: &str = "SPEC.md";
/// Optional acceptance checklist inside a spec folder.
pub const CHECKLIST_FILE: &str = "acceptance-checklist.md";
/// Worker prompt template at the specs root.
pub const IMPLEMENT_TEMPLATE_FILE: &str = "implement.prompt-template.md";
/// Verifier prompt template at the specs root.
pub const REVIEW_TEMPLATE_FILE: &str = "review.prompt-template.md";
/// Attempt report artifact written into a spec folder.
pub const REPORT_FILE: &str = "implementation-report.md";

/// A `spec-*` directory found under the specs root.
#[derive(Debug, Clone)]
pub struct SpecFolder {
    pub path: PathBuf,
    pub metadata: SpecMetadata,
}

/// Scan the specs root for `spec-*` directories and load their metadata,
/// sorted by id.
pub fn discover_specs(specs_root: &Path) -> Result<Vec<SpecFolder>> {
    let entries = fs::read_dir(specs_root)
        .with_context(|| format!("read specs root {}", specs_root.display()))?;

    let mut folders = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("read entry in {}", specs_root.display()))?;
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !path.is_dir() || !name.starts_with("spec-") {
            continue;
        }

        ensure_file_exists(&path, SPEC_FILE)?;
        ensure_file_exists(&path, METADATA_FILE)?;
        let metadata = load_metadata(&path.join(METADATA_FILE))?;

        folders.push(SpecFolder { path, metadata });
    }

    folders.sort_by(|a, b| a.metadata.id.cmp(&b.metadata.id));
    debug!(count = folders.len(), "discovered specs");
    Ok(folders)
}

fn ensure_file_exists(folder: &Path, name: &str) -> Result<()> {
    let path = folder.join(name);
    if !path.is_file() {
        return Err(anyhow!(
            "spec folder {} missing {name}",
            folder.display()
        ));
    }
    Ok(())
}

/// Resolve a spec argument to a directory: absolute path, root-relative, then
/// specs-root-relative.
pub fn resolve_spec_dir(arg: &str, root: &Path, specs_root: &Path) -> Result<PathBuf> {
    let direct = PathBuf::from(arg);
    if direct.is_absolute() {
        if !direct.exists() {
            return Err(anyhow!("could not find spec directory {}", direct.display()));
        }
        return Ok(direct);
    }

    let candidate = root.join(arg);
    if candidate.exists() {
        return Ok(candidate);
    }

    let alt = specs_root.join(arg);
    if alt.exists() {
        return Ok(alt);
    }

    Err(anyhow!(
        "could not find spec directory at {} or {}",
        candidate.display(),
        alt.display()
    ))
}

/// Everything the attempt loop needs about one spec, loaded up front.
#[derive(Debug, Clone)]
pub struct SpecResources {
    pub dir: PathBuf,
    pub metadata: SpecMetadata,
    pub metadata_path: PathBuf,
    pub body: String,
    pub checklist: String,
    pub implement_template: String,
    pub review_template: String,
    pub report_path: PathBuf,
    pub acceptance_commands: Vec<String>,
    pub acceptance_commands_text: String,
    pub id: String,
    pub name: String,
}

/// Load the resources for one spec folder.
///
/// The checklist is optional; the body, metadata, and both templates are
/// required. `default_commands` fills in when the metadata lists none.
pub fn load_spec_resources(
    spec_dir: &Path,
    specs_root: &Path,
    default_commands: &[String],
) -> Result<SpecResources> {
    let metadata_path = spec_dir.join(METADATA_FILE);
    let metadata = load_metadata(&metadata_path)?;

    let body = fs::read_to_string(spec_dir.join(SPEC_FILE))
        .with_context(|| format!("read {} in {}", SPEC_FILE, spec_dir.display()))?;
    let checklist = fs::read_to_string(spec_dir.join(CHECKLIST_FILE)).unwrap_or_default();

    let implement_template = read_template(&specs_root.join(IMPLEMENT_TEMPLATE_FILE), "implement")?;
    let review_template = read_template(&specs_root.join(REVIEW_TEMPLATE_FILE), "review")?;

    let acceptance_commands = if metadata.acceptance_commands.is_empty() {
        default_commands.to_vec()
    } else {
        metadata.acceptance_commands.clone()
    };
    let acceptance_commands_text = format_acceptance_commands(&acceptance_commands);

    let id = if metadata.id.is_empty() {
        spec_dir
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string()
    } else {
        metadata.id.clone()
    };

    let name = if metadata.name.is_empty() {
        extract_spec_title(&body).unwrap_or_else(|| "(unnamed spec)".to_string())
    } else {
        metadata.name.clone()
    };

    Ok(SpecResources {
        dir: spec_dir.to_path_buf(),
        metadata,
        metadata_path,
        body,
        checklist,
        implement_template,
        review_template,
        report_path: spec_dir.join(REPORT_FILE),
        acceptance_commands,
        acceptance_commands_text,
        id,
        name,
    })
}

fn read_template(path: &Path, label: &str) -> Result<String> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("read {label} prompt template {}", path.display()))?;
    for marker in unknown_placeholders(&contents) {
        warn!(template = label, marker = %marker, "template references unknown placeholder");
    }
    Ok(contents)
}

/// Render acceptance commands as a markdown list for prompt embedding.
pub fn format_acceptance_commands(commands: &[String]) -> String {
    if commands.is_empty() {
        return "- (none specified)".to_string();
    }
    commands
        .iter()
        .map(|cmd| format!("- {cmd}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn extract_spec_title(markdown: &str) -> Option<String> {
    for line in markdown.lines() {
        let trimmed = line.trim();
        if let Some(title) = trimmed.strip_prefix("# ") {
            return Some(title.trim().to_string());
        }
    }
    None
}
