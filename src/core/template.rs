//! Placeholder substitution for human-editable prompt templates.
//!
//! Templates use `{{NAME}}` markers. Substitution is plain text replacement so
//! templates can evolve independently of the call sites: markers missing from
//! the replacement map are left verbatim, never an error. Loaders should call
//! [`unknown_placeholders`] and surface unexpected markers as warnings.

use std::sync::LazyLock;

use regex::Regex;

/// Every placeholder the runner knows how to fill.
pub const KNOWN_PLACEHOLDERS: &[&str] = &[
    "{{SPEC_ID}}",
    "{{SPEC_NAME}}",
    "{{SPEC_BODY}}",
    "{{ACCEPTANCE_COMMANDS}}",
    "{{ACCEPTANCE_CHECKLIST}}",
    "{{PREVIOUS_REMAINING_TASKS}}",
    "{{IMPLEMENTATION_REPORT}}",
    "{{MODE}}",
];

/// Replace every occurrence of every `(marker, value)` pair in `template`.
pub fn fill_template(template: &str, replacements: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (marker, value) in replacements {
        out = out.replace(marker, value);
    }
    out
}

/// List `{{...}}` markers in `template` outside [`KNOWN_PLACEHOLDERS`],
/// deduplicated in first-seen order.
pub fn unknown_placeholders(template: &str) -> Vec<String> {
    static MARKER_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\{\{[A-Z0-9_]+\}\}").expect("placeholder regex"));

    let mut unknown = Vec::new();
    for found in MARKER_RE.find_iter(template) {
        let marker = found.as_str();
        if KNOWN_PLACEHOLDERS.contains(&marker) {
            continue;
        }
        if !unknown.iter().any(|seen| seen == marker) {
            unknown.push(marker.to_string());
        }
    }
    unknown
}
