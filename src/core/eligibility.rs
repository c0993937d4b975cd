//! Dependency eligibility for specs.
//!
//! Consulted by callers before starting a run; the attempt loop itself never
//! checks dependencies, which keeps it usable outside interactive contexts.

use std::collections::HashMap;

use crate::core::types::{SpecMetadata, SpecStatus};

/// Whether a spec may be run, and which dependencies stand in the way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eligibility {
    /// False when the spec is already `done` or `in-progress`.
    pub runnable: bool,
    /// Dependency ids that are not `done` (or unknown), in declaration order.
    pub unmet_deps: Vec<String>,
}

impl Eligibility {
    /// Runnable with every dependency satisfied.
    pub fn is_clean(&self) -> bool {
        self.runnable && self.unmet_deps.is_empty()
    }
}

/// Build a status lookup from a set of spec records.
pub fn status_index(records: &[SpecMetadata]) -> HashMap<String, SpecStatus> {
    records
        .iter()
        .map(|meta| (meta.id.clone(), meta.status))
        .collect()
}

/// Evaluate eligibility for one spec against the known statuses.
///
/// A dependency that does not appear in `status_by_id` counts as unmet.
pub fn evaluate(meta: &SpecMetadata, status_by_id: &HashMap<String, SpecStatus>) -> Eligibility {
    if matches!(meta.status, SpecStatus::Done | SpecStatus::InProgress) {
        return Eligibility {
            runnable: false,
            unmet_deps: Vec::new(),
        };
    }

    let unmet_deps = meta
        .depends_on
        .iter()
        .filter(|dep| status_by_id.get(dep.as_str()) != Some(&SpecStatus::Done))
        .cloned()
        .collect();

    Eligibility {
        runnable: true,
        unmet_deps,
    }
}
