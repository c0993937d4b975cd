//! Stable exit codes for foreman CLI commands.

/// Command succeeded; for `run`, the verifier accepted the spec.
pub const OK: i32 = 0;
/// Invalid configuration, executor failure, protocol violation, or other errors.
pub const INVALID: i32 = 1;
/// `foreman run` consumed every attempt without a verifier `ok`.
pub const EXHAUSTED: i32 = 2;
/// `foreman run` refused to start: spec not runnable or dependencies unmet.
pub const BLOCKED: i32 = 3;
