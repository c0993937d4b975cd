//! Worker/verifier attempt loop for spec-driven implementation.
//!
//! This crate drives an autonomous "implement then verify" loop: a worker
//! agent is prompted to satisfy a spec, a read-only verifier agent judges the
//! result through a rigid two-line protocol, and the loop retries with the
//! verifier's remaining tasks until acceptance or attempt exhaustion. The
//! architecture enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (types, verdict parsing,
//!   templating, eligibility). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (metadata store, spec resources,
//!   process execution, line streaming). Isolated to enable mocking in tests.
//!
//! The orchestration module ([`run`]) coordinates core logic with I/O to
//! implement the attempt loop consumed by the CLI.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod run;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
