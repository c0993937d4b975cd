//! Decoder for the verifier's two-line response protocol.
//!
//! The verifier's reply is free text except for its first two non-blank lines:
//! a status line (`STATUS: ok` or `STATUS: missing`) and a JSON object carrying
//! `remainingTasks`. Everything after those lines is commentary. The contract
//! is rigid on purpose: it is the only structured signal extracted from the
//! agent's output, and lax parsing here would silently misread agent intent.

use serde::Deserialize;

use crate::core::types::VerifierStatus;

/// Parsed verifier response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub status: VerifierStatus,
    pub remaining_tasks: Vec<String>,
}

/// Protocol violations in the verifier response. None of these are retryable:
/// they indicate a broken agent or template, not a transient task failure.
#[derive(Debug, thiserror::Error)]
pub enum VerdictError {
    #[error("verifier output missing required lines")]
    MissingLines,
    #[error("unexpected verifier status line: {0}")]
    UnrecognizedStatus(String),
    #[error("parse verifier payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct Payload {
    #[serde(default, rename = "remainingTasks")]
    remaining_tasks: Vec<String>,
}

/// Parse a raw verifier response into a [`Verdict`].
pub fn parse_verifier_output(output: &str) -> Result<Verdict, VerdictError> {
    let filtered: Vec<&str> = output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    if filtered.len() < 2 {
        return Err(VerdictError::MissingLines);
    }

    let status = match filtered[0] {
        "STATUS: ok" => VerifierStatus::Ok,
        "STATUS: missing" => VerifierStatus::Missing,
        other => return Err(VerdictError::UnrecognizedStatus(other.to_string())),
    };

    let payload: Payload = serde_json::from_str(filtered[1])?;

    Ok(Verdict {
        status,
        remaining_tasks: payload.remaining_tasks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ok_with_empty_tasks() {
        let verdict =
            parse_verifier_output("STATUS: ok\n{\"remainingTasks\":[]}\n").expect("parse");
        assert_eq!(verdict.status, VerifierStatus::Ok);
        assert!(verdict.remaining_tasks.is_empty());
    }

    #[test]
    fn parses_missing_with_tasks_in_order() {
        let verdict = parse_verifier_output(
            "STATUS: missing\n{\"remainingTasks\":[\"wire config\",\"add tests\"]}\n",
        )
        .expect("parse");
        assert_eq!(verdict.status, VerifierStatus::Missing);
        assert_eq!(verdict.remaining_tasks, vec!["wire config", "add tests"]);
    }

    #[test]
    fn skips_blank_lines_before_protocol_lines() {
        let verdict = parse_verifier_output("\n\n  \nSTATUS: ok\n\n{}\n").expect("parse");
        assert_eq!(verdict.status, VerifierStatus::Ok);
        assert!(verdict.remaining_tasks.is_empty());
    }

    #[test]
    fn absent_field_defaults_to_empty_not_error() {
        let verdict = parse_verifier_output("STATUS: missing\n{}\n").expect("parse");
        assert!(verdict.remaining_tasks.is_empty());
    }

    #[test]
    fn trailing_commentary_is_ignored() {
        let verdict = parse_verifier_output(
            "STATUS: ok\n{\"remainingTasks\":[]}\nLooks good overall.\nNice tests.\n",
        )
        .expect("parse");
        assert_eq!(verdict.status, VerifierStatus::Ok);
    }

    #[test]
    fn rejects_unrecognized_status_line() {
        let err = parse_verifier_output("STATUS: unknown\n{}\n").expect_err("must fail");
        match err {
            VerdictError::UnrecognizedStatus(line) => assert_eq!(line, "STATUS: unknown"),
            other => panic!("expected UnrecognizedStatus, got {other:?}"),
        }
    }

    #[test]
    fn rejects_malformed_payload() {
        let err = parse_verifier_output("STATUS: ok\nnot json\n").expect_err("must fail");
        assert!(matches!(err, VerdictError::MalformedPayload(_)));
    }

    #[test]
    fn rejects_non_object_payload() {
        let err = parse_verifier_output("STATUS: ok\n[\"task\"]\n").expect_err("must fail");
        assert!(matches!(err, VerdictError::MalformedPayload(_)));
    }

    #[test]
    fn rejects_single_line_output() {
        let err = parse_verifier_output("STATUS: ok\n").expect_err("must fail");
        assert!(matches!(err, VerdictError::MissingLines));
    }
}
