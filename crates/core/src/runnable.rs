//! Runnable trait — the abstraction over code execution strategies.
//!
//! The orchestration loop only sees `Runnable`; whether code runs in a
//! subprocess, a container, or a scripted test double is a construction-time
//! choice.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::ExecutorError;

/// How a single execution ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Success,
    /// The code raised a runtime error (non-zero exit).
    Failed { message: String },
    /// The wall-clock ceiling expired and the run was killed.
    TimedOut {
        #[serde(with = "duration_secs")]
        after: Duration,
    },
}

/// The result of executing one code block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Captured stdout on success, the error text otherwise.
    pub output: String,

    /// The final code: verbatim on success, with an appended error comment
    /// on failure or timeout.
    pub code: String,

    pub outcome: ExecutionOutcome,

    /// Everything written to stdout before the run ended, whatever the outcome.
    pub stdout: String,

    #[serde(with = "duration_secs")]
    pub elapsed: Duration,
}

impl ExecutionResult {
    /// A clean run: output echoes stdout, code is untouched.
    pub fn success(code: &str, stdout: String, elapsed: Duration) -> Self {
        Self {
            output: stdout.clone(),
            code: code.to_string(),
            outcome: ExecutionOutcome::Success,
            stdout,
            elapsed,
        }
    }

    /// A failed or timed-out run. The error text becomes the output and is
    /// appended to the code as a comment so the cached artifact documents
    /// its own failure.
    pub fn failure(
        code: &str,
        outcome: ExecutionOutcome,
        stdout: String,
        elapsed: Duration,
        comment_prefix: &str,
    ) -> Self {
        let message = outcome.error_text().unwrap_or_default();
        Self {
            code: annotate(code, &message, comment_prefix),
            output: message,
            outcome,
            stdout,
            elapsed,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == ExecutionOutcome::Success
    }
}

impl ExecutionOutcome {
    /// The user-visible error text, or `None` for a clean run.
    pub fn error_text(&self) -> Option<String> {
        match self {
            Self::Success => None,
            Self::Failed { message } => Some(message.clone()),
            Self::TimedOut { after } => Some(format!(
                "Execution timed out after {}",
                format_duration(*after)
            )),
        }
    }
}

/// Append `<prefix> Error: <message>` to `code`, separated by a blank line.
///
/// Multi-line messages are folded onto one line so the comment stays a
/// single valid comment in line-comment languages.
pub fn annotate(code: &str, message: &str, comment_prefix: &str) -> String {
    let folded = message.lines().collect::<Vec<_>>().join(" ");
    format!("{code}\n\n{comment_prefix} Error: {folded}")
}

fn format_duration(d: Duration) -> String {
    if d.subsec_millis() == 0 {
        format!("{}s", d.as_secs())
    } else {
        format!("{}ms", d.as_millis())
    }
}

/// A strategy for running generated source text.
///
/// Implementations must enforce their own time ceiling: `run` must return
/// in bounded time even if the code never terminates.
#[async_trait]
pub trait Runnable: Send + Sync {
    /// A human-readable name (e.g., "subprocess:python3").
    fn name(&self) -> &str;

    /// Execute `code`. Errors in the code itself come back as a failed
    /// [`ExecutionResult`]; `Err` is reserved for infrastructure problems.
    async fn run(&self, code: &str) -> std::result::Result<ExecutionResult, ExecutorError>;
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Ok(Duration::from_secs_f64(secs.max(0.0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_echoes_stdout() {
        let r = ExecutionResult::success("print(1)", "1\n".into(), Duration::from_millis(5));
        assert_eq!(r.output, "1\n");
        assert_eq!(r.code, "print(1)");
        assert!(r.is_success());
    }

    #[test]
    fn failure_replaces_output_and_annotates_code() {
        let r = ExecutionResult::failure(
            "print(1/0)",
            ExecutionOutcome::Failed {
                message: "ZeroDivisionError: division by zero".into(),
            },
            String::new(),
            Duration::from_millis(5),
            "#",
        );
        assert_eq!(r.output, "ZeroDivisionError: division by zero");
        assert_eq!(
            r.code,
            "print(1/0)\n\n# Error: ZeroDivisionError: division by zero"
        );
        assert!(!r.is_success());
    }

    #[test]
    fn timeout_text_names_the_ceiling() {
        let outcome = ExecutionOutcome::TimedOut {
            after: Duration::from_secs(30),
        };
        assert_eq!(
            outcome.error_text().as_deref(),
            Some("Execution timed out after 30s")
        );

        let short = ExecutionOutcome::TimedOut {
            after: Duration::from_millis(250),
        };
        assert_eq!(
            short.error_text().as_deref(),
            Some("Execution timed out after 250ms")
        );
    }

    #[test]
    fn timeout_keeps_partial_stdout() {
        let r = ExecutionResult::failure(
            "loop",
            ExecutionOutcome::TimedOut {
                after: Duration::from_secs(1),
            },
            "partial\n".into(),
            Duration::from_secs(1),
            "--",
        );
        assert_eq!(r.stdout, "partial\n");
        assert!(r.code.ends_with("-- Error: Execution timed out after 1s"));
    }

    #[test]
    fn annotate_folds_multiline_messages() {
        let code = annotate("x", "line one\nline two", "#");
        assert_eq!(code, "x\n\n# Error: line one line two");
    }

    #[test]
    fn outcome_serializes_tagged() {
        let json = serde_json::to_string(&ExecutionOutcome::Failed {
            message: "boom".into(),
        })
        .unwrap();
        assert!(json.contains(r#""kind":"failed""#));
    }
}
