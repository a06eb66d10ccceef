//! Subprocess runner — execute generated code with an interpreter.
//!
//! The code is written to a temporary script and run as
//! `<interpreter> <args..> <script>`. Stdout and stderr are drained by
//! background tasks into shared buffers, so whatever the program printed
//! before a failure or a timeout is still available afterwards.

use std::io::Write;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use codeloop_config::ExecutorConfig;
use codeloop_core::error::ExecutorError;
use codeloop_core::runnable::{ExecutionOutcome, ExecutionResult, Runnable};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Default wall-clock ceiling per run.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// How long to keep reading pipes after the process is gone. A forked
/// grandchild can hold them open indefinitely.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

type SharedBuffer = Arc<Mutex<Vec<u8>>>;

/// Runs code in a fresh interpreter process per call.
#[derive(Debug, Clone)]
pub struct SubprocessRunner {
    name: String,
    interpreter: String,
    args: Vec<String>,
    timeout: Duration,
    comment_prefix: String,
    extension: String,
}

impl SubprocessRunner {
    pub fn new(interpreter: impl Into<String>) -> Self {
        let interpreter = interpreter.into();
        Self {
            name: format!("subprocess:{interpreter}"),
            interpreter,
            args: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
            comment_prefix: "#".into(),
            extension: "py".into(),
        }
    }

    /// Build from the `[executor]` config section. `extension` names the
    /// temporary script's suffix.
    pub fn from_config(config: &ExecutorConfig, extension: &str) -> Self {
        Self::new(&config.interpreter)
            .with_args(config.args.clone())
            .with_timeout(Duration::from_secs(config.timeout_secs))
            .with_comment_prefix(&config.comment_prefix)
            .with_extension(extension)
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_comment_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.comment_prefix = prefix.into();
        self
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into().trim_start_matches('.').to_string();
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn write_script(&self, code: &str) -> Result<tempfile::TempPath, ExecutorError> {
        let suffix = format!(".{}", self.extension);
        let mut file = tempfile::Builder::new()
            .prefix("codeloop-")
            .suffix(&suffix)
            .tempfile()
            .map_err(|e| ExecutorError::Io(format!("Failed to create script file: {e}")))?;

        file.write_all(code.as_bytes())
            .and_then(|()| file.flush())
            .map_err(|e| ExecutorError::Io(format!("Failed to write script file: {e}")))?;

        Ok(file.into_temp_path())
    }
}

#[async_trait]
impl Runnable for SubprocessRunner {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, code: &str) -> Result<ExecutionResult, ExecutorError> {
        let script = self.write_script(code)?;

        debug!(
            interpreter = %self.interpreter,
            script = %script.display(),
            timeout_ms = self.timeout.as_millis() as u64,
            "Running code"
        );

        let started = Instant::now();
        let mut child = Command::new(&self.interpreter)
            .args(&self.args)
            .arg(script.as_os_str())
            // Python block-buffers a piped stdout; a killed run would lose it.
            .env("PYTHONUNBUFFERED", "1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ExecutorError::Spawn {
                interpreter: self.interpreter.clone(),
                reason: e.to_string(),
            })?;

        let stdout_buf = SharedBuffer::default();
        let stderr_buf = SharedBuffer::default();
        let mut readers = Vec::with_capacity(2);
        if let Some(pipe) = child.stdout.take() {
            readers.push(spawn_reader(pipe, stdout_buf.clone()));
        }
        if let Some(pipe) = child.stderr.take() {
            readers.push(spawn_reader(pipe, stderr_buf.clone()));
        }

        let status = match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(Ok(status)) => Some(status),
            Ok(Err(e)) => {
                drain(readers).await;
                return Err(ExecutorError::Io(format!("Failed to wait for interpreter: {e}")));
            }
            Err(_) => {
                warn!(timeout_ms = self.timeout.as_millis() as u64, "Execution timed out, killing process");
                if let Err(e) = child.start_kill() {
                    warn!(error = %e, "Failed to kill timed-out process");
                }
                let _ = tokio::time::timeout(DRAIN_GRACE, child.wait()).await;
                None
            }
        };

        drain(readers).await;
        let elapsed = started.elapsed();
        let stdout = take_string(&stdout_buf);
        let stderr = take_string(&stderr_buf);

        let result = match status {
            Some(status) if status.success() => ExecutionResult::success(code, stdout, elapsed),
            Some(status) => ExecutionResult::failure(
                code,
                ExecutionOutcome::Failed {
                    message: error_text(&stderr, status),
                },
                stdout,
                elapsed,
                &self.comment_prefix,
            ),
            None => ExecutionResult::failure(
                code,
                ExecutionOutcome::TimedOut { after: self.timeout },
                stdout,
                elapsed,
                &self.comment_prefix,
            ),
        };

        debug!(
            success = result.is_success(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Execution finished"
        );
        Ok(result)
    }
}

fn spawn_reader<R>(mut pipe: R, sink: SharedBuffer) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = [0u8; 4096];
        loop {
            match pipe.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    let mut sink = sink.lock().unwrap_or_else(|e| e.into_inner());
                    sink.extend_from_slice(&buf[..n]);
                }
            }
        }
    })
}

/// Wait briefly for the readers to hit EOF, then stop them.
async fn drain(readers: Vec<JoinHandle<()>>) {
    let deadline = tokio::time::Instant::now() + DRAIN_GRACE;
    for mut reader in readers {
        if tokio::time::timeout_at(deadline, &mut reader).await.is_err() {
            reader.abort();
        }
    }
}

fn take_string(buf: &SharedBuffer) -> String {
    let bytes = std::mem::take(&mut *buf.lock().unwrap_or_else(|e| e.into_inner()));
    String::from_utf8_lossy(&bytes).into_owned()
}

/// The last non-empty stderr line (where interpreters put the exception),
/// or a description of the exit status.
fn error_text(stderr: &str, status: ExitStatus) -> String {
    if let Some(line) = stderr.lines().rev().map(str::trim).find(|l| !l.is_empty()) {
        return line.to_string();
    }
    match status.code() {
        Some(code) => format!("Process exited with code {code}"),
        None => "Process terminated by a signal".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh() -> SubprocessRunner {
        SubprocessRunner::new("sh").with_extension("sh")
    }

    #[tokio::test]
    async fn success_echoes_stdout() {
        let code = "printf '1\\n2\\n3\\n4\\n5\\n'";
        let result = sh().run(code).await.unwrap();

        assert!(result.is_success());
        assert_eq!(result.output, "1\n2\n3\n4\n5\n");
        assert_eq!(result.stdout, result.output);
        assert_eq!(result.code, code);
    }

    #[tokio::test]
    async fn failure_reports_last_stderr_line() {
        let code = "echo partial\necho first >&2\necho 'Boom: it broke' >&2\nexit 3";
        let result = sh().run(code).await.unwrap();

        assert!(!result.is_success());
        assert_eq!(result.output, "Boom: it broke");
        assert_eq!(result.stdout, "partial\n");
        assert_eq!(result.code, format!("{code}\n\n# Error: Boom: it broke"));
        assert!(matches!(result.outcome, ExecutionOutcome::Failed { .. }));
    }

    #[tokio::test]
    async fn failure_without_stderr_names_exit_code() {
        let result = sh().run("exit 4").await.unwrap();
        assert_eq!(result.output, "Process exited with code 4");
    }

    #[tokio::test]
    async fn division_by_zero_is_annotated() {
        let code = "echo $((1/0))";
        let result = sh().run(code).await.unwrap();

        assert!(!result.is_success());
        assert!(result.output.contains("division by"), "got: {}", result.output);
        assert!(result.code.starts_with(code));
        assert!(result.code.contains("# Error:"));
    }

    #[tokio::test]
    async fn timeout_kills_and_keeps_partial_output() {
        let runner = sh().with_timeout(Duration::from_millis(200));
        let started = Instant::now();
        let result = runner.run("echo started\nsleep 5\necho never").await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(3));
        assert_eq!(
            result.outcome,
            ExecutionOutcome::TimedOut {
                after: Duration::from_millis(200)
            }
        );
        assert_eq!(result.output, "Execution timed out after 200ms");
        assert_eq!(result.stdout, "started\n");
        assert!(result.code.ends_with("# Error: Execution timed out after 200ms"));
    }

    #[tokio::test]
    async fn python_output_survives_timeout() {
        if std::process::Command::new("python3").arg("--version").output().is_err() {
            return;
        }
        let runner = SubprocessRunner::new("python3").with_timeout(Duration::from_millis(1500));
        let result = runner
            .run("import time\nprint('started')\ntime.sleep(10)\n")
            .await
            .unwrap();

        assert!(matches!(result.outcome, ExecutionOutcome::TimedOut { .. }));
        assert_eq!(result.stdout, "started\n");
    }

    #[tokio::test]
    async fn custom_comment_prefix() {
        let runner = sh().with_comment_prefix("//");
        let result = runner.run("exit 1").await.unwrap();
        assert!(result.code.ends_with("// Error: Process exited with code 1"));
    }

    #[tokio::test]
    async fn missing_interpreter_is_infrastructure_error() {
        let runner = SubprocessRunner::new("codeloop-no-such-interpreter");
        let err = runner.run("print(1)").await.unwrap_err();
        assert!(matches!(err, ExecutorError::Spawn { .. }));
    }

    #[test]
    fn from_config_applies_settings() {
        let config = ExecutorConfig {
            interpreter: "python3".into(),
            args: vec!["-u".into()],
            timeout_secs: 10,
            languages: vec!["python".into()],
            comment_prefix: "#".into(),
        };
        let runner = SubprocessRunner::from_config(&config, ".py");
        assert_eq!(runner.name(), "subprocess:python3");
        assert_eq!(runner.timeout(), Duration::from_secs(10));
        assert_eq!(runner.args, vec!["-u".to_string()]);
        assert_eq!(runner.extension, "py");
    }

    #[test]
    fn error_text_skips_trailing_blank_lines() {
        let status = std::process::Command::new("sh")
            .args(["-c", "exit 1"])
            .status()
            .unwrap();
        assert_eq!(
            error_text("Traceback\nZeroDivisionError: division by zero\n\n", status),
            "ZeroDivisionError: division by zero"
        );
    }
}
