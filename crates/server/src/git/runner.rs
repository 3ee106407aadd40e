// External command execution.
//
// Every git invocation goes through `CommandRunner`: an ordered argv vector
// handed to the process verbatim (no shell), a hard deadline, and merged
// stdout/stderr capture. The launcher behind it is a trait so tests can
// substitute canned results.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{error, info};

/// Raw capture of one finished process.
#[derive(Debug, PartialEq, Eq)]
pub struct ExecutedCommand {
    /// Exit code; `None` when the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Outcome of a command that ran to completion, merged for logging and
/// response construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `None` when the process was killed by a signal.
    pub code: Option<i32>,
    /// Captured stdout followed by stderr.
    pub text: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RunnerError {
    #[error("failed to spawn `{command}`: {message}")]
    Spawn { command: String, message: String },

    #[error("`{command}` exceeded the {timeout_secs}s deadline")]
    TimedOut { command: String, timeout_secs: u64 },
}

/// Process launcher behind the runner.
///
/// Production spawns through tokio. Tests inject a mock that records the
/// argv vectors it sees and replays canned results.
pub trait CommandExecutor: Send + Sync {
    fn execute(
        &self,
        argv: &[String],
    ) -> Pin<Box<dyn Future<Output = Result<ExecutedCommand, std::io::Error>> + Send>>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessCommandExecutor;

impl CommandExecutor for ProcessCommandExecutor {
    fn execute(
        &self,
        argv: &[String],
    ) -> Pin<Box<dyn Future<Output = Result<ExecutedCommand, std::io::Error>> + Send>> {
        let argv = argv.to_vec();
        Box::pin(async move {
            let (program, args) = argv.split_first().ok_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty argv")
            })?;
            // kill_on_drop reaps the child when the deadline cancels this
            // future; GIT_TERMINAL_PROMPT=0 fails fast instead of hanging
            // on a credential prompt.
            let output = tokio::process::Command::new(program)
                .args(args)
                .env("GIT_TERMINAL_PROMPT", "0")
                .kill_on_drop(true)
                .output()
                .await?;
            Ok(ExecutedCommand {
                code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        })
    }
}

/// Runs argv vectors under a deadline and captures their output.
#[derive(Clone)]
pub struct CommandRunner {
    executor: Arc<dyn CommandExecutor>,
    timeout: Duration,
}

impl CommandRunner {
    pub fn new(timeout: Duration) -> Self {
        Self::with_executor(Arc::new(ProcessCommandExecutor), timeout)
    }

    pub fn with_executor(executor: Arc<dyn CommandExecutor>, timeout: Duration) -> Self {
        Self { executor, timeout }
    }

    /// Run one argv vector to completion.
    ///
    /// A non-zero exit is not an error at this layer: the caller gets the
    /// captured output either way and decides what a failure means. Errors
    /// are reserved for commands that never produced an exit status.
    pub async fn run(&self, argv: &[String]) -> Result<CommandOutput, RunnerError> {
        let command = argv.join(" ");

        let executed = match tokio::time::timeout(self.timeout, self.executor.execute(argv)).await
        {
            Ok(Ok(executed)) => executed,
            Ok(Err(io_error)) => {
                error!(%command, error = %io_error, "failed to spawn command");
                return Err(RunnerError::Spawn { command, message: io_error.to_string() });
            }
            Err(_) => {
                let timeout_secs = self.timeout.as_secs();
                error!(%command, timeout_secs, "command exceeded deadline, killed");
                return Err(RunnerError::TimedOut { command, timeout_secs });
            }
        };

        let mut text = executed.stdout;
        if !executed.stderr.is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&executed.stderr);
        }

        let output = CommandOutput { code: executed.code, text };
        info!(%command, code = ?output.code, output = %output.text.trim(), "command finished");
        if !output.success() {
            error!(%command, code = ?output.code, "command exited with failure");
        }

        Ok(output)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{exit, HangingExecutor, MockExecutor};
    use super::*;

    fn argv(tokens: &[&str]) -> Vec<String> {
        tokens.iter().map(|token| token.to_string()).collect()
    }

    #[tokio::test]
    async fn run_passes_argv_through_and_merges_output() {
        let mock = MockExecutor::new(vec![exit(0, "Fetching origin\n", "up to date\n")]);
        let runner =
            CommandRunner::with_executor(Arc::new(mock.clone()), Duration::from_secs(5));

        let output = runner
            .run(&argv(&["git", "--git-dir", "/srv/repoA.git", "remote", "update", "origin"]))
            .await
            .expect("run should succeed");

        assert!(output.success());
        assert_eq!(output.text, "Fetching origin\nup to date\n");
        assert_eq!(
            mock.call_argvs(),
            vec![argv(&["git", "--git-dir", "/srv/repoA.git", "remote", "update", "origin"])]
        );
    }

    #[tokio::test]
    async fn merged_text_joins_streams_with_newline() {
        let mock = MockExecutor::new(vec![exit(0, "stdout line", "stderr line\n")]);
        let runner =
            CommandRunner::with_executor(Arc::new(mock), Duration::from_secs(5));

        let output = runner.run(&argv(&["git", "fetch"])).await.expect("run should succeed");
        assert_eq!(output.text, "stdout line\nstderr line\n");
    }

    #[tokio::test]
    async fn stderr_only_output_is_kept_as_is() {
        let mock = MockExecutor::new(vec![exit(1, "", "fatal: not a git repository\n")]);
        let runner =
            CommandRunner::with_executor(Arc::new(mock), Duration::from_secs(5));

        let output = runner.run(&argv(&["git", "fetch"])).await.expect("run should succeed");
        assert_eq!(output.text, "fatal: not a git repository\n");
    }

    #[tokio::test]
    async fn nonzero_exit_is_an_output_not_an_error() {
        let mock = MockExecutor::new(vec![exit(128, "", "fatal: repository not found\n")]);
        let runner =
            CommandRunner::with_executor(Arc::new(mock), Duration::from_secs(5));

        let output = runner
            .run(&argv(&["git", "clone", "--mirror", "https://example.com/missing", "/tmp/x"]))
            .await
            .expect("non-zero exit should still return output");

        assert!(!output.success());
        assert_eq!(output.code, Some(128));
        assert!(output.text.contains("repository not found"));
    }

    #[tokio::test]
    async fn spawn_failure_names_the_command() {
        let mock = MockExecutor::new(vec![Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "no such file",
        ))]);
        let runner =
            CommandRunner::with_executor(Arc::new(mock), Duration::from_secs(5));

        let error = runner
            .run(&argv(&["git", "fetch"]))
            .await
            .expect_err("spawn failure should be surfaced");

        match error {
            RunnerError::Spawn { command, message } => {
                assert_eq!(command, "git fetch");
                assert!(message.contains("no such file"));
            }
            other => panic!("expected Spawn, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn deadline_kills_commands_that_never_finish() {
        let runner = CommandRunner::with_executor(
            Arc::new(HangingExecutor),
            Duration::from_millis(20),
        );

        let error = runner
            .run(&argv(&["git", "fetch"]))
            .await
            .expect_err("hanging command should hit the deadline");

        assert_eq!(
            error,
            RunnerError::TimedOut { command: "git fetch".to_string(), timeout_secs: 0 }
        );
    }
}
