use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::Path;
use std::process::{Command, Output, Stdio};
use std::time::Duration;

/// Trait for executing system commands, allowing for mocking in tests
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Execute a command with arguments and return output
    ///
    /// An `Err` means the process could not be started at all.
    fn execute(&self, command: &str, args: &[&str], working_dir: &Path) -> Result<Output>;

    /// Execute a command, killing it once `timeout` elapses
    ///
    /// Returns `Ok(None)` when the deadline was hit.
    async fn execute_with_timeout(
        &self,
        command: &str,
        args: &[&str],
        working_dir: &Path,
        timeout: Duration,
    ) -> Result<Option<Output>>;
}

/// Real command executor using std::process::Command
///
/// Children run in their own process group, so a Ctrl+C in the terminal only
/// reaches cloudport and never interrupts a running engine command.
pub struct RealCommandExecutor;

impl RealCommandExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RealCommandExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandExecutor for RealCommandExecutor {
    fn execute(&self, command: &str, args: &[&str], working_dir: &Path) -> Result<Output> {
        let mut cmd = Command::new(command);
        cmd.args(args).current_dir(working_dir);
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let output = cmd
            .output()
            .with_context(|| format!("Failed to start {}", command))?;

        Ok(output)
    }

    async fn execute_with_timeout(
        &self,
        command: &str,
        args: &[&str],
        working_dir: &Path,
        timeout: Duration,
    ) -> Result<Option<Output>> {
        let mut cmd = tokio::process::Command::new(command);
        cmd.args(args)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd
            .spawn()
            .with_context(|| format!("Failed to start {}", command))?;

        // Dropping the pending future on timeout kills the child
        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(output) => {
                let output =
                    output.with_context(|| format!("Failed to wait for {}", command))?;
                Ok(Some(output))
            }
            Err(_) => {
                tracing::warn!(command, timeout_secs = timeout.as_secs(), "command timed out");
                Ok(None)
            }
        }
    }
}

/// Mock command executor for testing
#[cfg(test)]
pub struct MockCommandExecutor {
    /// Pre-configured outputs for commands
    outputs: std::sync::Mutex<Vec<MockCommandResult>>,
    /// Every command line executed, in order
    calls: std::sync::Mutex<Vec<String>>,
    /// Working directory of each call in `calls`
    dirs: std::sync::Mutex<Vec<std::path::PathBuf>>,
    /// How long each timed command takes
    delay: Duration,
}

#[cfg(test)]
#[derive(Clone, Debug)]
pub struct MockCommandResult {
    /// Prefix of the full command line (command and arguments) to match
    pub command: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    /// Simulate the process failing to start
    pub spawn_error: bool,
    /// Simulate the deadline being hit
    pub timed_out: bool,
}

#[cfg(test)]
impl MockCommandResult {
    pub fn ok(command: &str, stdout: &str) -> Self {
        Self {
            command: command.to_string(),
            exit_code: 0,
            stdout: stdout.to_string(),
            stderr: String::new(),
            spawn_error: false,
            timed_out: false,
        }
    }

    pub fn failed(command: &str, exit_code: i32, stderr: &str) -> Self {
        Self {
            command: command.to_string(),
            exit_code,
            stdout: String::new(),
            stderr: stderr.to_string(),
            spawn_error: false,
            timed_out: false,
        }
    }

    pub fn not_found(command: &str) -> Self {
        Self {
            spawn_error: true,
            ..Self::ok(command, "")
        }
    }

    pub fn timeout(command: &str) -> Self {
        Self {
            timed_out: true,
            ..Self::ok(command, "")
        }
    }
}

#[cfg(test)]
impl MockCommandExecutor {
    pub fn new() -> Self {
        Self::with_outputs(Vec::new())
    }

    pub fn with_outputs(outputs: Vec<MockCommandResult>) -> Self {
        Self {
            outputs: std::sync::Mutex::new(outputs),
            calls: std::sync::Mutex::new(Vec::new()),
            dirs: std::sync::Mutex::new(Vec::new()),
            delay: Duration::ZERO,
        }
    }

    /// Make every timed command take `delay`
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// All command lines executed so far
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Working directory of every call, in the same order as `calls`
    pub fn working_dirs(&self) -> Vec<std::path::PathBuf> {
        self.dirs.lock().unwrap().clone()
    }

    fn take(&self, command: &str, args: &[&str], working_dir: &Path) -> Option<MockCommandResult> {
        let line = std::iter::once(command)
            .chain(args.iter().copied())
            .collect::<Vec<_>>()
            .join(" ");
        // Both locks held so the two lists stay aligned under concurrency
        let mut calls = self.calls.lock().unwrap();
        let mut dirs = self.dirs.lock().unwrap();
        calls.push(line.clone());
        dirs.push(working_dir.to_path_buf());
        drop(dirs);
        drop(calls);

        let mut outputs = self.outputs.lock().unwrap();
        outputs
            .iter()
            .position(|r| line.starts_with(&r.command))
            .map(|i| outputs.remove(i))
    }
}

#[cfg(test)]
impl Default for MockCommandExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[async_trait]
impl CommandExecutor for MockCommandExecutor {
    fn execute(&self, command: &str, args: &[&str], working_dir: &Path) -> Result<Output> {
        match self.take(command, args, working_dir) {
            Some(r) if r.spawn_error => {
                anyhow::bail!("Failed to start {}: No such file or directory", command)
            }
            Some(r) => Ok(Output {
                status: create_exit_status(r.exit_code),
                stdout: r.stdout.into_bytes(),
                stderr: r.stderr.into_bytes(),
            }),
            // Default: successful empty output
            None => Ok(Output {
                status: create_exit_status(0),
                stdout: Vec::new(),
                stderr: Vec::new(),
            }),
        }
    }

    async fn execute_with_timeout(
        &self,
        command: &str,
        args: &[&str],
        working_dir: &Path,
        _timeout: Duration,
    ) -> Result<Option<Output>> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let line_prefix = std::iter::once(command)
            .chain(args.iter().copied())
            .collect::<Vec<_>>()
            .join(" ");
        let timed_out = self
            .outputs
            .lock()
            .unwrap()
            .iter()
            .any(|r| r.timed_out && line_prefix.starts_with(&r.command));
        if timed_out {
            self.take(command, args, working_dir);
            return Ok(None);
        }

        self.execute(command, args, working_dir).map(Some)
    }
}

#[cfg(test)]
fn create_exit_status(code: i32) -> std::process::ExitStatus {
    // ExitStatus can't be constructed directly
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        // Raw wait status carries the exit code in the high byte
        std::process::ExitStatus::from_raw(code << 8)
    }

    #[cfg(windows)]
    {
        use std::os::windows::process::ExitStatusExt;
        std::process::ExitStatus::from_raw(code as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_mock_executor_returns_configured_output() {
        let executor = MockCommandExecutor::with_outputs(vec![MockCommandResult::ok(
            "az group show",
            "{}",
        )]);

        let output = executor
            .execute("az", &["group", "show", "-n", "rg1"], &PathBuf::from("."))
            .unwrap();
        assert_eq!(String::from_utf8_lossy(&output.stdout), "{}");
        assert_eq!(executor.calls(), vec!["az group show -n rg1".to_string()]);
    }

    #[test]
    fn test_mock_executor_default_success() {
        let executor = MockCommandExecutor::new();
        let output = executor.execute("unknown", &[], &PathBuf::from(".")).unwrap();
        assert!(output.status.success());
    }

    #[test]
    fn test_mock_executor_failure_exit_code() {
        let executor = MockCommandExecutor::with_outputs(vec![MockCommandResult::failed(
            "terraform import",
            1,
            "Error: Cannot import non-existent remote object",
        )]);

        let output = executor
            .execute("terraform", &["import", "a.b", "/x"], &PathBuf::from("."))
            .unwrap();
        assert!(!output.status.success());
        assert_eq!(output.status.code(), Some(1));
    }

    #[tokio::test]
    async fn test_mock_executor_spawn_error_and_timeout() {
        let executor = MockCommandExecutor::with_outputs(vec![
            MockCommandResult::not_found("terraform state"),
            MockCommandResult::timeout("terraform import"),
        ]);

        assert!(
            executor
                .execute("terraform", &["state", "rm", "a.b"], &PathBuf::from("."))
                .is_err()
        );
        let result = executor
            .execute_with_timeout(
                "terraform",
                &["import", "a.b", "/x"],
                &PathBuf::from("."),
                Duration::from_secs(1),
            )
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_real_executor_times_out() {
        let executor = RealCommandExecutor::new();
        let started = std::time::Instant::now();
        let result = executor
            .execute_with_timeout(
                "sleep",
                &["5"],
                &PathBuf::from("."),
                Duration::from_millis(200),
            )
            .await
            .unwrap();
        assert!(result.is_none());
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_real_executor_captures_output_within_deadline() {
        let executor = RealCommandExecutor::new();
        let output = executor
            .execute_with_timeout(
                "sh",
                &["-c", "echo out; echo err >&2; exit 3"],
                &PathBuf::from("."),
                Duration::from_secs(10),
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "out");
        assert_eq!(String::from_utf8_lossy(&output.stderr).trim(), "err");
        assert_eq!(output.status.code(), Some(3));
    }

    /// Prints the shell's pid and the process group it runs in
    #[cfg(target_os = "linux")]
    const PRINT_PGID: &str = "echo $$; cut -d' ' -f5 /proc/$$/stat";

    #[cfg(target_os = "linux")]
    fn leads_own_group(output: &Output) -> bool {
        let text = String::from_utf8_lossy(&output.stdout);
        let lines: Vec<&str> = text.lines().map(str::trim).collect();
        lines.len() == 2 && lines[0] == lines[1]
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_real_executor_children_run_in_own_process_group() {
        let executor = RealCommandExecutor::new();

        let timed = executor
            .execute_with_timeout(
                "sh",
                &["-c", PRINT_PGID],
                &PathBuf::from("."),
                Duration::from_secs(10),
            )
            .await
            .unwrap()
            .unwrap();
        assert!(leads_own_group(&timed));

        let plain = executor
            .execute("sh", &["-c", PRINT_PGID], &PathBuf::from("."))
            .unwrap();
        assert!(leads_own_group(&plain));
    }

    #[cfg(unix)]
    #[test]
    fn test_real_executor_missing_binary_is_error() {
        let executor = RealCommandExecutor::new();
        assert!(
            executor
                .execute("cloudport-no-such-binary", &[], &PathBuf::from("."))
                .is_err()
        );
    }
}
