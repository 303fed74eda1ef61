//! Child process execution with cooperative cancellation.
//!
//! Every external command goes through [`run_streaming`]: stdout is consumed
//! line by line as it arrives, stderr is collected on a side task, and the
//! shared [`CancellationToken`] is checked at every suspension point. A
//! cancelled child is killed together with its process group (`go test`
//! forks the compiled test binary) and the runner returns immediately,
//! without waiting for the processes to exit. The same happens when the
//! runner's future is dropped half way, e.g. by a stream of sibling package listings.

use log::debug;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;

use crate::domain::ToolchainError;

/// Description of a command to run: program, arguments and working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: PathBuf,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>, cwd: impl Into<PathBuf>) -> Self {
        Self { program: program.into(), args: Vec::new(), cwd: cwd.into() }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn cwd(&self) -> &Path {
        &self.cwd
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Captured result of a finished command.
///
/// A non-zero exit is not an error at this level; callers decide what a
/// failing status means for their command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when the process was killed by a signal
    pub code: Option<i32>,
    /// Collected stdout (empty when lines were streamed to a callback)
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    #[must_use]
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Human-readable exit status for error messages
    #[must_use]
    pub fn status_label(&self) -> String {
        self.code.map_or_else(|| "signal".to_string(), |c| format!("exit status {c}"))
    }

    /// Stderr if present, otherwise the tail of stdout (`go test` reports
    /// build and benchmark failures on stdout).
    #[must_use]
    pub fn diagnostics(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        let lines: Vec<&str> = self.stdout.trim().lines().collect();
        let tail = lines.len().saturating_sub(MAX_DIAGNOSTIC_LINES);
        lines[tail..].join("\n")
    }
}

/// Lines of stdout kept in diagnostics when stderr is empty
const MAX_DIAGNOSTIC_LINES: usize = 20;

/// Run a command to completion and collect its stdout.
///
/// # Errors
/// `ToolchainError::SpawnFailed` if the program cannot be started,
/// `ToolchainError::Cancelled` if `cancel` fires first.
pub async fn run(spec: &CommandSpec, cancel: &CancellationToken) -> Result<CommandOutput, ToolchainError> {
    let mut stdout = String::new();
    let mut output = run_streaming(spec, cancel, &mut |line: &str| {
        stdout.push_str(line);
        stdout.push('\n');
    })
    .await?;
    output.stdout = stdout;
    Ok(output)
}

/// Run a command, handing each stdout line to `on_line` as soon as it is read.
///
/// # Errors
/// `ToolchainError::SpawnFailed` if the program cannot be started,
/// `ToolchainError::Cancelled` if `cancel` fires before the process exits,
/// `ToolchainError::Io` if reading its output fails.
pub async fn run_streaming(
    spec: &CommandSpec,
    cancel: &CancellationToken,
    on_line: &mut (dyn FnMut(&str) + Send),
) -> Result<CommandOutput, ToolchainError> {
    if cancel.is_cancelled() {
        return Err(ToolchainError::Cancelled(spec.to_string()));
    }

    debug!("spawn: {spec} (in {})", spec.cwd.display());

    let mut command = Command::new(&spec.program);
    command
        .args(&spec.args)
        .current_dir(&spec.cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    command.process_group(0);

    let child = command.spawn().map_err(|source| ToolchainError::SpawnFailed {
        program: spec.program.display().to_string(),
        source,
    })?;
    let mut child = GroupChild::new(child);

    let stdout = child.inner.stdout.take().ok_or_else(|| std::io::Error::other("stdout not piped"))?;
    let mut stderr = child.inner.stderr.take().ok_or_else(|| std::io::Error::other("stderr not piped"))?;

    let mut stderr_task = tokio::spawn(async move {
        let mut buffer = String::new();
        stderr.read_to_string(&mut buffer).await.map(|_| buffer)
    });

    let mut lines = BufReader::new(stdout).lines();
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(ToolchainError::Cancelled(spec.to_string())),
            line = lines.next_line() => match line? {
                Some(line) => on_line(&line),
                None => break,
            },
        }
    }

    let status = tokio::select! {
        biased;
        () = cancel.cancelled() => return Err(ToolchainError::Cancelled(spec.to_string())),
        status = child.wait() => status?,
    };

    // A leftover grandchild can hold stderr open after the child exited
    let stderr = tokio::select! {
        biased;
        () = cancel.cancelled() => {
            child.terminate();
            return Err(ToolchainError::Cancelled(spec.to_string()));
        }
        joined = &mut stderr_task => joined.ok().and_then(Result::ok).unwrap_or_default(),
    };

    Ok(CommandOutput { code: status.code(), stdout: String::new(), stderr })
}

/// A spawned child leading its own process group.
///
/// Dropping it before the child was reaped kills the whole group, so every
/// early return and every dropped future takes `go test`'s compiler and
/// test-binary children down with it.
struct GroupChild {
    inner: Child,
    /// Captured at spawn: `Child::id` is gone once the child is reaped
    pid: Option<u32>,
    reaped: bool,
}

impl GroupChild {
    fn new(inner: Child) -> Self {
        let pid = inner.id();
        Self { inner, pid, reaped: false }
    }

    async fn wait(&mut self) -> std::io::Result<std::process::ExitStatus> {
        let status = self.inner.wait().await?;
        self.reaped = true;
        Ok(status)
    }

    /// Kill the child and everything in its process group without waiting for exit.
    fn terminate(&mut self) {
        #[cfg(unix)]
        if let Some(pid) = self.pid.and_then(|id| libc::pid_t::try_from(id).ok()) {
            // SAFETY: killpg only sends a signal; the group was created for this child
            #[allow(unsafe_code)]
            let rc = unsafe { libc::killpg(pid, libc::SIGKILL) };
            if rc != 0 {
                debug!("killpg({pid}) failed: {}", std::io::Error::last_os_error());
            }
        }
        if !self.reaped {
            if let Err(e) = self.inner.start_kill() {
                debug!("kill failed: {e}");
            }
        }
    }
}

impl Drop for GroupChild {
    fn drop(&mut self) {
        if !self.reaped {
            self.terminate();
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new("sh", std::env::temp_dir()).arg("-c").arg(script)
    }

    #[tokio::test]
    async fn test_run_collects_stdout_and_status() {
        let output = run(&sh("echo one; echo two"), &CancellationToken::new()).await.unwrap();
        assert!(output.success());
        assert_eq!(output.stdout, "one\ntwo\n");
    }

    #[tokio::test]
    async fn test_streaming_delivers_lines_in_order() {
        let mut seen = Vec::new();
        let output = run_streaming(
            &sh("printf 'a\\nb\\nc\\n'"),
            &CancellationToken::new(),
            &mut |line: &str| seen.push(line.to_string()),
        )
        .await
        .unwrap();
        assert!(output.success());
        assert!(output.stdout.is_empty());
        assert_eq!(seen, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_not_an_error() {
        let output = run(&sh("echo oops >&2; exit 3"), &CancellationToken::new()).await.unwrap();
        assert_eq!(output.code, Some(3));
        assert_eq!(output.diagnostics(), "oops");
        assert_eq!(output.status_label(), "exit status 3");
    }

    #[tokio::test]
    async fn test_missing_program_fails_to_spawn() {
        let spec = CommandSpec::new("/nonexistent/allochud-tool", std::env::temp_dir());
        let err = run(&spec, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ToolchainError::SpawnFailed { .. }));
    }

    #[tokio::test]
    async fn test_cancellation_returns_promptly() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let err = run(&sh("sleep 30"), &cancel).await.unwrap_err();
        assert!(err.is_cancelled());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_already_cancelled_token_never_spawns() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let marker = tempfile::NamedTempFile::new().unwrap();
        let path = marker.path().to_path_buf();
        drop(marker);

        let spec = sh(&format!("touch {}", path.display()));
        assert!(run(&spec, &cancel).await.unwrap_err().is_cancelled());
        assert!(!path.exists());
    }

    /// Pid written by a script's background job, once it has started
    #[cfg(target_os = "linux")]
    fn read_pid(path: &Path) -> u32 {
        std::fs::read_to_string(path).unwrap().trim().parse().unwrap()
    }

    /// Whether the process left the live set (gone, or a zombie) within `limit`
    #[cfg(target_os = "linux")]
    async fn exited_within(pid: u32, limit: Duration) -> bool {
        let started = Instant::now();
        loop {
            match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
                Err(_) => return true,
                Ok(stat) if stat.rsplit_once(") ").is_some_and(|(_, rest)| rest.starts_with('Z')) => return true,
                Ok(_) => {}
            }
            if started.elapsed() > limit {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_dropped_runner_kills_grandchildren() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("grandchild.pid");
        let spec = sh(&format!("sleep 300 & echo $! > {}; wait", pid_file.display()));

        let cancel = CancellationToken::new();
        let mut ignore = |_: &str| {};
        let running = run_streaming(&spec, &cancel, &mut ignore);
        assert!(tokio::time::timeout(Duration::from_millis(500), running).await.is_err());

        let pid = read_pid(&pid_file);
        assert!(exited_within(pid, Duration::from_secs(2)).await, "grandchild {pid} still running");
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_cancel_while_grandchild_holds_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("grandchild.pid");
        // The shell exits at once; its background job keeps stderr open
        let spec = sh(&format!("sleep 300 >/dev/null & echo $! > {}; exit 0", pid_file.display()));

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let err = run(&spec, &cancel).await.unwrap_err();
        assert!(err.is_cancelled());
        assert!(started.elapsed() < Duration::from_secs(5));

        let pid = read_pid(&pid_file);
        assert!(exited_within(pid, Duration::from_secs(2)).await, "grandchild {pid} still running");
    }

    #[test]
    fn test_diagnostics_falls_back_to_stdout_tail() {
        let output = CommandOutput {
            code: Some(1),
            stdout: "--- FAIL: BenchmarkX\nFAIL\n".to_string(),
            stderr: String::new(),
        };
        assert_eq!(output.diagnostics(), "--- FAIL: BenchmarkX\nFAIL");
    }
}
