use std::{
    path::{Path, PathBuf},
    process::{ExitStatus, Stdio},
    time::Duration,
};

use tempfile::TempDir;
use tokio::{
    fs,
    io::{AsyncRead, AsyncReadExt, AsyncWriteExt},
    process::Command,
    time::Instant,
};

use crate::{
    constants::{
        ADDRESS_SPACE_HEADROOM, MEMORY_ERROR_MARKER, MEMORY_LIMIT_EXCEEDED_OUTPUT,
        TIME_LIMIT_EXCEEDED_OUTPUT,
    },
    core::{
        domain::{ExecutionResult, ExecutionStatus},
        traits::sandbox::{RunSpec, SandboxError},
    },
};

#[derive(Clone, Debug)]
pub struct ProcessConfig {
    pub interpreter: PathBuf,
    pub source_file_name: String,
    pub scratch_root: PathBuf,
    /// Stderr fragments that mark a failure as a compilation error.
    pub syntax_error_markers: Vec<String>,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct MemoryPolicy {
    /// Zero disables enforcement but keeps sampling.
    pub limit_kb: u64,
    pub poll_interval: Duration,
}

/// Per-run directory holding the materialized source. Removed with
/// everything in it when dropped, whatever the run did.
#[derive(Debug)]
pub(crate) struct ScratchDir {
    dir: TempDir,
    source_path: PathBuf,
}

impl ScratchDir {
    pub async fn create(config: &ProcessConfig, code: &str) -> Result<Self, SandboxError> {
        fs::create_dir_all(&config.scratch_root)
            .await
            .map_err(|e| SandboxError::ScratchDir { msg: e.to_string() })?;

        let dir = tempfile::Builder::new()
            .prefix("judge-")
            .tempdir_in(&config.scratch_root)
            .map_err(|e| SandboxError::ScratchDir { msg: e.to_string() })?;

        let source_path = dir.path().join(&config.source_file_name);
        fs::write(&source_path, code)
            .await
            .map_err(|e| SandboxError::ScratchDir { msg: e.to_string() })?;

        Ok(Self { dir, source_path })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }
}

/// Kills the whole process group on drop, so descendants of the
/// interpreter die with it on every exit path.
#[derive(Debug)]
struct ProcessGroup {
    pgid: Option<libc::pid_t>,
}

impl ProcessGroup {
    fn new(pid: Option<u32>) -> Self {
        Self {
            pgid: pid.and_then(|pid| libc::pid_t::try_from(pid).ok()),
        }
    }

    fn kill(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            // SAFETY: plain syscall; a group that is already gone yields ESRCH.
            unsafe {
                libc::kill(-pgid, libc::SIGKILL);
            }
        }
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

#[derive(Debug)]
pub(crate) enum Termination {
    Exited {
        status: ExitStatus,
        stdout: String,
        stderr: String,
    },
    DeadlineElapsed,
    MemoryExceeded,
}

#[derive(Debug)]
pub(crate) struct RawRun {
    pub termination: Termination,
    pub elapsed: Duration,
    pub peak_memory_kb: u64,
}

/// Runs `spec.code` with the configured interpreter inside a fresh scratch
/// directory and waits for it, the deadline or the memory watcher, whichever
/// comes first.
pub(crate) async fn run_process(
    config: &ProcessConfig,
    spec: &RunSpec,
    memory: Option<MemoryPolicy>,
) -> Result<RawRun, SandboxError> {
    let scratch = ScratchDir::create(config, &spec.code).await?;

    let mut cmd = Command::new(&config.interpreter);
    cmd.arg(scratch.source_path())
        .current_dir(scratch.path())
        .stdin(if spec.input.is_empty() {
            Stdio::null()
        } else {
            Stdio::piped()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .process_group(0);

    if let Some(policy) = memory {
        apply_rlimits(&mut cmd, policy.limit_kb);
    }

    let started = Instant::now();
    let mut child = cmd
        .spawn()
        .map_err(|e| SandboxError::Spawn { msg: e.to_string() })?;
    let mut group = ProcessGroup::new(child.id());
    let pid = child.id();

    if let Some(mut stdin) = child.stdin.take() {
        let input = spec.input.clone();
        tokio::spawn(async move {
            // Programs are free to exit without reading their input.
            if let Err(e) = stdin.write_all(input.as_bytes()).await {
                tracing::debug!("Stdin closed early: {}", e);
            }
        });
    }

    let stdout = child.stdout.take().ok_or_else(|| SandboxError::Io {
        msg: "stdout was not captured".to_string(),
    })?;
    let stderr = child.stderr.take().ok_or_else(|| SandboxError::Io {
        msg: "stderr was not captured".to_string(),
    })?;

    let deadline = Duration::from_millis(spec.limits.time_limit_ms);
    let mut peak_memory_kb = 0;

    let termination = {
        let collect = async {
            let (status, stdout, stderr) =
                tokio::join!(child.wait(), read_all(stdout), read_all(stderr));
            let status = status.map_err(|e| SandboxError::Wait { msg: e.to_string() })?;
            let stdout = stdout.map_err(|e| SandboxError::Io { msg: e.to_string() })?;
            let stderr = stderr.map_err(|e| SandboxError::Io { msg: e.to_string() })?;
            Ok::<_, SandboxError>(Termination::Exited {
                status,
                stdout,
                stderr,
            })
        };

        tokio::select! {
            exited = collect => exited?,
            _ = tokio::time::sleep(deadline) => Termination::DeadlineElapsed,
            _ = watch_memory(pid, memory, &mut peak_memory_kb) => Termination::MemoryExceeded,
        }
    };

    let elapsed = started.elapsed();
    group.kill();

    Ok(RawRun {
        termination,
        elapsed,
        peak_memory_kb,
    })
}

async fn read_all<R: AsyncRead + Unpin>(mut reader: R) -> std::io::Result<String> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).await?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Samples the peak RSS of `pid` until it exceeds the limit. Never resolves
/// without a policy.
async fn watch_memory(pid: Option<u32>, policy: Option<MemoryPolicy>, peak_kb: &mut u64) {
    let (Some(pid), Some(policy)) = (pid, policy) else {
        return std::future::pending().await;
    };

    let status_path = format!("/proc/{pid}/status");
    let mut ticker = tokio::time::interval(policy.poll_interval);

    loop {
        ticker.tick().await;
        let Ok(status) = fs::read_to_string(&status_path).await else {
            continue;
        };
        let Some(rss_kb) =
            parse_status_kb(&status, "VmHWM:").or_else(|| parse_status_kb(&status, "VmRSS:"))
        else {
            continue;
        };

        *peak_kb = (*peak_kb).max(rss_kb);
        if policy.limit_kb > 0 && rss_kb > policy.limit_kb {
            tracing::debug!("RSS {} KB over the {} KB limit", rss_kb, policy.limit_kb);
            return;
        }
    }
}

/// Reads a `kB` field such as `VmHWM:     1234 kB` from `/proc/<pid>/status`.
pub(crate) fn parse_status_kb(status: &str, field: &str) -> Option<u64> {
    status
        .lines()
        .find_map(|line| line.strip_prefix(field))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|value| value.parse().ok())
}

#[cfg(all(target_os = "linux", target_env = "gnu"))]
type RlimitResource = libc::__rlimit_resource_t;
#[cfg(not(all(target_os = "linux", target_env = "gnu")))]
type RlimitResource = libc::c_int;

fn set_rlimit(resource: RlimitResource, value: u64) -> std::io::Result<()> {
    let limit = libc::rlimit {
        rlim_cur: value as libc::rlim_t,
        rlim_max: value as libc::rlim_t,
    };
    // SAFETY: `limit` outlives the call.
    if unsafe { libc::setrlimit(resource, &limit) } != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

fn apply_rlimits(cmd: &mut Command, limit_kb: u64) {
    let address_space = limit_kb
        .saturating_mul(1024)
        .saturating_mul(ADDRESS_SPACE_HEADROOM);

    // SAFETY: the closure runs between fork and exec and only calls
    // setrlimit, which is async-signal-safe.
    unsafe {
        cmd.pre_exec(move || {
            set_rlimit(libc::RLIMIT_CORE, 0)?;
            if address_space > 0 {
                set_rlimit(libc::RLIMIT_AS, address_space)?;
            }
            Ok(())
        });
    }
}

/// Turns a finished process into an [`ExecutionResult`].
///
/// `memory_limit_kb` is `None` when the sandbox does not measure memory, in
/// which case usage is reported as 0.
pub(crate) fn classify(
    raw: RawRun,
    syntax_error_markers: &[String],
    memory_limit_kb: Option<u64>,
) -> ExecutionResult {
    let execution_time_ms = u64::try_from(raw.elapsed.as_millis()).unwrap_or(u64::MAX);
    let memory_used_kb = memory_limit_kb.map_or(0, |_| raw.peak_memory_kb);
    let result = |status, output: String| ExecutionResult {
        output,
        execution_time_ms,
        memory_used_kb,
        status,
    };

    let is_syntax_error =
        |stderr: &str| syntax_error_markers.iter().any(|m| stderr.contains(m.as_str()));
    let out_of_memory = |stderr: &str| {
        memory_limit_kb.is_some_and(|limit| {
            (limit > 0 && raw.peak_memory_kb >= limit) || stderr.contains(MEMORY_ERROR_MARKER)
        })
    };

    match &raw.termination {
        Termination::DeadlineElapsed => result(
            ExecutionStatus::TimeLimitExceeded,
            TIME_LIMIT_EXCEEDED_OUTPUT.to_string(),
        ),
        Termination::MemoryExceeded => result(
            ExecutionStatus::MemoryLimitExceeded,
            MEMORY_LIMIT_EXCEEDED_OUTPUT.to_string(),
        ),
        Termination::Exited { status, stderr, .. } if !status.success() => {
            if out_of_memory(stderr) {
                result(
                    ExecutionStatus::MemoryLimitExceeded,
                    MEMORY_LIMIT_EXCEEDED_OUTPUT.to_string(),
                )
            } else if is_syntax_error(stderr) {
                result(ExecutionStatus::CompilationError, stderr.clone())
            } else if stderr.is_empty() {
                result(ExecutionStatus::RuntimeError, status.to_string())
            } else {
                result(ExecutionStatus::RuntimeError, stderr.clone())
            }
        }
        Termination::Exited { stdout, stderr, .. } if stdout.is_empty() && !stderr.is_empty() => {
            if is_syntax_error(stderr) {
                result(ExecutionStatus::CompilationError, stderr.clone())
            } else {
                result(ExecutionStatus::RuntimeError, stderr.clone())
            }
        }
        Termination::Exited { stdout, stderr, .. } => {
            if !stderr.is_empty() {
                tracing::debug!("Ignoring stderr of a successful run: {}", stderr);
            }
            result(ExecutionStatus::Success, stdout.clone())
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::os::unix::process::ExitStatusExt;

    use super::*;

    /// Interpreter for process-level tests. Tests return early when it is
    /// missing.
    pub(crate) fn python_config(scratch_root: &Path) -> Option<ProcessConfig> {
        let interpreter = std::env::var("PYTHON_PATH").unwrap_or_else(|_| "python3".to_string());
        let available = std::process::Command::new(&interpreter)
            .arg("--version")
            .output()
            .is_ok_and(|out| out.status.success());
        if !available {
            eprintln!("{interpreter} not found, skipping");
            return None;
        }

        Some(ProcessConfig {
            interpreter: interpreter.into(),
            source_file_name: "solution.py".to_string(),
            scratch_root: scratch_root.to_path_buf(),
            syntax_error_markers: vec!["SyntaxError".to_string(), "IndentationError".to_string()],
        })
    }

    fn markers() -> Vec<String> {
        vec!["SyntaxError".to_string(), "IndentationError".to_string()]
    }

    fn exited(code: i32, stdout: &str, stderr: &str) -> RawRun {
        RawRun {
            termination: Termination::Exited {
                // Wait status layout: exit code in the second byte.
                status: ExitStatus::from_raw(code << 8),
                stdout: stdout.to_string(),
                stderr: stderr.to_string(),
            },
            elapsed: Duration::from_millis(42),
            peak_memory_kb: 9000,
        }
    }

    #[test]
    fn test_success_keeps_stdout() {
        let result = classify(exited(0, "3\n", "DeprecationWarning"), &markers(), None);
        assert_eq!(result.status, ExecutionStatus::Success);
        assert_eq!(result.output, "3\n");
        assert_eq!(result.execution_time_ms, 42);
        assert_eq!(result.memory_used_kb, 0);
    }

    #[test]
    fn test_stderr_only_is_runtime_error() {
        let result = classify(exited(0, "", "something odd"), &markers(), None);
        assert_eq!(result.status, ExecutionStatus::RuntimeError);
        assert_eq!(result.output, "something odd");
    }

    #[test]
    fn test_empty_run_succeeds() {
        let result = classify(exited(0, "", ""), &markers(), None);
        assert_eq!(result.status, ExecutionStatus::Success);
        assert_eq!(result.output, "");
    }

    #[test]
    fn test_non_zero_exit() {
        let result = classify(exited(1, "partial", "ZeroDivisionError"), &markers(), None);
        assert_eq!(result.status, ExecutionStatus::RuntimeError);
        assert_eq!(result.output, "ZeroDivisionError");

        let silent = classify(exited(3, "", ""), &markers(), None);
        assert_eq!(silent.status, ExecutionStatus::RuntimeError);
        assert!(silent.output.contains('3'));
    }

    #[test]
    fn test_syntax_error_is_compilation_error() {
        let stderr = "  File \"solution.py\", line 1\n    print(\nSyntaxError: '(' was never closed";
        let result = classify(exited(1, "", stderr), &markers(), None);
        assert_eq!(result.status, ExecutionStatus::CompilationError);
        assert_eq!(result.output, stderr);
    }

    #[test]
    fn test_deadline_discards_partial_output() {
        let raw = RawRun {
            termination: Termination::DeadlineElapsed,
            elapsed: Duration::from_millis(1001),
            peak_memory_kb: 0,
        };
        let result = classify(raw, &markers(), None);
        assert_eq!(result.status, ExecutionStatus::TimeLimitExceeded);
        assert_eq!(result.output, TIME_LIMIT_EXCEEDED_OUTPUT);
    }

    #[test]
    fn test_memory_classification() {
        let raw = RawRun {
            termination: Termination::MemoryExceeded,
            elapsed: Duration::from_millis(10),
            peak_memory_kb: 70000,
        };
        let result = classify(raw, &markers(), Some(65536));
        assert_eq!(result.status, ExecutionStatus::MemoryLimitExceeded);
        assert_eq!(result.memory_used_kb, 70000);

        let refused = classify(exited(1, "", "MemoryError"), &markers(), Some(65536));
        assert_eq!(refused.status, ExecutionStatus::MemoryLimitExceeded);
        assert_eq!(refused.memory_used_kb, 9000);

        // Without measurement the same stderr is an ordinary crash.
        let unmeasured = classify(exited(1, "", "MemoryError"), &markers(), None);
        assert_eq!(unmeasured.status, ExecutionStatus::RuntimeError);
    }

    #[test]
    fn test_parse_status_kb() {
        let status = "Name:\tpython3\nVmPeak:\t  20000 kB\nVmHWM:\t    9120 kB\nVmRSS:\t    9000 kB\n";
        assert_eq!(parse_status_kb(status, "VmHWM:"), Some(9120));
        assert_eq!(parse_status_kb(status, "VmRSS:"), Some(9000));
        assert_eq!(parse_status_kb(status, "VmSwap:"), None);
    }

    #[tokio::test]
    async fn test_scratch_dir_is_removed_on_drop() {
        let root = tempfile::tempdir().unwrap();
        let config = ProcessConfig {
            interpreter: "python3".into(),
            source_file_name: "solution.py".to_string(),
            scratch_root: root.path().join("nested"),
            syntax_error_markers: markers(),
        };

        let scratch = ScratchDir::create(&config, "print(1)").await.unwrap();
        let dir = scratch.path().to_path_buf();
        assert_eq!(
            std::fs::read_to_string(scratch.source_path()).unwrap(),
            "print(1)"
        );

        drop(scratch);
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn test_unwritable_scratch_root_is_infra_error() {
        let root = tempfile::tempdir().unwrap();
        let file = root.path().join("not-a-dir");
        std::fs::write(&file, "").unwrap();

        let config = ProcessConfig {
            interpreter: "python3".into(),
            source_file_name: "solution.py".to_string(),
            scratch_root: file,
            syntax_error_markers: markers(),
        };

        let err = ScratchDir::create(&config, "print(1)").await.unwrap_err();
        assert!(matches!(err, SandboxError::ScratchDir { .. }));
    }
}
