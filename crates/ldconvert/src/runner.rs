//! External converter invocation.
//!
//! An [`ExternalInvocation`] is built once per conversion, handed to an
//! [`Invoker`] by value, and comes back as a [`CompletedInvocation`] holding
//! the captured stdout, stderr and exit code. The production invoker,
//! [`ProcessRunner`], spawns the converter as a child process anchored to the
//! project root and kills it if it outlives its timeout.

use std::ffi::{OsStr, OsString};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::ConverterConfig;
use crate::error::{Error, Result};

/// Exit code recorded when the process was terminated by a signal.
pub const SIGNAL_EXIT_CODE: i32 = -1;

/// A single, not yet executed, converter invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalInvocation {
    /// Program to execute.
    pub program: PathBuf,
    /// Script handed to `program` ahead of `args`, relative to `working_dir`.
    pub script: Option<PathBuf>,
    /// Converter arguments.
    pub args: Vec<OsString>,
    /// Wall-clock bound.
    pub timeout: Duration,
    /// Working directory of the child process.
    pub working_dir: PathBuf,
}

impl ExternalInvocation {
    /// Assemble an invocation from the converter configuration and the
    /// request arguments.
    #[must_use]
    pub fn new(converter: &ConverterConfig, args: Vec<OsString>, timeout: Duration) -> Self {
        Self {
            program: converter.program.clone(),
            script: converter.script.clone(),
            args,
            timeout,
            working_dir: converter.project_root.clone(),
        }
    }

    /// The complete argument vector: the script, if any, then `args`.
    pub fn argv(&self) -> impl Iterator<Item = &OsStr> {
        self.script
            .iter()
            .map(|script| script.as_os_str())
            .chain(self.args.iter().map(OsString::as_os_str))
    }

    /// Render the command line for logs. Not suitable for execution.
    #[must_use]
    pub fn display_command(&self) -> String {
        std::iter::once(self.program.as_os_str())
            .chain(self.argv())
            .map(|part| part.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// The result of an invocation that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedInvocation {
    /// The invocation that was executed.
    pub invocation: ExternalInvocation,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Process exit code, [`SIGNAL_EXIT_CODE`] if killed by a signal.
    pub exit_code: i32,
    /// How long the process ran.
    pub elapsed: Duration,
}

impl CompletedInvocation {
    /// Whether the converter reported success.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

/// Executes converter invocations.
///
/// Implementors must run the invocation at most once, honour its timeout, and
/// map failures onto [`Error::LaunchFailure`] and [`Error::ConversionTimeout`].
#[async_trait::async_trait]
pub trait Invoker: Send + Sync {
    /// Run the invocation to completion or until its timeout expires.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LaunchFailure`] if the process cannot be started and
    /// [`Error::ConversionTimeout`] if it outlives its timeout.
    async fn invoke(&self, invocation: ExternalInvocation) -> Result<CompletedInvocation>;
}

/// Runs the converter as a child process.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    /// Create a new process runner.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl Invoker for ProcessRunner {
    async fn invoke(&self, invocation: ExternalInvocation) -> Result<CompletedInvocation> {
        check_script(&invocation)?;

        debug!(
            command = %invocation.display_command(),
            cwd = %invocation.working_dir.display(),
            timeout = ?invocation.timeout,
            "Launching converter"
        );

        let started = Instant::now();
        let mut command = Command::new(&invocation.program);
        command
            .args(invocation.argv())
            .current_dir(&invocation.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Own process group, so that helpers the converter forks die with it.
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command
            .spawn()
            .map_err(|e| Error::launch_failure(&invocation.program, e.to_string()))?;
        let pid = child.id();

        let mut stdout = child.stdout.take().map(drain);
        let mut stderr = child.stderr.take().map(drain);

        // One deadline covers the exit and the end of both streams: a forked
        // helper can hold the pipes open after the converter itself exits.
        let run = async {
            let status = child.wait().await?;
            let stdout = collect(stdout.as_mut()).await;
            let stderr = collect(stderr.as_mut()).await;
            Ok::<_, std::io::Error>((status, stdout, stderr))
        };

        let (status, stdout, stderr) = match tokio::time::timeout(invocation.timeout, run).await {
            Ok(finished) => finished?,
            Err(_) => {
                warn!(timeout = ?invocation.timeout, "Converter timed out, killing it");
                kill_process_group(pid);
                // Reap the child before reporting so nothing is still writing
                // when the caller cleans up.
                if let Err(e) = child.kill().await {
                    debug!(error = %e, "Failed to kill timed out converter");
                }
                for handle in stdout.iter().chain(stderr.iter()) {
                    handle.abort();
                }
                return Err(Error::ConversionTimeout {
                    timeout: invocation.timeout,
                });
            }
        };

        let exit_code = status.code().unwrap_or(SIGNAL_EXIT_CODE);
        let elapsed = started.elapsed();

        debug!(
            exit_code,
            elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            "Converter finished"
        );

        Ok(CompletedInvocation {
            invocation,
            stdout,
            stderr,
            exit_code,
            elapsed,
        })
    }
}

/// A configured script must exist before it is handed to an interpreter,
/// otherwise the interpreter's own "file not found" would surface as a
/// conversion failure.
fn check_script(invocation: &ExternalInvocation) -> Result<()> {
    let Some(script) = &invocation.script else {
        return Ok(());
    };
    let resolved = invocation.working_dir.join(script);
    if resolved.is_file() {
        Ok(())
    } else {
        Err(Error::launch_failure(
            &invocation.program,
            format!("converter script not found: {}", resolved.display()),
        ))
    }
}

fn drain<R>(mut reader: R) -> JoinHandle<Vec<u8>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Err(e) = reader.read_to_end(&mut buf).await {
            debug!(error = %e, "Failed to read converter output");
        }
        buf
    })
}

/// Kill every process in the group led by `pid`.
#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(pid) = pid.and_then(|pid| i32::try_from(pid).ok()) else {
        return;
    };
    if let Err(e) = killpg(Pid::from_raw(pid), Signal::SIGKILL) {
        debug!(pid, error = %e, "Failed to kill converter process group");
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}

async fn collect(handle: Option<&mut JoinHandle<Vec<u8>>>) -> String {
    match handle {
        Some(handle) => match handle.await {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(_) => String::new(),
        },
        None => String::new(),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::tempdir;

    fn create_test_script(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    fn sh_config(root: &Path, script: &str) -> ConverterConfig {
        ConverterConfig {
            program: PathBuf::from("sh"),
            script: Some(PathBuf::from(script)),
            project_root: root.to_path_buf(),
            timeout_secs: 5,
        }
    }

    #[test]
    fn test_invocation_prepends_script() {
        let config = sh_config(Path::new("/srv"), "convert.sh");
        let invocation =
            ExternalInvocation::new(&config, vec!["a.log".into()], Duration::from_secs(3));

        assert_eq!(invocation.program, PathBuf::from("sh"));
        assert_eq!(
            invocation.argv().collect::<Vec<_>>(),
            vec![OsStr::new("convert.sh"), OsStr::new("a.log")]
        );
        assert_eq!(invocation.working_dir, PathBuf::from("/srv"));
        assert_eq!(invocation.display_command(), "sh convert.sh a.log");
    }

    #[test]
    fn test_invocation_without_script() {
        let mut config = sh_config(Path::new("/srv"), "unused.sh");
        config.script = None;
        let invocation =
            ExternalInvocation::new(&config, vec!["a.log".into()], Duration::from_secs(3));
        assert_eq!(invocation.argv().collect::<Vec<_>>(), vec![OsStr::new("a.log")]);
    }

    #[tokio::test]
    async fn test_captures_streams_and_exit_code() {
        let dir = tempdir().unwrap();
        create_test_script(
            dir.path(),
            "convert.sh",
            "echo \"args: $*\"\necho 'bad header' >&2\nexit 3\n",
        );
        let invocation = ExternalInvocation::new(
            &sh_config(dir.path(), "convert.sh"),
            vec!["a.log".into(), "CSV".into()],
            Duration::from_secs(5),
        );

        let completed = ProcessRunner::new().invoke(invocation).await.unwrap();
        assert_eq!(completed.exit_code, 3);
        assert!(!completed.succeeded());
        assert_eq!(completed.stdout.trim(), "args: a.log CSV");
        assert_eq!(completed.stderr.trim(), "bad header");
    }

    #[tokio::test]
    async fn test_runs_in_project_root() {
        let dir = tempdir().unwrap();
        create_test_script(dir.path(), "convert.sh", "pwd\n");
        let invocation = ExternalInvocation::new(
            &sh_config(dir.path(), "convert.sh"),
            Vec::new(),
            Duration::from_secs(5),
        );

        let completed = ProcessRunner::new().invoke(invocation).await.unwrap();
        assert!(completed.succeeded());
        let reported = PathBuf::from(completed.stdout.trim());
        assert_eq!(
            reported.canonicalize().unwrap(),
            dir.path().canonicalize().unwrap()
        );
    }

    #[tokio::test]
    async fn test_arguments_are_not_shell_expanded() {
        let dir = tempdir().unwrap();
        create_test_script(dir.path(), "convert.sh", "printf '%s\\n' \"$1\"\n");
        let invocation = ExternalInvocation::new(
            &sh_config(dir.path(), "convert.sh"),
            vec!["$(echo pwned) `id`".into()],
            Duration::from_secs(5),
        );

        let completed = ProcessRunner::new().invoke(invocation).await.unwrap();
        assert_eq!(completed.stdout.trim(), "$(echo pwned) `id`");
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        let dir = tempdir().unwrap();
        create_test_script(dir.path(), "convert.sh", "exec sleep 30\n");
        let invocation = ExternalInvocation::new(
            &sh_config(dir.path(), "convert.sh"),
            Vec::new(),
            Duration::from_millis(200),
        );

        let started = Instant::now();
        let err = ProcessRunner::new().invoke(invocation).await.unwrap_err();
        assert!(matches!(
            err,
            Error::ConversionTimeout { timeout } if timeout == Duration::from_millis(200)
        ));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_background_helper_does_not_outlive_timeout() {
        let dir = tempdir().unwrap();
        create_test_script(dir.path(), "convert.sh", "sleep 5 &\necho done\nexit 0\n");
        let invocation = ExternalInvocation::new(
            &sh_config(dir.path(), "convert.sh"),
            Vec::new(),
            Duration::from_secs(1),
        );

        let started = Instant::now();
        let err = ProcessRunner::new().invoke(invocation).await.unwrap_err();
        assert!(matches!(err, Error::ConversionTimeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_timeout_kills_forked_writer() {
        let dir = tempdir().unwrap();
        let late = dir.path().join("late.ld");
        create_test_script(
            dir.path(),
            "convert.sh",
            &format!("( sleep 1; echo late > '{}' )\n", late.display()),
        );
        let invocation = ExternalInvocation::new(
            &sh_config(dir.path(), "convert.sh"),
            Vec::new(),
            Duration::from_millis(300),
        );

        let err = ProcessRunner::new().invoke(invocation).await.unwrap_err();
        assert!(matches!(err, Error::ConversionTimeout { .. }));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!late.exists());
    }

    #[tokio::test]
    async fn test_missing_program_is_launch_failure() {
        let dir = tempdir().unwrap();
        let config = ConverterConfig {
            program: PathBuf::from("/nonexistent/motec-gen"),
            script: None,
            project_root: dir.path().to_path_buf(),
            timeout_secs: 5,
        };
        let invocation = ExternalInvocation::new(&config, Vec::new(), Duration::from_secs(5));

        let err = ProcessRunner::new().invoke(invocation).await.unwrap_err();
        assert!(matches!(err, Error::LaunchFailure { .. }));
    }

    #[tokio::test]
    async fn test_missing_script_is_launch_failure() {
        let dir = tempdir().unwrap();
        let invocation = ExternalInvocation::new(
            &sh_config(dir.path(), "motec_log_generator.sh"),
            vec!["a.log".into()],
            Duration::from_secs(5),
        );

        let err = ProcessRunner::new().invoke(invocation).await.unwrap_err();
        assert!(matches!(err, Error::LaunchFailure { .. }));
        assert!(err.to_string().contains("converter script not found"));
    }
}
