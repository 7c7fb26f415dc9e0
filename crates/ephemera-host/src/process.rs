//! External command execution

use ephemera_host_api::{HostError, HostResult};
use ephemera_util::format_duration;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

/// Captured result of a finished command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// stdout followed by stderr, trimmed
    pub fn combined(&self) -> String {
        let mut out = self.stdout.trim_end().to_string();
        let err = self.stderr.trim_end();
        if !err.is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(err);
        }
        out
    }
}

/// A command run in its own process group
///
/// On timeout the whole group is killed, so helpers spawned by the command
/// do not outlive it.
#[derive(Debug, Clone)]
pub struct HostCommand {
    program: String,
    args: Vec<String>,
    cwd: Option<PathBuf>,
    stdin: Option<String>,
    timeout: Option<Duration>,
    inherit_output: bool,
}

impl HostCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            stdin: None,
            timeout: None,
            inherit_output: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Feed `input` to the command's stdin
    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Stream stdout/stderr to the terminal instead of capturing them
    pub fn inherit_output(mut self, inherit: bool) -> Self {
        self.inherit_output = inherit;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Program and arguments, for logs and error messages
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Run to completion and capture the output.
    ///
    /// A non-zero exit is not an error here; callers decide what it means.
    pub async fn output(&self) -> HostResult<CommandOutput> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }

        cmd.stdin(if self.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });
        if self.inherit_output {
            cmd.stdout(Stdio::inherit());
            cmd.stderr(Stdio::inherit());
        } else {
            cmd.stdout(Stdio::piped());
            cmd.stderr(Stdio::piped());
        }
        cmd.kill_on_drop(true);

        // The child leads a new process group
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => HostError::CommandNotFound(self.program.clone()),
            _ => HostError::Io(e),
        })?;
        let pid = child.id();
        debug!(pid = ?pid, command = %self.display(), "Command spawned");

        if let Some(input) = &self.stdin
            && let Some(mut pipe) = child.stdin.take()
        {
            pipe.write_all(input.as_bytes()).await?;
            pipe.shutdown().await?;
        }

        let wait = child.wait_with_output();
        let output = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, wait).await {
                Ok(result) => result?,
                Err(_) => {
                    if let Some(pid) = pid {
                        kill_process_group(pid);
                    }
                    warn!(command = %self.display(), after = %format_duration(limit), "Command timed out");
                    return Err(HostError::Timeout {
                        task: self.display(),
                        after: format_duration(limit),
                    });
                }
            },
            None => wait.await?,
        };

        debug!(command = %self.program, status = %output.status, "Command finished");

        Ok(CommandOutput {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// SIGKILL a process group led by `pgid`. A group that is already gone is fine.
#[cfg(unix)]
pub fn kill_process_group(pgid: u32) {
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;

    match signal::killpg(Pid::from_raw(pgid as i32), Signal::SIGKILL) {
        Ok(()) => debug!(pgid, "Sent SIGKILL to process group"),
        Err(nix::errno::Errno::ESRCH) => {}
        Err(e) => warn!(pgid, error = %e, "Failed to kill process group"),
    }
}

/// Dropping the child already kills it; there is no group to signal.
#[cfg(not(unix))]
pub fn kill_process_group(_pgid: u32) {}

/// Whether `program` resolves to an executable on `PATH` (or is a path to one)
pub fn command_exists(program: &str) -> bool {
    which::which(program).is_ok()
}

/// `command_exists` against an explicit search path
pub fn command_exists_in(program: &str, search_path: impl AsRef<OsStr>, cwd: &Path) -> bool {
    which::which_in(program, Some(search_path), cwd).is_ok()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_output() {
        let out = HostCommand::new("sh")
            .args(["-c", "echo out; echo err >&2"])
            .output()
            .await
            .unwrap();
        assert!(out.success());
        assert_eq!(out.combined(), "out\nerr");
    }

    #[tokio::test]
    async fn feeds_stdin() {
        let out = HostCommand::new("cat")
            .stdin("hello from stdin")
            .output()
            .await
            .unwrap();
        assert_eq!(out.stdout, "hello from stdin");
    }

    #[tokio::test]
    async fn runs_in_directory() {
        let dir = tempfile::tempdir().unwrap();
        let out = HostCommand::new("pwd")
            .current_dir(dir.path())
            .output()
            .await
            .unwrap();
        let printed = std::path::PathBuf::from(out.stdout.trim());
        assert_eq!(
            printed.canonicalize().unwrap(),
            dir.path().canonicalize().unwrap()
        );
    }

    #[tokio::test]
    async fn non_zero_exit_is_reported_not_raised() {
        let out = HostCommand::new("sh")
            .args(["-c", "exit 3"])
            .output()
            .await
            .unwrap();
        assert!(!out.success());
        assert_eq!(out.status.code(), Some(3));
    }

    #[tokio::test]
    async fn missing_program() {
        let result = HostCommand::new("definitely-not-a-real-binary-3141")
            .output()
            .await;
        assert!(matches!(result, Err(HostError::CommandNotFound(_))));
    }

    #[tokio::test]
    async fn timeout_kills_command() {
        let started = std::time::Instant::now();
        let result = HostCommand::new("sleep")
            .arg("30")
            .timeout(Some(Duration::from_millis(200)))
            .output()
            .await;

        assert!(matches!(result, Err(HostError::Timeout { .. })));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn finds_commands_on_path() {
        assert!(command_exists("sh"));
        assert!(!command_exists("definitely-not-a-real-binary-3141"));
        assert!(command_exists("/bin/sh"));
    }

    #[test]
    fn non_executable_file_is_not_a_command() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("at");
        std::fs::write(&plain, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&plain, std::fs::Permissions::from_mode(0o644)).unwrap();

        assert!(!command_exists_in("at", dir.path(), dir.path()));
        assert!(!command_exists(plain.to_str().unwrap()));

        std::fs::set_permissions(&plain, std::fs::Permissions::from_mode(0o755)).unwrap();
        assert!(command_exists_in("at", dir.path(), dir.path()));
        assert!(command_exists(plain.to_str().unwrap()));
    }
}
