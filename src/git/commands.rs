use anyhow::Result;
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::{PoisonError, RwLock};
use tokio::io::AsyncReadExt;
use tokio::sync::watch;
use tracing::{debug, error, warn};

use crate::git::GitError;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// Captured result of one blocking git invocation.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub success: bool,
    pub output: String,
}

/// Terminal outcome of one streaming git invocation.
///
/// Cancellation suppresses the data delivery: a killed process yields
/// `Aborted`, never a truncated `Data`.
#[derive(Debug)]
pub enum StreamOutcome {
    Data(Vec<u8>),
    Aborted,
    Failed,
}

/// Executes git commands against a working directory.
///
/// Two modes: [`run`](GitCommandRunner::run) blocks for short queries
/// (root discovery, ref listings, diff probes) and
/// [`run_streaming`](GitCommandRunner::run_streaming) drives the one long
/// history request per load without blocking the caller. The working
/// directory sits behind a lock so root discovery can rewrite it after the
/// repository root is resolved.
pub struct GitCommandRunner {
    working_dir: RwLock<PathBuf>,
    git_executable: PathBuf,
    environment: HashMap<String, String>,
}

impl GitCommandRunner {
    pub fn new<P: AsRef<Path>>(working_dir: P) -> Result<Self> {
        let git_executable = find_git_executable()?;
        debug!("using git executable at {:?}", git_executable);

        Ok(GitCommandRunner {
            working_dir: RwLock::new(working_dir.as_ref().to_path_buf()),
            git_executable,
            environment: scrubbed_environment(),
        })
    }

    pub fn working_dir(&self) -> PathBuf {
        self.working_dir
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_working_dir(&self, dir: PathBuf) {
        *self
            .working_dir
            .write()
            .unwrap_or_else(PoisonError::into_inner) = dir;
    }

    /// Blocking execution; failures are logged and folded into the flag.
    pub fn run(&self, args: &[&str]) -> CommandOutput {
        match self.try_run(args) {
            Ok(output) => CommandOutput {
                success: true,
                output,
            },
            Err(err) => {
                error!("git command failed: {err}");
                CommandOutput::default()
            }
        }
    }

    /// Blocking execution with a typed error for callers that need one.
    pub fn try_run(&self, args: &[&str]) -> Result<String, GitError> {
        debug!("running git command: {:?}", args);

        let mut cmd = Command::new(&self.git_executable);
        cmd.current_dir(self.working_dir());
        cmd.args(args);
        cmd.env_clear();
        cmd.envs(&self.environment);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let output = cmd.output().map_err(|source| GitError::Spawn {
            args: owned_args(args),
            source,
        })?;

        if !output.status.success() {
            return Err(GitError::CommandFailed {
                args: owned_args(args),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8(output.stdout)?)
    }

    /// Non-blocking execution for the history request. The captured stdout is
    /// delivered whole once the process exits. Sending `true` on the watch
    /// channel kills the child promptly and resolves to
    /// [`StreamOutcome::Aborted`].
    pub async fn run_streaming(
        &self,
        args: &[&str],
        mut cancel: watch::Receiver<bool>,
    ) -> StreamOutcome {
        debug!("streaming git command: {:?}", args);

        let mut cmd = tokio::process::Command::new(&self.git_executable);
        cmd.current_dir(self.working_dir());
        cmd.args(args);
        cmd.env_clear();
        cmd.envs(&self.environment);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::null());
        cmd.kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(err) => {
                error!("failed to spawn git {:?}: {err}", args);
                return StreamOutcome::Failed;
            }
        };

        let Some(mut stdout) = child.stdout.take() else {
            let _ = child.start_kill();
            return StreamOutcome::Failed;
        };

        let mut buffer = Vec::new();
        tokio::select! {
            read = stdout.read_to_end(&mut buffer) => {
                match (read, child.wait().await) {
                    (Ok(_), Ok(status)) if status.success() => StreamOutcome::Data(buffer),
                    (read, status) => {
                        warn!(
                            "git {:?} terminated without usable output (read: {:?}, status: {:?})",
                            args,
                            read.err(),
                            status.ok(),
                        );
                        StreamOutcome::Failed
                    }
                }
            }
            _ = cancelled(&mut cancel) => {
                let _ = child.start_kill();
                let _ = child.wait().await;
                StreamOutcome::Aborted
            }
        }
    }
}

impl std::fmt::Debug for GitCommandRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitCommandRunner")
            .field("working_dir", &self.working_dir())
            .field("git_executable", &self.git_executable)
            .finish()
    }
}

async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow() {
            return;
        }
        if cancel.changed().await.is_err() {
            // Sender dropped without cancelling; stay pending forever.
            std::future::pending::<()>().await;
        }
    }
}

fn owned_args(args: &[&str]) -> Vec<String> {
    args.iter().map(|arg| arg.to_string()).collect()
}

fn find_git_executable() -> Result<PathBuf, GitError> {
    let name = if cfg!(windows) { "git.exe" } else { "git" };
    let path_env = env::var_os("PATH").unwrap_or_default();

    for dir in env::split_paths(&path_env) {
        if dir.as_os_str().is_empty() {
            continue;
        }
        let candidate = dir.join(name);
        if is_executable(&candidate) {
            return Ok(candidate);
        }
    }

    Err(GitError::GitNotFound)
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Environment for spawned git processes: the parent environment is dropped
/// and only a known-safe subset is forwarded, with prompts and pagers off.
fn scrubbed_environment() -> HashMap<String, String> {
    let mut environment = HashMap::new();

    for key in ["HOME", "PATH", "USER", "LANG", "TMPDIR"] {
        if let Ok(value) = env::var(key) {
            environment.insert(key.to_string(), value);
        }
    }

    environment.insert("GIT_PAGER".to_string(), "cat".to_string());
    environment.insert("GIT_TERMINAL_PROMPT".to_string(), "0".to_string());
    environment.insert("GIT_CONFIG_NOSYSTEM".to_string(), "1".to_string());
    environment.insert("GIT_OPTIONAL_LOCKS".to_string(), "0".to_string());

    environment
}
