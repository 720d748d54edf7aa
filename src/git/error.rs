use thiserror::Error;

/// Failures raised by the command runner.
///
/// The load pipeline itself never propagates these to callers; the loader
/// converts them into logged warnings plus boolean or empty-result signaling.
#[derive(Debug, Error)]
pub enum GitError {
    #[error("git executable not found in PATH")]
    GitNotFound,

    #[error("failed to spawn git {args:?}: {source}")]
    Spawn {
        args: Vec<String>,
        #[source]
        source: std::io::Error,
    },

    #[error("git {args:?} exited with {status}: {stderr}")]
    CommandFailed {
        args: Vec<String>,
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error("git output is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}
