pub mod cache;
pub mod commands;
pub mod error;
pub mod loader;

pub use cache::RevisionCache;
pub use commands::{CommandOutput, GitCommandRunner, StreamOutcome};
pub use error::GitError;
pub use loader::{LoadEvent, LoadPhase, RepoLoader};
