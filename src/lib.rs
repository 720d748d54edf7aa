//! # repolens
//!
//! Repository loading and revision cache core for Git GUI clients.
//!
//! This library drives the hardest part of a graphical Git client: it shells
//! out to the system `git` executable, parses the textual log stream into
//! structured commit history, reconciles branch and tag references, and
//! maintains a working-tree "pending changes" pseudo-commit, all while
//! guarding against concurrent reloads and supporting cancellation.
//!
//! ## Architecture
//!
//! - [`git`] - command execution, the revision cache and the load pipeline
//! - [`models`] - commit and reference data structures
//!
//! The [`git::RepoLoader`] is the single writer of its
//! [`git::RevisionCache`]. A load cycle clears the cache, resolves the
//! repository root, loads references synchronously, then streams the full
//! history asynchronously; completion arrives on the loader's event channel.
//!
//! ## Example
//!
//! ```rust,no_run
//! use repolens::{LoadEvent, RepoLoader};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> anyhow::Result<()> {
//! let loader = RepoLoader::new("/path/to/repo")?;
//! let mut events = loader.subscribe();
//!
//! if loader.load_repository() {
//!     while let Ok(event) = events.recv().await {
//!         if let LoadEvent::Finished { success, .. } = event {
//!             let cache = loader.cache();
//!             let cache = cache.lock().expect("cache lock");
//!             println!("loaded {} commits (ok: {success})", cache.commit_count());
//!             break;
//!         }
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod git;
pub mod models;

pub use git::{
    CommandOutput, GitCommandRunner, GitError, LoadEvent, LoadPhase, RepoLoader, RevisionCache,
    StreamOutcome,
};
pub use models::{is_commit_id, CommitInfo, GitReference, GitSignature, RefKind, ZERO_SHA};

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
