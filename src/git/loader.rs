use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::Result;
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

use crate::git::{GitCommandRunner, RevisionCache, StreamOutcome};
use crate::models::{is_commit_id, CommitInfo};

/// Fixed record layout requested from `git log`: marker, id, `X`, parent
/// list, then committer, author, author timestamp, subject and body lines.
const LOG_FORMAT: &str = "%m%HX%P%n%cn<%ce>%n%an<%ae>%n%at%n%s%n%b";

/// Load pipeline states. Entry past `Idle` is guarded: a reload requested
/// while any other phase is active is rejected, not queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPhase {
    Idle,
    DiscoveringRoot,
    LoadingRefs,
    Streaming,
}

/// Notifications emitted over the loader's event channel.
#[derive(Debug, Clone)]
pub enum LoadEvent {
    Started,
    Finished { success: bool, cache_version: u64 },
}

/// Drives the end-to-end reload sequence and guarantees at most one reload
/// in flight.
///
/// `load_repository` runs root discovery and reference loading on the calling
/// thread, then dispatches the history request onto a spawned task and
/// returns. Completion is reported through [`LoadEvent::Finished`], which is
/// also the only point that returns the loader to `Idle`. The loader is the
/// single writer of its [`RevisionCache`]; readers re-query after `Finished`.
#[derive(Clone)]
pub struct RepoLoader {
    inner: Arc<LoaderInner>,
}

struct LoaderInner {
    runner: Arc<GitCommandRunner>,
    cache: Arc<Mutex<RevisionCache>>,
    phase: Mutex<LoadPhase>,
    cancel: Mutex<Option<watch::Sender<bool>>>,
    events: broadcast::Sender<LoadEvent>,
}

impl RepoLoader {
    pub fn new<P: AsRef<Path>>(working_dir: P) -> Result<Self> {
        let runner = Arc::new(GitCommandRunner::new(working_dir)?);
        Ok(RepoLoader::with_runner(runner))
    }

    pub fn with_runner(runner: Arc<GitCommandRunner>) -> Self {
        let (events, _) = broadcast::channel(16);
        RepoLoader {
            inner: Arc::new(LoaderInner {
                runner,
                cache: Arc::new(Mutex::new(RevisionCache::new())),
                phase: Mutex::new(LoadPhase::Idle),
                cancel: Mutex::new(None),
                events,
            }),
        }
    }

    /// Shared handle to the revision cache.
    pub fn cache(&self) -> Arc<Mutex<RevisionCache>> {
        Arc::clone(&self.inner.cache)
    }

    pub fn runner(&self) -> &GitCommandRunner {
        &self.inner.runner
    }

    /// Subscribes to load notifications. Subscribe before calling
    /// [`load_repository`](RepoLoader::load_repository); events are not
    /// replayed.
    pub fn subscribe(&self) -> broadcast::Receiver<LoadEvent> {
        self.inner.events.subscribe()
    }

    pub fn phase(&self) -> LoadPhase {
        *self.lock_phase()
    }

    pub fn is_loading(&self) -> bool {
        self.phase() != LoadPhase::Idle
    }

    /// Starts a full reload: clears the cache, resolves the repository root,
    /// loads references synchronously and dispatches the asynchronous history
    /// stream. Returns `true` once the stream is dispatched; completion
    /// arrives as [`LoadEvent::Finished`]. Returns `false` when a load is
    /// already running, no working directory is set, or the directory is not
    /// a git repository.
    ///
    /// Must be called from within a tokio runtime.
    pub fn load_repository(&self) -> bool {
        {
            let mut phase = self.lock_phase();
            if *phase != LoadPhase::Idle {
                warn!("git is currently loading data");
                return false;
            }

            if self.inner.runner.working_dir().as_os_str().is_empty() {
                error!("no working directory set");
                return false;
            }

            info!("initializing repository load");
            self.lock_cache().clear();
            *phase = LoadPhase::DiscoveringRoot;
        }

        if !self.configure_repo_directory() {
            error!("the working directory is not a git repository");
            self.set_phase(LoadPhase::Idle);
            return false;
        }

        self.set_phase(LoadPhase::LoadingRefs);
        self.load_references();

        self.set_phase(LoadPhase::Streaming);
        self.request_revisions();

        info!("repository load dispatched");
        true
    }

    /// Fire-and-forget cancellation of the in-flight history stream. The
    /// stream's termination path still releases the lock and emits
    /// `Finished`.
    pub fn cancel_all(&self) {
        if let Some(cancel) = self
            .inner
            .cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            let _ = cancel.send(true);
        }
    }

    /// Recomputes the working-tree pseudo-commit on demand. Never waits for
    /// the history stream.
    pub fn refresh_working_tree(&self) {
        self.update_wip_revision();
    }

    /// Resolves the repository root (`rev-parse --show-cdup`) and rewrites
    /// the runner's working directory to the canonical absolute path.
    fn configure_repo_directory(&self) -> bool {
        let ret = self.inner.runner.run(&["rev-parse", "--show-cdup"]);
        if !ret.success {
            return false;
        }

        let cdup = ret.output.trim();
        let base = self.inner.runner.working_dir();
        let joined = if cdup.is_empty() { base } else { base.join(cdup) };
        let resolved = joined.canonicalize().unwrap_or(joined);
        self.inner.runner.set_working_dir(resolved);
        true
    }

    /// Loads the full reference list and folds it into the cache. Query
    /// failures yield empty inputs; the pipeline proceeds with what it has.
    fn load_references(&self) {
        let listing = self.inner.runner.run(&["show-ref", "-d"]);
        if !listing.success {
            warn!("reference listing failed; continuing with empty references");
        }

        let head = self.inner.runner.run(&["rev-parse", "HEAD"]);
        let head_id = if head.success {
            head.output.trim().to_string()
        } else {
            String::new()
        };

        let resolved = resolve_reference_lines(&listing.output);
        let mut cache = self.lock_cache();

        for (id, ref_path) in &resolved {
            cache.get_or_insert_reference(id).add_name(ref_path);
        }

        // Mark the current head even when detached from every named ref.
        if !head_id.is_empty() {
            cache.get_or_insert_reference(&head_id).mark_current_branch();
        }

        debug!("loaded {} reference records", cache.references().len());
    }

    /// Dispatches the single full-history request onto a spawned task.
    fn request_revisions(&self) {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        *self
            .inner
            .cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(cancel_tx);

        let loader = self.clone();
        tokio::spawn(async move {
            let pretty = format!("--pretty=format:{LOG_FORMAT}");
            let args = [
                "log",
                "--date-order",
                "--no-color",
                "--log-size",
                "--parents",
                "--boundary",
                "-z",
                pretty.as_str(),
                "--all",
            ];

            let outcome = loader.inner.runner.run_streaming(&args, cancel_rx).await;
            let success = match outcome {
                StreamOutcome::Data(buffer) => {
                    loader.process_revisions(&buffer);
                    true
                }
                StreamOutcome::Aborted => {
                    info!("revision stream cancelled");
                    false
                }
                StreamOutcome::Failed => {
                    error!("revision stream failed");
                    false
                }
            };

            loader.set_phase(LoadPhase::Idle);
            let cache_version = loader.lock_cache().version();
            let _ = loader.inner.events.send(LoadEvent::Finished {
                success,
                cache_version,
            });
        });
    }

    /// Ingests one delivered batch of NUL-separated records. Parsing stops at
    /// the first invalid record; commits inserted up to that point remain.
    fn process_revisions(&self, buffer: &[u8]) {
        let text = String::from_utf8_lossy(buffer);
        let records: Vec<&str> = text.split('\0').collect();
        debug!("received {} candidate revision records", records.len());

        self.lock_cache().configure(records.len());
        let _ = self.inner.events.send(LoadEvent::Started);

        self.update_wip_revision();

        let mut cache = self.lock_cache();
        let mut order = 1;
        for record in &records {
            match CommitInfo::parse(record, order) {
                Some(commit) => {
                    cache.insert_commit(commit);
                    order += 1;
                }
                None => {
                    warn!("malformed record at position {order}; treating as end of stream");
                    break;
                }
            }
        }
    }

    /// Rebuilds the pseudo-commit: untracked files, resolved HEAD, and the
    /// unstaged (working tree vs. index) and staged (index vs. HEAD) diffs.
    fn update_wip_revision(&self) {
        let untracked = self.untracked_files();

        let head = self.inner.runner.run(&["rev-parse", "--revs-only", "HEAD"]);
        let parent_id = if head.success {
            head.output.trim().to_string()
        } else {
            String::new()
        };

        let (unstaged, staged) = if parent_id.is_empty() {
            (String::new(), String::new())
        } else {
            let unstaged = self.inner.runner.run(&["diff-index", &parent_id]);
            let staged = self.inner.runner.run(&["diff-index", "--cached", &parent_id]);
            (unstaged.output, staged.output)
        };

        let mut cache = self.lock_cache();
        cache.set_untracked_files(untracked);
        cache.update_wip_commit(&parent_id, unstaged, staged);
    }

    /// Files present on disk but not tracked, honoring the repository's
    /// local exclude file and per-directory ignore files.
    fn untracked_files(&self) -> Vec<String> {
        let mut args = vec!["ls-files", "--others"];
        let exclude = self.inner.runner.working_dir().join(".git/info/exclude");
        if exclude.exists() {
            args.push("--exclude-from=.git/info/exclude");
        }
        args.push("--exclude-per-directory=.gitignore");

        let ret = self.inner.runner.run(&args);
        if !ret.success {
            return Vec::new();
        }
        ret.output
            .lines()
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()
    }

    fn set_phase(&self, phase: LoadPhase) {
        *self.lock_phase() = phase;
    }

    fn lock_phase(&self) -> MutexGuard<'_, LoadPhase> {
        self.inner.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_cache(&self) -> MutexGuard<'_, RevisionCache> {
        self.inner.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for RepoLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepoLoader")
            .field("working_dir", &self.inner.runner.working_dir())
            .field("phase", &self.phase())
            .finish()
    }
}

/// Resolves the raw `show-ref -d` listing into `(commit id, ref path)`
/// pairs. Each dereferenced annotated tag (`refs/tags/<name>^{}`) is matched
/// to its tag-object pointer by name; the pointer is dropped and the
/// dereferenced commit id is kept under the plain tag path.
fn resolve_reference_lines(listing: &str) -> Vec<(String, String)> {
    let mut raw: Vec<(String, String)> = Vec::new();
    for line in listing.lines() {
        if line.len() <= 41 || !line.is_char_boundary(40) {
            continue;
        }
        let (id, rest) = line.split_at(40);
        let ref_path = rest.trim_start();
        if !is_commit_id(id) || ref_path.is_empty() {
            continue;
        }
        raw.push((id.to_string(), ref_path.to_string()));
    }

    let dereferenced: HashSet<String> = raw
        .iter()
        .filter(|(_, ref_path)| ref_path.starts_with("refs/tags/"))
        .filter_map(|(_, ref_path)| ref_path.strip_suffix("^{}").map(str::to_string))
        .collect();

    raw.into_iter()
        .filter_map(|(id, ref_path)| {
            if let Some(plain) = ref_path.strip_suffix("^{}") {
                Some((id, plain.to_string()))
            } else if dereferenced.contains(&ref_path) {
                // Tag-object pointer shadowed by its dereferenced twin.
                None
            } else {
                Some((id, ref_path))
            }
        })
        .collect()
}
