//! ``src/fs/indexer.rs``
//! ============================================================================
//! # Image Indexer: Background Discovery of Decodable Entries
//!
//! One background job walks a root pre-order and appends the relative names
//! of decodable files to a shared list. Each directory's files are sorted and
//! spliced in under the lock as one batch, so readers only ever see whole
//! directories. Subdirectories are visited after the files of their parent,
//! in enumeration order.
//!
//! Descent is bounded by container nesting only: entering a container costs
//! one level of `max_container_depth`, entering a plain directory costs
//! nothing, and no subdirectory of any kind is entered once the budget is
//! spent.
//!
//! Readers poll. `is_running()` is a relaxed hint; callers that need every
//! entry discovered so far go through [`SettleWatch`], which requires one
//! extra pass after the flag is first seen clear.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::fs::vfs::FileSystem;
use crate::image::codec::ImageCodec;
use crate::tasks::job::{JobHandle, spawn_job};

pub struct ImageIndexer {
    fs: Arc<dyn FileSystem>,
    codec: Arc<dyn ImageCodec>,
    runtime: Handle,
    max_container_depth: u32,
    names: Arc<Mutex<Vec<String>>>,
    running: Arc<AtomicBool>,
    job: Option<JobHandle>,
}

impl std::fmt::Debug for ImageIndexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageIndexer")
            .field("max_container_depth", &self.max_container_depth)
            .field("len", &self.len())
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl ImageIndexer {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        codec: Arc<dyn ImageCodec>,
        runtime: Handle,
        max_container_depth: u32,
    ) -> Self {
        Self {
            fs,
            codec,
            runtime,
            max_container_depth,
            names: Arc::new(Mutex::new(Vec::new())),
            running: Arc::new(AtomicBool::new(false)),
            job: None,
        }
    }

    /// Stops any previous job, clears the list and starts indexing `root`.
    pub fn start(&mut self, root: &Path) {
        self.reset();

        // set before spawning so a poller never sees a stale idle flag
        self.running.store(true, Ordering::Relaxed);

        let fs = Arc::clone(&self.fs);
        let codec = Arc::clone(&self.codec);
        let names = Arc::clone(&self.names);
        let running = Arc::clone(&self.running);
        let root = root.to_path_buf();
        let max_depth = self.max_container_depth;

        info!(
            marker = "INDEXER",
            operation_type = "index_start",
            root = %root.display(),
            max_container_depth = max_depth,
            "Indexer started"
        );

        self.job = Some(spawn_job(&self.runtime, "indexer", move |token| {
            let started = Instant::now();
            let found = index_tree(fs.as_ref(), codec.as_ref(), &root, max_depth, &names, &token);

            info!(
                marker = "INDEXER",
                operation_type = "index_complete",
                root = %root.display(),
                entries = found,
                cancelled = token.is_cancelled(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Indexer finished"
            );

            running.store(false, Ordering::Relaxed);
        }));
    }

    /// Cancels the running job and blocks until its worker has returned.
    pub fn stop(&mut self) {
        if let Some(mut job) = self.job.take() {
            job.cancel_and_join();
        }
        self.running.store(false, Ordering::Relaxed);
    }

    /// `stop()` followed by clearing the list.
    pub fn reset(&mut self) {
        self.stop();
        self.names.lock().clear();
    }

    /// Polling hint only. See [`SettleWatch`].
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.names.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.lock().is_empty()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<String> {
        self.names.lock().get(index).cloned()
    }

    /// Scans for `name` starting at `start`.
    ///
    /// `Ok(index)` on a match; otherwise `Err(next)` where `next` is the
    /// length scanned up to, to resume from on the next poll.
    pub fn find_from(&self, start: usize, name: &str) -> Result<usize, usize> {
        let names = self.names.lock();
        let start = start.min(names.len());

        names[start..]
            .iter()
            .position(|candidate| candidate == name)
            .map(|offset| start + offset)
            .ok_or(names.len())
    }

    /// Copy of the names discovered so far.
    #[must_use]
    pub fn snapshot(&self) -> Vec<String> {
        self.names.lock().clone()
    }

    /// Blocks until indexing has settled, polling every `poll`.
    pub fn wait_settled(&self, poll: Duration) {
        let mut watch = SettleWatch::new();
        while !watch.observe(self.is_running()) {
            thread::sleep(poll);
        }
    }
}

impl Drop for ImageIndexer {
    fn drop(&mut self) {
        self.reset();
    }
}

/// Completion check over the relaxed running flag.
///
/// The flag can clear before the final batch is visible to a reader, so
/// completion is reported only on the observation *after* the first one that
/// saw the indexer idle. Callers re-read the list after every `observe` and
/// stop once it returns `true`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SettleWatch {
    idle_before: bool,
}

impl SettleWatch {
    #[must_use]
    pub const fn new() -> Self {
        Self { idle_before: false }
    }

    /// Records one observation of `running`; `true` when the caller may
    /// treat this pass as the last one.
    pub const fn observe(&mut self, running: bool) -> bool {
        let done = self.idle_before;
        self.idle_before = !running;
        done
    }
}

struct Pending {
    dir: PathBuf,
    prefix: String,
    depth: u32,
}

/// Walks `root` pre-order, splicing each directory's sorted batch into `names`.
/// Returns the number of names appended.
fn index_tree(
    fs: &dyn FileSystem,
    codec: &dyn ImageCodec,
    root: &Path,
    max_container_depth: u32,
    names: &Mutex<Vec<String>>,
    token: &CancellationToken,
) -> usize {
    let mut found = 0;
    let mut stack = vec![Pending {
        dir: root.to_path_buf(),
        prefix: String::new(),
        depth: 0,
    }];

    while let Some(Pending { dir, prefix, depth }) = stack.pop() {
        if token.is_cancelled() {
            break;
        }

        let entries = match fs.list(&dir) {
            Ok(entries) => entries,

            Err(e) => {
                debug!(
                    marker = "INDEXER",
                    operation_type = "dir_skipped",
                    dir = %dir.display(),
                    error = %e,
                    "Skipping unreadable directory"
                );
                continue;
            }
        };

        let mut batch: Vec<String> = Vec::new();
        let mut children: Vec<Pending> = Vec::new();

        for entry in entries {
            if token.is_cancelled() {
                return found;
            }

            let relative = if prefix.is_empty() {
                entry.name.clone()
            } else {
                format!("{prefix}/{}", entry.name)
            };

            if entry.is_dir {
                if depth < max_container_depth {
                    children.push(Pending {
                        dir: dir.join(&entry.name),
                        prefix: relative,
                        depth: depth + u32::from(entry.is_container),
                    });
                }
            } else if entry.extension().is_some_and(|ext| codec.is_decodable(ext)) {
                batch.push(relative);
            }
        }

        if !batch.is_empty() {
            batch.sort_unstable();
            found += batch.len();
            names.lock().extend(batch);
        }

        // reversed so the first enumerated subdirectory is popped first
        stack.extend(children.into_iter().rev());
    }

    found
}
