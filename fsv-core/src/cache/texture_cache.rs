//! ``src/cache/texture_cache.rs``
//! ============================================================================
//! # Texture Cache: Fixed-Capacity LRU of Progressive Decodes
//!
//! Maps a logical index (position in the indexer's list) to a resident
//! [`DecodeTask`]. A hit refreshes recency and returns the existing handle,
//! whatever its progress. A miss reads the header, allocates the surface and
//! the resource, makes room by tearing down the least recently used task
//! (cancel, join, free), and launches the new decode. The number of live
//! tasks never exceeds the capacity.
//!
//! The cache is driven from one thread (`&mut self` everywhere). Cross-thread
//! state lives in the indexer's name list and in each task's region feed.
//!
//! ## Per-frame contract
//! `drain_updates()` must run once per frame; it is the only place decoded
//! regions reach the renderer.

use std::ffi::OsStr;
use std::io;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use lru::LruCache;
use tokio::runtime::Handle;
use tracing::{debug, info, instrument};

use crate::cache::decode_task::{DecodeStatus, DecodeTask};
use crate::cache::stats::{CacheStats, CacheStatsSnapshot};
use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::fs::indexer::{ImageIndexer, SettleWatch};
use crate::fs::vfs::{FileSystem, TargetKind, extension_of};
use crate::image::codec::{ImageCodec, ImageDecoder};
use crate::image::format::{PixelLayout, Region};
use crate::render::resource::{ResourceUploader, TextureRef};

pub struct TextureCache {
    fs: Arc<dyn FileSystem>,
    codec: Arc<dyn ImageCodec>,
    uploader: Arc<dyn ResourceUploader>,
    runtime: Handle,
    indexer: ImageIndexer,
    tasks: LruCache<usize, DecodeTask>,
    root: Option<Arc<PathBuf>>,
    half_float_max_bits: u16,
    first_entry_poll: Duration,
    name_poll: Duration,
    stats: CacheStats,
    regions: Vec<Region>,
    scratch: Vec<u8>,
}

impl std::fmt::Debug for TextureCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextureCache")
            .field("root", &self.root)
            .field("resident", &self.tasks.len())
            .field("capacity", &self.tasks.cap())
            .field("indexer", &self.indexer)
            .finish_non_exhaustive()
    }
}

impl TextureCache {
    pub fn new(
        config: &Config,
        runtime: Handle,
        fs: Arc<dyn FileSystem>,
        codec: Arc<dyn ImageCodec>,
        uploader: Arc<dyn ResourceUploader>,
    ) -> CoreResult<Self> {
        let capacity = NonZeroUsize::new(config.cache.capacity)
            .ok_or_else(|| CoreError::invalid_config("cache.capacity", "must be greater than 0"))?;

        let indexer = ImageIndexer::new(
            Arc::clone(&fs),
            Arc::clone(&codec),
            runtime.clone(),
            config.indexer.max_container_depth,
        );

        Ok(Self {
            fs,
            codec,
            uploader,
            runtime,
            indexer,
            tasks: LruCache::new(capacity),
            root: None,
            half_float_max_bits: config.cache.half_float_max_bits,
            first_entry_poll: config.indexer.first_entry_poll,
            name_poll: config.indexer.name_poll,
            stats: CacheStats::default(),
            regions: Vec::new(),
            scratch: Vec::new(),
        })
    }

    /// Points the cache at `target` and resolves the initial index.
    ///
    /// A container or directory starts at the first indexed entry; a
    /// decodable file indexes its parent and starts at that file. Blocks
    /// (sleep-polling) until the answer is known. `None` means nothing
    /// resolvable was found.
    #[instrument(level = "debug", skip(self, target), fields(target = %target.display()))]
    pub fn set_root(&mut self, target: &Path) -> Option<usize> {
        self.clear();

        let (dir, start_name) = match self.resolve_target(target) {
            Ok(resolved) => resolved,

            Err(e) => {
                e.trace();
                self.indexer.reset();
                self.root = None;
                return None;
            }
        };

        self.root = Some(Arc::new(dir.clone()));
        self.indexer.start(&dir);

        let started = Instant::now();
        let index = match &start_name {
            None => self.wait_first_entry(),
            Some(name) => self.wait_named_entry(name),
        };

        info!(
            marker = "CACHE_OPERATION",
            operation_type = "set_root",
            root = %dir.display(),
            start_name = start_name.as_deref().unwrap_or(""),
            index = ?index,
            wait_ms = started.elapsed().as_millis() as u64,
            "Root resolved"
        );

        index
    }

    fn resolve_target(&self, target: &Path) -> CoreResult<(PathBuf, Option<String>)> {
        let kind = self.fs.classify(target).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => CoreError::not_found(&target.to_string_lossy()),
            _ => CoreError::from(e),
        })?;

        match kind {
            TargetKind::Container | TargetKind::Directory => Ok((target.to_path_buf(), None)),

            TargetKind::File => {
                let name = target
                    .file_name()
                    .and_then(OsStr::to_str)
                    .filter(|name| extension_of(name).is_some_and(|ext| self.codec.is_decodable(ext)))
                    .ok_or_else(|| CoreError::unsupported_format(&target.to_string_lossy()))?;

                let parent = match target.parent() {
                    Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                    _ => PathBuf::from("."),
                };

                Ok((parent, Some(name.to_string())))
            }
        }
    }

    fn wait_first_entry(&self) -> Option<usize> {
        let mut watch = SettleWatch::new();

        loop {
            let settled = watch.observe(self.indexer.is_running());

            if !self.indexer.is_empty() {
                return Some(0);
            }
            if settled {
                return None;
            }

            thread::sleep(self.first_entry_poll);
        }
    }

    fn wait_named_entry(&self, name: &str) -> Option<usize> {
        let mut watch = SettleWatch::new();
        let mut scanned = 0;

        loop {
            let settled = watch.observe(self.indexer.is_running());

            match self.indexer.find_from(scanned, name) {
                Ok(index) => return Some(index),
                Err(next) => scanned = next,
            }
            if settled {
                return None;
            }

            thread::sleep(self.name_poll);
        }
    }

    /// Returns the handle for `index`, launching a decode on a miss.
    ///
    /// The handle is empty when the index is not (yet) indexed or the file
    /// cannot produce a valid header; such misses are not cached.
    pub fn get(&mut self, index: usize) -> TextureRef {
        if let Some(task) = self.tasks.get(&index) {
            self.stats.record_hit();
            return task.texture_ref();
        }
        self.stats.record_miss();

        let (Some(root), Some(name)) = (self.root.clone(), self.indexer.get(index)) else {
            return TextureRef::empty();
        };

        let started = Instant::now();
        match self.load(&root, index, &name) {
            Ok(texture) => {
                self.stats.record_load(started.elapsed(), true);
                texture
            }

            Err(e) => {
                self.stats.record_load(started.elapsed(), false);
                e.trace();
                TextureRef::empty()
            }
        }
    }

    fn load(&mut self, root: &Path, index: usize, name: &str) -> CoreResult<TextureRef> {
        let decoder = self.open_decoder(root, name)?;
        let header = *decoder.header();
        let layout = PixelLayout::select(&header, self.half_float_max_bits);

        // allocate before evicting so a failed allocation costs no resident task
        let prepared = DecodeTask::prepare(name, decoder, layout, Arc::clone(&self.uploader))?;
        self.make_room();

        let task = prepared.launch(&self.runtime);
        let texture = task.texture_ref();
        self.tasks.put(index, task);

        debug!(
            marker = "CACHE_OPERATION",
            operation_type = "cache_insert",
            index = index,
            name = name,
            resident = self.tasks.len(),
            "Decode task cached"
        );

        Ok(texture)
    }

    fn open_decoder(&self, root: &Path, name: &str) -> CoreResult<Box<dyn ImageDecoder>> {
        let stream = self.fs.open(&root.join(name))?;
        let decoder = self.codec.open(name, stream)?;

        let header = decoder.header();
        if !header.is_valid() {
            return Err(CoreError::unreadable_header(
                name,
                format!("{}x{} image", header.width, header.height),
            ));
        }

        Ok(decoder)
    }

    /// Evicts least recently used tasks until one more fits.
    fn make_room(&mut self) {
        while self.tasks.len() >= self.tasks.cap().get() {
            let Some((victim, task)) = self.tasks.pop_lru() else {
                break;
            };

            let name = task.name().to_string();
            // cancel, join, free
            drop(task);
            self.stats.record_eviction();

            debug!(
                marker = "CACHE_OPERATION",
                operation_type = "cache_evict",
                index = victim,
                name = %name,
                "Evicted least recently used task"
            );
        }
    }

    /// Uploads every region decoded since the previous call. Returns the number uploaded.
    pub fn drain_updates(&mut self) -> usize {
        let mut uploaded = 0;
        let mut failed = 0;

        for (_, task) in &self.tasks {
            let outcome = task.upload_pending(&mut self.regions, &mut self.scratch);
            uploaded += outcome.uploaded;
            failed += outcome.failed;
        }

        if failed > 0 {
            self.stats.record_upload_failures(failed as u64);
        }

        uploaded
    }

    /// Tears down every resident task.
    pub fn clear(&mut self) {
        let mut released = 0;
        while let Some((_, task)) = self.tasks.pop_lru() {
            drop(task);
            released += 1;
        }

        if released > 0 {
            debug!(
                marker = "CACHE_OPERATION",
                operation_type = "cache_clear",
                released = released,
                "Texture cache cleared"
            );
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.tasks.cap().get()
    }

    /// Residency check without touching recency.
    #[must_use]
    pub fn contains(&self, index: usize) -> bool {
        self.tasks.contains(&index)
    }

    /// Resident indices, most recently used first.
    #[must_use]
    pub fn resident_indices(&self) -> Vec<usize> {
        self.tasks.iter().map(|(index, _)| *index).collect()
    }

    #[must_use]
    pub fn progress(&self, index: usize) -> Option<f32> {
        self.tasks.peek(&index).map(DecodeTask::progress)
    }

    #[must_use]
    pub fn status(&self, index: usize) -> Option<DecodeStatus> {
        self.tasks.peek(&index).map(DecodeTask::status)
    }

    #[must_use]
    pub const fn indexer(&self) -> &ImageIndexer {
        &self.indexer
    }

    #[must_use]
    pub fn root(&self) -> Option<Arc<PathBuf>> {
        self.root.clone()
    }

    #[must_use]
    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }
}

impl Drop for TextureCache {
    fn drop(&mut self) {
        self.clear();
        self.indexer.reset();
    }
}
