//! ``src/navigator.rs``
//! ============================================================================
//! # Navigator: Current Position and Prefetch
//!
//! Owned by the UI loop. Keeps the current index and travel direction,
//! wraps around both ends of the indexed list, and requests a window of
//! upcoming indices after every move so they start decoding early.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::cache::texture_cache::TextureCache;
use crate::render::resource::TextureRef;

#[derive(Debug, Clone)]
pub struct Navigator {
    current: usize,
    direction: isize,
    prefetch: usize,
    root: Option<Arc<PathBuf>>,
    texture: TextureRef,
}

impl Navigator {
    #[must_use]
    pub const fn new(prefetch: usize) -> Self {
        Self {
            current: 0,
            direction: 0,
            prefetch,
            root: None,
            texture: TextureRef::empty(),
        }
    }

    /// Resolves `target` through the cache and makes the result current.
    ///
    /// `None` when the target yields no index; the navigator is then reset.
    pub fn open(&mut self, cache: &mut TextureCache, target: &Path) -> Option<TextureRef> {
        let Some(index) = cache.set_root(target) else {
            *self = Self::new(self.prefetch);
            return None;
        };

        self.current = index;
        self.direction = 0;
        self.root = cache.root();
        self.texture = cache.get(index);

        Some(self.texture)
    }

    /// Moves `direction` steps with wrap-around, then prefetches ahead.
    ///
    /// No-op for a zero direction or an empty list.
    pub fn advance(&mut self, cache: &mut TextureCache, direction: isize) -> TextureRef {
        let count = cache.indexer().len();
        if direction == 0 || count == 0 {
            return self.texture;
        }

        self.direction = direction;
        self.current = wrap(self.current, direction, count);
        self.texture = cache.get(self.current);

        for step in 1..=self.prefetch {
            let offset = direction.saturating_mul(step as isize);
            cache.get(wrap(self.current, offset, count));
        }

        debug!(
            marker = "CACHE_OPERATION",
            operation_type = "navigate",
            index = self.current,
            direction = direction,
            count = count,
            "Advanced"
        );

        self.texture
    }

    /// Re-requests the current index (a cache hit unless it was evicted).
    pub fn refresh(&mut self, cache: &mut TextureCache) -> TextureRef {
        if self.root.is_some() {
            self.texture = cache.get(self.current);
        }
        self.texture
    }

    #[must_use]
    pub const fn current(&self) -> usize {
        self.current
    }

    #[must_use]
    pub const fn direction(&self) -> isize {
        self.direction
    }

    #[must_use]
    pub const fn texture(&self) -> TextureRef {
        self.texture
    }

    #[must_use]
    pub fn root(&self) -> Option<Arc<PathBuf>> {
        self.root.clone()
    }

    /// `"[3/12] sub/name.png"`, or an empty string before anything is open.
    #[must_use]
    pub fn status_line(&self, cache: &TextureCache) -> String {
        let count = cache.indexer().len();
        match cache.indexer().get(self.current) {
            Some(name) if self.root.is_some() => {
                format!("[{}/{}] {}", self.current + 1, count, name)
            }
            _ => String::new(),
        }
    }
}

fn wrap(current: usize, offset: isize, count: usize) -> usize {
    let count = count as isize;
    (current as isize % count + offset % count).rem_euclid(count) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::cache_fixture;
    use std::time::Duration;

    fn three(memory: &crate::fs::memory::MemoryFileSystem) {
        for name in ["a.png", "b.png", "c.png"] {
            memory.add_file(format!("/pics/{name}"), "2 2");
        }
    }

    #[test]
    fn test_advance_wraps_both_ways() {
        let mut f = cache_fixture(8, three);
        let mut nav = Navigator::new(0);

        assert!(nav.open(&mut f.cache, Path::new("/pics")).is_some());
        f.cache.indexer().wait_settled(Duration::from_millis(1));
        assert_eq!(nav.current(), 0);

        nav.advance(&mut f.cache, -1);
        assert_eq!(nav.current(), 2);

        nav.advance(&mut f.cache, 1);
        assert_eq!(nav.current(), 0);

        nav.advance(&mut f.cache, 4);
        assert_eq!(nav.current(), 1);
        assert_eq!(nav.status_line(&f.cache), "[2/3] b.png");
    }

    #[test]
    fn test_zero_direction_is_noop() {
        let mut f = cache_fixture(8, three);
        let mut nav = Navigator::new(2);

        let opened = nav.open(&mut f.cache, Path::new("/pics/b.png")).unwrap();
        assert_eq!(nav.current(), 1);

        let same = nav.advance(&mut f.cache, 0);
        assert_eq!(same, opened);
        assert_eq!(nav.current(), 1);
        assert_eq!(nav.direction(), 0);
    }

    #[test]
    fn test_prefetch_follows_direction() {
        let mut f = cache_fixture(8, |memory| {
            for name in ["a.png", "b.png", "c.png", "d.png", "e.png"] {
                memory.add_file(format!("/pics/{name}"), "2 2");
            }
        });
        let mut nav = Navigator::new(2);

        nav.open(&mut f.cache, Path::new("/pics")).unwrap();
        f.cache.indexer().wait_settled(Duration::from_millis(1));

        nav.advance(&mut f.cache, 1);
        assert_eq!(nav.current(), 1);
        for index in [1, 2, 3] {
            assert!(f.cache.contains(index));
        }
        assert!(!f.cache.contains(4));

        nav.advance(&mut f.cache, -1);
        assert_eq!(nav.current(), 0);
        assert!(f.cache.contains(4));
    }

    #[test]
    fn test_empty_list_and_missing_target() {
        let mut f = cache_fixture(4, |memory| memory.add_dir("/empty"));
        let mut nav = Navigator::new(2);

        assert!(nav.open(&mut f.cache, Path::new("/empty")).is_none());
        assert!(nav.advance(&mut f.cache, 1).is_empty());
        assert_eq!(nav.current(), 0);
        assert!(nav.root().is_none());
        assert_eq!(nav.status_line(&f.cache), "");
    }

    #[test]
    fn test_wrap() {
        assert_eq!(wrap(0, -1, 3), 2);
        assert_eq!(wrap(2, 1, 3), 0);
        assert_eq!(wrap(1, -7, 3), 0);
        assert_eq!(wrap(5, 0, 3), 2);
    }
}
