//! ``src/fs/vfs.rs``
//! ============================================================================
//! # Virtual File System Seam
//!
//! The indexer and the texture cache never touch `std::fs` directly. They see
//! a [`FileSystem`]: classify a target, list one directory level, open a byte
//! stream. Container files (archives mounted as directories) are listable
//! entries flagged with `is_container`.

use std::io::{self, Read, Seek};
use std::path::Path;

/// Byte stream handed to decoders.
pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    pub name: String,
    pub is_dir: bool,
    /// Virtual directory mapped over a single file
    pub is_container: bool,
}

impl EntryInfo {
    #[must_use]
    pub fn file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_dir: false,
            is_container: false,
        }
    }

    #[must_use]
    pub fn dir(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_dir: true,
            is_container: false,
        }
    }

    #[must_use]
    pub fn container(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_dir: true,
            is_container: true,
        }
    }

    /// Extension of the entry name, without the dot.
    #[must_use]
    pub fn extension(&self) -> Option<&str> {
        extension_of(&self.name)
    }
}

/// What a user-supplied target turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    /// A file that can be browsed as a directory
    Container,
    File,
    Directory,
}

pub trait FileSystem: Send + Sync {
    fn classify(&self, target: &Path) -> io::Result<TargetKind>;

    /// Lists the immediate children of `dir` in enumeration order.
    fn list(&self, dir: &Path) -> io::Result<Vec<EntryInfo>>;

    fn open(&self, path: &Path) -> io::Result<Box<dyn ReadSeek>>;
}

/// Extension of a `/`-separated name, without the dot.
#[must_use]
pub fn extension_of(name: &str) -> Option<&str> {
    Path::new(name)
        .extension()
        .and_then(std::ffi::OsStr::to_str)
        .filter(|ext| !ext.is_empty())
}
