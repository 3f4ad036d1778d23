//! ``src/fs/local.rs``
//! ============================================================================
//! # Local File System
//!
//! [`FileSystem`] over the host file system. Listings are one level deep
//! (`walkdir` with `min_depth(1).max_depth(1)`); entries that fail to stat are
//! skipped with a debug event.
//!
//! Zip archives are containers: a path may run through any number of them
//! (`shots.zip/raw/inner.zip/a.png`). The disk part of a path ends at the
//! first archive file, the rest is resolved inside the archive, and an archive
//! entry that is itself an archive is read into memory and entered in turn.
//!
//! Symbolic links are followed. A link to a directory is skipped only when it
//! points back at the directory being listed or one of its ancestors.

use std::fs::File;
use std::io::{self, BufReader, Cursor, Read};
use std::path::{Component, Path, PathBuf};

use indexmap::IndexMap;
use tracing::debug;
use walkdir::WalkDir;
use zip::ZipArchive;

use crate::fs::vfs::{EntryInfo, FileSystem, ReadSeek, TargetKind, extension_of};

/// Extensions opened as containers
const ARCHIVE_EXTENSIONS: &[&str] = &["zip", "cbz"];

type Archive = ZipArchive<Box<dyn ReadSeek>>;

/// Where a path ends up once archives along it are entered.
enum Location {
    Disk(PathBuf),
    /// `inner` is `/`-separated and empty for the archive root
    Archive { archive: Archive, inner: String },
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileSystem;

impl LocalFileSystem {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl FileSystem for LocalFileSystem {
    fn classify(&self, target: &Path) -> io::Result<TargetKind> {
        match locate(target)? {
            Location::Disk(path) => {
                if std::fs::metadata(path)?.is_dir() {
                    Ok(TargetKind::Directory)
                } else {
                    Ok(TargetKind::File)
                }
            }

            Location::Archive { archive, inner } => {
                if inner.is_empty() {
                    Ok(TargetKind::Container)
                } else if archive.index_for_name(&inner).is_some() {
                    Ok(TargetKind::File)
                } else if archive
                    .file_names()
                    .any(|name| is_below(name, &inner))
                {
                    Ok(TargetKind::Directory)
                } else {
                    Err(not_found(target))
                }
            }
        }
    }

    fn list(&self, dir: &Path) -> io::Result<Vec<EntryInfo>> {
        match locate(dir)? {
            Location::Disk(path) => list_disk(&path),

            Location::Archive { archive, inner } => {
                list_archive(&archive, &inner).ok_or_else(|| not_found(dir))
            }
        }
    }

    fn open(&self, path: &Path) -> io::Result<Box<dyn ReadSeek>> {
        match locate(path)? {
            Location::Disk(path) => {
                let file = File::open(path)?;
                Ok(Box::new(BufReader::new(file)))
            }

            Location::Archive { inner, .. } if inner.is_empty() => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is a container", path.display()),
            )),

            Location::Archive { mut archive, inner } => {
                let bytes = read_entry(&mut archive, &inner)?;
                Ok(Box::new(Cursor::new(bytes)))
            }
        }
    }
}

fn list_disk(dir: &Path) -> io::Result<Vec<EntryInfo>> {
    // surface an unreadable root as an error instead of an empty listing
    std::fs::read_dir(dir)?;

    let mut entries: Vec<EntryInfo> = Vec::new();

    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .into_iter()
    {
        let entry = match entry {
            Ok(entry) => entry,

            Err(e) => {
                debug!(
                    marker = "INDEXER",
                    operation_type = "entry_skipped",
                    dir = %dir.display(),
                    error = %e,
                    "Skipping unreadable entry"
                );
                continue;
            }
        };

        let Some(name) = entry.file_name().to_str() else {
            debug!(
                marker = "INDEXER",
                operation_type = "entry_skipped",
                path = %entry.path().display(),
                "Skipping non UTF-8 entry name"
            );
            continue;
        };

        let is_dir = entry.file_type().is_dir();
        if is_dir && entry.path_is_symlink() && leads_to_ancestor(dir, entry.path()) {
            debug!(
                marker = "INDEXER",
                operation_type = "entry_skipped",
                path = %entry.path().display(),
                "Skipping symlink loop"
            );
            continue;
        }

        entries.push(if is_dir {
            EntryInfo::dir(name)
        } else if is_archive_name(name) {
            EntryInfo::container(name)
        } else {
            EntryInfo::file(name)
        });
    }

    Ok(entries)
}

/// Children of `inner` inside `archive`, or `None` when nothing lives there.
fn list_archive(archive: &Archive, inner: &str) -> Option<Vec<EntryInfo>> {
    let prefix = if inner.is_empty() {
        String::new()
    } else {
        format!("{inner}/")
    };

    let mut found = inner.is_empty();
    let mut children: IndexMap<String, EntryInfo> = IndexMap::new();

    for name in archive.file_names() {
        let Some(rest) = name.strip_prefix(prefix.as_str()) else {
            continue;
        };
        found = true;

        let (child, is_dir) = match rest.split_once('/') {
            Some((child, _)) => (child, true),
            None => (rest, false),
        };
        if child.is_empty() {
            continue;
        }

        let entry = if is_dir {
            EntryInfo::dir(child)
        } else if is_archive_name(child) {
            EntryInfo::container(child)
        } else {
            EntryInfo::file(child)
        };
        children.entry(child.to_string()).or_insert(entry);
    }

    found.then(|| children.into_values().collect())
}

/// Splits `path` at the first archive file on disk and resolves the rest inside it.
fn locate(path: &Path) -> io::Result<Location> {
    let mut disk = PathBuf::new();
    let mut components = path.components();

    while let Some(component) = components.next() {
        disk.push(component);

        if is_archive_name(&disk.to_string_lossy()) && disk.is_file() {
            let file = File::open(&disk)?;
            let archive = open_archive(Box::new(BufReader::new(file)))?;

            let parts: Vec<String> = components
                .filter_map(|component| match component {
                    Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                    _ => None,
                })
                .collect();

            return descend(archive, &parts);
        }
    }

    Ok(Location::Disk(path.to_path_buf()))
}

/// Resolves `parts` inside `archive`, entering nested archives on the way.
fn descend(mut archive: Archive, parts: &[String]) -> io::Result<Location> {
    for end in 1..=parts.len() {
        let name = parts[..end].join("/");

        if is_archive_name(&name) && archive.index_for_name(&name).is_some() {
            let bytes = read_entry(&mut archive, &name)?;
            let nested = open_archive(Box::new(Cursor::new(bytes)))?;
            return descend(nested, &parts[end..]);
        }
    }

    Ok(Location::Archive {
        archive,
        inner: parts.join("/"),
    })
}

fn open_archive(stream: Box<dyn ReadSeek>) -> io::Result<Archive> {
    ZipArchive::new(stream).map_err(io::Error::other)
}

fn read_entry(archive: &mut Archive, name: &str) -> io::Result<Vec<u8>> {
    let mut entry = archive.by_name(name).map_err(io::Error::other)?;

    let mut bytes = Vec::with_capacity(usize::try_from(entry.size()).unwrap_or(0));
    entry.read_to_end(&mut bytes)?;
    Ok(bytes)
}

fn is_archive_name(name: &str) -> bool {
    extension_of(name).is_some_and(|ext| {
        ARCHIVE_EXTENSIONS
            .iter()
            .any(|known| ext.eq_ignore_ascii_case(known))
    })
}

/// Whether archive entry `name` lives under directory `inner`.
fn is_below(name: &str, inner: &str) -> bool {
    name.strip_prefix(inner)
        .is_some_and(|rest| rest.starts_with('/'))
}

/// Whether the directory `link` resolves to contains `dir`.
fn leads_to_ancestor(dir: &Path, link: &Path) -> bool {
    match (std::fs::canonicalize(dir), std::fs::canonicalize(link)) {
        (Ok(here), Ok(target)) => here.starts_with(target),
        _ => true,
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("no such entry: {}", path.display()),
    )
}
