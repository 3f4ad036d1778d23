//! ``src/fs/memory.rs``
//! ============================================================================
//! # In-Memory File System
//!
//! A [`FileSystem`] kept entirely in memory. Listings preserve insertion
//! order, which makes traversal order deterministic, and any path can be
//! marked as a container so archive nesting can be modelled without an
//! archive reader.

use std::collections::HashSet;
use std::io::{self, Cursor};
use std::path::Path;
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use parking_lot::RwLock;

use crate::fs::vfs::{EntryInfo, FileSystem, ReadSeek, TargetKind};

#[derive(Debug, Default)]
struct Tree {
    files: IndexMap<String, Arc<Vec<u8>>>,
    dirs: IndexSet<String>,
    containers: HashSet<String>,
}

#[derive(Debug, Default)]
pub struct MemoryFileSystem {
    tree: RwLock<Tree>,
}

impl MemoryFileSystem {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a file, creating parent directories implicitly.
    pub fn add_file(&self, path: impl AsRef<Path>, bytes: impl Into<Vec<u8>>) {
        let key = path_to_key(path.as_ref());
        let mut tree = self.tree.write();
        register_parents(&mut tree, &key);
        tree.files.insert(key, Arc::new(bytes.into()));
    }

    /// Adds an (empty) directory.
    pub fn add_dir(&self, path: impl AsRef<Path>) {
        let key = path_to_key(path.as_ref());
        let mut tree = self.tree.write();
        register_parents(&mut tree, &key);
        tree.dirs.insert(key);
    }

    /// Marks `path` as a container: a file that also lists as a directory.
    pub fn add_container(&self, path: impl AsRef<Path>) {
        let key = path_to_key(path.as_ref());
        let mut tree = self.tree.write();
        register_parents(&mut tree, &key);
        tree.dirs.insert(key.clone());
        tree.containers.insert(key);
    }
}

impl FileSystem for MemoryFileSystem {
    fn classify(&self, target: &Path) -> io::Result<TargetKind> {
        let key = path_to_key(target);
        let tree = self.tree.read();

        if tree.containers.contains(&key) {
            Ok(TargetKind::Container)
        } else if tree.files.contains_key(&key) {
            Ok(TargetKind::File)
        } else if tree.dirs.contains(&key) {
            Ok(TargetKind::Directory)
        } else {
            Err(not_found(&key))
        }
    }

    fn list(&self, dir: &Path) -> io::Result<Vec<EntryInfo>> {
        let key = path_to_key(dir);
        let tree = self.tree.read();

        if !tree.dirs.contains(&key) {
            return Err(not_found(&key));
        }

        let prefix = if key.is_empty() {
            String::new()
        } else {
            format!("{key}/")
        };

        let mut children: IndexMap<String, EntryInfo> = IndexMap::new();

        let dir_names = tree.dirs.iter().map(|name| (name, true));
        let file_names = tree.files.keys().map(|name| (name, false));

        for (path, is_dir) in dir_names.chain(file_names) {
            let Some(rest) = path.strip_prefix(&prefix) else {
                continue;
            };
            if rest.is_empty() || rest.contains('/') {
                continue;
            }

            let entry = if tree.containers.contains(path) {
                EntryInfo::container(rest)
            } else if is_dir {
                EntryInfo::dir(rest)
            } else {
                EntryInfo::file(rest)
            };
            children.entry(rest.to_string()).or_insert(entry);
        }

        Ok(children.into_values().collect())
    }

    fn open(&self, path: &Path) -> io::Result<Box<dyn ReadSeek>> {
        let key = path_to_key(path);
        let bytes = self
            .tree
            .read()
            .files
            .get(&key)
            .cloned()
            .ok_or_else(|| not_found(&key))?;

        Ok(Box::new(Cursor::new(bytes.as_ref().clone())))
    }
}

/// Normalizes a path into a `/`-separated key without leading or trailing separators.
fn path_to_key(path: &Path) -> String {
    let text: String = if cfg!(windows) {
        path.to_string_lossy().replace('\\', "/")
    } else {
        path.to_string_lossy().to_string()
    };

    text.split('/')
        .filter(|part| !part.is_empty() && *part != ".")
        .collect::<Vec<_>>()
        .join("/")
}

fn register_parents(tree: &mut Tree, key: &str) {
    tree.dirs.insert(String::new());

    let mut end = 0;
    while let Some(offset) = key[end..].find('/') {
        end += offset;
        tree.dirs.insert(key[..end].to_string());
        end += 1;
    }
}

fn not_found(key: &str) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("no such entry: {key}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn test_listing_keeps_insertion_order() {
        let fs = MemoryFileSystem::new();
        fs.add_file("/root/b.png", b"b".to_vec());
        fs.add_file("/root/a.png", b"a".to_vec());
        fs.add_file("/root/sub/c.png", b"c".to_vec());

        let names: Vec<String> = fs
            .list(Path::new("/root"))
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();

        // directories are registered before the files that create them
        assert_eq!(names, vec!["sub", "b.png", "a.png"]);
    }

    #[test]
    fn test_containers_classify_and_list() {
        let fs = MemoryFileSystem::new();
        fs.add_container("/root/pack.zip");
        fs.add_file("/root/pack.zip/inner.png", b"x".to_vec());

        assert_eq!(
            fs.classify(Path::new("/root/pack.zip")).unwrap(),
            TargetKind::Container
        );
        assert_eq!(
            fs.list(Path::new("/root")).unwrap(),
            vec![EntryInfo::container("pack.zip")]
        );
        assert_eq!(
            fs.list(Path::new("/root/pack.zip")).unwrap(),
            vec![EntryInfo::file("inner.png")]
        );
    }

    #[test]
    fn test_open_and_missing() {
        let fs = MemoryFileSystem::new();
        fs.add_file("/root/a.png", b"hello".to_vec());
        fs.add_dir("/empty");

        let mut text = String::new();
        fs.open(Path::new("/root/a.png"))
            .unwrap()
            .read_to_string(&mut text)
            .unwrap();
        assert_eq!(text, "hello");

        assert_eq!(fs.classify(Path::new("/empty")).unwrap(), TargetKind::Directory);
        assert!(fs.list(Path::new("/empty")).unwrap().is_empty());
        assert!(fs.open(Path::new("/root/missing.png")).is_err());
        assert!(fs.classify(Path::new("/nowhere")).is_err());
    }
}
