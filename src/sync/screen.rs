//! Local and remote listings of a unit and the delta between them.

use crate::error::{Result, SyncError};
use crate::lock::LOCK_MARKER_NAME;
use crate::transport::{join_remote, Transport};
use ignore::WalkBuilder;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

/// A file of a unit, keyed by its `/`-separated path relative to the unit root.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct FileEntry {
    pub relative_path: String,
    pub size: u64,
}

/// Split of the local files into already-uploaded and still-missing ones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferDelta {
    pub synced: Vec<FileEntry>,
    /// Copy set, ascending by relative path
    pub unsynced: Vec<FileEntry>,
}

impl TransferDelta {
    /// Remote subdirectories needed by the copy set, parents first.
    pub fn remote_subdirectories(&self) -> Vec<String> {
        let mut dirs = BTreeSet::new();
        for entry in &self.unsynced {
            let mut path = entry.relative_path.as_str();
            while let Some((parent, _)) = path.rsplit_once('/') {
                if parent.is_empty() {
                    break;
                }
                dirs.insert(parent.to_string());
                path = parent;
            }
        }
        dirs.into_iter().collect()
    }
}

fn relative_string(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().to_string()),
            _ => None,
        })
        .collect::<Option<_>>()?;
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

fn is_marker(relative_path: &str) -> bool {
    relative_path.rsplit('/').next() == Some(LOCK_MARKER_NAME)
}

/// All regular files below `dir`, sorted by relative path.
pub fn screen_local_directory(dir: &Path) -> Result<Vec<FileEntry>> {
    if !dir.is_dir() {
        return Err(SyncError::local_io(
            dir,
            io::Error::new(io::ErrorKind::NotFound, "unit directory does not exist"),
        ));
    }

    let walker = WalkBuilder::new(dir)
        .standard_filters(false)
        .follow_links(false)
        .build();

    let mut entries = Vec::new();
    for result in walker {
        let entry = result.map_err(|e| {
            let message = e.to_string();
            let source = e
                .into_io_error()
                .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, message));
            SyncError::local_io(dir, source)
        })?;
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let Some(relative_path) = relative_string(dir, entry.path()) else {
            continue;
        };
        if is_marker(&relative_path) {
            continue;
        }
        let size = entry
            .metadata()
            .map_err(|e| {
                SyncError::local_io(
                    entry.path(),
                    io::Error::new(io::ErrorKind::Other, e.to_string()),
                )
            })?
            .len();
        entries.push(FileEntry {
            relative_path,
            size,
        });
    }

    entries.sort();
    Ok(entries)
}

/// The given flat files, keyed by file name.
pub fn screen_local_files(paths: &[PathBuf]) -> Result<Vec<FileEntry>> {
    let mut entries = Vec::with_capacity(paths.len());
    for path in paths {
        let metadata = fs::metadata(path).map_err(|e| SyncError::local_io(path, e))?;
        let Some(name) = path.file_name() else {
            continue;
        };
        entries.push(FileEntry {
            relative_path: name.to_string_lossy().to_string(),
            size: metadata.len(),
        });
    }
    entries.sort();
    Ok(entries)
}

/// Remote files below `remote_root`; recursive unless `flat` is set.
pub fn screen_remote<T: Transport + ?Sized>(
    transport: &T,
    remote_root: &str,
    flat: bool,
) -> Result<Vec<FileEntry>> {
    let mut entries = Vec::new();
    let mut queue: VecDeque<(String, String)> = VecDeque::new();
    queue.push_back((remote_root.to_string(), String::new()));

    while let Some((dir, prefix)) = queue.pop_front() {
        for item in transport.list(&dir)? {
            let relative_path = if prefix.is_empty() {
                item.name.clone()
            } else {
                format!("{prefix}/{}", item.name)
            };
            if item.is_dir {
                if !flat {
                    queue.push_back((join_remote(&dir, &item.name), relative_path));
                }
            } else if !is_marker(&relative_path) {
                entries.push(FileEntry {
                    relative_path,
                    size: item.size,
                });
            }
        }
    }

    entries.sort();
    Ok(entries)
}

/// A local file is synced iff the remote has a file at the same relative
/// path with the same size. Remote-only files are ignored.
pub fn compute_delta(local: &[FileEntry], remote: &[FileEntry]) -> TransferDelta {
    let remote_sizes: HashMap<&str, u64> = remote
        .iter()
        .map(|e| (e.relative_path.as_str(), e.size))
        .collect();

    let mut delta = TransferDelta::default();
    for entry in local {
        if remote_sizes.get(entry.relative_path.as_str()) == Some(&entry.size) {
            delta.synced.push(entry.clone());
        } else {
            delta.unsynced.push(entry.clone());
        }
    }
    delta.synced.sort();
    delta.unsynced.sort();
    delta
}
