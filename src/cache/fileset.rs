//! File and key sets that feed the cache codec
//!
//! A `FileSet` maps logical names (where a file lands once reconstructed) to
//! source locations on disk. Logical names are normalized on insertion and
//! stored in a `BTreeMap`, so every consumer iterates them in sorted order.

use crate::error::{CracError, CracResult};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Glob metacharacters recognised by the `glob` crate
const GLOB_META: &[char] = &['*', '?', '['];

/// Mapping from logical name to source location
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileSet {
    entries: BTreeMap<String, PathBuf>,
}

impl FileSet {
    /// Create an empty file set
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a file under a logical name, replacing any previous source
    pub fn insert(&mut self, logical_name: &str, source: impl Into<PathBuf>) -> CracResult<()> {
        let name = normalize_logical_name(logical_name)?;
        self.entries.insert(name, source.into());
        Ok(())
    }

    /// Number of files
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the set holds no files
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate `(logical name, source)` pairs in logical-name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Path)> {
        self.entries
            .iter()
            .map(|(name, source)| (name.as_str(), source.as_path()))
    }

    /// Logical names in sorted order
    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    /// Source location for a logical name
    pub fn get(&self, logical_name: &str) -> Option<&Path> {
        self.entries.get(logical_name).map(PathBuf::as_path)
    }

    /// Merge another set into this one; entries from `other` win on conflict
    pub fn extend(&mut self, other: FileSet) {
        self.entries.extend(other.entries);
    }

    /// Expand glob patterns relative to `workdir` into a file set.
    ///
    /// Matching directories are walked recursively. Logical names are the
    /// match paths relative to `workdir`, or relative to the pattern's
    /// literal base directory when the match lies outside `workdir`.
    pub fn scan(patterns: &[String], workdir: &Path) -> CracResult<Self> {
        let mut set = Self::new();

        for pattern in patterns {
            let full = resolve_source(workdir, Path::new(pattern));
            let base = literal_base(&full);
            let full_str = full.to_string_lossy();

            let paths = glob::glob(&full_str).map_err(|e| CracError::InvalidPattern {
                pattern: pattern.clone(),
                reason: e.to_string(),
            })?;

            let before = set.len();
            for entry in paths {
                let path = match entry {
                    Ok(path) => path,
                    Err(e) if crosses_symlinked_dir(e.path(), &base) => {
                        debug!(path = %e.path().display(), "Skipping unreadable symlink lap");
                        continue;
                    }
                    Err(e) => {
                        return Err(CracError::io(
                            format!("scanning pattern {}", pattern),
                            std::io::Error::from(e),
                        ))
                    }
                };

                if crosses_symlinked_dir(&path, &base) {
                    debug!(path = %path.display(), "Skipping match reached through a symlinked directory");
                    continue;
                }

                if path.is_dir() {
                    let mut found = Vec::new();
                    walk_files(&path, &mut found)?;
                    for file in found {
                        let name = logical_name_for(&file, workdir, &base)?;
                        set.insert(&name, file)?;
                    }
                } else if path.is_file() {
                    let name = logical_name_for(&path, workdir, &base)?;
                    set.insert(&name, path)?;
                }
            }

            debug!(pattern = %pattern, matched = set.len() - before, "Expanded file pattern");
        }

        Ok(set)
    }
}

/// Order-irrelevant set of opaque keys that participate in the cache key
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeySet {
    keys: BTreeSet<String>,
}

impl KeySet {
    /// Create an empty key set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a key. An empty string is a key like any other and is hashed.
    pub fn insert(&mut self, key: impl Into<String>) {
        self.keys.insert(key.into());
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for KeySet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = Self::new();
        for key in iter {
            set.insert(key);
        }
        set
    }
}

/// Normalize a logical name to a relative, slash-separated path.
///
/// Backslashes become `/`, empty and `.` components are dropped. Absolute
/// names, drive prefixes and `..` components are rejected.
pub fn normalize_logical_name(name: &str) -> CracResult<String> {
    let invalid = |reason: &str| CracError::InvalidLogicalName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    let replaced = name.replace('\\', "/");
    if replaced.starts_with('/') {
        return Err(invalid("must be relative"));
    }
    if replaced.contains('\0') {
        return Err(invalid("must not contain NUL bytes"));
    }

    let mut parts = Vec::new();
    for part in replaced.split('/') {
        match part {
            "" | "." => continue,
            ".." => return Err(invalid("must not contain '..'")),
            p => parts.push(p),
        }
    }

    let Some(first) = parts.first() else {
        return Err(invalid("must not be empty"));
    };
    if first.len() == 2 && first.ends_with(':') && first.starts_with(|c: char| c.is_ascii_alphabetic())
    {
        return Err(invalid("must not carry a drive prefix"));
    }

    Ok(parts.join("/"))
}

/// Resolve a source location against the working directory.
///
/// Absolute sources are returned unchanged.
pub fn resolve_source(workdir: &Path, source: &Path) -> PathBuf {
    if source.is_absolute() {
        source.to_path_buf()
    } else {
        workdir.join(source)
    }
}

/// Leading components of a pattern that contain no glob metacharacters
fn literal_base(pattern: &Path) -> PathBuf {
    let mut base = PathBuf::new();
    for component in pattern.components() {
        if component.as_os_str().to_string_lossy().contains(GLOB_META) {
            break;
        }
        base.push(component);
    }
    // A literal file path has itself as base; its parent is what we want
    if base == pattern {
        base.pop();
    }
    base
}

fn logical_name_for(path: &Path, workdir: &Path, base: &Path) -> CracResult<String> {
    let relative = path
        .strip_prefix(workdir)
        .or_else(|_| path.strip_prefix(base))
        .unwrap_or(path);

    let joined = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/");

    normalize_logical_name(&joined)
}

/// Whether a match below `base` passes through a symlinked directory.
///
/// Such matches are laps around a link (`**` follows them), not new files.
fn crosses_symlinked_dir(path: &Path, base: &Path) -> bool {
    let Ok(relative) = path.strip_prefix(base) else {
        return false;
    };
    let mut current = base.to_path_buf();
    let mut components = relative.components().peekable();
    while let Some(component) = components.next() {
        if components.peek().is_none() {
            break;
        }
        current.push(component);
        if fs::symlink_metadata(&current).is_ok_and(|m| m.file_type().is_symlink()) {
            return true;
        }
    }
    false
}

/// Recursively collect regular files under a directory.
///
/// Symlinks to files are kept; symlinked directories are not entered.
fn walk_files(dir: &Path, out: &mut Vec<PathBuf>) -> CracResult<()> {
    let entries = fs::read_dir(dir)
        .map_err(|e| CracError::io(format!("reading directory {}", dir.display()), e))?;

    for entry in entries {
        let entry = entry
            .map_err(|e| CracError::io(format!("reading entry in {}", dir.display()), e))?;
        let path = entry.path();
        let file_type = entry
            .file_type()
            .map_err(|e| CracError::io(format!("inspecting {}", path.display()), e))?;

        if file_type.is_dir() {
            walk_files(&path, out)?;
        } else if file_type.is_file() {
            out.push(path);
        } else if file_type.is_symlink() {
            if path.is_file() {
                out.push(path);
            } else {
                debug!(path = %path.display(), "Not following symlink");
            }
        }
    }

    Ok(())
}
