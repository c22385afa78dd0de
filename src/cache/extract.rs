//! Archive extraction
//!
//! Writes payload segments back to disk under a destination directory.
//! Every entry name is sanitized first; anything that would land outside the
//! destination aborts the extraction.

use crate::cache::archive::{entry_name, ArchiveSegment};
use crate::error::{CracError, CracResult};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Mode applied to every extracted file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilePermission(u32);

impl Default for FilePermission {
    fn default() -> Self {
        Self(0o755)
    }
}

impl FilePermission {
    pub fn new(mode: u32) -> CracResult<Self> {
        if mode > 0o7777 {
            return Err(CracError::User(format!(
                "Invalid file permission {:o}: must be at most 7777",
                mode
            )));
        }
        Ok(Self(mode))
    }

    /// Parse an octal mode written as `755`, `0755` or `0o755`
    pub fn parse(value: &str) -> CracResult<Self> {
        let trimmed = value.trim();
        let digits = trimmed.strip_prefix("0o").unwrap_or(trimmed);
        let mode = u32::from_str_radix(digits, 8).map_err(|_| {
            CracError::User(format!("Invalid file permission '{}': expected octal", value))
        })?;
        Self::new(mode)
    }

    pub fn mode(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for FilePermission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04o}", self.0)
    }
}

/// Turn an archive entry name into a path relative to the destination.
///
/// Returns `None` for names that refer to the destination itself.
fn sanitize_entry_path(name: &str) -> CracResult<Option<PathBuf>> {
    if name.starts_with('/') || name.starts_with('\\') {
        return Err(CracError::PathEscape(name.to_string()));
    }

    let mut relative = PathBuf::new();
    for (i, part) in name.split(['/', '\\']).enumerate() {
        match part {
            "" | "." => continue,
            ".." => return Err(CracError::PathEscape(name.to_string())),
            p if i == 0 && p.len() == 2 && p.ends_with(':') => {
                return Err(CracError::PathEscape(name.to_string()));
            }
            p => relative.push(p),
        }
    }

    Ok((!relative.as_os_str().is_empty()).then_some(relative))
}

/// Refuse to write through a symlink already present under `dest`.
///
/// Every existing prefix of `relative`, including the full path, must be a
/// real directory or file. Components that do not exist yet are fine.
fn reject_symlinked_components(dest: &Path, relative: &Path, name: &str) -> CracResult<()> {
    let mut current = dest.to_path_buf();
    for component in relative.components() {
        current.push(component);
        match fs::symlink_metadata(&current) {
            Ok(meta) if meta.file_type().is_symlink() => {
                return Err(CracError::PathEscape(name.to_string()));
            }
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                return Err(CracError::io(format!("inspecting {}", current.display()), e));
            }
        }
    }
    Ok(())
}

#[cfg(unix)]
fn apply_permission(path: &Path, permission: FilePermission) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(permission.mode()))
}

#[cfg(not(unix))]
fn apply_permission(_path: &Path, _permission: FilePermission) -> io::Result<()> {
    Ok(())
}

/// Extract payload segments into `dest`, in segment order then entry order.
///
/// Returns the number of files written.
pub fn extract(
    segments: &[ArchiveSegment],
    dest: &Path,
    permission: FilePermission,
) -> CracResult<usize> {
    fs::create_dir_all(dest)
        .map_err(|e| CracError::io(format!("creating {}", dest.display()), e))?;

    let mut written = 0;

    for segment in segments {
        let mut archive = tar::Archive::new(segment.data());
        let entries = archive
            .entries()
            .map_err(|e| CracError::io(format!("reading segment {}", segment.index()), e))?;

        for entry in entries {
            let mut entry = entry.map_err(|e| {
                CracError::io(format!("reading segment {} entry", segment.index()), e)
            })?;
            let name = entry_name(&entry);
            let Some(relative) = sanitize_entry_path(&name)? else {
                continue;
            };
            let target = dest.join(&relative);
            let kind = entry.header().entry_type();

            if kind.is_dir() || kind.is_file() {
                reject_symlinked_components(dest, &relative, &name)?;
            }

            if kind.is_dir() {
                fs::create_dir_all(&target)
                    .map_err(|e| CracError::io(format!("creating {}", target.display()), e))?;
            } else if kind.is_file() {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)
                        .map_err(|e| CracError::io(format!("creating {}", parent.display()), e))?;
                }
                let mut file = fs::File::create(&target)
                    .map_err(|e| CracError::io(format!("creating {}", target.display()), e))?;
                io::copy(&mut entry, &mut file)
                    .map_err(|e| CracError::io(format!("writing {}", target.display()), e))?;
                apply_permission(&target, permission).map_err(|e| {
                    CracError::io(format!("setting permissions on {}", target.display()), e)
                })?;

                debug!(file = %name, segment = segment.index(), "Extracted file");
                written += 1;
            } else {
                warn!(entry = %name, kind = ?kind, "Skipping unsupported archive entry");
            }
        }
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::archive::{build, build_from_entries, ChunkLimit};
    use crate::cache::fileset::FileSet;
    use tempfile::TempDir;

    fn raw_segment(name: &str, body: &[u8], kind: tar::EntryType) -> ArchiveSegment {
        let mut header = tar::Header::new_gnu();
        if let Some(gnu) = header.as_gnu_mut() {
            gnu.name[..name.len()].copy_from_slice(name.as_bytes());
        }
        header.set_size(body.len() as u64);
        header.set_mode(0o644);
        header.set_entry_type(kind);
        header.set_cksum();

        let mut builder = tar::Builder::new(Vec::new());
        builder.append(&header, body).unwrap();
        ArchiveSegment::from_tar(0, builder.into_inner().unwrap()).unwrap()
    }

    #[test]
    fn permission_parsing() {
        assert_eq!(FilePermission::parse("755").unwrap().mode(), 0o755);
        assert_eq!(FilePermission::parse("0644").unwrap().mode(), 0o644);
        assert_eq!(FilePermission::parse("0o600").unwrap().mode(), 0o600);
        assert_eq!(FilePermission::default().to_string(), "0755");
        assert!(FilePermission::parse("999").is_err());
        assert!(FilePermission::parse("17777").is_err());
        assert!(FilePermission::parse("rwx").is_err());
    }

    #[test]
    fn sanitize_accepts_nested_relative_names() {
        assert_eq!(
            sanitize_entry_path("a/./b//c.txt").unwrap(),
            Some(PathBuf::from("a/b/c.txt"))
        );
        assert_eq!(sanitize_entry_path("./").unwrap(), None);
    }

    #[test]
    fn sanitize_rejects_escapes() {
        for name in ["../escape", "/abs", "a/../../b", "..\\win", "C:/x", "\\\\server\\share"] {
            assert!(
                matches!(sanitize_entry_path(name), Err(CracError::PathEscape(_))),
                "{} was accepted",
                name
            );
        }
    }

    #[test]
    fn extracts_file_with_configured_mode() {
        let dest = TempDir::new().unwrap();
        let segment = build_from_entries(0, &[("a.txt", b"hello")]).unwrap();

        let written = extract(&[segment], dest.path(), FilePermission::parse("0640").unwrap())
            .unwrap();

        assert_eq!(written, 1);
        assert_eq!(fs::read(dest.path().join("a.txt")).unwrap(), b"hello");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(dest.path().join("a.txt")).unwrap().permissions().mode();
            assert_eq!(mode & 0o7777, 0o640);
        }
    }

    #[test]
    fn build_then_extract_round_trips_at_every_limit() {
        let src = TempDir::new().unwrap();
        let files: &[(&str, &[u8])] = &[
            ("one", b"1"),
            ("dir/two", b"22"),
            ("dir/deeper/three", b"333"),
            ("four", b""),
        ];
        let mut set = FileSet::new();
        for (name, contents) in files {
            let path = src.path().join(name.replace('/', "_"));
            fs::write(&path, contents).unwrap();
            set.insert(name, path).unwrap();
        }

        for limit in [1, 2, 3, 5, 1024, 0] {
            let dest = TempDir::new().unwrap();
            let segments = build(&set, src.path(), ChunkLimit::bytes(limit)).unwrap();

            extract(&segments, dest.path(), FilePermission::default()).unwrap();

            for (name, contents) in files {
                assert_eq!(
                    fs::read(dest.path().join(name)).unwrap(),
                    *contents,
                    "limit {} lost {}",
                    limit,
                    name
                );
            }
        }
    }

    #[test]
    fn traversal_is_rejected_and_nothing_escapes() {
        let root = TempDir::new().unwrap();
        let dest = root.path().join("dest");

        let segment = raw_segment("../escape", b"evil", tar::EntryType::Regular);
        let result = extract(&[segment], &dest, FilePermission::default());

        assert!(matches!(result, Err(CracError::PathEscape(_))));
        assert!(!root.path().join("escape").exists());
    }

    #[cfg(unix)]
    #[test]
    fn existing_symlink_in_destination_is_not_followed() {
        let root = TempDir::new().unwrap();
        let dest = root.path().join("dest");
        let outside = root.path().join("outside");
        fs::create_dir_all(&dest).unwrap();
        fs::create_dir_all(&outside).unwrap();
        std::os::unix::fs::symlink("../outside", dest.join("link")).unwrap();

        let segment = build_from_entries(0, &[("link/pwn", b"x")]).unwrap();
        let result = extract(&[segment], &dest, FilePermission::default());

        assert!(matches!(result, Err(CracError::PathEscape(_))));
        assert!(!outside.join("pwn").exists());
    }

    #[cfg(unix)]
    #[test]
    fn existing_symlink_as_file_target_is_not_followed() {
        let root = TempDir::new().unwrap();
        let dest = root.path().join("dest");
        fs::create_dir_all(&dest).unwrap();
        fs::write(root.path().join("victim"), b"keep").unwrap();
        std::os::unix::fs::symlink("../victim", dest.join("file")).unwrap();

        let segment = build_from_entries(0, &[("file", b"overwritten")]).unwrap();
        let result = extract(&[segment], &dest, FilePermission::default());

        assert!(matches!(result, Err(CracError::PathEscape(_))));
        assert_eq!(fs::read(root.path().join("victim")).unwrap(), b"keep");
    }

    #[test]
    fn absolute_name_is_rejected() {
        let dest = TempDir::new().unwrap();
        let segment = raw_segment("/abs", b"evil", tar::EntryType::Regular);

        let result = extract(&[segment], dest.path(), FilePermission::default());
        assert!(matches!(result, Err(CracError::PathEscape(_))));
    }

    #[test]
    fn directory_entries_are_created() {
        let dest = TempDir::new().unwrap();
        let segment = raw_segment("empty/dir/", b"", tar::EntryType::Directory);

        let written = extract(&[segment], dest.path(), FilePermission::default()).unwrap();

        assert_eq!(written, 0);
        assert!(dest.path().join("empty/dir").is_dir());
    }

    #[test]
    fn symlinks_are_skipped() {
        let dest = TempDir::new().unwrap();
        let segment = raw_segment("link", b"", tar::EntryType::Symlink);

        let written = extract(&[segment], dest.path(), FilePermission::default()).unwrap();

        assert_eq!(written, 0);
        assert!(!dest.path().join("link").exists());
    }

    #[test]
    fn later_segments_overwrite_earlier_entries() {
        let dest = TempDir::new().unwrap();
        let first = build_from_entries(0, &[("same", b"old")]).unwrap();
        let second = build_from_entries(1, &[("same", b"new")]).unwrap();

        extract(&[first, second], dest.path(), FilePermission::default()).unwrap();
        assert_eq!(fs::read(dest.path().join("same")).unwrap(), b"new");
    }
}
