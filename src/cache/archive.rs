//! Archive segments
//!
//! Packs a file set into one or more tar segments. Headers are normalized
//! (fixed mode, zero owner and mtime) so that the same inputs produce
//! byte-identical segments on every machine.

use crate::cache::fileset::{resolve_source, FileSet};
use crate::cache::key::sha256_hex;
use crate::error::{CracError, CracResult};
use std::fmt;
use std::fs;
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// Mode recorded on every archived file. Real permissions are applied at extraction.
const ENTRY_MODE: u32 = 0o644;

/// Prefix used for content digests
pub const DIGEST_PREFIX: &str = "sha256:";

/// `sha256:<hex>` digest of a byte slice
pub fn content_digest(data: &[u8]) -> String {
    format!("{}{}", DIGEST_PREFIX, sha256_hex(data))
}

/// Maximum payload bytes per segment. Zero means unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkLimit(u64);

impl ChunkLimit {
    /// A single segment regardless of size
    pub fn unbounded() -> Self {
        Self(0)
    }

    /// Seal segments once they would grow beyond `bytes`
    pub fn bytes(bytes: u64) -> Self {
        Self(bytes)
    }

    /// Parse a byte size such as `0`, `4096`, `64K`, `512MiB` or `2G`
    pub fn parse(value: &str) -> CracResult<Self> {
        parse_byte_size(value).map(Self)
    }

    pub fn is_bounded(&self) -> bool {
        self.0 > 0
    }

    pub fn as_bytes(&self) -> u64 {
        self.0
    }

    /// Whether appending `size` bytes to a segment holding `current` bytes exceeds the limit
    fn would_overflow(&self, current: u64, size: u64) -> bool {
        self.is_bounded() && current.saturating_add(size) > self.0
    }
}

impl fmt::Display for ChunkLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_bounded() {
            write!(f, "{} bytes", self.0)
        } else {
            write!(f, "unbounded")
        }
    }
}

/// Parse a byte size with an optional binary suffix (K, M, G, optionally `iB`/`B`)
pub fn parse_byte_size(value: &str) -> CracResult<u64> {
    let trimmed = value.trim();
    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (digits, suffix) = trimmed.split_at(split);

    let invalid = || CracError::User(format!("Invalid byte size '{}'", value));

    let number: u64 = digits.parse().map_err(|_| invalid())?;
    let multiplier: u64 = match suffix.trim().to_ascii_lowercase().as_str() {
        "" | "b" => 1,
        "k" | "kb" | "kib" => 1024,
        "m" | "mb" | "mib" => 1024 * 1024,
        "g" | "gb" | "gib" => 1024 * 1024 * 1024,
        _ => return Err(invalid()),
    };

    number.checked_mul(multiplier).ok_or_else(invalid)
}

/// An immutable, content-addressed tar stream holding part of a file set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveSegment {
    index: usize,
    entries: Vec<String>,
    data: Vec<u8>,
    digest: String,
}

impl ArchiveSegment {
    /// Wrap an existing tar stream (e.g. one pulled from a registry)
    pub fn from_tar(index: usize, data: Vec<u8>) -> CracResult<Self> {
        let entries = list_files(index, &data)?;
        let digest = content_digest(&data);
        Ok(Self {
            index,
            entries,
            data,
            digest,
        })
    }

    /// Position of this segment among its siblings
    pub fn index(&self) -> usize {
        self.index
    }

    /// Logical names of the files in this segment, in archive order
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Raw tar bytes
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// `sha256:<hex>` of the tar bytes
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Read a single file entry by name
    pub fn read_entry(&self, name: &str) -> CracResult<Option<Vec<u8>>> {
        let wanted = strip_root(name);
        let mut archive = tar::Archive::new(self.data.as_slice());
        let iter = archive
            .entries()
            .map_err(|e| CracError::io(format!("reading segment {}", self.index), e))?;

        for entry in iter {
            let mut entry = entry
                .map_err(|e| CracError::io(format!("reading segment {} entry", self.index), e))?;
            if strip_root(&entry_name(&entry)) == wanted {
                let mut contents = Vec::new();
                entry
                    .read_to_end(&mut contents)
                    .map_err(|e| CracError::io(format!("reading entry {}", name), e))?;
                return Ok(Some(contents));
            }
        }

        Ok(None)
    }
}

fn list_files(index: usize, data: &[u8]) -> CracResult<Vec<String>> {
    let mut entries = Vec::new();
    let mut archive = tar::Archive::new(data);
    let iter = archive
        .entries()
        .map_err(|e| CracError::io(format!("reading segment {}", index), e))?;

    for entry in iter {
        let entry =
            entry.map_err(|e| CracError::io(format!("reading segment {} entry", index), e))?;
        if entry.header().entry_type().is_file() {
            entries.push(entry_name(&entry));
        }
    }

    Ok(entries)
}

/// Entry path as stored in the header, lossily decoded
pub(crate) fn entry_name<R: Read>(entry: &tar::Entry<'_, R>) -> String {
    String::from_utf8_lossy(&entry.path_bytes()).into_owned()
}

/// Drop leading `./` and `/` so names from other producers compare equal
fn strip_root(name: &str) -> &str {
    name.trim_start_matches("./").trim_start_matches('/')
}

/// A segment that is still accepting entries
struct SegmentWriter {
    builder: tar::Builder<Vec<u8>>,
    entries: Vec<String>,
    bytes: u64,
}

impl SegmentWriter {
    fn new() -> Self {
        Self {
            builder: tar::Builder::new(Vec::new()),
            entries: Vec::new(),
            bytes: 0,
        }
    }

    fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn append(&mut self, name: &str, contents: &[u8]) -> CracResult<()> {
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Regular);
        header.set_size(contents.len() as u64);
        header.set_mode(ENTRY_MODE);
        header.set_uid(0);
        header.set_gid(0);
        header.set_mtime(0);

        self.builder
            .append_data(&mut header, name, contents)
            .map_err(|e| CracError::io(format!("archiving {}", name), e))?;

        self.entries.push(name.to_string());
        self.bytes += contents.len() as u64;
        Ok(())
    }

    fn seal(self, index: usize) -> CracResult<ArchiveSegment> {
        let data = self
            .builder
            .into_inner()
            .map_err(|e| CracError::io(format!("finalizing segment {}", index), e))?;
        let digest = content_digest(&data);

        debug!(
            segment = index,
            files = self.entries.len(),
            payload_bytes = self.bytes,
            digest = %digest,
            "Sealed archive segment"
        );

        Ok(ArchiveSegment {
            index,
            entries: self.entries,
            data,
            digest,
        })
    }
}

/// Build a single segment from in-memory entries
pub fn build_from_entries(index: usize, entries: &[(&str, &[u8])]) -> CracResult<ArchiveSegment> {
    let mut writer = SegmentWriter::new();
    for (name, contents) in entries {
        writer.append(name, contents)?;
    }
    writer.seal(index)
}

/// Pack a file set into size-bounded segments.
///
/// Files are visited in logical-name order. Before a file is appended, the
/// open segment is sealed if adding the file would push it past `limit`.
/// A file is never split, so a file larger than the limit forms its own
/// segment.
pub fn build(files: &FileSet, workdir: &Path, limit: ChunkLimit) -> CracResult<Vec<ArchiveSegment>> {
    let mut segments = Vec::new();
    let mut current = SegmentWriter::new();

    for (name, source) in files.iter() {
        let path = resolve_source(workdir, source);
        let contents = fs::read(&path)
            .map_err(|e| CracError::io(format!("reading cache file {}", path.display()), e))?;

        if !current.is_empty() && limit.would_overflow(current.bytes, contents.len() as u64) {
            let sealed = std::mem::replace(&mut current, SegmentWriter::new());
            segments.push(sealed.seal(segments.len())?);
        }

        current.append(name, &contents)?;
    }

    if !current.is_empty() {
        segments.push(current.seal(segments.len())?);
    }

    debug!(
        files = files.len(),
        segments = segments.len(),
        limit = %limit,
        "Built archive segments"
    );
    Ok(segments)
}
