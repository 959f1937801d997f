//! Test fixtures for archive loading
//!
//! This module provides:
//! - Fixture trees of a well-formed experiment and node profile
//! - An archive builder that packs a fixture tree into a gzip-compressed tar
//!   stream, with hooks to drop members, replace files or append hostile
//!   entries whose names are written verbatim

#![allow(dead_code)]

use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tar::{Builder, EntryType, Header};
use walkdir::WalkDir;

/// Path to a fixture tree under tests/fixtures
pub fn fixture_dir(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

/// Manifest text of a fixture tree
pub fn fixture_manifest(name: &str) -> String {
    fs::read_to_string(fixture_dir(name).join("manifest.yml")).unwrap()
}

/// One archive member to be written
#[derive(Debug, Clone)]
enum FixtureEntry {
    Dir(String),
    File { name: String, data: Vec<u8>, mode: u32 },
    Link { name: String, target: String, entry_type: EntryType },
}

impl FixtureEntry {
    fn name(&self) -> &str {
        match self {
            FixtureEntry::Dir(name) => name,
            FixtureEntry::File { name, .. } => name,
            FixtureEntry::Link { name, .. } => name,
        }
    }
}

/// Builds `.tar.gz` archives in memory
#[derive(Debug, Clone, Default)]
pub struct ArchiveBuilder {
    entries: Vec<FixtureEntry>,
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from every directory and file of a fixture tree
    pub fn from_fixture(name: &str) -> Self {
        let root = fixture_dir(name);
        let mut builder = Self::new();

        for entry in WalkDir::new(&root).min_depth(1).sort_by_file_name() {
            let entry = entry.unwrap();
            let rel = entry
                .path()
                .strip_prefix(&root)
                .unwrap()
                .to_string_lossy()
                .replace('\\', "/");
            if entry.file_type().is_dir() {
                builder = builder.dir(&rel);
            } else {
                let data = fs::read(entry.path()).unwrap();
                builder = builder.file_with_mode(&rel, data, file_mode(entry.path()));
            }
        }
        builder
    }

    pub fn dir(mut self, name: &str) -> Self {
        self.entries.push(FixtureEntry::Dir(name.trim_end_matches('/').to_string()));
        self
    }

    /// Add or replace a regular file
    pub fn file(self, name: &str, data: impl AsRef<[u8]>) -> Self {
        self.file_with_mode(name, data.as_ref().to_vec(), 0o644)
    }

    pub fn file_with_mode(mut self, name: &str, data: Vec<u8>, mode: u32) -> Self {
        let entry = FixtureEntry::File {
            name: name.to_string(),
            data,
            mode,
        };
        match self
            .entries
            .iter()
            .position(|e| matches!(e, FixtureEntry::File { .. }) && e.name() == name)
        {
            Some(index) => self.entries[index] = entry,
            None => self.entries.push(entry),
        }
        self
    }

    pub fn manifest(self, text: &str) -> Self {
        self.file("manifest.yml", text)
    }

    /// Drop `name` and everything below it
    pub fn without(mut self, name: &str) -> Self {
        let prefix = format!("{}/", name);
        self.entries
            .retain(|e| e.name() != name && !e.name().starts_with(&prefix));
        self
    }

    pub fn symlink(mut self, name: &str, target: &str) -> Self {
        self.entries.push(FixtureEntry::Link {
            name: name.to_string(),
            target: target.to_string(),
            entry_type: EntryType::Symlink,
        });
        self
    }

    pub fn hard_link(mut self, name: &str, target: &str) -> Self {
        self.entries.push(FixtureEntry::Link {
            name: name.to_string(),
            target: target.to_string(),
            entry_type: EntryType::Link,
        });
        self
    }

    /// Member names, as they will appear in the archive
    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.name().to_string()).collect()
    }

    /// Pack into a gzip-compressed tar stream
    pub fn build(&self) -> Vec<u8> {
        let mut builder = Builder::new(Vec::new());

        for entry in &self.entries {
            match entry {
                FixtureEntry::Dir(name) => {
                    append(&mut builder, &format!("{}/", name), EntryType::Directory, 0o755, b"", None)
                }
                FixtureEntry::File { name, data, mode } => {
                    append(&mut builder, name, EntryType::Regular, *mode, data, None)
                }
                FixtureEntry::Link {
                    name,
                    target,
                    entry_type,
                } => append(&mut builder, name, *entry_type, 0o777, b"", Some(target)),
            }
        }

        let tar_bytes = builder.into_inner().unwrap();
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&tar_bytes).unwrap();
        encoder.finish().unwrap()
    }

    /// Pack and write to `path`
    pub fn write_to(&self, path: &Path) -> PathBuf {
        fs::write(path, self.build()).unwrap();
        path.to_path_buf()
    }
}

/// Append an entry whose name is written verbatim, bypassing the builder's
/// own path validation
fn append(
    builder: &mut Builder<Vec<u8>>,
    name: &str,
    entry_type: EntryType,
    mode: u32,
    data: &[u8],
    link_name: Option<&str>,
) {
    let mut header = Header::new_gnu();
    let bytes = name.as_bytes();
    assert!(bytes.len() < 100, "fixture member name too long: {}", name);
    header.as_old_mut().name[..bytes.len()].copy_from_slice(bytes);
    header.set_entry_type(entry_type);
    header.set_size(data.len() as u64);
    header.set_mode(mode);
    header.set_mtime(1_700_000_000);
    if let Some(target) = link_name {
        header.set_link_name(target).unwrap();
    }
    header.set_cksum();
    builder.append(&header, data).unwrap();
}

#[cfg(unix)]
fn file_mode(path: &Path) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path).unwrap().permissions().mode() & 0o777
}

#[cfg(not(unix))]
fn file_mode(_path: &Path) -> u32 {
    0o644
}

/// Well-formed node profile archive
pub fn node_profile_archive() -> Vec<u8> {
    ArchiveBuilder::from_fixture("node_profile").build()
}

/// Well-formed experiment archive
pub fn experiment_archive() -> Vec<u8> {
    ArchiveBuilder::from_fixture("experiment").build()
}
