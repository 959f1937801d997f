//! Archive sources and materialization
//!
//! The caller states how the archive is supplied: as a stream (an HTTP
//! upload body, an in-memory buffer) or as a path on the local filesystem.
//! Either way the bytes are copied into the workspace before anything reads
//! them, and their SHA-256 digest is recorded.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::io::{self, Cursor, Read, Write};
use std::path::{Path, PathBuf};

use crate::error::SetupError;

/// Where the archive bytes come from.
pub enum ArchiveSource<'a> {
    /// Bytes read from a stream, saved into the workspace
    Stream(Box<dyn Read + 'a>),
    /// An archive on the local filesystem, copied into the workspace
    Path(PathBuf),
}

impl fmt::Debug for ArchiveSource<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stream(_) => f.write_str("ArchiveSource::Stream(..)"),
            Self::Path(path) => f.debug_tuple("ArchiveSource::Path").field(path).finish(),
        }
    }
}

impl<'a> ArchiveSource<'a> {
    pub fn from_reader(reader: impl Read + 'a) -> Self {
        Self::Stream(Box::new(reader))
    }

    pub fn from_bytes(bytes: impl AsRef<[u8]> + 'a) -> Self {
        Self::Stream(Box::new(Cursor::new(bytes)))
    }

    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self::Path(path.into())
    }

    /// Save the archive at `dest`, returning its location and digest.
    pub fn save_to(self, dest: &Path) -> Result<MaterializedArchive, SetupError> {
        let reader: Box<dyn Read + 'a> = match self {
            Self::Stream(reader) => reader,
            Self::Path(path) => {
                let file = File::open(&path).map_err(|source| SetupError::ArchiveIo { path, source })?;
                Box::new(file)
            }
        };

        let io_err = |source: io::Error| SetupError::ArchiveIo {
            path: dest.to_path_buf(),
            source,
        };
        let mut out = File::create(dest).map_err(io_err)?;
        let (size, sha256) = copy_hashing(reader, &mut out).map_err(io_err)?;
        out.sync_all().map_err(io_err)?;

        Ok(MaterializedArchive {
            path: dest.to_path_buf(),
            sha256,
            size,
        })
    }
}

/// The archive as stored inside the workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MaterializedArchive {
    pub path: PathBuf,
    /// SHA-256 of the compressed archive bytes, hex encoded
    pub sha256: String,
    pub size: u64,
}

fn copy_hashing<R: Read, W: Write>(mut reader: R, writer: &mut W) -> io::Result<(u64, String)> {
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];
    let mut total = 0u64;

    loop {
        let n = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buffer[..n]);
        writer.write_all(&buffer[..n])?;
        total += n as u64;
    }
    writer.flush()?;

    Ok((total, hex::encode(hasher.finalize())))
}
