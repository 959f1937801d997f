//! File entry tables
//!
//! Firmwares, controller executables and controller configuration files are
//! all declared the same way: a sequence of `{id, file, brief}` mappings.

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use crate::error::ManifestError;
use crate::node::Node;

/// Resolved id → absolute path table.
pub type FileTable = BTreeMap<String, PathBuf>;

/// One declared file of a firmware, executable or configuration file table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileEntry {
    /// Identifier referenced by placeholders and schedule actions
    pub id: String,
    /// File name relative to the table's archive subdirectory
    pub file: String,
    /// Short description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brief: Option<String>,
}

impl FileEntry {
    /// Decode the entry table found at `section`.
    ///
    /// An absent or null table is empty. Anything other than a sequence of
    /// mappings carrying `id` and `file` is rejected.
    pub fn table(section: &str, node: Option<&Node>) -> Result<Vec<FileEntry>, ManifestError> {
        let items = match node {
            None => return Ok(Vec::new()),
            Some(n) if n.is_null() => return Ok(Vec::new()),
            Some(n) => n
                .as_sequence()
                .ok_or_else(|| ManifestError::invalid_field(section, "a sequence of file entries"))?,
        };

        items
            .iter()
            .enumerate()
            .map(|(index, item)| Self::from_node(section, index, item))
            .collect()
    }

    fn from_node(section: &str, index: usize, node: &Node) -> Result<Self, ManifestError> {
        let invalid = |reason: String| ManifestError::InvalidEntry {
            section: section.to_string(),
            index,
            reason,
        };

        if node.as_mapping().is_none() {
            return Err(invalid(format!("expected a mapping, found {}", node.kind_name())));
        }

        let field = |key: &str| -> Result<String, ManifestError> {
            node.get(key)
                .and_then(Node::as_scalar)
                .and_then(|s| s.render())
                .ok_or_else(|| invalid(format!("missing `{}`", key)))
        };

        let id = field("id")?;
        let file = field("file")?;
        let brief = node.get("brief").and_then(Node::as_scalar).and_then(|s| s.render());

        Ok(Self { id, file, brief })
    }
}

/// A declared file name relative to its section's directory, with `.`
/// components dropped. `None` when the name is empty, absolute or climbs
/// with `..`.
pub fn relative_file(name: &str) -> Option<PathBuf> {
    let mut relative = PathBuf::new();
    for component in Path::new(name).components() {
        match component {
            Component::CurDir => {}
            Component::Normal(part) => relative.push(part),
            _ => return None,
        }
    }
    (!relative.as_os_str().is_empty()).then_some(relative)
}
