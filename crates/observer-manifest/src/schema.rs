//! Required-path schema
//!
//! A schema is an ordered list of slash-delimited paths that must resolve
//! through successive mapping lookups. Validation stops at the first path
//! that does not resolve.

use std::fmt;

use crate::error::ManifestError;
use crate::node::Node;

/// Required paths of an experiment manifest.
pub const EXPERIMENT_PATHS: &[&str] = &["firmwares", "schedule"];

/// Required paths of a node profile manifest.
pub const NODE_PROFILE_PATHS: &[&str] = &[
    "hardware",
    "controller",
    "controller/commands",
    "controller/commands/load",
    "controller/commands/start",
    "controller/commands/stop",
    "controller/commands/reset",
    "controller/configuration_files",
    "serial",
    "serial/port",
    "serial/baudrate",
    "serial/parity",
    "serial/stopbits",
    "serial/bytesize",
    "serial/rtscts",
    "serial/xonxoff",
    "serial/timeout",
    "serial/module",
];

/// A slash-delimited sequence of mapping keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaPath {
    raw: String,
    segments: Vec<String>,
}

impl SchemaPath {
    /// Build a path from its slash-delimited form. Empty segments are ignored.
    pub fn new(path: impl Into<String>) -> Self {
        let raw = path.into();
        let segments = raw
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        Self { raw, segments }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Walk the tree from `root` along this path.
    ///
    /// Every intermediate node must be a mapping holding the next key.
    pub fn resolve<'a>(&self, root: &'a Node) -> Result<&'a Node, ManifestError> {
        let mut current = root;
        for segment in &self.segments {
            current = current
                .get(segment)
                .ok_or_else(|| ManifestError::MissingField {
                    segment: segment.clone(),
                    path: self.raw.clone(),
                })?;
        }
        Ok(current)
    }
}

impl fmt::Display for SchemaPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl From<&str> for SchemaPath {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

/// Ordered list of required paths for one archive kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    paths: Vec<SchemaPath>,
}

impl Schema {
    pub fn new<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<SchemaPath>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }

    /// Schema of experiment manifests.
    pub fn experiment() -> Self {
        Self::new(EXPERIMENT_PATHS.iter().copied())
    }

    /// Schema of node profile manifests.
    pub fn node_profile() -> Self {
        Self::new(NODE_PROFILE_PATHS.iter().copied())
    }

    pub fn paths(&self) -> &[SchemaPath] {
        &self.paths
    }

    /// Check every path in order, failing on the first one that is missing.
    pub fn validate(&self, manifest: &Node) -> Result<(), ManifestError> {
        for path in &self.paths {
            path.resolve(manifest)?;
        }
        Ok(())
    }
}
