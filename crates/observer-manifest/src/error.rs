//! Error types for manifest parsing and validation.

use thiserror::Error;

/// Errors raised while parsing, validating or decoding a manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// The document is not valid YAML.
    #[error("manifest parse error: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// A required schema path does not resolve.
    ///
    /// `segment` is the first key that could not be found and `path` the
    /// full slash-delimited path being resolved.
    #[error("element missing: {segment} in: {path}")]
    MissingField { segment: String, path: String },

    /// A field is present but holds a value of the wrong shape.
    #[error("invalid value at {path}: expected {expected}")]
    InvalidField { path: String, expected: &'static str },

    /// A firmware, executable or configuration file entry is malformed.
    #[error("invalid entry #{index} in {section}: {reason}")]
    InvalidEntry {
        section: String,
        index: usize,
        reason: String,
    },
}

impl ManifestError {
    pub(crate) fn invalid_field(path: impl Into<String>, expected: &'static str) -> Self {
        Self::InvalidField {
            path: path.into(),
            expected,
        }
    }
}
