//! Error taxonomy for archive loading
//!
//! Every variant is terminal for the load call that raised it. Errors are
//! returned unchanged to the caller, which maps them to user-facing messages.

use observer_manifest::ManifestError;
use std::io;
use std::path::PathBuf;

use crate::loader::LoadStage;

/// Errors raised while loading an experiment or node profile archive.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("cannot create workspace in {path}: {source}")]
    WorkspaceCreation {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot release workspace {path}: {source}")]
    WorkspaceRelease {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot list workspace: {0}")]
    WorkspaceList(#[from] walkdir::Error),

    /// Saving or copying the archive into the workspace failed.
    #[error("cannot store archive at {path}: {source}")]
    ArchiveIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The archive is not a readable gzip-compressed tar stream.
    #[error("cannot read archive: {0}")]
    ArchiveRead(#[source] io::Error),

    #[error("missing element in archive: {}\nprovided: {}", missing.join(", "), provided.join(", "))]
    ArchiveMissingMember {
        /// Mandatory members absent from the archive, in declaration order
        missing: Vec<String>,
        /// Every member name found in the archive
        provided: Vec<String>,
    },

    /// A member would be written outside the workspace. Nothing was extracted.
    #[error("attempted path traversal in archive member {member}: {reason}")]
    ArchiveSecurity { member: String, reason: String },

    #[error("cannot read manifest {path}: {source}")]
    ManifestRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// A declared firmware, executable or configuration file is not in the archive.
    #[error("missing element in archive: {file}")]
    FileReferenceMissing { file: String },

    #[error("loader cannot start a load from stage {stage}")]
    InvalidStage { stage: LoadStage },
}

impl SetupError {
    /// Stable, machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::WorkspaceCreation { .. } => "workspace_creation",
            Self::WorkspaceRelease { .. } => "workspace_release",
            Self::WorkspaceList(_) => "workspace_list",
            Self::ArchiveIo { .. } => "archive_io",
            Self::ArchiveRead(_) => "archive_read",
            Self::ArchiveMissingMember { .. } => "archive_missing_member",
            Self::ArchiveSecurity { .. } => "archive_security",
            Self::ManifestRead { .. } => "manifest_read",
            Self::Manifest(ManifestError::Parse(_)) => "manifest_parse",
            Self::Manifest(ManifestError::MissingField { .. }) => "manifest_missing_field",
            Self::Manifest(ManifestError::InvalidField { .. }) => "manifest_invalid_field",
            Self::Manifest(ManifestError::InvalidEntry { .. }) => "manifest_invalid_entry",
            Self::FileReferenceMissing { .. } => "file_reference_missing",
            Self::InvalidStage { .. } => "invalid_stage",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_member_message() {
        let err = SetupError::ArchiveMissingMember {
            missing: vec!["controller/executables".into()],
            provided: vec!["controller".into(), "manifest.yml".into()],
        };
        let message = err.to_string();
        assert!(message.contains("controller/executables"));
        assert!(message.contains("provided: controller, manifest.yml"));
        assert_eq!(err.kind(), "archive_missing_member");
    }

    #[test]
    fn test_manifest_error_kinds() {
        let err = SetupError::from(ManifestError::MissingField {
            segment: "baudrate".into(),
            path: "serial/baudrate".into(),
        });
        assert_eq!(err.kind(), "manifest_missing_field");
        assert_eq!(err.to_string(), "element missing: baudrate in: serial/baudrate");
    }
}
