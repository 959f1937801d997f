//! Load stage machine
//!
//! Created → ArchiveMaterialized → MembersValidated → Extracted →
//! ManifestParsed → SchemaValidated → ReferencesResolved →
//! PlaceholdersResolved → Ready, with Failed reachable from every
//! non-terminal stage. No transition goes backwards.

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadStage {
    /// Workspace allocated, nothing loaded
    Created,
    /// Archive bytes saved into the workspace
    ArchiveMaterialized,
    /// Mandatory members present
    MembersValidated,
    /// Members checked for containment and unpacked
    Extracted,
    ManifestParsed,
    SchemaValidated,
    /// Declared files found on disk
    ReferencesResolved,
    PlaceholdersResolved,
    /// Configuration handed to the caller
    Ready,
    Failed,
}

impl LoadStage {
    const ORDER: [LoadStage; 9] = [
        LoadStage::Created,
        LoadStage::ArchiveMaterialized,
        LoadStage::MembersValidated,
        LoadStage::Extracted,
        LoadStage::ManifestParsed,
        LoadStage::SchemaValidated,
        LoadStage::ReferencesResolved,
        LoadStage::PlaceholdersResolved,
        LoadStage::Ready,
    ];

    pub fn is_terminal(&self) -> bool {
        matches!(self, LoadStage::Ready | LoadStage::Failed)
    }

    /// The stage that follows this one on success.
    pub fn next(&self) -> Option<LoadStage> {
        let index = Self::ORDER.iter().position(|s| s == self)?;
        Self::ORDER.get(index + 1).copied()
    }

    /// Check if transition from this stage to target is valid
    pub fn can_transition_to(&self, target: LoadStage) -> bool {
        match target {
            LoadStage::Failed => !self.is_terminal(),
            _ => self.next() == Some(target),
        }
    }
}

impl fmt::Display for LoadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::ArchiveMaterialized => "archive_materialized",
            Self::MembersValidated => "members_validated",
            Self::Extracted => "extracted",
            Self::ManifestParsed => "manifest_parsed",
            Self::SchemaValidated => "schema_validated",
            Self::ReferencesResolved => "references_resolved",
            Self::PlaceholdersResolved => "placeholders_resolved",
            Self::Ready => "ready",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}
