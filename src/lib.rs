//! Observer setup - experiment and node profile archive loading
//!
//! This crate turns the archives a testbed observer receives into validated,
//! typed configuration: archives are extracted into a private workspace,
//! checked for unsafe members, their manifest is validated against a fixed
//! schema, declared files are located and controller command placeholders
//! are rewritten to absolute paths.

pub mod archive;
pub mod config;
pub mod error;
pub mod loader;
pub mod references;
pub mod workspace;

pub use archive::{ArchiveLayout, ArchiveSource, MaterializedArchive};
pub use config::{ConfigError, SetupConfig, WorkspaceConfig};
pub use error::SetupError;
pub use loader::{
    load_scoped, ArchiveKind, Experiment, ExperimentArchive, ExperimentLoader, LoadStage,
    Loader, NodeProfile, NodeProfileArchive, NodeProfileLoader,
};
pub use workspace::Workspace;

pub use observer_manifest as manifest;
