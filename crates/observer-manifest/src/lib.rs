//! Observer manifest model
//!
//! Pure, filesystem-free part of archive loading: the manifest tree, the
//! required-path schemas, file entry tables, serial settings, schedule
//! entries and placeholder resolution in controller commands.

pub mod entry;
pub mod error;
pub mod node;
pub mod placeholder;
pub mod schedule;
pub mod schema;
pub mod serial;

pub use entry::{relative_file, FileEntry, FileTable};
pub use error::ManifestError;
pub use node::{Node, Scalar};
pub use placeholder::{
    resolve_command, resolve_commands, unresolved_placeholders, CommandTable, PlaceholderKind,
    UnresolvedPlaceholder,
};
pub use schedule::{ScheduleEntry, TimeSpec};
pub use schema::{Schema, SchemaPath, EXPERIMENT_PATHS, NODE_PROFILE_PATHS};
pub use serial::SerialSettings;

/// File name of the manifest inside every archive kind.
pub const MANIFEST_FILE: &str = "manifest.yml";
