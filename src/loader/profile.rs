//! Node profile archives: hardware description, controller commands with
//! their executables and configuration files, and serial port settings.

use chrono::{DateTime, Utc};
use observer_manifest::{
    resolve_commands, unresolved_placeholders, CommandTable, FileEntry, FileTable, ManifestError,
    Node, Schema, SchemaPath, SerialSettings,
};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::{ArchiveKind, LoadContext};
use crate::archive::{ArchiveLayout, MaterializedArchive, CONFIGURATION_FILES_DIR, EXECUTABLES_DIR, SERIAL_DIR};
use crate::error::SetupError;
use crate::references::resolve_entries;

#[derive(Debug)]
pub struct NodeProfileArchive;

/// Everything a profile manifest declares, with files checked on disk and
/// commands still carrying their placeholders.
#[derive(Debug, Clone)]
pub struct ProfileReferences {
    pub commands: CommandTable,
    pub executables: FileTable,
    pub configuration_files: FileTable,
    pub serial: SerialSettings,
}

/// A loaded node profile.
#[derive(Debug, Clone, Serialize)]
pub struct NodeProfile {
    /// The `hardware` section, unchanged
    pub hardware: Node,
    /// Controller commands with placeholders substituted
    pub commands: CommandTable,
    pub executables: FileTable,
    pub configuration_files: FileTable,
    pub serial: SerialSettings,
    pub root: PathBuf,
    pub archive: MaterializedArchive,
    pub loaded_at: DateTime<Utc>,
}

impl NodeProfile {
    /// Resolved command line of `name` (`load`, `start`, `stop`, `reset`, ...).
    pub fn command(&self, name: &str) -> Option<&str> {
        self.commands.get(name).map(String::as_str)
    }

    pub fn executable(&self, id: &str) -> Option<&Path> {
        self.executables.get(id).map(PathBuf::as_path)
    }

    pub fn configuration_file(&self, id: &str) -> Option<&Path> {
        self.configuration_files.get(id).map(PathBuf::as_path)
    }
}

impl ArchiveKind for NodeProfileArchive {
    const NAME: &'static str = "node_profile";
    type References = ProfileReferences;
    type Output = NodeProfile;

    fn layout() -> ArchiveLayout {
        ArchiveLayout::node_profile()
    }

    fn schema() -> Schema {
        Schema::node_profile()
    }

    fn resolve_references(manifest: &Node, root: &Path) -> Result<ProfileReferences, SetupError> {
        let commands = command_table(SchemaPath::new("controller/commands").resolve(manifest)?)?;

        let entries = FileEntry::table(
            EXECUTABLES_DIR,
            manifest.get("controller").and_then(|c| c.get("executables")),
        )?;
        let executables = resolve_entries(root, EXECUTABLES_DIR, entries)?;

        let entries = FileEntry::table(
            CONFIGURATION_FILES_DIR,
            Some(SchemaPath::new("controller/configuration_files").resolve(manifest)?),
        )?;
        let configuration_files = resolve_entries(root, CONFIGURATION_FILES_DIR, entries)?;

        let serial = SerialSettings::from_node(
            SchemaPath::new("serial").resolve(manifest)?,
            &root.join(SERIAL_DIR),
        )?;
        if serial.module.is_file() {
            check_inside(root, &serial.module)?;
        } else {
            warn!(module = %serial.module.display(), "serial module not found in archive");
        }

        debug!(
            commands = commands.len(),
            executables = executables.len(),
            configuration_files = configuration_files.len(),
            "profile references resolved"
        );

        Ok(ProfileReferences {
            commands,
            executables,
            configuration_files,
            serial,
        })
    }

    fn resolve_placeholders(
        manifest: Node,
        references: ProfileReferences,
        context: LoadContext,
    ) -> Result<NodeProfile, SetupError> {
        let commands = resolve_commands(
            references.commands,
            &references.executables,
            &references.configuration_files,
        );

        for (name, command) in &commands {
            for token in unresolved_placeholders(command) {
                warn!(command = %name, kind = %token.kind, id = %token.id, "placeholder left unresolved");
            }
        }

        let hardware = manifest.get("hardware").cloned().unwrap_or_else(Node::null);

        Ok(NodeProfile {
            hardware,
            commands,
            executables: references.executables,
            configuration_files: references.configuration_files,
            serial: references.serial,
            root: context.root,
            archive: context.archive,
            loaded_at: context.loaded_at,
        })
    }
}

/// Refuse `path` when it resolves outside `root` once links are followed.
fn check_inside(root: &Path, path: &Path) -> Result<(), SetupError> {
    let canonical = |path: &Path| {
        fs::canonicalize(path).map_err(|source| SetupError::ArchiveIo {
            path: path.to_path_buf(),
            source,
        })
    };
    let real = canonical(path)?;
    if real.starts_with(canonical(root)?) {
        Ok(())
    } else {
        Err(SetupError::ArchiveSecurity {
            member: path.strip_prefix(root).unwrap_or(path).display().to_string(),
            reason: format!("resolves outside the workspace to {}", real.display()),
        })
    }
}

/// Decode `controller/commands`: a mapping of command name to command line.
fn command_table(node: &Node) -> Result<CommandTable, ManifestError> {
    let mapping = node.as_mapping().ok_or_else(|| ManifestError::InvalidField {
        path: "controller/commands".to_string(),
        expected: "a mapping of command names to command lines",
    })?;

    mapping
        .iter()
        .map(|(name, command)| match command.as_str() {
            Some(line) => Ok((name.clone(), line.to_string())),
            None => Err(ManifestError::InvalidField {
                path: format!("controller/commands/{}", name),
                expected: "a command line",
            }),
        })
        .collect()
}
