//! Archive layouts
//!
//! Each archive kind declares the file name it is stored under inside the
//! workspace and the members it must contain.

use observer_manifest::MANIFEST_FILE;

/// Firmware images of an experiment archive.
pub const FIRMWARES_DIR: &str = "firmwares";

/// Node controller files of a profile archive.
pub const CONTROLLER_DIR: &str = "controller";

/// Executables referenced by `<!id>` placeholders.
pub const EXECUTABLES_DIR: &str = "controller/executables";

/// Configuration files referenced by `<#id>` placeholders.
pub const CONFIGURATION_FILES_DIR: &str = "controller/configuration_files";

/// Serial frame decoder module.
pub const SERIAL_DIR: &str = "serial";

/// Structure expected of one archive kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveLayout {
    /// Name the archive is saved under inside the workspace
    pub archive_name: String,
    /// Members that must be present, directories without trailing slash
    pub mandatory_members: Vec<String>,
    /// Manifest file name, relative to the archive root
    pub manifest: String,
}

impl ArchiveLayout {
    pub fn new<I, S>(archive_name: impl Into<String>, mandatory_members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            archive_name: archive_name.into(),
            mandatory_members: mandatory_members.into_iter().map(Into::into).collect(),
            manifest: MANIFEST_FILE.to_string(),
        }
    }

    /// Layout of experiment (behavior) archives.
    pub fn experiment() -> Self {
        Self::new("behavior.tar.gz", [FIRMWARES_DIR, MANIFEST_FILE])
    }

    /// Layout of node profile archives.
    pub fn node_profile() -> Self {
        Self::new(
            "node-profile.tar.gz",
            [
                CONTROLLER_DIR,
                EXECUTABLES_DIR,
                CONFIGURATION_FILES_DIR,
                SERIAL_DIR,
                MANIFEST_FILE,
            ],
        )
    }
}
