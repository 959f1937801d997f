//! Experiment (behavior) archives: firmware images and a schedule.

use chrono::{DateTime, Utc};
use observer_manifest::{FileEntry, FileTable, Node, ScheduleEntry, Schema};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{ArchiveKind, LoadContext};
use crate::archive::{ArchiveLayout, MaterializedArchive, FIRMWARES_DIR};
use crate::error::SetupError;
use crate::references::resolve_entries;

#[derive(Debug)]
pub struct ExperimentArchive;

/// Firmwares and schedule of an experiment, checked against the extracted tree.
#[derive(Debug, Clone)]
pub struct ExperimentReferences {
    pub firmwares: FileTable,
    pub schedule: Vec<ScheduleEntry>,
}

/// A loaded experiment.
#[derive(Debug, Clone, Serialize)]
pub struct Experiment {
    /// Node the experiment targets, when the manifest names one
    pub node_id: Option<String>,
    /// Firmware id → absolute image path
    pub firmwares: FileTable,
    pub schedule: Vec<ScheduleEntry>,
    /// Root of the extracted archive
    pub root: PathBuf,
    pub archive: MaterializedArchive,
    pub loaded_at: DateTime<Utc>,
}

impl Experiment {
    /// Absolute path of the firmware image declared as `id`.
    pub fn firmware(&self, id: &str) -> Option<&Path> {
        self.firmwares.get(id).map(PathBuf::as_path)
    }
}

impl ArchiveKind for ExperimentArchive {
    const NAME: &'static str = "experiment";
    type References = ExperimentReferences;
    type Output = Experiment;

    fn layout() -> ArchiveLayout {
        ArchiveLayout::experiment()
    }

    fn schema() -> Schema {
        Schema::experiment()
    }

    fn resolve_references(manifest: &Node, root: &Path) -> Result<ExperimentReferences, SetupError> {
        let entries = FileEntry::table(FIRMWARES_DIR, manifest.get("firmwares"))?;
        let firmwares = resolve_entries(root, FIRMWARES_DIR, entries)?;

        let schedule = match manifest.get("schedule") {
            Some(node) => ScheduleEntry::list(node)?,
            None => Vec::new(),
        };
        debug!(firmwares = firmwares.len(), events = schedule.len(), "experiment references resolved");

        Ok(ExperimentReferences { firmwares, schedule })
    }

    fn resolve_placeholders(
        manifest: Node,
        references: ExperimentReferences,
        context: LoadContext,
    ) -> Result<Experiment, SetupError> {
        let node_id = manifest
            .get("node_id")
            .and_then(Node::as_scalar)
            .and_then(|s| s.render());

        Ok(Experiment {
            node_id,
            firmwares: references.firmwares,
            schedule: references.schedule,
            root: context.root,
            archive: context.archive,
            loaded_at: context.loaded_at,
        })
    }
}
