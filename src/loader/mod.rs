//! Archive loaders
//!
//! A [`Loader`] owns one workspace and drives one archive through the load
//! stages. What differs between experiment and node profile archives (the
//! layout, the schema, the references and the final configuration) is
//! supplied by an [`ArchiveKind`].

mod experiment;
mod profile;
mod stage;

pub use experiment::{Experiment, ExperimentArchive, ExperimentReferences};
pub use profile::{NodeProfile, NodeProfileArchive, ProfileReferences};
pub use stage::LoadStage;

use chrono::{DateTime, Utc};
use observer_manifest::{Node, Schema};
use std::fs;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tracing::{debug, info, info_span, warn};

use crate::archive::{ArchiveExtractor, ArchiveLayout, ArchiveSource, MaterializedArchive};
use crate::config::WorkspaceConfig;
use crate::error::SetupError;
use crate::workspace::{settle, Workspace};

/// Loader of experiment (behavior) archives.
pub type ExperimentLoader = Loader<ExperimentArchive>;

/// Loader of node profile archives.
pub type NodeProfileLoader = Loader<NodeProfileArchive>;

/// One kind of archive the loader understands.
pub trait ArchiveKind {
    /// Short name used in logs.
    const NAME: &'static str;

    /// Data decoded from the manifest and checked against the extracted tree.
    type References;

    /// Configuration handed to the caller.
    type Output;

    fn layout() -> ArchiveLayout;

    fn schema() -> Schema;

    /// Decode the manifest sections and check every declared file under `root`.
    fn resolve_references(manifest: &Node, root: &Path) -> Result<Self::References, SetupError>;

    /// Substitute placeholders and assemble the output.
    fn resolve_placeholders(
        manifest: Node,
        references: Self::References,
        context: LoadContext,
    ) -> Result<Self::Output, SetupError>;
}

/// Facts about a load that every output carries.
#[derive(Debug, Clone)]
pub struct LoadContext {
    /// Canonical root of the extracted archive
    pub root: PathBuf,
    pub archive: MaterializedArchive,
    pub loaded_at: DateTime<Utc>,
}

/// Loads one archive of kind `K` into its own workspace.
///
/// The workspace outlives the load: paths in the output stay valid until
/// [`Loader::release`] is called.
#[derive(Debug)]
pub struct Loader<K: ArchiveKind> {
    workspace: Workspace,
    layout: ArchiveLayout,
    schema: Schema,
    stage: LoadStage,
    kind: PhantomData<K>,
}

impl<K: ArchiveKind> Loader<K> {
    /// Create a loader with a fresh workspace.
    pub fn new(config: &WorkspaceConfig) -> Result<Self, SetupError> {
        Ok(Self::in_workspace(Workspace::create(config)?))
    }

    /// Create a loader that extracts into an existing, empty workspace.
    pub fn in_workspace(workspace: Workspace) -> Self {
        Self {
            workspace,
            layout: K::layout(),
            schema: K::schema(),
            stage: LoadStage::Created,
            kind: PhantomData,
        }
    }

    pub fn stage(&self) -> LoadStage {
        self.stage
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn layout(&self) -> &ArchiveLayout {
        &self.layout
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Load `source`. Only one load is allowed per loader.
    ///
    /// Any error leaves the loader in [`LoadStage::Failed`]; the workspace is
    /// kept until released.
    pub fn load(&mut self, source: ArchiveSource<'_>) -> Result<K::Output, SetupError> {
        if self.stage != LoadStage::Created {
            return Err(SetupError::InvalidStage { stage: self.stage });
        }

        let span = info_span!("load", kind = K::NAME, workspace = %self.workspace.path().display());
        let _guard = span.enter();

        match self.run(source) {
            Ok(output) => {
                info!("archive loaded");
                Ok(output)
            }
            Err(err) => {
                warn!(stage = %self.stage, kind = err.kind(), error = %err, "archive load failed");
                self.stage = LoadStage::Failed;
                Err(err)
            }
        }
    }

    fn run(&mut self, source: ArchiveSource<'_>) -> Result<K::Output, SetupError> {
        let root = self.workspace.path().to_path_buf();
        let layout = self.layout.clone();
        let extractor = ArchiveExtractor::new(&layout);

        let archive = extractor.materialize(source, &self.workspace)?;
        self.advance(LoadStage::ArchiveMaterialized)?;

        let members = extractor.read_members(&archive.path)?;
        extractor.check_members(&members)?;
        self.advance(LoadStage::MembersValidated)?;

        extractor.check_containment(&members, &root)?;
        extractor.unpack(&archive.path, &root)?;
        self.advance(LoadStage::Extracted)?;

        let manifest_path = contained_file(&root, &layout.manifest)?;
        let text = fs::read_to_string(&manifest_path).map_err(|source| SetupError::ManifestRead {
            path: manifest_path.clone(),
            source,
        })?;
        let manifest = Node::parse(&text)?;
        self.advance(LoadStage::ManifestParsed)?;

        self.schema.validate(&manifest)?;
        self.advance(LoadStage::SchemaValidated)?;

        let references = K::resolve_references(&manifest, &root)?;
        self.advance(LoadStage::ReferencesResolved)?;

        let context = LoadContext {
            root,
            archive,
            loaded_at: Utc::now(),
        };
        let output = K::resolve_placeholders(manifest, references, context)?;
        self.advance(LoadStage::PlaceholdersResolved)?;

        self.advance(LoadStage::Ready)?;
        Ok(output)
    }

    fn advance(&mut self, target: LoadStage) -> Result<(), SetupError> {
        if !self.stage.can_transition_to(target) {
            return Err(SetupError::InvalidStage { stage: self.stage });
        }
        debug!(from = %self.stage, to = %target, "stage reached");
        self.stage = target;
        Ok(())
    }

    /// Remove the workspace and everything extracted into it.
    pub fn release(self) -> Result<(), SetupError> {
        self.workspace.release()
    }

    /// Give up the loader and keep the workspace.
    pub fn into_workspace(self) -> Workspace {
        self.workspace
    }
}

/// Canonical path of `relative` under `root`, refused when it resolves
/// outside `root`.
fn contained_file(root: &Path, relative: &str) -> Result<PathBuf, SetupError> {
    let path = root.join(relative);
    let real = fs::canonicalize(&path).map_err(|source| SetupError::ManifestRead {
        path: path.clone(),
        source,
    })?;
    if !real.starts_with(root) {
        return Err(SetupError::ArchiveSecurity {
            member: relative.to_string(),
            reason: format!("resolves outside the workspace to {}", real.display()),
        });
    }
    Ok(real)
}

/// Load `source` as a `K` archive, run `f` on the result and release the
/// workspace whatever happens.
///
/// When the load fails its error is returned and a release failure is only
/// logged.
pub fn load_scoped<K, T, F>(
    config: &WorkspaceConfig,
    source: ArchiveSource<'_>,
    f: F,
) -> Result<T, SetupError>
where
    K: ArchiveKind,
    F: FnOnce(&K::Output, &Workspace) -> T,
{
    let mut loader = Loader::<K>::new(config)?;
    let result = loader
        .load(source)
        .map(|output| f(&output, loader.workspace()));
    settle(result, loader.release())
}
