//! Safe archive extraction
//!
//! Archives are gzip-compressed tar streams. Extraction runs in three
//! passes over the materialized file:
//! 1. read the member list and check it against the layout's mandatory members
//! 2. check that every member (and every link target) stays inside the
//!    workspace, following the links the archive itself declares
//! 3. unpack
//!
//! Nothing is written before every member has passed the containment check,
//! so a hostile archive is rejected without leaving partial output.

mod layout;
mod safety;
mod source;

pub use layout::{
    ArchiveLayout, CONFIGURATION_FILES_DIR, CONTROLLER_DIR, EXECUTABLES_DIR, FIRMWARES_DIR,
    SERIAL_DIR,
};
pub use safety::{contained_path, Escape, LinkMap};
pub use source::{ArchiveSource, MaterializedArchive};

use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path};
use tar::{Archive, Entry, EntryType};
use tracing::debug;

use crate::error::SetupError;
use crate::workspace::Workspace;

/// One member of an archive, as listed before extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    /// Raw member name
    pub name: String,
    pub entry_type: EntryType,
    /// Target of symbolic and hard links
    pub link_name: Option<String>,
}

impl Member {
    /// Name used for mandatory-member matching: no leading `./`, no trailing `/`.
    pub fn normalized_name(&self) -> &str {
        let mut name = self.name.as_str();
        while let Some(rest) = name.strip_prefix("./") {
            name = rest;
        }
        name.trim_end_matches('/')
    }

    fn is_link(&self) -> bool {
        matches!(self.entry_type, EntryType::Symlink | EntryType::Link)
    }
}

/// Extracts archives of one layout into workspaces.
#[derive(Debug, Clone)]
pub struct ArchiveExtractor<'l> {
    layout: &'l ArchiveLayout,
}

impl<'l> ArchiveExtractor<'l> {
    pub fn new(layout: &'l ArchiveLayout) -> Self {
        Self { layout }
    }

    /// Save the archive into the workspace under the layout's archive name.
    pub fn materialize(
        &self,
        source: ArchiveSource<'_>,
        workspace: &Workspace,
    ) -> Result<MaterializedArchive, SetupError> {
        let dest = workspace.join(&self.layout.archive_name);
        let archive = source.save_to(&dest)?;
        debug!(path = %archive.path.display(), size = archive.size, sha256 = %archive.sha256, "archive materialized");
        Ok(archive)
    }

    /// List every member of the archive without extracting anything.
    pub fn read_members(&self, archive_path: &Path) -> Result<Vec<Member>, SetupError> {
        let mut archive = open(archive_path)?;
        let mut members = Vec::new();

        for entry in archive.entries().map_err(SetupError::ArchiveRead)? {
            let entry = entry.map_err(SetupError::ArchiveRead)?;
            let link_name = entry
                .link_name_bytes()
                .map(|bytes| String::from_utf8_lossy(&bytes).into_owned());
            members.push(Member {
                name: String::from_utf8_lossy(&entry.path_bytes()).into_owned(),
                entry_type: entry.header().entry_type(),
                link_name,
            });
        }

        debug!(count = members.len(), "archive members listed");
        Ok(members)
    }

    /// Fail when a mandatory member is absent.
    pub fn check_members(&self, members: &[Member]) -> Result<(), SetupError> {
        let provided: Vec<String> = members
            .iter()
            .map(|m| m.normalized_name().to_string())
            .filter(|name| !name.is_empty())
            .collect();

        let missing: Vec<String> = self
            .layout
            .mandatory_members
            .iter()
            .filter(|required| !provided.iter().any(|name| name == *required))
            .cloned()
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(SetupError::ArchiveMissingMember { missing, provided })
        }
    }

    /// Fail when any member or link target would land outside `root`.
    ///
    /// `root` must already be canonical, as a workspace root is. Member
    /// paths and link targets are resolved through every symbolic link the
    /// archive declares.
    pub fn check_containment(&self, members: &[Member], root: &Path) -> Result<(), SetupError> {
        let links = link_map(members);

        for member in members {
            let refuse = |escape: Escape| SetupError::ArchiveSecurity {
                member: member.name.clone(),
                reason: escape.describe().to_string(),
            };

            let member_path = Path::new(&member.name);
            let lexical = contained_path(root, member_path).map_err(refuse)?;

            if member.is_link() && has_parent_component(&member.name) {
                return Err(SetupError::ArchiveSecurity {
                    member: member.name.clone(),
                    reason: "link member names must not contain `..`".to_string(),
                });
            }

            let physical = links.resolve_in(root, member_path, false).map_err(refuse)?;
            if has_parent_component(&member.name) && physical != lexical {
                return Err(SetupError::ArchiveSecurity {
                    member: member.name.clone(),
                    reason: "`..` climbs through a symbolic link".to_string(),
                });
            }

            if !member.is_link() {
                continue;
            }
            let target = member.link_name.as_deref().unwrap_or_default();
            let refuse_target = |escape: Escape| SetupError::ArchiveSecurity {
                member: member.name.clone(),
                reason: format!("link target {}: {}", target, escape.describe()),
            };
            let parent = member_path.parent().unwrap_or_else(|| Path::new(""));

            if member.entry_type == EntryType::Symlink {
                links.resolve(&parent.join(target), true).map_err(refuse_target)?;
            } else {
                links.resolve(Path::new(target), true).map_err(refuse_target)?;
                // A hard link to a symbolic link copies the link itself
                if let Some(copied) = links.get(member_path) {
                    links.resolve(&parent.join(copied), true).map_err(refuse_target)?;
                }
            }
        }
        Ok(())
    }

    /// Unpack every member under `root`.
    ///
    /// Members whose names hold `..` components are written to their
    /// normalized destination; the tar reader refuses them otherwise.
    pub fn unpack(&self, archive_path: &Path, root: &Path) -> Result<(), SetupError> {
        let mut archive = open(archive_path)?;
        archive.set_preserve_permissions(true);

        for entry in archive.entries().map_err(SetupError::ArchiveRead)? {
            let mut entry = entry.map_err(SetupError::ArchiveRead)?;
            let name = String::from_utf8_lossy(&entry.path_bytes()).into_owned();

            let unpacked = if has_parent_component(&name) {
                unpack_normalized(&mut entry, &name, root)?
            } else {
                entry.unpack_in(root).map_err(|err| unpack_error(&name, err))?
            };
            if !unpacked {
                return Err(SetupError::ArchiveSecurity {
                    member: name,
                    reason: "refused by the tar reader".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Materialize, validate and extract `source` into `workspace`.
    pub fn extract(
        &self,
        source: ArchiveSource<'_>,
        workspace: &Workspace,
    ) -> Result<MaterializedArchive, SetupError> {
        let archive = self.materialize(source, workspace)?;
        let members = self.read_members(&archive.path)?;
        self.check_members(&members)?;
        self.check_containment(&members, workspace.path())?;
        self.unpack(&archive.path, workspace.path())?;
        Ok(archive)
    }
}

fn has_parent_component(name: &str) -> bool {
    Path::new(name)
        .components()
        .any(|c| matches!(c, Component::ParentDir))
}

/// Unpack a non-link entry at its normalized destination, refusing it when
/// the parent directory resolves outside `root`.
fn unpack_normalized<R: Read>(
    entry: &mut Entry<'_, R>,
    name: &str,
    root: &Path,
) -> Result<bool, SetupError> {
    let dest = match contained_path(root, Path::new(name)) {
        Ok(dest) => dest,
        Err(_) => return Ok(false),
    };
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| SetupError::ArchiveIo { path, source }
    };

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(io_err(parent))?;
        let parent = fs::canonicalize(parent).map_err(io_err(parent))?;
        if !parent.starts_with(root) {
            return Ok(false);
        }
    }

    debug!(member = name, dest = %dest.display(), "unpacking normalized member");
    entry.unpack(&dest).map_err(|err| unpack_error(name, err))?;
    Ok(true)
}

/// Symbolic links the archive declares, including hard links to them.
fn link_map(members: &[Member]) -> LinkMap {
    let mut links = LinkMap::default();
    for member in members {
        let Some(target) = member.link_name.as_deref() else {
            continue;
        };
        let path = Path::new(&member.name);
        match member.entry_type {
            EntryType::Symlink => links.insert(path, target),
            EntryType::Link => {
                let copied = links
                    .resolve(Path::new(target), false)
                    .ok()
                    .and_then(|parts| links.get(Path::new(&parts.join("/"))))
                    .map(str::to_string);
                if let Some(copied) = copied {
                    links.insert(path, &copied);
                }
            }
            _ => {}
        }
    }
    links
}

/// Map an unpack failure, keeping the tar reader's own containment
/// refusals apart from plain read errors.
fn unpack_error(member: &str, err: io::Error) -> SetupError {
    let mut cause: Option<&(dyn std::error::Error + 'static)> = Some(&err);
    while let Some(current) = cause {
        if current.to_string().contains("outside of destination") {
            return SetupError::ArchiveSecurity {
                member: member.to_string(),
                reason: "refused by the tar reader: unpacks outside the workspace".to_string(),
            };
        }
        cause = current.source();
    }
    SetupError::ArchiveRead(err)
}

fn open(path: &Path) -> Result<Archive<GzDecoder<File>>, SetupError> {
    let file = File::open(path).map_err(|source| SetupError::ArchiveIo {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Archive::new(GzDecoder::new(file)))
}
