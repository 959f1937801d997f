//! Path containment checks for archive members
//!
//! Destinations are computed before anything is written. Nothing exists in
//! the workspace yet besides the archive itself, so the only symbolic links
//! a member path can pass through are the ones the archive declares. Those
//! are collected in a [`LinkMap`] and followed while resolving, which lets a
//! chain of individually harmless links be refused as a whole.

use std::collections::{BTreeMap, VecDeque};
use std::path::{Component, Path, PathBuf};

/// Links followed while resolving one path before giving up.
const MAX_LINK_HOPS: usize = 40;

/// Why a member path was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Escape {
    /// Absolute path or path with a drive/UNC prefix
    Absolute,
    /// `..` climbs above the workspace root
    ParentTraversal,
    /// Link chain longer than [`MAX_LINK_HOPS`]
    LinkLoop,
}

impl Escape {
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Absolute => "absolute path",
            Self::ParentTraversal => "path escapes the workspace",
            Self::LinkLoop => "too many levels of symbolic links",
        }
    }
}

/// Normalize `relative` against `root`, refusing anything that leaves it.
///
/// `.` components are dropped and `..` pops the previous component. Links
/// are not followed; see [`LinkMap::resolve`] for that.
pub fn contained_path(root: &Path, relative: &Path) -> Result<PathBuf, Escape> {
    let mut dest = root.to_path_buf();
    dest.extend(lexical(relative)?);
    Ok(dest)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Step {
    Up,
    Name(String),
}

fn steps(path: &Path) -> Result<Vec<Step>, Escape> {
    let mut steps = Vec::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => return Err(Escape::Absolute),
            Component::CurDir => {}
            Component::ParentDir => steps.push(Step::Up),
            Component::Normal(part) => steps.push(Step::Name(part.to_string_lossy().into_owned())),
        }
    }
    Ok(steps)
}

fn lexical(path: &Path) -> Result<Vec<String>, Escape> {
    let mut kept = Vec::new();
    for step in steps(path)? {
        match step {
            Step::Up => {
                if kept.pop().is_none() {
                    return Err(Escape::ParentTraversal);
                }
            }
            Step::Name(name) => kept.push(name),
        }
    }
    Ok(kept)
}

/// Symbolic links declared by an archive, keyed by their normalized
/// position relative to the workspace root.
#[derive(Debug, Clone, Default)]
pub struct LinkMap {
    links: BTreeMap<Vec<String>, String>,
}

impl LinkMap {
    /// Record a link at `member` pointing to `target`.
    ///
    /// Members that do not normalize to a position inside the root are
    /// skipped; containment refuses them on their own.
    pub fn insert(&mut self, member: &Path, target: &str) {
        if let Ok(key) = lexical(member) {
            if !key.is_empty() {
                self.links.insert(key, target.to_string());
            }
        }
    }

    /// Target of the link at `member`, if one was recorded there.
    pub fn get(&self, member: &Path) -> Option<&str> {
        let key = lexical(member).ok()?;
        self.links.get(&key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Resolve `path` relative to the root, following recorded links.
    ///
    /// The last component is followed only when `follow_last` is set, as
    /// when writing a member through its parent directory versus reading a
    /// link's target. Returns the components of the resolved position.
    pub fn resolve(&self, path: &Path, follow_last: bool) -> Result<Vec<String>, Escape> {
        let mut pending: VecDeque<Step> = steps(path)?.into();
        let mut resolved: Vec<String> = Vec::new();
        let mut hops = 0;

        while let Some(step) = pending.pop_front() {
            match step {
                Step::Up => {
                    if resolved.pop().is_none() {
                        return Err(Escape::ParentTraversal);
                    }
                }
                Step::Name(name) => {
                    resolved.push(name);
                    if pending.is_empty() && !follow_last {
                        break;
                    }
                    if let Some(target) = self.links.get(&resolved) {
                        hops += 1;
                        if hops > MAX_LINK_HOPS {
                            return Err(Escape::LinkLoop);
                        }
                        resolved.pop();
                        for step in steps(Path::new(target))?.into_iter().rev() {
                            pending.push_front(step);
                        }
                    }
                }
            }
        }
        Ok(resolved)
    }

    /// [`LinkMap::resolve`] joined onto `root`.
    pub fn resolve_in(
        &self,
        root: &Path,
        path: &Path,
        follow_last: bool,
    ) -> Result<PathBuf, Escape> {
        let mut dest = root.to_path_buf();
        dest.extend(self.resolve(path, follow_last)?);
        Ok(dest)
    }
}
