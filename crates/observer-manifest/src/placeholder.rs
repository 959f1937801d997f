//! Placeholder resolution in controller commands
//!
//! Commands may reference declared files through two token forms:
//! - `<!id>`: the executable with the given id
//! - `<#id>`: the configuration file with the given id
//!
//! Each command is rewritten in a single left-to-right pass, so a path
//! inserted for one token is never scanned again. Tokens whose id is not in
//! the corresponding table are left verbatim.

use regex_lite::{Captures, Regex};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use crate::entry::FileTable;

/// Command name → command line.
pub type CommandTable = BTreeMap<String, String>;

/// Which table a placeholder token refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaceholderKind {
    /// `<!id>`
    Executable,
    /// `<#id>`
    ConfigurationFile,
}

impl PlaceholderKind {
    pub fn sigil(self) -> char {
        match self {
            Self::Executable => '!',
            Self::ConfigurationFile => '#',
        }
    }

    fn from_sigil(sigil: &str) -> Option<Self> {
        match sigil {
            "!" => Some(Self::Executable),
            "#" => Some(Self::ConfigurationFile),
            _ => None,
        }
    }

    /// The literal token for `id`, e.g. `<!flash>`.
    pub fn token(self, id: &str) -> String {
        format!("<{}{}>", self.sigil(), id)
    }
}

impl fmt::Display for PlaceholderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Executable => write!(f, "executable"),
            Self::ConfigurationFile => write!(f, "configuration file"),
        }
    }
}

/// A placeholder token left in a command after resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnresolvedPlaceholder {
    pub kind: PlaceholderKind,
    pub id: String,
}

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"<([!#])([^<>]+)>").expect("placeholder pattern is valid"))
}

/// Rewrite one command line.
pub fn resolve_command(command: &str, executables: &FileTable, configuration_files: &FileTable) -> String {
    token_pattern()
        .replace_all(command, |caps: &Captures| {
            let table = match PlaceholderKind::from_sigil(&caps[1]) {
                Some(PlaceholderKind::Executable) => executables,
                Some(PlaceholderKind::ConfigurationFile) => configuration_files,
                None => return caps[0].to_string(),
            };
            match table.get(&caps[2]) {
                Some(path) => path.to_string_lossy().into_owned(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Rewrite every command of the table.
pub fn resolve_commands(
    commands: CommandTable,
    executables: &FileTable,
    configuration_files: &FileTable,
) -> CommandTable {
    commands
        .into_iter()
        .map(|(name, command)| {
            let resolved = resolve_command(&command, executables, configuration_files);
            (name, resolved)
        })
        .collect()
}

/// List the placeholder tokens present in `command`.
pub fn unresolved_placeholders(command: &str) -> Vec<UnresolvedPlaceholder> {
    token_pattern()
        .captures_iter(command)
        .filter_map(|caps| {
            let kind = PlaceholderKind::from_sigil(caps.get(1)?.as_str())?;
            Some(UnresolvedPlaceholder {
                kind,
                id: caps.get(2)?.as_str().to_string(),
            })
        })
        .collect()
}
