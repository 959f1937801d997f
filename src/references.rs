//! File reference checks
//!
//! Firmware, executable and configuration file entries name files relative
//! to a fixed subdirectory of the extracted archive. Every declared file must
//! exist there as a regular file and, once links are followed, still sit
//! inside the extracted archive.

use observer_manifest::{relative_file, FileEntry, FileTable};
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::error::SetupError;

/// Resolve `entries` against `root/subdir` and build the id → path table.
///
/// Entries are checked in declaration order. A later entry with an id
/// already in the table replaces the earlier one. Errors name the declared
/// file, not the resolved path.
pub fn resolve_entries(
    root: &Path,
    subdir: &str,
    entries: Vec<FileEntry>,
) -> Result<FileTable, SetupError> {
    let dir = root.join(subdir);
    let real_root = fs::canonicalize(root).map_err(|source| SetupError::ArchiveIo {
        path: root.to_path_buf(),
        source,
    })?;
    let mut table = FileTable::new();

    for entry in entries {
        let Some(declared) = relative_file(&entry.file) else {
            return Err(SetupError::ArchiveSecurity {
                member: entry.file,
                reason: format!("declared file must be relative to {}", subdir),
            });
        };

        let path = dir.join(declared);
        if !path.is_file() {
            return Err(SetupError::FileReferenceMissing { file: entry.file });
        }
        let real = fs::canonicalize(&path).map_err(|source| SetupError::ArchiveIo {
            path: path.clone(),
            source,
        })?;
        if !real.starts_with(&real_root) {
            return Err(SetupError::ArchiveSecurity {
                member: entry.file,
                reason: format!("resolves outside the workspace to {}", real.display()),
            });
        }

        debug!(section = subdir, id = %entry.id, path = %path.display(), "file reference resolved");
        if let Some(previous) = table.insert(entry.id.clone(), path) {
            debug!(section = subdir, id = %entry.id, previous = %previous.display(), "duplicate id replaces earlier entry");
        }
    }

    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn entry(id: &str, file: &str) -> FileEntry {
        FileEntry {
            id: id.into(),
            file: file.into(),
            brief: None,
        }
    }

    fn root_with_executables() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("controller/executables/tools")).unwrap();
        fs::write(dir.path().join("controller/executables/run.sh"), "#!/bin/sh\n").unwrap();
        fs::write(dir.path().join("controller/executables/tools/flash"), "").unwrap();
        dir
    }

    #[test]
    fn test_resolves_absolute_paths() {
        let root = root_with_executables();
        let table = resolve_entries(
            root.path(),
            "controller/executables",
            vec![entry("cmd1", "run.sh"), entry("flash", "tools/flash")],
        )
        .unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(table["cmd1"], root.path().join("controller/executables/run.sh"));
        assert!(table["flash"].is_absolute());
        assert!(table["flash"].is_file());
    }

    #[test]
    fn test_missing_file_names_declared_file() {
        let root = root_with_executables();
        let err = resolve_entries(
            root.path(),
            "controller/executables",
            vec![entry("cmd1", "run.sh"), entry("gone", "missing.sh")],
        )
        .unwrap_err();

        match err {
            SetupError::FileReferenceMissing { file } => assert_eq!(file, "missing.sh"),
            other => panic!("Expected FileReferenceMissing, got {:?}", other),
        }
    }

    #[test]
    fn test_directory_is_not_a_file() {
        let root = root_with_executables();
        let err = resolve_entries(root.path(), "controller/executables", vec![entry("d", "tools")])
            .unwrap_err();
        assert!(matches!(err, SetupError::FileReferenceMissing { .. }));
    }

    #[test]
    fn test_empty_table() {
        let root = TempDir::new().unwrap();
        let table = resolve_entries(root.path(), "controller/configuration_files", Vec::new()).unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn test_declared_file_cannot_leave_subdir() {
        let root = root_with_executables();
        for file in ["../../manifest.yml", "/bin/sh", "", "./"] {
            let err = resolve_entries(root.path(), "controller/executables", vec![entry("x", file)])
                .unwrap_err();
            assert!(
                matches!(err, SetupError::ArchiveSecurity { .. }),
                "{} should be refused",
                file
            );
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_to_file_is_accepted() {
        let root = root_with_executables();
        std::os::unix::fs::symlink(
            root.path().join("controller/executables/run.sh"),
            root.path().join("controller/executables/link.sh"),
        )
        .unwrap();

        let table = resolve_entries(root.path(), "controller/executables", vec![entry("l", "link.sh")])
            .unwrap();
        assert_eq!(table["l"], root.path().join("controller/executables/link.sh"));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_leaving_workspace_is_refused() {
        let root = root_with_executables();
        let elsewhere = TempDir::new().unwrap();
        fs::write(elsewhere.path().join("secret.txt"), "secret").unwrap();
        std::os::unix::fs::symlink(
            elsewhere.path().join("secret.txt"),
            root.path().join("controller/executables/leak.sh"),
        )
        .unwrap();

        let err = resolve_entries(root.path(), "controller/executables", vec![entry("l", "leak.sh")])
            .unwrap_err();
        match err {
            SetupError::ArchiveSecurity { member, reason } => {
                assert_eq!(member, "leak.sh");
                assert!(reason.starts_with("resolves outside the workspace"));
            }
            other => panic!("Expected ArchiveSecurity, got {:?}", other),
        }
    }

    #[test]
    fn test_dot_slash_file_accepted() {
        let root = root_with_executables();
        let table = resolve_entries(
            root.path(),
            "controller/executables",
            vec![entry("cmd1", "./run.sh"), entry("flash", "./tools/./flash")],
        )
        .unwrap();

        assert_eq!(table["cmd1"].to_str(), root.path().join("controller/executables/run.sh").to_str());
        assert!(table["flash"].is_file());
    }

    #[test]
    fn test_duplicate_id_last_wins() {
        let root = root_with_executables();
        let table = resolve_entries(
            root.path(),
            "controller/executables",
            vec![entry("x", "tools/flash"), entry("x", "run.sh")],
        )
        .unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table["x"], root.path().join("controller/executables/run.sh"));
    }

    #[test]
    fn test_shadowed_entry_still_checked() {
        let root = root_with_executables();
        let err = resolve_entries(
            root.path(),
            "controller/executables",
            vec![entry("x", "missing.sh"), entry("x", "run.sh")],
        )
        .unwrap_err();
        assert!(matches!(err, SetupError::FileReferenceMissing { ref file } if file == "missing.sh"));
    }
}
