//! Experiment loading tests

mod fixtures;

use fixtures::{experiment_archive, fixture_manifest, ArchiveBuilder};
use observer_setup::manifest::{ManifestError, TimeSpec};
use observer_setup::{
    load_scoped, ArchiveSource, ExperimentArchive, ExperimentLoader, LoadStage, SetupError,
    WorkspaceConfig,
};
use sha2::{Digest, Sha256};
use tempfile::TempDir;

fn loader(base: &TempDir) -> ExperimentLoader {
    ExperimentLoader::new(&WorkspaceConfig::in_dir(base.path())).unwrap()
}

#[test]
fn test_experiment_loads() {
    let base = TempDir::new().unwrap();
    let mut loader = loader(&base);
    let bytes = experiment_archive();

    let experiment = loader.load(ArchiveSource::from_bytes(&bytes)).unwrap();
    assert_eq!(loader.stage(), LoadStage::Ready);

    let root = loader.workspace().path();
    assert_eq!(experiment.node_id.as_deref(), Some("node-17"));
    assert_eq!(experiment.firmwares.len(), 2);
    assert_eq!(experiment.firmware("blink").unwrap(), root.join("firmwares/blink.hex"));
    assert!(experiment.firmware("idle").unwrap().is_file());
    assert_eq!(experiment.root, root);

    assert_eq!(experiment.schedule.len(), 3);
    assert_eq!(experiment.schedule[0].time(), Some(TimeSpec::Origin));
    assert_eq!(experiment.schedule[0].action(), Some("load_firmware"));
    assert_eq!(
        experiment.schedule[0]
            .parameters()
            .and_then(|p| p.get("firmware_id"))
            .and_then(|n| n.as_str()),
        Some("blink")
    );
    assert_eq!(experiment.schedule[1].time(), Some(TimeSpec::OnLastEventCompletion));
    assert_eq!(experiment.schedule[2].time(), Some(TimeSpec::After(30.0)));

    assert_eq!(experiment.archive.sha256, hex::encode(Sha256::digest(&bytes)));
    assert_eq!(experiment.archive.size, bytes.len() as u64);

    loader.release().unwrap();
}

#[test]
fn test_dot_slash_member_names() {
    let bytes = ArchiveBuilder::new()
        .dir("./firmwares")
        .file("./firmwares/blink.hex", ":00000001FF\n")
        .file("./manifest.yml", "firmwares:\n  - id: blink\n    file: blink.hex\nschedule: []\n")
        .build();

    let base = TempDir::new().unwrap();
    let mut loader = loader(&base);
    let experiment = loader.load(ArchiveSource::from_bytes(bytes)).unwrap();

    assert!(experiment.firmware("blink").unwrap().is_file());
    assert_eq!(experiment.node_id, None);
    loader.release().unwrap();
}

#[test]
fn test_empty_sections() {
    let bytes = ArchiveBuilder::from_fixture("experiment")
        .manifest("firmwares:\nschedule:\n")
        .build();

    let base = TempDir::new().unwrap();
    let mut loader = loader(&base);
    let experiment = loader.load(ArchiveSource::from_bytes(bytes)).unwrap();

    assert!(experiment.firmwares.is_empty());
    assert!(experiment.schedule.is_empty());
    loader.release().unwrap();
}

#[test]
fn test_missing_firmwares_member() {
    let bytes = ArchiveBuilder::from_fixture("experiment")
        .without("firmwares")
        .build();

    let base = TempDir::new().unwrap();
    let mut loader = loader(&base);

    match loader.load(ArchiveSource::from_bytes(bytes)).unwrap_err() {
        SetupError::ArchiveMissingMember { missing, provided } => {
            assert_eq!(missing, vec!["firmwares".to_string()]);
            assert_eq!(provided, vec!["manifest.yml".to_string()]);
        }
        other => panic!("Expected ArchiveMissingMember, got {:?}", other),
    }
    loader.release().unwrap();
}

#[test]
fn test_missing_schedule() {
    let manifest = fixture_manifest("experiment");
    let without_schedule = &manifest[..manifest.find("schedule:").unwrap()];
    let bytes = ArchiveBuilder::from_fixture("experiment")
        .manifest(without_schedule)
        .build();

    let base = TempDir::new().unwrap();
    let mut loader = loader(&base);

    match loader.load(ArchiveSource::from_bytes(bytes)).unwrap_err() {
        SetupError::Manifest(ManifestError::MissingField { segment, path }) => {
            assert_eq!(segment, "schedule");
            assert_eq!(path, "schedule");
        }
        other => panic!("Expected MissingField, got {:?}", other),
    }
    assert_eq!(loader.stage(), LoadStage::Failed);
    loader.release().unwrap();
}

#[test]
fn test_missing_firmware_file() {
    let bytes = ArchiveBuilder::from_fixture("experiment")
        .without("firmwares/idle.hex")
        .build();

    let base = TempDir::new().unwrap();
    let mut loader = loader(&base);

    match loader.load(ArchiveSource::from_bytes(bytes)).unwrap_err() {
        SetupError::FileReferenceMissing { file } => assert_eq!(file, "idle.hex"),
        other => panic!("Expected FileReferenceMissing, got {:?}", other),
    }
    loader.release().unwrap();
}

#[test]
fn test_firmware_outside_firmwares_dir_refused() {
    let manifest = fixture_manifest("experiment").replace("file: idle.hex", "file: ../manifest.yml");
    let bytes = ArchiveBuilder::from_fixture("experiment")
        .manifest(&manifest)
        .build();

    let base = TempDir::new().unwrap();
    let mut loader = loader(&base);

    match loader.load(ArchiveSource::from_bytes(bytes)).unwrap_err() {
        SetupError::ArchiveSecurity { member, .. } => assert_eq!(member, "../manifest.yml"),
        other => panic!("Expected ArchiveSecurity, got {:?}", other),
    }
    loader.release().unwrap();
}

#[test]
fn test_schedule_must_be_sequence() {
    let manifest = fixture_manifest("experiment");
    let head = &manifest[..manifest.find("schedule:").unwrap()];
    let bytes = ArchiveBuilder::from_fixture("experiment")
        .manifest(&format!("{}schedule: soon\n", head))
        .build();

    let base = TempDir::new().unwrap();
    let mut loader = loader(&base);
    let err = loader.load(ArchiveSource::from_bytes(bytes)).unwrap_err();

    assert!(matches!(
        err,
        SetupError::Manifest(ManifestError::InvalidField { ref path, .. }) if path == "schedule"
    ));
    loader.release().unwrap();
}

#[test]
fn test_scoped_load_keeps_nothing() {
    let base = TempDir::new().unwrap();
    let config = WorkspaceConfig::in_dir(base.path());

    let firmware = load_scoped::<ExperimentArchive, _, _>(
        &config,
        ArchiveSource::from_bytes(experiment_archive()),
        |experiment, _| experiment.firmware("blink").map(|p| p.to_path_buf()),
    )
    .unwrap()
    .unwrap();

    assert!(!firmware.exists());
    assert_eq!(std::fs::read_dir(base.path()).unwrap().count(), 0);
}

#[test]
fn test_parallel_loads_use_separate_workspaces() {
    let base = TempDir::new().unwrap();
    let config = WorkspaceConfig::in_dir(base.path());

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let config = config.clone();
            std::thread::spawn(move || {
                let mut loader = ExperimentLoader::new(&config).unwrap();
                let experiment = loader
                    .load(ArchiveSource::from_bytes(experiment_archive()))
                    .unwrap();
                let root = experiment.root.clone();
                loader.into_workspace();
                root
            })
        })
        .collect();

    let mut roots: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    roots.sort();
    roots.dedup();
    assert_eq!(roots.len(), 4);
    assert!(roots.iter().all(|r| r.join("firmwares/blink.hex").is_file()));
}
