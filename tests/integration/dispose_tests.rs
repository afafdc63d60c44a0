use imgdedup::actions::{DisposalMode, DisposeError};
use imgdedup::engine::{DedupEngine, EngineError};
use imgdedup::index::FileIndex;
use imgdedup::progress::ProgressSink;
use imgdedup::scanner::{index_key, ScanOptions};
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn write_file(path: &Path, content: &[u8]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn scanned(root: &Path) -> DedupEngine {
    let engine = DedupEngine::new(FileIndex::open_in_memory().unwrap(), ScanOptions::default());
    engine
        .scan(&[root.to_path_buf()], &ProgressSink::disabled())
        .unwrap();
    engine
}

#[test]
fn test_trash_dir_move_removes_record() {
    let dir = tempdir().unwrap();
    let photos = dir.path().join("photos");
    let copy = photos.join("copy.jpg");
    write_file(&photos.join("orig.jpg"), b"pixels");
    write_file(&copy, b"pixels");
    let engine = scanned(&photos);
    let trash = dir.path().join("trash");

    let report = engine
        .dispose_files(&[copy.clone()], &DisposalMode::TrashDir(trash.clone()))
        .unwrap();

    assert!(report.all_succeeded());
    assert_eq!(report.bytes_freed, 6);
    assert_eq!(report.successes[0].path, index_key(&copy));
    assert_eq!(report.successes[0].destination, Some(trash.join("copy.jpg")));
    assert!(!copy.exists());
    assert_eq!(fs::read(trash.join("copy.jpg")).unwrap(), b"pixels");
    assert!(engine.index().get(&index_key(&copy)).unwrap().is_none());
    assert_eq!(engine.list_duplicates(0, None).unwrap().total_groups, 0);
}

#[test]
fn test_trash_dir_collision_gets_timestamp_suffix() {
    let dir = tempdir().unwrap();
    let trash = dir.path().join("trash");
    write_file(&trash.join("img.png"), b"already here");
    let first = dir.path().join("x/img.png");
    let second = dir.path().join("y/img.png");
    write_file(&first, b"one");
    write_file(&second, b"two");
    let engine = scanned(dir.path());

    let report = engine
        .dispose_files(
            &[first.clone(), second.clone()],
            &DisposalMode::TrashDir(trash.clone()),
        )
        .unwrap();

    assert_eq!(report.success_count(), 2);
    assert_eq!(fs::read(trash.join("img.png")).unwrap(), b"already here");
    let names: Vec<String> = report
        .successes
        .iter()
        .map(|s| {
            s.destination
                .as_ref()
                .unwrap()
                .file_name()
                .unwrap()
                .to_string_lossy()
                .into_owned()
        })
        .collect();
    for name in &names {
        assert!(name.starts_with("img_"), "unexpected name {name}");
        assert!(name.ends_with(".png"));
    }
    assert_ne!(names[0], names[1]);
    assert_eq!(fs::read_dir(&trash).unwrap().count(), 3);
}

#[test]
fn test_delete_mode_removes_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("a.jpg");
    write_file(&path, b"bye");
    let engine = scanned(dir.path());

    let report = engine
        .dispose_files(&[path.clone()], &DisposalMode::Delete)
        .unwrap();

    assert_eq!(report.success_count(), 1);
    assert!(report.successes[0].destination.is_none());
    assert!(!path.exists());
    assert_eq!(engine.index().count().unwrap(), 0);
}

#[test]
fn test_failures_do_not_stop_the_batch() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("missing.jpg");
    let folder = dir.path().join("folder.jpg");
    let present = dir.path().join("present.jpg");
    fs::create_dir_all(&folder).unwrap();
    write_file(&present, b"here");
    let engine = scanned(dir.path());

    let report = engine
        .dispose_files(
            &[missing.clone(), folder.clone(), present.clone()],
            &DisposalMode::Delete,
        )
        .unwrap();

    assert_eq!(report.success_count(), 1);
    assert_eq!(report.failure_count(), 2);
    assert_eq!(
        report.failed_paths(),
        vec![index_key(&missing).as_str(), index_key(&folder).as_str()]
    );
    assert!(!present.exists());
    assert!(folder.is_dir());
    assert!(report.summary().contains("2 failed"));
}

#[test]
fn test_unusable_trash_dir_fails_whole_batch() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("a.jpg");
    write_file(&path, b"data");
    let blocker = dir.path().join("not-a-dir");
    fs::write(&blocker, b"file in the way").unwrap();
    let engine = scanned(dir.path());

    let result = engine.dispose_files(&[path.clone()], &DisposalMode::TrashDir(blocker.join("trash")));

    assert!(matches!(
        result,
        Err(EngineError::Dispose(DisposeError::TrashDirUnavailable { .. }))
    ));
    assert!(path.exists());
    assert_eq!(engine.index().count().unwrap(), 1);
}

#[test]
fn test_empty_path_list_is_invalid() {
    let dir = tempdir().unwrap();
    let engine = scanned(dir.path());
    assert!(matches!(
        engine.dispose_files(&[], &DisposalMode::Delete),
        Err(EngineError::InvalidRequest(_))
    ));
}

#[test]
fn test_disposing_unindexed_file_still_succeeds() {
    let dir = tempdir().unwrap();
    let engine = scanned(dir.path());
    let stray = dir.path().join("stray.jpg");
    write_file(&stray, b"never scanned");

    let report = engine
        .dispose_files(&[stray.clone()], &DisposalMode::Delete)
        .unwrap();

    assert!(report.all_succeeded());
    assert_eq!(report.index_errors, 0);
    assert!(!stray.exists());
}
