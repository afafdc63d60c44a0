use filetime::{set_file_mtime, FileTime};
use imgdedup::engine::{DedupEngine, EngineError};
use imgdedup::index::{FileIndex, FileRecord};
use imgdedup::progress::{ProgressSink, ScanEvent};
use imgdedup::scanner::{
    index_key, AlwaysRehash, Blake3Fingerprinter, Fingerprinter, HashError, ScanError, ScanOptions,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::tempdir;

/// Delegates to BLAKE3 and counts calls.
#[derive(Default)]
struct CountingFingerprinter {
    calls: AtomicUsize,
    inner: Blake3Fingerprinter,
}

impl Fingerprinter for CountingFingerprinter {
    fn fingerprint(&self, path: &Path) -> Result<String, HashError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.fingerprint(path)
    }
}

fn write_file(path: &Path, content: &[u8]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn engine_with(options: ScanOptions) -> DedupEngine {
    DedupEngine::new(FileIndex::open_in_memory().unwrap(), options)
}

fn snapshot(engine: &DedupEngine) -> Vec<FileRecord> {
    let paths = engine.index().all_paths().unwrap();
    let records = engine.index().get_many(&paths).unwrap();
    let mut records: Vec<FileRecord> = records.into_values().collect();
    records.sort_by(|a, b| a.path.cmp(&b.path));
    records
}

#[test]
fn test_scan_empty_directory() {
    let dir = tempdir().unwrap();
    let engine = engine_with(ScanOptions::default());

    let summary = engine
        .scan(&[dir.path().to_path_buf()], &ProgressSink::disabled())
        .unwrap();

    assert_eq!(summary.files_seen, 0);
    assert_eq!(summary.duplicate_groups, 0);
    assert!(!summary.interrupted);
    assert_eq!(engine.index().count().unwrap(), 0);
}

#[test]
fn test_rescan_unchanged_tree_reads_nothing() {
    let dir = tempdir().unwrap();
    for i in 0..7 {
        write_file(&dir.path().join(format!("set/{i}.jpg")), format!("img {}", i % 3).as_bytes());
    }

    let counter = Arc::new(CountingFingerprinter::default());
    let engine = engine_with(ScanOptions::default()).with_fingerprinter(counter.clone());
    let roots = [dir.path().to_path_buf()];

    let first = engine.scan(&roots, &ProgressSink::disabled()).unwrap();
    assert_eq!(first.hashed_new, 7);
    assert_eq!(counter.calls.load(Ordering::SeqCst), 7);
    let before = snapshot(&engine);

    let second = engine.scan(&roots, &ProgressSink::disabled()).unwrap();
    assert_eq!(counter.calls.load(Ordering::SeqCst), 7);
    assert_eq!(second.cached, 7);
    assert_eq!(second.hashed(), 0);
    assert_eq!(snapshot(&engine), before);
    assert_eq!(first.duplicate_groups, second.duplicate_groups);
}

#[test]
fn test_same_size_same_mtime_rewrite_serves_cached_digest() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("photo.png");
    let pinned = FileTime::from_unix_time(1_600_000_000, 0);

    write_file(&path, b"AAAA");
    set_file_mtime(&path, pinned).unwrap();

    let engine = engine_with(ScanOptions::default());
    let roots = [dir.path().to_path_buf()];
    engine.scan(&roots, &ProgressSink::disabled()).unwrap();
    let key = index_key(&path);
    let original = engine.index().get(&key).unwrap().unwrap().digest;

    write_file(&path, b"BBBB");
    set_file_mtime(&path, pinned).unwrap();

    let summary = engine.scan(&roots, &ProgressSink::disabled()).unwrap();
    assert_eq!(summary.cached, 1);
    assert_eq!(engine.index().get(&key).unwrap().unwrap().digest, original);

    let strict = DedupEngine::new(FileIndex::open_in_memory().unwrap(), ScanOptions::default())
        .with_validator(Arc::new(AlwaysRehash));
    strict.scan(&roots, &ProgressSink::disabled()).unwrap();
    let fresh = strict.index().get(&key).unwrap().unwrap().digest;
    assert_ne!(fresh, original);

    // The stale record is picked up once the validator stops trusting it.
    let engine = engine.with_validator(Arc::new(AlwaysRehash));
    let summary = engine.scan(&roots, &ProgressSink::disabled()).unwrap();
    assert_eq!(summary.hashed_updated, 1);
    assert_eq!(engine.index().get(&key).unwrap().unwrap().digest, fresh);
}

#[test]
fn test_changed_mtime_triggers_rehash() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("a.jpg");
    write_file(&path, b"first");
    set_file_mtime(&path, FileTime::from_unix_time(1_500_000_000, 0)).unwrap();

    let engine = engine_with(ScanOptions::default());
    let roots = [dir.path().to_path_buf()];
    engine.scan(&roots, &ProgressSink::disabled()).unwrap();

    write_file(&path, b"second");
    set_file_mtime(&path, FileTime::from_unix_time(1_500_000_100, 0)).unwrap();
    let summary = engine.scan(&roots, &ProgressSink::disabled()).unwrap();

    assert_eq!(summary.hashed_updated, 1);
    assert_eq!(summary.hashed_new, 0);
    let record = engine.index().get(&index_key(&path)).unwrap().unwrap();
    assert_eq!(record.size, 6);
    assert_eq!(record.modified_ns, 1_500_000_100 * 1_000_000_000);
}

#[test]
fn test_rescan_prunes_deleted_files() {
    let dir = tempdir().unwrap();
    let keep = dir.path().join("keep.jpg");
    let gone = dir.path().join("gone.jpg");
    write_file(&keep, b"same");
    write_file(&gone, b"same");

    let engine = engine_with(ScanOptions::default());
    let roots = [dir.path().to_path_buf()];
    let first = engine.scan(&roots, &ProgressSink::disabled()).unwrap();
    assert_eq!(first.duplicate_groups, 1);

    fs::remove_file(&gone).unwrap();
    let second = engine.scan(&roots, &ProgressSink::disabled()).unwrap();

    assert_eq!(second.pruned, 1);
    assert_eq!(second.duplicate_groups, 0);
    assert!(engine.index().get(&index_key(&gone)).unwrap().is_none());
    assert!(engine.index().get(&index_key(&keep)).unwrap().is_some());
}

#[test]
fn test_prune_covers_records_outside_scanned_roots() {
    let dir = tempdir().unwrap();
    let left = dir.path().join("left");
    let right = dir.path().join("right");
    write_file(&left.join("a.jpg"), b"a");
    write_file(&right.join("b.jpg"), b"b");

    let engine = engine_with(ScanOptions::default());
    engine
        .scan(&[left.clone(), right.clone()], &ProgressSink::disabled())
        .unwrap();
    fs::remove_file(right.join("b.jpg")).unwrap();

    let summary = engine.scan(&[left], &ProgressSink::disabled()).unwrap();
    assert_eq!(summary.pruned, 1);
    assert_eq!(engine.index().count().unwrap(), 1);
}

#[test]
fn test_only_image_extensions_are_indexed() {
    let dir = tempdir().unwrap();
    write_file(&dir.path().join("a.JPG"), b"x");
    write_file(&dir.path().join("b.webp"), b"x");
    write_file(&dir.path().join("notes.txt"), b"x");
    write_file(&dir.path().join("raw.cr2"), b"x");

    let engine = engine_with(ScanOptions::default());
    let summary = engine
        .scan(&[dir.path().to_path_buf()], &ProgressSink::disabled())
        .unwrap();

    assert_eq!(summary.files_seen, 2);
    assert_eq!(summary.duplicate_groups, 1);
}

#[test]
fn test_small_batches_index_everything() {
    let dir = tempdir().unwrap();
    for i in 0..11 {
        write_file(&dir.path().join(format!("{i:02}.png")), format!("{i}").as_bytes());
    }
    let options = ScanOptions {
        batch_size: 3,
        io_threads: 2,
        ..ScanOptions::default()
    };

    let engine = engine_with(options);
    let summary = engine
        .scan(&[dir.path().to_path_buf()], &ProgressSink::disabled())
        .unwrap();

    assert_eq!(summary.files_seen, 11);
    assert_eq!(summary.hashed_new, 11);
    assert_eq!(engine.index().count().unwrap(), 11);
}

#[test]
fn test_multiple_roots_find_cross_root_duplicates() {
    let a = tempdir().unwrap();
    let b = tempdir().unwrap();
    write_file(&a.path().join("x.jpg"), b"shared");
    write_file(&b.path().join("nested/y.jpg"), b"shared");

    let engine = engine_with(ScanOptions::default());
    let summary = engine
        .scan(
            &[a.path().to_path_buf(), b.path().to_path_buf()],
            &ProgressSink::disabled(),
        )
        .unwrap();

    assert_eq!(summary.roots, 2);
    assert_eq!(summary.duplicate_groups, 1);
}

#[test]
fn test_missing_root_fails_before_indexing() {
    let dir = tempdir().unwrap();
    write_file(&dir.path().join("a.jpg"), b"a");
    let missing = PathBuf::from(dir.path().join("does-not-exist"));

    let engine = engine_with(ScanOptions::default());
    let result = engine.scan(
        &[dir.path().to_path_buf(), missing],
        &ProgressSink::disabled(),
    );

    assert!(matches!(
        result,
        Err(EngineError::Scan(ScanError::NotFound(_)))
    ));
    assert_eq!(engine.index().count().unwrap(), 0);
}

#[test]
fn test_progress_events_are_reported() {
    let dir = tempdir().unwrap();
    write_file(&dir.path().join("a.jpg"), b"a");
    write_file(&dir.path().join("b.jpg"), b"b");

    let engine = engine_with(ScanOptions::default());
    let (sink, events) = ProgressSink::bounded(64);
    engine.scan(&[dir.path().to_path_buf()], &sink).unwrap();
    drop(sink);

    let events: Vec<ScanEvent> = events.iter().collect();
    let hashed = events
        .iter()
        .filter(|e| matches!(e, ScanEvent::Hashed { created: true, .. }))
        .count();
    assert_eq!(hashed, 2);
    assert!(matches!(events.first(), Some(ScanEvent::RootStarted { .. })));
    assert!(matches!(
        events.last(),
        Some(ScanEvent::RootFinished { files: 2, .. })
    ));
}

#[test]
fn test_full_progress_channel_never_blocks() {
    let dir = tempdir().unwrap();
    for i in 0..20 {
        write_file(&dir.path().join(format!("{i}.gif")), format!("{i}").as_bytes());
    }

    let engine = engine_with(ScanOptions::default());
    let (sink, _events) = ProgressSink::bounded(1);
    let summary = engine.scan(&[dir.path().to_path_buf()], &sink).unwrap();

    assert_eq!(summary.files_seen, 20);
    assert!(summary.dropped_events > 0);
}

#[test]
fn test_shutdown_flag_stops_scan() {
    let dir = tempdir().unwrap();
    write_file(&dir.path().join("a.jpg"), b"a");

    let flag = Arc::new(AtomicBool::new(true));
    let engine = engine_with(ScanOptions::default()).with_shutdown_flag(flag);
    let summary = engine
        .scan(&[dir.path().to_path_buf()], &ProgressSink::disabled())
        .unwrap();

    assert!(summary.interrupted);
    assert_eq!(summary.files_seen, 0);
    assert_eq!(engine.index().count().unwrap(), 0);
}

#[test]
fn test_index_persists_across_engines() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("state/index.db");
    let photos = dir.path().join("photos");
    write_file(&photos.join("a.jpg"), b"dup");
    write_file(&photos.join("b.jpg"), b"dup");

    {
        let engine = DedupEngine::new(FileIndex::open(&db).unwrap(), ScanOptions::default());
        engine.scan(&[photos.clone()], &ProgressSink::disabled()).unwrap();
    }

    let counter = Arc::new(CountingFingerprinter::default());
    let engine = DedupEngine::new(FileIndex::open(&db).unwrap(), ScanOptions::default())
        .with_fingerprinter(counter.clone());
    let summary = engine.scan(&[photos], &ProgressSink::disabled()).unwrap();

    assert_eq!(counter.calls.load(Ordering::SeqCst), 0);
    assert_eq!(summary.cached, 2);
    assert_eq!(summary.duplicate_groups, 1);
}

#[cfg(unix)]
#[test]
fn test_non_utf8_name_is_cached_and_grouped() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let dir = tempdir().unwrap();
    let odd = dir.path().join(OsStr::from_bytes(b"caf\xe9.jpg"));
    if fs::write(&odd, b"same pixels").is_err() {
        // Filesystems that enforce UTF-8 names cannot hold this file.
        return;
    }
    write_file(&dir.path().join("copy.jpg"), b"same pixels");

    let counter = Arc::new(CountingFingerprinter::default());
    let engine = engine_with(ScanOptions::default()).with_fingerprinter(counter.clone());
    let roots = [dir.path().to_path_buf()];

    let first = engine.scan(&roots, &ProgressSink::disabled()).unwrap();
    assert_eq!(first.hashed_new, 2);
    assert_eq!(first.duplicate_groups, 1);

    let second = engine.scan(&roots, &ProgressSink::disabled()).unwrap();
    assert_eq!(second.pruned, 0);
    assert_eq!(second.cached, 2);
    assert_eq!(second.hashed(), 0);
    assert_eq!(counter.calls.load(Ordering::SeqCst), 2);

    let page = engine.list_duplicates(0, None).unwrap();
    assert_eq!(page.groups.len(), 1);
    assert_eq!(page.groups[0].len(), 2);
    assert_eq!(engine.index().count().unwrap(), 2);
    assert!(engine.index().get(&index_key(&odd)).unwrap().is_some());

    let report = engine
        .dispose_files(&[odd.clone()], &imgdedup::actions::DisposalMode::Delete)
        .unwrap();
    assert!(report.all_succeeded());
    assert!(!odd.exists());
    assert_eq!(engine.index().count().unwrap(), 1);
}
