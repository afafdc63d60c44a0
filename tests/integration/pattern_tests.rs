use imgdedup::actions::DisposalMode;
use imgdedup::duplicates::{pattern_id, DisposalRule};
use imgdedup::engine::{DedupEngine, EngineError};
use imgdedup::index::FileIndex;
use imgdedup::progress::ProgressSink;
use imgdedup::scanner::{index_key, ScanOptions};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::{tempdir, TempDir};

fn write_file(path: &Path, content: &[u8]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

/// Two groups spread over `a` and `b`, one group over `a`, `b` and `c`.
struct Library {
    dir: TempDir,
    engine: DedupEngine,
}

impl Library {
    fn new() -> Self {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write_file(&root.join("a/sun.jpg"), b"sun");
        write_file(&root.join("b/sun.jpg"), b"sun");
        write_file(&root.join("a/moon.jpg"), b"moon!");
        write_file(&root.join("b/moon-copy.jpg"), b"moon!");
        write_file(&root.join("a/star.png"), b"star-star");
        write_file(&root.join("b/star.png"), b"star-star");
        write_file(&root.join("c/star.png"), b"star-star");

        let engine = DedupEngine::new(FileIndex::open_in_memory().unwrap(), ScanOptions::default());
        engine
            .scan(&[root.to_path_buf()], &ProgressSink::disabled())
            .unwrap();
        Self { dir, engine }
    }

    fn folder(&self, name: &str) -> String {
        index_key(&self.dir.path().join(name))
    }

    fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }
}

#[test]
fn test_patterns_aggregate_groups_by_folder_set() {
    let lib = Library::new();
    let patterns = lib.engine.list_folder_patterns().unwrap();

    assert_eq!(patterns.len(), 2);
    let ab = &patterns[0];
    assert_eq!(ab.duplicate_count, 2);
    assert_eq!(ab.total_files, 4);
    assert_eq!(ab.folders, vec![lib.folder("a"), lib.folder("b")]);
    assert_eq!(ab.id, format!("{}|{}", lib.folder("a"), lib.folder("b")));

    let abc = &patterns[1];
    assert_eq!(abc.duplicate_count, 1);
    assert_eq!(abc.total_files, 3);
    assert_eq!(abc.folders.len(), 3);
    assert_ne!(abc.id, ab.id);
}

#[test]
fn test_pattern_id_matches_listed_patterns() {
    let lib = Library::new();
    let patterns = lib.engine.list_folder_patterns().unwrap();
    let groups = lib.engine.list_duplicates(0, None).unwrap().groups;

    for group in &groups {
        let id = pattern_id(group);
        assert!(patterns.iter().any(|p| p.id == id));
    }
}

#[test]
fn test_rule_disposes_only_non_kept_folder() {
    let lib = Library::new();
    let patterns = lib.engine.list_folder_patterns().unwrap();
    let trash = lib.path("trash");

    let rules = vec![DisposalRule::new(patterns[0].id.clone(), lib.folder("a"))];
    let report = lib
        .engine
        .apply_batch_rules(&rules, &DisposalMode::TrashDir(trash.clone()))
        .unwrap();

    assert_eq!(report.success_count(), 2);
    assert_eq!(report.failure_count(), 0);
    assert!(!lib.path("b/sun.jpg").exists());
    assert!(!lib.path("b/moon-copy.jpg").exists());
    assert!(trash.join("sun.jpg").exists());
    assert!(trash.join("moon-copy.jpg").exists());

    assert!(lib.path("a/sun.jpg").exists());
    assert!(lib.path("a/moon.jpg").exists());
    for name in ["a/star.png", "b/star.png", "c/star.png"] {
        assert!(lib.path(name).exists(), "{name} should be untouched");
    }

    let remaining = lib.engine.list_folder_patterns().unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].folders.len(), 3);
}

#[test]
fn test_plan_reports_matched_and_untouched_groups() {
    let lib = Library::new();
    let patterns = lib.engine.list_folder_patterns().unwrap();

    let rule: DisposalRule = format!("{}=>{}/", patterns[1].id, lib.folder("c"))
        .parse()
        .unwrap();
    let plan = lib.engine.plan_batch_rules(&[rule]).unwrap();

    assert_eq!(plan.groups_matched, 1);
    assert_eq!(plan.groups_untouched, 2);
    assert_eq!(plan.paths.len(), 2);
    assert!(plan.paths.iter().all(|p| p.ends_with("star.png")));
    assert!(plan.rejected.is_empty());
    // Planning touches nothing.
    assert!(lib.path("a/star.png").exists());
}

#[test]
fn test_rule_with_foreign_keep_folder_is_rejected() {
    let lib = Library::new();
    let patterns = lib.engine.list_folder_patterns().unwrap();

    let rules = vec![DisposalRule::new(patterns[0].id.clone(), lib.folder("c"))];
    let plan = lib.engine.plan_batch_rules(&rules).unwrap();
    assert!(plan.is_empty());
    assert_eq!(plan.rejected.len(), 2);

    let report = lib
        .engine
        .apply_batch_rules(&rules, &DisposalMode::Delete)
        .unwrap();
    assert_eq!(report.total_count(), 0);
    assert!(lib.path("a/sun.jpg").exists());
    assert!(lib.path("b/sun.jpg").exists());
}

#[test]
fn test_last_rule_for_a_pattern_wins() {
    let lib = Library::new();
    let patterns = lib.engine.list_folder_patterns().unwrap();
    let id = patterns[0].id.clone();

    let rules = vec![
        DisposalRule::new(id.clone(), lib.folder("a")),
        DisposalRule::new(id, lib.folder("b")),
    ];
    lib.engine
        .apply_batch_rules(&rules, &DisposalMode::Delete)
        .unwrap();

    assert!(!lib.path("a/sun.jpg").exists());
    assert!(lib.path("b/sun.jpg").exists());
    assert!(lib.path("b/moon-copy.jpg").exists());
}

#[test]
fn test_unknown_pattern_changes_nothing() {
    let lib = Library::new();
    let rules = vec![DisposalRule::new("/nowhere|/else", "/nowhere")];
    let plan = lib.engine.plan_batch_rules(&rules).unwrap();

    assert!(plan.is_empty());
    assert_eq!(plan.groups_untouched, 3);
}

#[test]
fn test_empty_rule_set_is_invalid() {
    let lib = Library::new();
    assert!(matches!(
        lib.engine.apply_batch_rules(&[], &DisposalMode::Delete),
        Err(EngineError::InvalidRequest(_))
    ));
}

#[test]
fn test_rule_keeps_going_after_a_failed_file() {
    let lib = Library::new();
    let patterns = lib.engine.list_folder_patterns().unwrap();
    let rules = vec![DisposalRule::new(patterns[0].id.clone(), lib.folder("a"))];
    let plan = lib.engine.plan_batch_rules(&rules).unwrap();
    assert_eq!(plan.paths.len(), 2);

    // Vanishes between planning and applying.
    let sun = lib.path("b/sun.jpg");
    fs::remove_file(&sun).unwrap();
    let report = lib
        .engine
        .apply_plan(&plan, &DisposalMode::Delete)
        .unwrap();

    assert_eq!(report.failure_count(), 1);
    assert_eq!(report.failed_paths(), vec![index_key(&sun).as_str()]);
    assert_eq!(report.success_count(), 1);
    assert!(!lib.path("b/moon-copy.jpg").exists());
    assert!(lib.path("a/sun.jpg").exists());
    assert!(lib.path("a/moon.jpg").exists());
    assert!(lib.engine.index().get(&index_key(&sun)).unwrap().is_none());
}
