use imgdedup::engine::DedupEngine;
use imgdedup::index::FileIndex;
use imgdedup::progress::ProgressSink;
use imgdedup::scanner::{index_key, ScanOptions};
use std::collections::HashSet;
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
fn test_identical_files_form_one_group() {
    let dir = tempdir().unwrap();
    for i in 0..4 {
        write_file(&dir.path().join(format!("d{i}/copy.jpg")), b"identical bytes");
    }
    write_file(&dir.path().join("other.jpg"), b"something else");

    let engine = scanned(dir.path());
    let page = engine.list_duplicates(0, None).unwrap();

    assert_eq!(page.total_groups, 1);
    assert_eq!(page.total_files, 4);
    assert_eq!(page.groups.len(), 1);
    let group = &page.groups[0];
    assert_eq!(group.len(), 4);
    assert_eq!(group.size, 15);
    assert_eq!(group.wasted_space(), 45);
    assert!(group.files.iter().all(|f| f.digest == group.digest));
}

#[test]
fn test_mutating_a_member_shrinks_the_group() {
    let dir = tempdir().unwrap();
    for i in 0..3 {
        write_file(&dir.path().join(format!("{i}.png")), b"same");
    }
    let engine = scanned(dir.path());
    assert_eq!(engine.list_duplicates(0, None).unwrap().groups[0].len(), 3);

    write_file(&dir.path().join("0.png"), b"changed content");
    engine
        .scan(&[dir.path().to_path_buf()], &ProgressSink::disabled())
        .unwrap();
    let page = engine.list_duplicates(0, None).unwrap();
    assert_eq!(page.groups.len(), 1);
    assert_eq!(page.groups[0].len(), 2);

    write_file(&dir.path().join("1.png"), b"also changed!!");
    let summary = engine
        .scan(&[dir.path().to_path_buf()], &ProgressSink::disabled())
        .unwrap();
    assert_eq!(summary.duplicate_groups, 0);
    assert!(engine.list_duplicates(0, None).unwrap().groups.is_empty());
}

#[test]
fn test_same_size_different_content_is_not_duplicate() {
    let dir = tempdir().unwrap();
    write_file(&dir.path().join("a.jpg"), b"abcd");
    write_file(&dir.path().join("b.jpg"), b"wxyz");

    let engine = scanned(dir.path());
    assert_eq!(engine.list_duplicates(0, None).unwrap().total_groups, 0);
}

#[test]
fn test_listing_purges_vanished_members() {
    let dir = tempdir().unwrap();
    let a = dir.path().join("a.jpg");
    let b = dir.path().join("b.jpg");
    let c = dir.path().join("c.jpg");
    for path in [&a, &b, &c] {
        write_file(path, b"triplet");
    }
    let engine = scanned(dir.path());

    fs::remove_file(&c).unwrap();
    let page = engine.list_duplicates(0, None).unwrap();
    assert_eq!(page.groups.len(), 1);
    assert_eq!(page.groups[0].len(), 2);
    assert!(engine.index().get(&index_key(&c)).unwrap().is_none());

    fs::remove_file(&b).unwrap();
    let page = engine.list_duplicates(0, None).unwrap();
    assert!(page.groups.is_empty());
    // Totals come from the grouped query taken before the purge.
    assert_eq!(page.total_groups, 1);
    assert!(engine.index().get(&index_key(&b)).unwrap().is_none());
    assert!(engine.index().get(&index_key(&a)).unwrap().is_some());

    let page = engine.list_duplicates(0, None).unwrap();
    assert_eq!(page.total_groups, 0);
}

#[test]
fn test_groups_ordered_by_size_descending() {
    let dir = tempdir().unwrap();
    for (name, content) in [("s", "x"), ("m", "xxxx"), ("l", "xxxxxxxxx")] {
        write_file(&dir.path().join(format!("one/{name}.jpg")), content.as_bytes());
        write_file(&dir.path().join(format!("two/{name}.jpg")), content.as_bytes());
    }

    let engine = scanned(dir.path());
    let sizes: Vec<u64> = engine
        .list_duplicates(0, None)
        .unwrap()
        .groups
        .iter()
        .map(|g| g.size)
        .collect();
    assert_eq!(sizes, vec![9, 4, 1]);
}

#[test]
fn test_pagination_is_disjoint_and_complete() {
    let dir = tempdir().unwrap();
    for i in 0..120 {
        // Pairs of sizes collide so digest ordering decides ties.
        let content = format!("{:0width$}", i, width = 4 + i % 60);
        write_file(&dir.path().join(format!("a/{i}.jpg")), content.as_bytes());
        write_file(&dir.path().join(format!("b/{i}.jpg")), content.as_bytes());
    }
    let engine = scanned(dir.path());

    let all = engine.list_duplicates(0, None).unwrap();
    assert_eq!(all.total_groups, 120);
    assert_eq!(all.total_files, 240);

    let first = engine.list_duplicates(0, Some(50)).unwrap();
    let second = engine.list_duplicates(50, Some(50)).unwrap();
    let third = engine.list_duplicates(100, Some(50)).unwrap();
    assert_eq!(first.groups.len(), 50);
    assert_eq!(second.groups.len(), 50);
    assert_eq!(third.groups.len(), 20);
    assert!(first.has_more());
    assert!(!third.has_more());
    assert_eq!(first.total_pages(), 3);

    let keys = |groups: &[imgdedup::duplicates::DuplicateGroup]| -> Vec<(u64, String)> {
        groups.iter().map(|g| (g.size, g.digest.clone())).collect()
    };
    let first_keys: HashSet<_> = keys(&first.groups).into_iter().collect();
    let second_keys: HashSet<_> = keys(&second.groups).into_iter().collect();
    assert!(first_keys.is_disjoint(&second_keys));

    let mut paged = keys(&first.groups);
    paged.extend(keys(&second.groups));
    paged.extend(keys(&third.groups));
    assert_eq!(paged, keys(&all.groups));

    let mut sorted = paged.clone();
    sorted.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
    assert_eq!(paged, sorted);
}

#[test]
fn test_offset_past_end_is_empty() {
    let dir = tempdir().unwrap();
    write_file(&dir.path().join("a.jpg"), b"x");
    write_file(&dir.path().join("b.jpg"), b"x");
    let engine = scanned(dir.path());

    let page = engine.list_duplicates(10, Some(50)).unwrap();
    assert!(page.groups.is_empty());
    assert_eq!(page.total_groups, 1);
}
