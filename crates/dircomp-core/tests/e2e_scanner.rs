/// End-to-end comparison tests against the real filesystem.
///
/// Each test builds two small trees under a `tempfile` directory, runs a
/// full `ComparisonSession` with `LocalProvider` on both sides and checks
/// the settled statuses. Real threads, real `std::fs` calls, no mocking.
use dircomp_core::error::ErrorKind;
use dircomp_core::model::{DiffStatus, NodeIndex, Presence, ScanState};
use dircomp_core::{CompareConfig, ComparisonSession};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

// ── Helpers ──────────────────────────────────────────────────────────────────

fn write(path: &Path, contents: &[u8]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
}

fn pair() -> (TempDir, std::path::PathBuf, std::path::PathBuf) {
    let tmp = TempDir::new().unwrap();
    let left = tmp.path().join("left");
    let right = tmp.path().join("right");
    fs::create_dir_all(&left).unwrap();
    fs::create_dir_all(&right).unwrap();
    (tmp, left, right)
}

fn compare(left: &Path, right: &Path) -> ComparisonSession {
    let config = CompareConfig {
        worker_count: 4,
        ..CompareConfig::default()
    };
    let session = ComparisonSession::start(left, right, config);
    assert!(
        session.wait_until_complete(Duration::from_secs(30)),
        "comparison did not finish: {:?}",
        session.stats()
    );
    session
}

fn status(session: &ComparisonSession, path: &str) -> DiffStatus {
    session
        .tree()
        .get(path)
        .unwrap_or_else(|| panic!("no node at '{path}'"))
        .status
}

fn root_status(session: &ComparisonSession) -> DiffStatus {
    session.tree().snapshot(NodeIndex::ROOT).unwrap().status
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[test]
fn differing_content_marks_file_and_root() {
    let (_tmp, left, right) = pair();
    write(&left.join("a.txt"), b"x");
    write(&right.join("a.txt"), b"y");

    let session = compare(&left, &right);

    assert_eq!(status(&session, "a.txt"), DiffStatus::ContentDifferent);
    assert_eq!(root_status(&session), DiffStatus::ContainsDifference);
    assert_eq!(session.stats().files_compared, 1);
}

#[test]
fn one_sided_file_bubbles_through_directory() {
    let (_tmp, left, right) = pair();
    write(&left.join("dir/only_left.txt"), b"hello");
    fs::create_dir_all(right.join("dir")).unwrap();

    let session = compare(&left, &right);

    assert_eq!(status(&session, "dir/only_left.txt"), DiffStatus::OnlyLeft);
    assert_eq!(status(&session, "dir"), DiffStatus::ContainsDifference);
    assert_eq!(root_status(&session), DiffStatus::ContainsDifference);
}

#[test]
fn identical_trees_are_identical() {
    let (_tmp, left, right) = pair();
    for root in [&left, &right] {
        write(&root.join("alpha/a.txt"), &[7u8; 100]);
        write(&root.join("alpha/b.rs"), &[1u8; 200]);
        write(&root.join("beta/c.png"), &[9u8; 300]);
        write(&root.join("empty.bin"), b"");
    }

    let session = compare(&left, &right);

    assert_eq!(root_status(&session), DiffStatus::Identical);
    for path in ["alpha", "alpha/a.txt", "alpha/b.rs", "beta", "beta/c.png", "empty.bin"] {
        assert_eq!(status(&session, path), DiffStatus::Identical, "{path}");
    }
    let summary = session.summary();
    assert_eq!(summary.differences(), 0);
    assert_eq!(summary.status_text(), "Same:6");
}

#[test]
fn file_versus_directory_is_content_different() {
    let (_tmp, left, right) = pair();
    write(&left.join("thing"), b"a file");
    write(&right.join("thing/inside.txt"), b"a dir");

    let session = compare(&left, &right);

    let node = session.tree().get("thing").unwrap();
    assert_eq!(node.status, DiffStatus::ContentDifferent);
    assert_eq!(node.left, Presence::File);
    assert_eq!(node.right, Presence::Directory);
    assert!(!node.is_container());
}

#[test]
fn one_sided_directory_is_listed_lazily() {
    let (_tmp, left, right) = pair();
    write(&left.join("extra/one.txt"), b"1");
    write(&left.join("extra/two.txt"), b"2");

    let session = compare(&left, &right);

    let extra = session.tree().get("extra").unwrap();
    assert_eq!(extra.status, DiffStatus::OnlyLeft);
    assert_eq!(extra.scan_state, ScanState::Done);
    assert!(extra.children.is_empty());

    assert!(session.expand("extra"));
    assert_eq!(status(&session, "extra/one.txt"), DiffStatus::OnlyLeft);
    let rows = session.visible_rows();
    let names: Vec<&str> = rows.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["extra", "one.txt", "two.txt"]);
}

#[test]
fn root_files_are_compared_directly() {
    let tmp = TempDir::new().unwrap();
    let left = tmp.path().join("a.bin");
    let right = tmp.path().join("b.bin");
    write(&left, b"same bytes");
    write(&right, b"same bytes");

    let session = compare(&left, &right);
    let root = session.tree().snapshot(NodeIndex::ROOT).unwrap();
    assert_eq!(root.status, DiffStatus::Identical);
    assert_eq!(root.left, Presence::File);
    assert!(session.visible_rows().is_empty());
}

#[test]
fn missing_right_root_makes_everything_only_left() {
    let tmp = TempDir::new().unwrap();
    let left = tmp.path().join("left");
    write(&left.join("a.txt"), b"a");

    let session = compare(&left, &tmp.path().join("does-not-exist"));

    assert_eq!(root_status(&session), DiffStatus::OnlyLeft);
    assert_eq!(status(&session, "a.txt"), DiffStatus::OnlyLeft);
}

#[test]
fn file_pair_resolves_absolute_paths() {
    let (_tmp, left, right) = pair();
    write(&left.join("sub/f.txt"), b"1");
    write(&right.join("sub/f.txt"), b"2");

    let session = compare(&left, &right);
    let index = session.tree().lookup("sub/f.txt").unwrap();
    let (l, r) = session.file_pair(index).unwrap();
    assert_eq!(l, left.join("sub/f.txt"));
    assert_eq!(r, right.join("sub/f.txt"));

    let dir = session.tree().lookup("sub").unwrap();
    assert!(session.file_pair(dir).is_none());
}

#[test]
fn refresh_picks_up_changes_and_vanished_entries() {
    let (_tmp, left, right) = pair();
    for root in [&left, &right] {
        write(&root.join("keep.txt"), b"same");
        write(&root.join("doomed.txt"), b"bye");
    }

    let session = compare(&left, &right);
    assert_eq!(root_status(&session), DiffStatus::Identical);
    let keep = session.tree().lookup("keep.txt").unwrap();
    let doomed = session.tree().lookup("doomed.txt").unwrap();

    write(&right.join("keep.txt"), b"diff");
    fs::remove_file(left.join("doomed.txt")).unwrap();
    fs::remove_file(right.join("doomed.txt")).unwrap();

    session.refresh();
    assert!(session.wait_until_complete(Duration::from_secs(30)));

    // Same arena slot, new verdict.
    assert_eq!(session.tree().lookup("keep.txt"), Some(keep));
    assert_eq!(status(&session, "keep.txt"), DiffStatus::ContentDifferent);

    // The vanished entry keeps its slot but drops out of the comparison.
    let gone = session.tree().snapshot(doomed).unwrap();
    assert!(gone.is_vanished());
    assert!(gone.error.is_none());
    assert!(session.visible_rows().iter().all(|r| r.node != doomed));
    assert_eq!(root_status(&session), DiffStatus::ContainsDifference);
    assert_eq!(session.stats().errors, 0);
}

#[test]
fn deleting_an_entry_on_both_sides_leaves_identical_trees() {
    let (_tmp, left, right) = pair();
    for root in [&left, &right] {
        write(&root.join("keep.txt"), b"same");
        write(&root.join("sub/tmp.txt"), b"scratch");
    }
    write(&left.join("sub/tmp.txt"), b"scratcH");

    let session = compare(&left, &right);
    assert_eq!(root_status(&session), DiffStatus::ContainsDifference);

    fs::remove_file(left.join("sub/tmp.txt")).unwrap();
    fs::remove_file(right.join("sub/tmp.txt")).unwrap();

    // Twice: a node already marked gone must stay out of the next scan too.
    for _ in 0..2 {
        session.refresh();
        assert!(session.wait_until_complete(Duration::from_secs(30)));

        assert_eq!(root_status(&session), DiffStatus::Identical);
        assert_eq!(status(&session, "sub"), DiffStatus::Identical);
        assert_eq!(session.stats().errors, 0);
        let summary = session.summary();
        assert_eq!(summary.errors, 0);
        assert_eq!(summary.differences(), 0);
        assert_eq!(summary.status_text(), "Same:2");
    }
}

#[cfg(target_os = "linux")]
#[test]
fn names_that_are_not_utf8_compare_by_their_raw_bytes() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let (_tmp, left, right) = pair();
    let same = OsStr::from_bytes(b"a\xff");
    let look_alike = OsStr::from_bytes(b"a\xfe");
    write(&left.join(same), b"contents");
    write(&right.join(same), b"contents");
    write(&left.join("sub").join(look_alike), b"x");
    write(&right.join("sub").join(same), b"x");

    let session = compare(&left, &right);

    let root = session.tree().snapshot(NodeIndex::ROOT).unwrap();
    let file = session.tree().snapshot(root.children[same]).unwrap();
    assert_eq!(file.name, "a\u{FFFD}");
    assert_eq!(file.status, DiffStatus::Identical);
    assert!(file.error.is_none());

    // Two names with the same display form are still two entries.
    let sub = session.tree().get("sub").unwrap();
    assert_eq!(sub.children.len(), 2);
    assert_eq!(session.tree().snapshot(sub.children[look_alike]).unwrap().status, DiffStatus::OnlyLeft);
    assert_eq!(session.tree().snapshot(sub.children[same]).unwrap().status, DiffStatus::OnlyRight);
    assert_eq!(session.stats().errors, 0);

    let (l, r) = session.file_pair(root.children[same]).unwrap();
    assert_eq!(l, left.join(same));
    assert_eq!(r, right.join(same));
}

#[cfg(unix)]
#[test]
fn symlink_cycle_is_reported_not_followed() {
    use std::os::unix::fs::symlink;

    let (_tmp, left, right) = pair();
    for root in [&left, &right] {
        write(&root.join("a.txt"), b"a");
        symlink(root, root.join("loop")).unwrap();
    }

    let session = compare(&left, &right);

    let looped = session.tree().get("loop").unwrap();
    assert_eq!(looped.status, DiffStatus::Error);
    assert_eq!(looped.error.unwrap().kind, ErrorKind::CyclicLink);
    assert!(session.tree().get("loop/a.txt").is_none());
    assert_eq!(status(&session, "a.txt"), DiffStatus::Identical);
    assert_eq!(root_status(&session), DiffStatus::ContainsDifference);
}

#[test]
fn cancel_stops_the_session() {
    let (_tmp, left, right) = pair();
    for root in [&left, &right] {
        for i in 0..20 {
            write(&root.join(format!("d{i}/f.txt")), b"data");
        }
    }

    let config = CompareConfig {
        worker_count: 2,
        ..CompareConfig::default()
    };
    let session = ComparisonSession::start(&left, &right, config);
    session.cancel();
    let version = session.current_version();

    std::thread::sleep(Duration::from_millis(100));
    assert!(session.is_cancelled());
    assert_eq!(session.current_version(), version);
    assert!(!session.wait_until_complete(Duration::from_millis(10)));
}
