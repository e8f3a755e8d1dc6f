//! Scanner tests over temporary repositories

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;

use ripple_core::{EdgeKind, GraphStore, NodeId, ScanSettings};
use tempfile::TempDir;

use crate::scanner::{FailureKind, FileChange, RepositoryScanner, SkipReason};

fn create_repo_with_structure(structure: &[(&str, &str)]) -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    for (path, content) in structure {
        let full_path = temp_dir.path().join(path);
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(full_path, content).unwrap();
    }
    temp_dir
}

fn scanner(root: &Path) -> RepositoryScanner {
    RepositoryScanner::new(root, ScanSettings::default()).unwrap()
}

fn paths(list: &[PathBuf]) -> Vec<&str> {
    list.iter().map(|p| p.to_str().unwrap()).collect()
}

const MODELS: &str = "class User:\n    pass\n\ndef load_user(uid):\n    return User()\n";
const VIEWS: &str = "from .models import load_user\n\ndef show(uid):\n    return load_user(uid)\n";

fn python_repo() -> TempDir {
    create_repo_with_structure(&[
        ("app/__init__.py", ""),
        ("app/models.py", MODELS),
        ("app/views.py", VIEWS),
        ("README.md", "# demo\n"),
    ])
}

#[test]
fn test_full_scan_links_across_files() {
    let repo = python_repo();
    let outcome = scanner(repo.path()).scan(GraphStore::new()).unwrap();

    assert_eq!(
        paths(&outcome.report.added),
        vec!["README.md", "app/__init__.py", "app/models.py", "app/views.py"]
    );
    assert!(outcome.report.link.is_some());

    let graph = &outcome.graph;
    assert_eq!(graph.file_count(), 4);
    let show = NodeId::for_symbol(Path::new("app/views.py"), "show");
    let load_user = NodeId::for_symbol(Path::new("app/models.py"), "load_user");
    assert!(graph.has_edge_between(show, load_user, EdgeKind::Call));
    assert!(graph.has_edge_between(
        NodeId::for_file(Path::new("app/views.py")),
        NodeId::for_file(Path::new("app/models.py")),
        EdgeKind::Import
    ));
    assert!(graph.check_integrity().is_empty());
}

#[test]
fn test_rescanning_unchanged_tree_reuses_cache() {
    let repo = python_repo();
    let scanner = scanner(repo.path());
    let first = scanner.scan(GraphStore::new()).unwrap();
    let edges = first.graph.edge_count();

    let second = scanner.scan(first.graph).unwrap();
    assert!(!second.report.has_changes());
    assert_eq!(second.report.unchanged, 4);
    assert!(second.report.link.is_none());
    assert_eq!(second.graph.edge_count(), edges);
}

#[test]
fn test_independent_scans_produce_identical_cache() {
    let repo = python_repo();
    let cache = TempDir::new().unwrap();
    let a = cache.path().join("a.json");
    let b = cache.path().join("b.json");

    scanner(repo.path()).scan(GraphStore::new()).unwrap().graph.save(&a).unwrap();
    scanner(repo.path()).scan(GraphStore::new()).unwrap().graph.save(&b).unwrap();

    let without_timestamps = |path: &Path| -> String {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .filter(|line| !line.contains("\"scannedAt\""))
            .collect::<Vec<_>>()
            .join("\n")
    };
    assert_eq!(without_timestamps(&a), without_timestamps(&b));
}

#[test]
fn test_incremental_scan_reports_changes() {
    let repo = python_repo();
    let scanner = scanner(repo.path());
    let first = scanner.scan(GraphStore::new()).unwrap();

    fs::write(repo.path().join("app/views.py"), "def show(uid):\n    return None\n").unwrap();
    fs::remove_file(repo.path().join("README.md")).unwrap();
    fs::write(repo.path().join("app/util.py"), "def helper():\n    pass\n").unwrap();

    let second = scanner.scan(first.graph).unwrap();
    assert_eq!(paths(&second.report.added), vec!["app/util.py"]);
    assert_eq!(paths(&second.report.modified), vec!["app/views.py"]);
    assert_eq!(paths(&second.report.removed), vec!["README.md"]);
    assert_eq!(second.report.unchanged, 2);

    let show = NodeId::for_symbol(Path::new("app/views.py"), "show");
    let load_user = NodeId::for_symbol(Path::new("app/models.py"), "load_user");
    assert!(!second.graph.has_edge_between(show, load_user, EdgeKind::Call));
    assert!(second.graph.file(Path::new("README.md")).is_none());
}

#[test]
fn test_deleted_file_leaves_no_dangling_edges() {
    let repo = python_repo();
    let scanner = scanner(repo.path());
    let first = scanner.scan(GraphStore::new()).unwrap();
    let load_user = NodeId::for_symbol(Path::new("app/models.py"), "load_user");
    assert!(!first.graph.edges_to(load_user).is_empty());

    fs::remove_file(repo.path().join("app/models.py")).unwrap();
    let second = scanner.scan(first.graph).unwrap();

    assert_eq!(paths(&second.report.removed), vec!["app/models.py"]);
    assert!(!second.graph.contains(load_user));
    assert!(second.graph.all_edges().all(|e| second.graph.contains(e.source) && second.graph.contains(e.target)));
    assert!(second.graph.check_integrity().is_empty());
}

#[test]
fn test_binary_and_oversized_files_are_skipped() {
    let repo = create_repo_with_structure(&[("small.py", "x = 1\n"), ("big.py", &"y = 2\n".repeat(50))]);
    fs::write(repo.path().join("logo.png"), b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR").unwrap();

    let settings = ScanSettings {
        max_file_size: 64,
        ..ScanSettings::default()
    };
    let outcome = RepositoryScanner::new(repo.path(), settings)
        .unwrap()
        .scan(GraphStore::new())
        .unwrap();

    assert_eq!(paths(&outcome.report.added), vec!["small.py"]);
    let skipped: Vec<(&str, &SkipReason)> = outcome
        .report
        .skipped
        .iter()
        .map(|s| (s.path.to_str().unwrap(), &s.reason))
        .collect();
    assert_eq!(
        skipped,
        vec![("big.py", &SkipReason::TooLarge { size: 300 }), ("logo.png", &SkipReason::Binary)]
    );
}

#[test]
fn test_ignore_patterns_and_gitignore() {
    let repo = create_repo_with_structure(&[
        ("src/main.py", "import util\n"),
        ("src/util.py", "def f():\n    pass\n"),
        ("src/schema.gen.py", "X = 1\n"),
        ("node_modules/lib/index.js", "module.exports = {};\n"),
        ("secrets.py", "TOKEN = 'x'\n"),
        (".gitignore", "secrets.py\n"),
    ]);

    let mut settings = ScanSettings::default();
    settings.ignore.push("*.gen.py".to_string());
    let outcome = RepositoryScanner::new(repo.path(), settings.clone())
        .unwrap()
        .scan(GraphStore::new())
        .unwrap();
    assert_eq!(paths(&outcome.report.added), vec!["src/main.py", "src/util.py"]);

    settings.respect_gitignore = false;
    let outcome = RepositoryScanner::new(repo.path(), settings)
        .unwrap()
        .scan(GraphStore::new())
        .unwrap();
    assert!(outcome.graph.file(Path::new("secrets.py")).is_some());
}

#[test]
fn test_cancelled_scan_keeps_previous_graph() {
    let repo = python_repo();
    let scanner = scanner(repo.path());
    let first = scanner.scan(GraphStore::new()).unwrap();
    let files = first.graph.file_count();

    fs::write(repo.path().join("app/new.py"), "def fresh():\n    pass\n").unwrap();
    scanner.cancel_handle().store(true, Ordering::Relaxed);
    let cancelled = scanner.scan(first.graph).unwrap();

    assert!(cancelled.report.cancelled);
    assert!(!cancelled.report.has_changes());
    assert_eq!(cancelled.graph.file_count(), files);

    // The flag is consumed; the next scan runs normally.
    let resumed = scanner.scan(cancelled.graph).unwrap();
    assert_eq!(paths(&resumed.report.added), vec!["app/new.py"]);
}

#[test]
fn test_unparsable_file_is_indexed_and_reported() {
    let repo = create_repo_with_structure(&[("ok.py", "def f():\n    pass\n"), ("broken.py", "import os\ndef g(:\n")]);
    let outcome = scanner(repo.path()).scan(GraphStore::new()).unwrap();

    assert_eq!(outcome.report.failures.len(), 1);
    assert_eq!(outcome.report.failures[0].path, PathBuf::from("broken.py"));
    assert_eq!(outcome.report.failures[0].kind, FailureKind::Parse);

    let broken = outcome.graph.file(Path::new("broken.py")).unwrap();
    assert!(broken.symbols.is_empty());
    assert_eq!(broken.references.len(), 1);
    assert_eq!(outcome.graph.symbols_in_file(Path::new("ok.py")).len(), 1);
}

#[test]
fn test_rescan_single_file() {
    let repo = python_repo();
    let scanner = scanner(repo.path());
    let mut graph = scanner.scan(GraphStore::new()).unwrap().graph;
    let views = Path::new("app/views.py");

    assert_eq!(scanner.rescan_file(&mut graph, views).unwrap(), FileChange::Unchanged);

    fs::write(repo.path().join(views), "def show(uid):\n    return uid\n\ndef extra():\n    pass\n").unwrap();
    assert_eq!(scanner.rescan_file(&mut graph, views).unwrap(), FileChange::Modified);
    assert_eq!(graph.symbols_in_file(views).len(), 2);

    // Absolute paths under the root are accepted too.
    fs::write(repo.path().join("app/extra.py"), "Z = 1\n").unwrap();
    let absolute = repo.path().join("app/extra.py");
    assert_eq!(scanner.rescan_file(&mut graph, &absolute).unwrap(), FileChange::Added);

    fs::remove_file(repo.path().join(views)).unwrap();
    assert_eq!(scanner.rescan_file(&mut graph, views).unwrap(), FileChange::Removed);
    assert!(graph.file(views).is_none());
    assert!(graph.check_integrity().is_empty());
}
