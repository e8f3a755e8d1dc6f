//! Integration tests for Ripple
//!
//! These tests drive the scanner, graph, resolver, analyzer and editor together,
//! then the `ripple` binary end to end.

use std::fs;
use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use ripple_core::{
    CacheLoad, ChangeKind, EdgeKind, EditSettings, GraphStore, ImpactAnalyzer, NodeId, ReferenceResolver,
    ScanSettings, SharedGraph, content_hash, graph_cache_path,
};
use ripple_editor::{BackupSelector, EditOperation, EditType, SafeEditor};
use ripple_indexer::{FileChange, RepositoryScanner};
use tempfile::TempDir;

const C_PY: &str = "def base():\n    return 1\n";
const B_PY: &str = "from .c import base\n\ndef middle():\n    return base()\n";
const A_PY: &str = "from .b import middle\n\ndef top():\n    return middle()\n";

fn layered_repo() -> TempDir {
    let dir = TempDir::new().unwrap();
    let pkg = dir.path().join("pkg");
    fs::create_dir_all(&pkg).unwrap();
    fs::write(pkg.join("__init__.py"), "").unwrap();
    fs::write(pkg.join("c.py"), C_PY).unwrap();
    fs::write(pkg.join("b.py"), B_PY).unwrap();
    fs::write(pkg.join("a.py"), A_PY).unwrap();
    dir
}

fn symbol(path: &str, name: &str) -> NodeId {
    NodeId::for_symbol(Path::new(path), name)
}

#[test]
fn test_scan_resolve_and_transitive_impact() {
    let repo = layered_repo();
    let scanner = RepositoryScanner::new(repo.path(), ScanSettings::default()).unwrap();
    let graph = scanner.scan(GraphStore::new()).unwrap().graph;

    let resolved = ReferenceResolver::new(&graph).resolve("look at @pkg/c.py and #base, not #nothing");
    assert_eq!(resolved.found_values(), vec!["pkg/c.py", "base"]);
    assert_eq!(resolved.missing_values(), vec!["nothing"]);

    let impact = ImpactAnalyzer::new(&graph)
        .analyze(symbol("pkg/c.py", "base"), ChangeKind::RemoveSymbol)
        .unwrap();
    assert_eq!(impact.distance_of(symbol("pkg/b.py", "middle")), Some(1));
    assert_eq!(impact.distance_of(symbol("pkg/a.py", "top")), Some(2));
    assert!(impact.affected_files().contains("pkg/a.py"));

    let shallow = ImpactAnalyzer::new(&graph)
        .with_max_depth(1)
        .analyze(symbol("pkg/c.py", "base"), ChangeKind::RemoveSymbol)
        .unwrap();
    assert!(!shallow.contains(symbol("pkg/a.py", "top")));
}

#[test]
fn test_edit_commit_rollback_keeps_graph_in_step() {
    let repo = layered_repo();
    let scanner = RepositoryScanner::new(repo.path(), ScanSettings::default()).unwrap();
    let graph = scanner.scan(GraphStore::new()).unwrap().graph;
    let editor = SafeEditor::new(SharedGraph::new(graph), Arc::new(scanner), &EditSettings::default());

    let renamed = C_PY.replace("base", "foundation");
    let proposed = editor
        .propose(EditOperation::from_contents("pkg/c.py", C_PY, &renamed))
        .unwrap();
    assert_eq!(proposed.edit_type(), EditType::Modify);
    assert!(proposed.preflight().affected_files().contains("pkg/b.py"));

    let report = proposed.validate().unwrap().apply().unwrap().commit().unwrap();
    assert_eq!(report.change, FileChange::Modified);
    assert_eq!(fs::read_to_string(repo.path().join("pkg/c.py")).unwrap(), renamed);
    {
        let graph = editor.graph().read();
        assert!(!graph.contains(symbol("pkg/c.py", "base")));
        assert!(graph.contains(symbol("pkg/c.py", "foundation")));
        assert!(graph.check_integrity().is_empty());
    }

    let rollback = editor.rollback(Path::new("pkg/c.py"), BackupSelector::Latest).unwrap();
    assert_eq!(rollback.backup_id, report.backup_id);
    assert_eq!(rollback.remaining_backups, 0);
    assert_eq!(fs::read_to_string(repo.path().join("pkg/c.py")).unwrap(), C_PY);

    let graph = editor.graph().read();
    assert!(graph.has_edge_between(symbol("pkg/b.py", "middle"), symbol("pkg/c.py", "base"), EdgeKind::Call));
    assert!(graph.check_integrity().is_empty());
}

#[test]
fn test_stale_edit_is_refused_before_touching_disk() {
    let repo = layered_repo();
    let scanner = RepositoryScanner::new(repo.path(), ScanSettings::default()).unwrap();
    let graph = scanner.scan(GraphStore::new()).unwrap().graph;
    let editor = SafeEditor::new(SharedGraph::new(graph), Arc::new(scanner), &EditSettings::default());

    let op = EditOperation::from_contents("pkg/c.py", C_PY, "def base():\n    return 2\n");
    let external = "def base():\n    return 3\n";
    fs::write(repo.path().join("pkg/c.py"), external).unwrap();

    assert!(editor.propose(op).is_err());
    assert_eq!(fs::read_to_string(repo.path().join("pkg/c.py")).unwrap(), external);
    assert!(editor.list_backups(Path::new("pkg/c.py")).unwrap().is_empty());
}

#[test]
fn test_cache_round_trip_skips_unchanged_files() {
    let repo = layered_repo();
    let scanner = RepositoryScanner::new(repo.path(), ScanSettings::default()).unwrap();
    let first = scanner.scan(GraphStore::new()).unwrap().graph;

    let cache = graph_cache_path(repo.path());
    first.save(&cache).unwrap();
    let CacheLoad::Loaded(loaded) = GraphStore::load(&cache) else {
        panic!("cache should load");
    };
    assert_eq!(loaded.file_count(), first.file_count());
    assert_eq!(loaded.edge_count(), first.edge_count());
    assert_eq!(
        loaded.file(Path::new("pkg/c.py")).unwrap().hash,
        content_hash(C_PY.as_bytes())
    );

    let rescan = scanner.scan(loaded).unwrap();
    assert!(!rescan.report.has_changes());
    assert_eq!(rescan.report.unchanged, 4);

    fs::write(&cache, "{ not json").unwrap();
    assert!(GraphStore::load(&cache).needs_full_scan());
}

fn ripple(root: &Path, args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_ripple"))
        .arg("--root")
        .arg(root)
        .args(args)
        .output()
        .expect("Failed to execute ripple")
}

fn ripple_json(root: &Path, args: &[&str]) -> serde_json::Value {
    let mut full = vec!["--json"];
    full.extend_from_slice(args);
    let output = ripple(root, &full);
    assert!(
        output.status.success(),
        "ripple {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn test_cli_invocation() {
    let output = Command::new(env!("CARGO_BIN_EXE_ripple"))
        .arg("--help")
        .output()
        .expect("Failed to execute ripple");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("ripple"));
    assert!(stdout.contains("impact"));
}

#[test]
fn test_cli_scan_resolve_impact() {
    let repo = layered_repo();

    let report = ripple_json(repo.path(), &["scan"]);
    assert_eq!(report["added"].as_array().unwrap().len(), 4);
    assert!(graph_cache_path(repo.path()).exists());

    let again = ripple_json(repo.path(), &["scan"]);
    assert_eq!(again["unchanged"], 4);

    let resolved = ripple_json(repo.path(), &["resolve", "@pkg/b.py #middle #missing"]);
    assert_eq!(resolved["found"].as_array().unwrap().len(), 2);
    assert_eq!(resolved["missing"][0]["token"]["value"], "missing");

    let impact = ripple_json(repo.path(), &["impact", "#base", "--kind", "remove-symbol"]);
    assert_eq!(impact["change"], "remove-symbol");
    let labels: Vec<&str> = impact["entries"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|e| e["label"].as_str())
        .collect();
    assert!(labels.iter().any(|l| l.contains("middle")));
    assert!(labels.iter().any(|l| l.contains("top")));

    let unknown = ripple(repo.path(), &["impact", "#nothing"]);
    assert!(!unknown.status.success());
}

#[test]
fn test_cli_edit_then_rollback() {
    let repo = layered_repo();
    let scratch = TempDir::new().unwrap();
    let replacement = scratch.path().join("c.py");
    fs::write(&replacement, "def base():\n    return 42\n").unwrap();
    let from = replacement.to_str().unwrap();

    let edit = ripple_json(repo.path(), &["edit", "pkg/c.py", "--from", from]);
    assert_eq!(edit["report"]["edit_type"], "modify");
    assert!(edit["diff"].as_str().unwrap().contains("+    return 42"));
    assert_eq!(
        fs::read_to_string(repo.path().join("pkg/c.py")).unwrap(),
        "def base():\n    return 42\n"
    );

    let backups = ripple_json(repo.path(), &["backups", "pkg/c.py"]);
    assert_eq!(backups.as_array().unwrap().len(), 1);
    let absolute = repo.path().canonicalize().unwrap().join("pkg/c.py");
    let by_absolute = ripple_json(repo.path(), &["backups", absolute.to_str().unwrap()]);
    assert_eq!(by_absolute, backups);
    let relations = ripple_json(repo.path(), &["relations", absolute.to_str().unwrap()]);
    assert_eq!(relations["path"], "pkg/c.py");

    let rollback = ripple_json(repo.path(), &["rollback", "pkg/c.py"]);
    assert_eq!(rollback["remaining_backups"], 0);
    assert_eq!(fs::read_to_string(repo.path().join("pkg/c.py")).unwrap(), C_PY);

    let none_left = ripple(repo.path(), &["rollback", "pkg/c.py"]);
    assert!(!none_left.status.success());
}

#[test]
fn test_cli_clear_removes_cache() {
    let repo = layered_repo();
    ripple_json(repo.path(), &["scan"]);
    assert!(graph_cache_path(repo.path()).exists());

    let output = ripple(repo.path(), &["clear"]);
    assert!(output.status.success());
    assert!(!graph_cache_path(repo.path()).exists());
}

#[test]
fn test_cli_rebuilds_from_corrupt_cache() {
    let repo = layered_repo();
    ripple_json(repo.path(), &["scan"]);
    fs::write(graph_cache_path(repo.path()), "{ not json").unwrap();

    let report = ripple_json(repo.path(), &["scan"]);
    assert_eq!(report["added"].as_array().unwrap().len(), 4);
    assert!(matches!(
        GraphStore::load(&graph_cache_path(repo.path())),
        CacheLoad::Loaded(_)
    ));
}
