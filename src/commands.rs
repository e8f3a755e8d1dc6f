//! CLI command implementations

use anyhow::{Context, bail};
use ripple_core::{
    CacheLoad, ChangeKind, DiffEngine, FoundReference, GraphStore, Hunk, ImpactAnalyzer, ImpactSet, ReferenceResolver,
    RippleConfig, SharedGraph, ensure_cache_dir, file_relationships, graph_cache_path, project_summary,
};
use ripple_editor::{BackupSelector, CommitReport, EditOperation, Preflight, SafeEditor};
use ripple_indexer::{ChangeReport, RepositoryScanner};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// How results are printed.
#[derive(Debug, Clone, Copy)]
pub struct Output {
    pub json: bool,
}

impl Output {
    /// Print `value` as JSON, or run `human` for the plain-text form.
    fn emit<T: Serialize>(&self, value: &T, human: impl FnOnce()) -> anyhow::Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            human();
        }
        Ok(())
    }
}

/// Canonical root plus its configuration.
struct Project {
    root: PathBuf,
    config: RippleConfig,
}

impl Project {
    fn open(root: &Path) -> anyhow::Result<Self> {
        let root = root
            .canonicalize()
            .with_context(|| format!("Repository root not found: {}", root.display()))?;
        let config = RippleConfig::load(&root)?;
        Ok(Project { root, config })
    }

    fn scanner(&self) -> anyhow::Result<RepositoryScanner> {
        Ok(RepositoryScanner::new(&self.root, self.config.scan.clone())?)
    }

    /// Load the cached graph (or start empty), bring it up to date, and persist it.
    fn refresh(&self, scanner: &RepositoryScanner, full: bool) -> anyhow::Result<(GraphStore, ChangeReport)> {
        let cache_path = graph_cache_path(&self.root);
        let previous = if full {
            tracing::info!("Full rebuild requested");
            GraphStore::new()
        } else {
            match GraphStore::load(&cache_path) {
                CacheLoad::Loaded(graph) => graph,
                CacheLoad::Missing => {
                    tracing::info!("No graph cache yet, indexing {}", self.root.display());
                    GraphStore::new()
                }
                // Already logged when the cache was discarded.
                CacheLoad::Discarded { .. } => GraphStore::new(),
            }
        };
        let fresh = previous.file_count() == 0;

        let outcome = scanner.scan(previous)?;
        if fresh || outcome.report.has_changes() {
            self.save(&outcome.graph)?;
        }
        Ok((outcome.graph, outcome.report))
    }

    fn graph(&self) -> anyhow::Result<GraphStore> {
        let scanner = self.scanner()?;
        Ok(self.refresh(&scanner, false)?.0)
    }

    fn save(&self, graph: &GraphStore) -> anyhow::Result<()> {
        ensure_cache_dir(&self.root)?;
        graph.save(&graph_cache_path(&self.root))?;
        Ok(())
    }

    /// `path` relative to the root when given as an absolute path inside it.
    fn relative<'p>(&self, path: &'p Path) -> &'p Path {
        path.strip_prefix(&self.root).unwrap_or(path)
    }

    fn editor(&self, strict: bool) -> anyhow::Result<SafeEditor> {
        let scanner = self.scanner()?;
        let (graph, _) = self.refresh(&scanner, false)?;
        Ok(SafeEditor::new(SharedGraph::new(graph), Arc::new(scanner), &self.config.edit)
            .with_strict(strict || self.config.edit.strict)
            .with_max_depth(self.config.impact.max_depth))
    }
}

pub fn scan(root: &Path, full: bool, out: Output) -> anyhow::Result<()> {
    let project = Project::open(root)?;
    let scanner = project.scanner()?;
    let (graph, report) = project.refresh(&scanner, full)?;

    tracing::info!("Indexed {} files, {} edges", graph.file_count(), graph.edge_count());
    out.emit(&report, || {
        println!(
            "{} added, {} modified, {} removed, {} unchanged",
            report.added.len(),
            report.modified.len(),
            report.removed.len(),
            report.unchanged
        );
        if let Some(link) = &report.link {
            println!("{} edges linked, {} references unresolved", link.edges, link.unresolved);
        }
        for skipped in &report.skipped {
            println!("skipped {} ({:?})", skipped.path.display(), skipped.reason);
        }
        for failure in &report.failures {
            println!("{:?} failure in {}: {}", failure.kind, failure.path.display(), failure.message);
        }
    })
}

pub fn resolve(root: &Path, text: &str, out: Output) -> anyhow::Result<()> {
    let project = Project::open(root)?;
    let graph = project.graph()?;
    let resolved = ReferenceResolver::new(&graph).with_root(&project.root).resolve(text);

    out.emit(&resolved, || {
        for found in &resolved.found {
            match found {
                FoundReference::File { token, path, node, matched } => {
                    let note = if node.is_none() { ", not indexed" } else { "" };
                    println!("{} -> {} ({:?}{})", token.raw, path.display(), matched, note);
                }
                FoundReference::Symbol {
                    token,
                    qualified_name,
                    path,
                    line,
                    matched,
                    ambiguous_with,
                    ..
                } => {
                    println!("{} -> {}:{} {} ({:?})", token.raw, path.display(), line, qualified_name, matched);
                    if !ambiguous_with.is_empty() {
                        println!("    also: {}", ambiguous_with.join(", "));
                    }
                }
            }
        }
        for missing in &resolved.missing {
            println!("{} -> {}", missing.token.raw, missing.reason);
        }
    })
}

pub fn impact(root: &Path, target: &str, kind: ChangeKind, depth: Option<usize>, out: Output) -> anyhow::Result<()> {
    let project = Project::open(root)?;
    let graph = project.graph()?;

    let mut resolved = ReferenceResolver::new(&graph).resolve(target);
    if let Some(missing) = resolved.missing.first() {
        bail!("{}: {}", missing.token.raw, missing.reason);
    }
    if resolved.found.is_empty() {
        bail!("Expected an `@path` or `#symbol` target, got `{}`", target);
    }
    let found = resolved.found.remove(0);
    let node = found
        .node()
        .with_context(|| format!("{} is not indexed", found.path().display()))?;

    let depth = depth.unwrap_or(project.config.impact.max_depth);
    let set = ImpactAnalyzer::new(&graph).with_max_depth(depth).analyze(node, kind)?;
    out.emit(&set, || print_impact(&set))
}

fn print_impact(set: &ImpactSet) {
    println!(
        "{} on {}: {} risk (score {:.2})",
        set.change,
        set.target_label,
        set.risk(),
        set.score()
    );
    for entry in &set.entries {
        println!("  [{}] {} via {} ({})", entry.distance, entry.label, entry.via, entry.reason);
    }
    let files = set.affected_files();
    if !files.is_empty() {
        println!("Affected files: {}", files.into_iter().collect::<Vec<_>>().join(", "));
    }
    for recommendation in set.recommendations() {
        println!("- {}", recommendation);
    }
}

#[derive(Serialize)]
struct DiffOutput<'a> {
    hunks: &'a [Hunk],
    unified: &'a str,
}

pub fn diff(old: &Path, new: &Path, out: Output) -> anyhow::Result<()> {
    let old_text = std::fs::read_to_string(old).with_context(|| format!("Failed to read {}", old.display()))?;
    let new_text = std::fs::read_to_string(new).with_context(|| format!("Failed to read {}", new.display()))?;

    let engine = DiffEngine::new();
    let hunks = engine.diff(&old_text, &new_text);
    let unified = engine.render_file(&old.display().to_string(), &new.display().to_string(), &hunks);
    out.emit(
        &DiffOutput {
            hunks: &hunks,
            unified: &unified,
        },
        || print!("{}", unified),
    )
}

#[derive(Serialize)]
struct EditOutput<'a> {
    diff: &'a str,
    preflight: &'a Preflight,
    report: &'a CommitReport,
}

pub fn edit(root: &Path, path: &Path, from: &Path, strict: bool, out: Output) -> anyhow::Result<()> {
    let project = Project::open(root)?;
    let target = project.root.join(path);
    let old = std::fs::read_to_string(&target).with_context(|| format!("Failed to read {}", target.display()))?;
    let new = std::fs::read_to_string(from).with_context(|| format!("Failed to read {}", from.display()))?;
    if old == new {
        println!("No changes to {}", path.display());
        return Ok(());
    }

    let editor = project.editor(strict)?;
    let proposed = editor.propose(EditOperation::from_contents(path, &old, &new))?;
    let diff = proposed.render();
    let preflight = proposed.preflight().clone();

    let report = proposed.validate()?.apply()?.commit()?;
    project.save(&editor.graph().read())?;

    out.emit(
        &EditOutput {
            diff: &diff,
            preflight: &preflight,
            report: &report,
        },
        || {
            print!("{}", diff);
            for warning in &report.warnings {
                println!("warning: {}", warning);
            }
            let files = preflight.affected_files();
            if !files.is_empty() {
                println!("Affected files: {}", files.into_iter().collect::<Vec<_>>().join(", "));
            }
            println!(
                "Edited {} ({:?}, {} risk), backup {}",
                report.path.display(),
                report.edit_type,
                report.risk,
                report.backup_id
            );
        },
    )
}

pub fn rollback(root: &Path, path: &Path, id: Option<String>, out: Output) -> anyhow::Result<()> {
    let project = Project::open(root)?;
    let editor = project.editor(false)?;
    let selector = id.map_or(BackupSelector::Latest, BackupSelector::Id);

    let report = editor.rollback(path, selector)?;
    project.save(&editor.graph().read())?;

    out.emit(&report, || {
        println!(
            "Restored {} from backup {} ({} bytes, {} backups left)",
            report.path.display(),
            report.backup_id,
            report.restored_bytes,
            report.remaining_backups
        );
    })
}

pub fn backups(root: &Path, path: &Path, out: Output) -> anyhow::Result<()> {
    let project = Project::open(root)?;
    let backups = project.editor(false)?.list_backups(path)?;

    out.emit(&backups, || {
        if backups.is_empty() {
            println!("No backups of {}", path.display());
        }
        for backup in &backups {
            println!("{}  {}  {} bytes", backup.id, backup.created_at.to_rfc3339(), backup.size);
        }
    })
}

pub fn relations(root: &Path, path: &Path, out: Output) -> anyhow::Result<()> {
    let project = Project::open(root)?;
    let graph = project.graph()?;
    let relations =
        file_relationships(&graph, project.relative(path)).with_context(|| format!("{} is not indexed", path.display()))?;

    out.emit(&relations, || {
        println!("{}", relations.path.display());
        for link in &relations.imports {
            println!("  -> {} ({} references)", link.target.display(), link.count);
        }
        for link in &relations.imported_by {
            println!("  <- {} ({} references)", link.source.display(), link.count);
        }
    })
}

pub fn summary(root: &Path, out: Output) -> anyhow::Result<()> {
    let project = Project::open(root)?;
    let graph = project.graph()?;
    let summary = project_summary(&graph);

    out.emit(&summary, || {
        println!("Files:   {}", summary.files);
        println!("Symbols: {}", summary.symbols);
        println!("Edges:   {}", summary.edges);
        println!("Lines:   {}", summary.total_lines);
        println!("Bytes:   {}", summary.total_bytes);
        for (language, count) in &summary.languages {
            println!("  {}: {}", language, count);
        }
    })
}

pub fn clear(root: &Path) -> anyhow::Result<()> {
    tracing::info!("Clearing cache for: {}", root.display());

    ripple_core::clear_cache(root)?;

    tracing::info!("Cache cleared");
    Ok(())
}
