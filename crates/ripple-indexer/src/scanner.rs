//! Repository scanning: walk, hash and extract in parallel, then merge into the graph

use std::collections::{BTreeSet, HashMap};
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use rayon::prelude::*;
use ripple_core::{GraphStore, LinkStats, ScanSettings, SourceFile, content_hash, normalize_path};
use serde::Serialize;

use crate::error::ScanError;
use crate::extractor::{Extraction, SymbolExtractor};
use crate::parser_pool::ParserPool;

/// Bytes inspected for a NUL when deciding whether a file is binary.
const BINARY_PROBE_LEN: usize = 8 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    Binary,
    TooLarge { size: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedFile {
    pub path: PathBuf,
    #[serde(flatten)]
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Content could not be parsed; the file was indexed through the lexical fallback.
    Parse,
    /// Content could not be read; the file keeps its previous contribution.
    Io,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileFailure {
    pub path: PathBuf,
    pub kind: FailureKind,
    pub message: String,
}

/// Everything a scan changed or could not handle. Paths are relative to the root.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChangeReport {
    pub added: Vec<PathBuf>,
    pub modified: Vec<PathBuf>,
    pub removed: Vec<PathBuf>,
    pub unchanged: usize,
    pub skipped: Vec<SkippedFile>,
    pub failures: Vec<FileFailure>,
    /// Set when edges were rebuilt.
    pub link: Option<LinkStats>,
    pub cancelled: bool,
}

impl ChangeReport {
    pub fn has_changes(&self) -> bool {
        !(self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty())
    }
}

#[derive(Debug)]
pub struct ScanOutcome {
    pub graph: GraphStore,
    pub report: ChangeReport,
}

/// Effect of re-indexing a single path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileChange {
    Added,
    Modified,
    Unchanged,
    Removed,
    Skipped(SkipReason),
}

/// A file found by the walk.
struct Candidate {
    path: PathBuf,
    absolute: PathBuf,
}

/// Per-file result of the parallel phase.
enum Scanned {
    Unchanged,
    Indexed { file: SourceFile, extraction: Extraction },
    Skipped(SkipReason),
    Unreadable(String),
}

pub struct RepositoryScanner {
    root: PathBuf,
    settings: ScanSettings,
    ignore: GlobSet,
    extractor: SymbolExtractor,
    cancel: Arc<AtomicBool>,
}

impl RepositoryScanner {
    pub fn new(root: &Path, settings: ScanSettings) -> Result<Self, ScanError> {
        if !root.is_dir() {
            return Err(ScanError::RootMissing(root.to_path_buf()));
        }
        let mut builder = GlobSetBuilder::new();
        for pattern in &settings.ignore {
            builder.add(Glob::new(pattern)?);
        }
        Ok(RepositoryScanner {
            root: root.to_path_buf(),
            ignore: builder.build()?,
            extractor: SymbolExtractor::new(ParserPool::new(settings.max_workers)),
            settings,
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn with_extractor(mut self, extractor: SymbolExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn extractor(&self) -> &SymbolExtractor {
        &self.extractor
    }

    /// Flag checked between files; setting it makes the running scan return the previous graph.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Bring `previous` up to date with the tree on disk.
    ///
    /// Files whose hash is unchanged keep their cached symbols and references.
    /// Extraction runs in parallel; the merge below is the only graph writer.
    pub fn scan(&self, previous: GraphStore) -> Result<ScanOutcome, ScanError> {
        let started = std::time::Instant::now();
        let mut report = ChangeReport::default();

        let (candidates, walk_skipped) = self.walk();
        report.skipped.extend(walk_skipped);

        let known: HashMap<String, String> = previous
            .files()
            .map(|f| (normalize_path(&f.path), f.hash.clone()))
            .collect();

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.settings.max_workers.max(1))
            .thread_name(|i| format!("ripple-scan-{i}"))
            .build()?;
        let results: Vec<(PathBuf, Scanned)> = pool.install(|| {
            candidates
                .par_iter()
                .filter_map(|candidate| {
                    if self.cancel.load(Ordering::Relaxed) {
                        return None;
                    }
                    let cached = known.get(&normalize_path(&candidate.path)).map(String::as_str);
                    Some((candidate.path.clone(), self.scan_one(candidate, cached)))
                })
                .collect()
        });

        if self.cancel.swap(false, Ordering::Relaxed) {
            tracing::info!("Scan cancelled; keeping previous graph");
            report.skipped.clear();
            report.cancelled = true;
            return Ok(ScanOutcome { graph: previous, report });
        }

        let mut graph = previous;
        let mut seen = BTreeSet::new();
        for (path, scanned) in results {
            let key = normalize_path(&path);
            match scanned {
                Scanned::Unchanged => {
                    seen.insert(key);
                    report.unchanged += 1;
                }
                Scanned::Indexed { file, extraction } => {
                    seen.insert(key.clone());
                    if let Some(message) = &extraction.failure {
                        tracing::debug!("Indexed {} with the lexical fallback: {}", key, message);
                        report.failures.push(FileFailure {
                            path: path.clone(),
                            kind: FailureKind::Parse,
                            message: message.clone(),
                        });
                    }
                    if known.contains_key(&key) {
                        report.modified.push(path);
                    } else {
                        report.added.push(path);
                    }
                    graph.replace_file(file, extraction.symbols)?;
                }
                Scanned::Skipped(reason) => report.skipped.push(SkippedFile { path, reason }),
                Scanned::Unreadable(message) => {
                    tracing::warn!("Failed to read {}: {}", key, message);
                    // A file that exists but cannot be read keeps what we knew about it.
                    if known.contains_key(&key) {
                        seen.insert(key);
                    }
                    report.failures.push(FileFailure {
                        path,
                        kind: FailureKind::Io,
                        message,
                    });
                }
            }
        }

        let mut stale: Vec<PathBuf> = graph
            .files()
            .filter(|f| !seen.contains(&normalize_path(&f.path)))
            .map(|f| f.path.clone())
            .collect();
        stale.sort();
        for path in stale {
            graph.remove_file(&path);
            report.removed.push(path);
        }

        report.added.sort();
        report.modified.sort();
        report.skipped.sort_by(|a, b| a.path.cmp(&b.path));
        report.failures.sort_by(|a, b| a.path.cmp(&b.path));

        if report.has_changes() {
            report.link = Some(graph.relink());
        }

        tracing::info!(
            "Scanned {} in {:?}: {} added, {} modified, {} removed, {} unchanged",
            self.root.display(),
            started.elapsed(),
            report.added.len(),
            report.modified.len(),
            report.removed.len(),
            report.unchanged
        );
        Ok(ScanOutcome { graph, report })
    }

    /// Re-index one path (relative to the root) and relink if anything changed.
    pub fn rescan_file(&self, graph: &mut GraphStore, path: &Path) -> Result<FileChange, ScanError> {
        let relative = self.relative(path);
        let absolute = self.root.join(&relative);
        let previous_hash = graph.file(&relative).map(|f| f.hash.clone());

        let change = if !absolute.is_file() || self.is_ignored(&relative) {
            match graph.remove_file(&relative) {
                Some(_) => FileChange::Removed,
                None => FileChange::Unchanged,
            }
        } else {
            let candidate = Candidate {
                path: relative.clone(),
                absolute,
            };
            match self.scan_one(&candidate, previous_hash.as_deref()) {
                Scanned::Unchanged => FileChange::Unchanged,
                Scanned::Indexed { file, extraction } => {
                    graph.replace_file(file, extraction.symbols)?;
                    if previous_hash.is_some() {
                        FileChange::Modified
                    } else {
                        FileChange::Added
                    }
                }
                Scanned::Skipped(reason) => {
                    graph.remove_file(&relative);
                    FileChange::Skipped(reason)
                }
                Scanned::Unreadable(message) => {
                    return Err(ScanError::Io {
                        path: relative,
                        source: std::io::Error::other(message),
                    });
                }
            }
        };

        if change != FileChange::Unchanged {
            let stats = graph.relink();
            tracing::debug!("Rescanned {}: {:?}, {} edges", relative.display(), change, stats.edges);
        }
        Ok(change)
    }

    fn relative(&self, path: &Path) -> PathBuf {
        let path = path.strip_prefix(&self.root).unwrap_or(path);
        PathBuf::from(normalize_path(path))
    }

    fn is_ignored(&self, relative: &Path) -> bool {
        if self.ignore.is_match(relative) {
            return true;
        }
        relative.components().any(|c| match c {
            Component::Normal(name) => self.ignore.is_match(Path::new(name)),
            _ => false,
        })
    }

    /// Regular files under the root, sorted by relative path, plus files skipped for size.
    fn walk(&self) -> (Vec<Candidate>, Vec<SkippedFile>) {
        let mut builder = WalkBuilder::new(&self.root);
        builder
            .hidden(true)
            .git_ignore(self.settings.respect_gitignore)
            .git_exclude(self.settings.respect_gitignore)
            .git_global(false)
            .require_git(false)
            .follow_links(false);

        let root = self.root.clone();
        let ignore = self.ignore.clone();
        builder.filter_entry(move |entry| {
            let Ok(relative) = entry.path().strip_prefix(&root) else {
                return true;
            };
            if relative.as_os_str().is_empty() {
                return true;
            }
            let name_ignored = entry
                .file_name()
                .to_str()
                .is_some_and(|name| ignore.is_match(name));
            !(name_ignored || ignore.is_match(relative))
        });

        let mut candidates = Vec::new();
        let mut skipped = Vec::new();
        for result in builder.build() {
            let entry = match result {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("Failed to read entry: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }
            let absolute = entry.path().to_path_buf();
            let path = self.relative(&absolute);
            if let Ok(meta) = entry.metadata() {
                if meta.len() > self.settings.max_file_size {
                    tracing::debug!("Skipping large file {} ({} bytes)", path.display(), meta.len());
                    skipped.push(SkippedFile {
                        path,
                        reason: SkipReason::TooLarge { size: meta.len() },
                    });
                    continue;
                }
            }
            candidates.push(Candidate { path, absolute });
        }

        candidates.sort_by(|a, b| a.path.cmp(&b.path));
        tracing::debug!("Found {} candidate files under {}", candidates.len(), self.root.display());
        (candidates, skipped)
    }

    fn scan_one(&self, candidate: &Candidate, cached_hash: Option<&str>) -> Scanned {
        let content = match read_limited(&candidate.absolute, self.settings.max_file_size) {
            Ok(Some(content)) => content,
            Ok(None) => {
                let size = std::fs::metadata(&candidate.absolute).map(|m| m.len()).unwrap_or(0);
                return Scanned::Skipped(SkipReason::TooLarge { size });
            }
            Err(e) => return Scanned::Unreadable(e.to_string()),
        };
        if is_binary(&content) {
            return Scanned::Skipped(SkipReason::Binary);
        }

        let hash = content_hash(&content);
        if cached_hash == Some(hash.as_str()) {
            return Scanned::Unchanged;
        }

        let extraction = self.extractor.extract(&candidate.path, &content);
        let file = SourceFile {
            path: candidate.path.clone(),
            hash,
            scanned_at: Utc::now(),
            language: extraction.language,
            symbols: Vec::new(),
            references: extraction.references.clone(),
            line_count: extraction.line_count,
            size: content.len() as u64,
        };
        Scanned::Indexed { file, extraction }
    }
}

/// Read a whole file, or `None` if it grew past `limit` since the walk.
fn read_limited(path: &Path, limit: u64) -> std::io::Result<Option<Vec<u8>>> {
    let file = std::fs::File::open(path)?;
    let mut content = Vec::new();
    file.take(limit.saturating_add(1)).read_to_end(&mut content)?;
    if content.len() as u64 > limit {
        return Ok(None);
    }
    Ok(Some(content))
}

fn is_binary(content: &[u8]) -> bool {
    content[..content.len().min(BINARY_PROBE_LEN)].contains(&0)
}
