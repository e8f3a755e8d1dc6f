//! Safe editing: propose, validate, apply, then commit or roll back
//!
//! Each stage is its own type, so an edit can only move forward:
//! `SafeEditor::propose` -> [`ProposedEdit`] -> [`ValidatedEdit`] -> [`AppliedEdit`]
//! -> [`CommitReport`] or [`RollbackReport`]. The edit holds an exclusive lock on
//! its path from `propose` until it is committed, aborted or dropped.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use ripple_core::{
    ChangeKind, DiffEngine, EdgeKind, EditSettings, GraphError, Hunk, ImpactAnalyzer, ImpactSet, NodeId, RefTarget,
    RiskLevel, SharedGraph, Symbol, content_hash, normalize_path,
};
use ripple_indexer::{FileChange, RepositoryScanner};
use serde::Serialize;

use crate::backup::{AtomicWriter, Backup, BackupStore, ContentWriter};
use crate::error::EditError;
use crate::lock::{PathGuard, PathLocks};
use crate::validate::{EditValidator, ValidationOutcome, ValidationStatus};

/// A change to one file, computed against the content whose hash is `base_hash`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditOperation {
    pub path: PathBuf,
    pub base_hash: String,
    pub hunks: Vec<Hunk>,
}

impl EditOperation {
    pub fn new(path: impl Into<PathBuf>, base_hash: impl Into<String>, hunks: Vec<Hunk>) -> Self {
        EditOperation {
            path: path.into(),
            base_hash: base_hash.into(),
            hunks,
        }
    }

    /// The edit turning `old` into `new`, based on `old`.
    pub fn from_contents(path: impl Into<PathBuf>, old: &str, new: &str) -> Self {
        Self::new(path, content_hash(old.as_bytes()), DiffEngine::new().diff(old, new))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EditType {
    Add,
    Modify,
    Delete,
}

impl EditType {
    fn classify(old: &str, new: &str) -> Self {
        match (old.trim().is_empty(), new.trim().is_empty()) {
            (true, false) => EditType::Add,
            (false, true) => EditType::Delete,
            _ => EditType::Modify,
        }
    }
}

/// Which backup `rollback` restores.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BackupSelector {
    #[default]
    Latest,
    Id(String),
}

/// What the edit does to the file's symbols and who depends on them.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Preflight {
    pub removed_symbols: Vec<String>,
    pub added_symbols: Vec<String>,
    /// Removed symbols visible outside the file.
    pub removed_public: Vec<String>,
    pub removed_imports: Vec<String>,
    pub impacts: Vec<ImpactSet>,
}

impl Preflight {
    pub fn risk(&self) -> RiskLevel {
        self.impacts
            .iter()
            .map(ImpactSet::risk)
            .max()
            .unwrap_or(RiskLevel::Low)
    }

    pub fn affected_files(&self) -> BTreeSet<String> {
        self.impacts.iter().flat_map(ImpactSet::affected_files).collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CommitReport {
    pub path: PathBuf,
    pub edit_type: EditType,
    pub backup_id: String,
    pub change: FileChange,
    pub validation: ValidationStatus,
    pub warnings: Vec<String>,
    pub risk: RiskLevel,
}

#[derive(Debug, Clone, Serialize)]
pub struct RollbackReport {
    pub path: PathBuf,
    pub backup_id: String,
    pub restored_bytes: u64,
    /// Graph update for the restored file; `None` when the edit was never committed.
    pub change: Option<FileChange>,
    /// Backups of the path left after this one was consumed.
    pub remaining_backups: usize,
}

/// Entry point for edits within one project root.
pub struct SafeEditor {
    root: PathBuf,
    graph: SharedGraph,
    scanner: Arc<RepositoryScanner>,
    backups: BackupStore,
    locks: PathLocks,
    validator: Option<Arc<dyn EditValidator>>,
    writer: Arc<dyn ContentWriter>,
    strict: bool,
    max_depth: usize,
    diff: DiffEngine,
}

impl SafeEditor {
    pub fn new(graph: SharedGraph, scanner: Arc<RepositoryScanner>, settings: &EditSettings) -> Self {
        let root = scanner.root().to_path_buf();
        SafeEditor {
            backups: BackupStore::new(&root, settings.backup_retention),
            root,
            graph,
            scanner,
            locks: PathLocks::new(),
            validator: None,
            writer: Arc::new(AtomicWriter),
            strict: settings.strict,
            max_depth: ripple_core::impact::DEFAULT_MAX_DEPTH,
            diff: DiffEngine::new(),
        }
    }

    pub fn with_validator(mut self, validator: impl EditValidator + 'static) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// Replace how edited and restored content reaches disk.
    pub fn with_writer(mut self, writer: impl ContentWriter + 'static) -> Self {
        self.writer = Arc::new(writer);
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth.max(1);
        self
    }

    /// Share locks with other editors over the same tree.
    pub fn with_locks(mut self, locks: PathLocks) -> Self {
        self.locks = locks;
        self
    }

    pub fn graph(&self) -> &SharedGraph {
        &self.graph
    }

    pub fn backups(&self) -> &BackupStore {
        &self.backups
    }

    pub fn locks(&self) -> &PathLocks {
        &self.locks
    }

    /// Start an edit. Fails fast, without touching disk, if the file changed since `base_hash`.
    pub fn propose(&self, op: EditOperation) -> Result<ProposedEdit<'_>, EditError> {
        let path = self.relative(&op.path)?;
        let guard = self.lock(&path)?;

        let current = self.read(&path)?;
        let actual = content_hash(&current);
        if actual != op.base_hash {
            return Err(EditError::Conflict {
                path,
                expected: op.base_hash,
                actual,
            });
        }

        let old = String::from_utf8(current).map_err(|_| EditError::NotText(path.clone()))?;
        let new = self.diff.apply(&old, &op.hunks).map_err(|source| EditError::InvalidHunks {
            path: path.clone(),
            source,
        })?;
        let edit_type = EditType::classify(&old, &new);
        let preflight = self.preflight(&path, &old, &new);

        tracing::debug!(
            "Proposed {:?} edit to {} ({} hunks, {} risk)",
            edit_type,
            path.display(),
            op.hunks.len(),
            preflight.risk()
        );
        Ok(ProposedEdit {
            editor: self,
            _guard: guard,
            path,
            base_hash: actual,
            old,
            new,
            hunks: op.hunks,
            edit_type,
            preflight,
        })
    }

    /// Restore a backup of `path` and consume it. Never creates a backup itself.
    pub fn rollback(&self, path: &Path, selector: BackupSelector) -> Result<RollbackReport, EditError> {
        let path = self.relative(path)?;
        let _guard = self.lock(&path)?;

        let backup = match selector {
            BackupSelector::Latest => self.backups.latest(&path)?,
            BackupSelector::Id(id) => self.backups.get(&path, &id)?,
        };
        let content = self.restore(&path, &backup)?;

        let change = {
            let mut graph = self.graph.write();
            self.scanner.rescan_file(&mut graph, &path)?
        };
        let remaining_backups = self.backups.list(&path)?.len();
        tracing::info!("Rolled back {} to backup {}", path.display(), backup.id);
        Ok(RollbackReport {
            path,
            backup_id: backup.id,
            restored_bytes: content as u64,
            change: Some(change),
            remaining_backups,
        })
    }

    /// Backups of `path`, newest first.
    pub fn list_backups(&self, path: &Path) -> Result<Vec<Backup>, EditError> {
        let path = self.relative(path)?;
        self.backups.list(&path)
    }

    fn restore(&self, path: &Path, backup: &Backup) -> Result<usize, EditError> {
        let content = self.backups.read(backup)?;
        self.writer.write(&self.root.join(path), &content)?;
        self.backups.remove(backup)?;
        Ok(content.len())
    }

    /// Take `path` for this edit. A path held by a live edit is refused rather than waited on.
    fn lock(&self, path: &Path) -> Result<PathGuard, EditError> {
        self.locks
            .try_acquire(path)
            .ok_or_else(|| EditError::Locked(path.to_path_buf()))
    }

    fn relative(&self, path: &Path) -> Result<PathBuf, EditError> {
        let relative = if path.is_absolute() {
            path.strip_prefix(&self.root)
                .map_err(|_| EditError::OutsideRoot(path.to_path_buf()))?
        } else {
            path
        };
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes || relative.as_os_str().is_empty() {
            return Err(EditError::OutsideRoot(path.to_path_buf()));
        }
        Ok(PathBuf::from(normalize_path(relative)))
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>, EditError> {
        let absolute = self.root.join(path);
        std::fs::read(&absolute).map_err(EditError::io(path))
    }

    fn preflight(&self, path: &Path, old: &str, new: &str) -> Preflight {
        let extractor = self.scanner.extractor();
        let before = extractor.extract(path, old.as_bytes());
        let after = extractor.extract(path, new.as_bytes());

        let by_name = |symbols: &[Symbol]| -> BTreeMap<String, Symbol> {
            symbols
                .iter()
                .map(|s| (s.qualified_name.clone(), s.clone()))
                .collect()
        };
        let old_symbols = by_name(&before.symbols);
        let new_symbols = by_name(&after.symbols);
        let removed: Vec<&Symbol> = old_symbols
            .iter()
            .filter(|(name, _)| !new_symbols.contains_key(*name))
            .map(|(_, s)| s)
            .collect();
        let added: Vec<&Symbol> = new_symbols
            .iter()
            .filter(|(name, _)| !old_symbols.contains_key(*name))
            .map(|(_, s)| s)
            .collect();

        let imports = |refs: &[ripple_core::RawReference]| -> BTreeSet<String> {
            refs.iter()
                .filter(|r| r.kind == EdgeKind::Import)
                .filter_map(|r| match &r.target {
                    RefTarget::Module { spec } => Some(spec.clone()),
                    RefTarget::Name { .. } => None,
                })
                .collect()
        };
        let new_imports = imports(&after.references);
        let removed_imports: Vec<String> = imports(&before.references)
            .into_iter()
            .filter(|spec| !new_imports.contains(spec))
            .collect();

        let file = NodeId::for_file(path);
        let mut targets: Vec<(NodeId, ChangeKind)> = Vec::new();
        match (removed.as_slice(), added.as_slice()) {
            ([old], [new]) if old.kind == new.kind => targets.push((old.id, ChangeKind::Rename)),
            _ => {
                targets.extend(removed.iter().map(|s| (s.id, ChangeKind::RemoveSymbol)));
                if !added.is_empty() {
                    targets.push((file, ChangeKind::AddSymbol));
                }
                if removed.is_empty() && added.is_empty() {
                    targets.push((file, ChangeKind::ModifyBody));
                }
            }
        }

        let graph = self.graph.read();
        let analyzer = ImpactAnalyzer::new(&graph).with_max_depth(self.max_depth);
        let mut impacts = Vec::new();
        for (node, kind) in targets {
            match analyzer.analyze(node, kind) {
                Ok(impact) => impacts.push(impact),
                // Not indexed yet: nothing can depend on it.
                Err(GraphError::UnknownNode(_)) => {}
                Err(e) => tracing::debug!("Preflight impact failed for {}: {}", path.display(), e),
            }
        }

        Preflight {
            removed_symbols: removed.iter().map(|s| s.qualified_name.clone()).collect(),
            added_symbols: added.iter().map(|s| s.qualified_name.clone()).collect(),
            removed_public: removed
                .iter()
                .filter(|s| s.is_public())
                .map(|s| s.qualified_name.clone())
                .collect(),
            removed_imports,
            impacts,
        }
    }
}

/// An edit whose base matched the file on disk. Nothing has been written yet.
pub struct ProposedEdit<'e> {
    editor: &'e SafeEditor,
    _guard: PathGuard,
    path: PathBuf,
    base_hash: String,
    old: String,
    new: String,
    hunks: Vec<Hunk>,
    edit_type: EditType,
    preflight: Preflight,
}

impl<'e> ProposedEdit<'e> {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn edit_type(&self) -> EditType {
        self.edit_type
    }

    pub fn preflight(&self) -> &Preflight {
        &self.preflight
    }

    pub fn old_content(&self) -> &str {
        &self.old
    }

    pub fn new_content(&self) -> &str {
        &self.new
    }

    pub fn hunks(&self) -> &[Hunk] {
        &self.hunks
    }

    /// Unified diff of the edit.
    pub fn render(&self) -> String {
        let name = normalize_path(&self.path);
        self.editor.diff.render_file(&name, &name, &self.hunks)
    }

    /// Run the validation hook and the compatibility checks.
    ///
    /// Hook failures are warnings unless the editor is strict, in which case
    /// they fail the edit.
    pub fn validate(self) -> Result<ValidatedEdit<'e>, EditError> {
        let mut warnings = Vec::new();
        let status = match &self.editor.validator {
            None => ValidationStatus::Skipped,
            Some(validator) => {
                let result = validator.validate(&self.path, &self.new);
                warnings.extend(result.messages.iter().cloned());
                if result.ok {
                    ValidationStatus::Passed
                } else {
                    ValidationStatus::Failed
                }
            }
        };

        if status == ValidationStatus::Failed && self.editor.strict {
            return Err(EditError::ValidationFailed {
                path: self.path,
                messages: warnings,
            });
        }

        for name in &self.preflight.removed_public {
            warnings.push(format!("public symbol `{name}` removed"));
        }
        for spec in &self.preflight.removed_imports {
            warnings.push(format!("import `{spec}` removed"));
        }
        let breaking: usize = self.preflight.impacts.iter().map(|i| i.breaking().count()).sum();
        if breaking > 0 {
            warnings.push(format!("{breaking} dependents may break"));
        }
        if status == ValidationStatus::Failed {
            tracing::warn!("Validation failed for {}; continuing with warnings", self.path.display());
        }

        Ok(ValidatedEdit {
            proposed: self,
            validation: ValidationOutcome { status, warnings },
        })
    }
}

/// A validated edit, ready to write.
pub struct ValidatedEdit<'e> {
    proposed: ProposedEdit<'e>,
    validation: ValidationOutcome,
}

impl<'e> ValidatedEdit<'e> {
    pub fn validation(&self) -> &ValidationOutcome {
        &self.validation
    }

    pub fn preflight(&self) -> &Preflight {
        &self.proposed.preflight
    }

    /// Back up the current content, then atomically replace the file.
    ///
    /// The base hash is checked again first. If the write fails, the file is
    /// untouched and the backup taken for it is discarded.
    pub fn apply(self) -> Result<AppliedEdit<'e>, EditError> {
        let proposed = &self.proposed;
        let editor = proposed.editor;

        let current = editor.read(&proposed.path)?;
        let actual = content_hash(&current);
        if actual != proposed.base_hash {
            return Err(EditError::Conflict {
                path: proposed.path.clone(),
                expected: proposed.base_hash.clone(),
                actual,
            });
        }

        let backup = editor.backups.create(&proposed.path, &current)?;
        if let Err(e) = editor.writer.write(&editor.root.join(&proposed.path), proposed.new.as_bytes()) {
            if let Err(cleanup) = editor.backups.remove(&backup) {
                tracing::warn!("Failed to discard backup {}: {}", backup.id, cleanup);
            }
            return Err(e);
        }

        tracing::info!("Applied edit to {} (backup {})", proposed.path.display(), backup.id);
        Ok(AppliedEdit {
            validated: self,
            backup,
        })
    }
}

/// An edit written to disk but not yet reflected in the graph.
pub struct AppliedEdit<'e> {
    validated: ValidatedEdit<'e>,
    backup: Backup,
}

impl AppliedEdit<'_> {
    pub fn backup(&self) -> &Backup {
        &self.backup
    }

    pub fn path(&self) -> &Path {
        &self.validated.proposed.path
    }

    /// Finalise: re-index the edited file and release its lock.
    pub fn commit(self) -> Result<CommitReport, EditError> {
        let proposed = &self.validated.proposed;
        let editor = proposed.editor;
        let change = {
            let mut graph = editor.graph.write();
            editor.scanner.rescan_file(&mut graph, &proposed.path)?
        };
        tracing::debug!("Committed edit to {}: {:?}", proposed.path.display(), change);

        Ok(CommitReport {
            path: proposed.path.clone(),
            edit_type: proposed.edit_type,
            backup_id: self.backup.id.clone(),
            change,
            validation: self.validated.validation.status,
            warnings: self.validated.validation.warnings.clone(),
            risk: proposed.preflight.risk(),
        })
    }

    /// Undo before committing: restore the backup just taken and consume it.
    pub fn abort(self) -> Result<RollbackReport, EditError> {
        let proposed = &self.validated.proposed;
        let editor = proposed.editor;
        let restored = editor.restore(&proposed.path, &self.backup)?;
        tracing::info!("Aborted edit to {}", proposed.path.display());

        Ok(RollbackReport {
            path: proposed.path.clone(),
            backup_id: self.backup.id.clone(),
            restored_bytes: restored as u64,
            change: None,
            remaining_backups: editor.backups.list(&proposed.path)?.len(),
        })
    }
}
