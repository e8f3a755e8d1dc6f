//! Safe file editing: conflict detection, backups, atomic writes and rollback

pub mod backup;
pub mod editor;
pub mod error;
pub mod lock;
pub mod validate;


pub use backup::{AtomicWriter, Backup, BackupStore, ContentWriter, write_atomic};
pub use editor::{
    AppliedEdit, BackupSelector, CommitReport, EditOperation, EditType, Preflight, ProposedEdit, RollbackReport,
    SafeEditor, ValidatedEdit,
};
pub use error::EditError;
pub use lock::{PathGuard, PathLocks};
pub use validate::{EditValidator, ValidationOutcome, ValidationResult, ValidationStatus};
