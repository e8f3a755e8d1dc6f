//! Timestamped file snapshots under `.ripple/backups`, newest first

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use ripple_core::{backup_dir, normalize_path, stable_hash};
use serde::Serialize;

use crate::error::EditError;

/// File in each slot naming the project path it belongs to.
const ORIGIN_FILE: &str = "origin";
const BACKUP_EXT: &str = "bak";
const ID_FORMAT: &str = "%Y%m%dT%H%M%S%6fZ";

/// One snapshot of a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Backup {
    pub id: String,
    /// Project-relative path of the backed-up file.
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub size: u64,
    #[serde(skip)]
    location: PathBuf,
}

#[derive(Debug, Clone)]
pub struct BackupStore {
    dir: PathBuf,
    retention: usize,
}

impl BackupStore {
    pub fn new(root: &Path, retention: usize) -> Self {
        BackupStore {
            dir: backup_dir(root),
            retention: retention.max(1),
        }
    }

    /// Directory holding every snapshot of `path`.
    fn slot(&self, path: &Path) -> PathBuf {
        let key = normalize_path(path);
        self.dir.join(format!("{:016x}", stable_hash(&["backup", &key])))
    }

    /// Snapshot `content` as the newest backup of `path`, then prune to the retention count.
    pub fn create(&self, path: &Path, content: &[u8]) -> Result<Backup, EditError> {
        let slot = self.slot(path);
        std::fs::create_dir_all(&slot).map_err(EditError::io(&slot))?;
        let origin = slot.join(ORIGIN_FILE);
        if !origin.exists() {
            std::fs::write(&origin, normalize_path(path)).map_err(EditError::io(&origin))?;
        }

        let created_at = Utc::now();
        let stamp = created_at.format(ID_FORMAT).to_string();
        let mut id = stamp.clone();
        let mut n = 0;
        while slot.join(format!("{id}.{BACKUP_EXT}")).exists() {
            n += 1;
            id = format!("{stamp}-{n}");
        }
        let location = slot.join(format!("{id}.{BACKUP_EXT}"));
        write_atomic(&location, content)?;

        let backup = Backup {
            id,
            path: PathBuf::from(normalize_path(path)),
            created_at,
            size: content.len() as u64,
            location,
        };
        tracing::debug!("Backed up {} as {}", backup.path.display(), backup.id);

        let pruned = self.prune(path)?;
        if pruned > 0 {
            tracing::debug!("Pruned {} old backups of {}", pruned, backup.path.display());
        }
        Ok(backup)
    }

    /// Backups of `path`, newest first.
    pub fn list(&self, path: &Path) -> Result<Vec<Backup>, EditError> {
        let slot = self.slot(path);
        let entries = match std::fs::read_dir(&slot) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(EditError::Io { path: slot, source }),
        };

        let mut backups = Vec::new();
        for entry in entries {
            let Ok(entry) = entry else {
                continue;
            };
            let location = entry.path();
            if location.extension().and_then(|e| e.to_str()) != Some(BACKUP_EXT) {
                continue;
            }
            let Some(id) = location.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                continue;
            };
            let Some(created_at) = parse_id(&id) else {
                continue;
            };
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            backups.push(Backup {
                id,
                path: PathBuf::from(normalize_path(path)),
                created_at,
                size,
                location,
            });
        }
        backups.sort_by(|a, b| (b.created_at, &b.id).cmp(&(a.created_at, &a.id)));
        Ok(backups)
    }

    pub fn latest(&self, path: &Path) -> Result<Backup, EditError> {
        self.list(path)?
            .into_iter()
            .next()
            .ok_or_else(|| EditError::NoBackup(path.to_path_buf()))
    }

    pub fn get(&self, path: &Path, id: &str) -> Result<Backup, EditError> {
        self.list(path)?
            .into_iter()
            .find(|b| b.id == id)
            .ok_or_else(|| EditError::UnknownBackup {
                path: path.to_path_buf(),
                id: id.to_string(),
            })
    }

    pub fn read(&self, backup: &Backup) -> Result<Vec<u8>, EditError> {
        std::fs::read(&backup.location).map_err(EditError::io(&backup.location))
    }

    /// Drop a snapshot. The slot goes too once its last snapshot is gone.
    pub fn remove(&self, backup: &Backup) -> Result<(), EditError> {
        std::fs::remove_file(&backup.location).map_err(EditError::io(&backup.location))?;
        if self.list(&backup.path)?.is_empty() {
            let slot = self.slot(&backup.path);
            if let Err(e) = std::fs::remove_dir_all(&slot) {
                tracing::debug!("Failed to remove empty backup slot {}: {}", slot.display(), e);
            }
        }
        Ok(())
    }

    fn prune(&self, path: &Path) -> Result<usize, EditError> {
        let stale: Vec<Backup> = self.list(path)?.into_iter().skip(self.retention).collect();
        for backup in &stale {
            std::fs::remove_file(&backup.location).map_err(EditError::io(&backup.location))?;
        }
        Ok(stale.len())
    }
}

fn parse_id(id: &str) -> Option<DateTime<Utc>> {
    let stamp = id.split('-').next()?;
    NaiveDateTime::parse_from_str(stamp, ID_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// Replaces a file's content. The editor writes through this seam.
pub trait ContentWriter: Send + Sync {
    fn write(&self, path: &Path, content: &[u8]) -> Result<(), EditError>;
}

/// The default writer: [`write_atomic`].
#[derive(Debug, Clone, Copy, Default)]
pub struct AtomicWriter;

impl ContentWriter for AtomicWriter {
    fn write(&self, path: &Path, content: &[u8]) -> Result<(), EditError> {
        write_atomic(path, content)
    }
}

/// Write through a temp file in the target's directory, then rename over the target.
///
/// An existing target keeps its permissions.
pub fn write_atomic(path: &Path, content: &[u8]) -> Result<(), EditError> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let permissions = match std::fs::metadata(path) {
        Ok(meta) => Some(meta.permissions()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(source) => return Err(EditError::Io { path: path.to_path_buf(), source }),
    };

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(EditError::io(path))?;
    tmp.write_all(content).map_err(EditError::io(path))?;
    if let Some(permissions) = permissions {
        tmp.as_file().set_permissions(permissions).map_err(EditError::io(path))?;
    }
    tmp.as_file().sync_all().map_err(EditError::io(path))?;
    // A failed persist drops the temp file with it.
    tmp.persist(path).map_err(|e| EditError::Io {
        path: path.to_path_buf(),
        source: e.error,
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backups_are_newest_first() {
        let root = tempfile::TempDir::new().unwrap();
        let store = BackupStore::new(root.path(), 10);
        let path = Path::new("src/app.py");

        let first = store.create(path, b"v1").unwrap();
        let second = store.create(path, b"v2").unwrap();

        let listed = store.list(path).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, second.id);
        assert_eq!(listed[1].id, first.id);
        assert_eq!(store.read(&store.latest(path).unwrap()).unwrap(), b"v2");
        assert_eq!(store.read(&store.get(path, &first.id).unwrap()).unwrap(), b"v1");
    }

    #[test]
    fn test_retention_prunes_oldest() {
        let root = tempfile::TempDir::new().unwrap();
        let store = BackupStore::new(root.path(), 2);
        let path = Path::new("a.py");
        for version in ["1", "2", "3", "4"] {
            store.create(path, version.as_bytes()).unwrap();
        }
        let contents: Vec<Vec<u8>> = store
            .list(path)
            .unwrap()
            .iter()
            .map(|b| store.read(b).unwrap())
            .collect();
        assert_eq!(contents, vec![b"4".to_vec(), b"3".to_vec()]);
    }

    #[test]
    fn test_paths_get_separate_slots() {
        let root = tempfile::TempDir::new().unwrap();
        let store = BackupStore::new(root.path(), 5);
        store.create(Path::new("a.py"), b"a").unwrap();
        assert!(store.list(Path::new("b.py")).unwrap().is_empty());
        assert!(matches!(store.latest(Path::new("b.py")), Err(EditError::NoBackup(_))));
        assert!(matches!(
            store.get(Path::new("a.py"), "19700101T000000000000Z"),
            Err(EditError::UnknownBackup { .. })
        ));
    }

    #[test]
    fn test_remove_last_backup_clears_slot() {
        let root = tempfile::TempDir::new().unwrap();
        let store = BackupStore::new(root.path(), 5);
        let backup = store.create(Path::new("a.py"), b"a").unwrap();
        store.remove(&backup).unwrap();
        assert!(store.list(Path::new("a.py")).unwrap().is_empty());
        assert!(!store.slot(Path::new("a.py")).exists());
    }

    #[test]
    fn test_write_atomic_into_missing_dir_leaves_nothing() {
        let root = tempfile::TempDir::new().unwrap();
        let target = root.path().join("missing/a.py");
        assert!(matches!(write_atomic(&target, b"x"), Err(EditError::Io { .. })));
        assert!(!root.path().join("missing").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_write_atomic_keeps_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let root = tempfile::TempDir::new().unwrap();
        let target = root.path().join("run.sh");
        std::fs::write(&target, "echo 1\n").unwrap();
        std::fs::set_permissions(&target, std::fs::Permissions::from_mode(0o755)).unwrap();

        write_atomic(&target, b"echo 2\n").unwrap();
        let mode = std::fs::metadata(&target).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o755);
        assert_eq!(std::fs::read(&target).unwrap(), b"echo 2\n");
    }

    #[test]
    fn test_id_round_trips_through_parse() {
        let now = Utc::now();
        let id = now.format(ID_FORMAT).to_string();
        assert_eq!(parse_id(&id).unwrap().timestamp_micros(), now.timestamp_micros());
        assert!(parse_id("origin").is_none());
    }
}
