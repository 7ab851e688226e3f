//! Persistent per-course sync state.
//!
//! The state is one small JSON file mapping course id to the remote
//! last-updated time of the version last walked. It is loaded once, mutated
//! in memory by the orchestrator, and flushed after each course. Loading is
//! fail-open: a missing or corrupt file yields an empty state.

pub mod error;
pub mod types;

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs4::fs_std::FileExt;

pub use self::error::StateError;
pub use self::types::{CourseRecord, SyncState};

pub struct StateStore {
    path: PathBuf,
    state: SyncState,
    /// Held for the store's lifetime; released when dropped.
    _lock: File,
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStore")
            .field("path", &self.path)
            .field("courses", &self.state.course.len())
            .finish_non_exhaustive()
    }
}

impl StateStore {
    /// Take the exclusive lock next to `path` and load the state.
    ///
    /// Fails fast with [`StateError::Locked`] if another instance holds the
    /// lock.
    pub fn open(path: &Path) -> Result<Self, StateError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| StateError::io(parent, e))?;
        }
        let lock_path = sibling(path, "lock");
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(|e| StateError::io(&lock_path, e))?;
        lock.try_lock_exclusive()
            .map_err(|_| StateError::Locked(lock_path.clone()))?;

        Ok(Self {
            path: path.to_path_buf(),
            state: load(path),
            _lock: lock,
        })
    }

    #[cfg(test)]
    pub fn state(&self) -> &SyncState {
        &self.state
    }

    /// True if the course was never synced or the remote copy is strictly
    /// newer than the recorded one. Equal timestamps are not stale.
    pub fn is_stale(&self, course_id: &str, remote_timestamp: i64) -> bool {
        self.state.is_stale(course_id, remote_timestamp)
    }

    /// Record a course as synced in memory. Call [`flush`](Self::flush) to
    /// persist.
    pub fn mark_synced(&mut self, course_id: &str, remote_timestamp: i64) {
        self.state
            .course
            .entry(course_id.to_string())
            .and_modify(|r| r.last_updated = remote_timestamp)
            .or_insert_with(|| CourseRecord::new(remote_timestamp));
    }

    /// Persist the in-memory state atomically: write a temp file, fsync it,
    /// then rename it over the state file.
    pub fn flush(&self) -> Result<(), StateError> {
        let json = serde_json::to_vec_pretty(&self.state)?;
        let tmp_path = sibling(&self.path, "tmp");

        let result = (|| {
            let mut tmp = File::create(&tmp_path)?;
            tmp.write_all(&json)?;
            tmp.sync_all()?;
            fs::rename(&tmp_path, &self.path)
        })();
        if let Err(e) = result {
            let _ = fs::remove_file(&tmp_path);
            return Err(StateError::io(&self.path, e));
        }
        tracing::debug!(path = %self.path.display(), "Flushed state");
        Ok(())
    }

    /// Forget all prior state. The existing file is moved aside to
    /// `<state-file>.<unix-epoch>` rather than edited, so an interrupted
    /// reset leaves the old record intact. Returns the backup location.
    pub fn reset(&mut self) -> Result<Option<PathBuf>, StateError> {
        self.state = SyncState::default();
        if !self.path.exists() {
            return Ok(None);
        }
        let epoch = chrono::Utc::now().timestamp();
        let mut backup = sibling(&self.path, &epoch.to_string());
        let mut n = 1;
        while backup.exists() {
            backup = sibling(&self.path, &format!("{}-{}", epoch, n));
            n += 1;
        }
        fs::rename(&self.path, &backup).map_err(|e| StateError::io(&self.path, e))?;
        tracing::info!("Moved previous state to {}", backup.display());
        Ok(Some(backup))
    }
}

/// Read the state at `path` without locking.
///
/// Never fails: a missing file is an empty state, and unreadable or
/// malformed content is logged and treated as empty.
pub fn load(path: &Path) -> SyncState {
    let raw = match fs::read(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No state file at {}, starting fresh", path.display());
            return SyncState::default();
        }
        Err(e) => {
            tracing::warn!(
                "Could not read state file {}: {}; treating all courses as unsynced",
                path.display(),
                e
            );
            return SyncState::default();
        }
    };
    match serde_json::from_slice(&raw) {
        Ok(state) => state,
        Err(e) => {
            tracing::warn!(
                "State file {} is corrupt ({}); treating all courses as unsynced",
                path.display(),
                e
            );
            SyncState::default()
        }
    }
}

/// `state.json` -> `state.json.<suffix>`
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::open(&dir.path().join("state.json")).unwrap();
        assert!(store.state().is_empty());
        assert!(store.is_stale("1", 0));
    }

    #[test]
    fn test_corrupt_file_fails_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "{not json").unwrap();
        let store = StateStore::open(&path).unwrap();
        assert!(store.state().is_empty());
        assert!(store.is_stale("1", 1_704_153_600));
    }

    #[test]
    fn test_staleness_is_strict() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = StateStore::open(&dir.path().join("state.json")).unwrap();
        store.mark_synced("1", 100);
        assert!(!store.is_stale("1", 99));
        assert!(!store.is_stale("1", 100));
        assert!(store.is_stale("1", 101));
        assert!(store.is_stale("2", 100));
    }

    #[test]
    fn test_flush_then_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/state.json");
        {
            let mut store = StateStore::open(&path).unwrap();
            store.mark_synced("1", 1_704_153_600);
            store.flush().unwrap();
        }
        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(
            raw,
            serde_json::json!({"course": {"1": {"lastUpdated": 1704153600}}})
        );
        assert!(!sibling(&path, "tmp").exists());

        let store = StateStore::open(&path).unwrap();
        assert!(!store.is_stale("1", 1_704_153_600));
    }

    #[test]
    fn test_flush_preserves_unknown_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(
            &path,
            r#"{"course":{"1":{"lastUpdated":1.5,"etag":"x"}},"owner":"me"}"#,
        )
        .unwrap();
        let mut store = StateStore::open(&path).unwrap();
        store.mark_synced("1", 10);
        store.flush().unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(
            raw,
            serde_json::json!({"course": {"1": {"lastUpdated": 10, "etag": "x"}}, "owner": "me"})
        );
    }

    #[test]
    fn test_second_instance_is_locked_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let _first = StateStore::open(&path).unwrap();
        assert!(matches!(
            StateStore::open(&path),
            Err(StateError::Locked(_))
        ));
    }

    #[test]
    fn test_lock_released_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        drop(StateStore::open(&path).unwrap());
        assert!(StateStore::open(&path).is_ok());
    }

    #[test]
    fn test_reset_moves_file_aside() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let original = r#"{"course":{"1":{"lastUpdated":5}}}"#;
        fs::write(&path, original).unwrap();

        let mut store = StateStore::open(&path).unwrap();
        let backup = store.reset().unwrap().unwrap();
        assert!(store.state().is_empty());
        assert!(!path.exists());
        assert_eq!(fs::read_to_string(&backup).unwrap(), original);
        assert!(backup
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("state.json."));

        // A second reset in the same second must not clobber the first backup.
        fs::write(&path, "{}").unwrap();
        let second = store.reset().unwrap().unwrap();
        assert_ne!(second, backup);
        assert_eq!(fs::read_to_string(&backup).unwrap(), original);
    }

    #[test]
    fn test_reset_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = StateStore::open(&dir.path().join("state.json")).unwrap();
        store.mark_synced("1", 1);
        assert_eq!(store.reset().unwrap(), None);
        assert!(store.state().is_empty());
    }

    #[test]
    fn test_load_without_lock() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, r#"{"course":{"9":{"lastUpdated":3}}}"#).unwrap();
        let _store = StateStore::open(&path).unwrap();
        assert_eq!(load(&path).last_synced("9"), Some(3));
    }
}
