//! Timed retention store for rendered artifacts.
//!
//! Rendered documents are written into a single directory under sanitized,
//! collision-free filenames, served back on request, and reclaimed by a
//! background sweep once they outlive the retention window. Retrieval
//! treats the filename as hostile input: traversal sequences are rejected
//! before any filesystem access, and the resolved path must canonicalize
//! into the store directory.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use cardcomply_shared::{CardComplyError, Result};

/// Maximum sanitized-label length in a generated filename.
const LABEL_MAX_CHARS: usize = 30;

/// Random hex chars appended to guarantee filename uniqueness.
const SUFFIX_HEX_CHARS: usize = 6;

/// Only files with this suffix are subject to the sweep.
const ARTIFACT_EXTENSION: &str = ".docx";

// ---------------------------------------------------------------------------
// RetrieveOutcome
// ---------------------------------------------------------------------------

/// Result of a retrieval request against an untrusted filename.
#[derive(Debug)]
pub enum RetrieveOutcome {
    /// The artifact exists and its bytes were read.
    Found(Vec<u8>),
    /// Filename contains traversal sequences or path separators.
    InvalidName,
    /// Resolved path escapes the retention store directory.
    Denied,
    /// No such artifact (never written, or already swept).
    NotFound,
}

// ---------------------------------------------------------------------------
// RetentionStore
// ---------------------------------------------------------------------------

/// Directory-backed artifact store with a bounded artifact lifetime.
#[derive(Debug, Clone)]
pub struct RetentionStore {
    dir: PathBuf,
    retention: Duration,
}

impl RetentionStore {
    /// Open (creating if needed) a retention store at `dir`.
    pub fn open(dir: impl Into<PathBuf>, retention: Duration) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| CardComplyError::io(&dir, e))?;
        info!(dir = %dir.display(), retention_secs = retention.as_secs(), "retention store open");
        Ok(Self { dir, retention })
    }

    /// The store directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Store artifact bytes under a filename derived from `human_label`.
    ///
    /// The label is reduced to an allow-list of characters, capped in
    /// length, and suffixed with random hex so identical labels never
    /// collide; concurrent stores need no locking.
    #[instrument(skip(self, bytes), fields(len = bytes.len()))]
    pub fn store(&self, bytes: &[u8], human_label: &str) -> Result<String> {
        let filename = format!(
            "{}_{}{ARTIFACT_EXTENSION}",
            sanitize_label(human_label),
            random_suffix()
        );

        let path = self.dir.join(&filename);
        std::fs::write(&path, bytes).map_err(|e| CardComplyError::io(&path, e))?;

        debug!(%filename, "artifact stored");
        Ok(filename)
    }

    /// Retrieve an artifact by caller-supplied filename.
    ///
    /// Name validation happens first, unconditionally, before any
    /// filesystem access; only then is the path resolved and checked to
    /// canonicalize inside the store directory.
    pub fn retrieve(&self, filename: &str) -> RetrieveOutcome {
        if filename.is_empty()
            || filename.contains("..")
            || filename.contains('/')
            || filename.contains('\\')
        {
            return RetrieveOutcome::InvalidName;
        }

        let path = self.dir.join(filename);

        // Canonicalization also establishes existence: a missing file
        // cannot be canonicalized, and a symlink resolves to its target.
        let canonical = match path.canonicalize() {
            Ok(p) => p,
            Err(_) => return RetrieveOutcome::NotFound,
        };

        let store_dir = match self.dir.canonicalize() {
            Ok(p) => p,
            Err(_) => return RetrieveOutcome::NotFound,
        };

        if canonical.parent() != Some(store_dir.as_path()) {
            return RetrieveOutcome::Denied;
        }

        match std::fs::read(&canonical) {
            Ok(bytes) => RetrieveOutcome::Found(bytes),
            // Raced with a sweep deletion: an already-modeled outcome.
            Err(_) => RetrieveOutcome::NotFound,
        }
    }

    /// Run one sweep cycle now. Returns the number of artifacts deleted.
    pub fn sweep_once(&self) -> usize {
        self.sweep_once_at(SystemTime::now())
    }

    /// Run one sweep cycle against the given clock.
    ///
    /// Deletes every `.docx` artifact whose modification age exceeds the
    /// retention window. Per-file failures are logged and skipped; a
    /// failure to list the directory ends the cycle without deleting
    /// anything. Never fatal.
    #[instrument(skip_all)]
    pub fn sweep_once_at(&self, now: SystemTime) -> usize {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %self.dir.display(), error = %e, "sweep: cannot list store");
                return 0;
            }
        };

        let mut deleted = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };

            if !name.ends_with(ARTIFACT_EXTENSION) || !path.is_file() {
                continue;
            }

            let modified = match entry.metadata().and_then(|m| m.modified()) {
                Ok(t) => t,
                Err(e) => {
                    warn!(%name, error = %e, "sweep: cannot stat, skipping");
                    continue;
                }
            };

            let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
            if age <= self.retention {
                continue;
            }

            match std::fs::remove_file(&path) {
                Ok(()) => {
                    info!(%name, age_secs = age.as_secs(), "sweep: deleted expired artifact");
                    deleted += 1;
                }
                Err(e) => {
                    warn!(%name, error = %e, "sweep: delete failed, continuing");
                }
            }
        }

        deleted
    }
}

/// Reduce a human label to filename-safe characters.
fn sanitize_label(label: &str) -> String {
    let safe: String = label
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '_' | '-'))
        .collect();

    let collapsed = safe.trim().replace(' ', "_");
    let truncated: String = collapsed.chars().take(LABEL_MAX_CHARS).collect();

    if truncated.is_empty() {
        "artifact".to_string()
    } else {
        truncated
    }
}

fn random_suffix() -> String {
    Uuid::new_v4().simple().to_string()[..SUFFIX_HEX_CHARS].to_string()
}

// ---------------------------------------------------------------------------
// Background sweeper
// ---------------------------------------------------------------------------

/// Spawn the periodic sweep as an abortable background task.
///
/// The returned handle is the shutdown hook: aborting it stops the loop.
/// The loop body cannot terminate the process — each cycle is `sweep_once`,
/// which swallows its own failures.
pub fn spawn_sweeper(store: RetentionStore, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it so a fresh store is
        // not swept at startup.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let deleted = store.sweep_once();
            debug!(deleted, "sweep cycle complete");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in_tempdir() -> (tempfile::TempDir, RetentionStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store =
            RetentionStore::open(dir.path(), Duration::from_secs(24 * 3600)).expect("open store");
        (dir, store)
    }

    #[test]
    fn store_sanitizes_label_and_appends_suffix() {
        let (_dir, store) = store_in_tempdir();
        let filename = store
            .store(b"bytes", "My Model: v1.0 (final)")
            .expect("store");

        assert!(filename.ends_with(".docx"));
        assert!(filename.starts_with("My_Model_v10_final_"));
        assert!(!filename.contains('/'));
        assert!(!filename.contains(':'));
    }

    #[test]
    fn long_labels_truncate_to_cap() {
        let (_dir, store) = store_in_tempdir();
        let filename = store.store(b"x", &"a".repeat(100)).expect("store");
        // 30-char label + '_' + 6 hex + ".docx"
        assert_eq!(filename.len(), 30 + 1 + 6 + 5);
    }

    #[test]
    fn empty_label_gets_fallback_name() {
        let (_dir, store) = store_in_tempdir();
        let filename = store.store(b"x", "///???").expect("store");
        assert!(filename.starts_with("artifact_"));
    }

    #[test]
    fn identical_labels_produce_distinct_retrievable_files() {
        let (_dir, store) = store_in_tempdir();
        let first = store.store(b"one", "compliance doc").expect("store");
        let second = store.store(b"two", "compliance doc").expect("store");

        assert_ne!(first, second);
        assert!(matches!(
            store.retrieve(&first),
            RetrieveOutcome::Found(bytes) if bytes == b"one"
        ));
        assert!(matches!(
            store.retrieve(&second),
            RetrieveOutcome::Found(bytes) if bytes == b"two"
        ));
    }

    #[test]
    fn traversal_names_rejected_before_filesystem_access() {
        let (_dir, store) = store_in_tempdir();

        assert!(matches!(
            store.retrieve("../../etc/passwd"),
            RetrieveOutcome::InvalidName
        ));
        assert!(matches!(
            store.retrieve("a/b.docx"),
            RetrieveOutcome::InvalidName
        ));
        assert!(matches!(
            store.retrieve(r"a\b.docx"),
            RetrieveOutcome::InvalidName
        ));
        assert!(matches!(store.retrieve(""), RetrieveOutcome::InvalidName));
    }

    #[test]
    fn missing_artifact_is_not_found() {
        let (_dir, store) = store_in_tempdir();
        assert!(matches!(
            store.retrieve("ghost_abc123.docx"),
            RetrieveOutcome::NotFound
        ));
    }

    /// Backdate a stored artifact's mtime by `age`.
    fn backdate(store: &RetentionStore, filename: &str, age: Duration) {
        let file = std::fs::File::options()
            .write(true)
            .open(store.dir().join(filename))
            .expect("open artifact");
        file.set_modified(SystemTime::now() - age).expect("set mtime");
    }

    #[test]
    fn sweep_deletes_expired_and_keeps_fresh() {
        let (_dir, store) = store_in_tempdir();
        let old = store.store(b"old", "old report").expect("store");
        let fresh = store.store(b"new", "new report").expect("store");

        backdate(&store, &old, Duration::from_secs(25 * 3600));
        backdate(&store, &fresh, Duration::from_secs(3600));

        let deleted = store.sweep_once();
        assert_eq!(deleted, 1);
        assert!(matches!(store.retrieve(&old), RetrieveOutcome::NotFound));
        assert!(matches!(store.retrieve(&fresh), RetrieveOutcome::Found(_)));
    }

    #[test]
    fn sweep_ignores_non_docx_files() {
        let (dir, store) = store_in_tempdir();
        std::fs::write(dir.path().join("notes.txt"), b"keep me").expect("write");

        let deleted = store.sweep_once_at(SystemTime::now() + Duration::from_secs(48 * 3600));
        assert_eq!(deleted, 0);
        assert!(dir.path().join("notes.txt").exists());
    }

    #[tokio::test]
    async fn sweeper_task_is_abortable() {
        let (_dir, store) = store_in_tempdir();
        let handle = spawn_sweeper(store, Duration::from_secs(3600));
        handle.abort();
        assert!(handle.await.unwrap_err().is_cancelled());
    }
}
