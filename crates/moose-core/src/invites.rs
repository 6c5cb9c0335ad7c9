//! Durable set of channels the bot was invited to.
//!
//! The on-disk file is a JSON array of channel names. Every change rewrites
//! the whole snapshot through a temp file + rename, so a crash leaves either
//! the old or the new complete set on disk.

use std::{
    collections::{BTreeSet, HashSet},
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::Arc,
};

use parking_lot::{Mutex, RwLock};
use tracing::{error, info};

use crate::{errors::Error, Result};

/// Writes a complete snapshot to `path`. Implementations must either replace
/// the file entirely or leave it untouched.
pub trait SnapshotWriter: Send + Sync {
    fn write_snapshot(&self, path: &Path, contents: &[u8]) -> Result<()>;
}

/// Temp file in the target directory, fsync, then atomic rename.
#[derive(Clone, Copy, Debug, Default)]
pub struct AtomicFileWriter;

impl SnapshotWriter for AtomicFileWriter {
    fn write_snapshot(&self, path: &Path, contents: &[u8]) -> Result<()> {
        let dir = parent_dir(path);
        // Dropping the temp file on any early return removes it.
        let mut tmp = tempfile::Builder::new()
            .prefix(".invite.")
            .suffix(".json")
            .tempfile_in(dir)?;
        tmp.write_all(contents)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| Error::Io(e.error))?;
        sync_dir(dir);
        Ok(())
    }
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}

#[cfg(unix)]
fn sync_dir(dir: &Path) {
    // Best-effort: makes the rename itself durable on filesystems that need it.
    if let Ok(d) = fs::File::open(dir) {
        let _ = d.sync_all();
    }
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) {}

enum Change {
    Add,
    Remove,
}

pub struct InviteStore {
    path: PathBuf,
    channels: RwLock<HashSet<String>>,
    // Serializes the whole read-modify-persist sequence.
    write_lock: Mutex<()>,
    writer: Arc<dyn SnapshotWriter>,
}

impl InviteStore {
    /// Load the invite file, creating it with `[]` when missing.
    ///
    /// Any error here is fatal for startup.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        Self::open_with_writer(path, Arc::new(AtomicFileWriter))
    }

    pub fn open_with_writer(
        path: impl Into<PathBuf>,
        writer: Arc<dyn SnapshotWriter>,
    ) -> Result<Self> {
        let path = path.into();
        if path.as_os_str().is_empty() || path.file_name().is_none() {
            return Err(Error::Config(format!(
                "invalid invite file path: {}",
                path.display()
            )));
        }

        if !path.exists() {
            fs::create_dir_all(parent_dir(&path))?;
            writer.write_snapshot(&path, b"[]")?;
            info!(path = %path.display(), "created empty invite file");
        }

        let txt = fs::read_to_string(&path)?;
        let list: Vec<String> = serde_json::from_str(&txt).map_err(|e| {
            Error::Config(format!(
                "invite file {} is not a JSON array of strings: {e}",
                path.display()
            ))
        })?;

        Ok(Self {
            path,
            channels: RwLock::new(list.into_iter().collect()),
            write_lock: Mutex::new(()),
            writer,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Membership check; does not wait for an in-flight write.
    pub fn contains(&self, channel: &str) -> bool {
        self.channels.read().contains(channel)
    }

    pub fn snapshot(&self) -> BTreeSet<String> {
        self.channels.read().iter().cloned().collect()
    }

    /// Invited channels merged with the statically configured ones.
    pub fn union(&self, configured: &[String]) -> BTreeSet<String> {
        let mut all = self.snapshot();
        all.extend(configured.iter().cloned());
        all
    }

    /// Returns `Ok(false)` when the channel was already present (nothing written).
    pub fn add(&self, channel: &str) -> Result<bool> {
        self.apply(Change::Add, channel)
    }

    /// Returns `Ok(false)` when the channel was absent (nothing written).
    pub fn remove(&self, channel: &str) -> Result<bool> {
        self.apply(Change::Remove, channel)
    }

    fn apply(&self, change: Change, channel: &str) -> Result<bool> {
        let _guard = self.write_lock.lock();

        let snapshot = {
            let mut set = self.channels.write();
            let changed = match change {
                Change::Add => set.insert(channel.to_string()),
                Change::Remove => set.remove(channel),
            };
            if !changed {
                return Ok(false);
            }
            let mut list: Vec<&String> = set.iter().collect();
            list.sort();
            serde_json::to_vec(&list)
        };

        let persisted = snapshot
            .map_err(Error::from)
            .and_then(|bytes| self.writer.write_snapshot(&self.path, &bytes));

        if let Err(e) = persisted {
            error!(
                path = %self.path.display(),
                channel,
                error = %e,
                "failed to save invites; rolling back"
            );
            let mut set = self.channels.write();
            match change {
                Change::Add => set.remove(channel),
                Change::Remove => set.insert(channel.to_string()),
            };
            return Err(e);
        }

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FailingWriter {
        calls: AtomicUsize,
    }

    impl SnapshotWriter for FailingWriter {
        fn write_snapshot(&self, _path: &Path, _contents: &[u8]) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk full",
            )))
        }
    }

    fn read_list(path: &Path) -> BTreeSet<String> {
        let txt = fs::read_to_string(path).unwrap();
        serde_json::from_str::<Vec<String>>(&txt)
            .unwrap()
            .into_iter()
            .collect()
    }

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn creates_missing_file_with_empty_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/invites.json");

        let store = InviteStore::open(&path).unwrap();
        assert!(store.snapshot().is_empty());
        assert_eq!(fs::read_to_string(&path).unwrap(), "[]");
    }

    #[test]
    fn rejects_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("invites.json");
        fs::write(&path, r#"{"not": "a list"}"#).unwrap();
        assert!(matches!(InviteStore::open(&path), Err(Error::Config(_))));

        fs::write(&path, "[1, 2]").unwrap();
        assert!(InviteStore::open(&path).is_err());
    }

    #[test]
    fn add_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("invites.json");

        let store = InviteStore::open(&path).unwrap();
        assert!(store.add("#a").unwrap());
        assert!(store.contains("#a"));
        drop(store);

        let reloaded = InviteStore::open(&path).unwrap();
        assert_eq!(reloaded.snapshot(), set(&["#a"]));
    }

    #[test]
    fn writes_full_snapshot_and_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("invites.json");

        let store = InviteStore::open(&path).unwrap();
        store.add("#b").unwrap();
        store.add("#a").unwrap();
        store.add("#c").unwrap();
        store.remove("#b").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), r##"["#a","#c"]"##);
        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .flatten()
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["invites.json".to_string()]);
    }

    #[test]
    fn failed_persist_rolls_back_memory_and_keeps_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("invites.json");
        fs::write(&path, r##"["#keep"]"##).unwrap();

        let writer = Arc::new(FailingWriter {
            calls: AtomicUsize::new(0),
        });
        let store = InviteStore::open_with_writer(&path, writer.clone()).unwrap();

        assert!(store.add("#new").is_err());
        assert!(!store.contains("#new"));
        assert!(store.remove("#keep").is_err());
        assert!(store.contains("#keep"));

        assert_eq!(writer.calls.load(Ordering::SeqCst), 2);
        assert_eq!(store.snapshot(), set(&["#keep"]));
        assert_eq!(fs::read_to_string(&path).unwrap(), r##"["#keep"]"##);
    }

    #[test]
    fn failed_rename_leaves_target_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("invites.json");
        let store = InviteStore::open(&path).unwrap();

        // A non-empty directory at the target path makes the rename fail.
        fs::remove_file(&path).unwrap();
        fs::create_dir(&path).unwrap();
        fs::write(path.join("marker"), "x").unwrap();

        assert!(store.add("#a").is_err());
        assert!(!store.contains("#a"));
        assert!(path.join("marker").exists());
        let leftovers = fs::read_dir(dir.path())
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().starts_with(".invite."))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn removing_absent_channel_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("invites.json");
        let store = InviteStore::open(&path).unwrap();
        store.add("#a").unwrap();
        let before = fs::read_to_string(&path).unwrap();

        assert!(!store.remove("#missing").unwrap());
        assert!(!store.add("#a").unwrap());

        assert_eq!(fs::read_to_string(&path).unwrap(), before);
        assert_eq!(read_list(&path), set(&["#a"]));
    }

    #[test]
    fn union_merges_configured_channels_without_persisting_them() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("invites.json");
        let store = InviteStore::open(&path).unwrap();
        store.add("#invited").unwrap();

        let joined = store.union(&["#static".to_string(), "#invited".to_string()]);
        assert_eq!(joined, set(&["#invited", "#static"]));
        assert_eq!(read_list(&path), set(&["#invited"]));
    }

    #[test]
    fn concurrent_mutations_do_not_lose_updates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("invites.json");
        let store = Arc::new(InviteStore::open(&path).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    store.add(&format!("#c{i}")).unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let expected: BTreeSet<String> = (0..8).map(|i| format!("#c{i}")).collect();
        assert_eq!(store.snapshot(), expected);
        assert_eq!(read_list(&path), expected);
    }
}
