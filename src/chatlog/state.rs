use crate::chatlog::cache::{CacheSnapshot, ContinuationCache};
use crate::chatlog::paths::ChatlogPaths;
use crate::error::ChatlogErrorCode;
use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::PathBuf;
use tempfile::NamedTempFile;
use tracing::warn;

/// Exclusive hold on the state dir; released when dropped.
pub struct StateLock {
    file: File,
}

impl Drop for StateLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

/// Blocks until no other chatlog process is between loading and saving the cache.
pub fn lock_state(paths: &ChatlogPaths) -> Result<StateLock> {
    fs::create_dir_all(&paths.state_dir)
        .with_context(|| format!("failed to create {}", paths.state_dir.display()))?;
    let path = paths.ingest_lock_file();
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    file.lock_exclusive()
        .with_context(|| format!("failed to lock {}", path.display()))?;
    Ok(StateLock { file })
}

/// Loads the persisted cache. A snapshot that cannot be parsed is discarded
/// with a warning: losing it only means the next transcripts start new chats.
pub fn load_cache(paths: &ChatlogPaths, retention_secs: u64) -> Result<ContinuationCache> {
    let file = paths.cache_snapshot_file();
    if !file.exists() {
        return Ok(ContinuationCache::new(retention_secs));
    }

    let raw =
        fs::read_to_string(&file).with_context(|| format!("failed to read {}", file.display()))?;
    match serde_json::from_str::<CacheSnapshot>(&raw) {
        Ok(snapshot) => Ok(ContinuationCache::from_snapshot(retention_secs, snapshot)),
        Err(err) => {
            warn!(
                code = ChatlogErrorCode::E004StateCorrupt.as_str(),
                path = %file.display(),
                error = %err,
                "discarding unreadable cache snapshot"
            );
            Ok(ContinuationCache::new(retention_secs))
        }
    }
}

pub fn save_cache(paths: &ChatlogPaths, cache: &ContinuationCache) -> Result<PathBuf> {
    let file = paths.cache_snapshot_file();
    fs::create_dir_all(&paths.state_dir)
        .with_context(|| format!("failed to create {}", paths.state_dir.display()))?;
    let data = serde_json::to_string_pretty(&cache.snapshot())?;
    let mut tmp = NamedTempFile::new_in(&paths.state_dir)
        .with_context(|| format!("failed to create temp file in {}", paths.state_dir.display()))?;
    std::io::Write::write_all(&mut tmp, format!("{data}\n").as_bytes())?;
    tmp.persist(&file)
        .map_err(|err| err.error)
        .with_context(|| format!("failed to write {}", file.display()))?;
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chatlog::cache::DEFAULT_RETENTION_SECS;
    use crate::chatlog::fingerprint::fingerprint;
    use crate::chatlog::message::Message;
    use crate::store::StorageId;
    use tempfile::tempdir;

    fn test_paths(root: &std::path::Path) -> ChatlogPaths {
        ChatlogPaths {
            chatlog_home: root.to_path_buf(),
            store_dir: root.join("conversations"),
            state_dir: root.join("state"),
            logs_dir: root.join("logs"),
        }
    }

    #[test]
    fn missing_snapshot_loads_empty_cache() {
        let tmp = tempdir().expect("tempdir");
        let cache = load_cache(&test_paths(tmp.path()), DEFAULT_RETENTION_SECS).expect("load");
        assert!(cache.is_empty());
    }

    #[test]
    fn save_then_load_roundtrip() {
        let tmp = tempdir().expect("tempdir");
        let paths = test_paths(tmp.path());
        let history = vec![Message::user("Hello!"), Message::assistant("Hi")];
        let key = fingerprint(&history);

        let cache = ContinuationCache::new(DEFAULT_RETENTION_SECS);
        cache.put(key.clone(), StorageId::from("c1".to_string()), history.clone(), 7);
        save_cache(&paths, &cache).expect("save");

        let loaded = load_cache(&paths, DEFAULT_RETENTION_SECS).expect("load");
        let entry = loaded.get(&key).expect("entry");
        assert_eq!(entry.history, history);
        assert_eq!(entry.last_touched_epoch_secs, 7);
    }

    #[test]
    fn corrupt_snapshot_is_discarded() {
        let tmp = tempdir().expect("tempdir");
        let paths = test_paths(tmp.path());
        fs::create_dir_all(&paths.state_dir).expect("mkdir");
        fs::write(paths.cache_snapshot_file(), "{not json").expect("write");

        let cache = load_cache(&paths, DEFAULT_RETENTION_SECS).expect("load");
        assert!(cache.is_empty());
    }

    #[test]
    fn state_lock_can_be_retaken_after_drop() {
        let tmp = tempdir().expect("tempdir");
        let paths = test_paths(tmp.path());
        let first = lock_state(&paths).expect("first lock");
        drop(first);
        let _second = lock_state(&paths).expect("second lock");
        assert!(paths.ingest_lock_file().exists());
    }
}
