use crate::chatlog::fingerprint::Fingerprint;
use crate::chatlog::message::ChatHistory;
use crate::store::StorageId;
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

pub const DEFAULT_RETENTION_SECS: u64 = 48 * 60 * 60;
const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub storage_id: StorageId,
    pub history: ChatHistory,
    pub last_touched_epoch_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSnapshot {
    pub schema_version: u32,
    pub entries: BTreeMap<Fingerprint, CacheEntry>,
}

impl Default for CacheSnapshot {
    fn default() -> Self {
        Self {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            entries: BTreeMap::new(),
        }
    }
}

/// Time-bounded map from fingerprint to the conversation last seen under it.
///
/// Read-modify-write sequences on a key go through [`ContinuationCache::lock_keys`];
/// the entry map itself is only held for the duration of a single get/put.
/// Lock order is `in_flight` before `entries`.
#[derive(Debug)]
pub struct ContinuationCache {
    retention_secs: u64,
    entries: Mutex<HashMap<Fingerprint, CacheEntry>>,
    in_flight: Mutex<HashSet<Fingerprint>>,
    released: Condvar,
}

/// Holds a set of fingerprints exclusively until dropped.
#[must_use = "keys are released as soon as the guard is dropped"]
pub struct KeyGuard<'a> {
    cache: &'a ContinuationCache,
    keys: Vec<Fingerprint>,
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        let mut in_flight = self.cache.in_flight.lock();
        for key in &self.keys {
            in_flight.remove(key);
        }
        drop(in_flight);
        self.cache.released.notify_all();
    }
}

impl ContinuationCache {
    pub fn new(retention_secs: u64) -> Self {
        Self {
            retention_secs,
            entries: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashSet::new()),
            released: Condvar::new(),
        }
    }

    pub fn from_snapshot(retention_secs: u64, snapshot: CacheSnapshot) -> Self {
        let cache = Self::new(retention_secs);
        cache.entries.lock().extend(snapshot.entries);
        cache
    }

    pub fn retention_secs(&self) -> u64 {
        self.retention_secs
    }

    pub fn get(&self, key: &Fingerprint) -> Option<CacheEntry> {
        self.entries.lock().get(key).cloned()
    }

    pub fn put(&self, key: Fingerprint, storage_id: StorageId, history: ChatHistory, now: u64) {
        let entry = CacheEntry {
            storage_id,
            history,
            last_touched_epoch_secs: now,
        };
        self.entries.lock().insert(key, entry);
    }

    pub fn remove(&self, key: &Fingerprint) -> Option<CacheEntry> {
        self.entries.lock().remove(key)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Blocks until no other guard holds any of `keys`, then holds all of them.
    ///
    /// Keys are taken together, so two callers asking for overlapping sets
    /// cannot deadlock on each other.
    pub fn lock_keys(&self, keys: &[Fingerprint]) -> KeyGuard<'_> {
        let mut wanted = keys.to_vec();
        wanted.sort();
        wanted.dedup();

        let mut in_flight = self.in_flight.lock();
        while wanted.iter().any(|key| in_flight.contains(key)) {
            self.released.wait(&mut in_flight);
        }
        in_flight.extend(wanted.iter().cloned());

        KeyGuard {
            cache: self,
            keys: wanted,
        }
    }

    /// Drops entries untouched for longer than the retention window. Keys held
    /// by a guard are skipped; the next sweep picks them up if still stale.
    pub fn sweep(&self, now: u64) -> usize {
        let in_flight = self.in_flight.lock();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|key, entry| {
            in_flight.contains(key)
                || now.saturating_sub(entry.last_touched_epoch_secs) <= self.retention_secs
        });
        before - entries.len()
    }

    /// Drops every entry pointing at one of `ids`.
    pub fn forget_storage(&self, ids: &HashSet<StorageId>) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| !ids.contains(&entry.storage_id));
        before - entries.len()
    }

    pub fn snapshot(&self) -> CacheSnapshot {
        let entries = self
            .entries
            .lock()
            .iter()
            .map(|(key, entry)| (key.clone(), entry.clone()))
            .collect();
        CacheSnapshot {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            entries,
        }
    }
}

impl Default for ContinuationCache {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION_SECS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chatlog::message::Message;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::Duration;

    fn key(raw: &str) -> Fingerprint {
        Fingerprint::from(raw.to_string())
    }

    fn id(raw: &str) -> StorageId {
        StorageId::from(raw.to_string())
    }

    #[test]
    fn put_then_get_returns_entry() {
        let cache = ContinuationCache::default();
        assert!(cache.get(&key("user: hi")).is_none());

        cache.put(key("user: hi"), id("c1"), vec![Message::user("hi")], 100);
        let entry = cache.get(&key("user: hi")).expect("entry");
        assert_eq!(entry.storage_id, id("c1"));
        assert_eq!(entry.last_touched_epoch_secs, 100);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn put_overwrites_and_bumps_last_touched() {
        let cache = ContinuationCache::default();
        cache.put(key("k"), id("c1"), vec![Message::user("a")], 100);
        cache.put(key("k"), id("c1"), vec![Message::user("a"), Message::assistant("b")], 250);
        let entry = cache.get(&key("k")).expect("entry");
        assert_eq!(entry.history.len(), 2);
        assert_eq!(entry.last_touched_epoch_secs, 250);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn sweep_evicts_only_past_retention() {
        let cache = ContinuationCache::default();
        let start = 1_000_000;
        cache.put(key("old"), id("c1"), vec![Message::user("a")], start);
        cache.put(key("fresh"), id("c2"), vec![Message::user("b")], start + 3600);

        assert_eq!(cache.sweep(start + DEFAULT_RETENTION_SECS), 0);
        assert!(cache.get(&key("old")).is_some());

        assert_eq!(cache.sweep(start + DEFAULT_RETENTION_SECS + 1), 1);
        assert!(cache.get(&key("old")).is_none());
        assert!(cache.get(&key("fresh")).is_some());
    }

    #[test]
    fn sweep_skips_keys_held_by_a_guard() {
        let cache = ContinuationCache::new(10);
        cache.put(key("busy"), id("c1"), vec![Message::user("a")], 0);
        cache.put(key("idle"), id("c2"), vec![Message::user("b")], 0);

        let guard = cache.lock_keys(&[key("busy")]);
        assert_eq!(cache.sweep(100), 1);
        assert!(cache.get(&key("busy")).is_some());
        drop(guard);

        assert_eq!(cache.sweep(100), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn lock_keys_serialises_same_key() {
        let cache = Arc::new(ContinuationCache::default());
        let released = Arc::new(AtomicBool::new(false));

        let guard = cache.lock_keys(&[key("k")]);
        let waiter = {
            let cache = Arc::clone(&cache);
            let released = Arc::clone(&released);
            thread::spawn(move || {
                let _guard = cache.lock_keys(&[key("other"), key("k")]);
                released.load(Ordering::SeqCst)
            })
        };

        thread::sleep(Duration::from_millis(50));
        released.store(true, Ordering::SeqCst);
        drop(guard);
        assert!(waiter.join().expect("join"), "waiter ran before the guard dropped");
    }

    #[test]
    fn lock_keys_does_not_block_unrelated_keys() {
        let cache = ContinuationCache::default();
        let _a = cache.lock_keys(&[key("a")]);
        let _b = cache.lock_keys(&[key("b"), key("b")]);
    }

    #[test]
    fn forget_storage_drops_every_key_for_the_id() {
        let cache = ContinuationCache::default();
        cache.put(key("a"), id("c1"), vec![Message::user("a")], 1);
        cache.put(key("b"), id("c1"), vec![Message::user("b")], 1);
        cache.put(key("c"), id("c2"), vec![Message::user("c")], 1);

        let gone: HashSet<StorageId> = [id("c1")].into_iter().collect();
        assert_eq!(cache.forget_storage(&gone), 2);
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&key("c")).is_some());
    }

    #[test]
    fn snapshot_restores_entries() {
        let cache = ContinuationCache::default();
        cache.put(key("user: hi"), id("c1"), vec![Message::user("hi")], 42);

        let raw = serde_json::to_string(&cache.snapshot()).expect("serialize");
        let parsed: CacheSnapshot = serde_json::from_str(&raw).expect("parse");
        let restored = ContinuationCache::from_snapshot(DEFAULT_RETENTION_SECS, parsed);

        assert_eq!(restored.get(&key("user: hi")), cache.get(&key("user: hi")));
    }
}
