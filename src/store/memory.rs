use crate::chatlog::message::Message;
use crate::store::{ConversationStore, StorageId, StoredConversation};
use anyhow::Result;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

/// In-process store for tests; ids are sequential and every save is counted.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<BTreeMap<StorageId, StoredConversation>>,
    next_id: AtomicU64,
    saves: AtomicUsize,
    fail_saves: AtomicBool,
}

impl MemoryStore {
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn insert_raw(&self, record: StoredConversation) {
        self.records.lock().insert(record.id.clone(), record);
    }
}

impl ConversationStore for MemoryStore {
    fn label(&self) -> &'static str {
        "memory"
    }

    fn load(&self, id: &StorageId) -> Result<Option<StoredConversation>> {
        Ok(self.records.lock().get(id).cloned())
    }

    fn save(&self, id: &StorageId, history: &[Message]) -> Result<StorageId> {
        if self.fail_saves.load(Ordering::SeqCst) {
            anyhow::bail!("memory store configured to fail saves");
        }
        let tick = self.saves.fetch_add(1, Ordering::SeqCst) as u64 + 1;
        let mut records = self.records.lock();
        let created = records
            .get(id)
            .map(|record| record.created_at_epoch_secs)
            .unwrap_or(tick);
        records.insert(
            id.clone(),
            StoredConversation {
                id: id.clone(),
                messages: history.to_vec(),
                created_at_epoch_secs: created,
                updated_at_epoch_secs: tick,
            },
        );
        Ok(id.clone())
    }

    fn new_id(&self) -> Result<StorageId> {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(StorageId::from(format!("mem-{n}")))
    }

    fn list(&self) -> Result<Vec<StoredConversation>> {
        Ok(self.records.lock().values().cloned().collect())
    }

    fn delete(&self, id: &StorageId) -> Result<bool> {
        Ok(self.records.lock().remove(id).is_some())
    }

    fn count(&self) -> Result<usize> {
        Ok(self.records.lock().len())
    }
}
