pub mod dir;
#[cfg(test)]
pub mod memory;
pub mod supabase;

use crate::chatlog::config::ChatlogConfig;
use crate::chatlog::message::{ChatHistory, Message};
use crate::chatlog::paths::ChatlogPaths;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Opaque key of a stored conversation. Never interpreted by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StorageId(String);

impl StorageId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StorageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for StorageId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredConversation {
    pub id: StorageId,
    pub messages: ChatHistory,
    pub created_at_epoch_secs: u64,
    pub updated_at_epoch_secs: u64,
}

/// Where full conversations live. `save` creates or replaces the record under `id`.
pub trait ConversationStore: Send + Sync {
    fn label(&self) -> &'static str;
    fn load(&self, id: &StorageId) -> Result<Option<StoredConversation>>;
    fn save(&self, id: &StorageId, history: &[Message]) -> Result<StorageId>;
    fn new_id(&self) -> Result<StorageId>;
    fn list(&self) -> Result<Vec<StoredConversation>>;
    fn delete(&self, id: &StorageId) -> Result<bool>;
    fn count(&self) -> Result<usize>;
}

pub fn open_store(paths: &ChatlogPaths, cfg: &ChatlogConfig) -> Result<Arc<dyn ConversationStore>> {
    match cfg.store.backend.as_str() {
        "dir" => Ok(Arc::new(dir::DirStore::new(&paths.store_dir))),
        "supabase" => Ok(Arc::new(supabase::SupabaseStore::from_env(&cfg.store)?)),
        other => anyhow::bail!("unknown store backend `{other}`"),
    }
}
