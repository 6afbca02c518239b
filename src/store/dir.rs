use crate::chatlog::message::Message;
use crate::chatlog::util::now_epoch_secs;
use crate::store::{ConversationStore, StorageId, StoredConversation};
use anyhow::{Context, Result};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// One pretty-printed JSON file per conversation, named `<id>.json`.
#[derive(Debug, Clone)]
pub struct DirStore {
    root: PathBuf,
}

fn is_safe_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
}

impl DirStore {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    fn record_path(&self, id: &StorageId) -> Result<PathBuf> {
        if !is_safe_id(id.as_str()) {
            anyhow::bail!("storage id `{id}` is not a valid file name");
        }
        Ok(self.root.join(format!("{id}.json")))
    }

    fn read_record(path: &Path) -> Result<StoredConversation> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
    }

    fn write_record(&self, path: &Path, record: &StoredConversation) -> Result<()> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("failed to create {}", self.root.display()))?;
        let data = serde_json::to_string_pretty(record)?;
        let mut tmp = NamedTempFile::new_in(&self.root)
            .with_context(|| format!("failed to create temp file in {}", self.root.display()))?;
        tmp.write_all(format!("{data}\n").as_bytes())?;
        tmp.persist(path)
            .map_err(|err| err.error)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }
}

impl ConversationStore for DirStore {
    fn label(&self) -> &'static str {
        "dir"
    }

    fn load(&self, id: &StorageId) -> Result<Option<StoredConversation>> {
        let path = self.record_path(id)?;
        if !path.exists() {
            return Ok(None);
        }
        Self::read_record(&path).map(Some)
    }

    fn save(&self, id: &StorageId, history: &[Message]) -> Result<StorageId> {
        let path = self.record_path(id)?;
        let now = now_epoch_secs()?;
        let created_at_epoch_secs = if path.exists() {
            Self::read_record(&path)?.created_at_epoch_secs
        } else {
            now
        };
        let record = StoredConversation {
            id: id.clone(),
            messages: history.to_vec(),
            created_at_epoch_secs,
            updated_at_epoch_secs: now,
        };
        self.write_record(&path, &record)?;
        Ok(id.clone())
    }

    fn new_id(&self) -> Result<StorageId> {
        Ok(StorageId::generate())
    }

    fn list(&self) -> Result<Vec<StoredConversation>> {
        let read_dir = match fs::read_dir(&self.root) {
            Ok(read_dir) => read_dir,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err).with_context(|| format!("failed to read {}", self.root.display()));
            }
        };

        let mut out = Vec::new();
        for entry in read_dir {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            out.push(Self::read_record(&path)?);
        }
        out.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(out)
    }

    fn delete(&self, id: &StorageId) -> Result<bool> {
        let path = self.record_path(id)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err).with_context(|| format!("failed to remove {}", path.display())),
        }
    }

    fn count(&self) -> Result<usize> {
        Ok(self.list()?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn save_and_load_roundtrip() {
        let tmp = tempdir().expect("tempdir");
        let store = DirStore::new(&tmp.path().join("conversations"));
        let id = store.new_id().expect("id");

        let history = vec![Message::user("Hello!"), Message::assistant("Hi")];
        let saved = store.save(&id, &history).expect("save");
        assert_eq!(saved, id);

        let got = store.load(&id).expect("load").expect("record");
        assert_eq!(got.messages, history);
        assert_eq!(store.count().expect("count"), 1);
    }

    #[test]
    fn save_replaces_messages_and_keeps_created_at() {
        let tmp = tempdir().expect("tempdir");
        let store = DirStore::new(tmp.path());
        let id = StorageId::from("chat-1".to_string());

        store.save(&id, &[Message::user("a")]).expect("first save");
        let first = store.load(&id).expect("load").expect("record");
        store
            .save(&id, &[Message::user("a"), Message::assistant("b")])
            .expect("second save");
        let second = store.load(&id).expect("load").expect("record");

        assert_eq!(second.messages.len(), 2);
        assert_eq!(second.created_at_epoch_secs, first.created_at_epoch_secs);
        assert_eq!(store.count().expect("count"), 1);
    }

    #[test]
    fn missing_records_are_absent_not_errors() {
        let tmp = tempdir().expect("tempdir");
        let store = DirStore::new(&tmp.path().join("never-created"));
        let id = StorageId::from("nope".to_string());
        assert!(store.load(&id).expect("load").is_none());
        assert!(!store.delete(&id).expect("delete"));
        assert!(store.list().expect("list").is_empty());
    }

    #[test]
    fn rejects_ids_that_escape_the_store_dir() {
        let tmp = tempdir().expect("tempdir");
        let store = DirStore::new(tmp.path());
        let id = StorageId::from("../outside".to_string());
        assert!(store.save(&id, &[Message::user("x")]).is_err());
    }

    #[test]
    fn delete_removes_record() {
        let tmp = tempdir().expect("tempdir");
        let store = DirStore::new(tmp.path());
        let id = store.new_id().expect("id");
        store.save(&id, &[Message::user("x")]).expect("save");

        assert!(store.delete(&id).expect("delete"));
        assert!(store.load(&id).expect("load").is_none());
    }
}
