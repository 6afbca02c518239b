use crate::chatlog::fingerprint::{Fingerprint, fingerprint, strip_final_user_turn};
use crate::chatlog::message::has_real_turns;
use crate::chatlog::sanitize::sanitize_history;
use crate::store::{ConversationStore, StorageId, StoredConversation};
use anyhow::Result;
use std::collections::HashMap;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Duplicate {
    pub id: StorageId,
    pub kept_id: StorageId,
}

#[derive(Debug, Clone, Default)]
pub struct DedupePlan {
    pub scanned: usize,
    pub kept: Vec<StorageId>,
    pub duplicates: Vec<Duplicate>,
}

#[derive(Debug, Clone, Default)]
pub struct DedupeOutcome {
    pub plan: DedupePlan,
    pub deleted: usize,
    pub missing: usize,
}

/// Finds conversations that are a replay or a truncated copy of a newer one.
///
/// Walks newest first. A kept conversation registers its own fingerprint and
/// the fingerprint of every prefix ending before one of its user turns; any
/// older conversation whose fingerprint is already registered is a duplicate
/// of the conversation that registered it. Conversations without real turns
/// are left alone.
pub fn plan_dedupe(mut conversations: Vec<StoredConversation>) -> DedupePlan {
    conversations.sort_by(|a, b| {
        b.created_at_epoch_secs
            .cmp(&a.created_at_epoch_secs)
            .then_with(|| b.id.cmp(&a.id))
    });

    let mut seen: HashMap<Fingerprint, StorageId> = HashMap::new();
    let mut plan = DedupePlan::default();

    for conversation in conversations {
        plan.scanned += 1;
        let messages = sanitize_history(conversation.messages);
        if !has_real_turns(&messages) {
            plan.kept.push(conversation.id);
            continue;
        }

        let key = fingerprint(&messages);
        if let Some(kept_id) = seen.get(&key) {
            plan.duplicates.push(Duplicate {
                id: conversation.id,
                kept_id: kept_id.clone(),
            });
            continue;
        }

        seen.insert(key, conversation.id.clone());
        let mut rest = messages.as_slice();
        while let Some(prefix) = strip_final_user_turn(rest) {
            if !has_real_turns(prefix) {
                break;
            }
            seen.entry(fingerprint(prefix))
                .or_insert_with(|| conversation.id.clone());
            rest = prefix;
        }
        plan.kept.push(conversation.id);
    }

    plan
}

pub fn run_dedupe(store: &dyn ConversationStore, dry_run: bool) -> Result<DedupeOutcome> {
    let plan = plan_dedupe(store.list()?);
    let mut outcome = DedupeOutcome::default();

    if !dry_run {
        for duplicate in &plan.duplicates {
            if store.delete(&duplicate.id)? {
                outcome.deleted += 1;
                info!(
                    id = %duplicate.id,
                    kept_id = %duplicate.kept_id,
                    "deleted duplicate chat"
                );
            } else {
                outcome.missing += 1;
                warn!(id = %duplicate.id, "duplicate chat already gone");
            }
        }
    }

    outcome.plan = plan;
    Ok(outcome)
}
