use crate::chatlog::cache::{CacheEntry, ContinuationCache};
use crate::chatlog::fingerprint::{Fingerprint, fingerprint};
use crate::chatlog::message::{ChatHistory, Message, Role, Turn, has_real_turns, real_turns};
use crate::chatlog::sanitize::sanitize_history;
use crate::chatlog::util::{now_epoch_secs, truncate_with_ellipsis};
use crate::error::{Divergence, IngestError, TranscriptShapeError};
use crate::store::{ConversationStore, StorageId};
use std::sync::Arc;
use tracing::{debug, info, warn};

const ANCHOR_PREVIEW_CHARS: usize = 80;

#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// No real turns; nothing was stored.
    Skipped,
    Created {
        storage_id: StorageId,
        history: ChatHistory,
    },
    Merged {
        storage_id: StorageId,
        history: ChatHistory,
        appended: usize,
    },
}

impl IngestOutcome {
    pub fn status(&self) -> &'static str {
        match self {
            IngestOutcome::Skipped => "skipped",
            IngestOutcome::Created { .. } => "new chat logged",
            IngestOutcome::Merged { .. } => "chat updated",
        }
    }

    pub fn storage_id(&self) -> Option<&StorageId> {
        match self {
            IngestOutcome::Skipped => None,
            IngestOutcome::Created { storage_id, .. } | IngestOutcome::Merged { storage_id, .. } => {
                Some(storage_id)
            }
        }
    }

    pub fn history(&self) -> &[Message] {
        match self {
            IngestOutcome::Skipped => &[],
            IngestOutcome::Created { history, .. } | IngestOutcome::Merged { history, .. } => {
                history
            }
        }
    }
}

/// Checks the inbound shape and returns the part before the final user turn.
pub fn check_transcript_shape(history: &[Message]) -> Result<&[Message], TranscriptShapeError> {
    let last_user = history
        .iter()
        .rposition(Message::is_user_turn)
        .ok_or(TranscriptShapeError::MissingUserTurn)?;

    let trailing: Vec<&Turn> = real_turns(&history[last_user + 1..]).collect();
    match trailing.as_slice() {
        [] => {}
        [reply] if reply.role == Role::Assistant => {}
        [reply] => {
            return Err(TranscriptShapeError::UnexpectedTrailingRole {
                role: reply.role.to_string(),
            });
        }
        many => return Err(TranscriptShapeError::TrailingTurns { found: many.len() }),
    }

    Ok(&history[..last_user])
}

fn describe_turn(turn: &Turn) -> String {
    format!(
        "{}: {}",
        turn.role,
        truncate_with_ellipsis(&turn.content, ANCHOR_PREVIEW_CHARS)
    )
}

/// Appends to `cached` whatever `inbound` carries after the cached anchor.
///
/// The anchor is the last real message of `cached`. The real turns of `inbound`
/// must begin with exactly the real turns of `cached`; the anchor is then the
/// inbound turn at the same ordinal. Metadata that `cached` already holds after
/// its own anchor is not appended again, whatever order the inbound repeats it in.
pub fn merge_histories(cached: &[Message], inbound: &[Message]) -> Result<ChatHistory, Divergence> {
    let anchor_in_cached = cached
        .iter()
        .rposition(Message::is_real)
        .ok_or(Divergence::EmptyCachedHistory)?;

    let cached_turns: Vec<&Turn> = real_turns(cached).collect();
    let inbound_positions: Vec<usize> = inbound
        .iter()
        .enumerate()
        .filter(|(_, message)| message.is_real())
        .map(|(pos, _)| pos)
        .collect();
    let anchor_ordinal = cached_turns.len() - 1;

    for (ordinal, expected) in cached_turns.iter().enumerate() {
        let found = inbound_positions
            .get(ordinal)
            .and_then(|&pos| inbound[pos].as_turn());
        if found == Some(*expected) {
            continue;
        }
        if ordinal == anchor_ordinal || found.is_none() {
            return Err(Divergence::AnchorNotFound {
                anchor: describe_turn(cached_turns[anchor_ordinal]),
            });
        }
        return Err(Divergence::PrefixMismatch {
            turn_index: ordinal,
        });
    }

    let anchor_in_inbound = inbound_positions[anchor_ordinal];
    let inbound_tail = &inbound[anchor_in_inbound + 1..];
    // Metadata the cached history already holds after its anchor is matched
    // once each against the inbound metadata leading up to the next real turn.
    let mut unmatched: Vec<&Message> = cached[anchor_in_cached + 1..].iter().collect();
    let leading_meta = inbound_tail.iter().take_while(|m| !m.is_real()).count();

    let mut merged = cached.to_vec();
    for (index, message) in inbound_tail.iter().enumerate() {
        if index < leading_meta
            && let Some(pos) = unmatched.iter().position(|seen| *seen == message)
        {
            unmatched.remove(pos);
            continue;
        }
        merged.push(message.clone());
    }
    Ok(merged)
}

/// Cache keys an inbound transcript may continue, most specific first:
/// the whole transcript (a replay), the transcript without its trailing
/// assistant reply (the reply to a transcript that ended on a user turn), and
/// everything before the final user turn.
fn lookup_candidates(
    history: &[Message],
    last_user: usize,
    full_key: &Fingerprint,
) -> Vec<Fingerprint> {
    let mut keys = vec![full_key.clone()];
    if has_real_turns(&history[last_user + 1..]) {
        keys.push(fingerprint(&history[..=last_user]));
    }
    let before_user = fingerprint(&history[..last_user]);
    if !before_user.is_empty() {
        keys.push(before_user);
    }
    keys.dedup();
    keys
}

/// Decides per inbound transcript whether it starts a conversation or extends
/// one, and keeps the cache and the store in step.
pub struct ContinuationEngine {
    cache: ContinuationCache,
    store: Arc<dyn ConversationStore>,
    sweep_on_ingest: bool,
}

impl ContinuationEngine {
    pub fn new(cache: ContinuationCache, store: Arc<dyn ConversationStore>) -> Self {
        Self {
            cache,
            store,
            sweep_on_ingest: true,
        }
    }

    pub fn with_sweep_on_ingest(mut self, enabled: bool) -> Self {
        self.sweep_on_ingest = enabled;
        self
    }

    pub fn cache(&self) -> &ContinuationCache {
        &self.cache
    }

    pub fn ingest(&self, transcript: ChatHistory) -> Result<IngestOutcome, IngestError> {
        let now = now_epoch_secs().map_err(IngestError::Store)?;
        self.ingest_at(transcript, now)
    }

    pub fn ingest_at(&self, transcript: ChatHistory, now: u64) -> Result<IngestOutcome, IngestError> {
        let history = sanitize_history(transcript);
        if !has_real_turns(&history) {
            debug!(messages = history.len(), "transcript has no real turns; skipping");
            return Ok(IngestOutcome::Skipped);
        }

        let prefix = check_transcript_shape(&history)?;
        let full_key = fingerprint(&history);
        let candidates = lookup_candidates(&history, prefix.len(), &full_key);

        let outcome = {
            let _guard = self.cache.lock_keys(&candidates);
            self.ingest_locked(history, full_key, &candidates, now)?
        };

        if self.sweep_on_ingest {
            let evicted = self.cache.sweep(now);
            if evicted > 0 {
                debug!(evicted, "swept stale continuation entries");
            }
        }

        Ok(outcome)
    }

    fn ingest_locked(
        &self,
        history: ChatHistory,
        full_key: Fingerprint,
        candidates: &[Fingerprint],
        now: u64,
    ) -> Result<IngestOutcome, IngestError> {
        let hit = candidates
            .iter()
            .find_map(|key| self.cache.get(key).map(|entry| (key.clone(), entry)));

        match hit {
            Some((hit_key, entry)) => self.merge_into(hit_key, entry, history, full_key, now),
            None => self.create(history, full_key, now),
        }
    }

    fn merge_into(
        &self,
        hit_key: Fingerprint,
        entry: CacheEntry,
        inbound: ChatHistory,
        full_key: Fingerprint,
        now: u64,
    ) -> Result<IngestOutcome, IngestError> {
        let merged = merge_histories(&entry.history, &inbound).map_err(|divergence| {
            warn!(
                storage_id = %entry.storage_id,
                key = %hit_key.digest(),
                %divergence,
                "inbound transcript diverges from cached conversation"
            );
            IngestError::DivergentHistory {
                storage_id: entry.storage_id.clone(),
                divergence,
            }
        })?;

        let appended = merged.len() - entry.history.len();
        let storage_id = if appended > 0 {
            self.store
                .save(&entry.storage_id, &merged)
                .map_err(IngestError::Store)?
        } else {
            entry.storage_id
        };

        if hit_key != full_key {
            self.cache.remove(&hit_key);
        }
        self.cache
            .put(full_key.clone(), storage_id.clone(), merged.clone(), now);

        info!(
            storage_id = %storage_id,
            key = %full_key.digest(),
            appended,
            messages = merged.len(),
            "chat updated"
        );
        Ok(IngestOutcome::Merged {
            storage_id,
            history: merged,
            appended,
        })
    }

    fn create(
        &self,
        history: ChatHistory,
        full_key: Fingerprint,
        now: u64,
    ) -> Result<IngestOutcome, IngestError> {
        let id = self.store.new_id().map_err(IngestError::Store)?;
        let storage_id = self.store.save(&id, &history).map_err(IngestError::Store)?;
        self.cache
            .put(full_key.clone(), storage_id.clone(), history.clone(), now);

        info!(
            storage_id = %storage_id,
            key = %full_key.digest(),
            messages = history.len(),
            "new chat logged"
        );
        Ok(IngestOutcome::Created {
            storage_id,
            history,
        })
    }
}
