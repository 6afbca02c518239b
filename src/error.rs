use crate::store::StorageId;
use thiserror::Error;

/// Why a cached conversation could not be extended by an inbound transcript.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Divergence {
    #[error("cached conversation has no real message to anchor on")]
    EmptyCachedHistory,
    #[error("anchor `{anchor}` not found in inbound transcript")]
    AnchorNotFound { anchor: String },
    #[error("real turn {turn_index} differs from the cached conversation")]
    PrefixMismatch { turn_index: usize },
}

/// Inbound transcripts must end with a user turn, optionally followed by one
/// assistant reply.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranscriptShapeError {
    #[error("transcript has no user turn")]
    MissingUserTurn,
    #[error("expected at most one assistant reply after the final user turn, found {found} real turn(s)")]
    TrailingTurns { found: usize },
    #[error("turn after the final user message must come from the assistant, got `{role}`")]
    UnexpectedTrailingRole { role: String },
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("inbound history diverges from stored conversation {storage_id}: {divergence}")]
    DivergentHistory {
        storage_id: StorageId,
        divergence: Divergence,
    },
    #[error("malformed transcript: {0}")]
    MalformedTranscript(#[from] TranscriptShapeError),
    #[error("conversation store failed: {0:#}")]
    Store(anyhow::Error),
}

impl IngestError {
    pub fn code(&self) -> ChatlogErrorCode {
        match self {
            Self::DivergentHistory { .. } => ChatlogErrorCode::E001DivergentHistory,
            Self::MalformedTranscript(_) => ChatlogErrorCode::E002MalformedTranscript,
            Self::Store(_) => ChatlogErrorCode::E003StoreFailure,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatlogErrorCode {
    E001DivergentHistory,
    E002MalformedTranscript,
    E003StoreFailure,
    E004StateCorrupt,
}

impl ChatlogErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::E001DivergentHistory => "E001_DIVERGENT_HISTORY",
            Self::E002MalformedTranscript => "E002_MALFORMED_TRANSCRIPT",
            Self::E003StoreFailure => "E003_STORE_FAILURE",
            Self::E004StateCorrupt => "E004_STATE_CORRUPT",
        }
    }
}
