use thiserror::Error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, StoreError>;

/// Store-level error taxonomy. Uniqueness-constraint races never surface here:
/// they are resolved internally into the idempotent success path.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cannot like or pass on yourself")]
    SelfAction,

    #[error("cannot start a conversation with yourself")]
    SelfConversation,

    #[error("user not found: {0}")]
    TargetNotFound(Uuid),

    #[error("conversation not found: {0}")]
    ConversationNotFound(Uuid),

    #[error("user {user_id} is not a participant of conversation {conversation_id}")]
    NotParticipant {
        user_id: Uuid,
        conversation_id: Uuid,
    },

    #[error("message content is empty")]
    EmptyContent,

    #[error(transparent)]
    Db(#[from] rusqlite::Error),

    #[error("storage error: {0}")]
    Internal(String),
}

/// True when the rusqlite error is a UNIQUE constraint violation, the signal
/// that a concurrent writer won the race and its row should be re-read.
pub fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}
