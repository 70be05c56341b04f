//! Database row types, mapped directly from SQLite rows.
//! Distinct from roomly-types API models to keep the DB layer independent.

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub password: String,
    pub budget: u32,
    pub cleanliness: u8,
    pub smoker: bool,
    pub night_owl: bool,
    pub created_at: String,
}

pub struct MatchRow {
    pub id: String,
    pub user_low_id: String,
    pub user_high_id: String,
    pub created_at: String,
    pub is_active: bool,
}

pub struct ConversationRow {
    pub id: String,
    pub user_a_id: String,
    pub user_b_id: String,
    pub created_at: String,
}

pub struct MessageRow {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub content: String,
    pub sent_at: String,
    pub is_read: bool,
}

/// Result of `record_like`. `match_id` is set iff `matched`.
/// `newly_matched` distinguishes a match created (or reactivated) by this call
/// from one that already existed; only the former triggers notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LikeOutcome {
    pub matched: bool,
    pub match_id: Option<uuid::Uuid>,
    pub newly_matched: bool,
}

/// A freshly persisted message plus the participant who should be notified.
pub struct NewMessage {
    pub message: MessageRow,
    pub recipient_id: String,
}

/// One row of the unread summary: conversation id and its unread count.
pub struct UnreadRow {
    pub conversation_id: String,
    pub unread_count: u64,
}

/// A conversation or match as seen from one participant's side.
pub struct PairSummaryRow {
    pub id: String,
    pub other_user_id: String,
    pub other_user_name: String,
    pub created_at: String,
}

/// Discovery candidate: a user the actor has not yet decided on.
pub struct CandidateRow {
    pub id: String,
    pub username: String,
    pub budget: u32,
    pub cleanliness: u8,
    pub smoker: bool,
    pub night_owl: bool,
}
