use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::ProfileAttributes;

// -- JWT Claims --

/// JWT claims shared across roomly-api (REST middleware) and roomly-gateway
/// (WebSocket authentication). Canonical definition lives here in roomly-types
/// to eliminate duplication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    /// Roommate-preference attributes used for compatibility scoring.
    /// Optional at registration; defaults apply when omitted.
    #[serde(default)]
    pub profile: Option<ProfileAttributes>,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub username: String,
    pub token: String,
}

// -- Likes / passes --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LikeRequest {
    pub target_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct LikeResponse {
    pub success: bool,
    pub is_match: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PassRequest {
    pub target_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct PassResponse {
    pub success: bool,
}

// -- Discovery --

#[derive(Debug, Serialize)]
pub struct CandidateResponse {
    pub id: Uuid,
    pub username: String,
    /// Compatibility with the requesting user, 0-100.
    pub compatibility: u8,
}

// -- Matches --

#[derive(Debug, Serialize)]
pub struct MatchSummary {
    pub id: Uuid,
    pub other_user_id: Uuid,
    pub other_user_name: String,
    pub created_at: DateTime<Utc>,
}

// -- Conversations --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StartConversationRequest {
    pub other_user_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct StartConversationResponse {
    pub conversation_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct ConversationSummary {
    pub id: Uuid,
    pub other_user_id: Uuid,
    pub other_user_name: String,
    pub created_at: DateTime<Utc>,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub sent_at: DateTime<Utc>,
    pub is_read: bool,
}

#[derive(Debug, Serialize)]
pub struct MarkReadResponse {
    pub marked_count: u64,
}

// -- Unread summary --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnreadItem {
    pub conversation_id: Uuid,
    pub unread_count: u64,
}

#[derive(Debug, Serialize)]
pub struct UnreadSummaryResponse {
    pub items: Vec<UnreadItem>,
    pub total: u64,
}
