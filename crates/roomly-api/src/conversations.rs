use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use tracing::error;
use uuid::Uuid;

use roomly_types::api::{
    Claims, ConversationSummary, MarkReadResponse, MessageResponse, SendMessageRequest,
    StartConversationRequest, StartConversationResponse, UnreadItem, UnreadSummaryResponse,
};
use roomly_types::events::GatewayEvent;

use crate::auth::AppState;
use crate::error::ApiError;
use crate::{parse_db_time, parse_db_uuid};

fn join_error(e: tokio::task::JoinError) -> ApiError {
    error!("spawn_blocking join error: {}", e);
    ApiError::internal("task join failure")
}

/// Get-or-create: posting the same pair twice (either order) returns the same
/// conversation id.
pub async fn start_conversation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<StartConversationRequest>,
) -> Result<Json<StartConversationResponse>, ApiError> {
    let user_id = claims.sub;
    let other_user_id = req.other_user_id;

    let db = state.db.clone();
    let conversation_id =
        tokio::task::spawn_blocking(move || db.start_conversation(user_id, other_user_id))
            .await
            .map_err(join_error)??;

    Ok(Json(StartConversationResponse {
        conversation_id: parse_db_uuid(&conversation_id, "conversation"),
    }))
}

pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<ConversationSummary>>, ApiError> {
    let user_id = claims.sub;

    let db = state.db.clone();
    let rows = tokio::task::spawn_blocking(move || db.conversations_for(user_id))
        .await
        .map_err(join_error)??;

    let conversations = rows
        .into_iter()
        .map(|row| ConversationSummary {
            id: parse_db_uuid(&row.id, "conversation"),
            other_user_id: parse_db_uuid(&row.other_user_id, "conversation participant"),
            other_user_name: row.other_user_name,
            created_at: parse_db_time(&row.created_at, "conversation"),
        })
        .collect();

    Ok(Json(conversations))
}

pub async fn get_messages(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<MessageResponse>>, ApiError> {
    let reader_id = claims.sub;

    let db = state.db.clone();
    let rows = tokio::task::spawn_blocking(move || db.messages_for(conversation_id, reader_id))
        .await
        .map_err(join_error)??;

    let messages = rows
        .into_iter()
        .map(|row| MessageResponse {
            id: parse_db_uuid(&row.id, "message"),
            conversation_id: parse_db_uuid(&row.conversation_id, "message conversation"),
            sender_id: parse_db_uuid(&row.sender_id, "message sender"),
            content: row.content,
            sent_at: parse_db_time(&row.sent_at, "message"),
            is_read: row.is_read,
        })
        .collect();

    Ok(Json(messages))
}

/// Persist, then broadcast. Room delivery order matches commit order because
/// the broadcast happens synchronously on the same request after the write.
pub async fn send_message(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    let sender_id = claims.sub;

    let db = state.db.clone();
    let new_message = tokio::task::spawn_blocking(move || {
        db.send_message(conversation_id, sender_id, &req.content)
    })
    .await
    .map_err(join_error)??;

    let sent_at = parse_db_time(&new_message.message.sent_at, "message");
    let message_id = parse_db_uuid(&new_message.message.id, "message");

    state.dispatcher.broadcast(GatewayEvent::ReceiveMessage {
        id: message_id,
        conversation_id,
        sender_id,
        sender_username: claims.username.clone(),
        content: new_message.message.content.clone(),
        sent_at,
    });

    // Badge signal for the peer's connections outside the room.
    let recipient_id = parse_db_uuid(&new_message.recipient_id, "message recipient");
    state
        .dispatcher
        .notify_user(
            recipient_id,
            GatewayEvent::NewMessageNotification {
                conversation_id,
                sender_name: claims.username.clone(),
            },
        )
        .await;

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            id: message_id,
            conversation_id,
            sender_id,
            content: new_message.message.content,
            sent_at,
            is_read: false,
        }),
    ))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<MarkReadResponse>, ApiError> {
    let reader_id = claims.sub;

    let db = state.db.clone();
    let marked_count =
        tokio::task::spawn_blocking(move || db.mark_read(conversation_id, reader_id))
            .await
            .map_err(join_error)??;

    // The sender's open views learn their messages were seen. A second
    // mark-read with nothing new stays silent.
    if marked_count > 0 {
        state.dispatcher.broadcast(GatewayEvent::MessagesRead {
            conversation_id,
            reader_id,
            marked_count,
        });
    }

    Ok(Json(MarkReadResponse { marked_count }))
}

/// The authoritative unread snapshot clients reconcile their local cache
/// against on login and reconnect.
pub async fn unread_summary(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<UnreadSummaryResponse>, ApiError> {
    let user_id = claims.sub;

    let db = state.db.clone();
    let rows = tokio::task::spawn_blocking(move || db.unread_summary(user_id))
        .await
        .map_err(join_error)??;

    let items: Vec<UnreadItem> = rows
        .into_iter()
        .map(|row| UnreadItem {
            conversation_id: parse_db_uuid(&row.conversation_id, "unread conversation"),
            unread_count: row.unread_count,
        })
        .collect();

    let total = items.iter().map(|i| i.unread_count).sum();

    Ok(Json(UnreadSummaryResponse { items, total }))
}
