//! End-to-end flows wired the way the server wires them: real store, real
//! dispatcher, handlers invoked directly.

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
};
use uuid::Uuid;

use roomly_api::auth::{AppState, AppStateInner};
use roomly_api::{conversations, matching};
use roomly_db::Database;
use roomly_gateway::dispatcher::Dispatcher;
use roomly_notify::NotificationCache;
use roomly_types::api::{
    Claims, LikeRequest, SendMessageRequest, StartConversationRequest,
};
use roomly_types::events::GatewayEvent;
use roomly_types::models::ProfileAttributes;

fn test_state() -> AppState {
    Arc::new(AppStateInner {
        db: Arc::new(Database::open_in_memory().unwrap()),
        dispatcher: Dispatcher::new(),
        jwt_secret: "test-secret".into(),
    })
}

fn add_user(state: &AppState, name: &str) -> Uuid {
    let id = Uuid::new_v4();
    state
        .db
        .create_user(&id.to_string(), name, "hash", &ProfileAttributes::default())
        .unwrap();
    id
}

fn claims(user_id: Uuid, name: &str) -> Claims {
    Claims {
        sub: user_id,
        username: name.to_string(),
        exp: usize::MAX,
    }
}

#[tokio::test]
async fn mutual_like_to_message_to_read_receipt() {
    let state = test_state();
    let ana = add_user(&state, "ana");
    let ben = add_user(&state, "ben");

    // Ben is online with one gateway connection.
    let (_ben_conn, mut ben_rx) = state.dispatcher.register_connection(ben).await;
    // Ben has the conversation view open: joined-room delivery goes through
    // the broadcast channel, filtered by room in the real connection loop.
    let mut room_rx = state.dispatcher.subscribe();

    // Ana likes Ben: no match yet.
    let first = matching::like(
        State(state.clone()),
        Extension(claims(ana, "ana")),
        Json(LikeRequest { target_id: ben }),
    )
    .await
    .unwrap()
    .0;
    assert!(!first.is_match);

    // Ben likes Ana back: the second call reports the match.
    let second = matching::like(
        State(state.clone()),
        Extension(claims(ben, "ben")),
        Json(LikeRequest { target_id: ana }),
    )
    .await
    .unwrap()
    .0;
    assert!(second.is_match);
    let match_id = second.match_id.unwrap();

    // Ben's connection hears about the match.
    match ben_rx.recv().await.unwrap() {
        GatewayEvent::NewMatch {
            match_id: heard,
            other_user_name,
            ..
        } => {
            assert_eq!(heard, match_id);
            assert_eq!(other_user_name, "ana");
        }
        other => panic!("expected NewMatch, got {:?}", other),
    }

    // Repeating the like reports the same match id.
    let again = matching::like(
        State(state.clone()),
        Extension(claims(ana, "ana")),
        Json(LikeRequest { target_id: ben }),
    )
    .await
    .unwrap()
    .0;
    assert_eq!(again.match_id, Some(match_id));

    // Ana opens a conversation; Ben doing the same gets the same id.
    let conv = conversations::start_conversation(
        State(state.clone()),
        Extension(claims(ana, "ana")),
        Json(StartConversationRequest { other_user_id: ben }),
    )
    .await
    .unwrap()
    .0
    .conversation_id;

    let conv_again = conversations::start_conversation(
        State(state.clone()),
        Extension(claims(ben, "ben")),
        Json(StartConversationRequest { other_user_id: ana }),
    )
    .await
    .unwrap()
    .0
    .conversation_id;
    assert_eq!(conv, conv_again);

    // Ana says hi. Ben's room subscription sees it before any HTTP fetch.
    let (status, Json(message)) = conversations::send_message(
        State(state.clone()),
        Path(conv),
        Extension(claims(ana, "ana")),
        Json(SendMessageRequest {
            content: "hi".into(),
        }),
    )
    .await
    .unwrap();
    assert_eq!(status, axum::http::StatusCode::CREATED);

    let room_event = room_rx.recv().await.unwrap();
    assert_eq!(room_event.conversation_id(), Some(conv));
    match room_event {
        GatewayEvent::ReceiveMessage { id, content, .. } => {
            assert_eq!(id, message.id);
            assert_eq!(content, "hi");
        }
        other => panic!("expected ReceiveMessage, got {:?}", other),
    }

    // The out-of-room badge signal reaches Ben's connection too.
    match ben_rx.recv().await.unwrap() {
        GatewayEvent::NewMessageNotification {
            conversation_id,
            sender_name,
        } => {
            assert_eq!(conversation_id, conv);
            assert_eq!(sender_name, "ana");
        }
        other => panic!("expected NewMessageNotification, got {:?}", other),
    }

    // Ben reads; Ana's open view gets the receipt.
    let marked = conversations::mark_read(
        State(state.clone()),
        Path(conv),
        Extension(claims(ben, "ben")),
    )
    .await
    .unwrap()
    .0;
    assert_eq!(marked.marked_count, 1);

    let receipt = room_rx.recv().await.unwrap();
    assert_eq!(receipt.conversation_id(), Some(conv));
    match receipt {
        GatewayEvent::MessagesRead {
            reader_id,
            marked_count,
            ..
        } => {
            assert_eq!(reader_id, ben);
            assert_eq!(marked_count, 1);
        }
        other => panic!("expected MessagesRead, got {:?}", other),
    }

    // A second mark-read is a silent no-op.
    let marked_again = conversations::mark_read(
        State(state.clone()),
        Path(conv),
        Extension(claims(ben, "ben")),
    )
    .await
    .unwrap()
    .0;
    assert_eq!(marked_again.marked_count, 0);
    assert!(room_rx.try_recv().is_err());
}

#[tokio::test]
async fn offline_peer_reconciles_through_unread_summary() {
    let state = test_state();
    let ana = add_user(&state, "ana");
    let ben = add_user(&state, "ben");

    let conv = conversations::start_conversation(
        State(state.clone()),
        Extension(claims(ana, "ana")),
        Json(StartConversationRequest { other_user_id: ben }),
    )
    .await
    .unwrap()
    .0
    .conversation_id;

    // Ben is offline; both sends only hit storage.
    for text in ["are you still looking?", "the room is available"] {
        conversations::send_message(
            State(state.clone()),
            Path(conv),
            Extension(claims(ana, "ana")),
            Json(SendMessageRequest {
                content: text.into(),
            }),
        )
        .await
        .unwrap();
    }

    // Ben reconnects and pulls the authoritative snapshot.
    let summary = conversations::unread_summary(
        State(state.clone()),
        Extension(claims(ben, "ben")),
    )
    .await
    .unwrap()
    .0;
    assert_eq!(summary.items.len(), 1);
    assert_eq!(summary.items[0].conversation_id, conv);
    assert!(summary.items[0].unread_count >= 1);
    assert_eq!(summary.total, 2);

    // His local badge cache reconciles against it.
    let cache_path =
        std::env::temp_dir().join(format!("roomly-chat-flow-{}.json", Uuid::new_v4()));
    let mut cache = NotificationCache::load(cache_path.clone());
    let ids: Vec<Uuid> = summary.items.iter().map(|i| i.conversation_id).collect();
    cache.sync_from_server(&ids);
    assert_eq!(cache.total_unread(), 1);
    assert!(cache.has_unread(conv));

    // Opening the conversation clears both server and client state.
    conversations::mark_read(
        State(state.clone()),
        Path(conv),
        Extension(claims(ben, "ben")),
    )
    .await
    .unwrap();
    cache.mark_read(conv);

    let after = conversations::unread_summary(
        State(state.clone()),
        Extension(claims(ben, "ben")),
    )
    .await
    .unwrap()
    .0;
    assert!(after.items.is_empty());
    assert_eq!(after.total, 0);
    assert_eq!(cache.total_unread(), 0);

    let _ = std::fs::remove_file(cache_path);
}

#[tokio::test]
async fn foreign_conversations_are_forbidden() {
    let state = test_state();
    let ana = add_user(&state, "ana");
    let ben = add_user(&state, "ben");
    let eve = add_user(&state, "eve");

    let conv = conversations::start_conversation(
        State(state.clone()),
        Extension(claims(ana, "ana")),
        Json(StartConversationRequest { other_user_id: ben }),
    )
    .await
    .unwrap()
    .0
    .conversation_id;

    let result = conversations::send_message(
        State(state.clone()),
        Path(conv),
        Extension(claims(eve, "eve")),
        Json(SendMessageRequest {
            content: "let me in".into(),
        }),
    )
    .await;

    let response = axum::response::IntoResponse::into_response(result.unwrap_err());
    assert_eq!(response.status(), axum::http::StatusCode::FORBIDDEN);
}
