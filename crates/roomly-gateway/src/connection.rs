use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn};
use uuid::Uuid;

use roomly_db::{Database, StoreError};
use roomly_types::events::{GatewayCommand, GatewayEvent};

use crate::dispatcher::Dispatcher;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Room filter for the send task: a broadcast event reaches the client only
/// if it is room-scoped and this connection has joined that room.
fn should_deliver(event: &GatewayEvent, joined_rooms: &HashSet<Uuid>) -> bool {
    event
        .conversation_id()
        .is_some_and(|id| joined_rooms.contains(&id))
}

/// Handle a pre-authenticated WebSocket connection. The JWT was validated at
/// the HTTP upgrade layer, so the socket is already bound to one user.
pub async fn handle_connection(
    socket: WebSocket,
    dispatcher: Dispatcher,
    db: Arc<Database>,
    user_id: Uuid,
    username: String,
) {
    let (mut sender, mut receiver) = socket.split();

    info!("{} ({}) connected to gateway", username, user_id);

    // Send Ready event
    let ready = GatewayEvent::Ready {
        user_id,
        username: username.clone(),
    };
    let Ok(ready_json) = serde_json::to_string(&ready) else {
        return;
    };
    if sender.send(Message::Text(ready_json.into())).await.is_err() {
        return;
    }

    // Register for targeted delivery and subscribe to room broadcasts
    let (conn_id, mut user_rx) = dispatcher.register_connection(user_id).await;
    let mut broadcast_rx = dispatcher.subscribe();
    let dispatcher_recv = dispatcher.clone();

    // Rooms this connection has joined (shared between send and recv tasks).
    let joined_rooms: Arc<std::sync::RwLock<HashSet<Uuid>>> =
        Arc::new(std::sync::RwLock::new(HashSet::new()));
    let send_rooms = joined_rooms.clone();

    // Shared flag for heartbeat
    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward room broadcasts + targeted events -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = broadcast_rx.recv() => {
                    let event = match result {
                        Ok(msg) => msg,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            warn!("Broadcast receiver lagged by {} events", n);
                            continue;
                        }
                        Err(_) => break,
                    };

                    {
                        let rooms = send_rooms.read().expect("room lock poisoned");
                        if !should_deliver(&event, &rooms) {
                            continue;
                        }
                    }

                    let Ok(text) = serde_json::to_string(&event) else {
                        continue;
                    };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                result = user_rx.recv() => {
                    let event = match result {
                        Some(event) => event,
                        None => break,
                    };

                    let Ok(text) = serde_json::to_string(&event) else {
                        continue;
                    };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client
    let username_recv = username.clone();
    let recv_rooms = joined_rooms.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => {
                        handle_command(
                            &dispatcher_recv,
                            &db,
                            user_id,
                            &username_recv,
                            cmd,
                            &recv_rooms,
                        )
                        .await;
                    }
                    Err(e) => {
                        let preview: String = text.chars().take(200).collect();
                        warn!(
                            "{} ({}) bad command: {} -- raw: {}",
                            username_recv, user_id, e, preview
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    // Leaves all rooms implicitly: the room set dies with the connection.
    dispatcher.unregister_connection(user_id, conn_id).await;
    info!("{} ({}) disconnected from gateway", username, user_id);
}

async fn handle_command(
    dispatcher: &Dispatcher,
    db: &Arc<Database>,
    user_id: Uuid,
    username: &str,
    cmd: GatewayCommand,
    joined_rooms: &Arc<std::sync::RwLock<HashSet<Uuid>>>,
) {
    match cmd {
        GatewayCommand::JoinConversation { conversation_id } => {
            info!("{} ({}) joined room {}", username, user_id, conversation_id);
            joined_rooms
                .write()
                .expect("room lock poisoned")
                .insert(conversation_id);
        }

        GatewayCommand::LeaveConversation { conversation_id } => {
            info!("{} ({}) left room {}", username, user_id, conversation_id);
            joined_rooms
                .write()
                .expect("room lock poisoned")
                .remove(&conversation_id);
        }

        GatewayCommand::SendMessage {
            conversation_id,
            content,
        } => {
            // Persist first, then broadcast, so room delivery order matches
            // commit order.
            let db = db.clone();
            let persisted = tokio::task::spawn_blocking(move || {
                db.send_message(conversation_id, user_id, &content)
            })
            .await;

            let new_message = match persisted {
                Ok(Ok(new_message)) => new_message,
                Ok(Err(e)) => {
                    log_store_error(username, user_id, "SendMessage", &e);
                    return;
                }
                Err(e) => {
                    warn!("spawn_blocking join error: {}", e);
                    return;
                }
            };

            let sent_at = new_message
                .message
                .sent_at
                .parse::<chrono::DateTime<chrono::Utc>>()
                .unwrap_or_default();

            dispatcher.broadcast(GatewayEvent::ReceiveMessage {
                id: new_message.message.id.parse().unwrap_or_default(),
                conversation_id,
                sender_id: user_id,
                sender_username: username.to_string(),
                content: new_message.message.content.clone(),
                sent_at,
            });

            if let Ok(recipient_id) = new_message.recipient_id.parse::<Uuid>() {
                dispatcher
                    .notify_user(
                        recipient_id,
                        GatewayEvent::NewMessageNotification {
                            conversation_id,
                            sender_name: username.to_string(),
                        },
                    )
                    .await;
            }
        }

        GatewayCommand::MarkAsRead { conversation_id } => {
            let db = db.clone();
            let marked =
                tokio::task::spawn_blocking(move || db.mark_read(conversation_id, user_id)).await;

            match marked {
                Ok(Ok(marked_count)) if marked_count > 0 => {
                    dispatcher.broadcast(GatewayEvent::MessagesRead {
                        conversation_id,
                        reader_id: user_id,
                        marked_count,
                    });
                }
                Ok(Ok(_)) => {} // nothing was unread
                Ok(Err(e)) => log_store_error(username, user_id, "MarkAsRead", &e),
                Err(e) => warn!("spawn_blocking join error: {}", e),
            }
        }

        GatewayCommand::StartTyping { conversation_id } => {
            dispatcher.broadcast(GatewayEvent::UserTyping {
                conversation_id,
                user_id,
                username: username.to_string(),
            });
        }

        GatewayCommand::StopTyping { conversation_id } => {
            dispatcher.broadcast(GatewayEvent::UserStoppedTyping {
                conversation_id,
                user_id,
                username: username.to_string(),
            });
        }
    }
}

/// Socket commands have no response channel; failures are logged and the
/// client reconciles via the unread summary. Forbidden gets a louder log:
/// a participant check can only fail if someone is probing foreign rooms.
fn log_store_error(username: &str, user_id: Uuid, cmd: &str, err: &StoreError) {
    match err {
        StoreError::NotParticipant { .. } => {
            warn!(
                "{} ({}) {} rejected, possible tampering: {}",
                username, user_id, cmd, err
            );
        }
        _ => {
            warn!("{} ({}) {} failed: {}", username, user_id, cmd, err);
        }
    }
}
