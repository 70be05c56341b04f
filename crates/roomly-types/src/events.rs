use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { user_id: Uuid, username: String },

    /// A new message was posted in a conversation the client has joined
    ReceiveMessage {
        id: Uuid,
        conversation_id: Uuid,
        sender_id: Uuid,
        sender_username: String,
        content: String,
        sent_at: chrono::DateTime<chrono::Utc>,
    },

    /// Badge signal for a message in a conversation the client has NOT joined.
    /// Delivered to all of the recipient's connections regardless of rooms.
    NewMessageNotification {
        conversation_id: Uuid,
        sender_name: String,
    },

    /// A mutual like produced (or reactivated) a match
    NewMatch {
        match_id: Uuid,
        other_user_id: Uuid,
        other_user_name: String,
    },

    /// The peer marked the conversation read
    MessagesRead {
        conversation_id: Uuid,
        reader_id: Uuid,
        marked_count: u64,
    },

    /// A user started typing in a conversation
    UserTyping {
        conversation_id: Uuid,
        user_id: Uuid,
        username: String,
    },

    /// A user stopped typing. Clients must also expire typing indicators on
    /// their own after a few seconds; this signal is best-effort and may be
    /// lost when a peer disconnects mid-typing.
    UserStoppedTyping {
        conversation_id: Uuid,
        user_id: Uuid,
        username: String,
    },
}

impl GatewayEvent {
    /// Returns the conversation_id if this event is scoped to a room.
    /// Room-scoped events are only delivered to connections that joined the
    /// room; everything else is targeted at a specific user's connections.
    pub fn conversation_id(&self) -> Option<Uuid> {
        match self {
            Self::ReceiveMessage { conversation_id, .. } => Some(*conversation_id),
            Self::MessagesRead { conversation_id, .. } => Some(*conversation_id),
            Self::UserTyping { conversation_id, .. } => Some(*conversation_id),
            Self::UserStoppedTyping { conversation_id, .. } => Some(*conversation_id),
            // Ready, NewMessageNotification, NewMatch are targeted
            _ => None,
        }
    }
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Scope event delivery to a conversation room
    JoinConversation { conversation_id: Uuid },

    /// Leave a conversation room
    LeaveConversation { conversation_id: Uuid },

    /// Persist a message, then broadcast it to the room
    SendMessage {
        conversation_id: Uuid,
        content: String,
    },

    /// Mark every unread message from the peer as read
    MarkAsRead { conversation_id: Uuid },

    /// Indicate typing in a conversation
    StartTyping { conversation_id: Uuid },

    /// Indicate typing stopped
    StopTyping { conversation_id: Uuid },
}
