//! Conversation and message persistence plus the derived unread summary.
//!
//! One conversation per unordered user pair, created on first message intent.
//! A conversation does not require a match: roommate requests may start a
//! thread before both sides have liked each other.

use crate::Database;
use crate::error::{Result, StoreError, is_unique_violation};
use crate::models::{ConversationRow, MessageRow, NewMessage, PairSummaryRow, UnreadRow};
use crate::queries::{OptionalExt, user_exists};
use rusqlite::Connection;
use tracing::debug;
use uuid::Uuid;

impl Database {
    /// Get-or-create the conversation for a pair. The pair is stored in the
    /// order given; lookup checks both orderings, and the unique pair index
    /// resolves a creation race in favor of the first writer.
    pub fn start_conversation(&self, user_a: Uuid, user_b: Uuid) -> Result<String> {
        if user_a == user_b {
            return Err(StoreError::SelfConversation);
        }

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            if !user_exists(&tx, &user_b.to_string())? {
                return Err(StoreError::TargetNotFound(user_b));
            }

            if let Some(existing) = find_conversation_by_pair(&tx, user_a, user_b)? {
                tx.commit()?;
                return Ok(existing.id);
            }

            let id = Uuid::new_v4().to_string();
            let inserted = tx.execute(
                "INSERT INTO conversations (id, user_a_id, user_b_id) VALUES (?1, ?2, ?3)",
                [&id, &user_a.to_string(), &user_b.to_string()],
            );
            let id = match inserted {
                Ok(_) => {
                    debug!("Created conversation {} for ({}, {})", id, user_a, user_b);
                    id
                }
                Err(e) if is_unique_violation(&e) => find_conversation_by_pair(&tx, user_a, user_b)?
                    .map(|c| c.id)
                    .ok_or_else(|| {
                        StoreError::Internal("conversation missing after unique conflict".into())
                    })?,
                Err(e) => return Err(e.into()),
            };

            tx.commit()?;
            Ok(id)
        })
    }

    /// Persist a message. Content is trimmed before storage; whitespace-only
    /// content is rejected. Returns the row plus the peer to notify.
    pub fn send_message(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        content: &str,
    ) -> Result<NewMessage> {
        let content = content.trim();
        if content.is_empty() {
            return Err(StoreError::EmptyContent);
        }

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let conversation = require_conversation(&tx, conversation_id)?;
            let recipient_id = other_participant(&conversation, sender_id, conversation_id)?;

            let id = Uuid::new_v4().to_string();
            let sent_at = chrono::Utc::now().to_rfc3339();
            tx.execute(
                "INSERT INTO messages (id, conversation_id, sender_id, content, sent_at, is_read)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0)",
                rusqlite::params![id, conversation.id, sender_id.to_string(), content, sent_at],
            )?;

            tx.commit()?;
            Ok(NewMessage {
                message: MessageRow {
                    id,
                    conversation_id: conversation.id,
                    sender_id: sender_id.to_string(),
                    content: content.to_string(),
                    sent_at,
                    is_read: false,
                },
                recipient_id,
            })
        })
    }

    /// Ordered message log, participants only. Insertion order is preserved:
    /// ties on sent_at fall back to rowid.
    pub fn messages_for(&self, conversation_id: Uuid, reader_id: Uuid) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let conversation = require_conversation(conn, conversation_id)?;
            other_participant(&conversation, reader_id, conversation_id)?;

            let mut stmt = conn.prepare(
                "SELECT id, conversation_id, sender_id, content, sent_at, is_read
                 FROM messages WHERE conversation_id = ?1
                 ORDER BY sent_at, rowid",
            )?;

            let rows = stmt
                .query_map([&conversation.id], |row| {
                    Ok(MessageRow {
                        id: row.get(0)?,
                        conversation_id: row.get(1)?,
                        sender_id: row.get(2)?,
                        content: row.get(3)?,
                        sent_at: row.get(4)?,
                        is_read: row.get(5)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// Bulk false→true on every unread message from the peer. Idempotent;
    /// returns the number of rows flipped.
    pub fn mark_read(&self, conversation_id: Uuid, reader_id: Uuid) -> Result<u64> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let conversation = require_conversation(&tx, conversation_id)?;
            other_participant(&conversation, reader_id, conversation_id)?;

            let changed = tx.execute(
                "UPDATE messages SET is_read = 1
                 WHERE conversation_id = ?1 AND sender_id <> ?2 AND is_read = 0",
                [&conversation.id, &reader_id.to_string()],
            )?;

            tx.commit()?;
            Ok(changed as u64)
        })
    }

    /// Authoritative unread state: conversations holding at least one unread
    /// message from the peer, with counts. Clients reconcile against this.
    pub fn unread_summary(&self, user_id: Uuid) -> Result<Vec<UnreadRow>> {
        self.with_conn(|conn| {
            let uid = user_id.to_string();
            let mut stmt = conn.prepare(
                "SELECT m.conversation_id, COUNT(*)
                 FROM messages m
                 JOIN conversations c ON c.id = m.conversation_id
                 WHERE m.is_read = 0 AND m.sender_id <> ?1
                   AND (c.user_a_id = ?1 OR c.user_b_id = ?1)
                 GROUP BY m.conversation_id",
            )?;

            let rows = stmt
                .query_map([&uid], |row| {
                    Ok(UnreadRow {
                        conversation_id: row.get(0)?,
                        unread_count: row.get::<_, i64>(1)? as u64,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// All conversations for a user with the other participant's name.
    pub fn conversations_for(&self, user_id: Uuid) -> Result<Vec<PairSummaryRow>> {
        self.with_conn(|conn| {
            let uid = user_id.to_string();
            let mut stmt = conn.prepare(
                "SELECT c.id, other.id, other.username, c.created_at
                 FROM conversations c
                 JOIN users other ON other.id =
                     CASE WHEN c.user_a_id = ?1 THEN c.user_b_id ELSE c.user_a_id END
                 WHERE c.user_a_id = ?1 OR c.user_b_id = ?1
                 ORDER BY c.created_at DESC",
            )?;

            let rows = stmt
                .query_map([&uid], |row| {
                    Ok(PairSummaryRow {
                        id: row.get(0)?,
                        other_user_id: row.get(1)?,
                        other_user_name: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }
}

fn find_conversation_by_pair(
    conn: &Connection,
    user_a: Uuid,
    user_b: Uuid,
) -> Result<Option<ConversationRow>> {
    let (a, b) = (user_a.to_string(), user_b.to_string());
    let mut stmt = conn.prepare(
        "SELECT id, user_a_id, user_b_id, created_at FROM conversations
         WHERE (user_a_id = ?1 AND user_b_id = ?2)
            OR (user_a_id = ?2 AND user_b_id = ?1)",
    )?;

    let row = stmt
        .query_row([&a, &b], |row| {
            Ok(ConversationRow {
                id: row.get(0)?,
                user_a_id: row.get(1)?,
                user_b_id: row.get(2)?,
                created_at: row.get(3)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn require_conversation(conn: &Connection, conversation_id: Uuid) -> Result<ConversationRow> {
    let mut stmt = conn.prepare(
        "SELECT id, user_a_id, user_b_id, created_at FROM conversations WHERE id = ?1",
    )?;

    stmt.query_row([conversation_id.to_string()], |row| {
        Ok(ConversationRow {
            id: row.get(0)?,
            user_a_id: row.get(1)?,
            user_b_id: row.get(2)?,
            created_at: row.get(3)?,
        })
    })
    .optional()?
    .ok_or(StoreError::ConversationNotFound(conversation_id))
}

/// Returns the other participant's id, or Forbidden if `user_id` is neither.
fn other_participant(
    conversation: &ConversationRow,
    user_id: Uuid,
    conversation_id: Uuid,
) -> Result<String> {
    let uid = user_id.to_string();
    if conversation.user_a_id == uid {
        Ok(conversation.user_b_id.clone())
    } else if conversation.user_b_id == uid {
        Ok(conversation.user_a_id.clone())
    } else {
        Err(StoreError::NotParticipant {
            user_id,
            conversation_id,
        })
    }
}
