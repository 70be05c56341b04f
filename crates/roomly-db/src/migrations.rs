use crate::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            username    TEXT NOT NULL UNIQUE,
            password    TEXT NOT NULL,
            budget      INTEGER NOT NULL DEFAULT 0,
            cleanliness INTEGER NOT NULL DEFAULT 3,
            smoker      INTEGER NOT NULL DEFAULT 0,
            night_owl   INTEGER NOT NULL DEFAULT 0,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- Directional like/pass decisions. At most one kind per (actor, target);
        -- an upsert replaces the kind. Rows are never deleted.
        CREATE TABLE IF NOT EXISTS user_actions (
            actor_id    TEXT NOT NULL REFERENCES users(id),
            target_id   TEXT NOT NULL REFERENCES users(id),
            kind        TEXT NOT NULL CHECK (kind IN ('like', 'pass')),
            created_at  TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (actor_id, target_id),
            CHECK (actor_id <> target_id)
        );

        CREATE INDEX IF NOT EXISTS idx_actions_target
            ON user_actions(target_id, actor_id);

        -- Canonically ordered pair; the UNIQUE constraint arbitrates
        -- concurrent mutual likes. Rows are never deleted, only deactivated.
        CREATE TABLE IF NOT EXISTS matches (
            id            TEXT PRIMARY KEY,
            user_low_id   TEXT NOT NULL REFERENCES users(id),
            user_high_id  TEXT NOT NULL REFERENCES users(id),
            created_at    TEXT NOT NULL DEFAULT (datetime('now')),
            is_active     INTEGER NOT NULL DEFAULT 1,
            UNIQUE (user_low_id, user_high_id),
            CHECK (user_low_id < user_high_id)
        );

        -- Pair is stored in creation order (not canonicalized); the expression
        -- index still guarantees one conversation per unordered pair.
        CREATE TABLE IF NOT EXISTS conversations (
            id          TEXT PRIMARY KEY,
            user_a_id   TEXT NOT NULL REFERENCES users(id),
            user_b_id   TEXT NOT NULL REFERENCES users(id),
            created_at  TEXT NOT NULL DEFAULT (datetime('now')),
            CHECK (user_a_id <> user_b_id)
        );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_conversations_pair
            ON conversations (MIN(user_a_id, user_b_id), MAX(user_a_id, user_b_id));

        CREATE TABLE IF NOT EXISTS messages (
            id               TEXT PRIMARY KEY,
            conversation_id  TEXT NOT NULL REFERENCES conversations(id),
            sender_id        TEXT NOT NULL REFERENCES users(id),
            content          TEXT NOT NULL,
            sent_at          TEXT NOT NULL,
            is_read          INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_messages_conversation
            ON messages(conversation_id, sent_at);

        CREATE INDEX IF NOT EXISTS idx_messages_unread
            ON messages(conversation_id, is_read);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
