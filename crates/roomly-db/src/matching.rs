//! Like/pass actions and the mutual-match detector.
//!
//! `record_like` runs upsert-action, reciprocal check, and match creation in a
//! single transaction. Two users liking each other at the same instant may
//! both reach the match insert; the UNIQUE constraint on the canonical pair
//! decides the winner and the loser re-reads and returns the winner's row.

use crate::Database;
use crate::error::{Result, StoreError, is_unique_violation};
use crate::models::{CandidateRow, LikeOutcome, MatchRow, PairSummaryRow};
use crate::queries::{OptionalExt, parse_uuid, user_exists};
use rusqlite::Connection;
use tracing::debug;
use uuid::Uuid;

/// Fixed ordering for an unordered user pair, so one uniqueness constraint
/// covers both like directions.
pub fn canonical_pair(a: Uuid, b: Uuid) -> (String, String) {
    let (a, b) = (a.to_string(), b.to_string());
    if a < b { (a, b) } else { (b, a) }
}

impl Database {
    /// Record a like and detect a mutual match. Idempotent: repeating the like
    /// re-returns the existing outcome without new side effects.
    pub fn record_like(&self, actor_id: Uuid, target_id: Uuid) -> Result<LikeOutcome> {
        if actor_id == target_id {
            return Err(StoreError::SelfAction);
        }

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            if !user_exists(&tx, &target_id.to_string())? {
                return Err(StoreError::TargetNotFound(target_id));
            }

            upsert_action(&tx, actor_id, target_id, "like")?;

            // Reciprocal like present?
            let reciprocal: Option<String> = tx
                .query_row(
                    "SELECT kind FROM user_actions WHERE actor_id = ?1 AND target_id = ?2",
                    [target_id.to_string(), actor_id.to_string()],
                    |row| row.get(0),
                )
                .optional()?;

            if reciprocal.as_deref() != Some("like") {
                tx.commit()?;
                return Ok(LikeOutcome {
                    matched: false,
                    match_id: None,
                    newly_matched: false,
                });
            }

            let (low, high) = canonical_pair(actor_id, target_id);

            let (match_id, newly_matched) = match find_match(&tx, &low, &high)? {
                Some(existing) => {
                    // Re-like after an unmatch reactivates the original row,
                    // keeping the match id stable.
                    if !existing.is_active {
                        tx.execute(
                            "UPDATE matches SET is_active = 1 WHERE id = ?1",
                            [&existing.id],
                        )?;
                        debug!("Reactivated match {} for pair ({}, {})", existing.id, low, high);
                        (existing.id, true)
                    } else {
                        (existing.id, false)
                    }
                }
                None => {
                    let id = Uuid::new_v4().to_string();
                    let inserted = tx.execute(
                        "INSERT INTO matches (id, user_low_id, user_high_id) VALUES (?1, ?2, ?3)",
                        [&id, &low, &high],
                    );
                    match inserted {
                        Ok(_) => {
                            debug!("Created match {} for pair ({}, {})", id, low, high);
                            (id, true)
                        }
                        Err(e) if is_unique_violation(&e) => {
                            // Lost the race against the reciprocal liker;
                            // their row is the match and their call notifies.
                            let winner = find_match(&tx, &low, &high)?
                                .map(|m| m.id)
                                .ok_or_else(|| {
                                    StoreError::Internal(
                                        "match row missing after unique conflict".into(),
                                    )
                                })?;
                            (winner, false)
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
            };

            tx.commit()?;
            Ok(LikeOutcome {
                matched: true,
                match_id: Some(parse_uuid(&match_id)),
                newly_matched,
            })
        })
    }

    /// Record a pass. No match side effects; idempotent.
    pub fn record_pass(&self, actor_id: Uuid, target_id: Uuid) -> Result<()> {
        if actor_id == target_id {
            return Err(StoreError::SelfAction);
        }

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            if !user_exists(&tx, &target_id.to_string())? {
                return Err(StoreError::TargetNotFound(target_id));
            }
            upsert_action(&tx, actor_id, target_id, "pass")?;
            tx.commit()?;
            Ok(())
        })
    }

    /// Users the actor has not yet liked or passed on, oldest accounts first.
    pub fn discover_candidates(&self, actor_id: Uuid, limit: u32) -> Result<Vec<CandidateRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT u.id, u.username, u.budget, u.cleanliness, u.smoker, u.night_owl
                 FROM users u
                 WHERE u.id <> ?1
                   AND NOT EXISTS (
                       SELECT 1 FROM user_actions a
                       WHERE a.actor_id = ?1 AND a.target_id = u.id
                   )
                 ORDER BY u.created_at, u.id
                 LIMIT ?2",
            )?;

            let rows = stmt
                .query_map(rusqlite::params![actor_id.to_string(), limit], |row| {
                    Ok(CandidateRow {
                        id: row.get(0)?,
                        username: row.get(1)?,
                        budget: row.get(2)?,
                        cleanliness: row.get(3)?,
                        smoker: row.get(4)?,
                        night_owl: row.get(5)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// Active matches for a user, with the other participant's name.
    pub fn matches_for(&self, user_id: Uuid) -> Result<Vec<PairSummaryRow>> {
        self.with_conn(|conn| {
            let uid = user_id.to_string();
            let mut stmt = conn.prepare(
                "SELECT m.id, other.id, other.username, m.created_at
                 FROM matches m
                 JOIN users other ON other.id =
                     CASE WHEN m.user_low_id = ?1 THEN m.user_high_id ELSE m.user_low_id END
                 WHERE m.is_active = 1 AND (m.user_low_id = ?1 OR m.user_high_id = ?1)
                 ORDER BY m.created_at DESC",
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

    /// Administrative unmatch. The row stays (audit + id stability); only the
    /// active flag is cleared.
    pub fn deactivate_match(&self, match_id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE matches SET is_active = 0 WHERE id = ?1",
                [match_id.to_string()],
            )?;
            Ok(changed > 0)
        })
    }
}

fn upsert_action(conn: &Connection, actor_id: Uuid, target_id: Uuid, kind: &str) -> Result<()> {
    // Replaces the kind on a repeated decision; created_at keeps the original
    // decision time (the table is the audit trail for "already decided").
    conn.execute(
        "INSERT INTO user_actions (actor_id, target_id, kind) VALUES (?1, ?2, ?3)
         ON CONFLICT(actor_id, target_id) DO UPDATE SET kind = excluded.kind",
        [&actor_id.to_string(), &target_id.to_string(), &kind.to_string()],
    )?;
    Ok(())
}

fn find_match(conn: &Connection, low: &str, high: &str) -> Result<Option<MatchRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_low_id, user_high_id, created_at, is_active
         FROM matches WHERE user_low_id = ?1 AND user_high_id = ?2",
    )?;

    let row = stmt
        .query_row([low, high], |row| {
            Ok(MatchRow {
                id: row.get(0)?,
                user_low_id: row.get(1)?,
                user_high_id: row.get(2)?,
                created_at: row.get(3)?,
                is_active: row.get(4)?,
            })
        })
        .optional()?;

    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use roomly_types::models::ProfileAttributes;

    fn test_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn add_user(db: &Database, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        db.create_user(&id.to_string(), name, "hash", &ProfileAttributes::default())
            .unwrap();
        id
    }

    #[test]
    fn one_sided_like_does_not_match() {
        let db = test_db();
        let a = add_user(&db, "ana");
        let b = add_user(&db, "ben");

        let outcome = db.record_like(a, b).unwrap();
        assert!(!outcome.matched);
        assert!(outcome.match_id.is_none());
    }

    #[test]
    fn mutual_like_creates_exactly_one_match() {
        let db = test_db();
        let a = add_user(&db, "ana");
        let b = add_user(&db, "ben");

        assert!(!db.record_like(a, b).unwrap().matched);
        let outcome = db.record_like(b, a).unwrap();
        assert!(outcome.matched);
        assert!(outcome.newly_matched);
        let match_id = outcome.match_id.unwrap();

        // Repeating either like returns the same match, no duplicates.
        let again = db.record_like(a, b).unwrap();
        assert_eq!(again.match_id, Some(match_id));
        assert!(!again.newly_matched);

        let count: i64 = db
            .with_conn(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM matches", [], |r| r.get(0))?)
            })
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn concurrent_mutual_likes_agree_on_one_match() {
        let db = std::sync::Arc::new(test_db());
        let a = add_user(&db, "ana");
        let b = add_user(&db, "ben");

        let db1 = db.clone();
        let db2 = db.clone();
        let t1 = std::thread::spawn(move || db1.record_like(a, b).unwrap());
        let t2 = std::thread::spawn(move || db2.record_like(b, a).unwrap());
        let r1 = t1.join().unwrap();
        let r2 = t2.join().unwrap();

        // At least the later call observed the match; if both did, they agree.
        assert!(r1.matched || r2.matched);
        if let (Some(m1), Some(m2)) = (r1.match_id, r2.match_id) {
            assert_eq!(m1, m2);
        }

        let count: i64 = db
            .with_conn(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM matches", [], |r| r.get(0))?)
            })
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn self_like_is_rejected() {
        let db = test_db();
        let a = add_user(&db, "ana");
        assert!(matches!(db.record_like(a, a), Err(StoreError::SelfAction)));
        assert!(matches!(db.record_pass(a, a), Err(StoreError::SelfAction)));
    }

    #[test]
    fn like_on_missing_target_is_rejected() {
        let db = test_db();
        let a = add_user(&db, "ana");
        let ghost = Uuid::new_v4();
        assert!(matches!(
            db.record_like(a, ghost),
            Err(StoreError::TargetNotFound(id)) if id == ghost
        ));
    }

    #[test]
    fn duplicate_like_is_a_no_op() {
        let db = test_db();
        let a = add_user(&db, "ana");
        let b = add_user(&db, "ben");

        db.record_like(a, b).unwrap();
        db.record_like(a, b).unwrap();

        let count: i64 = db
            .with_conn(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM user_actions", [], |r| r.get(0))?)
            })
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn pass_then_like_replaces_the_decision() {
        let db = test_db();
        let a = add_user(&db, "ana");
        let b = add_user(&db, "ben");

        db.record_pass(a, b).unwrap();
        db.record_like(b, a).unwrap();
        // Ana changes her mind; the upserted like completes the pair.
        let outcome = db.record_like(a, b).unwrap();
        assert!(outcome.matched);
    }

    #[test]
    fn relike_after_unmatch_reactivates_same_row() {
        let db = test_db();
        let a = add_user(&db, "ana");
        let b = add_user(&db, "ben");

        db.record_like(a, b).unwrap();
        let match_id = db.record_like(b, a).unwrap().match_id.unwrap();

        assert!(db.deactivate_match(match_id).unwrap());
        assert!(db.matches_for(a).unwrap().is_empty());

        let outcome = db.record_like(a, b).unwrap();
        assert!(outcome.matched);
        assert!(outcome.newly_matched);
        assert_eq!(outcome.match_id, Some(match_id));
        assert_eq!(db.matches_for(a).unwrap().len(), 1);
    }

    #[test]
    fn discovery_excludes_decided_targets_and_self() {
        let db = test_db();
        let a = add_user(&db, "ana");
        let b = add_user(&db, "ben");
        let c = add_user(&db, "cho");
        let d = add_user(&db, "dan");

        db.record_like(a, b).unwrap();
        db.record_pass(a, c).unwrap();

        let candidates = db.discover_candidates(a, 10).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id, d.to_string());

        // Being liked BY someone does not hide them from your own feed.
        let for_b = db.discover_candidates(b, 10).unwrap();
        assert!(for_b.iter().any(|c| c.id == a.to_string()));
    }

    #[test]
    fn matches_list_shows_other_participant() {
        let db = test_db();
        let a = add_user(&db, "ana");
        let b = add_user(&db, "ben");

        db.record_like(a, b).unwrap();
        db.record_like(b, a).unwrap();

        let for_a = db.matches_for(a).unwrap();
        assert_eq!(for_a.len(), 1);
        assert_eq!(for_a[0].other_user_name, "ben");

        let for_b = db.matches_for(b).unwrap();
        assert_eq!(for_b[0].other_user_name, "ana");
    }
}
