//! Client-side notification cache: a locally persisted set of conversation
//! ids with unread messages, plus the badge total derived from it.
//!
//! The cache is a weakly consistent replica of the server's unread summary.
//! Gateway events update it incrementally; `sync_from_server` replaces it
//! wholesale with the authoritative snapshot on login and reconnect. Between
//! syncs it may drift (hub delivery is best-effort), so UI surfaces must
//! tolerate a resync changing it under them.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedState {
    unread: HashSet<Uuid>,
}

pub struct NotificationCache {
    path: PathBuf,
    unread: HashSet<Uuid>,
}

impl NotificationCache {
    /// Load the persisted set, or start empty. A missing or corrupt file is
    /// never fatal: the next server sync restores correct state anyway.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let unread = match fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice::<PersistedState>(&bytes) {
                Ok(state) => state.unread,
                Err(e) => {
                    warn!("Discarding corrupt notification cache {}: {}", path.display(), e);
                    HashSet::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashSet::new(),
            Err(e) => {
                warn!("Cannot read notification cache {}: {}", path.display(), e);
                HashSet::new()
            }
        };

        debug!(
            "Notification cache loaded, {} unread conversations",
            unread.len()
        );
        Self { path, unread }
    }

    /// Replace the whole set with the server's snapshot. This is the
    /// authoritative reconciliation path, called on login and reconnect.
    pub fn sync_from_server(&mut self, ids: &[Uuid]) {
        self.unread = ids.iter().copied().collect();
        self.persist();
    }

    /// Handle a new-message notification. Returns true if the conversation
    /// was newly marked unread.
    pub fn add_unread(&mut self, conversation_id: Uuid) -> bool {
        let changed = self.unread.insert(conversation_id);
        if changed {
            self.persist();
        }
        changed
    }

    /// The user opened the conversation. Returns true if it was unread.
    pub fn mark_read(&mut self, conversation_id: Uuid) -> bool {
        let changed = self.unread.remove(&conversation_id);
        if changed {
            self.persist();
        }
        changed
    }

    pub fn clear_all(&mut self) {
        if !self.unread.is_empty() {
            self.unread.clear();
            self.persist();
        }
    }

    pub fn has_unread(&self, conversation_id: Uuid) -> bool {
        self.unread.contains(&conversation_id)
    }

    /// Badge counter: number of conversations with unread messages.
    pub fn total_unread(&self) -> usize {
        self.unread.len()
    }

    pub fn unread_ids(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.unread.iter().copied()
    }

    /// Write-through persistence. A failed write keeps the in-memory state
    /// and logs; the cache must never take the UI down.
    fn persist(&self) {
        if let Err(e) = self.write_to_disk() {
            warn!(
                "Failed to persist notification cache {}: {}",
                self.path.display(),
                e
            );
        }
    }

    fn write_to_disk(&self) -> Result<(), CacheError> {
        let state = PersistedState {
            unread: self.unread.clone(),
        };
        let bytes = serde_json::to_vec(&state)?;

        // Write to a sibling temp file, then rename, so a crash mid-write
        // never leaves a truncated cache behind.
        let tmp = temp_path(&self.path);
        fs::write(&tmp, &bytes)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_path() -> PathBuf {
        std::env::temp_dir().join(format!("roomly-notify-test-{}.json", Uuid::new_v4()))
    }

    #[test]
    fn starts_empty_without_a_file() {
        let cache = NotificationCache::load(scratch_path());
        assert_eq!(cache.total_unread(), 0);
    }

    #[test]
    fn add_and_mark_read_update_the_set() {
        let path = scratch_path();
        let mut cache = NotificationCache::load(path.clone());
        let conv = Uuid::new_v4();

        assert!(cache.add_unread(conv));
        assert!(!cache.add_unread(conv)); // idempotent
        assert!(cache.has_unread(conv));
        assert_eq!(cache.total_unread(), 1);

        assert!(cache.mark_read(conv));
        assert!(!cache.mark_read(conv)); // idempotent
        assert_eq!(cache.total_unread(), 0);

        let _ = fs::remove_file(path);
    }

    #[test]
    fn sync_replaces_the_whole_set() {
        let path = scratch_path();
        let mut cache = NotificationCache::load(path.clone());

        let stale = Uuid::new_v4();
        cache.add_unread(stale);

        let fresh = [Uuid::new_v4(), Uuid::new_v4()];
        cache.sync_from_server(&fresh);

        assert!(!cache.has_unread(stale));
        assert_eq!(cache.total_unread(), 2);
        assert!(fresh.iter().all(|id| cache.has_unread(*id)));

        let _ = fs::remove_file(path);
    }

    #[test]
    fn state_survives_a_reload() {
        let path = scratch_path();
        let conv = Uuid::new_v4();

        {
            let mut cache = NotificationCache::load(path.clone());
            cache.add_unread(conv);
        }

        let reloaded = NotificationCache::load(path.clone());
        assert!(reloaded.has_unread(conv));
        assert_eq!(reloaded.total_unread(), 1);

        let _ = fs::remove_file(path);
    }

    #[test]
    fn corrupt_file_is_discarded_not_fatal() {
        let path = scratch_path();
        fs::write(&path, b"{ not json").unwrap();

        let cache = NotificationCache::load(path.clone());
        assert_eq!(cache.total_unread(), 0);

        let _ = fs::remove_file(path);
    }

    #[test]
    fn clear_all_empties_and_persists() {
        let path = scratch_path();
        let mut cache = NotificationCache::load(path.clone());
        cache.add_unread(Uuid::new_v4());
        cache.add_unread(Uuid::new_v4());

        cache.clear_all();
        assert_eq!(cache.total_unread(), 0);

        let reloaded = NotificationCache::load(path.clone());
        assert_eq!(reloaded.total_unread(), 0);

        let _ = fs::remove_file(path);
    }
}
