//! Bounded in-memory results cache
//!
//! Each pipeline run gets a generated id; the rendered result is inserted
//! once and read until it expires. Entries are never mutated after
//! insertion. Eviction runs on insert: expired entries first, then the
//! oldest entries until the configured capacity holds.

use crate::config::CacheConfig;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct CachedResult {
    pub patient_name: String,
    pub mode: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

struct Entry {
    result: CachedResult,
    expires_at: DateTime<Utc>,
}

pub struct ResultsCache {
    max_entries: usize,
    ttl: Duration,
    entries: Mutex<HashMap<String, Entry>>,
}

impl ResultsCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            max_entries: config.max_entries.max(1),
            ttl: Duration::seconds(config.ttl_secs.max(1)),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Insert a result and return its generated id.
    pub fn insert(&self, result: CachedResult) -> String {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());

        entries.retain(|_, entry| entry.expires_at > now);

        // Capacity still exceeded after expiry sweep: drop oldest first
        while entries.len() >= self.max_entries {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.result.created_at)
                .map(|(id, _)| id.clone());
            match oldest {
                Some(oldest_id) => {
                    debug!(evicted = %oldest_id, "Evicting oldest cached result");
                    entries.remove(&oldest_id);
                }
                None => break,
            }
        }

        entries.insert(
            id.clone(),
            Entry {
                result,
                expires_at: now + self.ttl,
            },
        );
        id
    }

    /// Fetch a cached result; None once expired or evicted.
    pub fn get(&self, id: &str) -> Option<CachedResult> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries
            .get(id)
            .filter(|entry| entry.expires_at > Utc::now())
            .map(|entry| entry.result.clone())
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(max_entries: usize, ttl_secs: i64) -> ResultsCache {
        ResultsCache::new(&CacheConfig {
            max_entries,
            ttl_secs,
        })
    }

    fn result(message: &str) -> CachedResult {
        CachedResult {
            patient_name: "Jane Doe".to_string(),
            mode: "chat".to_string(),
            message: message.to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_insert_then_get_round_trip() {
        let cache = cache(8, 60);
        let id = cache.insert(result("hello"));
        let cached = cache.get(&id).unwrap();
        assert_eq!(cached.message, "hello");
        assert_eq!(cached.mode, "chat");
    }

    #[test]
    fn test_unknown_id_is_none() {
        let cache = cache(8, 60);
        assert!(cache.get("no-such-id").is_none());
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let cache = cache(2, 60);
        let mut first = result("first");
        first.created_at = Utc::now() - Duration::seconds(30);
        let first_id = cache.insert(first);
        let second_id = cache.insert(result("second"));
        let third_id = cache.insert(result("third"));

        assert!(cache.get(&first_id).is_none(), "oldest entry evicted");
        assert!(cache.get(&second_id).is_some());
        assert!(cache.get(&third_id).is_some());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_ids_are_unique() {
        let cache = cache(8, 60);
        let a = cache.insert(result("a"));
        let b = cache.insert(result("b"));
        assert_ne!(a, b);
    }
}
