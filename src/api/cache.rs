//! Small per-endpoint response cache with TTL.
//!
//! Guards hot operator read endpoints from hammering the registry. Short
//! critical sections only; the lock is never held across I/O.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub struct ResponseCache {
    entries: Mutex<HashMap<String, (Instant, serde_json::Value)>>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Cached value for `key` if it is younger than `ttl`.
    pub fn get(&self, key: &str, ttl: Duration) -> Option<serde_json::Value> {
        let entries = match self.entries.lock() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.get(key).and_then(|(stored_at, value)| {
            if stored_at.elapsed() < ttl {
                Some(value.clone())
            } else {
                None
            }
        })
    }

    pub fn put(&self, key: &str, value: serde_json::Value) {
        let mut entries = match self.entries.lock() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.insert(key.to_string(), (Instant::now(), value));
    }

    /// Drop a key after a mutation so readers see fresh data.
    pub fn invalidate(&self, key: &str) {
        let mut entries = match self.entries.lock() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.remove(key);
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_expire_after_the_ttl() {
        let cache = ResponseCache::new();
        cache.put("agents", serde_json::json!([1, 2, 3]));

        assert!(cache.get("agents", Duration::from_secs(60)).is_some());
        assert!(cache.get("agents", Duration::ZERO).is_none());
        assert!(cache.get("missing", Duration::from_secs(60)).is_none());
    }

    #[test]
    fn invalidation_removes_the_entry() {
        let cache = ResponseCache::new();
        cache.put("targets", serde_json::json!({}));
        cache.invalidate("targets");
        assert!(cache.get("targets", Duration::from_secs(60)).is_none());
    }
}
