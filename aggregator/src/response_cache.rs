// Response cache keyed by the externally observable request (route + query).
// A hit skips the whole aggregation pipeline, including the upstream client
// and its own request-level cache.
use crate::metrics_defs::{RESPONSE_CACHE_HIT, RESPONSE_CACHE_MISS};
use bytes::Bytes;
use moka::Expiry;
use moka::sync::Cache;
use shared::counter;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

#[derive(Clone)]
struct CachedBody {
    body: Bytes,
    ttl: Duration,
}

/// Each entry carries its own TTL, set by the endpoint that produced it.
struct PerEntryTtl;

impl Expiry<String, CachedBody> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CachedBody,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CachedBody,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

pub struct ResponseCache {
    cache: Cache<String, CachedBody>,
    default_ttl: Duration,
}

impl ResponseCache {
    pub fn new(capacity: u64, default_ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(capacity)
            .expire_after(PerEntryTtl)
            .build();

        ResponseCache { cache, default_ttl }
    }

    /// Route plus the query parameters sorted by name, form-encoded.
    pub fn request_key(route: &str, query: &BTreeMap<String, String>) -> String {
        if query.is_empty() {
            return route.to_string();
        }
        let encoded = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(query)
            .finish();
        format!("{route}?{encoded}")
    }

    pub fn get(&self, key: &str) -> Option<Bytes> {
        let body = self.cache.get(key).map(|cached| cached.body);
        let metric_def = if body.is_some() {
            RESPONSE_CACHE_HIT
        } else {
            RESPONSE_CACHE_MISS
        };
        counter!(metric_def).increment(1);
        body
    }

    /// Stores a serialized response. `None` uses the default TTL.
    pub fn set(&self, key: String, body: Bytes, ttl: Option<Duration>) {
        let ttl = ttl.unwrap_or(self.default_ttl);
        self.cache.insert(key, CachedBody { body, ttl });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_key() {
        let query = BTreeMap::from([
            ("includeAchievements".to_string(), "true".to_string()),
            ("a".to_string(), "x y".to_string()),
        ]);
        assert_eq!(
            ResponseCache::request_key("/api/users/1/games", &query),
            "/api/users/1/games?a=x+y&includeAchievements=true"
        );
        assert_eq!(
            ResponseCache::request_key("/api/users/1/games", &BTreeMap::new()),
            "/api/users/1/games"
        );
    }

    #[test]
    fn test_get_set() {
        let cache = ResponseCache::new(10, Duration::from_secs(3600));
        assert_eq!(cache.get("/a"), None);

        cache.set("/a".into(), Bytes::from_static(b"{\"ok\":true}"), None);
        assert_eq!(cache.get("/a"), Some(Bytes::from_static(b"{\"ok\":true}")));
        assert_eq!(cache.get("/b"), None);
    }

    #[test]
    fn test_per_entry_ttl() {
        let cache = ResponseCache::new(10, Duration::from_secs(3600));
        cache.set(
            "/short".into(),
            Bytes::from_static(b"1"),
            Some(Duration::from_millis(50)),
        );
        cache.set("/long".into(), Bytes::from_static(b"2"), None);

        std::thread::sleep(Duration::from_millis(120));

        assert_eq!(cache.get("/short"), None);
        assert_eq!(cache.get("/long"), Some(Bytes::from_static(b"2")));
    }

    #[test]
    fn test_overwrite_resets_ttl() {
        let cache = ResponseCache::new(10, Duration::from_secs(3600));
        cache.set(
            "/a".into(),
            Bytes::from_static(b"old"),
            Some(Duration::from_millis(50)),
        );
        cache.set("/a".into(), Bytes::from_static(b"new"), None);

        std::thread::sleep(Duration::from_millis(120));
        assert_eq!(cache.get("/a"), Some(Bytes::from_static(b"new")));
    }
}
