// Request-level cache for raw upstream responses, keyed by endpoint and
// canonicalized parameters. Independent from the response cache.
use crate::metrics_defs::{REQUEST_CACHE_HIT, REQUEST_CACHE_MISS};
use moka::sync::Cache;
use serde_json::Value;
use shared::counter;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

pub struct RequestCache {
    cache: Cache<String, Arc<Value>>,
}

impl RequestCache {
    pub fn new(capacity: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(capacity)
            .time_to_live(ttl)
            .build();

        RequestCache { cache }
    }

    /// Builds the cache key from the endpoint name and its parameters. Parameters
    /// are sorted by name so the key does not depend on the order they were passed in.
    pub fn key(endpoint: &str, params: &[(&str, String)]) -> String {
        let sorted: BTreeMap<&str, &str> = params.iter().map(|(k, v)| (*k, v.as_str())).collect();
        let query = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(sorted)
            .finish();
        format!("{endpoint}?{query}")
    }

    pub fn get(&self, key: &str) -> Option<Arc<Value>> {
        let value = self.cache.get(key);
        let metric_def = if value.is_some() {
            REQUEST_CACHE_HIT
        } else {
            REQUEST_CACHE_MISS
        };
        counter!(metric_def).increment(1);
        value
    }

    pub fn insert(&self, key: String, value: Arc<Value>) {
        self.cache.insert(key, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_is_order_independent() {
        let a = RequestCache::key(
            "player_achievements",
            &[("steamid", "76561197960287930".into()), ("appid", "440".into())],
        );
        let b = RequestCache::key(
            "player_achievements",
            &[("appid", "440".into()), ("steamid", "76561197960287930".into())],
        );
        assert_eq!(a, b);
        assert_eq!(a, "player_achievements?appid=440&steamid=76561197960287930");

        // Same params on another endpoint is another key
        let c = RequestCache::key("schema", &[("appid", "440".into())]);
        let d = RequestCache::key("global_percentages", &[("appid", "440".into())]);
        assert_ne!(c, d);
    }

    #[test]
    fn test_get_insert() {
        let cache = RequestCache::new(10, Duration::from_secs(60));
        assert!(cache.get("schema?appid=440").is_none());

        cache.insert("schema?appid=440".into(), Arc::new(json!({"game": {}})));
        assert_eq!(
            cache.get("schema?appid=440").as_deref(),
            Some(&json!({"game": {}}))
        );
    }

    #[test]
    fn test_expiry() {
        let cache = RequestCache::new(10, Duration::from_millis(50));
        cache.insert("schema?appid=440".into(), Arc::new(json!({})));
        assert!(cache.get("schema?appid=440").is_some());

        std::thread::sleep(Duration::from_millis(120));
        assert!(cache.get("schema?appid=440").is_none());
    }
}
