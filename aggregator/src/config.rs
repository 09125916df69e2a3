use crate::upstream::UpstreamSettings;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ConfigValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("Upstream API key cannot be empty")]
    EmptyApiKey,

    #[error("Upstream timeout cannot be 0")]
    InvalidTimeout,

    #[error("Rate limit for {0} must allow at least one request per non-empty window")]
    InvalidRateLimit(&'static str),

    #[error("Achievement concurrency cannot be 0")]
    InvalidConcurrency,

    #[error("{0} must be at most {max} seconds", max = MAX_DURATION_SECS)]
    DurationTooLong(&'static str),
}

/// Upper bound for every configured window and TTL (ten years).
pub const MAX_DURATION_SECS: u64 = 10 * 365 * 24 * 60 * 60;

fn check_duration(name: &'static str, secs: u64) -> Result<(), ConfigValidationError> {
    if secs > MAX_DURATION_SECS {
        return Err(ConfigValidationError::DurationTooLong(name));
    }
    Ok(())
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct Listener {
    pub host: String,
    pub port: u16,
}

impl Default for Listener {
    fn default() -> Self {
        Listener {
            host: "127.0.0.1".into(),
            port: 3000,
        }
    }
}

fn default_base_url() -> Url {
    Url::parse("https://api.steampowered.com").expect("valid default URL")
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_cache_ttl_secs() -> u64 {
    3600
}

fn default_capacity() -> u64 {
    10_000
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct Upstream {
    #[serde(default = "default_base_url")]
    pub base_url: Url,
    pub api_key: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_capacity")]
    pub cache_capacity: u64,
}

impl Upstream {
    pub fn settings(&self) -> UpstreamSettings {
        UpstreamSettings {
            base_url: self.base_url.clone(),
            api_key: self.api_key.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
            cache_ttl: Duration::from_secs(self.cache_ttl_secs),
            cache_capacity: self.cache_capacity,
        }
    }
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
#[serde(default)]
pub struct ResponseCache {
    pub default_ttl_secs: u64,
    pub games_ttl_secs: u64,
    pub achievements_ttl_secs: u64,
    pub capacity: u64,
}

impl Default for ResponseCache {
    fn default() -> Self {
        ResponseCache {
            default_ttl_secs: 3600,
            games_ttl_secs: 300,
            achievements_ttl_secs: 600,
            capacity: default_capacity(),
        }
    }
}

#[derive(Clone, Copy, Deserialize, Debug, PartialEq)]
pub struct RateLimit {
    pub max_requests: u32,
    pub window_secs: u64,
}

impl RateLimit {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    fn validate(&self, name: &'static str) -> Result<(), ConfigValidationError> {
        if self.max_requests == 0 || self.window_secs == 0 {
            return Err(ConfigValidationError::InvalidRateLimit(name));
        }
        check_duration(name, self.window_secs)
    }
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
#[serde(default)]
pub struct RateLimits {
    pub games: RateLimit,
    pub achievements: RateLimit,
}

impl Default for RateLimits {
    fn default() -> Self {
        RateLimits {
            games: RateLimit {
                max_requests: 100,
                window_secs: 900,
            },
            achievements: RateLimit {
                max_requests: 60,
                window_secs: 60,
            },
        }
    }
}

fn default_achievement_concurrency() -> usize {
    8
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub listener: Listener,
    pub upstream: Upstream,
    #[serde(default)]
    pub response_cache: ResponseCache,
    #[serde(default)]
    pub rate_limits: RateLimits,
    #[serde(default = "default_achievement_concurrency")]
    pub achievement_concurrency: usize,
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.listener.port == 0 {
            return Err(ConfigValidationError::InvalidPort);
        }
        if self.upstream.api_key.trim().is_empty() {
            return Err(ConfigValidationError::EmptyApiKey);
        }
        if self.upstream.timeout_secs == 0 {
            return Err(ConfigValidationError::InvalidTimeout);
        }
        check_duration("upstream.timeout_secs", self.upstream.timeout_secs)?;
        check_duration("upstream.cache_ttl_secs", self.upstream.cache_ttl_secs)?;

        let cache = &self.response_cache;
        check_duration("response_cache.default_ttl_secs", cache.default_ttl_secs)?;
        check_duration("response_cache.games_ttl_secs", cache.games_ttl_secs)?;
        check_duration(
            "response_cache.achievements_ttl_secs",
            cache.achievements_ttl_secs,
        )?;

        self.rate_limits.games.validate("games")?;
        self.rate_limits.achievements.validate("achievements")?;
        if self.achievement_concurrency == 0 {
            return Err(ConfigValidationError::InvalidConcurrency);
        }
        Ok(())
    }
}
