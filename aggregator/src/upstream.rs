use crate::errors::UpstreamError;
use crate::metrics_defs::{UPSTREAM_FAILURES, UPSTREAM_REQUEST_DURATION, UPSTREAM_REQUESTS};
use crate::request_cache::RequestCache;
use crate::types::{AppId, RawGame, RawGlobalStat, RawSchemaEntry, RawUserAchievement};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use shared::{counter, histogram};
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

/// The four upstream fetches the aggregation depends on.
#[async_trait]
pub trait UpstreamApi: Send + Sync {
    async fn fetch_owned_games(&self, user_id: &str) -> Result<Vec<RawGame>, UpstreamError>;

    async fn fetch_user_achievements(
        &self,
        user_id: &str,
        app_id: AppId,
    ) -> Result<Vec<RawUserAchievement>, UpstreamError>;

    async fn fetch_global_percentages(
        &self,
        app_id: AppId,
    ) -> Result<Vec<RawGlobalStat>, UpstreamError>;

    async fn fetch_schema(&self, app_id: AppId) -> Result<Vec<RawSchemaEntry>, UpstreamError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Endpoint {
    OwnedGames,
    PlayerAchievements,
    GlobalPercentages,
    Schema,
}

impl Endpoint {
    fn name(&self) -> &'static str {
        match self {
            Endpoint::OwnedGames => "owned_games",
            Endpoint::PlayerAchievements => "player_achievements",
            Endpoint::GlobalPercentages => "global_percentages",
            Endpoint::Schema => "schema",
        }
    }

    fn path(&self) -> &'static str {
        match self {
            Endpoint::OwnedGames => "IPlayerService/GetOwnedGames/v1/",
            Endpoint::PlayerAchievements => "ISteamUserStats/GetPlayerAchievements/v1/",
            Endpoint::GlobalPercentages => {
                "ISteamUserStats/GetGlobalAchievementPercentagesForApp/v2/"
            }
            Endpoint::Schema => "ISteamUserStats/GetSchemaForGame/v2/",
        }
    }
}

#[derive(Deserialize)]
struct OwnedGamesEnvelope {
    response: OwnedGamesBody,
}

#[derive(Deserialize)]
struct OwnedGamesBody {
    // Absent for private profiles and empty libraries
    #[serde(default)]
    games: Vec<RawGame>,
}

#[derive(Deserialize)]
struct PlayerStatsEnvelope {
    playerstats: PlayerStats,
}

#[derive(Deserialize)]
struct PlayerStats {
    #[serde(default = "default_success")]
    success: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    achievements: Vec<RawUserAchievement>,
}

fn default_success() -> bool {
    true
}

#[derive(Deserialize)]
struct GlobalPercentagesEnvelope {
    achievementpercentages: GlobalPercentagesBody,
}

#[derive(Deserialize)]
struct GlobalPercentagesBody {
    #[serde(default)]
    achievements: Vec<RawGlobalStat>,
}

#[derive(Deserialize)]
struct SchemaEnvelope {
    game: SchemaGame,
}

#[derive(Deserialize)]
struct SchemaGame {
    #[serde(rename = "availableGameStats", default)]
    available_game_stats: Option<AvailableGameStats>,
}

#[derive(Deserialize)]
struct AvailableGameStats {
    #[serde(default)]
    achievements: Vec<RawSchemaEntry>,
}

fn parse<'a, T: Deserialize<'a>>(endpoint: Endpoint, value: &'a Value) -> Result<T, UpstreamError> {
    T::deserialize(value).map_err(|e| UpstreamError::unexpected(endpoint.name(), e.to_string()))
}

/// Pulls an error code out of an upstream error body, if there is one.
/// Accepts `{"error": "..."}`, `{"error": {"code": ...}}` and
/// `{"playerstats": {"error": "..."}}`.
fn upstream_error_code(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let candidates = [
        &value["error"],
        &value["error"]["code"],
        &value["playerstats"]["error"],
    ];

    candidates.into_iter().find_map(|candidate| match candidate {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

#[derive(Clone, Debug)]
pub struct UpstreamSettings {
    pub base_url: Url,
    pub api_key: String,
    pub timeout: Duration,
    pub cache_ttl: Duration,
    pub cache_capacity: u64,
}

/// Client for the Steam Web API. Every call goes through the request cache first.
pub struct SteamClient {
    client: reqwest::Client,
    base_url: Url,
    api_key: String,
    timeout: Duration,
    cache: RequestCache,
}

impl SteamClient {
    pub fn new(settings: UpstreamSettings) -> Self {
        SteamClient {
            client: reqwest::Client::new(),
            base_url: settings.base_url,
            api_key: settings.api_key,
            timeout: settings.timeout,
            cache: RequestCache::new(settings.cache_capacity, settings.cache_ttl),
        }
    }

    fn endpoint_url(&self, endpoint: Endpoint, params: &[(&str, String)]) -> Url {
        let mut url = self.base_url.clone();
        let path = format!(
            "{}/{}",
            self.base_url.path().trim_end_matches('/'),
            endpoint.path()
        );
        url.set_path(&path);

        url.query_pairs_mut()
            .append_pair("key", &self.api_key)
            .append_pair("format", "json")
            .extend_pairs(params);
        url
    }

    /// Serves from the request cache, or performs the call and caches the raw
    /// response once it has been parsed successfully.
    async fn cached<T, F>(
        &self,
        endpoint: Endpoint,
        params: Vec<(&'static str, String)>,
        extract: F,
    ) -> Result<T, UpstreamError>
    where
        F: Fn(&Value) -> Result<T, UpstreamError>,
    {
        // The API key is deliberately not part of the key.
        let key = RequestCache::key(endpoint.name(), &params);

        if let Some(value) = self.cache.get(&key) {
            tracing::debug!(endpoint = endpoint.name(), "Request cache hit");
            return extract(&value);
        }

        let value = self.request(endpoint, &params).await?;
        let extracted = extract(&value)?;
        self.cache.insert(key, value);
        Ok(extracted)
    }

    async fn request(
        &self,
        endpoint: Endpoint,
        params: &[(&'static str, String)],
    ) -> Result<Arc<Value>, UpstreamError> {
        let started = Instant::now();
        counter!(UPSTREAM_REQUESTS).increment(1);

        let result = self.send(endpoint, params).await;
        histogram!(UPSTREAM_REQUEST_DURATION).record(started.elapsed().as_secs_f64());

        if let Err(e) = &result {
            counter!(UPSTREAM_FAILURES).increment(1);
            tracing::warn!(
                endpoint = endpoint.name(),
                kind = %e.kind,
                status = ?e.status,
                code = ?e.code,
                "Upstream request failed"
            );
        }

        result
    }

    async fn send(
        &self,
        endpoint: Endpoint,
        params: &[(&'static str, String)],
    ) -> Result<Arc<Value>, UpstreamError> {
        let url = self.endpoint_url(endpoint, params);

        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| UpstreamError::from_reqwest(endpoint.name(), e))?;

        let status = response.status();
        if !status.is_success() {
            // The body is best effort, it only serves to recover an error code.
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::http(
                endpoint.name(),
                status.as_u16(),
                upstream_error_code(&body),
            ));
        }

        let value = response
            .json::<Value>()
            .await
            .map_err(|e| UpstreamError::from_reqwest(endpoint.name(), e))?;

        Ok(Arc::new(value))
    }
}

#[async_trait]
impl UpstreamApi for SteamClient {
    async fn fetch_owned_games(&self, user_id: &str) -> Result<Vec<RawGame>, UpstreamError> {
        let endpoint = Endpoint::OwnedGames;
        let params = vec![
            ("steamid", user_id.to_string()),
            ("include_appinfo", "1".to_string()),
            ("include_played_free_games", "1".to_string()),
        ];

        self.cached(endpoint, params, |value| {
            parse::<OwnedGamesEnvelope>(endpoint, value).map(|envelope| envelope.response.games)
        })
        .await
    }

    async fn fetch_user_achievements(
        &self,
        user_id: &str,
        app_id: AppId,
    ) -> Result<Vec<RawUserAchievement>, UpstreamError> {
        let endpoint = Endpoint::PlayerAchievements;
        let params = vec![
            ("steamid", user_id.to_string()),
            ("appid", app_id.to_string()),
        ];

        self.cached(endpoint, params, |value| {
            let stats = parse::<PlayerStatsEnvelope>(endpoint, value)?.playerstats;
            if !stats.success {
                // Reported inside a 200 response, treated like an HTTP failure.
                return Err(UpstreamError::http(endpoint.name(), 200, stats.error));
            }
            Ok(stats.achievements)
        })
        .await
    }

    async fn fetch_global_percentages(
        &self,
        app_id: AppId,
    ) -> Result<Vec<RawGlobalStat>, UpstreamError> {
        let endpoint = Endpoint::GlobalPercentages;
        let params = vec![("gameid", app_id.to_string())];

        self.cached(endpoint, params, |value| {
            parse::<GlobalPercentagesEnvelope>(endpoint, value)
                .map(|envelope| envelope.achievementpercentages.achievements)
        })
        .await
    }

    async fn fetch_schema(&self, app_id: AppId) -> Result<Vec<RawSchemaEntry>, UpstreamError> {
        let endpoint = Endpoint::Schema;
        let params = vec![("appid", app_id.to_string())];

        self.cached(endpoint, params, |value| {
            parse::<SchemaEnvelope>(endpoint, value).map(|envelope| {
                envelope
                    .game
                    .available_game_stats
                    .map(|stats| stats.achievements)
                    .unwrap_or_default()
            })
        })
        .await
    }
}
