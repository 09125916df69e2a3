use crate::errors::UpstreamError;
use crate::types::{AppId, RawGame, RawGlobalStat, RawSchemaEntry, RawUserAchievement};
use crate::upstream::UpstreamApi;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StubEndpoint {
    OwnedGames,
    UserAchievements,
    GlobalPercentages,
    Schema,
}

/// In-memory upstream with per-call counting and failure injection.
#[derive(Default)]
pub struct StubUpstream {
    games: Vec<RawGame>,
    schema: HashMap<AppId, Vec<RawSchemaEntry>>,
    global: HashMap<AppId, Vec<RawGlobalStat>>,
    user: HashMap<AppId, Vec<RawUserAchievement>>,
    // (endpoint, app id) pairs that fail; app id 0 for owned games
    failures: HashSet<(StubEndpoint, AppId)>,
    // Per-app artificial latency, used to complete games out of order
    delays: HashMap<AppId, Duration>,
    endpoint_delays: HashMap<StubEndpoint, Duration>,
    calls: AtomicUsize,
}

impl StubUpstream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_game(mut self, app_id: AppId, name: &str, playtime: u64) -> Self {
        self.games.push(RawGame {
            appid: app_id,
            name: name.into(),
            playtime_forever: playtime,
            playtime_2weeks: None,
            img_icon_url: format!("icon{app_id}"),
            has_community_visible_stats: true,
            rtime_last_played: None,
        });
        self
    }

    pub fn with_schema(mut self, app_id: AppId, names: &[&str]) -> Self {
        let entries = names
            .iter()
            .map(|name| RawSchemaEntry {
                name: name.to_string(),
                display_name: format!("{name} display"),
                description: String::new(),
                hidden: Some(false),
                icon: format!("https://cdn.example.com/{name}.jpg"),
                icongray: format!("https://cdn.example.com/{name}_gray.jpg"),
            })
            .collect();
        self.schema.insert(app_id, entries);
        self
    }

    pub fn with_global(mut self, app_id: AppId, stats: &[(&str, f64)]) -> Self {
        let stats = stats
            .iter()
            .map(|(name, percent)| RawGlobalStat {
                name: name.to_string(),
                percent: *percent,
            })
            .collect();
        self.global.insert(app_id, stats);
        self
    }

    pub fn with_unlocked(mut self, app_id: AppId, unlocked: &[(&str, i64)]) -> Self {
        let achievements = unlocked
            .iter()
            .map(|(name, time)| RawUserAchievement {
                apiname: name.to_string(),
                achieved: true,
                unlocktime: Some(*time),
            })
            .collect();
        self.user.insert(app_id, achievements);
        self
    }

    pub fn failing(mut self, endpoint: StubEndpoint, app_id: AppId) -> Self {
        self.failures.insert((endpoint, app_id));
        self
    }

    pub fn with_delay(mut self, app_id: AppId, delay: Duration) -> Self {
        self.delays.insert(app_id, delay);
        self
    }

    pub fn with_endpoint_delay(mut self, endpoint: StubEndpoint, delay: Duration) -> Self {
        self.endpoint_delays.insert(endpoint, delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn enter(&self, endpoint: StubEndpoint, app_id: AppId) -> Result<(), UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.delays.get(&app_id).copied().unwrap_or_default()
            + self.endpoint_delays.get(&endpoint).copied().unwrap_or_default();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.failures.contains(&(endpoint, app_id)) {
            return Err(UpstreamError::network("stub", "request timed out"));
        }
        Ok(())
    }
}

#[async_trait]
impl UpstreamApi for StubUpstream {
    async fn fetch_owned_games(&self, _user_id: &str) -> Result<Vec<RawGame>, UpstreamError> {
        self.enter(StubEndpoint::OwnedGames, 0).await?;
        Ok(self.games.clone())
    }

    async fn fetch_user_achievements(
        &self,
        _user_id: &str,
        app_id: AppId,
    ) -> Result<Vec<RawUserAchievement>, UpstreamError> {
        self.enter(StubEndpoint::UserAchievements, app_id).await?;
        Ok(self.user.get(&app_id).cloned().unwrap_or_default())
    }

    async fn fetch_global_percentages(
        &self,
        app_id: AppId,
    ) -> Result<Vec<RawGlobalStat>, UpstreamError> {
        self.enter(StubEndpoint::GlobalPercentages, app_id).await?;
        Ok(self.global.get(&app_id).cloned().unwrap_or_default())
    }

    async fn fetch_schema(&self, app_id: AppId) -> Result<Vec<RawSchemaEntry>, UpstreamError> {
        self.enter(StubEndpoint::Schema, app_id).await?;
        Ok(self.schema.get(&app_id).cloned().unwrap_or_default())
    }
}
