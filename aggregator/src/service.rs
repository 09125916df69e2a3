use crate::catalog;
use crate::errors::UpstreamError;
use crate::merge::merge_achievements;
use crate::metrics_defs::ACHIEVEMENT_MERGE_DEGRADED;
use crate::types::{AchievementRecord, AppId, GameAchievements, UserGames};
use crate::upstream::UpstreamApi;
use futures::stream::{self, StreamExt};
use shared::counter;
use std::sync::Arc;

struct ServiceInner {
    upstream: Arc<dyn UpstreamApi>,
    // Upper bound on games whose achievements are fetched at the same time
    achievement_concurrency: usize,
}

/// Aggregates owned games and per-game achievements from the upstream API.
#[derive(Clone)]
pub struct GameStatsService {
    inner: Arc<ServiceInner>,
}

impl GameStatsService {
    pub fn new(upstream: Arc<dyn UpstreamApi>, achievement_concurrency: usize) -> Self {
        GameStatsService {
            inner: Arc::new(ServiceInner {
                upstream,
                achievement_concurrency: achievement_concurrency.max(1),
            }),
        }
    }

    /// Fetches the user's owned games. When `include_achievements` is set, each
    /// game also carries its merged achievements; a game whose achievement
    /// fetch fails gets an empty list instead of failing the whole call.
    pub async fn get_user_games(
        &self,
        user_id: &str,
        include_achievements: bool,
    ) -> Result<UserGames, UpstreamError> {
        let raw_games = self.inner.upstream.fetch_owned_games(user_id).await?;
        let games = catalog::transform_games(&raw_games);

        if !include_achievements {
            return Ok(UserGames::new(games));
        }

        // `buffered` yields results in input order regardless of completion order.
        let games = stream::iter(games)
            .map(|game| async move {
                let achievements = self.achievements_or_empty(user_id, game.app_id).await;
                game.with_achievements(achievements)
            })
            .buffered(self.inner.achievement_concurrency)
            .collect::<Vec<_>>()
            .await;

        Ok(UserGames::new(games))
    }

    /// Fetches and merges achievements for a single game. Upstream failures propagate.
    pub async fn get_game_achievements(
        &self,
        user_id: &str,
        app_id: AppId,
    ) -> Result<GameAchievements, UpstreamError> {
        let achievements = self.merged_achievements(user_id, app_id).await?;
        Ok(GameAchievements::new(achievements))
    }

    /// Issues the three fetches concurrently and waits for all of them. Any
    /// failure abandons the merge; there is no partial merge of the others.
    async fn merged_achievements(
        &self,
        user_id: &str,
        app_id: AppId,
    ) -> Result<Vec<AchievementRecord>, UpstreamError> {
        let upstream = &self.inner.upstream;
        let (schema, global, user) = tokio::join!(
            upstream.fetch_schema(app_id),
            upstream.fetch_global_percentages(app_id),
            upstream.fetch_user_achievements(user_id, app_id),
        );

        Ok(merge_achievements(schema?, global?, user?))
    }

    async fn achievements_or_empty(&self, user_id: &str, app_id: AppId) -> Vec<AchievementRecord> {
        match self.merged_achievements(user_id, app_id).await {
            Ok(achievements) => achievements,
            Err(e) => {
                counter!(ACHIEVEMENT_MERGE_DEGRADED).increment(1);
                tracing::warn!(
                    app_id,
                    error = %e,
                    "Failed to fetch achievements, returning an empty list"
                );
                Vec::new()
            }
        }
    }
}
