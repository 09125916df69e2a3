use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

pub type AppId = u32;

// Raw upstream entries. Only the fields the aggregation consumes are modelled.

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct RawGame {
    pub appid: AppId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub playtime_forever: u64,
    #[serde(default)]
    pub playtime_2weeks: Option<u64>,
    #[serde(default)]
    pub img_icon_url: String,
    #[serde(default)]
    pub has_community_visible_stats: bool,
    // seconds since 1970-01-01 00:00:00 UTC, 0 when never played
    #[serde(default)]
    pub rtime_last_played: Option<i64>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct RawUserAchievement {
    pub apiname: String,
    #[serde(deserialize_with = "flag")]
    pub achieved: bool,
    #[serde(default)]
    pub unlocktime: Option<i64>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct RawGlobalStat {
    pub name: String,
    #[serde(deserialize_with = "percent")]
    pub percent: f64,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct RawSchemaEntry {
    pub name: String,
    #[serde(rename = "displayName", default)]
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, deserialize_with = "optional_flag")]
    pub hidden: Option<bool>,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub icongray: String,
}

/// The upstream encodes booleans as 0/1 integers in most places.
#[derive(Deserialize)]
#[serde(untagged)]
enum FlagRepr {
    Bool(bool),
    Int(i64),
}

impl From<FlagRepr> for bool {
    fn from(repr: FlagRepr) -> bool {
        match repr {
            FlagRepr::Bool(b) => b,
            FlagRepr::Int(i) => i != 0,
        }
    }
}

fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    FlagRepr::deserialize(deserializer).map(bool::from)
}

fn optional_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<bool>, D::Error> {
    Ok(Option::<FlagRepr>::deserialize(deserializer)?.map(bool::from))
}

/// Global percentages arrive either as numbers or as numeric strings.
fn percent<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum PercentRepr {
        Number(f64),
        Text(String),
    }

    match PercentRepr::deserialize(deserializer)? {
        PercentRepr::Number(n) => Ok(n),
        PercentRepr::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

// Canonical records returned to callers.

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Steam,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Playtime {
    /// Minutes.
    pub total: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub two_weeks: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameRecord {
    pub app_id: AppId,
    pub name: String,
    pub playtime: Playtime,
    pub icon_url: String,
    pub cover_url: String,
    pub has_community_visible_stats: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_played: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub achievements: Option<Vec<AchievementRecord>>,
}

impl GameRecord {
    pub fn with_achievements(self, achievements: Vec<AchievementRecord>) -> Self {
        GameRecord {
            achievements: Some(achievements),
            ..self
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AchievementIcon {
    pub default: String,
    pub achieved: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AchievementRecord {
    pub api_name: String,
    pub name: String,
    pub description: String,
    pub icon: AchievementIcon,
    pub global_percentage: f64,
    pub unlocked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unlock_time: Option<i64>,
    pub platform: Platform,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hidden: Option<bool>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserGames {
    pub games: Vec<GameRecord>,
    pub total_count: usize,
    /// Sum of every returned game's total playtime, in minutes.
    pub total_playtime: u64,
}

impl UserGames {
    pub fn new(games: Vec<GameRecord>) -> Self {
        let total_playtime = games.iter().map(|g| g.playtime.total).sum();
        UserGames {
            total_count: games.len(),
            total_playtime,
            games,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AchievementSummary {
    pub total: usize,
    pub unlocked: usize,
    pub percentage: f64,
}

impl AchievementSummary {
    pub fn from_records(records: &[AchievementRecord]) -> Self {
        let total = records.len();
        let unlocked = records.iter().filter(|r| r.unlocked).count();
        let percentage = if total > 0 {
            unlocked as f64 * 100.0 / total as f64
        } else {
            0.0
        };

        AchievementSummary {
            total,
            unlocked,
            percentage,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GameAchievements {
    pub achievements: Vec<AchievementRecord>,
    pub summary: AchievementSummary,
}

impl GameAchievements {
    pub fn new(achievements: Vec<AchievementRecord>) -> Self {
        let summary = AchievementSummary::from_records(&achievements);
        GameAchievements {
            achievements,
            summary,
        }
    }
}
