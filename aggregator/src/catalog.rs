//! Maps raw owned-games entries into canonical game records.

use crate::types::{AppId, GameRecord, Playtime, RawGame};
use chrono::{DateTime, Utc};

const ICON_URL_BASE: &str = "https://media.steampowered.com/steamcommunity/public/images/apps";
const COVER_URL_BASE: &str = "https://cdn.cloudflare.steamstatic.com/steam/apps";

pub fn icon_url(app_id: AppId, icon_hash: &str) -> String {
    if icon_hash.is_empty() {
        return String::new();
    }
    format!("{ICON_URL_BASE}/{app_id}/{icon_hash}.jpg")
}

pub fn cover_url(app_id: AppId) -> String {
    format!("{COVER_URL_BASE}/{app_id}/header.jpg")
}

/// Zero means "never played" upstream and maps to no value at all.
fn last_played(epoch_secs: Option<i64>) -> Option<DateTime<Utc>> {
    epoch_secs
        .filter(|secs| *secs > 0)
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
}

pub fn transform_game(raw: &RawGame) -> GameRecord {
    GameRecord {
        app_id: raw.appid,
        name: raw.name.clone(),
        playtime: Playtime {
            total: raw.playtime_forever,
            two_weeks: raw.playtime_2weeks,
        },
        icon_url: icon_url(raw.appid, &raw.img_icon_url),
        cover_url: cover_url(raw.appid),
        has_community_visible_stats: raw.has_community_visible_stats,
        last_played: last_played(raw.rtime_last_played),
        achievements: None,
    }
}

/// Checks a record against the shape callers expect. Problems are reported
/// but never block the response.
pub fn shape_issues(record: &GameRecord) -> Vec<&'static str> {
    let mut issues = Vec::new();
    if record.app_id == 0 {
        issues.push("appId must be positive");
    }
    if record.name.trim().is_empty() {
        issues.push("name is empty");
    }
    if record.icon_url.is_empty() {
        issues.push("iconUrl is empty");
    }
    issues
}

pub fn transform_games(raw_games: &[RawGame]) -> Vec<GameRecord> {
    raw_games
        .iter()
        .map(|raw| {
            let record = transform_game(raw);
            let issues = shape_issues(&record);
            if !issues.is_empty() {
                tracing::warn!(
                    app_id = record.app_id,
                    issues = ?issues,
                    "Game record does not match the expected shape"
                );
            }
            record
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_game() -> RawGame {
        RawGame {
            appid: 440,
            name: "Team Fortress 2".into(),
            playtime_forever: 1234,
            playtime_2weeks: Some(60),
            img_icon_url: "e3f595a92552da3d664ad00277fad2107345f743".into(),
            has_community_visible_stats: true,
            rtime_last_played: Some(1700000000),
        }
    }

    #[test]
    fn test_transform_game() {
        let record = transform_game(&raw_game());

        assert_eq!(record.app_id, 440);
        assert_eq!(record.name, "Team Fortress 2");
        assert_eq!(record.playtime.total, 1234);
        assert_eq!(record.playtime.two_weeks, Some(60));
        assert_eq!(
            record.icon_url,
            "https://media.steampowered.com/steamcommunity/public/images/apps/440/e3f595a92552da3d664ad00277fad2107345f743.jpg"
        );
        assert_eq!(
            record.cover_url,
            "https://cdn.cloudflare.steamstatic.com/steam/apps/440/header.jpg"
        );
        assert!(record.has_community_visible_stats);
        assert_eq!(
            record.last_played,
            DateTime::from_timestamp(1700000000, 0)
        );
        assert_eq!(record.achievements, None);
        assert!(shape_issues(&record).is_empty());
    }

    #[test]
    fn test_last_played_absent_or_zero() {
        let mut raw = raw_game();
        raw.rtime_last_played = Some(0);
        assert_eq!(transform_game(&raw).last_played, None);

        raw.rtime_last_played = None;
        let record = transform_game(&raw);
        assert_eq!(record.last_played, None);

        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("lastPlayed").is_none());
    }

    #[test]
    fn test_lenient_transform() {
        // Shape problems are reported but the record is still produced.
        let mut raw = raw_game();
        raw.name = "".into();
        raw.img_icon_url = "".into();

        let records = transform_games(&[raw]);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].icon_url, "");
        assert_eq!(
            shape_issues(&records[0]),
            vec!["name is empty", "iconUrl is empty"]
        );
    }

    #[test]
    fn test_transform_preserves_order() {
        let mut second = raw_game();
        second.appid = 570;
        let records = transform_games(&[raw_game(), second]);
        let ids: Vec<_> = records.iter().map(|r| r.app_id).collect();
        assert_eq!(ids, vec![440, 570]);
    }
}
