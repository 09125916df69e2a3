//! Three-way merge of achievement data.
//!
//! The schema is the only source that enumerates the full achievement set, so it
//! defines the universe of keys. Global percentages and per-user unlock state are
//! sparse overlays: entries whose key is not in the schema are dropped.
//! - Base records: built from schema fields, in schema order
//! - Global overlay: sets `global_percentage`
//! - User overlay: sets `unlocked` and `unlock_time`

use crate::types::{
    AchievementIcon, AchievementRecord, Platform, RawGlobalStat, RawSchemaEntry,
    RawUserAchievement,
};
use indexmap::IndexMap;

fn base_record(entry: RawSchemaEntry) -> AchievementRecord {
    AchievementRecord {
        api_name: entry.name,
        name: entry.display_name,
        description: entry.description,
        icon: AchievementIcon {
            default: entry.icongray,
            achieved: entry.icon,
        },
        global_percentage: 0.0,
        unlocked: false,
        unlock_time: None,
        platform: Platform::Steam,
        hidden: entry.hidden,
    }
}

pub fn merge_achievements(
    schema: Vec<RawSchemaEntry>,
    global: Vec<RawGlobalStat>,
    user: Vec<RawUserAchievement>,
) -> Vec<AchievementRecord> {
    let mut records: IndexMap<String, AchievementRecord> = IndexMap::with_capacity(schema.len());

    for entry in schema {
        records.insert(entry.name.clone(), base_record(entry));
    }

    for stat in global {
        if let Some(record) = records.get_mut(&stat.name) {
            record.global_percentage = stat.percent;
        }
    }

    for achievement in user {
        if let Some(record) = records.get_mut(&achievement.apiname) {
            record.unlocked = achievement.achieved;
            record.unlock_time = achievement
                .unlocktime
                .filter(|t| achievement.achieved && *t > 0);
        }
    }

    records.into_values().collect()
}
