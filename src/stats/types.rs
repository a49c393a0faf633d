use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Minimum daily active walking time for a 100% day.
pub const DAILY_TARGET_SECS: u64 = 1800;
/// Days at 100% needed for the weekly achievement.
pub const WEEKLY_TARGET_DAYS: u32 = 4;

/// One calendar day of the current Sunday-aligned week.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DailyStat {
    pub date: NaiveDate,
    pub session_count: u32,
    pub total_duration_seconds: u64,
    /// 0-100, capped.
    pub achievement_percent: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyAchievement {
    pub completed_days: u32,
    pub achieved: bool,
    pub achievement_percent: u8,
}

/// Everything a dashboard view needs in one read.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyOverview {
    pub days: Vec<DailyStat>,
    pub weekly: WeeklyAchievement,
}
