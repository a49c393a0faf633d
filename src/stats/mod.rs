//! Read-side achievement aggregation. Pure functions over persisted
//! sessions plus a reference instant; recomputed on every view refresh.

mod types;

pub use types::{DailyStat, WeeklyAchievement, WeeklyOverview, DAILY_TARGET_SECS, WEEKLY_TARGET_DAYS};

use anyhow::{anyhow, Result};
use chrono::{DateTime, Datelike, Days, NaiveDate, TimeZone};

use crate::db::{Database, Session};

/// The Sunday on or before `reference`.
pub fn week_start(reference: NaiveDate) -> NaiveDate {
    reference - Days::new(u64::from(reference.weekday().num_days_from_sunday()))
}

fn capped_percent(actual: f64, target: f64) -> u8 {
    let percent = (actual / target * 100.0).round();
    percent.min(100.0) as u8
}

/// Seven `DailyStat`s for the Sunday-aligned week containing `reference`.
/// Sessions are bucketed by the calendar day of their start in the
/// reference's timezone; index 0 is Sunday, index 6 the following Saturday.
pub fn daily_stats<Tz: TimeZone>(sessions: &[Session], reference: &DateTime<Tz>) -> Vec<DailyStat> {
    let start = week_start(reference.date_naive());

    let mut days: Vec<DailyStat> = (0..7)
        .map(|offset| DailyStat {
            date: start + Days::new(offset),
            session_count: 0,
            total_duration_seconds: 0,
            achievement_percent: 0,
        })
        .collect();

    for session in sessions {
        let day = session
            .created_at
            .with_timezone(&reference.timezone())
            .date_naive();
        let offset = (day - start).num_days();
        if !(0..7).contains(&offset) {
            continue;
        }

        let stat = &mut days[offset as usize];
        stat.session_count += 1;
        stat.total_duration_seconds += session.duration_seconds;
    }

    for stat in &mut days {
        stat.achievement_percent = capped_percent(
            stat.total_duration_seconds as f64,
            DAILY_TARGET_SECS as f64,
        );
    }

    days
}

pub fn weekly_achievement(days: &[DailyStat]) -> WeeklyAchievement {
    let completed_days = days
        .iter()
        .filter(|day| day.achievement_percent >= 100)
        .count() as u32;

    WeeklyAchievement {
        completed_days,
        achieved: completed_days >= WEEKLY_TARGET_DAYS,
        achievement_percent: capped_percent(
            f64::from(completed_days),
            f64::from(WEEKLY_TARGET_DAYS),
        ),
    }
}

/// Queries the store for the reference week and derives both layers.
pub async fn weekly_overview<Tz: TimeZone>(
    db: &Database,
    reference: &DateTime<Tz>,
) -> Result<WeeklyOverview> {
    let start_date = week_start(reference.date_naive());
    let end_date = start_date + Days::new(7);

    let tz = reference.timezone();
    let start = tz
        .from_local_datetime(&start_date.and_hms_opt(0, 0, 0).expect("valid midnight"))
        .earliest()
        .ok_or_else(|| anyhow!("week start does not exist in the local timezone"))?;
    let end = tz
        .from_local_datetime(&end_date.and_hms_opt(0, 0, 0).expect("valid midnight"))
        .earliest()
        .ok_or_else(|| anyhow!("week end does not exist in the local timezone"))?;

    let sessions = db
        .sessions_started_between(start.to_utc(), end.to_utc())
        .await?;

    let days = daily_stats(&sessions, reference);
    let weekly = weekly_achievement(&days);

    Ok(WeeklyOverview { days, weekly })
}
