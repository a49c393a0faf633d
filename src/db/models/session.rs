use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A walk session row. `id` is assigned by SQLite at insert time and is the
/// stable key every trace point for the walk refers to.
///
/// `duration_seconds` stays 0 until the walk is finalized; `distance_km` is
/// derived from the trace and overwritten on every recomputation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: i64,
    pub duration_seconds: u64,
    pub distance_km: f64,
    pub created_at: DateTime<Utc>,
}
