use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::distance::GeoPoint;

/// Which half of the interval a sample was taken in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    Fast,
    Slow,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Fast => "fast",
            Phase::Slow => "slow",
        }
    }

    pub fn flipped(&self) -> Phase {
        match self {
            Phase::Fast => Phase::Slow,
            Phase::Slow => Phase::Fast,
        }
    }
}

/// One geo sample belonging to a session. Immutable once written; deleted
/// only when its session is deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TracePoint {
    pub id: Option<i64>,
    pub session_id: i64,
    pub latitude: f64,
    pub longitude: f64,
    /// Sample instant, epoch milliseconds.
    pub timestamp_ms: i64,
    pub phase: Phase,
    pub created_at: DateTime<Utc>,
}

impl TracePoint {
    pub fn position(&self) -> GeoPoint {
        GeoPoint {
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }
}
