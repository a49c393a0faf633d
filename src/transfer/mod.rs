//! Import/export of the full session+trace dataset as a versioned JSON
//! envelope. Structural validation happens before any row is written;
//! individual bad rows during import are skipped and counted, never fatal.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::db::{helpers::parse_phase, Database, Phase, Session, TracePoint};

pub const ENVELOPE_VERSION: &str = "1.0";
pub const APP_NAME: &str = "stridelog";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportEnvelope {
    pub version: String,
    pub exported_at: DateTime<Utc>,
    pub app_name: String,
    pub data: ExportData,
    pub metadata: ExportMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportData {
    pub sessions: Vec<ExportedSession>,
    pub locations: Vec<ExportedLocation>,
}

/// Session row in the envelope. `id`, `duration` and `created_at` are
/// required; deserialization failure is a structural violation that aborts
/// the whole import.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportedSession {
    pub id: i64,
    /// Seconds.
    pub duration: u64,
    #[serde(default)]
    pub distance: Option<f64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportedLocation {
    #[serde(default)]
    pub id: Option<i64>,
    pub session_id: i64,
    pub latitude: f64,
    pub longitude: f64,
    /// Epoch milliseconds.
    pub timestamp: i64,
    #[serde(default)]
    pub phase: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportMetadata {
    pub total_sessions: usize,
    pub total_locations: usize,
    pub date_range: DateRange,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DateRange {
    pub earliest: Option<DateTime<Utc>>,
    pub latest: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ImportMode {
    /// Skip rows whose id already exists.
    Merge,
    /// Clear both tables first.
    Replace,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub sessions_imported: usize,
    pub sessions_skipped: usize,
    pub locations_imported: usize,
    pub locations_skipped: usize,
}

/// Serializes the entire store into an envelope.
pub async fn export_dataset(db: &Database) -> Result<ExportEnvelope> {
    let sessions = db.list_all_sessions().await?;
    let points = db.list_all_trace_points().await?;

    let earliest = sessions.first().map(|s| s.created_at);
    let latest = sessions.last().map(|s| s.created_at);

    let exported_sessions: Vec<ExportedSession> = sessions
        .into_iter()
        .map(|session| ExportedSession {
            id: session.id,
            duration: session.duration_seconds,
            distance: Some(session.distance_km),
            created_at: session.created_at,
        })
        .collect();

    let exported_locations: Vec<ExportedLocation> = points
        .into_iter()
        .map(|point| ExportedLocation {
            id: point.id,
            session_id: point.session_id,
            latitude: point.latitude,
            longitude: point.longitude,
            timestamp: point.timestamp_ms,
            phase: Some(point.phase.as_str().to_string()),
            created_at: Some(point.created_at),
        })
        .collect();

    Ok(ExportEnvelope {
        version: ENVELOPE_VERSION.to_string(),
        exported_at: Utc::now(),
        app_name: APP_NAME.to_string(),
        metadata: ExportMetadata {
            total_sessions: exported_sessions.len(),
            total_locations: exported_locations.len(),
            date_range: DateRange { earliest, latest },
        },
        data: ExportData {
            sessions: exported_sessions,
            locations: exported_locations,
        },
    })
}

pub fn to_json(envelope: &ExportEnvelope) -> Result<String> {
    serde_json::to_string_pretty(envelope).context("failed to serialize export envelope")
}

/// Structural validation: the envelope shape and every row's required
/// fields. Any violation fails here, before a single row is written.
pub fn parse_envelope(json: &str) -> Result<ExportEnvelope> {
    serde_json::from_str(json).context("import envelope failed validation")
}

/// Writes an envelope into the store. Per-row failures (duplicate ids in
/// merge mode, unknown sessions, insert errors) are skipped and counted.
pub async fn import_dataset(
    db: &Database,
    envelope: &ExportEnvelope,
    mode: ImportMode,
) -> Result<ImportSummary> {
    if mode == ImportMode::Replace {
        db.delete_all()
            .await
            .context("failed to clear store for replace import")?;
    }

    let mut summary = ImportSummary::default();

    for session in &envelope.data.sessions {
        if mode == ImportMode::Merge && db.session_exists(session.id).await? {
            summary.sessions_skipped += 1;
            continue;
        }

        let record = Session {
            id: session.id,
            duration_seconds: session.duration,
            distance_km: session.distance.unwrap_or(0.0),
            created_at: session.created_at,
        };

        match db.insert_session_with_id(&record).await {
            Ok(()) => summary.sessions_imported += 1,
            Err(err) => {
                warn!("skipping session {}: {err:#}", session.id);
                summary.sessions_skipped += 1;
            }
        }
    }

    for location in &envelope.data.locations {
        if mode == ImportMode::Merge {
            if let Some(id) = location.id {
                if db.trace_point_exists(id).await? {
                    summary.locations_skipped += 1;
                    continue;
                }
            }
        }

        // Rows from older exports may lack a phase tag.
        let phase = match &location.phase {
            Some(raw) => parse_phase(raw).unwrap_or(Phase::Slow),
            None => Phase::Slow,
        };

        let record = TracePoint {
            id: location.id,
            session_id: location.session_id,
            latitude: location.latitude,
            longitude: location.longitude,
            timestamp_ms: location.timestamp,
            phase,
            created_at: location.created_at.unwrap_or_else(Utc::now),
        };

        match db.insert_trace_point(&record).await {
            Ok(()) => summary.locations_imported += 1,
            Err(err) => {
                warn!(
                    "skipping location for session {}: {err:#}",
                    location.session_id
                );
                summary.locations_skipped += 1;
            }
        }
    }

    Ok(summary)
}
