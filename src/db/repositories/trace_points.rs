use anyhow::Result;
use rusqlite::{params, OptionalExtension, Row};

use crate::db::{
    connection::Database,
    helpers::{parse_datetime, parse_phase},
    models::TracePoint,
};

fn row_to_trace_point(row: &Row) -> Result<TracePoint> {
    let phase: String = row.get("phase")?;
    let created_at: String = row.get("created_at")?;

    Ok(TracePoint {
        id: row.get("id")?,
        session_id: row.get("session_id")?,
        latitude: row.get("latitude")?,
        longitude: row.get("longitude")?,
        timestamp_ms: row.get("timestamp")?,
        phase: parse_phase(&phase)?,
        created_at: parse_datetime(&created_at, "created_at")?,
    })
}

impl Database {
    /// Append-only insert. Points imported with an explicit id keep it;
    /// live samples pass `id: None` and take the next rowid.
    pub async fn insert_trace_point(&self, point: &TracePoint) -> Result<()> {
        let record = point.clone();
        self.execute(move |conn| {
            match record.id {
                Some(id) => {
                    conn.execute(
                        "INSERT INTO trace_points
                             (id, session_id, latitude, longitude, timestamp, phase, created_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                        params![
                            id,
                            record.session_id,
                            record.latitude,
                            record.longitude,
                            record.timestamp_ms,
                            record.phase.as_str(),
                            record.created_at.to_rfc3339(),
                        ],
                    )?;
                }
                None => {
                    conn.execute(
                        "INSERT INTO trace_points
                             (session_id, latitude, longitude, timestamp, phase, created_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                        params![
                            record.session_id,
                            record.latitude,
                            record.longitude,
                            record.timestamp_ms,
                            record.phase.as_str(),
                            record.created_at.to_rfc3339(),
                        ],
                    )?;
                }
            }
            Ok(())
        })
        .await
    }

    /// The full trace for a session in timestamp order, the order distance
    /// is accumulated in.
    pub async fn get_trace_for_session(&self, session_id: i64) -> Result<Vec<TracePoint>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, session_id, latitude, longitude, timestamp, phase, created_at
                 FROM trace_points
                 WHERE session_id = ?1
                 ORDER BY timestamp ASC",
            )?;

            let mut rows = stmt.query(params![session_id])?;
            let mut points = Vec::new();
            while let Some(row) = rows.next()? {
                points.push(row_to_trace_point(row)?);
            }

            Ok(points)
        })
        .await
    }

    pub async fn trace_point_exists(&self, point_id: i64) -> Result<bool> {
        self.execute(move |conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT id FROM trace_points WHERE id = ?1",
                    params![point_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
        .await
    }

    /// Export path: every point, grouped by session in timestamp order.
    pub async fn list_all_trace_points(&self) -> Result<Vec<TracePoint>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, session_id, latitude, longitude, timestamp, phase, created_at
                 FROM trace_points
                 ORDER BY session_id ASC, timestamp ASC",
            )?;

            let mut rows = stmt.query([])?;
            let mut points = Vec::new();
            while let Some(row) = rows.next()? {
                points.push(row_to_trace_point(row)?);
            }

            Ok(points)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::Phase;
    use chrono::Utc;

    fn test_db() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(dir.path().join("test.sqlite3")).expect("open database");
        (dir, db)
    }

    #[tokio::test]
    async fn trace_reads_back_in_timestamp_order() {
        let (_dir, db) = test_db();
        let session_id = db.insert_session(Utc::now()).await.unwrap();

        // Insert out of order on purpose.
        for (ts, phase) in [(3000, Phase::Slow), (1000, Phase::Fast), (2000, Phase::Fast)] {
            db.insert_trace_point(&TracePoint {
                id: None,
                session_id,
                latitude: 35.6812,
                longitude: 139.7671,
                timestamp_ms: ts,
                phase,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        }

        let trace = db.get_trace_for_session(session_id).await.unwrap();
        let timestamps: Vec<i64> = trace.iter().map(|p| p.timestamp_ms).collect();
        assert_eq!(timestamps, vec![1000, 2000, 3000]);
        assert!(trace.iter().all(|p| p.session_id == session_id));
        assert_eq!(trace[0].phase, Phase::Fast);
    }

    #[tokio::test]
    async fn explicit_id_is_preserved() {
        let (_dir, db) = test_db();
        let session_id = db.insert_session(Utc::now()).await.unwrap();

        db.insert_trace_point(&TracePoint {
            id: Some(777),
            session_id,
            latitude: 35.0,
            longitude: 139.0,
            timestamp_ms: 1,
            phase: Phase::Slow,
            created_at: Utc::now(),
        })
        .await
        .unwrap();

        assert!(db.trace_point_exists(777).await.unwrap());
        assert!(!db.trace_point_exists(778).await.unwrap());
    }

    #[tokio::test]
    async fn insert_rejects_unknown_session() {
        let (_dir, db) = test_db();

        let result = db
            .insert_trace_point(&TracePoint {
                id: None,
                session_id: 12345,
                latitude: 35.0,
                longitude: 139.0,
                timestamp_ms: 1,
                phase: Phase::Fast,
                created_at: Utc::now(),
            })
            .await;

        assert!(result.is_err());
    }
}
