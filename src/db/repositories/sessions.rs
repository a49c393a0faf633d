use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use crate::db::{
    connection::Database,
    helpers::{parse_datetime, to_i64, to_u64},
    models::Session,
};
use crate::distance::total_distance_km;

fn row_to_session(row: &Row) -> Result<Session> {
    let duration_seconds: i64 = row.get("duration_seconds")?;
    let created_at: String = row.get("created_at")?;

    Ok(Session {
        id: row.get("id")?,
        duration_seconds: to_u64(duration_seconds, "duration_seconds")?,
        distance_km: row.get("distance_km")?,
        created_at: parse_datetime(&created_at, "created_at")?,
    })
}

impl Database {
    /// Creates the session row with zeroed duration/distance and returns the
    /// id SQLite assigned. Every later write for the walk references this id.
    pub async fn insert_session(&self, created_at: DateTime<Utc>) -> Result<i64> {
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO sessions (duration_seconds, distance_km, created_at)
                 VALUES (0, 0, ?1)",
                params![created_at.to_rfc3339()],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    /// Import path: inserts a session preserving its exported id.
    pub async fn insert_session_with_id(&self, session: &Session) -> Result<()> {
        let record = session.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO sessions (id, duration_seconds, distance_km, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    record.id,
                    to_i64(record.duration_seconds)?,
                    record.distance_km,
                    record.created_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    /// Finalizes a session: update in place, never a second insert.
    pub async fn update_session_totals(
        &self,
        session_id: i64,
        duration_seconds: u64,
        distance_km: f64,
    ) -> Result<()> {
        self.execute(move |conn| {
            let rows_affected = conn.execute(
                "UPDATE sessions
                 SET duration_seconds = ?1,
                     distance_km = ?2
                 WHERE id = ?3",
                params![to_i64(duration_seconds)?, distance_km, session_id],
            )?;

            if rows_affected == 0 {
                return Err(anyhow!("session {session_id} not found"));
            }

            Ok(())
        })
        .await
    }

    pub async fn update_session_distance(&self, session_id: i64, distance_km: f64) -> Result<()> {
        self.execute(move |conn| {
            let rows_affected = conn.execute(
                "UPDATE sessions SET distance_km = ?1 WHERE id = ?2",
                params![distance_km, session_id],
            )?;

            if rows_affected == 0 {
                return Err(anyhow!("session {session_id} not found"));
            }

            Ok(())
        })
        .await
    }

    /// Re-derives `distance_km` from the persisted trace and stores it.
    /// Idempotent; the stored distance is never trusted when a trace exists.
    pub async fn recompute_session_distance(&self, session_id: i64) -> Result<f64> {
        let trace = self.get_trace_for_session(session_id).await?;
        if trace.is_empty() {
            let session = self
                .get_session(session_id)
                .await?
                .ok_or_else(|| anyhow!("session {session_id} not found"))?;
            return Ok(session.distance_km);
        }

        let points: Vec<_> = trace.iter().map(|p| p.position()).collect();
        let distance_km = total_distance_km(&points);
        self.update_session_distance(session_id, distance_km).await?;
        Ok(distance_km)
    }

    /// Not-found is a `None`, not an error; callers fall back to a default view.
    pub async fn get_session(&self, session_id: i64) -> Result<Option<Session>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, duration_seconds, distance_km, created_at
                 FROM sessions
                 WHERE id = ?1",
            )?;

            let row = stmt
                .query_row(params![session_id], |row| Ok(row_to_session(row)))
                .optional()?;

            row.transpose()
        })
        .await
    }

    pub async fn session_exists(&self, session_id: i64) -> Result<bool> {
        self.execute(move |conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT id FROM sessions WHERE id = ?1",
                    params![session_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
        .await
    }

    pub async fn list_recent_sessions(&self, limit: usize) -> Result<Vec<Session>> {
        let limit = limit as i64;
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, duration_seconds, distance_km, created_at
                 FROM sessions
                 ORDER BY created_at DESC
                 LIMIT ?1",
            )?;

            let mut rows = stmt.query(params![limit])?;
            let mut sessions = Vec::new();
            while let Some(row) = rows.next()? {
                sessions.push(row_to_session(row)?);
            }

            Ok(sessions)
        })
        .await
    }

    pub async fn list_sessions_paginated(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Session>> {
        let limit = limit as i64;
        let offset = offset as i64;
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, duration_seconds, distance_km, created_at
                 FROM sessions
                 ORDER BY created_at DESC
                 LIMIT ?1 OFFSET ?2",
            )?;

            let mut rows = stmt.query(params![limit, offset])?;
            let mut sessions = Vec::new();
            while let Some(row) = rows.next()? {
                sessions.push(row_to_session(row)?);
            }

            Ok(sessions)
        })
        .await
    }

    pub async fn count_sessions(&self) -> Result<u64> {
        self.execute(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))?;
            to_u64(count, "session count")
        })
        .await
    }

    /// Export path: the full history in chronological order.
    pub async fn list_all_sessions(&self) -> Result<Vec<Session>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, duration_seconds, distance_km, created_at
                 FROM sessions
                 ORDER BY created_at ASC",
            )?;

            let mut rows = stmt.query([])?;
            let mut sessions = Vec::new();
            while let Some(row) = rows.next()? {
                sessions.push(row_to_session(row)?);
            }

            Ok(sessions)
        })
        .await
    }

    /// Sessions whose `created_at` falls in `[start, end)`.
    pub async fn sessions_started_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Session>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, duration_seconds, distance_km, created_at
                 FROM sessions
                 WHERE created_at >= ?1 AND created_at < ?2
                 ORDER BY created_at ASC",
            )?;

            let mut rows = stmt.query(params![start.to_rfc3339(), end.to_rfc3339()])?;
            let mut sessions = Vec::new();
            while let Some(row) = rows.next()? {
                sessions.push(row_to_session(row)?);
            }

            Ok(sessions)
        })
        .await
    }

    /// Deletes a session and its trace in one transaction.
    pub async fn delete_session(&self, session_id: i64) -> Result<()> {
        self.execute(move |conn| {
            let tx = conn.transaction()?;

            tx.execute(
                "DELETE FROM trace_points WHERE session_id = ?1",
                params![session_id],
            )?;
            tx.execute("DELETE FROM sessions WHERE id = ?1", params![session_id])?;

            tx.commit()?;
            Ok(())
        })
        .await
    }

    /// Clears both tables. Used by replace-mode import.
    pub async fn delete_all(&self) -> Result<()> {
        self.execute(|conn| {
            let tx = conn.transaction()?;

            tx.execute("DELETE FROM trace_points", [])?;
            tx.execute("DELETE FROM sessions", [])?;

            tx.commit()?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{Phase, TracePoint};

    fn test_db() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(dir.path().join("test.sqlite3")).expect("open database");
        (dir, db)
    }

    fn point(session_id: i64, lat: f64, lng: f64, timestamp_ms: i64) -> TracePoint {
        TracePoint {
            id: None,
            session_id,
            latitude: lat,
            longitude: lng,
            timestamp_ms,
            phase: Phase::Fast,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn insert_returns_monotonic_ids() {
        let (_dir, db) = test_db();

        let first = db.insert_session(Utc::now()).await.unwrap();
        let second = db.insert_session(Utc::now()).await.unwrap();

        assert!(second > first);
    }

    #[tokio::test]
    async fn finalize_updates_in_place() {
        let (_dir, db) = test_db();

        let id = db.insert_session(Utc::now()).await.unwrap();
        db.update_session_totals(id, 185, 0.42).await.unwrap();

        let session = db.get_session(id).await.unwrap().expect("session");
        assert_eq!(session.duration_seconds, 185);
        assert!((session.distance_km - 0.42).abs() < 1e-9);
        assert_eq!(db.count_sessions().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn missing_session_is_none_not_error() {
        let (_dir, db) = test_db();

        assert!(db.get_session(9999).await.unwrap().is_none());
        assert!(!db.session_exists(9999).await.unwrap());
    }

    #[tokio::test]
    async fn updating_missing_session_fails() {
        let (_dir, db) = test_db();

        assert!(db.update_session_totals(42, 60, 1.0).await.is_err());
    }

    #[tokio::test]
    async fn delete_cascades_to_trace() {
        let (_dir, db) = test_db();

        let id = db.insert_session(Utc::now()).await.unwrap();
        db.insert_trace_point(&point(id, 35.0, 139.0, 1000))
            .await
            .unwrap();
        db.insert_trace_point(&point(id, 35.1, 139.1, 2000))
            .await
            .unwrap();

        db.delete_session(id).await.unwrap();

        assert!(db.get_session(id).await.unwrap().is_none());
        assert!(db.get_trace_for_session(id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn pagination_and_recent_listing() {
        let (_dir, db) = test_db();

        let base = Utc::now();
        for i in 0..5 {
            db.insert_session(base + chrono::Duration::seconds(i))
                .await
                .unwrap();
        }

        let recent = db.list_recent_sessions(2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert!(recent[0].created_at > recent[1].created_at);

        let page = db.list_sessions_paginated(2, 2).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(db.count_sessions().await.unwrap(), 5);
    }

    #[tokio::test]
    async fn window_query_excludes_end_bound() {
        let (_dir, db) = test_db();

        let start = "2026-08-23T00:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let inside = start + chrono::Duration::hours(12);
        let outside = start + chrono::Duration::days(7);

        db.insert_session(inside).await.unwrap();
        db.insert_session(outside).await.unwrap();

        let window = db
            .sessions_started_between(start, start + chrono::Duration::days(7))
            .await
            .unwrap();
        assert_eq!(window.len(), 1);
        assert_eq!(window[0].created_at, inside);
    }

    #[tokio::test]
    async fn recompute_distance_matches_trace() {
        let (_dir, db) = test_db();

        let id = db.insert_session(Utc::now()).await.unwrap();
        db.insert_trace_point(&point(id, 35.0, 139.0, 1000))
            .await
            .unwrap();
        db.insert_trace_point(&point(id, 35.0, 139.01, 2000))
            .await
            .unwrap();

        let recomputed = db.recompute_session_distance(id).await.unwrap();
        let session = db.get_session(id).await.unwrap().unwrap();

        assert!(recomputed > 0.0);
        assert!((session.distance_km - recomputed).abs() < 1e-12);
    }
}
