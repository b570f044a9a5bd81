//! Trip Journal.
//!
//! Appends every frozen [`TripMetrics`] handed to the session controller to a
//! local SQLite database, tagged with the participant id and phase in force
//! at emission time.
//!
//! # Storage layout
//!
//! | column            | type    | description                              |
//! |-------------------|---------|------------------------------------------|
//! | seq               | INTEGER | Insertion order                          |
//! | trip_id           | TEXT    | UUID of the trip (unique)                |
//! | participant_id    | TEXT    | Login id, `NULL` for anonymous runs      |
//! | phase             | TEXT    | `pre-test` / `post-test`                 |
//! | destination       | TEXT    | Destination name                         |
//! | reached           | INTEGER | 1 when the destination was reached       |
//! | route_match       | REAL    | Route-match percentage                   |
//! | time_seconds      | REAL    | Trip duration                            |
//! | recorded_at       | TEXT    | RFC-3339 append time (UTC)               |
//! | metrics           | TEXT    | Full metrics as JSON                     |
//!
//! # Example
//!
//! ```rust
//! use wayfind_memory::journal::TripJournal;
//!
//! let journal = TripJournal::open_in_memory().unwrap();
//! let summary = journal.summary().unwrap();
//! assert_eq!(summary.trips, 0);
//! ```

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use wayfind_types::{Phase, TripMetrics};

// ─────────────────────────────────────────────────────────────────────────────
// Error type
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum JournalError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Corrupt journal row: {0}")]
    Corrupt(String),
}

// ─────────────────────────────────────────────────────────────────────────────
// Entries
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub participant_id: Option<String>,
    pub phase: Phase,
    pub recorded_at: DateTime<Utc>,
    pub metrics: TripMetrics,
}

/// Aggregate over every journaled trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalSummary {
    pub trips: usize,
    pub reached: usize,
    pub mean_route_match: f32,
    pub mean_time_seconds: f32,
}

// ─────────────────────────────────────────────────────────────────────────────
// TripJournal
// ─────────────────────────────────────────────────────────────────────────────

pub struct TripJournal {
    conn: Connection,
}

impl TripJournal {
    /// Open (or create) a journal database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, JournalError> {
        let journal = Self {
            conn: Connection::open(path)?,
        };
        journal.init_schema()?;
        Ok(journal)
    }

    /// Open a throwaway in-memory journal.
    pub fn open_in_memory() -> Result<Self, JournalError> {
        let journal = Self {
            conn: Connection::open_in_memory()?,
        };
        journal.init_schema()?;
        Ok(journal)
    }

    fn init_schema(&self) -> Result<(), JournalError> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS trip_journal (
                seq            INTEGER PRIMARY KEY AUTOINCREMENT,
                trip_id        TEXT NOT NULL UNIQUE,
                participant_id TEXT,
                phase          TEXT NOT NULL,
                destination    TEXT NOT NULL,
                reached        INTEGER NOT NULL,
                route_match    REAL NOT NULL,
                time_seconds   REAL NOT NULL,
                recorded_at    TEXT NOT NULL,
                metrics        TEXT NOT NULL
            );",
        )?;
        Ok(())
    }

    /// Append one trip.  Re-appending the same trip id is ignored.
    pub fn append(
        &self,
        participant_id: Option<&str>,
        phase: Phase,
        metrics: &TripMetrics,
    ) -> Result<(), JournalError> {
        let json =
            serde_json::to_string(metrics).map_err(|e| JournalError::Corrupt(e.to_string()))?;
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO trip_journal
                 (trip_id, participant_id, phase, destination, reached,
                  route_match, time_seconds, recorded_at, metrics)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                metrics.trip_id.to_string(),
                participant_id,
                phase.as_str(),
                metrics.destination_name,
                metrics.reached_destination,
                metrics.route_match_percent,
                metrics.time_seconds,
                Utc::now().to_rfc3339(),
                json,
            ],
        )?;
        debug!(trip_id = %metrics.trip_id, inserted, "trip journaled");
        Ok(())
    }

    /// Every entry in insertion order.
    pub fn all_entries(&self) -> Result<Vec<JournalEntry>, JournalError> {
        self.query_entries(
            "SELECT participant_id, phase, recorded_at, metrics
             FROM trip_journal ORDER BY seq ASC",
            None,
        )
    }

    /// Entries recorded under `phase`, in insertion order.
    pub fn entries_for_phase(&self, phase: Phase) -> Result<Vec<JournalEntry>, JournalError> {
        self.query_entries(
            "SELECT participant_id, phase, recorded_at, metrics
             FROM trip_journal WHERE phase = ?1 ORDER BY seq ASC",
            Some(phase.as_str()),
        )
    }

    fn query_entries(&self, sql: &str, phase: Option<&str>) -> Result<Vec<JournalEntry>, JournalError> {
        let mut stmt = self.conn.prepare(sql)?;
        let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<(Option<String>, String, String, String)> {
            let participant_id: Option<String> = row.get(0)?;
            let phase: String = row.get(1)?;
            let recorded_at: String = row.get(2)?;
            let metrics: String = row.get(3)?;
            Ok((participant_id, phase, recorded_at, metrics))
        };
        let rows = match phase {
            Some(p) => stmt.query_map(params![p], map_row)?.collect::<Result<Vec<_>, _>>()?,
            None => stmt.query_map([], map_row)?.collect::<Result<Vec<_>, _>>()?,
        };

        rows.into_iter()
            .map(|(participant_id, phase, recorded_at, metrics)| {
                Ok(JournalEntry {
                    participant_id,
                    phase: phase
                        .parse()
                        .map_err(|e: wayfind_types::WayfindError| JournalError::Corrupt(e.to_string()))?,
                    recorded_at: recorded_at
                        .parse::<DateTime<Utc>>()
                        .map_err(|e| JournalError::Corrupt(e.to_string()))?,
                    metrics: serde_json::from_str(&metrics)
                        .map_err(|e| JournalError::Corrupt(e.to_string()))?,
                })
            })
            .collect()
    }

    pub fn summary(&self) -> Result<JournalSummary, JournalError> {
        let summary = self.conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(reached), 0),
                    COALESCE(AVG(route_match), 0.0),
                    COALESCE(AVG(time_seconds), 0.0)
             FROM trip_journal",
            [],
            |row| {
                let trips: i64 = row.get(0)?;
                let reached: i64 = row.get(1)?;
                let mean_route_match: f64 = row.get(2)?;
                let mean_time_seconds: f64 = row.get(3)?;
                Ok(JournalSummary {
                    trips: trips as usize,
                    reached: reached as usize,
                    mean_route_match: mean_route_match as f32,
                    mean_time_seconds: mean_time_seconds as f32,
                })
            },
        )?;
        Ok(summary)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn trip(destination: &str, reached: bool, route_match: f32, time: f32) -> TripMetrics {
        let now = Utc::now();
        TripMetrics {
            trip_id: Uuid::new_v4(),
            destination_name: destination.to_string(),
            optimal_length_m: 10.0,
            time_seconds: time,
            distance_meters: 12.0,
            deviation_count: 0,
            error_count: 0,
            help_interventions: 0,
            route_match_percent: route_match,
            reached_destination: reached,
            independent_trip: true,
            started_at: now,
            finished_at: now,
        }
    }

    #[test]
    fn append_and_read_back_in_order() {
        let journal = TripJournal::open_in_memory().unwrap();
        let first = trip("Recepcion", true, 80.0, 10.0);
        let second = trip("Oficinas", false, 0.0, 4.0);
        journal.append(Some("A01"), Phase::PreTest, &first).unwrap();
        journal.append(None, Phase::PostTest, &second).unwrap();

        let all = journal.all_entries().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].metrics, first);
        assert_eq!(all[0].participant_id.as_deref(), Some("A01"));
        assert_eq!(all[1].phase, Phase::PostTest);
        assert!(all[1].participant_id.is_none());
    }

    #[test]
    fn duplicate_trip_id_is_ignored() {
        let journal = TripJournal::open_in_memory().unwrap();
        let t = trip("Recepcion", true, 100.0, 3.0);
        journal.append(Some("A01"), Phase::PreTest, &t).unwrap();
        journal.append(Some("A01"), Phase::PreTest, &t).unwrap();
        assert_eq!(journal.all_entries().unwrap().len(), 1);
    }

    #[test]
    fn entries_for_phase_filters() {
        let journal = TripJournal::open_in_memory().unwrap();
        journal.append(Some("A01"), Phase::PreTest, &trip("Recepcion", true, 90.0, 5.0)).unwrap();
        journal.append(Some("A01"), Phase::PostTest, &trip("Oficinas", true, 95.0, 4.0)).unwrap();

        let post = journal.entries_for_phase(Phase::PostTest).unwrap();
        assert_eq!(post.len(), 1);
        assert_eq!(post[0].metrics.destination_name, "Oficinas");
    }

    #[test]
    fn summary_aggregates_trips() {
        let journal = TripJournal::open_in_memory().unwrap();
        journal.append(Some("A01"), Phase::PreTest, &trip("Recepcion", true, 80.0, 10.0)).unwrap();
        journal.append(Some("A01"), Phase::PreTest, &trip("Oficinas", false, 0.0, 20.0)).unwrap();

        let summary = journal.summary().unwrap();
        assert_eq!(summary.trips, 2);
        assert_eq!(summary.reached, 1);
        assert!((summary.mean_route_match - 40.0).abs() < 1e-4);
        assert!((summary.mean_time_seconds - 15.0).abs() < 1e-4);
    }

    #[test]
    fn journal_persists_across_reopen() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("journal.db");
        {
            let journal = TripJournal::open(&path).unwrap();
            journal.append(Some("A01"), Phase::PreTest, &trip("Recepcion", true, 100.0, 2.0)).unwrap();
        }
        let reopened = TripJournal::open(&path).unwrap();
        assert_eq!(reopened.summary().unwrap().trips, 1);
    }
}
