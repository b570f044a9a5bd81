//! `wayfind-memory` – Local study journal.
//!
//! Keeps a copy of every emitted trip on disk, independent of whether the
//! remote backend accepted it, so a session can be exported or audited
//! afterwards.
//!
//! # Modules
//!
//! - [`journal`] – [`TripJournal`][journal::TripJournal]: SQLite-backed
//!   append-only log of frozen trip metrics with per-phase queries and a
//!   study summary.

pub mod journal;

pub use journal::{JournalEntry, JournalError, JournalSummary, TripJournal};
