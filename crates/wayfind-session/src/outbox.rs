//! [`Outbox`] – records waiting for a participant handle.
//!
//! A trip can finish before the backend has answered the registration
//! request.  Its frozen metrics are parked here together with the id and
//! phase they were emitted under, and flushed once the handle is known.

use std::collections::VecDeque;

use tracing::warn;
use wayfind_types::{Phase, TripMetrics};

/// Default number of records held before the oldest is evicted.
pub const DEFAULT_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub struct PendingRecord {
    pub participant_id: String,
    pub phase: Phase,
    pub metrics: TripMetrics,
}

#[derive(Debug)]
pub struct Outbox {
    queue: VecDeque<PendingRecord>,
    capacity: usize,
}

impl Default for Outbox {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl Outbox {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Queue `record`, evicting and returning the oldest entry when full.
    pub fn push(&mut self, record: PendingRecord) -> Option<PendingRecord> {
        let evicted = if self.queue.len() >= self.capacity {
            self.queue.pop_front()
        } else {
            None
        };
        if let Some(old) = &evicted {
            warn!(
                trip_id = %old.metrics.trip_id,
                destination = %old.metrics.destination_name,
                "outbox full; oldest pending record evicted"
            );
        }
        self.queue.push_back(record);
        evicted
    }

    /// Remove every entry.  Those belonging to `participant_id` are returned
    /// in emission order; the number of foreign entries that were dropped is
    /// returned alongside.
    pub fn drain_for(&mut self, participant_id: &str) -> (Vec<PendingRecord>, usize) {
        let mut matching = Vec::new();
        let mut discarded = 0;
        for record in self.queue.drain(..) {
            if record.participant_id == participant_id {
                matching.push(record);
            } else {
                discarded += 1;
            }
        }
        (matching, discarded)
    }

    /// Drop everything; returns how many entries were held.
    pub fn clear(&mut self) -> usize {
        let n = self.queue.len();
        self.queue.clear();
        n
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn pending(participant_id: &str, destination: &str) -> PendingRecord {
        let now = Utc::now();
        PendingRecord {
            participant_id: participant_id.to_string(),
            phase: Phase::PreTest,
            metrics: TripMetrics {
                trip_id: Uuid::new_v4(),
                destination_name: destination.to_string(),
                optimal_length_m: 10.0,
                time_seconds: 5.0,
                distance_meters: 10.0,
                deviation_count: 0,
                error_count: 0,
                help_interventions: 0,
                route_match_percent: 100.0,
                reached_destination: true,
                independent_trip: true,
                started_at: now,
                finished_at: now,
            },
        }
    }

    #[test]
    fn full_outbox_evicts_oldest() {
        let mut outbox = Outbox::new(2);
        assert!(outbox.push(pending("A01", "first")).is_none());
        assert!(outbox.push(pending("A01", "second")).is_none());
        let evicted = outbox.push(pending("A01", "third")).unwrap();
        assert_eq!(evicted.metrics.destination_name, "first");
        assert_eq!(outbox.len(), 2);
    }

    #[test]
    fn drain_for_splits_by_participant() {
        let mut outbox = Outbox::default();
        outbox.push(pending("A01", "Recepcion"));
        outbox.push(pending("B02", "Oficinas"));
        outbox.push(pending("A01", "Oficinas"));

        let (matching, discarded) = outbox.drain_for("A01");
        let names: Vec<_> = matching.iter().map(|r| r.metrics.destination_name.as_str()).collect();
        assert_eq!(names, ["Recepcion", "Oficinas"]);
        assert_eq!(discarded, 1);
        assert!(outbox.is_empty());
    }
}
