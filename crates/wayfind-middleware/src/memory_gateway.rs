//! In-process [`PersistenceGateway`] used when no backend is configured and
//! throughout the test suites.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tracing::{debug, info};
use uuid::Uuid;
use wayfind_types::{Group, MetricsRecord, ParticipantHandle, WayfindError};

use crate::gateway::PersistenceGateway;

/// Keeps participants and records in memory.
///
/// Registration is unique per participant id, mirroring a unique constraint
/// on the backend.  `fail_registrations` / `fail_persists` simulate an
/// unreachable server.
#[derive(Debug, Default)]
pub struct InMemoryGateway {
    participants: Mutex<HashMap<String, (Group, ParticipantHandle)>>,
    records: Mutex<Vec<MetricsRecord>>,
    fail_registrations: AtomicBool,
    fail_persists: AtomicBool,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_registrations(&self, fail: bool) {
        self.fail_registrations.store(fail, Ordering::SeqCst);
    }

    pub fn fail_persists(&self, fail: bool) {
        self.fail_persists.store(fail, Ordering::SeqCst);
    }

    /// Snapshot of every record persisted so far, in arrival order.
    pub fn records(&self) -> Vec<MetricsRecord> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn participant_count(&self) -> usize {
        self.participants
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

#[async_trait]
impl PersistenceGateway for InMemoryGateway {
    async fn register(
        &self,
        participant_id: &str,
        group: Group,
    ) -> Result<ParticipantHandle, WayfindError> {
        if self.fail_registrations.load(Ordering::SeqCst) {
            return Err(WayfindError::RegistrationFailure(
                "in-memory backend offline".into(),
            ));
        }
        let mut participants = self.participants.lock().unwrap_or_else(|e| e.into_inner());
        if participants.contains_key(participant_id) {
            debug!(participant_id, "duplicate registration");
            return Err(WayfindError::DuplicateRegistration(participant_id.to_string()));
        }
        let handle = ParticipantHandle::new(Uuid::new_v4().to_string());
        participants.insert(participant_id.to_string(), (group, handle.clone()));
        info!(participant_id, %group, handle = %handle, "participant registered");
        Ok(handle)
    }

    async fn persist(&self, record: &MetricsRecord) -> Result<(), WayfindError> {
        if self.fail_persists.load(Ordering::SeqCst) {
            return Err(WayfindError::PersistenceFailure(
                "in-memory backend offline".into(),
            ));
        }
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wayfind_types::Phase;

    fn record(handle: &ParticipantHandle) -> MetricsRecord {
        MetricsRecord {
            participant_handle: handle.clone(),
            phase: Phase::PreTest,
            destination_name: "Oficinas".into(),
            time_seconds: 12.0,
            distance_meters: 20.0,
            deviation_count: 0,
            error_count: 0,
            route_match_percent: 100.0,
            reached_destination: true,
            help_interventions: 0,
            independent_trip: true,
        }
    }

    #[tokio::test]
    async fn second_registration_is_duplicate() {
        let gw = InMemoryGateway::new();
        let handle = gw.register("A01", Group::Control).await.unwrap();
        assert!(!handle.as_str().is_empty());
        assert_eq!(
            gw.register("A01", Group::Experimental).await,
            Err(WayfindError::DuplicateRegistration("A01".into()))
        );
        assert_eq!(gw.participant_count(), 1);
    }

    #[tokio::test]
    async fn offline_registration_fails_without_side_effects() {
        let gw = InMemoryGateway::new();
        gw.fail_registrations(true);
        assert!(matches!(
            gw.register("A01", Group::Control).await,
            Err(WayfindError::RegistrationFailure(_))
        ));
        gw.fail_registrations(false);
        assert!(gw.register("A01", Group::Control).await.is_ok());
    }

    #[tokio::test]
    async fn persist_appends_records() {
        let gw = InMemoryGateway::new();
        let handle = ParticipantHandle::new("h-1");
        gw.persist(&record(&handle)).await.unwrap();

        gw.fail_persists(true);
        assert!(matches!(
            gw.persist(&record(&handle)).await,
            Err(WayfindError::PersistenceFailure(_))
        ));
        assert_eq!(gw.records().len(), 1);
    }
}
