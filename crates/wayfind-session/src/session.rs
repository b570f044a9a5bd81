//! [`SessionController`] – participant identity and emission gate.
//!
//! ```text
//!             login(id)                 Ok(handle)
//!  LoggedOut ─────────► Registering ──────────────► Active(control|experimental)
//!      ▲                    │
//!      └────────────────────┘ duplicate / failure
//!      │
//!      └──── login(admin code) ───────────────────► Admin
//! ```
//!
//! The controller never awaits the network from the tick loop.  `login`
//! sends a command to the dispatcher and returns immediately; completions are
//! folded in by [`SessionController::poll`] on a later tick.
//!
//! Every registration request carries an attempt number.  A completion whose
//! attempt does not match the current `Registering` state is stale and is
//! ignored, so a slow answer to an abandoned attempt can never flip the
//! session.
//!
//! # Example
//!
//! ```rust
//! use wayfind_middleware::dispatcher::dispatch_channel;
//! use wayfind_session::session::{LoginProgress, SessionController};
//! use wayfind_types::Group;
//!
//! let (handle, _inbox) = dispatch_channel();
//! let mut session = SessionController::new(handle, "ADMIN2026");
//!
//! assert_eq!(session.login("admin2026", Group::Control).unwrap(), LoginProgress::Admin);
//! assert!(session.is_admin());
//! assert!(!session.tracking_allowed());
//! ```

use tracing::{debug, error, info, warn};
use uuid::Uuid;
use wayfind_middleware::dispatcher::{DispatchCompletion, DispatchHandle};
use wayfind_types::{Group, MetricsRecord, ParticipantHandle, Phase, TripMetrics, WayfindError};

use crate::outbox::{Outbox, PendingRecord};

// ────────────────────────────────────────────────────────────────────────────
// Public types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    LoggedOut,
    Registering {
        participant_id: String,
        group: Group,
        attempt: u64,
    },
    Active {
        participant_id: String,
        group: Group,
        handle: ParticipantHandle,
    },
    /// Master session: paths may be shown, nothing is ever recorded.
    Admin,
}

/// Immediate result of [`SessionController::login`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginProgress {
    Admin,
    Pending { attempt: u64 },
}

/// What happened to a frozen trip handed to [`SessionController::submit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitOutcome {
    /// Sent to the persistence dispatcher.
    Dispatched,
    /// Parked until registration completes.
    Queued { pending: usize },
    /// Admin session; nothing is recorded.
    Suppressed,
    /// No participant to attribute the record to, or the dispatcher is gone.
    Rejected,
}

/// Asynchronous outcomes folded in by [`SessionController::poll`].
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    Registered { handle: ParticipantHandle },
    Duplicate { participant_id: String },
    Failed { reason: WayfindError },
    Persisted { trip_id: Uuid },
    PersistFailed { trip_id: Uuid, reason: WayfindError },
    RecordsDiscarded { count: usize },
}

// ────────────────────────────────────────────────────────────────────────────
// SessionController
// ────────────────────────────────────────────────────────────────────────────

pub struct SessionController {
    state: SessionState,
    phase: Phase,
    admin_code: String,
    dispatcher: DispatchHandle,
    outbox: Outbox,
    last_attempt: u64,
    backlog: Vec<SessionUpdate>,
}

impl SessionController {
    pub fn new(dispatcher: DispatchHandle, admin_code: impl Into<String>) -> Self {
        Self {
            state: SessionState::LoggedOut,
            phase: Phase::default(),
            admin_code: admin_code.into().trim().to_uppercase(),
            dispatcher,
            outbox: Outbox::default(),
            last_attempt: 0,
            backlog: Vec::new(),
        }
    }

    /// Replace the default outbox (e.g. with a different capacity).
    pub fn with_outbox(mut self, outbox: Outbox) -> Self {
        self.outbox = outbox;
        self
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_admin(&self) -> bool {
        matches!(self.state, SessionState::Admin)
    }

    pub fn participant_id(&self) -> Option<&str> {
        match &self.state {
            SessionState::Registering { participant_id, .. }
            | SessionState::Active { participant_id, .. } => Some(participant_id),
            _ => None,
        }
    }

    pub fn group(&self) -> Option<Group> {
        match &self.state {
            SessionState::Registering { group, .. } | SessionState::Active { group, .. } => {
                Some(*group)
            }
            _ => None,
        }
    }

    /// Records currently parked in the outbox.
    pub fn pending_records(&self) -> usize {
        self.outbox.len()
    }

    /// `true` when trips should be measured.  Trips finished while
    /// registration is in flight are queued, so `Registering` counts.
    pub fn tracking_allowed(&self) -> bool {
        matches!(
            self.state,
            SessionState::Registering { .. } | SessionState::Active { .. }
        )
    }

    /// Whether navigation aids (path line, distance panel) are shown.
    /// Admin sessions get every guide; the control group gets none.
    pub fn aids_visible(&self) -> bool {
        match &self.state {
            SessionState::Admin => true,
            SessionState::Registering { group, .. } | SessionState::Active { group, .. } => {
                *group == Group::Experimental
            }
            SessionState::LoggedOut => false,
        }
    }

    // ── Login ───────────────────────────────────────────────────────────────

    /// Start a session for `participant_id`.
    ///
    /// The admin code (case-insensitive) switches straight to
    /// [`SessionState::Admin`] without contacting the backend.  Any other id
    /// issues a registration request and moves to `Registering`.
    ///
    /// # Errors
    ///
    /// * [`WayfindError::EmptyParticipantId`] for a blank id.
    /// * [`WayfindError::RegistrationInFlight`] while a previous attempt is
    ///   unanswered.
    /// * [`WayfindError::Channel`] if the dispatcher is gone.
    ///
    /// State is unchanged on every error path, so the caller can retry.
    pub fn login(&mut self, participant_id: &str, group: Group) -> Result<LoginProgress, WayfindError> {
        let participant_id = participant_id.trim();
        if participant_id.is_empty() {
            return Err(WayfindError::EmptyParticipantId);
        }
        if matches!(self.state, SessionState::Registering { .. }) {
            return Err(WayfindError::RegistrationInFlight);
        }

        if participant_id.to_uppercase() == self.admin_code {
            let dropped = self.outbox.clear();
            if dropped > 0 {
                warn!(dropped, "admin login discarded pending records");
            }
            self.state = SessionState::Admin;
            info!("admin session started; tracking disabled");
            return Ok(LoginProgress::Admin);
        }

        let attempt = self.last_attempt + 1;
        self.dispatcher.register(attempt, participant_id, group)?;
        self.last_attempt = attempt;
        self.state = SessionState::Registering {
            participant_id: participant_id.to_string(),
            group,
            attempt,
        };
        info!(participant_id, %group, attempt, "registration requested");
        Ok(LoginProgress::Pending { attempt })
    }

    /// Drop the current identity.  Pending records are discarded.
    pub fn logout(&mut self) {
        let dropped = self.outbox.clear();
        if dropped > 0 {
            warn!(dropped, "logout discarded pending records");
        }
        self.state = SessionState::LoggedOut;
    }

    // ── Phase ───────────────────────────────────────────────────────────────

    /// Switch the phase label.  Anything but the two exact labels is
    /// rejected and the current phase is kept.
    pub fn set_phase(&mut self, value: &str) -> Result<Phase, WayfindError> {
        let phase: Phase = value.parse()?;
        if phase != self.phase {
            info!(from = %self.phase, to = %phase, "phase changed");
        }
        self.phase = phase;
        Ok(phase)
    }

    // ── Emission ────────────────────────────────────────────────────────────

    /// Hand a frozen trip to persistence according to the session state.
    pub fn submit(&mut self, metrics: TripMetrics) -> EmitOutcome {
        match &self.state {
            SessionState::Admin => {
                debug!(trip_id = %metrics.trip_id, "admin session; record suppressed");
                EmitOutcome::Suppressed
            }
            SessionState::LoggedOut => {
                error!(
                    trip_id = %metrics.trip_id,
                    destination = %metrics.destination_name,
                    "no participant logged in; record rejected"
                );
                EmitOutcome::Rejected
            }
            SessionState::Registering { participant_id, .. } => {
                self.outbox.push(PendingRecord {
                    participant_id: participant_id.clone(),
                    phase: self.phase,
                    metrics,
                });
                let pending = self.outbox.len();
                info!(pending, "registration in flight; record queued");
                EmitOutcome::Queued { pending }
            }
            SessionState::Active { handle, .. } => {
                let record = MetricsRecord::new(handle.clone(), self.phase, &metrics);
                self.dispatch(metrics.trip_id, record)
            }
        }
    }

    fn dispatch(&self, trip_id: Uuid, record: MetricsRecord) -> EmitOutcome {
        match self.dispatcher.persist(trip_id, record) {
            Ok(()) => EmitOutcome::Dispatched,
            Err(e) => {
                error!(%trip_id, error = %e, "record could not be dispatched");
                EmitOutcome::Rejected
            }
        }
    }

    // ── Completions ─────────────────────────────────────────────────────────

    /// Fold in every completion that has arrived since the last call.
    pub fn poll(&mut self) -> Vec<SessionUpdate> {
        let mut updates = std::mem::take(&mut self.backlog);
        while let Some(completion) = self.dispatcher.try_next_completion() {
            updates.extend(self.apply(completion));
        }
        updates
    }

    /// Wait until the in-flight registration is answered.
    ///
    /// Persistence updates that arrive meanwhile are kept for the next
    /// [`poll`][Self::poll].
    pub async fn await_registration(&mut self) -> Result<ParticipantHandle, WayfindError> {
        loop {
            if !matches!(self.state, SessionState::Registering { .. }) {
                return Err(WayfindError::RegistrationFailure(
                    "no registration in flight".into(),
                ));
            }
            let completion = self.dispatcher.next_completion().await.ok_or_else(|| {
                WayfindError::Channel("dispatcher worker has shut down".into())
            })?;
            let updates = self.apply(completion);
            let outcome = updates.iter().find_map(|update| match update {
                SessionUpdate::Registered { handle } => Some(Ok(handle.clone())),
                SessionUpdate::Duplicate { participant_id } => Some(Err(
                    WayfindError::DuplicateRegistration(participant_id.clone()),
                )),
                SessionUpdate::Failed { reason } => Some(Err(reason.clone())),
                _ => None,
            });
            // Every update reaches the next poll, including discards that
            // follow the registration.
            self.backlog.extend(updates);
            if let Some(outcome) = outcome {
                return outcome;
            }
        }
    }

    fn apply(&mut self, completion: DispatchCompletion) -> Vec<SessionUpdate> {
        match completion {
            DispatchCompletion::Registration { attempt, outcome } => {
                self.apply_registration(attempt, outcome)
            }
            DispatchCompletion::Persistence { trip_id, outcome } => match outcome {
                Ok(()) => {
                    debug!(%trip_id, "record persisted");
                    vec![SessionUpdate::Persisted { trip_id }]
                }
                Err(reason) => {
                    warn!(%trip_id, error = %reason, "record not persisted; not retried");
                    vec![SessionUpdate::PersistFailed { trip_id, reason }]
                }
            },
        }
    }

    fn apply_registration(
        &mut self,
        attempt: u64,
        outcome: Result<ParticipantHandle, WayfindError>,
    ) -> Vec<SessionUpdate> {
        let (participant_id, group) = match &self.state {
            SessionState::Registering {
                participant_id,
                group,
                attempt: current,
            } if *current == attempt => (participant_id.clone(), *group),
            _ => {
                debug!(attempt, "stale registration completion ignored");
                return Vec::new();
            }
        };

        match outcome {
            Ok(handle) => {
                info!(participant_id = %participant_id, %group, handle = %handle, "session active");
                self.state = SessionState::Active {
                    participant_id: participant_id.clone(),
                    group,
                    handle: handle.clone(),
                };
                let mut updates = vec![SessionUpdate::Registered {
                    handle: handle.clone(),
                }];

                let (ready, discarded) = self.outbox.drain_for(&participant_id);
                for pending in ready {
                    let record = MetricsRecord::new(handle.clone(), pending.phase, &pending.metrics);
                    self.dispatch(pending.metrics.trip_id, record);
                }
                if discarded > 0 {
                    warn!(discarded, "pending records for another participant discarded");
                    updates.push(SessionUpdate::RecordsDiscarded { count: discarded });
                }
                updates
            }
            Err(WayfindError::DuplicateRegistration(_)) => {
                info!(participant_id = %participant_id, "participant already registered");
                self.state = SessionState::LoggedOut;
                vec![SessionUpdate::Duplicate { participant_id }]
            }
            Err(reason) => {
                error!(participant_id = %participant_id, error = %reason, "registration failed");
                self.state = SessionState::LoggedOut;
                vec![SessionUpdate::Failed { reason }]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Arc;
    use wayfind_middleware::dispatcher::{
        dispatch_channel, spawn_dispatcher, DispatchCommand, DispatchInbox,
    };
    use wayfind_middleware::memory_gateway::InMemoryGateway;

    fn metrics(destination: &str) -> TripMetrics {
        let now = Utc::now();
        TripMetrics {
            trip_id: Uuid::new_v4(),
            destination_name: destination.to_string(),
            optimal_length_m: 10.0,
            time_seconds: 4.0,
            distance_meters: 12.5,
            deviation_count: 1,
            error_count: 0,
            help_interventions: 0,
            route_match_percent: 80.0,
            reached_destination: true,
            independent_trip: true,
            started_at: now,
            finished_at: now,
        }
    }

    fn controller() -> (SessionController, DispatchInbox) {
        let (handle, inbox) = dispatch_channel();
        (SessionController::new(handle, "ADMIN2026"), inbox)
    }

    fn answer_registration(inbox: &mut DispatchInbox, outcome: Result<ParticipantHandle, WayfindError>) {
        match inbox.try_next_command() {
            Some(DispatchCommand::Register { attempt, .. }) => {
                inbox.complete(DispatchCompletion::Registration { attempt, outcome });
            }
            other => panic!("expected a register command, got {other:?}"),
        }
    }

    fn persisted_records(inbox: &mut DispatchInbox) -> Vec<MetricsRecord> {
        let mut out = Vec::new();
        while let Some(command) = inbox.try_next_command() {
            if let DispatchCommand::Persist { record, .. } = command {
                out.push(record);
            }
        }
        out
    }

    #[test]
    fn empty_id_is_rejected_without_state_change() {
        let (mut session, _inbox) = controller();
        assert_eq!(session.login("   ", Group::Control), Err(WayfindError::EmptyParticipantId));
        assert_eq!(session.state(), &SessionState::LoggedOut);
    }

    #[test]
    fn admin_code_is_case_insensitive_and_never_registers() {
        let (mut session, mut inbox) = controller();
        assert_eq!(session.login("Admin2026", Group::Control).unwrap(), LoginProgress::Admin);
        assert!(session.is_admin());
        assert!(session.aids_visible());
        assert!(inbox.try_next_command().is_none());

        assert_eq!(session.submit(metrics("Recepcion")), EmitOutcome::Suppressed);
        assert!(inbox.try_next_command().is_none());
    }

    #[test]
    fn successful_registration_activates_session() {
        let (mut session, mut inbox) = controller();
        let progress = session.login("A01", Group::Experimental).unwrap();
        assert_eq!(progress, LoginProgress::Pending { attempt: 1 });
        assert!(session.tracking_allowed());

        answer_registration(&mut inbox, Ok(ParticipantHandle::new("h-1")));
        let updates = session.poll();
        assert_eq!(
            updates,
            vec![SessionUpdate::Registered { handle: ParticipantHandle::new("h-1") }]
        );
        assert!(matches!(session.state(), SessionState::Active { .. }));
        assert!(session.aids_visible());
    }

    #[test]
    fn duplicate_is_distinct_from_failure_and_retry_is_clean() {
        let (mut session, mut inbox) = controller();
        session.login("A01", Group::Control).unwrap();
        answer_registration(&mut inbox, Err(WayfindError::DuplicateRegistration("A01".into())));
        assert_eq!(
            session.poll(),
            vec![SessionUpdate::Duplicate { participant_id: "A01".into() }]
        );
        assert_eq!(session.state(), &SessionState::LoggedOut);

        session.login("A01", Group::Control).unwrap();
        answer_registration(&mut inbox, Err(WayfindError::RegistrationFailure("timeout".into())));
        assert!(matches!(
            session.poll().as_slice(),
            [SessionUpdate::Failed { reason: WayfindError::RegistrationFailure(_) }]
        ));
        assert_eq!(session.state(), &SessionState::LoggedOut);

        assert_eq!(
            session.login("A01", Group::Control).unwrap(),
            LoginProgress::Pending { attempt: 3 }
        );
    }

    #[test]
    fn second_login_while_registering_is_rejected() {
        let (mut session, _inbox) = controller();
        session.login("A01", Group::Control).unwrap();
        assert_eq!(
            session.login("B02", Group::Control),
            Err(WayfindError::RegistrationInFlight)
        );
        assert_eq!(session.participant_id(), Some("A01"));
    }

    #[test]
    fn stale_registration_completion_is_ignored() {
        let (mut session, mut inbox) = controller();
        session.login("A01", Group::Control).unwrap();
        answer_registration(&mut inbox, Err(WayfindError::RegistrationFailure("x".into())));
        session.poll();
        session.login("A01", Group::Control).unwrap();

        // A late answer to attempt 1 must not activate attempt 2.
        inbox.complete(DispatchCompletion::Registration {
            attempt: 1,
            outcome: Ok(ParticipantHandle::new("old")),
        });
        assert!(session.poll().is_empty());
        assert!(matches!(session.state(), SessionState::Registering { attempt: 2, .. }));
    }

    #[test]
    fn logged_out_emission_is_rejected() {
        let (mut session, mut inbox) = controller();
        assert_eq!(session.submit(metrics("Oficinas")), EmitOutcome::Rejected);
        assert!(inbox.try_next_command().is_none());
    }

    #[test]
    fn records_emitted_while_registering_flush_on_success() {
        let (mut session, mut inbox) = controller();
        session.login("A01", Group::Control).unwrap();
        assert_eq!(session.submit(metrics("Recepcion")), EmitOutcome::Queued { pending: 1 });
        session.set_phase("post-test").unwrap();
        assert_eq!(session.submit(metrics("Oficinas")), EmitOutcome::Queued { pending: 2 });

        answer_registration(&mut inbox, Ok(ParticipantHandle::new("h-9")));
        session.poll();

        let records = persisted_records(&mut inbox);
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.participant_handle.as_str() == "h-9"));
        // Phase is the one in force when each trip was emitted.
        assert_eq!(records[0].phase, Phase::PreTest);
        assert_eq!(records[1].phase, Phase::PostTest);
        assert_eq!(session.pending_records(), 0);
    }

    #[test]
    fn queued_records_survive_failed_registration() {
        let (mut session, mut inbox) = controller();
        session.login("A01", Group::Control).unwrap();
        session.submit(metrics("Recepcion"));
        answer_registration(&mut inbox, Err(WayfindError::RegistrationFailure("x".into())));
        session.poll();
        assert_eq!(session.pending_records(), 1);

        session.login("A01", Group::Control).unwrap();
        answer_registration(&mut inbox, Ok(ParticipantHandle::new("h-2")));
        session.poll();
        assert_eq!(persisted_records(&mut inbox).len(), 1);
    }

    #[test]
    fn queued_records_for_another_participant_are_discarded() {
        let (mut session, mut inbox) = controller();
        session.login("A01", Group::Control).unwrap();
        session.submit(metrics("Recepcion"));
        answer_registration(&mut inbox, Err(WayfindError::RegistrationFailure("x".into())));
        session.poll();

        session.login("B02", Group::Control).unwrap();
        answer_registration(&mut inbox, Ok(ParticipantHandle::new("h-b")));
        let updates = session.poll();
        assert!(updates.contains(&SessionUpdate::RecordsDiscarded { count: 1 }));
        assert!(persisted_records(&mut inbox).is_empty());
    }

    #[test]
    fn invalid_phase_leaves_phase_unchanged() {
        let (mut session, _inbox) = controller();
        session.set_phase("post-test").unwrap();
        assert_eq!(
            session.set_phase("bogus"),
            Err(WayfindError::InvalidPhase("bogus".into()))
        );
        assert_eq!(session.phase(), Phase::PostTest);
    }

    #[test]
    fn control_group_hides_aids() {
        let (mut session, _inbox) = controller();
        assert!(!session.aids_visible());
        session.login("A01", Group::Control).unwrap();
        assert!(!session.aids_visible());
    }

    #[tokio::test]
    async fn await_registration_against_live_dispatcher() {
        let gateway = Arc::new(InMemoryGateway::new());
        let mut session = SessionController::new(spawn_dispatcher(gateway.clone()), "ADMIN2026");

        session.login("A01", Group::Control).unwrap();
        let handle = session.await_registration().await.unwrap();
        assert!(matches!(session.state(), SessionState::Active { handle: h, .. } if *h == handle));

        session.logout();
        session.login("A01", Group::Control).unwrap();
        assert_eq!(
            session.await_registration().await,
            Err(WayfindError::DuplicateRegistration("A01".into()))
        );
        assert_eq!(gateway.participant_count(), 1);
    }

    #[tokio::test]
    async fn await_registration_keeps_discard_updates_for_poll() {
        let (mut session, mut inbox) = controller();
        session.login("A01", Group::Control).unwrap();
        session.submit(metrics("Recepcion"));
        answer_registration(&mut inbox, Err(WayfindError::RegistrationFailure("x".into())));
        session.poll();

        session.login("B02", Group::Control).unwrap();
        answer_registration(&mut inbox, Ok(ParticipantHandle::new("h-b")));
        let handle = session.await_registration().await.unwrap();
        assert_eq!(handle.as_str(), "h-b");

        let updates = session.poll();
        assert_eq!(
            updates,
            [
                SessionUpdate::Registered { handle },
                SessionUpdate::RecordsDiscarded { count: 1 },
            ]
        );
    }
}
