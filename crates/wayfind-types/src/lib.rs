use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// A point in the simulated world, in metres.
///
/// The world is y-up: "planar" distances ignore `y` and measure on the
/// horizontal x/z plane.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    pub fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }

    pub fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }

    pub fn scale(self, k: f32) -> Self {
        Self::new(self.x * k, self.y * k, self.z * k)
    }

    pub fn dot(self, rhs: Self) -> f32 {
        self.x * rhs.x + self.y * rhs.y + self.z * rhs.z
    }

    pub fn length(self) -> f32 {
        self.dot(self).sqrt()
    }

    /// Euclidean distance in 3-D.
    pub fn distance(self, other: Self) -> f32 {
        self.sub(other).length()
    }

    /// Distance on the horizontal plane (the `y` component is ignored).
    pub fn planar_distance(self, other: Self) -> f32 {
        let dx = self.x - other.x;
        let dz = self.z - other.z;
        (dx * dx + dz * dz).sqrt()
    }
}

impl From<[f32; 3]> for Vec3 {
    fn from(v: [f32; 3]) -> Self {
        Self::new(v[0], v[1], v[2])
    }
}

impl fmt::Display for Vec3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.2}, {:.2}, {:.2})", self.x, self.y, self.z)
    }
}

/// Study group a participant was assigned to at login.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Group {
    Control,
    Experimental,
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Group::Control => write!(f, "control"),
            Group::Experimental => write!(f, "experimental"),
        }
    }
}

impl FromStr for Group {
    type Err = WayfindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "control" => Ok(Group::Control),
            "experimental" => Ok(Group::Experimental),
            other => Err(WayfindError::InvalidGroup(other.to_string())),
        }
    }
}

/// Evaluation phase label attached to every emitted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
pub enum Phase {
    #[default]
    #[serde(rename = "pre-test")]
    PreTest,
    #[serde(rename = "post-test")]
    PostTest,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::PreTest => "pre-test",
            Phase::PostTest => "post-test",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = WayfindError;

    /// Only the two exact labels are accepted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pre-test" => Ok(Phase::PreTest),
            "post-test" => Ok(Phase::PostTest),
            other => Err(WayfindError::InvalidPhase(other.to_string())),
        }
    }
}

/// Opaque participant identifier returned by the persistence backend on
/// successful registration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct ParticipantHandle(pub String);

impl ParticipantHandle {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A named navigation target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Destination {
    pub name: String,
    pub position: Vec3,
}

impl Destination {
    pub fn new(name: impl Into<String>, position: Vec3) -> Self {
        Self {
            name: name.into(),
            position,
        }
    }
}

/// How a trip reached its terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripEnd {
    /// The agent arrived within the arrival radius.
    Reached,
    /// Explicit cancellation (`cancel()` or `set_destination(None)`).
    Cancelled,
    /// A new destination replaced the active one.
    Redirected,
    /// The path query reported the target unreachable.
    Unreachable,
}

impl TripEnd {
    pub fn reached(&self) -> bool {
        matches!(self, TripEnd::Reached)
    }
}

/// Frozen behavioural metrics of one finished trip.
///
/// Produced exactly once per trip by the metrics recorder and never mutated
/// afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripMetrics {
    pub trip_id: Uuid,
    pub destination_name: String,
    pub optimal_length_m: f32,
    pub time_seconds: f32,
    pub distance_meters: f32,
    pub deviation_count: u32,
    pub error_count: u32,
    pub help_interventions: u32,
    pub route_match_percent: f32,
    pub reached_destination: bool,
    pub independent_trip: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// The persisted record shape, as sent to the persistence backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MetricsRecord {
    pub participant_handle: ParticipantHandle,
    pub phase: Phase,
    pub destination_name: String,
    pub time_seconds: f32,
    pub distance_meters: f32,
    pub deviation_count: u32,
    pub error_count: u32,
    pub route_match_percent: f32,
    pub reached_destination: bool,
    pub help_interventions: u32,
    pub independent_trip: bool,
}

impl MetricsRecord {
    /// Stamp frozen trip metrics with the participant handle and phase.
    pub fn new(participant_handle: ParticipantHandle, phase: Phase, metrics: &TripMetrics) -> Self {
        Self {
            participant_handle,
            phase,
            destination_name: metrics.destination_name.clone(),
            time_seconds: metrics.time_seconds,
            distance_meters: metrics.distance_meters,
            deviation_count: metrics.deviation_count,
            error_count: metrics.error_count,
            route_match_percent: metrics.route_match_percent,
            reached_destination: metrics.reached_destination,
            help_interventions: metrics.help_interventions,
            independent_trip: metrics.independent_trip,
        }
    }
}

/// Unified event wrapper for the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g. "wayfind-runtime::navigation_loop"
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data routed over the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    TripStarted {
        trip_id: Uuid,
        destination: String,
        optimal_length_m: f32,
    },
    /// The "destination reached" notification consumed by the UI.
    DestinationReached { destination: String },
    TripEnded {
        destination: String,
        cause: TripEnd,
    },
    /// A frozen trip was handed to the session controller.
    MetricsEmitted(TripMetrics),
    DeviationRecorded { total: u32 },
    WrongDestination { intended: String, nearby: String },
    HelpIntervention { total: u32 },
    PartialPath { destination: String, gap_m: f32 },
    PathUnavailable { destination: String },
    Registered { handle: ParticipantHandle },
    RegistrationRejected { reason: WayfindError },
    RecordPersisted { trip_id: Uuid },
    PersistenceFailed { trip_id: Uuid, reason: String },
    RecordsDiscarded { count: usize },
}

/// Workspace-wide error taxonomy. Every variant is locally recoverable.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WayfindError {
    #[error("Path unavailable to {destination}")]
    PathUnavailable { destination: String },

    #[error("Participant {0} is already registered")]
    DuplicateRegistration(String),

    #[error("Registration failed: {0}")]
    RegistrationFailure(String),

    #[error("Persistence failed: {0}")]
    PersistenceFailure(String),

    #[error("Invalid phase '{0}': expected 'pre-test' or 'post-test'")]
    InvalidPhase(String),

    #[error("Invalid group '{0}': expected 'control' or 'experimental'")]
    InvalidGroup(String),

    #[error("No agent position source; tracking cannot start")]
    MissingAgentReference,

    #[error("Participant id must not be empty")]
    EmptyParticipantId,

    #[error("A registration request is already in flight")]
    RegistrationInFlight,

    #[error("Unknown destination '{0}'")]
    UnknownDestination(String),

    #[error("Channel error: {0}")]
    Channel(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn planar_distance_ignores_height() {
        let a = Vec3::new(0.0, 0.0, 0.0);
        let b = Vec3::new(3.0, 10.0, 4.0);
        assert!((a.planar_distance(b) - 5.0).abs() < f32::EPSILON);
        assert!(a.distance(b) > 10.0);
    }

    #[test]
    fn phase_parses_only_known_labels() {
        assert_eq!("pre-test".parse::<Phase>().unwrap(), Phase::PreTest);
        assert_eq!("post-test".parse::<Phase>().unwrap(), Phase::PostTest);
        let err = "bogus".parse::<Phase>().unwrap_err();
        assert_eq!(err, WayfindError::InvalidPhase("bogus".to_string()));
        // Labels are exact, not case-folded.
        assert!("Post-Test".parse::<Phase>().is_err());
    }

    #[test]
    fn phase_serializes_as_hyphenated_label() {
        let json = serde_json::to_string(&Phase::PostTest).unwrap();
        assert_eq!(json, "\"post-test\"");
    }

    #[test]
    fn group_parses_case_insensitively() {
        assert_eq!("Experimental".parse::<Group>().unwrap(), Group::Experimental);
        assert_eq!(" control ".parse::<Group>().unwrap(), Group::Control);
        assert!("treatment".parse::<Group>().is_err());
    }

    #[test]
    fn metrics_record_copies_trip_fields() {
        let now = Utc::now();
        let metrics = TripMetrics {
            trip_id: Uuid::new_v4(),
            destination_name: "Recepcion".to_string(),
            optimal_length_m: 10.0,
            time_seconds: 12.0,
            distance_meters: 12.5,
            deviation_count: 1,
            error_count: 0,
            help_interventions: 2,
            route_match_percent: 80.0,
            reached_destination: true,
            independent_trip: false,
            started_at: now,
            finished_at: now,
        };
        let record = MetricsRecord::new(ParticipantHandle::new("abc"), Phase::PostTest, &metrics);
        assert_eq!(record.destination_name, "Recepcion");
        assert_eq!(record.phase, Phase::PostTest);
        assert_eq!(record.help_interventions, 2);
        assert!(!record.independent_trip);

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["participant_handle"], "abc");
        assert_eq!(json["phase"], "post-test");
    }

    #[test]
    fn error_display_names_the_condition() {
        let err = WayfindError::DuplicateRegistration("S-001".to_string());
        assert!(err.to_string().contains("already registered"));
        assert!(WayfindError::MissingAgentReference.to_string().contains("agent position"));
    }
}
