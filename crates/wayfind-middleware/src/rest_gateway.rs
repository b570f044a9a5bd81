//! [`RestGateway`] – PostgREST-compatible HTTP persistence backend.
//!
//! Registration inserts a participant row and reads the generated `id` back
//! (`Prefer: return=representation`).  A unique-constraint violation
//! (HTTP 409, or Postgres error code `23505` anywhere in the body) is a
//! duplicate, not a failure.
//!
//! # Example
//!
//! ```rust,no_run
//! use wayfind_middleware::rest_gateway::{RestGateway, RestGatewayConfig};
//!
//! let gateway = RestGateway::new(RestGatewayConfig::new(
//!     "https://study.example.org",
//!     "public-anon-key",
//! ));
//! // gateway.register("A01", Group::Control).await
//! ```

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use tracing::{error, info, instrument, warn};
use wayfind_types::{Group, MetricsRecord, ParticipantHandle, WayfindError};

use crate::gateway::PersistenceGateway;

/// Postgres `unique_violation` SQLSTATE.
const UNIQUE_VIOLATION: &str = "23505";

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct RestGatewayConfig {
    pub base_url: String,
    pub api_key: String,
    pub participants_table: String,
    pub records_table: String,
}

impl RestGatewayConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            participants_table: "participants".to_string(),
            records_table: "trip_records".to_string(),
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }
}

impl std::fmt::Debug for RestGatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestGatewayConfig")
            .field("base_url", &self.base_url)
            .field(
                "api_key",
                if self.api_key.is_empty() { &"<not set>" } else { &"<redacted>" },
            )
            .field("participants_table", &self.participants_table)
            .field("records_table", &self.records_table)
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Response classification
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct RegistrationRow<'a> {
    participant_code: &'a str,
    group: Group,
}

/// Map a non-success registration response to the error taxonomy.
pub fn classify_registration_failure(
    status: StatusCode,
    body: &str,
    participant_id: &str,
) -> WayfindError {
    if status == StatusCode::CONFLICT || body.contains(UNIQUE_VIOLATION) {
        WayfindError::DuplicateRegistration(participant_id.to_string())
    } else {
        WayfindError::RegistrationFailure(format!("HTTP {status}: {body}"))
    }
}

/// Pull the generated `id` out of a `return=representation` body, which is
/// either a one-row array or a bare object.
pub fn extract_participant_id(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let row = match &value {
        serde_json::Value::Array(rows) => rows.first()?,
        other => other,
    };
    match row.get("id")? {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// RestGateway
// ─────────────────────────────────────────────────────────────────────────────

/// Async HTTP client for the study backend.  Construct once and share.
pub struct RestGateway {
    config: RestGatewayConfig,
    client: reqwest::Client,
}

impl RestGateway {
    pub fn new(config: RestGatewayConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn post(&self, table: &str) -> reqwest::RequestBuilder {
        self.client
            .post(self.config.table_url(table))
            .header("apikey", &self.config.api_key)
            .bearer_auth(&self.config.api_key)
            .header("Prefer", "return=representation")
    }
}

#[async_trait]
impl PersistenceGateway for RestGateway {
    #[instrument(skip(self), fields(table = %self.config.participants_table))]
    async fn register(
        &self,
        participant_id: &str,
        group: Group,
    ) -> Result<ParticipantHandle, WayfindError> {
        let response = self
            .post(&self.config.participants_table)
            .json(&RegistrationRow {
                participant_code: participant_id,
                group,
            })
            .send()
            .await
            .map_err(|e| WayfindError::RegistrationFailure(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| WayfindError::RegistrationFailure(e.to_string()))?;

        if !status.is_success() {
            let err = classify_registration_failure(status, &body, participant_id);
            match &err {
                WayfindError::DuplicateRegistration(_) => {
                    info!(participant_id, "participant already registered")
                }
                _ => error!(participant_id, %status, body = %body, "registration failed"),
            }
            return Err(err);
        }

        let id = extract_participant_id(&body).ok_or_else(|| {
            WayfindError::RegistrationFailure(format!("response carried no participant id: {body}"))
        })?;
        info!(participant_id, handle = %id, "participant registered");
        Ok(ParticipantHandle::new(id))
    }

    #[instrument(skip(self, record), fields(destination = %record.destination_name))]
    async fn persist(&self, record: &MetricsRecord) -> Result<(), WayfindError> {
        let response = self
            .post(&self.config.records_table)
            .json(record)
            .send()
            .await
            .map_err(|e| WayfindError::PersistenceFailure(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        warn!(%status, body = %body, "record not persisted");
        Err(WayfindError::PersistenceFailure(format!("HTTP {status}: {body}")))
    }
}
