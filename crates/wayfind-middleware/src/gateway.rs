//! The persistence contract consumed by the session controller.
//!
//! Both calls are asynchronous and never invoked from the tick loop directly;
//! the [`dispatcher`][crate::dispatcher] runs them on their own tasks.
//!
//! | Call | Success | Distinct failures |
//! |---|---|---|
//! | `register` | opaque [`ParticipantHandle`] | [`WayfindError::DuplicateRegistration`], [`WayfindError::RegistrationFailure`] |
//! | `persist` | `()` | [`WayfindError::PersistenceFailure`] |

use async_trait::async_trait;
use wayfind_types::{Group, MetricsRecord, ParticipantHandle, WayfindError};

#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Register `participant_id` in `group` and return its backend handle.
    async fn register(
        &self,
        participant_id: &str,
        group: Group,
    ) -> Result<ParticipantHandle, WayfindError>;

    /// Store one frozen metrics record.  Failures are reported, not retried.
    async fn persist(&self, record: &MetricsRecord) -> Result<(), WayfindError>;
}
