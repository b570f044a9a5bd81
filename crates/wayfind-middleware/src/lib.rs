//! `wayfind-middleware` – Plumbing between the tick loop and the outside world.
//!
//! Nothing in this crate knows what a trip *means*; it only moves events and
//! records around.
//!
//! # Modules
//!
//! - [`bus`] – Topic-based publish/subscribe event bus built on Tokio
//!   broadcast channels.
//! - [`gateway`] – The [`PersistenceGateway`] contract (register / persist).
//! - [`rest_gateway`] – PostgREST-compatible HTTP implementation.
//! - [`memory_gateway`] – In-process implementation for offline runs and tests.
//! - [`dispatcher`] – Task+channel bridge that runs gateway calls off the
//!   tick loop and reports completions back to it.

pub mod bus;
pub mod dispatcher;
pub mod gateway;
pub mod memory_gateway;
pub mod rest_gateway;

pub use bus::{EventBus, Topic, TopicReceiver};
pub use dispatcher::{
    dispatch_channel, spawn_dispatcher, DispatchCommand, DispatchCompletion, DispatchHandle,
    DispatchInbox,
};
pub use gateway::PersistenceGateway;
pub use memory_gateway::InMemoryGateway;
pub use rest_gateway::{RestGateway, RestGatewayConfig};
