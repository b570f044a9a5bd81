//! `wayfind-session` – Who is being measured, and where their records go.
//!
//! # Modules
//!
//! - [`session`] – [`SessionController`][session::SessionController]: the
//!   `LoggedOut → Registering → Active | Admin` state machine.  Gates whether
//!   trips are recorded and forwards frozen metrics to the persistence
//!   dispatcher.
//! - [`outbox`] – [`Outbox`][outbox::Outbox]: bounded queue of records
//!   emitted while registration is still in flight.

pub mod outbox;
pub mod session;

pub use outbox::{Outbox, PendingRecord};
pub use session::{EmitOutcome, LoginProgress, SessionController, SessionState, SessionUpdate};
