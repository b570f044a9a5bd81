//! Task+channel bridge between the synchronous tick loop and the async
//! [`PersistenceGateway`].
//!
//! ```text
//!   tick loop                                 tokio runtime
//!  ┌──────────────┐   DispatchCommand   ┌───────────────────────┐
//!  │DispatchHandle│ ──────────────────► │ DispatchInbox::run    │
//!  │              │                     │  └─ one task/command  │
//!  │              │ ◄────────────────── │     gateway.register  │
//!  └──────────────┘  DispatchCompletion │     gateway.persist   │
//!                                       └───────────────────────┘
//! ```
//!
//! Both directions use unbounded channels so sending from the tick loop
//! never blocks.  Completions are polled with
//! [`DispatchHandle::try_next_completion`] once per tick.
//!
//! Tests can drive the worker side by hand: take commands with
//! [`DispatchInbox::try_next_command`] and answer them with
//! [`DispatchInbox::complete`].

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;
use wayfind_types::{Group, MetricsRecord, ParticipantHandle, WayfindError};

use crate::gateway::PersistenceGateway;

/// Work sent from the tick loop to the worker.
#[derive(Debug, Clone)]
pub enum DispatchCommand {
    Register {
        attempt: u64,
        participant_id: String,
        group: Group,
    },
    Persist {
        trip_id: Uuid,
        record: MetricsRecord,
    },
}

/// Result of one command, sent back to the tick loop.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchCompletion {
    Registration {
        attempt: u64,
        outcome: Result<ParticipantHandle, WayfindError>,
    },
    Persistence {
        trip_id: Uuid,
        outcome: Result<(), WayfindError>,
    },
}

/// Create a connected handle/inbox pair without spawning anything.
pub fn dispatch_channel() -> (DispatchHandle, DispatchInbox) {
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (completion_tx, completion_rx) = mpsc::unbounded_channel();
    (
        DispatchHandle {
            commands: command_tx,
            completions: completion_rx,
        },
        DispatchInbox {
            commands: command_rx,
            completions: completion_tx,
        },
    )
}

/// Spawn a worker on the current tokio runtime that serves commands with
/// `gateway`.
pub fn spawn_dispatcher(gateway: Arc<dyn PersistenceGateway>) -> DispatchHandle {
    let (handle, inbox) = dispatch_channel();
    tokio::spawn(inbox.run(gateway));
    handle
}

// ────────────────────────────────────────────────────────────────────────────
// Tick-loop side
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct DispatchHandle {
    commands: mpsc::UnboundedSender<DispatchCommand>,
    completions: mpsc::UnboundedReceiver<DispatchCompletion>,
}

impl DispatchHandle {
    pub fn register(
        &self,
        attempt: u64,
        participant_id: &str,
        group: Group,
    ) -> Result<(), WayfindError> {
        self.send(DispatchCommand::Register {
            attempt,
            participant_id: participant_id.to_string(),
            group,
        })
    }

    pub fn persist(&self, trip_id: Uuid, record: MetricsRecord) -> Result<(), WayfindError> {
        self.send(DispatchCommand::Persist { trip_id, record })
    }

    fn send(&self, command: DispatchCommand) -> Result<(), WayfindError> {
        self.commands
            .send(command)
            .map_err(|_| WayfindError::Channel("dispatcher worker has shut down".into()))
    }

    /// Next completion, if one has already arrived.
    pub fn try_next_completion(&mut self) -> Option<DispatchCompletion> {
        self.completions.try_recv().ok()
    }

    /// Wait for the next completion.  `None` once the worker is gone.
    pub async fn next_completion(&mut self) -> Option<DispatchCompletion> {
        self.completions.recv().await
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Worker side
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct DispatchInbox {
    commands: mpsc::UnboundedReceiver<DispatchCommand>,
    completions: mpsc::UnboundedSender<DispatchCompletion>,
}

impl DispatchInbox {
    /// Serve commands until every [`DispatchHandle`] is dropped.
    ///
    /// Each command runs on its own task, so a slow `persist` never holds up
    /// a later `register`.
    pub async fn run(mut self, gateway: Arc<dyn PersistenceGateway>) {
        while let Some(command) = self.commands.recv().await {
            let gateway = Arc::clone(&gateway);
            let completions = self.completions.clone();
            tokio::spawn(async move {
                let completion = execute(gateway.as_ref(), command).await;
                if completions.send(completion).is_err() {
                    debug!("completion dropped: tick loop has shut down");
                }
            });
        }
        debug!("dispatcher worker stopped");
    }

    pub fn try_next_command(&mut self) -> Option<DispatchCommand> {
        self.commands.try_recv().ok()
    }

    /// Deliver a completion by hand.  Returns `false` if the handle is gone.
    pub fn complete(&self, completion: DispatchCompletion) -> bool {
        self.completions.send(completion).is_ok()
    }
}

async fn execute(gateway: &dyn PersistenceGateway, command: DispatchCommand) -> DispatchCompletion {
    match command {
        DispatchCommand::Register {
            attempt,
            participant_id,
            group,
        } => DispatchCompletion::Registration {
            attempt,
            outcome: gateway.register(&participant_id, group).await,
        },
        DispatchCommand::Persist { trip_id, record } => {
            let outcome = gateway.persist(&record).await;
            if let Err(e) = &outcome {
                warn!(%trip_id, error = %e, "persist call failed");
            }
            DispatchCompletion::Persistence { trip_id, outcome }
        }
    }
}
