use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use alloy::primitives::keccak256;
use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, info};

use teleport_core::{
    PortError, RelayPort, RelayTask, RelayTaskOutcome, RelayTaskState, SignedRelayPayload,
};

use crate::InMemoryAmounts;

/// How a freshly submitted task resolves without outside help.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RelayBehavior {
    /// Stays pending until [`InMemoryRelay::resolve`] is called.
    #[default]
    Manual,
    /// Mints right away; the mint hash is `keccak256(task_id)`.
    MintImmediately,
    FailImmediately(String),
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryRelay {
    state: Arc<Mutex<RelayState>>,
    ledger: Option<InMemoryAmounts>,
}

#[derive(Debug, Default)]
struct RelayState {
    next_id: u64,
    behavior: RelayBehavior,
    reject_next: Option<String>,
    tasks: HashMap<String, TaskEntry>,
    submissions: Vec<SignedRelayPayload>,
}

#[derive(Debug)]
struct TaskEntry {
    state: RelayTaskState,
    outcome: watch::Sender<Option<RelayTaskOutcome>>,
}

impl InMemoryRelay {
    pub fn new(behavior: RelayBehavior) -> Self {
        let relay = Self::default();
        if let Ok(mut g) = relay.state.lock() {
            g.behavior = behavior;
        }
        relay
    }

    /// Successful mints are booked into `ledger`.
    pub fn with_ledger(mut self, ledger: InMemoryAmounts) -> Self {
        self.ledger = Some(ledger);
        self
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, RelayState>, PortError> {
        self.state
            .lock()
            .map_err(|e| PortError::Transport(format!("relay lock poisoned: {e}")))
    }

    pub fn set_behavior(&self, behavior: RelayBehavior) -> Result<(), PortError> {
        self.lock()?.behavior = behavior;
        Ok(())
    }

    /// The next `submit` is refused with `reason`.
    pub fn reject_next(&self, reason: impl Into<String>) -> Result<(), PortError> {
        self.lock()?.reject_next = Some(reason.into());
        Ok(())
    }

    pub fn resolve(&self, task_id: &str, outcome: RelayTaskOutcome) -> Result<(), PortError> {
        let mut g = self.lock()?;
        let entry = g
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| PortError::NotFound(format!("relay task {task_id}")))?;
        entry.state = match outcome {
            RelayTaskOutcome::Minted { .. } => RelayTaskState::Succeeded,
            RelayTaskOutcome::Failed { .. } => RelayTaskState::Failed,
        };
        entry.outcome.send_replace(Some(outcome));
        Ok(())
    }

    pub fn task(&self, task_id: &str) -> Option<RelayTask> {
        let g = self.lock().ok()?;
        g.tasks.get(task_id).map(|entry| RelayTask {
            task_id: task_id.to_owned(),
            state: entry.state,
        })
    }

    pub fn submissions(&self) -> Vec<SignedRelayPayload> {
        self.lock().map(|g| g.submissions.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl RelayPort for InMemoryRelay {
    async fn submit(&self, payload: &SignedRelayPayload) -> Result<String, PortError> {
        let (task_id, behavior) = {
            let mut g = self.lock()?;
            if let Some(reason) = g.reject_next.take() {
                return Err(PortError::Policy(reason));
            }
            g.next_id += 1;
            let task_id = format!("task-{}", g.next_id);
            let (outcome, _) = watch::channel(None);
            g.tasks.insert(
                task_id.clone(),
                TaskEntry {
                    state: RelayTaskState::Pending,
                    outcome,
                },
            );
            g.submissions.push(payload.clone());
            (task_id, g.behavior.clone())
        };
        info!(%task_id, payload_hash = %payload.payload_hash, "relay task accepted");

        match behavior {
            RelayBehavior::Manual => {}
            RelayBehavior::MintImmediately => {
                if let Some(ledger) = &self.ledger {
                    ledger.settle(&payload.payload.guid)?;
                }
                let tx_hash = keccak256(task_id.as_bytes());
                self.resolve(&task_id, RelayTaskOutcome::Minted { tx_hash })?;
            }
            RelayBehavior::FailImmediately(reason) => {
                self.resolve(&task_id, RelayTaskOutcome::Failed { reason })?;
            }
        }
        Ok(task_id)
    }

    async fn wait_for_task(&self, task_id: &str) -> Result<RelayTaskOutcome, PortError> {
        let mut rx = {
            let g = self.lock()?;
            let entry = g
                .tasks
                .get(task_id)
                .ok_or_else(|| PortError::NotFound(format!("relay task {task_id}")))?;
            entry.outcome.subscribe()
        };
        debug!(%task_id, "waiting for relay task");
        let outcome = rx
            .wait_for(Option::is_some)
            .await
            .map_err(|e| PortError::Transport(format!("relay task {task_id} dropped: {e}")))?;
        outcome
            .clone()
            .ok_or_else(|| PortError::Transport(format!("relay task {task_id} has no outcome")))
    }
}
