use alloy::primitives::B256;
use serde::Serialize;

use crate::domain::{ResumeToken, TeleportGuid};
use crate::state_machine::StateTransition;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FailureReason {
    AllocationReverted,
    ApprovalReverted,
    BurnReverted,
    MintReverted,
}

/// Notifications for the UI/monitoring layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum TransferEvent {
    PhaseChanged(StateTransition),
    Resumed {
        token: ResumeToken,
    },
    NetworkMismatch {
        expected: u64,
        actual: u64,
    },
    BurnSubmitted {
        tx_hash: B256,
        resume: ResumeToken,
    },
    TxConfirmed {
        tx_hash: B256,
    },
    /// No receipt yet; the wait is re-armed on the next step.
    Unconfirmed {
        tx_hash: B256,
        attempts: u32,
    },
    GuidObserved {
        guid: TeleportGuid,
    },
    AttestationProgress {
        count: usize,
        threshold: usize,
    },
    PayloadSigned {
        payload_hash: B256,
    },
    RelayTaskCreated {
        task_id: String,
    },
    RelayFailed {
        task_id: Option<String>,
        reason: String,
        attempts: u32,
        exhausted: bool,
    },
    MintSubmitted {
        tx_hash: B256,
    },
    AlreadyCompleted {
        guid: TeleportGuid,
    },
    Completed {
        guid: TeleportGuid,
        mint_tx_hash: Option<B256>,
    },
    Failed {
        reason: FailureReason,
        tx_hash: B256,
    },
    Aborted,
}
