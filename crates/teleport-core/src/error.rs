use alloy::primitives::B256;
use thiserror::Error;

use crate::ports::PortError;
use crate::state_machine::{TransferAction, TransferPhase};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GuidError {
    #[error("domain name longer than 32 bytes: {0}")]
    DomainNameTooLong(String),
    #[error("invalid guid encoding length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("guid field {field} exceeds {bits} bits")]
    FieldOverflow { field: &'static str, bits: usize },
    #[error("guid abi decoding failed: {0}")]
    Abi(String),
}

#[derive(Debug, Clone, Error)]
pub enum TeleportError {
    /// No receipt became visible within the attempt ceiling. Retry by re-entering.
    #[error("no receipt for {tx_hash} after {attempts} attempts")]
    Unconfirmed { tx_hash: B256, attempts: u32 },
    #[error("transaction {tx_hash} reverted")]
    Reverted { tx_hash: B256 },
    #[error("relay task {task_id} failed: {reason}")]
    RelayFailed { task_id: String, reason: String },
    #[error("network mismatch: expected chain {expected}, wallet is on {actual}")]
    NetworkMismatch { expected: u64, actual: u64 },
    #[error("already in progress: {0}")]
    InProgress(String),
    #[error("cancelled")]
    Cancelled,
    #[error("illegal transfer transition: {from:?} --{action:?}-->")]
    IllegalTransition {
        from: TransferPhase,
        action: TransferAction,
    },
    #[error("precondition not met: {0}")]
    Precondition(String),
    #[error(transparent)]
    Guid(#[from] GuidError),
    #[error(transparent)]
    Port(#[from] PortError),
}

impl TeleportError {
    /// Errors that re-arm the same phase instead of ending the transfer.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TeleportError::Unconfirmed { .. } | TeleportError::Port(PortError::Transport(_))
        )
    }
}
