pub mod attestation;
mod cancel;
pub mod config;
pub mod domain;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod ports;
pub mod relay;
pub mod state_machine;
pub mod watcher;

pub use attestation::{AttestationCollector, CollectedAttestations};
pub use config::OrchestratorConfig;
pub use domain::{
    AttestationProgress, AttestationSet, BurnRequest, DirectMintRequest, DomainId, DomainInfo,
    MintPath, OracleSignature, OracleSnapshot, Receipt, ReceiptStatus, RelayPayload, RelayTask,
    RelayTaskOutcome, RelayTaskState, ResumeToken, SignedRelayPayload, TeleportGuid,
    TransferRequest, WalletSession,
};
pub use error::{GuidError, TeleportError};
pub use events::{FailureReason, TransferEvent};
pub use orchestrator::{Orchestrator, Route, TeleportPorts, TransferCommand};
pub use ports::{
    AmountsPort, ChainIdentityPort, DomainQueryPort, OraclePort, PendingTx, PortError, RelayPort,
    TransferStorePort, WalletPort,
};
pub use relay::{FeeBudget, RelayRequest, RelaySubmitter};
pub use state_machine::{
    transfer_transition, StateTransition, TransferAction, TransferPhase, TransferState,
};
pub use watcher::{Confirmation, ConfirmationWatcher, TxTarget, WatchConfig};
