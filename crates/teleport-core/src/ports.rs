use std::fmt;

use alloy::primitives::{B256, U256};
use async_trait::async_trait;
use futures::future::BoxFuture;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::domain::{
    BurnRequest, DirectMintRequest, DomainId, DomainInfo, OracleSnapshot, Receipt, RelayPayload,
    RelayTaskOutcome, ResumeToken, SignedRelayPayload, TeleportGuid, WalletSession,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PortError {
    #[error("port not implemented: {0}")]
    NotImplemented(&'static str),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("policy error: {0}")]
    Policy(String),
}

/// A submitted transaction, optionally carrying the domain's own finality signal.
pub struct PendingTx {
    pub hash: B256,
    finality: Option<BoxFuture<'static, Result<Receipt, PortError>>>,
}

impl PendingTx {
    pub fn new(hash: B256, finality: BoxFuture<'static, Result<Receipt, PortError>>) -> Self {
        Self {
            hash,
            finality: Some(finality),
        }
    }

    pub fn hash_only(hash: B256) -> Self {
        Self {
            hash,
            finality: None,
        }
    }

    pub fn into_finality(self) -> Option<BoxFuture<'static, Result<Receipt, PortError>>> {
        self.finality
    }
}

impl fmt::Debug for PendingTx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingTx")
            .field("hash", &self.hash)
            .field("live", &self.finality.is_some())
            .finish()
    }
}

#[async_trait]
pub trait DomainQueryPort: Send + Sync {
    async fn get_receipt(&self, tx_hash: B256) -> Result<Option<Receipt>, PortError>;
}

#[async_trait]
pub trait OraclePort: Send + Sync {
    /// Pushes snapshots for `burn_tx_hash` until the receiver is dropped.
    async fn subscribe(
        &self,
        source: DomainId,
        burn_tx_hash: B256,
    ) -> Result<mpsc::Receiver<OracleSnapshot>, PortError>;
}

#[async_trait]
pub trait RelayPort: Send + Sync {
    async fn submit(&self, payload: &SignedRelayPayload) -> Result<String, PortError>;
    /// Resolves once the relay reports a terminal state for `task_id`.
    async fn wait_for_task(&self, task_id: &str) -> Result<RelayTaskOutcome, PortError>;
}

#[async_trait]
pub trait AmountsPort: Send + Sync {
    async fn pending_mintable_amount(&self, guid: &TeleportGuid) -> Result<U256, PortError>;
    async fn relay_fee(&self, guid: &TeleportGuid) -> Result<U256, PortError>;
}

pub trait ChainIdentityPort: Send + Sync {
    fn domain_for_chain(&self, chain_id: u64) -> Option<DomainInfo>;
    fn chain_for_domain(&self, domain: DomainId) -> Option<DomainInfo>;
    fn destination_for(&self, source: DomainId) -> Option<DomainInfo>;
}

#[async_trait]
pub trait WalletPort: Send + Sync {
    async fn session(&self) -> Result<Option<WalletSession>, PortError>;
    async fn switch_network(&self, chain_id: u64) -> Result<(), PortError>;
    async fn balance(&self, domain: &DomainInfo) -> Result<U256, PortError>;
    async fn allowance(&self, domain: &DomainInfo) -> Result<U256, PortError>;
    async fn claim_initial_allocation(&self, domain: &DomainInfo) -> Result<PendingTx, PortError>;
    async fn approve(&self, domain: &DomainInfo, amount: U256) -> Result<PendingTx, PortError>;
    async fn burn(&self, request: &BurnRequest) -> Result<PendingTx, PortError>;
    async fn sign_relay_payload(
        &self,
        payload: &RelayPayload,
    ) -> Result<SignedRelayPayload, PortError>;
    async fn mint_with_oracles(&self, request: &DirectMintRequest) -> Result<PendingTx, PortError>;
}

pub trait TransferStorePort: Send + Sync {
    fn save(&self, token: &ResumeToken) -> Result<(), PortError>;
    fn load(&self, source_chain_id: u64, burn_tx_hash: B256)
        -> Result<Option<ResumeToken>, PortError>;
    fn remove(&self, source_chain_id: u64, burn_tx_hash: B256) -> Result<(), PortError>;
}
