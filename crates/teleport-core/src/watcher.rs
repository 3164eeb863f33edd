//! Waits for a transaction to reach a terminal receipt on one domain.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy::primitives::B256;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::{Receipt, ReceiptStatus};
use crate::error::TeleportError;
use crate::ports::{DomainQueryPort, PendingTx, PortError};

#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub max_attempts: u32,
    /// Attempt `i` sleeps `i * backoff_unit` before querying.
    pub backoff_unit: Duration,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            backoff_unit: Duration::from_secs(1),
        }
    }
}

#[derive(Debug)]
pub enum TxTarget {
    Hash(B256),
    Pending(PendingTx),
}

impl TxTarget {
    pub fn hash(&self) -> B256 {
        match self {
            TxTarget::Hash(hash) => *hash,
            TxTarget::Pending(pending) => pending.hash,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confirmation {
    Confirmed(Receipt),
    Reverted(Receipt),
}

#[derive(Debug, Clone, Default)]
pub struct ConfirmationWatcher {
    config: WatchConfig,
    in_flight: Arc<Mutex<HashSet<B256>>>,
}

struct InFlightGuard {
    set: Arc<Mutex<HashSet<B256>>>,
    hash: B256,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if let Ok(mut g) = self.set.lock() {
            g.remove(&self.hash);
        }
    }
}

impl ConfirmationWatcher {
    pub fn new(config: WatchConfig) -> Self {
        Self {
            config,
            in_flight: Arc::default(),
        }
    }

    pub fn is_watching(&self, tx_hash: B256) -> bool {
        self.in_flight
            .lock()
            .map(|g| g.contains(&tx_hash))
            .unwrap_or(false)
    }

    /// Resolves to `Confirmed` or `Reverted`; `on_confirmed` fires only for a
    /// success receipt. A second call for a hash that is still being watched
    /// fails with `InProgress` without touching the domain.
    pub async fn await_confirmation<Q, F>(
        &self,
        query: &Q,
        target: TxTarget,
        cancel: &CancellationToken,
        on_confirmed: F,
    ) -> Result<Confirmation, TeleportError>
    where
        Q: DomainQueryPort + ?Sized,
        F: FnOnce(&Receipt),
    {
        let tx_hash = target.hash();
        let _guard = self.claim(tx_hash)?;

        let receipt = match target {
            TxTarget::Pending(pending) => match pending.into_finality() {
                Some(finality) => {
                    let outcome = tokio::select! {
                        _ = cancel.cancelled() => return Err(TeleportError::Cancelled),
                        outcome = finality => outcome,
                    };
                    match outcome {
                        Ok(receipt) => receipt,
                        Err(e) => {
                            warn!(%tx_hash, error = %e, "finality handle failed, polling by hash");
                            self.poll_receipt(query, tx_hash, cancel).await?
                        }
                    }
                }
                None => self.poll_receipt(query, tx_hash, cancel).await?,
            },
            TxTarget::Hash(hash) => self.poll_receipt(query, hash, cancel).await?,
        };

        match receipt.status {
            ReceiptStatus::Success => {
                info!(%tx_hash, "transaction confirmed");
                on_confirmed(&receipt);
                Ok(Confirmation::Confirmed(receipt))
            }
            ReceiptStatus::Failure => {
                warn!(%tx_hash, "transaction reverted");
                Ok(Confirmation::Reverted(receipt))
            }
        }
    }

    fn claim(&self, tx_hash: B256) -> Result<InFlightGuard, TeleportError> {
        let mut g = self
            .in_flight
            .lock()
            .map_err(|e| PortError::Transport(format!("watcher lock poisoned: {e}")))?;
        if !g.insert(tx_hash) {
            return Err(TeleportError::InProgress(format!("confirmation of {tx_hash}")));
        }
        Ok(InFlightGuard {
            set: Arc::clone(&self.in_flight),
            hash: tx_hash,
        })
    }

    async fn poll_receipt<Q>(
        &self,
        query: &Q,
        tx_hash: B256,
        cancel: &CancellationToken,
    ) -> Result<Receipt, TeleportError>
    where
        Q: DomainQueryPort + ?Sized,
    {
        for attempt in 1..=self.config.max_attempts {
            tokio::select! {
                _ = cancel.cancelled() => return Err(TeleportError::Cancelled),
                _ = tokio::time::sleep(self.config.backoff_unit * attempt) => {}
            }
            let result = tokio::select! {
                _ = cancel.cancelled() => return Err(TeleportError::Cancelled),
                result = query.get_receipt(tx_hash) => result,
            };
            match result {
                Ok(Some(receipt)) => return Ok(receipt),
                Ok(None) => debug!(%tx_hash, attempt, "no receipt yet"),
                Err(e) => warn!(%tx_hash, attempt, error = %e, "receipt query failed"),
            }
        }
        warn!(%tx_hash, attempts = self.config.max_attempts, "no receipt found");
        Err(TeleportError::Unconfirmed {
            tx_hash,
            attempts: self.config.max_attempts,
        })
    }
}
