use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy::primitives::{Address, Bytes, B256};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use teleport_core::{
    DomainId, OraclePort, OracleSignature, OracleSnapshot, PortError, TeleportGuid,
};

/// Oracle feed fed by hand. Every subscriber first receives the snapshots
/// already published for its burn.
#[derive(Debug, Clone)]
pub struct InMemoryOracle {
    capacity: usize,
    state: Arc<Mutex<OracleState>>,
}

#[derive(Debug, Default)]
struct OracleState {
    feeds: HashMap<B256, Feed>,
}

#[derive(Debug, Default)]
struct Feed {
    history: Vec<OracleSnapshot>,
    subscribers: Vec<mpsc::Sender<OracleSnapshot>>,
    subscriptions: usize,
}

impl Default for InMemoryOracle {
    fn default() -> Self {
        Self::new(16)
    }
}

impl InMemoryOracle {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Arc::new(Mutex::new(OracleState::default())),
        }
    }

    pub fn publish(&self, burn_tx_hash: B256, snapshot: OracleSnapshot) -> Result<(), PortError> {
        let mut g = self
            .state
            .lock()
            .map_err(|e| PortError::Transport(format!("oracle lock poisoned: {e}")))?;
        let feed = g.feeds.entry(burn_tx_hash).or_default();
        feed.history.push(snapshot.clone());
        feed.subscribers
            .retain(|tx| match tx.try_send(snapshot.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    warn!(%burn_tx_hash, "oracle subscriber lagging, snapshot dropped");
                    true
                }
                Err(TrySendError::Closed(_)) => false,
            });
        Ok(())
    }

    /// Number of `subscribe` calls made for `burn_tx_hash`.
    pub fn subscription_count(&self, burn_tx_hash: B256) -> usize {
        self.state
            .lock()
            .map(|g| g.feeds.get(&burn_tx_hash).map_or(0, |f| f.subscriptions))
            .unwrap_or(0)
    }

    /// Drops every live subscriber of `burn_tx_hash`, closing their feeds.
    pub fn disconnect(&self, burn_tx_hash: B256) -> Result<(), PortError> {
        let mut g = self
            .state
            .lock()
            .map_err(|e| PortError::Transport(format!("oracle lock poisoned: {e}")))?;
        if let Some(feed) = g.feeds.get_mut(&burn_tx_hash) {
            feed.subscribers.clear();
        }
        Ok(())
    }
}

#[async_trait]
impl OraclePort for InMemoryOracle {
    async fn subscribe(
        &self,
        source: DomainId,
        burn_tx_hash: B256,
    ) -> Result<mpsc::Receiver<OracleSnapshot>, PortError> {
        let mut g = self
            .state
            .lock()
            .map_err(|e| PortError::Transport(format!("oracle lock poisoned: {e}")))?;
        let feed = g.feeds.entry(burn_tx_hash).or_default();
        let (tx, rx) = mpsc::channel(self.capacity.max(feed.history.len() + 1));
        for snapshot in &feed.history {
            let _ = tx.try_send(snapshot.clone());
        }
        feed.subscribers.push(tx);
        feed.subscriptions += 1;
        debug!(%source, %burn_tx_hash, replayed = feed.history.len(), "oracle subscription opened");
        Ok(rx)
    }
}

/// Polls the oracle attestation API and forwards each answer as a snapshot.
#[derive(Debug, Clone)]
pub struct HttpOracleFeed {
    base_url: String,
    client: reqwest::Client,
    poll_interval: Duration,
    threshold: usize,
    capacity: usize,
}

#[derive(Debug, Deserialize)]
struct AttestationEntry {
    data: AttestationData,
    signatures: AttestationSignatures,
}

#[derive(Debug, Deserialize)]
struct AttestationData {
    event: Bytes,
}

#[derive(Debug, Deserialize)]
struct AttestationSignatures {
    ethereum: EthereumSignature,
}

#[derive(Debug, Deserialize)]
struct EthereumSignature {
    signature: Bytes,
    signer: Address,
}

impl HttpOracleFeed {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        poll_interval: Duration,
        threshold: usize,
        capacity: usize,
    ) -> Result<Self, PortError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PortError::Transport(format!("oracle client init failed: {e}")))?;
        Ok(Self {
            base_url: base_url.into(),
            client,
            poll_interval,
            threshold,
            capacity: capacity.max(1),
        })
    }

    pub async fn fetch(&self, burn_tx_hash: B256) -> Result<OracleSnapshot, PortError> {
        let index = burn_tx_hash.to_string();
        let response = self
            .client
            .get(&self.base_url)
            .query(&[("type", "teleport_evm"), ("index", index.as_str())])
            .send()
            .await
            .map_err(|e| PortError::Transport(format!("oracle request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(PortError::Transport(format!("oracle status {status}")));
        }
        let entries: Vec<AttestationEntry> = response
            .json()
            .await
            .map_err(|e| PortError::Transport(format!("oracle json decode failed: {e}")))?;
        snapshot_from_entries(entries, self.threshold)
    }
}

/// Keeps only entries attesting the same event as the first one.
fn snapshot_from_entries(
    entries: Vec<AttestationEntry>,
    threshold: usize,
) -> Result<OracleSnapshot, PortError> {
    let Some(first) = entries.first() else {
        return Ok(OracleSnapshot {
            signatures: Vec::new(),
            threshold,
            guid: None,
        });
    };
    let event = first.data.event.clone();
    let guid = TeleportGuid::from_event_data(&event)
        .map_err(|e| PortError::Validation(format!("oracle event is not a guid: {e}")))?;
    let signatures = entries
        .into_iter()
        .filter(|entry| entry.data.event == event)
        .map(|entry| OracleSignature {
            signer: entry.signatures.ethereum.signer,
            signature: entry.signatures.ethereum.signature,
        })
        .collect();
    Ok(OracleSnapshot {
        signatures,
        threshold,
        guid: Some(guid),
    })
}

#[async_trait]
impl OraclePort for HttpOracleFeed {
    async fn subscribe(
        &self,
        source: DomainId,
        burn_tx_hash: B256,
    ) -> Result<mpsc::Receiver<OracleSnapshot>, PortError> {
        let (tx, rx) = mpsc::channel(self.capacity);
        let feed = self.clone();
        debug!(%source, %burn_tx_hash, url = %self.base_url, "polling oracle api");
        tokio::spawn(async move {
            loop {
                match feed.fetch(burn_tx_hash).await {
                    Ok(snapshot) => {
                        if tx.send(snapshot).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(%burn_tx_hash, error = %e, "oracle poll failed"),
                }
                tokio::select! {
                    _ = tx.closed() => break,
                    _ = tokio::time::sleep(feed.poll_interval) => {}
                }
            }
            debug!(%burn_tx_hash, "oracle polling stopped");
        });
        Ok(rx)
    }
}
