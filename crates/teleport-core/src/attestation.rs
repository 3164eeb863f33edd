//! Collects oracle signatures for a burn until the quorum threshold is met.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use alloy::primitives::B256;
use futures::future::{BoxFuture, FutureExt, Shared};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cancel::cancellable;
use crate::domain::{AttestationProgress, AttestationSet, DomainId, TeleportGuid};
use crate::error::TeleportError;
use crate::ports::{OraclePort, PortError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectedAttestations {
    pub guid: TeleportGuid,
    pub attestations: AttestationSet,
}

type CollectionResult = Result<CollectedAttestations, TeleportError>;
type SharedCollection = Shared<BoxFuture<'static, CollectionResult>>;

/// Joins concurrent collections for the same burn onto one oracle subscription.
#[derive(Clone, Default)]
pub struct AttestationCollector {
    in_flight: Arc<Mutex<HashMap<B256, SharedCollection>>>,
}

impl AttestationCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_collecting(&self, burn_tx_hash: B256) -> bool {
        self.in_flight
            .lock()
            .map(|g| g.contains_key(&burn_tx_hash))
            .unwrap_or(false)
    }

    /// Resolves once the oracle set reached quorum and the GUID is known.
    ///
    /// `on_progress` fires whenever the observed `(count, threshold, guid)`
    /// changes. A call made while another collection for the same burn is
    /// outstanding joins it instead of subscribing again, and its own
    /// `on_progress` is never invoked. Each caller stops on its own `cancel`;
    /// the subscription is dropped once no caller is left.
    pub async fn collect_attestations<O, F>(
        &self,
        oracle: Arc<O>,
        source: DomainId,
        burn_tx_hash: B256,
        on_progress: F,
        cancel: CancellationToken,
    ) -> CollectionResult
    where
        O: OraclePort + ?Sized + 'static,
        F: FnMut(AttestationProgress) + Send + 'static,
    {
        let shared = {
            let mut g = self
                .in_flight
                .lock()
                .map_err(|e| PortError::Transport(format!("collector lock poisoned: {e}")))?;
            match g.get(&burn_tx_hash) {
                Some(existing) => {
                    debug!(%burn_tx_hash, "joining outstanding attestation collection");
                    existing.clone()
                }
                None => {
                    let fut = collect(oracle, source, burn_tx_hash, on_progress)
                        .boxed()
                        .shared();
                    g.insert(burn_tx_hash, fut.clone());
                    fut
                }
            }
        };

        let result = cancellable(&cancel, shared.clone()).await;
        if let Ok(mut g) = self.in_flight.lock() {
            // the map entry and `shared` are the only handles once the last caller leaves
            let last_caller = shared.strong_count().is_some_and(|n| n <= 2);
            let ours = g.get(&burn_tx_hash).is_some_and(|f| f.ptr_eq(&shared));
            if ours && (result.is_ok() || last_caller) {
                g.remove(&burn_tx_hash);
            }
        }
        result?
    }
}

async fn collect<O, F>(
    oracle: Arc<O>,
    source: DomainId,
    burn_tx_hash: B256,
    mut on_progress: F,
) -> CollectionResult
where
    O: OraclePort + ?Sized,
    F: FnMut(AttestationProgress),
{
    let mut feed = oracle.subscribe(source, burn_tx_hash).await?;

    let mut set = AttestationSet::default();
    let mut guid: Option<TeleportGuid> = None;
    let mut last: Option<AttestationProgress> = None;

    loop {
        let snapshot = feed.recv().await.ok_or_else(|| {
            PortError::Transport(format!("oracle feed closed for {burn_tx_hash}"))
        })?;

        match (guid, snapshot.guid) {
            (Some(known), Some(pushed)) if known != pushed => {
                warn!(%burn_tx_hash, "ignoring snapshot for a different guid");
                continue;
            }
            (None, Some(pushed)) => guid = Some(pushed),
            _ => {}
        }

        set.set_threshold(snapshot.threshold);
        for sig in snapshot.signatures {
            let signer = sig.signer;
            if !set.insert(sig) {
                debug!(%burn_tx_hash, %signer, "duplicate oracle signature");
            }
        }

        let progress = AttestationProgress {
            count: set.len(),
            threshold: set.threshold(),
            guid,
        };
        if last != Some(progress) {
            info!(
                %burn_tx_hash,
                count = progress.count,
                threshold = progress.threshold,
                "oracle attestations received"
            );
            on_progress(progress);
            last = Some(progress);
        }

        if let (true, Some(guid)) = (set.is_attestable(), guid) {
            return Ok(CollectedAttestations {
                guid,
                attestations: set,
            });
        }
    }
}
