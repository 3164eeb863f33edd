//! Fee-compensated mint submission through a third-party relay.

use alloy::primitives::{Bytes, B256, U256};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cancel::cancellable;
use crate::domain::{RelayPayload, RelayTaskOutcome, SignedRelayPayload, TeleportGuid};
use crate::error::TeleportError;
use crate::ports::{RelayPort, WalletPort};

/// Upper bounds on what the relay may charge for executing the mint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeBudget {
    /// 1e18 = 100%.
    pub max_fee_percentage: U256,
    pub gas_fee: U256,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayRequest {
    pub guid: TeleportGuid,
    pub signatures: Bytes,
    pub fee_budget: FeeBudget,
    /// Unix seconds after which the relay must not execute the payload.
    pub expiry: u64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RelaySubmitter;

impl RelaySubmitter {
    /// Has the receiver sign the payload, reports it through `on_signed`, then
    /// hands it to the relay. Returns the relay task id.
    pub async fn submit_relay<W, R, F>(
        &self,
        wallet: &W,
        relay: &R,
        request: RelayRequest,
        cancel: &CancellationToken,
        on_signed: F,
    ) -> Result<String, TeleportError>
    where
        W: WalletPort + ?Sized,
        R: RelayPort + ?Sized,
        F: FnOnce(&SignedRelayPayload),
    {
        let payload = RelayPayload {
            guid: request.guid,
            signatures: request.signatures,
            max_fee_percentage: request.fee_budget.max_fee_percentage,
            gas_fee: request.fee_budget.gas_fee,
            expiry: U256::from(request.expiry),
        };
        let signed = cancellable(cancel, wallet.sign_relay_payload(&payload)).await??;
        info!(
            payload_hash = %signed.payload_hash,
            r = %signed.r,
            s = %signed.s,
            v = signed.v,
            "relay payload signed"
        );
        on_signed(&signed);

        let task_id = cancellable(cancel, relay.submit(&signed)).await??;
        info!(%task_id, guid = %request.guid.hash(), "relay task created");
        Ok(task_id)
    }

    /// Waits for the relay's terminal report on `task_id`.
    pub async fn await_relay_outcome<R>(
        &self,
        relay: &R,
        task_id: &str,
        cancel: &CancellationToken,
    ) -> Result<B256, TeleportError>
    where
        R: RelayPort + ?Sized,
    {
        match cancellable(cancel, relay.wait_for_task(task_id)).await?? {
            RelayTaskOutcome::Minted { tx_hash } => {
                info!(%task_id, %tx_hash, "relay submitted mint");
                Ok(tx_hash)
            }
            RelayTaskOutcome::Failed { reason } => {
                warn!(%task_id, %reason, "relay task failed");
                Err(TeleportError::RelayFailed {
                    task_id: task_id.to_owned(),
                    reason,
                })
            }
        }
    }
}
