use alloy::primitives::{B256, U256};
use serde::{Deserialize, Serialize};

use crate::domain::{AttestationSet, OracleSignature, SignedRelayPayload, TeleportGuid};
use crate::error::TeleportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransferPhase {
    NeedsWallet,
    NeedsNetworkSwitch,
    NeedsInitialAllocation,
    NeedsApproval,
    BurnPending,
    BurnConfirming,
    AwaitingAttestations,
    ReadyToMint,
    RelaySigning,
    RelayPending,
    RelayMintConfirming,
    DirectMintPending,
    DirectMintConfirming,
    Complete,
    Failed,
}

impl TransferPhase {
    /// Phases re-derived from preconditions on every step, before any burn exists.
    pub fn is_pre_burn(self) -> bool {
        matches!(
            self,
            TransferPhase::NeedsWallet
                | TransferPhase::NeedsNetworkSwitch
                | TransferPhase::NeedsInitialAllocation
                | TransferPhase::NeedsApproval
                | TransferPhase::BurnPending
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TransferPhase::Complete | TransferPhase::Failed)
    }

    pub fn is_relay_path(self) -> bool {
        matches!(
            self,
            TransferPhase::RelaySigning
                | TransferPhase::RelayPending
                | TransferPhase::RelayMintConfirming
        )
    }

    pub fn is_direct_path(self) -> bool {
        matches!(
            self,
            TransferPhase::DirectMintPending | TransferPhase::DirectMintConfirming
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferAction {
    Precondition(TransferPhase),
    BurnSubmitted,
    BurnConfirmed,
    QuorumReached,
    NothingPending,
    ChooseRelay,
    ChooseDirect,
    ResetMintPath,
    ResumeRelay,
    ResumeDirectMint,
    RelayTaskCreated,
    RelayMinted,
    RelayFailed,
    MintSubmitted,
    MintSettled,
    MintPartial,
    Reverted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateTransition {
    pub from: TransferPhase,
    pub to: TransferPhase,
    pub reason: &'static str,
}

pub fn transfer_transition(
    from: TransferPhase,
    action: TransferAction,
) -> Result<(TransferPhase, StateTransition), TeleportError> {
    use TransferAction as A;
    use TransferPhase as P;

    let (to, reason) = match (from, action) {
        (f, A::Precondition(t)) if f.is_pre_burn() && t.is_pre_burn() && f != t => {
            (t, "precondition")
        }
        (P::BurnPending, A::BurnSubmitted) => (P::BurnConfirming, "burn_submitted"),
        (P::BurnConfirming, A::BurnConfirmed) => (P::AwaitingAttestations, "burn_confirmed"),
        (P::NeedsInitialAllocation, A::Reverted) => (P::Failed, "allocation_reverted"),
        (P::NeedsApproval, A::Reverted) => (P::Failed, "approval_reverted"),
        (P::BurnConfirming, A::Reverted) => (P::Failed, "burn_reverted"),
        (P::AwaitingAttestations, A::QuorumReached) => (P::ReadyToMint, "quorum_reached"),
        (P::ReadyToMint, A::NothingPending) => (P::Complete, "already_completed"),
        (P::ReadyToMint, A::ChooseRelay) => (P::RelaySigning, "relay_chosen"),
        (P::ReadyToMint, A::ChooseDirect) => (P::DirectMintPending, "direct_mint_chosen"),
        (P::ReadyToMint, A::ResumeRelay) => (P::RelayPending, "relay_resumed"),
        (P::ReadyToMint, A::ResumeDirectMint) => (P::DirectMintConfirming, "direct_mint_resumed"),
        (P::DirectMintPending, A::ResetMintPath) => (P::ReadyToMint, "mint_path_reset"),
        (P::RelaySigning, A::RelayTaskCreated) => (P::RelayPending, "relay_task_created"),
        (P::RelaySigning | P::RelayPending, A::RelayFailed) => (P::ReadyToMint, "relay_failed"),
        (P::RelayPending, A::RelayMinted) => (P::RelayMintConfirming, "relay_minted"),
        (P::DirectMintPending, A::MintSubmitted) => (P::DirectMintConfirming, "mint_submitted"),
        (P::RelayMintConfirming | P::DirectMintConfirming, A::MintSettled) => {
            (P::Complete, "mint_settled")
        }
        (P::RelayMintConfirming | P::DirectMintConfirming, A::MintPartial) => {
            (P::ReadyToMint, "mint_partial")
        }
        (P::RelayMintConfirming | P::DirectMintConfirming, A::Reverted) => {
            (P::Failed, "mint_reverted")
        }
        _ => return Err(TeleportError::IllegalTransition { from, action }),
    };

    Ok((to, StateTransition { from, to, reason }))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferState {
    pub phase: TransferPhase,
    pub burn_tx_hash: Option<B256>,
    pub guid: Option<TeleportGuid>,
    pub collected_signatures: Vec<OracleSignature>,
    pub required_threshold: Option<usize>,
    pub pending_mint_amount: Option<U256>,
    pub signed_payload: Option<SignedRelayPayload>,
    pub relay_task_id: Option<String>,
    pub mint_tx_hash: Option<B256>,
}

impl Default for TransferState {
    fn default() -> Self {
        Self {
            phase: TransferPhase::NeedsWallet,
            burn_tx_hash: None,
            guid: None,
            collected_signatures: Vec::new(),
            required_threshold: None,
            pending_mint_amount: None,
            signed_payload: None,
            relay_task_id: None,
            mint_tx_hash: None,
        }
    }
}

impl TransferState {
    pub fn burn_confirmed(&self) -> bool {
        matches!(
            self.phase,
            TransferPhase::AwaitingAttestations | TransferPhase::ReadyToMint | TransferPhase::Complete
        ) || self.phase.is_relay_path()
            || self.phase.is_direct_path()
    }

    pub fn mint_confirmed(&self) -> bool {
        self.phase == TransferPhase::Complete && self.mint_tx_hash.is_some()
    }

    pub fn payload_signed(&self) -> bool {
        self.signed_payload.is_some()
    }

    pub fn has_quorum(&self) -> bool {
        matches!(self.required_threshold, Some(t) if t > 0 && self.collected_signatures.len() >= t)
    }

    pub fn attestations(&self) -> AttestationSet {
        let mut set = AttestationSet::new(self.required_threshold.unwrap_or_default());
        for sig in &self.collected_signatures {
            set.insert(sig.clone());
        }
        set
    }

    /// Drops every relay-specific transient field after a failed relay attempt.
    pub fn clear_relay(&mut self) {
        self.signed_payload = None;
        self.relay_task_id = None;
    }
}
