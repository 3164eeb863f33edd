use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use alloy::primitives::{keccak256, Address, B256, U256};
use async_trait::async_trait;
use futures::future::{self, FutureExt};
use tracing::info;

use teleport_core::{
    BurnRequest, DirectMintRequest, DomainInfo, PendingTx, PortError, Receipt, RelayPayload,
    SignedRelayPayload, WalletPort, WalletSession,
};

use crate::InMemoryAmounts;

/// What the finality handle of a submitted transaction resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Finality {
    #[default]
    Confirmed,
    Reverted,
    /// No handle; the receipt must be polled from the domain.
    HashOnly,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletCall {
    SwitchNetwork(u64),
    ClaimInitialAllocation { chain_id: u64 },
    Approve { chain_id: u64, amount: U256 },
    Burn(BurnRequest),
    SignRelayPayload { payload_hash: B256 },
    MintWithOracles { guid_hash: B256 },
}

/// Wallet that signs and submits deterministically. Transaction hashes derive
/// from the account and a running nonce.
#[derive(Debug, Clone, Default)]
pub struct DeterministicWallet {
    state: Arc<Mutex<WalletState>>,
    ledger: Option<InMemoryAmounts>,
}

#[derive(Debug, Default)]
struct WalletState {
    session: Option<WalletSession>,
    balances: HashMap<u64, U256>,
    allowances: HashMap<u64, U256>,
    allocation: U256,
    nonce: u64,
    finality: Finality,
    reject_next: Option<String>,
    calls: Vec<WalletCall>,
}

impl DeterministicWallet {
    pub fn connected(account: Address, chain_id: u64) -> Self {
        let wallet = Self::default();
        if let Ok(mut g) = wallet.state.lock() {
            g.session = Some(WalletSession { account, chain_id });
            g.allocation = U256::from(10_000u64) * U256::from(10u64).pow(U256::from(18u64));
        }
        wallet
    }

    /// Direct mints are booked into `ledger`.
    pub fn with_ledger(mut self, ledger: InMemoryAmounts) -> Self {
        self.ledger = Some(ledger);
        self
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, WalletState>, PortError> {
        self.state
            .lock()
            .map_err(|e| PortError::Transport(format!("wallet lock poisoned: {e}")))
    }

    pub fn set_session(&self, session: Option<WalletSession>) -> Result<(), PortError> {
        self.lock()?.session = session;
        Ok(())
    }

    pub fn set_balance(&self, chain_id: u64, balance: U256) -> Result<(), PortError> {
        self.lock()?.balances.insert(chain_id, balance);
        Ok(())
    }

    pub fn set_allowance(&self, chain_id: u64, allowance: U256) -> Result<(), PortError> {
        self.lock()?.allowances.insert(chain_id, allowance);
        Ok(())
    }

    pub fn set_finality(&self, finality: Finality) -> Result<(), PortError> {
        self.lock()?.finality = finality;
        Ok(())
    }

    /// The next transaction or signature request is refused with `reason`.
    pub fn reject_next(&self, reason: impl Into<String>) -> Result<(), PortError> {
        self.lock()?.reject_next = Some(reason.into());
        Ok(())
    }

    pub fn calls(&self) -> Vec<WalletCall> {
        self.lock().map(|g| g.calls.clone()).unwrap_or_default()
    }

    /// Hash the next submitted transaction will carry.
    pub fn next_tx_hash(&self) -> Result<B256, PortError> {
        let g = self.lock()?;
        let account = g.session.map(|s| s.account).unwrap_or_default();
        Ok(tx_hash(account, g.nonce + 1))
    }

    fn submit(
        &self,
        call: WalletCall,
        required_chain: Option<u64>,
        apply: impl FnOnce(&mut WalletState),
    ) -> Result<PendingTx, PortError> {
        let mut g = self.lock()?;
        let session = g
            .session
            .ok_or_else(|| PortError::Policy("wallet not connected".to_owned()))?;
        if let Some(chain_id) = required_chain {
            if session.chain_id != chain_id {
                return Err(PortError::Policy(format!(
                    "wallet is on chain {}, transaction needs chain {chain_id}",
                    session.chain_id
                )));
            }
        }
        if let Some(reason) = g.reject_next.take() {
            return Err(PortError::Policy(reason));
        }
        g.nonce += 1;
        let hash = tx_hash(session.account, g.nonce);
        g.calls.push(call);
        apply(&mut *g);

        Ok(match g.finality {
            Finality::Confirmed => {
                PendingTx::new(hash, future::ready(Ok(Receipt::success(hash))).boxed())
            }
            Finality::Reverted => {
                PendingTx::new(hash, future::ready(Ok(Receipt::failure(hash))).boxed())
            }
            Finality::HashOnly => PendingTx::hash_only(hash),
        })
    }
}

fn tx_hash(account: Address, nonce: u64) -> B256 {
    let mut seed = Vec::with_capacity(28);
    seed.extend_from_slice(account.as_slice());
    seed.extend_from_slice(&nonce.to_be_bytes());
    keccak256(seed)
}

#[async_trait]
impl WalletPort for DeterministicWallet {
    async fn session(&self) -> Result<Option<WalletSession>, PortError> {
        Ok(self.lock()?.session)
    }

    async fn switch_network(&self, chain_id: u64) -> Result<(), PortError> {
        let mut g = self.lock()?;
        let session = g
            .session
            .as_mut()
            .ok_or_else(|| PortError::Policy("wallet not connected".to_owned()))?;
        session.chain_id = chain_id;
        g.calls.push(WalletCall::SwitchNetwork(chain_id));
        Ok(())
    }

    async fn balance(&self, domain: &DomainInfo) -> Result<U256, PortError> {
        Ok(self
            .lock()?
            .balances
            .get(&domain.chain_id)
            .copied()
            .unwrap_or_default())
    }

    async fn allowance(&self, domain: &DomainInfo) -> Result<U256, PortError> {
        Ok(self
            .lock()?
            .allowances
            .get(&domain.chain_id)
            .copied()
            .unwrap_or_default())
    }

    async fn claim_initial_allocation(&self, domain: &DomainInfo) -> Result<PendingTx, PortError> {
        let chain_id = domain.chain_id;
        self.submit(
            WalletCall::ClaimInitialAllocation { chain_id },
            Some(chain_id),
            |s| {
                let allocation = s.allocation;
                let balance = s.balances.entry(chain_id).or_default();
                *balance = balance.saturating_add(allocation);
            },
        )
    }

    async fn approve(&self, domain: &DomainInfo, amount: U256) -> Result<PendingTx, PortError> {
        let chain_id = domain.chain_id;
        self.submit(
            WalletCall::Approve { chain_id, amount },
            Some(chain_id),
            |s| {
                s.allowances.insert(chain_id, amount);
            },
        )
    }

    async fn burn(&self, request: &BurnRequest) -> Result<PendingTx, PortError> {
        let chain_id = request.source.chain_id;
        let amount = request.amount;
        let pending = self.submit(WalletCall::Burn(*request), Some(chain_id), |s| {
            let balance = s.balances.entry(chain_id).or_default();
            *balance = balance.saturating_sub(amount);
        })?;
        info!(tx_hash = %pending.hash, %amount, target = %request.target.domain, "burn sent");
        Ok(pending)
    }

    async fn sign_relay_payload(
        &self,
        payload: &RelayPayload,
    ) -> Result<SignedRelayPayload, PortError> {
        let mut g = self.lock()?;
        let session = g
            .session
            .ok_or_else(|| PortError::Policy("wallet not connected".to_owned()))?;
        if let Some(reason) = g.reject_next.take() {
            return Err(PortError::Policy(reason));
        }
        let payload_hash = payload.payload_hash();
        g.calls.push(WalletCall::SignRelayPayload { payload_hash });

        let mut seed = Vec::with_capacity(52);
        seed.extend_from_slice(session.account.as_slice());
        seed.extend_from_slice(payload_hash.as_slice());
        let r = keccak256(&seed);
        let s = keccak256(r);
        Ok(SignedRelayPayload {
            payload: payload.clone(),
            payload_hash,
            r,
            s,
            v: 27,
        })
    }

    async fn mint_with_oracles(&self, request: &DirectMintRequest) -> Result<PendingTx, PortError> {
        let pending = self.submit(
            WalletCall::MintWithOracles {
                guid_hash: request.guid.hash(),
            },
            Some(request.destination.chain_id),
            |_| {},
        )?;
        if let Some(ledger) = &self.ledger {
            ledger.settle(&request.guid)?;
        }
        Ok(pending)
    }
}
