use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use alloy::primitives::{B256, U256};
use async_trait::async_trait;

use teleport_core::{AmountsPort, PortError, TeleportGuid};

/// Destination-side mint ledger. Pending amount defaults to the guid amount
/// minus what was recorded as minted.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAmounts {
    state: Arc<Mutex<AmountsState>>,
}

#[derive(Debug, Default)]
struct AmountsState {
    minted: HashMap<B256, U256>,
    overrides: HashMap<B256, U256>,
    relay_fee: U256,
    pending_queries: usize,
    offline: bool,
}

impl InMemoryAmounts {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, AmountsState>, PortError> {
        self.state
            .lock()
            .map_err(|e| PortError::Transport(format!("amounts lock poisoned: {e}")))
    }

    pub fn set_pending(&self, guid: &TeleportGuid, amount: U256) -> Result<(), PortError> {
        self.lock()?.overrides.insert(guid.hash(), amount);
        Ok(())
    }

    pub fn set_relay_fee(&self, fee: U256) -> Result<(), PortError> {
        self.lock()?.relay_fee = fee;
        Ok(())
    }

    pub fn set_offline(&self, offline: bool) -> Result<(), PortError> {
        self.lock()?.offline = offline;
        Ok(())
    }

    pub fn record_mint(&self, guid: &TeleportGuid, amount: U256) -> Result<(), PortError> {
        let mut g = self.lock()?;
        let key = guid.hash();
        g.overrides.remove(&key);
        let minted = g.minted.entry(key).or_default();
        *minted = minted.saturating_add(amount);
        Ok(())
    }

    /// Mints whatever is still pending for `guid`.
    pub fn settle(&self, guid: &TeleportGuid) -> Result<U256, PortError> {
        let pending = self.pending(guid)?;
        self.record_mint(guid, pending)?;
        Ok(pending)
    }

    pub fn minted(&self, guid: &TeleportGuid) -> U256 {
        self.lock()
            .map(|g| g.minted.get(&guid.hash()).copied().unwrap_or_default())
            .unwrap_or_default()
    }

    pub fn pending_queries(&self) -> usize {
        self.lock().map(|g| g.pending_queries).unwrap_or(0)
    }

    fn pending(&self, guid: &TeleportGuid) -> Result<U256, PortError> {
        let g = self.lock()?;
        let key = guid.hash();
        if let Some(amount) = g.overrides.get(&key) {
            return Ok(*amount);
        }
        let minted = g.minted.get(&key).copied().unwrap_or_default();
        Ok(guid.amount().saturating_sub(minted))
    }
}

#[async_trait]
impl AmountsPort for InMemoryAmounts {
    async fn pending_mintable_amount(&self, guid: &TeleportGuid) -> Result<U256, PortError> {
        {
            let mut g = self.lock()?;
            if g.offline {
                return Err(PortError::Transport("amounts provider offline".to_owned()));
            }
            g.pending_queries += 1;
        }
        self.pending(guid)
    }

    async fn relay_fee(&self, _guid: &TeleportGuid) -> Result<U256, PortError> {
        let g = self.lock()?;
        if g.offline {
            return Err(PortError::Transport("amounts provider offline".to_owned()));
        }
        Ok(g.relay_fee)
    }
}
