use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use alloy::primitives::B256;

use teleport_core::{PortError, ResumeToken, TransferStorePort};

/// Resume records keyed by `(source chain id, burn tx hash)`.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTransferStore {
    records: Arc<Mutex<HashMap<(u64, B256), ResumeToken>>>,
}

impl InMemoryTransferStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|g| g.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TransferStorePort for InMemoryTransferStore {
    fn save(&self, token: &ResumeToken) -> Result<(), PortError> {
        let mut g = self
            .records
            .lock()
            .map_err(|e| PortError::Transport(format!("store lock poisoned: {e}")))?;
        g.insert((token.source_chain_id, token.burn_tx_hash), token.clone());
        Ok(())
    }

    fn load(
        &self,
        source_chain_id: u64,
        burn_tx_hash: B256,
    ) -> Result<Option<ResumeToken>, PortError> {
        let g = self
            .records
            .lock()
            .map_err(|e| PortError::Transport(format!("store lock poisoned: {e}")))?;
        Ok(g.get(&(source_chain_id, burn_tx_hash)).cloned())
    }

    fn remove(&self, source_chain_id: u64, burn_tx_hash: B256) -> Result<(), PortError> {
        let mut g = self
            .records
            .lock()
            .map_err(|e| PortError::Transport(format!("store lock poisoned: {e}")))?;
        g.remove(&(source_chain_id, burn_tx_hash));
        Ok(())
    }
}
