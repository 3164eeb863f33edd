use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use alloy::primitives::B256;
use async_trait::async_trait;

use teleport_core::{DomainQueryPort, PortError, Receipt};

/// Receipt source with scripted answers per hash.
///
/// A scripted hash pops one answer per query; the last answer repeats. Hashes
/// without a script return `None`, or a success receipt when the domain was
/// built with [`InMemoryDomainQuery::confirming`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryDomainQuery {
    state: Arc<Mutex<DomainState>>,
}

#[derive(Debug, Default)]
struct DomainState {
    confirm_unknown: bool,
    offline: bool,
    scripts: HashMap<B256, VecDeque<Option<Receipt>>>,
    queries: HashMap<B256, usize>,
}

impl InMemoryDomainQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn confirming() -> Self {
        let domain = Self::default();
        if let Ok(mut g) = domain.state.lock() {
            g.confirm_unknown = true;
        }
        domain
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, DomainState>, PortError> {
        self.state
            .lock()
            .map_err(|e| PortError::Transport(format!("domain lock poisoned: {e}")))
    }

    pub fn script(
        &self,
        tx_hash: B256,
        answers: impl IntoIterator<Item = Option<Receipt>>,
    ) -> Result<(), PortError> {
        self.lock()?
            .scripts
            .insert(tx_hash, answers.into_iter().collect());
        Ok(())
    }

    /// `count` empty answers followed by `receipt`.
    pub fn script_after(&self, tx_hash: B256, count: usize, receipt: Receipt) -> Result<(), PortError> {
        let answers = std::iter::repeat(None).take(count).chain([Some(receipt)]);
        self.script(tx_hash, answers)
    }

    pub fn set_offline(&self, offline: bool) -> Result<(), PortError> {
        self.lock()?.offline = offline;
        Ok(())
    }

    pub fn query_count(&self, tx_hash: B256) -> usize {
        self.lock()
            .map(|g| g.queries.get(&tx_hash).copied().unwrap_or(0))
            .unwrap_or(0)
    }
}

#[async_trait]
impl DomainQueryPort for InMemoryDomainQuery {
    async fn get_receipt(&self, tx_hash: B256) -> Result<Option<Receipt>, PortError> {
        let mut g = self.lock()?;
        *g.queries.entry(tx_hash).or_default() += 1;
        if g.offline {
            return Err(PortError::Transport("domain offline".to_owned()));
        }
        let confirm_unknown = g.confirm_unknown;
        match g.scripts.get_mut(&tx_hash) {
            Some(answers) if answers.len() > 1 => Ok(answers.pop_front().flatten()),
            Some(answers) => Ok(answers.front().copied().flatten()),
            None if confirm_unknown => Ok(Some(Receipt::success(tx_hash))),
            None => Ok(None),
        }
    }
}
