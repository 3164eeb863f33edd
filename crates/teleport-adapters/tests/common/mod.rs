#![allow(dead_code)]

use std::io::Read;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use alloy::primitives::{Address, Bytes, U256};
use serde_json::Value;
use tiny_http::{Response, Server, StatusCode};
use tokio::sync::broadcast::{self, error::TryRecvError};

use teleport_adapters::{
    DeterministicWallet, InMemoryAmounts, InMemoryDomainQuery, InMemoryOracle, InMemoryRelay,
    InMemoryTransferStore, RelayBehavior, StaticChainIdentity,
};
use teleport_core::{
    DomainId, OracleSignature, OracleSnapshot, Orchestrator, OrchestratorConfig, TeleportGuid,
    TeleportPorts, TransferEvent, TransferPhase, TransferRequest,
};

/// Optimism Goerli → Goerli.
pub const SOURCE_CHAIN: u64 = 420;
pub const DESTINATION_CHAIN: u64 = 5;

pub type TestOrchestrator = Orchestrator<
    DeterministicWallet,
    InMemoryDomainQuery,
    InMemoryOracle,
    InMemoryRelay,
    InMemoryAmounts,
    StaticChainIdentity,
    InMemoryTransferStore,
>;

pub struct Harness {
    pub account: Address,
    pub wallet: DeterministicWallet,
    pub source: InMemoryDomainQuery,
    pub destination: InMemoryDomainQuery,
    pub oracle: InMemoryOracle,
    pub relay: InMemoryRelay,
    pub amounts: InMemoryAmounts,
    pub store: InMemoryTransferStore,
    pub identity: StaticChainIdentity,
}

impl Harness {
    /// Funded, approved wallet on the source chain; both domains confirm any
    /// hash they are asked about.
    pub fn new() -> Self {
        let account = Address::repeat_byte(0x11);
        let amounts = InMemoryAmounts::new();
        let wallet = DeterministicWallet::connected(account, SOURCE_CHAIN).with_ledger(amounts.clone());
        wallet
            .set_balance(SOURCE_CHAIN, U256::from(1_000u64))
            .expect("balance");
        wallet
            .set_allowance(SOURCE_CHAIN, U256::MAX)
            .expect("allowance");
        Self {
            account,
            wallet,
            source: InMemoryDomainQuery::confirming(),
            destination: InMemoryDomainQuery::confirming(),
            oracle: InMemoryOracle::default(),
            relay: InMemoryRelay::new(RelayBehavior::Manual).with_ledger(amounts.clone()),
            amounts,
            store: InMemoryTransferStore::new(),
            identity: StaticChainIdentity::known().expect("known domains"),
        }
    }

    pub fn orchestrator(&self) -> TestOrchestrator {
        self.orchestrator_with(fast_config())
    }

    pub fn orchestrator_with(&self, config: OrchestratorConfig) -> TestOrchestrator {
        Orchestrator::new(
            TeleportPorts {
                wallet: self.wallet.clone(),
                source: self.source.clone(),
                destination: self.destination.clone(),
                oracle: self.oracle.clone(),
                relay: self.relay.clone(),
                amounts: self.amounts.clone(),
                identity: self.identity.clone(),
                store: self.store.clone(),
            },
            SOURCE_CHAIN,
            config,
        )
        .expect("route for source chain")
    }

    pub fn request(&self) -> TransferRequest {
        TransferRequest {
            amount: U256::from(100u64),
            receiver: self.account,
            operator: self.account,
        }
    }
}

pub fn fast_config() -> OrchestratorConfig {
    OrchestratorConfig {
        receipt_backoff_unit: Duration::from_millis(10),
        retry_delay: Duration::from_millis(10),
        ..OrchestratorConfig::default()
    }
}

pub fn guid_for(request: &TransferRequest) -> TeleportGuid {
    TeleportGuid::new(
        DomainId::from_name("OPT-GOER-A").expect("source domain"),
        DomainId::from_name("ETH-GOER-A").expect("target domain"),
        request.receiver.into_word(),
        request.operator.into_word(),
        request.amount,
        U256::from(1u64),
        U256::from(1_670_000_000u64),
    )
    .expect("guid")
}

pub fn oracle_sig(signer: u8) -> OracleSignature {
    OracleSignature {
        signer: Address::repeat_byte(signer),
        signature: Bytes::from(vec![signer; 65]),
    }
}

pub fn snapshot(guid: Option<TeleportGuid>, signers: &[u8], threshold: usize) -> OracleSnapshot {
    OracleSnapshot {
        signatures: signers.iter().copied().map(oracle_sig).collect(),
        threshold,
        guid,
    }
}

pub fn drain(rx: &mut broadcast::Receiver<TransferEvent>) -> Vec<TransferEvent> {
    let mut out = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => out.push(event),
            Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return out,
        }
    }
}

/// Applies observations until `phase` is reached.
pub async fn drive_until(orch: &mut TestOrchestrator, phase: TransferPhase) {
    loop {
        let current = orch.step().await.expect("step");
        if current == phase {
            return;
        }
        assert!(
            !current.is_terminal(),
            "reached {current:?} while waiting for {phase:?}"
        );
        assert!(orch.next_observation().await.expect("observation"));
    }
}

/// Burns with a quorum already published and stops at `ReadyToMint`.
pub async fn ready_to_mint(h: &Harness, orch: &mut TestOrchestrator) -> TeleportGuid {
    let request = h.request();
    let guid = guid_for(&request);
    let burn_tx_hash = h.wallet.next_tx_hash().expect("next hash");
    h.oracle
        .publish(burn_tx_hash, snapshot(Some(guid), &[1, 2], 2))
        .expect("publish quorum");

    orch.handle(teleport_core::TransferCommand::Initiate(request))
        .await
        .expect("initiate");
    let phase = orch.run().await.expect("run");
    assert_eq!(phase, TransferPhase::ReadyToMint);
    guid
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: String,
    pub url: String,
    pub body: String,
}

/// Serves `responses` in order, repeating the last one once they run out.
pub fn spawn_mock_server(responses: Vec<(u16, Value)>) -> (String, Arc<Mutex<Vec<RecordedCall>>>) {
    let server = Server::http("127.0.0.1:0").expect("start server");
    let addr = format!("http://{}", server.server_addr());
    let calls = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&calls);

    thread::spawn(move || {
        for i in 0..64 {
            let mut req = match server.recv() {
                Ok(r) => r,
                Err(_) => break,
            };
            let mut body = String::new();
            let _ = req.as_reader().read_to_string(&mut body);
            if let Ok(mut g) = recorded.lock() {
                g.push(RecordedCall {
                    method: req.method().to_string(),
                    url: req.url().to_owned(),
                    body,
                });
            }

            let (code, payload) = responses
                .get(i)
                .or_else(|| responses.last())
                .cloned()
                .unwrap_or((404, serde_json::json!({"error": "not found"})));
            let response =
                Response::from_string(payload.to_string()).with_status_code(StatusCode(code));
            let _ = req.respond(response);
        }
    });

    (addr, calls)
}
