//! Long waits run as spawned tasks and report back as epoch-tagged
//! observations; anything that outlives an abort is discarded.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use alloy::primitives::{B256, U256};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::attestation::{AttestationCollector, CollectedAttestations};
use crate::cancel::cancellable;
use crate::config::OrchestratorConfig;
use crate::domain::{
    AttestationProgress, BurnRequest, DirectMintRequest, DomainInfo, MintPath, ResumeToken,
    SignedRelayPayload, TransferRequest,
};
use crate::error::TeleportError;
use crate::events::{FailureReason, TransferEvent};
use crate::ports::{
    AmountsPort, ChainIdentityPort, DomainQueryPort, OraclePort, PendingTx, PortError, RelayPort,
    TransferStorePort, WalletPort,
};
use crate::relay::{FeeBudget, RelayRequest, RelaySubmitter};
use crate::state_machine::{transfer_transition, TransferAction, TransferPhase, TransferState};
use crate::watcher::{Confirmation, ConfirmationWatcher, TxTarget};

pub struct TeleportPorts<W, Q, O, R, A, I, S> {
    pub wallet: W,
    pub source: Q,
    pub destination: Q,
    pub oracle: O,
    pub relay: R,
    pub amounts: A,
    pub identity: I,
    pub store: S,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferCommand {
    Initiate(TransferRequest),
    SwitchNetwork,
    ClaimInitialAllocation,
    Approve,
    ChooseMintPath(MintPath),
    ResetMintPath,
    Abort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub source: DomainInfo,
    pub destination: DomainInfo,
}

#[derive(Debug)]
enum Observation {
    BurnFinalized(Result<Confirmation, TeleportError>),
    AttestationProgress(AttestationProgress),
    Attested(Result<CollectedAttestations, TeleportError>),
    PayloadSigned(SignedRelayPayload),
    RelaySubmitted(Result<String, TeleportError>),
    RelayOutcome(Result<B256, TeleportError>),
    MintFinalized(Result<Confirmation, TeleportError>),
}

#[derive(Debug)]
struct Tagged {
    epoch: u64,
    observation: Observation,
}

#[derive(Debug, Clone, Copy, Default)]
struct InProgress {
    burn_confirming: bool,
    attestations: bool,
    relay: bool,
    mint_confirming: bool,
}

impl InProgress {
    fn any(&self) -> bool {
        self.burn_confirming || self.attestations || self.relay || self.mint_confirming
    }
}

#[derive(Debug, Clone)]
enum ResumeMint {
    Relay(String),
    Direct(B256),
}

pub struct Orchestrator<W, Q, O, R, A, I, S> {
    wallet: Arc<W>,
    source: Arc<Q>,
    destination: Arc<Q>,
    oracle: Arc<O>,
    relay: Arc<R>,
    amounts: Arc<A>,
    identity: I,
    store: S,
    config: OrchestratorConfig,
    route: Route,
    watcher: ConfirmationWatcher,
    collector: AttestationCollector,
    submitter: RelaySubmitter,
    state: TransferState,
    request: Option<TransferRequest>,
    mint_path: Option<MintPath>,
    resume_mint: Option<ResumeMint>,
    relay_failures: u32,
    allocation_claimed: bool,
    approval_confirmed: bool,
    mint_settling: bool,
    in_progress: InProgress,
    burn_handle: Option<PendingTx>,
    mint_handle: Option<PendingTx>,
    rearm_delay: Duration,
    observations_tx: mpsc::UnboundedSender<Tagged>,
    observations_rx: mpsc::UnboundedReceiver<Tagged>,
    events: broadcast::Sender<TransferEvent>,
    cancel: CancellationToken,
    epoch: u64,
}

impl<W, Q, O, R, A, I, S> Orchestrator<W, Q, O, R, A, I, S>
where
    W: WalletPort + 'static,
    Q: DomainQueryPort + 'static,
    O: OraclePort + 'static,
    R: RelayPort + 'static,
    A: AmountsPort + 'static,
    I: ChainIdentityPort,
    S: TransferStorePort,
{
    pub fn new(
        ports: TeleportPorts<W, Q, O, R, A, I, S>,
        source_chain_id: u64,
        config: OrchestratorConfig,
    ) -> Result<Self, TeleportError> {
        let source = ports.identity.domain_for_chain(source_chain_id).ok_or_else(|| {
            TeleportError::Precondition(format!("no domain known for chain {source_chain_id}"))
        })?;
        let destination = ports.identity.destination_for(source.domain).ok_or_else(|| {
            TeleportError::Precondition(format!("no destination known for {}", source.domain))
        })?;
        let (observations_tx, observations_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(config.event_capacity.max(1));

        Ok(Self {
            wallet: Arc::new(ports.wallet),
            source: Arc::new(ports.source),
            destination: Arc::new(ports.destination),
            oracle: Arc::new(ports.oracle),
            relay: Arc::new(ports.relay),
            amounts: Arc::new(ports.amounts),
            identity: ports.identity,
            store: ports.store,
            watcher: ConfirmationWatcher::new(config.watch_config()),
            collector: AttestationCollector::new(),
            submitter: RelaySubmitter,
            route: Route {
                source,
                destination,
            },
            config,
            state: TransferState::default(),
            request: None,
            mint_path: None,
            resume_mint: None,
            relay_failures: 0,
            allocation_claimed: false,
            approval_confirmed: false,
            mint_settling: false,
            in_progress: InProgress::default(),
            burn_handle: None,
            mint_handle: None,
            rearm_delay: Duration::ZERO,
            observations_tx,
            observations_rx,
            events,
            cancel: CancellationToken::new(),
            epoch: 0,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TransferEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> &TransferState {
        &self.state
    }

    pub fn phase(&self) -> TransferPhase {
        self.state.phase
    }

    pub fn route(&self) -> Route {
        self.route
    }

    pub fn mint_path(&self) -> Option<MintPath> {
        self.mint_path
    }

    pub fn relay_failures(&self) -> u32 {
        self.relay_failures
    }

    pub fn is_waiting(&self) -> bool {
        self.in_progress.any()
    }

    /// Replaced on abort.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn resume_token(&self) -> Option<ResumeToken> {
        let burn_tx_hash = self.state.burn_tx_hash?;
        let mut token = ResumeToken::new(burn_tx_hash, self.route.source.chain_id);
        token.relay_task_id = self.state.relay_task_id.clone();
        if self.mint_path == Some(MintPath::Direct) {
            token.direct_mint_tx_hash = self.state.mint_tx_hash;
        }
        Some(token)
    }

    pub fn request_transfer(&mut self, request: TransferRequest) -> Result<(), TeleportError> {
        if request.amount.is_zero() {
            return Err(TeleportError::Precondition(
                "transfer amount must be positive".into(),
            ));
        }
        if self.state.phase.is_terminal() {
            self.reset();
        } else if !self.state.phase.is_pre_burn() {
            return Err(TeleportError::Precondition(format!(
                "a burn is already in flight ({:?})",
                self.state.phase
            )));
        }
        info!(amount = %request.amount, receiver = %request.receiver, "transfer requested");
        self.request = Some(request);
        Ok(())
    }

    /// Mint identifiers missing from `token` are filled in from the store.
    pub fn resume(&mut self, token: ResumeToken) -> Result<(), TeleportError> {
        if token.source_chain_id != self.route.source.chain_id {
            return Err(TeleportError::Precondition(format!(
                "resume token is for chain {} but this route starts on {}",
                token.source_chain_id, self.route.source.chain_id
            )));
        }

        let mut token = token;
        if let Some(stored) = self.store.load(token.source_chain_id, token.burn_tx_hash)? {
            if token.relay_task_id.is_none() {
                token.relay_task_id = stored.relay_task_id;
            }
            if token.direct_mint_tx_hash.is_none() {
                token.direct_mint_tx_hash = stored.direct_mint_tx_hash;
            }
        }

        self.reset();
        self.state.phase = TransferPhase::BurnConfirming;
        self.state.burn_tx_hash = Some(token.burn_tx_hash);
        self.resume_mint = match (token.direct_mint_tx_hash, token.relay_task_id.clone()) {
            (Some(tx_hash), _) => Some(ResumeMint::Direct(tx_hash)),
            (None, Some(task_id)) => Some(ResumeMint::Relay(task_id)),
            (None, None) => None,
        };
        self.store.save(&token)?;

        info!(
            burn_tx_hash = %token.burn_tx_hash,
            chain_id = token.source_chain_id,
            relay_task = ?token.relay_task_id,
            direct_mint = ?token.direct_mint_tx_hash,
            "transfer resumed"
        );
        self.emit(TransferEvent::Resumed { token });
        Ok(())
    }

    /// Applies queued observations, then advances until the phase stops
    /// changing. Waits are armed here and never awaited.
    pub async fn step(&mut self) -> Result<TransferPhase, TeleportError> {
        while let Ok(tagged) = self.observations_rx.try_recv() {
            self.apply(tagged)?;
        }
        if self.cancel.is_cancelled() {
            return Ok(self.state.phase);
        }

        loop {
            let before = self.state.phase;
            self.evaluate().await?;
            if self.state.phase == before {
                return Ok(before);
            }
        }
    }

    pub async fn next_observation(&mut self) -> Result<bool, TeleportError> {
        let tagged = tokio::select! {
            _ = self.cancel.cancelled() => return Ok(false),
            tagged = self.observations_rx.recv() => tagged,
        };
        match tagged {
            Some(tagged) => {
                self.apply(tagged)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub async fn run(&mut self) -> Result<TransferPhase, TeleportError> {
        loop {
            let phase = self.step().await?;
            if phase.is_terminal() || !self.in_progress.any() || self.cancel.is_cancelled() {
                return Ok(phase);
            }
            if !self.next_observation().await? {
                return Ok(self.state.phase);
            }
        }
    }

    pub async fn handle(&mut self, command: TransferCommand) -> Result<TransferPhase, TeleportError> {
        debug!(?command, phase = ?self.state.phase, "handling command");
        match command {
            TransferCommand::Initiate(request) => self.request_transfer(request)?,
            TransferCommand::SwitchNetwork => {
                let chain_id = if self.state.phase == TransferPhase::DirectMintPending {
                    self.route.destination.chain_id
                } else {
                    self.route.source.chain_id
                };
                cancellable(&self.cancel, self.wallet.switch_network(chain_id)).await??;
                info!(chain_id, "wallet network switched");
            }
            TransferCommand::ClaimInitialAllocation => {
                self.expect_phase(TransferPhase::NeedsInitialAllocation)?;
                let source = self.route.source;
                let pending =
                    cancellable(&self.cancel, self.wallet.claim_initial_allocation(&source))
                        .await??;
                self.confirm_inline(pending, FailureReason::AllocationReverted)
                    .await?;
                self.allocation_claimed = true;
            }
            TransferCommand::Approve => {
                self.expect_phase(TransferPhase::NeedsApproval)?;
                let amount = self
                    .request
                    .map(|r| r.amount)
                    .ok_or_else(|| TeleportError::Precondition("no transfer requested".into()))?;
                let source = self.route.source;
                let pending =
                    cancellable(&self.cancel, self.wallet.approve(&source, amount)).await??;
                self.confirm_inline(pending, FailureReason::ApprovalReverted)
                    .await?;
                self.approval_confirmed = true;
            }
            TransferCommand::ChooseMintPath(path) => {
                self.expect_phase(TransferPhase::ReadyToMint)?;
                if path == MintPath::Relay {
                    self.check_relay_allowed().await?;
                }
                info!(?path, "mint path chosen");
                self.mint_path = Some(path);
            }
            TransferCommand::ResetMintPath => match self.state.phase {
                TransferPhase::ReadyToMint => self.mint_path = None,
                TransferPhase::DirectMintPending => {
                    self.mint_path = None;
                    self.transition(TransferAction::ResetMintPath)?;
                }
                other => {
                    return Err(TeleportError::Precondition(format!(
                        "mint path cannot be reset in {other:?}"
                    )))
                }
            },
            TransferCommand::Abort => {
                self.abort();
                return Ok(self.state.phase);
            }
        }
        self.step().await
    }

    pub fn abort(&mut self) {
        if let Some(token) = self.resume_token() {
            if let Err(e) = self.store.remove(token.source_chain_id, token.burn_tx_hash) {
                warn!(error = %e, "failed to drop resume record");
            }
        }
        info!(phase = ?self.state.phase, "transfer aborted");
        self.reset();
        self.emit(TransferEvent::Aborted);
    }

    fn reset(&mut self) {
        self.cancel.cancel();
        self.cancel = CancellationToken::new();
        self.epoch += 1;
        self.state = TransferState::default();
        self.request = None;
        self.mint_path = None;
        self.resume_mint = None;
        self.relay_failures = 0;
        self.allocation_claimed = false;
        self.approval_confirmed = false;
        self.mint_settling = false;
        self.in_progress = InProgress::default();
        self.burn_handle = None;
        self.mint_handle = None;
        self.rearm_delay = Duration::ZERO;
    }

    async fn evaluate(&mut self) -> Result<(), TeleportError> {
        match self.state.phase {
            TransferPhase::NeedsWallet
            | TransferPhase::NeedsNetworkSwitch
            | TransferPhase::NeedsInitialAllocation
            | TransferPhase::NeedsApproval
            | TransferPhase::BurnPending => self.evaluate_preconditions().await,
            TransferPhase::BurnConfirming => {
                self.arm_burn_watch();
                Ok(())
            }
            TransferPhase::AwaitingAttestations => {
                self.arm_attestations();
                Ok(())
            }
            TransferPhase::ReadyToMint => self.evaluate_ready_to_mint().await,
            TransferPhase::RelaySigning => self.arm_relay_submission().await,
            TransferPhase::RelayPending => {
                self.arm_relay_outcome();
                Ok(())
            }
            TransferPhase::DirectMintPending => self.submit_direct_mint().await,
            TransferPhase::RelayMintConfirming | TransferPhase::DirectMintConfirming => {
                self.evaluate_mint_confirmation().await
            }
            TransferPhase::Complete | TransferPhase::Failed => Ok(()),
        }
    }

    async fn evaluate_preconditions(&mut self) -> Result<(), TeleportError> {
        let source = self.route.source;
        let session = match cancellable(&self.cancel, self.wallet.session()).await? {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "wallet session unavailable");
                return Ok(());
            }
        };

        let target = match session {
            None => TransferPhase::NeedsWallet,
            Some(session) if session.chain_id != source.chain_id => {
                TransferPhase::NeedsNetworkSwitch
            }
            Some(_) => match self.funding_phase(&source).await? {
                Some(phase) => phase,
                None => return Ok(()),
            },
        };

        if target != self.state.phase {
            self.transition(TransferAction::Precondition(target))?;
            if let (TransferPhase::NeedsNetworkSwitch, Some(session)) = (target, session) {
                self.emit(TransferEvent::NetworkMismatch {
                    expected: source.chain_id,
                    actual: session.chain_id,
                });
            }
        }

        if self.state.phase == TransferPhase::BurnPending && self.request.is_some() {
            self.submit_burn().await?;
        }
        Ok(())
    }

    async fn funding_phase(
        &self,
        source: &DomainInfo,
    ) -> Result<Option<TransferPhase>, TeleportError> {
        let amount = self.request.map(|r| r.amount).unwrap_or(U256::ZERO);

        if source.requires_initial_allocation && !self.allocation_claimed {
            match cancellable(&self.cancel, self.wallet.balance(source)).await? {
                Ok(balance) if balance.is_zero() => {
                    return Ok(Some(TransferPhase::NeedsInitialAllocation))
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "balance unavailable");
                    return Ok(None);
                }
            }
        }

        if !self.approval_confirmed {
            match cancellable(&self.cancel, self.wallet.allowance(source)).await? {
                Ok(allowance) if allowance < amount => {
                    return Ok(Some(TransferPhase::NeedsApproval))
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "allowance unavailable");
                    return Ok(None);
                }
            }
        }

        Ok(Some(TransferPhase::BurnPending))
    }

    async fn submit_burn(&mut self) -> Result<(), TeleportError> {
        let Some(request) = self.request else {
            return Ok(());
        };
        let burn = BurnRequest {
            source: self.route.source,
            target: self.route.destination,
            receiver: request.receiver,
            operator: request.operator,
            amount: request.amount,
        };
        let pending = cancellable(&self.cancel, self.wallet.burn(&burn)).await??;
        let tx_hash = pending.hash;
        info!(%tx_hash, source = %self.route.source.domain, amount = %request.amount, "burn submitted");

        self.state.burn_tx_hash = Some(tx_hash);
        self.state.pending_mint_amount = Some(request.amount);
        self.burn_handle = Some(pending);
        self.transition(TransferAction::BurnSubmitted)?;

        let token = ResumeToken::new(tx_hash, self.route.source.chain_id);
        self.store.save(&token)?;
        self.emit(TransferEvent::BurnSubmitted {
            tx_hash,
            resume: token,
        });
        Ok(())
    }

    fn arm_burn_watch(&mut self) {
        if self.in_progress.burn_confirming {
            return;
        }
        let Some(tx_hash) = self.state.burn_tx_hash else {
            return;
        };
        self.in_progress.burn_confirming = true;
        let target = match self.burn_handle.take() {
            Some(pending) => TxTarget::Pending(pending),
            None => TxTarget::Hash(tx_hash),
        };
        let query = Arc::clone(&self.source);
        self.spawn_confirmation(query, target, Observation::BurnFinalized);
    }

    fn arm_attestations(&mut self) {
        if self.in_progress.attestations {
            return;
        }
        let Some(burn_tx_hash) = self.state.burn_tx_hash else {
            return;
        };
        self.in_progress.attestations = true;

        let collector = self.collector.clone();
        let oracle = Arc::clone(&self.oracle);
        let source = self.route.source.domain;
        let progress_tx = self.observations_tx.clone();
        let epoch = self.epoch;
        let on_progress = move |progress: AttestationProgress| {
            let _ = progress_tx.send(Tagged {
                epoch,
                observation: Observation::AttestationProgress(progress),
            });
        };

        let delay = std::mem::take(&mut self.rearm_delay);
        self.spawn(delay, move |cancel| async move {
            Observation::Attested(
                collector
                    .collect_attestations(oracle, source, burn_tx_hash, on_progress, cancel)
                    .await,
            )
        });
    }

    async fn evaluate_ready_to_mint(&mut self) -> Result<(), TeleportError> {
        let Some(guid) = self.state.guid else {
            return Err(TeleportError::Precondition(
                "ready to mint without an observed guid".into(),
            ));
        };

        if self.state.pending_mint_amount.is_none() {
            match cancellable(&self.cancel, self.amounts.pending_mintable_amount(&guid)).await? {
                Ok(pending) => {
                    info!(guid = %guid.hash(), %pending, "pending mintable amount");
                    self.state.pending_mint_amount = Some(pending);
                }
                Err(e) => {
                    warn!(error = %e, "pending mintable amount unavailable");
                    return Ok(());
                }
            }
        }

        if self.state.pending_mint_amount == Some(U256::ZERO) {
            info!(guid = %guid.hash(), "nothing left to mint");
            self.emit(TransferEvent::AlreadyCompleted { guid });
            self.transition(TransferAction::NothingPending)?;
            self.finish();
            return Ok(());
        }

        if let Some(resume) = self.resume_mint.take() {
            match resume {
                ResumeMint::Relay(task_id) => {
                    self.state.relay_task_id = Some(task_id);
                    self.mint_path = Some(MintPath::Relay);
                    self.transition(TransferAction::ResumeRelay)?;
                }
                ResumeMint::Direct(tx_hash) => {
                    self.state.mint_tx_hash = Some(tx_hash);
                    self.mint_path = Some(MintPath::Direct);
                    self.transition(TransferAction::ResumeDirectMint)?;
                }
            }
            return Ok(());
        }

        match self.mint_path {
            Some(MintPath::Relay) => self.transition(TransferAction::ChooseRelay),
            Some(MintPath::Direct) => self.transition(TransferAction::ChooseDirect),
            None => Ok(()),
        }
    }

    async fn check_relay_allowed(&self) -> Result<(), TeleportError> {
        if self.relay_failures >= self.config.max_relay_attempts {
            return Err(TeleportError::Precondition(format!(
                "relay failed {} times; mint directly instead",
                self.relay_failures
            )));
        }
        let guid = self
            .state
            .guid
            .ok_or_else(|| TeleportError::Precondition("guid not yet observed".into()))?;
        let receiver = guid.receiver_address();
        match cancellable(&self.cancel, self.wallet.session()).await?? {
            Some(session) if session.account == receiver => Ok(()),
            Some(session) => Err(TeleportError::Precondition(format!(
                "relay payload must be signed by receiver {receiver}, connected account is {}",
                session.account
            ))),
            None => Err(TeleportError::Precondition("wallet not connected".into())),
        }
    }

    async fn arm_relay_submission(&mut self) -> Result<(), TeleportError> {
        if self.in_progress.relay {
            return Ok(());
        }
        let Some(guid) = self.state.guid else {
            return Ok(());
        };

        let gas_fee = match cancellable(&self.cancel, self.amounts.relay_fee(&guid)).await? {
            Ok(fee) => fee,
            Err(e) => {
                warn!(error = %e, "relay fee unavailable");
                return Ok(());
            }
        };
        let request = RelayRequest {
            guid,
            signatures: self.state.attestations().combined_signatures(),
            fee_budget: FeeBudget {
                max_fee_percentage: self.config.max_fee_percentage,
                gas_fee,
            },
            expiry: unix_now()? + self.config.relay_expiry.as_secs(),
        };
        self.in_progress.relay = true;

        let wallet = Arc::clone(&self.wallet);
        let relay = Arc::clone(&self.relay);
        let submitter = self.submitter;
        let signed_tx = self.observations_tx.clone();
        let epoch = self.epoch;
        let delay = std::mem::take(&mut self.rearm_delay);
        self.spawn(delay, move |cancel| async move {
            let result = submitter
                .submit_relay(wallet.as_ref(), relay.as_ref(), request, &cancel, |signed| {
                    let _ = signed_tx.send(Tagged {
                        epoch,
                        observation: Observation::PayloadSigned(signed.clone()),
                    });
                })
                .await;
            Observation::RelaySubmitted(result)
        });
        Ok(())
    }

    fn arm_relay_outcome(&mut self) {
        if self.in_progress.relay {
            return;
        }
        let Some(task_id) = self.state.relay_task_id.clone() else {
            return;
        };
        self.in_progress.relay = true;

        let relay = Arc::clone(&self.relay);
        let submitter = self.submitter;
        let delay = std::mem::take(&mut self.rearm_delay);
        self.spawn(delay, move |cancel| async move {
            Observation::RelayOutcome(
                submitter
                    .await_relay_outcome(relay.as_ref(), &task_id, &cancel)
                    .await,
            )
        });
    }

    async fn submit_direct_mint(&mut self) -> Result<(), TeleportError> {
        let destination = self.route.destination;
        let session = match cancellable(&self.cancel, self.wallet.session()).await? {
            Ok(Some(session)) => session,
            Ok(None) => return Ok(()),
            Err(e) => {
                warn!(error = %e, "wallet session unavailable");
                return Ok(());
            }
        };
        if session.chain_id != destination.chain_id {
            debug!(
                expected = destination.chain_id,
                actual = session.chain_id,
                "direct mint waits for destination network"
            );
            self.emit(TransferEvent::NetworkMismatch {
                expected: destination.chain_id,
                actual: session.chain_id,
            });
            return Ok(());
        }
        let Some(guid) = self.state.guid else {
            return Ok(());
        };

        let request = DirectMintRequest {
            destination,
            guid,
            signatures: self.state.attestations().combined_signatures(),
            max_fee_percentage: self.config.max_fee_percentage,
            operator_fee: U256::ZERO,
        };
        let pending = cancellable(&self.cancel, self.wallet.mint_with_oracles(&request)).await??;
        let tx_hash = pending.hash;
        info!(%tx_hash, destination = %destination.domain, "direct mint submitted");

        self.state.mint_tx_hash = Some(tx_hash);
        self.mint_handle = Some(pending);
        self.transition(TransferAction::MintSubmitted)?;
        self.persist();
        self.emit(TransferEvent::MintSubmitted { tx_hash });
        Ok(())
    }

    async fn evaluate_mint_confirmation(&mut self) -> Result<(), TeleportError> {
        if self.mint_settling {
            return self.verify_settlement().await;
        }
        if self.in_progress.mint_confirming {
            return Ok(());
        }
        let Some(tx_hash) = self.state.mint_tx_hash else {
            return Ok(());
        };
        self.in_progress.mint_confirming = true;
        let target = match self.mint_handle.take() {
            Some(pending) => TxTarget::Pending(pending),
            None => TxTarget::Hash(tx_hash),
        };
        let query = Arc::clone(&self.destination);
        self.spawn_confirmation(query, target, Observation::MintFinalized);
        Ok(())
    }

    async fn verify_settlement(&mut self) -> Result<(), TeleportError> {
        let Some(guid) = self.state.guid else {
            return Ok(());
        };
        let pending =
            match cancellable(&self.cancel, self.amounts.pending_mintable_amount(&guid)).await? {
                Ok(pending) => pending,
                Err(e) => {
                    warn!(error = %e, "pending mintable amount unavailable");
                    return Ok(());
                }
            };
        self.mint_settling = false;
        self.state.pending_mint_amount = Some(pending);

        if pending.is_zero() {
            self.transition(TransferAction::MintSettled)?;
            info!(guid = %guid.hash(), mint_tx_hash = ?self.state.mint_tx_hash, "teleport complete");
            self.emit(TransferEvent::Completed {
                guid,
                mint_tx_hash: self.state.mint_tx_hash,
            });
            self.finish();
        } else {
            info!(guid = %guid.hash(), %pending, "mint left an amount pending");
            self.state.mint_tx_hash = None;
            self.state.clear_relay();
            self.mint_path = None;
            self.transition(TransferAction::MintPartial)?;
            self.persist();
        }
        Ok(())
    }

    /// A revert ends the transfer and is also returned to the caller.
    async fn confirm_inline(
        &mut self,
        pending: PendingTx,
        on_revert: FailureReason,
    ) -> Result<(), TeleportError> {
        let tx_hash = pending.hash;
        let confirmation = self
            .watcher
            .await_confirmation(
                self.source.as_ref(),
                TxTarget::Pending(pending),
                &self.cancel,
                |_| {},
            )
            .await?;
        match confirmation {
            Confirmation::Confirmed(_) => Ok(()),
            Confirmation::Reverted(_) => {
                self.fail(on_revert, tx_hash)?;
                Err(TeleportError::Reverted { tx_hash })
            }
        }
    }

    fn apply(&mut self, tagged: Tagged) -> Result<(), TeleportError> {
        if tagged.epoch != self.epoch {
            debug!(epoch = tagged.epoch, current = self.epoch, "dropping stale observation");
            return Ok(());
        }

        match tagged.observation {
            Observation::BurnFinalized(result) => {
                self.in_progress.burn_confirming = false;
                match result {
                    Ok(Confirmation::Confirmed(_)) => self.transition(TransferAction::BurnConfirmed)?,
                    Ok(Confirmation::Reverted(receipt)) => {
                        self.fail(FailureReason::BurnReverted, receipt.tx_hash)?
                    }
                    Err(e) => self.on_wait_error("burn confirmation", e),
                }
            }
            Observation::AttestationProgress(progress) => self.record_progress(progress),
            Observation::Attested(result) => {
                self.in_progress.attestations = false;
                match result {
                    Ok(collected) => {
                        self.state.guid = Some(collected.guid);
                        self.state.required_threshold = Some(collected.attestations.threshold());
                        self.state.collected_signatures =
                            collected.attestations.signatures().to_vec();
                        self.state.pending_mint_amount = None;
                        self.transition(TransferAction::QuorumReached)?;
                    }
                    Err(e) => self.on_wait_error("attestation collection", e),
                }
            }
            Observation::PayloadSigned(signed) => {
                self.emit(TransferEvent::PayloadSigned {
                    payload_hash: signed.payload_hash,
                });
                self.state.signed_payload = Some(signed);
            }
            Observation::RelaySubmitted(result) => {
                self.in_progress.relay = false;
                match result {
                    Ok(task_id) => {
                        self.state.relay_task_id = Some(task_id.clone());
                        self.persist();
                        self.emit(TransferEvent::RelayTaskCreated { task_id });
                        self.transition(TransferAction::RelayTaskCreated)?;
                    }
                    Err(TeleportError::Cancelled) => {}
                    Err(e) => self.relay_failed(None, e.to_string())?,
                }
            }
            Observation::RelayOutcome(result) => {
                self.in_progress.relay = false;
                match result {
                    Ok(tx_hash) => {
                        self.state.mint_tx_hash = Some(tx_hash);
                        self.emit(TransferEvent::MintSubmitted { tx_hash });
                        self.transition(TransferAction::RelayMinted)?;
                    }
                    Err(TeleportError::RelayFailed { task_id, reason }) => {
                        self.relay_failed(Some(task_id), reason)?
                    }
                    Err(e) if e.is_transient() || matches!(e, TeleportError::Cancelled) => {
                        self.on_wait_error("relay outcome", e)
                    }
                    Err(e) => {
                        let task_id = self.state.relay_task_id.clone();
                        self.relay_failed(task_id, e.to_string())?
                    }
                }
            }
            Observation::MintFinalized(result) => {
                self.in_progress.mint_confirming = false;
                match result {
                    Ok(Confirmation::Confirmed(_)) => self.mint_settling = true,
                    Ok(Confirmation::Reverted(receipt)) => {
                        self.fail(FailureReason::MintReverted, receipt.tx_hash)?
                    }
                    Err(e) => self.on_wait_error("mint confirmation", e),
                }
            }
        }
        Ok(())
    }

    fn record_progress(&mut self, progress: AttestationProgress) {
        if let (None, Some(guid)) = (self.state.guid, progress.guid) {
            info!(guid = %guid.hash(), amount = %guid.amount(), "guid observed");
            self.state.guid = Some(guid);
            self.emit(TransferEvent::GuidObserved { guid });
        }
        self.state.required_threshold = Some(progress.threshold);
        self.emit(TransferEvent::AttestationProgress {
            count: progress.count,
            threshold: progress.threshold,
        });
    }

    fn on_wait_error(&mut self, wait: &'static str, error: TeleportError) {
        match error {
            TeleportError::Cancelled => debug!(wait, "wait cancelled"),
            TeleportError::Unconfirmed { tx_hash, attempts } => {
                warn!(wait, %tx_hash, attempts, "no receipt yet");
                self.emit(TransferEvent::Unconfirmed { tx_hash, attempts });
                self.rearm_delay = self.config.retry_delay;
            }
            e => {
                warn!(wait, error = %e, transient = e.is_transient(), "wait failed");
                self.rearm_delay = self.config.retry_delay;
            }
        }
    }

    fn relay_failed(&mut self, task_id: Option<String>, reason: String) -> Result<(), TeleportError> {
        self.relay_failures += 1;
        let exhausted = self.relay_failures >= self.config.max_relay_attempts;
        warn!(task_id = ?task_id, %reason, attempts = self.relay_failures, exhausted, "relay attempt failed");

        self.state.clear_relay();
        self.mint_path = None;
        self.persist();
        self.emit(TransferEvent::RelayFailed {
            task_id,
            reason,
            attempts: self.relay_failures,
            exhausted,
        });
        self.transition(TransferAction::RelayFailed)
    }

    // the resume record is kept
    fn fail(&mut self, reason: FailureReason, tx_hash: B256) -> Result<(), TeleportError> {
        self.transition(TransferAction::Reverted)?;
        warn!(?reason, %tx_hash, "transfer failed");
        self.emit(TransferEvent::Failed { reason, tx_hash });
        Ok(())
    }

    fn finish(&mut self) {
        if let Some(burn_tx_hash) = self.state.burn_tx_hash {
            if let Err(e) = self.store.remove(self.route.source.chain_id, burn_tx_hash) {
                warn!(error = %e, "failed to drop resume record");
            }
        }
    }

    fn persist(&self) {
        if let Some(token) = self.resume_token() {
            if let Err(e) = self.store.save(&token) {
                warn!(error = %e, "failed to update resume record");
            }
        }
    }

    fn expect_phase(&self, expected: TransferPhase) -> Result<(), TeleportError> {
        if self.state.phase == expected {
            Ok(())
        } else {
            Err(TeleportError::Precondition(format!(
                "expected {expected:?}, transfer is in {:?}",
                self.state.phase
            )))
        }
    }

    fn transition(&mut self, action: TransferAction) -> Result<(), TeleportError> {
        let (to, record) = transfer_transition(self.state.phase, action)?;
        info!(from = ?record.from, to = ?record.to, reason = record.reason, "transfer phase changed");
        self.state.phase = to;
        self.emit(TransferEvent::PhaseChanged(record));
        Ok(())
    }

    fn emit(&self, event: TransferEvent) {
        let _ = self.events.send(event);
    }

    fn spawn_confirmation(
        &mut self,
        query: Arc<Q>,
        target: TxTarget,
        wrap: fn(Result<Confirmation, TeleportError>) -> Observation,
    ) {
        let watcher = self.watcher.clone();
        let events = self.events.clone();
        let delay = std::mem::take(&mut self.rearm_delay);
        self.spawn(delay, move |cancel| async move {
            let result = watcher
                .await_confirmation(query.as_ref(), target, &cancel, |receipt| {
                    let _ = events.send(TransferEvent::TxConfirmed {
                        tx_hash: receipt.tx_hash,
                    });
                })
                .await;
            wrap(result)
        });
    }

    fn spawn<F, Fut>(&self, delay: Duration, task: F)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Observation> + Send + 'static,
    {
        let cancel = self.cancel.child_token();
        let tx = self.observations_tx.clone();
        let epoch = self.epoch;
        let fut = task(cancel.clone());
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            let observation = fut.await;
            let _ = tx.send(Tagged { epoch, observation });
        });
    }
}

fn unix_now() -> Result<u64, TeleportError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|e| PortError::Transport(format!("system clock before unix epoch: {e}")).into())
}
