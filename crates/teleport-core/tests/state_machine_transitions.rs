use teleport_core::{transfer_transition, TeleportError, TransferAction, TransferPhase};

fn walk(start: TransferPhase, actions: &[TransferAction]) -> TransferPhase {
    actions.iter().fold(start, |phase, action| {
        let (next, record) = transfer_transition(phase, *action)
            .unwrap_or_else(|e| panic!("{phase:?} --{action:?}--> rejected: {e}"));
        assert_eq!(record.from, phase);
        assert_eq!(record.to, next);
        next
    })
}

#[test]
fn relay_happy_path_transitions() {
    let end = walk(
        TransferPhase::BurnPending,
        &[
            TransferAction::BurnSubmitted,
            TransferAction::BurnConfirmed,
            TransferAction::QuorumReached,
            TransferAction::ChooseRelay,
            TransferAction::RelayTaskCreated,
            TransferAction::RelayMinted,
            TransferAction::MintSettled,
        ],
    );
    assert_eq!(end, TransferPhase::Complete);
}

#[test]
fn direct_mint_happy_path_transitions() {
    let end = walk(
        TransferPhase::BurnPending,
        &[
            TransferAction::BurnSubmitted,
            TransferAction::BurnConfirmed,
            TransferAction::QuorumReached,
            TransferAction::ChooseDirect,
            TransferAction::MintSubmitted,
            TransferAction::MintSettled,
        ],
    );
    assert_eq!(end, TransferPhase::Complete);
}

#[test]
fn preconditions_move_freely_between_pre_burn_phases() {
    let end = walk(
        TransferPhase::NeedsWallet,
        &[
            TransferAction::Precondition(TransferPhase::NeedsNetworkSwitch),
            TransferAction::Precondition(TransferPhase::NeedsInitialAllocation),
            TransferAction::Precondition(TransferPhase::NeedsApproval),
            TransferAction::Precondition(TransferPhase::BurnPending),
            TransferAction::Precondition(TransferPhase::NeedsWallet),
        ],
    );
    assert_eq!(end, TransferPhase::NeedsWallet);
}

#[test]
fn precondition_cannot_leave_post_burn_phases() {
    for phase in [
        TransferPhase::BurnConfirming,
        TransferPhase::AwaitingAttestations,
        TransferPhase::ReadyToMint,
        TransferPhase::Complete,
    ] {
        let err = transfer_transition(
            phase,
            TransferAction::Precondition(TransferPhase::NeedsWallet),
        )
        .expect_err("must fail");
        assert!(matches!(err, TeleportError::IllegalTransition { .. }));
    }
}

#[test]
fn precondition_to_same_phase_is_rejected() {
    transfer_transition(
        TransferPhase::NeedsApproval,
        TransferAction::Precondition(TransferPhase::NeedsApproval),
    )
    .expect_err("self transition must fail");
}

#[test]
fn relay_failure_returns_to_ready_to_mint() {
    for phase in [TransferPhase::RelaySigning, TransferPhase::RelayPending] {
        let (next, record) =
            transfer_transition(phase, TransferAction::RelayFailed).expect("relay failure");
        assert_eq!(next, TransferPhase::ReadyToMint);
        assert_eq!(record.reason, "relay_failed");
    }
}

#[test]
fn reverts_are_terminal() {
    let (burn, _) = transfer_transition(TransferPhase::BurnConfirming, TransferAction::Reverted)
        .expect("burn revert");
    assert_eq!(burn, TransferPhase::Failed);
    let (mint, _) =
        transfer_transition(TransferPhase::DirectMintConfirming, TransferAction::Reverted)
            .expect("mint revert");
    assert_eq!(mint, TransferPhase::Failed);
    assert!(mint.is_terminal());

    for phase in [TransferPhase::NeedsInitialAllocation, TransferPhase::NeedsApproval] {
        let (to, _) = transfer_transition(phase, TransferAction::Reverted)
            .expect("funding revert");
        assert_eq!(to, TransferPhase::Failed);
    }
    transfer_transition(TransferPhase::ReadyToMint, TransferAction::Reverted)
        .expect_err("nothing is being confirmed in ReadyToMint");

    let err = transfer_transition(TransferPhase::Failed, TransferAction::BurnSubmitted)
        .expect_err("terminal");
    assert!(err.to_string().contains("illegal transfer transition"));
}

#[test]
fn partial_mint_reopens_ready_to_mint() {
    for phase in [
        TransferPhase::RelayMintConfirming,
        TransferPhase::DirectMintConfirming,
    ] {
        let (next, _) =
            transfer_transition(phase, TransferAction::MintPartial).expect("partial mint");
        assert_eq!(next, TransferPhase::ReadyToMint);
    }
}

#[test]
fn resume_enters_mint_confirmation_or_relay_wait() {
    let (relay, _) = transfer_transition(TransferPhase::ReadyToMint, TransferAction::ResumeRelay)
        .expect("resume relay");
    assert_eq!(relay, TransferPhase::RelayPending);
    let (direct, _) =
        transfer_transition(TransferPhase::ReadyToMint, TransferAction::ResumeDirectMint)
            .expect("resume direct");
    assert_eq!(direct, TransferPhase::DirectMintConfirming);
}

#[test]
fn nothing_pending_completes_without_mint() {
    let (next, record) =
        transfer_transition(TransferPhase::ReadyToMint, TransferAction::NothingPending)
            .expect("already completed");
    assert_eq!(next, TransferPhase::Complete);
    assert_eq!(record.reason, "already_completed");
}

#[test]
fn direct_mint_can_be_reset_before_submission_only() {
    let (next, _) = transfer_transition(
        TransferPhase::DirectMintPending,
        TransferAction::ResetMintPath,
    )
    .expect("reset");
    assert_eq!(next, TransferPhase::ReadyToMint);
    transfer_transition(
        TransferPhase::DirectMintConfirming,
        TransferAction::ResetMintPath,
    )
    .expect_err("submitted mint cannot be reset");
}

#[test]
fn relay_cannot_mint_before_task_exists() {
    transfer_transition(TransferPhase::RelaySigning, TransferAction::RelayMinted)
        .expect_err("signing -> minted must fail");
}
