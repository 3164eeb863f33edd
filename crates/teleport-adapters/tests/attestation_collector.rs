mod common;

use std::sync::{Arc, Mutex};

use alloy::primitives::B256;
use tokio_util::sync::CancellationToken;

use common::{guid_for, oracle_sig, snapshot, Harness};
use teleport_adapters::InMemoryOracle;
use teleport_core::{
    AttestationCollector, AttestationProgress, DomainId, OracleSnapshot, PortError, TeleportError,
};

fn source() -> DomainId {
    DomainId::from_name("OPT-GOER-A").expect("domain")
}

fn recorder() -> (
    Arc<Mutex<Vec<AttestationProgress>>>,
    impl FnMut(AttestationProgress) + Send + 'static,
) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    (seen, move |p| sink.lock().expect("progress lock").push(p))
}

#[tokio::test]
async fn duplicate_signer_does_not_advance_quorum() {
    let h = Harness::new();
    let guid = guid_for(&h.request());
    let burn = B256::repeat_byte(0x10);
    let oracle = Arc::new(h.oracle.clone());
    h.oracle
        .publish(burn, snapshot(Some(guid), &[1], 2))
        .expect("first");
    h.oracle
        .publish(burn, snapshot(Some(guid), &[1, 1], 2))
        .expect("repeat");
    h.oracle
        .publish(burn, snapshot(None, &[2], 2))
        .expect("second signer");

    let (seen, on_progress) = recorder();
    let collected = AttestationCollector::new()
        .collect_attestations(oracle, source(), burn, on_progress, CancellationToken::new())
        .await
        .expect("collected");

    assert_eq!(collected.guid, guid);
    assert_eq!(collected.attestations.len(), 2);
    let counts: Vec<usize> = seen
        .lock()
        .expect("progress lock")
        .iter()
        .map(|p| p.count)
        .collect();
    assert_eq!(counts, vec![1, 2]);
}

#[tokio::test]
async fn concurrent_collections_share_one_subscription() {
    let h = Harness::new();
    let guid = guid_for(&h.request());
    let burn = B256::repeat_byte(0x11);
    let oracle = Arc::new(h.oracle.clone());
    let collector = AttestationCollector::new();
    let (first_seen, first_progress) = recorder();
    let (second_seen, second_progress) = recorder();

    let publisher = async {
        tokio::task::yield_now().await;
        h.oracle
            .publish(burn, snapshot(Some(guid), &[1, 2, 3], 3))
            .expect("publish");
    };
    let (a, b, ()) = tokio::join!(
        collector.collect_attestations(
            Arc::clone(&oracle),
            source(),
            burn,
            first_progress,
            CancellationToken::new(),
        ),
        collector.collect_attestations(
            Arc::clone(&oracle),
            source(),
            burn,
            second_progress,
            CancellationToken::new(),
        ),
        publisher,
    );

    assert_eq!(a.expect("first"), b.expect("second"));
    assert_eq!(h.oracle.subscription_count(burn), 1);
    let reported =
        first_seen.lock().expect("lock").len() + second_seen.lock().expect("lock").len();
    assert_eq!(reported, 1);
    assert!(!collector.is_collecting(burn));
}

#[tokio::test]
async fn snapshots_for_another_guid_are_ignored() {
    let h = Harness::new();
    let guid = guid_for(&h.request());
    let mut other_request = h.request();
    other_request.amount = other_request.amount * alloy::primitives::U256::from(2u64);
    let other = guid_for(&other_request);
    let burn = B256::repeat_byte(0x12);
    h.oracle
        .publish(burn, snapshot(Some(guid), &[1], 2))
        .expect("first");
    h.oracle
        .publish(burn, snapshot(Some(other), &[2, 3], 2))
        .expect("foreign");
    h.oracle
        .publish(
            burn,
            OracleSnapshot {
                signatures: vec![oracle_sig(4)],
                threshold: 2,
                guid: Some(guid),
            },
        )
        .expect("second");

    let (_, on_progress) = recorder();
    let collected = AttestationCollector::new()
        .collect_attestations(
            Arc::new(h.oracle.clone()),
            source(),
            burn,
            on_progress,
            CancellationToken::new(),
        )
        .await
        .expect("collected");
    assert_eq!(collected.guid, guid);
    let signers: Vec<u8> = collected
        .attestations
        .signatures()
        .iter()
        .map(|s| s.signer.0[0])
        .collect();
    assert_eq!(signers, vec![1, 4]);
}

#[tokio::test]
async fn quorum_without_guid_keeps_waiting() {
    let oracle = InMemoryOracle::default();
    let burn = B256::repeat_byte(0x13);
    let guid = guid_for(&Harness::new().request());
    oracle
        .publish(burn, snapshot(None, &[1, 2], 2))
        .expect("unattributed quorum");

    let collector = AttestationCollector::new();
    let cancel = CancellationToken::new();
    let task = tokio::spawn({
        let collector = collector.clone();
        let oracle = Arc::new(oracle.clone());
        let cancel = cancel.clone();
        async move {
            collector
                .collect_attestations(oracle, source(), burn, |_| {}, cancel)
                .await
        }
    });
    while !collector.is_collecting(burn) {
        tokio::task::yield_now().await;
    }

    oracle
        .publish(burn, snapshot(Some(guid), &[], 2))
        .expect("guid");
    let collected = task.await.expect("join").expect("collected");
    assert_eq!(collected.guid, guid);
    assert!(collected.attestations.is_attestable());
}

#[tokio::test]
async fn closed_feed_is_a_transport_error() {
    let oracle = InMemoryOracle::default();
    let burn = B256::repeat_byte(0x14);
    let collector = AttestationCollector::new();

    let task = tokio::spawn({
        let collector = collector.clone();
        let oracle = Arc::new(oracle.clone());
        async move {
            collector
                .collect_attestations(oracle, source(), burn, |_| {}, CancellationToken::new())
                .await
        }
    });
    while oracle.subscription_count(burn) == 0 {
        tokio::task::yield_now().await;
    }
    oracle.disconnect(burn).expect("disconnect");

    let err = task.await.expect("join").expect_err("feed closed");
    assert!(matches!(err, TeleportError::Port(PortError::Transport(_))));
    assert!(err.is_transient());
}

#[tokio::test]
async fn cancellation_stops_collection() {
    let oracle = Arc::new(InMemoryOracle::default());
    let burn = B256::repeat_byte(0x15);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = AttestationCollector::new()
        .collect_attestations(oracle, source(), burn, |_| {}, cancel)
        .await
        .expect_err("cancelled");
    assert!(matches!(err, TeleportError::Cancelled));
}

#[tokio::test]
async fn cancelled_joiner_leaves_the_collection_running() {
    let h = Harness::new();
    let guid = guid_for(&h.request());
    let burn = B256::repeat_byte(0x16);
    let oracle = Arc::new(h.oracle.clone());
    let collector = AttestationCollector::new();

    let first = tokio::spawn({
        let collector = collector.clone();
        let oracle = Arc::clone(&oracle);
        async move {
            collector
                .collect_attestations(oracle, source(), burn, |_| {}, CancellationToken::new())
                .await
        }
    });
    while h.oracle.subscription_count(burn) == 0 {
        tokio::task::yield_now().await;
    }

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = collector
        .collect_attestations(Arc::clone(&oracle), source(), burn, |_| {}, cancel)
        .await
        .expect_err("joiner cancelled");
    assert!(matches!(err, TeleportError::Cancelled));
    assert!(collector.is_collecting(burn));

    h.oracle
        .publish(burn, snapshot(Some(guid), &[1, 2], 2))
        .expect("publish");
    let collected = first.await.expect("join").expect("first caller collected");
    assert_eq!(collected.guid, guid);
    assert_eq!(h.oracle.subscription_count(burn), 1);
    assert!(!collector.is_collecting(burn));
}

#[tokio::test]
async fn joiner_outlives_a_cancelled_first_caller() {
    let h = Harness::new();
    let guid = guid_for(&h.request());
    let burn = B256::repeat_byte(0x17);
    let oracle = Arc::new(h.oracle.clone());
    let collector = AttestationCollector::new();
    let first_cancel = CancellationToken::new();

    let first = tokio::spawn({
        let collector = collector.clone();
        let oracle = Arc::clone(&oracle);
        let cancel = first_cancel.clone();
        async move {
            collector
                .collect_attestations(oracle, source(), burn, |_| {}, cancel)
                .await
        }
    });
    while h.oracle.subscription_count(burn) == 0 {
        tokio::task::yield_now().await;
    }

    let joiner = collector.collect_attestations(
        Arc::clone(&oracle),
        source(),
        burn,
        |_| {},
        CancellationToken::new(),
    );
    let driver = async {
        first_cancel.cancel();
        let err = first.await.expect("join").expect_err("first cancelled");
        assert!(matches!(err, TeleportError::Cancelled));
        assert!(collector.is_collecting(burn));
        h.oracle
            .publish(burn, snapshot(Some(guid), &[1, 2], 2))
            .expect("publish");
    };
    let (joined, ()) = tokio::join!(joiner, driver);

    assert_eq!(joined.expect("joiner collected").guid, guid);
    assert_eq!(h.oracle.subscription_count(burn), 1);
    assert!(!collector.is_collecting(burn));
}
