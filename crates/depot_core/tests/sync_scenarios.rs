//! End-to-end outbox scenarios against a scripted backend

use async_trait::async_trait;
use depot_common::{Client, Collection, DepotError, MovementKind, Product, RecordedBy, StockMovement};
use depot_config::SyncConfig;
use depot_core::testing::ScriptedRemote;
use depot_core::{
    ConnectivityMonitor, ConnectivityReporter, DrainOutcome, DrainReport, MemoryStore,
    NetworkSource, SkipReason, SqliteStore, Store, SyncContext, SyncEvent,
};
use depot_test_helpers::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_test::{assert_err, assert_ok};

/// Network source driven entirely by the test through the reporter
struct ManualSource;

#[async_trait]
impl NetworkSource for ManualSource {
    async fn run(&self, _reporter: ConnectivityReporter) {
        std::future::pending::<()>().await;
    }
}

fn context_on(backend: MemoryStore, remote: Arc<ScriptedRemote>, online: bool) -> SyncContext {
    suppress_logs();
    SyncContext::with_monitor(
        &SyncConfig::default(),
        Store::new(backend),
        remote,
        ConnectivityMonitor::with_initial(online),
    )
}

fn drain_reports(ctx: &SyncContext) -> mpsc::UnboundedReceiver<DrainReport> {
    let (tx, rx) = mpsc::unbounded_channel();
    ctx.on("drain_completed", move |event| {
        if let SyncEvent::DrainCompleted(report) = event {
            let _ = tx.send(*report);
        }
    });
    rx
}

async fn next_report(rx: &mut mpsc::UnboundedReceiver<DrainReport>) -> DrainReport {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for a drain")
        .expect("event channel closed")
}

fn movement(id: &str, kind: MovementKind) -> StockMovement {
    StockMovement {
        id: id.to_string(),
        product_id: "p1".to_string(),
        kind,
        quantity: 3,
        reason: None,
        date: chrono::Utc::now(),
        recorded_by: RecordedBy {
            uid: "u1".to_string(),
            email: "clerk@example.com".to_string(),
        },
    }
}

#[tokio::test]
async fn drain_replays_in_fifo_order_across_collections() {
    let remote = Arc::new(ScriptedRemote::succeeding());
    let ctx = context_on(MemoryStore::new(), remote.clone(), true);

    let expected = vec![
        ctx.clients().add(Client::new("c1", "Ana")).unwrap(),
        ctx.products().add(Product::new("p1", "Rice", 2.5)).unwrap(),
        ctx.stock_movements().add(movement("m1", MovementKind::Entry)).unwrap(),
        ctx.clients().update(Client::new("c1", "Ana María")).unwrap(),
    ];

    let outcome = assert_ok!(ctx.sync_now().await);
    let report = *outcome.report().unwrap();
    assert_eq!(report.succeeded, 4);
    assert_eq!(report.total, 4);
    assert_eq!(remote.applied_ids(), expected);
}

#[tokio::test]
async fn drain_is_idempotent_once_the_queue_is_empty() {
    let remote = Arc::new(ScriptedRemote::succeeding());
    let ctx = context_on(MemoryStore::new(), remote.clone(), true);
    ctx.clients().add(Client::new("c1", "Ana")).unwrap();

    assert_ok!(ctx.sync_now().await);
    let first_sync = ctx.last_sync_time().unwrap();

    let second = assert_ok!(ctx.sync_now().await);
    assert_eq!(second, DrainOutcome::Completed(DrainReport::default()));
    assert_eq!(remote.attempts(), 1);
    assert_eq!(ctx.last_sync_time().unwrap(), first_sync);
}

#[tokio::test]
async fn failed_records_are_retried_then_dropped_without_blocking_others() {
    let remote = Arc::new(ScriptedRemote::succeeding());
    let ctx = context_on(MemoryStore::new(), remote.clone(), true);

    let (tx, mut dropped) = mpsc::unbounded_channel();
    ctx.on("permanent_failure", move |event| {
        if let SyncEvent::PermanentFailure(record) = event {
            let _ = tx.send(record.clone());
        }
    });

    let doomed = ctx.clients().add(Client::new("c1", "Ana")).unwrap();
    let healthy = ctx.products().add(Product::new("p1", "Rice", 2.5)).unwrap();

    // First record fails on every drain, the second succeeds on the first.
    remote.push_outcomes(&[false, true, false, false]);

    let first = *assert_ok!(ctx.sync_now().await).report().unwrap();
    assert_eq!((first.succeeded, first.failed, first.dropped), (1, 1, 0));
    assert_eq!(remote.applied_ids(), vec![healthy]);

    let second = *assert_ok!(ctx.sync_now().await).report().unwrap();
    assert_eq!((second.total, second.failed, second.dropped), (1, 1, 0));

    let third = *assert_ok!(ctx.sync_now().await).report().unwrap();
    assert_eq!((third.failed, third.dropped), (1, 1));

    let record = dropped.try_recv().expect("permanent failure reported");
    assert_eq!(record.id, doomed);
    assert_eq!(record.retry_count, 3);
    assert_eq!(record.collection, Collection::Clients);
    assert_eq!(ctx.pending_sync_count().unwrap(), 0);
}

#[tokio::test]
async fn pending_mutations_survive_a_restart() {
    let backend = MemoryStore::new();
    let remote = Arc::new(ScriptedRemote::succeeding());

    let id = {
        let ctx = context_on(backend.clone(), remote.clone(), false);
        ctx.clients().add(Client::new("c1", "Ana")).unwrap()
    };

    let ctx = context_on(backend, remote.clone(), true);
    assert_eq!(ctx.pending_sync_count().unwrap(), 1);
    assert_eq!(ctx.clients().list().unwrap()[0].name, "Ana");

    assert_ok!(ctx.sync_now().await);
    assert_eq!(remote.applied_ids(), vec![id]);
}

#[tokio::test]
async fn sqlite_store_keeps_queue_and_last_sync_across_reopen() {
    suppress_logs();
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join(".depot/depot.db");
    let remote = Arc::new(ScriptedRemote::succeeding());

    {
        let store = Store::new(SqliteStore::open(&path).unwrap());
        let ctx = SyncContext::new(&SyncConfig::default(), store, remote.clone());
        ctx.products().add(Product::new("p1", "Rice", 2.5)).unwrap();
        ctx.products().add(Product::new("p2", "Beans", 1.8)).unwrap();
        let report = *assert_ok!(ctx.sync_now().await).report().unwrap();
        assert_eq!(report.succeeded, 2);
        ctx.products().add(Product::new("p3", "Oil", 4.0)).unwrap();
    }

    let store = Store::new(SqliteStore::open(&path).unwrap());
    let ctx = SyncContext::new(&SyncConfig::default(), store, remote);
    assert_eq!(ctx.pending_sync_count().unwrap(), 1);
    assert_eq!(ctx.queue().pending().unwrap()[0].entity_id(), Some("p3"));
    assert!(ctx.last_sync_time().unwrap().is_some());
    assert_eq!(ctx.products().list().unwrap().len(), 3);
}

#[tokio::test]
async fn offline_writes_drain_automatically_when_back_online() {
    let remote = Arc::new(ScriptedRemote::succeeding());
    let ctx = context_on(MemoryStore::new(), remote.clone(), false);
    let mut reports = drain_reports(&ctx);
    ctx.initialize(Arc::new(ManualSource));

    ctx.clients().add(Client::new("c1", "Ana")).unwrap();
    ctx.stock_movements().add(movement("m1", MovementKind::Exit)).unwrap();

    assert_eq!(
        assert_ok!(ctx.sync_now().await),
        DrainOutcome::Skipped(SkipReason::Offline)
    );
    assert_eq!(ctx.pending_sync_count().unwrap(), 2);
    assert_eq!(remote.attempts(), 0);

    ctx.connectivity().reporter().report(true);

    let report = next_report(&mut reports).await;
    assert_eq!(report.succeeded, 2);
    assert_eq!(ctx.pending_sync_count().unwrap(), 0);
    assert!(ctx.last_sync_time().unwrap().is_some());
    ctx.shutdown();
}

#[tokio::test]
async fn write_while_online_triggers_a_drain() {
    let remote = Arc::new(ScriptedRemote::succeeding());
    let ctx = context_on(MemoryStore::new(), remote.clone(), true);
    let mut reports = drain_reports(&ctx);
    ctx.initialize(Arc::new(ManualSource));

    let id = ctx.clients().add(Client::new("c1", "Ana")).unwrap();

    let report = next_report(&mut reports).await;
    assert_eq!(report.succeeded, 1);
    assert_eq!(remote.applied_ids(), vec![id]);
    ctx.shutdown();
}

#[tokio::test]
async fn no_automatic_drain_after_shutdown() {
    let remote = Arc::new(ScriptedRemote::succeeding());
    let ctx = context_on(MemoryStore::new(), remote.clone(), false);
    ctx.initialize(Arc::new(ManualSource));
    ctx.shutdown();

    ctx.clients().add(Client::new("c1", "Ana")).unwrap();
    ctx.connectivity().reporter().report(true);
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(remote.attempts(), 0);
    assert_eq!(ctx.pending_sync_count().unwrap(), 1);
}

#[tokio::test(start_paused = true)]
async fn overlapping_sync_requests_are_single_flight() {
    let remote = Arc::new(ScriptedRemote::succeeding().with_delay(Duration::from_secs(2)));
    let ctx = Arc::new(context_on(MemoryStore::new(), remote.clone(), true));
    ctx.clients().add(Client::new("c1", "Ana")).unwrap();

    let running = tokio::spawn({
        let ctx = ctx.clone();
        async move { ctx.sync_now().await }
    });
    while !ctx.status().unwrap().draining {
        tokio::task::yield_now().await;
    }

    assert_eq!(
        assert_ok!(ctx.sync_now().await),
        DrainOutcome::Skipped(SkipReason::InFlight)
    );

    let report = *assert_ok!(running.await.unwrap()).report().unwrap();
    assert_eq!(report.succeeded, 1);
    assert_eq!(remote.attempts(), 1);
}

#[tokio::test]
async fn storage_failure_aborts_the_drain_and_keeps_the_record() {
    let backend = MemoryStore::new();
    let remote = Arc::new(ScriptedRemote::succeeding());
    let ctx = context_on(backend.clone(), remote.clone(), true);
    ctx.clients().add(Client::new("c1", "Ana")).unwrap();

    backend.set_fail_writes(true);
    let err = assert_err!(ctx.sync_now().await);
    assert!(matches!(err, DepotError::Storage(_)));
    backend.set_fail_writes(false);

    assert_eq!(ctx.pending_sync_count().unwrap(), 1);
    assert!(ctx.last_sync_time().unwrap().is_none());
    assert!(!ctx.status().unwrap().draining);

    // Delivery is at-least-once: the record is applied again.
    assert_ok!(ctx.sync_now().await);
    assert_eq!(remote.attempts(), 2);
    assert_eq!(ctx.pending_sync_count().unwrap(), 0);
}

#[tokio::test]
async fn failed_local_write_leaves_no_queue_entry() {
    let backend = MemoryStore::new();
    let ctx = context_on(backend.clone(), Arc::new(ScriptedRemote::succeeding()), false);

    backend.set_fail_writes(true);
    assert_err!(ctx.products().add(Product::new("p1", "Rice", 2.5)));
    backend.set_fail_writes(false);

    assert!(ctx.products().list().unwrap().is_empty());
    assert_eq!(ctx.pending_sync_count().unwrap(), 0);
}
