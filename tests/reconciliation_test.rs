mod common;

use std::time::Duration;

use assert_matches::assert_matches;
use central_stores::{
    entities::blockchain_log,
    ledger::LedgerEventKind,
    services::reconciliation::{PollOutcome, PollSummary},
};
use common::{tx_hash, FakeLedger, TestContext};
use sea_orm::{EntityTrait, PaginatorTrait, QueryOrder};
use tokio::sync::watch;

async fn logged(ctx: &TestContext) -> Vec<blockchain_log::Model> {
    blockchain_log::Entity::find()
        .order_by_asc(blockchain_log::Column::BlockNumber)
        .all(ctx.state.db.as_ref())
        .await
        .unwrap()
}

#[tokio::test]
async fn repeated_poll_of_the_same_range_inserts_once() {
    let ctx = TestContext::new().await;
    ctx.ledger
        .push_event(LedgerEventKind::RequestCreated, tx_hash(0xabc), 1001, 0);
    let engine = &ctx.state.reconciliation;

    let first = engine.poll(1000, 1001).await;
    assert_eq!(
        first,
        PollOutcome::Completed(PollSummary {
            from_block: 1000,
            to_block: 1001,
            fetched: 1,
            inserted: 1,
            duplicates: 0,
        })
    );
    assert_eq!(engine.watermark().await.unwrap(), 1001);

    let second = engine.poll(1000, 1001).await;
    assert_matches!(second, PollOutcome::Completed(ref s) if s.inserted == 0 && s.duplicates == 1);
    assert_eq!(engine.watermark().await.unwrap(), 1001);

    let rows = logged(&ctx).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].event_type, "RequestCreated");
    assert_eq!(rows[0].transaction_hash, tx_hash(0xabc));
    assert_eq!(rows[0].block_number, 1001);
    assert_eq!(rows[0].event_data["source"], "fake");
}

#[tokio::test]
async fn overlapping_ranges_never_duplicate_rows() {
    let ctx = TestContext::new().await;
    ctx.ledger
        .push_event(LedgerEventKind::StockAdjusted, tx_hash(1), 5, 0);
    ctx.ledger
        .push_event(LedgerEventKind::StockAdjusted, tx_hash(1), 5, 1);
    ctx.ledger
        .push_event(LedgerEventKind::DeliveryLogged, tx_hash(2), 8, 0);
    let engine = &ctx.state.reconciliation;

    assert!(!engine.poll(1, 6).await.is_failure());
    assert!(!engine.poll(4, 9).await.is_failure());
    assert!(!engine.poll(1, 9).await.is_failure());

    // Same hash, different log index: two distinct events.
    let rows = logged(&ctx).await;
    assert_eq!(rows.len(), 3);
    assert_eq!(engine.watermark().await.unwrap(), 8);
}

#[tokio::test]
async fn empty_log_has_zero_watermark() {
    let ctx = TestContext::new().await;
    assert_eq!(ctx.state.reconciliation.watermark().await.unwrap(), 0);

    let outcome = ctx.state.reconciliation.poll(1, 5).await;
    assert_matches!(outcome, PollOutcome::Completed(ref s) if s.fetched == 0);
    assert_eq!(ctx.state.reconciliation.watermark().await.unwrap(), 0);
}

#[tokio::test]
async fn failed_poll_leaves_the_watermark_alone() {
    let ctx = TestContext::new().await;
    ctx.ledger
        .push_event(LedgerEventKind::RequestCreated, tx_hash(1), 3, 0);
    let engine = &ctx.state.reconciliation;
    engine.poll(1, 3).await;
    assert_eq!(engine.watermark().await.unwrap(), 3);

    ctx.ledger
        .push_event(LedgerEventKind::RequestApproved, tx_hash(2), 7, 0);
    ctx.ledger.fail_fetches("connection reset");

    let outcome = engine.poll(4, 7).await;
    assert_matches!(
        outcome,
        PollOutcome::Failed { ref reason, reconciled_through: None } if reason.contains("connection reset")
    );
    assert_eq!(engine.watermark().await.unwrap(), 3);

    ctx.ledger.heal();
    assert!(!engine.poll(4, 7).await.is_failure());
    assert_eq!(engine.watermark().await.unwrap(), 7);
}

#[tokio::test]
async fn malformed_events_fail_the_whole_range() {
    let ctx = TestContext::new().await;
    ctx.ledger
        .push_event(LedgerEventKind::RequestCreated, tx_hash(1), 2, 0);
    ctx.ledger
        .push_event(LedgerEventKind::RequestApproved, "0x1234".to_string(), 3, 0);

    let outcome = ctx.state.reconciliation.poll(1, 3).await;
    assert!(outcome.is_failure());
    assert!(logged(&ctx).await.is_empty());
}

#[tokio::test]
async fn catch_up_walks_bounded_windows() {
    let ctx = TestContext::new().await;
    ctx.ledger
        .push_event(LedgerEventKind::RoleAssigned, tx_hash(1), 4, 0);
    ctx.ledger
        .push_event(LedgerEventKind::DamageReported, tx_hash(2), 25, 0);

    let outcome = ctx.state.reconciliation.process_now(Some(1)).await;

    assert_matches!(
        outcome,
        PollOutcome::Completed(ref s) if s.from_block == 1 && s.to_block == 25 && s.inserted == 2
    );
    assert_eq!(ctx.ledger.polled_ranges(), vec![(1, 10), (11, 20), (21, 25)]);
}

#[tokio::test]
async fn catch_up_reports_partial_progress() {
    let ctx = TestContext::new().await;
    ctx.ledger
        .push_event(LedgerEventKind::RoleAssigned, tx_hash(1), 4, 0);
    ctx.ledger
        .push_event(LedgerEventKind::RelocationLogged, tx_hash(2), 15, 0);
    ctx.ledger
        .push_event(LedgerEventKind::DeliveryLogged, tx_hash(3), 25, 0);
    ctx.ledger.fail_from_block(20);

    let outcome = ctx.state.reconciliation.process_now(Some(1)).await;

    assert_matches!(outcome, PollOutcome::Failed { reconciled_through: Some(10), .. });
    assert_eq!(ctx.state.reconciliation.watermark().await.unwrap(), 4);

    ctx.ledger.heal();
    let resumed = ctx.state.reconciliation.process_now(Some(11)).await;
    assert_matches!(resumed, PollOutcome::Completed(ref s) if s.inserted == 2);
    assert_eq!(ctx.state.reconciliation.watermark().await.unwrap(), 25);
}

#[tokio::test]
async fn process_now_starts_after_the_watermark() {
    let ctx = TestContext::new().await;
    ctx.ledger
        .push_event(LedgerEventKind::RequestCreated, tx_hash(1), 6, 0);
    let engine = &ctx.state.reconciliation;

    assert_matches!(engine.process_now(None).await, PollOutcome::Completed(_));
    assert_eq!(engine.process_now(None).await, PollOutcome::UpToDate { latest_block: 6 });

    ctx.ledger
        .push_event(LedgerEventKind::RequestApproved, tx_hash(2), 9, 0);
    let outcome = engine.run_once().await;
    assert_matches!(outcome, PollOutcome::Completed(ref s) if s.from_block == 7 && s.to_block == 9);
}

#[tokio::test]
async fn unreadable_chain_height_is_a_failed_outcome() {
    let ctx = TestContext::new().await;
    ctx.ledger.fail_latest_block(true);

    let outcome = ctx.state.reconciliation.process_now(None).await;
    assert_matches!(outcome, PollOutcome::Failed { reconciled_through: None, .. });
}

#[tokio::test]
async fn listener_loop_follows_the_chain_until_stopped() {
    let ctx = TestContext::new().await;
    ctx.ledger
        .push_event(LedgerEventKind::RequestCreated, tx_hash(1), 3, 0);
    let engine = ctx.state.reconciliation.clone();
    let (stop_tx, stop_rx) = watch::channel(false);

    let handle = tokio::spawn(async move {
        engine
            .run_forever(Duration::from_millis(20), stop_rx)
            .await
    });

    let db = ctx.state.db.clone();
    let wait_for_rows = |expected: u64| {
        let db = db.clone();
        async move {
            for _ in 0..200 {
                let count = blockchain_log::Entity::find()
                    .count(db.as_ref())
                    .await
                    .unwrap();
                if count >= expected {
                    return count;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            0
        }
    };

    assert_eq!(wait_for_rows(1).await, 1);
    ctx.ledger
        .push_event(LedgerEventKind::StockAdjusted, tx_hash(2), 12, 0);
    assert_eq!(wait_for_rows(2).await, 2);

    stop_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("listener should stop")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn status_reports_watermark_and_counts() {
    let ctx = TestContext::new().await;
    ctx.ledger
        .push_event(LedgerEventKind::RequestCreated, tx_hash(1), 42, 0);
    ctx.state.reconciliation.process_now(None).await;

    let status = ctx.state.reconciliation.status().await.unwrap();
    assert!(status.connected);
    assert!(status.contract_configured);
    assert_eq!(status.latest_block, Some(42));
    assert_eq!(status.watermark, 42);
    assert_eq!(status.total_events_logged, 1);
}

#[tokio::test]
async fn unconfigured_contract_shows_in_status() {
    let ctx = TestContext::with_ledger(FakeLedger::unconfigured()).await;
    let status = ctx.state.reconciliation.status().await.unwrap();
    assert!(!status.contract_configured);
    assert_eq!(status.total_events_logged, 0);
}
