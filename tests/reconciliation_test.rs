mod common;

use chrono::Utc;
use common::*;
use monei_sync::config::StoreSettings;
use monei_sync::domain::lock::LockStore;
use monei_sync::domain::payment::PaymentStatus;
use monei_sync::services::reconciliation::{
    ABANDONED_REASON, ReconciliationSweep, SweepReport, SweepSettings,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

fn sweep(h: &Harness, stores: StoreSettings) -> ReconciliationSweep {
    ReconciliationSweep::new(
        h.processor.clone(),
        h.locks.clone(),
        h.orders.clone(),
        h.api.clone(),
        stores,
        SweepSettings::default(),
    )
}

/// Order sitting in the pre-authorized status with an authorized payment upstream.
fn seed_authorized(h: &Harness, order: &str, payment: &str, age_days: i64) {
    h.orders
        .insert(make_order(order, "monei_authorized", Some(payment), age_days));
    h.api
        .put(payment_json(payment, order, PaymentStatus::Authorized, 5000));
}

#[tokio::test]
async fn abandoned_authorization_is_canceled() {
    let h = Harness::new();
    seed_authorized(&h, "100", "pay_old", 9);

    let report = sweep(&h, StoreSettings::default())
        .run_once(Utc::now())
        .await
        .unwrap();

    assert_eq!(
        report,
        SweepReport {
            examined: 1,
            canceled: 1,
            ..Default::default()
        }
    );
    assert_eq!(
        h.api.cancels(),
        vec![("pay_old".to_string(), ABANDONED_REASON.to_string())]
    );
    let order = h.orders.snapshot(&oid("100")).unwrap();
    assert_eq!(order.status, "monei_canceled");
    assert_eq!(order.state, "canceled");
}

#[tokio::test]
async fn recent_authorization_is_reprocessed_not_canceled() {
    let h = Harness::new();
    seed_authorized(&h, "200", "pay_new", 2);
    // Captured upstream, webhook lost.
    h.api
        .put(payment_json("pay_new", "200", PaymentStatus::Succeeded, 5000));

    let report = sweep(&h, StoreSettings::default())
        .run_once(Utc::now())
        .await
        .unwrap();

    assert_eq!(report.reprocessed, 1);
    assert_eq!(report.canceled, 0);
    assert!(h.api.cancels().is_empty());
    assert_eq!(
        h.orders.snapshot(&oid("200")).unwrap().status,
        "monei_succeeded"
    );
    assert_eq!(h.invoices.invoices().len(), 1);
}

#[tokio::test]
async fn still_authorized_payment_leaves_order_alone() {
    let h = Harness::new();
    seed_authorized(&h, "200", "pay_new", 1);

    let report = sweep(&h, StoreSettings::default())
        .run_once(Utc::now())
        .await
        .unwrap();

    assert_eq!(report.reprocessed, 1);
    assert_eq!(h.orders.save_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn locked_order_is_skipped() {
    let h = Harness::new();
    seed_authorized(&h, "300", "pay_locked", 9);
    assert!(h.locks.lock_order("300", None).await.unwrap());

    let report = sweep(&h, StoreSettings::default())
        .run_once(Utc::now())
        .await
        .unwrap();

    assert_eq!(report.skipped, 1);
    assert!(h.api.cancels().is_empty());
    assert_eq!(h.api.get_calls(), 0);
}

#[tokio::test]
async fn order_without_payment_id_is_not_picked_up() {
    let h = Harness::new();
    h.orders
        .insert(make_order("400", "monei_authorized", None, 9));
    h.orders
        .insert(make_order("401", "monei_authorized", Some("  "), 9));

    let report = sweep(&h, StoreSettings::default())
        .run_once(Utc::now())
        .await
        .unwrap();

    assert_eq!(report, SweepReport::default());
    assert_eq!(h.api.get_calls(), 0);
}

#[tokio::test]
async fn disabled_store_is_not_picked_up() {
    let h = Harness::new();
    let mut order = make_order("500", "monei_authorized", Some("pay_5"), 9);
    order.store_id = 7;
    h.orders.insert(order);
    h.api
        .put(payment_json("pay_5", "500", PaymentStatus::Authorized, 100));

    let report = sweep(&h, StoreSettings::with_disabled([7]))
        .run_once(Utc::now())
        .await
        .unwrap();

    assert_eq!(report, SweepReport::default());
    assert!(h.api.cancels().is_empty());
    assert_eq!(h.api.get_calls(), 0);
}

/// Older orders that can never be reconciled must not crowd a workable one
/// out of a full batch.
#[tokio::test]
async fn unworkable_orders_do_not_fill_the_batch() {
    let h = Harness::new();
    for id in ["901", "902", "903"] {
        h.orders
            .insert(make_order(id, "monei_authorized", None, 30));
    }
    let mut other_store = make_order("904", "monei_authorized", Some("pay_904"), 30);
    other_store.store_id = 7;
    h.orders.insert(other_store);
    seed_authorized(&h, "900", "pay_x", 1);
    h.api
        .put(payment_json("pay_x", "900", PaymentStatus::Succeeded, 5000));

    let report = ReconciliationSweep::new(
        h.processor.clone(),
        h.locks.clone(),
        h.orders.clone(),
        h.api.clone(),
        StoreSettings::with_disabled([7]),
        SweepSettings {
            batch_size: 3,
            ..SweepSettings::default()
        },
    )
    .run_once(Utc::now())
    .await
    .unwrap();

    assert_eq!(
        report,
        SweepReport {
            examined: 1,
            reprocessed: 1,
            ..Default::default()
        }
    );
    assert_eq!(
        h.orders.snapshot(&oid("900")).unwrap().status,
        "monei_succeeded"
    );
}

#[tokio::test(start_paused = true)]
async fn sweep_purges_expired_locks() {
    let h = Harness::new();
    assert!(h.locks.lock_order("abandoned", None).await.unwrap());
    assert!(h.locks.lock_payment("abandoned", "pay_1", None).await.unwrap());
    tokio::time::advance(test_lock_settings().ttl + Duration::from_secs(1)).await;
    assert!(h.locks.lock_order("live", None).await.unwrap());

    sweep(&h, StoreSettings::default())
        .run_once(Utc::now())
        .await
        .unwrap();

    assert_eq!(h.lock_store.purge_expired().await.unwrap(), 0);
    assert!(h.locks.is_order_locked("live").await.unwrap());
}

#[tokio::test]
async fn one_failing_order_does_not_stop_the_sweep() {
    let h = Harness::new();
    seed_authorized(&h, "601", "pay_broken", 3);
    seed_authorized(&h, "602", "pay_fine", 2);
    h.api.fail_with("pay_broken", "Internal server error");

    let report = sweep(&h, StoreSettings::default())
        .run_once(Utc::now())
        .await
        .unwrap();

    assert_eq!(report.examined, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.reprocessed, 1);
    assert!(!h.locks.is_order_locked("601").await.unwrap());
}

#[tokio::test]
async fn only_pre_authorized_orders_are_examined() {
    let h = Harness::new();
    h.orders
        .insert(make_order("700", "monei_succeeded", Some("pay_done"), 30));
    h.orders
        .insert(make_order("701", "monei_pending", Some("pay_new"), 30));

    let report = sweep(&h, StoreSettings::default())
        .run_once(Utc::now())
        .await
        .unwrap();

    assert_eq!(report, SweepReport::default());
}

#[tokio::test(start_paused = true)]
async fn run_loop_stops_on_shutdown() {
    let h = Harness::new();
    seed_authorized(&h, "800", "pay_8", 9);
    let sweep = Arc::new(ReconciliationSweep::new(
        h.processor.clone(),
        h.locks.clone(),
        h.orders.clone(),
        h.api.clone(),
        StoreSettings::default(),
        SweepSettings {
            interval: Duration::from_secs(60),
            ..SweepSettings::default()
        },
    ));

    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(sweep.run(rx));

    tokio::time::sleep(Duration::from_secs(61)).await;
    tx.send(true).unwrap();
    handle.await.unwrap();

    assert_eq!(h.api.cancels().len(), 1);
}
