use monei_sync::domain::money::MoneyAmount;
use monei_sync::domain::order::{Order, OrderAction, OrderStatus, StatusLabels};
use monei_sync::domain::payment::{PaymentRecord, PaymentStatus};
use monei_sync::services::signature::{sign, validate};
use proptest::prelude::*;
use serde_json::json;

fn arb_status() -> impl Strategy<Value = PaymentStatus> {
    proptest::sample::select(PaymentStatus::ALL.to_vec())
}

fn record_with(status: PaymentStatus, payment_id: &str) -> PaymentRecord {
    PaymentRecord::from_value(json!({
        "id": payment_id,
        "orderId": "100",
        "status": status.as_str(),
        "amount": 100,
        "currency": "EUR",
    }))
    .unwrap()
}

fn order_in(status: Option<PaymentStatus>, labels: &StatusLabels) -> Order {
    let now = chrono::Utc::now();
    Order {
        increment_id: monei_sync::domain::id::OrderId::new("100").unwrap(),
        store_id: 1,
        state: "pending_payment".into(),
        status: status
            .map(|s| OrderStatus::from(s).label(labels).to_string())
            .unwrap_or_else(|| "pending".into()),
        monei_payment_id: Some("pay_1".into()),
        created_at: now,
        updated_at: now,
    }
}

proptest! {
    /// Refunded, failed, canceled and expired payments never move again.
    #[test]
    fn dead_end_statuses_reject_all_transitions(target in arb_status()) {
        use PaymentStatus::*;
        for terminal in [Failed, Canceled, Expired, Refunded] {
            prop_assert!(!terminal.can_transition_to(&target));
        }
    }

    /// A random walk can never leave a successful payment for a failed one.
    #[test]
    fn random_walk_never_unsucceeds(
        steps in prop::collection::vec(arb_status(), 1..30)
    ) {
        let mut current = PaymentStatus::Pending;
        let mut succeeded = false;
        for next in &steps {
            if current.can_transition_to(next) {
                current = *next;
                succeeded |= current == PaymentStatus::Succeeded;
            }
            if succeeded {
                prop_assert!(
                    matches!(current, PaymentStatus::Succeeded | PaymentStatus::PartiallyRefunded | PaymentStatus::Refunded),
                    "walk left the captured branch: {steps:?}"
                );
            }
        }
    }

    #[test]
    fn status_parses_from_any_case(status in arb_status(), lower in any::<bool>()) {
        let text = if lower { status.as_str().to_lowercase() } else { status.as_str().to_string() };
        prop_assert_eq!(PaymentStatus::try_from(text.as_str()).unwrap(), status);
    }

    #[test]
    fn major_amount_is_cents_over_hundred(cents in 0i64..=1_000_000_000_000) {
        let amount = MoneyAmount::new(cents).unwrap();
        prop_assert_eq!(amount.as_major(), cents as f64 / 100.0);
    }

    #[test]
    fn negative_amounts_are_rejected(cents in i64::MIN..0) {
        prop_assert!(MoneyAmount::new(cents).is_err());
    }

    /// Applying a decision, then deciding again on the same record, is a no-op.
    #[test]
    fn decisions_are_idempotent(
        current in proptest::option::of(arb_status()),
        incoming in arb_status(),
    ) {
        let labels = StatusLabels::default();
        let mut order = order_in(current, &labels);
        let record = record_with(incoming, "pay_1");

        if let OrderAction::Apply { target, .. } = order.decide(&record, &labels) {
            order.apply(target, &record, &labels);
            prop_assert_eq!(order.decide(&record, &labels), OrderAction::AlreadyApplied);
        }
    }

    /// A failed attempt never changes the order.
    #[test]
    fn failed_payments_are_never_applied(current in proptest::option::of(arb_status())) {
        let labels = StatusLabels::default();
        let order = order_in(current, &labels);
        let action = order.decide(&record_with(PaymentStatus::Failed, "pay_1"), &labels);
        prop_assert!(!matches!(action, OrderAction::Apply { .. }), "failed payment produced Apply: {:?}", action);
    }

    /// Labels map back to the status they came from.
    #[test]
    fn labels_round_trip(status in arb_status()) {
        let labels = StatusLabels { confirmed: "paid".into(), pre_authorized: "on_hold".into() };
        let order_status = OrderStatus::from(status);
        prop_assert_eq!(
            OrderStatus::from_label(order_status.label(&labels), &labels),
            Some(order_status)
        );
    }

    #[test]
    fn any_body_validates_against_its_own_signature(
        body in ".{0,200}",
        ts in 0i64..4_000_000_000,
    ) {
        let sig = sign(&body, ts, "whsec");
        prop_assert!(validate(&body, &sig, "whsec"));
    }
}
