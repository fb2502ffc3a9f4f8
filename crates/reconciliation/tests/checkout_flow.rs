//! End-to-end checkout flows over in-memory stores.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use common::{Clock, ManualClock};
use domain::{
    CartSnapshot, CustomerId, LineItem, Money, OrderService, OrderStatus, ShippingAddress,
    StockKey,
};
use event_store::InMemoryEventStore;
use inventory::{InMemoryInventoryLedger, InventoryLedger, ReservationPolicy};
use payment::{
    GatewayCallback, InMemoryIntentStore, InMemoryPaymentGateway, IntentStatus,
    PaymentIntentManager, signature,
};
use reconciliation::{
    CheckoutError, CheckoutTicket, CoordinatorConfig, ExpirySweeper, InMemoryCatalog,
    InMemoryShippingService, ReconciliationCoordinator,
};
use secrecy::SecretString;

const SECRET: &str = "whsec_checkout_tests";

type Coordinator = ReconciliationCoordinator<
    InMemoryEventStore,
    InMemoryInventoryLedger,
    InMemoryPaymentGateway,
    InMemoryIntentStore,
>;

struct Harness {
    coordinator: Arc<Coordinator>,
    clock: ManualClock,
    catalog: InMemoryCatalog,
    shipping: InMemoryShippingService,
}

fn tee() -> StockKey {
    StockKey::new("TEE-01", "M")
}

fn cap() -> StockKey {
    StockKey::new("CAP-02", "L")
}

fn sock() -> StockKey {
    StockKey::new("SOCK-03", "S")
}

async fn harness(stock: &[(StockKey, u32)]) -> Harness {
    let clock = ManualClock::new(Utc::now());
    let shared: Arc<dyn Clock> = Arc::new(clock.clone());

    let catalog = InMemoryCatalog::new();
    catalog.set_price("TEE-01", Money::from_paise(49_900)).await;
    catalog.set_price("CAP-02", Money::from_paise(29_900)).await;
    catalog.set_price("SOCK-03", Money::from_paise(9_900)).await;

    let ledger = InMemoryInventoryLedger::new(ReservationPolicy::default(), shared.clone());
    for (key, count) in stock {
        ledger.seed(key, *count).await.unwrap();
    }

    let payments = PaymentIntentManager::with_clock(
        InMemoryPaymentGateway::new(),
        InMemoryIntentStore::new(),
        SecretString::from(SECRET),
        shared.clone(),
    );
    let shipping = InMemoryShippingService::new();

    let coordinator = ReconciliationCoordinator::new(
        OrderService::with_clock(InMemoryEventStore::new(), shared.clone()),
        ledger,
        payments,
        Arc::new(catalog.clone()),
        Arc::new(shipping.clone()),
        CoordinatorConfig::default(),
        shared,
    );

    Harness {
        coordinator: Arc::new(coordinator),
        clock,
        catalog,
        shipping,
    }
}

fn address() -> ShippingAddress {
    ShippingAddress {
        full_name: "Asha Rao".to_string(),
        line1: "12 MG Road".to_string(),
        line2: None,
        city: "Bengaluru".to_string(),
        state: "KA".to_string(),
        postal_code: "560001".to_string(),
        country: "IN".to_string(),
        phone: "+919800000000".to_string(),
    }
}

fn cart(lines: &[(&str, &str, u32, i64)]) -> CartSnapshot {
    let items = lines
        .iter()
        .map(|(product, size, qty, paise)| {
            LineItem::new(*product, *size, *qty, Money::from_paise(*paise))
        })
        .collect();
    CartSnapshot::new(CustomerId::new("cust-42"), items, Utc::now()).unwrap()
}

fn one_tee() -> CartSnapshot {
    cart(&[("TEE-01", "M", 1, 49_900)])
}

fn callback(ticket: &CheckoutTicket, payment_id: &str) -> GatewayCallback {
    GatewayCallback {
        gateway_order_id: ticket.gateway_order_id.clone(),
        gateway_payment_id: payment_id.to_string(),
        signature: signature::sign(
            &SecretString::from(SECRET),
            &ticket.gateway_order_id,
            payment_id,
        ),
        amount: Some(ticket.amount),
    }
}

#[tokio::test]
async fn paid_checkout_places_order_and_commits_stock() {
    let h = harness(&[(tee(), 1)]).await;

    let ticket = h.coordinator.checkout(one_tee(), address()).await.unwrap();
    assert_eq!(ticket.amount, Money::from_paise(49_900));
    assert_eq!(ticket.currency, "INR");
    assert_eq!(ticket.expires_at, h.clock.now() + Duration::minutes(15));

    let attempt = h.coordinator.get_attempt(ticket.attempt_id).await.unwrap();
    assert_eq!(attempt.status(), OrderStatus::AwaitingPayment);
    let level = h.coordinator.stock_level(&tee()).await.unwrap();
    assert_eq!((level.on_hand, level.reserved), (1, 1));

    let outcome = h
        .coordinator
        .handle_callback(&callback(&ticket, "pay_001"))
        .await
        .unwrap();
    assert!(!outcome.replay);
    assert_eq!(outcome.status, OrderStatus::Confirmed);

    let order = h.coordinator.get_order(&outcome.order_number).await.unwrap();
    assert_eq!(order.payment_reference(), Some("pay_001"));
    let statuses: Vec<_> = order.history().iter().map(|e| e.status).collect();
    assert_eq!(
        statuses,
        vec![
            OrderStatus::AttemptInitiated,
            OrderStatus::Reserved,
            OrderStatus::AwaitingPayment,
            OrderStatus::Confirmed,
        ]
    );

    let level = h.coordinator.stock_level(&tee()).await.unwrap();
    assert_eq!((level.on_hand, level.reserved), (0, 0));
    assert_eq!(h.shipping.notified().await, vec![outcome.order_number]);
}

#[tokio::test]
async fn duplicate_callback_places_one_order() {
    let h = harness(&[(tee(), 1)]).await;
    let ticket = h.coordinator.checkout(one_tee(), address()).await.unwrap();
    let delivery = callback(&ticket, "pay_dup");

    let first = h.coordinator.handle_callback(&delivery).await.unwrap();
    let second = h.coordinator.handle_callback(&delivery).await.unwrap();

    assert!(!first.replay);
    assert!(second.replay);
    assert_eq!(first.order_number, second.order_number);
    assert_eq!(h.coordinator.list_orders().await.unwrap().len(), 1);
    assert_eq!(h.shipping.notified().await.len(), 1);

    let level = h.coordinator.stock_level(&tee()).await.unwrap();
    assert_eq!((level.on_hand, level.reserved), (0, 0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_duplicate_callbacks_place_one_order() {
    let h = harness(&[(tee(), 1)]).await;
    let ticket = h.coordinator.checkout(one_tee(), address()).await.unwrap();
    let delivery = callback(&ticket, "pay_race");

    let tasks: Vec<_> = (0..4)
        .map(|_| {
            let coordinator = h.coordinator.clone();
            let delivery = delivery.clone();
            tokio::spawn(async move { coordinator.handle_callback(&delivery).await })
        })
        .collect();
    let outcomes: Vec<_> = futures_util::future::join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    assert_eq!(outcomes.iter().filter(|o| !o.replay).count(), 1);
    assert!(
        outcomes
            .iter()
            .all(|o| o.order_number == outcomes[0].order_number)
    );
    assert_eq!(h.shipping.notified().await.len(), 1);
    assert_eq!(
        h.coordinator.stock_level(&tee()).await.unwrap().on_hand,
        0
    );
}

#[tokio::test]
async fn expired_reservation_fails_payment_and_restores_stock() {
    let h = harness(&[(tee(), 1)]).await;
    let ticket = h.coordinator.checkout(one_tee(), address()).await.unwrap();

    h.clock.advance(Duration::minutes(16));
    let report = h.coordinator.sweep_expired().await.unwrap();
    assert_eq!(report.expired_attempts, 1);
    assert_eq!(report.released, 1);
    assert_eq!(report.errors, 0);

    let attempt = h.coordinator.get_attempt(ticket.attempt_id).await.unwrap();
    assert_eq!(attempt.status(), OrderStatus::PaymentFailed);
    let level = h.coordinator.stock_level(&tee()).await.unwrap();
    assert_eq!((level.on_hand, level.reserved), (1, 0));

    // The customer pays after all; nothing is committed.
    let err = h
        .coordinator
        .handle_callback(&callback(&ticket, "pay_late"))
        .await
        .unwrap_err();
    assert!(matches!(err, CheckoutError::PaymentClosed(_)));
    assert_eq!(h.coordinator.stock_level(&tee()).await.unwrap().reserved, 0);
    assert!(h.coordinator.list_orders().await.unwrap().is_empty());
}

#[tokio::test]
async fn sweep_before_expiry_leaves_attempt_alone() {
    let h = harness(&[(tee(), 1)]).await;
    let ticket = h.coordinator.checkout(one_tee(), address()).await.unwrap();

    h.clock.advance(Duration::minutes(14));
    let report = h.coordinator.sweep_expired().await.unwrap();

    assert_eq!(report.expired_attempts, 0);
    let attempt = h.coordinator.get_attempt(ticket.attempt_id).await.unwrap();
    assert_eq!(attempt.status(), OrderStatus::AwaitingPayment);
}

#[tokio::test]
async fn sweep_places_order_whose_payment_was_already_verified() {
    let h = harness(&[(tee(), 1)]).await;
    let ticket = h.coordinator.checkout(one_tee(), address()).await.unwrap();

    // Verified but not yet finalised, as after a crash mid-callback.
    h.coordinator
        .payments()
        .verify_callback(&callback(&ticket, "pay_crash"))
        .await
        .unwrap();

    h.clock.advance(Duration::minutes(16));
    let report = h.coordinator.sweep_expired().await.unwrap();
    assert_eq!(report.finalised, 1);
    assert_eq!(report.released, 0);

    let attempt = h.coordinator.get_attempt(ticket.attempt_id).await.unwrap();
    assert_eq!(attempt.status(), OrderStatus::Confirmed);
    assert_eq!(h.coordinator.stock_level(&tee()).await.unwrap().on_hand, 0);
}

#[tokio::test]
async fn failed_line_releases_earlier_lines() {
    let h = harness(&[(tee(), 5), (cap(), 5), (sock(), 0)]).await;
    let snapshot = cart(&[
        ("TEE-01", "M", 2, 49_900),
        ("CAP-02", "L", 1, 29_900),
        ("SOCK-03", "S", 1, 9_900),
    ]);

    let err = h.coordinator.checkout(snapshot, address()).await.unwrap_err();

    assert!(matches!(err, CheckoutError::InsufficientStock { .. }));
    assert!(err.is_retryable());
    assert_eq!(h.coordinator.ledger().open_reservations().await, 0);
    for key in [tee(), cap(), sock()] {
        assert_eq!(h.coordinator.stock_level(&key).await.unwrap().reserved, 0);
    }
    assert!(h.coordinator.payments().gateway().orders().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn last_unit_goes_to_one_customer() {
    let h = harness(&[(tee(), 1)]).await;

    let tasks: Vec<_> = (0..5)
        .map(|_| {
            let coordinator = h.coordinator.clone();
            tokio::spawn(async move { coordinator.checkout(one_tee(), address()).await })
        })
        .collect();
    let results: Vec<_> = futures_util::future::join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(
        results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| e.kind() == "insufficient_stock")
    );
    assert_eq!(h.coordinator.stock_level(&tee()).await.unwrap().reserved, 1);
}

#[tokio::test]
async fn stale_price_is_rejected_before_reserving() {
    let h = harness(&[(tee(), 3)]).await;
    h.catalog.set_price("TEE-01", Money::from_paise(54_900)).await;

    let err = h
        .coordinator
        .checkout(one_tee(), address())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "stale_cart");
    assert!(!err.is_retryable());
    assert_eq!(h.coordinator.ledger().open_reservations().await, 0);
}

#[tokio::test]
async fn price_within_tolerance_is_accepted() {
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::default());
    let catalog = InMemoryCatalog::new();
    catalog.set_price("TEE-01", Money::from_paise(49_950)).await;
    let ledger = InMemoryInventoryLedger::new(ReservationPolicy::default(), clock.clone());
    ledger.seed(&tee(), 1).await.unwrap();
    let coordinator = ReconciliationCoordinator::new(
        OrderService::with_clock(InMemoryEventStore::new(), clock.clone()),
        ledger,
        PaymentIntentManager::with_clock(
            InMemoryPaymentGateway::new(),
            InMemoryIntentStore::new(),
            SecretString::from(SECRET),
            clock.clone(),
        ),
        Arc::new(catalog),
        Arc::new(InMemoryShippingService::new()),
        CoordinatorConfig {
            currency: "INR".to_string(),
            price_tolerance: domain::PriceTolerance::new(Money::from_paise(100)),
        },
        clock,
    );

    let ticket = coordinator.checkout(one_tee(), address()).await.unwrap();
    // The customer pays the price they saw.
    assert_eq!(ticket.amount, Money::from_paise(49_900));
}

#[tokio::test]
async fn gateway_outage_is_retryable_and_holds_nothing() {
    let h = harness(&[(tee(), 1)]).await;
    h.coordinator.payments().gateway().set_unavailable(true);

    let err = h
        .coordinator
        .checkout(one_tee(), address())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "gateway_unavailable");
    assert!(err.is_retryable());
    let level = h.coordinator.stock_level(&tee()).await.unwrap();
    assert_eq!((level.on_hand, level.reserved), (1, 0));

    h.coordinator.payments().gateway().set_unavailable(false);
    h.coordinator.checkout(one_tee(), address()).await.unwrap();
}

#[tokio::test]
async fn invalid_address_creates_no_attempt() {
    let h = harness(&[(tee(), 1)]).await;
    let mut bad = address();
    bad.postal_code = "  ".to_string();

    let err = h.coordinator.checkout(one_tee(), bad).await.unwrap_err();

    assert!(matches!(
        err,
        CheckoutError::InvalidAddress {
            field: "postal_code"
        }
    ));
    assert_eq!(h.coordinator.ledger().open_reservations().await, 0);
}

#[tokio::test]
async fn forged_callback_changes_nothing() {
    let h = harness(&[(tee(), 1)]).await;
    let ticket = h.coordinator.checkout(one_tee(), address()).await.unwrap();

    let mut forged = callback(&ticket, "pay_forged");
    forged.signature = "00".repeat(32);
    let err = h.coordinator.handle_callback(&forged).await.unwrap_err();
    assert!(err.is_security_relevant());

    let mut underpaid = callback(&ticket, "pay_cheap");
    underpaid.amount = Some(Money::from_paise(100));
    let err = h.coordinator.handle_callback(&underpaid).await.unwrap_err();
    assert_eq!(err.kind(), "amount_mismatch");

    let attempt = h.coordinator.get_attempt(ticket.attempt_id).await.unwrap();
    assert_eq!(attempt.status(), OrderStatus::AwaitingPayment);
    assert_eq!(h.coordinator.stock_level(&tee()).await.unwrap().reserved, 1);

    // The genuine callback still goes through.
    h.coordinator
        .handle_callback(&callback(&ticket, "pay_real"))
        .await
        .unwrap();
}

#[tokio::test]
async fn cancelling_unpaid_attempt_releases_stock_and_rejects_payment() {
    let h = harness(&[(tee(), 1)]).await;
    let ticket = h.coordinator.checkout(one_tee(), address()).await.unwrap();

    let order = h
        .coordinator
        .cancel_attempt(
            ticket.attempt_id,
            "changed my mind".to_string(),
            Some("cust-42".to_string()),
        )
        .await
        .unwrap();
    assert_eq!(order.status(), OrderStatus::Cancelled);
    let level = h.coordinator.stock_level(&tee()).await.unwrap();
    assert_eq!((level.on_hand, level.reserved), (1, 0));

    let intent = h
        .coordinator
        .payments()
        .get_intent(ticket.attempt_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(intent.status, IntentStatus::Failed);

    let err = h
        .coordinator
        .handle_callback(&callback(&ticket, "pay_after_cancel"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "payment_closed");
    assert_eq!(h.coordinator.stock_level(&tee()).await.unwrap().on_hand, 1);
}

#[tokio::test]
async fn cancelling_confirmed_order_restocks() {
    let h = harness(&[(tee(), 2)]).await;
    let snapshot = cart(&[("TEE-01", "M", 2, 49_900)]);
    let ticket = h.coordinator.checkout(snapshot, address()).await.unwrap();
    let outcome = h
        .coordinator
        .handle_callback(&callback(&ticket, "pay_002"))
        .await
        .unwrap();
    assert_eq!(h.coordinator.stock_level(&tee()).await.unwrap().on_hand, 0);

    let order = h
        .coordinator
        .cancel_order(&outcome.order_number, "out of town".to_string(), None)
        .await
        .unwrap();

    assert_eq!(order.status(), OrderStatus::Cancelled);
    let level = h.coordinator.stock_level(&tee()).await.unwrap();
    assert_eq!((level.on_hand, level.reserved), (2, 0));
}

#[tokio::test]
async fn fulfilment_never_moves_backwards() {
    let h = harness(&[(tee(), 1)]).await;
    let ticket = h.coordinator.checkout(one_tee(), address()).await.unwrap();
    let outcome = h
        .coordinator
        .handle_callback(&callback(&ticket, "pay_003"))
        .await
        .unwrap();
    let number = outcome.order_number;

    h.coordinator
        .advance_fulfilment(&number, OrderStatus::Shipped, Some("AWB 1234".to_string()))
        .await
        .unwrap();

    let err = h
        .coordinator
        .advance_fulfilment(&number, OrderStatus::Packed, None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CheckoutError::InvalidTransition {
            from: OrderStatus::Shipped,
            to: OrderStatus::Packed
        }
    ));

    let err = h
        .coordinator
        .cancel_order(&number, "too late".to_string(), None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "invalid_transition");

    let order = h.coordinator.get_order(&number).await.unwrap();
    assert_eq!(order.status(), OrderStatus::Shipped);
    assert_eq!(order.history().last().and_then(|e| e.note.as_deref()), Some("AWB 1234"));
}

#[tokio::test]
async fn shipping_failure_does_not_undo_confirmation() {
    let h = harness(&[(tee(), 1)]).await;
    h.shipping.set_failing(true).await;
    let ticket = h.coordinator.checkout(one_tee(), address()).await.unwrap();

    let outcome = h
        .coordinator
        .handle_callback(&callback(&ticket, "pay_004"))
        .await
        .unwrap();

    assert_eq!(outcome.status, OrderStatus::Confirmed);
    assert!(h.shipping.notified().await.is_empty());
}

#[tokio::test]
async fn unknown_order_number_is_not_found() {
    let h = harness(&[]).await;
    let err = h
        .coordinator
        .get_order(&domain::OrderNumber::parse("ORD-20250101-DEADBEEF"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "not_found");
}

#[tokio::test]
async fn background_sweeper_expires_attempts_until_shut_down() {
    let h = harness(&[(tee(), 1)]).await;
    let ticket = h.coordinator.checkout(one_tee(), address()).await.unwrap();
    h.clock.advance(Duration::minutes(16));

    let (sweeper, handle) = ExpirySweeper::new(h.coordinator.clone(), StdDuration::from_millis(10));
    let task = tokio::spawn(sweeper.run());

    let mut status = OrderStatus::AwaitingPayment;
    for _ in 0..100 {
        status = h
            .coordinator
            .get_attempt(ticket.attempt_id)
            .await
            .unwrap()
            .status();
        if status == OrderStatus::PaymentFailed {
            break;
        }
        tokio::time::sleep(StdDuration::from_millis(10)).await;
    }
    assert_eq!(status, OrderStatus::PaymentFailed);

    assert!(handle.shutdown().await);
    task.await.unwrap();
    assert!(!handle.shutdown().await);
}
