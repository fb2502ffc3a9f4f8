//! Reconciliation coordinator for the checkout flow.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::{AggregateId, Clock};
use domain::{
    AdvanceFulfilment, Aggregate, AwaitPayment, CancelOrder, CartSnapshot, ConfirmPayment,
    DomainError, FailPayment, InitiateAttempt, LineItem, MarkReserved, Money, Order, OrderError,
    OrderEvent, OrderNumber, OrderService, OrderStatus, PriceTolerance, ShippingAddress, StockKey,
};
use event_store::EventStore;
use inventory::{InventoryLedger, LedgerError, ReservationHandle, ReservationState, StockLevel};
use payment::{
    GatewayCallback, IntentStatus, IntentStore, PaymentError, PaymentGateway, PaymentIntent,
    PaymentIntentManager,
};
use serde::Serialize;

use crate::error::{CheckoutError, Result};
use crate::services::{CatalogService, ShippingService};

/// Actor recorded on cancellations the system performs by itself.
const SYSTEM_ACTOR: &str = "system";

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// ISO currency code sent to the payment gateway.
    pub currency: String,
    pub price_tolerance: PriceTolerance,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            currency: "INR".to_string(),
            price_tolerance: PriceTolerance::exact(),
        }
    }
}

/// What the customer needs to complete payment on the gateway's page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutTicket {
    pub attempt_id: AggregateId,
    pub gateway_order_id: String,
    pub amount: Money,
    pub currency: String,
    /// Stock is held until this instant.
    pub expires_at: DateTime<Utc>,
}

/// Result of a verified gateway callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallbackOutcome {
    pub attempt_id: AggregateId,
    pub order_number: OrderNumber,
    pub status: OrderStatus,
    /// The order had already been placed by an earlier delivery.
    pub replay: bool,
}

/// Counts from one pass of [`ReconciliationCoordinator::sweep_expired`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub expired_attempts: usize,
    pub released: usize,
    /// Attempts whose payment had been verified and were placed instead.
    pub finalised: usize,
    pub errors: usize,
}

enum Expiry {
    Released(usize),
    Finalised,
}

fn record_late_payment(attempt_id: AggregateId, detail: &str) {
    metrics::counter!("late_payments_total").increment(1);
    tracing::error!(
        %attempt_id,
        detail,
        "verified payment for an attempt that no longer holds stock; refund required"
    );
}

/// Orchestrates checkout across the order service, the inventory ledger
/// and the payment intent manager.
///
/// Stock is reserved before a payment intent exists and committed only
/// after the callback is verified. Every path that gives up an attempt
/// closes its payment intent first: the intent's compare-and-set decides
/// between a late callback and the canceller or expiry sweep, so at most
/// one of them acts on the stock.
pub struct ReconciliationCoordinator<S, L, G, P>
where
    S: EventStore,
    L: InventoryLedger,
    G: PaymentGateway,
    P: IntentStore,
{
    orders: OrderService<S>,
    ledger: L,
    payments: PaymentIntentManager<G, P>,
    catalog: Arc<dyn CatalogService>,
    shipping: Arc<dyn ShippingService>,
    config: CoordinatorConfig,
    clock: Arc<dyn Clock>,
}

impl<S, L, G, P> ReconciliationCoordinator<S, L, G, P>
where
    S: EventStore,
    L: InventoryLedger,
    G: PaymentGateway,
    P: IntentStore,
{
    pub fn new(
        orders: OrderService<S>,
        ledger: L,
        payments: PaymentIntentManager<G, P>,
        catalog: Arc<dyn CatalogService>,
        shipping: Arc<dyn ShippingService>,
        config: CoordinatorConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            orders,
            ledger,
            payments,
            catalog,
            shipping,
            config,
            clock,
        }
    }

    pub fn orders(&self) -> &OrderService<S> {
        &self.orders
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn payments(&self) -> &PaymentIntentManager<G, P> {
        &self.payments
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Starts checkout for a cart snapshot.
    ///
    /// Either every line is reserved and a payment intent exists, or the
    /// attempt ends cancelled with nothing held.
    #[tracing::instrument(skip(self, snapshot, address), fields(customer_id = %snapshot.customer_id()))]
    pub async fn checkout(
        &self,
        snapshot: CartSnapshot,
        address: ShippingAddress,
    ) -> Result<CheckoutTicket> {
        metrics::counter!("checkout_attempts_total").increment(1);
        let start = std::time::Instant::now();

        let result = self.run_checkout(snapshot, address).await;

        metrics::histogram!("checkout_duration_seconds").record(start.elapsed().as_secs_f64());
        if let Err(e) = &result {
            metrics::counter!("checkout_failures_total", "kind" => e.kind()).increment(1);
            tracing::info!(kind = e.kind(), error = %e, "checkout rejected");
        }
        result
    }

    async fn run_checkout(
        &self,
        snapshot: CartSnapshot,
        address: ShippingAddress,
    ) -> Result<CheckoutTicket> {
        self.validate_prices(&snapshot).await?;
        address.validate()?;

        let amount = snapshot.subtotal();
        let items = snapshot.items().to_vec();
        let cmd = InitiateAttempt::new(snapshot, address);
        let attempt_id = cmd.attempt_id;
        self.orders.initiate_attempt(cmd).await?;
        tracing::info!(%attempt_id, %amount, "checkout attempt initiated");

        let handles = match self.reserve_all(attempt_id, &items).await {
            Ok(handles) => handles,
            Err(e) => {
                self.abandon(attempt_id, &[], &e).await;
                return Err(e);
            }
        };

        match self.request_payment(attempt_id, amount, &handles).await {
            Ok(ticket) => {
                tracing::info!(
                    %attempt_id,
                    gateway_order_id = %ticket.gateway_order_id,
                    "awaiting payment"
                );
                Ok(ticket)
            }
            Err(e) => {
                self.abandon(attempt_id, &handles, &e).await;
                Err(e)
            }
        }
    }

    async fn validate_prices(&self, snapshot: &CartSnapshot) -> Result<()> {
        for item in snapshot.items() {
            let Some(current) = self.catalog.current_price(&item.product_id).await? else {
                return Err(CheckoutError::StaleCart {
                    product_id: item.product_id.clone(),
                    reason: "no longer sold".to_string(),
                });
            };
            if !self
                .config
                .price_tolerance
                .is_within(item.unit_price, current)
            {
                return Err(CheckoutError::StaleCart {
                    product_id: item.product_id.clone(),
                    reason: format!("price changed from {} to {current}", item.unit_price),
                });
            }

            if let Some(hint) = self.catalog.stock_hint(&item.stock_key()).await?
                && hint < item.quantity
            {
                tracing::debug!(
                    key = %item.stock_key(),
                    hint,
                    requested = item.quantity,
                    "catalog shows low stock, ledger decides"
                );
            }
        }
        Ok(())
    }

    /// Reserves every line or nothing.
    async fn reserve_all(
        &self,
        attempt_id: AggregateId,
        items: &[LineItem],
    ) -> Result<Vec<ReservationHandle>> {
        let mut handles = Vec::with_capacity(items.len());
        for item in items {
            match self
                .ledger
                .reserve(&item.stock_key(), item.quantity, attempt_id)
                .await
            {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    self.release_handles(&handles).await;
                    return Err(e.into());
                }
            }
        }
        Ok(handles)
    }

    async fn request_payment(
        &self,
        attempt_id: AggregateId,
        amount: Money,
        handles: &[ReservationHandle],
    ) -> Result<CheckoutTicket> {
        self.orders
            .mark_reserved(MarkReserved {
                attempt_id,
                reservation_ids: handles.iter().map(|h| h.id).collect(),
            })
            .await?;

        let intent = self
            .payments
            .create_intent(amount, &self.config.currency, attempt_id)
            .await?;
        self.payments.mark_awaiting_callback(attempt_id).await?;

        self.orders
            .await_payment(AwaitPayment {
                attempt_id,
                gateway_order_id: intent.gateway_order_id.clone(),
                amount,
            })
            .await?;

        let expires_at = handles
            .iter()
            .map(|h| h.expires_at)
            .min()
            .unwrap_or_else(|| self.clock.now());

        Ok(CheckoutTicket {
            attempt_id,
            gateway_order_id: intent.gateway_order_id,
            amount: intent.amount,
            currency: intent.currency,
            expires_at,
        })
    }

    /// Undoes a checkout that could not reach `AwaitingPayment`.
    async fn abandon(
        &self,
        attempt_id: AggregateId,
        handles: &[ReservationHandle],
        cause: &CheckoutError,
    ) {
        if let Err(e) = self.payments.fail_intent(attempt_id).await {
            tracing::warn!(%attempt_id, error = %e, "failed to close payment intent");
        }
        self.release_handles(handles).await;

        let cancelled = self
            .orders
            .cancel(CancelOrder {
                attempt_id,
                reason: cause.kind().to_string(),
                cancelled_by: Some(SYSTEM_ACTOR.to_string()),
            })
            .await;
        if let Err(e) = cancelled {
            tracing::warn!(%attempt_id, error = %e, "failed to cancel abandoned attempt");
        }
    }

    async fn release_handles(&self, handles: &[ReservationHandle]) {
        for handle in handles {
            if let Err(e) = self.ledger.release(handle).await {
                tracing::warn!(reservation_id = %handle.id, error = %e, "failed to release reservation");
            }
        }
    }

    /// Verifies a gateway callback and places the order exactly once.
    ///
    /// Duplicate deliveries return the already placed order with
    /// `replay = true` and have no further side effects.
    #[tracing::instrument(
        skip(self, callback),
        fields(gateway_order_id = %callback.gateway_order_id)
    )]
    pub async fn handle_callback(&self, callback: &GatewayCallback) -> Result<CallbackOutcome> {
        let verified = match self.payments.verify_callback(callback).await {
            Ok(verified) => verified,
            Err(PaymentError::IntentClosed(detail)) => {
                if let Ok(Some(intent)) = self
                    .payments
                    .store()
                    .find_by_gateway_order(&callback.gateway_order_id)
                    .await
                {
                    record_late_payment(intent.attempt_id, &detail);
                }
                return Err(CheckoutError::PaymentClosed(detail));
            }
            Err(e) => return Err(e.into()),
        };

        self.finalise(&verified.intent, &verified.payment_id).await
    }

    /// Commits the attempt's stock and confirms the order.
    ///
    /// Safe to repeat: committed reservations stay committed and an order
    /// that is already placed is returned as a replay.
    async fn finalise(&self, intent: &PaymentIntent, payment_id: &str) -> Result<CallbackOutcome> {
        let attempt_id = intent.attempt_id;
        let order = self.require_attempt(attempt_id).await?;
        if order.is_placed() {
            return placed(&order, true);
        }

        match order.status() {
            OrderStatus::AwaitingPayment => {}
            OrderStatus::Reserved => {
                // The intent was created but the attempt never recorded it.
                self.orders
                    .await_payment(AwaitPayment {
                        attempt_id,
                        gateway_order_id: intent.gateway_order_id.clone(),
                        amount: intent.amount,
                    })
                    .await?;
            }
            OrderStatus::Cancelled | OrderStatus::PaymentFailed => {
                record_late_payment(attempt_id, order.status().as_str());
                return Err(CheckoutError::PaymentClosed(format!(
                    "attempt {attempt_id} is {}",
                    order.status()
                )));
            }
            other => {
                return Err(CheckoutError::InvalidTransition {
                    from: other,
                    to: OrderStatus::Confirmed,
                });
            }
        }

        for reservation in self.ledger.reservations_for_attempt(attempt_id).await? {
            match self.ledger.commit(&reservation.handle).await {
                Ok(()) => {}
                Err(LedgerError::ReservationSettled { .. }) => {
                    record_late_payment(attempt_id, "reservation already released");
                    return Err(CheckoutError::PaymentClosed(format!(
                        "stock for attempt {attempt_id} was already released"
                    )));
                }
                Err(e) => return Err(e.into()),
            }
        }

        let confirmed = self
            .orders
            .confirm_payment(ConfirmPayment {
                attempt_id,
                gateway_order_id: intent.gateway_order_id.clone(),
                payment_reference: payment_id.to_string(),
            })
            .await;
        let order = match confirmed {
            Ok(result) => result.aggregate,
            Err(e) if e.is_invalid_transition() => {
                // A concurrent delivery of the same payment may have won.
                let current = self.require_attempt(attempt_id).await?;
                if current.is_placed() {
                    return placed(&current, true);
                }
                return Err(transition_error(attempt_id, e));
            }
            Err(e) => return Err(e.into()),
        };

        let outcome = placed(&order, false)?;
        tracing::info!(%attempt_id, order_number = %outcome.order_number, "order placed");
        if let Err(e) = self
            .shipping
            .order_confirmed(&outcome.order_number, attempt_id)
            .await
        {
            tracing::warn!(order_number = %outcome.order_number, error = %e, "shipping notification failed");
        }
        Ok(outcome)
    }

    /// Cancels an attempt or order and returns its stock.
    ///
    /// Held reservations are released. Stock of an order that was already
    /// confirmed goes back on hand.
    #[tracing::instrument(skip(self, reason))]
    pub async fn cancel_attempt(
        &self,
        attempt_id: AggregateId,
        reason: String,
        cancelled_by: Option<String>,
    ) -> Result<Order> {
        let order = self.require_attempt(attempt_id).await?;
        if !order.status().can_cancel() {
            return Err(transition_error(
                attempt_id,
                DomainError::Order(OrderError::InvalidTransition {
                    from: order.status(),
                    to: OrderStatus::Cancelled,
                }),
            ));
        }

        if !order.is_placed() && !self.payments.fail_intent(attempt_id).await? {
            // Not open any more. If a callback verified it, place the order
            // first so the cancellation below restocks what was committed.
            if let Some(intent) = self.payments.get_intent(attempt_id).await?
                && intent.status == IntentStatus::Verified
                && let Some(payment_id) = intent.gateway_payment_id.as_deref()
            {
                tracing::info!(%attempt_id, "payment verified before cancellation");
                self.finalise(&intent, payment_id).await?;
            }
        }

        let result = self
            .orders
            .cancel(CancelOrder {
                attempt_id,
                reason,
                cancelled_by,
            })
            .await
            .map_err(|e| transition_error(attempt_id, e))?;

        let previous = result
            .events
            .iter()
            .find_map(|event| match event {
                OrderEvent::OrderCancelled(data) => Some(data.previous_status),
                _ => None,
            })
            .unwrap_or(order.status());
        self.compensate(attempt_id, previous).await?;

        tracing::info!(%attempt_id, %previous, "order cancelled");
        Ok(result.aggregate)
    }

    /// Cancels a placed order by its customer-facing number.
    pub async fn cancel_order(
        &self,
        order_number: &OrderNumber,
        reason: String,
        cancelled_by: Option<String>,
    ) -> Result<Order> {
        let order = self.require_order(order_number).await?;
        let attempt_id = attempt_id_of(&order)?;
        self.cancel_attempt(attempt_id, reason, cancelled_by).await
    }

    async fn compensate(&self, attempt_id: AggregateId, previous: OrderStatus) -> Result<()> {
        let placed = previous == OrderStatus::Confirmed || previous.is_fulfilment();
        for reservation in self.ledger.reservations_for_attempt(attempt_id).await? {
            match (placed, reservation.state) {
                (false, ReservationState::Reserved) => {
                    self.ledger.release(&reservation.handle).await?;
                }
                (true, ReservationState::Committed) => {
                    self.ledger
                        .restock(&reservation.handle.key, reservation.handle.quantity)
                        .await?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Moves a placed order along the fulfilment statuses.
    #[tracing::instrument(skip(self, note))]
    pub async fn advance_fulfilment(
        &self,
        order_number: &OrderNumber,
        status: OrderStatus,
        note: Option<String>,
    ) -> Result<Order> {
        let order = self.require_order(order_number).await?;
        let attempt_id = attempt_id_of(&order)?;
        let result = self
            .orders
            .advance_fulfilment(AdvanceFulfilment {
                attempt_id,
                status,
                note,
            })
            .await
            .map_err(|e| transition_error(attempt_id, e))?;
        Ok(result.aggregate)
    }

    /// Settles every attempt with an expired reservation.
    ///
    /// An attempt whose intent can still be closed loses its stock and ends
    /// `PaymentFailed`. One whose payment was verified in the meantime is
    /// placed instead. Failures are counted per attempt and do not stop the
    /// sweep.
    #[tracing::instrument(skip(self))]
    pub async fn sweep_expired(&self) -> Result<SweepReport> {
        let now = self.clock.now();
        let mut by_attempt: BTreeMap<AggregateId, Vec<ReservationHandle>> = BTreeMap::new();
        for handle in self.ledger.expired(now).await? {
            by_attempt.entry(handle.attempt_id).or_default().push(handle);
        }

        let mut report = SweepReport::default();
        for attempt_id in by_attempt.into_keys() {
            report.expired_attempts += 1;
            match self.expire_attempt(attempt_id).await {
                Ok(Expiry::Released(count)) => report.released += count,
                Ok(Expiry::Finalised) => report.finalised += 1,
                Err(e) => {
                    report.errors += 1;
                    tracing::error!(%attempt_id, error = %e, "failed to settle expired attempt");
                }
            }
        }

        if report.released > 0 {
            metrics::counter!("reservations_expired_total").increment(report.released as u64);
        }
        if report.expired_attempts > 0 {
            tracing::info!(
                attempts = report.expired_attempts,
                released = report.released,
                finalised = report.finalised,
                errors = report.errors,
                "expired reservations swept"
            );
        }
        Ok(report)
    }

    async fn expire_attempt(&self, attempt_id: AggregateId) -> Result<Expiry> {
        if !self.payments.fail_intent(attempt_id).await?
            && let Some(intent) = self.payments.get_intent(attempt_id).await?
            && intent.status == IntentStatus::Verified
            && let Some(payment_id) = intent.gateway_payment_id.as_deref()
        {
            self.finalise(&intent, payment_id).await?;
            return Ok(Expiry::Finalised);
        }

        let mut released = 0;
        for reservation in self.ledger.reservations_for_attempt(attempt_id).await? {
            if reservation.state == ReservationState::Reserved {
                self.ledger.release(&reservation.handle).await?;
                released += 1;
            }
        }

        let Some(order) = self.orders.get_attempt(attempt_id).await? else {
            return Ok(Expiry::Released(released));
        };
        let settled = match order.status() {
            OrderStatus::AwaitingPayment => self
                .orders
                .fail_payment(FailPayment {
                    attempt_id,
                    reason: "reservation expired".to_string(),
                })
                .await
                .map(|_| ()),
            OrderStatus::AttemptInitiated | OrderStatus::Reserved => self
                .orders
                .cancel(CancelOrder {
                    attempt_id,
                    reason: "checkout abandoned".to_string(),
                    cancelled_by: Some(SYSTEM_ACTOR.to_string()),
                })
                .await
                .map(|_| ()),
            _ => Ok(()),
        };
        if let Err(e) = settled {
            // The stock is already back; a concurrent writer moved the order.
            tracing::warn!(%attempt_id, error = %e, "expired attempt changed concurrently");
        }

        Ok(Expiry::Released(released))
    }

    pub async fn get_attempt(&self, attempt_id: AggregateId) -> Result<Order> {
        self.require_attempt(attempt_id).await
    }

    pub async fn get_order(&self, order_number: &OrderNumber) -> Result<Order> {
        self.require_order(order_number).await
    }

    pub async fn list_orders(&self) -> Result<Vec<Order>> {
        Ok(self.orders.list_orders().await?)
    }

    pub async fn stock_level(&self, key: &StockKey) -> Result<StockLevel> {
        Ok(self.ledger.stock_level(key).await?)
    }

    async fn require_attempt(&self, attempt_id: AggregateId) -> Result<Order> {
        self.orders
            .get_attempt(attempt_id)
            .await?
            .ok_or_else(|| CheckoutError::NotFound(format!("attempt {attempt_id}")))
    }

    async fn require_order(&self, order_number: &OrderNumber) -> Result<Order> {
        self.orders
            .find_by_order_number(order_number)
            .await?
            .ok_or_else(|| CheckoutError::NotFound(format!("order {order_number}")))
    }
}

fn placed(order: &Order, replay: bool) -> Result<CallbackOutcome> {
    let attempt_id = attempt_id_of(order)?;
    let order_number = order
        .order_number()
        .cloned()
        .ok_or_else(|| CheckoutError::NotFound(format!("order number for {attempt_id}")))?;
    Ok(CallbackOutcome {
        attempt_id,
        order_number,
        status: order.status(),
        replay,
    })
}

fn attempt_id_of(order: &Order) -> Result<AggregateId> {
    order
        .id()
        .ok_or_else(|| CheckoutError::NotFound("attempt without id".to_string()))
}

fn transition_error(attempt_id: AggregateId, e: DomainError) -> CheckoutError {
    if e.is_invalid_transition() {
        tracing::error!(%attempt_id, error = %e, "order transition rejected");
    }
    e.into()
}
