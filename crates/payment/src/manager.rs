use std::sync::Arc;

use common::{AggregateId, Clock, SystemClock};
use domain::Money;
use secrecy::SecretString;

use crate::error::{PaymentError, Result};
use crate::gateway::PaymentGateway;
use crate::intent::{GatewayCallback, IntentStatus, PaymentIntent, VerifiedPayment};
use crate::signature;
use crate::store::IntentStore;

fn record_callback(outcome: &'static str) {
    metrics::counter!("payment_callbacks_total", "outcome" => outcome).increment(1);
}

/// Creates payment intents and verifies gateway callbacks.
///
/// Verification is idempotent per `(gateway_order_id, gateway_payment_id)`:
/// the first valid delivery moves the intent to `Verified`, later
/// deliveries of the same pair come back as a replay.
pub struct PaymentIntentManager<G, S>
where
    G: PaymentGateway,
    S: IntentStore,
{
    gateway: G,
    store: S,
    webhook_secret: SecretString,
    clock: Arc<dyn Clock>,
}

impl<G, S> PaymentIntentManager<G, S>
where
    G: PaymentGateway,
    S: IntentStore,
{
    pub fn new(gateway: G, store: S, webhook_secret: SecretString) -> Self {
        Self::with_clock(gateway, store, webhook_secret, Arc::new(SystemClock))
    }

    pub fn with_clock(
        gateway: G,
        store: S,
        webhook_secret: SecretString,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            gateway,
            store,
            webhook_secret,
            clock,
        }
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Creates a gateway order and records the intent for `attempt_id`.
    #[tracing::instrument(skip(self), fields(amount = %amount))]
    pub async fn create_intent(
        &self,
        amount: Money,
        currency: &str,
        attempt_id: AggregateId,
    ) -> Result<PaymentIntent> {
        if !amount.is_positive() {
            return Err(PaymentError::InvalidAmount(format!(
                "amount must be positive, got {amount}"
            )));
        }

        let order = self
            .gateway
            .create_order(amount, currency, &attempt_id.to_string())
            .await?;
        if order.amount != amount {
            tracing::error!(
                gateway_order_id = %order.id,
                requested = %amount,
                returned = %order.amount,
                "gateway order amount differs from request"
            );
            return Err(PaymentError::InvalidAmount(format!(
                "gateway recorded {} for a {amount} request",
                order.amount
            )));
        }

        let now = self.clock.now();
        let intent = PaymentIntent {
            attempt_id,
            gateway_order_id: order.id,
            amount,
            currency: currency.to_string(),
            status: IntentStatus::Created,
            gateway_payment_id: None,
            created_at: now,
            updated_at: now,
        };
        self.store.insert(&intent).await?;

        tracing::info!(gateway_order_id = %intent.gateway_order_id, "payment intent created");
        Ok(intent)
    }

    /// Marks the intent as handed to the customer. Returns the current intent
    /// whether or not the status changed.
    pub async fn mark_awaiting_callback(&self, attempt_id: AggregateId) -> Result<PaymentIntent> {
        let moved = self
            .store
            .transition(
                attempt_id,
                &[IntentStatus::Created],
                IntentStatus::AwaitingCallback,
                None,
                self.clock.now(),
            )
            .await?;
        match moved {
            Some(intent) => Ok(intent),
            None => self.require(attempt_id).await,
        }
    }

    /// Closes an open intent. Returns false if it was no longer open
    /// (a callback verified it first, or it was already failed).
    pub async fn fail_intent(&self, attempt_id: AggregateId) -> Result<bool> {
        let moved = self
            .store
            .transition(
                attempt_id,
                &IntentStatus::OPEN,
                IntentStatus::Failed,
                None,
                self.clock.now(),
            )
            .await?;
        Ok(moved.is_some())
    }

    pub async fn get_intent(&self, attempt_id: AggregateId) -> Result<Option<PaymentIntent>> {
        Ok(self.store.get(attempt_id).await?)
    }

    /// Verifies a gateway callback.
    ///
    /// Rejections are logged here at `warn` and carry no detail beyond their
    /// kind; callers must not echo them to the sender.
    #[tracing::instrument(
        skip(self, callback),
        fields(
            gateway_order_id = %callback.gateway_order_id,
            gateway_payment_id = %callback.gateway_payment_id
        )
    )]
    pub async fn verify_callback(&self, callback: &GatewayCallback) -> Result<VerifiedPayment> {
        let Some(mut intent) = self
            .store
            .find_by_gateway_order(&callback.gateway_order_id)
            .await?
        else {
            tracing::warn!("callback for unknown payment intent rejected");
            record_callback("unknown_intent");
            return Err(PaymentError::UnknownIntent(callback.gateway_order_id.clone()));
        };

        if !signature::verify(
            &self.webhook_secret,
            &callback.gateway_order_id,
            &callback.gateway_payment_id,
            &callback.signature,
        ) {
            tracing::warn!(attempt_id = %intent.attempt_id, "callback signature rejected");
            record_callback("signature_invalid");
            return Err(PaymentError::SignatureInvalid);
        }

        if let Some(amount) = callback.amount
            && amount != intent.amount
        {
            tracing::warn!(
                attempt_id = %intent.attempt_id,
                expected = %intent.amount,
                actual = %amount,
                "callback amount mismatch rejected"
            );
            record_callback("amount_mismatch");
            return Err(PaymentError::AmountMismatch {
                expected: intent.amount,
                actual: amount,
            });
        }

        // At most two rounds: a lost compare-and-set means another writer
        // settled the intent, and the second round sees the settled status.
        for _ in 0..2 {
            match intent.status {
                IntentStatus::Verified => {
                    return self.settled_verified(intent, &callback.gateway_payment_id);
                }
                IntentStatus::Failed => {
                    tracing::warn!(
                        attempt_id = %intent.attempt_id,
                        "verified payment arrived for a failed intent"
                    );
                    record_callback("intent_closed");
                    return Err(PaymentError::IntentClosed(format!(
                        "intent for attempt {} already failed",
                        intent.attempt_id
                    )));
                }
                IntentStatus::Created | IntentStatus::AwaitingCallback => {
                    let moved = self
                        .store
                        .transition(
                            intent.attempt_id,
                            &IntentStatus::OPEN,
                            IntentStatus::Verified,
                            Some(&callback.gateway_payment_id),
                            self.clock.now(),
                        )
                        .await?;
                    match moved {
                        Some(verified) => {
                            tracing::info!(attempt_id = %verified.attempt_id, "payment verified");
                            record_callback("verified");
                            return Ok(VerifiedPayment {
                                intent: verified,
                                payment_id: callback.gateway_payment_id.clone(),
                                replay: false,
                            });
                        }
                        None => intent = self.require(intent.attempt_id).await?,
                    }
                }
            }
        }

        Err(PaymentError::IntentClosed(format!(
            "intent for attempt {} changed concurrently",
            intent.attempt_id
        )))
    }

    fn settled_verified(&self, intent: PaymentIntent, payment_id: &str) -> Result<VerifiedPayment> {
        if intent.gateway_payment_id.as_deref() == Some(payment_id) {
            tracing::debug!(attempt_id = %intent.attempt_id, "duplicate callback delivery");
            record_callback("replay");
            return Ok(VerifiedPayment {
                intent,
                payment_id: payment_id.to_string(),
                replay: true,
            });
        }

        tracing::error!(
            attempt_id = %intent.attempt_id,
            verified_payment = ?intent.gateway_payment_id,
            "second payment for an already verified intent"
        );
        record_callback("intent_closed");
        Err(PaymentError::IntentClosed(format!(
            "intent for attempt {} already verified with another payment",
            intent.attempt_id
        )))
    }

    async fn require(&self, attempt_id: AggregateId) -> Result<PaymentIntent> {
        self.store
            .get(attempt_id)
            .await?
            .ok_or_else(|| PaymentError::UnknownIntent(attempt_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::InMemoryPaymentGateway;
    use crate::store::InMemoryIntentStore;

    const SECRET: &str = "whsec_test";

    fn manager() -> PaymentIntentManager<InMemoryPaymentGateway, InMemoryIntentStore> {
        PaymentIntentManager::new(
            InMemoryPaymentGateway::new(),
            InMemoryIntentStore::new(),
            SecretString::from(SECRET),
        )
    }

    fn callback(intent: &PaymentIntent, payment_id: &str) -> GatewayCallback {
        GatewayCallback {
            gateway_order_id: intent.gateway_order_id.clone(),
            gateway_payment_id: payment_id.to_string(),
            signature: signature::sign(
                &SecretString::from(SECRET),
                &intent.gateway_order_id,
                payment_id,
            ),
            amount: None,
        }
    }

    async fn open_intent(
        manager: &PaymentIntentManager<InMemoryPaymentGateway, InMemoryIntentStore>,
    ) -> PaymentIntent {
        let intent = manager
            .create_intent(Money::from_rupees(999), "INR", AggregateId::new())
            .await
            .unwrap();
        manager.mark_awaiting_callback(intent.attempt_id).await.unwrap()
    }

    #[tokio::test]
    async fn create_intent_records_gateway_order() {
        let manager = manager();
        let attempt_id = AggregateId::new();

        let intent = manager
            .create_intent(Money::from_rupees(999), "INR", attempt_id)
            .await
            .unwrap();

        assert_eq!(intent.status, IntentStatus::Created);
        assert_eq!(intent.gateway_order_id, "order_0001");
        assert_eq!(
            manager.get_intent(attempt_id).await.unwrap(),
            Some(intent.clone())
        );
        let awaiting = manager.mark_awaiting_callback(attempt_id).await.unwrap();
        assert_eq!(awaiting.status, IntentStatus::AwaitingCallback);
    }

    #[tokio::test]
    async fn non_positive_amount_is_invalid() {
        let manager = manager();
        for amount in [Money::zero(), Money::from_paise(-100)] {
            let result = manager
                .create_intent(amount, "INR", AggregateId::new())
                .await;
            assert!(matches!(result, Err(PaymentError::InvalidAmount(_))));
        }
        assert!(manager.gateway().orders().is_empty());
    }

    #[tokio::test]
    async fn gateway_outage_is_retryable() {
        let manager = manager();
        manager.gateway().set_unavailable(true);

        let err = manager
            .create_intent(Money::from_rupees(1), "INR", AggregateId::new())
            .await
            .unwrap_err();

        assert!(matches!(err, PaymentError::GatewayUnavailable(_)));
        assert!(err.is_retryable());
        assert!(manager.store().is_empty().await);
    }

    #[tokio::test]
    async fn valid_callback_verifies_once_then_replays() {
        let manager = manager();
        let intent = open_intent(&manager).await;
        let cb = callback(&intent, "pay_1");

        let first = manager.verify_callback(&cb).await.unwrap();
        let second = manager.verify_callback(&cb).await.unwrap();

        assert!(!first.replay);
        assert!(second.replay);
        assert_eq!(first.intent.status, IntentStatus::Verified);
        assert_eq!(second.intent.gateway_payment_id.as_deref(), Some("pay_1"));
    }

    #[tokio::test]
    async fn forged_signature_is_rejected() {
        let manager = manager();
        let intent = open_intent(&manager).await;
        let mut cb = callback(&intent, "pay_1");
        cb.signature = signature::sign(&SecretString::from("guess"), &intent.gateway_order_id, "pay_1");

        let err = manager.verify_callback(&cb).await.unwrap_err();

        assert!(matches!(err, PaymentError::SignatureInvalid));
        assert!(err.is_security_relevant());
        let stored = manager.get_intent(intent.attempt_id).await.unwrap().unwrap();
        assert_eq!(stored.status, IntentStatus::AwaitingCallback);
    }

    #[tokio::test]
    async fn unknown_gateway_order_is_rejected() {
        let manager = manager();
        let cb = GatewayCallback {
            gateway_order_id: "order_forged".to_string(),
            gateway_payment_id: "pay_1".to_string(),
            signature: signature::sign(&SecretString::from(SECRET), "order_forged", "pay_1"),
            amount: None,
        };

        assert!(matches!(
            manager.verify_callback(&cb).await,
            Err(PaymentError::UnknownIntent(_))
        ));
    }

    #[tokio::test]
    async fn amount_mismatch_is_hard_failure() {
        let manager = manager();
        let intent = open_intent(&manager).await;
        let mut cb = callback(&intent, "pay_1");
        cb.amount = Some(Money::from_rupees(1));

        assert!(matches!(
            manager.verify_callback(&cb).await,
            Err(PaymentError::AmountMismatch { .. })
        ));

        cb.amount = Some(Money::from_rupees(999));
        assert!(!manager.verify_callback(&cb).await.unwrap().replay);
    }

    #[tokio::test]
    async fn callback_after_failure_is_closed() {
        let manager = manager();
        let intent = open_intent(&manager).await;
        assert!(manager.fail_intent(intent.attempt_id).await.unwrap());
        assert!(!manager.fail_intent(intent.attempt_id).await.unwrap());

        assert!(matches!(
            manager.verify_callback(&callback(&intent, "pay_1")).await,
            Err(PaymentError::IntentClosed(_))
        ));
    }

    #[tokio::test]
    async fn second_payment_for_verified_intent_is_closed() {
        let manager = manager();
        let intent = open_intent(&manager).await;
        manager.verify_callback(&callback(&intent, "pay_1")).await.unwrap();

        assert!(matches!(
            manager.verify_callback(&callback(&intent, "pay_2")).await,
            Err(PaymentError::IntentClosed(_))
        ));
        assert!(!manager.fail_intent(intent.attempt_id).await.unwrap());
    }
}
