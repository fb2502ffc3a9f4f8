use std::time::Duration;

use async_trait::async_trait;
use domain::Money;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::{GatewayOrder, PaymentGateway};
use crate::error::GatewayError;

pub const RAZORPAY_API_BASE: &str = "https://api.razorpay.com";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
struct CreateOrderRequest<'a> {
    /// Smallest currency unit (paise).
    amount: i64,
    currency: &'a str,
    receipt: &'a str,
}

#[derive(Debug, Deserialize)]
struct CreateOrderResponse {
    id: String,
    amount: i64,
    currency: String,
}

/// Razorpay Orders API client.
#[derive(Clone)]
pub struct RazorpayGateway {
    client: Client,
    base_url: String,
    key_id: String,
    key_secret: SecretString,
}

impl std::fmt::Debug for RazorpayGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RazorpayGateway")
            .field("base_url", &self.base_url)
            .field("key_id", &self.key_id)
            .field("key_secret", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl RazorpayGateway {
    pub fn new(key_id: impl Into<String>, key_secret: SecretString) -> Self {
        Self::with_base_url(RAZORPAY_API_BASE, key_id, key_secret)
    }

    pub fn with_base_url(
        base_url: impl Into<String>,
        key_id: impl Into<String>,
        key_secret: SecretString,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            key_id: key_id.into(),
            key_secret,
        }
    }

    /// Public key id, handed to the client-side checkout widget.
    pub fn key_id(&self) -> &str {
        &self.key_id
    }
}

#[async_trait]
impl PaymentGateway for RazorpayGateway {
    #[tracing::instrument(skip(self), fields(amount = %amount))]
    async fn create_order(
        &self,
        amount: Money,
        currency: &str,
        receipt: &str,
    ) -> Result<GatewayOrder, GatewayError> {
        let response = self
            .client
            .post(format!("{}/v1/orders", self.base_url))
            .basic_auth(&self.key_id, Some(self.key_secret.expose_secret()))
            .timeout(REQUEST_TIMEOUT)
            .json(&CreateOrderRequest {
                amount: amount.paise(),
                currency,
                receipt,
            })
            .send()
            .await
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            tracing::warn!(%status, "razorpay unavailable");
            return Err(GatewayError::Unavailable(format!("razorpay returned {status}")));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(%status, body = %body, "razorpay rejected order");
            return Err(GatewayError::Rejected(format!("razorpay returned {status}: {body}")));
        }

        let order: CreateOrderResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Unavailable(format!("malformed razorpay response: {e}")))?;

        tracing::debug!(gateway_order_id = %order.id, "razorpay order created");
        Ok(GatewayOrder {
            id: order.id,
            amount: Money::from_paise(order.amount),
            currency: order.currency,
        })
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{basic_auth, body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn gateway(server: &MockServer) -> RazorpayGateway {
        RazorpayGateway::with_base_url(
            server.uri(),
            "rzp_test_key",
            SecretString::from("rzp_test_secret"),
        )
    }

    #[tokio::test]
    async fn creates_order_with_basic_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/orders"))
            .and(basic_auth("rzp_test_key", "rzp_test_secret"))
            .and(body_partial_json(serde_json::json!({
                "amount": 99_900,
                "currency": "INR",
                "receipt": "attempt-1"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "order_Abc123",
                "entity": "order",
                "amount": 99_900,
                "currency": "INR",
                "status": "created"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let order = gateway(&server)
            .create_order(Money::from_paise(99_900), "INR", "attempt-1")
            .await
            .unwrap();

        assert_eq!(order.id, "order_Abc123");
        assert_eq!(order.amount, Money::from_rupees(999));
    }

    #[tokio::test]
    async fn server_errors_are_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let result = gateway(&server)
            .create_order(Money::from_rupees(1), "INR", "r")
            .await;
        assert!(matches!(result, Err(GatewayError::Unavailable(_))));
    }

    #[tokio::test]
    async fn client_errors_are_rejections() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": {"code": "BAD_REQUEST_ERROR", "description": "amount must be at least INR 1.00"}
            })))
            .mount(&server)
            .await;

        let result = gateway(&server)
            .create_order(Money::from_paise(50), "INR", "r")
            .await;
        match result {
            Err(GatewayError::Rejected(msg)) => assert!(msg.contains("400")),
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreachable_gateway_is_unavailable() {
        let gateway = RazorpayGateway::with_base_url(
            "http://127.0.0.1:9",
            "k",
            SecretString::from("s"),
        );
        let result = gateway
            .create_order(Money::from_rupees(1), "INR", "r")
            .await;
        assert!(matches!(result, Err(GatewayError::Unavailable(_))));
    }

    #[test]
    fn debug_redacts_secret() {
        let gateway = RazorpayGateway::new("rzp_key", SecretString::from("super-secret"));
        let rendered = format!("{gateway:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("rzp_key"));
    }
}
