//! Gateway callback endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use domain::Money;
use payment::GatewayCallback;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::{AppState, Backend};

/// Fields posted by Razorpay Checkout after a successful payment.
#[derive(Deserialize)]
pub struct CallbackRequest {
    pub razorpay_order_id: String,
    pub razorpay_payment_id: String,
    pub razorpay_signature: String,
    /// Captured amount in paise, when known.
    #[serde(default)]
    pub amount: Option<i64>,
}

impl From<CallbackRequest> for GatewayCallback {
    fn from(req: CallbackRequest) -> Self {
        GatewayCallback {
            gateway_order_id: req.razorpay_order_id,
            gateway_payment_id: req.razorpay_payment_id,
            signature: req.razorpay_signature,
            amount: req.amount.map(Money::from_paise),
        }
    }
}

#[derive(Serialize)]
pub struct CallbackResponse {
    pub status: &'static str,
    pub order_number: String,
    pub replay: bool,
}

/// POST /payments/callback
#[tracing::instrument(skip(state, req), fields(gateway_order_id = %req.razorpay_order_id))]
pub async fn callback<B: Backend>(
    State(state): State<Arc<AppState<B>>>,
    Json(req): Json<CallbackRequest>,
) -> Result<Json<CallbackResponse>, ApiError> {
    let outcome = state
        .coordinator
        .handle_callback(&GatewayCallback::from(req))
        .await
        .map_err(ApiError::Callback)?;

    Ok(Json(CallbackResponse {
        status: "confirmed",
        order_number: outcome.order_number.to_string(),
        replay: outcome.replay,
    }))
}
