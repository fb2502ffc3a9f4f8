//! Checkout endpoints used by the paying client.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use chrono::{DateTime, Utc};
use common::AggregateId;
use domain::{CartSnapshot, CustomerId, LineItem, Money, ShippingAddress};
use serde::{Deserialize, Serialize};

use super::orders::{HistoryEntryResponse, LineItemResponse};
use crate::error::ApiError;
use crate::state::{AppState, Backend};

/// Header carrying the authenticated customer, set by the auth gateway.
pub const CUSTOMER_HEADER: &str = "x-customer-id";

#[derive(Deserialize)]
pub struct CheckoutRequest {
    pub items: Vec<CartLineRequest>,
    pub shipping_address: ShippingAddress,
}

#[derive(Deserialize)]
pub struct CartLineRequest {
    pub product_id: String,
    pub size: String,
    pub quantity: u32,
    /// Unit price the customer was shown.
    pub unit_price_paise: i64,
}

#[derive(Serialize)]
pub struct CheckoutResponse {
    pub attempt_id: String,
    pub gateway_order_id: String,
    pub gateway_key_id: String,
    pub amount_paise: i64,
    pub currency: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct AttemptResponse {
    pub attempt_id: String,
    pub status: String,
    pub order_number: Option<String>,
    pub total_paise: i64,
    pub items: Vec<LineItemResponse>,
    pub history: Vec<HistoryEntryResponse>,
}

/// POST /checkout
#[tracing::instrument(skip(state, headers, req))]
pub async fn start<B: Backend>(
    State(state): State<Arc<AppState<B>>>,
    headers: HeaderMap,
    Json(req): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<CheckoutResponse>), ApiError> {
    let customer_id = headers
        .get(CUSTOMER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(CustomerId::new)
        .ok_or_else(|| ApiError::BadRequest(format!("missing {CUSTOMER_HEADER} header")))?;

    let items = req
        .items
        .into_iter()
        .map(|line| {
            LineItem::new(
                line.product_id,
                line.size.as_str(),
                line.quantity,
                Money::from_paise(line.unit_price_paise),
            )
        })
        .collect();
    let snapshot = CartSnapshot::new(customer_id, items, Utc::now())?;

    let ticket = state
        .coordinator
        .checkout(snapshot, req.shipping_address)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CheckoutResponse {
            attempt_id: ticket.attempt_id.to_string(),
            gateway_order_id: ticket.gateway_order_id,
            gateway_key_id: state.gateway_key_id.clone(),
            amount_paise: ticket.amount.paise(),
            currency: ticket.currency,
            expires_at: ticket.expires_at,
        }),
    ))
}

/// GET /checkout/{attempt_id}
#[tracing::instrument(skip(state))]
pub async fn status<B: Backend>(
    State(state): State<Arc<AppState<B>>>,
    Path(attempt_id): Path<String>,
) -> Result<Json<AttemptResponse>, ApiError> {
    let attempt_id = AggregateId::parse(&attempt_id)
        .map_err(|e| ApiError::BadRequest(format!("Invalid attempt id: {e}")))?;
    let attempt = state.coordinator.get_attempt(attempt_id).await?;

    Ok(Json(AttemptResponse {
        attempt_id: attempt_id.to_string(),
        status: attempt.status().to_string(),
        order_number: attempt.order_number().map(ToString::to_string),
        total_paise: attempt.total_amount().paise(),
        items: attempt.items().iter().map(LineItemResponse::from).collect(),
        history: attempt
            .history()
            .iter()
            .map(HistoryEntryResponse::from)
            .collect(),
    }))
}
