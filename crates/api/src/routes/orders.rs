//! Order queries, cancellation and fulfilment updates.

use std::str::FromStr;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use chrono::{DateTime, Utc};
use domain::{LineItem, Order, OrderNumber, OrderStatus, ShippingAddress, StatusEntry};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::{AppState, Backend};

// -- Request types --

#[derive(Deserialize)]
pub struct CancelRequest {
    pub reason: String,
    #[serde(default)]
    pub cancelled_by: Option<String>,
}

#[derive(Deserialize)]
pub struct FulfilmentRequest {
    pub status: String,
    #[serde(default)]
    pub note: Option<String>,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderResponse {
    pub order_number: String,
    pub attempt_id: String,
    pub customer_id: String,
    pub status: String,
    pub items: Vec<LineItemResponse>,
    pub total_paise: i64,
    pub shipping_address: Option<ShippingAddress>,
    pub payment_reference: Option<String>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub history: Vec<HistoryEntryResponse>,
}

#[derive(Serialize)]
pub struct LineItemResponse {
    pub product_id: String,
    pub size: String,
    pub quantity: u32,
    pub unit_price_paise: i64,
}

impl From<&LineItem> for LineItemResponse {
    fn from(item: &LineItem) -> Self {
        Self {
            product_id: item.product_id.to_string(),
            size: item.size.to_string(),
            quantity: item.quantity,
            unit_price_paise: item.unit_price.paise(),
        }
    }
}

#[derive(Serialize)]
pub struct HistoryEntryResponse {
    pub status: String,
    pub at: DateTime<Utc>,
    pub note: Option<String>,
}

impl From<&StatusEntry> for HistoryEntryResponse {
    fn from(entry: &StatusEntry) -> Self {
        Self {
            status: entry.status.to_string(),
            at: entry.at,
            note: entry.note.clone(),
        }
    }
}

impl From<&Order> for OrderResponse {
    fn from(order: &Order) -> Self {
        use domain::Aggregate;

        Self {
            order_number: order
                .order_number()
                .map(ToString::to_string)
                .unwrap_or_default(),
            attempt_id: order.id().map(|id| id.to_string()).unwrap_or_default(),
            customer_id: order
                .customer_id()
                .map(ToString::to_string)
                .unwrap_or_default(),
            status: order.status().to_string(),
            items: order.items().iter().map(LineItemResponse::from).collect(),
            total_paise: order.total_amount().paise(),
            shipping_address: order.shipping_address().cloned(),
            payment_reference: order.payment_reference().map(String::from),
            confirmed_at: order.confirmed_at(),
            history: order.history().iter().map(HistoryEntryResponse::from).collect(),
        }
    }
}

// -- Handlers --

/// GET /orders
#[tracing::instrument(skip(state))]
pub async fn list<B: Backend>(
    State(state): State<Arc<AppState<B>>>,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let orders = state.coordinator.list_orders().await?;
    Ok(Json(orders.iter().map(OrderResponse::from).collect()))
}

/// GET /orders/{order_number}
#[tracing::instrument(skip(state))]
pub async fn get<B: Backend>(
    State(state): State<Arc<AppState<B>>>,
    Path(order_number): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = state
        .coordinator
        .get_order(&OrderNumber::parse(order_number))
        .await?;
    Ok(Json(OrderResponse::from(&order)))
}

/// POST /orders/{order_number}/cancel
#[tracing::instrument(skip(state, req))]
pub async fn cancel<B: Backend>(
    State(state): State<Arc<AppState<B>>>,
    Path(order_number): Path<String>,
    Json(req): Json<CancelRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    if req.reason.trim().is_empty() {
        return Err(ApiError::BadRequest("reason is required".to_string()));
    }
    let order = state
        .coordinator
        .cancel_order(
            &OrderNumber::parse(order_number),
            req.reason,
            req.cancelled_by,
        )
        .await?;
    Ok(Json(OrderResponse::from(&order)))
}

/// POST /orders/{order_number}/fulfilment
#[tracing::instrument(skip(state, req))]
pub async fn fulfilment<B: Backend>(
    State(state): State<Arc<AppState<B>>>,
    Path(order_number): Path<String>,
    Json(req): Json<FulfilmentRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let status =
        OrderStatus::from_str(&req.status).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let order = state
        .coordinator
        .advance_fulfilment(&OrderNumber::parse(order_number), status, req.note)
        .await?;
    Ok(Json(OrderResponse::from(&order)))
}
