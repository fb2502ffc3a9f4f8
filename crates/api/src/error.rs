//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::CartError;
use reconciliation::CheckoutError;
use serde_json::json;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    Checkout(CheckoutError),
    /// Failure while handling a gateway callback. The sender only ever sees
    /// the generic rejection or a bare server error.
    Callback(CheckoutError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::NotFound(msg) => {
                error_body(StatusCode::NOT_FOUND, "not_found", Some(msg), false)
            }
            ApiError::BadRequest(msg) => {
                error_body(StatusCode::BAD_REQUEST, "bad_request", Some(msg), false)
            }
            ApiError::Checkout(err) => checkout_error_to_response(err),
            ApiError::Callback(err) => callback_error_to_response(err),
        }
    }
}

fn checkout_error_to_response(err: CheckoutError) -> Response {
    // Nothing about a rejected callback goes back to the sender.
    if err.is_security_relevant() {
        return rejected();
    }

    let status = match &err {
        CheckoutError::NotFound(_) => StatusCode::NOT_FOUND,
        CheckoutError::InvalidCart(_)
        | CheckoutError::InvalidAddress { .. }
        | CheckoutError::InvalidAmount(_) => StatusCode::UNPROCESSABLE_ENTITY,
        CheckoutError::StaleCart { .. }
        | CheckoutError::InsufficientStock { .. }
        | CheckoutError::InvalidTransition { .. }
        | CheckoutError::PaymentClosed(_) => StatusCode::CONFLICT,
        CheckoutError::GatewayUnavailable(_) | CheckoutError::CatalogUnavailable(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!(error = %err, "internal server error");
        None
    } else {
        Some(err.to_string())
    };
    error_body(status, err.kind(), message, err.is_retryable())
}

fn callback_error_to_response(err: CheckoutError) -> Response {
    let status = match &err {
        CheckoutError::GatewayUnavailable(_) | CheckoutError::CatalogUnavailable(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        CheckoutError::Ledger(_) | CheckoutError::Payment(_) | CheckoutError::Domain(_) => {
            tracing::error!(error = %err, "callback handling failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
        _ => {
            tracing::warn!(kind = err.kind(), error = %err, "callback rejected");
            return rejected();
        }
    };
    (status, axum::Json(json!({ "status": "error" }))).into_response()
}

fn rejected() -> Response {
    (
        StatusCode::BAD_REQUEST,
        axum::Json(json!({ "status": "rejected" })),
    )
        .into_response()
}

fn error_body(
    status: StatusCode,
    kind: &str,
    message: Option<String>,
    retryable: bool,
) -> Response {
    let mut body = json!({ "error": kind, "retryable": retryable });
    if let Some(message) = message {
        body["message"] = json!(message);
    }
    (status, axum::Json(body)).into_response()
}

impl From<CheckoutError> for ApiError {
    fn from(err: CheckoutError) -> Self {
        ApiError::Checkout(err)
    }
}

impl From<CartError> for ApiError {
    fn from(err: CartError) -> Self {
        ApiError::Checkout(CheckoutError::InvalidCart(err))
    }
}
