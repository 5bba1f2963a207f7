use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use lifecycle::ExchangeError;
use types::errors::{CancelError, OrderError};

/// Central error type for the gateway
///
/// Every rejection maps to a specific machine-readable code so a client
/// can tell "retry with a different price" from "top up balance" from
/// "try again later".
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Exchange(#[from] ExchangeError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Exchange(err) => exchange_error_parts(err),
        };

        let body = Json(json!({
            "error": code,
            "message": message
        }));
        (status, body).into_response()
    }
}

fn exchange_error_parts(err: ExchangeError) -> (StatusCode, &'static str, String) {
    let message = err.to_string();
    match err {
        ExchangeError::Order(order_err) => {
            let (status, code) = match order_err {
                OrderError::UnknownInstrument { .. } => {
                    (StatusCode::NOT_FOUND, "UNKNOWN_INSTRUMENT")
                }
                OrderError::InvalidQuantity(_) => (StatusCode::BAD_REQUEST, "INVALID_QUANTITY"),
                OrderError::InvalidPrice(_) => (StatusCode::BAD_REQUEST, "INVALID_PRICE"),
                OrderError::InvalidExpiry(_) => (StatusCode::BAD_REQUEST, "INVALID_EXPIRY"),
                OrderError::InsufficientBalance { .. } => {
                    (StatusCode::BAD_REQUEST, "INSUFFICIENT_BALANCE")
                }
                OrderError::InstrumentHalted { .. } => {
                    (StatusCode::SERVICE_UNAVAILABLE, "INSTRUMENT_HALTED")
                }
            };
            (status, code, message)
        }
        ExchangeError::Cancel(cancel_err) => {
            let (status, code) = match cancel_err {
                CancelError::NotFound { .. } => (StatusCode::NOT_FOUND, "ORDER_NOT_FOUND"),
                CancelError::Forbidden { .. } => (StatusCode::FORBIDDEN, "FORBIDDEN"),
                CancelError::AlreadyTerminal { .. } => (StatusCode::CONFLICT, "ALREADY_TERMINAL"),
                CancelError::InstrumentHalted { .. } => {
                    (StatusCode::SERVICE_UNAVAILABLE, "INSTRUMENT_HALTED")
                }
            };
            (status, code, message)
        }
        ExchangeError::UnknownInstrument(_) => {
            (StatusCode::NOT_FOUND, "UNKNOWN_INSTRUMENT", message)
        }
        ExchangeError::InstrumentExists(_) => (StatusCode::CONFLICT, "INSTRUMENT_EXISTS", message),
        ExchangeError::Timeout => (StatusCode::GATEWAY_TIMEOUT, "TIMEOUT", message),
        ExchangeError::WorkerUnavailable | ExchangeError::Persistence(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_ERROR",
            "Internal server error".to_string(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use types::ids::{InstrumentId, OrderId};
    use types::order::OrderStatus;

    fn status_of(err: ApiError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_cancel_error_codes() {
        let not_found = ExchangeError::Cancel(CancelError::NotFound {
            order_id: OrderId::new(),
        });
        assert_eq!(status_of(not_found.into()), StatusCode::NOT_FOUND);

        let forbidden = ExchangeError::Cancel(CancelError::Forbidden {
            order_id: OrderId::new(),
        });
        assert_eq!(status_of(forbidden.into()), StatusCode::FORBIDDEN);

        let terminal = ExchangeError::Cancel(CancelError::AlreadyTerminal {
            order_id: OrderId::new(),
            status: OrderStatus::Filled,
        });
        assert_eq!(status_of(terminal.into()), StatusCode::CONFLICT);
    }

    #[test]
    fn test_balance_and_validation_codes() {
        let balance = ExchangeError::Order(OrderError::InsufficientBalance {
            required: Decimal::from(200),
            available: Decimal::from(100),
        });
        assert_eq!(status_of(balance.into()), StatusCode::BAD_REQUEST);

        let halted = ExchangeError::Order(OrderError::InstrumentHalted {
            instrument_id: InstrumentId::new("PROP-0042"),
        });
        assert_eq!(status_of(halted.into()), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_timeout_maps_to_gateway_timeout() {
        assert_eq!(
            status_of(ExchangeError::Timeout.into()),
            StatusCode::GATEWAY_TIMEOUT
        );
    }
}
