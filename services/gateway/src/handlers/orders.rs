use axum::{
    extract::{Path, Query, State},
    Json,
};
use uuid::Uuid;

use matching_engine::engine::SubmitRequest;
use types::ids::OrderId;

use crate::error::ApiError;
use crate::models::{
    CancelOrderResponse, CancelQuery, CreateOrderRequest, OrderView, SubmitOrderResponse,
    TradeView, TraderOrdersQuery,
};
use crate::state::AppState;

pub async fn create_order(
    State(state): State<AppState>,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<Json<SubmitOrderResponse>, ApiError> {
    let kind = payload.order_kind().map_err(ApiError::BadRequest)?;

    let request = SubmitRequest {
        trader_id: payload.trader_id,
        side: payload.side,
        kind,
        quantity: payload.quantity,
        expires_at: payload.expires_at,
    };
    let reply = state
        .exchange
        .submit_order(&payload.instrument_id, request)
        .await?;

    Ok(Json(SubmitOrderResponse {
        order_id: reply.order.id,
        status: reply.order.status,
        filled_quantity: reply.order.filled_quantity,
        remaining_quantity: reply.order.remaining_quantity(),
        trades: reply.trades.iter().map(TradeView::from).collect(),
    }))
}

pub async fn cancel_order(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
    Query(query): Query<CancelQuery>,
) -> Result<Json<CancelOrderResponse>, ApiError> {
    let order_id = parse_order_id(&order_id)?;
    let reply = state
        .exchange
        .cancel_order(&query.instrument_id, order_id, query.trader_id)
        .await?;

    Ok(Json(CancelOrderResponse {
        order_id: reply.order.id,
        status: reply.order.status,
    }))
}

/// A trader's orders on one instrument, with fill progress
pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<TraderOrdersQuery>,
) -> Result<Json<Vec<OrderView>>, ApiError> {
    let orders = state
        .exchange
        .trader_orders(&query.instrument_id, query.trader_id)
        .await?;
    Ok(Json(orders.iter().map(OrderView::from).collect()))
}

fn parse_order_id(raw: &str) -> Result<OrderId, ApiError> {
    Uuid::parse_str(raw)
        .map(OrderId::from_uuid)
        .map_err(|_| ApiError::BadRequest(format!("'{}' is not a valid order id", raw)))
}
