use axum::{
    extract::{Query, State},
    Json,
};

use lifecycle::MarketStats;
use market_data::{Candle, Interval, PublicTrade};
use matching_engine::book::DepthSnapshot;

use crate::error::ApiError;
use crate::models::{CandlesQuery, InstrumentQuery, OrderbookQuery, TradesQuery};
use crate::state::AppState;

const DEFAULT_DEPTH: usize = 20;
const DEFAULT_CANDLE_LIMIT: usize = 100;
const DEFAULT_TRADE_LIMIT: usize = 50;

pub async fn orderbook(
    State(state): State<AppState>,
    Query(query): Query<OrderbookQuery>,
) -> Result<Json<DepthSnapshot>, ApiError> {
    let depth = state
        .exchange
        .depth(&query.instrument_id, query.depth.unwrap_or(DEFAULT_DEPTH))
        .await?;
    Ok(Json(depth))
}

pub async fn statistics(
    State(state): State<AppState>,
    Query(query): Query<InstrumentQuery>,
) -> Result<Json<MarketStats>, ApiError> {
    let stats = state.exchange.stats(&query.instrument_id).await?;
    Ok(Json(stats))
}

pub async fn candles(
    State(state): State<AppState>,
    Query(query): Query<CandlesQuery>,
) -> Result<Json<Vec<Candle>>, ApiError> {
    let interval_name = query.interval.as_deref().unwrap_or("1h");
    let interval = Interval::parse(interval_name).ok_or_else(|| {
        ApiError::BadRequest(format!("'{}' is not a supported interval", interval_name))
    })?;

    let candles = state
        .exchange
        .candles(
            &query.instrument_id,
            interval,
            query.limit.unwrap_or(DEFAULT_CANDLE_LIMIT),
            query.fill_gaps.unwrap_or(false),
        )
        .await?;
    Ok(Json(candles))
}

pub async fn trades(
    State(state): State<AppState>,
    Query(query): Query<TradesQuery>,
) -> Result<Json<Vec<PublicTrade>>, ApiError> {
    let trades = state
        .exchange
        .recent_trades(&query.instrument_id, query.limit.unwrap_or(DEFAULT_TRADE_LIMIT))
        .await?;
    Ok(Json(trades))
}
