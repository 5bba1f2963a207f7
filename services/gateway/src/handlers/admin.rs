use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};

use ledger::BalanceView;
use types::ids::InstrumentId;
use types::instrument::Instrument;

use crate::error::ApiError;
use crate::models::{BalancesQuery, CreateInstrumentRequest, DepositRequest};
use crate::state::AppState;

/// List a new property token and hand its supply to the treasury holder
pub async fn create_instrument(
    State(state): State<AppState>,
    Json(payload): Json<CreateInstrumentRequest>,
) -> Result<(StatusCode, Json<Instrument>), ApiError> {
    let instrument_id = InstrumentId::try_new(payload.instrument_id.clone()).ok_or_else(|| {
        ApiError::BadRequest(format!(
            "'{}' is not a valid instrument id",
            payload.instrument_id
        ))
    })?;
    if payload.lot_size.is_zero() || payload.total_supply.is_zero() {
        return Err(ApiError::BadRequest(
            "lot size and total supply must be positive".into(),
        ));
    }

    let instrument = Instrument::new(
        instrument_id,
        payload.total_supply,
        payload.tick_size,
        payload.lot_size,
        types::clock::now_nanos(),
    );
    state
        .exchange
        .list_instrument(instrument.clone(), payload.treasury_trader_id)?;

    Ok((StatusCode::CREATED, Json(instrument)))
}

pub async fn list_instruments(State(state): State<AppState>) -> Json<Vec<Instrument>> {
    Json(state.exchange.instruments())
}

/// Credit cash reported by the external balance source
pub async fn deposit(
    State(state): State<AppState>,
    Json(payload): Json<DepositRequest>,
) -> Result<Json<Value>, ApiError> {
    if payload.amount <= rust_decimal::Decimal::ZERO {
        return Err(ApiError::BadRequest(
            "deposit amount must be positive".into(),
        ));
    }
    state
        .exchange
        .deposit_cash(payload.trader_id, payload.amount)?;
    Ok(Json(json!({ "status": "credited" })))
}

/// Advisory balance view for UI display; the authoritative check is the
/// ledger's atomic reserve inside the submission path
pub async fn balances(
    State(state): State<AppState>,
    Query(query): Query<BalancesQuery>,
) -> Result<Json<BalanceView>, ApiError> {
    state
        .exchange
        .balances(query.trader_id)
        .map(Json)
        .ok_or_else(|| ApiError::BadRequest("unknown trader".into()))
}
