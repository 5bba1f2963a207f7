use crate::handlers::{admin, market, orders};
use crate::state::AppState;
use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/orders", post(orders::create_order).get(orders::list_orders))
        .route("/orders/:id", delete(orders::cancel_order))
        .route("/orderbook", get(market::orderbook))
        .route("/statistics", get(market::statistics))
        .route("/candles", get(market::candles))
        .route("/trades", get(market::trades))
        .route(
            "/instruments",
            post(admin::create_instrument).get(admin::list_instruments),
        )
        .route("/deposits", post(admin::deposit))
        .route("/balances", get(admin::balances));

    Router::new()
        .nest("/v1", api_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
