use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use types::ids::{InstrumentId, OrderId, TradeId, TraderId};
use types::numeric::{Price, Quantity};
use types::order::{Order, OrderKind, OrderStatus, Side};
use types::trade::Trade;

// ── Requests ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderKindParam {
    Limit,
    Market,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrderRequest {
    pub instrument_id: InstrumentId,
    pub trader_id: TraderId,
    pub side: Side,
    pub kind: OrderKindParam,
    pub quantity: Quantity,
    /// Required for limit orders, absent for market orders
    pub price: Option<Price>,
    pub expires_at: Option<i64>,
}

impl CreateOrderRequest {
    /// Resolve the kind/price pair into the closed order-kind enum
    pub fn order_kind(&self) -> Result<OrderKind, String> {
        match (self.kind, self.price) {
            (OrderKindParam::Limit, Some(price)) => Ok(OrderKind::Limit(price)),
            (OrderKindParam::Limit, None) => Err("price is required for limit orders".into()),
            (OrderKindParam::Market, None) => Ok(OrderKind::Market),
            (OrderKindParam::Market, Some(_)) => {
                Err("market orders must not carry a price".into())
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateInstrumentRequest {
    pub instrument_id: String,
    pub total_supply: Quantity,
    pub tick_size: Price,
    pub lot_size: Quantity,
    /// Receives the full supply at listing (primary issuance hand-off)
    pub treasury_trader_id: TraderId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DepositRequest {
    pub trader_id: TraderId,
    pub amount: Decimal,
}

// ── Query parameters ────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct InstrumentQuery {
    pub instrument_id: InstrumentId,
}

#[derive(Debug, Deserialize)]
pub struct OrderbookQuery {
    pub instrument_id: InstrumentId,
    pub depth: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct TraderOrdersQuery {
    pub instrument_id: InstrumentId,
    pub trader_id: TraderId,
}

#[derive(Debug, Deserialize)]
pub struct CancelQuery {
    pub instrument_id: InstrumentId,
    pub trader_id: TraderId,
}

#[derive(Debug, Deserialize)]
pub struct CandlesQuery {
    pub instrument_id: InstrumentId,
    /// "1m", "5m", "15m", "1h", "4h", "1d"
    pub interval: Option<String>,
    pub limit: Option<usize>,
    pub fill_gaps: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct TradesQuery {
    pub instrument_id: InstrumentId,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct BalancesQuery {
    pub trader_id: TraderId,
}

// ── Responses ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct TradeView {
    pub trade_id: TradeId,
    pub price: Price,
    pub quantity: Quantity,
    pub executed_at: i64,
}

impl From<&Trade> for TradeView {
    fn from(trade: &Trade) -> Self {
        Self {
            trade_id: trade.id,
            price: trade.price,
            quantity: trade.quantity,
            executed_at: trade.executed_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitOrderResponse {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub filled_quantity: Quantity,
    pub remaining_quantity: Quantity,
    pub trades: Vec<TradeView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CancelOrderResponse {
    pub order_id: OrderId,
    pub status: OrderStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderView {
    pub order_id: OrderId,
    pub instrument_id: InstrumentId,
    pub trader_id: TraderId,
    pub side: Side,
    pub kind: OrderKind,
    pub original_quantity: Quantity,
    pub filled_quantity: Quantity,
    pub remaining_amount: Quantity,
    pub status: OrderStatus,
    pub created_at: i64,
    pub expires_at: Option<i64>,
}

impl From<&Order> for OrderView {
    fn from(order: &Order) -> Self {
        Self {
            order_id: order.id,
            instrument_id: order.instrument_id.clone(),
            trader_id: order.trader_id,
            side: order.side,
            kind: order.kind,
            original_quantity: order.original_quantity,
            filled_quantity: order.filled_quantity,
            remaining_amount: order.remaining_quantity(),
            status: order.status,
            created_at: order.created_at,
            expires_at: order.expires_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_requires_price() {
        let request = CreateOrderRequest {
            instrument_id: InstrumentId::new("PROP-0042"),
            trader_id: TraderId::new(),
            side: Side::Buy,
            kind: OrderKindParam::Limit,
            quantity: Quantity::from_u64(10),
            price: None,
            expires_at: None,
        };
        assert!(request.order_kind().is_err());
    }

    #[test]
    fn test_market_rejects_price() {
        let request = CreateOrderRequest {
            instrument_id: InstrumentId::new("PROP-0042"),
            trader_id: TraderId::new(),
            side: Side::Sell,
            kind: OrderKindParam::Market,
            quantity: Quantity::from_u64(10),
            price: Some(Price::from_u64(5)),
            expires_at: None,
        };
        assert!(request.order_kind().is_err());
    }

    #[test]
    fn test_create_order_request_deserializes() {
        let json = r#"{
            "instrument_id": "PROP-0042",
            "trader_id": "018f4f23-aaaa-7bbb-8ccc-ddddeeee0001",
            "side": "BUY",
            "kind": "LIMIT",
            "quantity": "10",
            "price": "5.25"
        }"#;
        let request: CreateOrderRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.kind, OrderKindParam::Limit);
        assert_eq!(
            request.order_kind().unwrap(),
            OrderKind::Limit(Price::from_str("5.25").unwrap())
        );
    }
}
