use crate::types::{InstrumentType, PositionSide};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Order direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    Buy,
    Sell,
}

/// Order type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit,
}

/// Margin mode the order trades under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradingMode {
    Isolated,
    Cross,
    Cash,
}

/// Currency a market order size is denominated in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetCcy {
    BaseCcy,
    QuoteCcy,
}

/// Order lifecycle state as reported by fills
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FillStatus {
    Placed,
    Live,
    PartiallyFilled,
    Filled,
    Canceled,
}

impl FillStatus {
    /// No further fills can arrive in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, FillStatus::Filled | FillStatus::Canceled)
    }
}

/// Generate a client order id.
///
/// 32 hex characters of a v4 UUID: alphanumeric as the venue requires, and
/// collision-free for any realistic session length.
pub fn new_client_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Order owned by the submitting policy; the connection layer only forwards it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    id: String,
    pub action: Action,
    pub inst_id: String,
    pub size: f64,
    pub trading_mode: TradingMode,
    pub order_type: OrderType,
    /// Limit price, required by the venue for limit orders
    pub price: Option<f64>,
    pub target_ccy: Option<TargetCcy>,
    pub margin_ccy: Option<String>,
    pub fill_status: FillStatus,
}

impl Order {
    /// Create an order with a freshly generated client id
    pub fn new(
        action: Action,
        inst_id: impl Into<String>,
        size: f64,
        trading_mode: TradingMode,
        order_type: OrderType,
    ) -> Self {
        Self {
            id: new_client_id(),
            action,
            inst_id: inst_id.into(),
            size,
            trading_mode,
            order_type,
            price: None,
            target_ccy: None,
            margin_ccy: None,
            fill_status: FillStatus::Placed,
        }
    }

    /// Market order shorthand
    pub fn market(
        action: Action,
        inst_id: impl Into<String>,
        size: f64,
        trading_mode: TradingMode,
    ) -> Self {
        Self::new(action, inst_id, size, trading_mode, OrderType::Market)
    }

    /// Limit order shorthand
    pub fn limit(
        action: Action,
        inst_id: impl Into<String>,
        size: f64,
        price: f64,
        trading_mode: TradingMode,
    ) -> Self {
        Self::new(action, inst_id, size, trading_mode, OrderType::Limit).with_price(price)
    }

    /// Client id, fixed at construction
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn with_price(mut self, price: f64) -> Self {
        self.price = Some(price);
        self
    }

    pub fn with_target_ccy(mut self, target_ccy: TargetCcy) -> Self {
        self.target_ccy = Some(target_ccy);
        self
    }

    pub fn with_margin_ccy(mut self, margin_ccy: impl Into<String>) -> Self {
        self.margin_ccy = Some(margin_ccy.into());
        self
    }

    /// Apply a fill event addressed to this order.
    ///
    /// Returns false and leaves the order untouched when the fill belongs to another order.
    pub fn apply_fill(&mut self, fill: &FillOrder) -> bool {
        if fill.client_order_id != self.id {
            return false;
        }
        self.fill_status = fill.status;
        true
    }
}

/// Cancel request payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCancel {
    pub inst_id: String,
    /// Venue order id
    pub order_id: String,
}

impl OrderCancel {
    pub fn new(inst_id: impl Into<String>, order_id: impl Into<String>) -> Self {
        Self {
            inst_id: inst_id.into(),
            order_id: order_id.into(),
        }
    }
}

/// Accept/reject outcome of an order-entry request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Ok,
    Error,
}

/// Venue reply to an order-entry request, keyed by the request id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderResponse {
    pub op: String,
    /// Request id; equals the client order id for single orders
    pub id: String,
    pub status: OrderStatus,
    pub code: String,
    pub msg: String,
    /// Venue order id, when the venue assigned one
    pub order_id: Option<String>,
    pub client_order_id: Option<String>,
}

impl OrderResponse {
    pub fn is_ok(&self) -> bool {
        self.status == OrderStatus::Ok
    }
}

/// Execution or state update for a previously placed order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillOrder {
    pub client_order_id: String,
    pub inst_id: String,
    pub inst_type: InstrumentType,
    pub pos_side: Option<PositionSide>,
    pub action: Action,
    /// Order size
    pub size: f64,
    /// Size filled by this event
    pub filled_size: f64,
    pub fill_price: Option<f64>,
    pub fill_time: Option<DateTime<Utc>>,
    pub status: FillStatus,
    pub leverage: Option<f64>,
    pub fee: Option<f64>,
    /// Realized P&L
    pub pnl: Option<f64>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn fill_for(client_order_id: &str, status: FillStatus) -> FillOrder {
        FillOrder {
            client_order_id: client_order_id.to_string(),
            inst_id: "DOT-USDT-SWAP".to_string(),
            inst_type: InstrumentType::Swap,
            pos_side: None,
            action: Action::Buy,
            size: 1.0,
            filled_size: 1.0,
            fill_price: Some(5.2),
            fill_time: Some(Utc::now()),
            status,
            leverage: Some(3.0),
            fee: Some(-0.001),
            pnl: Some(0.0),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_client_id_format() {
        let order = Order::market(Action::Buy, "BTC-USDT", 0.1, TradingMode::Cash);
        assert_eq!(order.id().len(), 32);
        assert!(order.id().chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_client_ids_unique() {
        let ids: HashSet<String> = (0..100_000)
            .map(|_| Order::market(Action::Sell, "BTC-USDT", 1.0, TradingMode::Cross).id().to_string())
            .collect();
        assert_eq!(ids.len(), 100_000);
    }

    #[test]
    fn test_clone_keeps_id() {
        let order = Order::limit(Action::Buy, "ETH-USDT", 1.0, 2000.0, TradingMode::Cash);
        let copy = order.clone();
        assert_eq!(order.id(), copy.id());
        assert_eq!(copy.price, Some(2000.0));
        assert_eq!(copy.order_type, OrderType::Limit);
    }

    #[test]
    fn test_apply_fill_matches_by_id() {
        let mut order = Order::market(Action::Buy, "DOT-USDT-SWAP", 1.0, TradingMode::Isolated);
        let id = order.id().to_string();

        assert!(!order.apply_fill(&fill_for("someone-else", FillStatus::Filled)));
        assert_eq!(order.fill_status, FillStatus::Placed);

        assert!(order.apply_fill(&fill_for(&id, FillStatus::PartiallyFilled)));
        assert_eq!(order.fill_status, FillStatus::PartiallyFilled);
        assert!(!order.fill_status.is_terminal());

        assert!(order.apply_fill(&fill_for(&id, FillStatus::Filled)));
        assert!(order.fill_status.is_terminal());
    }
}
