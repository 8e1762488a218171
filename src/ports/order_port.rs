//! Order-gateway port trait.

use crate::domain::error::GatewayError;
use crate::domain::order::{OrderId, OrderRequest};

/// Position already held at the broker.
#[derive(Debug, Clone, PartialEq)]
pub struct HeldPosition {
    pub instrument: String,
    /// Signed lots: positive long, negative short.
    pub quantity: i64,
    pub average_price: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AccountState {
    pub balance: f64,
    pub available_margin: f64,
    pub positions: Vec<HeldPosition>,
}

impl AccountState {
    pub fn position(&self, instrument: &str) -> Option<&HeldPosition> {
        self.positions.iter().find(|p| p.instrument == instrument)
    }
}

pub trait OrderGateway {
    fn submit_order(&mut self, request: &OrderRequest) -> Result<OrderId, GatewayError>;

    /// Cancels an outstanding order. Once this returns `Ok`, no further
    /// fills are delivered for the order.
    fn cancel_order(&mut self, order_id: OrderId) -> Result<(), GatewayError>;

    fn current_account_state(&self) -> Result<AccountState, GatewayError>;
}
