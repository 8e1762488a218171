//! Order requests and fill acknowledgements exchanged with the gateway.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OrderId(pub u64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Buy,
    Sell,
}

impl Direction {
    /// +1 for buys, -1 for sells.
    pub fn sign(self) -> i64 {
        match self {
            Direction::Buy => 1,
            Direction::Sell => -1,
        }
    }

    pub fn for_exposure(quantity: i64) -> Self {
        if quantity >= 0 {
            Direction::Buy
        } else {
            Direction::Sell
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Buy => write!(f, "BUY"),
            Direction::Sell => write!(f, "SELL"),
        }
    }
}

/// Whether the order opens new exposure or closes existing exposure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offset {
    Open,
    Close,
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Offset::Open => write!(f, "OPEN"),
            Offset::Close => write!(f, "CLOSE"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub instrument: String,
    pub direction: Direction,
    pub offset: Offset,
    pub quantity: u32,
    /// Limit price; `None` is a market order.
    pub price: Option<f64>,
}

impl fmt::Display for OrderRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} x{}",
            self.instrument, self.direction, self.offset, self.quantity
        )?;
        if let Some(price) = self.price {
            write!(f, " @ {price:.2}")?;
        }
        Ok(())
    }
}

/// Fill acknowledgement pushed by the gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct FillReport {
    pub order_id: OrderId,
    pub quantity: u32,
    pub price: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(direction: Direction, offset: Offset, quantity: u32) -> OrderRequest {
        OrderRequest {
            instrument: "SHFE.cu2501".into(),
            direction,
            offset,
            quantity,
            price: None,
        }
    }

    #[test]
    fn direction_for_exposure() {
        assert_eq!(Direction::for_exposure(4), Direction::Buy);
        assert_eq!(Direction::for_exposure(-1), Direction::Sell);
    }

    #[test]
    fn display_market_and_limit() {
        let market = request(Direction::Buy, Offset::Open, 1);
        assert_eq!(market.to_string(), "SHFE.cu2501 BUY OPEN x1");

        let limit = OrderRequest {
            price: Some(71250.0),
            ..request(Direction::Sell, Offset::Close, 2)
        };
        assert_eq!(limit.to_string(), "SHFE.cu2501 SELL CLOSE x2 @ 71250.00");
    }
}
