//! Paper trading: replays recorded observations and fills orders locally.
//!
//! [`ReplayFeed`] and [`PaperGateway`] share one [`PaperBook`]. Orders are
//! filled at their limit price, or at the last replayed price for market
//! orders, and the fills are delivered by the feed before the next
//! observation.

use std::cell::RefCell;
use std::collections::{HashSet, VecDeque};
use std::rc::Rc;

use tracing::{debug, info};

use crate::domain::error::{FutcoreError, GatewayError};
use crate::domain::observation::Observation;
use crate::domain::order::{FillReport, OrderId, OrderRequest};
use crate::ports::market_data_port::{MarketDataPort, MarketEvent};
use crate::ports::order_port::{AccountState, HeldPosition, OrderGateway};

#[derive(Debug, Clone)]
struct QueuedFill {
    instrument: String,
    signed_quantity: i64,
    report: FillReport,
}

/// Simulated broker state.
#[derive(Debug, Default)]
pub struct PaperBook {
    balance: f64,
    positions: Vec<HeldPosition>,
    queued: VecDeque<QueuedFill>,
    /// Orders with fills still to deliver.
    issued: HashSet<OrderId>,
    last_price: Option<f64>,
    partial_fill_lots: Option<u32>,
    reject_next: u32,
    next_id: u64,
}

impl PaperBook {
    pub fn new(balance: f64) -> Self {
        Self {
            balance,
            next_id: 1,
            ..Self::default()
        }
    }

    /// Split every order into fills of at most `lots`.
    pub fn with_partial_fills(mut self, lots: u32) -> Self {
        self.partial_fill_lots = (lots > 0).then_some(lots);
        self
    }

    /// Start with a position already held.
    pub fn with_position(mut self, instrument: &str, quantity: i64, average_price: f64) -> Self {
        self.positions.push(HeldPosition {
            instrument: instrument.to_string(),
            quantity,
            average_price,
        });
        self
    }

    /// Reject the next `count` submissions.
    pub fn reject_next(&mut self, count: u32) {
        self.reject_next = count;
    }

    pub fn position(&self, instrument: &str) -> i64 {
        self.positions
            .iter()
            .find(|p| p.instrument == instrument)
            .map_or(0, |p| p.quantity)
    }

    pub fn into_shared(self) -> Rc<RefCell<PaperBook>> {
        Rc::new(RefCell::new(self))
    }

    fn book_fill(&mut self, fill: &QueuedFill) {
        let signed = fill.signed_quantity;
        let price = fill.report.price;
        match self
            .positions
            .iter_mut()
            .find(|p| p.instrument == fill.instrument)
        {
            Some(held) => {
                let before = held.quantity;
                held.quantity += signed;
                if before == 0 || before.signum() != held.quantity.signum() {
                    held.average_price = price;
                } else if held.quantity.abs() > before.abs() {
                    let (b, s) = (before.abs() as f64, signed.abs() as f64);
                    held.average_price = (held.average_price * b + price * s) / (b + s);
                }
            }
            None => self.positions.push(HeldPosition {
                instrument: fill.instrument.clone(),
                quantity: signed,
                average_price: price,
            }),
        }
        self.positions.retain(|p| p.quantity != 0);
    }
}

/// Market-data side of the paper session.
pub struct ReplayFeed {
    observations: VecDeque<Observation>,
    book: Rc<RefCell<PaperBook>>,
    instrument: Option<String>,
}

impl ReplayFeed {
    pub fn new(observations: Vec<Observation>, book: Rc<RefCell<PaperBook>>) -> Self {
        Self {
            observations: observations.into(),
            book,
            instrument: None,
        }
    }
}

impl MarketDataPort for ReplayFeed {
    fn subscribe(&mut self, instrument: &str, bar_period: u32) -> Result<(), FutcoreError> {
        if let Some(current) = &self.instrument {
            return Err(FutcoreError::DataFeed {
                reason: format!("already subscribed to {}", current),
            });
        }
        info!(
            instrument,
            bar_period,
            observations = self.observations.len(),
            "replay subscribed"
        );
        self.instrument = Some(instrument.to_string());
        Ok(())
    }

    fn next_event(&mut self) -> Result<Option<MarketEvent>, FutcoreError> {
        if self.instrument.is_none() {
            return Err(FutcoreError::DataFeed {
                reason: "next_event called before subscribe".into(),
            });
        }
        let mut book = self.book.borrow_mut();
        if let Some(fill) = book.queued.pop_front() {
            book.book_fill(&fill);
            let id = fill.report.order_id;
            if !book.queued.iter().any(|f| f.report.order_id == id) {
                book.issued.remove(&id);
            }
            return Ok(Some(MarketEvent::Fill(fill.report)));
        }
        match self.observations.pop_front() {
            Some(obs) => {
                book.last_price = Some(obs.price());
                Ok(Some(MarketEvent::Observation(obs)))
            }
            None => Ok(None),
        }
    }
}

/// Order side of the paper session.
pub struct PaperGateway {
    book: Rc<RefCell<PaperBook>>,
}

impl PaperGateway {
    pub fn new(book: Rc<RefCell<PaperBook>>) -> Self {
        Self { book }
    }
}

impl OrderGateway for PaperGateway {
    fn submit_order(&mut self, request: &OrderRequest) -> Result<OrderId, GatewayError> {
        let mut book = self.book.borrow_mut();
        if book.reject_next > 0 {
            book.reject_next -= 1;
            return Err(GatewayError::Rejected {
                reason: "paper rejection".into(),
            });
        }
        let Some(price) = request.price.or(book.last_price) else {
            return Err(GatewayError::Rejected {
                reason: "no price to fill a market order".into(),
            });
        };

        let id = OrderId(book.next_id);
        book.next_id += 1;
        book.issued.insert(id);

        let chunk = book.partial_fill_lots.unwrap_or(request.quantity).max(1);
        let mut remaining = request.quantity;
        while remaining > 0 {
            let quantity = remaining.min(chunk);
            remaining -= quantity;
            book.queued.push_back(QueuedFill {
                instrument: request.instrument.clone(),
                signed_quantity: request.direction.sign() * i64::from(quantity),
                report: FillReport {
                    order_id: id,
                    quantity,
                    price,
                },
            });
        }
        debug!(order_id = %id, order = %request, "paper order accepted");
        Ok(id)
    }

    fn cancel_order(&mut self, order_id: OrderId) -> Result<(), GatewayError> {
        let mut book = self.book.borrow_mut();
        if !book.issued.remove(&order_id) {
            return Err(GatewayError::UnknownOrder(order_id));
        }
        book.queued.retain(|f| f.report.order_id != order_id);
        Ok(())
    }

    fn current_account_state(&self) -> Result<AccountState, GatewayError> {
        let book = self.book.borrow();
        Ok(AccountState {
            balance: book.balance,
            available_margin: book.balance,
            positions: book.positions.clone(),
        })
    }
}
