#![allow(dead_code)]

use std::collections::VecDeque;

use chrono::{NaiveDate, NaiveDateTime};
use futcore::adapters::file_config_adapter::FileConfigAdapter;
use futcore::domain::config::{EngineConfig, build_engine_config};
use futcore::domain::error::{FutcoreError, GatewayError};
pub use futcore::domain::observation::{Bar, Observation, Tick};
use futcore::domain::order::{FillReport, OrderId, OrderRequest};
use futcore::ports::market_data_port::{MarketDataPort, MarketEvent};
use futcore::ports::order_port::{AccountState, HeldPosition, OrderGateway};

pub const SYMBOL: &str = "SHFE.rb2505";

pub fn at(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, day)
        .unwrap()
        .and_hms_opt(hour, minute, 0)
        .unwrap()
}

pub fn bar(start: NaiveDateTime, open: f64, high: f64, low: f64, close: f64) -> Observation {
    Observation::Bar(Bar {
        start,
        open,
        high,
        low,
        close,
        volume: 100,
        is_closed: true,
    })
}

/// Closed one-minute bars from 09:00 on 2024-03-01, flat at each close.
pub fn minute_bars(closes: &[f64]) -> Vec<Observation> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| {
            let i = i as u32;
            bar(at(1, 9 + i / 60, i % 60), c, c, c, c)
        })
        .collect()
}

pub fn engine_config(ini: &str) -> EngineConfig {
    let adapter = FileConfigAdapter::from_string(ini).unwrap();
    build_engine_config(&adapter).unwrap()
}

pub fn dual_ma_ini(extra: &str) -> String {
    format!(
        "[instrument]\nsymbol = {SYMBOL}\n[strategy]\nkind = dual_ma\nfast = 2\nslow = 3\n{extra}"
    )
}

/// Closes that cross short at bar 3, long at bar 5 and short again at bar 9
/// with a 2/3 simple moving average pair.
pub const CROSSING_CLOSES: [f64; 11] = [
    10.0, 10.0, 10.0, 9.0, 8.0, 12.0, 14.0, 16.0, 12.0, 8.0, 6.0,
];

/// Gateway that records every call and never fills on its own.
pub struct MockGateway {
    pub submitted: Vec<(OrderId, OrderRequest)>,
    pub cancelled: Vec<OrderId>,
    pub held: Vec<HeldPosition>,
    pub balance: f64,
    pub reject_all: bool,
    pub fail_cancel: bool,
    next_id: u64,
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            submitted: Vec::new(),
            cancelled: Vec::new(),
            held: Vec::new(),
            balance: 1_000_000.0,
            reject_all: false,
            fail_cancel: false,
            next_id: 1,
        }
    }

    pub fn holding(mut self, quantity: i64, average_price: f64) -> Self {
        self.held.push(HeldPosition {
            instrument: SYMBOL.to_string(),
            quantity,
            average_price,
        });
        self
    }

    pub fn rejecting(mut self) -> Self {
        self.reject_all = true;
        self
    }

    pub fn failing_cancels(mut self) -> Self {
        self.fail_cancel = true;
        self
    }

    pub fn last(&self) -> &(OrderId, OrderRequest) {
        self.submitted.last().expect("no order submitted")
    }
}

impl OrderGateway for MockGateway {
    fn submit_order(&mut self, request: &OrderRequest) -> Result<OrderId, GatewayError> {
        if self.reject_all {
            return Err(GatewayError::Rejected {
                reason: "insufficient margin".into(),
            });
        }
        let id = OrderId(self.next_id);
        self.next_id += 1;
        self.submitted.push((id, request.clone()));
        Ok(id)
    }

    fn cancel_order(&mut self, order_id: OrderId) -> Result<(), GatewayError> {
        if self.fail_cancel {
            return Err(GatewayError::UnknownOrder(order_id));
        }
        self.cancelled.push(order_id);
        Ok(())
    }

    fn current_account_state(&self) -> Result<AccountState, GatewayError> {
        Ok(AccountState {
            balance: self.balance,
            available_margin: self.balance,
            positions: self.held.clone(),
        })
    }
}

/// Feed that plays back a fixed list of events, fills included.
pub struct ScriptedFeed {
    events: VecDeque<MarketEvent>,
}

impl ScriptedFeed {
    pub fn new(observations: Vec<Observation>) -> Self {
        Self {
            events: observations.into_iter().map(MarketEvent::Observation).collect(),
        }
    }

    pub fn then_fill(mut self, order_id: OrderId, quantity: u32, price: f64) -> Self {
        self.events.push_back(MarketEvent::Fill(FillReport {
            order_id,
            quantity,
            price,
        }));
        self
    }
}

impl MarketDataPort for ScriptedFeed {
    fn subscribe(&mut self, _instrument: &str, _bar_period: u32) -> Result<(), FutcoreError> {
        Ok(())
    }

    fn next_event(&mut self) -> Result<Option<MarketEvent>, FutcoreError> {
        Ok(self.events.pop_front())
    }
}
