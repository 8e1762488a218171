//! Price observations: ticks and bars.

use chrono::{NaiveDate, NaiveDateTime};

/// Last-trade sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Tick {
    pub timestamp: NaiveDateTime,
    pub price: f64,
    pub volume: i64,
}

/// Aggregated bar. `start` is the bar-start timestamp; `is_closed` is false
/// while the bar is still forming.
#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    pub start: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
    pub is_closed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    Tick(Tick),
    Bar(Bar),
}

impl Observation {
    pub fn timestamp(&self) -> NaiveDateTime {
        match self {
            Observation::Tick(t) => t.timestamp,
            Observation::Bar(b) => b.start,
        }
    }

    /// Trading session the observation belongs to (calendar date).
    pub fn session(&self) -> NaiveDate {
        self.timestamp().date()
    }

    /// Last traded price: tick price or bar close.
    pub fn price(&self) -> f64 {
        match self {
            Observation::Tick(t) => t.price,
            Observation::Bar(b) => b.close,
        }
    }

    pub fn open(&self) -> f64 {
        match self {
            Observation::Tick(t) => t.price,
            Observation::Bar(b) => b.open,
        }
    }

    pub fn high(&self) -> f64 {
        match self {
            Observation::Tick(t) => t.price,
            Observation::Bar(b) => b.high,
        }
    }

    pub fn low(&self) -> f64 {
        match self {
            Observation::Tick(t) => t.price,
            Observation::Bar(b) => b.low,
        }
    }

    /// Only settled bars feed the closed-bar indicators. Ticks never do.
    pub fn is_closed_bar(&self) -> bool {
        matches!(self, Observation::Bar(b) if b.is_closed)
    }
}

impl From<Tick> for Observation {
    fn from(tick: Tick) -> Self {
        Observation::Tick(tick)
    }
}

impl From<Bar> for Observation {
    fn from(bar: Bar) -> Self {
        Observation::Bar(bar)
    }
}
