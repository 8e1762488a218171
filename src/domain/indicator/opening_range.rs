//! Dual Thrust opening-range breakout bands.
//!
//! Sessions are summarised from the observation stream itself. With the last
//! N completed sessions:
//!
//! ```text
//! HH = highest high, LL = lowest low, HC = highest close, LC = lowest close
//! Range = max(HH - LC, HC - LL)
//! upper = session_open + k1 * Range
//! lower = session_open - k2 * Range
//! ```
//!
//! Only N session summaries are retained.

use std::collections::VecDeque;

use chrono::NaiveDate;

#[derive(Debug, Clone, Copy, PartialEq)]
struct SessionSummary {
    date: NaiveDate,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
}

/// Band that was breached first in the current session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreachSide {
    Upper,
    Lower,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BreakoutBands {
    pub session_open: f64,
    pub range: f64,
    pub upper: f64,
    pub lower: f64,
    pub first_breach: Option<BreachSide>,
}

#[derive(Debug, Clone)]
pub struct OpeningRange {
    lookback: usize,
    k1: f64,
    k2: f64,
    history: VecDeque<SessionSummary>,
    current: Option<SessionSummary>,
    bands: Option<BreakoutBands>,
}

impl OpeningRange {
    pub fn new(lookback: usize, k1: f64, k2: f64) -> Self {
        let lookback = lookback.max(1);
        Self {
            lookback,
            k1,
            k2,
            history: VecDeque::with_capacity(lookback),
            current: None,
            bands: None,
        }
    }

    /// Feed one observation (tick, forming or closed bar).
    pub fn update(
        &mut self,
        session: NaiveDate,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
    ) -> Option<BreakoutBands> {
        match self.current.as_mut() {
            Some(cur) if cur.date == session => {
                cur.high = cur.high.max(high);
                cur.low = cur.low.min(low);
                cur.close = close;
            }
            _ => {
                if let Some(done) = self.current.take() {
                    if self.history.len() == self.lookback {
                        self.history.pop_front();
                    }
                    self.history.push_back(done);
                }
                self.current = Some(SessionSummary {
                    date: session,
                    open,
                    high,
                    low,
                    close,
                });
                self.bands = self.session_bands(open);
            }
        }

        if let Some(bands) = self.bands.as_mut() {
            if bands.first_breach.is_none() {
                let up = high > bands.upper;
                let down = low < bands.lower;
                bands.first_breach = match (up, down) {
                    (true, false) => Some(BreachSide::Upper),
                    (false, true) => Some(BreachSide::Lower),
                    // Both bands in one observation: order unknown.
                    _ => None,
                };
            }
        }
        self.bands
    }

    fn session_bands(&self, session_open: f64) -> Option<BreakoutBands> {
        if self.history.len() < self.lookback {
            return None;
        }
        let hh = self.history.iter().map(|s| s.high).reduce(f64::max)?;
        let ll = self.history.iter().map(|s| s.low).reduce(f64::min)?;
        let hc = self.history.iter().map(|s| s.close).reduce(f64::max)?;
        let lc = self.history.iter().map(|s| s.close).reduce(f64::min)?;
        let range = (hh - lc).max(hc - ll);
        Some(BreakoutBands {
            session_open,
            range,
            upper: session_open + self.k1 * range,
            lower: session_open - self.k2 * range,
            first_breach: None,
        })
    }
}
