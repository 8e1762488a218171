//! Technical indicators maintained incrementally over bounded history.
//!
//! Each indicator is a small struct with an `update` method returning
//! `Option<_>`: `None` until enough samples have been seen.

pub mod atr;
pub mod bollinger;
pub mod donchian;
pub mod ema;
pub mod engine;
pub mod opening_range;
pub mod rsi;
pub mod sma;
pub mod window;

pub use engine::{IndicatorEngine, IndicatorSnapshot, IndicatorSpec};

use std::fmt;

use self::ema::Ema;
use self::sma::Sma;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AverageKind {
    Sma,
    Ema,
}

impl fmt::Display for AverageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AverageKind::Sma => write!(f, "SMA"),
            AverageKind::Ema => write!(f, "EMA"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum MovingAverage {
    Sma(Sma),
    Ema(Ema),
}

impl MovingAverage {
    pub fn new(kind: AverageKind, period: usize) -> Self {
        match kind {
            AverageKind::Sma => MovingAverage::Sma(Sma::new(period)),
            AverageKind::Ema => MovingAverage::Ema(Ema::new(period)),
        }
    }

    pub fn update(&mut self, value: f64) -> Option<f64> {
        match self {
            MovingAverage::Sma(sma) => sma.update(value),
            MovingAverage::Ema(ema) => ema.update(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn average_kind_display() {
        assert_eq!(AverageKind::Sma.to_string(), "SMA");
        assert_eq!(AverageKind::Ema.to_string(), "EMA");
    }

    #[test]
    fn moving_average_dispatch() {
        let mut sma = MovingAverage::new(AverageKind::Sma, 2);
        let mut ema = MovingAverage::new(AverageKind::Ema, 2);
        sma.update(1.0);
        ema.update(1.0);
        assert_eq!(sma.update(3.0), Some(2.0));
        // EMA seed is the SMA of the first two values.
        assert_eq!(ema.update(3.0), Some(2.0));
        // alpha = 2/3
        let next = ema.update(5.0).unwrap();
        assert!((next - (2.0 / 3.0 * 5.0 + 1.0 / 3.0 * 2.0)).abs() < 1e-12);
    }
}
