//! Exponential Moving Average.
//!
//! alpha = 2/(n+1), seeded with the SMA of the first n values, then
//! EMA[t] = alpha*P[t] + (1-alpha)*EMA[t-1].

use crate::domain::indicator::sma::Sma;

#[derive(Debug, Clone)]
pub struct Ema {
    alpha: f64,
    seed: Sma,
    value: Option<f64>,
}

impl Ema {
    pub fn new(period: usize) -> Self {
        let seed = Sma::new(period);
        let alpha = 2.0 / (seed.period() as f64 + 1.0);
        Self {
            alpha,
            seed,
            value: None,
        }
    }

    pub fn update(&mut self, price: f64) -> Option<f64> {
        self.value = match self.value {
            Some(prev) => Some(self.alpha * price + (1.0 - self.alpha) * prev),
            None => self.seed.update(price),
        };
        self.value
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }
}
