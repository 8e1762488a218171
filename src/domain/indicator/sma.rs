//! Simple Moving Average.
//!
//! SMA(n) = mean of the last n closes. Undefined until n samples arrive.

use crate::domain::indicator::window::RollingWindow;

#[derive(Debug, Clone)]
pub struct Sma {
    window: RollingWindow,
    sum: f64,
}

impl Sma {
    pub fn new(period: usize) -> Self {
        Self {
            window: RollingWindow::new(period),
            sum: 0.0,
        }
    }

    pub fn period(&self) -> usize {
        self.window.capacity()
    }

    pub fn update(&mut self, value: f64) -> Option<f64> {
        self.sum += value;
        if let Some(evicted) = self.window.push(value) {
            self.sum -= evicted;
        }
        self.value()
    }

    pub fn value(&self) -> Option<f64> {
        if self.window.is_full() {
            Some(self.sum / self.window.len() as f64)
        } else {
            None
        }
    }
}
