//! Bollinger Bands.
//!
//! middle = SMA(n), upper/lower = middle ± k * population stddev(n),
//! bandwidth = (upper - lower) / middle.

use crate::domain::indicator::window::RollingWindow;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BollingerBands {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
    pub bandwidth: f64,
}

#[derive(Debug, Clone)]
pub struct Bollinger {
    window: RollingWindow,
    k: f64,
}

impl Bollinger {
    pub fn new(period: usize, k: f64) -> Self {
        Self {
            window: RollingWindow::new(period),
            k,
        }
    }

    pub fn update(&mut self, close: f64) -> Option<BollingerBands> {
        self.window.push(close);
        if !self.window.is_full() {
            return None;
        }

        let n = self.window.len() as f64;
        let middle = self.window.iter().sum::<f64>() / n;
        let variance = self
            .window
            .iter()
            .map(|c| {
                let diff = c - middle;
                diff * diff
            })
            .sum::<f64>()
            / n;
        let offset = self.k * variance.sqrt();
        let upper = middle + offset;
        let lower = middle - offset;
        let bandwidth = if middle.abs() > f64::EPSILON {
            (upper - lower) / middle
        } else {
            0.0
        };

        Some(BollingerBands {
            upper,
            middle,
            lower,
            bandwidth,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn warmup() {
        let mut b = Bollinger::new(3, 2.0);
        assert!(b.update(1.0).is_none());
        assert!(b.update(2.0).is_none());
        assert!(b.update(3.0).is_some());
    }

    #[test]
    fn known_values() {
        let mut b = Bollinger::new(5, 2.0);
        let mut out = None;
        for c in [2.0, 4.0, 4.0, 4.0, 5.0] {
            out = b.update(c);
        }
        let bands = out.unwrap();
        // mean 3.8, population variance 0.96
        let sd = 0.96f64.sqrt();
        assert_relative_eq!(bands.middle, 3.8, epsilon = 1e-12);
        assert_relative_eq!(bands.upper, 3.8 + 2.0 * sd, epsilon = 1e-12);
        assert_relative_eq!(bands.lower, 3.8 - 2.0 * sd, epsilon = 1e-12);
        assert_relative_eq!(bands.bandwidth, 4.0 * sd / 3.8, epsilon = 1e-12);
    }

    #[test]
    fn flat_market_has_zero_bandwidth() {
        let mut b = Bollinger::new(4, 2.0);
        let mut out = None;
        for _ in 0..4 {
            out = b.update(100.0);
        }
        let bands = out.unwrap();
        assert_eq!(bands.upper, 100.0);
        assert_eq!(bands.lower, 100.0);
        assert_eq!(bands.bandwidth, 0.0);
    }

    #[test]
    fn bands_are_ordered() {
        let mut b = Bollinger::new(10, 2.0);
        for i in 0..50 {
            if let Some(bands) = b.update(100.0 + (i as f64).cos() * 3.0) {
                assert!(bands.lower <= bands.middle);
                assert!(bands.middle <= bands.upper);
            }
        }
    }
}
