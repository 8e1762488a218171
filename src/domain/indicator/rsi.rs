//! RSI (Relative Strength Index) with Wilder's smoothing.
//!
//! - First average: simple mean of the first n gains/losses
//! - Subsequent: avg = (prev_avg * (n-1) + current) / n
//!
//! RSI = 100 - 100 / (1 + avg_gain / avg_loss). With no losses RSI is 100;
//! with no movement at all it is 50.
//!
//! Warmup: n price changes, i.e. n + 1 closes.

#[derive(Debug, Clone)]
pub struct Rsi {
    period: usize,
    prev_close: Option<f64>,
    seeded: usize,
    avg_gain: f64,
    avg_loss: f64,
}

impl Rsi {
    pub fn new(period: usize) -> Self {
        Self {
            period: period.max(1),
            prev_close: None,
            seeded: 0,
            avg_gain: 0.0,
            avg_loss: 0.0,
        }
    }

    pub fn update(&mut self, close: f64) -> Option<f64> {
        let Some(prev) = self.prev_close.replace(close) else {
            return None;
        };

        let change = close - prev;
        let gain = change.max(0.0);
        let loss = (-change).max(0.0);
        let n = self.period as f64;

        if self.seeded < self.period {
            self.avg_gain += gain / n;
            self.avg_loss += loss / n;
            self.seeded += 1;
            if self.seeded < self.period {
                return None;
            }
        } else {
            self.avg_gain = (self.avg_gain * (n - 1.0) + gain) / n;
            self.avg_loss = (self.avg_loss * (n - 1.0) + loss) / n;
        }

        Some(self.current())
    }

    fn current(&self) -> f64 {
        if self.avg_loss == 0.0 {
            if self.avg_gain == 0.0 { 50.0 } else { 100.0 }
        } else {
            100.0 - 100.0 / (1.0 + self.avg_gain / self.avg_loss)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn run(period: usize, closes: &[f64]) -> Vec<Option<f64>> {
        let mut rsi = Rsi::new(period);
        closes.iter().map(|&c| rsi.update(c)).collect()
    }

    #[test]
    fn rsi_warmup_period() {
        let closes: Vec<f64> = (1..=15).map(|i| 100.0 + (i % 5) as f64 * 2.0).collect();
        let out = run(14, &closes);
        for v in &out[..14] {
            assert!(v.is_none());
        }
        assert!(out[14].is_some());
    }

    #[test]
    fn rsi_all_gains_no_losses() {
        let closes: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        let out = run(14, &closes);
        assert_abs_diff_eq!(out[19].unwrap(), 100.0, epsilon = 1e-9);
    }

    #[test]
    fn rsi_all_losses_no_gains() {
        let closes: Vec<f64> = (0..15).map(|i| 100.0 - i as f64).collect();
        let out = run(14, &closes);
        assert_abs_diff_eq!(out[14].unwrap(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn rsi_flat_prices_are_neutral() {
        let out = run(5, &[50.0; 8]);
        assert_abs_diff_eq!(out[7].unwrap(), 50.0, epsilon = 1e-12);
    }

    #[test]
    fn rsi_in_range() {
        let closes: Vec<f64> = (1..=60)
            .map(|i| 100.0 + ((i % 7) as f64 - 3.0) * 2.0)
            .collect();
        for v in run(14, &closes).into_iter().flatten() {
            assert!((0.0..=100.0).contains(&v), "RSI {v} out of range");
        }
    }

    #[test]
    fn rsi_wilder_step_matches_reference() {
        // period 2: changes +2, -1 seed avg_gain 1.0, avg_loss 0.5
        // next change +3: avg_gain (1.0 + 3) / 2 = 2.0, avg_loss 0.5 / 2 = 0.25
        let out = run(2, &[10.0, 12.0, 11.0, 14.0]);
        assert_abs_diff_eq!(out[2].unwrap(), 100.0 - 100.0 / 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(out[3].unwrap(), 100.0 - 100.0 / 9.0, epsilon = 1e-12);
    }

    #[test]
    fn rsi_known_calculation() {
        let closes = [
            44.0, 44.25, 44.50, 43.75, 44.50, 44.25, 44.75, 45.25, 45.50, 45.25, 45.50, 46.0,
            46.25, 46.0, 46.50,
        ];
        let rsi = run(14, &closes)[14].unwrap();
        assert!(rsi > 50.0 && rsi < 100.0, "RSI should be in bullish territory");
    }
}
