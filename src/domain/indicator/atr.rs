//! Average True Range with Wilder's smoothing.
//!
//! The first true range is high - low (no previous close). The seed is the
//! mean of the first n true ranges, then ATR = (prev * (n-1) + TR) / n.

#[derive(Debug, Clone)]
pub struct Atr {
    period: usize,
    prev_close: Option<f64>,
    seeded: usize,
    value: f64,
}

impl Atr {
    pub fn new(period: usize) -> Self {
        Self {
            period: period.max(1),
            prev_close: None,
            seeded: 0,
            value: 0.0,
        }
    }

    pub fn update(&mut self, high: f64, low: f64, close: f64) -> Option<f64> {
        let tr = match self.prev_close {
            Some(pc) => (high - low).max((high - pc).abs()).max((low - pc).abs()),
            None => high - low,
        };
        self.prev_close = Some(close);

        let n = self.period as f64;
        if self.seeded < self.period {
            self.value += tr / n;
            self.seeded += 1;
            if self.seeded < self.period {
                return None;
            }
        } else {
            self.value = (self.value * (n - 1.0) + tr) / n;
        }
        Some(self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn atr_warmup() {
        let mut atr = Atr::new(3);
        assert!(atr.update(110.0, 90.0, 100.0).is_none());
        assert!(atr.update(110.0, 90.0, 100.0).is_none());
        assert!(atr.update(110.0, 90.0, 100.0).is_some());
    }

    #[test]
    fn atr_seed_is_average() {
        let mut atr = Atr::new(3);
        atr.update(110.0, 100.0, 105.0);
        atr.update(115.0, 105.0, 110.0);
        let seed = atr.update(120.0, 110.0, 115.0).unwrap();
        assert_abs_diff_eq!(seed, 10.0, epsilon = 1e-9);
    }

    #[test]
    fn atr_wilder_smoothing() {
        let mut atr = Atr::new(3);
        atr.update(110.0, 100.0, 105.0);
        atr.update(115.0, 105.0, 110.0);
        atr.update(120.0, 110.0, 115.0);
        let v = atr.update(125.0, 115.0, 120.0).unwrap();
        assert_abs_diff_eq!(v, (10.0 * 2.0 + 10.0) / 3.0, epsilon = 1e-9);
    }

    #[test]
    fn atr_handles_gaps() {
        let mut atr = Atr::new(2);
        atr.update(110.0, 100.0, 105.0);
        // gap up: TR = max(10, |130-105|, |120-105|) = 25
        let v = atr.update(130.0, 120.0, 125.0).unwrap();
        assert_abs_diff_eq!(v, (10.0 + 25.0) / 2.0, epsilon = 1e-9);
    }

    #[test]
    fn atr_converges_to_constant_range() {
        // Monotonic series with a constant bar range of 2 and +1 steps:
        // TR = max(2, |h - pc|, |l - pc|) = 2 after the first bar.
        let mut atr = Atr::new(14);
        let mut last = None;
        for i in 0..200 {
            let close = 100.0 + i as f64;
            last = atr.update(close + 1.0, close - 1.0, close);
        }
        assert_abs_diff_eq!(last.unwrap(), 2.0, epsilon = 1e-6);
    }
}
