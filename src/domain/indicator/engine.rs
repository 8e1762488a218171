//! Indicator engine: folds observations into rolling indicator state and
//! produces one immutable snapshot per accepted observation.
//!
//! Closed-bar indicators (moving averages, Bollinger, RSI, ATR, Donchian)
//! only advance on settled bars; forming bars and ticks carry the last
//! closed readings forward. The opening-range bands advance on every
//! observation because the intraday breakout trades the forming bar.

use chrono::NaiveDateTime;
use tracing::debug;

use crate::domain::error::FutcoreError;
use crate::domain::indicator::atr::Atr;
use crate::domain::indicator::bollinger::{Bollinger, BollingerBands};
use crate::domain::indicator::donchian::{Channel, Donchian};
use crate::domain::indicator::opening_range::{BreakoutBands, OpeningRange};
use crate::domain::indicator::rsi::Rsi;
use crate::domain::indicator::{AverageKind, MovingAverage};
use crate::domain::observation::{Bar, Observation};

/// Which indicators to maintain. Built from the strategy configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorSpec {
    pub moving_averages: Option<(AverageKind, usize, usize)>,
    pub bollinger: Option<(usize, f64)>,
    pub rsi: Option<usize>,
    pub atr: usize,
    pub channels: Option<(usize, usize)>,
    pub opening_range: Option<(usize, f64, f64)>,
}

impl IndicatorSpec {
    /// Only ATR, which the risk module always needs.
    pub fn atr_only(atr: usize) -> Self {
        Self {
            moving_averages: None,
            bollinger: None,
            rsi: None,
            atr,
            channels: None,
            opening_range: None,
        }
    }
}

/// Every indicator value needed downstream for one observation. `None`
/// means the indicator has not seen enough data yet.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorSnapshot {
    /// Sequence number of the accepted observation, starting at 0.
    pub index: u64,
    pub timestamp: NaiveDateTime,
    /// True when the observation was a settled bar.
    pub closed: bool,
    pub price: f64,
    pub high: f64,
    pub low: f64,
    pub fast_ma: Option<f64>,
    pub slow_ma: Option<f64>,
    pub bollinger: Option<BollingerBands>,
    pub rsi: Option<f64>,
    pub atr: Option<f64>,
    pub entry_channel: Option<Channel>,
    pub exit_channel: Option<Channel>,
    pub breakout: Option<BreakoutBands>,
}

impl IndicatorSnapshot {
    /// Snapshot with a price and no indicator readings.
    pub fn bare(index: u64, timestamp: NaiveDateTime, price: f64) -> Self {
        Self {
            index,
            timestamp,
            closed: true,
            price,
            high: price,
            low: price,
            fast_ma: None,
            slow_ma: None,
            bollinger: None,
            rsi: None,
            atr: None,
            entry_channel: None,
            exit_channel: None,
            breakout: None,
        }
    }

    pub fn session(&self) -> chrono::NaiveDate {
        self.timestamp.date()
    }
}

#[derive(Debug, Clone, Default)]
struct ClosedReadings {
    fast_ma: Option<f64>,
    slow_ma: Option<f64>,
    bollinger: Option<BollingerBands>,
    rsi: Option<f64>,
    atr: Option<f64>,
    entry_channel: Option<Channel>,
    exit_channel: Option<Channel>,
}

#[derive(Debug, Clone)]
pub struct IndicatorEngine {
    fast: Option<MovingAverage>,
    slow: Option<MovingAverage>,
    bollinger: Option<Bollinger>,
    rsi: Option<Rsi>,
    atr: Atr,
    entry_channel: Option<Donchian>,
    exit_channel: Option<Donchian>,
    opening_range: Option<OpeningRange>,
    readings: ClosedReadings,
    last_seen: Option<NaiveDateTime>,
    last_closed: Option<NaiveDateTime>,
    last_forming: Option<Bar>,
    index: u64,
}

impl IndicatorEngine {
    pub fn new(spec: &IndicatorSpec) -> Self {
        let (fast, slow) = match spec.moving_averages {
            Some((kind, fast, slow)) => (
                Some(MovingAverage::new(kind, fast)),
                Some(MovingAverage::new(kind, slow)),
            ),
            None => (None, None),
        };
        let (entry_channel, exit_channel) = match spec.channels {
            Some((entry, exit)) => (Some(Donchian::new(entry)), Some(Donchian::new(exit))),
            None => (None, None),
        };
        Self {
            fast,
            slow,
            bollinger: spec.bollinger.map(|(n, k)| Bollinger::new(n, k)),
            rsi: spec.rsi.map(Rsi::new),
            atr: Atr::new(spec.atr),
            entry_channel,
            exit_channel,
            opening_range: spec
                .opening_range
                .map(|(n, k1, k2)| OpeningRange::new(n, k1, k2)),
            readings: ClosedReadings::default(),
            last_seen: None,
            last_closed: None,
            last_forming: None,
            index: 0,
        }
    }

    /// Fold one observation into the indicator state.
    ///
    /// Observations must arrive in non-decreasing timestamp order. Anything
    /// older than the last accepted sample, or an exact replay of it, is
    /// rejected without touching any state.
    pub fn update(&mut self, obs: &Observation) -> Result<IndicatorSnapshot, FutcoreError> {
        self.admit(obs)?;

        let timestamp = obs.timestamp();
        self.last_seen = Some(timestamp);
        match obs {
            Observation::Bar(bar) if bar.is_closed => {
                self.last_closed = Some(timestamp);
                self.last_forming = None;
                self.update_closed(bar);
            }
            Observation::Bar(bar) => self.last_forming = Some(bar.clone()),
            Observation::Tick(_) => {}
        }

        let breakout = self.opening_range.as_mut().and_then(|orb| {
            orb.update(obs.session(), obs.open(), obs.high(), obs.low(), obs.price())
        });

        let snapshot = IndicatorSnapshot {
            index: self.index,
            timestamp,
            closed: obs.is_closed_bar(),
            price: obs.price(),
            high: obs.high(),
            low: obs.low(),
            fast_ma: self.readings.fast_ma,
            slow_ma: self.readings.slow_ma,
            bollinger: self.readings.bollinger,
            rsi: self.readings.rsi,
            atr: self.readings.atr,
            entry_channel: self.readings.entry_channel,
            exit_channel: self.readings.exit_channel,
            breakout,
        };
        self.index += 1;
        Ok(snapshot)
    }

    fn admit(&self, obs: &Observation) -> Result<(), FutcoreError> {
        let timestamp = obs.timestamp();
        if let Some(last) = self.last_seen {
            if timestamp < last {
                return Err(FutcoreError::OutOfOrderData {
                    received: timestamp,
                    last,
                });
            }
        }

        let duplicate = match obs {
            Observation::Tick(_) => self.last_seen == Some(timestamp),
            Observation::Bar(bar) => {
                if let Some(closed) = self.last_closed {
                    if timestamp < closed {
                        return Err(FutcoreError::OutOfOrderData {
                            received: timestamp,
                            last: closed,
                        });
                    }
                }
                self.last_closed == Some(timestamp)
                    || (!bar.is_closed && self.last_forming.as_ref() == Some(bar))
            }
        };

        if duplicate {
            return Err(FutcoreError::DuplicateObservation { timestamp });
        }
        Ok(())
    }

    fn update_closed(&mut self, bar: &Bar) {
        let r = &mut self.readings;
        if let Some(ma) = self.fast.as_mut() {
            r.fast_ma = ma.update(bar.close);
        }
        if let Some(ma) = self.slow.as_mut() {
            r.slow_ma = ma.update(bar.close);
        }
        if let Some(b) = self.bollinger.as_mut() {
            r.bollinger = b.update(bar.close);
        }
        if let Some(rsi) = self.rsi.as_mut() {
            r.rsi = rsi.update(bar.close);
        }
        r.atr = self.atr.update(bar.high, bar.low, bar.close);
        if let Some(d) = self.entry_channel.as_mut() {
            r.entry_channel = d.update(bar.high, bar.low);
        }
        if let Some(d) = self.exit_channel.as_mut() {
            r.exit_channel = d.update(bar.high, bar.low);
        }
        debug!(
            start = %bar.start,
            close = bar.close,
            fast = ?r.fast_ma,
            slow = ?r.slow_ma,
            rsi = ?r.rsi,
            atr = ?r.atr,
            "closed bar folded"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::observation::Tick;
    use chrono::NaiveDate;

    fn at(d: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, d)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn bar(start: NaiveDateTime, close: f64, is_closed: bool) -> Observation {
        Observation::Bar(Bar {
            start,
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 10,
            is_closed,
        })
    }

    fn ma_spec() -> IndicatorSpec {
        IndicatorSpec {
            moving_averages: Some((AverageKind::Sma, 2, 3)),
            ..IndicatorSpec::atr_only(2)
        }
    }

    #[test]
    fn insufficient_data_is_none_not_zero() {
        let mut engine = IndicatorEngine::new(&ma_spec());
        let s = engine.update(&bar(at(1, 9, 0), 10.0, true)).unwrap();
        assert_eq!(s.fast_ma, None);
        assert_eq!(s.slow_ma, None);
        assert_eq!(s.atr, None);
        let s = engine.update(&bar(at(1, 9, 1), 12.0, true)).unwrap();
        assert_eq!(s.fast_ma, Some(11.0));
        assert_eq!(s.slow_ma, None);
        assert!(s.atr.is_some());
    }

    #[test]
    fn forming_bar_does_not_advance_closed_indicators() {
        let mut engine = IndicatorEngine::new(&ma_spec());
        engine.update(&bar(at(1, 9, 0), 10.0, true)).unwrap();
        let closed = engine.update(&bar(at(1, 9, 1), 12.0, true)).unwrap();
        let forming = engine.update(&bar(at(1, 9, 2), 50.0, false)).unwrap();
        assert_eq!(forming.fast_ma, closed.fast_ma);
        assert!(!forming.closed);
        assert_eq!(forming.price, 50.0);

        // The same bar settling is accepted and now moves the average.
        let settled = engine.update(&bar(at(1, 9, 2), 14.0, true)).unwrap();
        assert_eq!(settled.fast_ma, Some(13.0));
        assert_eq!(settled.slow_ma, Some(12.0));
    }

    #[test]
    fn forming_bar_revisions_are_accepted() {
        let mut engine = IndicatorEngine::new(&ma_spec());
        engine.update(&bar(at(1, 9, 0), 10.0, false)).unwrap();
        assert!(engine.update(&bar(at(1, 9, 0), 10.5, false)).is_ok());
    }

    #[test]
    fn rejects_out_of_order() {
        let mut engine = IndicatorEngine::new(&ma_spec());
        engine.update(&bar(at(1, 9, 5), 10.0, true)).unwrap();
        let err = engine.update(&bar(at(1, 9, 4), 10.0, true)).unwrap_err();
        assert!(matches!(err, FutcoreError::OutOfOrderData { .. }));
    }

    #[test]
    fn rejects_duplicates_without_mutating() {
        let mut engine = IndicatorEngine::new(&ma_spec());
        let first = engine.update(&bar(at(1, 9, 0), 10.0, true)).unwrap();
        let err = engine.update(&bar(at(1, 9, 0), 10.0, true)).unwrap_err();
        assert!(matches!(err, FutcoreError::DuplicateObservation { .. }));

        let next = engine.update(&bar(at(1, 9, 1), 12.0, true)).unwrap();
        assert_eq!(next.index, first.index + 1);
        assert_eq!(next.fast_ma, Some(11.0));
    }

    #[test]
    fn rejects_identical_forming_replay() {
        let mut engine = IndicatorEngine::new(&ma_spec());
        engine.update(&bar(at(1, 9, 0), 10.0, false)).unwrap();
        let err = engine.update(&bar(at(1, 9, 0), 10.0, false)).unwrap_err();
        assert!(matches!(err, FutcoreError::DuplicateObservation { .. }));
    }

    #[test]
    fn rejects_forming_update_after_settle() {
        let mut engine = IndicatorEngine::new(&ma_spec());
        engine.update(&bar(at(1, 9, 0), 10.0, true)).unwrap();
        let err = engine.update(&bar(at(1, 9, 0), 11.0, false)).unwrap_err();
        assert!(matches!(err, FutcoreError::DuplicateObservation { .. }));
    }

    #[test]
    fn duplicate_tick_timestamp_rejected() {
        let mut engine = IndicatorEngine::new(&IndicatorSpec::atr_only(14));
        let tick = |price| {
            Observation::Tick(Tick {
                timestamp: at(1, 10, 0),
                price,
                volume: 1,
            })
        };
        engine.update(&tick(100.0)).unwrap();
        assert!(engine.update(&tick(101.0)).is_err());
    }

    #[test]
    fn opening_range_tracks_ticks() {
        let spec = IndicatorSpec {
            opening_range: Some((1, 0.5, 0.5)),
            ..IndicatorSpec::atr_only(14)
        };
        let mut engine = IndicatorEngine::new(&spec);
        let tick = |d, h, m, price| {
            Observation::Tick(Tick {
                timestamp: at(d, h, m),
                price,
                volume: 1,
            })
        };
        engine.update(&tick(1, 9, 0, 100.0)).unwrap();
        engine.update(&tick(1, 10, 0, 110.0)).unwrap();
        let s = engine.update(&tick(1, 14, 0, 90.0)).unwrap();
        assert!(s.breakout.is_none());

        // Session 1: H=110 L=90 C=90 -> range max(20, 0) = 20
        let s = engine.update(&tick(2, 9, 0, 95.0)).unwrap();
        let bands = s.breakout.unwrap();
        assert_eq!(bands.upper, 105.0);
        assert_eq!(bands.lower, 85.0);
    }
}
