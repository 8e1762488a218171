//! Signal generation for every strategy variant.
//!
//! `evaluate` reads the current and previous indicator snapshots plus the
//! position record and proposes a direction. It never mutates anything:
//! signals are recomputed from indicator state each cycle.

use std::fmt;

use chrono::{NaiveDateTime, NaiveTime};

use crate::domain::indicator::IndicatorSnapshot;
use crate::domain::indicator::opening_range::BreachSide;
use crate::domain::position::PositionRecord;
use crate::domain::strategy::{BandExit, BreakoutConflict, StrategyKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Long,
    Short,
    Flat,
    Hold,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Long => write!(f, "LONG"),
            Signal::Short => write!(f, "SHORT"),
            Signal::Flat => write!(f, "FLAT"),
            Signal::Hold => write!(f, "HOLD"),
        }
    }
}

/// A signal together with the observation that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalEvent {
    pub signal: Signal,
    pub index: u64,
    pub timestamp: NaiveDateTime,
}

#[derive(Debug, Clone)]
pub struct SignalGenerator {
    kind: StrategyKind,
    /// Cutoff after which intraday variants only flatten.
    flatten_at: NaiveTime,
}

impl SignalGenerator {
    pub fn new(kind: StrategyKind, flatten_at: NaiveTime) -> Self {
        Self { kind, flatten_at }
    }

    pub fn evaluate(
        &self,
        snapshot: &IndicatorSnapshot,
        previous: Option<&IndicatorSnapshot>,
        record: &PositionRecord,
    ) -> SignalEvent {
        let side = record.target.signum();
        let signal = match &self.kind {
            StrategyKind::DualMa { .. } => dual_ma(snapshot, previous, side),
            StrategyKind::BandBreakout {
                min_bandwidth,
                exit,
                ..
            } => band_breakout(snapshot, *min_bandwidth, *exit, side),
            StrategyKind::MeanReversion {
                oversold,
                overbought,
                neutral_low,
                neutral_high,
                ..
            } => mean_reversion(
                snapshot,
                previous,
                side,
                (*oversold, *overbought),
                (*neutral_low, *neutral_high),
            ),
            StrategyKind::IntradayBreakout { conflict, .. } => {
                self.intraday_breakout(snapshot, *conflict, side)
            }
            StrategyKind::ChannelBreakout {
                pyramid_step,
                max_units,
                ..
            } => channel_breakout(snapshot, record, *pyramid_step, *max_units),
        };
        SignalEvent {
            signal,
            index: snapshot.index,
            timestamp: snapshot.timestamp,
        }
    }

    fn intraday_breakout(
        &self,
        snap: &IndicatorSnapshot,
        conflict: BreakoutConflict,
        side: i64,
    ) -> Signal {
        if snap.timestamp.time() >= self.flatten_at {
            return if side != 0 { Signal::Flat } else { Signal::Hold };
        }
        let Some(bands) = snap.breakout else {
            return Signal::Hold;
        };

        let touched_up = snap.high > bands.upper;
        let touched_down = snap.low < bands.lower;
        let wanted = if touched_up && touched_down {
            match (conflict, bands.first_breach) {
                (BreakoutConflict::FirstDetected, Some(BreachSide::Upper)) => Signal::Long,
                (BreakoutConflict::FirstDetected, Some(BreachSide::Lower)) => Signal::Short,
                _ => Signal::Hold,
            }
        } else if snap.price > bands.upper {
            Signal::Long
        } else if snap.price < bands.lower {
            Signal::Short
        } else {
            Signal::Hold
        };
        unless_held(wanted, side)
    }
}

/// Suppress an entry in the direction already held.
fn unless_held(signal: Signal, side: i64) -> Signal {
    match (signal, side) {
        (Signal::Long, 1) | (Signal::Short, -1) | (Signal::Flat, 0) => Signal::Hold,
        _ => signal,
    }
}

fn dual_ma(snap: &IndicatorSnapshot, previous: Option<&IndicatorSnapshot>, side: i64) -> Signal {
    let (Some(fast), Some(slow)) = (snap.fast_ma, snap.slow_ma) else {
        return Signal::Hold;
    };
    let Some((prev_fast, prev_slow)) = previous.and_then(|p| p.fast_ma.zip(p.slow_ma)) else {
        return Signal::Hold;
    };

    let wanted = if prev_fast <= prev_slow && fast > slow {
        Signal::Long
    } else if prev_fast >= prev_slow && fast < slow {
        Signal::Short
    } else {
        Signal::Hold
    };
    unless_held(wanted, side)
}

fn band_breakout(snap: &IndicatorSnapshot, min_bandwidth: f64, exit: BandExit, side: i64) -> Signal {
    let Some(bands) = snap.bollinger else {
        return Signal::Hold;
    };
    let close = snap.price;

    let exiting = match (exit, side) {
        (BandExit::Band, 1) => close <= bands.upper,
        (BandExit::Band, -1) => close >= bands.lower,
        (BandExit::Middle, 1) => close < bands.middle,
        (BandExit::Middle, -1) => close > bands.middle,
        _ => false,
    };
    if exiting {
        return Signal::Flat;
    }

    if bands.bandwidth <= min_bandwidth {
        return Signal::Hold;
    }
    let wanted = if close > bands.upper {
        Signal::Long
    } else if close < bands.lower {
        Signal::Short
    } else {
        Signal::Hold
    };
    unless_held(wanted, side)
}

fn mean_reversion(
    snap: &IndicatorSnapshot,
    previous: Option<&IndicatorSnapshot>,
    side: i64,
    (oversold, overbought): (f64, f64),
    (neutral_low, neutral_high): (f64, f64),
) -> Signal {
    let Some(rsi) = snap.rsi else {
        return Signal::Hold;
    };
    if side != 0 && (neutral_low..=neutral_high).contains(&rsi) {
        return Signal::Flat;
    }
    if side != 0 {
        return Signal::Hold;
    }

    let Some(prev) = previous.and_then(|p| p.rsi) else {
        return Signal::Hold;
    };
    if prev >= oversold && rsi < oversold {
        Signal::Long
    } else if prev <= overbought && rsi > overbought {
        Signal::Short
    } else {
        Signal::Hold
    }
}

fn channel_breakout(
    snap: &IndicatorSnapshot,
    record: &PositionRecord,
    pyramid_step: f64,
    max_units: u32,
) -> Signal {
    let (Some(entry), Some(exit)) = (snap.entry_channel, snap.exit_channel) else {
        return Signal::Hold;
    };
    let close = snap.price;
    let side = record.target.signum();

    match side {
        1 if close < exit.lower => Signal::Flat,
        -1 if close > exit.upper => Signal::Flat,
        0 if close > entry.upper => Signal::Long,
        0 if close < entry.lower => Signal::Short,
        0 => Signal::Hold,
        _ => {
            let settled = record.is_settled();
            if !settled || record.units >= max_units {
                return Signal::Hold;
            }
            let (Some(atr), Some(last_add)) = (snap.atr, record.last_add_price) else {
                return Signal::Hold;
            };
            let step = pyramid_step * atr;
            if side > 0 && close >= last_add + step {
                Signal::Long
            } else if side < 0 && close <= last_add - step {
                Signal::Short
            } else {
                Signal::Hold
            }
        }
    }
}
