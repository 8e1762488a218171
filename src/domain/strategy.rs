//! Strategy variants and their fixed parameters.
//!
//! One closed set of variants shares the indicator engine, risk module and
//! position state machine. Each variant declares the indicators it reads.

use std::fmt;

use crate::domain::indicator::{AverageKind, IndicatorSpec};

/// Long exit rule for the band breakout (mirrored for shorts).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BandExit {
    /// Hold until the stop or an opposite breakout.
    None,
    /// Exit once the close is back inside the bands.
    Band,
    /// Exit once the close crosses the middle band against the position.
    Middle,
}

/// What to do when both breakout bands are hit within one observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakoutConflict {
    /// Follow the band that was breached first in the session; HOLD if
    /// neither was breached before.
    FirstDetected,
    Hold,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StrategyKind {
    DualMa {
        average: AverageKind,
        fast: usize,
        slow: usize,
    },
    BandBreakout {
        period: usize,
        k: f64,
        min_bandwidth: f64,
        exit: BandExit,
    },
    MeanReversion {
        period: usize,
        oversold: f64,
        overbought: f64,
        neutral_low: f64,
        neutral_high: f64,
    },
    IntradayBreakout {
        lookback_sessions: usize,
        k1: f64,
        k2: f64,
        conflict: BreakoutConflict,
    },
    ChannelBreakout {
        entry_window: usize,
        exit_window: usize,
        /// Favourable move, in ATR units, required before adding a unit.
        pyramid_step: f64,
        max_units: u32,
    },
}

impl StrategyKind {
    /// Config name of the variant.
    pub fn name(&self) -> &'static str {
        match self {
            StrategyKind::DualMa { .. } => "dual_ma",
            StrategyKind::BandBreakout { .. } => "band_breakout",
            StrategyKind::MeanReversion { .. } => "mean_reversion",
            StrategyKind::IntradayBreakout { .. } => "intraday_breakout",
            StrategyKind::ChannelBreakout { .. } => "channel_breakout",
        }
    }

    /// Intraday variants evaluate on every observation and are flattened
    /// before the session close.
    pub fn is_intraday(&self) -> bool {
        matches!(self, StrategyKind::IntradayBreakout { .. })
    }

    /// Maximum number of entry units per position (1 unless pyramiding).
    pub fn max_units(&self) -> u32 {
        match self {
            StrategyKind::ChannelBreakout { max_units, .. } => (*max_units).max(1),
            _ => 1,
        }
    }

    /// Indicators this variant reads. ATR is always maintained for sizing
    /// and stops.
    pub fn indicator_spec(&self, atr_window: usize) -> IndicatorSpec {
        let base = IndicatorSpec::atr_only(atr_window);
        match *self {
            StrategyKind::DualMa {
                average,
                fast,
                slow,
            } => IndicatorSpec {
                moving_averages: Some((average, fast, slow)),
                ..base
            },
            StrategyKind::BandBreakout { period, k, .. } => IndicatorSpec {
                bollinger: Some((period, k)),
                ..base
            },
            StrategyKind::MeanReversion { period, .. } => IndicatorSpec {
                rsi: Some(period),
                ..base
            },
            StrategyKind::IntradayBreakout {
                lookback_sessions,
                k1,
                k2,
                ..
            } => IndicatorSpec {
                opening_range: Some((lookback_sessions, k1, k2)),
                ..base
            },
            StrategyKind::ChannelBreakout {
                entry_window,
                exit_window,
                ..
            } => IndicatorSpec {
                channels: Some((entry_window, exit_window)),
                ..base
            },
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyKind::DualMa {
                average,
                fast,
                slow,
            } => write!(f, "dual_ma {average}({fast}/{slow})"),
            StrategyKind::BandBreakout {
                period,
                k,
                min_bandwidth,
                exit,
            } => write!(
                f,
                "band_breakout BOLL({period},{k}) min_bw={min_bandwidth} exit={exit:?}"
            ),
            StrategyKind::MeanReversion {
                period,
                oversold,
                overbought,
                neutral_low,
                neutral_high,
            } => write!(
                f,
                "mean_reversion RSI({period}) {oversold}/{overbought} neutral {neutral_low}-{neutral_high}"
            ),
            StrategyKind::IntradayBreakout {
                lookback_sessions,
                k1,
                k2,
                conflict,
            } => write!(
                f,
                "intraday_breakout N={lookback_sessions} k1={k1} k2={k2} conflict={conflict:?}"
            ),
            StrategyKind::ChannelBreakout {
                entry_window,
                exit_window,
                pyramid_step,
                max_units,
            } => write!(
                f,
                "channel_breakout {entry_window}/{exit_window} step={pyramid_step}N units<={max_units}"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turtle() -> StrategyKind {
        StrategyKind::ChannelBreakout {
            entry_window: 20,
            exit_window: 10,
            pyramid_step: 0.5,
            max_units: 4,
        }
    }

    #[test]
    fn names() {
        assert_eq!(turtle().name(), "channel_breakout");
        let dt = StrategyKind::IntradayBreakout {
            lookback_sessions: 4,
            k1: 0.5,
            k2: 0.5,
            conflict: BreakoutConflict::FirstDetected,
        };
        assert_eq!(dt.name(), "intraday_breakout");
        assert!(dt.is_intraday());
        assert!(!turtle().is_intraday());
    }

    #[test]
    fn only_channel_breakout_allows_multiple_units() {
        assert_eq!(turtle().max_units(), 4);
        let ma = StrategyKind::DualMa {
            average: AverageKind::Ema,
            fast: 5,
            slow: 20,
        };
        assert_eq!(ma.max_units(), 1);
    }

    #[test]
    fn indicator_spec_per_variant() {
        let spec = turtle().indicator_spec(20);
        assert_eq!(spec.channels, Some((20, 10)));
        assert_eq!(spec.atr, 20);
        assert!(spec.moving_averages.is_none());

        let rsi = StrategyKind::MeanReversion {
            period: 14,
            oversold: 30.0,
            overbought: 70.0,
            neutral_low: 45.0,
            neutral_high: 55.0,
        };
        let spec = rsi.indicator_spec(14);
        assert_eq!(spec.rsi, Some(14));
        assert!(spec.bollinger.is_none());
    }

    #[test]
    fn display_mentions_parameters() {
        let ma = StrategyKind::DualMa {
            average: AverageKind::Sma,
            fast: 5,
            slow: 20,
        };
        assert_eq!(ma.to_string(), "dual_ma SMA(5/20)");
    }
}
