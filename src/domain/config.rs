//! Engine configuration assembled from a validated [`ConfigPort`].
//!
//! Everything the orchestrator needs is carried explicitly in
//! [`EngineConfig`]; nothing is read from globals after construction.

use chrono::{NaiveTime, TimeDelta};

use crate::domain::config_validation::{
    checked_choice, checked_double, checked_int, parse_time, validate_engine_config, STRATEGY_KINDS,
};
use crate::domain::error::FutcoreError;
use crate::domain::indicator::AverageKind;
use crate::domain::position::OrderPolicy;
use crate::domain::risk::{SessionRules, Sizing, StopRule};
use crate::domain::strategy::{BandExit, BreakoutConflict, StrategyKind};
use crate::ports::config_port::ConfigPort;

#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub close: NaiveTime,
    pub flatten_buffer_minutes: u32,
    pub no_overnight: bool,
    pub flatten_on_shutdown: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub instrument: String,
    /// Bar period in seconds.
    pub bar_period: u32,
    pub strategy: StrategyKind,
    pub sizing: Sizing,
    pub stop: StopRule,
    pub atr_window: usize,
    pub session: SessionConfig,
    pub orders: OrderPolicy,
}

impl EngineConfig {
    /// Session close minus the flatten buffer.
    pub fn flatten_at(&self) -> NaiveTime {
        self.session.close - TimeDelta::minutes(i64::from(self.session.flatten_buffer_minutes))
    }

    pub fn session_rules(&self) -> SessionRules {
        SessionRules {
            flatten_at: self.flatten_at(),
            time_exit: self.strategy.is_intraday(),
            no_overnight: self.session.no_overnight,
        }
    }
}

/// Validate `config` and build the engine configuration from it.
pub fn build_engine_config(config: &dyn ConfigPort) -> Result<EngineConfig, FutcoreError> {
    validate_engine_config(config)?;

    let instrument = config
        .get_string("instrument", "symbol")
        .map(|s| s.trim().to_string())
        .unwrap_or_default();
    let strategy = build_strategy(config)?;
    let no_overnight_default = strategy.is_intraday();

    let close = match config.get_string("session", "close") {
        Some(value) => parse_time("session", "close", &value)?,
        None => parse_time("session", "close", "15:00")?,
    };

    Ok(EngineConfig {
        instrument,
        bar_period: to_u32(checked_int(config, "instrument", "bar_period", 60)?),
        sizing: build_sizing(config)?,
        stop: build_stop(config)?,
        atr_window: to_usize(checked_int(config, "risk", "atr_window", 20)?),
        session: SessionConfig {
            close,
            flatten_buffer_minutes: to_u32(checked_int(
                config,
                "session",
                "flatten_buffer_minutes",
                10,
            )?),
            no_overnight: config.get_bool("session", "no_overnight", no_overnight_default),
            flatten_on_shutdown: config.get_bool("session", "flatten_on_shutdown", true),
        },
        orders: OrderPolicy {
            max_retries: to_u32(checked_int(config, "orders", "max_retries", 3)?),
            limit_orders: config.get_bool("orders", "limit_orders", false),
        },
        strategy,
    })
}

fn to_usize(value: i64) -> usize {
    usize::try_from(value).unwrap_or(1)
}

fn to_u32(value: i64) -> u32 {
    u32::try_from(value).unwrap_or(0)
}

fn build_strategy(config: &dyn ConfigPort) -> Result<StrategyKind, FutcoreError> {
    let s = "strategy";
    let kind = checked_choice(config, s, "kind", "", &STRATEGY_KINDS)?;
    let strategy = match kind.as_str() {
        "dual_ma" => StrategyKind::DualMa {
            average: match checked_choice(config, s, "average", "sma", &["sma", "ema"])?.as_str() {
                "ema" => AverageKind::Ema,
                _ => AverageKind::Sma,
            },
            fast: to_usize(checked_int(config, s, "fast", 5)?),
            slow: to_usize(checked_int(config, s, "slow", 20)?),
        },
        "band_breakout" => StrategyKind::BandBreakout {
            period: to_usize(checked_int(config, s, "period", 20)?),
            k: checked_double(config, s, "k", 2.0)?,
            min_bandwidth: checked_double(config, s, "min_bandwidth", 0.01)?,
            exit: match checked_choice(config, s, "exit", "middle", &["none", "band", "middle"])?
                .as_str()
            {
                "none" => BandExit::None,
                "band" => BandExit::Band,
                _ => BandExit::Middle,
            },
        },
        "mean_reversion" => StrategyKind::MeanReversion {
            period: to_usize(checked_int(config, s, "period", 14)?),
            oversold: checked_double(config, s, "oversold", 30.0)?,
            overbought: checked_double(config, s, "overbought", 70.0)?,
            neutral_low: checked_double(config, s, "neutral_low", 45.0)?,
            neutral_high: checked_double(config, s, "neutral_high", 55.0)?,
        },
        "intraday_breakout" => StrategyKind::IntradayBreakout {
            lookback_sessions: to_usize(checked_int(config, s, "lookback_sessions", 4)?),
            k1: checked_double(config, s, "k1", 0.5)?,
            k2: checked_double(config, s, "k2", 0.5)?,
            conflict: match checked_choice(
                config,
                s,
                "conflict",
                "first_detected",
                &["first_detected", "hold"],
            )?
            .as_str()
            {
                "hold" => BreakoutConflict::Hold,
                _ => BreakoutConflict::FirstDetected,
            },
        },
        _ => StrategyKind::ChannelBreakout {
            entry_window: to_usize(checked_int(config, s, "entry_window", 20)?),
            exit_window: to_usize(checked_int(config, s, "exit_window", 10)?),
            pyramid_step: checked_double(config, s, "pyramid_step", 0.5)?,
            max_units: to_u32(checked_int(config, s, "max_units", 4)?),
        },
    };
    Ok(strategy)
}

fn build_sizing(config: &dyn ConfigPort) -> Result<Sizing, FutcoreError> {
    let r = "risk";
    let sizing = match checked_choice(config, r, "sizing", "fixed", &["fixed", "volatility"])?.as_str() {
        "volatility" => Sizing::Volatility {
            risk_fraction: checked_double(config, r, "risk_fraction", 0.01)?,
            risk_budget: match config.get_string(r, "risk_budget") {
                Some(_) => Some(checked_double(config, r, "risk_budget", 0.0)?),
                None => None,
            },
            atr_multiple: checked_double(config, r, "atr_multiple", 2.0)?,
            contract_multiplier: checked_double(config, r, "contract_multiplier", 1.0)?,
            max_lots: to_u32(checked_int(config, r, "max_lots", 10)?),
        },
        _ => Sizing::Fixed {
            lots: to_u32(checked_int(config, r, "lots", 1)?),
        },
    };
    Ok(sizing)
}

fn build_stop(config: &dyn ConfigPort) -> Result<StopRule, FutcoreError> {
    let r = "risk";
    let multiple = checked_double(config, r, "stop_atr_multiple", 2.0)?;
    let rule = match checked_choice(
        config,
        r,
        "stop",
        "none",
        &["none", "fixed_pct", "atr", "atr_trailing"],
    )?
    .as_str()
    {
        "fixed_pct" => StopRule::FixedPct {
            pct: checked_double(config, r, "stop_pct", 0.0)?,
        },
        "atr" => StopRule::Atr { multiple },
        "atr_trailing" => StopRule::AtrTrailing { multiple },
        _ => StopRule::None,
    };
    Ok(rule)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;

    fn build(content: &str) -> Result<EngineConfig, FutcoreError> {
        build_engine_config(&FileConfigAdapter::from_string(content).unwrap())
    }

    #[test]
    fn defaults_for_dual_ma() {
        let cfg = build("[instrument]\nsymbol = SHFE.rb2501\n[strategy]\nkind = dual_ma\n").unwrap();
        assert_eq!(cfg.instrument, "SHFE.rb2501");
        assert_eq!(cfg.bar_period, 60);
        assert_eq!(
            cfg.strategy,
            StrategyKind::DualMa {
                average: AverageKind::Sma,
                fast: 5,
                slow: 20
            }
        );
        assert_eq!(cfg.sizing, Sizing::Fixed { lots: 1 });
        assert_eq!(cfg.stop, StopRule::None);
        assert_eq!(cfg.orders, OrderPolicy::default());
        assert!(!cfg.session.no_overnight);
        assert!(cfg.session.flatten_on_shutdown);
        assert_eq!(cfg.flatten_at(), NaiveTime::from_hms_opt(14, 50, 0).unwrap());
        assert!(!cfg.session_rules().time_exit);
    }

    #[test]
    fn intraday_defaults_to_no_overnight() {
        let cfg = build(
            "[instrument]\nsymbol = SHFE.cu2501\n[strategy]\nkind = intraday_breakout\nconflict = hold\n[session]\nclose = 15:00\nflatten_buffer_minutes = 10\n",
        )
        .unwrap();
        assert!(cfg.session.no_overnight);
        let rules = cfg.session_rules();
        assert!(rules.time_exit);
        assert_eq!(rules.flatten_at, NaiveTime::from_hms_opt(14, 50, 0).unwrap());
        assert!(matches!(
            cfg.strategy,
            StrategyKind::IntradayBreakout {
                conflict: BreakoutConflict::Hold,
                ..
            }
        ));
    }

    #[test]
    fn volatility_sizing_and_trailing_stop() {
        let cfg = build(
            r#"
[instrument]
symbol = INE.sc2501
[strategy]
kind = channel_breakout
max_units = 3
[risk]
sizing = volatility
risk_fraction = 0.02
risk_budget = 5000
atr_multiple = 1.0
contract_multiplier = 1000
max_lots = 8
stop = atr_trailing
stop_atr_multiple = 3
[orders]
limit_orders = true
max_retries = 5
"#,
        )
        .unwrap();
        assert_eq!(
            cfg.sizing,
            Sizing::Volatility {
                risk_fraction: 0.02,
                risk_budget: Some(5000.0),
                atr_multiple: 1.0,
                contract_multiplier: 1000.0,
                max_lots: 8,
            }
        );
        assert_eq!(cfg.stop, StopRule::AtrTrailing { multiple: 3.0 });
        assert_eq!(cfg.strategy.max_units(), 3);
        assert!(cfg.orders.limit_orders);
        assert_eq!(cfg.orders.max_retries, 5);
    }

    #[test]
    fn band_exit_modes_parse() {
        let cfg = build(
            "[instrument]\nsymbol = DCE.m2501\n[strategy]\nkind = band_breakout\nexit = band\n",
        )
        .unwrap();
        assert!(matches!(
            cfg.strategy,
            StrategyKind::BandBreakout {
                exit: BandExit::Band,
                ..
            }
        ));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let err = build("[instrument]\nsymbol = x\n[strategy]\nkind = nope\n").unwrap_err();
        assert!(matches!(err, FutcoreError::ConfigInvalid { .. }));
    }
}
