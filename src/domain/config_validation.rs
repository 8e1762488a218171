//! Configuration validation.
//!
//! Validates every engine config field before the engine is built.

use chrono::{NaiveTime, Timelike};

use crate::domain::error::FutcoreError;
use crate::ports::config_port::ConfigPort;

pub const STRATEGY_KINDS: [&str; 5] = [
    "dual_ma",
    "band_breakout",
    "mean_reversion",
    "intraday_breakout",
    "channel_breakout",
];

pub fn validate_engine_config(config: &dyn ConfigPort) -> Result<(), FutcoreError> {
    validate_instrument(config)?;
    let kind = validate_strategy_kind(config)?;
    match kind.as_str() {
        "dual_ma" => validate_dual_ma(config)?,
        "band_breakout" => validate_band_breakout(config)?,
        "mean_reversion" => validate_mean_reversion(config)?,
        "intraday_breakout" => validate_intraday_breakout(config)?,
        _ => validate_channel_breakout(config)?,
    }
    validate_sizing(config)?;
    validate_stop(config)?;
    validate_session(config)?;
    validate_orders(config)?;
    Ok(())
}

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> FutcoreError {
    FutcoreError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

/// Integer value, rejecting text that is present but not a number.
pub(crate) fn checked_int(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: i64,
) -> Result<i64, FutcoreError> {
    match config.get_string(section, key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<i64>()
            .map_err(|_| invalid(section, key, format!("'{raw}' is not an integer"))),
    }
}

pub(crate) fn checked_double(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: f64,
) -> Result<f64, FutcoreError> {
    match config.get_string(section, key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| invalid(section, key, format!("'{raw}' is not a number"))),
    }
}

/// Lower-cased choice from a fixed set.
pub(crate) fn checked_choice(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: &str,
    allowed: &[&str],
) -> Result<String, FutcoreError> {
    let value = config
        .get_string(section, key)
        .map(|v| v.trim().to_lowercase())
        .unwrap_or_else(|| default.to_string());
    if allowed.contains(&value.as_str()) {
        Ok(value)
    } else {
        Err(invalid(
            section,
            key,
            format!("'{value}' is not one of {}", allowed.join("|")),
        ))
    }
}

fn positive_int(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: i64,
) -> Result<i64, FutcoreError> {
    let value = checked_int(config, section, key, default)?;
    if value < 1 {
        return Err(invalid(section, key, format!("{key} must be at least 1")));
    }
    Ok(value)
}

fn positive_double(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: f64,
) -> Result<f64, FutcoreError> {
    let value = checked_double(config, section, key, default)?;
    if value <= 0.0 {
        return Err(invalid(section, key, format!("{key} must be positive")));
    }
    Ok(value)
}

pub(crate) fn parse_time(section: &str, key: &str, value: &str) -> Result<NaiveTime, FutcoreError> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value.trim(), "%H:%M:%S"))
        .map_err(|_| invalid(section, key, format!("invalid {key} '{value}', expected HH:MM")))
}

fn validate_instrument(config: &dyn ConfigPort) -> Result<(), FutcoreError> {
    match config.get_string("instrument", "symbol") {
        Some(s) if !s.trim().is_empty() => {}
        _ => {
            return Err(FutcoreError::ConfigMissing {
                section: "instrument".to_string(),
                key: "symbol".to_string(),
            });
        }
    }
    positive_int(config, "instrument", "bar_period", 60)?;
    Ok(())
}

fn validate_strategy_kind(config: &dyn ConfigPort) -> Result<String, FutcoreError> {
    if config.get_string("strategy", "kind").is_none() {
        return Err(FutcoreError::ConfigMissing {
            section: "strategy".to_string(),
            key: "kind".to_string(),
        });
    }
    checked_choice(config, "strategy", "kind", "", &STRATEGY_KINDS)
}

fn validate_dual_ma(config: &dyn ConfigPort) -> Result<(), FutcoreError> {
    let fast = positive_int(config, "strategy", "fast", 5)?;
    let slow = positive_int(config, "strategy", "slow", 20)?;
    if fast >= slow {
        return Err(invalid("strategy", "fast", "fast must be shorter than slow"));
    }
    checked_choice(config, "strategy", "average", "sma", &["sma", "ema"])?;
    Ok(())
}

fn validate_band_breakout(config: &dyn ConfigPort) -> Result<(), FutcoreError> {
    let period = positive_int(config, "strategy", "period", 20)?;
    if period < 2 {
        return Err(invalid("strategy", "period", "period must be at least 2"));
    }
    positive_double(config, "strategy", "k", 2.0)?;
    let min_bandwidth = checked_double(config, "strategy", "min_bandwidth", 0.01)?;
    if min_bandwidth < 0.0 {
        return Err(invalid(
            "strategy",
            "min_bandwidth",
            "min_bandwidth must be non-negative",
        ));
    }
    checked_choice(config, "strategy", "exit", "middle", &["none", "band", "middle"])?;
    Ok(())
}

fn validate_mean_reversion(config: &dyn ConfigPort) -> Result<(), FutcoreError> {
    positive_int(config, "strategy", "period", 14)?;
    let oversold = checked_double(config, "strategy", "oversold", 30.0)?;
    let neutral_low = checked_double(config, "strategy", "neutral_low", 45.0)?;
    let neutral_high = checked_double(config, "strategy", "neutral_high", 55.0)?;
    let overbought = checked_double(config, "strategy", "overbought", 70.0)?;
    if !(0.0 < oversold
        && oversold < neutral_low
        && neutral_low <= neutral_high
        && neutral_high < overbought
        && overbought < 100.0)
    {
        return Err(invalid(
            "strategy",
            "oversold",
            "thresholds must satisfy 0 < oversold < neutral_low <= neutral_high < overbought < 100",
        ));
    }
    Ok(())
}

fn validate_intraday_breakout(config: &dyn ConfigPort) -> Result<(), FutcoreError> {
    positive_int(config, "strategy", "lookback_sessions", 4)?;
    positive_double(config, "strategy", "k1", 0.5)?;
    positive_double(config, "strategy", "k2", 0.5)?;
    checked_choice(
        config,
        "strategy",
        "conflict",
        "first_detected",
        &["first_detected", "hold"],
    )?;
    Ok(())
}

fn validate_channel_breakout(config: &dyn ConfigPort) -> Result<(), FutcoreError> {
    positive_int(config, "strategy", "entry_window", 20)?;
    positive_int(config, "strategy", "exit_window", 10)?;
    positive_double(config, "strategy", "pyramid_step", 0.5)?;
    positive_int(config, "strategy", "max_units", 4)?;
    Ok(())
}

fn validate_sizing(config: &dyn ConfigPort) -> Result<(), FutcoreError> {
    let sizing = checked_choice(config, "risk", "sizing", "fixed", &["fixed", "volatility"])?;
    positive_int(config, "risk", "atr_window", 20)?;
    if sizing == "fixed" {
        positive_int(config, "risk", "lots", 1)?;
        return Ok(());
    }

    let fraction = checked_double(config, "risk", "risk_fraction", 0.01)?;
    if fraction <= 0.0 || fraction > 1.0 {
        return Err(invalid(
            "risk",
            "risk_fraction",
            "risk_fraction must be between 0 and 1",
        ));
    }
    if config.get_string("risk", "risk_budget").is_some() {
        positive_double(config, "risk", "risk_budget", 0.0)?;
    }
    positive_double(config, "risk", "atr_multiple", 2.0)?;
    positive_double(config, "risk", "contract_multiplier", 1.0)?;
    positive_int(config, "risk", "max_lots", 10)?;
    Ok(())
}

fn validate_stop(config: &dyn ConfigPort) -> Result<(), FutcoreError> {
    let stop = checked_choice(
        config,
        "risk",
        "stop",
        "none",
        &["none", "fixed_pct", "atr", "atr_trailing"],
    )?;
    match stop.as_str() {
        "fixed_pct" => {
            if config.get_string("risk", "stop_pct").is_none() {
                return Err(FutcoreError::ConfigMissing {
                    section: "risk".to_string(),
                    key: "stop_pct".to_string(),
                });
            }
            let pct = checked_double(config, "risk", "stop_pct", 0.0)?;
            if pct <= 0.0 || pct >= 1.0 {
                return Err(invalid("risk", "stop_pct", "stop_pct must be between 0 and 1"));
            }
        }
        "atr" | "atr_trailing" => {
            positive_double(config, "risk", "stop_atr_multiple", 2.0)?;
        }
        _ => {}
    }
    Ok(())
}

fn validate_session(config: &dyn ConfigPort) -> Result<(), FutcoreError> {
    let close = match config.get_string("session", "close") {
        Some(close) => parse_time("session", "close", &close)?,
        None => parse_time("session", "close", "15:00")?,
    };
    // The cutoff must stay on the same day as the close.
    let limit = i64::from(close.num_seconds_from_midnight() / 60);
    let buffer = checked_int(config, "session", "flatten_buffer_minutes", 10)?;
    if !(0..=limit).contains(&buffer) {
        return Err(invalid(
            "session",
            "flatten_buffer_minutes",
            format!("flatten_buffer_minutes must be between 0 and {limit} for close {close}"),
        ));
    }
    Ok(())
}

fn validate_orders(config: &dyn ConfigPort) -> Result<(), FutcoreError> {
    let retries = checked_int(config, "orders", "max_retries", 3)?;
    if retries < 0 {
        return Err(invalid("orders", "max_retries", "max_retries must be non-negative"));
    }
    Ok(())
}
