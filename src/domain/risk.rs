//! Risk and sizing: position size, stop levels and forced exits.
//!
//! The risk module turns a signal into a [`PositionIntent`]. Forced exits
//! (session close, overnight carry, stop-loss) are evaluated every cycle and
//! override whatever the signal generator proposed.

use chrono::{NaiveDate, NaiveTime};
use tracing::info;

use crate::domain::indicator::IndicatorSnapshot;
use crate::domain::position::{IntentReason, PositionIntent, PositionRecord};
use crate::domain::signal::{Signal, SignalEvent};
use crate::ports::order_port::AccountState;

/// How the quantity of an intent was derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizingBasis {
    Fixed,
    Volatility,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Sizing {
    Fixed {
        lots: u32,
    },
    /// `floor(budget / (atr_multiple * atr * contract_multiplier))`,
    /// clamped to `[1, max_lots]`. The budget never exceeds the account's
    /// available margin.
    Volatility {
        risk_fraction: f64,
        /// Absolute budget; overrides `balance * risk_fraction` when set.
        risk_budget: Option<f64>,
        atr_multiple: f64,
        contract_multiplier: f64,
        max_lots: u32,
    },
}

impl Sizing {
    pub fn basis(&self) -> SizingBasis {
        match self {
            Sizing::Fixed { .. } => SizingBasis::Fixed,
            Sizing::Volatility { .. } => SizingBasis::Volatility,
        }
    }

    pub fn lots(&self, atr: Option<f64>, account: &AccountState) -> u32 {
        match *self {
            Sizing::Fixed { lots } => lots.max(1),
            Sizing::Volatility {
                risk_fraction,
                risk_budget,
                atr_multiple,
                contract_multiplier,
                max_lots,
            } => {
                let max_lots = max_lots.max(1);
                let Some(atr) = atr.filter(|a| *a > 0.0) else {
                    return 1;
                };
                let budget = risk_budget
                    .unwrap_or(account.balance * risk_fraction)
                    .min(account.available_margin.max(0.0));
                let per_lot = atr_multiple * atr * contract_multiplier;
                if per_lot <= 0.0 || budget <= 0.0 {
                    return 1;
                }
                let raw = (budget / per_lot).floor();
                if raw >= f64::from(max_lots) {
                    max_lots
                } else if raw < 1.0 {
                    1
                } else {
                    raw as u32
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StopRule {
    None,
    /// Fraction of the entry price, e.g. 0.02 for 2%.
    FixedPct { pct: f64 },
    /// Fixed distance of `multiple * ATR` from the entry price.
    Atr { multiple: f64 },
    /// Starts like `Atr`, then ratchets with every closed bar and never
    /// loosens.
    AtrTrailing { multiple: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionRules {
    /// Session close minus the flatten buffer.
    pub flatten_at: NaiveTime,
    /// Unconditional flatten at `flatten_at` (intraday strategies).
    pub time_exit: bool,
    pub no_overnight: bool,
}

/// Outcome of one risk pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub intent: Option<PositionIntent>,
    /// Stop level the position should carry after this cycle.
    pub stop: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct RiskModule {
    sizing: Sizing,
    stop: StopRule,
    session: SessionRules,
    max_units: u32,
}

impl RiskModule {
    pub fn new(sizing: Sizing, stop: StopRule, session: SessionRules, max_units: u32) -> Self {
        Self {
            sizing,
            stop,
            session,
            max_units: max_units.max(1),
        }
    }

    /// Lots for a new entry or pyramid unit. Zero for non-entry signals.
    pub fn size(&self, signal: Signal, atr: Option<f64>, account: &AccountState) -> u32 {
        match signal {
            Signal::Long | Signal::Short => self.sizing.lots(atr, account),
            Signal::Flat | Signal::Hold => 0,
        }
    }

    /// True when the held exposure has traded through its stop.
    pub fn check_stop(&self, record: &PositionRecord, price: f64) -> bool {
        stop_hit(record.actual, record.stop_price, price)
    }

    pub fn time_exit(&self, record: &PositionRecord, snapshot: &IndicatorSnapshot) -> bool {
        self.session.time_exit
            && has_exposure(record)
            && snapshot.timestamp.time() >= self.session.flatten_at
    }

    pub fn overnight_exit(
        &self,
        record: &PositionRecord,
        snapshot: &IndicatorSnapshot,
        last_session: Option<NaiveDate>,
    ) -> bool {
        self.session.no_overnight
            && has_exposure(record)
            && last_session.is_some_and(|s| s != snapshot.session())
    }

    /// Stop level for the current exposure after folding in this snapshot.
    pub fn stop_level(&self, record: &PositionRecord, snapshot: &IndicatorSnapshot) -> Option<f64> {
        let side = record.actual.signum() as f64;
        if side == 0.0 {
            return None;
        }
        let anchored = record.stop_price.or_else(|| {
            let entry = record.entry_price?;
            match self.stop {
                StopRule::None => None,
                StopRule::FixedPct { pct } => Some(entry * (1.0 - side * pct)),
                StopRule::Atr { multiple } | StopRule::AtrTrailing { multiple } => {
                    snapshot.atr.map(|atr| entry - side * multiple * atr)
                }
            }
        });

        match (self.stop, anchored, snapshot.atr) {
            (StopRule::AtrTrailing { multiple }, Some(prev), Some(atr)) if snapshot.closed => {
                let candidate = snapshot.price - side * multiple * atr;
                Some(if side > 0.0 {
                    prev.max(candidate)
                } else {
                    prev.min(candidate)
                })
            }
            _ => anchored,
        }
    }

    /// Resolve forced exits and the signal into a position intent.
    ///
    /// Priority: session/overnight flatten, then stop-loss, then signal.
    pub fn assess(
        &self,
        event: &SignalEvent,
        snapshot: &IndicatorSnapshot,
        record: &PositionRecord,
        account: &AccountState,
        last_session: Option<NaiveDate>,
    ) -> Assessment {
        let stop = self.stop_level(record, snapshot);

        if self.time_exit(record, snapshot) {
            info!(instrument = %record.instrument, at = %snapshot.timestamp, "session close flatten");
            return Assessment {
                intent: Some(PositionIntent::flatten(IntentReason::SessionClose)),
                stop,
            };
        }
        if self.overnight_exit(record, snapshot, last_session) {
            info!(instrument = %record.instrument, at = %snapshot.timestamp, "overnight exposure flatten");
            return Assessment {
                intent: Some(PositionIntent::flatten(IntentReason::Overnight)),
                stop,
            };
        }
        if stop_hit(record.actual, stop, snapshot.price) {
            info!(
                instrument = %record.instrument,
                price = snapshot.price,
                stop = ?stop,
                "stop-loss triggered"
            );
            return Assessment {
                intent: Some(PositionIntent::flatten(IntentReason::StopLoss)),
                stop,
            };
        }

        Assessment {
            intent: self.signal_intent(event.signal, snapshot, record, account),
            stop,
        }
    }

    fn signal_intent(
        &self,
        signal: Signal,
        snapshot: &IndicatorSnapshot,
        record: &PositionRecord,
        account: &AccountState,
    ) -> Option<PositionIntent> {
        let side = match signal {
            Signal::Hold => return None,
            Signal::Flat => {
                return (record.target != 0)
                    .then(|| PositionIntent::flatten(IntentReason::Signal));
            }
            Signal::Long => 1,
            Signal::Short => -1,
        };

        let lots = i64::from(self.size(signal, snapshot.atr, account));
        let basis = self.sizing.basis();
        if record.target.signum() != side {
            return Some(PositionIntent {
                target: side * lots,
                basis,
                reason: IntentReason::Signal,
            });
        }

        let settled = record.is_settled();
        if self.max_units > 1 && settled && record.units < self.max_units {
            return Some(PositionIntent {
                target: record.actual + side * lots,
                basis,
                reason: IntentReason::Pyramid,
            });
        }
        None
    }
}

fn has_exposure(record: &PositionRecord) -> bool {
    record.actual != 0 || record.target != 0
}

fn stop_hit(exposure: i64, stop: Option<f64>, price: f64) -> bool {
    match (exposure.signum(), stop) {
        (1, Some(stop)) => price <= stop,
        (-1, Some(stop)) => price >= stop,
        _ => false,
    }
}
