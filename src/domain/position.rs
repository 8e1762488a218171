//! Position state machine.
//!
//! Owns the authoritative [`PositionRecord`] for one instrument and turns
//! position intents into order requests. At most one order is outstanding
//! at any time: while it is pending, new intents only move the target and
//! the difference is reconciled once the order completes.

use std::fmt;

use chrono::NaiveDateTime;
use tracing::{error, info, warn};

use crate::domain::error::FutcoreError;
use crate::domain::order::{Direction, FillReport, Offset, OrderId, OrderRequest};
use crate::domain::risk::SizingBasis;
use crate::ports::order_port::OrderGateway;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionState {
    Flat,
    EnteringLong,
    Long,
    ExitingLong,
    EnteringShort,
    Short,
    ExitingShort,
    /// Trading stopped for manual review.
    Halted,
}

impl fmt::Display for PositionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PositionState::Flat => "FLAT",
            PositionState::EnteringLong => "ENTERING_LONG",
            PositionState::Long => "LONG",
            PositionState::ExitingLong => "EXITING_LONG",
            PositionState::EnteringShort => "ENTERING_SHORT",
            PositionState::Short => "SHORT",
            PositionState::ExitingShort => "EXITING_SHORT",
            PositionState::Halted => "HALTED",
        };
        write!(f, "{s}")
    }
}

/// Why an intent was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentReason {
    Signal,
    Pyramid,
    StopLoss,
    SessionClose,
    Overnight,
    Shutdown,
}

/// Desired signed exposure in lots.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionIntent {
    pub target: i64,
    pub basis: SizingBasis,
    pub reason: IntentReason,
}

impl PositionIntent {
    pub fn flatten(reason: IntentReason) -> Self {
        Self {
            target: 0,
            basis: SizingBasis::Fixed,
            reason,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingOrder {
    pub id: OrderId,
    pub request: OrderRequest,
    pub filled: u32,
    fill_value: f64,
}

impl PendingOrder {
    pub fn new(id: OrderId, request: OrderRequest) -> Self {
        Self {
            id,
            request,
            filled: 0,
            fill_value: 0.0,
        }
    }

    pub fn remaining(&self) -> u32 {
        self.request.quantity - self.filled
    }

    /// Exposure once the remaining quantity fills.
    fn projected(&self, actual: i64) -> i64 {
        actual + self.request.direction.sign() * i64::from(self.remaining())
    }

    fn average_fill_price(&self) -> Option<f64> {
        (self.filled > 0).then(|| self.fill_value / f64::from(self.filled))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PositionRecord {
    pub instrument: String,
    pub state: PositionState,
    /// Filled exposure in signed lots.
    pub actual: i64,
    /// Desired exposure in signed lots.
    pub target: i64,
    pub basis: SizingBasis,
    pub pending: Option<PendingOrder>,
    pub stop_price: Option<f64>,
    /// Average entry price of the open exposure.
    pub entry_price: Option<f64>,
    pub entry_time: Option<NaiveDateTime>,
    /// Average fill price of the most recent completed opening order.
    pub last_add_price: Option<f64>,
    /// Completed opening orders on the current position.
    pub units: u32,
}

impl PositionRecord {
    pub fn new(instrument: impl Into<String>) -> Self {
        Self {
            instrument: instrument.into(),
            state: PositionState::Flat,
            actual: 0,
            target: 0,
            basis: SizingBasis::Fixed,
            pending: None,
            stop_price: None,
            entry_price: None,
            entry_time: None,
            last_add_price: None,
            units: 0,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.actual == 0 && self.pending.is_none()
    }

    pub fn is_halted(&self) -> bool {
        self.state == PositionState::Halted
    }

    /// Holding exposure with no order in flight.
    pub fn is_settled(&self) -> bool {
        self.pending.is_none() && matches!(self.state, PositionState::Long | PositionState::Short)
    }

    fn settled_state(&self) -> PositionState {
        match self.actual.signum() {
            1 => PositionState::Long,
            -1 => PositionState::Short,
            _ => PositionState::Flat,
        }
    }

    fn clear_exposure(&mut self) {
        self.stop_price = None;
        self.entry_price = None;
        self.entry_time = None;
        self.last_add_price = None;
        self.units = 0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrderPolicy {
    /// Consecutive rejections tolerated before the instrument is halted.
    pub max_retries: u32,
    /// Price orders at the last observed price instead of sending market
    /// orders.
    pub limit_orders: bool,
}

impl Default for OrderPolicy {
    fn default() -> Self {
        OrderPolicy {
            max_retries: 3,
            limit_orders: false,
        }
    }
}

/// An order the state machine handed to the gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct IssuedOrder {
    pub id: OrderId,
    pub request: OrderRequest,
}

#[derive(Debug, Clone)]
pub struct PositionStateMachine {
    record: PositionRecord,
    policy: OrderPolicy,
    rejections: u32,
}

impl PositionStateMachine {
    pub fn new(instrument: impl Into<String>, policy: OrderPolicy) -> Self {
        Self {
            record: PositionRecord::new(instrument),
            policy,
            rejections: 0,
        }
    }

    pub fn record(&self) -> &PositionRecord {
        &self.record
    }

    /// Take over exposure that already exists at the broker.
    pub fn adopt(&mut self, quantity: i64, average_price: f64) {
        if quantity == 0 {
            return;
        }
        let r = &mut self.record;
        r.actual = quantity;
        r.target = quantity;
        r.state = r.settled_state();
        r.entry_price = Some(average_price);
        r.last_add_price = Some(average_price);
        r.units = 1;
        info!(instrument = %r.instrument, quantity, average_price, "adopted existing position");
    }

    pub fn set_stop(&mut self, stop: Option<f64>) {
        if self.record.actual != 0 {
            self.record.stop_price = stop;
        }
    }

    /// Move the target and issue whatever order brings the position closer
    /// to it.
    pub fn apply(
        &mut self,
        intent: &PositionIntent,
        price: f64,
        gateway: &mut dyn OrderGateway,
    ) -> Result<Option<IssuedOrder>, FutcoreError> {
        self.ensure_active()?;
        if intent.target != self.record.target {
            info!(
                instrument = %self.record.instrument,
                from = self.record.target,
                to = intent.target,
                reason = ?intent.reason,
                "target changed"
            );
        }
        self.record.target = intent.target;
        self.record.basis = intent.basis;
        self.reconcile(price, gateway)
    }

    /// Issue the next order towards the target unless one is outstanding.
    ///
    /// A pending opening order that overshoots the target is cancelled.
    /// Pending closing orders always run to completion.
    pub fn reconcile(
        &mut self,
        price: f64,
        gateway: &mut dyn OrderGateway,
    ) -> Result<Option<IssuedOrder>, FutcoreError> {
        self.ensure_active()?;

        if let Some(pending) = &self.record.pending {
            let projected = pending.projected(self.record.actual);
            let overshoots = pending.request.offset == Offset::Open
                && (projected - self.record.target).signum() == pending.request.direction.sign();
            if !overshoots {
                return Ok(None);
            }
            self.cancel_pending(gateway)?;
        }

        let Some(request) = self.next_request(price) else {
            self.record.state = self.record.settled_state();
            return Ok(None);
        };
        self.submit(request, gateway).map(Some)
    }

    /// Apply a fill acknowledgement.
    ///
    /// A fill for an order the machine does not know about, or one that
    /// exceeds the outstanding quantity, halts the instrument.
    pub fn on_fill(
        &mut self,
        fill: &FillReport,
        price: f64,
        now: NaiveDateTime,
        gateway: &mut dyn OrderGateway,
    ) -> Result<Option<IssuedOrder>, FutcoreError> {
        self.ensure_active()?;

        match self.record.pending.as_ref().map(|p| (p.id, p.remaining())) {
            None => {
                return Err(self.halt(format!("fill for unknown order {}", fill.order_id)));
            }
            Some((expected, _)) if expected != fill.order_id => {
                return Err(self.halt(format!(
                    "fill for order {} while {} is outstanding",
                    fill.order_id, expected
                )));
            }
            Some((_, remaining)) if fill.quantity > remaining => {
                return Err(self.halt(format!(
                    "fill of {} exceeds remaining {} on order {}",
                    fill.quantity, remaining, fill.order_id
                )));
            }
            _ => {}
        }
        if fill.quantity == 0 {
            warn!(order_id = %fill.order_id, "ignoring empty fill");
            return Ok(None);
        }
        let Some(pending) = self.record.pending.as_mut() else {
            return Ok(None);
        };

        pending.filled += fill.quantity;
        pending.fill_value += f64::from(fill.quantity) * fill.price;
        let offset = pending.request.offset;
        let delta = pending.request.direction.sign() * i64::from(fill.quantity);
        let complete = pending.remaining() == 0;
        let order_average = pending.average_fill_price();

        let r = &mut self.record;
        let before = r.actual;
        r.actual += delta;
        if offset == Offset::Open {
            let held = before.unsigned_abs() as f64;
            let added = f64::from(fill.quantity);
            r.entry_price = Some(match r.entry_price {
                Some(entry) if before != 0 => (entry * held + fill.price * added) / (held + added),
                _ => fill.price,
            });
            r.entry_time.get_or_insert(now);
        }
        info!(
            instrument = %r.instrument,
            order_id = %fill.order_id,
            quantity = fill.quantity,
            price = fill.price,
            actual = r.actual,
            complete,
            "fill"
        );

        if !complete {
            return Ok(None);
        }

        r.pending = None;
        if offset == Offset::Open {
            r.units += 1;
            r.last_add_price = order_average;
        }
        r.state = r.settled_state();
        if r.actual == 0 {
            r.clear_exposure();
        }
        self.reconcile(price, gateway)
    }

    /// Cancel the outstanding order and optionally flatten.
    pub fn shutdown(
        &mut self,
        flatten: bool,
        price: f64,
        gateway: &mut dyn OrderGateway,
    ) -> Result<Option<IssuedOrder>, FutcoreError> {
        if self.record.is_halted() {
            return self.cancel_halted(gateway).map(|_| None);
        }
        if let Some(pending) = &self.record.pending {
            let projected = pending.projected(self.record.actual);
            match self.cancel_pending(gateway) {
                Ok(()) => {}
                Err(err) if err.is_recoverable() => {
                    // The order keeps working; settle towards where it lands.
                    self.record.target = if flatten { 0 } else { projected };
                    warn!(
                        instrument = %self.record.instrument,
                        target = self.record.target,
                        "order still working at shutdown"
                    );
                    return Ok(None);
                }
                Err(err) => return Err(err),
            }
        }
        if flatten && self.record.actual != 0 {
            return self.apply(&PositionIntent::flatten(IntentReason::Shutdown), price, gateway);
        }
        self.record.target = self.record.actual;
        self.record.state = self.record.settled_state();
        Ok(None)
    }

    /// Cancel the pending order. A failed cancel leaves the order pending so
    /// the next cycle retries it; failures share the rejection budget.
    fn cancel_pending(&mut self, gateway: &mut dyn OrderGateway) -> Result<(), FutcoreError> {
        let Some(id) = self.record.pending.as_ref().map(|p| p.id) else {
            return Ok(());
        };
        match gateway.cancel_order(id) {
            Ok(()) => {
                self.rejections = 0;
                info!(instrument = %self.record.instrument, order_id = %id, "cancelled order");
                self.settle_pending();
                Ok(())
            }
            Err(err) => {
                self.rejections += 1;
                if self.rejections > self.policy.max_retries {
                    self.record.state = PositionState::Halted;
                    error!(
                        instrument = %self.record.instrument,
                        order_id = %id,
                        attempts = self.rejections,
                        error = %err,
                        "cancel failed too many times, halting"
                    );
                    return Err(FutcoreError::RetriesExhausted {
                        instrument: self.record.instrument.clone(),
                        attempts: self.rejections,
                    });
                }
                warn!(
                    instrument = %self.record.instrument,
                    order_id = %id,
                    attempt = self.rejections,
                    error = %err,
                    "cancel failed"
                );
                Err(FutcoreError::CancelFailed {
                    instrument: self.record.instrument.clone(),
                    order_id: id,
                    reason: err.to_string(),
                    attempt: self.rejections,
                    max_retries: self.policy.max_retries,
                })
            }
        }
    }

    /// Pull the working order of a halted instrument. Exposure is left
    /// untouched for manual review.
    fn cancel_halted(&mut self, gateway: &mut dyn OrderGateway) -> Result<(), FutcoreError> {
        let Some(id) = self.record.pending.as_ref().map(|p| p.id) else {
            return Ok(());
        };
        gateway.cancel_order(id)?;
        warn!(
            instrument = %self.record.instrument,
            order_id = %id,
            "cancelled order on halted instrument"
        );
        self.record.pending = None;
        Ok(())
    }

    fn ensure_active(&self) -> Result<(), FutcoreError> {
        if self.record.is_halted() {
            return Err(FutcoreError::Halted {
                instrument: self.record.instrument.clone(),
            });
        }
        Ok(())
    }

    /// Drop the pending order after a cancel. A partially filled opening
    /// order still counts as a unit.
    fn settle_pending(&mut self) {
        if let Some(pending) = self.record.pending.take() {
            if pending.request.offset == Offset::Open && pending.filled > 0 {
                self.record.units += 1;
                self.record.last_add_price = pending.average_fill_price();
            }
        }
        self.record.state = self.record.settled_state();
        if self.record.actual == 0 {
            self.record.clear_exposure();
        }
    }

    fn next_request(&self, price: f64) -> Option<OrderRequest> {
        let actual = self.record.actual;
        let target = self.record.target;
        if actual == target {
            return None;
        }

        let (direction, offset, quantity) =
            if actual != 0 && (target == 0 || target.signum() != actual.signum()) {
                // Close everything first, reversals open after the close fills.
                (Direction::for_exposure(-actual), Offset::Close, actual.unsigned_abs())
            } else if target.unsigned_abs() > actual.unsigned_abs() {
                (
                    Direction::for_exposure(target),
                    Offset::Open,
                    (target - actual).unsigned_abs(),
                )
            } else {
                (
                    Direction::for_exposure(-actual),
                    Offset::Close,
                    (actual - target).unsigned_abs(),
                )
            };

        Some(OrderRequest {
            instrument: self.record.instrument.clone(),
            direction,
            offset,
            quantity: u32::try_from(quantity).unwrap_or(u32::MAX),
            price: self.policy.limit_orders.then_some(price),
        })
    }

    fn submit(
        &mut self,
        request: OrderRequest,
        gateway: &mut dyn OrderGateway,
    ) -> Result<IssuedOrder, FutcoreError> {
        let prior = self.record.state;
        self.record.state = match (request.offset, request.direction) {
            (Offset::Open, Direction::Buy) if self.record.actual == 0 => PositionState::EnteringLong,
            (Offset::Open, Direction::Sell) if self.record.actual == 0 => {
                PositionState::EnteringShort
            }
            // Pyramid adds keep the settled state.
            (Offset::Open, _) => prior,
            (Offset::Close, Direction::Sell) => PositionState::ExitingLong,
            (Offset::Close, Direction::Buy) => PositionState::ExitingShort,
        };

        match gateway.submit_order(&request) {
            Ok(id) => {
                self.rejections = 0;
                info!(
                    instrument = %self.record.instrument,
                    order_id = %id,
                    order = %request,
                    state = %self.record.state,
                    "order submitted"
                );
                self.record.pending = Some(PendingOrder::new(id, request.clone()));
                Ok(IssuedOrder { id, request })
            }
            Err(err) => {
                self.record.state = prior;
                self.rejections += 1;
                if self.rejections > self.policy.max_retries {
                    self.record.state = PositionState::Halted;
                    error!(
                        instrument = %self.record.instrument,
                        attempts = self.rejections,
                        "order rejected too many times, halting"
                    );
                    return Err(FutcoreError::RetriesExhausted {
                        instrument: self.record.instrument.clone(),
                        attempts: self.rejections,
                    });
                }
                warn!(
                    instrument = %self.record.instrument,
                    order = %request,
                    attempt = self.rejections,
                    error = %err,
                    "order rejected"
                );
                Err(FutcoreError::OrderRejected {
                    instrument: self.record.instrument.clone(),
                    reason: err.to_string(),
                    attempt: self.rejections,
                    max_retries: self.policy.max_retries,
                })
            }
        }
    }

    fn halt(&mut self, reason: String) -> FutcoreError {
        error!(instrument = %self.record.instrument, %reason, "halting on state inconsistency");
        self.record.state = PositionState::Halted;
        FutcoreError::StateInconsistency {
            instrument: self.record.instrument.clone(),
            reason,
        }
    }
}
