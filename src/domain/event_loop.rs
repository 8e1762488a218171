//! Event loop: one instrument, one observation at a time.
//!
//! Each accepted observation flows through indicator engine, signal
//! generator, risk module and position state machine exactly once before
//! the next event is read. Fill acknowledgements arrive on the same stream,
//! so they are serialized with observations.

use chrono::{NaiveDate, NaiveDateTime};
use tracing::{debug, error, info, warn};

use crate::domain::config::EngineConfig;
use crate::domain::error::FutcoreError;
use crate::domain::indicator::{IndicatorEngine, IndicatorSnapshot};
use crate::domain::observation::Observation;
use crate::domain::order::{FillReport, OrderId, OrderRequest};
use crate::domain::position::{IssuedOrder, PositionIntent, PositionRecord, PositionStateMachine};
use crate::domain::risk::RiskModule;
use crate::domain::signal::{Signal, SignalEvent, SignalGenerator};
use crate::ports::market_data_port::{MarketDataPort, MarketEvent};
use crate::ports::order_port::{AccountState, OrderGateway};

/// An order issued during the run.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderLogEntry {
    pub timestamp: NaiveDateTime,
    pub order_id: OrderId,
    pub request: OrderRequest,
}

/// What happened to one observation.
#[derive(Debug)]
pub enum CycleOutcome {
    /// Rejected by the ordering check and dropped.
    Dropped(FutcoreError),
    Evaluated {
        signal: Signal,
        intent: Option<PositionIntent>,
        order: Option<IssuedOrder>,
    },
    /// The order for this cycle was rejected; it is retried next cycle.
    Rejected(FutcoreError),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub observations: usize,
    pub dropped: usize,
    pub rejected: usize,
    pub fills: usize,
    pub final_position: i64,
}

pub struct StrategyEngine {
    config: EngineConfig,
    indicators: IndicatorEngine,
    signals: SignalGenerator,
    risk: RiskModule,
    positions: PositionStateMachine,
    previous: Option<IndicatorSnapshot>,
    last_session: Option<NaiveDate>,
    last_price: Option<f64>,
    last_time: Option<NaiveDateTime>,
    account: AccountState,
    order_log: Vec<OrderLogEntry>,
    signal_log: Vec<SignalEvent>,
}

impl StrategyEngine {
    pub fn new(config: EngineConfig) -> Self {
        let indicators = IndicatorEngine::new(&config.strategy.indicator_spec(config.atr_window));
        let signals = SignalGenerator::new(config.strategy.clone(), config.flatten_at());
        let risk = RiskModule::new(
            config.sizing.clone(),
            config.stop,
            config.session_rules(),
            config.strategy.max_units(),
        );
        let positions = PositionStateMachine::new(config.instrument.clone(), config.orders);
        Self {
            config,
            indicators,
            signals,
            risk,
            positions,
            previous: None,
            last_session: None,
            last_price: None,
            last_time: None,
            account: AccountState {
                balance: 0.0,
                available_margin: 0.0,
                positions: Vec::new(),
            },
            order_log: Vec::new(),
            signal_log: Vec::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn record(&self) -> &PositionRecord {
        self.positions.record()
    }

    pub fn order_log(&self) -> &[OrderLogEntry] {
        &self.order_log
    }

    pub fn signal_log(&self) -> &[SignalEvent] {
        &self.signal_log
    }

    /// Read the account and adopt any position already held.
    pub fn start(&mut self, gateway: &mut dyn OrderGateway) {
        info!(
            instrument = %self.config.instrument,
            strategy = self.config.strategy.name(),
            params = %self.config.strategy,
            "starting strategy engine"
        );
        self.refresh_account(gateway);
        if let Some(held) = self.account.position(&self.config.instrument) {
            let (quantity, price) = (held.quantity, held.average_price);
            self.positions.adopt(quantity, price);
        }
    }

    pub fn on_observation(
        &mut self,
        obs: &Observation,
        gateway: &mut dyn OrderGateway,
    ) -> Result<CycleOutcome, FutcoreError> {
        if self.positions.record().is_halted() {
            return Err(FutcoreError::Halted {
                instrument: self.config.instrument.clone(),
            });
        }

        let snapshot = match self.indicators.update(obs) {
            Ok(snapshot) => snapshot,
            Err(err) if err.is_recoverable() => {
                warn!(error = %err, "dropping observation");
                return Ok(CycleOutcome::Dropped(err));
            }
            Err(err) => return Err(err),
        };
        self.last_price = Some(snapshot.price);
        self.last_time = Some(snapshot.timestamp);

        let signal_cycle = snapshot.closed || self.config.strategy.is_intraday();
        let event = if signal_cycle {
            self.signals
                .evaluate(&snapshot, self.previous.as_ref(), self.positions.record())
        } else {
            SignalEvent {
                signal: Signal::Hold,
                index: snapshot.index,
                timestamp: snapshot.timestamp,
            }
        };
        if event.signal != Signal::Hold {
            info!(
                signal = %event.signal,
                index = event.index,
                at = %event.timestamp,
                price = snapshot.price,
                "signal"
            );
            self.signal_log.push(event.clone());
        }

        if event.signal != Signal::Hold || self.positions.record().actual != 0 {
            self.refresh_account(gateway);
        }
        let assessment = self.risk.assess(
            &event,
            &snapshot,
            self.positions.record(),
            &self.account,
            self.last_session,
        );
        self.positions.set_stop(assessment.stop);

        let result = match &assessment.intent {
            Some(intent) => self.positions.apply(intent, snapshot.price, gateway),
            None => self.positions.reconcile(snapshot.price, gateway),
        };

        self.last_session = Some(snapshot.session());
        if signal_cycle {
            self.previous = Some(snapshot);
        }

        match result {
            Ok(order) => {
                if let Some(issued) = &order {
                    self.log_order(issued);
                }
                Ok(CycleOutcome::Evaluated {
                    signal: event.signal,
                    intent: assessment.intent,
                    order,
                })
            }
            Err(err) if err.is_recoverable() => Ok(CycleOutcome::Rejected(err)),
            Err(err) => Err(err),
        }
    }

    pub fn on_fill(
        &mut self,
        fill: &FillReport,
        gateway: &mut dyn OrderGateway,
    ) -> Result<Option<IssuedOrder>, FutcoreError> {
        let price = self.last_price.unwrap_or(fill.price);
        let now = self.last_time.unwrap_or(NaiveDateTime::MIN);
        match self.positions.on_fill(fill, price, now, gateway) {
            Ok(order) => {
                if let Some(issued) = &order {
                    self.log_order(issued);
                }
                Ok(order)
            }
            Err(err) if err.is_recoverable() => {
                warn!(error = %err, "follow-up order rejected");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Cancel the outstanding order and flatten if configured.
    pub fn shutdown(
        &mut self,
        gateway: &mut dyn OrderGateway,
    ) -> Result<Option<IssuedOrder>, FutcoreError> {
        let flatten = self.config.session.flatten_on_shutdown;
        let price = match self.last_price.or(self.positions.record().entry_price) {
            Some(price) => price,
            None => {
                debug!("no price seen, nothing to flatten");
                return self.positions.shutdown(false, 0.0, gateway);
            }
        };
        info!(instrument = %self.config.instrument, flatten, "shutting down");
        let order = self.positions.shutdown(flatten, price, gateway)?;
        if let Some(issued) = &order {
            self.log_order(issued);
        }
        Ok(order)
    }

    /// Drive the engine from a market-data stream until it ends, then shut
    /// down and wait for the closing fills.
    pub fn run(
        &mut self,
        feed: &mut dyn MarketDataPort,
        gateway: &mut dyn OrderGateway,
    ) -> Result<RunSummary, FutcoreError> {
        feed.subscribe(&self.config.instrument, self.config.bar_period)?;
        self.start(gateway);

        let mut summary = RunSummary::default();
        if let Err(err) = self.drive(feed, gateway, &mut summary) {
            error!(instrument = %self.config.instrument, error = %err, "halting instrument");
            self.abort(gateway);
            return Err(err);
        }

        self.shutdown(gateway)?;
        while self.positions.record().pending.is_some() {
            match feed.next_event()? {
                Some(MarketEvent::Fill(fill)) => {
                    summary.fills += 1;
                    self.on_fill(&fill, gateway)?;
                }
                Some(MarketEvent::Observation(obs)) => {
                    debug!(at = %obs.timestamp(), "ignoring observation after shutdown");
                }
                None => {
                    warn!("stream ended with an order outstanding");
                    break;
                }
            }
        }

        summary.final_position = self.positions.record().actual;
        info!(
            observations = summary.observations,
            dropped = summary.dropped,
            fills = summary.fills,
            orders = self.order_log.len(),
            final_position = summary.final_position,
            "run complete"
        );
        Ok(summary)
    }

    fn drive(
        &mut self,
        feed: &mut dyn MarketDataPort,
        gateway: &mut dyn OrderGateway,
        summary: &mut RunSummary,
    ) -> Result<(), FutcoreError> {
        while let Some(event) = feed.next_event()? {
            match event {
                MarketEvent::Observation(obs) => {
                    summary.observations += 1;
                    match self.on_observation(&obs, gateway)? {
                        CycleOutcome::Dropped(_) => summary.dropped += 1,
                        CycleOutcome::Rejected(_) => summary.rejected += 1,
                        CycleOutcome::Evaluated { .. } => {}
                    }
                }
                MarketEvent::Fill(fill) => {
                    summary.fills += 1;
                    self.on_fill(&fill, gateway)?;
                }
            }
        }
        Ok(())
    }

    /// Pull the working order after the run failed. Exposure is left as is.
    fn abort(&mut self, gateway: &mut dyn OrderGateway) {
        let price = self.last_price.unwrap_or(0.0);
        if let Err(err) = self.positions.shutdown(false, price, gateway) {
            error!(
                instrument = %self.config.instrument,
                error = %err,
                "could not cancel working order"
            );
        }
    }

    fn refresh_account(&mut self, gateway: &dyn OrderGateway) {
        match gateway.current_account_state() {
            Ok(account) => self.account = account,
            Err(err) => warn!(error = %err, "account state unavailable, using last known"),
        }
    }

    fn log_order(&mut self, issued: &IssuedOrder) {
        self.order_log.push(OrderLogEntry {
            timestamp: self.last_time.unwrap_or(NaiveDateTime::MIN),
            order_id: issued.id,
            request: issued.request.clone(),
        });
    }
}
