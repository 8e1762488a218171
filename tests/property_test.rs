//! Property tests over random price paths replayed through a paper session.

mod common;

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use common::*;
use futcore::adapters::paper::{PaperBook, PaperGateway, ReplayFeed};
use futcore::domain::error::{FutcoreError, GatewayError};
use futcore::domain::event_loop::StrategyEngine;
use futcore::domain::order::{OrderId, OrderRequest};
use futcore::ports::market_data_port::{MarketDataPort, MarketEvent};
use futcore::ports::order_port::{AccountState, OrderGateway};
use proptest::prelude::*;

/// Orders the gateway has accepted and not yet seen completed or cancelled.
#[derive(Default)]
struct Outstanding {
    remaining: HashMap<OrderId, u32>,
    max_seen: usize,
}

struct TrackingGateway {
    inner: PaperGateway,
    outstanding: Rc<RefCell<Outstanding>>,
}

impl OrderGateway for TrackingGateway {
    fn submit_order(&mut self, request: &OrderRequest) -> Result<OrderId, GatewayError> {
        let id = self.inner.submit_order(request)?;
        let mut out = self.outstanding.borrow_mut();
        out.remaining.insert(id, request.quantity);
        out.max_seen = out.max_seen.max(out.remaining.len());
        Ok(id)
    }

    fn cancel_order(&mut self, order_id: OrderId) -> Result<(), GatewayError> {
        self.inner.cancel_order(order_id)?;
        self.outstanding.borrow_mut().remaining.remove(&order_id);
        Ok(())
    }

    fn current_account_state(&self) -> Result<AccountState, GatewayError> {
        self.inner.current_account_state()
    }
}

/// Drives the engine by hand so invariants can be checked after every event.
fn replay(
    ini: &str,
    closes: &[f64],
    partial_fill_lots: u32,
    mut check: impl FnMut(&StrategyEngine),
) -> (StrategyEngine, usize) {
    let book = PaperBook::new(1_000_000.0)
        .with_partial_fills(partial_fill_lots)
        .into_shared();
    let outstanding = Rc::new(RefCell::new(Outstanding::default()));
    let mut feed = ReplayFeed::new(minute_bars(closes), book.clone());
    let mut gateway = TrackingGateway {
        inner: PaperGateway::new(book),
        outstanding: outstanding.clone(),
    };
    let mut engine = StrategyEngine::new(engine_config(ini));

    feed.subscribe(SYMBOL, 60).unwrap();
    engine.start(&mut gateway);
    while let Some(event) = feed.next_event().unwrap() {
        match event {
            MarketEvent::Observation(obs) => {
                engine.on_observation(&obs, &mut gateway).unwrap();
            }
            MarketEvent::Fill(fill) => {
                {
                    let mut out = outstanding.borrow_mut();
                    if let Some(left) = out.remaining.get_mut(&fill.order_id) {
                        *left -= fill.quantity;
                        if *left == 0 {
                            out.remaining.remove(&fill.order_id);
                        }
                    }
                }
                engine.on_fill(&fill, &mut gateway).unwrap();
            }
        }
        check(&engine);
    }
    let max_seen = outstanding.borrow().max_seen;
    (engine, max_seen)
}

fn price_path() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(-3.0f64..3.0, 20..120).prop_map(|steps| {
        let mut price = 100.0;
        steps
            .into_iter()
            .map(|step| {
                price = (price + step).max(1.0);
                (price * 10.0).round() / 10.0
            })
            .collect()
    })
}

fn channel_ini(max_units: u32, lots: u32) -> String {
    format!(
        "[instrument]\nsymbol = {SYMBOL}\n\
         [strategy]\nkind = channel_breakout\nentry_window = 5\nexit_window = 3\n\
         pyramid_step = 0.5\nmax_units = {max_units}\n\
         [risk]\nlots = {lots}\natr_window = 3\nstop = atr_trailing\nstop_atr_multiple = 2\n"
    )
}

proptest! {
    #[test]
    fn at_most_one_order_outstanding(
        closes in price_path(),
        partial in 0u32..3,
        lots in 1u32..4,
    ) {
        let (_, max_seen) = replay(&channel_ini(3, lots), &closes, partial, |_| {});
        prop_assert!(max_seen <= 1);

        let (_, max_seen) = replay(&dual_ma_ini(&format!("[risk]\nlots = {lots}\n")), &closes, partial, |_| {});
        prop_assert!(max_seen <= 1);
    }

    #[test]
    fn pyramiding_never_exceeds_max_units(
        closes in price_path(),
        max_units in 1u32..5,
        lots in 1u32..4,
        partial in 0u32..3,
    ) {
        let mut worst_units = 0;
        let mut worst_exposure = 0;
        replay(&channel_ini(max_units, lots), &closes, partial, |engine| {
            let record = engine.record();
            worst_units = worst_units.max(record.units);
            worst_exposure = worst_exposure.max(record.actual.abs());
        });
        prop_assert!(worst_units <= max_units);
        prop_assert!(worst_exposure <= i64::from(max_units * lots));
    }

    #[test]
    fn replay_is_deterministic(closes in price_path(), partial in 0u32..3) {
        let ini = channel_ini(3, 1);
        let (a, _) = replay(&ini, &closes, partial, |_| {});
        let (b, _) = replay(&ini, &closes, partial, |_| {});
        prop_assert_eq!(a.order_log(), b.order_log());
        prop_assert_eq!(a.record(), b.record());
    }

    #[test]
    fn duplicate_bars_never_change_decisions(closes in price_path(), every in 2usize..6) {
        let ini = dual_ma_ini("");
        let bars = minute_bars(&closes);

        let mut clean_gw = MockGateway::new();
        let mut clean = StrategyEngine::new(engine_config(&ini));
        clean.start(&mut clean_gw);
        for obs in &bars {
            clean.on_observation(obs, &mut clean_gw).unwrap();
        }

        let mut dup_gw = MockGateway::new();
        let mut dup = StrategyEngine::new(engine_config(&ini));
        dup.start(&mut dup_gw);
        for (i, obs) in bars.iter().enumerate() {
            dup.on_observation(obs, &mut dup_gw).unwrap();
            if i % every == 0 {
                let replayed = dup.on_observation(obs, &mut dup_gw);
                let is_duplicate = matches!(
                    replayed,
                    Ok(futcore::domain::event_loop::CycleOutcome::Dropped(
                        FutcoreError::DuplicateObservation { .. }
                    ))
                );
                prop_assert!(is_duplicate);
            }
        }

        prop_assert_eq!(clean_gw.submitted, dup_gw.submitted);
        prop_assert_eq!(clean.record(), dup.record());
    }
}
