//! Market-data port trait.

use crate::domain::error::FutcoreError;
use crate::domain::observation::Observation;
use crate::domain::order::FillReport;

/// One item from the collaborator's ordered event stream.
#[derive(Debug, Clone, PartialEq)]
pub enum MarketEvent {
    Observation(Observation),
    Fill(FillReport),
}

/// Push-style stream of observations and order acknowledgements.
///
/// `next_event` blocks until the collaborator has something to deliver and
/// is the only place the event loop waits. `Ok(None)` ends the stream.
pub trait MarketDataPort {
    fn subscribe(&mut self, instrument: &str, bar_period: u32) -> Result<(), FutcoreError>;

    fn next_event(&mut self) -> Result<Option<MarketEvent>, FutcoreError>;
}
