//! Donchian Channel: highest high / lowest low over the previous n closed
//! bars.
//!
//! The channel reported alongside bar t covers bars t-n..t-1, so a close can
//! actually break out of it. The bar being updated is never part of its own
//! channel.

use crate::domain::indicator::window::RollingWindow;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Channel {
    pub upper: f64,
    pub lower: f64,
}

#[derive(Debug, Clone)]
pub struct Donchian {
    highs: RollingWindow,
    lows: RollingWindow,
}

impl Donchian {
    pub fn new(period: usize) -> Self {
        Self {
            highs: RollingWindow::new(period),
            lows: RollingWindow::new(period),
        }
    }

    /// Returns the channel of the bars before this one, then records the bar.
    pub fn update(&mut self, high: f64, low: f64) -> Option<Channel> {
        let channel = self.channel();
        self.highs.push(high);
        self.lows.push(low);
        channel
    }

    /// Channel over the bars recorded so far.
    pub fn channel(&self) -> Option<Channel> {
        if !self.highs.is_full() {
            return None;
        }
        Some(Channel {
            upper: self.highs.max()?,
            lower: self.lows.min()?,
        })
    }
}
