//! Port traits for the collaborators the decision core talks to.

pub mod config_port;
pub mod market_data_port;
pub mod order_port;
