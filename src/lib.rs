//! futcore: decision core for systematic futures strategies.
//!
//! Hexagonal architecture: decision logic in [`domain`], collaborator
//! traits in [`ports`], concrete implementations in [`adapters`].

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod logging;
pub mod ports;
