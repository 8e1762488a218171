//! Core domain types and decision logic.

pub mod config;
pub mod config_validation;
pub mod error;
pub mod event_loop;
pub mod indicator;
pub mod observation;
pub mod order;
pub mod position;
pub mod risk;
pub mod signal;
pub mod strategy;
