//! Domain error types.
//!
//! Recoverable errors (bad data, a single rejected order or failed cancel)
//! are logged and the engine keeps running. Fatal errors halt trading on the instrument.

use chrono::NaiveDateTime;

use crate::domain::order::OrderId;

/// Failure reported by the order-gateway collaborator.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GatewayError {
    #[error("order rejected: {reason}")]
    Rejected { reason: String },

    #[error("unknown order {0}")]
    UnknownOrder(OrderId),

    #[error("gateway unavailable: {reason}")]
    Unavailable { reason: String },
}

/// Top-level error type for futcore.
#[derive(Debug, thiserror::Error)]
pub enum FutcoreError {
    #[error("out-of-order observation at {received}, last accepted {last}")]
    OutOfOrderData {
        received: NaiveDateTime,
        last: NaiveDateTime,
    },

    #[error("duplicate observation at {timestamp}")]
    DuplicateObservation { timestamp: NaiveDateTime },

    #[error("order for {instrument} rejected (attempt {attempt} of {max_retries}): {reason}")]
    OrderRejected {
        instrument: String,
        reason: String,
        attempt: u32,
        max_retries: u32,
    },

    #[error(
        "cancel of order {order_id} on {instrument} failed (attempt {attempt} of {max_retries}): {reason}"
    )]
    CancelFailed {
        instrument: String,
        order_id: OrderId,
        reason: String,
        attempt: u32,
        max_retries: u32,
    },

    #[error("order handling for {instrument} failed {attempts} times in a row, giving up")]
    RetriesExhausted { instrument: String, attempts: u32 },

    #[error("state inconsistency on {instrument}: {reason}")]
    StateInconsistency { instrument: String, reason: String },

    #[error("trading halted on {instrument}")]
    Halted { instrument: String },

    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("data feed error: {reason}")]
    DataFeed { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl FutcoreError {
    /// Recoverable errors drop the offending sample or order attempt and let
    /// the event loop continue. Everything else stops trading.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            FutcoreError::OutOfOrderData { .. }
                | FutcoreError::DuplicateObservation { .. }
                | FutcoreError::OrderRejected { .. }
                | FutcoreError::CancelFailed { .. }
        )
    }

    /// Errors that require the instrument to be halted for manual review.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            FutcoreError::RetriesExhausted { .. }
                | FutcoreError::StateInconsistency { .. }
                | FutcoreError::Halted { .. }
        )
    }
}

impl From<&FutcoreError> for std::process::ExitCode {
    fn from(err: &FutcoreError) -> Self {
        let code: u8 = match err {
            FutcoreError::Io(_) => 1,
            FutcoreError::ConfigParse { .. }
            | FutcoreError::ConfigMissing { .. }
            | FutcoreError::ConfigInvalid { .. } => 2,
            FutcoreError::DataFeed { .. }
            | FutcoreError::OutOfOrderData { .. }
            | FutcoreError::DuplicateObservation { .. } => 3,
            FutcoreError::OrderRejected { .. }
            | FutcoreError::CancelFailed { .. }
            | FutcoreError::Gateway(_) => 4,
            FutcoreError::RetriesExhausted { .. }
            | FutcoreError::StateInconsistency { .. }
            | FutcoreError::Halted { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
