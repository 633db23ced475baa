use rust_decimal::Decimal;
use thiserror::Error;

use crate::price::Price;
use crate::recorder::RecorderError;

/// Errors surfaced by the matching engine and the book primitives.
///
/// The cancel and modify paths absorb [`EngineError::OrderMissing`] (the
/// order may simply have traded out already); every other variant is
/// surfaced to the caller with the book left exactly as it was before the
/// offending event.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Event carried an activity code outside {1, 3, 4}.
    #[error("unknown activity type {0}")]
    UnknownActivity(u8),

    /// Event carried a buy/sell indicator other than 'B' or 'S'.
    #[error("invalid buy/sell indicator {0:?}")]
    InvalidSide(String),

    /// Cancel or modify aimed at a market order. Market orders never rest,
    /// so there is nothing in the book to act on.
    #[error("cannot {0} a market order")]
    InvalidOperation(&'static str),

    #[error("order {0} not in the book")]
    OrderMissing(u64),

    #[error("price level {0} already exists")]
    LevelExists(Price),

    #[error("price level {0} does not exist")]
    LevelMissing(Price),

    /// Price is negative or not an integer multiple of the tick size.
    #[error("price {price} is not a multiple of tick size {tick}")]
    OffTickPrice { price: Decimal, tick: Decimal },

    #[error("tick size must be positive, got {0}")]
    InvalidTickSize(Decimal),

    /// Inconsistency between the side books and the order index. Indicates
    /// a bug; processing must not continue.
    #[error("book invariant violated: {0}")]
    InvariantViolation(String),

    #[error(transparent)]
    Recorder(#[from] RecorderError),
}
