use std::fmt;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use crate::errors::EngineError;

/// A price expressed as a whole number of ticks.
///
/// Every book key and every price comparison uses this form; [`Decimal`]
/// values exist only at the boundary. Scaling to integers keeps map lookups
/// exact where floating point would not be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Price(pub u64);

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ticks", self.0)
    }
}

/// The minimum price increment, and the conversion between boundary prices
/// and tick-scaled [`Price`] keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickSize(Decimal);

impl TickSize {
    pub fn new(tick: Decimal) -> Result<Self, EngineError> {
        if tick <= Decimal::ZERO {
            return Err(EngineError::InvalidTickSize(tick));
        }
        Ok(Self(tick))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Scales a boundary price down to ticks. Fails unless the value is a
    /// non-negative integer multiple of the tick size.
    pub fn to_ticks(&self, price: Decimal) -> Result<Price, EngineError> {
        let off_tick = || EngineError::OffTickPrice {
            price,
            tick: self.0,
        };
        if price.is_sign_negative() || price % self.0 != Decimal::ZERO {
            return Err(off_tick());
        }
        let ticks = (price / self.0).to_u64().ok_or_else(off_tick)?;
        Ok(Price(ticks))
    }

    /// Scales a tick count back up to a boundary price.
    pub fn to_decimal(&self, price: Price) -> Decimal {
        Decimal::from(price.0) * self.0
    }
}
