use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;

use crate::errors::EngineError;
use crate::instrument::Contract;
use crate::price::Price;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Buy,  // bid
    Sell, // ask
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    /// Parses the feed's one-letter buy/sell indicator.
    pub fn from_indicator(indicator: &str) -> Result<Self, EngineError> {
        match indicator {
            "B" => Ok(Side::Buy),
            "S" => Ok(Side::Sell),
            other => Err(EngineError::InvalidSide(other.to_string())),
        }
    }

    pub fn indicator(self) -> &'static str {
        match self {
            Side::Buy => "B",
            Side::Sell => "S",
        }
    }
}

/// What an event asks the book to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    Add,
    Cancel,
    Modify,
}

impl Activity {
    /// Maps the feed's numeric activity code (1 = add, 3 = cancel,
    /// 4 = modify).
    pub fn from_code(code: u8) -> Result<Self, EngineError> {
        match code {
            1 => Ok(Activity::Add),
            3 => Ok(Activity::Cancel),
            4 => Ok(Activity::Modify),
            other => Err(EngineError::UnknownActivity(other)),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Activity::Add => 1,
            Activity::Cancel => 3,
            Activity::Modify => 4,
        }
    }
}

/// One normalized event from the order feed.
#[derive(Debug, Clone)]
pub struct OrderEvent {
    /// Unique positive identifier within a trading day.
    pub order_number: u64,
    pub side: Side,
    pub activity: Activity,
    pub is_market: bool,
    /// Meaningful only when `is_market` is false.
    pub limit_price: Decimal,
    pub volume_disclosed: u64,
    pub volume_original: u64,
    pub trans_date: NaiveDate,
    pub trans_time: NaiveTime,
    pub contract: Contract,
}

/// An order in executable form: the price scaled to ticks, `None` for
/// market orders. While the order rests, the matcher decrements
/// `volume_original` in place as fills land against it.
#[derive(Debug, Clone)]
pub struct Order {
    pub order_number: u64,
    pub side: Side,
    pub price: Option<Price>,
    pub volume_original: u64,
    pub volume_disclosed: u64,
    pub trans_date: NaiveDate,
    pub trans_time: NaiveTime,
    pub contract: Contract,
}
