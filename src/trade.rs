use std::fmt;

use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;

use crate::orderbook::BookSnapshot;

/// A matched execution between a resting order and the incoming order that
/// triggered it.
///
/// - The price comes from the resting (passive) side.
/// - The date and time come from the incoming order.
/// - Numbers restart at 1 each trading day and render zero-padded to
///   8 digits in the logs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trade {
    pub trade_number: u64,
    pub trade_date: NaiveDate,
    pub trade_time: NaiveTime,
    pub trade_price: Decimal,
    pub trade_quantity: u64,
    pub buy_order_number: u64,
    pub sell_order_number: u64,
}

impl Trade {
    /// Zero-padded 8-digit trade number used in the logs.
    pub fn formatted_number(&self) -> String {
        format!("{:08}", self.trade_number)
    }
}

/// Running aggregates over the day's trades, updated one trade at a time:
///
/// ```text
/// mean_n = (mean_{n-1} * (n-1) + x_n) / n
/// std_n  = sqrt((std_{n-1}^2 * (n-1) + (x_n - mean_n)^2) / n)
/// ```
#[derive(Debug, Clone, Default)]
pub struct TradeStats {
    count: u64,
    volume: u64,
    price_mean: f64,
    price_std: f64,
}

impl TradeStats {
    pub fn record(&mut self, price: Decimal, quantity: u64) {
        self.count += 1;
        self.volume += quantity;
        let x = price.to_f64().unwrap_or(0.0);
        if self.count == 1 {
            self.price_mean = x;
        } else {
            let n = self.count as f64;
            self.price_mean = (self.price_mean * (n - 1.0) + x) / n;
            self.price_std = ((self.price_std.powi(2) * (n - 1.0)
                + (x - self.price_mean).powi(2))
                / n)
                .sqrt();
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn volume(&self) -> u64 {
        self.volume
    }

    pub fn price_mean(&self) -> f64 {
        self.price_mean
    }

    pub fn price_std(&self) -> f64 {
        self.price_std
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// End-of-day aggregates plus the closing book shape, emitted at each day
/// boundary and at the end of the stream.
#[derive(Debug, Clone, Serialize)]
pub struct DailyStats {
    pub day: NaiveDate,
    pub trade_count: u64,
    pub total_volume: u64,
    pub mean_price: f64,
    pub std_price: f64,
    pub book: BookSnapshot,
}

impl fmt::Display for DailyStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Number of trades:              {}", self.trade_count)?;
        writeln!(f, "Total trade volume:            {}", self.total_volume)?;
        writeln!(f, "Mean trade price:              {}", self.mean_price)?;
        write!(f, "Trade price STD:               {}", self.std_price)
    }
}
