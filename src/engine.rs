use std::path::PathBuf;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::errors::EngineError;
use crate::orderbook::{Fill, OrderBook};
use crate::orders::{Activity, Order, OrderEvent, Side};
use crate::price::TickSize;
use crate::recorder::Recorder;
use crate::trade::{DailyStats, Trade, TradeStats};

/// Construction options for [`Engine`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Minimum price increment; every limit price must be a multiple.
    pub tick_size: Decimal,
    /// Mirror trade and event records to stdout.
    pub show_output: bool,
    /// When set (the default), the events log carries only trades; when
    /// cleared, every add/cancel/modify row is written too.
    pub sparse_events: bool,
    pub events_log_file: Option<PathBuf>,
    pub stats_log_file: Option<PathBuf>,
    pub daily_stats_log_file: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_size: Decimal::new(5, 2), // 0.05
            show_output: false,
            sparse_events: true,
            events_log_file: None,
            stats_log_file: None,
            daily_stats_log_file: None,
        }
    }
}

/// The matching engine for one symbol: the order book, per-day trade
/// numbering and statistics, and the output recorder.
///
/// Events are consumed strictly in input order and each one runs to
/// completion, cascading fills and level deletions included, before the
/// next is accepted. Given the same input stream, the emitted trade log is
/// identical across runs.
///
/// An engine owns its state exclusively; run one instance per symbol.
pub struct Engine {
    tick: TickSize,
    book: OrderBook,
    current_day: Option<NaiveDate>,
    next_trade_number: u64,
    trades: Vec<Trade>,
    stats: TradeStats,
    recorder: Recorder,
}

impl Engine {
    /// Opens the configured log files and starts with an empty book. The
    /// files stay open for the engine's lifetime and are flushed when it
    /// drops.
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        let tick = TickSize::new(config.tick_size)?;
        let recorder = Recorder::open(&config)?;
        Ok(Self {
            tick,
            book: OrderBook::new(),
            current_day: None,
            next_trade_number: 1,
            trades: Vec::new(),
            stats: TradeStats::default(),
            recorder,
        })
    }

    /// Feeds a batch of events through [`Engine::process_event`] in order.
    pub fn process<I>(&mut self, events: I) -> Result<(), EngineError>
    where
        I: IntoIterator<Item = OrderEvent>,
    {
        for event in events {
            self.process_event(event)?;
        }
        Ok(())
    }

    /// Routes one event.
    ///
    /// Day boundaries are handled first: when the event's date differs from
    /// the current day, the finished day's aggregates are emitted and the
    /// book, trade log and numbering are reset before the event is applied
    /// under its new day.
    pub fn process_event(&mut self, event: OrderEvent) -> Result<(), EngineError> {
        match self.current_day {
            None => self.current_day = Some(event.trans_date),
            Some(day) if day != event.trans_date => self.roll_day(event.trans_date)?,
            Some(_) => {}
        }

        match event.activity {
            Activity::Add => self.apply_add(&event)?,
            Activity::Cancel => self.apply_cancel(&event)?,
            // The historical feed occasionally labels market orders as
            // modifies; for matching purposes they are adds.
            Activity::Modify if event.is_market => {
                debug!(
                    order = event.order_number,
                    "market order arrived as a modify; routing to add"
                );
                self.apply_add(&event)?;
            }
            Activity::Modify => self.apply_modify(&event)?,
        }

        self.recorder.record_book_stats(
            event.trans_date,
            event.trans_time,
            &self.book.snapshot(&self.tick),
        )?;
        Ok(())
    }

    /// Emits the daily record for the final day and flushes the logs. Call
    /// once when the input stream is exhausted; the book is left intact for
    /// inspection.
    pub fn finish(&mut self) -> Result<Option<DailyStats>, EngineError> {
        let stats = self.daily_stats();
        if let Some(stats) = &stats {
            self.recorder.record_daily_stats(stats)?;
        }
        self.recorder.flush()?;
        Ok(stats)
    }

    /// Aggregates for the current day, or `None` before the first event.
    pub fn daily_stats(&self) -> Option<DailyStats> {
        let day = self.current_day?;
        Some(DailyStats {
            day,
            trade_count: self.stats.count(),
            total_volume: self.stats.volume(),
            mean_price: self.stats.price_mean(),
            std_price: self.stats.price_std(),
            book: self.book.snapshot(&self.tick),
        })
    }

    fn roll_day(&mut self, new_day: NaiveDate) -> Result<(), EngineError> {
        if let Some(stats) = self.daily_stats() {
            self.recorder.record_daily_stats(&stats)?;
        }
        // Orders do not survive the session; numbering restarts with the day.
        self.book.clear();
        self.trades.clear();
        self.stats.reset();
        self.next_trade_number = 1;
        self.current_day = Some(new_day);
        Ok(())
    }

    fn order_from_event(&self, event: &OrderEvent) -> Result<Order, EngineError> {
        let price = if event.is_market {
            None
        } else {
            Some(self.tick.to_ticks(event.limit_price)?)
        };
        Ok(Order {
            order_number: event.order_number,
            side: event.side,
            price,
            volume_original: event.volume_original,
            volume_disclosed: event.volume_disclosed,
            trans_date: event.trans_date,
            trans_time: event.trans_time,
            contract: event.contract.clone(),
        })
    }

    fn apply_add(&mut self, event: &OrderEvent) -> Result<(), EngineError> {
        let order = self.order_from_event(event)?;
        self.recorder.record_order_event("add", event)?;
        let fills = self.book.execute(order)?;
        self.emit_trades(event, &fills)
    }

    fn apply_cancel(&mut self, event: &OrderEvent) -> Result<(), EngineError> {
        if event.is_market {
            return Err(EngineError::InvalidOperation("cancel"));
        }
        // The event's own side and price are advisory; the index decides
        // where the order actually rests.
        match self.book.remove(event.order_number) {
            Ok(_) => self.recorder.record_order_event("cancel", event)?,
            Err(EngineError::OrderMissing(number)) => {
                // Cancels race fills in the historical feed; the order may
                // have traded out already.
                info!(order = number, "cancel for an order not in the book; skipped");
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }

    fn apply_modify(&mut self, event: &OrderEvent) -> Result<(), EngineError> {
        if event.is_market {
            return Err(EngineError::InvalidOperation("modify"));
        }
        let Some(resting) = self.book.get(event.order_number) else {
            info!(
                order = event.order_number,
                "modify for an order not in the book; skipped"
            );
            return Ok(());
        };
        let old_price = resting.price;
        let old_original = resting.volume_original;
        let old_disclosed = resting.volume_disclosed;
        let new_price = self.tick.to_ticks(event.limit_price)?;

        // First applicable rule wins: a price change forfeits queue
        // position, volume reductions keep it, volume increases forfeit it.
        if old_price != Some(new_price) {
            self.book.remove(event.order_number)?;
            self.reenter(event)?;
        } else if event.volume_original < old_original {
            self.book.update_volumes(
                event.order_number,
                event.volume_original,
                event.volume_disclosed,
            )?;
            self.recorder.record_order_event("modify", event)?;
        } else if event.volume_original == old_original && event.volume_disclosed < old_disclosed {
            self.book.update_volumes(
                event.order_number,
                event.volume_original,
                event.volume_disclosed,
            )?;
            self.recorder.record_order_event("modify", event)?;
        } else if event.volume_original > old_original {
            self.book.remove(event.order_number)?;
            self.reenter(event)?;
        } else if event.volume_original == old_original && event.volume_disclosed > old_disclosed {
            self.book.remove(event.order_number)?;
            self.reenter(event)?;
        } else {
            warn!(
                order = event.order_number,
                "modify changed nothing the book recognizes; ignored"
            );
        }
        Ok(())
    }

    /// Re-entry after a priority-forfeiting modify. The order takes the
    /// full add path and may now be marketable.
    fn reenter(&mut self, event: &OrderEvent) -> Result<(), EngineError> {
        let order = self.order_from_event(event)?;
        self.recorder.record_order_event("modify", event)?;
        let fills = self.book.execute(order)?;
        self.emit_trades(event, &fills)
    }

    fn emit_trades(&mut self, event: &OrderEvent, fills: &[Fill]) -> Result<(), EngineError> {
        for fill in fills {
            let (buy_order_number, sell_order_number) = match event.side {
                Side::Buy => (event.order_number, fill.resting_order_number),
                Side::Sell => (fill.resting_order_number, event.order_number),
            };
            let trade = Trade {
                trade_number: self.next_trade_number,
                trade_date: event.trans_date,
                trade_time: event.trans_time,
                trade_price: self.tick.to_decimal(fill.price),
                trade_quantity: fill.quantity,
                buy_order_number,
                sell_order_number,
            };
            self.next_trade_number += 1;
            self.stats.record(trade.trade_price, trade.trade_quantity);
            self.recorder.record_trade(&trade)?;
            self.trades.push(trade);
        }
        Ok(())
    }

    pub fn book(&self) -> &OrderBook {
        &self.book
    }

    /// Trades emitted so far for the current day.
    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn current_day(&self) -> Option<NaiveDate> {
        self.current_day
    }

    pub fn tick_size(&self) -> Decimal {
        self.tick.value()
    }
}
