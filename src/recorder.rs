use std::fs::File;
use std::path::Path;

use chrono::{NaiveDate, NaiveTime};
use csv::Writer;
use thiserror::Error;

use crate::engine::EngineConfig;
use crate::orderbook::BookSnapshot;
use crate::orders::OrderEvent;
use crate::trade::{DailyStats, Trade};

const DATE_FORMAT: &str = "%m/%d/%Y";
const TIME_FORMAT: &str = "%H:%M:%S%.6f";

/// Errors from the output writers.
#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV write error: {0}")]
    Csv(#[from] csv::Error),
    #[error("snapshot serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Owns the engine's output files: the events log (trades, plus every
/// order event when sparse mode is off), the continuous book-stats log,
/// and the daily aggregates log.
///
/// Each writer is opened up front so a bad path fails at construction, not
/// mid-replay, and everything is flushed on drop.
pub struct Recorder {
    show_output: bool,
    sparse_events: bool,
    events: Option<Writer<File>>,
    stats: Option<Writer<File>>,
    daily: Option<Writer<File>>,
}

fn open_writer(path: Option<&Path>) -> Result<Option<Writer<File>>, RecorderError> {
    match path {
        Some(path) => Ok(Some(Writer::from_path(path)?)),
        None => Ok(None),
    }
}

impl Recorder {
    pub fn open(config: &EngineConfig) -> Result<Self, RecorderError> {
        Ok(Self {
            show_output: config.show_output,
            sparse_events: config.sparse_events,
            events: open_writer(config.events_log_file.as_deref())?,
            stats: open_writer(config.stats_log_file.as_deref())?,
            daily: open_writer(config.daily_stats_log_file.as_deref())?,
        })
    }

    /// Trades always reach the events log. The column layout (kind at 5,
    /// price at 7, quantity at 8) is what the downstream stats extractor
    /// reads.
    pub fn record_trade(&mut self, trade: &Trade) -> Result<(), RecorderError> {
        let row = [
            trade.trade_time.format(TIME_FORMAT).to_string(),
            trade.trade_date.format(DATE_FORMAT).to_string(),
            trade.formatted_number(),
            trade.buy_order_number.to_string(),
            trade.sell_order_number.to_string(),
            "trade".to_string(),
            String::new(),
            trade.trade_price.to_string(),
            trade.trade_quantity.to_string(),
        ];
        if let Some(writer) = self.events.as_mut() {
            writer.write_record(&row)?;
        }
        if self.show_output {
            println!("{}", row.join(","));
        }
        Ok(())
    }

    /// Order rows (add/cancel/modify) are suppressed in sparse mode.
    pub fn record_order_event(
        &mut self,
        kind: &str,
        event: &OrderEvent,
    ) -> Result<(), RecorderError> {
        if self.sparse_events {
            return Ok(());
        }
        let row = [
            event.trans_time.format(TIME_FORMAT).to_string(),
            event.trans_date.format(DATE_FORMAT).to_string(),
            event.order_number.to_string(),
            String::new(),
            String::new(),
            kind.to_string(),
            event.side.indicator().to_string(),
            if event.is_market {
                String::new()
            } else {
                event.limit_price.to_string()
            },
            event.volume_original.to_string(),
        ];
        if let Some(writer) = self.events.as_mut() {
            writer.write_record(&row)?;
        }
        if self.show_output {
            println!("{}", row.join(","));
        }
        Ok(())
    }

    /// One book-state line per processed event, when a stats log is
    /// configured.
    pub fn record_book_stats(
        &mut self,
        date: NaiveDate,
        time: NaiveTime,
        snapshot: &BookSnapshot,
    ) -> Result<(), RecorderError> {
        let Some(writer) = self.stats.as_mut() else {
            return Ok(());
        };
        writer.write_record(&[
            time.format(TIME_FORMAT).to_string(),
            date.format(DATE_FORMAT).to_string(),
            snapshot
                .best_bid
                .map(|p| p.to_string())
                .unwrap_or_default(),
            snapshot
                .best_ask
                .map(|p| p.to_string())
                .unwrap_or_default(),
            snapshot.bid_levels.to_string(),
            snapshot.ask_levels.to_string(),
            snapshot.bid_volume.to_string(),
            snapshot.ask_volume.to_string(),
        ])?;
        Ok(())
    }

    pub fn record_daily_stats(&mut self, stats: &DailyStats) -> Result<(), RecorderError> {
        let row = [
            stats.day.format(DATE_FORMAT).to_string(),
            stats.trade_count.to_string(),
            stats.total_volume.to_string(),
            stats.mean_price.to_string(),
            stats.std_price.to_string(),
            serde_json::to_string(&stats.book)?,
        ];
        if let Some(writer) = self.daily.as_mut() {
            writer.write_record(&row)?;
        }
        if self.show_output {
            println!("{}", row.join(","));
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), RecorderError> {
        for writer in [
            self.events.as_mut(),
            self.stats.as_mut(),
            self.daily.as_mut(),
        ]
        .into_iter()
        .flatten()
        {
            writer.flush()?;
        }
        Ok(())
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        // Last-chance flush; failures here have nowhere to be reported.
        let _ = self.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::Contract;
    use crate::orders::{Activity, Side};
    use std::fs;
    use tempfile::tempdir;

    fn sample_trade() -> Trade {
        Trade {
            trade_number: 1,
            trade_date: NaiveDate::from_ymd_opt(2010, 9, 14).unwrap(),
            trade_time: NaiveTime::from_hms_micro_opt(9, 15, 0, 250).unwrap(),
            trade_price: "100.05".parse().unwrap(),
            trade_quantity: 7,
            buy_order_number: 11,
            sell_order_number: 22,
        }
    }

    fn sample_event() -> OrderEvent {
        OrderEvent {
            order_number: 11,
            side: Side::Buy,
            activity: Activity::Add,
            is_market: false,
            limit_price: "100.05".parse().unwrap(),
            volume_disclosed: 7,
            volume_original: 7,
            trans_date: NaiveDate::from_ymd_opt(2010, 9, 14).unwrap(),
            trans_time: NaiveTime::from_hms_opt(9, 15, 0).unwrap(),
            contract: Contract::equity("AXISBANK"),
        }
    }

    fn config_with_events_log(path: &Path, sparse: bool) -> EngineConfig {
        EngineConfig {
            sparse_events: sparse,
            events_log_file: Some(path.to_path_buf()),
            ..EngineConfig::default()
        }
    }

    #[test]
    fn trade_rows_land_in_the_events_log() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.log");
        let mut recorder = Recorder::open(&config_with_events_log(&path, true)).unwrap();
        recorder.record_trade(&sample_trade()).unwrap();
        recorder.flush().unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        let fields: Vec<&str> = contents.trim().split(',').collect();
        assert_eq!(fields[0], "09:15:00.000250");
        assert_eq!(fields[1], "09/14/2010");
        assert_eq!(fields[2], "00000001");
        assert_eq!(fields[5], "trade");
        assert_eq!(fields[7], "100.05");
        assert_eq!(fields[8], "7");
    }

    #[test]
    fn sparse_mode_suppresses_order_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.log");
        let mut recorder = Recorder::open(&config_with_events_log(&path, true)).unwrap();
        recorder.record_order_event("add", &sample_event()).unwrap();
        recorder.flush().unwrap();
        assert!(fs::read_to_string(&path).unwrap().is_empty());
    }

    #[test]
    fn full_mode_writes_order_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.log");
        let mut recorder = Recorder::open(&config_with_events_log(&path, false)).unwrap();
        recorder.record_order_event("add", &sample_event()).unwrap();
        recorder.flush().unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        let fields: Vec<&str> = contents.trim().split(',').collect();
        assert_eq!(fields[2], "11");
        assert_eq!(fields[5], "add");
        assert_eq!(fields[6], "B");
        assert_eq!(fields[8], "7");
    }

    #[test]
    fn daily_stats_row_embeds_the_snapshot() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("daily.log");
        let config = EngineConfig {
            daily_stats_log_file: Some(path.clone()),
            ..EngineConfig::default()
        };
        let mut recorder = Recorder::open(&config).unwrap();
        recorder
            .record_daily_stats(&DailyStats {
                day: NaiveDate::from_ymd_opt(2010, 9, 14).unwrap(),
                trade_count: 3,
                total_volume: 21,
                mean_price: 100.05,
                std_price: 0.02,
                book: BookSnapshot {
                    best_bid: None,
                    best_ask: Some("100.10".parse().unwrap()),
                    bid_levels: 0,
                    ask_levels: 1,
                    bid_orders: 0,
                    ask_orders: 2,
                    bid_volume: 0,
                    ask_volume: 9,
                },
            })
            .unwrap();
        recorder.flush().unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("09/14/2010,3,21,100.05,0.02,"));
        assert!(contents.contains("best_ask"));
    }

    #[test]
    fn dropping_the_recorder_flushes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.log");
        {
            let mut recorder = Recorder::open(&config_with_events_log(&path, true)).unwrap();
            recorder.record_trade(&sample_trade()).unwrap();
        }
        assert!(fs::read_to_string(&path).unwrap().contains("00000001"));
    }
}
