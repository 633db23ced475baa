use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::{NaiveDate, NaiveTime};
use csv::{DeserializeRecordsIntoIter, ReaderBuilder, Trim};
use flate2::read::GzDecoder;
use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;

use crate::errors::EngineError;
use crate::instrument::Contract;
use crate::orders::{Activity, OrderEvent, Side};

/// Records pulled per chunk by default, matching the upstream replay
/// tooling. Chunk boundaries carry no semantics; they only bound memory
/// while replaying multi-gigabyte order files.
pub const DEFAULT_CHUNK_SIZE: usize = 500;

const DATE_FORMAT: &str = "%m/%d/%Y";
const TIME_FORMAT: &str = "%H:%M:%S%.f";

/// Errors raised while reading and normalizing the order feed.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("record {index}: bad trans_date {value:?}")]
    BadDate { index: u64, value: String },
    #[error("record {index}: bad trans_time {value:?}")]
    BadTime { index: u64, value: String },
    #[error("record {index}: bad mkt_flag {value:?}")]
    BadMarketFlag { index: u64, value: String },
    #[error("record {index}: limit order without a limit price")]
    MissingPrice { index: u64 },
    #[error("record {index}: {source}")]
    Event { index: u64, source: EngineError },
}

/// One raw row of the 22-column headerless order file, mapped positionally.
#[derive(Debug, Deserialize)]
struct RawRecord {
    _record_indicator: String,
    _segment: String,
    order_number: u64,
    trans_date: String,
    trans_time: String,
    buy_sell_indicator: String,
    activity_type: u8,
    symbol: String,
    instrument: String,
    expiry_date: String,
    strike_price: String,
    option_type: String,
    volume_disclosed: u64,
    volume_original: u64,
    limit_price: Option<Decimal>,
    trigger_price: String,
    mkt_flag: String,
    on_stop_flag: String,
    io_flag: String,
    spread_comb_type: String,
    algo_ind: String,
    client_id_flag: String,
}

fn normalize(record: RawRecord, index: u64) -> Result<OrderEvent, FeedError> {
    let trans_date =
        NaiveDate::parse_from_str(&record.trans_date, DATE_FORMAT).map_err(|_| {
            FeedError::BadDate {
                index,
                value: record.trans_date.clone(),
            }
        })?;
    let trans_time =
        NaiveTime::parse_from_str(&record.trans_time, TIME_FORMAT).map_err(|_| {
            FeedError::BadTime {
                index,
                value: record.trans_time.clone(),
            }
        })?;
    let side = Side::from_indicator(&record.buy_sell_indicator)
        .map_err(|source| FeedError::Event { index, source })?;
    let activity = Activity::from_code(record.activity_type)
        .map_err(|source| FeedError::Event { index, source })?;
    let is_market = match record.mkt_flag.as_str() {
        "Y" => true,
        "N" => false,
        other => {
            return Err(FeedError::BadMarketFlag {
                index,
                value: other.to_string(),
            });
        }
    };
    let limit_price = match (is_market, record.limit_price) {
        (true, price) => price.unwrap_or_default(),
        (false, Some(price)) => price,
        (false, None) => return Err(FeedError::MissingPrice { index }),
    };

    Ok(OrderEvent {
        order_number: record.order_number,
        side,
        activity,
        is_market,
        limit_price,
        volume_disclosed: record.volume_disclosed,
        volume_original: record.volume_original,
        trans_date,
        trans_time,
        contract: Contract {
            symbol: record.symbol,
            instrument: record.instrument,
            expiry_date: record.expiry_date,
            strike_price: record.strike_price,
            option_type: record.option_type,
            trigger_price: record.trigger_price,
            on_stop_flag: record.on_stop_flag,
            io_flag: record.io_flag,
            spread_comb_type: record.spread_comb_type,
            algo_ind: record.algo_ind,
            client_id_flag: record.client_id_flag,
        },
    })
}

/// Streams order events out of a CSV source in fixed-size chunks.
pub struct OrderFeed<R: Read> {
    records: DeserializeRecordsIntoIter<R, RawRecord>,
    chunk_size: usize,
    index: u64,
}

impl OrderFeed<Box<dyn Read>> {
    /// Opens a plain or gzip-compressed (`.gz`) order file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, FeedError> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let reader: Box<dyn Read> = if path.extension().is_some_and(|ext| ext == "gz") {
            Box::new(GzDecoder::new(file))
        } else {
            Box::new(file)
        };
        Ok(Self::with_reader(reader, DEFAULT_CHUNK_SIZE))
    }
}

impl<R: Read> OrderFeed<R> {
    pub fn with_reader(reader: R, chunk_size: usize) -> Self {
        let records = ReaderBuilder::new()
            .has_headers(false)
            .trim(Trim::All)
            .from_reader(reader)
            .into_deserialize();
        Self {
            records,
            chunk_size: chunk_size.max(1),
            index: 0,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Reads up to `chunk_size` events; `None` once the source is
    /// exhausted.
    pub fn next_chunk(&mut self) -> Result<Option<Vec<OrderEvent>>, FeedError> {
        let mut chunk = Vec::with_capacity(self.chunk_size);
        while chunk.len() < self.chunk_size {
            match self.records.next() {
                Some(record) => {
                    self.index += 1;
                    chunk.push(normalize(record?, self.index)?);
                }
                None => break,
            }
        }
        Ok(if chunk.is_empty() { None } else { Some(chunk) })
    }

    /// Drains the feed as one iterator, for callers that do not care about
    /// chunking.
    pub fn events(self) -> impl Iterator<Item = Result<OrderEvent, FeedError>> {
        let mut index = self.index;
        self.records.map(move |record| {
            index += 1;
            normalize(record?, index)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const ADD_ROW: &str =
        "ORDR,CM,1,09/14/2010,09:15:00.123456,B,1,AXISBANK,EQ,,,,10,10,100.00,,N,N,,,,\n";

    fn feed_from(data: &str) -> OrderFeed<Cursor<Vec<u8>>> {
        OrderFeed::with_reader(Cursor::new(data.as_bytes().to_vec()), DEFAULT_CHUNK_SIZE)
    }

    #[test]
    fn parses_a_full_add_row() {
        let events: Vec<_> = feed_from(ADD_ROW).events().collect::<Result<_, _>>().unwrap();
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.order_number, 1);
        assert_eq!(event.side, Side::Buy);
        assert_eq!(event.activity, Activity::Add);
        assert!(!event.is_market);
        assert_eq!(event.limit_price, "100.00".parse::<Decimal>().unwrap());
        assert_eq!(event.volume_original, 10);
        assert_eq!(
            event.trans_date,
            NaiveDate::from_ymd_opt(2010, 9, 14).unwrap()
        );
        assert_eq!(
            event.trans_time,
            NaiveTime::from_hms_micro_opt(9, 15, 0, 123_456).unwrap()
        );
        assert_eq!(event.contract.symbol, "AXISBANK");
        assert_eq!(event.contract.instrument, "EQ");
    }

    #[test]
    fn market_orders_tolerate_a_missing_price() {
        let row = "ORDR,CM,2,09/14/2010,09:15:01.000000,S,1,AXISBANK,EQ,,,,5,5,,,Y,N,,,,\n";
        let events: Vec<_> = feed_from(row).events().collect::<Result<_, _>>().unwrap();
        assert!(events[0].is_market);
        assert_eq!(events[0].limit_price, Decimal::ZERO);
    }

    #[test]
    fn limit_orders_require_a_price() {
        let row = "ORDR,CM,2,09/14/2010,09:15:01.000000,S,1,AXISBANK,EQ,,,,5,5,,,N,N,,,,\n";
        let err = feed_from(row).events().next().unwrap().unwrap_err();
        assert!(matches!(err, FeedError::MissingPrice { index: 1 }));
    }

    #[test]
    fn rejects_unknown_activity_and_side() {
        let bad_activity =
            "ORDR,CM,3,09/14/2010,09:15:01.000000,B,2,AXISBANK,EQ,,,,5,5,100.00,,N,N,,,,\n";
        let err = feed_from(bad_activity).events().next().unwrap().unwrap_err();
        assert!(matches!(
            err,
            FeedError::Event {
                source: EngineError::UnknownActivity(2),
                ..
            }
        ));

        let bad_side =
            "ORDR,CM,3,09/14/2010,09:15:01.000000,X,1,AXISBANK,EQ,,,,5,5,100.00,,N,N,,,,\n";
        let err = feed_from(bad_side).events().next().unwrap().unwrap_err();
        assert!(matches!(
            err,
            FeedError::Event {
                source: EngineError::InvalidSide(_),
                ..
            }
        ));
    }

    #[test]
    fn trims_whitespace_around_fields() {
        let row =
            "ORDR, CM , 4 ,09/14/2010, 09:15:02.000000 , B ,1, AXISBANK ,EQ,,,,5,5, 100.05 ,,N,N,,,,\n";
        let events: Vec<_> = feed_from(row).events().collect::<Result<_, _>>().unwrap();
        assert_eq!(events[0].order_number, 4);
        assert_eq!(events[0].contract.symbol, "AXISBANK");
        assert_eq!(events[0].limit_price, "100.05".parse::<Decimal>().unwrap());
    }

    #[test]
    fn chunks_split_only_at_record_boundaries() {
        let mut data = String::new();
        for i in 1..=7 {
            data.push_str(&format!(
                "ORDR,CM,{i},09/14/2010,09:15:00.000000,B,1,AXISBANK,EQ,,,,5,5,100.00,,N,N,,,,\n"
            ));
        }
        let mut feed = feed_from(&data).with_chunk_size(3);
        assert_eq!(feed.next_chunk().unwrap().unwrap().len(), 3);
        assert_eq!(feed.next_chunk().unwrap().unwrap().len(), 3);
        assert_eq!(feed.next_chunk().unwrap().unwrap().len(), 1);
        assert!(feed.next_chunk().unwrap().is_none());
    }
}
