//! Synthetic order-flow generation for smoke tests and benchmarks.

use chrono::{Duration, NaiveDate, NaiveTime};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Exp1, Normal};
use rust_decimal::Decimal;

use crate::instrument::Contract;
use crate::orders::{Activity, OrderEvent, Side};

/// Knobs for the generator. The defaults give a liquid book with a mildly
/// drifting mid.
#[derive(Debug, Clone)]
pub struct SimConfig {
    pub events: usize,
    pub seed: u64,
    /// Starting mid price, in ticks.
    pub mid_ticks: f64,
    pub tick_size: Decimal,
    /// N(0, sigma) drift applied to the mid per event.
    pub noise_sigma: f64,
    /// Average order size (unit-exponential * mean_volume).
    pub mean_volume: f64,
    pub symbol: String,
    pub trans_date: NaiveDate,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            events: 10_000,
            seed: 42,
            mid_ticks: 2000.0, // 100.00 at the default 0.05 tick
            tick_size: Decimal::new(5, 2),
            noise_sigma: 1.5,
            mean_volume: 20.0,
            symbol: "AXISBANK".to_string(),
            trans_date: NaiveDate::from_ymd_opt(2010, 9, 14).unwrap_or_default(),
        }
    }
}

/// Generates a plausible intraday stream: mostly limit adds quoted around
/// a drifting mid, with market orders, cancels and modifies mixed in.
/// Deterministic for a given config; the same seed yields the same stream.
pub fn generate(config: &SimConfig) -> Vec<OrderEvent> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let drift = Normal::new(0.0, config.noise_sigma).expect("noise_sigma must be non-negative");

    let mut mid = config.mid_ticks;
    // Orders we have issued and not yet cancelled; cancels and modifies
    // draw from here. Entries may already have traded out in the engine,
    // which exercises its cancel-of-unknown handling.
    let mut live: Vec<(u64, Side, u64, u64)> = Vec::new();
    let mut events = Vec::with_capacity(config.events);
    let mut next_number: u64 = 1;

    let open = NaiveTime::from_hms_opt(9, 15, 0).unwrap_or_default();
    for i in 0..config.events {
        let trans_time = open + Duration::microseconds(i as i64 * 1_000);

        mid = (mid + drift.sample(&mut rng)).max(10.0);
        let unit: f64 = Exp1.sample(&mut rng);
        let volume = (unit * config.mean_volume).max(1.0).round() as u64;

        let roll: f64 = rng.random();
        let event = if roll < 0.70 || live.is_empty() {
            let side = if rng.random_bool(0.5) {
                Side::Buy
            } else {
                Side::Sell
            };
            // Quotes mostly sit behind the mid; small negative offsets
            // produce the occasional crossing order.
            let offset = rng.random_range(-2i64..=6) as f64;
            let ticks = match side {
                Side::Buy => (mid - offset).max(1.0),
                Side::Sell => (mid + offset).max(1.0),
            }
            .round() as u64;
            let number = next_number;
            next_number += 1;
            live.push((number, side, ticks, volume));
            limit_event(config, number, side, Activity::Add, ticks, volume, trans_time)
        } else if roll < 0.78 {
            let side = if rng.random_bool(0.5) {
                Side::Buy
            } else {
                Side::Sell
            };
            let number = next_number;
            next_number += 1;
            market_event(config, number, side, volume, trans_time)
        } else if roll < 0.92 {
            let slot = rng.random_range(0..live.len());
            let (number, side, ticks, volume) = live.swap_remove(slot);
            limit_event(config, number, side, Activity::Cancel, ticks, volume, trans_time)
        } else {
            let slot = rng.random_range(0..live.len());
            let entry = &mut live[slot];
            if rng.random_bool(0.5) {
                entry.2 = entry.2.saturating_add(1);
            } else {
                entry.3 = entry.3.saturating_add(volume);
            }
            let (number, side, ticks, volume) = *entry;
            limit_event(config, number, side, Activity::Modify, ticks, volume, trans_time)
        };
        events.push(event);
    }
    events
}

fn limit_event(
    config: &SimConfig,
    number: u64,
    side: Side,
    activity: Activity,
    ticks: u64,
    volume: u64,
    trans_time: NaiveTime,
) -> OrderEvent {
    OrderEvent {
        order_number: number,
        side,
        activity,
        is_market: false,
        limit_price: Decimal::from(ticks) * config.tick_size,
        volume_disclosed: volume,
        volume_original: volume,
        trans_date: config.trans_date,
        trans_time,
        contract: Contract::equity(&config.symbol),
    }
}

fn market_event(
    config: &SimConfig,
    number: u64,
    side: Side,
    volume: u64,
    trans_time: NaiveTime,
) -> OrderEvent {
    OrderEvent {
        order_number: number,
        side,
        activity: Activity::Add,
        is_market: true,
        limit_price: Decimal::ZERO,
        volume_disclosed: volume,
        volume_original: volume,
        trans_date: config.trans_date,
        trans_time,
        contract: Contract::equity(&config.symbol),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_stream() {
        let config = SimConfig {
            events: 500,
            ..SimConfig::default()
        };
        let a = generate(&config);
        let b = generate(&config);
        assert_eq!(a.len(), 500);
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.order_number, y.order_number);
            assert_eq!(x.limit_price, y.limit_price);
            assert_eq!(x.volume_original, y.volume_original);
        }
    }

    #[test]
    fn prices_are_tick_multiples() {
        let config = SimConfig {
            events: 300,
            ..SimConfig::default()
        };
        for event in generate(&config) {
            if !event.is_market {
                assert_eq!(event.limit_price % config.tick_size, Decimal::ZERO);
            }
        }
    }

    #[test]
    fn add_numbers_are_unique() {
        let config = SimConfig {
            events: 400,
            ..SimConfig::default()
        };
        let mut seen = std::collections::HashSet::new();
        for event in generate(&config) {
            if event.activity == Activity::Add {
                assert!(seen.insert(event.order_number));
            }
        }
    }
}
