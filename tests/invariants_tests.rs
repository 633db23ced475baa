use chrono::{NaiveDate, NaiveTime};
use proptest::prelude::*;
use rust_decimal::Decimal;

use nse_lob_engine::engine::{Engine, EngineConfig};
use nse_lob_engine::instrument::Contract;
use nse_lob_engine::orders::{Activity, OrderEvent, Side};
use nse_lob_engine::simulate::{self, SimConfig};

/// Compact description of one generated event, mapped onto a concrete
/// stream by `build_events`.
#[derive(Debug, Clone, Copy)]
struct FlowOp {
    kind: u8,    // 0 = limit add, 1 = market add, 2 = cancel, 3 = modify
    target: u64, // picks the referenced order for cancel/modify
    buy: bool,
    price_off: u8, // ticks above a 1990-tick floor
    volume: u8,
}

fn flow_op() -> impl Strategy<Value = FlowOp> {
    (0u8..4, any::<u64>(), any::<bool>(), 0u8..20, 1u8..=50).prop_map(
        |(kind, target, buy, price_off, volume)| FlowOp {
            kind,
            target,
            buy,
            price_off,
            volume,
        },
    )
}

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2010, 9, 14).unwrap()
}

fn build_events(ops: &[FlowOp]) -> Vec<OrderEvent> {
    let tick = Decimal::new(5, 2);
    let mut events = Vec::with_capacity(ops.len());
    for (i, op) in ops.iter().enumerate() {
        let number = 1000 + i as u64;
        let side = if op.buy { Side::Buy } else { Side::Sell };
        let price = Decimal::from(1990 + op.price_off as u64) * tick;
        let trans_time =
            NaiveTime::from_num_seconds_from_midnight_opt(9 * 3600 + 900 + i as u32, 0).unwrap();
        let (order_number, activity, is_market) = match op.kind {
            0 => (number, Activity::Add, false),
            1 => (number, Activity::Add, true),
            // reference some earlier order number, which may or may not
            // still be resting
            2 => (1000 + op.target % (i as u64 + 1), Activity::Cancel, false),
            _ => (1000 + op.target % (i as u64 + 1), Activity::Modify, false),
        };
        events.push(OrderEvent {
            order_number,
            side,
            activity,
            is_market,
            limit_price: if is_market { Decimal::ZERO } else { price },
            volume_disclosed: op.volume as u64,
            volume_original: op.volume as u64,
            trans_date: day(),
            trans_time,
            contract: Contract::equity("AXISBANK"),
        });
    }
    events
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn book_invariants_hold_after_every_event(ops in prop::collection::vec(flow_op(), 1..150)) {
        let events = build_events(&ops);
        let mut engine = Engine::new(EngineConfig::default()).unwrap();
        for event in events {
            let volume_before: u64 = event.volume_original;
            let trades_before = engine.trades().len();
            let is_add = event.activity == Activity::Add || event.is_market;

            engine.process_event(event).unwrap();
            prop_assert!(engine.book().check_invariants().is_ok());

            if is_add {
                // an add can never fill more than it brought
                let filled: u64 = engine.trades()[trades_before..]
                    .iter()
                    .map(|t| t.trade_quantity)
                    .sum();
                prop_assert!(filled <= volume_before);
            }
        }
    }

    #[test]
    fn trade_numbers_increase_by_one_within_a_day(ops in prop::collection::vec(flow_op(), 1..150)) {
        let events = build_events(&ops);
        let mut engine = Engine::new(EngineConfig::default()).unwrap();
        engine.process(events).unwrap();
        for (i, trade) in engine.trades().iter().enumerate() {
            prop_assert_eq!(trade.trade_number, i as u64 + 1);
        }
    }

    #[test]
    fn replay_is_deterministic(ops in prop::collection::vec(flow_op(), 1..150)) {
        let events = build_events(&ops);
        let mut first = Engine::new(EngineConfig::default()).unwrap();
        first.process(events.clone()).unwrap();
        let mut second = Engine::new(EngineConfig::default()).unwrap();
        second.process(events).unwrap();
        prop_assert_eq!(first.trades(), second.trades());
    }
}

#[test]
fn dense_synthetic_flow_keeps_the_book_sound() {
    let config = SimConfig {
        events: 5_000,
        seed: 7,
        ..SimConfig::default()
    };
    let events = simulate::generate(&config);

    let mut engine = Engine::new(EngineConfig::default()).unwrap();
    for (i, event) in events.iter().enumerate() {
        engine.process_event(event.clone()).unwrap();
        if i % 250 == 0 {
            engine.book().check_invariants().unwrap();
        }
    }
    engine.book().check_invariants().unwrap();

    let mut replay = Engine::new(EngineConfig::default()).unwrap();
    replay.process(events).unwrap();
    assert_eq!(engine.trades(), replay.trades());
    assert!(!engine.trades().is_empty());
}
