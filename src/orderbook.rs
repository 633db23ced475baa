use std::collections::{BTreeMap, HashMap, VecDeque};

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::debug;

use crate::errors::EngineError;
use crate::orders::{Order, Side};
use crate::price::{Price, TickSize};

/// One fill produced by the match loop: the resting side's price, the
/// matched volume, and the resting order it was taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fill {
    pub price: Price,
    pub quantity: u64,
    pub resting_order_number: u64,
}

/// An [`OrderBook`] holds the **resting** orders in two [`BTreeMap`]s keyed
/// by tick-scaled price:
/// - `bids` (buy orders): matching walks the keys **in reverse**, highest
///   price first
/// - `asks` (sell orders): matching walks the keys forward, lowest first
///
/// Each price level is a FIFO [`VecDeque`] preserving arrival order, which
/// together with the best-price-first walk gives strict price-time
/// priority. A flat index maps every resting order number to its
/// (side, price), so cancels and modifies land on the right queue without
/// walking the book; within a level, only that queue is scanned.
///
/// A level with an empty queue never survives an operation: whichever call
/// drains the last order also deletes the level.
pub struct OrderBook {
    bids: BTreeMap<Price, VecDeque<Order>>,
    asks: BTreeMap<Price, VecDeque<Order>>,
    index: HashMap<u64, (Side, Price)>,
}

/// Unifies forward (`IterMut`) and reverse (`Rev<IterMut>`) price-level
/// iteration so the match loop is written once for both sides.
enum EitherIter<'a> {
    Fwd(std::collections::btree_map::IterMut<'a, Price, VecDeque<Order>>),
    Rev(std::iter::Rev<std::collections::btree_map::IterMut<'a, Price, VecDeque<Order>>>),
}

impl<'a> Iterator for EitherIter<'a> {
    type Item = (&'a Price, &'a mut VecDeque<Order>);

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            EitherIter::Fwd(iter) => iter.next(),
            EitherIter::Rev(iter) => iter.next(),
        }
    }
}

impl OrderBook {
    pub fn new() -> Self {
        Self {
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            index: HashMap::new(),
        }
    }

    fn side(&self, side: Side) -> &BTreeMap<Price, VecDeque<Order>> {
        match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        }
    }

    fn side_mut(&mut self, side: Side) -> &mut BTreeMap<Price, VecDeque<Order>> {
        match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        }
    }

    /// Best resting price on a side: the highest bid or the lowest ask.
    pub fn best_price(&self, side: Side) -> Option<Price> {
        match side {
            Side::Buy => self.bids.keys().next_back().copied(),
            Side::Sell => self.asks.keys().next().copied(),
        }
    }

    pub fn level(&self, side: Side, price: Price) -> Option<&VecDeque<Order>> {
        self.side(side).get(&price)
    }

    /// Creates an empty level. The add and match paths create levels on
    /// demand through [`OrderBook::append`]; this is the strict primitive
    /// for callers that need the existence check.
    pub fn create_level(&mut self, side: Side, price: Price) -> Result<(), EngineError> {
        let book_side = self.side_mut(side);
        if book_side.contains_key(&price) {
            return Err(EngineError::LevelExists(price));
        }
        book_side.insert(price, VecDeque::new());
        Ok(())
    }

    pub fn delete_level(&mut self, side: Side, price: Price) -> Result<(), EngineError> {
        self.side_mut(side)
            .remove(&price)
            .map(|_| ())
            .ok_or(EngineError::LevelMissing(price))
    }

    /// Appends a resting order at the back of its level's queue, creating
    /// the level on demand, and records it in the order index. The order
    /// number must not already be resting.
    pub fn append(&mut self, order: Order) -> Result<(), EngineError> {
        let Some(price) = order.price else {
            return Err(EngineError::InvariantViolation(format!(
                "market order {} cannot rest in the book",
                order.order_number
            )));
        };
        if self.index.contains_key(&order.order_number) {
            return Err(EngineError::InvariantViolation(format!(
                "order number {} is already resting",
                order.order_number
            )));
        }
        self.index.insert(order.order_number, (order.side, price));
        self.side_mut(order.side)
            .entry(price)
            .or_default()
            .push_back(order);
        Ok(())
    }

    /// Removes a resting order wherever it sits. The index is
    /// authoritative; an emptied level is deleted before returning.
    pub fn remove(&mut self, order_number: u64) -> Result<Order, EngineError> {
        let (side, price) = self
            .index
            .remove(&order_number)
            .ok_or(EngineError::OrderMissing(order_number))?;
        let book_side = match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        };
        let queue = book_side.get_mut(&price).ok_or_else(|| {
            EngineError::InvariantViolation(format!(
                "order {order_number} indexed at a missing {side:?} level {price}"
            ))
        })?;
        let pos = queue
            .iter()
            .position(|o| o.order_number == order_number)
            .ok_or_else(|| {
                EngineError::InvariantViolation(format!(
                    "order {order_number} indexed but absent from its level queue"
                ))
            })?;
        let Some(order) = queue.remove(pos) else {
            return Err(EngineError::InvariantViolation(format!(
                "order {order_number} vanished during removal"
            )));
        };
        if queue.is_empty() {
            book_side.remove(&price);
        }
        Ok(order)
    }

    /// Position-preserving volume rewrite, used by modifies that shrink an
    /// order without touching its price.
    pub fn update_volumes(
        &mut self,
        order_number: u64,
        volume_original: u64,
        volume_disclosed: u64,
    ) -> Result<(), EngineError> {
        let (side, price) = self
            .index
            .get(&order_number)
            .copied()
            .ok_or(EngineError::OrderMissing(order_number))?;
        let order = self
            .side_mut(side)
            .get_mut(&price)
            .and_then(|queue| {
                queue
                    .iter_mut()
                    .find(|o| o.order_number == order_number)
            })
            .ok_or_else(|| {
                EngineError::InvariantViolation(format!(
                    "order {order_number} indexed but absent from {side:?} level {price}"
                ))
            })?;
        order.volume_original = volume_original;
        order.volume_disclosed = volume_disclosed;
        Ok(())
    }

    pub fn get(&self, order_number: u64) -> Option<&Order> {
        let (side, price) = self.index.get(&order_number).copied()?;
        self.side(side)
            .get(&price)?
            .iter()
            .find(|o| o.order_number == order_number)
    }

    pub fn contains(&self, order_number: u64) -> bool {
        self.index.contains_key(&order_number)
    }

    pub fn lookup(&self, order_number: u64) -> Option<(Side, Price)> {
        self.index.get(&order_number).copied()
    }

    /// Number of resting orders across both sides.
    pub fn order_count(&self) -> usize {
        self.index.len()
    }

    /// Number of active price levels on a side.
    pub fn depth(&self, side: Side) -> usize {
        self.side(side).len()
    }

    pub fn resting_volume(&self, side: Side) -> u64 {
        self.side(side)
            .values()
            .flat_map(|queue| queue.iter())
            .map(|o| o.volume_original)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    /// Empties both sides and the index. Day boundaries go through here.
    pub fn clear(&mut self) {
        self.bids.clear();
        self.asks.clear();
        self.index.clear();
    }

    /// Runs an incoming order against the book: matches whatever is
    /// marketable, then rests a limit residue at its own price. Market
    /// residue expires silently.
    pub fn execute(&mut self, mut incoming: Order) -> Result<Vec<Fill>, EngineError> {
        let fills = self.match_incoming(&mut incoming);
        if incoming.volume_original > 0 {
            if incoming.price.is_some() {
                self.append(incoming)?;
            } else {
                debug!(
                    order = incoming.order_number,
                    leftover = incoming.volume_original,
                    "unmatched market volume expired"
                );
            }
        }
        Ok(fills)
    }

    /// The price-time-priority match loop.
    ///
    /// Walks the opposite side best price first, consuming queue heads with
    /// `min(remaining, resting)` fills. Terminates when the incoming volume
    /// is exhausted, the opposite side runs dry, or (for limit orders) the
    /// next level no longer satisfies the limit. A level whose limit price
    /// exactly equals the incoming limit still trades.
    fn match_incoming(&mut self, incoming: &mut Order) -> Vec<Fill> {
        let mut fills = Vec::new();
        let mut exhausted_levels = Vec::new();

        let OrderBook { bids, asks, index } = self;
        // The opposite side, best price first.
        let iter = match incoming.side {
            Side::Buy => EitherIter::Fwd(asks.iter_mut()),
            Side::Sell => EitherIter::Rev(bids.iter_mut().rev()),
        };

        'levels: for (&price, queue) in iter {
            if let Some(limit) = incoming.price {
                let beyond_limit = match incoming.side {
                    Side::Buy => price > limit,
                    Side::Sell => price < limit,
                };
                if beyond_limit {
                    break;
                }
            }

            while let Some(resting) = queue.front_mut() {
                let traded = incoming.volume_original.min(resting.volume_original);
                fills.push(Fill {
                    price,
                    quantity: traded,
                    resting_order_number: resting.order_number,
                });
                incoming.volume_original -= traded;
                resting.volume_original -= traded;

                if resting.volume_original == 0 {
                    if let Some(filled) = queue.pop_front() {
                        index.remove(&filled.order_number);
                    }
                }
                if queue.is_empty() {
                    exhausted_levels.push(price);
                }
                if incoming.volume_original == 0 {
                    break 'levels;
                }
            }
        }

        // Drained levels cannot be deleted mid-iteration; prune them now.
        let opposite = match incoming.side {
            Side::Buy => asks,
            Side::Sell => bids,
        };
        for price in exhausted_levels {
            opposite.remove(&price);
        }

        fills
    }

    pub fn snapshot(&self, tick: &TickSize) -> BookSnapshot {
        BookSnapshot {
            best_bid: self.best_price(Side::Buy).map(|p| tick.to_decimal(p)),
            best_ask: self.best_price(Side::Sell).map(|p| tick.to_decimal(p)),
            bid_levels: self.bids.len(),
            ask_levels: self.asks.len(),
            bid_orders: self.bids.values().map(|q| q.len()).sum(),
            ask_orders: self.asks.values().map(|q| q.len()).sum(),
            bid_volume: self.resting_volume(Side::Buy),
            ask_volume: self.resting_volume(Side::Sell),
        }
    }

    /// Full structural audit: index and book agree entry for entry, no
    /// level is empty, and the book is neither locked nor crossed. The test
    /// suite runs this after every event; production paths rely on the
    /// operations above maintaining it.
    pub fn check_invariants(&self) -> Result<(), EngineError> {
        let violation = |detail: String| Err(EngineError::InvariantViolation(detail));

        for (side, book_side) in [(Side::Buy, &self.bids), (Side::Sell, &self.asks)] {
            for (&price, queue) in book_side {
                if queue.is_empty() {
                    return violation(format!("empty {side:?} level at {price}"));
                }
                for order in queue {
                    if order.side != side || order.price != Some(price) {
                        return violation(format!(
                            "order {} rests under the wrong key",
                            order.order_number
                        ));
                    }
                    match self.index.get(&order.order_number) {
                        Some(&(s, p)) if s == side && p == price => {}
                        _ => {
                            return violation(format!(
                                "order {} rests unindexed",
                                order.order_number
                            ));
                        }
                    }
                }
            }
        }

        let resting: usize = self.bids.values().map(|q| q.len()).sum::<usize>()
            + self.asks.values().map(|q| q.len()).sum::<usize>();
        if resting != self.index.len() {
            return violation(format!(
                "index holds {} entries for {} resting orders",
                self.index.len(),
                resting
            ));
        }

        if let (Some(bid), Some(ask)) =
            (self.best_price(Side::Buy), self.best_price(Side::Sell))
        {
            if bid >= ask {
                return violation(format!(
                    "book is locked or crossed: best bid {bid}, best ask {ask}"
                ));
            }
        }
        Ok(())
    }
}

impl Default for OrderBook {
    fn default() -> Self {
        Self::new()
    }
}

/// Aggregate book shape captured for the stats log and the day-end record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookSnapshot {
    pub best_bid: Option<Decimal>,
    pub best_ask: Option<Decimal>,
    pub bid_levels: usize,
    pub ask_levels: usize,
    pub bid_orders: usize,
    pub ask_orders: usize,
    pub bid_volume: u64,
    pub ask_volume: u64,
}
