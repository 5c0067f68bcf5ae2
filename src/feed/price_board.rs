//! Latest-price board with lock-free reads.
//!
//! Each write swaps in a new immutable map; readers load the current map
//! without blocking writers or each other.

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use super::catalog::Market;
use super::hermes::parse_hermes_batch;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceTick {
    pub market: Market,
    pub price: f64,
    pub received_at_ms: i64,
}

#[derive(Debug)]
pub struct PriceBoard {
    ticks: ArcSwap<HashMap<Market, PriceTick>>,
    accepted: AtomicU64,
    rejected: AtomicU64,
}

impl Default for PriceBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl PriceBoard {
    pub fn new() -> Self {
        Self {
            ticks: ArcSwap::new(Arc::new(HashMap::new())),
            accepted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    /// Record a tick. Non-finite or non-positive prices are dropped and
    /// leave the previous tick in place.
    pub fn record(&self, market: Market, price: f64, received_at_ms: i64) -> bool {
        if !(price.is_finite() && price > 0.0) {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            debug!(market = market.as_str(), price, "price tick dropped");
            return false;
        }

        let tick = PriceTick {
            market,
            price,
            received_at_ms,
        };
        self.ticks.rcu(|current| {
            let mut next = HashMap::clone(current);
            next.insert(market, tick);
            next
        });
        self.accepted.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Record every known feed in a Hermes latest-price body.
    /// Returns how many ticks were accepted; unknown feed ids are skipped.
    pub fn ingest_hermes(&self, body: &Value, received_at_ms: i64) -> usize {
        parse_hermes_batch(body)
            .into_iter()
            .filter_map(|(id, price)| Market::from_feed_id(&id).map(|m| (m, price)))
            .filter(|(market, price)| self.record(*market, *price, received_at_ms))
            .count()
    }

    pub fn latest(&self, market: Market) -> Option<PriceTick> {
        self.ticks.load().get(&market).copied()
    }

    pub fn latest_price(&self, market: Market) -> Option<f64> {
        self.latest(market).map(|t| t.price)
    }

    /// Milliseconds since the last tick for `market`.
    pub fn age_ms(&self, market: Market, now_ms: i64) -> Option<i64> {
        self.latest(market)
            .map(|t| (now_ms - t.received_at_ms).max(0))
    }

    pub fn accepted_count(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    pub fn rejected_count(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latest_tick_wins_and_bad_ticks_are_ignored() {
        let board = PriceBoard::new();
        assert!(board.latest(Market::BtcUsd).is_none());

        assert!(board.record(Market::BtcUsd, 64_000.0, 1_000));
        assert!(board.record(Market::BtcUsd, 64_010.5, 2_000));
        assert!(!board.record(Market::BtcUsd, 0.0, 3_000));
        assert!(!board.record(Market::BtcUsd, f64::NAN, 3_000));

        let tick = board.latest(Market::BtcUsd).unwrap();
        assert_eq!(tick.price, 64_010.5);
        assert_eq!(board.age_ms(Market::BtcUsd, 2_500), Some(500));
        assert_eq!(board.accepted_count(), 2);
        assert_eq!(board.rejected_count(), 2);
        assert!(board.latest_price(Market::EthUsd).is_none());
    }

    #[test]
    fn test_ingest_hermes_records_known_feeds() {
        let board = PriceBoard::new();
        let body = serde_json::json!({
            "parsed": [
                {
                    "id": Market::EthUsd.pyth_feed_id(),
                    "price": { "price": "310012000000", "expo": -8 }
                },
                {
                    "id": "0x0000000000000000000000000000000000000000000000000000000000000001",
                    "price": { "price": "100", "expo": 0 }
                },
                {
                    "id": Market::SolUsd.pyth_feed_id(),
                    "price": { "price": "-5", "expo": 0 }
                }
            ]
        });
        assert_eq!(board.ingest_hermes(&body, 7_000), 1);
        let tick = board.latest(Market::EthUsd).unwrap();
        assert!((tick.price - 3_100.12).abs() < 1e-9);
        assert_eq!(tick.received_at_ms, 7_000);
        assert!(board.latest(Market::SolUsd).is_none());
        assert_eq!(board.rejected_count(), 1);
    }

    #[test]
    fn test_concurrent_writers_keep_every_market() {
        let board = Arc::new(PriceBoard::new());
        let handles: Vec<_> = Market::ALL
            .into_iter()
            .enumerate()
            .map(|(i, market)| {
                let board = board.clone();
                std::thread::spawn(move || {
                    for n in 1..=100 {
                        board.record(market, (i * 1000 + n) as f64, n as i64);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        for (i, market) in Market::ALL.into_iter().enumerate() {
            assert_eq!(board.latest_price(market), Some((i * 1000 + 100) as f64));
        }
    }
}
