use crate::alerting::alerts::{AlertStore, Direction, OwnerId, Target};
use crate::error::NotifierError;
use log::{debug, warn};
use std::collections::HashMap;

/// Synchronous price lookup used during one evaluation cycle.
pub trait PriceSource {
    fn price(&self, base: &str, quote: &str) -> Result<f64, NotifierError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct TriggerEvent {
    pub owner: OwnerId,
    pub base: String,
    pub direction: Direction,
    pub quote: String,
    pub target: Target,
    pub observed_price: f64,
}

/// Prices gathered up front for one cycle. Pairs missing from the board are
/// reported as unsupported.
#[derive(Debug, Default, Clone)]
pub struct PriceBoard {
    prices: HashMap<(String, String), f64>,
}

impl PriceBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, base: &str, quote: &str, price: f64) {
        self.prices
            .insert((base.to_string(), quote.to_string()), price);
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

impl PriceSource for PriceBoard {
    fn price(&self, base: &str, quote: &str) -> Result<f64, NotifierError> {
        self.prices
            .get(&(base.to_string(), quote.to_string()))
            .copied()
            .ok_or_else(|| NotifierError::unsupported(base, quote))
    }
}

/// Runs one matching pass over every watch in `store`.
///
/// Each distinct pair is looked up once. Watches on a pair the source cannot
/// quote are left in place. Every triggered watch is removed from the store
/// after the pass, so it fires at most once.
pub fn evaluate_cycle<P>(store: &mut AlertStore, prices: &P) -> Vec<TriggerEvent>
where
    P: PriceSource + ?Sized,
{
    let events = {
        let mut quotes: HashMap<(&str, &str), Option<f64>> = HashMap::new();
        let mut events = Vec::new();

        for watch in store.iter() {
            let quote = *quotes
                .entry((watch.base, watch.quote))
                .or_insert_with(|| match prices.price(watch.base, watch.quote) {
                    Ok(price) => Some(price),
                    Err(e) => {
                        warn!("Skipping {}/{} this cycle: {}", watch.base, watch.quote, e);
                        None
                    }
                });

            let Some(price) = quote else {
                continue;
            };

            if watch.direction.is_triggered(price, watch.target.value()) {
                debug!(
                    "Triggered {} {}/{} {} {} at {}",
                    watch.owner,
                    watch.base,
                    watch.quote,
                    watch.direction,
                    watch.target.value(),
                    price
                );
                events.push(TriggerEvent {
                    owner: watch.owner,
                    base: watch.base.to_string(),
                    direction: watch.direction,
                    quote: watch.quote.to_string(),
                    target: watch.target,
                    observed_price: price,
                });
            }
        }
        events
    };

    for event in &events {
        store.remove_watch(
            event.owner,
            &event.base,
            event.direction,
            &event.quote,
            event.target,
        );
    }

    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn t(value: f64) -> Target {
        Target::new(value).unwrap()
    }

    /// Counts lookups per pair so tests can check memoization.
    #[derive(Default)]
    struct CountingSource {
        board: PriceBoard,
        lookups: RefCell<HashMap<(String, String), usize>>,
    }

    impl CountingSource {
        fn with(base: &str, quote: &str, price: f64) -> Self {
            let mut source = Self::default();
            source.board.insert(base, quote, price);
            source
        }

        fn lookups(&self, base: &str, quote: &str) -> usize {
            self.lookups
                .borrow()
                .get(&(base.to_string(), quote.to_string()))
                .copied()
                .unwrap_or(0)
        }
    }

    impl PriceSource for CountingSource {
        fn price(&self, base: &str, quote: &str) -> Result<f64, NotifierError> {
            *self
                .lookups
                .borrow_mut()
                .entry((base.to_string(), quote.to_string()))
                .or_default() += 1;
            self.board.price(base, quote)
        }
    }

    fn board(base: &str, quote: &str, price: f64) -> PriceBoard {
        let mut board = PriceBoard::new();
        board.insert(base, quote, price);
        board
    }

    #[test]
    fn fires_once_across_cycles() {
        let mut store = AlertStore::new();
        store.add_watch(1, "BTC", Direction::Below, "USD", t(100.0));

        let fired: Vec<usize> = [150.0, 90.0, 80.0]
            .iter()
            .map(|&price| evaluate_cycle(&mut store, &board("BTC", "USD", price)).len())
            .collect();

        assert_eq!(fired, vec![0, 1, 0]);
        assert!(store.is_empty());
    }

    #[test]
    fn equal_price_does_not_trigger() {
        let mut store = AlertStore::new();
        store.add_watch(1, "BTC", Direction::Below, "USD", t(100.0));
        store.add_watch(1, "BTC", Direction::Above, "USD", t(100.0));

        assert!(evaluate_cycle(&mut store, &board("BTC", "USD", 100.0)).is_empty());
        assert_eq!(store.len(), 2);

        let events = evaluate_cycle(&mut store, &board("BTC", "USD", 100.0 + 1e-9));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].direction, Direction::Above);

        let events = evaluate_cycle(&mut store, &board("BTC", "USD", 100.0 - 1e-9));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].direction, Direction::Below);
        assert!(store.is_empty());
    }

    #[test]
    fn shared_pair_is_looked_up_once() {
        let mut store = AlertStore::new();
        store.add_watch(1, "ETH", Direction::Below, "USD", t(2000.0));
        store.add_watch(1, "ETH", Direction::Above, "USD", t(1500.0));
        store.add_watch(2, "ETH", Direction::Above, "USD", t(1900.0));
        store.add_watch(2, "ETH", Direction::Above, "USD", t(1700.0));

        let source = CountingSource::with("ETH", "USD", 1800.0);
        let mut events = evaluate_cycle(&mut store, &source);
        events.sort_by(|a, b| (a.owner, a.target).cmp(&(b.owner, b.target)));

        assert_eq!(source.lookups("ETH", "USD"), 1);
        let fired: Vec<_> = events
            .iter()
            .map(|e| (e.owner, e.direction, e.target.value()))
            .collect();
        assert_eq!(
            fired,
            vec![
                (1, Direction::Above, 1500.0),
                (1, Direction::Below, 2000.0),
                (2, Direction::Above, 1700.0),
            ]
        );
        let left: Vec<_> = store.iter().map(|w| (w.owner, w.target.value())).collect();
        assert_eq!(left, vec![(2, 1900.0)]);
    }

    #[test]
    fn below_scenario_retires_watch() {
        let mut store = AlertStore::new();
        store.add_watch(1, "BTC", Direction::Below, "USD", t(20000.0));

        let events = evaluate_cycle(&mut store, &board("BTC", "USD", 19999.0));
        assert_eq!(
            events,
            vec![TriggerEvent {
                owner: 1,
                base: "BTC".to_string(),
                direction: Direction::Below,
                quote: "USD".to_string(),
                target: t(20000.0),
                observed_price: 19999.0,
            }]
        );
        assert_eq!(store.list_watches(1).count(), 0);

        assert!(evaluate_cycle(&mut store, &board("BTC", "USD", 19000.0)).is_empty());
    }

    #[test]
    fn unsupported_pair_is_skipped_not_removed() {
        let mut store = AlertStore::new();
        store.add_watch(1, "XYZ", Direction::Below, "USD", t(1.0));
        store.add_watch(1, "BTC", Direction::Above, "USD", t(10.0));

        let source = CountingSource::with("BTC", "USD", 11.0);
        let events = evaluate_cycle(&mut store, &source);

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].base, "BTC");
        assert_eq!(source.lookups("XYZ", "USD"), 1);
        let left: Vec<_> = store.iter().map(|w| w.base.to_string()).collect();
        assert_eq!(left, vec!["XYZ".to_string()]);
    }

    #[test]
    fn empty_store_produces_nothing() {
        let mut store = AlertStore::new();
        let source = CountingSource::default();
        assert!(evaluate_cycle(&mut store, &source).is_empty());
        assert!(source.lookups.borrow().is_empty());
    }
}
