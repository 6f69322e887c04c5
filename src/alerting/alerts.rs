use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Destination of notifications (a Telegram chat id).
pub type OwnerId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Above,
    Below,
}

impl Direction {
    /// Strict comparison: a price equal to the target never triggers.
    pub fn is_triggered(self, price: f64, target: f64) -> bool {
        match self {
            Direction::Above => price > target,
            Direction::Below => price < target,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Above => write!(f, "above"),
            Direction::Below => write!(f, "below"),
        }
    }
}

/// A strictly positive, finite target price.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Target(f64);

impl Target {
    pub fn new(value: f64) -> Option<Self> {
        if value.is_finite() && value > 0.0 {
            Some(Target(value))
        } else {
            None
        }
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl TryFrom<f64> for Target {
    type Error = String;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Target::new(value).ok_or_else(|| format!("target must be positive, got {}", value))
    }
}

impl From<Target> for f64 {
    fn from(target: Target) -> f64 {
        target.0
    }
}

impl PartialEq for Target {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Target {}

impl PartialOrd for Target {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Target {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Composite key of one watch set. Field order gives owner-major ordering,
/// which `list_watches` relies on for its range scan.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WatchKey {
    pub owner: OwnerId,
    pub base: String,
    pub direction: Direction,
    pub quote: String,
}

impl WatchKey {
    pub fn new(owner: OwnerId, base: &str, direction: Direction, quote: &str) -> Self {
        Self {
            owner,
            base: base.to_string(),
            direction,
            quote: quote.to_string(),
        }
    }

    fn owner_start(owner: OwnerId) -> Self {
        Self {
            owner,
            base: String::new(),
            direction: Direction::Above,
            quote: String::new(),
        }
    }
}

/// One watch as seen by a reader of the store.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WatchEntry<'a> {
    pub owner: OwnerId,
    pub base: &'a str,
    pub direction: Direction,
    pub quote: &'a str,
    pub target: Target,
}

/// Flat persisted form of one watch set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchRecord {
    pub owner: OwnerId,
    pub base: String,
    pub direction: Direction,
    pub quote: String,
    pub targets: Vec<Target>,
}

/// Active watches for every owner.
///
/// Logically a tree `owner -> base -> direction -> quote -> targets`, held as a
/// single map from the composite key to its target set. A key is present only
/// while its set is non-empty.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct AlertStore {
    watches: BTreeMap<WatchKey, BTreeSet<Target>>,
}

impl AlertStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when the target was already present.
    pub fn add_watch(
        &mut self,
        owner: OwnerId,
        base: &str,
        direction: Direction,
        quote: &str,
        target: Target,
    ) -> bool {
        self.watches
            .entry(WatchKey::new(owner, base, direction, quote))
            .or_default()
            .insert(target)
    }

    /// Removing an absent watch is a no-op.
    pub fn remove_watch(
        &mut self,
        owner: OwnerId,
        base: &str,
        direction: Direction,
        quote: &str,
        target: Target,
    ) -> bool {
        let key = WatchKey::new(owner, base, direction, quote);
        let Some(targets) = self.watches.get_mut(&key) else {
            return false;
        };
        let removed = targets.remove(&target);
        if targets.is_empty() {
            self.watches.remove(&key);
        }
        removed
    }

    pub fn list_watches(&self, owner: OwnerId) -> impl Iterator<Item = WatchEntry<'_>> + '_ {
        self.watches
            .range(WatchKey::owner_start(owner)..)
            .take_while(move |(key, _)| key.owner == owner)
            .flat_map(|(key, targets)| Self::entries(key, targets))
    }

    /// Returns how many watches were dropped.
    pub fn clear_owner(&mut self, owner: OwnerId) -> usize {
        let mut removed = 0;
        self.watches.retain(|key, targets| {
            if key.owner == owner {
                removed += targets.len();
                false
            } else {
                true
            }
        });
        removed
    }

    pub fn iter(&self) -> impl Iterator<Item = WatchEntry<'_>> + '_ {
        self.watches
            .iter()
            .flat_map(|(key, targets)| Self::entries(key, targets))
    }

    /// Distinct `(base, quote)` pairs with at least one watch.
    pub fn pairs(&self) -> BTreeSet<(String, String)> {
        self.watches
            .keys()
            .map(|key| (key.base.clone(), key.quote.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.watches.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.watches.is_empty()
    }

    pub fn owner_count(&self) -> usize {
        let owners: BTreeSet<OwnerId> = self.watches.keys().map(|key| key.owner).collect();
        owners.len()
    }

    pub fn to_records(&self) -> Vec<WatchRecord> {
        self.watches
            .iter()
            .map(|(key, targets)| WatchRecord {
                owner: key.owner,
                base: key.base.clone(),
                direction: key.direction,
                quote: key.quote.clone(),
                targets: targets.iter().copied().collect(),
            })
            .collect()
    }

    pub fn from_records(records: Vec<WatchRecord>) -> Self {
        let mut store = Self::new();
        for record in records {
            for target in record.targets {
                store.add_watch(
                    record.owner,
                    &record.base,
                    record.direction,
                    &record.quote,
                    target,
                );
            }
        }
        store
    }

    fn entries<'a>(
        key: &'a WatchKey,
        targets: &'a BTreeSet<Target>,
    ) -> impl Iterator<Item = WatchEntry<'a>> + 'a {
        targets.iter().map(move |&target| WatchEntry {
            owner: key.owner,
            base: &key.base,
            direction: key.direction,
            quote: &key.quote,
            target,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(value: f64) -> Target {
        Target::new(value).unwrap()
    }

    #[test]
    fn target_rejects_non_positive() {
        assert!(Target::new(0.0).is_none());
        assert!(Target::new(-1.0).is_none());
        assert!(Target::new(f64::NAN).is_none());
        assert!(Target::new(f64::INFINITY).is_none());
        assert_eq!(Target::new(0.5).map(Target::value), Some(0.5));
    }

    #[test]
    fn idempotent_insert() {
        let mut store = AlertStore::new();
        assert!(store.add_watch(1, "BTC", Direction::Below, "USD", t(100.0)));
        assert!(!store.add_watch(1, "BTC", Direction::Below, "USD", t(100.0)));

        assert_eq!(store.len(), 1);
        assert_eq!(store.list_watches(1).count(), 1);
    }

    #[test]
    fn removing_last_watch_leaves_empty_store() {
        let mut store = AlertStore::new();
        store.add_watch(1, "BTC", Direction::Below, "USD", t(100.0));

        assert!(store.remove_watch(1, "BTC", Direction::Below, "USD", t(100.0)));
        assert_eq!(store.list_watches(1).count(), 0);
        assert!(store.is_empty());
        assert_eq!(store, AlertStore::new());
    }

    #[test]
    fn removal_keeps_sibling_sets() {
        let mut store = AlertStore::new();
        store.add_watch(1, "BTC", Direction::Below, "USD", t(100.0));
        store.add_watch(1, "BTC", Direction::Below, "USD", t(90.0));
        store.add_watch(1, "BTC", Direction::Above, "USD", t(200.0));
        store.add_watch(1, "ETH", Direction::Below, "BTC", t(0.05));

        let mut expected = store.clone();
        store.add_watch(1, "BTC", Direction::Below, "EUR", t(80.0));
        store.remove_watch(1, "BTC", Direction::Below, "EUR", t(80.0));
        assert_eq!(store, expected);

        store.remove_watch(1, "BTC", Direction::Below, "USD", t(100.0));
        expected = AlertStore::new();
        expected.add_watch(1, "BTC", Direction::Below, "USD", t(90.0));
        expected.add_watch(1, "BTC", Direction::Above, "USD", t(200.0));
        expected.add_watch(1, "ETH", Direction::Below, "BTC", t(0.05));
        assert_eq!(store, expected);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn removing_absent_watch_is_noop() {
        let mut store = AlertStore::new();
        store.add_watch(1, "BTC", Direction::Below, "USD", t(100.0));
        let before = store.clone();

        assert!(!store.remove_watch(1, "BTC", Direction::Below, "USD", t(50.0)));
        assert!(!store.remove_watch(2, "BTC", Direction::Below, "USD", t(100.0)));
        assert!(!store.remove_watch(1, "BTC", Direction::Above, "USD", t(100.0)));
        assert_eq!(store, before);
    }

    #[test]
    fn list_watches_is_scoped_to_owner() {
        let mut store = AlertStore::new();
        store.add_watch(-5, "BTC", Direction::Above, "USD", t(1.0));
        store.add_watch(1, "BTC", Direction::Below, "USD", t(100.0));
        store.add_watch(1, "ADA", Direction::Above, "EUR", t(2.0));
        store.add_watch(2, "ETH", Direction::Below, "USD", t(10.0));

        let listed: Vec<_> = store
            .list_watches(1)
            .map(|w| (w.base, w.direction, w.quote, w.target.value()))
            .collect();
        assert_eq!(
            listed,
            vec![
                ("ADA", Direction::Above, "EUR", 2.0),
                ("BTC", Direction::Below, "USD", 100.0),
            ]
        );
        assert_eq!(store.list_watches(3).count(), 0);
        // restartable
        assert_eq!(store.list_watches(1).count(), 2);
    }

    #[test]
    fn clear_owner_removes_whole_subtree() {
        let mut store = AlertStore::new();
        store.add_watch(1, "BTC", Direction::Below, "USD", t(100.0));
        store.add_watch(1, "ETH", Direction::Above, "USD", t(5000.0));
        store.add_watch(2, "ETH", Direction::Above, "USD", t(5000.0));

        assert_eq!(store.clear_owner(1), 2);
        assert_eq!(store.list_watches(1).count(), 0);
        assert_eq!(store.owner_count(), 1);
        assert_eq!(store.clear_owner(1), 0);
    }

    #[test]
    fn pairs_are_distinct() {
        let mut store = AlertStore::new();
        store.add_watch(1, "BTC", Direction::Below, "USD", t(100.0));
        store.add_watch(2, "BTC", Direction::Above, "USD", t(300.0));
        store.add_watch(2, "BTC", Direction::Above, "EUR", t(300.0));

        let pairs: Vec<_> = store.pairs().into_iter().collect();
        assert_eq!(
            pairs,
            vec![
                ("BTC".to_string(), "EUR".to_string()),
                ("BTC".to_string(), "USD".to_string()),
            ]
        );
    }

    #[test]
    fn records_rebuild_the_same_store() {
        let mut store = AlertStore::new();
        store.add_watch(1, "BTC", Direction::Below, "USD", t(100.0));
        store.add_watch(1, "BTC", Direction::Below, "USD", t(90.0));
        store.add_watch(7, "DOGE", Direction::Above, "BTC", t(0.000002));

        let rebuilt = AlertStore::from_records(store.to_records());
        assert_eq!(rebuilt, store);
    }
}
