//! Event routing
//!
//! The [`Ingestor`] routes each feed event to the matching reconciler while
//! holding a per-instrument lock, so one instrument never has two
//! reconciliations in flight. Different instruments proceed independently.

use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::book::{
    IncrementalReconciler, IncrementalReport, LevelPricing, NormalizedSnapshot, OrphanPolicy,
    SnapshotReconciler, SnapshotReport,
};
use crate::config::Config;
use crate::error::{IngestError, Result};
use crate::feed::{Event, FeedSource};
use crate::metrics::IngestMetrics;
use crate::publisher::Publisher;
use crate::side::{index_key, Side};
use crate::store::StateStore;

/// Result of handling one event
#[derive(Debug, Clone)]
pub enum Outcome {
    Snapshot(SnapshotReport),
    Incremental(IncrementalReport),
    /// Incremental event for an instrument that has not had a snapshot yet
    Dropped { instrument: String, changes: usize },
}

/// Totals for a completed feed run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub events: u64,
    pub snapshots: u64,
    pub incrementals: u64,
    pub dropped: u64,
}

/// Routes feed events to the reconcilers
pub struct Ingestor<S> {
    store: S,
    snapshots: SnapshotReconciler<S>,
    incrementals: IncrementalReconciler<S>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    seeded: RwLock<HashSet<String>>,
    require_snapshot: bool,
    metrics: Option<IngestMetrics>,
    publisher: Option<Publisher>,
}

impl<S: StateStore + Clone> Ingestor<S> {
    pub fn new(store: S, pricing: LevelPricing, orphans: OrphanPolicy) -> Self {
        Self {
            snapshots: SnapshotReconciler::new(store.clone(), pricing.clone(), orphans),
            incrementals: IncrementalReconciler::new(store.clone(), pricing, orphans),
            store,
            locks: Mutex::new(HashMap::new()),
            seeded: RwLock::new(HashSet::new()),
            require_snapshot: false,
            metrics: None,
            publisher: None,
        }
    }

    /// Build from configuration, without metrics or publisher
    pub fn from_config(store: S, config: &Config) -> Result<Self> {
        Ok(Self::new(store, config.pricing()?, config.orphan_policy).require_snapshot(config.require_snapshot))
    }

    /// Drop incremental events until the instrument has had a snapshot
    pub fn require_snapshot(mut self, require: bool) -> Self {
        self.require_snapshot = require;
        self
    }

    pub fn with_metrics(mut self, metrics: IngestMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_publisher(mut self, publisher: Publisher) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Whether a snapshot has been applied for `instrument`
    pub fn has_snapshot(&self, instrument: &str) -> bool {
        self.seeded.read().contains(instrument)
    }

    /// Apply one event under the instrument's lock.
    ///
    /// A `StoreWrite` error means the event was only partly applied; the
    /// caller decides whether to re-deliver it.
    pub fn handle(&self, event: &Event) -> Result<Outcome> {
        let instrument = event.instrument();
        let lock = self.lock_for(instrument);
        let _guard = lock.lock();

        let outcome = match event {
            Event::Snapshot(snapshot) => {
                let report = self.snapshots.apply(snapshot).inspect_err(|e| self.on_error(e))?;
                self.seeded.write().insert(instrument.to_string());
                if let Some(metrics) = &self.metrics {
                    metrics.record_snapshot(&report);
                }
                Outcome::Snapshot(report)
            }
            Event::Incremental(update) => {
                if self.require_snapshot && !self.has_snapshot(instrument) {
                    warn!(
                        instrument = %instrument,
                        changes = update.changes.len(),
                        "Dropping incremental event received before a snapshot"
                    );
                    if let Some(metrics) = &self.metrics {
                        metrics.record_dropped(update.changes.len());
                    }
                    return Ok(Outcome::Dropped {
                        instrument: instrument.to_string(),
                        changes: update.changes.len(),
                    });
                }

                let report = self.incrementals.apply(update).inspect_err(|e| self.on_error(e))?;
                if let Some(metrics) = &self.metrics {
                    metrics.record_incremental(&report);
                }
                Outcome::Incremental(report)
            }
        };

        self.update_gauges(instrument);
        Ok(outcome)
    }

    /// Drive `feed` until it is exhausted or a store write fails
    pub async fn run<F: FeedSource>(&self, mut feed: F) -> Result<RunStats> {
        let mut stats = RunStats::default();

        while let Some(event) = feed.next_event().await? {
            stats.events += 1;
            match self.handle(&event)? {
                Outcome::Snapshot(report) => {
                    stats.snapshots += 1;
                    self.audit(&report.snapshot).await;
                }
                Outcome::Incremental(_) => stats.incrementals += 1,
                Outcome::Dropped { .. } => stats.dropped += 1,
            }
        }

        info!(
            events = stats.events,
            snapshots = stats.snapshots,
            incrementals = stats.incrementals,
            dropped = stats.dropped,
            "Feed exhausted"
        );
        Ok(stats)
    }

    /// Emit a normalized snapshot to the audit side-channel
    pub async fn audit(&self, snapshot: &NormalizedSnapshot) {
        match serde_json::to_string(snapshot) {
            Ok(payload) => info!(
                target: "book_ingest::audit",
                instrument = %snapshot.instrument,
                snapshot = %payload,
                "Normalized snapshot"
            ),
            Err(e) => warn!(error = %e, "Failed to serialize snapshot audit"),
        }

        if let Some(publisher) = &self.publisher {
            if let Err(e) = publisher.publish(snapshot).await {
                warn!(instrument = %snapshot.instrument, error = %e, "Failed to publish snapshot audit");
            }
        }
    }

    fn lock_for(&self, instrument: &str) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .entry(instrument.to_string())
            .or_default()
            .clone()
    }

    fn on_error(&self, e: &IngestError) {
        if let IngestError::StoreWrite(_) = e {
            error!(error = %e, "State store write failed, event not fully applied");
            if let Some(metrics) = &self.metrics {
                metrics.record_store_failure();
            }
        }
    }

    fn update_gauges(&self, instrument: &str) {
        let Some(metrics) = &self.metrics else {
            return;
        };
        for side in Side::ALL {
            match self.store.zcard(&index_key(instrument, side)) {
                Ok(count) => metrics.set_levels(instrument, side, count),
                Err(e) => warn!(instrument = %instrument, side = %side, error = %e, "Failed to read level count"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversion::CurrencyConverter;
    use crate::feed::{ChannelFeed, IncrementalEvent, SnapshotEvent};
    use crate::store::{MemoryStore, StoreError, StoreResult};
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn pricing() -> LevelPricing {
        LevelPricing::new(CurrencyConverter::new(dec!(58.0)).unwrap(), "0.0000001", 20)
    }

    fn ingestor(store: Arc<MemoryStore>) -> Ingestor<Arc<MemoryStore>> {
        Ingestor::new(store, pricing(), OrphanPolicy::Delete)
    }

    #[test]
    fn test_routes_events() {
        let store = Arc::new(MemoryStore::new());
        let ingestor = ingestor(store.clone());

        let outcome = ingestor
            .handle(&Event::Snapshot(SnapshotEvent::new("BTC-USD", &[("100.50", "2")], &[])))
            .unwrap();
        assert!(matches!(outcome, Outcome::Snapshot(ref r) if r.written == 1));
        assert!(ingestor.has_snapshot("BTC-USD"));

        let outcome = ingestor
            .handle(&Event::Incremental(IncrementalEvent::new("BTC-USD", &[("buy", "100.50", "0")])))
            .unwrap();
        assert!(matches!(outcome, Outcome::Incremental(ref r) if r.deleted == 1));
        assert_eq!(store.zcard("BTC-USD_buy").unwrap(), 0);
    }

    #[test]
    fn test_incremental_before_snapshot() {
        let update = Event::Incremental(IncrementalEvent::new("ETH-USD", &[("sell", "10", "1")]));

        let store = Arc::new(MemoryStore::new());
        let accepting = ingestor(store.clone());
        assert!(matches!(accepting.handle(&update).unwrap(), Outcome::Incremental(_)));
        assert_eq!(store.zcard("ETH-USD_sell").unwrap(), 1);

        let store = Arc::new(MemoryStore::new());
        let strict = ingestor(store.clone()).require_snapshot(true);
        assert!(matches!(
            strict.handle(&update).unwrap(),
            Outcome::Dropped { changes: 1, .. }
        ));
        assert_eq!(store.zcard("ETH-USD_sell").unwrap(), 0);
    }

    #[test]
    fn test_metrics_and_gauges() {
        let registry = prometheus::Registry::new();
        let metrics = IngestMetrics::register(&registry).unwrap();
        let ingestor = ingestor(Arc::new(MemoryStore::new())).with_metrics(metrics);

        ingestor
            .handle(&Event::Snapshot(SnapshotEvent::new(
                "BTC-USD",
                &[("100", "1"), ("99", "1")],
                &[("101", "1")],
            )))
            .unwrap();

        let gauge = registry
            .gather()
            .into_iter()
            .find(|family| family.get_name() == "book_levels")
            .unwrap();
        let bids = gauge
            .get_metric()
            .iter()
            .find(|m| m.get_label().iter().any(|l| l.get_value() == "buy"))
            .unwrap();
        assert_eq!(bids.get_gauge().get_value(), 2.0);
    }

    #[test]
    fn test_parallel_instruments() {
        let ingestor = ingestor(Arc::new(MemoryStore::new()));

        std::thread::scope(|scope| {
            for instrument in ["BTC-USD", "ETH-USD", "SOL-USD"] {
                let ingestor = &ingestor;
                scope.spawn(move || {
                    for i in 1..=50 {
                        let price = format!("{}", 100 + i);
                        let event = IncrementalEvent::new(instrument, &[("buy", price.as_str(), "1")]);
                        ingestor.handle(&Event::Incremental(event)).unwrap();
                    }
                });
            }
        });

        let query = crate::book::BookQuery::new(ingestor.store.clone());
        for instrument in ["BTC-USD", "ETH-USD", "SOL-USD"] {
            assert_eq!(query.levels(instrument, Side::Bid).unwrap().len(), 50);
        }
    }

    #[tokio::test]
    async fn test_run_over_channel_feed() {
        let store = Arc::new(MemoryStore::new());
        let ingestor = ingestor(store.clone());
        let (sender, feed) = ChannelFeed::new(8);

        sender
            .send(Event::Snapshot(SnapshotEvent::new("BTC-USD", &[("100", "1")], &[("101", "1")])))
            .await
            .unwrap();
        sender
            .send(Event::Incremental(IncrementalEvent::new("BTC-USD", &[("sell", "102", "3")])))
            .await
            .unwrap();
        drop(sender);

        let stats = ingestor.run(feed).await.unwrap();
        assert_eq!(
            stats,
            RunStats {
                events: 2,
                snapshots: 1,
                incrementals: 1,
                dropped: 0
            }
        );
        assert_eq!(store.zcard("BTC-USD_sell").unwrap(), 2);
    }

    /// Memory store whose record writes can be switched off
    #[derive(Clone, Default)]
    struct FlakyStore {
        inner: Arc<MemoryStore>,
        fail_writes: Arc<AtomicBool>,
    }

    impl StateStore for FlakyStore {
        fn zadd(&self, key: &str, member: &str, score: f64) -> StoreResult<()> {
            self.inner.zadd(key, member, score)
        }
        fn zrange_by_score(&self, key: &str, min: f64, max: f64) -> StoreResult<Vec<String>> {
            self.inner.zrange_by_score(key, min, max)
        }
        fn zrem(&self, key: &str, member: &str) -> StoreResult<bool> {
            self.inner.zrem(key, member)
        }
        fn zrange(&self, key: &str, reverse: bool) -> StoreResult<Vec<(String, f64)>> {
            self.inner.zrange(key, reverse)
        }
        fn zcard(&self, key: &str) -> StoreResult<usize> {
            self.inner.zcard(key)
        }
        fn hset(&self, key: &str, fields: &[(String, String)]) -> StoreResult<()> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("connection reset".to_string()));
            }
            self.inner.hset(key, fields)
        }
        fn hgetall(&self, key: &str) -> StoreResult<HashMap<String, String>> {
            self.inner.hgetall(key)
        }
        fn del(&self, key: &str) -> StoreResult<bool> {
            self.inner.del(key)
        }
    }

    #[test]
    fn test_store_failure_stops_run() {
        let store = FlakyStore::default();
        let registry = prometheus::Registry::new();
        let ingestor = Ingestor::new(store.clone(), pricing(), OrphanPolicy::Delete)
            .with_metrics(IngestMetrics::register(&registry).unwrap());

        let (sender, feed) = ChannelFeed::new(8);
        store.fail_writes.store(true, Ordering::SeqCst);

        let result = tokio_test::block_on(async {
            sender
                .send(Event::Snapshot(SnapshotEvent::new("BTC-USD", &[("100", "1")], &[])))
                .await
                .unwrap();
            drop(sender);
            ingestor.run(feed).await
        });

        assert!(matches!(result, Err(IngestError::StoreWrite(_))));
        assert!(!ingestor.has_snapshot("BTC-USD"));
        assert_eq!(store.zcard("BTC-USD_buy").unwrap(), 0);

        let failures = registry
            .gather()
            .into_iter()
            .find(|family| family.get_name() == "book_store_failures_total")
            .unwrap();
        assert_eq!(failures.get_metric()[0].get_counter().get_value(), 1.0);
    }
}
