//! Prometheus metrics for book ingestion

use prometheus::{IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry};

use crate::book::{IncrementalReport, SkipCounts, SnapshotReport};
use crate::error::{IngestError, Result};
use crate::side::Side;

/// Counters and gauges updated by the ingestor
#[derive(Clone)]
pub struct IngestMetrics {
    snapshots: IntCounter,
    levels_written: IntCounterVec,
    levels_deleted: IntCounterVec,
    entries_skipped: IntCounterVec,
    store_failures: IntCounter,
    levels: IntGaugeVec,
}

impl IngestMetrics {
    /// Create the metrics and register them on `registry`
    pub fn register(registry: &Registry) -> Result<Self> {
        let metrics = Self {
            snapshots: IntCounter::new("book_snapshots_total", "Snapshots applied")
                .map_err(metric_err)?,
            levels_written: IntCounterVec::new(
                Opts::new("book_levels_written_total", "Price levels written"),
                &["side"],
            )
            .map_err(metric_err)?,
            levels_deleted: IntCounterVec::new(
                Opts::new("book_levels_deleted_total", "Price levels deleted by incremental changes"),
                &["side"],
            )
            .map_err(metric_err)?,
            entries_skipped: IntCounterVec::new(
                Opts::new("book_entries_skipped_total", "Feed entries skipped"),
                &["reason"],
            )
            .map_err(metric_err)?,
            store_failures: IntCounter::new("book_store_failures_total", "Events aborted by a store failure")
                .map_err(metric_err)?,
            levels: IntGaugeVec::new(
                Opts::new("book_levels", "Price levels currently indexed"),
                &["instrument", "side"],
            )
            .map_err(metric_err)?,
        };

        registry.register(Box::new(metrics.snapshots.clone())).map_err(metric_err)?;
        registry.register(Box::new(metrics.levels_written.clone())).map_err(metric_err)?;
        registry.register(Box::new(metrics.levels_deleted.clone())).map_err(metric_err)?;
        registry.register(Box::new(metrics.entries_skipped.clone())).map_err(metric_err)?;
        registry.register(Box::new(metrics.store_failures.clone())).map_err(metric_err)?;
        registry.register(Box::new(metrics.levels.clone())).map_err(metric_err)?;

        Ok(metrics)
    }

    pub fn record_snapshot(&self, report: &SnapshotReport) {
        self.snapshots.inc();
        self.levels_written
            .with_label_values(&[Side::Bid.as_str()])
            .inc_by(report.snapshot.bids.len() as u64);
        self.levels_written
            .with_label_values(&[Side::Offer.as_str()])
            .inc_by(report.snapshot.asks.len() as u64);
        self.record_skips(&report.skipped);
    }

    pub fn record_incremental(&self, report: &IncrementalReport) {
        for side in Side::ALL {
            self.levels_written
                .with_label_values(&[side.as_str()])
                .inc_by(report.written_by_side.get(side) as u64);
            self.levels_deleted
                .with_label_values(&[side.as_str()])
                .inc_by(report.deleted_by_side.get(side) as u64);
        }
        self.record_skips(&report.skipped);
    }

    pub fn record_dropped(&self, count: usize) {
        self.entries_skipped
            .with_label_values(&["no_snapshot"])
            .inc_by(count as u64);
    }

    pub fn record_store_failure(&self) {
        self.store_failures.inc();
    }

    pub fn set_levels(&self, instrument: &str, side: Side, count: usize) {
        self.levels
            .with_label_values(&[instrument, side.as_str()])
            .set(count as i64);
    }

    fn record_skips(&self, skipped: &SkipCounts) {
        if skipped.malformed > 0 {
            self.entries_skipped
                .with_label_values(&["malformed"])
                .inc_by(skipped.malformed as u64);
        }
        if skipped.unknown_side > 0 {
            self.entries_skipped
                .with_label_values(&["unknown_side"])
                .inc_by(skipped.unknown_side as u64);
        }
    }
}

fn metric_err(e: prometheus::Error) -> IngestError {
    IngestError::Config(format!("metrics registration failed: {}", e))
}
