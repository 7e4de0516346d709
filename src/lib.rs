//! Book Ingest - Level-2 Order Book Ingestion Engine
//!
//! This crate consumes snapshot and incremental level-2 market-data events,
//! values each price level in a primary and a secondary currency, and keeps
//! the book in a state store that downstream consumers query by instrument
//! and side.

pub mod auth;
pub mod book;
pub mod config;
pub mod conversion;
pub mod decimal;
pub mod error;
pub mod feed;
pub mod ingest;
pub mod metrics;
pub mod publisher;
pub mod record;
pub mod side;
pub mod store;

pub use book::{BookQuery, BookSummary, IncrementalReconciler, NormalizedSnapshot, OrphanPolicy, SnapshotReconciler};
pub use config::Config;
pub use conversion::CurrencyConverter;
pub use error::{IngestError, Result};
pub use feed::{Event, FeedMessage, FeedSource, IncrementalEvent, ReplayFeed, SnapshotEvent};
pub use ingest::{Ingestor, Outcome, RunStats};
pub use metrics::IngestMetrics;
pub use publisher::Publisher;
pub use record::{BookRecord, RecordId};
pub use side::Side;
pub use store::{MemoryStore, StateStore};
