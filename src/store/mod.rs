//! State store collaborator
//!
//! The engine persists book state into a store offering two structures:
//! sorted sets ordered by a floating point score, and records holding a
//! field map. [`StateStore`] is the seam; [`MemoryStore`] implements it in
//! process for tests, replay and the query server.

mod memory;

pub use memory::MemoryStore;

use std::collections::HashMap;
use thiserror::Error;


/// Errors reported by a state store
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store rejected command: {0}")]
    Rejected(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Ordered-set and record operations the reconcilers rely on.
///
/// Calls are synchronous and are not retried by the caller. Implementations
/// must be safe to share across threads; callers serialize writes per
/// instrument.
pub trait StateStore: Send + Sync {
    /// Insert `member` into the sorted set at `key`, or move it to `score`.
    fn zadd(&self, key: &str, member: &str, score: f64) -> StoreResult<()>;

    /// Members with `min <= score <= max`, in ascending score order.
    fn zrange_by_score(&self, key: &str, min: f64, max: f64) -> StoreResult<Vec<String>>;

    /// Remove `member`; returns whether it was present.
    fn zrem(&self, key: &str, member: &str) -> StoreResult<bool>;

    /// All members with scores, ascending, or descending when `reverse`.
    fn zrange(&self, key: &str, reverse: bool) -> StoreResult<Vec<(String, f64)>>;

    /// Number of members in the sorted set.
    fn zcard(&self, key: &str) -> StoreResult<usize>;

    /// Set fields on the record at `key`, creating it if needed.
    fn hset(&self, key: &str, fields: &[(String, String)]) -> StoreResult<()>;

    /// All fields of the record at `key`; empty when absent.
    fn hgetall(&self, key: &str) -> StoreResult<HashMap<String, String>>;

    /// Delete any value at `key`; returns whether something was removed.
    fn del(&self, key: &str) -> StoreResult<bool>;
}

impl<S: StateStore + ?Sized> StateStore for std::sync::Arc<S> {
    fn zadd(&self, key: &str, member: &str, score: f64) -> StoreResult<()> {
        (**self).zadd(key, member, score)
    }

    fn zrange_by_score(&self, key: &str, min: f64, max: f64) -> StoreResult<Vec<String>> {
        (**self).zrange_by_score(key, min, max)
    }

    fn zrem(&self, key: &str, member: &str) -> StoreResult<bool> {
        (**self).zrem(key, member)
    }

    fn zrange(&self, key: &str, reverse: bool) -> StoreResult<Vec<(String, f64)>> {
        (**self).zrange(key, reverse)
    }

    fn zcard(&self, key: &str) -> StoreResult<usize> {
        (**self).zcard(key)
    }

    fn hset(&self, key: &str, fields: &[(String, String)]) -> StoreResult<()> {
        (**self).hset(key, fields)
    }

    fn hgetall(&self, key: &str) -> StoreResult<HashMap<String, String>> {
        (**self).hgetall(key)
    }

    fn del(&self, key: &str) -> StoreResult<bool> {
        (**self).del(key)
    }
}
