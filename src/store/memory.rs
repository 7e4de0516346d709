//! In-process state store

use ordered_float::OrderedFloat;
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::ops::Bound;

use super::{StateStore, StoreError, StoreResult};

type Score = OrderedFloat<f64>;

/// Sorted set with unique members, ordered by (score, member)
#[derive(Debug, Default)]
struct SortedSet {
    scores: HashMap<String, Score>,
    ordered: BTreeSet<(Score, String)>,
}

impl SortedSet {
    fn insert(&mut self, member: &str, score: Score) {
        if let Some(previous) = self.scores.insert(member.to_string(), score) {
            self.ordered.remove(&(previous, member.to_string()));
        }
        self.ordered.insert((score, member.to_string()));
    }

    fn remove(&mut self, member: &str) -> bool {
        match self.scores.remove(member) {
            Some(score) => {
                self.ordered.remove(&(score, member.to_string()));
                true
            }
            None => false,
        }
    }

    fn range(&self, min: Score, max: Score) -> Vec<String> {
        self.ordered
            .range((Bound::Included((min, String::new())), Bound::Unbounded))
            .take_while(|(score, _)| *score <= max)
            .map(|(_, member)| member.clone())
            .collect()
    }
}

/// Thread-safe in-memory [`StateStore`]
#[derive(Debug, Default)]
pub struct MemoryStore {
    sets: RwLock<HashMap<String, SortedSet>>,
    records: RwLock<HashMap<String, HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records currently held
    pub fn record_count(&self) -> usize {
        self.records.read().len()
    }

    /// Keys of all non-empty sorted sets
    pub fn index_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.sets.read().keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl StateStore for MemoryStore {
    fn zadd(&self, key: &str, member: &str, score: f64) -> StoreResult<()> {
        if score.is_nan() {
            return Err(StoreError::Rejected(format!(
                "score for {} in {} is not a number",
                member, key
            )));
        }
        self.sets
            .write()
            .entry(key.to_string())
            .or_default()
            .insert(member, OrderedFloat(score));
        Ok(())
    }

    fn zrange_by_score(&self, key: &str, min: f64, max: f64) -> StoreResult<Vec<String>> {
        if min.is_nan() || max.is_nan() {
            return Err(StoreError::Rejected("score range is not a number".to_string()));
        }
        Ok(self
            .sets
            .read()
            .get(key)
            .map(|set| set.range(OrderedFloat(min), OrderedFloat(max)))
            .unwrap_or_default())
    }

    fn zrem(&self, key: &str, member: &str) -> StoreResult<bool> {
        let mut sets = self.sets.write();
        let Some(set) = sets.get_mut(key) else {
            return Ok(false);
        };
        let removed = set.remove(member);
        if set.scores.is_empty() {
            sets.remove(key);
        }
        Ok(removed)
    }

    fn zrange(&self, key: &str, reverse: bool) -> StoreResult<Vec<(String, f64)>> {
        let sets = self.sets.read();
        let Some(set) = sets.get(key) else {
            return Ok(Vec::new());
        };
        let entries = set
            .ordered
            .iter()
            .map(|(score, member)| (member.clone(), score.into_inner()));
        Ok(if reverse {
            entries.rev().collect()
        } else {
            entries.collect()
        })
    }

    fn zcard(&self, key: &str) -> StoreResult<usize> {
        Ok(self.sets.read().get(key).map(|set| set.scores.len()).unwrap_or(0))
    }

    fn hset(&self, key: &str, fields: &[(String, String)]) -> StoreResult<()> {
        let mut records = self.records.write();
        let record = records.entry(key.to_string()).or_default();
        for (field, value) in fields {
            record.insert(field.clone(), value.clone());
        }
        Ok(())
    }

    fn hgetall(&self, key: &str) -> StoreResult<HashMap<String, String>> {
        Ok(self.records.read().get(key).cloned().unwrap_or_default())
    }

    fn del(&self, key: &str) -> StoreResult<bool> {
        let removed_record = self.records.write().remove(key).is_some();
        let removed_set = self.sets.write().remove(key).is_some();
        Ok(removed_record || removed_set)
    }
}
