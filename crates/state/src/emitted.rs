use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};

/// Token mints a BuyIntent has already been emitted for. Insertion
/// ordered and bounded; when the bound is exceeded the oldest half is
/// dropped, which keeps recent history exact without unbounded growth.
#[derive(Debug)]
pub struct EmittedTokens {
    set: HashSet<String>,
    order: VecDeque<String>,
    capacity: usize,
}

impl EmittedTokens {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(2);
        Self {
            set: HashSet::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn from_mints<I: IntoIterator<Item = String>>(capacity: usize, mints: I) -> Self {
        let mut emitted = Self::new(capacity);
        for mint in mints {
            emitted.insert(mint);
        }
        emitted
    }

    /// Returns false when the mint was already present.
    pub fn insert(&mut self, mint: String) -> bool {
        if !self.set.insert(mint.clone()) {
            return false;
        }
        self.order.push_back(mint);
        if self.order.len() > self.capacity {
            self.evict_oldest_half();
        }
        true
    }

    pub fn contains(&self, mint: &str) -> bool {
        self.set.contains(mint)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Insertion-ordered snapshot, oldest first. This is the persisted
    /// document shape.
    pub fn to_vec(&self) -> Vec<String> {
        self.order.iter().cloned().collect()
    }

    fn evict_oldest_half(&mut self) {
        let keep_from = self.order.len() / 2;
        for _ in 0..keep_from {
            if let Some(removed) = self.order.pop_front() {
                self.set.remove(&removed);
            }
        }
    }
}

/// One append-only line of purchased_history.json.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub mint: String,
    /// Unix seconds.
    pub timestamp: i64,
    pub whale_label: String,
    pub amount_sol: f64,
    pub signature: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_is_idempotent_per_mint() {
        let mut emitted = EmittedTokens::new(10);
        assert!(emitted.insert("MintA".to_string()));
        assert!(!emitted.insert("MintA".to_string()));
        assert_eq!(emitted.len(), 1);
    }

    #[test]
    fn overflow_by_one_evicts_oldest_half_and_keeps_recent() {
        let mut emitted = EmittedTokens::new(6);
        for index in 0..7 {
            emitted.insert(format!("Mint{index}"));
        }
        // Seven inserts into capacity six: the oldest three go.
        assert_eq!(emitted.len(), 4);
        assert!(!emitted.contains("Mint0"));
        assert!(!emitted.contains("Mint1"));
        assert!(!emitted.contains("Mint2"));
        assert!(emitted.contains("Mint3"));
        assert!(emitted.contains("Mint6"));
    }

    #[test]
    fn snapshot_preserves_insertion_order() {
        let mut emitted = EmittedTokens::new(10);
        emitted.insert("MintA".to_string());
        emitted.insert("MintB".to_string());
        emitted.insert("MintC".to_string());
        assert_eq!(
            emitted.to_vec(),
            vec![
                "MintA".to_string(),
                "MintB".to_string(),
                "MintC".to_string()
            ]
        );
    }

    #[test]
    fn restore_from_persisted_mints_round_trips() {
        let mut original = EmittedTokens::new(10);
        original.insert("MintA".to_string());
        original.insert("MintB".to_string());
        let restored = EmittedTokens::from_mints(10, original.to_vec());
        assert!(restored.contains("MintA"));
        assert!(restored.contains("MintB"));
        assert_eq!(restored.len(), 2);
    }
}
