use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// At-most-once reservation of `(signature, token_mint)` fingerprints
/// across all ingress channels. The first caller to reserve a pair wins;
/// every later caller sees `false` and drops its copy of the signal.
///
/// Bounded: when the structure exceeds its capacity the oldest half is
/// evicted, which keeps recent history exact without unbounded growth.
/// Check-and-insert happens under one short std mutex, never held across
/// an await point.
pub struct SignalDedup {
    inner: Mutex<DedupInner>,
    hits: AtomicU64,
    passes: AtomicU64,
}

struct DedupInner {
    seen: HashSet<(String, String)>,
    order: VecDeque<(String, String)>,
    capacity: usize,
}

impl SignalDedup {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(2);
        Self {
            inner: Mutex::new(DedupInner {
                seen: HashSet::with_capacity(capacity),
                order: VecDeque::with_capacity(capacity),
                capacity,
            }),
            hits: AtomicU64::new(0),
            passes: AtomicU64::new(0),
        }
    }

    /// Returns true exactly once per distinct `(signature, token_mint)`
    /// pair within the retained window.
    pub fn try_reserve(&self, signature: &str, token_mint: &str) -> bool {
        let key = (signature.to_string(), token_mint.to_string());
        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !inner.seen.insert(key.clone()) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        inner.order.push_back(key);
        if inner.order.len() > inner.capacity {
            let drop_count = inner.order.len() / 2;
            for _ in 0..drop_count {
                if let Some(evicted) = inner.order.pop_front() {
                    inner.seen.remove(&evicted);
                }
            }
        }
        self.passes.fetch_add(1, Ordering::Relaxed);
        true
    }

    pub fn processed_count(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .order
            .len()
    }

    pub fn dedup_hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn dedup_passes(&self) -> u64 {
        self.passes.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn first_reservation_wins_and_duplicates_lose() {
        let dedup = SignalDedup::new(100);
        assert!(dedup.try_reserve("sig-1", "mint-a"));
        assert!(!dedup.try_reserve("sig-1", "mint-a"));
        assert_eq!(dedup.dedup_hits(), 1);
        assert_eq!(dedup.dedup_passes(), 1);
    }

    #[test]
    fn same_signature_different_mint_is_a_distinct_fingerprint() {
        let dedup = SignalDedup::new(100);
        assert!(dedup.try_reserve("sig-1", "mint-a"));
        assert!(dedup.try_reserve("sig-1", "mint-b"));
    }

    #[test]
    fn capacity_overflow_by_one_evicts_oldest_half_only() {
        let dedup = SignalDedup::new(10);
        for index in 0..11 {
            assert!(dedup.try_reserve(&format!("sig-{index}"), "mint"));
        }
        // The five oldest were evicted and can be re-reserved; the most
        // recent entries are still recognized as duplicates.
        assert!(dedup.try_reserve("sig-0", "mint"));
        assert!(!dedup.try_reserve("sig-10", "mint"));
        assert!(!dedup.try_reserve("sig-6", "mint"));
    }

    #[test]
    fn concurrent_reservations_grant_exactly_one_winner() {
        let dedup = Arc::new(SignalDedup::new(1_000));
        let mut handles = Vec::new();
        for _ in 0..16 {
            let dedup = Arc::clone(&dedup);
            handles.push(std::thread::spawn(move || {
                dedup.try_reserve("contended-sig", "contended-mint")
            }));
        }
        let winners = handles
            .into_iter()
            .map(|handle| handle.join().expect("thread"))
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }
}
