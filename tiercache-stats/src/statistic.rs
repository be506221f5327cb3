use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::outcome::{Outcome, OutcomeSet};

/// Lock-free per-outcome counters for one operation.
///
/// This is the type-erased form stored in the component graph. Call sites
/// record through the typed [`OperationStatistic`] handle instead.
///
/// # Thread Safety
///
/// All operations use atomic operations with `Relaxed` ordering. Counters are
/// monotonic between resets, which is what lets the sampler diff consecutive
/// reads without ever attributing one event to two buckets.
///
/// # Examples
///
/// ```
/// use tiercache_stats::{OutcomeCounter, OutcomeSet};
///
/// let counter = OutcomeCounter::new(OutcomeSet::StoreGet);
/// counter.record(0);
/// counter.record(0);
/// counter.record(1);
///
/// assert_eq!(counter.count(0), 2);
/// assert_eq!(counter.snapshot(), vec![2, 1]);
/// assert_eq!(counter.total(), 3);
/// ```
#[derive(Debug)]
pub struct OutcomeCounter {
    outcomes: OutcomeSet,
    counts: Box<[AtomicU64]>,
}

impl OutcomeCounter {
    /// Creates a zeroed counter with one slot per variant of `outcomes`.
    pub fn new(outcomes: OutcomeSet) -> Self {
        let counts = (0..outcomes.len()).map(|_| AtomicU64::new(0)).collect();
        Self { outcomes, counts }
    }

    /// The outcome family this counter tracks.
    pub fn outcomes(&self) -> OutcomeSet {
        self.outcomes
    }

    /// Records one occurrence of the outcome at `ordinal`. Out-of-range
    /// ordinals are ignored.
    #[inline]
    pub fn record(&self, ordinal: usize) {
        if let Some(slot) = self.counts.get(ordinal) {
            slot.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Count for one outcome.
    #[inline]
    pub fn count(&self, ordinal: usize) -> u64 {
        self.counts
            .get(ordinal)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Per-outcome counts in ordinal order.
    pub fn snapshot(&self) -> Vec<u64> {
        self.counts
            .iter()
            .map(|c| c.load(Ordering::Relaxed))
            .collect()
    }

    /// Sum over all outcomes.
    pub fn total(&self) -> u64 {
        self.counts.iter().map(|c| c.load(Ordering::Relaxed)).sum()
    }

    /// Resets all counters to zero.
    pub fn reset(&self) {
        for c in self.counts.iter() {
            c.store(0, Ordering::Relaxed);
        }
    }
}

/// Typed recording handle over a shared [`OutcomeCounter`].
///
/// Cloning is cheap and every clone feeds the same counter.
///
/// ```
/// use tiercache_stats::{OperationStatistic, StoreGetOutcome};
///
/// let gets = OperationStatistic::<StoreGetOutcome>::new();
/// gets.record(StoreGetOutcome::Hit);
/// gets.record(StoreGetOutcome::Miss);
/// gets.record(StoreGetOutcome::Hit);
///
/// assert_eq!(gets.count(StoreGetOutcome::Hit), 2);
/// assert!((gets.ratio(StoreGetOutcome::Hit) - 0.6666).abs() < 0.001);
/// ```
#[derive(Debug)]
pub struct OperationStatistic<O: Outcome> {
    counter: Arc<OutcomeCounter>,
    _outcome: PhantomData<fn(O)>,
}

impl<O: Outcome> OperationStatistic<O> {
    pub fn new() -> Self {
        Self {
            counter: Arc::new(OutcomeCounter::new(O::SET)),
            _outcome: PhantomData,
        }
    }

    #[inline]
    pub fn record(&self, outcome: O) {
        self.counter.record(outcome.ordinal());
    }

    #[inline]
    pub fn count(&self, outcome: O) -> u64 {
        self.counter.count(outcome.ordinal())
    }

    pub fn total(&self) -> u64 {
        self.counter.total()
    }

    /// Fraction of all recorded events that were `outcome` (0.0 when empty).
    pub fn ratio(&self, outcome: O) -> f64 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            self.count(outcome) as f64 / total as f64
        }
    }

    pub fn reset(&self) {
        self.counter.reset();
    }

    /// The shared counter, as published into the component graph.
    pub fn counter(&self) -> Arc<OutcomeCounter> {
        Arc::clone(&self.counter)
    }
}

impl<O: Outcome> Default for OperationStatistic<O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O: Outcome> Clone for OperationStatistic<O> {
    fn clone(&self) -> Self {
        Self {
            counter: Arc::clone(&self.counter),
            _outcome: PhantomData,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::{CacheGetOutcome, CachePutOutcome};

    #[test]
    fn test_new_statistic_is_zero() {
        let stat = OperationStatistic::<CacheGetOutcome>::new();
        assert_eq!(stat.total(), 0);
        assert_eq!(stat.count(CacheGetOutcome::Hit), 0);
        assert_eq!(stat.ratio(CacheGetOutcome::Hit), 0.0);
    }

    #[test]
    fn test_record_per_outcome() {
        let stat = OperationStatistic::<CachePutOutcome>::new();
        stat.record(CachePutOutcome::Added);
        stat.record(CachePutOutcome::Updated);
        stat.record(CachePutOutcome::Updated);
        assert_eq!(stat.count(CachePutOutcome::Added), 1);
        assert_eq!(stat.count(CachePutOutcome::Updated), 2);
        assert_eq!(stat.count(CachePutOutcome::Ignored), 0);
        assert_eq!(stat.counter().snapshot(), vec![1, 2, 0]);
    }

    #[test]
    fn test_clones_share_counter() {
        let stat = OperationStatistic::<CacheGetOutcome>::new();
        let other = stat.clone();
        other.record(CacheGetOutcome::MissNotFound);
        assert_eq!(stat.count(CacheGetOutcome::MissNotFound), 1);
    }

    #[test]
    fn test_reset() {
        let stat = OperationStatistic::<CacheGetOutcome>::new();
        stat.record(CacheGetOutcome::Hit);
        stat.reset();
        assert_eq!(stat.total(), 0);
    }

    #[test]
    fn test_out_of_range_ordinal_ignored() {
        let counter = OutcomeCounter::new(OutcomeSet::Eviction);
        counter.record(5);
        assert_eq!(counter.total(), 0);
        assert_eq!(counter.count(5), 0);
    }

    #[test]
    fn test_concurrent_access() {
        use std::thread;

        let stat = OperationStatistic::<CacheGetOutcome>::new();
        let mut handles = vec![];

        for _ in 0..10 {
            let stat_clone = stat.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    stat_clone.record(CacheGetOutcome::Hit);
                }
                for _ in 0..50 {
                    stat_clone.record(CacheGetOutcome::MissNotFound);
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(stat.count(CacheGetOutcome::Hit), 1000);
        assert_eq!(stat.count(CacheGetOutcome::MissNotFound), 500);
        assert_eq!(stat.total(), 1500);
    }
}
