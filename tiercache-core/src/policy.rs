use std::fmt;
use std::sync::Arc;

use crate::ElementMetadata;

/// A resident entry as seen by an eviction policy.
#[derive(Clone, Debug)]
pub struct EvictionCandidate<K> {
    pub key: K,
    pub metadata: ElementMetadata,
}

/// Plug-point consulted by a tier before it exceeds its capacity.
///
/// Given the tier's current candidates, return the key that should leave.
/// Returning `None` lets the tier exceed its capacity for now. The element
/// that triggered the sweep is never offered.
pub trait EvictionPolicy<K>: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    fn select_victim(&self, candidates: &[EvictionCandidate<K>]) -> Option<K>;
}

/// Least recently used: oldest last access, ties broken by insertion order.
#[derive(Clone, Copy, Debug, Default)]
pub struct Lru;

/// Least frequently used: lowest hit count, ties broken by recency.
#[derive(Clone, Copy, Debug, Default)]
pub struct Lfu;

/// First in, first out: oldest creation time.
#[derive(Clone, Copy, Debug, Default)]
pub struct Fifo;

/// Uniformly random victim.
#[derive(Clone, Copy, Debug, Default)]
pub struct Random;

fn min_by<K: Clone, T: Ord>(
    candidates: &[EvictionCandidate<K>],
    rank: impl Fn(&ElementMetadata) -> T,
) -> Option<K> {
    candidates
        .iter()
        .min_by_key(|c| (rank(&c.metadata), c.metadata.version))
        .map(|c| c.key.clone())
}

impl<K: Clone> EvictionPolicy<K> for Lru {
    fn name(&self) -> &'static str {
        "lru"
    }

    fn select_victim(&self, candidates: &[EvictionCandidate<K>]) -> Option<K> {
        min_by(candidates, |m| m.last_access_time)
    }
}

impl<K: Clone> EvictionPolicy<K> for Lfu {
    fn name(&self) -> &'static str {
        "lfu"
    }

    fn select_victim(&self, candidates: &[EvictionCandidate<K>]) -> Option<K> {
        min_by(candidates, |m| (m.hit_count, m.last_access_time))
    }
}

impl<K: Clone> EvictionPolicy<K> for Fifo {
    fn name(&self) -> &'static str {
        "fifo"
    }

    fn select_victim(&self, candidates: &[EvictionCandidate<K>]) -> Option<K> {
        min_by(candidates, |m| m.creation_time)
    }
}

impl<K: Clone> EvictionPolicy<K> for Random {
    fn name(&self) -> &'static str {
        "random"
    }

    fn select_victim(&self, candidates: &[EvictionCandidate<K>]) -> Option<K> {
        if candidates.is_empty() {
            return None;
        }
        Some(candidates[fastrand::usize(..candidates.len())].key.clone())
    }
}

/// Names of the reference policies, for configuration.
///
/// # Examples
///
/// ```
/// use tiercache_core::PolicyKind;
///
/// let fifo: PolicyKind = "FIFO".into();
/// assert_eq!(fifo, PolicyKind::Fifo);
///
/// // Unknown names fall back to LRU; use `parse` to reject them instead.
/// let unknown: PolicyKind = "clock".into();
/// assert_eq!(unknown, PolicyKind::Lru);
/// assert_eq!(PolicyKind::parse("clock"), None);
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PolicyKind {
    #[default]
    Lru,
    Lfu,
    Fifo,
    Random,
}

impl PolicyKind {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "lru" => Some(PolicyKind::Lru),
            "lfu" => Some(PolicyKind::Lfu),
            "fifo" => Some(PolicyKind::Fifo),
            "random" => Some(PolicyKind::Random),
            _ => None,
        }
    }

    pub fn build<K: Clone + 'static>(self) -> Arc<dyn EvictionPolicy<K>> {
        match self {
            PolicyKind::Lru => Arc::new(Lru),
            PolicyKind::Lfu => Arc::new(Lfu),
            PolicyKind::Fifo => Arc::new(Fifo),
            PolicyKind::Random => Arc::new(Random),
        }
    }
}

impl From<&str> for PolicyKind {
    fn from(s: &str) -> Self {
        PolicyKind::parse(s).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Element;

    fn candidate(key: &'static str, created: u64, accessed: u64, hits: u64) -> EvictionCandidate<&'static str> {
        let mut element = Element::new_at(key, (), created);
        for _ in 0..hits {
            element.record_access(accessed);
        }
        EvictionCandidate {
            key,
            metadata: *element.metadata(),
        }
    }

    fn sample() -> Vec<EvictionCandidate<&'static str>> {
        vec![
            candidate("old_busy", 100, 900, 5),
            candidate("young_idle", 500, 500, 0),
            candidate("mid", 300, 700, 1),
        ]
    }

    #[test]
    fn test_lru_picks_oldest_access() {
        assert_eq!(Lru.select_victim(&sample()), Some("young_idle"));
    }

    #[test]
    fn test_lfu_picks_lowest_hits() {
        assert_eq!(Lfu.select_victim(&sample()), Some("young_idle"));
        let mut s = sample();
        s.remove(1);
        assert_eq!(Lfu.select_victim(&s), Some("mid"));
    }

    #[test]
    fn test_fifo_picks_oldest_creation() {
        assert_eq!(Fifo.select_victim(&sample()), Some("old_busy"));
    }

    #[test]
    fn test_random_picks_a_candidate() {
        let s = sample();
        let victim = Random.select_victim(&s).unwrap();
        assert!(s.iter().any(|c| c.key == victim));
        assert_eq!(EvictionPolicy::<&str>::select_victim(&Random, &[]), None);
    }

    #[test]
    fn test_policy_kind_names() {
        assert_eq!(PolicyKind::from("lfu"), PolicyKind::Lfu);
        assert_eq!(PolicyKind::from("Random"), PolicyKind::Random);
        assert_eq!(PolicyKind::default(), PolicyKind::Lru);
        assert_eq!(PolicyKind::Fifo.build::<u32>().name(), "fifo");
    }
}
