//! # Tiercache
//!
//! A multi-tier cache: a bounded heap tier that spills its evictions into a
//! disk tier, every tier behind the same atomic store contract, and
//! per-operation statistics discovered from a live component graph.
//!
//! ## Features
//!
//! - **Uniform store contract**: heap, disk and absent tiers all implement
//!   [`Store`], including atomic `put_if_absent`, `replace_if` and
//!   `remove_element`
//! - **Overflow to disk**: heap victims move to an append-only disk file and
//!   stay readable
//! - **Pluggable eviction**: LRU, LFU, FIFO or random, or your own
//!   [`EvictionPolicy`]
//! - **Expiry**: time-to-live, time-to-idle and eternal elements
//! - **Operation statistics**: a fixed catalog of operation kinds bound to
//!   the counters stores publish, sampled into windowed history
//!
//! ## Quick Start
//!
//! ```rust
//! use tiercache::{Cache, CacheConfig};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let config = CacheConfig::new("sessions")
//!     .max_entries_in_memory(2)
//!     .overflow_to_disk(true)
//!     .disk_path(dir.path())
//!     .statistics(false);
//! let cache: Cache<String, String> = Cache::new(config).unwrap();
//!
//! for id in ["a", "b", "c"] {
//!     cache.put(id.to_string(), format!("session {}", id)).unwrap();
//! }
//! assert_eq!(cache.in_memory_size(), 2);
//! assert_eq!(cache.on_disk_size(), 1);
//! assert_eq!(cache.get(&"a".to_string()).unwrap(), Some("session a".to_string()));
//! ```
//!
//! ## Statistics
//!
//! With statistics enabled, every operation kind with a live counter under
//! the cache is bound when the cache is built and sampled on a background
//! thread:
//!
//! ```rust
//! use std::sync::Arc;
//! use tiercache::{Cache, CacheConfig, ComponentGraph, OperationType};
//!
//! let graph = Arc::new(ComponentGraph::new());
//! let cache: Cache<String, u32> =
//!     Cache::with_graph(CacheConfig::new("scores").sample_period_ms(60_000), graph).unwrap();
//! cache.put("ada".to_string(), 10).unwrap();
//!
//! let stats = cache.statistics().unwrap();
//! stats.tick();
//! assert_eq!(stats.window(OperationType::CachePut, 0).unwrap().count("added"), Some(1));
//! assert!(stats.window(OperationType::DiskGet, 0).is_none());
//! ```

mod cache;
mod config;
mod error;

pub use cache::Cache;
pub use config::CacheConfig;
pub use error::{ConfigError, Error, Result};

pub use tiercache_core::*;
pub use tiercache_stats::{
    names, stats_registry, tags, CacheGetOutcome, CachePutOutcome, CacheRemoveOutcome,
    ComponentGraph, ContextNode, EvictionOutcome, ExpiredOutcome, ExtendedStatistics, NodeId,
    NodeSpec, NodeType, OperationStatistic, OperationType, Outcome, OutcomeSet, Query,
    QueryBuilder, SampledStatistic, SamplerHandle, SamplingParams, StatisticsError,
    StoreGetOutcome, StorePutOutcome, StoreRemoveOutcome, WindowSample,
};

/// Bound statistics of the live cache named `cache_name`.
///
/// # Examples
///
/// ```rust
/// use tiercache::{statistics_for, Cache, CacheConfig};
///
/// let cache: Cache<String, String> = Cache::new(CacheConfig::new("lookup-demo")).unwrap();
/// assert!(statistics_for("lookup-demo").is_some());
/// drop(cache);
/// assert!(statistics_for("lookup-demo").is_none());
/// ```
pub fn statistics_for(cache_name: &str) -> Option<std::sync::Arc<ExtendedStatistics>> {
    stats_registry::get(cache_name)
}

/// Names of every live cache with bound statistics.
pub fn cache_names() -> Vec<String> {
    stats_registry::list()
}
