//! # Tiercache Core
//!
//! Storage tiers behind one atomic store contract.
//!
//! Every tier, whether it keeps elements on the heap, in a disk file or
//! nowhere at all, implements [`Store`]. A bounded tier evicts with a
//! pluggable [`EvictionPolicy`] and can spill its victims into an overflow
//! tier, and a [`TieredStore`] chains tiers fastest first so callers see a
//! single store.
//!
//! ## Module Organization
//!
//! - [`element`] - Stored elements and their bookkeeping metadata
//! - [`store`] - The store contract, tier kinds and management snapshots
//! - [`policy`] - LRU, LFU, FIFO and random victim selection
//! - [`comparator`] - Value comparison for conditional operations
//! - [`writer`] - Write-through delegates
//! - [`statistics`] - Registering store statistics in the component graph
//! - [`null_store`] - The absent tier
//! - [`memory_store`] - The heap tier
//! - [`disk_store`] - The append-only disk tier
//! - [`tiered_store`] - Chains of tiers
//!
use std::hash::Hash;

pub mod comparator;
pub mod disk_store;
pub mod element;
pub mod memory_store;
pub mod null_store;
pub mod policy;
pub mod statistics;
pub mod store;
pub mod tiered_store;
pub mod writer;

mod error;
mod memory_estimator;
mod striped_lock;

pub use comparator::{DefaultElementValueComparator, ElementValueComparator, VersionComparator};
pub use disk_store::{DiskStore, DiskStoreBuilder};
pub use element::{now_millis, Element, ElementMetadata};
pub use error::{CacheError, Result};
pub use memory_estimator::MemoryEstimator;
pub use memory_store::{MemoryStore, MemoryStoreBuilder};
pub use null_store::NullStore;
pub use policy::{EvictionCandidate, EvictionPolicy, Fifo, Lfu, Lru, PolicyKind, Random};
pub use statistics::{StatisticsScope, StoreStatistics};
pub use store::{Status, Store, StoreManagement, TierKind};
pub use tiered_store::TieredStore;
pub use writer::{CacheWriter, WriterError};

/// Bounds on keys a store can hold.
///
/// Implemented for every type that satisfies them.
pub trait StoreKey: Eq + Hash + Clone + Send + Sync + MemoryEstimator + 'static {}

impl<T> StoreKey for T where T: Eq + Hash + Clone + Send + Sync + MemoryEstimator + 'static {}

/// Bounds on values a store can hold.
pub trait StoreValue: Clone + Send + Sync + MemoryEstimator + 'static {}

impl<T> StoreValue for T where T: Clone + Send + Sync + MemoryEstimator + 'static {}
