//! # Tiercache Stats
//!
//! Operation statistics for tiered caches.
//!
//! Caches and stores publish per-operation outcome counters into a runtime
//! [`ComponentGraph`]. A fixed [catalog](OperationType) names every tracked
//! operation kind together with a [`Query`] that finds its counter(s) from a
//! cache node, and [`ExtendedStatistics`] binds the whole catalog once and
//! samples it into windowed history.
//!
//! ## Module Organization
//!
//! - [`outcome`] - Closed outcome families and their typed enums
//! - [`statistic`] - Atomic per-outcome counters
//! - [`graph`] - The component graph caches and stores register into
//! - [`query`] - Composable path queries over the graph
//! - [`catalog`] - The operation-kind table
//! - [`sampler`] - Windowed sampling of bound counters
//! - [`extended`] - Catalog binding and the background sampler
//! - [`stats_registry`] - Global lookup of bound statistics by cache name
//!
pub mod catalog;
pub mod extended;
pub mod graph;
pub mod outcome;
pub mod query;
pub mod sampler;
pub mod statistic;
pub mod stats_registry;

mod error;

pub use catalog::{names, tags, CatalogEntry, OperationType, SamplingParams};
pub use error::StatisticsError;
pub use extended::{ExtendedStatistics, SamplerHandle};
pub use graph::{ComponentGraph, ContextNode, NodeId, NodeSpec, NodeType};
pub use outcome::{
    CacheGetOutcome, CachePutOutcome, CacheRemoveOutcome, EvictionOutcome, ExpiredOutcome,
    Outcome, OutcomeSet, SearchOutcome, StoreGetOutcome, StorePutOutcome, StoreRemoveOutcome,
    XaCommitOutcome, XaRecoveryOutcome, XaRollbackOutcome,
};
pub use query::{Matcher, Query, QueryBuilder};
pub use sampler::{SampledStatistic, WindowSample};
pub use statistic::{OperationStatistic, OutcomeCounter};
