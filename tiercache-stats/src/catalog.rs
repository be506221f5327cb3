//! # Operation Catalog
//!
//! The fixed registry of tracked operation kinds. Every kind binds an outcome
//! family, a query locating its live counter(s) from a cache node, and its
//! sampling parameters. The catalog is a literal table; kinds that sample
//! differently just carry different numbers.
//!
//! | Kind | Query from the cache node | Unique |
//! |------|---------------------------|--------|
//! | `CacheGet` / `CachePut` / `CacheRemove` | cache → statistic `get` / `put` / `remove` | yes |
//! | `Heap*` / `OffHeap*` / `Disk*` | descendant stores → statistic tagged with the tier | no |
//! | `XaCommit` / `XaRollback` / `XaRecovery` | cache → statistic `xa-commit` / ... | yes |
//! | `Search` | cache → statistic `search` (interval 10, window 10) | yes |
//! | `Evicted` | descendant stores → statistic `eviction` | no |
//! | `Expired` | cache → statistic `expiry` | yes |

use crate::graph::NodeType;
use crate::outcome::OutcomeSet;
use crate::query::{Matcher, Query, QueryBuilder};

/// Statistic node names published by caches and stores.
pub mod names {
    pub const GET: &str = "get";
    pub const PUT: &str = "put";
    pub const REMOVE: &str = "remove";
    pub const EVICTION: &str = "eviction";
    pub const EXPIRY: &str = "expiry";
    pub const SEARCH: &str = "search";
    pub const XA_COMMIT: &str = "xa-commit";
    pub const XA_ROLLBACK: &str = "xa-rollback";
    pub const XA_RECOVERY: &str = "xa-recovery";
}

/// Tags distinguishing which component published a statistic.
pub mod tags {
    pub const CACHE: &str = "cache";
    pub const HEAP: &str = "heap";
    pub const OFFHEAP: &str = "offheap";
    pub const DISK: &str = "disk";
    pub const CLUSTERED: &str = "clustered";
}

/// How a kind is sampled: how many samples are retained, how many ticks
/// apart samples are taken, and how many ticks each sample covers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SamplingParams {
    pub history: usize,
    pub interval: u64,
    pub window: u64,
}

impl SamplingParams {
    pub const DEFAULT: SamplingParams = SamplingParams {
        history: 30,
        interval: 1,
        window: 1,
    };

    pub const fn new(history: usize, interval: u64, window: u64) -> Self {
        Self {
            history,
            interval,
            window,
        }
    }
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Every operation kind tracked for statistics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OperationType {
    CacheGet,
    CachePut,
    CacheRemove,
    HeapGet,
    HeapPut,
    HeapRemove,
    OffHeapGet,
    OffHeapPut,
    OffHeapRemove,
    DiskGet,
    DiskPut,
    DiskRemove,
    XaCommit,
    XaRollback,
    XaRecovery,
    Search,
    Evicted,
    Expired,
}

/// One row of the catalog.
#[derive(Clone, Copy, Debug)]
pub struct CatalogEntry {
    pub kind: OperationType,
    pub outcomes: OutcomeSet,
    pub query: fn() -> Query,
    pub sampling: SamplingParams,
}

const fn entry(kind: OperationType, outcomes: OutcomeSet, query: fn() -> Query) -> CatalogEntry {
    CatalogEntry {
        kind,
        outcomes,
        query,
        sampling: SamplingParams::DEFAULT,
    }
}

static CATALOG: [CatalogEntry; 18] = [
    entry(OperationType::CacheGet, OutcomeSet::CacheGet, || cache_statistic(names::GET)),
    entry(OperationType::CachePut, OutcomeSet::CachePut, || cache_statistic(names::PUT)),
    entry(OperationType::CacheRemove, OutcomeSet::CacheRemove, || cache_statistic(names::REMOVE)),
    entry(OperationType::HeapGet, OutcomeSet::StoreGet, || store_statistic(names::GET, tags::HEAP)),
    entry(OperationType::HeapPut, OutcomeSet::StorePut, || store_statistic(names::PUT, tags::HEAP)),
    entry(OperationType::HeapRemove, OutcomeSet::StoreRemove, || store_statistic(names::REMOVE, tags::HEAP)),
    entry(OperationType::OffHeapGet, OutcomeSet::StoreGet, || store_statistic(names::GET, tags::OFFHEAP)),
    entry(OperationType::OffHeapPut, OutcomeSet::StorePut, || store_statistic(names::PUT, tags::OFFHEAP)),
    entry(OperationType::OffHeapRemove, OutcomeSet::StoreRemove, || store_statistic(names::REMOVE, tags::OFFHEAP)),
    entry(OperationType::DiskGet, OutcomeSet::StoreGet, || store_statistic(names::GET, tags::DISK)),
    entry(OperationType::DiskPut, OutcomeSet::StorePut, || store_statistic(names::PUT, tags::DISK)),
    entry(OperationType::DiskRemove, OutcomeSet::StoreRemove, || store_statistic(names::REMOVE, tags::DISK)),
    entry(OperationType::XaCommit, OutcomeSet::XaCommit, || cache_statistic(names::XA_COMMIT)),
    entry(OperationType::XaRollback, OutcomeSet::XaRollback, || cache_statistic(names::XA_ROLLBACK)),
    entry(OperationType::XaRecovery, OutcomeSet::XaRecovery, || cache_statistic(names::XA_RECOVERY)),
    CatalogEntry {
        kind: OperationType::Search,
        outcomes: OutcomeSet::Search,
        query: || cache_statistic(names::SEARCH),
        sampling: SamplingParams::new(30, 10, 10),
    },
    entry(OperationType::Evicted, OutcomeSet::Eviction, || {
        stores().chain(child_statistic(names::EVICTION, &[])).build()
    }),
    entry(OperationType::Expired, OutcomeSet::Expiry, || cache_statistic(names::EXPIRY)),
];

impl OperationType {
    pub const ALL: [OperationType; 18] = [
        OperationType::CacheGet,
        OperationType::CachePut,
        OperationType::CacheRemove,
        OperationType::HeapGet,
        OperationType::HeapPut,
        OperationType::HeapRemove,
        OperationType::OffHeapGet,
        OperationType::OffHeapPut,
        OperationType::OffHeapRemove,
        OperationType::DiskGet,
        OperationType::DiskPut,
        OperationType::DiskRemove,
        OperationType::XaCommit,
        OperationType::XaRollback,
        OperationType::XaRecovery,
        OperationType::Search,
        OperationType::Evicted,
        OperationType::Expired,
    ];

    /// The catalog row for this kind.
    pub fn entry(self) -> &'static CatalogEntry {
        &CATALOG[self as usize]
    }

    pub fn outcomes(self) -> OutcomeSet {
        self.entry().outcomes
    }

    /// A fresh copy of the query locating this kind's counter(s).
    pub fn query(self) -> Query {
        (self.entry().query)()
    }

    pub fn sampling(self) -> SamplingParams {
        self.entry().sampling
    }

    pub fn history(self) -> usize {
        self.sampling().history
    }

    pub fn interval(self) -> u64 {
        self.sampling().interval
    }

    pub fn window(self) -> u64 {
        self.sampling().window
    }
}

/// The cache node itself; queries are executed with the cache as root.
fn cache() -> QueryBuilder {
    QueryBuilder::new().filter(Matcher::node_type(NodeType::Cache))
}

/// Every store anywhere below the cache.
fn stores() -> QueryBuilder {
    QueryBuilder::new()
        .descendants()
        .filter(Matcher::node_type(NodeType::Store))
}

fn child_statistic(name: &str, with_tags: &[&str]) -> Query {
    QueryBuilder::new()
        .children()
        .filter(Matcher::all_of(vec![
            Matcher::node_type(NodeType::Statistic),
            Matcher::name(name),
            Matcher::has_tags(with_tags.iter().copied()),
        ]))
        .build()
}

fn cache_statistic(name: &str) -> Query {
    cache()
        .chain(child_statistic(name, &[]))
        .ensure_unique()
        .build()
}

fn store_statistic(name: &str, tier: &str) -> Query {
    stores().chain(child_statistic(name, &[tier])).build()
}
