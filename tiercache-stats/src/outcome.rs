//! Outcome variant sets for every tracked operation.
//!
//! Each operation kind produces exactly one value out of a closed set of
//! outcomes (a `get` either hits or misses, a `put` adds or replaces, ...).
//! The typed enums below are what call sites record; [`OutcomeSet`] is the
//! type-erased family tag carried by counters living in the component graph,
//! so a query result can be checked against the family a kind expects.

use std::fmt;

/// The closed family an outcome enum belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OutcomeSet {
    CacheGet,
    CachePut,
    CacheRemove,
    StoreGet,
    StorePut,
    StoreRemove,
    XaCommit,
    XaRollback,
    XaRecovery,
    Search,
    Eviction,
    Expiry,
}

impl OutcomeSet {
    /// Variant names, in ordinal order.
    pub fn variants(self) -> &'static [&'static str] {
        match self {
            OutcomeSet::CacheGet => CacheGetOutcome::NAMES,
            OutcomeSet::CachePut => CachePutOutcome::NAMES,
            OutcomeSet::CacheRemove => CacheRemoveOutcome::NAMES,
            OutcomeSet::StoreGet => StoreGetOutcome::NAMES,
            OutcomeSet::StorePut => StorePutOutcome::NAMES,
            OutcomeSet::StoreRemove => StoreRemoveOutcome::NAMES,
            OutcomeSet::XaCommit => XaCommitOutcome::NAMES,
            OutcomeSet::XaRollback => XaRollbackOutcome::NAMES,
            OutcomeSet::XaRecovery => XaRecoveryOutcome::NAMES,
            OutcomeSet::Search => SearchOutcome::NAMES,
            OutcomeSet::Eviction => EvictionOutcome::NAMES,
            OutcomeSet::Expiry => ExpiredOutcome::NAMES,
        }
    }

    /// Number of variants in the set.
    pub fn len(self) -> usize {
        self.variants().len()
    }

    /// Ordinal of the variant called `name`, if the set has one.
    pub fn ordinal_of(self, name: &str) -> Option<usize> {
        self.variants().iter().position(|v| *v == name)
    }
}

impl fmt::Display for OutcomeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A typed operation outcome.
pub trait Outcome: Copy + Send + Sync + 'static {
    /// The family this enum belongs to.
    const SET: OutcomeSet;

    /// Position of this variant inside [`OutcomeSet::variants`].
    fn ordinal(self) -> usize;
}

macro_rules! outcome_enum {
    ($(#[$meta:meta])* $name:ident => $set:ident { $($variant:ident = $label:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            const NAMES: &'static [&'static str] = &[$($label),+];

            /// Lower-case label of this outcome.
            pub fn label(self) -> &'static str {
                Self::NAMES[self as usize]
            }
        }

        impl Outcome for $name {
            const SET: OutcomeSet = OutcomeSet::$set;

            #[inline]
            fn ordinal(self) -> usize {
                self as usize
            }
        }
    };
}

outcome_enum!(
    /// Result of a cache-level `get`.
    CacheGetOutcome => CacheGet { Hit = "hit", MissExpired = "miss_expired", MissNotFound = "miss_not_found" }
);
outcome_enum!(
    /// Result of a cache-level `put`.
    CachePutOutcome => CachePut { Added = "added", Updated = "updated", Ignored = "ignored" }
);
outcome_enum!(
    /// Result of a cache-level `remove`.
    CacheRemoveOutcome => CacheRemove { Success = "success", NotFound = "not_found" }
);
outcome_enum!(
    /// Result of a tier-level `get`.
    StoreGetOutcome => StoreGet { Hit = "hit", Miss = "miss" }
);
outcome_enum!(
    /// Result of a tier-level `put`.
    StorePutOutcome => StorePut { Added = "added", Replaced = "replaced" }
);
outcome_enum!(
    /// Result of a tier-level `remove`.
    StoreRemoveOutcome => StoreRemove { Success = "success" }
);
outcome_enum!(
    /// Classification of a transactional commit.
    XaCommitOutcome => XaCommit { ReadOnly = "read_only", Exception = "exception", Committed = "committed" }
);
outcome_enum!(
    /// Classification of a transactional rollback.
    XaRollbackOutcome => XaRollback { RolledBack = "rolled_back", Exception = "exception" }
);
outcome_enum!(
    /// Classification of a transactional recovery pass.
    XaRecoveryOutcome => XaRecovery { Nothing = "nothing", Recovered = "recovered" }
);
outcome_enum!(
    /// Result of a search over cache contents.
    SearchOutcome => Search { Success = "success", Exception = "exception" }
);
outcome_enum!(
    /// An entry discarded from a tier to satisfy capacity.
    EvictionOutcome => Eviction { Success = "success" }
);
outcome_enum!(
    /// An entry removed because its lifespan ran out.
    ExpiredOutcome => Expiry { Success = "success", Failure = "failure" }
);
