use crate::catalog::OperationType;
use crate::graph::NodeId;
use crate::outcome::OutcomeSet;

/// Configuration errors raised while wiring statistics to the component graph.
///
/// All of these are fatal at setup time. An operation kind that simply has no
/// live counter is not an error; it just produces no data.
#[derive(Debug, thiserror::Error)]
pub enum StatisticsError {
    #[error("query expected a unique match but found {matches} nodes")]
    NotUnique { matches: usize },

    #[error("{kind:?} resolved {matches} counters but requires exactly one")]
    AmbiguousBinding { kind: OperationType, matches: usize },

    #[error("{kind:?} expects {expected} outcomes but node {node} publishes {found}")]
    OutcomeMismatch {
        kind: OperationType,
        node: NodeId,
        expected: OutcomeSet,
        found: OutcomeSet,
    },

    #[error("node {0} is not registered in the component graph")]
    UnknownNode(NodeId),
}
