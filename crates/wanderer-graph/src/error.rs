use thiserror::Error;

use crate::model::Macrostate;

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("node not found: {0}")]
    NodeNotFound(usize),

    #[error("edge not found: {0}")]
    EdgeNotFound(usize),

    #[error("edge {0} has no valid paired reverse")]
    OrphanReverse(usize),

    #[error("self-loop edge on node {0}: self-loop mass lives on the node, not on an edge")]
    SelfLoopEdge(usize),

    #[error("node {node} outgoing probabilities sum to {sum:.12} (expected 1)")]
    RowNotStochastic { node: usize, sum: f64 },

    #[error("node {node} out-degree mismatch: recorded {recorded}, counted {counted}")]
    DegreeMismatch { node: usize, recorded: usize, counted: usize },

    #[error("node {0} has live outgoing edges but zero total rate")]
    ZeroEscapeRate(usize),

    #[error("lag time {tau} leaves node {node} with negative self-loop probability")]
    InvalidLagTime { node: usize, tau: f64 },

    #[error("macrostate {0:?} has no member nodes")]
    EmptyMacrostate(Macrostate),
}
