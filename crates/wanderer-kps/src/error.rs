use thiserror::Error;

use wanderer_graph::NetworkError;

#[derive(Debug, Error)]
pub enum KpsError {
    /// The kPS algebra is no longer trustworthy on this input; continuing
    /// would bias the sampled statistics.
    #[error("numerical precision lost in {context}: {value:e}")]
    NumericalPrecisionLoss { context: &'static str, value: f64 },

    #[error("adjacency corruption: {0}")]
    AdjacencyCorruption(String),

    /// The occupied community has no absorbing boundary node.
    #[error("trapping basin of node {node} is a closed set")]
    BasinClosed { node: usize },

    #[error("invalid distribution parameters: {0}")]
    InvalidDistributionParameters(String),

    #[error(transparent)]
    Network(#[from] NetworkError),
}
