//! # wanderer-graph
//!
//! Transition-network data model for the wanderer kinetic path sampler.
//!
//! Provides the arena-based sparse directed graph the sampler runs on:
//!
//! - [`model::Node`]     — microstate with community label, log-π, escape rate
//! - [`model::Edge`]     — directed transition with a paired reverse edge
//! - [`model::Network`]  — append-only arenas + intrusive adjacency lists
//! - [`model::Macrostate`] — endpoint-set membership (A / B / intermediate)
//!
//! Adjacency handles are plain indices into the arenas, so edge-pair append
//! is O(1), per-direction traversal is O(deg), and a deep copy of a network
//! is an ordinary `Clone`.

pub mod error;
pub mod model;

pub use error::NetworkError;
pub use model::{Edge, EdgeIter, Macrostate, Network, Node, NodeSpec};
