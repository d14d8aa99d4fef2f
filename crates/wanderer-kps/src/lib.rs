//! # wanderer-kps
//!
//! Kinetic path sampling (kPS) escape sampler for metastable continuous-time
//! Markov chains on sparse transition networks.
//!
//! Naive kinetic Monte Carlo spends almost all of its steps on intra-basin
//! flicker; kPS instead samples one statistically exact escape per visited
//! trapping basin and concatenates escapes into A←B first-passage
//! trajectories. Per macro-step:
//!
//! 1. [`basin::classify`]            — label interior / boundary / outside
//! 2. [`subnetwork::build`]          — owned, re-indexed basin + boundary copy
//! 3. [`transform::graph_transformation`] — eliminate interior nodes, keep
//!    the L/U log needed to undo each iteration
//! 4. [`sample::sample_absorbing_node`]   — categorical walk to the exit
//! 5. [`randomize::reverse_randomize`]    — unwind GT, reconstruct hop
//!    counts, draw the Gamma escape time
//!
//! [`engine::KpsEngine`] drives the loop and owns the walker state; the RNG
//! is seeded once and threaded explicitly, so runs are bit-reproducible.

pub mod basin;
pub mod engine;
pub mod error;
pub mod randomize;
pub mod rng;
pub mod sample;
pub mod subnetwork;
pub mod transform;

pub use basin::{classify, BasinLabel, BasinSets};
pub use engine::{KpsConfig, KpsEngine, PathSummary, Walker};
pub use error::KpsError;
pub use randomize::reverse_randomize;
pub use sample::{sample_absorbing_node, EscapeSample};
pub use subnetwork::Subnetwork;
pub use transform::{graph_transformation, GtLog, GtStep};
