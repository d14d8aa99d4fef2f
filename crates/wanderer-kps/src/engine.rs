//! The kPS trajectory driver.

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use wanderer_graph::{Macrostate, Network, NetworkError};

use crate::basin::classify;
use crate::error::KpsError;
use crate::randomize::reverse_randomize;
use crate::rng::sample_uniform;
use crate::sample::sample_absorbing_node;
use crate::subnetwork;
use crate::transform::graph_transformation;

// ─────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────

/// Engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KpsConfig {
    /// Number of completed A←B paths to sample.
    pub n_paths: usize,
    /// Cap on kPS macro-steps across the whole run.
    pub max_iterations: usize,
    /// Cap on eliminations per trapping basin.
    pub nelim: usize,
    /// Lag time / time unit of the chain.
    pub tau: f64,
    /// Histogram bin count hint, consumed by external binning, not the core.
    pub n_bins: usize,
    /// kMC steps to run after each kPS macro-step (ignored by the core).
    pub kmc_steps_after: usize,
    /// Request adaptive binning; the core falls back to community labels.
    pub adaptive_bins: bool,
    /// Optional explicit start distribution over source nodes `(id, weight)`.
    pub init_probs: Option<Vec<(usize, f64)>>,
    pub seed: u64,
    /// Gate for the most verbose per-iteration diagnostics.
    pub debug: bool,
}

impl Default for KpsConfig {
    fn default() -> Self {
        Self {
            n_paths: 1,
            max_iterations: 1_000,
            nelim: usize::MAX,
            tau: 1.0,
            n_bins: 100,
            kmc_steps_after: 0,
            adaptive_bins: false,
            init_probs: None,
            seed: 17,
            debug: false,
        }
    }
}

// ─────────────────────────────────────────────
// Walker state
// ─────────────────────────────────────────────

/// Running totals of the active trajectory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Walker {
    /// Accumulated physical time.
    pub t: f64,
    /// Macro-step count.
    pub k: u64,
    /// Accumulated entropy flow.
    pub s: f64,
}

/// Summary of one completed A←B first-passage path.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PathSummary {
    pub t: f64,
    pub k: u64,
    pub s: f64,
}

// ─────────────────────────────────────────────
// Engine
// ─────────────────────────────────────────────

/// Kinetic path sampling engine: samples one statistically exact escape per
/// visited trapping basin and concatenates escapes into A←B first-passage
/// trajectories.
///
/// The driver cycles need-start → in-basin → (reached-A | stuck) until the
/// path target or the iteration cap is hit; ε `None` means a fresh start is
/// due. The full network is only ever read; both subnetwork copies of a
/// macro-step are owned by the step and dropped with it, on error paths
/// included.
#[derive(Debug)]
pub struct KpsEngine<'a> {
    ktn: &'a Network,
    config: KpsConfig,
    rng: StdRng,
    walker: Walker,
    epsilon: Option<usize>,
    paths: Vec<PathSummary>,
    n_kpsit: usize,
    n_stuck: usize,
}

impl<'a> KpsEngine<'a> {
    /// Validate the network and seed the engine.
    pub fn new(ktn: &'a Network, config: KpsConfig) -> Result<Self, KpsError> {
        ktn.validate()?;
        if ktn.macrostate_nodes(Macrostate::B).is_empty() {
            return Err(NetworkError::EmptyMacrostate(Macrostate::B).into());
        }
        if ktn.macrostate_nodes(Macrostate::A).is_empty() {
            return Err(NetworkError::EmptyMacrostate(Macrostate::A).into());
        }
        if config.adaptive_bins {
            warn!("kps: adaptive binning is external to the core; using community labels");
        }
        info!(
            n_paths = config.n_paths,
            max_iterations = config.max_iterations,
            nelim = config.nelim,
            tau = config.tau,
            n_bins = config.n_bins,
            kmc_steps_after = config.kmc_steps_after,
            seed = config.seed,
            "kps: engine configured"
        );
        let rng = StdRng::seed_from_u64(config.seed);
        Ok(Self {
            ktn,
            config,
            rng,
            walker: Walker::default(),
            epsilon: None,
            paths: Vec::new(),
            n_kpsit: 0,
            n_stuck: 0,
        })
    }

    pub fn walker(&self) -> Walker {
        self.walker
    }

    pub fn paths(&self) -> &[PathSummary] {
        &self.paths
    }

    /// Macro-steps taken so far.
    pub fn iterations(&self) -> usize {
        self.n_kpsit
    }

    /// Trajectories abandoned in closed basins.
    pub fn stuck_trajectories(&self) -> usize {
        self.n_stuck
    }

    /// Run the driver loop until `n_paths` completed A←B paths or the
    /// iteration cap, and return the per-path summaries.
    pub fn run(&mut self) -> Result<&[PathSummary], KpsError> {
        info!("kps: beginning simulation");
        while self.paths.len() < self.config.n_paths
            && self.n_kpsit < self.config.max_iterations
        {
            let epsilon = match self.epsilon {
                Some(node) => node,
                None => {
                    let node = self.choose_start()?;
                    self.epsilon = Some(node);
                    node
                }
            };
            match self.macro_step(epsilon) {
                Ok(()) => {}
                Err(KpsError::BasinClosed { node }) => {
                    // the driver is the only recovery point: abandon this
                    // trajectory and let the iteration cap bound bad starts
                    warn!(node, "kps: trapping basin is closed; abandoning trajectory");
                    self.n_stuck += 1;
                    self.n_kpsit += 1;
                    self.epsilon = None;
                    self.walker = Walker::default();
                }
                Err(e) => return Err(e),
            }
        }
        info!(
            n_paths = self.paths.len(),
            iterations = self.n_kpsit,
            stuck = self.n_stuck,
            "kps: finished simulation"
        );
        Ok(&self.paths)
    }

    /// One kPS macro-step: classify, extract, transform, sample the exit,
    /// reverse-randomize the escape time, update the walker.
    fn macro_step(&mut self, epsilon: usize) -> Result<(), KpsError> {
        let mut basin = classify(self.ktn, epsilon);
        if basin.n_boundary == 0 {
            return Err(KpsError::BasinClosed { node: epsilon });
        }
        if self.config.debug {
            debug!(
                epsilon,
                comm = self.ktn.nodes[epsilon].comm_id,
                n_basin = basin.n_basin,
                n_boundary = basin.n_boundary,
                n_edges = basin.n_edges,
                "kps: basin sets"
            );
        }
        let mut sub = subnetwork::build(self.ktn, &basin)?;
        let orig = sub.clone();
        let gt = graph_transformation(&mut sub, &mut basin, self.config.nelim)?;
        let mut hops = vec![0u64; sub.net.node_count()];
        let esc =
            sample_absorbing_node(&sub, &orig, &gt, &basin, epsilon, &mut hops, &mut self.rng)?;
        let t_esc = reverse_randomize(&mut sub, &orig, &gt, &basin, &mut hops, &mut self.rng)?;

        let ds = self.entropy_flow(esc.crossing);
        self.walker.t += t_esc;
        self.walker.k += 1;
        self.walker.s += ds;
        self.n_kpsit += 1;
        self.epsilon = Some(esc.alpha);
        if self.config.debug {
            debug!(alpha = esc.alpha, t_esc, "kps: escape sampled");
        }
        if self.ktn.nodes[esc.alpha].macrostate == Macrostate::A {
            let summary = PathSummary { t: self.walker.t, k: self.walker.k, s: self.walker.s };
            info!(t = summary.t, k = summary.k, s = summary.s, "kps: A←B path completed");
            self.paths.push(summary);
            self.walker = Walker::default();
            self.epsilon = None;
        }
        Ok(())
    }

    /// Draw the starting node from the source macrostate: the supplied
    /// initial-condition weights when present, otherwise ∝ exp(π) with the
    /// normalization summed in log space to dodge underflow.
    fn choose_start(&mut self) -> Result<usize, KpsError> {
        if let Some(init) = self.config.init_probs.clone() {
            let total: f64 = init.iter().map(|&(_, w)| w).sum();
            if !(total > 0.0) || init.iter().any(|&(_, w)| w < 0.0) {
                return Err(KpsError::InvalidDistributionParameters(
                    "initial-condition weights must be non-negative with a positive total"
                        .into(),
                ));
            }
            let rand_no = sample_uniform(&mut self.rng) * total;
            let mut cum = 0.0;
            for &(node, w) in &init {
                if node >= self.ktn.node_count() {
                    return Err(NetworkError::NodeNotFound(node).into());
                }
                cum += w;
                if cum >= rand_no {
                    return Ok(node);
                }
            }
            return Ok(init[init.len() - 1].0);
        }

        let nodes_b = self.ktn.macrostate_nodes(Macrostate::B);
        if nodes_b.len() == 1 {
            return Ok(nodes_b[0]);
        }
        let mut pi_b = f64::NEG_INFINITY;
        for &node in &nodes_b {
            pi_b = log_sum_exp(pi_b, self.ktn.nodes[node].pi);
        }
        let rand_no = sample_uniform(&mut self.rng);
        let mut cum = 0.0;
        for &node in &nodes_b {
            cum += (self.ktn.nodes[node].pi - pi_b).exp();
            if cum >= rand_no {
                return Ok(node);
            }
        }
        // the accumulated row sums to 1 up to rounding
        Ok(nodes_b[nodes_b.len() - 1])
    }

    /// Entropy flow of the boundary crossing when it maps to a live edge pair
    /// of the full network; GT-created crossings contribute nothing.
    fn entropy_flow(&self, crossing: (usize, usize)) -> f64 {
        let Some(e) = self.ktn.find_edge(crossing.0, crossing.1) else {
            return 0.0;
        };
        let Some(rev) = self.ktn.edges[e].rev else {
            return 0.0;
        };
        let (k_fwd, k_bwd) = (self.ktn.edges[e].k, self.ktn.edges[rev].k);
        if !self.ktn.edges[rev].dead && k_fwd > 0.0 && k_bwd > 0.0 {
            (k_fwd / k_bwd).ln()
        } else {
            0.0
        }
    }
}

/// ln(eᵃ + eᵇ) without overflow for very negative operands.
fn log_sum_exp(a: f64, b: f64) -> f64 {
    if a == f64::NEG_INFINITY {
        return b;
    }
    if b == f64::NEG_INFINITY {
        return a;
    }
    let (hi, lo) = if a > b { (a, b) } else { (b, a) };
    hi + (lo - hi).exp().ln_1p()
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use wanderer_graph::NodeSpec;

    fn two_state() -> Network {
        let specs = vec![
            NodeSpec { comm_id: 0, pi: -0.7, macrostate: Macrostate::B },
            NodeSpec { comm_id: 1, pi: -0.7, macrostate: Macrostate::A },
        ];
        let mut net = Network::from_rates(&specs, &[(0, 1, 1.0, 1.0)]).unwrap();
        net.set_branching_probs().unwrap();
        net
    }

    #[test]
    fn constructor_rejects_missing_macrostates() {
        let specs = vec![
            NodeSpec { comm_id: 0, pi: 0.0, macrostate: Macrostate::B },
            NodeSpec { comm_id: 1, pi: 0.0, macrostate: Macrostate::Intermediate },
        ];
        let mut net = Network::from_rates(&specs, &[(0, 1, 1.0, 1.0)]).unwrap();
        net.set_branching_probs().unwrap();
        let err = KpsEngine::new(&net, KpsConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            KpsError::Network(NetworkError::EmptyMacrostate(Macrostate::A))
        ));
    }

    #[test]
    fn single_source_node_short_circuits_start_selection() {
        let net = two_state();
        let mut engine = KpsEngine::new(&net, KpsConfig::default()).unwrap();
        assert_eq!(engine.choose_start().unwrap(), 0);
        // the short circuit must not consume randomness
        let mut before = engine.rng.clone();
        let _ = engine.choose_start().unwrap();
        assert_eq!(
            sample_uniform(&mut engine.rng).to_bits(),
            sample_uniform(&mut before).to_bits()
        );
    }

    #[test]
    fn start_selection_follows_stationary_weights() {
        // two B nodes with π weights 1:3
        let specs = vec![
            NodeSpec { comm_id: 0, pi: (0.25f64).ln(), macrostate: Macrostate::B },
            NodeSpec { comm_id: 1, pi: (0.75f64).ln(), macrostate: Macrostate::B },
            NodeSpec { comm_id: 2, pi: 0.0, macrostate: Macrostate::A },
        ];
        let rates = vec![(0, 2, 1.0, 1.0), (1, 2, 1.0, 1.0), (0, 1, 1.0, 1.0)];
        let mut net = Network::from_rates(&specs, &rates).unwrap();
        net.set_branching_probs().unwrap();
        let mut engine = KpsEngine::new(&net, KpsConfig::default()).unwrap();

        let n = 20_000;
        let picks_of_1 = (0..n)
            .filter(|_| engine.choose_start().unwrap() == 1)
            .count();
        let freq = picks_of_1 as f64 / n as f64;
        assert!((freq - 0.75).abs() < 0.02, "node 1 frequency {freq}");
    }

    #[test]
    fn explicit_initial_condition_overrides_pi() {
        let specs = vec![
            NodeSpec { comm_id: 0, pi: (0.99f64).ln(), macrostate: Macrostate::B },
            NodeSpec { comm_id: 1, pi: (0.01f64).ln(), macrostate: Macrostate::B },
            NodeSpec { comm_id: 2, pi: 0.0, macrostate: Macrostate::A },
        ];
        let rates = vec![(0, 2, 1.0, 1.0), (1, 2, 1.0, 1.0), (0, 1, 1.0, 1.0)];
        let mut net = Network::from_rates(&specs, &rates).unwrap();
        net.set_branching_probs().unwrap();
        let config = KpsConfig {
            init_probs: Some(vec![(1, 1.0)]),
            ..KpsConfig::default()
        };
        let mut engine = KpsEngine::new(&net, config).unwrap();
        for _ in 0..50 {
            assert_eq!(engine.choose_start().unwrap(), 1);
        }
    }

    #[test]
    fn bad_initial_condition_weights_are_rejected() {
        let net = two_state();
        let config = KpsConfig {
            init_probs: Some(vec![(0, 0.0)]),
            ..KpsConfig::default()
        };
        let mut engine = KpsEngine::new(&net, config).unwrap();
        assert!(matches!(
            engine.choose_start(),
            Err(KpsError::InvalidDistributionParameters(_))
        ));
    }

    #[test]
    fn entropy_flow_uses_the_rate_ratio() {
        let specs = vec![
            NodeSpec { comm_id: 0, pi: 0.0, macrostate: Macrostate::B },
            NodeSpec { comm_id: 1, pi: 0.0, macrostate: Macrostate::A },
        ];
        let mut net = Network::from_rates(&specs, &[(0, 1, 2.0, 0.5)]).unwrap();
        net.set_branching_probs().unwrap();
        let engine = KpsEngine::new(&net, KpsConfig::default()).unwrap();
        assert!((engine.entropy_flow((0, 1)) - 4.0f64.ln()).abs() < 1e-12);
        // no such edge: no contribution
        assert_eq!(engine.entropy_flow((1, 1)), 0.0);
    }

    #[test]
    fn log_sum_exp_handles_deep_underflow() {
        let sum = log_sum_exp(-800.0, -801.0);
        assert!((sum - (-800.0 + (1.0 + (-1.0f64).exp()).ln())).abs() < 1e-12);
        assert_eq!(log_sum_exp(f64::NEG_INFINITY, -3.0), -3.0);
    }
}
