//! Iterative reverse randomization: unwind the graph transformation while
//! reconstructing per-node hop counts, then draw the escape time.

use rand::rngs::StdRng;
use tracing::debug;
use wanderer_graph::Network;

use crate::basin::{BasinLabel, BasinSets};
use crate::error::KpsError;
use crate::rng::{sample_binomial, sample_gamma, sample_neg_binomial};
use crate::subnetwork::Subnetwork;
use crate::transform::{GtLog, GtStep, FACTOR_FLOOR};

/// Undo one elimination: kill the edges the iteration created, subtract the
/// pairwise and self-loop deltas it pushed onto the surviving rows, and
/// restore the eliminated node's outgoing row from U.
pub(crate) fn undo_gt_iteration(
    net: &mut Network,
    log: &GtLog,
    step: &GtStep,
) -> Result<(), KpsError> {
    for &e in &step.created {
        net.kill_edge(e);
    }

    for li in step.l_range.0..step.l_range.1 {
        let (beta, t_in) = (log.l.edges[li].from, log.l.edges[li].t);
        for ui in step.u_range.0..step.u_range.1 {
            let (j, t_out) = (log.u.edges[ui].to, log.u.edges[ui].t);
            let delta = t_in * t_out / step.factor;
            if beta == j {
                net.nodes[beta].t -= delta;
                continue;
            }
            match net.find_edge(beta, j) {
                Some(e) => net.edges[e].t -= delta,
                None => {
                    // legal only for the pair this iteration created (and
                    // which was killed again above)
                    let created = step
                        .created
                        .iter()
                        .any(|&c| net.edges[c].from == beta && net.edges[c].to == j);
                    if !created {
                        return Err(KpsError::AdjacencyCorruption(format!(
                            "undo lost the edge {beta} → {j}"
                        )));
                    }
                }
            }
        }
    }

    for ui in step.u_range.0..step.u_range.1 {
        let (j, t_out) = (log.u.edges[ui].to, log.u.edges[ui].t);
        let e = net.find_edge(step.node, j).ok_or_else(|| {
            KpsError::AdjacencyCorruption(format!("undo lost the edge {} → {j}", step.node))
        })?;
        net.edges[e].t = t_out;
    }

    net.nodes[step.node].eliminated = false;
    Ok(())
}

/// Reverse the GT pass and sample an escape time for the completed walk.
///
/// `hops` arrives holding the categorical walk's departure counts and leaves
/// holding the reconstructed per-node hop counts of the untransformed chain:
/// binomial draws partition each later-eliminated neighbor's hops into the
/// restored node (survivors walked their untransformed rows, so their visits
/// were counted explicitly), and negative-binomial draws add back the
/// self-loop dwells the transformation folded away. The escape time is the
/// sum of one Gamma(h, 1/k_esc) dwell per visited interior node.
pub fn reverse_randomize(
    sub: &mut Subnetwork,
    orig: &Subnetwork,
    gt: &GtLog,
    basin: &BasinSets,
    hops: &mut [u64],
    rng: &mut StdRng,
) -> Result<f64, KpsError> {
    // realize the self-loop dwells of surviving interior nodes against the
    // untransformed chain
    for pos in 0..orig.net.node_count() {
        if basin.labels[orig.orig_ids[pos]] != BasinLabel::Transient {
            continue;
        }
        let t0 = orig.net.nodes[pos].t;
        if hops[pos] == 0 || t0 <= 0.0 {
            continue;
        }
        let depart = 1.0 - t0;
        if depart < FACTOR_FLOOR {
            return Err(KpsError::NumericalPrecisionLoss {
                context: "survivor self-loop dwell",
                value: depart,
            });
        }
        let dwell = sample_neg_binomial(rng, hops[pos], depart)?;
        hops[pos] += dwell;
    }

    // unwind the eliminations, most recent first
    for (order, step) in gt.steps.iter().enumerate().rev() {
        undo_gt_iteration(&mut sub.net, gt, step)?;
        let mut entries = hops[step.node];
        for li in step.l_range.0..step.l_range.1 {
            let beta = gt.l.edges[li].from;
            if !matches!(gt.elim_index[beta], Some(o) if o > order) {
                continue;
            }
            if hops[beta] == 0 {
                continue;
            }
            let p = gt.l.edges[li].t.min(1.0);
            entries += sample_binomial(rng, hops[beta], p)?;
        }
        hops[step.node] = if entries > 0 {
            entries + sample_neg_binomial(rng, entries, step.factor.min(1.0))?
        } else {
            0
        };
        debug!(
            node = sub.orig_ids[step.node],
            hops = hops[step.node],
            "kps: reverse-randomized hop count"
        );
    }

    // one Gamma-distributed dwell per visited interior node
    let mut t_esc = 0.0;
    for pos in 0..sub.net.node_count() {
        let label = basin.labels[sub.orig_ids[pos]];
        if !matches!(label, BasinLabel::Transient | BasinLabel::Eliminated) {
            continue;
        }
        if hops[pos] == 0 {
            continue;
        }
        let k_esc = sub.net.nodes[pos].k_esc;
        if k_esc <= 0.0 {
            return Err(KpsError::InvalidDistributionParameters(format!(
                "interior node {} has zero escape rate",
                sub.orig_ids[pos]
            )));
        }
        t_esc += sample_gamma(rng, hops[pos], 1.0 / k_esc)?;
    }
    Ok(t_esc)
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basin::classify;
    use crate::subnetwork;
    use crate::transform::graph_transformation;
    use rand::SeedableRng;
    use wanderer_graph::{Macrostate, NodeSpec};

    fn spec(comm_id: usize) -> NodeSpec {
        NodeSpec { comm_id, pi: 0.0, macrostate: Macrostate::Intermediate }
    }

    fn transformed(
        specs: &[NodeSpec],
        rates: &[(usize, usize, f64, f64)],
        epsilon: usize,
        nelim: usize,
    ) -> (Subnetwork, Subnetwork, BasinSets, GtLog) {
        let mut net = Network::from_rates(specs, rates).unwrap();
        net.set_branching_probs().unwrap();
        let mut basin = classify(&net, epsilon);
        let mut sub = subnetwork::build(&net, &basin).unwrap();
        let orig = sub.clone();
        let log = graph_transformation(&mut sub, &mut basin, nelim).unwrap();
        (sub, orig, basin, log)
    }

    /// GT followed by the full deterministic undo sweep must reproduce the
    /// pre-transformation matrix.
    #[test]
    fn undo_restores_the_pre_gt_matrix() {
        let specs = vec![spec(0), spec(0), spec(0), spec(0), spec(1)];
        let rates = vec![
            (0, 1, 1.0, 2.0),
            (0, 2, 0.5, 1.0),
            (1, 3, 2.0, 1.0),
            (2, 3, 1.0, 0.5),
            (3, 4, 0.25, 1.0),
        ];
        let (mut sub, orig, _, log) = transformed(&specs, &rates, 0, 4);
        assert_eq!(log.eliminated.len(), 4);

        for step in log.steps.iter().rev() {
            undo_gt_iteration(&mut sub.net, &log, step).unwrap();
        }

        // original arena entries regain their weights
        for pos in 0..orig.net.edge_count() {
            let (got, want) = (sub.net.edges[pos].t, orig.net.edges[pos].t);
            assert!(
                (got - want).abs() < 1e-8,
                "edge {pos} recovered {got}, expected {want}"
            );
            assert!(!sub.net.edges[pos].dead);
        }
        // created edges die with their iterations
        for pos in orig.net.edge_count()..sub.net.edge_count() {
            assert!(sub.net.edges[pos].dead, "created edge {pos} survived undo");
        }
        for pos in 0..orig.net.node_count() {
            assert!(
                (sub.net.nodes[pos].t - orig.net.nodes[pos].t).abs() < 1e-8,
                "node {pos} self-loop drifted"
            );
            assert!(!sub.net.nodes[pos].eliminated);
        }
    }

    /// Two-node chain: one hop, factor 1 everywhere, so the reconstruction
    /// is deterministic: h = [1] and t_esc ~ Gamma(1, 1/k_esc).
    #[test]
    fn two_node_chain_reconstructs_a_single_hop() {
        let specs = vec![spec(0), spec(1)];
        let rates = vec![(0, 1, 1.0, 1.0)];
        let (mut sub, orig, basin, log) = transformed(&specs, &rates, 0, 1);

        let mut hops = vec![1, 0]; // the walk departed node 0 once
        let mut rng = StdRng::seed_from_u64(42);
        let t_esc =
            reverse_randomize(&mut sub, &orig, &log, &basin, &mut hops, &mut rng).unwrap();
        assert_eq!(hops, vec![1, 0]);
        assert!(t_esc > 0.0);
    }

    #[test]
    fn untouched_basin_contributes_no_time() {
        let specs = vec![spec(0), spec(0), spec(1)];
        let rates = vec![(0, 1, 1.0, 1.0), (1, 2, 1.0, 1.0)];
        let (mut sub, orig, basin, log) = transformed(&specs, &rates, 0, 2);

        let mut hops = vec![0, 0, 0];
        let mut rng = StdRng::seed_from_u64(1);
        let t_esc =
            reverse_randomize(&mut sub, &orig, &log, &basin, &mut hops, &mut rng).unwrap();
        assert_eq!(t_esc, 0.0);
        assert_eq!(hops, vec![0, 0, 0]);
    }

    /// Escape times over many macro-steps of the two-node chain follow
    /// Gamma(1, 1/k) = Exp(k); check the empirical mean.
    #[test]
    fn escape_time_mean_matches_the_exponential_dwell() {
        let specs = vec![spec(0), spec(1)];
        let rates = vec![(0, 1, 2.0, 1.0)]; // k_esc(0) = 2 ⇒ mean dwell 0.5
        let mut rng = StdRng::seed_from_u64(9);
        let n = 20_000;
        let mut total = 0.0;
        for _ in 0..n {
            let (mut sub, orig, basin, log) = transformed(&specs, &rates, 0, 1);
            let mut hops = vec![1, 0];
            total +=
                reverse_randomize(&mut sub, &orig, &log, &basin, &mut hops, &mut rng).unwrap();
        }
        let mean = total / n as f64;
        // sd of the mean: 0.5/√n ≈ 0.0035
        assert!(
            (mean - 0.5).abs() < 0.02,
            "mean escape time {mean}, expected 0.5"
        );
    }
}
