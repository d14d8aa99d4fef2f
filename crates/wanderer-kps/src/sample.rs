//! Categorical sampling of the absorbing exit node.

use rand::rngs::StdRng;
use tracing::debug;

use crate::basin::{BasinLabel, BasinSets};
use crate::error::KpsError;
use crate::rng::sample_uniform;
use crate::subnetwork::Subnetwork;
use crate::transform::{gt_factor, GtLog};

/// Overshoot allowance on a cumulative probability row.
const CUM_TOL: f64 = 1e-8;

/// Outcome of one categorical walk to the absorbing boundary.
#[derive(Debug, Clone, Copy)]
pub struct EscapeSample {
    /// Original id of the sampled absorbing node α.
    pub alpha: usize,
    /// Original ids of the boundary-crossing hop (u → α).
    pub crossing: (usize, usize),
}

/// Walk from ε over the mixed transformed/untransformed subnetwork pair until
/// the community label changes, recording one departure per visited node.
///
/// An eliminated node's outgoing row is frozen at its own elimination and is
/// normalized over the targets that were still standing then, so the walk
/// skips exactly the targets eliminated *earlier* than the current node. A
/// surviving interior node's row comes from the untransformed copy, with each
/// weight topped up by t·T_uu/(1 − T_uu) to account for the self-loop mass
/// the transformed chain would absorb before departure.
pub fn sample_absorbing_node(
    sub: &Subnetwork,
    orig: &Subnetwork,
    gt: &GtLog,
    basin: &BasinSets,
    epsilon: usize,
    hops: &mut [u64],
    rng: &mut StdRng,
) -> Result<EscapeSample, KpsError> {
    let start = *sub.nodemap.get(&epsilon).ok_or_else(|| {
        KpsError::AdjacencyCorruption(format!("walker node {epsilon} missing from subnetwork"))
    })?;
    let comm = sub.net.nodes[start].comm_id;
    let mut curr = start;

    loop {
        let rand_no = sample_uniform(rng);
        let mut cum_t = 0.0;
        let mut next = None;
        match basin.labels[sub.orig_ids[curr]] {
            BasinLabel::Eliminated => {
                let order = gt.elim_index[curr].ok_or_else(|| {
                    KpsError::AdjacencyCorruption(format!(
                        "node {} labeled eliminated but absent from the elimination log",
                        sub.orig_ids[curr]
                    ))
                })?;
                for e in sub.net.out_edges(curr) {
                    let edge = &sub.net.edges[e];
                    if edge.dead {
                        continue;
                    }
                    if matches!(gt.elim_index[edge.to], Some(o) if o < order) {
                        continue; // outside the frozen row's support
                    }
                    cum_t += edge.t;
                    if cum_t > rand_no {
                        next = Some(edge.to);
                        break;
                    }
                }
            }
            BasinLabel::Transient => {
                let node = &orig.net.nodes[curr];
                let factor = gt_factor(&orig.net, curr)?;
                for e in orig.net.out_edges(curr) {
                    let edge = &orig.net.edges[e];
                    if edge.dead {
                        continue;
                    }
                    cum_t += edge.t + edge.t * node.t / factor;
                    if cum_t > rand_no {
                        next = Some(edge.to);
                        break;
                    }
                }
            }
            label => {
                return Err(KpsError::AdjacencyCorruption(format!(
                    "categorical walk reached {label:?} node {} inside the basin",
                    sub.orig_ids[curr]
                )));
            }
        }
        if cum_t - 1.0 > CUM_TOL {
            return Err(KpsError::NumericalPrecisionLoss {
                context: "cumulative transition probability",
                value: cum_t,
            });
        }
        let Some(next) = next else {
            return Err(KpsError::NumericalPrecisionLoss {
                context: "categorical row exhausted below the uniform draw",
                value: cum_t,
            });
        };
        hops[curr] += 1;
        debug!(
            from = sub.orig_ids[curr],
            to = sub.orig_ids[next],
            "kps: categorical hop"
        );
        if sub.net.nodes[next].comm_id != comm {
            return Ok(EscapeSample {
                alpha: sub.orig_ids[next],
                crossing: (sub.orig_ids[curr], sub.orig_ids[next]),
            });
        }
        curr = next;
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
