//! Graph transformation: iterative elimination of interior nodes, with an
//! undo log sufficient to reverse the algebra during randomization.

use rustc_hash::FxHashMap;
use tracing::debug;
use wanderer_graph::{Edge, Network};

use crate::basin::{BasinLabel, BasinSets};
use crate::error::KpsError;
use crate::subnetwork::Subnetwork;

/// Divisors below this mean the node is an effective dead end; the pass
/// aborts rather than risk NaN propagation.
pub const FACTOR_FLOOR: f64 = 1e-15;
/// Self-loop mass above which 1 − T_nn is recomputed by summation.
const SELF_LOOP_GUARD: f64 = 0.999;

// ─────────────────────────────────────────────
// Undo log
// ─────────────────────────────────────────────

/// Undo record for one elimination.
#[derive(Debug, Clone)]
pub struct GtStep {
    /// Subnetwork position of the eliminated node.
    pub node: usize,
    /// 1 − T_nn at elimination time, in the precision-preserving form.
    pub factor: f64,
    /// T_nn at elimination time.
    pub t_self: f64,
    /// Entries this iteration appended to the L network.
    pub l_range: (usize, usize),
    /// Entries this iteration appended to the U network.
    pub u_range: (usize, usize),
    /// Positions of the edges this iteration created in the subnetwork.
    pub created: Vec<usize>,
}

/// The L/U log of a full GT pass.
///
/// Per iteration, `l` receives one entry per surviving neighbor holding the
/// incoming weight T_in at elimination time, and `u` the matching outgoing
/// weight T_nj. Neither network is consulted anywhere except reverse
/// randomization.
#[derive(Debug, Clone)]
pub struct GtLog {
    pub l: Network,
    pub u: Network,
    pub steps: Vec<GtStep>,
    /// Eliminated subnetwork positions, in elimination order.
    pub eliminated: Vec<usize>,
    /// Subnetwork position → elimination order; `None` for survivors.
    pub elim_index: Vec<Option<usize>>,
}

/// Append a one-directional record edge to an auxiliary network.
fn push_record(aux: &mut Network, from: usize, to: usize, t: f64) {
    let pos = aux.edges.len();
    aux.edges.push(Edge {
        pos,
        from,
        to,
        k: 0.0,
        t,
        dead: false,
        next_from: None,
        next_to: None,
        rev: None,
    });
    aux.add_from_edge(from, pos);
    aux.add_to_edge(to, pos);
}

// ─────────────────────────────────────────────
// Factor
// ─────────────────────────────────────────────

/// 1 − T_nn for the node about to be eliminated.
///
/// When the self-loop dominates, the difference is recomputed as the sum of
/// live outgoing weights to non-eliminated targets, which keeps precision in
/// exactly the regime where 1 − T_nn cancels.
pub fn gt_factor(net: &Network, node: usize) -> Result<f64, KpsError> {
    let factor = if net.nodes[node].t > SELF_LOOP_GUARD {
        let mut sum = 0.0;
        for e in net.out_edges(node) {
            let edge = &net.edges[e];
            if !edge.dead && !net.nodes[edge.to].eliminated {
                sum += edge.t;
            }
        }
        sum
    } else {
        1.0 - net.nodes[node].t
    };
    if factor < FACTOR_FLOOR {
        return Err(KpsError::NumericalPrecisionLoss {
            context: "graph transformation factor",
            value: factor,
        });
    }
    Ok(factor)
}

// ─────────────────────────────────────────────
// One elimination
// ─────────────────────────────────────────────

struct NbrInfo {
    node: usize,
    /// The n → nbr edge.
    edge: usize,
    /// T_n→nbr at gather time.
    t_fromn: f64,
    /// T_nbr→n at gather time.
    t_ton: f64,
    eliminated: bool,
    dirconn: bool,
}

/// Eliminate one node: fold its self-loop onto its outgoing edges, push its
/// probability flow onto the neighbors' self-loops and pairwise edges
/// (creating edge pairs where none exist), and append the undo entries.
fn gt_iteration(
    net: &mut Network,
    n: usize,
    l: &mut Network,
    u: &mut Network,
) -> Result<GtStep, KpsError> {
    let factor = gt_factor(net, n)?;
    let t_self = net.nodes[n].t;
    let l_start = l.edge_count();
    let u_start = u.edge_count();

    // gather the neighborhood at pre-update weights
    let mut nbrs: Vec<NbrInfo> = Vec::new();
    let mut nbr_of: FxHashMap<usize, usize> = FxHashMap::default();
    let mut e = net.nodes[n].top_from;
    while let Some(i) = e {
        let (dead, next, to, t_fromn, rev) = {
            let edge = &net.edges[i];
            (edge.dead, edge.next_from, edge.to, edge.t, edge.rev)
        };
        if !dead {
            let rev = rev.ok_or_else(|| {
                KpsError::AdjacencyCorruption(format!("edge {i} has no paired reverse"))
            })?;
            let t_ton = net.edges[rev].t;
            let eliminated = net.nodes[to].eliminated;
            if !eliminated {
                push_record(l, to, n, t_ton);
                push_record(u, n, to, t_fromn);
            }
            nbr_of.insert(to, nbrs.len());
            nbrs.push(NbrInfo { node: to, edge: i, t_fromn, t_ton, eliminated, dirconn: false });
            net.nodes[to].flag = true;
        }
        e = next;
    }

    // fold the flow through n onto the surviving neighbors' self-loops, and
    // n's remaining self-loop mass onto its outgoing edges
    for a in 0..nbrs.len() {
        if nbrs[a].eliminated {
            continue;
        }
        let j = nbrs[a].node;
        net.nodes[j].t += nbrs[a].t_fromn * nbrs[a].t_ton / factor;
        net.edges[nbrs[a].edge].t += nbrs[a].t_fromn * t_self / factor;
    }

    // pairwise flow between surviving neighbors
    let before = net.edge_count();
    let mut created = Vec::new();
    for a in 0..nbrs.len() {
        if nbrs[a].eliminated {
            continue;
        }
        let i_node = nbrs[a].node;
        // existing connections get a weight bump; edges appended during this
        // iteration already carry their full weight
        let mut e = net.nodes[i_node].top_from;
        while let Some(idx) = e {
            let (dead, next, to, pos) = {
                let edge = &net.edges[idx];
                (edge.dead, edge.next_from, edge.to, edge.pos)
            };
            if !dead && !net.nodes[to].eliminated && net.nodes[to].flag {
                if let Some(&b) = nbr_of.get(&to) {
                    nbrs[b].dirconn = true;
                    if pos < before {
                        net.edges[idx].t += nbrs[a].t_ton * nbrs[b].t_fromn / factor;
                    }
                }
            }
            e = next;
        }
        // neighbors not directly connected get a fresh edge pair
        for b in 0..nbrs.len() {
            if b == a || nbrs[b].eliminated {
                continue;
            }
            if nbrs[b].dirconn {
                nbrs[b].dirconn = false;
                continue;
            }
            let j_node = nbrs[b].node;
            let t_ij = nbrs[a].t_ton * nbrs[b].t_fromn / factor;
            let t_ji = nbrs[b].t_ton * nbrs[a].t_fromn / factor;
            let (fwd, bwd) = net.add_edge_pair(i_node, j_node, (0.0, t_ij), (0.0, t_ji));
            created.push(fwd);
            created.push(bwd);
        }
    }

    for info in &nbrs {
        net.nodes[info.node].flag = false;
    }
    net.nodes[n].eliminated = true;

    Ok(GtStep {
        node: n,
        factor,
        t_self,
        l_range: (l_start, l.edge_count()),
        u_range: (u_start, u.edge_count()),
        created,
    })
}

// ─────────────────────────────────────────────
// Full pass
// ─────────────────────────────────────────────

/// Eliminate up to `nelim` interior nodes of the subnetwork, in ascending
/// position order for reproducibility.
///
/// Flips the basin label of each eliminated node so the categorical sampler
/// can tell eliminated interiors from survivors, and returns the L/U log the
/// reverse randomizer consumes. Aborts if the elimination count drifts from
/// min(N_B, nelim).
pub fn graph_transformation(
    sub: &mut Subnetwork,
    basin: &mut BasinSets,
    nelim: usize,
) -> Result<GtLog, KpsError> {
    let n_nodes = sub.net.node_count();
    let mut l = Network::new(n_nodes);
    let mut u = Network::new(n_nodes);
    for pos in 0..n_nodes {
        // aux nodes mirror the subnetwork but carry no probability mass
        l.nodes[pos].comm_id = sub.net.nodes[pos].comm_id;
        u.nodes[pos].comm_id = sub.net.nodes[pos].comm_id;
    }

    let target = basin.n_basin.min(nelim);
    let mut log = GtLog {
        l,
        u,
        steps: Vec::with_capacity(target),
        eliminated: Vec::with_capacity(target),
        elim_index: vec![None; n_nodes],
    };

    for pos in 0..n_nodes {
        if log.eliminated.len() >= target {
            break;
        }
        if basin.labels[sub.orig_ids[pos]] != BasinLabel::Transient {
            continue;
        }
        debug!(
            node = sub.orig_ids[pos],
            order = log.eliminated.len(),
            "kps: eliminating node"
        );
        let step = gt_iteration(&mut sub.net, pos, &mut log.l, &mut log.u)?;
        basin.labels[sub.orig_ids[pos]] = BasinLabel::Eliminated;
        log.elim_index[pos] = Some(log.eliminated.len());
        log.eliminated.push(pos);
        log.steps.push(step);
    }

    if log.eliminated.len() != target {
        return Err(KpsError::AdjacencyCorruption(format!(
            "lost track of eliminated nodes: {} eliminated, expected {}",
            log.eliminated.len(),
            target
        )));
    }
    Ok(log)
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
