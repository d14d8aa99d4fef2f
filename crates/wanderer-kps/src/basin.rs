//! Basin classification relative to the walker's occupied community.

use wanderer_graph::Network;

/// Role of a node with respect to the occupied trapping basin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BasinLabel {
    /// Absorbing non-boundary node, or simply outside the basin.
    Outside,
    /// Interior node already eliminated by graph transformation.
    Eliminated,
    /// Interior node not (yet) eliminated.
    Transient,
    /// Absorbing boundary node: an exit candidate.
    Boundary,
}

/// Classification of the full network against one occupied community.
#[derive(Debug, Clone)]
pub struct BasinSets {
    /// Per-node labels, indexed by node id in the full network.
    pub labels: Vec<BasinLabel>,
    /// N_B: interior node count.
    pub n_basin: usize,
    /// N_c: absorbing boundary node count.
    pub n_boundary: usize,
    /// N_e: edges the subnetwork will carry, every live out-edge of an
    /// interior node plus the paired reverse of every boundary crossing.
    pub n_edges: usize,
}

/// Label every node as interior / boundary / outside with respect to the
/// community occupied by `epsilon`, and count {N_B, N_c, N_e}.
///
/// The classification is total; an interior set with no boundary (a closed
/// basin, `n_boundary == 0`) is legal here and detected by the driver.
pub fn classify(ktn: &Network, epsilon: usize) -> BasinSets {
    let comm = ktn.nodes[epsilon].comm_id;
    let mut labels = vec![BasinLabel::Outside; ktn.node_count()];
    let mut n_basin = 0;
    let mut n_boundary = 0;
    let mut n_edges = 0;

    for node in &ktn.nodes {
        if node.comm_id == comm {
            labels[node.id] = BasinLabel::Transient;
            n_basin += 1;
            n_edges += node.udeg;
        }
    }
    for node in &ktn.nodes {
        if labels[node.id] != BasinLabel::Transient {
            continue;
        }
        for e in ktn.out_edges(node.id) {
            let edge = &ktn.edges[e];
            if edge.dead {
                continue;
            }
            if ktn.nodes[edge.to].comm_id != comm {
                n_edges += 1; // the reverse of this crossing gets copied too
                if labels[edge.to] == BasinLabel::Outside {
                    labels[edge.to] = BasinLabel::Boundary;
                    n_boundary += 1;
                }
            }
        }
    }

    BasinSets { labels, n_basin, n_boundary, n_edges }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
