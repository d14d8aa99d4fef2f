//! Extraction of the basin + boundary subnetwork.

use rustc_hash::FxHashMap;
use wanderer_graph::Network;

use crate::basin::{BasinLabel, BasinSets};
use crate::error::KpsError;

/// A re-indexed, fully owned copy of the occupied basin and its absorbing
/// boundary.
///
/// `Clone` yields the frozen pre-transformation sibling the categorical
/// sampler reads; since every handle is an arena index, the two copies share
/// nothing.
#[derive(Debug, Clone)]
pub struct Subnetwork {
    pub net: Network,
    /// Original node id → subnetwork position (bijective over labeled nodes).
    pub nodemap: FxHashMap<usize, usize>,
    /// Subnetwork position → original node id, ascending.
    pub orig_ids: Vec<usize>,
}

/// Copy the labeled nodes and their edges out of the full network.
///
/// Interior nodes keep all their live outgoing edges; boundary nodes receive
/// only the paired reverses of boundary crossings, which preserves reverse
/// pairing while leaving them absorbing. Positions are assigned in ascending
/// original-id order, so elimination-by-index is reproducible.
pub fn build(ktn: &Network, basin: &BasinSets) -> Result<Subnetwork, KpsError> {
    let mut nodemap = FxHashMap::default();
    let mut orig_ids = Vec::with_capacity(basin.n_basin + basin.n_boundary);
    for (orig, &label) in basin.labels.iter().enumerate() {
        if matches!(label, BasinLabel::Transient | BasinLabel::Boundary) {
            nodemap.insert(orig, orig_ids.len());
            orig_ids.push(orig);
        }
    }

    let mut net = Network::new(orig_ids.len());
    for (pos, &orig) in orig_ids.iter().enumerate() {
        let src = &ktn.nodes[orig];
        let node = &mut net.nodes[pos];
        node.comm_id = src.comm_id;
        node.pi = src.pi;
        node.k_esc = src.k_esc;
        node.t = src.t;
        node.macrostate = src.macrostate;
        // adjacency handles and out-degrees are rebuilt by the edge copy
    }

    let mut copied = vec![false; ktn.edge_count()];
    for &orig in &orig_ids {
        if basin.labels[orig] != BasinLabel::Transient {
            continue; // boundary nodes contribute no edges of their own
        }
        for e in ktn.out_edges(orig) {
            let edge = &ktn.edges[e];
            if edge.dead || copied[e] {
                continue;
            }
            let rev = edge.rev.ok_or_else(|| {
                KpsError::AdjacencyCorruption(format!("edge {e} has no paired reverse"))
            })?;
            let rev_edge = &ktn.edges[rev];
            if rev_edge.dead {
                return Err(KpsError::AdjacencyCorruption(format!(
                    "live edge {e} paired with dead reverse {rev}"
                )));
            }
            let from = nodemap[&orig];
            let to = *nodemap.get(&edge.to).ok_or_else(|| {
                KpsError::AdjacencyCorruption(format!(
                    "edge {e} targets unlabeled node {}",
                    edge.to
                ))
            })?;
            net.add_edge_pair(from, to, (edge.k, edge.t), (rev_edge.k, rev_edge.t));
            copied[e] = true;
            copied[rev] = true;
        }
    }

    if net.node_count() != basin.n_basin + basin.n_boundary
        || net.edge_count() != basin.n_edges
    {
        return Err(KpsError::AdjacencyCorruption(format!(
            "subnetwork totals drifted: {} nodes (expected {}), {} edges (expected {})",
            net.node_count(),
            basin.n_basin + basin.n_boundary,
            net.edge_count(),
            basin.n_edges,
        )));
    }

    Ok(Subnetwork { net, nodemap, orig_ids })
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
