//! Criterion benchmarks for wanderer-graph core operations.
//!
//! Run with:
//! ```bash
//! cargo bench -p wanderer-graph
//! ```

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use wanderer_graph::{Macrostate, Network, NodeSpec};

// ── helpers ─────────────────────────────────────────────────────────────────

fn ring_rates(n: usize) -> (Vec<NodeSpec>, Vec<(usize, usize, f64, f64)>) {
    let mut rng = StdRng::seed_from_u64(17);
    let specs = (0..n)
        .map(|i| NodeSpec {
            comm_id: i / 8,
            pi: -(i as f64),
            macrostate: Macrostate::Intermediate,
        })
        .collect();
    let rates = (0..n)
        .map(|i| (i, (i + 1) % n, rng.gen_range(0.1..2.0), rng.gen_range(0.1..2.0)))
        .collect();
    (specs, rates)
}

// ── construction ────────────────────────────────────────────────────────────

fn bench_from_rates(c: &mut Criterion) {
    let mut group = c.benchmark_group("network/from_rates");
    for n in [100usize, 1_000, 10_000] {
        let (specs, rates) = ring_rates(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| {
                let mut net = Network::from_rates(&specs, &rates).unwrap();
                net.set_branching_probs().unwrap();
                net
            })
        });
    }
    group.finish();
}

// ── traversal ───────────────────────────────────────────────────────────────

fn bench_out_edge_walk(c: &mut Criterion) {
    let (specs, rates) = ring_rates(10_000);
    let mut net = Network::from_rates(&specs, &rates).unwrap();
    net.set_branching_probs().unwrap();

    c.bench_function("network/out_edge_walk", |b| {
        b.iter(|| {
            let mut acc = 0.0;
            for node in 0..net.node_count() {
                for e in net.out_edges(node) {
                    if !net.edges[e].dead {
                        acc += net.edges[e].t;
                    }
                }
            }
            acc
        })
    });
}

fn bench_validate(c: &mut Criterion) {
    let (specs, rates) = ring_rates(10_000);
    let mut net = Network::from_rates(&specs, &rates).unwrap();
    net.set_branching_probs().unwrap();

    c.bench_function("network/validate", |b| b.iter(|| net.validate().unwrap()));
}

criterion_group!(benches, bench_from_rates, bench_out_edge_walk, bench_validate);
criterion_main!(benches);
