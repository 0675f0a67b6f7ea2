use std::{hint::black_box, time::Duration};

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use lntopo_capacity::{GraphFormat, TopologyEdge, TopologyGraph, canonicalize, pack};
use rand::{Rng, SeedableRng, rngs::StdRng};
use serde_json::json;

const SCID_SEED: u64 = 0x5C1D;
const GRAPH_SEED: u64 = 0x6A7F;
const SAMPLE_SIZE: usize = 20;
const WARM_UP: Duration = Duration::from_millis(300);
const MEASURE: Duration = Duration::from_millis(500);

fn random_scids(count: usize, seed: u64) -> Vec<String> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            format!(
                "{}x{}x{}/{}",
                rng.gen_range(500_000..900_000u32),
                rng.gen_range(0..4_000u32),
                rng.gen_range(0..8u32),
                rng.gen_range(0..2u32)
            )
        })
        .collect()
}

fn random_topology(nodes: usize, channels: usize, seed: u64) -> TopologyGraph {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut graph = TopologyGraph::new(true, true);
    for scid in random_scids(channels, seed) {
        let a = format!("n{}", rng.gen_range(0..nodes));
        let b = format!("n{}", rng.gen_range(0..nodes));
        let base = scid.trim_end_matches(char::is_numeric).trim_end_matches('/');
        let capacity = rng.gen_range(20_000..16_000_000u64);
        graph.add_edge(
            TopologyEdge::new(a.clone(), b.clone())
                .with_attr("scid", json!(format!("{base}/0")))
                .with_attr("capacity", json!(capacity)),
        );
        graph.add_edge(
            TopologyEdge::new(b, a)
                .with_attr("scid", json!(format!("{base}/1")))
                .with_attr("capacity", json!(capacity)),
        );
    }
    graph
}

fn bench_identifiers(c: &mut Criterion) {
    let scids = random_scids(10_000, SCID_SEED);
    let mut group = c.benchmark_group("identifiers");
    group.sample_size(SAMPLE_SIZE);
    group.warm_up_time(WARM_UP);
    group.measurement_time(MEASURE);
    group.bench_function("canonicalize", |b| {
        b.iter(|| {
            for scid in &scids {
                let _ = black_box(canonicalize(scid));
            }
        });
    });
    group.bench_function("canonicalize_and_pack", |b| {
        b.iter(|| {
            for scid in &scids {
                let _ = black_box(canonicalize(scid).and_then(|u| pack(&u)));
            }
        });
    });
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let graph = random_topology(2_000, 5_000, GRAPH_SEED);
    let mut group = c.benchmark_group("decode");
    group.sample_size(SAMPLE_SIZE);
    group.warm_up_time(WARM_UP);
    group.measurement_time(MEASURE);
    for format in [
        GraphFormat::Dot,
        GraphFormat::Gml,
        GraphFormat::GraphMl,
        GraphFormat::JsonNodeLink,
    ] {
        let encoded = format.codec().encode(&graph).expect("encode");
        group.bench_function(BenchmarkId::from_parameter(format), |b| {
            b.iter(|| {
                let decoded = format.codec().decode(black_box(&encoded)).expect("decode");
                black_box(decoded.edge_count());
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_identifiers, bench_decode);
criterion_main!(benches);
