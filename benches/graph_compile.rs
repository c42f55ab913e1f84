//! Benchmarks for graph compilation: building and validating graphs of
//! varying topology (linear chains, fan-out, layered diamonds).

use async_trait::async_trait;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use petalflow::envelope::Envelope;
use petalflow::graph::GraphBuilder;
use petalflow::node::{Node, NodeContext, NodeFailure, NodeKind};
use std::sync::Arc;

struct BenchNode(String);

#[async_trait]
impl Node for BenchNode {
    fn id(&self) -> &str {
        &self.0
    }
    fn kind(&self) -> NodeKind {
        NodeKind::Noop
    }
    async fn run(&self, _ctx: &NodeContext, env: Envelope) -> Result<Envelope, NodeFailure> {
        Ok(env)
    }
}

fn node(id: impl Into<String>) -> Arc<dyn Node> {
    Arc::new(BenchNode(id.into()))
}

fn build_linear_graph(node_count: usize) -> GraphBuilder {
    let mut builder = GraphBuilder::new();
    for i in 0..node_count {
        builder = builder.add_node(node(format!("n{i}")));
    }
    for i in 0..node_count.saturating_sub(1) {
        builder = builder.add_edge(format!("n{i}"), format!("n{}", i + 1));
    }
    if node_count > 0 {
        builder = builder.with_entry("n0");
    }
    builder
}

fn build_fanout_graph(width: usize) -> GraphBuilder {
    let mut builder = GraphBuilder::new().add_node(node("start")).with_entry("start");
    for i in 0..width {
        builder = builder
            .add_node(node(format!("worker{i}")))
            .add_edge("start", format!("worker{i}"));
    }
    builder
}

fn build_diamond_graph(depth: usize, width: usize) -> GraphBuilder {
    let mut builder = GraphBuilder::new();
    for layer in 0..depth {
        for n in 0..width {
            builder = builder.add_node(node(format!("l{layer}n{n}")));
        }
    }
    for layer in 0..depth.saturating_sub(1) {
        for from_node in 0..width {
            let to_node = from_node % width;
            builder = builder.add_edge(format!("l{layer}n{from_node}"), format!("l{}n{to_node}", layer + 1));
        }
    }
    if depth > 0 {
        builder = builder.with_entry("l0n0");
    }
    builder
}

fn bench_graph_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("graph_compile");

    for size in [10, 50, 100, 200] {
        group.bench_with_input(BenchmarkId::new("linear", size), &size, |b, &size| {
            b.iter(|| build_linear_graph(size).compile().expect("compile"));
        });
    }

    for width in [10, 50, 100] {
        group.bench_with_input(BenchmarkId::new("fanout", width), &width, |b, &width| {
            b.iter(|| build_fanout_graph(width).compile().expect("compile"));
        });
    }

    for (depth, width) in [(5, 10), (10, 10), (5, 20)] {
        group.bench_with_input(
            BenchmarkId::new("diamond", format!("{depth}x{width}")),
            &(depth, width),
            |b, &(depth, width)| {
                b.iter(|| build_diamond_graph(depth, width).compile().expect("compile"));
            },
        );
    }

    group.finish();
}

fn bench_dot_export(c: &mut Criterion) {
    let mut group = c.benchmark_group("graph_to_dot");

    for size in [10, 50, 100] {
        let graph = build_linear_graph(size).compile().expect("compile");
        group.bench_with_input(BenchmarkId::new("linear", size), &graph, |b, graph| {
            b.iter(|| graph.to_dot());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_graph_compile, bench_dot_export);
criterion_main!(benches);
