//! Immutable directed graph structure and its builder (spec §3 "Graph").

use crate::error::PetalFlowError;
use crate::node::Node;
use petgraph::graph::DiGraph;
use petgraph::visit::EdgeRef;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// An immutable record of a graph's topology plus its node implementations.
/// Built once via [`GraphBuilder::compile`], never mutated afterward. Cycles
/// are permitted; hop-limiting happens at scheduling time, not here.
pub struct Graph {
    name: String,
    nodes: FxHashMap<String, Arc<dyn Node>>,
    node_order: Vec<String>,
    entry: String,
    successors: FxHashMap<String, Vec<String>>,
    predecessors: FxHashMap<String, Vec<String>>,
}

impl Graph {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn entry(&self) -> &str {
        &self.entry
    }

    #[must_use]
    pub fn node(&self, id: &str) -> Option<&Arc<dyn Node>> {
        self.nodes.get(id)
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// Node identifiers in insertion order (spec §3: "insertion-ordered").
    #[must_use]
    pub fn node_ids(&self) -> &[String] {
        &self.node_order
    }

    #[must_use]
    pub fn successors(&self, id: &str) -> &[String] {
        self.successors.get(id).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn predecessors(&self, id: &str) -> &[String] {
        self.predecessors.get(id).map_or(&[], Vec::as_slice)
    }

    /// DOT-format export for debugging (SPEC_FULL.md EXPANSION item 4).
    #[must_use]
    pub fn to_dot(&self) -> String {
        let mut pg: DiGraph<&str, ()> = DiGraph::new();
        let mut index = FxHashMap::default();
        for id in &self.node_order {
            index.insert(id.as_str(), pg.add_node(id.as_str()));
        }
        for (from, tos) in &self.successors {
            for to in tos {
                if let (Some(&a), Some(&b)) = (index.get(from.as_str()), index.get(to.as_str())) {
                    pg.add_edge(a, b, ());
                }
            }
        }
        let mut out = String::from("digraph petalflow {\n");
        for id in &self.node_order {
            out.push_str(&format!("  \"{id}\";\n"));
        }
        for edge in pg.edge_references() {
            let a = pg[edge.source()];
            let b = pg[edge.target()];
            out.push_str(&format!("  \"{a}\" -> \"{b}\";\n"));
        }
        out.push_str("}\n");
        out
    }
}

/// Builds a [`Graph`] via a fluent API, validating on [`compile`](Self::compile).
pub struct GraphBuilder {
    name: String,
    nodes: FxHashMap<String, Arc<dyn Node>>,
    node_order: Vec<String>,
    edges: Vec<(String, String)>,
    entry: Option<String>,
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            name: String::new(),
            nodes: FxHashMap::default(),
            node_order: Vec::new(),
            edges: Vec::new(),
            entry: None,
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub fn add_node(mut self, node: Arc<dyn Node>) -> Self {
        let id = node.id().to_string();
        if !self.nodes.contains_key(&id) {
            self.node_order.push(id.clone());
        }
        self.nodes.insert(id, node);
        self
    }

    #[must_use]
    pub fn add_edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.edges.push((from.into(), to.into()));
        self
    }

    #[must_use]
    pub fn with_entry(mut self, entry: impl Into<String>) -> Self {
        self.entry = Some(entry.into());
        self
    }

    /// Validates and builds the immutable [`Graph`]: every edge endpoint
    /// must exist, the entry must exist, duplicate edges collapse silently.
    pub fn compile(self) -> Result<Graph, PetalFlowError> {
        if self.nodes.is_empty() {
            return Err(PetalFlowError::EmptyGraph);
        }
        let entry = self.entry.ok_or(PetalFlowError::NoEntryNode)?;
        if !self.nodes.contains_key(&entry) {
            return Err(PetalFlowError::NodeNotFound(entry));
        }

        let mut successors: FxHashMap<String, Vec<String>> = FxHashMap::default();
        let mut predecessors: FxHashMap<String, Vec<String>> = FxHashMap::default();
        for id in &self.node_order {
            successors.insert(id.clone(), Vec::new());
            predecessors.insert(id.clone(), Vec::new());
        }

        for (from, to) in &self.edges {
            if !self.nodes.contains_key(from) {
                return Err(PetalFlowError::NodeNotFound(from.clone()));
            }
            if !self.nodes.contains_key(to) {
                return Err(PetalFlowError::NodeNotFound(to.clone()));
            }
            let succ = successors.get_mut(from).expect("indexed above");
            if !succ.contains(to) {
                succ.push(to.clone());
            }
            let pred = predecessors.get_mut(to).expect("indexed above");
            if !pred.contains(from) {
                pred.push(from.clone());
            }
        }

        Ok(Graph {
            name: self.name,
            nodes: self.nodes,
            node_order: self.node_order,
            entry,
            successors,
            predecessors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::Envelope;
    use crate::node::{NodeContext, NodeFailure, NodeKind};
    use async_trait::async_trait;

    struct NoopNode(&'static str);

    #[async_trait]
    impl Node for NoopNode {
        fn id(&self) -> &str {
            self.0
        }

        fn kind(&self) -> NodeKind {
            NodeKind::Noop
        }

        async fn run(&self, _ctx: &NodeContext, env: Envelope) -> Result<Envelope, NodeFailure> {
            Ok(env)
        }
    }

    fn node(id: &'static str) -> Arc<dyn Node> {
        Arc::new(NoopNode(id))
    }

    #[test]
    fn empty_graph_fails_to_compile() {
        let result = GraphBuilder::new().with_entry("a").compile();
        assert!(matches!(result, Err(PetalFlowError::EmptyGraph)));
    }

    #[test]
    fn missing_entry_fails_to_compile() {
        let result = GraphBuilder::new().add_node(node("a")).compile();
        assert!(matches!(result, Err(PetalFlowError::NoEntryNode)));
    }

    #[test]
    fn dangling_edge_target_fails_to_compile() {
        let result = GraphBuilder::new()
            .add_node(node("a"))
            .add_edge("a", "ghost")
            .with_entry("a")
            .compile();
        assert!(matches!(result, Err(PetalFlowError::NodeNotFound(_))));
    }

    #[test]
    fn duplicate_edges_collapse() {
        let graph = GraphBuilder::new()
            .add_node(node("a"))
            .add_node(node("b"))
            .add_edge("a", "b")
            .add_edge("a", "b")
            .with_entry("a")
            .compile()
            .unwrap();
        assert_eq!(graph.successors("a"), ["b"]);
    }

    #[test]
    fn self_loop_is_permitted() {
        let graph = GraphBuilder::new()
            .add_node(node("a"))
            .add_edge("a", "a")
            .with_entry("a")
            .compile()
            .unwrap();
        assert_eq!(graph.successors("a"), ["a"]);
    }

    #[test]
    fn to_dot_contains_nodes_and_edges() {
        let graph = GraphBuilder::new()
            .add_node(node("a"))
            .add_node(node("b"))
            .add_edge("a", "b")
            .with_entry("a")
            .compile()
            .unwrap();
        let dot = graph.to_dot();
        assert!(dot.contains("\"a\""));
        assert!(dot.contains("\"a\" -> \"b\""));
    }
}
