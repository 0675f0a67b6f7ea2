use ahash::AHashMap;
use serde_json::{Map, Value};

use crate::errors::CapacityError;

pub type Attributes = Map<String, Value>;

pub const SCID_ATTR: &str = "scid";
pub const CAPACITY_ATTR: &str = "capacity";

#[derive(Debug, Clone, PartialEq)]
pub struct TopologyNode {
    pub id: String,
    pub attributes: Attributes,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TopologyEdge {
    pub source: String,
    pub target: String,
    pub key: Option<String>,
    pub attributes: Attributes,
}

impl TopologyEdge {
    pub fn new<S: Into<String>, T: Into<String>>(source: S, target: T) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            key: None,
            attributes: Attributes::new(),
        }
    }

    pub fn with_key<K: Into<String>>(mut self, key: K) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_attr<K: Into<String>>(mut self, name: K, value: Value) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    /// The directed channel identifier stored under `scid`.
    pub fn channel_id(&self) -> Result<&str, CapacityError> {
        match self.attributes.get(SCID_ATTR) {
            Some(Value::String(scid)) => Ok(scid),
            Some(other) => Err(CapacityError::malformed_identifier(format!(
                "edge {}->{}: scid must be a string, got {other}",
                self.source, self.target
            ))),
            None => Err(CapacityError::malformed_identifier(format!(
                "edge {}->{} has no scid attribute",
                self.source, self.target
            ))),
        }
    }
}

/// In-memory topology: nodes in insertion order, edges in load order.
#[derive(Debug, Clone, Default)]
pub struct TopologyGraph {
    directed: bool,
    multigraph: bool,
    attributes: Attributes,
    nodes: Vec<TopologyNode>,
    node_index: AHashMap<String, usize>,
    edges: Vec<TopologyEdge>,
}

impl TopologyGraph {
    pub fn new(directed: bool, multigraph: bool) -> Self {
        Self {
            directed,
            multigraph,
            ..Self::default()
        }
    }

    pub fn is_directed(&self) -> bool {
        self.directed
    }

    pub fn is_multigraph(&self) -> bool {
        self.multigraph
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn attributes_mut(&mut self) -> &mut Attributes {
        &mut self.attributes
    }

    pub fn nodes(&self) -> &[TopologyNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[TopologyEdge] {
        &self.edges
    }

    pub fn edges_mut(&mut self) -> impl Iterator<Item = &mut TopologyEdge> {
        self.edges.iter_mut()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn node(&self, id: &str) -> Option<&TopologyNode> {
        self.node_index.get(id).map(|&idx| &self.nodes[idx])
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.node_index.contains_key(id)
    }

    /// Adds a node, merging attributes into an existing node with the same id.
    pub fn add_node<S: Into<String>>(&mut self, id: S, attributes: Attributes) -> &mut TopologyNode {
        let id = id.into();
        let idx = match self.node_index.get(&id) {
            Some(&idx) => idx,
            None => {
                self.nodes.push(TopologyNode {
                    id: id.clone(),
                    attributes: Attributes::new(),
                });
                self.node_index.insert(id, self.nodes.len() - 1);
                self.nodes.len() - 1
            }
        };
        let node = &mut self.nodes[idx];
        node.attributes.extend(attributes);
        node
    }

    /// Adds an edge, creating missing endpoints.
    ///
    /// Simple graphs keep one edge per endpoint pair; a repeated pair merges
    /// its attributes into the existing edge.
    pub fn add_edge(&mut self, edge: TopologyEdge) {
        self.add_node(edge.source.clone(), Attributes::new());
        self.add_node(edge.target.clone(), Attributes::new());
        if !self.multigraph {
            if let Some(existing) = self.find_edge_mut(&edge.source, &edge.target) {
                existing.attributes.extend(edge.attributes);
                return;
            }
        }
        self.edges.push(edge);
    }

    fn find_edge_mut(&mut self, source: &str, target: &str) -> Option<&mut TopologyEdge> {
        let directed = self.directed;
        self.edges.iter_mut().find(|e| {
            (e.source == source && e.target == target)
                || (!directed && e.source == target && e.target == source)
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn simple_graph_merges_parallel_edges() {
        let mut graph = TopologyGraph::new(false, false);
        graph.add_edge(TopologyEdge::new("a", "b").with_attr("w", json!(1)));
        graph.add_edge(TopologyEdge::new("b", "a").with_attr("x", json!(2)));
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.edges()[0].attributes.len(), 2);
    }

    #[test]
    fn multigraph_keeps_parallel_edges() {
        let mut graph = TopologyGraph::new(true, true);
        graph.add_edge(TopologyEdge::new("a", "b"));
        graph.add_edge(TopologyEdge::new("a", "b"));
        assert_eq!(graph.edge_count(), 2);
        assert_eq!(graph.node_count(), 2);
    }

    #[test]
    fn missing_scid_is_malformed() {
        let edge = TopologyEdge::new("a", "b");
        assert!(matches!(
            edge.channel_id(),
            Err(CapacityError::MalformedIdentifier(_))
        ));
    }
}
