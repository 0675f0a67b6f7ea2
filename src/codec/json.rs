use ahash::{AHashMap, AHashSet};
use serde_json::{Map, Value, json};

use super::GraphCodec;
use crate::{
    errors::CapacityError,
    topology::{Attributes, TopologyEdge, TopologyGraph},
};

/// JSON graphs in node-link or adjacency layout; always written as adjacency.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonCodec;

impl GraphCodec for JsonCodec {
    fn decode(&self, input: &str) -> Result<TopologyGraph, CapacityError> {
        let document: Value = serde_json::from_str(input)
            .map_err(|e| CapacityError::parse(format!("invalid graph json: {e}")))?;
        let Value::Object(root) = document else {
            return Err(CapacityError::parse("graph json must be an object"));
        };
        let directed = root.get("directed").and_then(Value::as_bool).unwrap_or(false);
        let multigraph = root
            .get("multigraph")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let mut graph = TopologyGraph::new(directed, multigraph);
        *graph.attributes_mut() = graph_attributes(root.get("graph"))?;

        let nodes = array_field(&root, "nodes")?;
        let mut ids = Vec::with_capacity(nodes.len());
        for node in nodes {
            let mut attributes = object(node, "node")?.clone();
            let id = attributes
                .remove("id")
                .ok_or_else(|| CapacityError::parse("node without id"))?;
            let id = id_string(&id);
            graph.add_node(id.clone(), attributes);
            ids.push(id);
        }

        if let Some(adjacency) = root.get("adjacency") {
            decode_adjacency(&mut graph, &ids, adjacency)?;
        } else {
            let links = match root.get("links") {
                Some(_) => array_field(&root, "links")?,
                None => array_field(&root, "edges")?,
            };
            for link in links {
                let mut attributes = object(link, "link")?.clone();
                let source = endpoint(&mut attributes, "source")?;
                let target = endpoint(&mut attributes, "target")?;
                graph.add_edge(build_edge(source, target, attributes));
            }
        }
        Ok(graph)
    }

    fn encode(&self, graph: &TopologyGraph) -> Result<String, CapacityError> {
        let nodes: Vec<Value> = graph
            .nodes()
            .iter()
            .map(|node| {
                let mut entry = node.attributes.clone();
                entry.insert("id".into(), Value::String(node.id.clone()));
                Value::Object(entry)
            })
            .collect();

        let mut adjacency: Vec<Vec<Value>> = vec![Vec::new(); graph.node_count()];
        let index: AHashMap<&str, usize> = graph
            .nodes()
            .iter()
            .enumerate()
            .map(|(idx, node)| (node.id.as_str(), idx))
            .collect();
        for edge in graph.edges() {
            let (Some(&from), Some(&to)) = (
                index.get(edge.source.as_str()),
                index.get(edge.target.as_str()),
            ) else {
                return Err(CapacityError::parse(format!(
                    "edge {}->{} references an unknown node",
                    edge.source, edge.target
                )));
            };
            adjacency[from].push(adjacency_entry(edge, &edge.target, graph.is_multigraph()));
            // undirected adjacency lists every edge from both ends
            if !graph.is_directed() && from != to {
                adjacency[to].push(adjacency_entry(edge, &edge.source, graph.is_multigraph()));
            }
        }

        let document = json!({
            "directed": graph.is_directed(),
            "multigraph": graph.is_multigraph(),
            "graph": Value::Object(graph.attributes().clone()),
            "nodes": nodes,
            "adjacency": adjacency,
        });
        serde_json::to_string(&document)
            .map_err(|e| CapacityError::parse(format!("graph json serialization failed: {e}")))
    }
}

fn decode_adjacency(
    graph: &mut TopologyGraph,
    ids: &[String],
    adjacency: &Value,
) -> Result<(), CapacityError> {
    let Value::Array(lists) = adjacency else {
        return Err(CapacityError::parse("adjacency must be an array"));
    };
    if lists.len() != ids.len() {
        return Err(CapacityError::parse(format!(
            "adjacency has {} lists for {} nodes",
            lists.len(),
            ids.len()
        )));
    }
    let directed = graph.is_directed();
    let mut seen: AHashSet<&str> = AHashSet::new();
    for (source, list) in ids.iter().zip(lists) {
        let Value::Array(entries) = list else {
            return Err(CapacityError::parse("adjacency entry must be an array"));
        };
        for entry in entries {
            let mut attributes = object(entry, "adjacency entry")?.clone();
            let target = endpoint(&mut attributes, "id")?;
            if !directed && seen.contains(target.as_str()) {
                continue;
            }
            graph.add_edge(build_edge(source.clone(), target, attributes));
        }
        seen.insert(source);
    }
    Ok(())
}

fn adjacency_entry(edge: &TopologyEdge, neighbour: &str, multigraph: bool) -> Value {
    let mut entry = edge.attributes.clone();
    if multigraph {
        if let Some(key) = &edge.key {
            entry.insert("key".into(), key_value(key));
        }
    }
    entry.insert("id".into(), Value::String(neighbour.to_string()));
    Value::Object(entry)
}

fn build_edge(source: String, target: String, mut attributes: Attributes) -> TopologyEdge {
    let key = attributes.remove("key").map(|k| id_string(&k));
    TopologyEdge {
        source,
        target,
        key,
        attributes,
    }
}

fn graph_attributes(value: Option<&Value>) -> Result<Attributes, CapacityError> {
    match value {
        None | Some(Value::Null) => Ok(Attributes::new()),
        Some(Value::Object(map)) => Ok(map.clone()),
        Some(Value::Array(pairs)) => {
            let mut map = Map::new();
            for pair in pairs {
                match pair.as_array().map(Vec::as_slice) {
                    Some([Value::String(name), value]) => {
                        map.insert(name.clone(), value.clone());
                    }
                    _ => return Err(CapacityError::parse("graph attribute pair expected")),
                }
            }
            Ok(map)
        }
        Some(_) => Err(CapacityError::parse("graph attributes must be an object")),
    }
}

fn array_field<'a>(root: &'a Map<String, Value>, field: &str) -> Result<&'a Vec<Value>, CapacityError> {
    match root.get(field) {
        Some(Value::Array(items)) => Ok(items),
        Some(_) => Err(CapacityError::parse(format!("'{field}' must be an array"))),
        None => Err(CapacityError::parse(format!("graph json has no '{field}'"))),
    }
}

fn object<'a>(value: &'a Value, what: &str) -> Result<&'a Map<String, Value>, CapacityError> {
    value
        .as_object()
        .ok_or_else(|| CapacityError::parse(format!("{what} must be an object")))
}

fn endpoint(attributes: &mut Attributes, field: &str) -> Result<String, CapacityError> {
    attributes
        .remove(field)
        .map(|v| id_string(&v))
        .ok_or_else(|| CapacityError::parse(format!("edge without '{field}'")))
}

fn id_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn key_value(key: &str) -> Value {
    key.parse::<i64>()
        .map(Value::from)
        .unwrap_or_else(|_| Value::String(key.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_link_document_decodes() {
        let doc = r#"{
            "directed": true, "multigraph": true, "graph": {},
            "nodes": [{"id": "a"}, {"id": "b"}],
            "links": [
                {"source": "a", "target": "b", "key": 0, "scid": "1x2x3/0"},
                {"source": "b", "target": "a", "key": 0, "scid": "1x2x3/1"}
            ]
        }"#;
        let graph = JsonCodec.decode(doc).unwrap();
        assert_eq!(graph.edge_count(), 2);
        assert_eq!(graph.edges()[0].key.as_deref(), Some("0"));
        assert_eq!(graph.edges()[1].channel_id().unwrap(), "1x2x3/1");
    }

    #[test]
    fn undirected_adjacency_is_not_doubled() {
        let mut graph = TopologyGraph::new(false, false);
        graph.add_edge(TopologyEdge::new("b", "a"));
        graph.add_node("c", Attributes::new());
        let encoded = JsonCodec.encode(&graph).unwrap();
        let decoded = JsonCodec.decode(&encoded).unwrap();
        assert_eq!(decoded.edge_count(), 1);
        assert_eq!(decoded.node_count(), 3);
    }
}
