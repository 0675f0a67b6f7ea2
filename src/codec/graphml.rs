use std::{
    collections::{BTreeMap, btree_map::Entry},
    fmt::Write as _,
};

use ahash::{AHashMap, AHashSet};
use quick_xml::{
    Reader,
    escape::escape,
    events::{BytesStart, Event},
};
use serde_json::{Number, Value};

use super::{GraphCodec, flatten_value, format_real};
use crate::{
    errors::CapacityError,
    topology::{Attributes, SCID_ATTR, TopologyEdge, TopologyGraph},
};

const GRAPHML_HEADER: &str = concat!(
    "<?xml version='1.0' encoding='utf-8'?>\n",
    "<graphml xmlns=\"http://graphml.graphdrawing.org/xmlns\" ",
    "xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\" ",
    "xsi:schemaLocation=\"http://graphml.graphdrawing.org/xmlns ",
    "http://graphml.graphdrawing.org/xmlns/1.0/graphml.xsd\">\n",
);

/// GraphML with named key ids; edge ids come from the `scid` attribute.
#[derive(Clone, Copy, Debug, Default)]
pub struct GraphMlCodec;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum Domain {
    Graph,
    Node,
    Edge,
    All,
}

impl Domain {
    fn parse(text: &str) -> Result<Self, CapacityError> {
        match text {
            "graph" => Ok(Domain::Graph),
            "node" => Ok(Domain::Node),
            "edge" => Ok(Domain::Edge),
            "all" => Ok(Domain::All),
            other => Err(CapacityError::parse(format!("unsupported graphml key domain '{other}'"))),
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Domain::Graph => "graph",
            Domain::Node => "node",
            Domain::Edge => "edge",
            Domain::All => "all",
        }
    }

    fn covers(self, other: Domain) -> bool {
        self == Domain::All || self == other
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum AttrType {
    Boolean,
    Long,
    Double,
    Text,
}

impl AttrType {
    fn parse(text: &str) -> Self {
        match text {
            "boolean" => AttrType::Boolean,
            "int" | "long" => AttrType::Long,
            "float" | "double" => AttrType::Double,
            _ => AttrType::Text,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            AttrType::Boolean => "boolean",
            AttrType::Long => "long",
            AttrType::Double => "double",
            AttrType::Text => "string",
        }
    }

    fn of(value: &Value) -> Self {
        match value {
            Value::Bool(_) => AttrType::Boolean,
            Value::Number(n) if n.is_i64() => AttrType::Long,
            Value::Number(_) => AttrType::Double,
            _ => AttrType::Text,
        }
    }

    fn unify(self, other: AttrType) -> Self {
        match (self, other) {
            (a, b) if a == b => a,
            (AttrType::Long, AttrType::Double) | (AttrType::Double, AttrType::Long) => {
                AttrType::Double
            }
            _ => AttrType::Text,
        }
    }

    fn decode(self, raw: &str) -> Result<Value, CapacityError> {
        let invalid = || CapacityError::parse(format!("'{raw}' is not a valid graphml {}", self.as_str()));
        let trimmed = raw.trim();
        match self {
            AttrType::Boolean => match trimmed.to_ascii_lowercase().as_str() {
                "true" | "1" => Ok(Value::Bool(true)),
                "false" | "0" => Ok(Value::Bool(false)),
                _ => Err(invalid()),
            },
            AttrType::Long => trimmed.parse::<i64>().map(Value::from).map_err(|_| invalid()),
            AttrType::Double => trimmed
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .ok_or_else(invalid),
            AttrType::Text => Ok(Value::String(raw.to_string())),
        }
    }

    fn encode(self, value: &Value) -> String {
        match (self, value) {
            (AttrType::Double, Value::Number(n)) => format_real(n.as_f64().unwrap_or_default()),
            _ => flatten_value(value),
        }
    }
}

#[derive(Debug, Clone)]
struct KeySpec {
    name: String,
    domain: Domain,
    ty: AttrType,
    default: Option<String>,
}

enum Owner {
    Graph,
    Node(String, Attributes),
    Edge(TopologyEdge),
}

#[derive(Default)]
struct Document {
    keys: AHashMap<String, KeySpec>,
    directed: bool,
    attributes: Attributes,
    nodes: Vec<(String, Attributes)>,
    edges: Vec<TopologyEdge>,
}

impl GraphCodec for GraphMlCodec {
    fn decode(&self, input: &str) -> Result<TopologyGraph, CapacityError> {
        let mut reader = Reader::from_str(input);

        let mut doc = Document::default();
        let mut owners: Vec<Owner> = Vec::new();
        let mut open_key: Option<String> = None;
        let mut data_key: Option<String> = None;
        let mut in_default = false;
        let mut text = String::new();
        let mut seen_graph = false;

        loop {
            let event = reader
                .read_event()
                .map_err(|e| CapacityError::parse(format!("graphml: {e}")))?;
            let self_closing = matches!(event, Event::Empty(_));
            match event {
                Event::Start(element) | Event::Empty(element) if element.local_name().as_ref() == b"key" => {
                    let id = required_attr(&element, "id")?;
                    let spec = KeySpec {
                        name: optional_attr(&element, "attr.name")?.unwrap_or_else(|| id.clone()),
                        domain: Domain::parse(&optional_attr(&element, "for")?.unwrap_or_else(|| "all".into()))?,
                        ty: AttrType::parse(&optional_attr(&element, "attr.type")?.unwrap_or_default()),
                        default: None,
                    };
                    doc.keys.insert(id.clone(), spec);
                    if !self_closing {
                        open_key = Some(id);
                    }
                }
                Event::Start(element) if element.local_name().as_ref() == b"default" => {
                    in_default = true;
                    text.clear();
                }
                Event::End(element) if element.local_name().as_ref() == b"default" => {
                    in_default = false;
                    if let Some(spec) = open_key.as_ref().and_then(|id| doc.keys.get_mut(id)) {
                        spec.default = Some(std::mem::take(&mut text));
                    }
                }
                Event::End(element) if element.local_name().as_ref() == b"key" => {
                    open_key = None;
                }
                Event::Start(element) if element.local_name().as_ref() == b"graph" => {
                    if !seen_graph {
                        doc.directed = optional_attr(&element, "edgedefault")?.as_deref() != Some("undirected");
                        seen_graph = true;
                    }
                    owners.push(Owner::Graph);
                }
                Event::End(element) if element.local_name().as_ref() == b"graph" => {
                    owners.pop();
                }
                Event::Start(element) | Event::Empty(element) if element.local_name().as_ref() == b"node" => {
                    let owner = Owner::Node(required_attr(&element, "id")?, Attributes::new());
                    if self_closing {
                        doc.finish(owner)?;
                    } else {
                        owners.push(owner);
                    }
                }
                Event::Start(element) | Event::Empty(element) if element.local_name().as_ref() == b"edge" => {
                    let edge = TopologyEdge {
                        source: required_attr(&element, "source")?,
                        target: required_attr(&element, "target")?,
                        key: optional_attr(&element, "id")?,
                        attributes: Attributes::new(),
                    };
                    if self_closing {
                        doc.finish(Owner::Edge(edge))?;
                    } else {
                        owners.push(Owner::Edge(edge));
                    }
                }
                Event::End(element)
                    if matches!(element.local_name().as_ref(), b"node" | b"edge") =>
                {
                    let owner = owners
                        .pop()
                        .ok_or_else(|| CapacityError::parse("unbalanced graphml element"))?;
                    doc.finish(owner)?;
                }
                Event::Start(element) if element.local_name().as_ref() == b"data" => {
                    data_key = Some(required_attr(&element, "key")?);
                    text.clear();
                }
                Event::Empty(element) if element.local_name().as_ref() == b"data" => {
                    let key = required_attr(&element, "key")?;
                    doc.assign(owners.last_mut(), &key, "")?;
                }
                Event::End(element) if element.local_name().as_ref() == b"data" => {
                    let key = data_key
                        .take()
                        .ok_or_else(|| CapacityError::parse("unbalanced graphml data"))?;
                    let raw = std::mem::take(&mut text);
                    doc.assign(owners.last_mut(), &key, &raw)?;
                }
                Event::Text(content) if data_key.is_some() || in_default => {
                    let unescaped = content
                        .unescape()
                        .map_err(|e| CapacityError::parse(format!("graphml text: {e}")))?;
                    text.push_str(&unescaped);
                }
                Event::CData(content) if data_key.is_some() || in_default => {
                    text.push_str(&String::from_utf8_lossy(&content.into_inner()));
                }
                Event::Eof => break,
                _ => {}
            }
        }
        if !seen_graph {
            return Err(CapacityError::parse("graphml document has no graph element"));
        }
        doc.into_graph()
    }

    fn encode(&self, graph: &TopologyGraph) -> Result<String, CapacityError> {
        let mut specs: BTreeMap<(Domain, String), AttrType> = BTreeMap::new();
        let mut collect = |domain: Domain, attributes: &Attributes| {
            for (name, value) in attributes.iter().filter(|(_, v)| !v.is_null()) {
                let ty = AttrType::of(value);
                match specs.entry((domain, name.clone())) {
                    Entry::Vacant(slot) => {
                        slot.insert(ty);
                    }
                    Entry::Occupied(mut slot) => {
                        let unified = slot.get().unify(ty);
                        slot.insert(unified);
                    }
                }
            }
        };
        collect(Domain::Graph, graph.attributes());
        for node in graph.nodes() {
            collect(Domain::Node, &node.attributes);
        }
        for edge in graph.edges() {
            collect(Domain::Edge, &edge.attributes);
        }

        let mut name_domains: AHashMap<&str, usize> = AHashMap::new();
        for (_, name) in specs.keys() {
            *name_domains.entry(name.as_str()).or_default() += 1;
        }
        let key_ids: AHashMap<(Domain, &str), String> = specs
            .keys()
            .map(|(domain, name)| {
                let id = if name_domains[name.as_str()] > 1 {
                    format!("{name}.{}", domain.as_str())
                } else {
                    name.clone()
                };
                ((*domain, name.as_str()), id)
            })
            .collect();

        let mut out = String::from(GRAPHML_HEADER);
        for ((domain, name), ty) in &specs {
            let _ = writeln!(
                out,
                "  <key id=\"{}\" for=\"{}\" attr.name=\"{}\" attr.type=\"{}\" />",
                escape(&key_ids[&(*domain, name.as_str())]),
                domain.as_str(),
                escape(name),
                ty.as_str()
            );
        }
        let edgedefault = if graph.is_directed() { "directed" } else { "undirected" };
        let _ = writeln!(out, "  <graph edgedefault=\"{edgedefault}\">");
        let write_data = |out: &mut String, indent: &str, domain: Domain, attributes: &Attributes| {
            for (name, value) in attributes.iter().filter(|(_, v)| !v.is_null()) {
                let ty = specs[&(domain, name.clone())];
                let _ = writeln!(
                    out,
                    "{indent}<data key=\"{}\">{}</data>",
                    escape(&key_ids[&(domain, name.as_str())]),
                    escape(&ty.encode(value))
                );
            }
        };
        write_data(&mut out, "    ", Domain::Graph, graph.attributes());
        for node in graph.nodes() {
            if node.attributes.is_empty() {
                let _ = writeln!(out, "    <node id=\"{}\" />", escape(&node.id));
                continue;
            }
            let _ = writeln!(out, "    <node id=\"{}\">", escape(&node.id));
            write_data(&mut out, "      ", Domain::Node, &node.attributes);
            out.push_str("    </node>\n");
        }
        for edge in graph.edges() {
            let _ = write!(
                out,
                "    <edge source=\"{}\" target=\"{}\"",
                escape(&edge.source),
                escape(&edge.target)
            );
            let edge_id = match edge.attributes.get(SCID_ATTR) {
                Some(scid) => Some(flatten_value(scid)),
                None => edge.key.clone(),
            };
            if let Some(id) = edge_id {
                let _ = write!(out, " id=\"{}\"", escape(&id));
            }
            out.push_str(">\n");
            write_data(&mut out, "      ", Domain::Edge, &edge.attributes);
            out.push_str("    </edge>\n");
        }
        out.push_str("  </graph>\n</graphml>\n");
        Ok(out)
    }
}

impl Document {
    fn assign(&mut self, owner: Option<&mut Owner>, key: &str, raw: &str) -> Result<(), CapacityError> {
        let spec = self
            .keys
            .get(key)
            .ok_or_else(|| CapacityError::parse(format!("graphml data references undeclared key '{key}'")))?;
        let value = spec.ty.decode(raw)?;
        let name = spec.name.clone();
        match owner {
            Some(Owner::Node(_, attributes)) => {
                attributes.insert(name, value);
            }
            Some(Owner::Edge(edge)) => {
                edge.attributes.insert(name, value);
            }
            Some(Owner::Graph) => {
                self.attributes.insert(name, value);
            }
            None => return Err(CapacityError::parse("graphml data outside of a graph")),
        }
        Ok(())
    }

    fn finish(&mut self, owner: Owner) -> Result<(), CapacityError> {
        match owner {
            Owner::Node(id, mut attributes) => {
                self.apply_defaults(Domain::Node, &mut attributes)?;
                self.nodes.push((id, attributes));
            }
            Owner::Edge(mut edge) => {
                self.apply_defaults(Domain::Edge, &mut edge.attributes)?;
                // an id mirroring the channel identifier carries no key of its own
                if let (Some(key), Some(Value::String(scid))) = (&edge.key, edge.attributes.get(SCID_ATTR)) {
                    if key == scid {
                        edge.key = None;
                    }
                }
                self.edges.push(edge);
            }
            Owner::Graph => {}
        }
        Ok(())
    }

    fn apply_defaults(&self, domain: Domain, attributes: &mut Attributes) -> Result<(), CapacityError> {
        for spec in self.keys.values() {
            let Some(default) = &spec.default else {
                continue;
            };
            if spec.domain.covers(domain) && !attributes.contains_key(&spec.name) {
                attributes.insert(spec.name.clone(), spec.ty.decode(default)?);
            }
        }
        Ok(())
    }

    fn into_graph(self) -> Result<TopologyGraph, CapacityError> {
        let mut pairs: AHashSet<(&str, &str)> = AHashSet::with_capacity(self.edges.len());
        let mut parallel = false;
        for edge in &self.edges {
            let pair = if self.directed || edge.source <= edge.target {
                (edge.source.as_str(), edge.target.as_str())
            } else {
                (edge.target.as_str(), edge.source.as_str())
            };
            if !pairs.insert(pair) {
                parallel = true;
                break;
            }
        }
        drop(pairs);

        let mut graph = TopologyGraph::new(self.directed, parallel);
        *graph.attributes_mut() = self.attributes;
        for (id, attributes) in self.nodes {
            graph.add_node(id, attributes);
        }
        for edge in self.edges {
            graph.add_edge(edge);
        }
        Ok(graph)
    }
}

fn required_attr(element: &BytesStart<'_>, name: &str) -> Result<String, CapacityError> {
    optional_attr(element, name)?.ok_or_else(|| {
        CapacityError::parse(format!(
            "graphml <{}> is missing '{name}'",
            String::from_utf8_lossy(element.local_name().as_ref())
        ))
    })
}

fn optional_attr(element: &BytesStart<'_>, name: &str) -> Result<Option<String>, CapacityError> {
    for attr in element.attributes() {
        let attr = attr.map_err(|e| CapacityError::parse(format!("graphml attribute: {e}")))?;
        if attr.key.as_ref() == name.as_bytes() {
            let value = attr
                .unescape_value()
                .map_err(|e| CapacityError::parse(format!("graphml attribute: {e}")))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}
