use std::{fmt::Write as _, iter::Peekable, str::Chars};

use ahash::AHashMap;
use serde_json::{Map, Number, Value};

use super::{GraphCodec, format_real};
use crate::{
    errors::CapacityError,
    topology::{Attributes, TopologyEdge, TopologyGraph},
};

/// Graph Modelling Language. Node `label` is the node id; `key` is the edge key.
#[derive(Clone, Copy, Debug, Default)]
pub struct GmlCodec;

#[derive(Debug, Clone, PartialEq)]
enum GmlValue {
    Int(i64),
    Real(f64),
    Str(String),
    List(Vec<(String, GmlValue)>),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Key(String),
    Int(i64),
    Real(f64),
    Str(String),
    Open,
    Close,
}

impl GraphCodec for GmlCodec {
    fn decode(&self, input: &str) -> Result<TopologyGraph, CapacityError> {
        let tokens = tokenize(input)?;
        let mut iter = tokens.into_iter().peekable();
        let document = parse_list(&mut iter, false)?;
        let body = document
            .into_iter()
            .find_map(|(key, value)| match (key.as_str(), value) {
                ("graph", GmlValue::List(items)) => Some(items),
                _ => None,
            })
            .ok_or_else(|| CapacityError::parse("gml document has no graph list"))?;
        build_graph(body)
    }

    fn encode(&self, graph: &TopologyGraph) -> Result<String, CapacityError> {
        let mut out = String::from("graph [\n");
        if graph.is_directed() {
            out.push_str("  directed 1\n");
        }
        if graph.is_multigraph() {
            out.push_str("  multigraph 1\n");
        }
        write_attributes(&mut out, 1, graph.attributes(), &["directed", "multigraph"])?;

        let mut ids: AHashMap<&str, usize> = AHashMap::with_capacity(graph.node_count());
        for (idx, node) in graph.nodes().iter().enumerate() {
            ids.insert(node.id.as_str(), idx);
            out.push_str("  node [\n");
            let _ = writeln!(out, "    id {idx}");
            let _ = writeln!(out, "    label {}", quote(&node.id));
            write_attributes(&mut out, 2, &node.attributes, &["id", "label"])?;
            out.push_str("  ]\n");
        }
        for edge in graph.edges() {
            let (Some(source), Some(target)) =
                (ids.get(edge.source.as_str()), ids.get(edge.target.as_str()))
            else {
                return Err(CapacityError::parse(format!(
                    "edge {}->{} references an unknown node",
                    edge.source, edge.target
                )));
            };
            out.push_str("  edge [\n");
            let _ = writeln!(out, "    source {source}");
            let _ = writeln!(out, "    target {target}");
            if let Some(key) = &edge.key {
                match key.parse::<i64>() {
                    Ok(int) => {
                        let _ = writeln!(out, "    key {int}");
                    }
                    Err(_) => {
                        let _ = writeln!(out, "    key {}", quote(key));
                    }
                }
            }
            write_attributes(&mut out, 2, &edge.attributes, &["source", "target", "key"])?;
            out.push_str("  ]\n");
        }
        out.push_str("]\n");
        Ok(out)
    }
}

fn build_graph(body: Vec<(String, GmlValue)>) -> Result<TopologyGraph, CapacityError> {
    let mut directed = false;
    let mut multigraph = false;
    let mut graph_attrs = Vec::new();
    let mut nodes = Vec::new();
    let mut edges = Vec::new();
    for (key, value) in body {
        match (key.as_str(), value) {
            ("directed", GmlValue::Int(flag)) => directed = flag != 0,
            ("multigraph", GmlValue::Int(flag)) => multigraph = flag != 0,
            ("node", GmlValue::List(items)) => nodes.push(items),
            ("edge", GmlValue::List(items)) => edges.push(items),
            ("node" | "edge", _) => {
                return Err(CapacityError::parse(format!("gml {key} must be a list")));
            }
            (other, value) => graph_attrs.push((other.to_string(), value)),
        }
    }

    let mut graph = TopologyGraph::new(directed, multigraph);
    *graph.attributes_mut() = to_attributes(graph_attrs);

    let mut names: AHashMap<String, String> = AHashMap::new();
    for items in nodes {
        let mut gml_id = None;
        let mut label = None;
        let mut rest = Vec::new();
        for (key, value) in items {
            match key.as_str() {
                "id" => gml_id = Some(scalar_text(&value)?),
                "label" => label = Some(scalar_text(&value)?),
                _ => rest.push((key, value)),
            }
        }
        let gml_id = gml_id.ok_or_else(|| CapacityError::parse("gml node without id"))?;
        let name = label.unwrap_or_else(|| gml_id.clone());
        if names.insert(gml_id.clone(), name.clone()).is_some() {
            return Err(CapacityError::parse(format!("duplicate gml node id {gml_id}")));
        }
        graph.add_node(name, to_attributes(rest));
    }

    for items in edges {
        let mut source = None;
        let mut target = None;
        let mut edge_key = None;
        let mut rest = Vec::new();
        for (key, value) in items {
            match key.as_str() {
                "source" => source = Some(scalar_text(&value)?),
                "target" => target = Some(scalar_text(&value)?),
                "key" => edge_key = Some(scalar_text(&value)?),
                _ => rest.push((key, value)),
            }
        }
        let resolve = |endpoint: Option<String>, field: &str| -> Result<String, CapacityError> {
            let id = endpoint
                .ok_or_else(|| CapacityError::parse(format!("gml edge without {field}")))?;
            names
                .get(&id)
                .cloned()
                .ok_or_else(|| CapacityError::parse(format!("gml edge {field} {id} is not a node")))
        };
        let edge = TopologyEdge {
            source: resolve(source, "source")?,
            target: resolve(target, "target")?,
            key: edge_key,
            attributes: to_attributes(rest),
        };
        graph.add_edge(edge);
    }
    Ok(graph)
}

fn to_attributes(items: Vec<(String, GmlValue)>) -> Attributes {
    let mut map = Map::new();
    for (key, value) in items {
        let value = to_json(value);
        match map.get_mut(&key) {
            Some(Value::Array(existing)) => existing.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                map.insert(key, value);
            }
        }
    }
    map
}

fn to_json(value: GmlValue) -> Value {
    match value {
        GmlValue::Int(int) => Value::from(int),
        GmlValue::Real(real) => Number::from_f64(real)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(real.to_string())),
        GmlValue::Str(text) => Value::String(text),
        GmlValue::List(items) => Value::Object(to_attributes(items)),
    }
}

fn scalar_text(value: &GmlValue) -> Result<String, CapacityError> {
    match value {
        GmlValue::Int(int) => Ok(int.to_string()),
        GmlValue::Str(text) => Ok(text.clone()),
        GmlValue::Real(real) => Ok(real.to_string()),
        GmlValue::List(_) => Err(CapacityError::parse("gml identifier must be a scalar")),
    }
}

fn write_attributes(
    out: &mut String,
    depth: usize,
    attributes: &Attributes,
    reserved: &[&str],
) -> Result<(), CapacityError> {
    for (key, value) in attributes {
        if reserved.contains(&key.as_str()) {
            return Err(CapacityError::parse(format!(
                "attribute '{key}' collides with a gml structural key"
            )));
        }
        write_entry(out, depth, key, value)?;
    }
    Ok(())
}

fn write_entry(out: &mut String, depth: usize, key: &str, value: &Value) -> Result<(), CapacityError> {
    if !valid_key(key) {
        return Err(CapacityError::parse(format!("'{key}' is not a valid gml key")));
    }
    let indent = "  ".repeat(depth);
    match value {
        Value::Null => {}
        Value::Bool(flag) => {
            let _ = writeln!(out, "{indent}{key} {}", u8::from(*flag));
        }
        Value::Number(number) => match number.as_i64() {
            Some(int) => {
                let _ = writeln!(out, "{indent}{key} {int}");
            }
            None => {
                let real = number.as_f64().unwrap_or_default();
                let _ = writeln!(out, "{indent}{key} {}", format_real(real));
            }
        },
        Value::String(text) => {
            let _ = writeln!(out, "{indent}{key} {}", quote(text));
        }
        Value::Array(items) => {
            for item in items {
                match item {
                    Value::Array(_) => {
                        let _ = writeln!(out, "{indent}{key} {}", quote(&item.to_string()));
                    }
                    other => write_entry(out, depth, key, other)?,
                }
            }
        }
        Value::Object(map) => {
            let _ = writeln!(out, "{indent}{key} [");
            for (inner_key, inner) in map {
                write_entry(out, depth + 1, inner_key, inner)?;
            }
            let _ = writeln!(out, "{indent}]");
        }
    }
    Ok(())
}

fn valid_key(key: &str) -> bool {
    let mut chars = key.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("&#34;"),
            '&' => out.push_str("&#38;"),
            c if c.is_ascii() && !c.is_ascii_control() => out.push(c),
            c => {
                let _ = write!(out, "&#{};", c as u32);
            }
        }
    }
    out.push('"');
    out
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        match tail.find(';').and_then(|end| decode_entity(&tail[1..end]).map(|c| (c, end))) {
            Some((c, end)) => {
                out.push(c);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(entity: &str) -> Option<char> {
    match entity {
        "quot" => Some('"'),
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "apos" => Some('\''),
        _ => {
            let code = entity.strip_prefix('#')?;
            let value = match code.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => code.parse::<u32>().ok()?,
            };
            char::from_u32(value)
        }
    }
}

fn parse_list<I>(tokens: &mut Peekable<I>, nested: bool) -> Result<Vec<(String, GmlValue)>, CapacityError>
where
    I: Iterator<Item = Token>,
{
    let mut items = Vec::new();
    loop {
        let key = match tokens.next() {
            Some(Token::Key(key)) => key,
            Some(Token::Close) if nested => return Ok(items),
            None if !nested => return Ok(items),
            None => return Err(CapacityError::parse("gml list is not closed")),
            Some(other) => {
                return Err(CapacityError::parse(format!("expected gml key, found {other:?}")));
            }
        };
        let value = match tokens.next() {
            Some(Token::Int(int)) => GmlValue::Int(int),
            Some(Token::Real(real)) => GmlValue::Real(real),
            Some(Token::Str(text)) => GmlValue::Str(text),
            Some(Token::Open) => GmlValue::List(parse_list(tokens, true)?),
            Some(Token::Key(word)) if matches!(word.as_str(), "INF" | "NAN") => {
                GmlValue::Str(word)
            }
            other => {
                return Err(CapacityError::parse(format!(
                    "gml key '{key}' has no value (found {other:?})"
                )));
            }
        };
        items.push((key, value));
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, CapacityError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '#' => {
                for skipped in chars.by_ref() {
                    if skipped == '\n' {
                        break;
                    }
                }
            }
            '[' => {
                chars.next();
                tokens.push(Token::Open);
            }
            ']' => {
                chars.next();
                tokens.push(Token::Close);
            }
            '"' => {
                chars.next();
                tokens.push(Token::Str(read_string(&mut chars)?));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let word = take_while(&mut chars, |c| c.is_ascii_alphanumeric() || c == '_');
                tokens.push(Token::Key(word));
            }
            c if c.is_ascii_digit() || matches!(c, '-' | '+' | '.') => {
                let word = take_while(&mut chars, |c| {
                    c.is_ascii_alphanumeric() || matches!(c, '-' | '+' | '.')
                });
                tokens.push(number_token(&word)?);
            }
            other => {
                return Err(CapacityError::parse(format!("unexpected character '{other}' in gml")));
            }
        }
    }
    Ok(tokens)
}

fn number_token(word: &str) -> Result<Token, CapacityError> {
    if let Ok(int) = word.parse::<i64>() {
        return Ok(Token::Int(int));
    }
    let real = match word.trim_start_matches('+') {
        "INF" => f64::INFINITY,
        "-INF" => f64::NEG_INFINITY,
        other => other
            .parse::<f64>()
            .map_err(|_| CapacityError::parse(format!("invalid gml number '{word}'")))?,
    };
    Ok(Token::Real(real))
}

fn read_string(chars: &mut Peekable<Chars<'_>>) -> Result<String, CapacityError> {
    let mut raw = String::new();
    for c in chars.by_ref() {
        if c == '"' {
            return Ok(unescape(&raw));
        }
        raw.push(c);
    }
    Err(CapacityError::parse("unterminated gml string"))
}

fn take_while(chars: &mut Peekable<Chars<'_>>, accept: impl Fn(char) -> bool) -> String {
    let mut word = String::new();
    while let Some(&c) = chars.peek() {
        if !accept(c) {
            break;
        }
        word.push(c);
        chars.next();
    }
    word
}
