//! Graph serialization grammars.
//!
//! Each grammar implements [`GraphCodec`]; [`GraphFormat`] resolves the codec
//! once from its tag so callers never branch on the format themselves.

mod dot;
mod gml;
mod graphml;
mod json;

use std::{fmt, fs, path::Path, str::FromStr};

use serde_json::{Number, Value};

use crate::{errors::CapacityError, topology::TopologyGraph};

pub use dot::DotCodec;
pub use gml::GmlCodec;
pub use graphml::GraphMlCodec;
pub use json::JsonCodec;

pub trait GraphCodec {
    fn decode(&self, input: &str) -> Result<TopologyGraph, CapacityError>;
    fn encode(&self, graph: &TopologyGraph) -> Result<String, CapacityError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum GraphFormat {
    Dot,
    #[default]
    Gml,
    GraphMl,
    JsonNodeLink,
}

impl GraphFormat {
    pub fn codec(self) -> &'static dyn GraphCodec {
        match self {
            GraphFormat::Dot => &DotCodec,
            GraphFormat::Gml => &GmlCodec,
            GraphFormat::GraphMl => &GraphMlCodec,
            GraphFormat::JsonNodeLink => &JsonCodec,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GraphFormat::Dot => "dot",
            GraphFormat::Gml => "gml",
            GraphFormat::GraphMl => "graphml",
            GraphFormat::JsonNodeLink => "json",
        }
    }
}

impl fmt::Display for GraphFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GraphFormat {
    type Err = CapacityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "dot" => Ok(GraphFormat::Dot),
            "gml" => Ok(GraphFormat::Gml),
            "graphml" => Ok(GraphFormat::GraphMl),
            "json" | "json-node-link" => Ok(GraphFormat::JsonNodeLink),
            other => Err(CapacityError::unsupported_format(other)),
        }
    }
}

pub fn load<P: AsRef<Path>>(path: P, format: GraphFormat) -> Result<TopologyGraph, CapacityError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)
        .map_err(|e| CapacityError::io(format!("{}: {e}", path.display())))?;
    format.codec().decode(&contents)
}

pub fn save<P: AsRef<Path>>(
    graph: &TopologyGraph,
    path: P,
    format: GraphFormat,
) -> Result<(), CapacityError> {
    let path = path.as_ref();
    let encoded = format.codec().encode(graph)?;
    fs::write(path, encoded).map_err(|e| CapacityError::io(format!("{}: {e}", path.display())))
}

/// Types an unquoted token: integers, then reals, then the raw string.
pub(crate) fn numeric_or_string(token: &str) -> Value {
    if let Ok(int) = token.parse::<i64>() {
        return Value::Number(int.into());
    }
    if looks_like_real(token) {
        if let Some(number) = token.parse::<f64>().ok().and_then(Number::from_f64) {
            return Value::Number(number);
        }
    }
    Value::String(token.to_string())
}

/// Renders a scalar for grammars without a native nested value type.
pub(crate) fn flatten_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub(crate) fn format_real(value: f64) -> String {
    let text = value.to_string();
    if text.contains(['.', 'e', 'E']) {
        text
    } else {
        format!("{text}.0")
    }
}

fn looks_like_real(token: &str) -> bool {
    let body = token.strip_prefix(['-', '+']).unwrap_or(token);
    !body.is_empty()
        && body.starts_with(|c: char| c.is_ascii_digit() || c == '.')
        && body
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '-' | '+'))
}
