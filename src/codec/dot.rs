use std::{fmt::Write as _, iter::Peekable, str::Chars};

use serde_json::Value;

use super::{GraphCodec, flatten_value, format_real, numeric_or_string};
use crate::{
    errors::CapacityError,
    topology::{Attributes, TopologyEdge, TopologyGraph},
};

const NAME_ATTR: &str = "name";
const KEY_ATTR: &str = "key";

/// Graphviz DOT. Non-strict graphs load as multigraphs.
#[derive(Clone, Copy, Debug, Default)]
pub struct DotCodec;

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Id { text: String, quoted: bool },
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Equals,
    Semi,
    Comma,
    Colon,
    EdgeOp,
}

#[derive(Clone, Default)]
struct Scope {
    node: Attributes,
    edge: Attributes,
}

impl GraphCodec for DotCodec {
    fn decode(&self, input: &str) -> Result<TopologyGraph, CapacityError> {
        let tokens = tokenize(input)?;
        DotParser { tokens, pos: 0 }.parse_graph()
    }

    fn encode(&self, graph: &TopologyGraph) -> Result<String, CapacityError> {
        let mut out = String::new();
        if !graph.is_multigraph() {
            out.push_str("strict ");
        }
        out.push_str(if graph.is_directed() { "digraph" } else { "graph" });
        if let Some(name) = graph.attributes().get(NAME_ATTR) {
            let _ = write!(out, " {}", quote(&flatten_value(name)));
        }
        out.push_str(" {\n");

        let graph_attrs: Attributes = graph
            .attributes()
            .iter()
            .filter(|(key, _)| key.as_str() != NAME_ATTR)
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        if !graph_attrs.is_empty() {
            let _ = writeln!(out, "graph {};", attr_list(&graph_attrs));
        }
        for node in graph.nodes() {
            out.push_str(&quote(&node.id));
            if !node.attributes.is_empty() {
                let _ = write!(out, " {}", attr_list(&node.attributes));
            }
            out.push_str(";\n");
        }
        let op = if graph.is_directed() { "->" } else { "--" };
        for edge in graph.edges() {
            let mut attrs = Attributes::new();
            if graph.is_multigraph() {
                if let Some(key) = &edge.key {
                    attrs.insert(KEY_ATTR.into(), numeric_or_string(key));
                }
            }
            attrs.extend(edge.attributes.iter().map(|(k, v)| (k.clone(), v.clone())));
            let _ = write!(out, "{} {op} {}", quote(&edge.source), quote(&edge.target));
            if !attrs.is_empty() {
                let _ = write!(out, " {}", attr_list(&attrs));
            }
            out.push_str(";\n");
        }
        out.push_str("}\n");
        Ok(out)
    }
}

struct DotParser {
    tokens: Vec<Tok>,
    pos: usize,
}

impl DotParser {
    fn parse_graph(mut self) -> Result<TopologyGraph, CapacityError> {
        let mut strict = false;
        if self.peek_keyword("strict") {
            strict = true;
            self.pos += 1;
        }
        let directed = if self.peek_keyword("digraph") {
            true
        } else if self.peek_keyword("graph") {
            false
        } else {
            return Err(CapacityError::parse("dot input must start with graph or digraph"));
        };
        self.pos += 1;

        let mut graph = TopologyGraph::new(directed, !strict);
        if let Some(Tok::Id { text, .. }) = self.peek().cloned() {
            self.pos += 1;
            graph
                .attributes_mut()
                .insert(NAME_ATTR.into(), Value::String(text));
        }
        self.expect(&Tok::LBrace)?;
        self.parse_stmt_list(&mut graph, Scope::default())?;
        if self.pos != self.tokens.len() {
            return Err(CapacityError::parse("trailing content after dot graph"));
        }
        Ok(graph)
    }

    /// Parses statements up to and including the closing brace.
    fn parse_stmt_list(&mut self, graph: &mut TopologyGraph, mut scope: Scope) -> Result<(), CapacityError> {
        loop {
            match self.peek() {
                None => return Err(CapacityError::parse("dot body is not closed")),
                Some(Tok::RBrace) => {
                    self.pos += 1;
                    return Ok(());
                }
                Some(Tok::Semi) => {
                    self.pos += 1;
                }
                Some(Tok::LBrace) => {
                    self.pos += 1;
                    self.parse_stmt_list(graph, scope.clone())?;
                }
                Some(Tok::Id { .. }) => self.parse_stmt(graph, &mut scope)?,
                Some(other) => {
                    return Err(CapacityError::parse(format!("unexpected {other:?} in dot body")));
                }
            }
        }
    }

    fn parse_stmt(&mut self, graph: &mut TopologyGraph, scope: &mut Scope) -> Result<(), CapacityError> {
        if self.peek_keyword("graph") && self.peek_at(1) == Some(&Tok::LBracket) {
            self.pos += 1;
            let attrs = self.parse_attr_lists()?;
            graph.attributes_mut().extend(attrs);
            return Ok(());
        }
        if self.peek_keyword("node") && self.peek_at(1) == Some(&Tok::LBracket) {
            self.pos += 1;
            let attrs = self.parse_attr_lists()?;
            scope.node.extend(attrs);
            return Ok(());
        }
        if self.peek_keyword("edge") && self.peek_at(1) == Some(&Tok::LBracket) {
            self.pos += 1;
            let attrs = self.parse_attr_lists()?;
            scope.edge.extend(attrs);
            return Ok(());
        }
        if self.peek_keyword("subgraph") {
            self.pos += 1;
            if matches!(self.peek(), Some(Tok::Id { .. })) {
                self.pos += 1;
            }
            self.expect(&Tok::LBrace)?;
            return self.parse_stmt_list(graph, scope.clone());
        }

        let (first, _) = self.take_id()?;
        if self.peek() == Some(&Tok::Equals) {
            self.pos += 1;
            let value = self.take_value()?;
            graph.attributes_mut().insert(first, value);
            return Ok(());
        }
        self.skip_port()?;

        let mut chain = vec![first];
        while self.peek() == Some(&Tok::EdgeOp) {
            self.pos += 1;
            if self.peek() == Some(&Tok::LBrace) || self.peek_keyword("subgraph") {
                return Err(CapacityError::parse("subgraph edge operands are not supported"));
            }
            let (next, _) = self.take_id()?;
            self.skip_port()?;
            chain.push(next);
        }
        let attrs = if self.peek() == Some(&Tok::LBracket) {
            self.parse_attr_lists()?
        } else {
            Attributes::new()
        };

        if chain.len() == 1 {
            let id = chain.remove(0);
            declare_node(graph, scope, &id, attrs);
            return Ok(());
        }
        for id in &chain {
            declare_node(graph, scope, id, Attributes::new());
        }
        for pair in chain.windows(2) {
            let mut attributes = scope.edge.clone();
            attributes.extend(attrs.iter().map(|(k, v)| (k.clone(), v.clone())));
            let key = attributes.remove(KEY_ATTR).map(|k| flatten_value(&k));
            graph.add_edge(TopologyEdge {
                source: pair[0].clone(),
                target: pair[1].clone(),
                key,
                attributes,
            });
        }
        Ok(())
    }

    fn parse_attr_lists(&mut self) -> Result<Attributes, CapacityError> {
        let mut attrs = Attributes::new();
        while self.peek() == Some(&Tok::LBracket) {
            self.pos += 1;
            loop {
                match self.peek() {
                    Some(Tok::RBracket) => {
                        self.pos += 1;
                        break;
                    }
                    Some(Tok::Comma | Tok::Semi) => {
                        self.pos += 1;
                    }
                    Some(Tok::Id { .. }) => {
                        let (name, _) = self.take_id()?;
                        let value = if self.peek() == Some(&Tok::Equals) {
                            self.pos += 1;
                            self.take_value()?
                        } else {
                            Value::Bool(true)
                        };
                        attrs.insert(name, value);
                    }
                    other => {
                        return Err(CapacityError::parse(format!(
                            "unexpected {other:?} in dot attribute list"
                        )));
                    }
                }
            }
        }
        Ok(attrs)
    }

    fn skip_port(&mut self) -> Result<(), CapacityError> {
        for _ in 0..2 {
            if self.peek() != Some(&Tok::Colon) {
                break;
            }
            self.pos += 1;
            self.take_id()?;
        }
        Ok(())
    }

    fn take_value(&mut self) -> Result<Value, CapacityError> {
        let (text, quoted) = self.take_id()?;
        if quoted {
            return Ok(Value::String(text));
        }
        Ok(match text.as_str() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => numeric_or_string(&text),
        })
    }

    fn take_id(&mut self) -> Result<(String, bool), CapacityError> {
        match self.tokens.get(self.pos).cloned() {
            Some(Tok::Id { text, quoted }) => {
                self.pos += 1;
                Ok((text, quoted))
            }
            other => Err(CapacityError::parse(format!(
                "expected dot identifier, found {other:?}"
            ))),
        }
    }

    fn expect(&mut self, tok: &Tok) -> Result<(), CapacityError> {
        if self.peek() == Some(tok) {
            self.pos += 1;
            Ok(())
        } else {
            Err(CapacityError::parse(format!(
                "expected {tok:?}, found {:?}",
                self.peek()
            )))
        }
    }

    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Tok> {
        self.tokens.get(self.pos + offset)
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Tok::Id { text, quoted: false }) if text.eq_ignore_ascii_case(keyword))
    }
}

fn declare_node(graph: &mut TopologyGraph, scope: &Scope, id: &str, attrs: Attributes) {
    if graph.contains_node(id) {
        graph.add_node(id, attrs);
    } else {
        let mut attributes = scope.node.clone();
        attributes.extend(attrs);
        graph.add_node(id, attributes);
    }
}

fn attr_list(attrs: &Attributes) -> String {
    let rendered: Vec<String> = attrs
        .iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(key, value)| format!("{}={}", id_text(key), render_value(value)))
        .collect();
    format!("[{}]", rendered.join(", "))
}

fn render_value(value: &Value) -> String {
    match value {
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => match number.as_i64() {
            Some(int) => int.to_string(),
            None => format_real(number.as_f64().unwrap_or_default()),
        },
        Value::String(text) => quote(text),
        other => quote(&other.to_string()),
    }
}

fn id_text(text: &str) -> String {
    let mut chars = text.chars();
    let plain = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if plain { text.to_string() } else { quote(text) }
}

fn quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        if matches!(c, '"' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

fn tokenize(input: &str) -> Result<Vec<Tok>, CapacityError> {
    let mut tokens: Vec<Tok> = Vec::new();
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => {}
            '#' => skip_line(&mut chars),
            '/' if chars.peek() == Some(&'/') => skip_line(&mut chars),
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                loop {
                    match chars.next() {
                        Some('/') if prev == '*' => break,
                        Some(next) => prev = next,
                        None => return Err(CapacityError::parse("unterminated dot comment")),
                    }
                }
            }
            '{' => tokens.push(Tok::LBrace),
            '}' => tokens.push(Tok::RBrace),
            '[' => tokens.push(Tok::LBracket),
            ']' => tokens.push(Tok::RBracket),
            '=' => tokens.push(Tok::Equals),
            ';' => tokens.push(Tok::Semi),
            ',' => tokens.push(Tok::Comma),
            ':' => tokens.push(Tok::Colon),
            '-' if matches!(chars.peek(), Some('>' | '-')) => {
                chars.next();
                tokens.push(Tok::EdgeOp);
            }
            '"' => {
                let text = read_quoted(&mut chars)?;
                // "a" + "b" concatenation
                if joins_previous(&tokens) {
                    tokens.pop();
                    if let Some(Tok::Id { text: prev, .. }) = tokens.last_mut() {
                        prev.push_str(&text);
                    }
                } else {
                    tokens.push(Tok::Id { text, quoted: true });
                }
            }
            '+' => tokens.push(Tok::Id {
                text: "+".into(),
                quoted: false,
            }),
            '<' => tokens.push(Tok::Id {
                text: read_html(&mut chars)?,
                quoted: true,
            }),
            c if c.is_ascii_digit() || c == '.' || c == '-' => {
                let mut text = c.to_string();
                while let Some(&next) = chars.peek() {
                    if !(next.is_ascii_digit() || next == '.') {
                        break;
                    }
                    text.push(next);
                    chars.next();
                }
                tokens.push(Tok::Id { text, quoted: false });
            }
            c if c.is_alphabetic() || c == '_' || !c.is_ascii() => {
                let mut text = c.to_string();
                while let Some(&next) = chars.peek() {
                    if !(next.is_alphanumeric() || next == '_' || !next.is_ascii()) {
                        break;
                    }
                    text.push(next);
                    chars.next();
                }
                tokens.push(Tok::Id { text, quoted: false });
            }
            other => {
                return Err(CapacityError::parse(format!("unexpected character '{other}' in dot")));
            }
        }
    }
    Ok(tokens)
}

fn joins_previous(tokens: &[Tok]) -> bool {
    match tokens {
        [.., Tok::Id { quoted: true, .. }, Tok::Id { text, quoted: false }] => text == "+",
        _ => false,
    }
}

fn read_quoted(chars: &mut Peekable<Chars<'_>>) -> Result<String, CapacityError> {
    let mut text = String::new();
    while let Some(c) = chars.next() {
        match c {
            '"' => return Ok(text),
            '\\' => match chars.next() {
                Some('"') => text.push('"'),
                Some('\\') => text.push('\\'),
                Some('\n') => {}
                Some(other) => {
                    text.push('\\');
                    text.push(other);
                }
                None => break,
            },
            other => text.push(other),
        }
    }
    Err(CapacityError::parse("unterminated dot string"))
}

fn read_html(chars: &mut Peekable<Chars<'_>>) -> Result<String, CapacityError> {
    let mut depth = 1usize;
    let mut text = String::new();
    for c in chars.by_ref() {
        match c {
            '<' => depth += 1,
            '>' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(text);
                }
            }
            _ => {}
        }
        text.push(c);
    }
    Err(CapacityError::parse("unterminated dot html string"))
}

fn skip_line(chars: &mut Peekable<Chars<'_>>) {
    for c in chars.by_ref() {
        if c == '\n' {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_chains_and_defaults() {
        let doc = r#"
            // channel graph
            digraph lightning {
                edge [fee=1];
                a -> b -> c [scid="1x1x1/0"];
                "c" [alias="carol"];
            }
        "#;
        let graph = DotCodec.decode(doc).unwrap();
        assert!(graph.is_directed() && graph.is_multigraph());
        assert_eq!(graph.edge_count(), 2);
        assert_eq!(graph.edges()[1].attributes["fee"], json!(1));
        assert_eq!(graph.node("c").unwrap().attributes["alias"], json!("carol"));
        assert_eq!(graph.attributes()["name"], json!("lightning"));
    }

    #[test]
    fn quoted_values_stay_strings() {
        let doc = r#"strict graph { a -- b [weight="5", capacity=5, open=true]; }"#;
        let graph = DotCodec.decode(doc).unwrap();
        let attrs = &graph.edges()[0].attributes;
        assert_eq!(attrs["weight"], json!("5"));
        assert_eq!(attrs["capacity"], json!(5));
        assert_eq!(attrs["open"], json!(true));
        assert!(!graph.is_multigraph());
    }

    #[test]
    fn escapes_survive_reencoding() {
        let mut graph = TopologyGraph::new(true, true);
        graph.add_edge(TopologyEdge::new("a\"b", "c\\").with_attr("note", json!("say \"hi\"")));
        let decoded = DotCodec.decode(&DotCodec.encode(&graph).unwrap()).unwrap();
        assert_eq!(decoded.edges()[0].source, "a\"b");
        assert_eq!(decoded.edges()[0].target, "c\\");
        assert_eq!(decoded.edges()[0].attributes["note"], json!("say \"hi\""));
    }
}
