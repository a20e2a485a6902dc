//! Reader and writer for the DOT graph description language.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt::Write as _;
use thiserror::Error;

use super::{AttrTarget, AttrValue, EdgeId, GraphModel, ModelError, NodeId, Scope, SubgraphId};

static PLAIN_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_\x{80}-\x{10FFFF}][A-Za-z_0-9\x{80}-\x{10FFFF}]*$").unwrap());
static NUMERAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-?(\.[0-9]+|[0-9]+(\.[0-9]*)?)$").unwrap());

const KEYWORDS: &[&str] = &["strict", "graph", "digraph", "node", "edge", "subgraph"];

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DotError {
    #[error("syntax error on line {line}: {message}")]
    Syntax { line: usize, message: String },
    #[error(transparent)]
    Model(#[from] ModelError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IdKind {
    Plain,
    Quoted,
    Html,
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Id(String, IdKind),
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

#[derive(Debug, Clone)]
struct Token {
    tok: Tok,
    line: usize,
}

fn syntax(line: usize, message: impl Into<String>) -> DotError {
    DotError::Syntax {
        line,
        message: message.into(),
    }
}

fn is_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || !c.is_ascii()
}

fn tokenize(input: &str) -> Result<Vec<Token>, DotError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    let mut line = 1;
    let mut at_line_start = true;

    while i < chars.len() {
        let c = chars[i];
        if c == '\n' {
            line += 1;
            at_line_start = true;
            i += 1;
            continue;
        }
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        // `#` lines are preprocessor output and ignored.
        if c == '#' && at_line_start {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
            continue;
        }
        at_line_start = false;
        let next = chars.get(i + 1).copied();
        if c == '/' && next == Some('/') {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
            continue;
        }
        if c == '/' && next == Some('*') {
            let start = line;
            i += 2;
            loop {
                match chars.get(i) {
                    None => return Err(syntax(start, "unterminated comment")),
                    Some('*') if chars.get(i + 1) == Some(&'/') => {
                        i += 2;
                        break;
                    }
                    Some('\n') => line += 1,
                    _ => {}
                }
                i += 1;
            }
            continue;
        }

        let token_line = line;
        let tok = match c {
            '{' => Tok::LBrace,
            '}' => Tok::RBrace,
            '[' => Tok::LBracket,
            ']' => Tok::RBracket,
            '=' => Tok::Equals,
            ';' => Tok::Semi,
            ',' => Tok::Comma,
            ':' => Tok::Colon,
            '-' if matches!(next, Some('-') | Some('>')) => {
                i += 1;
                Tok::EdgeOp
            }
            '"' => {
                let mut text = String::new();
                i = read_quoted(&chars, i, &mut line, &mut text)?;
                // "a" + "b" concatenation
                loop {
                    let mut j = i;
                    let mut extra_lines = 0;
                    while j < chars.len() && chars[j].is_whitespace() {
                        if chars[j] == '\n' {
                            extra_lines += 1;
                        }
                        j += 1;
                    }
                    if chars.get(j) != Some(&'+') {
                        break;
                    }
                    j += 1;
                    while j < chars.len() && chars[j].is_whitespace() {
                        if chars[j] == '\n' {
                            extra_lines += 1;
                        }
                        j += 1;
                    }
                    if chars.get(j) != Some(&'"') {
                        break;
                    }
                    line += extra_lines;
                    i = read_quoted(&chars, j, &mut line, &mut text)?;
                }
                tokens.push(Token {
                    tok: Tok::Id(text, IdKind::Quoted),
                    line: token_line,
                });
                continue;
            }
            '<' => {
                let mut depth = 0usize;
                let mut text = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err(syntax(token_line, "unterminated HTML string")),
                        Some('>') if depth == 0 => break,
                        Some(&ch) => {
                            match ch {
                                '<' => depth += 1,
                                '>' => depth -= 1,
                                '\n' => line += 1,
                                _ => {}
                            }
                            text.push(ch);
                        }
                    }
                    i += 1;
                }
                i += 1;
                tokens.push(Token {
                    tok: Tok::Id(text, IdKind::Html),
                    line: token_line,
                });
                continue;
            }
            c if c == '-' || c == '.' || c.is_ascii_digit() => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                if !NUMERAL_RE.is_match(&text) {
                    return Err(syntax(token_line, format!("invalid number `{text}`")));
                }
                tokens.push(Token {
                    tok: Tok::Id(text, IdKind::Plain),
                    line: token_line,
                });
                continue;
            }
            c if is_id_char(c) => {
                let start = i;
                while i < chars.len() && is_id_char(chars[i]) {
                    i += 1;
                }
                tokens.push(Token {
                    tok: Tok::Id(chars[start..i].iter().collect(), IdKind::Plain),
                    line: token_line,
                });
                continue;
            }
            other => return Err(syntax(token_line, format!("unexpected character `{other}`"))),
        };
        tokens.push(Token {
            tok,
            line: token_line,
        });
        i += 1;
    }
    Ok(tokens)
}

/// Reads a quoted string starting at the opening quote, appending its body to
/// `out`. Returns the index after the closing quote.
fn read_quoted(
    chars: &[char],
    start: usize,
    line: &mut usize,
    out: &mut String,
) -> Result<usize, DotError> {
    let open_line = *line;
    let mut i = start + 1;
    loop {
        match chars.get(i) {
            None => return Err(syntax(open_line, "unterminated string")),
            Some('"') => return Ok(i + 1),
            Some('\\') => match chars.get(i + 1) {
                Some(&c @ ('"' | '\\')) => {
                    out.push(c);
                    i += 2;
                }
                Some('\n') => {
                    *line += 1;
                    i += 2;
                }
                Some('\r') if chars.get(i + 2) == Some(&'\n') => {
                    *line += 1;
                    i += 3;
                }
                _ => {
                    out.push('\\');
                    i += 1;
                }
            },
            Some(&ch) => {
                if ch == '\n' {
                    *line += 1;
                }
                out.push(ch);
                i += 1;
            }
        }
    }
}

type AttrList = Vec<(String, AttrValue)>;

/// Node/edge defaults declared inside a subgraph body; they apply to elements
/// created in that body.
#[derive(Clone, Default)]
struct LocalDefaults {
    node: AttrList,
    edge: AttrList,
}

enum Operand {
    Node(NodeId, Option<String>),
    Subgraph(SubgraphId),
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    model: GraphModel,
}

impl Parser {
    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos).map(|t| &t.tok)
    }

    fn peek_at(&self, offset: usize) -> Option<&Tok> {
        self.tokens.get(self.pos + offset).map(|t| &t.tok)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|t| t.line)
            .unwrap_or(1)
    }

    fn advance(&mut self) -> Option<Tok> {
        let tok = self.tokens.get(self.pos).map(|t| t.tok.clone());
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.peek() == Some(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: Tok, what: &str) -> Result<(), DotError> {
        if self.eat(&tok) {
            Ok(())
        } else {
            Err(syntax(self.line(), format!("expected {what}")))
        }
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Tok::Id(s, IdKind::Plain)) if s.eq_ignore_ascii_case(keyword))
    }

    fn id(&mut self, what: &str) -> Result<(String, IdKind), DotError> {
        match self.peek() {
            Some(Tok::Id(..)) => match self.advance() {
                Some(Tok::Id(s, kind)) => Ok((s, kind)),
                _ => Err(syntax(self.line(), format!("expected {what}"))),
            },
            _ => Err(syntax(self.line(), format!("expected {what}"))),
        }
    }

    fn graph(mut self) -> Result<GraphModel, DotError> {
        let strict = self.peek_keyword("strict");
        if strict {
            self.pos += 1;
        }
        let directed = if self.peek_keyword("digraph") {
            true
        } else if self.peek_keyword("graph") {
            false
        } else {
            return Err(syntax(self.line(), "expected `graph` or `digraph`"));
        };
        self.pos += 1;
        let name = match self.peek() {
            Some(Tok::Id(..)) => self.id("graph name")?.0,
            _ => String::new(),
        };
        self.model = GraphModel::new(&name, directed);
        self.model.set_strict(strict);
        self.expect(Tok::LBrace, "`{`")?;
        let mut defaults = LocalDefaults::default();
        self.stmt_list(None, &mut defaults)?;
        self.expect(Tok::RBrace, "`}`")?;
        Ok(self.model)
    }

    fn stmt_list(
        &mut self,
        current: Option<SubgraphId>,
        defaults: &mut LocalDefaults,
    ) -> Result<(), DotError> {
        loop {
            match self.peek() {
                None | Some(Tok::RBrace) => return Ok(()),
                Some(Tok::Semi) => {
                    self.pos += 1;
                }
                _ => self.stmt(current, defaults)?,
            }
        }
    }

    fn stmt(
        &mut self,
        current: Option<SubgraphId>,
        defaults: &mut LocalDefaults,
    ) -> Result<(), DotError> {
        for (keyword, scope) in [("graph", Scope::Graph), ("node", Scope::Node), ("edge", Scope::Edge)] {
            if self.peek_keyword(keyword) && self.peek_at(1) == Some(&Tok::LBracket) {
                self.pos += 1;
                let attrs = self.attr_lists()?;
                self.attr_stmt(scope, attrs, current, defaults)?;
                return Ok(());
            }
        }
        if matches!(self.peek(), Some(Tok::Id(..))) && self.peek_at(1) == Some(&Tok::Equals) {
            let (key, _) = self.id("attribute name")?;
            self.pos += 1;
            let value = self.value()?;
            self.attr_stmt(Scope::Graph, vec![(key, value)], current, defaults)?;
            return Ok(());
        }

        let first = self.operand(current, defaults)?;
        if self.peek() == Some(&Tok::EdgeOp) {
            let mut operands = vec![first];
            while self.eat(&Tok::EdgeOp) {
                operands.push(self.operand(current, defaults)?);
            }
            let attrs = if self.peek() == Some(&Tok::LBracket) {
                self.attr_lists()?
            } else {
                Vec::new()
            };
            self.edge_chain(&operands, &attrs, defaults)?;
        } else if let Operand::Node(node, _) = first
            && self.peek() == Some(&Tok::LBracket)
        {
            let attrs = self.attr_lists()?;
            for (key, value) in attrs {
                self.model.set_attr(AttrTarget::Node(node), &key, value)?;
            }
        }
        Ok(())
    }

    fn attr_stmt(
        &mut self,
        scope: Scope,
        attrs: AttrList,
        current: Option<SubgraphId>,
        defaults: &mut LocalDefaults,
    ) -> Result<(), DotError> {
        for (key, value) in attrs {
            match (scope, current) {
                (Scope::Graph, Some(sub)) => {
                    self.model.set_attr(AttrTarget::Subgraph(sub), &key, value)?
                }
                (_, None) => self.model.set_default(scope, &key, value),
                (Scope::Node, Some(_)) => upsert(&mut defaults.node, key, value),
                (Scope::Edge, Some(_)) => upsert(&mut defaults.edge, key, value),
            }
        }
        Ok(())
    }

    fn operand(
        &mut self,
        current: Option<SubgraphId>,
        defaults: &LocalDefaults,
    ) -> Result<Operand, DotError> {
        if self.peek_keyword("subgraph") || self.peek() == Some(&Tok::LBrace) {
            return Ok(Operand::Subgraph(self.subgraph(current, defaults)?));
        }
        let (name, _) = self.id("node identifier")?;
        let mut port = None;
        if self.eat(&Tok::Colon) {
            let (p, _) = self.id("port")?;
            port = Some(p);
            if self.eat(&Tok::Colon) {
                let (compass, _) = self.id("compass point")?;
                port = port.map(|p| format!("{p}:{compass}"));
            }
        }
        let node = self.node(&name, current, defaults)?;
        Ok(Operand::Node(node, port))
    }

    fn node(
        &mut self,
        name: &str,
        current: Option<SubgraphId>,
        defaults: &LocalDefaults,
    ) -> Result<NodeId, DotError> {
        let node = match self.model.node_id(name) {
            Some(node) => node,
            None => {
                let node = self.model.add_node(Some(name))?;
                for (key, value) in &defaults.node {
                    self.model
                        .set_attr(AttrTarget::Node(node), key, value.clone())?;
                }
                node
            }
        };
        if let Some(sub) = current {
            self.model.add_node_to_subgraph(sub, node)?;
        }
        Ok(node)
    }

    fn subgraph(
        &mut self,
        parent: Option<SubgraphId>,
        defaults: &LocalDefaults,
    ) -> Result<SubgraphId, DotError> {
        let mut name = String::new();
        if self.peek_keyword("subgraph") {
            self.pos += 1;
            if matches!(self.peek(), Some(Tok::Id(..))) {
                name = self.id("subgraph name")?.0;
            }
        }
        let sub = match (name.is_empty(), self.model.subgraph_id(&name)) {
            (false, Some(existing)) => existing,
            _ => self.model.add_subgraph(parent, &name)?,
        };
        if self.peek() == Some(&Tok::LBrace) {
            self.pos += 1;
            let mut local = defaults.clone();
            self.stmt_list(Some(sub), &mut local)?;
            self.expect(Tok::RBrace, "`}`")?;
        }
        if let Some(parent) = parent {
            for node in self.model.subgraph_nodes(sub).to_vec() {
                self.model.add_node_to_subgraph(parent, node)?;
            }
        }
        Ok(sub)
    }

    fn edge_chain(
        &mut self,
        operands: &[Operand],
        attrs: &AttrList,
        defaults: &LocalDefaults,
    ) -> Result<(), DotError> {
        for pair in operands.windows(2) {
            let tails = self.operand_nodes(&pair[0]);
            let heads = self.operand_nodes(&pair[1]);
            for (tail, tail_port) in &tails {
                for (head, head_port) in &heads {
                    let edge = self.edge(*tail, *head)?;
                    let target = AttrTarget::Edge(edge);
                    for (key, value) in defaults.edge.iter().chain(attrs.iter()) {
                        self.model.set_attr(target, key, value.clone())?;
                    }
                    if let Some(port) = tail_port {
                        self.model.set_attr(target, "tailport", AttrValue::text(port.clone()))?;
                    }
                    if let Some(port) = head_port {
                        self.model.set_attr(target, "headport", AttrValue::text(port.clone()))?;
                    }
                }
            }
        }
        Ok(())
    }

    fn edge(&mut self, tail: NodeId, head: NodeId) -> Result<EdgeId, DotError> {
        if self.model.is_strict()
            && let Some(existing) = self.model.find_edge(tail, head)
        {
            return Ok(existing);
        }
        Ok(self.model.add_edge(tail, head)?)
    }

    fn operand_nodes(&self, operand: &Operand) -> Vec<(NodeId, Option<String>)> {
        match operand {
            Operand::Node(node, port) => vec![(*node, port.clone())],
            Operand::Subgraph(sub) => self
                .model
                .subgraph_nodes(*sub)
                .iter()
                .map(|n| (*n, None))
                .collect(),
        }
    }

    fn attr_lists(&mut self) -> Result<AttrList, DotError> {
        let mut attrs = AttrList::new();
        while self.eat(&Tok::LBracket) {
            while !self.eat(&Tok::RBracket) {
                let (key, _) = self.id("attribute name")?;
                let value = if self.eat(&Tok::Equals) {
                    self.value()?
                } else {
                    AttrValue::text("true")
                };
                upsert(&mut attrs, key, value);
                if !self.eat(&Tok::Comma) {
                    self.eat(&Tok::Semi);
                }
            }
        }
        Ok(attrs)
    }

    fn value(&mut self) -> Result<AttrValue, DotError> {
        let (value, kind) = self.id("attribute value")?;
        Ok(match kind {
            IdKind::Html => AttrValue::Html(value),
            IdKind::Plain | IdKind::Quoted => AttrValue::Text(value),
        })
    }
}

fn upsert(list: &mut AttrList, key: String, value: AttrValue) {
    match list.iter_mut().find(|(k, _)| *k == key) {
        Some(slot) => slot.1 = value,
        None => list.push((key, value)),
    }
}

/// Parses the first graph in `input`.
pub fn parse_dot(input: &str) -> Result<GraphModel, DotError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(syntax(1, "empty input"));
    }
    let parser = Parser {
        tokens,
        pos: 0,
        model: GraphModel::default(),
    };
    parser.graph()
}

/// Quotes `id` unless it is a plain identifier or a numeral.
pub fn quote_id(id: &str) -> String {
    let is_keyword = KEYWORDS.iter().any(|k| k.eq_ignore_ascii_case(id));
    if !is_keyword && (PLAIN_ID_RE.is_match(id) || NUMERAL_RE.is_match(id)) {
        id.to_string()
    } else {
        format!("\"{}\"", escape_quoted(id))
    }
}

/// Escapes `"` and every backslash the reader would otherwise pair with the
/// next character. Other backslashes (`\N`, `\l`, ...) are written as is.
fn escape_quoted(id: &str) -> String {
    let mut out = String::with_capacity(id.len() + 2);
    let mut chars = id.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' if matches!(chars.peek(), None | Some('\\' | '"' | '\n' | '\r')) => {
                out.push_str("\\\\")
            }
            _ => out.push(c),
        }
    }
    out
}

fn format_value(value: &AttrValue) -> String {
    match value {
        AttrValue::Html(body) => format!("<{body}>"),
        AttrValue::Text(text) => quote_id(text),
    }
}

fn format_attrs(attrs: &[(&str, &AttrValue)]) -> String {
    attrs
        .iter()
        .map(|(k, v)| format!("{}={}", quote_id(k), format_value(v)))
        .collect::<Vec<_>>()
        .join(", ")
}

impl GraphModel {
    pub fn from_dot(input: &str) -> Result<GraphModel, DotError> {
        parse_dot(input)
    }

    /// Serialises the model. Parsing the output yields the same node names,
    /// edge endpoints, subgraph tree and attribute values.
    pub fn to_dot(&self) -> String {
        let mut out = String::new();
        let kind = if self.is_directed() { "digraph" } else { "graph" };
        let strict = if self.is_strict() { "strict " } else { "" };
        let name = if self.name().is_empty() {
            String::new()
        } else {
            format!("{} ", quote_id(self.name()))
        };
        let _ = writeln!(out, "{strict}{kind} {name}{{");

        for (keyword, scope) in [("graph", Scope::Graph), ("node", Scope::Node), ("edge", Scope::Edge)] {
            let attrs = self.defaults(scope);
            if !attrs.is_empty() {
                let _ = writeln!(out, "\t{keyword} [{}];", format_attrs(&attrs));
            }
        }

        for node in self.nodes() {
            let name = quote_id(self.node_name(node).unwrap_or_default());
            let attrs = self.own_attrs(AttrTarget::Node(node));
            if attrs.is_empty() {
                let _ = writeln!(out, "\t{name};");
            } else {
                let _ = writeln!(out, "\t{name} [{}];", format_attrs(&attrs));
            }
        }

        for sub in self.root_subgraphs() {
            self.write_subgraph(&mut out, *sub, 1);
        }

        let op = if self.is_directed() { "->" } else { "--" };
        for edge in self.edges() {
            let Some((tail, head)) = self.edge_endpoints(edge) else {
                continue;
            };
            let tail = quote_id(self.node_name(tail).unwrap_or_default());
            let head = quote_id(self.node_name(head).unwrap_or_default());
            let attrs = self.own_attrs(AttrTarget::Edge(edge));
            if attrs.is_empty() {
                let _ = writeln!(out, "\t{tail} {op} {head};");
            } else {
                let _ = writeln!(out, "\t{tail} {op} {head} [{}];", format_attrs(&attrs));
            }
        }
        out.push_str("}\n");
        out
    }

    fn write_subgraph(&self, out: &mut String, sub: SubgraphId, depth: usize) {
        let indent = "\t".repeat(depth);
        if self.is_anonymous(sub) {
            let _ = writeln!(out, "{indent}subgraph {{");
        } else {
            let name = quote_id(self.subgraph_name(sub).unwrap_or_default());
            let _ = writeln!(out, "{indent}subgraph {name} {{");
        }
        let attrs = self.own_attrs(AttrTarget::Subgraph(sub));
        if !attrs.is_empty() {
            let _ = writeln!(out, "{indent}\tgraph [{}];", format_attrs(&attrs));
        }
        let children = self.subgraph_children(sub);
        for node in self.subgraph_nodes(sub) {
            let nested = children
                .iter()
                .any(|child| self.subgraph_nodes(*child).contains(node));
            if !nested {
                let name = quote_id(self.node_name(*node).unwrap_or_default());
                let _ = writeln!(out, "{indent}\t{name};");
            }
        }
        for child in children {
            self.write_subgraph(out, *child, depth + 1);
        }
        let _ = writeln!(out, "{indent}}}");
    }
}
