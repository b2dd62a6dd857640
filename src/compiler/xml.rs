use std::collections::HashMap;
use std::io::Cursor;
use std::str::FromStr;

use log::warn;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::core::{EngineError, JdbcType};
use crate::statement::{
    BoundSql, Expr, HelperRegistry, ParamBag, ParameterMapping, ParameterMode, SqlNode,
    StatementKind,
};

use super::grammar;

/// Maximum `<include>` nesting before we assume a reference cycle.
const MAX_INCLUDE_DEPTH: usize = 16;

/// Pre-resolution template node, straight off the XML events.
#[derive(Debug, Clone)]
enum RawNode {
    Text(String),
    Include(String),
    If { test: String, children: Vec<RawNode> },
    Where(Vec<RawNode>),
    Set(Vec<RawNode>),
}

#[derive(Debug)]
struct RawStatement {
    kind: StatementKind,
    id: String,
    nodes: Vec<RawNode>,
    declared: Vec<ParameterMapping>,
}

/// Parser for one statement-definition resource: a `<sqlmap>` (or
/// `<mapper>`) document holding named statements, reusable `<sql>`
/// fragments, and parameter declarations.
pub struct DocumentParser<'a> {
    resource: &'a str,
    reader: Reader<Cursor<Vec<u8>>>,
    buf: Vec<u8>,
}

impl<'a> DocumentParser<'a> {
    #[must_use]
    pub fn new(resource: &'a str, content: &str) -> Self {
        let mut reader = Reader::from_reader(Cursor::new(content.as_bytes().to_vec()));
        reader.trim_text(true);
        Self {
            resource,
            reader,
            buf: Vec::new(),
        }
    }

    /// Parse and compile the whole document. Statement ids come back
    /// namespaced and in document order.
    pub fn compile(
        mut self,
        helpers: &HelperRegistry,
    ) -> Result<Vec<(String, BoundSql)>, EngineError> {
        let mut namespace = None;
        let mut fragments: HashMap<String, Vec<RawNode>> = HashMap::new();
        let mut statements: Vec<RawStatement> = Vec::new();

        loop {
            let event = self.next_event("")?;
            match event {
                Event::Start(e) => {
                    let element = element_name(&e);
                    match element.as_str() {
                        "sqlmap" | "mapper" => {
                            namespace = self.attr(&e, "namespace", "")?;
                        }
                        "sql" => {
                            let id = self.require_attr(&e, "id", "")?;
                            let mut ignored = Vec::new();
                            let nodes = self.parse_nodes("sql", &id, &mut ignored)?;
                            if fragments.insert(id.clone(), nodes).is_some() {
                                return Err(self.err(&id, format!("Duplicate sql fragment id '{id}'")));
                            }
                        }
                        other => {
                            let Some(kind) = StatementKind::from_element(other) else {
                                return Err(self.err("", format!("Unsupported element <{other}>")));
                            };
                            let id = self.require_attr(&e, "id", "")?;
                            let mut declared = Vec::new();
                            let nodes = self.parse_nodes(other, &id, &mut declared)?;
                            if statements.iter().any(|s| s.id == id) {
                                return Err(self.err(&id, format!("Duplicate statement id '{id}'")));
                            }
                            statements.push(RawStatement {
                                kind,
                                id,
                                nodes,
                                declared,
                            });
                        }
                    }
                }
                Event::Empty(e) => {
                    let element = element_name(&e);
                    match element.as_str() {
                        "sqlmap" | "mapper" => {
                            namespace = self.attr(&e, "namespace", "")?;
                        }
                        "sql" => {
                            let id = self.require_attr(&e, "id", "")?;
                            if fragments.insert(id.clone(), Vec::new()).is_some() {
                                return Err(self.err(&id, format!("Duplicate sql fragment id '{id}'")));
                            }
                        }
                        other => {
                            let Some(kind) = StatementKind::from_element(other) else {
                                return Err(self.err("", format!("Unsupported element <{other}/>")));
                            };
                            // Empty body: registered, but fails with
                            // EmptyStatementError at execution.
                            let id = self.require_attr(&e, "id", "")?;
                            if statements.iter().any(|s| s.id == id) {
                                return Err(self.err(&id, format!("Duplicate statement id '{id}'")));
                            }
                            statements.push(RawStatement {
                                kind,
                                id,
                                nodes: Vec::new(),
                                declared: Vec::new(),
                            });
                        }
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        let mut compiled = Vec::with_capacity(statements.len());
        for statement in statements {
            let full_id = match &namespace {
                Some(ns) if !ns.is_empty() => format!("{ns}.{}", statement.id),
                _ => statement.id.clone(),
            };
            let bound = self.finish_statement(&statement, &fragments, helpers)?;
            compiled.push((full_id, bound));
        }
        Ok(compiled)
    }

    /// Recursive content parse of a statement, fragment, or dynamic
    /// element, up to the matching end tag.
    fn parse_nodes(
        &mut self,
        end: &str,
        statement: &str,
        declared: &mut Vec<ParameterMapping>,
    ) -> Result<Vec<RawNode>, EngineError> {
        let mut nodes = Vec::new();
        loop {
            let event = self.next_event(statement)?;
            match event {
                Event::Start(e) => {
                    let element = element_name(&e);
                    match element.as_str() {
                        "if" => {
                            let test = self.require_attr(&e, "test", statement)?;
                            let children = self.parse_nodes("if", statement, declared)?;
                            nodes.push(RawNode::If { test, children });
                        }
                        "where" => {
                            let children = self.parse_nodes("where", statement, declared)?;
                            nodes.push(RawNode::Where(children));
                        }
                        "set" => {
                            let children = self.parse_nodes("set", statement, declared)?;
                            nodes.push(RawNode::Set(children));
                        }
                        "include" => {
                            let refid = self.require_attr(&e, "refid", statement)?;
                            self.expect_end("include", statement)?;
                            nodes.push(RawNode::Include(refid));
                        }
                        "parameter" => {
                            declared.push(self.parameter_from(&e, statement)?);
                            self.expect_end("parameter", statement)?;
                        }
                        other => {
                            return Err(
                                self.err(statement, format!("Unsupported element <{other}>"))
                            );
                        }
                    }
                }
                Event::Empty(e) => {
                    let element = element_name(&e);
                    match element.as_str() {
                        "include" => {
                            let refid = self.require_attr(&e, "refid", statement)?;
                            nodes.push(RawNode::Include(refid));
                        }
                        "parameter" => declared.push(self.parameter_from(&e, statement)?),
                        other => {
                            return Err(
                                self.err(statement, format!("Unsupported element <{other}/>"))
                            );
                        }
                    }
                }
                Event::Text(e) => {
                    let text = e
                        .unescape()
                        .map_err(|err| self.err(statement, err.to_string()))?;
                    nodes.push(RawNode::Text(text.into_owned()));
                }
                Event::CData(e) => {
                    let text = String::from_utf8_lossy(&e.into_inner()).into_owned();
                    nodes.push(RawNode::Text(text));
                }
                Event::End(e) => {
                    let element = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    if element == end {
                        return Ok(nodes);
                    }
                    return Err(self.err(statement, format!("Unexpected </{element}>")));
                }
                Event::Eof => {
                    return Err(self.err(statement, format!("Unclosed <{end}> element")));
                }
                _ => {}
            }
        }
    }

    /// Splice `<include>` references, then compile raw nodes into the
    /// executable tree; fully static statements are rendered once here.
    fn finish_statement(
        &self,
        statement: &RawStatement,
        fragments: &HashMap<String, Vec<RawNode>>,
        helpers: &HelperRegistry,
    ) -> Result<BoundSql, EngineError> {
        let resolved =
            self.resolve_includes(&statement.nodes, fragments, &statement.id, 0)?;
        let mut children = Vec::with_capacity(resolved.len());
        for raw in &resolved {
            children.push(self.compile_raw(raw, &statement.declared, helpers, &statement.id)?);
        }
        let root = SqlNode::Sequence(children);

        if contains_if(&root) {
            let mut collected = Vec::new();
            root.collect_mappings(&mut collected);
            // The dynamic parameter signature: one entry per distinct
            // property, first appearance wins. Placeholders and
            // test-expression references both count.
            let mut mappings: Vec<ParameterMapping> = Vec::with_capacity(collected.len());
            for mapping in collected {
                match mappings.iter_mut().find(|m| m.property == mapping.property) {
                    Some(existing) => {
                        if existing.jdbc_type.is_none() {
                            existing.jdbc_type = mapping.jdbc_type;
                        }
                    }
                    None => mappings.push(mapping),
                }
            }
            if mappings.is_empty() && !statement.declared.is_empty() {
                mappings = statement.declared.clone();
            }
            for (i, mapping) in mappings.iter_mut().enumerate() {
                mapping.ordinal = i;
            }
            Ok(BoundSql {
                kind: statement.kind,
                sql: String::new(),
                parameter_mappings: mappings,
                dynamic: Some(root),
            })
        } else {
            // No runtime conditions: resolve the text once, at compile time.
            let mut rendered = crate::statement::RenderedSql::default();
            root.render_into(&ParamBag::new(), helpers, &mut rendered)
                .map_err(|e| self.err(&statement.id, e.to_string()))?;
            if rendered.mappings.is_empty() && !statement.declared.is_empty() {
                rendered.mappings = statement.declared.clone();
            } else if !statement.declared.is_empty() {
                for decl in &statement.declared {
                    if !rendered.mappings.iter().any(|m| m.property == decl.property) {
                        warn!(
                            "statement '{}' in '{}': declared parameter '{}' is never referenced",
                            statement.id, self.resource, decl.property
                        );
                    }
                }
            }
            rendered.finish();
            Ok(BoundSql {
                kind: statement.kind,
                sql: rendered.sql,
                parameter_mappings: rendered.mappings,
                dynamic: None,
            })
        }
    }

    fn resolve_includes(
        &self,
        nodes: &[RawNode],
        fragments: &HashMap<String, Vec<RawNode>>,
        statement: &str,
        depth: usize,
    ) -> Result<Vec<RawNode>, EngineError> {
        if depth > MAX_INCLUDE_DEPTH {
            return Err(self.err(statement, "Include references form a cycle"));
        }
        let mut resolved = Vec::with_capacity(nodes.len());
        for node in nodes {
            match node {
                RawNode::Include(refid) => {
                    let fragment = fragments.get(refid).ok_or_else(|| {
                        self.err(statement, format!("Unknown sql fragment '{refid}'"))
                    })?;
                    resolved.extend(self.resolve_includes(
                        fragment,
                        fragments,
                        statement,
                        depth + 1,
                    )?);
                }
                RawNode::If { test, children } => resolved.push(RawNode::If {
                    test: test.clone(),
                    children: self.resolve_includes(children, fragments, statement, depth + 1)?,
                }),
                RawNode::Where(children) => resolved.push(RawNode::Where(
                    self.resolve_includes(children, fragments, statement, depth + 1)?,
                )),
                RawNode::Set(children) => resolved.push(RawNode::Set(
                    self.resolve_includes(children, fragments, statement, depth + 1)?,
                )),
                RawNode::Text(_) => resolved.push(node.clone()),
            }
        }
        Ok(resolved)
    }

    fn compile_raw(
        &self,
        raw: &RawNode,
        declared: &[ParameterMapping],
        helpers: &HelperRegistry,
        statement: &str,
    ) -> Result<SqlNode, EngineError> {
        match raw {
            RawNode::Text(text) => {
                let (sql, params) = grammar::compile_text_chunk(text, declared)
                    .map_err(|m| self.err(statement, m))?;
                Ok(SqlNode::Text { sql, params })
            }
            RawNode::If { test, children } => {
                let expr =
                    grammar::parse_test_expression(test).map_err(|m| self.err(statement, m))?;
                self.validate_helpers(&expr, helpers, statement)?;
                let compiled = self.compile_children(children, declared, helpers, statement)?;
                Ok(SqlNode::If {
                    test: expr,
                    children: compiled,
                })
            }
            RawNode::Where(children) => Ok(SqlNode::Where(self.compile_children(
                children, declared, helpers, statement,
            )?)),
            RawNode::Set(children) => Ok(SqlNode::Set(self.compile_children(
                children, declared, helpers, statement,
            )?)),
            RawNode::Include(refid) => {
                Err(self.err(statement, format!("Unresolved include '{refid}'")))
            }
        }
    }

    fn compile_children(
        &self,
        children: &[RawNode],
        declared: &[ParameterMapping],
        helpers: &HelperRegistry,
        statement: &str,
    ) -> Result<Vec<SqlNode>, EngineError> {
        let mut compiled = Vec::with_capacity(children.len());
        for child in children {
            compiled.push(self.compile_raw(child, declared, helpers, statement)?);
        }
        Ok(compiled)
    }

    fn validate_helpers(
        &self,
        expr: &Expr,
        helpers: &HelperRegistry,
        statement: &str,
    ) -> Result<(), EngineError> {
        let mut names = Vec::new();
        expr.helper_names(&mut names);
        for name in names {
            if !helpers.contains(&name) {
                return Err(self.err(statement, format!("Unknown template helper '{name}'")));
            }
        }
        Ok(())
    }

    fn parameter_from(
        &self,
        e: &BytesStart<'_>,
        statement: &str,
    ) -> Result<ParameterMapping, EngineError> {
        let property = self.require_attr(e, "property", statement)?;
        let jdbc_type = match self.attr(e, "jdbcType", statement)? {
            Some(raw) => Some(
                JdbcType::from_str(&raw).map_err(|m| self.err(statement, m))?,
            ),
            None => None,
        };
        let mode = match self.attr(e, "mode", statement)? {
            Some(raw) => ParameterMode::from_str(&raw).map_err(|m| self.err(statement, m))?,
            None => ParameterMode::In,
        };
        Ok(ParameterMapping::new(property, jdbc_type, mode))
    }

    /// Consume the immediate end tag of an element whose body must be empty.
    fn expect_end(&mut self, element: &str, statement: &str) -> Result<(), EngineError> {
        let event = self.next_event(statement)?;
        match event {
            Event::End(e) if e.name().as_ref() == element.as_bytes() => Ok(()),
            _ => Err(self.err(statement, format!("<{element}> must be empty"))),
        }
    }

    fn next_event(&mut self, statement: &str) -> Result<Event<'static>, EngineError> {
        self.buf.clear();
        self.reader
            .read_event_into(&mut self.buf)
            .map(Event::into_owned)
            .map_err(|e| self.err(statement, e.to_string()))
    }

    fn attr(
        &self,
        e: &BytesStart<'_>,
        name: &str,
        statement: &str,
    ) -> Result<Option<String>, EngineError> {
        for attr in e.attributes() {
            let attr = attr.map_err(|err| self.err(statement, err.to_string()))?;
            if attr.key.as_ref() == name.as_bytes() {
                let value = attr
                    .unescape_value()
                    .map_err(|err| self.err(statement, err.to_string()))?;
                return Ok(Some(value.into_owned()));
            }
        }
        Ok(None)
    }

    fn require_attr(
        &self,
        e: &BytesStart<'_>,
        name: &str,
        statement: &str,
    ) -> Result<String, EngineError> {
        let element = element_name(e);
        self.attr(e, name, statement)?.ok_or_else(|| {
            self.err(
                statement,
                format!("<{element}> is missing required attribute '{name}'"),
            )
        })
    }

    fn err(&self, statement: &str, message: impl Into<String>) -> EngineError {
        EngineError::compile(self.resource, statement, message)
    }
}

fn element_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.name().as_ref()).into_owned()
}

fn contains_if(node: &SqlNode) -> bool {
    match node {
        SqlNode::Text { .. } => false,
        SqlNode::If { .. } => true,
        SqlNode::Sequence(children) | SqlNode::Where(children) | SqlNode::Set(children) => {
            children.iter().any(contains_if)
        }
    }
}
