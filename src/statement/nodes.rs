use std::collections::HashMap;

use crate::core::{EngineError, Value};
use crate::statement::bound_sql::{ParameterMapping, ParameterMode};
use crate::statement::helpers::HelperRegistry;

/// Runtime parameter bag: property name → value. Built per call by zipping
/// the compiled mapping order with the positional arguments.
pub type ParamBag = HashMap<String, Value>;

/// Executable form of a statement for one call: SQL with `?` placeholders
/// plus the mappings that survived rendering, in placeholder order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedSql {
    pub sql: String,
    pub mappings: Vec<ParameterMapping>,
}

impl RenderedSql {
    pub(crate) fn push_fragment(&mut self, fragment: &str) {
        let fragment = fragment.trim();
        if fragment.is_empty() {
            return;
        }
        if !self.sql.is_empty() {
            self.sql.push(' ');
        }
        self.sql.push_str(fragment);
    }

    /// Assign final ordinals once rendering is complete.
    pub(crate) fn finish(&mut self) {
        for (i, mapping) in self.mappings.iter_mut().enumerate() {
            mapping.ordinal = i;
        }
    }
}

/// One node of a compiled statement template. `<include>` references and
/// `<sql>` fragments are spliced at compile time, so only runtime-dependent
/// structure survives here.
#[derive(Debug, Clone)]
pub enum SqlNode {
    /// SQL text with placeholders already normalized to `?`; `params` holds
    /// the chunk's mappings in placeholder order.
    Text {
        sql: String,
        params: Vec<ParameterMapping>,
    },
    /// Children of all nodes in document order.
    Sequence(Vec<SqlNode>),
    /// `<if test="...">` — children included only when the test passes.
    If { test: Expr, children: Vec<SqlNode> },
    /// `<where>` — prefixes WHERE, drops a leading AND/OR, omitted entirely
    /// when the children render empty.
    Where(Vec<SqlNode>),
    /// `<set>` — prefixes SET, drops a trailing comma, omitted when empty.
    Set(Vec<SqlNode>),
}

impl SqlNode {
    pub(crate) fn render_into(
        &self,
        bag: &ParamBag,
        helpers: &HelperRegistry,
        out: &mut RenderedSql,
    ) -> Result<(), EngineError> {
        match self {
            Self::Text { sql, params } => {
                out.push_fragment(sql);
                out.mappings.extend(params.iter().cloned());
                Ok(())
            }
            Self::Sequence(children) => {
                for child in children {
                    child.render_into(bag, helpers, out)?;
                }
                Ok(())
            }
            Self::If { test, children } => {
                if test.evaluate(bag, helpers)? {
                    for child in children {
                        child.render_into(bag, helpers, out)?;
                    }
                }
                Ok(())
            }
            Self::Where(children) => {
                let mut inner = RenderedSql::default();
                for child in children {
                    child.render_into(bag, helpers, &mut inner)?;
                }
                let trimmed = strip_prefix_keyword(inner.sql.trim(), &["AND", "OR"]);
                if !trimmed.is_empty() {
                    out.push_fragment("WHERE");
                    out.push_fragment(trimmed);
                    out.mappings.extend(inner.mappings);
                }
                Ok(())
            }
            Self::Set(children) => {
                let mut inner = RenderedSql::default();
                for child in children {
                    child.render_into(bag, helpers, &mut inner)?;
                }
                let trimmed = inner.sql.trim().trim_end_matches(',').trim_end();
                if !trimmed.is_empty() {
                    out.push_fragment("SET");
                    out.push_fragment(trimmed);
                    out.mappings.extend(inner.mappings);
                }
                Ok(())
            }
        }
    }

    /// Full mapping set of the subtree in document order, ignoring runtime
    /// conditions. Properties referenced only by `test` expressions are
    /// part of the statement's parameter signature too: they never reach
    /// the SQL text, but positional arguments must be able to fill them.
    pub(crate) fn collect_mappings(&self, into: &mut Vec<ParameterMapping>) {
        match self {
            Self::Text { params, .. } => into.extend(params.iter().cloned()),
            Self::If { test, children } => {
                let mut properties = Vec::new();
                test.property_names(&mut properties);
                for property in properties {
                    into.push(ParameterMapping::new(property, None, ParameterMode::In));
                }
                for child in children {
                    child.collect_mappings(into);
                }
            }
            Self::Sequence(children) | Self::Where(children) | Self::Set(children) => {
                for child in children {
                    child.collect_mappings(into);
                }
            }
        }
    }
}

fn strip_prefix_keyword<'a>(sql: &'a str, keywords: &[&str]) -> &'a str {
    for keyword in keywords {
        if sql.len() > keyword.len()
            && sql[..keyword.len()].eq_ignore_ascii_case(keyword)
            && sql.as_bytes()[keyword.len()].is_ascii_whitespace()
        {
            return sql[keyword.len()..].trim_start();
        }
    }
    sql
}

/// Comparison operator inside a `test` expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
}

/// Operand of a `test` expression: a property reference from the runtime
/// parameter bag, a literal, or a helper call.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Property(String),
    Literal(Value),
    Call { helper: String, args: Vec<Operand> },
}

impl Operand {
    fn resolve(&self, bag: &ParamBag, helpers: &HelperRegistry) -> Result<Value, EngineError> {
        match self {
            Self::Property(name) => Ok(bag.get(name).cloned().unwrap_or(Value::Null)),
            Self::Literal(value) => Ok(value.clone()),
            Self::Call { helper, args } => {
                let mut resolved = Vec::with_capacity(args.len());
                for arg in args {
                    resolved.push(arg.resolve(bag, helpers)?);
                }
                helpers.call(helper, &resolved).ok_or_else(|| {
                    EngineError::InvalidArgument(format!("Unknown template helper '{helper}'"))
                })
            }
        }
    }
}

/// Parsed `test="..."` expression, compiled once per statement and
/// evaluated per execution against the runtime parameter bag.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Or(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Compare {
        left: Operand,
        op: CompareOp,
        right: Operand,
    },
    /// Bare operand: truthiness of a property or helper result.
    Truthy(Operand),
}

impl Expr {
    pub fn evaluate(&self, bag: &ParamBag, helpers: &HelperRegistry) -> Result<bool, EngineError> {
        match self {
            Self::Or(a, b) => Ok(a.evaluate(bag, helpers)? || b.evaluate(bag, helpers)?),
            Self::And(a, b) => Ok(a.evaluate(bag, helpers)? && b.evaluate(bag, helpers)?),
            Self::Not(inner) => Ok(!inner.evaluate(bag, helpers)?),
            Self::Compare { left, op, right } => {
                let lhs = left.resolve(bag, helpers)?;
                let rhs = right.resolve(bag, helpers)?;
                Ok(compare_values(&lhs, *op, &rhs))
            }
            Self::Truthy(operand) => Ok(operand.resolve(bag, helpers)?.is_truthy()),
        }
    }

    /// Every property referenced by this expression, in appearance order.
    pub fn property_names(&self, into: &mut Vec<String>) {
        match self {
            Self::Or(a, b) | Self::And(a, b) => {
                a.property_names(into);
                b.property_names(into);
            }
            Self::Not(inner) => inner.property_names(into),
            Self::Compare { left, right, .. } => {
                operand_property_names(left, into);
                operand_property_names(right, into);
            }
            Self::Truthy(operand) => operand_property_names(operand, into),
        }
    }

    /// Every helper name referenced by this expression, for compile-time
    /// validation against the registry.
    pub fn helper_names(&self, into: &mut Vec<String>) {
        match self {
            Self::Or(a, b) | Self::And(a, b) => {
                a.helper_names(into);
                b.helper_names(into);
            }
            Self::Not(inner) => inner.helper_names(into),
            Self::Compare { left, right, .. } => {
                operand_helper_names(left, into);
                operand_helper_names(right, into);
            }
            Self::Truthy(operand) => operand_helper_names(operand, into),
        }
    }
}

fn operand_property_names(operand: &Operand, into: &mut Vec<String>) {
    match operand {
        Operand::Property(name) => into.push(name.clone()),
        Operand::Call { args, .. } => {
            for arg in args {
                operand_property_names(arg, into);
            }
        }
        Operand::Literal(_) => {}
    }
}

fn operand_helper_names(operand: &Operand, into: &mut Vec<String>) {
    if let Operand::Call { helper, args } = operand {
        into.push(helper.clone());
        for arg in args {
            operand_helper_names(arg, into);
        }
    }
}

fn compare_values(lhs: &Value, op: CompareOp, rhs: &Value) -> bool {
    match op {
        CompareOp::Eq => values_equal(lhs, rhs),
        CompareOp::Ne => !values_equal(lhs, rhs),
        CompareOp::Gt => numeric_cmp(lhs, rhs).map_or(false, |o| o == std::cmp::Ordering::Greater),
        CompareOp::Lt => numeric_cmp(lhs, rhs).map_or(false, |o| o == std::cmp::Ordering::Less),
        CompareOp::Ge => numeric_cmp(lhs, rhs).map_or(false, |o| o != std::cmp::Ordering::Less),
        CompareOp::Le => numeric_cmp(lhs, rhs).map_or(false, |o| o != std::cmp::Ordering::Greater),
    }
}

fn values_equal(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Integer(a), Value::Real(b)) | (Value::Real(b), Value::Integer(a)) => {
            (*a as f64 - b).abs() < f64::EPSILON
        }
        _ => lhs == rhs,
    }
}

fn numeric_cmp(lhs: &Value, rhs: &Value) -> Option<std::cmp::Ordering> {
    let a = numeric_of(lhs)?;
    let b = numeric_of(rhs)?;
    a.partial_cmp(&b)
}

fn numeric_of(value: &Value) -> Option<f64> {
    match value {
        Value::Integer(i) => Some(*i as f64),
        Value::Real(r) => Some(*r),
        Value::Numeric(d) => d.to_string().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statement::bound_sql::ParameterMode;

    fn text(sql: &str) -> SqlNode {
        SqlNode::Text {
            sql: sql.to_string(),
            params: vec![],
        }
    }

    fn text_with_param(sql: &str, property: &str) -> SqlNode {
        SqlNode::Text {
            sql: sql.to_string(),
            params: vec![ParameterMapping::new(property, None, ParameterMode::In)],
        }
    }

    fn bag(entries: &[(&str, Value)]) -> ParamBag {
        entries
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_where_drops_leading_and() {
        let node = SqlNode::Sequence(vec![
            text("SELECT * FROM users"),
            SqlNode::Where(vec![SqlNode::If {
                test: Expr::Compare {
                    left: Operand::Property("name".to_string()),
                    op: CompareOp::Ne,
                    right: Operand::Literal(Value::Null),
                },
                children: vec![text_with_param("AND name = ?", "name")],
            }]),
        ]);

        let helpers = HelperRegistry::with_defaults();
        let mut out = RenderedSql::default();
        node.render_into(&bag(&[("name", Value::from("alice"))]), &helpers, &mut out)
            .unwrap();
        out.finish();
        assert_eq!(out.sql, "SELECT * FROM users WHERE name = ?");
        assert_eq!(out.mappings.len(), 1);
        assert_eq!(out.mappings[0].property, "name");
    }

    #[test]
    fn test_where_omitted_when_empty() {
        let node = SqlNode::Sequence(vec![
            text("SELECT * FROM users"),
            SqlNode::Where(vec![SqlNode::If {
                test: Expr::Compare {
                    left: Operand::Property("name".to_string()),
                    op: CompareOp::Ne,
                    right: Operand::Literal(Value::Null),
                },
                children: vec![text_with_param("AND name = ?", "name")],
            }]),
        ]);

        let helpers = HelperRegistry::with_defaults();
        let mut out = RenderedSql::default();
        node.render_into(&bag(&[]), &helpers, &mut out).unwrap();
        out.finish();
        assert_eq!(out.sql, "SELECT * FROM users");
        assert!(out.mappings.is_empty());
    }

    #[test]
    fn test_set_drops_trailing_comma() {
        let node = SqlNode::Sequence(vec![
            text("UPDATE users"),
            SqlNode::Set(vec![
                SqlNode::If {
                    test: Expr::Truthy(Operand::Call {
                        helper: "isNotEmpty".to_string(),
                        args: vec![Operand::Property("name".to_string())],
                    }),
                    children: vec![text_with_param("name = ?,", "name")],
                },
                SqlNode::If {
                    test: Expr::Truthy(Operand::Call {
                        helper: "isNotEmpty".to_string(),
                        args: vec![Operand::Property("email".to_string())],
                    }),
                    children: vec![text_with_param("email = ?,", "email")],
                },
            ]),
            text("WHERE id = ?"),
        ]);

        let helpers = HelperRegistry::with_defaults();
        let mut out = RenderedSql::default();
        node.render_into(
            &bag(&[("name", Value::from("bob"))]),
            &helpers,
            &mut out,
        )
        .unwrap();
        out.finish();
        assert_eq!(out.sql, "UPDATE users SET name = ? WHERE id = ?");
        assert_eq!(out.mappings.len(), 1);
    }

    #[test]
    fn test_expr_comparisons() {
        let helpers = HelperRegistry::with_defaults();
        let expr = Expr::Compare {
            left: Operand::Property("age".to_string()),
            op: CompareOp::Ge,
            right: Operand::Literal(Value::Integer(18)),
        };
        assert!(expr
            .evaluate(&bag(&[("age", Value::Integer(21))]), &helpers)
            .unwrap());
        assert!(!expr
            .evaluate(&bag(&[("age", Value::Integer(12))]), &helpers)
            .unwrap());
        // Missing property resolves to Null, which never orders
        assert!(!expr.evaluate(&bag(&[]), &helpers).unwrap());
    }

    #[test]
    fn test_expr_null_equality() {
        let helpers = HelperRegistry::with_defaults();
        let is_null = Expr::Compare {
            left: Operand::Property("x".to_string()),
            op: CompareOp::Eq,
            right: Operand::Literal(Value::Null),
        };
        assert!(is_null.evaluate(&bag(&[]), &helpers).unwrap());
        assert!(!is_null
            .evaluate(&bag(&[("x", Value::Integer(1))]), &helpers)
            .unwrap());
    }

    #[test]
    fn test_expr_unknown_helper_fails() {
        let helpers = HelperRegistry::empty();
        let expr = Expr::Truthy(Operand::Call {
            helper: "nope".to_string(),
            args: vec![],
        });
        assert!(expr.evaluate(&bag(&[]), &helpers).is_err());
    }
}
