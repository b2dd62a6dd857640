use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::core::{EngineError, JdbcType};
use crate::statement::helpers::HelperRegistry;
use crate::statement::nodes::{ParamBag, RenderedSql, SqlNode};

/// Direction of a statement parameter. OUT parameters are declared to the
/// stored-procedure call mechanism without a bound value.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ParameterMode {
    In,
    Out,
}

impl FromStr for ParameterMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "IN" => Ok(Self::In),
            "OUT" => Ok(Self::Out),
            other => Err(format!("Unknown parameter mode '{other}'")),
        }
    }
}

impl std::fmt::Display for ParameterMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::In => write!(f, "IN"),
            Self::Out => write!(f, "OUT"),
        }
    }
}

/// One parameter of a compiled statement: the property it binds, its
/// declared JDBC type, its direction, and its position in the final SQL.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParameterMapping {
    pub property: String,
    pub jdbc_type: Option<JdbcType>,
    pub mode: ParameterMode,
    pub ordinal: usize,
}

impl ParameterMapping {
    #[must_use]
    pub fn new(property: impl Into<String>, jdbc_type: Option<JdbcType>, mode: ParameterMode) -> Self {
        Self {
            property: property.into(),
            jdbc_type,
            mode,
            ordinal: 0,
        }
    }

    #[must_use]
    pub const fn is_in(&self) -> bool {
        matches!(self.mode, ParameterMode::In)
    }

    #[must_use]
    pub const fn is_out(&self) -> bool {
        matches!(self.mode, ParameterMode::Out)
    }
}

/// The XML element a statement was declared with.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    Statement,
    Procedure,
}

impl StatementKind {
    #[must_use]
    pub fn from_element(name: &str) -> Option<Self> {
        match name {
            "select" => Some(Self::Select),
            "insert" => Some(Self::Insert),
            "update" => Some(Self::Update),
            "delete" => Some(Self::Delete),
            "statement" => Some(Self::Statement),
            "procedure" => Some(Self::Procedure),
            _ => None,
        }
    }
}

/// The compiled artifact: final SQL text plus its ordered parameter
/// mappings. Immutable after compilation; recompiling the same logical
/// statement replaces the registry entry atomically.
///
/// Statements with runtime-conditional fragments keep their node tree and
/// re-render per execution; purely static statements are resolved once at
/// compile time and `dynamic` is `None`.
#[derive(Debug, Clone)]
pub struct BoundSql {
    pub kind: StatementKind,
    /// Final SQL for static statements; empty when `dynamic` is set.
    pub sql: String,
    /// The statement's parameter signature in document order. For static
    /// statements: one entry per placeholder. For dynamic statements: one
    /// entry per distinct property referenced by a placeholder or a test
    /// expression; the per-execution mapping list is derived from it.
    pub parameter_mappings: Vec<ParameterMapping>,
    pub dynamic: Option<SqlNode>,
}

impl BoundSql {
    #[must_use]
    pub const fn is_dynamic(&self) -> bool {
        self.dynamic.is_some()
    }

    /// Produce the executable form of this statement. The result is
    /// call-local: nothing on the shared artifact is mutated, so concurrent
    /// executions cannot observe each other's parameter state.
    pub fn render(
        &self,
        bag: &ParamBag,
        helpers: &HelperRegistry,
    ) -> Result<RenderedSql, EngineError> {
        match &self.dynamic {
            None => Ok(RenderedSql {
                sql: self.sql.clone(),
                mappings: self.parameter_mappings.clone(),
            }),
            Some(root) => {
                let mut out = RenderedSql::default();
                root.render_into(bag, helpers, &mut out)?;
                out.finish();
                Ok(out)
            }
        }
    }
}
