use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use log::debug;
use serde::de::DeserializeOwned;

use crate::core::{EngineError, Row, Value};
use crate::executor::SqlQuery;

use super::binding::{CommandShape, MapperSpec, MethodBinding};

/// Result of an untyped mapper dispatch, one variant per command shape.
#[derive(Debug, Clone, PartialEq)]
pub enum MapperResult {
    List(Vec<Row>),
    Map(Row),
    Single(Row),
    Update(u64),
}

impl MapperResult {
    #[must_use]
    pub fn into_rows(self) -> Vec<Row> {
        match self {
            Self::List(rows) => rows,
            Self::Map(row) | Self::Single(row) => vec![row],
            Self::Update(_) => vec![],
        }
    }

    #[must_use]
    pub const fn affected(&self) -> Option<u64> {
        match self {
            Self::Update(count) => Some(*count),
            _ => None,
        }
    }
}

/// Dispatch table standing in for a runtime interface proxy: each declared
/// method maps to a statement id and command shape, computed on first use
/// and cached for the mapper's lifetime.
///
/// The binding cache tolerates first-use races: binding computation is
/// pure and deterministic, so recomputing twice and keeping the last
/// writer's value is harmless.
pub struct Mapper {
    spec: MapperSpec,
    query: SqlQuery,
    bindings: RwLock<HashMap<String, Arc<MethodBinding>>>,
}

impl Mapper {
    pub(crate) fn new(spec: MapperSpec, query: SqlQuery) -> Self {
        Self {
            spec,
            query,
            bindings: RwLock::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        self.spec.namespace.as_deref()
    }

    /// Resolve (and cache) the dispatch entry for a method. The statement
    /// id is the explicit override if present, else the method name, both
    /// prefixed with the mapper namespace when one was declared.
    pub fn binding(&self, method: &str) -> Result<Arc<MethodBinding>, EngineError> {
        if let Some(binding) = self
            .bindings
            .read()
            .expect("binding cache poisoned")
            .get(method)
        {
            return Ok(Arc::clone(binding));
        }

        let spec = self
            .spec
            .methods
            .iter()
            .find(|m| m.name == method)
            .ok_or_else(|| {
                EngineError::InvalidArgument(format!("Mapper declares no method '{method}'"))
            })?;
        let shape = CommandShape::infer(&spec.name, spec.returns)?;
        let local_id = spec.statement.as_deref().unwrap_or(&spec.name);
        let statement_id = match &self.spec.namespace {
            Some(ns) if !ns.is_empty() => format!("{ns}.{local_id}"),
            _ => local_id.to_string(),
        };
        debug!("bound mapper method '{method}' to statement '{statement_id}' as {shape:?}");

        let binding = Arc::new(MethodBinding {
            statement_id,
            shape,
        });
        self.bindings
            .write()
            .expect("binding cache poisoned")
            .insert(method.to_string(), Arc::clone(&binding));
        Ok(binding)
    }

    /// Dispatch a method call to the executor according to its shape.
    pub fn invoke(&self, method: &str, args: &[Value]) -> Result<MapperResult, EngineError> {
        let binding = self.binding(method)?;
        match binding.shape {
            CommandShape::List => Ok(MapperResult::List(
                self.query.query_for_list(&binding.statement_id, args)?,
            )),
            CommandShape::Map => Ok(MapperResult::Map(
                self.query.query_for_object(&binding.statement_id, args)?,
            )),
            CommandShape::Single => Ok(MapperResult::Single(
                self.query.query_for_object(&binding.statement_id, args)?,
            )),
            CommandShape::Update => Ok(MapperResult::Update(
                self.query.execute_update(&binding.statement_id, args)?,
            )),
        }
    }

    /// Typed list dispatch — the elementType path for LIST methods.
    pub fn invoke_list_as<T: DeserializeOwned>(
        &self,
        method: &str,
        args: &[Value],
    ) -> Result<Vec<T>, EngineError> {
        let binding = self.binding(method)?;
        if binding.shape != CommandShape::List {
            return Err(EngineError::InvalidArgument(format!(
                "Method '{method}' is {:?}, not LIST",
                binding.shape
            )));
        }
        self.query.query_for_list_as(&binding.statement_id, args)
    }

    /// Typed single-result dispatch for SINGLE (and MAP) methods.
    pub fn invoke_one_as<T: DeserializeOwned>(
        &self,
        method: &str,
        args: &[Value],
    ) -> Result<T, EngineError> {
        let binding = self.binding(method)?;
        match binding.shape {
            CommandShape::Single | CommandShape::Map => {
                self.query.query_for_object_as(&binding.statement_id, args)
            }
            other => Err(EngineError::InvalidArgument(format!(
                "Method '{method}' is {other:?}, not SINGLE"
            ))),
        }
    }

    #[cfg(test)]
    fn cached_binding_count(&self) -> usize {
        self.bindings.read().expect("binding cache poisoned").len()
    }
}

// Object-identity surface: answered locally by the type system, never
// dispatched to a statement.
impl std::fmt::Debug for Mapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mapper")
            .field("namespace", &self.spec.namespace)
            .field("methods", &self.spec.methods.len())
            .finish_non_exhaustive()
    }
}

impl std::fmt::Display for Mapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.spec.namespace {
            Some(ns) => write!(f, "Mapper({ns})"),
            None => write!(f, "Mapper"),
        }
    }
}
