use std::collections::HashMap;
use std::sync::Mutex;

use crate::core::{DriverError, JdbcType, Row, Value};

/// Pagination window: rows `[start, start + max)` of the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowWindow {
    pub start: usize,
    pub max: usize,
}

/// One declared parameter of a stored-procedure call. OUT parameters carry
/// no value, only the declared type the call mechanism needs up front.
#[derive(Debug, Clone, PartialEq)]
pub enum CallParameter {
    In(Value),
    Out(Option<JdbcType>),
}

/// Result of a stored-procedure call: any produced rows, OUT values keyed
/// by parameter position, and the update count when the driver reports one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallOutcome {
    pub rows: Vec<Row>,
    pub out_values: HashMap<usize, Value>,
    pub update_count: Option<u64>,
}

/// The connection abstraction the engine executes against. Implementations
/// are opaque handles supplied by the caller — the engine issues
/// parameterized statements and windows against them but performs no
/// pooling, retries, or transaction demarcation of its own.
pub trait Datastore: Send + Sync {
    fn query(
        &self,
        sql: &str,
        params: &[Value],
        window: Option<RowWindow>,
    ) -> Result<Vec<Row>, DriverError>;

    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64, DriverError>;

    fn call(&self, sql: &str, params: &[CallParameter]) -> Result<CallOutcome, DriverError>;
}

/// One recorded driver invocation, for test assertions.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub sql: String,
    pub params: Vec<Value>,
    pub window: Option<RowWindow>,
}

#[derive(Default)]
struct Scripts {
    results: HashMap<String, Vec<Row>>,
    update_counts: HashMap<String, u64>,
    call_outcomes: HashMap<String, CallOutcome>,
    errors: HashMap<String, DriverError>,
    invocations: Vec<Invocation>,
}

/// In-memory scripted datastore: canned result sets, update counts and
/// procedure outcomes keyed by exact SQL text, with an invocation log.
/// Applies the pagination window the way a real driver would.
#[derive(Default)]
pub struct MemoryDatastore {
    scripts: Mutex<Scripts>,
}

impl MemoryDatastore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script_query(&self, sql: impl Into<String>, rows: Vec<Row>) {
        self.scripts
            .lock()
            .expect("scripts poisoned")
            .results
            .insert(sql.into(), rows);
    }

    pub fn script_update(&self, sql: impl Into<String>, count: u64) {
        self.scripts
            .lock()
            .expect("scripts poisoned")
            .update_counts
            .insert(sql.into(), count);
    }

    pub fn script_call(&self, sql: impl Into<String>, outcome: CallOutcome) {
        self.scripts
            .lock()
            .expect("scripts poisoned")
            .call_outcomes
            .insert(sql.into(), outcome);
    }

    pub fn script_error(&self, sql: impl Into<String>, error: DriverError) {
        self.scripts
            .lock()
            .expect("scripts poisoned")
            .errors
            .insert(sql.into(), error);
    }

    #[must_use]
    pub fn invocations(&self) -> Vec<Invocation> {
        self.scripts
            .lock()
            .expect("scripts poisoned")
            .invocations
            .clone()
    }

    #[must_use]
    pub fn last_invocation(&self) -> Option<Invocation> {
        self.scripts
            .lock()
            .expect("scripts poisoned")
            .invocations
            .last()
            .cloned()
    }

    fn record(&self, scripts: &mut Scripts, sql: &str, params: Vec<Value>, window: Option<RowWindow>) {
        scripts.invocations.push(Invocation {
            sql: sql.to_string(),
            params,
            window,
        });
    }
}

impl Datastore for MemoryDatastore {
    fn query(
        &self,
        sql: &str,
        params: &[Value],
        window: Option<RowWindow>,
    ) -> Result<Vec<Row>, DriverError> {
        let mut scripts = self.scripts.lock().expect("scripts poisoned");
        self.record(&mut scripts, sql, params.to_vec(), window);
        if let Some(error) = scripts.errors.get(sql) {
            return Err(error.clone());
        }
        let rows = scripts
            .results
            .get(sql)
            .cloned()
            .ok_or_else(|| DriverError::new(format!("no scripted result for: {sql}")))?;
        Ok(match window {
            Some(w) => rows.into_iter().skip(w.start).take(w.max).collect(),
            None => rows,
        })
    }

    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64, DriverError> {
        let mut scripts = self.scripts.lock().expect("scripts poisoned");
        self.record(&mut scripts, sql, params.to_vec(), None);
        if let Some(error) = scripts.errors.get(sql) {
            return Err(error.clone());
        }
        scripts
            .update_counts
            .get(sql)
            .copied()
            .ok_or_else(|| DriverError::new(format!("no scripted update count for: {sql}")))
    }

    fn call(&self, sql: &str, params: &[CallParameter]) -> Result<CallOutcome, DriverError> {
        let mut scripts = self.scripts.lock().expect("scripts poisoned");
        let in_values: Vec<Value> = params
            .iter()
            .filter_map(|p| match p {
                CallParameter::In(value) => Some(value.clone()),
                CallParameter::Out(_) => None,
            })
            .collect();
        self.record(&mut scripts, sql, in_values, None);
        if let Some(error) = scripts.errors.get(sql) {
            return Err(error.clone());
        }
        scripts
            .call_outcomes
            .get(sql)
            .cloned()
            .ok_or_else(|| DriverError::new(format!("no scripted call outcome for: {sql}")))
    }
}
