use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, warn};
use serde::de::DeserializeOwned;

use crate::core::{EngineError, Row, Value};
use crate::registry::StatementRegistry;
use crate::statement::{HelperRegistry, ParamBag, ParameterMapping, RenderedSql};

use super::datastore::{CallParameter, Datastore, RowWindow};

/// Result of a stored-procedure invocation, with OUT values re-keyed by
/// property name.
#[derive(Debug, Clone, PartialEq)]
pub struct CallResult {
    pub rows: Vec<Row>,
    pub out_params: HashMap<String, Value>,
    pub update_count: Option<u64>,
}

/// A statement prepared for one call: rendered SQL, surviving mappings,
/// and the values for its IN mappings in order. Call-local by
/// construction, so concurrent callers cannot observe each other's
/// parameter state.
struct Prepared {
    sql: String,
    mappings: Vec<ParameterMapping>,
    values: Vec<Value>,
}

/// Stateless executor façade bound to one datastore handle. All entry
/// points resolve the statement first, so a missing id fails with
/// `UnknownStatement` and an empty compiled text with `EmptyStatement`
/// before the driver is ever touched.
pub struct SqlQuery {
    registry: Arc<StatementRegistry>,
    helpers: Arc<HelperRegistry>,
    datastore: Arc<dyn Datastore>,
}

impl SqlQuery {
    pub(crate) fn new(
        registry: Arc<StatementRegistry>,
        helpers: Arc<HelperRegistry>,
        datastore: Arc<dyn Datastore>,
    ) -> Self {
        Self {
            registry,
            helpers,
            datastore,
        }
    }

    /// All rows of a statement, as ordered column → value rows.
    pub fn query_for_list(
        &self,
        statement_id: &str,
        args: &[Value],
    ) -> Result<Vec<Row>, EngineError> {
        self.run_query(statement_id, args, None)
    }

    /// Rows `[start, start + max)` of a statement's result.
    pub fn query_for_list_paged(
        &self,
        statement_id: &str,
        start: i64,
        max: i64,
        args: &[Value],
    ) -> Result<Vec<Row>, EngineError> {
        if start < 0 || max <= 0 {
            return Err(EngineError::InvalidArgument(format!(
                "Invalid pagination window: start={start}, max={max}"
            )));
        }
        self.run_query(
            statement_id,
            args,
            Some(RowWindow {
                start: start as usize,
                max: max as usize,
            }),
        )
    }

    /// List query mapped onto a target shape instead of generic rows.
    pub fn query_for_list_as<T: DeserializeOwned>(
        &self,
        statement_id: &str,
        args: &[Value],
    ) -> Result<Vec<T>, EngineError> {
        self.query_for_list(statement_id, args)?
            .into_iter()
            .map(|row| serde_json::from_value(row.to_json()).map_err(EngineError::from))
            .collect()
    }

    /// Exactly-one-row query; anything else is a `ResultSize` error.
    pub fn query_for_object(
        &self,
        statement_id: &str,
        args: &[Value],
    ) -> Result<Row, EngineError> {
        let mut rows = self.query_for_list(statement_id, args)?;
        match rows.len() {
            1 => Ok(rows.remove(0)),
            actual => Err(EngineError::ResultSize {
                statement_id: statement_id.to_string(),
                expected: 1,
                actual,
            }),
        }
    }

    /// Typed single-row variant.
    pub fn query_for_object_as<T: DeserializeOwned>(
        &self,
        statement_id: &str,
        args: &[Value],
    ) -> Result<T, EngineError> {
        let row = self.query_for_object(statement_id, args)?;
        serde_json::from_value(row.to_json()).map_err(EngineError::from)
    }

    /// Execute an insert/update/delete, returning the affected row count.
    pub fn execute_update(&self, statement_id: &str, args: &[Value]) -> Result<u64, EngineError> {
        let prepared = self.prepare(statement_id, args)?;
        debug!(
            "executing update '{statement_id}' with {} argument(s)",
            prepared.values.len()
        );
        self.datastore
            .execute(&prepared.sql, &prepared.values)
            .map_err(|source| self.driver_error(statement_id, prepared.values.len(), source))
    }

    /// Stored-procedure path: every IN mapping binds the next argument in
    /// mapping order, every OUT mapping is declared to the call mechanism
    /// unbound, regardless of interleaving. OUT values come back keyed by
    /// property name.
    pub fn call(&self, statement_id: &str, args: &[Value]) -> Result<CallResult, EngineError> {
        let prepared = self.prepare(statement_id, args)?;
        let mut call_params = Vec::with_capacity(prepared.mappings.len());
        let mut in_values = prepared.values.iter();
        for mapping in &prepared.mappings {
            if mapping.is_in() {
                call_params.push(CallParameter::In(
                    in_values.next().cloned().unwrap_or(Value::Null),
                ));
            } else {
                call_params.push(CallParameter::Out(mapping.jdbc_type));
            }
        }
        debug!(
            "calling procedure '{statement_id}' with {} declared parameter(s)",
            call_params.len()
        );
        let outcome = self
            .datastore
            .call(&prepared.sql, &call_params)
            .map_err(|source| self.driver_error(statement_id, prepared.values.len(), source))?;

        let mut out_params = HashMap::new();
        for (ordinal, value) in outcome.out_values {
            match prepared.mappings.get(ordinal) {
                Some(mapping) => {
                    out_params.insert(mapping.property.clone(), value);
                }
                None => warn!(
                    "procedure '{statement_id}' returned OUT value at undeclared position {ordinal}"
                ),
            }
        }
        Ok(CallResult {
            rows: outcome.rows,
            out_params,
            update_count: outcome.update_count,
        })
    }

    fn run_query(
        &self,
        statement_id: &str,
        args: &[Value],
        window: Option<RowWindow>,
    ) -> Result<Vec<Row>, EngineError> {
        let prepared = self.prepare(statement_id, args)?;
        debug!(
            "executing query '{statement_id}' with {} argument(s), window {window:?}",
            prepared.values.len()
        );
        self.datastore
            .query(&prepared.sql, &prepared.values, window)
            .map_err(|source| self.driver_error(statement_id, prepared.values.len(), source))
    }

    /// Resolve and render the statement, then bind the positional
    /// arguments. The returned state is call-local.
    fn prepare(&self, statement_id: &str, args: &[Value]) -> Result<Prepared, EngineError> {
        let bound = self.registry.resolve(statement_id)?;
        let in_count = bound
            .parameter_mappings
            .iter()
            .filter(|m| m.is_in())
            .count();

        let (rendered, values) = if bound.is_dynamic() {
            if args.len() > in_count {
                return Err(EngineError::InvalidArgument(format!(
                    "Statement '{statement_id}' declares {in_count} IN parameter(s), got {} argument(s)",
                    args.len()
                )));
            }
            // Missing trailing arguments stay out of the bag and evaluate
            // as Null, so "x != null" guards drop their fragments.
            let mut bag = ParamBag::new();
            let mut next = 0;
            for mapping in &bound.parameter_mappings {
                if mapping.is_in() {
                    if let Some(value) = args.get(next) {
                        bag.insert(mapping.property.clone(), value.clone());
                    }
                    next += 1;
                }
            }
            let rendered = bound.render(&bag, &self.helpers)?;
            let values = rendered
                .mappings
                .iter()
                .filter(|m| m.is_in())
                .map(|m| bag.get(&m.property).cloned().unwrap_or(Value::Null))
                .collect();
            (rendered, values)
        } else {
            if bound.sql.trim().is_empty() {
                return Err(EngineError::EmptyStatement(statement_id.to_string()));
            }
            if args.len() != in_count {
                return Err(EngineError::InvalidArgument(format!(
                    "Statement '{statement_id}' expects {in_count} argument(s), got {}",
                    args.len()
                )));
            }
            let rendered = RenderedSql {
                sql: bound.sql.clone(),
                mappings: bound.parameter_mappings.clone(),
            };
            (rendered, args.to_vec())
        };

        if rendered.sql.trim().is_empty() {
            return Err(EngineError::EmptyStatement(statement_id.to_string()));
        }
        Ok(Prepared {
            sql: rendered.sql,
            mappings: rendered.mappings,
            values,
        })
    }

    fn driver_error(
        &self,
        statement_id: &str,
        arg_count: usize,
        source: crate::core::DriverError,
    ) -> EngineError {
        EngineError::Driver {
            statement_id: statement_id.to_string(),
            arg_count,
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::TemplateCompiler;
    use crate::executor::datastore::{CallOutcome, MemoryDatastore};
    use serde::Deserialize;

    fn engine(xml: &str) -> (SqlQuery, Arc<MemoryDatastore>) {
        let helpers = Arc::new(HelperRegistry::with_defaults());
        let compiler = TemplateCompiler::new(Arc::clone(&helpers));
        let registry = Arc::new(StatementRegistry::new());
        registry
            .load_resource("test.xml", || compiler.compile_str("test.xml", xml))
            .unwrap();
        let datastore = Arc::new(MemoryDatastore::new());
        let query = SqlQuery::new(registry, helpers, Arc::clone(&datastore) as Arc<dyn Datastore>);
        (query, datastore)
    }

    fn user_row(id: i64, name: &str) -> Row {
        Row::new(
            vec!["id".to_string(), "name".to_string()],
            vec![Value::Integer(id), Value::from(name)],
        )
    }

    const USERS_XML: &str = r#"<sqlmap namespace="user">
        <select id="findAll">SELECT id, name FROM users</select>
        <select id="findById">SELECT id, name FROM users WHERE id = #{id}</select>
        <update id="rename">UPDATE users SET name = #{name} WHERE id = #{id}</update>
        <update id="blank"> </update>
        <procedure id="promote">
            {call promote_user(?, ?, ?)}
            <parameter property="userId" jdbcType="BIGINT" mode="IN"/>
            <parameter property="status" jdbcType="INTEGER" mode="OUT"/>
            <parameter property="grade" jdbcType="VARCHAR" mode="IN"/>
        </procedure>
    </sqlmap>"#;

    #[test]
    fn test_query_for_list() {
        let (query, datastore) = engine(USERS_XML);
        datastore.script_query(
            "SELECT id, name FROM users",
            vec![user_row(1, "Alice"), user_row(2, "Bob")],
        );
        let rows = query.query_for_list("user.findAll", &[]).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("name"), Some(&Value::from("Alice")));
    }

    #[test]
    fn test_query_binds_positional_args() {
        let (query, datastore) = engine(USERS_XML);
        datastore.script_query(
            "SELECT id, name FROM users WHERE id = ?",
            vec![user_row(7, "Greta")],
        );
        query
            .query_for_list("user.findById", &[Value::Integer(7)])
            .unwrap();
        let invocation = datastore.last_invocation().unwrap();
        assert_eq!(invocation.params, vec![Value::Integer(7)]);
    }

    #[test]
    fn test_pagination_boundary() {
        let (query, datastore) = engine(USERS_XML);
        let rows: Vec<Row> = (0..25).map(|i| user_row(i, "user")).collect();
        datastore.script_query("SELECT id, name FROM users", rows);

        let page = query
            .query_for_list_paged("user.findAll", 0, 10, &[])
            .unwrap();
        assert_eq!(page.len(), 10);
        assert_eq!(page[0].get("id"), Some(&Value::Integer(0)));

        let page = query
            .query_for_list_paged("user.findAll", 20, 10, &[])
            .unwrap();
        assert_eq!(page.len(), 5);
        assert_eq!(page[0].get("id"), Some(&Value::Integer(20)));
    }

    #[test]
    fn test_pagination_rejects_bad_window() {
        let (query, _) = engine(USERS_XML);
        assert!(matches!(
            query.query_for_list_paged("user.findAll", -1, 10, &[]),
            Err(EngineError::InvalidArgument(_))
        ));
        assert!(matches!(
            query.query_for_list_paged("user.findAll", 0, 0, &[]),
            Err(EngineError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_unknown_statement() {
        let (query, _) = engine(USERS_XML);
        assert!(matches!(
            query.query_for_object("does.not.exist", &[]),
            Err(EngineError::UnknownStatement(_))
        ));
    }

    #[test]
    fn test_empty_statement() {
        let (query, _) = engine(USERS_XML);
        assert!(matches!(
            query.execute_update("user.blank", &[]),
            Err(EngineError::EmptyStatement(_))
        ));
    }

    #[test]
    fn test_query_for_object_result_size() {
        let (query, datastore) = engine(USERS_XML);
        datastore.script_query(
            "SELECT id, name FROM users WHERE id = ?",
            vec![user_row(1, "Alice")],
        );
        let row = query
            .query_for_object("user.findById", &[Value::Integer(1)])
            .unwrap();
        assert_eq!(row.get("name"), Some(&Value::from("Alice")));

        datastore.script_query("SELECT id, name FROM users WHERE id = ?", vec![]);
        assert!(matches!(
            query.query_for_object("user.findById", &[Value::Integer(1)]),
            Err(EngineError::ResultSize { actual: 0, .. })
        ));

        datastore.script_query(
            "SELECT id, name FROM users WHERE id = ?",
            vec![user_row(1, "Alice"), user_row(1, "Alias")],
        );
        assert!(matches!(
            query.query_for_object("user.findById", &[Value::Integer(1)]),
            Err(EngineError::ResultSize { actual: 2, .. })
        ));
    }

    #[test]
    fn test_typed_mapping() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct User {
            id: i64,
            name: String,
        }

        let (query, datastore) = engine(USERS_XML);
        datastore.script_query(
            "SELECT id, name FROM users",
            vec![user_row(1, "Alice"), user_row(2, "Bob")],
        );
        let users: Vec<User> = query.query_for_list_as("user.findAll", &[]).unwrap();
        assert_eq!(
            users,
            vec![
                User {
                    id: 1,
                    name: "Alice".to_string()
                },
                User {
                    id: 2,
                    name: "Bob".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_execute_update() {
        let (query, datastore) = engine(USERS_XML);
        datastore.script_update("UPDATE users SET name = ? WHERE id = ?", 1);
        let affected = query
            .execute_update("user.rename", &[Value::from("Carol"), Value::Integer(3)])
            .unwrap();
        assert_eq!(affected, 1);
        let invocation = datastore.last_invocation().unwrap();
        assert_eq!(
            invocation.params,
            vec![Value::from("Carol"), Value::Integer(3)]
        );
    }

    #[test]
    fn test_static_arity_is_enforced() {
        let (query, _) = engine(USERS_XML);
        assert!(matches!(
            query.execute_update("user.rename", &[Value::from("Carol")]),
            Err(EngineError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_call_binds_in_order_with_interleaved_out() {
        let (query, datastore) = engine(USERS_XML);
        let mut outcome = CallOutcome::default();
        outcome.out_values.insert(1, Value::Integer(200));
        outcome.update_count = Some(1);
        datastore.script_call("{call promote_user(?, ?, ?)}", outcome);

        // Mapping order is [IN userId, OUT status, IN grade]: args bind the
        // IN mappings sequentially regardless of the interleaved OUT.
        let result = query
            .call("user.promote", &[Value::Integer(42), Value::from("gold")])
            .unwrap();
        assert_eq!(result.out_params.get("status"), Some(&Value::Integer(200)));
        assert_eq!(result.update_count, Some(1));

        let invocation = datastore.last_invocation().unwrap();
        assert_eq!(
            invocation.params,
            vec![Value::Integer(42), Value::from("gold")]
        );
    }

    #[test]
    fn test_driver_error_attaches_statement_context() {
        let (query, datastore) = engine(USERS_XML);
        datastore.script_error(
            "SELECT id, name FROM users WHERE id = ?",
            crate::core::DriverError::with_code("deadlock detected", "40P01"),
        );
        let err = query
            .query_for_list("user.findById", &[Value::Integer(1)])
            .unwrap_err();
        match err {
            EngineError::Driver {
                statement_id,
                arg_count,
                source,
            } => {
                assert_eq!(statement_id, "user.findById");
                assert_eq!(arg_count, 1);
                assert_eq!(source.code.as_deref(), Some("40P01"));
            }
            other => panic!("Expected Driver error, got {other:?}"),
        }
    }

    #[test]
    fn test_dynamic_statement_with_missing_args() {
        let xml = r#"<sqlmap namespace="user">
            <select id="search">
                SELECT id, name FROM users
                <where>
                    <if test="name != null">AND name = #{name}</if>
                    <if test="minAge != null">AND age >= #{minAge}</if>
                </where>
            </select>
        </sqlmap>"#;
        let (query, datastore) = engine(xml);
        datastore.script_query(
            "SELECT id, name FROM users WHERE name = ?",
            vec![user_row(1, "Alice")],
        );
        // Only the first argument supplied: the minAge guard drops out
        let rows = query
            .query_for_list("user.search", &[Value::from("Alice")])
            .unwrap();
        assert_eq!(rows.len(), 1);
        let invocation = datastore.last_invocation().unwrap();
        assert_eq!(invocation.sql, "SELECT id, name FROM users WHERE name = ?");
        assert_eq!(invocation.params, vec![Value::from("Alice")]);

        datastore.script_query("SELECT id, name FROM users", vec![user_row(1, "Alice")]);
        let rows = query.query_for_list("user.search", &[]).unwrap();
        assert_eq!(rows.len(), 1);
    }
}
