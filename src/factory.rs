use std::sync::Arc;

use log::info;

use crate::compiler::TemplateCompiler;
use crate::core::EngineError;
use crate::executor::{Datastore, SqlQuery};
use crate::mapper::{Mapper, MapperSpec};
use crate::registry::StatementRegistry;
use crate::settings::EngineSettings;
use crate::statement::{BoundSql, HelperRegistry};

/// The engine's entry point: owns the process-wide statement registry and
/// the injected helper registry, and produces per-datastore `SqlQuery`
/// façades and mapper dispatch tables that share them.
pub struct SqlMapFactory {
    registry: Arc<StatementRegistry>,
    helpers: Arc<HelperRegistry>,
    compiler: TemplateCompiler,
}

impl SqlMapFactory {
    /// Factory with the stock helper registry.
    #[must_use]
    pub fn new() -> Self {
        Self::with_helpers(HelperRegistry::with_defaults())
    }

    /// Factory with an explicitly configured helper registry. Helpers must
    /// be complete before any compilation begins; the registry is
    /// read-only afterward.
    #[must_use]
    pub fn with_helpers(helpers: HelperRegistry) -> Self {
        let helpers = Arc::new(helpers);
        Self {
            registry: Arc::new(StatementRegistry::new()),
            compiler: TemplateCompiler::new(Arc::clone(&helpers)),
            helpers,
        }
    }

    /// Factory booted from settings: loads every configured resource
    /// location. A compile failure aborts the boot — a partial registry is
    /// not safe to serve traffic from.
    pub fn from_settings(settings: &EngineSettings) -> Result<Self, EngineError> {
        let factory = Self::new();
        factory.load_resources(&settings.resource_locations)?;
        Ok(factory)
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<StatementRegistry> {
        &self.registry
    }

    #[must_use]
    pub fn helpers(&self) -> &Arc<HelperRegistry> {
        &self.helpers
    }

    /// Compile every location not already loaded, in the order given.
    /// Re-encountering a loaded location is a no-op; duplicate statement
    /// ids across locations keep the first compilation and log the rest.
    pub fn load_resources<S: AsRef<str>>(&self, locations: &[S]) -> Result<(), EngineError> {
        for location in locations {
            let location = location.as_ref();
            self.registry
                .load_resource(location, || self.compiler.compile_location(location))?;
        }
        info!(
            "statement registry holds {} statement(s) after loading {} location(s)",
            self.registry.statement_count(),
            locations.len()
        );
        Ok(())
    }

    /// Compile one resource supplied as in-memory content, for embedded
    /// statement sets. Subject to the same compile-once gate as file
    /// locations.
    pub fn load_resource_str(&self, uri: &str, content: &str) -> Result<(), EngineError> {
        self.registry
            .load_resource(uri, || self.compiler.compile_str(uri, content))?;
        Ok(())
    }

    /// Fresh stateless executor façade bound to a concrete datastore
    /// handle, sharing the process-wide registry.
    #[must_use]
    pub fn create_query(&self, datastore: Arc<dyn Datastore>) -> SqlQuery {
        SqlQuery::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.helpers),
            datastore,
        )
    }

    /// Dispatch-table mapper over the given spec, bound to a datastore.
    #[must_use]
    pub fn create_mapper(&self, spec: MapperSpec, datastore: Arc<dyn Datastore>) -> Mapper {
        Mapper::new(spec, self.create_query(datastore))
    }

    /// Resolved compiled artifact for a statement id — the explicit form
    /// of BoundSql injection, resolved by the caller at construction time.
    pub fn bound_sql(&self, statement_id: &str) -> Result<Arc<BoundSql>, EngineError> {
        self.registry.resolve(statement_id)
    }

    /// Compiled SQL text for a statement id. Dynamic statements have no
    /// fixed text; this returns their static rendering, which is empty.
    pub fn sql_text(&self, statement_id: &str) -> Result<String, EngineError> {
        Ok(self.registry.resolve(statement_id)?.sql.clone())
    }

    /// Discard the whole registry, including the loaded-resource set.
    pub fn refresh(&self) {
        self.registry.refresh();
    }

    /// Refresh, then recompile the given locations.
    pub fn reload<S: AsRef<str>>(&self, locations: &[S]) -> Result<(), EngineError> {
        self.refresh();
        self.load_resources(locations)
    }
}

impl Default for SqlMapFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_resource_str_and_lookup() {
        let factory = SqlMapFactory::new();
        factory
            .load_resource_str(
                "inline.xml",
                r#"<sqlmap namespace="sys"><select id="ping">SELECT 1</select></sqlmap>"#,
            )
            .unwrap();
        assert_eq!(factory.sql_text("sys.ping").unwrap(), "SELECT 1");
        assert!(factory.bound_sql("sys.ping").is_ok());
        assert!(matches!(
            factory.sql_text("sys.missing"),
            Err(EngineError::UnknownStatement(_))
        ));
    }

    #[test]
    fn test_compile_failure_is_fatal() {
        let factory = SqlMapFactory::new();
        let err = factory
            .load_resource_str("broken.xml", "<sqlmap><select>no id</select></sqlmap>")
            .unwrap_err();
        assert!(matches!(err, EngineError::Compile { .. }));
        assert_eq!(factory.registry().statement_count(), 0);
    }

    #[test]
    fn test_missing_location_is_a_compile_error() {
        let factory = SqlMapFactory::new();
        let err = factory
            .load_resources(&["/does/not/exist.xml"])
            .unwrap_err();
        assert!(matches!(err, EngineError::Compile { .. }));
        assert!(err.to_string().contains("/does/not/exist.xml"));
    }
}
