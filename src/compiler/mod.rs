// Module declarations
pub mod grammar;
mod xml;

pub use xml::DocumentParser;

use std::sync::Arc;

use log::debug;

use crate::core::EngineError;
use crate::statement::{BoundSql, HelperRegistry};

/// Compiles statement-definition resources into `BoundSql` artifacts.
/// The helper registry is injected at construction; independently
/// configured compilers can coexist in one process.
pub struct TemplateCompiler {
    helpers: Arc<HelperRegistry>,
}

impl TemplateCompiler {
    #[must_use]
    pub fn new(helpers: Arc<HelperRegistry>) -> Self {
        Self { helpers }
    }

    #[must_use]
    pub fn helpers(&self) -> &Arc<HelperRegistry> {
        &self.helpers
    }

    /// Compile one resource from in-memory content. `resource` is the URI
    /// used in diagnostics.
    pub fn compile_str(
        &self,
        resource: &str,
        content: &str,
    ) -> Result<Vec<(String, BoundSql)>, EngineError> {
        debug!("compiling statement resource '{resource}'");
        let compiled = DocumentParser::new(resource, content).compile(&self.helpers)?;
        debug!(
            "compiled {} statement(s) from '{resource}'",
            compiled.len()
        );
        Ok(compiled)
    }

    /// Compile a resource addressed by filesystem path, with an optional
    /// `file:` prefix.
    pub fn compile_location(&self, location: &str) -> Result<Vec<(String, BoundSql)>, EngineError> {
        let path = location.strip_prefix("file:").unwrap_or(location);
        let content = std::fs::read_to_string(path).map_err(|e| {
            EngineError::compile(location, "", format!("Unreadable resource: {e}"))
        })?;
        self.compile_str(location, &content)
    }
}
