use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

use log::{debug, warn};

use crate::core::EngineError;
use crate::statement::BoundSql;

/// Process-wide map of compiled statements plus the set of resources
/// already compiled into it.
///
/// Reads (`resolve`) go through an `RwLock` and never wait on a
/// compilation: compiles run under the separate loaded-set mutex and only
/// take the statements write lock for the final insert. Holding the
/// loaded-set mutex across the compile is what guarantees each resource is
/// compiled at most once per factory lifetime — a concurrent loader of the
/// same resource blocks until the first compile finishes, then observes
/// its result.
pub struct StatementRegistry {
    statements: RwLock<HashMap<String, Arc<BoundSql>>>,
    loaded: Mutex<HashSet<String>>,
}

impl StatementRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            statements: RwLock::new(HashMap::new()),
            loaded: Mutex::new(HashSet::new()),
        }
    }

    /// Look up a compiled statement by id.
    pub fn resolve(&self, statement_id: &str) -> Result<Arc<BoundSql>, EngineError> {
        self.statements
            .read()
            .expect("statement map poisoned")
            .get(statement_id)
            .cloned()
            .ok_or_else(|| EngineError::UnknownStatement(statement_id.to_string()))
    }

    #[must_use]
    pub fn contains(&self, statement_id: &str) -> bool {
        self.statements
            .read()
            .expect("statement map poisoned")
            .contains_key(statement_id)
    }

    #[must_use]
    pub fn statement_count(&self) -> usize {
        self.statements.read().expect("statement map poisoned").len()
    }

    #[must_use]
    pub fn is_resource_loaded(&self, uri: &str) -> bool {
        self.loaded.lock().expect("loaded set poisoned").contains(uri)
    }

    /// Compile-once gate. Runs `compile` only if `uri` has not been loaded
    /// yet and registers its output; re-encountering a loaded resource is a
    /// no-op. Returns whether a compilation actually ran.
    ///
    /// Statement ids already present from an earlier resource are kept —
    /// first compilation wins — and the duplicate is logged and ignored.
    pub fn load_resource<F>(&self, uri: &str, compile: F) -> Result<bool, EngineError>
    where
        F: FnOnce() -> Result<Vec<(String, BoundSql)>, EngineError>,
    {
        let mut loaded = self.loaded.lock().expect("loaded set poisoned");
        if loaded.contains(uri) {
            debug!("resource '{uri}' already compiled, skipping");
            return Ok(false);
        }

        let compiled = compile()?;

        let mut statements = self.statements.write().expect("statement map poisoned");
        for (id, bound) in compiled {
            if statements.contains_key(&id) {
                warn!("duplicate statement id '{id}' from '{uri}' ignored, first compilation wins");
                continue;
            }
            statements.insert(id, Arc::new(bound));
        }
        drop(statements);

        loaded.insert(uri.to_string());
        debug!("resource '{uri}' compiled");
        Ok(true)
    }

    /// Discard every compiled statement and the loaded-resource set so the
    /// factory can recompile from scratch.
    pub fn refresh(&self) {
        let mut loaded = self.loaded.lock().expect("loaded set poisoned");
        let mut statements = self.statements.write().expect("statement map poisoned");
        statements.clear();
        loaded.clear();
        debug!("statement registry refreshed");
    }
}

impl Default for StatementRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statement::StatementKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn bound(sql: &str) -> BoundSql {
        BoundSql {
            kind: StatementKind::Select,
            sql: sql.to_string(),
            parameter_mappings: vec![],
            dynamic: None,
        }
    }

    #[test]
    fn test_resolve_unknown() {
        let registry = StatementRegistry::new();
        assert!(matches!(
            registry.resolve("does.not.exist"),
            Err(EngineError::UnknownStatement(_))
        ));
    }

    #[test]
    fn test_load_and_resolve() {
        let registry = StatementRegistry::new();
        let ran = registry
            .load_resource("a.xml", || Ok(vec![("q".to_string(), bound("SELECT 1"))]))
            .unwrap();
        assert!(ran);
        assert_eq!(registry.resolve("q").unwrap().sql, "SELECT 1");
    }

    #[test]
    fn test_idempotent_loading() {
        let registry = StatementRegistry::new();
        let compiles = AtomicUsize::new(0);
        for _ in 0..3 {
            registry
                .load_resource("a.xml", || {
                    compiles.fetch_add(1, Ordering::SeqCst);
                    Ok(vec![("q".to_string(), bound("SELECT 1"))])
                })
                .unwrap();
        }
        assert_eq!(compiles.load(Ordering::SeqCst), 1);
        assert_eq!(registry.statement_count(), 1);
    }

    #[test]
    fn test_duplicate_id_across_resources_first_wins() {
        let registry = StatementRegistry::new();
        registry
            .load_resource("a.xml", || Ok(vec![("q".to_string(), bound("SELECT 1"))]))
            .unwrap();
        registry
            .load_resource("b.xml", || Ok(vec![("q".to_string(), bound("SELECT 2"))]))
            .unwrap();
        assert_eq!(registry.resolve("q").unwrap().sql, "SELECT 1");
        assert!(registry.is_resource_loaded("b.xml"));
    }

    #[test]
    fn test_failed_compile_leaves_resource_unloaded() {
        let registry = StatementRegistry::new();
        let result = registry.load_resource("a.xml", || {
            Err(EngineError::compile("a.xml", "x", "boom"))
        });
        assert!(result.is_err());
        assert!(!registry.is_resource_loaded("a.xml"));
        // A later, fixed load goes through
        registry
            .load_resource("a.xml", || Ok(vec![("q".to_string(), bound("SELECT 1"))]))
            .unwrap();
        assert!(registry.contains("q"));
    }

    #[test]
    fn test_concurrent_loads_compile_once() {
        let registry = Arc::new(StatementRegistry::new());
        let compiles = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let compiles = Arc::clone(&compiles);
                std::thread::spawn(move || {
                    registry
                        .load_resource("shared.xml", || {
                            compiles.fetch_add(1, Ordering::SeqCst);
                            Ok(vec![("q".to_string(), bound("SELECT 1"))])
                        })
                        .unwrap();
                    // Every caller observes the compiled statement
                    assert!(registry.contains("q"));
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(compiles.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_refresh_discards_everything() {
        let registry = StatementRegistry::new();
        registry
            .load_resource("a.xml", || Ok(vec![("q".to_string(), bound("SELECT 1"))]))
            .unwrap();
        registry.refresh();
        assert!(!registry.contains("q"));
        assert!(!registry.is_resource_loaded("a.xml"));
        // Reload recompiles
        let ran = registry
            .load_resource("a.xml", || Ok(vec![("q".to_string(), bound("SELECT 1"))]))
            .unwrap();
        assert!(ran);
    }
}
