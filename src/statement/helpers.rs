use std::collections::HashMap;
use std::sync::Arc;

use crate::core::Value;

/// A template helper: a named callable available inside `test` expressions.
pub type HelperFn = dyn Fn(&[Value]) -> Value + Send + Sync;

/// Name → callable map consulted when rendering conditional SQL fragments.
/// Built once before any compilation begins and read-only afterward, so it
/// can be shared across compiling and executing threads without locking.
///
/// An explicit value injected at construction rather than process-global
/// state; independently configured registries can coexist in one process.
#[derive(Clone)]
pub struct HelperRegistry {
    helpers: HashMap<String, Arc<HelperFn>>,
}

impl HelperRegistry {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            helpers: HashMap::new(),
        }
    }

    /// Registry preloaded with the stock helpers: `isEmpty`, `isNotEmpty`,
    /// `isNull`, `isNotNull`.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register("isEmpty", |args: &[Value]| {
            Value::Boolean(args.first().map_or(true, is_empty_value))
        });
        registry.register("isNotEmpty", |args: &[Value]| {
            Value::Boolean(!args.first().map_or(true, is_empty_value))
        });
        registry.register("isNull", |args: &[Value]| {
            Value::Boolean(args.first().map_or(true, Value::is_null))
        });
        registry.register("isNotNull", |args: &[Value]| {
            Value::Boolean(!args.first().map_or(true, Value::is_null))
        });
        registry
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        helper: impl Fn(&[Value]) -> Value + Send + Sync + 'static,
    ) {
        self.helpers.insert(name.into(), Arc::new(helper));
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.helpers.contains_key(name)
    }

    #[must_use]
    pub fn call(&self, name: &str, args: &[Value]) -> Option<Value> {
        self.helpers.get(name).map(|helper| helper(args))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.helpers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.helpers.is_empty()
    }
}

impl Default for HelperRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Text(s) => s.is_empty(),
        _ => false,
    }
}
