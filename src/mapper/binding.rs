use crate::core::EngineError;

/// Declared return shape of a mapper method, the explicit stand-in for a
/// reflected method signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnType {
    /// A sequence of rows
    Sequence,
    /// A single untyped key-value row
    KeyValueMap,
    /// An affected-row count
    Integer,
    /// A typed scalar or row
    Scalar,
    /// No return value — rejected at binding time, there is no way to tell
    /// which command shape was intended
    Unit,
}

/// Execution mode of a mapper method, inferred from its return shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandShape {
    List,
    Map,
    Single,
    Update,
}

impl CommandShape {
    pub fn infer(method: &str, returns: ReturnType) -> Result<Self, EngineError> {
        match returns {
            ReturnType::Sequence => Ok(Self::List),
            ReturnType::KeyValueMap => Ok(Self::Map),
            ReturnType::Integer => Ok(Self::Update),
            ReturnType::Scalar => Ok(Self::Single),
            ReturnType::Unit => Err(EngineError::UnsupportedReturnType(method.to_string())),
        }
    }
}

/// One method of a mapper: its name, an optional statement-id override,
/// and its declared return shape.
#[derive(Debug, Clone)]
pub struct MethodSpec {
    pub name: String,
    pub statement: Option<String>,
    pub returns: ReturnType,
}

impl MethodSpec {
    #[must_use]
    pub fn new(name: impl Into<String>, returns: ReturnType) -> Self {
        Self {
            name: name.into(),
            statement: None,
            returns,
        }
    }

    /// Explicit statement-id override for this method.
    #[must_use]
    pub fn with_statement(mut self, statement_id: impl Into<String>) -> Self {
        self.statement = Some(statement_id.into());
        self
    }
}

/// Construction-time description of a mapper: the optional namespace plus
/// every dispatchable method.
#[derive(Debug, Clone, Default)]
pub struct MapperSpec {
    pub namespace: Option<String>,
    pub methods: Vec<MethodSpec>,
}

impl MapperSpec {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            methods: Vec::new(),
        }
    }

    #[must_use]
    pub fn method(mut self, method: MethodSpec) -> Self {
        self.methods.push(method);
        self
    }
}

/// A method's resolved dispatch entry: computed once on first use, cached
/// for the lifetime of the mapper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodBinding {
    pub statement_id: String,
    pub shape: CommandShape,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_inference() {
        assert_eq!(
            CommandShape::infer("m", ReturnType::Sequence).unwrap(),
            CommandShape::List
        );
        assert_eq!(
            CommandShape::infer("m", ReturnType::KeyValueMap).unwrap(),
            CommandShape::Map
        );
        assert_eq!(
            CommandShape::infer("m", ReturnType::Integer).unwrap(),
            CommandShape::Update
        );
        assert_eq!(
            CommandShape::infer("m", ReturnType::Scalar).unwrap(),
            CommandShape::Single
        );
    }

    #[test]
    fn test_unit_return_is_rejected() {
        let err = CommandShape::infer("fireAndForget", ReturnType::Unit).unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedReturnType(name) if name == "fireAndForget"));
    }
}
