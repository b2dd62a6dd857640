use thiserror::Error;

/// Raised by a `Datastore` implementation. The engine passes these through
/// unchanged, only attaching the statement id and argument count.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct DriverError {
    pub message: String,
    /// Vendor error code, when the driver reports one
    pub code: Option<String>,
}

impl DriverError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    pub fn with_code(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: Some(code.into()),
        }
    }
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Failed to compile '{resource}' (statement '{statement}'): {message}")]
    Compile {
        resource: String,
        statement: String,
        message: String,
    },
    #[error("Unknown statement id '{0}'")]
    UnknownStatement(String),
    #[error("SQL text is empty for statement id '{0}'")]
    EmptyStatement(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Unsupported return type for mapper method '{0}'")]
    UnsupportedReturnType(String),
    #[error("Statement '{statement_id}' expected {expected} row(s), got {actual}")]
    ResultSize {
        statement_id: String,
        expected: usize,
        actual: usize,
    },
    #[error("Driver error in statement '{statement_id}' ({arg_count} argument(s)): {source}")]
    Driver {
        statement_id: String,
        arg_count: usize,
        #[source]
        source: DriverError,
    },
    #[error("Row mapping error: {0}")]
    RowMapping(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Shorthand used throughout the compiler, where every failure must
    /// carry the offending resource URI and statement name.
    pub fn compile(
        resource: impl Into<String>,
        statement: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Compile {
            resource: resource.into(),
            statement: statement.into(),
            message: message.into(),
        }
    }
}
