// sqlbind - dynamic SQL statement engine
// XML statement templates compiled into executable parameterized queries

// Clippy configuration - allow non-critical warnings
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::significant_drop_tightening)]

// Core model (values, rows, JDBC types, error taxonomy)
pub mod core;

// Bound statement model (compiled artifacts, dynamic nodes, helpers)
pub mod statement;

// Template compiler (XML statement sets, placeholder/expression grammars)
pub mod compiler;

// Statement registry (compiled statements, compile-once resource gate)
pub mod registry;

// Query executor (datastore abstraction, SqlQuery façade)
pub mod executor;

// Mapper dispatch tables (the explicit form of interface proxies)
pub mod mapper;

// Factory / lifecycle
pub mod factory;

// Engine settings
pub mod settings;

// Re-export commonly used types for convenience
pub use crate::core::{DriverError, EngineError, JdbcType, Row, Value};
pub use compiler::TemplateCompiler;
pub use executor::{
    CallOutcome, CallParameter, CallResult, Datastore, MemoryDatastore, RowWindow, SqlQuery,
};
pub use factory::SqlMapFactory;
pub use mapper::{CommandShape, Mapper, MapperResult, MapperSpec, MethodSpec, ReturnType};
pub use registry::StatementRegistry;
pub use settings::EngineSettings;
pub use statement::{
    BoundSql, HelperRegistry, ParameterMapping, ParameterMode, RenderedSql, StatementKind,
};
