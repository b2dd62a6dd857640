// Module declarations
pub mod error;
pub mod jdbc_type;
pub mod row;
pub mod value;

// Re-exports for convenience
pub use error::{DriverError, EngineError};
pub use jdbc_type::JdbcType;
pub use row::Row;
pub use value::Value;
