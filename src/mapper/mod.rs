// Module declarations
pub mod binding;
pub mod proxy;

// Re-exports for convenience
pub use binding::{CommandShape, MapperSpec, MethodBinding, MethodSpec, ReturnType};
pub use proxy::{Mapper, MapperResult};
