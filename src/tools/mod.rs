//! Tool registration and execution.

pub mod arguments;
pub mod registry;
pub mod tool;
pub mod types;
pub mod validation;

pub use arguments::ToolArguments;
pub use registry::{ToolRegistry, ToolRegistryBuilder};
pub use tool::{FnTool, Tool, ToolExecutionContext, SESSION_ID_ARG};
pub use types::{ParameterBuilder, ToolDescriptor, ToolParameters};
pub use validation::validate_arguments;
