/// Tools module for function calling
///
/// This module provides everything the agent loop dispatches to:
/// - Boundary checks confining every path to the working root
/// - Tool trait and registry mapping names to handlers and descriptors
/// - Process sandbox for running scripts under a timeout
/// - File operation toolkit (read, list, write, execute)
/// - Tool executor turning a call into a function response
mod executor;
mod implementations;
mod registry;
mod sandbox;
mod security;
mod toolkit;

pub use executor::ToolExecutor;
pub use implementations::{ListFilesTool, ReadFileTool, RunScriptTool, WriteFileTool};
pub use registry::{
    AgentTool, ParameterSchema, PropertySchema, RegistryEntry, RegistryError, ToolDescriptor,
    ToolRegistry,
};
pub use sandbox::{ProcessOutput, ProcessSandbox, SandboxError};
pub use security::{BoundaryError, is_contained, resolve_path, resolve_within};
pub use toolkit::{FileOperation, FileOperationToolkit};
