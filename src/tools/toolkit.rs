use std::sync::Arc;
use std::time::Duration;

use super::implementations::{ListFilesTool, ReadFileTool, RunScriptTool, WriteFileTool};
use super::registry::{AgentTool, RegistryError, ToolRegistry};
use super::sandbox::ProcessSandbox;
use crate::constants::{
    LIST_FILES_TOOL, MAX_READ_BYTES, READ_FILE_TOOL, RUN_SCRIPT_TOOL, SCRIPT_EXTENSION,
    SCRIPT_TIMEOUT_SECS, WRITE_FILE_TOOL, get_interpreter,
};
use crate::logging::log_debug;

/// The closed set of file operations the toolkit can expose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileOperation {
    ReadFile,
    ListFiles,
    WriteFile,
    RunScript,
}

impl FileOperation {
    pub const ALL: [FileOperation; 4] = [
        FileOperation::ReadFile,
        FileOperation::ListFiles,
        FileOperation::WriteFile,
        FileOperation::RunScript,
    ];

    /// Name used on the model-facing protocol
    pub fn name(self) -> &'static str {
        match self {
            FileOperation::ReadFile => READ_FILE_TOOL,
            FileOperation::ListFiles => LIST_FILES_TOOL,
            FileOperation::WriteFile => WRITE_FILE_TOOL,
            FileOperation::RunScript => RUN_SCRIPT_TOOL,
        }
    }

    /// Writes files or runs code
    pub fn is_mutating(self) -> bool {
        matches!(self, FileOperation::WriteFile | FileOperation::RunScript)
    }
}

/// Configurable bundle of file operations confined to the agent's working root
#[derive(Debug, Clone)]
pub struct FileOperationToolkit {
    enable_read: bool,
    enable_list: bool,
    enable_write: bool,
    enable_execute: bool,
    max_read_bytes: usize,
    script_timeout: Duration,
    interpreter: String,
    script_extension: String,
}

impl FileOperationToolkit {
    /// All operations enabled, default limits
    pub fn new() -> Self {
        Self {
            enable_read: true,
            enable_list: true,
            enable_write: true,
            enable_execute: true,
            max_read_bytes: MAX_READ_BYTES,
            script_timeout: Duration::from_secs(SCRIPT_TIMEOUT_SECS),
            interpreter: get_interpreter(),
            script_extension: SCRIPT_EXTENSION.to_string(),
        }
    }

    /// Only the operations that leave the working directory untouched
    pub fn read_only() -> Self {
        FileOperation::ALL
            .into_iter()
            .fold(Self::new(), |toolkit, op| toolkit.with_operation(op, !op.is_mutating()))
    }

    pub fn with_operation(self, operation: FileOperation, enable: bool) -> Self {
        match operation {
            FileOperation::ReadFile => self.with_read(enable),
            FileOperation::ListFiles => self.with_list(enable),
            FileOperation::WriteFile => self.with_write(enable),
            FileOperation::RunScript => self.with_execute(enable),
        }
    }

    pub fn with_read(mut self, enable: bool) -> Self {
        self.enable_read = enable;
        self
    }

    pub fn with_list(mut self, enable: bool) -> Self {
        self.enable_list = enable;
        self
    }

    pub fn with_write(mut self, enable: bool) -> Self {
        self.enable_write = enable;
        self
    }

    pub fn with_execute(mut self, enable: bool) -> Self {
        self.enable_execute = enable;
        self
    }

    pub fn with_max_read_bytes(mut self, max: usize) -> Self {
        self.max_read_bytes = max;
        self
    }

    pub fn with_script_timeout(mut self, timeout: Duration) -> Self {
        self.script_timeout = timeout;
        self
    }

    pub fn with_interpreter(mut self, interpreter: impl Into<String>) -> Self {
        self.interpreter = interpreter.into();
        self
    }

    pub fn with_script_extension(mut self, extension: impl Into<String>) -> Self {
        self.script_extension = extension.into();
        self
    }

    pub fn operations(&self) -> Vec<FileOperation> {
        FileOperation::ALL
            .into_iter()
            .filter(|op| match op {
                FileOperation::ReadFile => self.enable_read,
                FileOperation::ListFiles => self.enable_list,
                FileOperation::WriteFile => self.enable_write,
                FileOperation::RunScript => self.enable_execute,
            })
            .collect()
    }

    pub fn build_tool(&self, operation: FileOperation) -> Arc<dyn AgentTool> {
        match operation {
            FileOperation::ReadFile => Arc::new(ReadFileTool::new(self.max_read_bytes)),
            FileOperation::ListFiles => Arc::new(ListFilesTool),
            FileOperation::WriteFile => Arc::new(WriteFileTool),
            FileOperation::RunScript => Arc::new(RunScriptTool::new(
                ProcessSandbox::new(self.script_timeout),
                self.interpreter.clone(),
                self.script_extension.clone(),
            )),
        }
    }

    /// Register every enabled operation
    ///
    /// Fails on the first name already present in `registry`; operations
    /// registered before the failure stay registered.
    pub fn register(&self, registry: &mut ToolRegistry) -> Result<(), RegistryError> {
        for operation in self.operations() {
            log_debug(&format!("Registering tool {}", operation.name()));
            registry.register(self.build_tool(operation))?;
        }
        Ok(())
    }
}

impl Default for FileOperationToolkit {
    fn default() -> Self {
        Self::new()
    }
}
