/// Default model constants
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash-001";

/// Get default model from environment variable or default
pub fn get_default_model() -> String {
    std::env::var("PROTO_AGENT_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string())
}

/// Agent loop limits
pub const DEFAULT_MAX_ITERATIONS: usize = 20;

/// File tool limits
pub const MAX_READ_BYTES: usize = 10_000;
pub const MAX_PROCESS_OUTPUT_BYTES: usize = 64 * 1024;
pub const SCRIPT_TIMEOUT_SECS: u64 = 30;

/// Script execution
pub const DEFAULT_INTERPRETER: &str = "python3";
pub const SCRIPT_EXTENSION: &str = "py";

/// Get script interpreter from environment variable or default
pub fn get_interpreter() -> String {
    std::env::var("PROTO_AGENT_PYTHON")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_INTERPRETER.to_string())
}

/// Model-facing tool names
pub const READ_FILE_TOOL: &str = "get_file_content";
pub const LIST_FILES_TOOL: &str = "get_files_info";
pub const WRITE_FILE_TOOL: &str = "write_file";
pub const RUN_SCRIPT_TOOL: &str = "run_python_file";

/// API key environment variables, in lookup order
pub const API_KEY_ENV_VARS: &[&str] = &["GEMINI_API_KEY", "API_KEY"];

pub const SYSTEM_PROMPT: &str = "\
You are an AI coding agent.

When a user asks a question or makes a request, make a function call plan. You can perform the following operations:

- List files and directories
- Read file contents
- Write or overwrite files
- Execute Python files with optional arguments

Rules:
- All paths you provide must be relative to the working directory.
- Do not request or reference the working directory itself; it is injected automatically.
- Use file names and relative paths exactly as provided by the user.
";
