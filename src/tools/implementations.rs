/// File operation tools
///
/// Every tool follows the same pattern:
/// 1. Parse arguments from JSON
/// 2. Resolve the path against the working root and check the boundary
/// 3. Execute the operation
/// 4. Return the model-facing result text, or an error the model can react to
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;

use super::registry::{AgentTool, ParameterSchema, PropertySchema};
use super::sandbox::ProcessSandbox;
use super::security::resolve_within;
use crate::constants::{LIST_FILES_TOOL, READ_FILE_TOOL, RUN_SCRIPT_TOOL, WRITE_FILE_TOOL};

fn parse_args<T: for<'de> Deserialize<'de>>(tool: &str, args: Value) -> Result<T> {
    // Models sometimes send null for "no arguments"
    let args = if args.is_null() {
        Value::Object(Default::default())
    } else {
        args
    };
    serde_json::from_value(args).with_context(|| format!("Invalid arguments for {tool}"))
}

fn outside_root(action: &str, path: &str) -> anyhow::Error {
    anyhow!("Cannot {action} \"{path}\" as it is outside the permitted working directory")
}

// ============================================================================
// ReadFileTool
// ============================================================================

#[derive(Deserialize)]
struct ReadFileArgs {
    file_path: String,
}

pub struct ReadFileTool {
    max_bytes: usize,
}

impl ReadFileTool {
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }
}

#[async_trait]
impl AgentTool for ReadFileTool {
    fn name(&self) -> &str {
        READ_FILE_TOOL
    }

    fn description(&self) -> &str {
        "Read the contents of a file and return them. \
         Large files are truncated and marked as such."
    }

    fn parameters(&self) -> ParameterSchema {
        ParameterSchema::object().required_property(
            "file_path",
            PropertySchema::string("Path of the file to read, relative to the working directory"),
        )
    }

    async fn execute(&self, working_root: &Path, args: Value) -> Result<String> {
        let args: ReadFileArgs = parse_args(READ_FILE_TOOL, args)?;

        let path = resolve_within(working_root, &args.file_path)
            .map_err(|_| outside_root("read", &args.file_path))?;

        let metadata = match tokio::fs::metadata(&path).await {
            Ok(m) if m.is_file() => m,
            _ => {
                return Err(anyhow!(
                    "File not found or is not a regular file: \"{}\"",
                    args.file_path
                ));
            }
        };

        let file = tokio::fs::File::open(&path)
            .await
            .with_context(|| format!("Failed to open \"{}\"", args.file_path))?;

        let mut bytes = Vec::with_capacity(self.max_bytes.min(metadata.len() as usize));
        file.take(self.max_bytes as u64)
            .read_to_end(&mut bytes)
            .await
            .with_context(|| format!("Failed to read \"{}\"", args.file_path))?;

        let truncated = metadata.len() > self.max_bytes as u64;
        if truncated {
            trim_partial_char(&mut bytes);
        }

        let mut content = String::from_utf8_lossy(&bytes).into_owned();
        if truncated {
            content.push_str(&format!(
                "[...File \"{}\" truncated at {} bytes]",
                args.file_path, self.max_bytes
            ));
        }

        Ok(content)
    }
}

/// Drop a trailing multi-byte character that the read cap cut in half
fn trim_partial_char(bytes: &mut Vec<u8>) {
    let tail_start = bytes.len().saturating_sub(4);
    let Some(lead) = (tail_start..bytes.len())
        .rev()
        .find(|&i| bytes[i] & 0xC0 != 0x80)
    else {
        return;
    };

    let width = match bytes[lead] {
        b if b >= 0xF0 => 4,
        b if b >= 0xE0 => 3,
        b if b >= 0xC0 => 2,
        _ => 1,
    };
    if lead + width > bytes.len() {
        bytes.truncate(lead);
    }
}

// ============================================================================
// ListFilesTool
// ============================================================================

#[derive(Deserialize)]
struct ListFilesArgs {
    #[serde(default = "default_directory")]
    directory: String,
}

fn default_directory() -> String {
    ".".to_string()
}

pub struct ListFilesTool;

#[async_trait]
impl AgentTool for ListFilesTool {
    fn name(&self) -> &str {
        LIST_FILES_TOOL
    }

    fn description(&self) -> &str {
        "List files and directories with their size and type. \
         The directory is relative to the working directory; \
         if not provided, lists the working directory itself."
    }

    fn parameters(&self) -> ParameterSchema {
        ParameterSchema::object().property(
            "directory",
            PropertySchema::string("Directory to list, relative to the working directory"),
        )
    }

    async fn execute(&self, working_root: &Path, args: Value) -> Result<String> {
        let args: ListFilesArgs = parse_args(LIST_FILES_TOOL, args)?;

        let path = resolve_within(working_root, &args.directory)
            .map_err(|_| outside_root("list", &args.directory))?;

        if !tokio::fs::metadata(&path)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
        {
            return Err(anyhow!("\"{}\" is not a directory", args.directory));
        }

        let mut listing = String::new();
        let mut dir_reader = tokio::fs::read_dir(&path)
            .await
            .with_context(|| format!("Failed to read directory \"{}\"", args.directory))?;

        while let Some(entry) = dir_reader
            .next_entry()
            .await
            .context("Failed to read directory entry")?
        {
            // Follows symlinks, like the size a user would see for the target
            let metadata = match tokio::fs::metadata(entry.path()).await {
                Ok(metadata) => metadata,
                Err(_) => tokio::fs::symlink_metadata(entry.path()).await?,
            };
            listing.push_str(&format!(
                "- {}: file_size={} bytes, is_dir={}\n",
                entry.file_name().to_string_lossy(),
                metadata.len(),
                metadata.is_dir()
            ));
        }

        Ok(listing)
    }
}

// ============================================================================
// WriteFileTool
// ============================================================================

#[derive(Deserialize)]
struct WriteFileArgs {
    file_path: String,
    content: String,
}

pub struct WriteFileTool;

#[async_trait]
impl AgentTool for WriteFileTool {
    fn name(&self) -> &str {
        WRITE_FILE_TOOL
    }

    fn description(&self) -> &str {
        "Write content to a file. Creates the file if it doesn't exist, \
         overwrites it completely if it does. Parent directories must already exist."
    }

    fn parameters(&self) -> ParameterSchema {
        ParameterSchema::object()
            .required_property(
                "file_path",
                PropertySchema::string(
                    "Path of the file to write, relative to the working directory",
                ),
            )
            .required_property("content", PropertySchema::string("Content to write to the file"))
    }

    async fn execute(&self, working_root: &Path, args: Value) -> Result<String> {
        let args: WriteFileArgs = parse_args(WRITE_FILE_TOOL, args)?;

        let path = resolve_within(working_root, &args.file_path)
            .map_err(|_| outside_root("write to", &args.file_path))?;

        tokio::fs::write(&path, &args.content)
            .await
            .with_context(|| format!("Failed to write \"{}\"", args.file_path))?;

        Ok(format!(
            "Successfully wrote to \"{}\" ({} characters written)",
            args.file_path,
            args.content.chars().count()
        ))
    }
}

// ============================================================================
// RunScriptTool
// ============================================================================

#[derive(Deserialize)]
struct RunScriptArgs {
    file_path: String,
    #[serde(default)]
    args: Vec<String>,
}

pub struct RunScriptTool {
    sandbox: ProcessSandbox,
    interpreter: String,
    extension: String,
}

impl RunScriptTool {
    pub fn new(
        sandbox: ProcessSandbox,
        interpreter: impl Into<String>,
        extension: impl Into<String>,
    ) -> Self {
        Self {
            sandbox,
            interpreter: interpreter.into(),
            extension: extension.into(),
        }
    }

    fn has_script_extension(&self, path: &Path) -> bool {
        path.extension()
            .is_some_and(|ext| ext.to_string_lossy() == self.extension)
    }

    async fn run(&self, script: PathBuf, args: Vec<String>, working_root: &Path) -> Result<String> {
        let mut argv = Vec::with_capacity(args.len() + 1);
        argv.push(script.into_os_string());
        argv.extend(args.into_iter().map(Into::into));

        let output = self
            .sandbox
            .run(&self.interpreter, &argv, working_root)
            .await
            .context("executing script")?;

        let mut result = format!("STDOUT: {}\nSTDERR: {}\n", output.stdout, output.stderr);
        match output.exit_code {
            Some(0) => {}
            Some(code) => result.push_str(&format!("Process exited with code {code}\n")),
            None => result.push_str("Process terminated by signal\n"),
        }
        if output.truncated {
            result.push_str("[Output truncated]\n");
        }
        if output.stdout.is_empty() {
            result.push_str("No output produced.");
        }

        Ok(result)
    }
}

#[async_trait]
impl AgentTool for RunScriptTool {
    fn name(&self) -> &str {
        RUN_SCRIPT_TOOL
    }

    fn description(&self) -> &str {
        "Execute a Python file inside the working directory with optional \
         command-line arguments. Returns stdout, stderr and the exit code if non-zero."
    }

    fn parameters(&self) -> ParameterSchema {
        ParameterSchema::object()
            .required_property(
                "file_path",
                PropertySchema::string("Relative path to the Python file to execute"),
            )
            .property(
                "args",
                PropertySchema::string_array("Command-line arguments to pass to the Python file"),
            )
    }

    async fn execute(&self, working_root: &Path, args: Value) -> Result<String> {
        let args: RunScriptArgs = parse_args(RUN_SCRIPT_TOOL, args)?;

        // Boundary first: nothing outside the root is even stat'ed
        let path = resolve_within(working_root, &args.file_path)
            .map_err(|_| outside_root("execute", &args.file_path))?;

        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(anyhow!("File \"{}\" not found.", args.file_path));
        }

        if !self.has_script_extension(&path) {
            return Err(anyhow!("\"{}\" is not a Python file.", args.file_path));
        }

        self.run(path, args.args, working_root).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;
    use std::time::Duration;
    use tempfile::TempDir;

    fn root() -> TempDir {
        TempDir::new().unwrap()
    }

    #[tokio::test]
    async fn test_read_file_small_is_exact() {
        let temp_dir = root();
        std::fs::write(temp_dir.path().join("a.txt"), "exact content").unwrap();

        let output = ReadFileTool::new(100)
            .execute(temp_dir.path(), json!({ "file_path": "a.txt" }))
            .await
            .unwrap();
        assert_eq!(output, "exact content");
    }

    #[tokio::test]
    async fn test_read_file_at_cap_is_not_truncated() {
        let temp_dir = root();
        std::fs::write(temp_dir.path().join("a.txt"), "0123456789").unwrap();

        let output = ReadFileTool::new(10)
            .execute(temp_dir.path(), json!({ "file_path": "a.txt" }))
            .await
            .unwrap();
        assert_eq!(output, "0123456789");
    }

    #[tokio::test]
    async fn test_read_file_large_is_truncated_with_marker() {
        let temp_dir = root();
        std::fs::write(temp_dir.path().join("big.txt"), "x".repeat(25)).unwrap();

        let output = ReadFileTool::new(10)
            .execute(temp_dir.path(), json!({ "file_path": "big.txt" }))
            .await
            .unwrap();
        assert_eq!(
            output,
            format!("{}[...File \"big.txt\" truncated at 10 bytes]", "x".repeat(10))
        );
    }

    #[tokio::test]
    async fn test_read_file_truncation_keeps_whole_characters() {
        let temp_dir = root();
        // Two-byte characters; a 5 byte cap splits the third one
        std::fs::write(temp_dir.path().join("accents.txt"), "ééé").unwrap();

        let output = ReadFileTool::new(5)
            .execute(temp_dir.path(), json!({ "file_path": "accents.txt" }))
            .await
            .unwrap();
        assert_eq!(output, "éé[...File \"accents.txt\" truncated at 5 bytes]");
        assert!(!output.contains('\u{FFFD}'));
    }

    #[test]
    fn test_trim_partial_char() {
        let mut bytes = "a€".as_bytes()[..3].to_vec();
        trim_partial_char(&mut bytes);
        assert_eq!(bytes, b"a");

        let mut bytes = "a€".as_bytes().to_vec();
        trim_partial_char(&mut bytes);
        assert_eq!(bytes, "a€".as_bytes());

        let mut bytes = b"plain".to_vec();
        trim_partial_char(&mut bytes);
        assert_eq!(bytes, b"plain");
    }

    #[tokio::test]
    async fn test_read_file_outside_root() {
        let temp_dir = root();
        let err = ReadFileTool::new(100)
            .execute(temp_dir.path(), json!({ "file_path": "../secret.txt" }))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("outside the permitted working directory"));

        let err = ReadFileTool::new(100)
            .execute(temp_dir.path(), json!({ "file_path": "/etc/passwd" }))
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("Cannot read"));
    }

    #[tokio::test]
    async fn test_read_file_directory_or_missing_is_not_found() {
        let temp_dir = root();
        std::fs::create_dir(temp_dir.path().join("sub")).unwrap();

        for target in ["sub", "missing.txt"] {
            let err = ReadFileTool::new(100)
                .execute(temp_dir.path(), json!({ "file_path": target }))
                .await
                .unwrap_err();
            assert!(err.to_string().contains("File not found"), "{target}: {err}");
        }
    }

    #[tokio::test]
    async fn test_read_file_missing_argument() {
        let temp_dir = root();
        let err = ReadFileTool::new(100)
            .execute(temp_dir.path(), json!({}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Invalid arguments for get_file_content"));
    }

    fn parse_listing(listing: &str) -> HashSet<(String, u64, bool)> {
        listing
            .lines()
            .map(|line| {
                let line = line.strip_prefix("- ").unwrap();
                let (name, rest) = line.split_once(": file_size=").unwrap();
                let (size, rest) = rest.split_once(" bytes, is_dir=").unwrap();
                (name.to_string(), size.parse().unwrap(), rest == "true")
            })
            .collect()
    }

    #[tokio::test]
    async fn test_list_files_reports_name_size_and_type() {
        let temp_dir = root();
        std::fs::write(temp_dir.path().join("a"), "0123456789").unwrap();
        std::fs::create_dir(temp_dir.path().join("b")).unwrap();
        let dir_size = std::fs::metadata(temp_dir.path().join("b")).unwrap().len();

        let output = ListFilesTool
            .execute(temp_dir.path(), json!({ "directory": "." }))
            .await
            .unwrap();

        let expected: HashSet<_> = [
            ("a".to_string(), 10, false),
            ("b".to_string(), dir_size, true),
        ]
        .into_iter()
        .collect();
        assert_eq!(parse_listing(&output), expected);
    }

    #[tokio::test]
    async fn test_list_files_defaults_to_root() {
        let temp_dir = root();
        std::fs::write(temp_dir.path().join("only.txt"), "1").unwrap();

        for args in [json!({}), Value::Null] {
            let output = ListFilesTool.execute(temp_dir.path(), args).await.unwrap();
            assert_eq!(output, "- only.txt: file_size=1 bytes, is_dir=false\n");
        }
    }

    #[tokio::test]
    async fn test_list_files_rejects_non_directory_and_outside() {
        let temp_dir = root();
        std::fs::write(temp_dir.path().join("file.txt"), "1").unwrap();

        let err = ListFilesTool
            .execute(temp_dir.path(), json!({ "directory": "file.txt" }))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "\"file.txt\" is not a directory");

        let err = ListFilesTool
            .execute(temp_dir.path(), json!({ "directory": "/" }))
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("Cannot list \"/\""));
    }

    #[tokio::test]
    async fn test_write_then_read_round_trip() {
        let temp_dir = root();
        let content = "line one\nline two ünïcode\n";

        let message = WriteFileTool
            .execute(
                temp_dir.path(),
                json!({ "file_path": "notes.txt", "content": content }),
            )
            .await
            .unwrap();
        assert_eq!(
            message,
            format!(
                "Successfully wrote to \"notes.txt\" ({} characters written)",
                content.chars().count()
            )
        );

        let read = ReadFileTool::new(10_000)
            .execute(temp_dir.path(), json!({ "file_path": "notes.txt" }))
            .await
            .unwrap();
        assert_eq!(read, content);
    }

    #[tokio::test]
    async fn test_write_overwrites_fully() {
        let temp_dir = root();
        std::fs::write(temp_dir.path().join("f.txt"), "a much longer original").unwrap();

        WriteFileTool
            .execute(temp_dir.path(), json!({ "file_path": "f.txt", "content": "short" }))
            .await
            .unwrap();
        assert_eq!(
            std::fs::read_to_string(temp_dir.path().join("f.txt")).unwrap(),
            "short"
        );
    }

    #[tokio::test]
    async fn test_write_requires_existing_parent() {
        let temp_dir = root();
        let result = WriteFileTool
            .execute(
                temp_dir.path(),
                json!({ "file_path": "missing/dir/f.txt", "content": "x" }),
            )
            .await;
        assert!(result.is_err());
        assert!(!temp_dir.path().join("missing").exists());
    }

    #[tokio::test]
    async fn test_write_outside_root_is_rejected() {
        let temp_dir = root();
        let err = WriteFileTool
            .execute(
                temp_dir.path(),
                json!({ "file_path": "../escape.txt", "content": "x" }),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("Cannot write to \"../escape.txt\""));
        assert!(!temp_dir.path().parent().unwrap().join("escape.txt").exists());
    }

    /// Runs `.sh` scripts through `sh` so the tests do not need a Python install
    fn shell_runner(timeout: Duration) -> RunScriptTool {
        RunScriptTool::new(ProcessSandbox::new(timeout), "sh", "sh")
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_script_hello() {
        let temp_dir = root();
        std::fs::write(temp_dir.path().join("hello.sh"), "echo hello\n").unwrap();

        let output = shell_runner(Duration::from_secs(10))
            .execute(temp_dir.path(), json!({ "file_path": "hello.sh" }))
            .await
            .unwrap();
        assert!(output.contains("STDOUT: hello"));
        assert!(!output.contains("Process exited with code"));
        assert!(!output.contains("No output produced."));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_script_passes_args_and_uses_root_as_cwd() {
        let temp_dir = root();
        std::fs::create_dir(temp_dir.path().join("pkg")).unwrap();
        std::fs::write(temp_dir.path().join("marker"), "").unwrap();
        std::fs::write(
            temp_dir.path().join("pkg/args.sh"),
            "echo \"$1-$2\"; ls marker\n",
        )
        .unwrap();

        let output = shell_runner(Duration::from_secs(10))
            .execute(
                temp_dir.path(),
                json!({ "file_path": "pkg/args.sh", "args": ["3 + 5", "x"] }),
            )
            .await
            .unwrap();
        assert!(output.starts_with("STDOUT: 3 + 5-x\nmarker\n"), "{output}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_script_reports_exit_code_and_no_output() {
        let temp_dir = root();
        std::fs::write(temp_dir.path().join("fail.sh"), "echo oops >&2; exit 2\n").unwrap();

        let output = shell_runner(Duration::from_secs(10))
            .execute(temp_dir.path(), json!({ "file_path": "fail.sh" }))
            .await
            .unwrap();
        assert_eq!(
            output,
            "STDOUT: \nSTDERR: oops\n\nProcess exited with code 2\nNo output produced."
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_script_timeout_is_recoverable_error() {
        let temp_dir = root();
        std::fs::write(temp_dir.path().join("slow.sh"), "sleep 30\n").unwrap();

        let err = shell_runner(Duration::from_millis(200))
            .execute(temp_dir.path(), json!({ "file_path": "slow.sh" }))
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("timed out"));
    }

    #[tokio::test]
    async fn test_run_script_wrong_extension_is_rejected_before_spawn() {
        let temp_dir = root();
        std::fs::write(temp_dir.path().join("notes.txt"), "echo hi").unwrap();

        // A nonexistent interpreter proves no process is ever started
        let tool = RunScriptTool::new(
            ProcessSandbox::new(Duration::from_secs(1)),
            "no-such-interpreter-xyz",
            "py",
        );
        let err = tool
            .execute(temp_dir.path(), json!({ "file_path": "notes.txt" }))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "\"notes.txt\" is not a Python file.");
    }

    #[tokio::test]
    async fn test_run_script_outside_root_is_rejected_before_existence_check() {
        let temp_dir = root();
        let tool = shell_runner(Duration::from_secs(1));

        let err = tool
            .execute(
                temp_dir.path(),
                json!({ "file_path": "../definitely/missing.py" }),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("Cannot execute"));
    }

    #[tokio::test]
    async fn test_run_script_missing_file() {
        let temp_dir = root();
        let err = shell_runner(Duration::from_secs(1))
            .execute(temp_dir.path(), json!({ "file_path": "nope.sh" }))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "File \"nope.sh\" not found.");
    }
}
