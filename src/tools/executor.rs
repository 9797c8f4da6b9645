use std::path::Path;
use std::sync::Arc;

use serde_json::Value;

use crate::conversation::{FunctionCall, FunctionResponse};
use crate::logging::{log_debug, log_info, log_warn};

use super::registry::ToolRegistry;

/// Resolves tool calls through the registry and runs them
///
/// Handler failures become `{"error": ...}` responses so the model can adapt;
/// nothing a handler does aborts the conversation.
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    pub async fn execute_tool_call(
        &self,
        working_root: &Path,
        call: &FunctionCall,
    ) -> FunctionResponse {
        let Some(entry) = self.registry.lookup(&call.name) else {
            log_warn(&format!("Unknown tool requested: {}", call.name));
            return FunctionResponse::error(call, format!("Unknown function: {}", call.name));
        };

        log_info(&format!(
            "Executing tool: {} (call_id: {})",
            call.name, call.call_id
        ));
        log_debug(&format!("Tool arguments: {:?}", call.arguments));

        match entry
            .handler
            .execute(working_root, Value::Object(call.arguments.clone()))
            .await
        {
            Ok(output) => {
                log_info(&format!(
                    "Tool {} succeeded, output length: {}",
                    call.name,
                    output.len()
                ));
                FunctionResponse::result(call, output)
            }
            Err(e) => {
                log_warn(&format!("Tool {} failed: {:#}", call.name, e));
                FunctionResponse::error(call, format!("{e:#}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::FileOperationToolkit;
    use serde_json::json;
    use tempfile::TempDir;

    fn executor() -> ToolExecutor {
        let mut registry = ToolRegistry::new();
        FileOperationToolkit::read_only()
            .register(&mut registry)
            .unwrap();
        ToolExecutor::new(Arc::new(registry))
    }

    #[tokio::test]
    async fn test_unknown_tool_is_error_response() {
        let temp_dir = TempDir::new().unwrap();
        let call = FunctionCall::new("c1", "format_disk", json!({}));

        let response = executor().execute_tool_call(temp_dir.path(), &call).await;
        assert!(response.is_error());
        assert_eq!(response.text(), Some("Unknown function: format_disk"));
        assert_eq!(response.call_id, "c1");
    }

    #[tokio::test]
    async fn test_successful_call_is_result_response() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("a.txt"), "hi").unwrap();
        let call = FunctionCall::new("c1", "get_file_content", json!({"file_path": "a.txt"}));

        let response = executor().execute_tool_call(temp_dir.path(), &call).await;
        assert!(!response.is_error());
        assert_eq!(response.text(), Some("hi"));
    }

    #[tokio::test]
    async fn test_handler_failure_is_error_response() {
        let temp_dir = TempDir::new().unwrap();
        let call = FunctionCall::new(
            "c9",
            "get_file_content",
            json!({"file_path": "../../etc/passwd"}),
        );

        let response = executor().execute_tool_call(temp_dir.path(), &call).await;
        assert!(response.is_error());
        assert!(response.text().unwrap().contains("outside the permitted"));
    }
}
