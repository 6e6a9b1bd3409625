//! Echo 工具（测试用）

use async_trait::async_trait;
use schemars::{schema_for, JsonSchema};
use serde::Deserialize;
use serde_json::Value;

use crate::tools::Tool;

#[allow(dead_code)]
#[derive(Deserialize, JsonSchema)]
struct EchoArgs {
    /// 要回显的文本
    text: String,
}

/// Echo 工具：回显文本
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo text back (for testing). Args: {\"text\": \"message\"}"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::to_value(schema_for!(EchoArgs)).unwrap_or_else(|_| serde_json::json!({}))
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let text = args
            .get("text")
            .and_then(|v| v.as_str())
            .unwrap_or("(empty)");
        Ok(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_echo_with_and_without_text() {
        assert_eq!(
            EchoTool.execute(serde_json::json!({"text": "hi"})).await.unwrap(),
            "hi"
        );
        assert_eq!(EchoTool.execute(serde_json::json!({})).await.unwrap(), "(empty)");
    }

    #[test]
    fn test_schema_lists_text() {
        let schema = EchoTool.parameters_schema();
        assert!(schema["properties"].get("text").is_some());
    }
}
