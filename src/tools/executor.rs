//! 工具执行器
//!
//! 持有 ToolRegistry 与全局超时；execute(tool_name, args) 总是返回带内的 ToolResult，
//! 未知工具、工具报错、超时都变成 success=false，不会向调用方抛错。每次调用输出结构化审计日志（JSON）。

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use tokio::time::timeout;

use crate::llm::ToolSpec;
use crate::tools::ToolRegistry;

/// 工具执行结果：{success, payload | error}
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn ok(payload: impl Into<String>) -> Self {
        Self {
            success: true,
            payload: Some(payload.into()),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            payload: None,
            error: Some(error.into()),
        }
    }

    /// 写入 tool 消息的内容（JSON）
    pub fn to_message_content(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            if self.success {
                self.payload.clone().unwrap_or_default()
            } else {
                format!("Error: {}", self.error.as_deref().unwrap_or("unknown"))
            }
        })
    }
}

/// 工具分发边界：按名执行，永不抛错
#[async_trait]
pub trait ToolDispatcher: Send + Sync {
    async fn execute(&self, name: &str, args: serde_json::Value) -> ToolResult;

    /// 暴露给模型的工具目录
    fn specs(&self) -> Vec<ToolSpec>;
}

/// 工具执行器：对每次调用施加超时
pub struct ToolExecutor {
    registry: ToolRegistry,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }
}

#[async_trait]
impl ToolDispatcher for ToolExecutor {
    async fn execute(&self, tool_name: &str, args: serde_json::Value) -> ToolResult {
        let start = Instant::now();
        let args_preview = args_preview(&args);
        let result = timeout(self.timeout, self.registry.execute(tool_name, args)).await;

        let (ok, outcome): (bool, &str) = match &result {
            Ok(Ok(_)) => (true, "ok"),
            Ok(Err(_)) => (false, "error"),
            Err(_) => (false, "timeout"),
        };
        let duration_ms = start.elapsed().as_millis() as u64;
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool_name,
            "ok": ok,
            "outcome": outcome,
            "duration_ms": duration_ms,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        match result {
            Ok(Ok(content)) => ToolResult::ok(content),
            Ok(Err(e)) => ToolResult::failure(e),
            Err(_) => ToolResult::failure(format!(
                "Tool {} timed out after {}s",
                tool_name,
                self.timeout.as_secs()
            )),
        }
    }

    fn specs(&self) -> Vec<ToolSpec> {
        self.registry.specs()
    }
}

fn args_preview(args: &serde_json::Value) -> String {
    let s = args.to_string();
    if s.len() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{EchoTool, Tool};
    use serde_json::Value;

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }

        fn description(&self) -> &str {
            "sleeps"
        }

        async fn execute(&self, _args: Value) -> Result<String, String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("late".into())
        }
    }

    fn executor(timeout_secs: u64) -> ToolExecutor {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool);
        reg.register(SlowTool);
        ToolExecutor::new(reg, timeout_secs)
    }

    #[tokio::test]
    async fn test_success_in_band() {
        let r = executor(5)
            .execute("echo", serde_json::json!({"text": "hi"}))
            .await;
        assert_eq!(r, ToolResult::ok("hi"));
        assert_eq!(r.to_message_content(), r#"{"success":true,"payload":"hi"}"#);
    }

    #[tokio::test]
    async fn test_unknown_tool_is_failure_not_panic() {
        let r = executor(5).execute("missing", serde_json::json!({})).await;
        assert!(!r.success);
        assert!(r.error.unwrap().contains("Unknown tool"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_failure() {
        let r = executor(1).execute("slow", serde_json::json!({})).await;
        assert!(!r.success);
        assert!(r.error.unwrap().contains("timed out"));
    }
}
