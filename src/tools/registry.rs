//! 工具注册表
//!
//! 工具在注册时就确定来源（ToolOrigin）与处理方式，调用时按名查表，不再解析名称前缀。
//! 本地工具（内置 / 插件）实现 Tool trait；外部路由工具交给 ExternalToolClient。

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::llm::ToolSpec;

/// 工具 trait：名称、描述（供 LLM 理解）、参数 schema、异步执行（args 为 JSON 对象）
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// 参数 JSON Schema；默认空对象
    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String>;
}

/// 外部工具路由客户端（如 MCP 一类的工具服务器）；只定义边界
#[async_trait]
pub trait ExternalToolClient: Send + Sync {
    async fn call(&self, server: &str, tool: &str, args: Value) -> Result<String, String>;
}

/// 工具来源
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolOrigin {
    Builtin,
    Plugin { plugin: String },
    External { server: String, name: String },
}

#[derive(Clone)]
enum Handler {
    Local(Arc<dyn Tool>),
    External(Arc<dyn ExternalToolClient>),
}

#[derive(Clone)]
struct RegisteredTool {
    origin: ToolOrigin,
    spec: ToolSpec,
    handler: Handler,
}

/// 工具注册表：按暴露给模型的名称存储；BTreeMap 保证工具目录顺序稳定
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: BTreeMap<String, RegisteredTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert_local(&mut self, tool: Arc<dyn Tool>, origin: ToolOrigin) {
        let name = tool.name().to_string();
        let spec = ToolSpec {
            name: name.clone(),
            description: tool.description().to_string(),
            parameters: tool.parameters_schema(),
        };
        if self.tools.contains_key(&name) {
            tracing::warn!(tool = %name, "tool re-registered, replacing previous entry");
        }
        self.tools.insert(
            name,
            RegisteredTool {
                origin,
                spec,
                handler: Handler::Local(tool),
            },
        );
    }

    /// 注册内置工具
    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.insert_local(Arc::new(tool), ToolOrigin::Builtin);
    }

    /// 注册插件提供的工具
    pub fn register_plugin(&mut self, plugin: impl Into<String>, tool: Arc<dyn Tool>) {
        self.insert_local(
            tool,
            ToolOrigin::Plugin {
                plugin: plugin.into(),
            },
        );
    }

    /// 注册外部路由工具：对模型暴露为 `{server}__{name}`，调用时路由回 (server, name)
    pub fn register_external(
        &mut self,
        server: impl Into<String>,
        spec: ToolSpec,
        client: Arc<dyn ExternalToolClient>,
    ) {
        let server = server.into();
        let exposed = format!("{}__{}", server, spec.name);
        let origin = ToolOrigin::External {
            server,
            name: spec.name.clone(),
        };
        self.tools.insert(
            exposed.clone(),
            RegisteredTool {
                origin,
                spec: ToolSpec {
                    name: exposed,
                    ..spec
                },
                handler: Handler::External(client),
            },
        );
    }

    pub fn origin(&self, name: &str) -> Option<&ToolOrigin> {
        self.tools.get(name).map(|t| &t.origin)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    /// 工具目录（发给补全服务）
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.values().map(|t| t.spec.clone()).collect()
    }

    pub async fn execute(&self, name: &str, args: Value) -> Result<String, String> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| format!("Unknown tool: {name}"))?;
        match (&tool.handler, &tool.origin) {
            (Handler::Local(t), _) => t.execute(args).await,
            (Handler::External(client), ToolOrigin::External { server, name }) => {
                client.call(server, name, args).await
            }
            (Handler::External(_), origin) => {
                Err(format!("tool {name} has external handler but origin {origin:?}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::EchoTool;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingClient {
        calls: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl ExternalToolClient for RecordingClient {
        async fn call(&self, server: &str, tool: &str, _args: Value) -> Result<String, String> {
            self.calls
                .lock()
                .unwrap()
                .push((server.to_string(), tool.to_string()));
            Ok(format!("{server}/{tool}"))
        }
    }

    #[tokio::test]
    async fn test_origins_resolved_at_registration() {
        let client = Arc::new(RecordingClient::default());
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool);
        reg.register_plugin("weather", Arc::new(EchoTool2));
        reg.register_external(
            "netdiag",
            ToolSpec {
                name: "ping".into(),
                description: "ping a host".into(),
                parameters: serde_json::json!({"type": "object"}),
            },
            client.clone(),
        );

        assert_eq!(reg.origin("echo"), Some(&ToolOrigin::Builtin));
        assert_eq!(
            reg.origin("echo2"),
            Some(&ToolOrigin::Plugin {
                plugin: "weather".into()
            })
        );
        assert_eq!(
            reg.origin("netdiag__ping"),
            Some(&ToolOrigin::External {
                server: "netdiag".into(),
                name: "ping".into()
            })
        );

        let out = reg
            .execute("netdiag__ping", serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(out, "netdiag/ping");
        assert_eq!(
            client.calls.lock().unwrap()[0],
            ("netdiag".to_string(), "ping".to_string())
        );

        let names: Vec<_> = reg.specs().into_iter().map(|s| s.name).collect();
        assert_eq!(names, ["echo", "echo2", "netdiag__ping"]);
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let reg = ToolRegistry::new();
        let err = reg.execute("nope", serde_json::json!({})).await.unwrap_err();
        assert!(err.contains("Unknown tool"));
    }

    struct EchoTool2;

    #[async_trait]
    impl Tool for EchoTool2 {
        fn name(&self) -> &str {
            "echo2"
        }

        fn description(&self) -> &str {
            "second echo"
        }

        async fn execute(&self, _args: Value) -> Result<String, String> {
            Ok("echo2".into())
        }
    }
}
