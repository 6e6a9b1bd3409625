//! OpenAI 兼容 Chat Completions 传输层
//!
//! 通过 reqwest 直接 POST `{base_url}/chat/completions`；支持 function calling。
//! 非 2xx 响应以 `HTTP <status>: <body>` 文本返回，供运行循环按子串分类（429 / 401 / 404 等）。

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::LlmSection;
use crate::llm::{CompletionRequest, CompletionResponse, CompletionTransport, RawToolCall, Usage};
use crate::memory::{Message, Role};

/// OpenAI 兼容 HTTP 传输：持有 reqwest Client、端点与 API Key
pub struct OpenAiTransport {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    api_key_env: String,
}

impl OpenAiTransport {
    pub fn new(base_url: &str, api_key: Option<String>, timeout_secs: u64) -> Self {
        let http = match reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
        {
            Ok(client) => client,
            Err(e) => {
                tracing::warn!(error = %e, timeout_secs, "failed to build HTTP client, using defaults without request timeout");
                reqwest::Client::new()
            }
        };
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            api_key_env: String::new(),
        }
    }

    /// 从 [llm] 段创建；API Key 取自 api_key_env 指定的环境变量
    pub fn from_config(cfg: &LlmSection) -> Self {
        let api_key = std::env::var(&cfg.api_key_env).ok().filter(|k| !k.is_empty());
        Self {
            api_key_env: cfg.api_key_env.clone(),
            ..Self::new(&cfg.base_url, api_key, cfg.request_timeout_secs)
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCallOut>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<&'a str>,
}

#[derive(Serialize)]
struct WireToolCallOut {
    id: String,
    r#type: &'static str,
    function: WireFunctionOut,
}

#[derive(Serialize)]
struct WireFunctionOut {
    name: String,
    arguments: String,
}

#[derive(Serialize)]
struct WireTool<'a> {
    r#type: &'static str,
    function: WireFunctionDef<'a>,
}

#[derive(Serialize)]
struct WireFunctionDef<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a Value,
}

#[derive(Deserialize)]
struct WireResponse {
    #[serde(default)]
    choices: Vec<WireChoice>,
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireResponseMessage,
}

#[derive(Deserialize)]
struct WireResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCallIn>>,
}

#[derive(Deserialize)]
struct WireToolCallIn {
    #[serde(default)]
    id: String,
    function: WireFunctionIn,
}

#[derive(Deserialize)]
struct WireFunctionIn {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

fn role_str(role: &Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

fn to_wire_message(m: &Message) -> WireMessage<'_> {
    WireMessage {
        role: role_str(&m.role),
        content: &m.content,
        tool_calls: m
            .tool_calls
            .iter()
            .map(|c| WireToolCallOut {
                id: c.id.clone(),
                r#type: "function",
                function: WireFunctionOut {
                    name: c.name.clone(),
                    arguments: c.arguments.to_string(),
                },
            })
            .collect(),
        tool_call_id: m.tool_call_id.as_deref(),
    }
}

#[async_trait]
impl CompletionTransport for OpenAiTransport {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, String> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(format!(
                "Unauthorized: API key missing (set {})",
                if self.api_key_env.is_empty() { "the API key" } else { self.api_key_env.as_str() }
            ));
        };

        let body = WireRequest {
            model: &request.model,
            messages: request.messages.iter().map(to_wire_message).collect(),
            tools: request
                .tools
                .iter()
                .map(|t| WireTool {
                    r#type: "function",
                    function: WireFunctionDef {
                        name: &t.name,
                        description: &t.description,
                        parameters: &t.parameters,
                    },
                })
                .collect(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(format!("HTTP {}: {}", status.as_u16(), text));
        }

        let wire: WireResponse = response.json().await.map_err(|e| e.to_string())?;
        let message = wire
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| "completion response contained no choices".to_string())?;

        Ok(CompletionResponse {
            content: message.content,
            tool_calls: message
                .tool_calls
                .unwrap_or_default()
                .into_iter()
                .map(|c| RawToolCall {
                    id: c.id,
                    name: c.function.name,
                    arguments: c.function.arguments,
                })
                .collect(),
            usage: wire.usage.map(|u| Usage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::ToolInvocationRequest;

    #[test]
    fn test_wire_message_carries_tool_linkage() {
        let call = ToolInvocationRequest::from_raw("call_1", "echo", r#"{"text":"x"}"#);
        let assistant = Message::assistant_tool_calls("", vec![call]);
        let wire = serde_json::to_value(to_wire_message(&assistant)).unwrap();
        assert_eq!(wire["role"], "assistant");
        assert_eq!(wire["tool_calls"][0]["function"]["name"], "echo");
        assert_eq!(wire["tool_calls"][0]["function"]["arguments"], r#"{"text":"x"}"#);

        let tool = Message::tool("call_1", "ok");
        let wire = serde_json::to_value(to_wire_message(&tool)).unwrap();
        assert_eq!(wire["tool_call_id"], "call_1");
        assert!(wire.get("tool_calls").is_none());
    }

    #[test]
    fn test_response_parsing() {
        let raw = r#"{
            "choices": [{"message": {"content": null, "tool_calls": [
                {"id": "c1", "type": "function", "function": {"name": "echo", "arguments": "{\"text\":\"hi\"}"}}
            ]}}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15}
        }"#;
        let wire: WireResponse = serde_json::from_str(raw).unwrap();
        let calls = wire.choices[0].message.tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].function.name, "echo");
        assert_eq!(wire.usage.unwrap().prompt_tokens, 12);
    }

    #[tokio::test]
    async fn test_missing_key_is_auth_error() {
        let transport = OpenAiTransport::new("http://localhost:1", None, 1);
        let err = transport
            .complete(CompletionRequest {
                model: "m".into(),
                messages: vec![Message::user("hi")],
                tools: vec![],
                temperature: 0.0,
                max_tokens: None,
            })
            .await
            .unwrap_err();
        assert!(err.to_lowercase().contains("unauthorized"));
    }

    #[test]
    fn test_new_builds_client_and_trims_endpoint() {
        let transport = OpenAiTransport::new("https://api.example.com/v1/", Some("k".into()), 5);
        assert_eq!(transport.endpoint(), "https://api.example.com/v1/chat/completions");
    }
}
