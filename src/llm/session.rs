//! CompletionSession：针对某个模型的一次请求/响应
//!
//! 输入完整对话与工具目录，返回最终文本或一个以上的工具调用；副作用是累加 token 用量。
//! 不重试、不解释错误：传输层失败原样上抛，策略全部在运行循环里。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::llm::{CompletionRequest, CompletionTransport, ToolSpec};
use crate::memory::{Message, ToolInvocationRequest};

/// Token 使用统计（累计值，仅递增）
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: Arc<AtomicU64>,
    pub completion_tokens: Arc<AtomicU64>,
    pub total_tokens: Arc<AtomicU64>,
    pub requests: Arc<AtomicU64>,
}

/// TokenUsage 的某一时刻快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UsageSnapshot {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub requests: u64,
}

impl TokenUsage {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记一次请求；未上报用量时按 0 计
    pub fn add(&self, prompt: u64, completion: u64) {
        self.prompt_tokens.fetch_add(prompt, Ordering::Relaxed);
        self.completion_tokens.fetch_add(completion, Ordering::Relaxed);
        self.total_tokens.fetch_add(prompt + completion, Ordering::Relaxed);
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> UsageSnapshot {
        UsageSnapshot {
            prompt_tokens: self.prompt_tokens.load(Ordering::Relaxed),
            completion_tokens: self.completion_tokens.load(Ordering::Relaxed),
            total_tokens: self.total_tokens.load(Ordering::Relaxed),
            requests: self.requests.load(Ordering::Relaxed),
        }
    }
}

/// 一次交换的结果
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionOutcome {
    /// 最终 assistant 文本
    Final(String),
    /// 模型请求执行工具；content 为伴随的说明文字（可能为空）
    ToolCalls {
        content: String,
        calls: Vec<ToolInvocationRequest>,
    },
}

/// 采样参数
#[derive(Debug, Clone, Copy)]
pub struct SamplingParams {
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            max_tokens: None,
        }
    }
}

/// 持有传输层、共享的 token 累加器与采样参数
pub struct CompletionSession {
    transport: Arc<dyn CompletionTransport>,
    usage: TokenUsage,
    sampling: SamplingParams,
}

impl CompletionSession {
    pub fn new(transport: Arc<dyn CompletionTransport>, usage: TokenUsage, sampling: SamplingParams) -> Self {
        Self {
            transport,
            usage,
            sampling,
        }
    }

    pub fn usage(&self) -> &TokenUsage {
        &self.usage
    }

    /// 对 model_id 发起一次补全；transcript 应已包含 system 消息（如需要）
    pub async fn exchange(
        &self,
        model_id: &str,
        transcript: &[Message],
        tools: &[ToolSpec],
    ) -> Result<CompletionOutcome, String> {
        let request = CompletionRequest {
            model: model_id.to_string(),
            messages: transcript.to_vec(),
            tools: tools.to_vec(),
            temperature: self.sampling.temperature,
            max_tokens: self.sampling.max_tokens,
        };
        tracing::debug!(model = %model_id, messages = transcript.len(), tools = tools.len(), "completion request");

        let response = self.transport.complete(request).await?;

        let usage = response.usage.unwrap_or_default();
        self.usage.add(usage.prompt_tokens, usage.completion_tokens);

        let content = response.content.unwrap_or_default();
        if response.tool_calls.is_empty() {
            return Ok(CompletionOutcome::Final(content));
        }
        let calls = response
            .tool_calls
            .into_iter()
            .enumerate()
            .map(|(i, raw)| {
                let id = if raw.id.is_empty() {
                    format!("call_{}", uuid::Uuid::new_v4().simple())
                } else {
                    raw.id
                };
                tracing::trace!(index = i, tool = %raw.name, "tool call requested");
                ToolInvocationRequest::from_raw(id, raw.name, &raw.arguments)
            })
            .collect();
        Ok(CompletionOutcome::ToolCalls { content, calls })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedTransport;

    #[tokio::test]
    async fn test_final_text_and_usage_accumulates() {
        let transport = Arc::new(ScriptedTransport::new().then_text("hello"));
        let session = CompletionSession::new(transport, TokenUsage::new(), SamplingParams::default());

        let out = session
            .exchange("m1", &[Message::user("hi")], &[])
            .await
            .unwrap();
        assert_eq!(out, CompletionOutcome::Final("hello".to_string()));
        let usage = session.usage().get();
        assert_eq!(usage.prompt_tokens, 10);
        assert_eq!(usage.completion_tokens, 5);
        assert_eq!(usage.total_tokens, 15);
        assert_eq!(usage.requests, 1);
    }

    #[tokio::test]
    async fn test_tool_calls_with_malformed_args() {
        let transport = Arc::new(ScriptedTransport::new().then_tool_call("echo", "{oops"));
        let session = CompletionSession::new(transport, TokenUsage::new(), SamplingParams::default());

        match session.exchange("m1", &[Message::user("hi")], &[]).await.unwrap() {
            CompletionOutcome::ToolCalls { calls, .. } => {
                assert_eq!(calls.len(), 1);
                assert_eq!(calls[0].name, "echo");
                assert_eq!(calls[0].arguments, serde_json::json!({}));
            }
            other => panic!("expected tool calls, got {:?}", other),
        }
        // 未上报用量按 0 计，但请求数仍递增
        let usage = session.usage().get();
        assert_eq!(usage.total_tokens, 0);
        assert_eq!(usage.requests, 1);
    }

    #[tokio::test]
    async fn test_errors_surface_verbatim() {
        let transport = Arc::new(ScriptedTransport::new().then_error("HTTP 429: slow down"));
        let session = CompletionSession::new(transport, TokenUsage::new(), SamplingParams::default());
        let err = session
            .exchange("m1", &[Message::user("hi")], &[])
            .await
            .unwrap_err();
        assert_eq!(err, "HTTP 429: slow down");
        assert_eq!(session.usage().get().requests, 0);
    }
}
