//! Mock 传输层（用于测试与无 API Key 时的本地运行）
//!
//! 按脚本依次返回响应或错误；脚本耗尽后回显最后一条 User 消息。
//! 可为指定模型设置固定错误（不消耗脚本），并记录每次调用服务的模型。

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{CompletionRequest, CompletionResponse, CompletionTransport, RawToolCall, Usage};
use crate::memory::Role;

/// 脚本中的一步
#[derive(Debug, Clone)]
pub enum ScriptStep {
    Respond(CompletionResponse),
    Fail(String),
}

/// 一次调用的记录
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub model: String,
    pub message_count: usize,
    pub tool_count: usize,
    pub last_content: String,
}

#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<ScriptStep>>,
    model_failures: Mutex<HashMap<String, String>>,
    calls: Mutex<Vec<RecordedCall>>,
    next_call_id: Mutex<u64>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(self, step: ScriptStep) -> Self {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(step);
        self
    }

    /// 下一次调用返回最终文本
    pub fn then_text(self, text: impl Into<String>) -> Self {
        self.push(ScriptStep::Respond(CompletionResponse {
            content: Some(text.into()),
            tool_calls: Vec::new(),
            usage: Some(Usage {
                prompt_tokens: 10,
                completion_tokens: 5,
            }),
        }))
    }

    /// 下一次调用请求一个工具；raw_args 原样作为参数文本
    pub fn then_tool_call(self, name: impl Into<String>, raw_args: impl Into<String>) -> Self {
        self.then_tool_calls(vec![(name.into(), raw_args.into())])
    }

    /// 下一次调用在同一轮请求多个工具
    pub fn then_tool_calls(self, calls: Vec<(String, String)>) -> Self {
        let tool_calls = {
            let mut next = self.next_call_id.lock().unwrap_or_else(|e| e.into_inner());
            calls
                .into_iter()
                .map(|(name, arguments)| {
                    *next += 1;
                    RawToolCall {
                        id: format!("call_{}", *next),
                        name,
                        arguments,
                    }
                })
                .collect()
        };
        self.push(ScriptStep::Respond(CompletionResponse {
            content: None,
            tool_calls,
            usage: None,
        }))
    }

    /// 下一次调用失败，返回 error 文本
    pub fn then_error(self, error: impl Into<String>) -> Self {
        self.push(ScriptStep::Fail(error.into()))
    }

    /// 对指定模型的所有调用都返回 error（不消耗脚本）
    pub fn fail_model(self, model: impl Into<String>, error: impl Into<String>) -> Self {
        self.model_failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(model.into(), error.into());
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// 各次调用服务的模型 id
    pub fn models_called(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.model).collect()
    }
}

#[async_trait]
impl CompletionTransport for ScriptedTransport {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, String> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(RecordedCall {
                model: request.model.clone(),
                message_count: request.messages.len(),
                tool_count: request.tools.len(),
                last_content: request
                    .messages
                    .last()
                    .map(|m| m.content.clone())
                    .unwrap_or_default(),
            });

        if let Some(err) = self
            .model_failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&request.model)
        {
            return Err(err.clone());
        }

        let step = self
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        match step {
            Some(ScriptStep::Respond(resp)) => Ok(resp),
            Some(ScriptStep::Fail(err)) => Err(err),
            None => {
                let last_user = request
                    .messages
                    .iter()
                    .rev()
                    .find(|m| m.role == Role::User)
                    .map(|m| m.content.as_str())
                    .unwrap_or("(no input)");
                Ok(CompletionResponse {
                    content: Some(format!("Echo from Mock: {}", last_user)),
                    tool_calls: Vec::new(),
                    usage: None,
                })
            }
        }
    }
}
