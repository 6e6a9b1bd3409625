//! 工具调用循环（单次模型尝试内）
//!
//! 补全 -> 若模型请求工具则按请求顺序逐个执行（后一个调用可能依赖前一个结果）-> 写回 tool 消息 -> 再次补全；
//! 直到模型不再请求工具，或累计工具调用达到上限。达到上限时仍以一条 assistant 消息结束本轮。

use tokio_util::sync::CancellationToken;

use crate::llm::{CompletionOutcome, CompletionSession, ToolSpec};
use crate::memory::{ConversationStore, Message};
use crate::react::AgentObserver;
use crate::tools::{ToolDispatcher, ToolResult};

/// 模型返回空文本时写入历史的占位回复
const EMPTY_REPLY: &str = "(The model returned an empty response.)";

/// 单次顶层运行内的工具调用预算（跨多次模型尝试累计）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolBudget {
    used: usize,
    limit: usize,
}

impl ToolBudget {
    pub fn new(limit: usize) -> Self {
        Self { used: 0, limit }
    }

    pub fn used(&self) -> usize {
        self.used
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn exhausted(&self) -> bool {
        self.used >= self.limit
    }

    fn consume(&mut self) -> bool {
        if self.exhausted() {
            return false;
        }
        self.used += 1;
        true
    }
}

/// 一轮的结果
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    /// 本轮最后一条 assistant 消息的内容
    pub text: String,
    pub limit_reached: bool,
}

/// 尝试失败的原因：传输层原始错误（由运行循环分类）或取消
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptFailure {
    Transport(String),
    Cancelled,
}

/// 工具调用循环：借用会话、分发器与观察者
pub struct ToolCallLoop<'a> {
    session: &'a CompletionSession,
    dispatcher: &'a dyn ToolDispatcher,
    observer: &'a dyn AgentObserver,
    cancel: &'a CancellationToken,
}

impl<'a> ToolCallLoop<'a> {
    pub fn new(
        session: &'a CompletionSession,
        dispatcher: &'a dyn ToolDispatcher,
        observer: &'a dyn AgentObserver,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            session,
            dispatcher,
            observer,
            cancel,
        }
    }

    /// 用 model_id 跑一轮；所有交换（assistant 工具请求、tool 结果、最终回复）直接追加到 store
    pub async fn run(
        &self,
        model_id: &str,
        system: Option<&Message>,
        store: &mut ConversationStore,
        tools: &[ToolSpec],
        budget: &mut ToolBudget,
    ) -> Result<TurnOutcome, AttemptFailure> {
        loop {
            let transcript: Vec<Message> = system
                .into_iter()
                .cloned()
                .chain(store.messages().iter().cloned())
                .collect();

            let outcome = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(AttemptFailure::Cancelled),
                r = self.session.exchange(model_id, &transcript, tools) => {
                    r.map_err(AttemptFailure::Transport)?
                }
            };

            let (content, calls) = match outcome {
                CompletionOutcome::Final(text) => {
                    let text = if text.trim().is_empty() {
                        EMPTY_REPLY.to_string()
                    } else {
                        text
                    };
                    store.push(Message::assistant(text.clone()));
                    return Ok(TurnOutcome {
                        text,
                        limit_reached: false,
                    });
                }
                CompletionOutcome::ToolCalls { content, calls } => (content, calls),
            };

            store.push(Message::assistant_tool_calls(content.clone(), calls.clone()));

            let mut limit_hit = false;
            for call in calls {
                if !budget.consume() {
                    // 未执行的调用也要有对应的 tool 消息，保持对话结构完整
                    limit_hit = true;
                    let skipped = ToolResult::failure("skipped: tool call limit reached");
                    store.push(Message::tool(call.id, skipped.to_message_content()));
                    continue;
                }
                tracing::debug!(tool = %call.name, used = budget.used(), limit = budget.limit(), "executing tool");
                self.observer.on_tool_call(&call.name, &call.arguments);
                let result = tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => return Err(AttemptFailure::Cancelled),
                    r = self.dispatcher.execute(&call.name, call.arguments.clone()) => r,
                };
                self.observer.on_tool_result(&call.name, &result);
                store.push(Message::tool(call.id, result.to_message_content()));
            }

            if limit_hit {
                tracing::warn!(limit = budget.limit(), "tool call limit reached, ending turn");
                let mut text = format!(
                    "I reached the tool call limit ({} calls) for this request and stopped here. \
                     The results gathered so far are above; ask me to continue if more work is needed.",
                    budget.limit()
                );
                if !content.trim().is_empty() {
                    text = format!("{}\n\n{}", content.trim(), text);
                }
                store.push(Message::assistant(text.clone()));
                return Ok(TurnOutcome {
                    text,
                    limit_reached: true,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::llm::{SamplingParams, ScriptedTransport, TokenUsage};
    use crate::memory::Role;
    use crate::react::NoopObserver;
    use crate::tools::{EchoTool, ToolExecutor, ToolRegistry};

    fn executor() -> ToolExecutor {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool);
        ToolExecutor::new(reg, 5)
    }

    fn session(t: ScriptedTransport) -> CompletionSession {
        CompletionSession::new(Arc::new(t), TokenUsage::new(), SamplingParams::default())
    }

    #[tokio::test]
    async fn test_tool_then_final() {
        let session = session(
            ScriptedTransport::new()
                .then_tool_call("echo", r#"{"text": "ping"}"#)
                .then_text("done: ping"),
        );
        let exec = executor();
        let cancel = CancellationToken::new();
        let tl = ToolCallLoop::new(&session, &exec, &NoopObserver, &cancel);

        let mut store = ConversationStore::new();
        store.push(Message::user("echo ping"));
        let mut budget = ToolBudget::new(20);
        let out = tl
            .run("m", None, &mut store, &exec.specs(), &mut budget)
            .await
            .unwrap();

        assert_eq!(out.text, "done: ping");
        assert!(!out.limit_reached);
        assert_eq!(budget.used(), 1);
        let roles: Vec<_> = store.messages().iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            [Role::User, Role::Assistant, Role::Tool, Role::Assistant]
        );
        let tool_msg = &store.messages()[2];
        assert_eq!(tool_msg.tool_call_id.as_deref(), Some("call_1"));
        assert!(tool_msg.content.contains("ping"));
    }

    #[tokio::test]
    async fn test_malformed_args_still_execute() {
        let session = session(
            ScriptedTransport::new()
                .then_tool_call("echo", "{this is not json")
                .then_text("ok"),
        );
        let exec = executor();
        let cancel = CancellationToken::new();
        let tl = ToolCallLoop::new(&session, &exec, &NoopObserver, &cancel);
        let mut store = ConversationStore::new();
        store.push(Message::user("go"));
        let out = tl
            .run("m", None, &mut store, &[], &mut ToolBudget::new(5))
            .await
            .unwrap();
        assert_eq!(out.text, "ok");
        // echo 收到空对象，回显默认值
        assert!(store.messages()[2].content.contains("(empty)"));
    }

    #[tokio::test]
    async fn test_ceiling_never_exceeded_and_ends_with_assistant() {
        let mut transport = ScriptedTransport::new();
        for i in 0..10 {
            transport = transport.then_tool_calls(vec![
                ("echo".to_string(), format!(r#"{{"text": "a{i}"}}"#)),
                ("echo".to_string(), format!(r#"{{"text": "b{i}"}}"#)),
            ]);
        }
        let session = session(transport);
        let exec = executor();
        let cancel = CancellationToken::new();
        let tl = ToolCallLoop::new(&session, &exec, &NoopObserver, &cancel);
        let mut store = ConversationStore::new();
        store.push(Message::user("loop forever"));
        let mut budget = ToolBudget::new(3);

        let out = tl
            .run("m", None, &mut store, &[], &mut budget)
            .await
            .unwrap();
        assert!(out.limit_reached);
        assert!(!out.text.is_empty());
        assert!(out.text.contains("tool call limit (3 calls)"));
        assert_eq!(budget.used(), 3);

        let last = store.messages().last().unwrap();
        assert_eq!(last.role, Role::Assistant);
        let executed = store
            .messages()
            .iter()
            .filter(|m| m.role == Role::Tool && m.content.contains("\"success\":true"))
            .count();
        assert_eq!(executed, 3);
        // 每个工具请求都有对应的 tool 消息
        let requested: usize = store.messages().iter().map(|m| m.tool_calls.len()).sum();
        let answered = store.messages().iter().filter(|m| m.role == Role::Tool).count();
        assert_eq!(requested, answered);
    }

    #[tokio::test]
    async fn test_transport_error_surfaces() {
        let session = session(ScriptedTransport::new().then_error("HTTP 500: boom"));
        let exec = executor();
        let cancel = CancellationToken::new();
        let tl = ToolCallLoop::new(&session, &exec, &NoopObserver, &cancel);
        let mut store = ConversationStore::new();
        store.push(Message::user("hi"));
        let err = tl
            .run("m", None, &mut store, &[], &mut ToolBudget::new(5))
            .await
            .unwrap_err();
        assert_eq!(err, AttemptFailure::Transport("HTTP 500: boom".into()));
    }

    #[tokio::test]
    async fn test_cancelled_before_exchange() {
        let session = session(ScriptedTransport::new().then_text("never"));
        let exec = executor();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let tl = ToolCallLoop::new(&session, &exec, &NoopObserver, &cancel);
        let mut store = ConversationStore::new();
        let err = tl
            .run("m", None, &mut store, &[], &mut ToolBudget::new(5))
            .await
            .unwrap_err();
        assert_eq!(err, AttemptFailure::Cancelled);
    }

    #[tokio::test]
    async fn test_empty_reply_placeholder() {
        let session = session(ScriptedTransport::new().then_text("   "));
        let exec = executor();
        let cancel = CancellationToken::new();
        let tl = ToolCallLoop::new(&session, &exec, &NoopObserver, &cancel);
        let mut store = ConversationStore::new();
        store.push(Message::user("hi"));
        let out = tl
            .run("m", None, &mut store, &[], &mut ToolBudget::new(5))
            .await
            .unwrap();
        assert_eq!(out.text, EMPTY_REPLY);
    }
}
