//! 对话历史：消息模型与 ConversationStore
//!
//! 运行期间只追加；整体替换只发生在 Compaction（且替换后恰好两条消息）。
//! 多智能体流水线的执行阶段通过 HistorySandbox 临时清空历史，离开作用域时无条件恢复。

use std::ops::{Deref, DerefMut};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 消息角色（与 Chat Completions API 一致；System 只在发请求时拼接，不进入历史）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// 模型发起的一次工具调用：{id, name, arguments}
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocationRequest {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

impl ToolInvocationRequest {
    /// 由原始参数文本构建；解析失败或不是 JSON 对象时退化为空对象，不中断当前轮
    pub fn from_raw(id: impl Into<String>, name: impl Into<String>, raw_arguments: &str) -> Self {
        let name = name.into();
        let arguments = match serde_json::from_str::<Value>(raw_arguments) {
            Ok(v @ Value::Object(_)) => v,
            Ok(_) | Err(_) if raw_arguments.trim().is_empty() => Value::Object(Default::default()),
            Ok(other) => {
                tracing::warn!(tool = %name, args = %other, "tool arguments are not an object, using {{}}");
                Value::Object(Default::default())
            }
            Err(e) => {
                tracing::warn!(tool = %name, error = %e, "malformed tool arguments, using {{}}");
                Value::Object(Default::default())
            }
        };
        Self {
            id: id.into(),
            name,
            arguments,
        }
    }
}

/// 单条消息；tool 消息通过 tool_call_id 关联到发起它的调用
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// 仅 assistant 消息：本轮请求的工具调用
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolInvocationRequest>,
}

impl Message {
    fn with_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_call_id: None,
            tool_calls: Vec::new(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content)
    }

    /// assistant 消息，携带本轮的工具调用请求
    pub fn assistant_tool_calls(content: impl Into<String>, calls: Vec<ToolInvocationRequest>) -> Self {
        Self {
            tool_calls: calls,
            ..Self::with_role(Role::Assistant, content)
        }
    }

    /// 工具结果消息，关联到 call_id
    pub fn tool(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(call_id.into()),
            ..Self::with_role(Role::Tool, content)
        }
    }
}

/// Agent 生命周期内的对话历史（跨多次顶层调用保留，直到显式 clear）
#[derive(Clone, Debug, Default)]
pub struct ConversationStore {
    messages: Vec<Message>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, msg: Message) {
        self.messages.push(msg);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// 原子替换为「摘要 user + 确认 assistant」两条消息；只供 Compaction 使用
    pub(crate) fn replace_with_summary(&mut self, summary: &str) {
        self.messages = vec![
            Message::user(format!("[Previous context summary]\n\n{}", summary)),
            Message::assistant(
                "Understood. I have the context of our previous conversation and will continue from there.",
            ),
        ];
    }

    fn take(&mut self) -> Vec<Message> {
        std::mem::take(&mut self.messages)
    }

    fn restore(&mut self, messages: Vec<Message>) {
        self.messages = messages;
    }
}

/// 历史沙箱：进入时保存并清空历史，Drop 时无条件恢复（含错误与 panic 路径）
pub struct HistorySandbox<'a> {
    store: &'a mut ConversationStore,
    saved: Option<Vec<Message>>,
}

impl<'a> HistorySandbox<'a> {
    pub fn enter(store: &'a mut ConversationStore) -> Self {
        let saved = store.take();
        tracing::debug!(saved = saved.len(), "history sandbox entered");
        Self {
            store,
            saved: Some(saved),
        }
    }
}

impl Deref for HistorySandbox<'_> {
    type Target = ConversationStore;

    fn deref(&self) -> &Self::Target {
        self.store
    }
}

impl DerefMut for HistorySandbox<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.store
    }
}

impl Drop for HistorySandbox<'_> {
    fn drop(&mut self) {
        if let Some(saved) = self.saved.take() {
            let discarded = self.store.len();
            self.store.restore(saved);
            tracing::debug!(discarded, restored = self.store.len(), "history sandbox restored");
        }
    }
}
