//! 运行过程事件与观察者
//!
//! AgentObserver 的所有方法默认空实现；未挂观察者时使用 NoopObserver，运行循环行为完全一致。
//! ChannelObserver 把事件转成可序列化的 AgentEvent 推给宿主 UI（如 Web SSE）。

use serde::Serialize;
use tokio::sync::mpsc;

use crate::tools::ToolResult;

/// 观察者接口（交互模式挂 UI，静默模式不挂）
pub trait AgentObserver: Send + Sync {
    fn on_tool_call(&self, _name: &str, _args: &serde_json::Value) {}

    fn on_tool_result(&self, _name: &str, _result: &ToolResult) {}

    fn on_retry(&self, _attempt: usize, _max: usize, _reason: &str) {}

    fn on_model_switch(&self, _from: &str, _to: &str, _reason: &str) {}

    fn on_phase(&self, _phase: &str, _message: &str) {}
}

/// 不做任何事的观察者
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl AgentObserver for NoopObserver {}

/// 单步过程事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    ToolCall {
        tool: String,
        args: serde_json::Value,
    },
    ToolResult {
        tool: String,
        success: bool,
        preview: String,
    },
    Retry {
        attempt: usize,
        max: usize,
        reason: String,
    },
    ModelSwitch {
        from: String,
        to: String,
        reason: String,
    },
    Phase {
        phase: String,
        message: String,
    },
}

/// 工具结果预览最大字符数
const RESULT_PREVIEW_CHARS: usize = 200;

/// 把事件推入无界通道；接收端已关闭时静默丢弃
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<AgentEvent>,
}

impl ChannelObserver {
    pub fn new(tx: mpsc::UnboundedSender<AgentEvent>) -> Self {
        Self { tx }
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<AgentEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    fn send(&self, ev: AgentEvent) {
        let _ = self.tx.send(ev);
    }
}

impl AgentObserver for ChannelObserver {
    fn on_tool_call(&self, name: &str, args: &serde_json::Value) {
        self.send(AgentEvent::ToolCall {
            tool: name.to_string(),
            args: args.clone(),
        });
    }

    fn on_tool_result(&self, name: &str, result: &ToolResult) {
        let text = result
            .payload
            .as_deref()
            .or(result.error.as_deref())
            .unwrap_or("");
        let mut preview: String = text.chars().take(RESULT_PREVIEW_CHARS).collect();
        if text.chars().count() > RESULT_PREVIEW_CHARS {
            preview.push_str("...");
        }
        self.send(AgentEvent::ToolResult {
            tool: name.to_string(),
            success: result.success,
            preview,
        });
    }

    fn on_retry(&self, attempt: usize, max: usize, reason: &str) {
        self.send(AgentEvent::Retry {
            attempt,
            max,
            reason: reason.to_string(),
        });
    }

    fn on_model_switch(&self, from: &str, to: &str, reason: &str) {
        self.send(AgentEvent::ModelSwitch {
            from: from.to_string(),
            to: to.to_string(),
            reason: reason.to_string(),
        });
    }

    fn on_phase(&self, phase: &str, message: &str) {
        self.send(AgentEvent::Phase {
            phase: phase.to_string(),
            message: message.to_string(),
        });
    }
}
