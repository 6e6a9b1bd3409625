//! 记忆层：对话历史（追加 / 压缩 / 沙箱）与文件上下文注入

pub mod conversation;
pub mod file_context;

pub use conversation::{ConversationStore, HistorySandbox, Message, Role, ToolInvocationRequest};
pub use file_context::FileContextInjector;
