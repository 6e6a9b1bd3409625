//! 认知层：工具调用循环、观察者事件、Plan/Execute/Review 多智能体流水线

pub mod events;
pub mod loop_;
pub mod pipeline;

pub use events::{AgentEvent, AgentObserver, ChannelObserver, NoopObserver};
pub use loop_::{AttemptFailure, ToolBudget, ToolCallLoop, TurnOutcome};
pub use pipeline::{MultiAgentPipeline, PipelineReport};
