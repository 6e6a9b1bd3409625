//! LLM 层：传输抽象与实现（OpenAI 兼容 HTTP / Mock）、模型目录、可用性追踪、单次补全会话

pub mod availability;
pub mod catalog;
pub mod clock;
pub mod mock;
pub mod openai;
pub mod session;
pub mod traits;

pub use availability::{Availability, ModelAvailabilityTracker, ModelStatus, Selection};
pub use catalog::{default_catalog, ordered_pool, ModelCandidate};
pub use clock::{Clock, ManualClock, SystemClock};
pub use mock::ScriptedTransport;
pub use openai::OpenAiTransport;
pub use session::{CompletionOutcome, CompletionSession, SamplingParams, TokenUsage, UsageSnapshot};
pub use traits::{
    CompletionRequest, CompletionResponse, CompletionTransport, RawToolCall, ToolSpec, Usage,
};
