//! 核心编排层：Agent 构建、错误分类与恢复、模型轮换运行循环

pub mod builder;
pub mod error;
pub mod recovery;
pub mod run_loop;

pub use builder::AgentBuilder;
pub use error::{AgentError, RecoveryAction};
pub use recovery::RecoveryEngine;
pub use run_loop::{AgentRunLoop, RunConfig, RunOutcome, PLAN_MODE_PREFIX};
