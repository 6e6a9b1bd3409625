//! Beeline - Rust 智能体编排引擎
//!
//! 模块划分：
//! - **agent**: Agent 运行时（显式上下文对象：运行循环 + 对话历史）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: Agent 构建、错误分类与恢复、模型轮换运行循环
//! - **llm**: 传输层抽象与实现（OpenAI 兼容 / Mock）、模型目录、可用性追踪、补全会话
//! - **memory**: 对话历史、压缩、沙箱、文件上下文注入
//! - **observability**: tracing 初始化
//! - **react**: 工具调用循环、观察者事件、多智能体流水线
//! - **tools**: 工具注册表（按来源）与执行器

pub mod agent;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod react;
pub mod tools;

pub use agent::{Agent, CompactionStatus};
pub use crate::core::{AgentBuilder, AgentError, RunOutcome};
