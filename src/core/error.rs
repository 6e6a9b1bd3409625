//! Agent 错误类型与恢复动作
//!
//! 与 RecoveryEngine 配合：传输层错误文本先被分类为 AgentError，再映射为 RotateModel / RetryWithPrompt / Abort。

use thiserror::Error;

/// Agent 运行过程中可能出现的错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AgentError {
    /// 模型被限流（配额 / 过载），可通过轮换恢复
    #[error("Rate limited on {model}: {message}")]
    RateLimited { model: String, message: String },

    /// 模型不存在或不可用，处理方式与限流相同
    #[error("Model {model} unavailable: {message}")]
    ModelUnavailable { model: String, message: String },

    /// 凭证无效：致命，不重试
    #[error("Authentication failed: {0}")]
    AuthenticationFailure(String),

    /// 其他失败：有限次重试，并向对话注入自我纠正提示
    #[error("Transient failure: {0}")]
    TransientFailure(String),

    /// 轮换路径耗尽
    #[error("All models exhausted after {attempts} attempts (last error: {last_error})")]
    AllModelsExhausted { attempts: usize, last_error: String },

    /// 非限流重试路径耗尽
    #[error("Giving up after {failures} non-rate-limit failures (last error: {last_error})")]
    NonRateLimitRetriesExhausted { failures: usize, last_error: String },

    #[error("Cancelled")]
    Cancelled,

    #[error("Config error: {0}")]
    ConfigError(String),
}

impl AgentError {
    /// 终止性失败给用户的区分性提示（由宿主 UI 渲染）
    pub fn user_hint(&self) -> &'static str {
        match self {
            AgentError::RateLimited { .. } | AgentError::ModelUnavailable { .. } => {
                "The model is rate-limited right now. Try again shortly."
            }
            AgentError::AuthenticationFailure(_) => {
                "Authentication failed. Fix your API credentials and try again."
            }
            AgentError::AllModelsExhausted { .. } => {
                "All models are rate-limited or unavailable. Wait a minute and retry."
            }
            AgentError::NonRateLimitRetriesExhausted { .. } | AgentError::TransientFailure(_) => {
                "The request kept failing. Check the error above and try again."
            }
            AgentError::Cancelled => "The run was cancelled.",
            AgentError::ConfigError(_) => "Check your configuration file.",
        }
    }

    /// 是否属于可轮换恢复的一类（限流 / 模型不可用）
    pub fn is_rate_limit(&self) -> bool {
        matches!(
            self,
            AgentError::RateLimited { .. } | AgentError::ModelUnavailable { .. }
        )
    }
}

/// 恢复引擎根据错误类型给出的建议动作
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryAction {
    /// 标记当前模型冷却并换用下一个可用模型（无可用时等待最早恢复者）
    RotateModel,
    /// 将纠正提示注入对话，让模型重试
    RetryWithPrompt(String),
    /// 终止当前任务
    Abort,
}
