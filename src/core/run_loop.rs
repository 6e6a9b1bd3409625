//! AgentRunLoop：选模型 -> 等待补全 -> {成功, 限流失败, 其他失败}
//!
//! - 限流 / 模型不可用：标记冷却；有立即可用的模型则立刻切换（尝试计数照常递增），否则睡到最早恢复者。
//! - 其他失败：独立计数，向对话注入纠正提示；超过 max_retries 即失败。鉴权失败直接终止。
//! - 总尝试次数 = max(max_retries, 池大小 + 2)，保证每个模型都被限流一次后仍有机会成功。
//!
//! 传输层与工具分发都不重试，所有分类与重试策略集中在这里。

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::core::{AgentError, RecoveryAction, RecoveryEngine};
use crate::llm::{
    Clock, CompletionOutcome, CompletionSession, ModelAvailabilityTracker, TokenUsage,
};
use crate::memory::{ConversationStore, Message};
use crate::react::{AgentObserver, AttemptFailure, NoopObserver, ToolBudget, ToolCallLoop};
use crate::tools::ToolDispatcher;

/// 计划模式下加在用户消息前的指令
pub const PLAN_MODE_PREFIX: &str = "[Plan mode] Before taking any action or calling any tool, \
write out a short numbered plan of the steps you will take. Then carry out the plan.";

/// 运行循环参数（来自 [agent] 配置段）
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub max_retries: usize,
    pub max_tool_calls: usize,
    pub plan_mode: bool,
    pub system_prompt: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            max_tool_calls: 20,
            plan_mode: false,
            system_prompt: "You are a helpful autonomous assistant. Use the available tools when \
                            they help you complete the task, then answer concisely."
                .to_string(),
        }
    }
}

/// 一次运行的结果
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub response: String,
    /// 最终成功的模型
    pub model: String,
    /// 消耗的尝试次数（含成功那次）
    pub attempts: usize,
    pub tool_calls: usize,
    pub tool_limit_reached: bool,
}

/// 一次尝试要做的交换
enum Exchange<'s> {
    /// 完整工具循环，结果写入对话历史
    Tools {
        store: &'s mut ConversationStore,
        budget: ToolBudget,
    },
    /// 不带工具的单次补全（计划 / 评审 / 压缩摘要），不触碰历史
    Plain { transcript: Vec<Message> },
}

impl Exchange<'_> {
    fn push_note(&mut self, note: String) {
        match self {
            Exchange::Tools { store, .. } => store.push(Message::user(note)),
            Exchange::Plain { transcript } => transcript.push(Message::user(note)),
        }
    }
}

/// 顶层运行循环：持有可用性追踪、补全会话、工具分发与恢复引擎
pub struct AgentRunLoop {
    tracker: ModelAvailabilityTracker,
    session: CompletionSession,
    dispatcher: Arc<dyn ToolDispatcher>,
    recovery: RecoveryEngine,
    observer: Arc<dyn AgentObserver>,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
    config: RunConfig,
}

impl AgentRunLoop {
    pub fn new(
        tracker: ModelAvailabilityTracker,
        session: CompletionSession,
        dispatcher: Arc<dyn ToolDispatcher>,
        clock: Arc<dyn Clock>,
        config: RunConfig,
    ) -> Self {
        Self {
            tracker,
            session,
            dispatcher,
            recovery: RecoveryEngine::default(),
            observer: Arc::new(NoopObserver),
            clock,
            cancel: CancellationToken::new(),
            config,
        }
    }

    pub fn with_recovery(mut self, recovery: RecoveryEngine) -> Self {
        self.recovery = recovery;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn AgentObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn set_observer(&mut self, observer: Arc<dyn AgentObserver>) {
        self.observer = observer;
    }

    pub fn observer(&self) -> &dyn AgentObserver {
        self.observer.as_ref()
    }

    pub fn tracker(&self) -> &ModelAvailabilityTracker {
        &self.tracker
    }

    pub fn usage(&self) -> &TokenUsage {
        self.session.usage()
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// 取消令牌的副本；宿主调用 cancel() 会在下一个挂起点终止运行
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// 总尝试预算
    pub fn max_attempts(&self) -> usize {
        self.config.max_retries.max(self.tracker.len() + 2)
    }

    /// 顶层运行：把用户消息写入历史，跑工具循环直到得到最终回复
    pub async fn run(
        &mut self,
        store: &mut ConversationStore,
        user_content: &str,
    ) -> Result<RunOutcome, AgentError> {
        let content = if self.config.plan_mode {
            format!("{}\n\n{}", PLAN_MODE_PREFIX, user_content)
        } else {
            user_content.to_string()
        };
        store.push(Message::user(content));

        let budget = ToolBudget::new(self.config.max_tool_calls);
        let span = tracing::info_span!("agent_run", run_id = %uuid::Uuid::new_v4().simple());
        self.drive(Exchange::Tools { store, budget })
            .instrument(span)
            .await
    }

    /// 不带工具的单次补全，沿用同样的轮换 / 重试策略；transcript 由调用方给出完整内容
    pub async fn complete_text(&mut self, transcript: Vec<Message>) -> Result<String, AgentError> {
        self.drive(Exchange::Plain { transcript })
            .await
            .map(|o| o.response)
    }

    fn system_message(&self) -> Option<Message> {
        let prompt = self.config.system_prompt.trim();
        (!prompt.is_empty()).then(|| Message::system(prompt.to_string()))
    }

    async fn attempt(
        &self,
        model_id: &str,
        exchange: &mut Exchange<'_>,
    ) -> Result<(String, usize, bool), AttemptFailure> {
        match exchange {
            Exchange::Tools { store, budget } => {
                let system = self.system_message();
                let tools = self.dispatcher.specs();
                let tool_loop = ToolCallLoop::new(
                    &self.session,
                    self.dispatcher.as_ref(),
                    self.observer.as_ref(),
                    &self.cancel,
                );
                let turn = tool_loop
                    .run(model_id, system.as_ref(), store, &tools, budget)
                    .await?;
                Ok((turn.text, budget.used(), turn.limit_reached))
            }
            Exchange::Plain { transcript } => {
                let outcome = tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => return Err(AttemptFailure::Cancelled),
                    r = self.session.exchange(model_id, transcript, &[]) => {
                        r.map_err(AttemptFailure::Transport)?
                    }
                };
                let text = match outcome {
                    CompletionOutcome::Final(text) => text,
                    CompletionOutcome::ToolCalls { content, .. } => content,
                };
                Ok((text, 0, false))
            }
        }
    }

    /// 状态机主体
    async fn drive(&mut self, mut exchange: Exchange<'_>) -> Result<RunOutcome, AgentError> {
        let max_attempts = self.max_attempts();
        let mut other_failures = 0usize;
        let mut rate_limit_failures = 0usize;
        let mut last_error = String::new();
        let mut last_was_rate_limit = false;

        for attempt in 1..=max_attempts {
            if self.cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }

            let selection = self.tracker.select_available();
            if let Some(wait) = selection.wait {
                let reason = format!(
                    "all models cooling down, waiting {}s for {}",
                    wait.as_secs_f64().ceil() as u64,
                    selection.model.id
                );
                tracing::warn!(attempt, max_attempts, wait_ms = wait.as_millis() as u64, "{}", reason);
                self.observer.on_retry(attempt, max_attempts, &reason);
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => return Err(AgentError::Cancelled),
                    _ = self.clock.sleep(wait) => {}
                }
            }
            let model = selection.model;
            tracing::info!(model = %model.id, attempt, max_attempts, "selected model");

            let failure = match self.attempt(&model.id, &mut exchange).await {
                Ok((response, tool_calls, tool_limit_reached)) => {
                    tracing::info!(
                        model = %model.id,
                        attempt,
                        tool_calls,
                        rate_limit_failures,
                        other_failures,
                        "run succeeded"
                    );
                    return Ok(RunOutcome {
                        response,
                        model: model.id,
                        attempts: attempt,
                        tool_calls,
                        tool_limit_reached,
                    });
                }
                Err(AttemptFailure::Cancelled) => return Err(AgentError::Cancelled),
                Err(AttemptFailure::Transport(raw)) => raw,
            };

            let err = self.recovery.classify(&model.id, &failure);
            last_error = failure;
            match self.recovery.handle(&err) {
                RecoveryAction::RotateModel => {
                    rate_limit_failures += 1;
                    last_was_rate_limit = true;
                    tracing::warn!(model = %model.id, attempt, error = %err, "model rate-limited");
                    self.tracker.record_rate_limited(&model.id);
                    // 无立即可用模型时，由下一轮的等待路径发出 on_retry
                    let next = self.tracker.select_available();
                    if next.is_immediate() {
                        self.observer
                            .on_model_switch(&model.id, &next.model.id, &err.to_string());
                    }
                }
                RecoveryAction::RetryWithPrompt(note) => {
                    other_failures += 1;
                    last_was_rate_limit = false;
                    tracing::warn!(
                        model = %model.id,
                        attempt,
                        other_failures,
                        max_retries = self.config.max_retries,
                        error = %err,
                        "transient failure"
                    );
                    if other_failures > self.config.max_retries {
                        return Err(AgentError::NonRateLimitRetriesExhausted {
                            failures: other_failures,
                            last_error,
                        });
                    }
                    exchange.push_note(note);
                    self.observer
                        .on_retry(attempt, max_attempts, &err.to_string());
                }
                RecoveryAction::Abort => {
                    tracing::error!(model = %model.id, error = %err, "aborting run");
                    return Err(err);
                }
            }
        }

        if last_was_rate_limit {
            Err(AgentError::AllModelsExhausted {
                attempts: max_attempts,
                last_error,
            })
        } else {
            Err(AgentError::NonRateLimitRetriesExhausted {
                failures: other_failures,
                last_error,
            })
        }
    }
}
