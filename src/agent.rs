//! Agent 运行时（显式上下文对象）
//!
//! 进程启动时由 AgentBuilder 构建一次，持有运行循环与对话历史，按引用传给各前端：
//! process_message 跑一次顶层运行；compact 压缩历史；run_pipeline 跑 Plan/Execute/Review。

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::core::{AgentError, AgentRunLoop, RunOutcome};
use crate::llm::{ModelStatus, UsageSnapshot};
use crate::memory::{ConversationStore, FileContextInjector, Message};
use crate::react::{AgentObserver, MultiAgentPipeline, PipelineReport};

/// 少于该条数时拒绝压缩
pub const MIN_MESSAGES_TO_COMPACT: usize = 4;

const COMPACT_PROMPT: &str = "You compress conversations. Summarize the conversation so far so that \
it can replace the full history: keep the user's goals, decisions made, important facts, file names, \
tool results that matter, and any open tasks. Be concise and factual.";

/// 压缩结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompactionStatus {
    /// 未压缩，历史不变
    Skipped { reason: String, messages: usize },
    /// 已替换为两条消息
    Compacted { before: usize, summary_chars: usize },
}

impl std::fmt::Display for CompactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompactionStatus::Skipped { reason, .. } => write!(f, "Compaction skipped: {}", reason),
            CompactionStatus::Compacted {
                before,
                summary_chars,
            } => write!(
                f,
                "Compacted {} messages into a {}-character summary",
                before, summary_chars
            ),
        }
    }
}

/// Agent：一个进程一个，生命周期内保留对话历史
pub struct Agent {
    runner: AgentRunLoop,
    conversation: ConversationStore,
    injector: FileContextInjector,
    auto_compact_threshold: usize,
}

impl Agent {
    pub fn new(runner: AgentRunLoop, injector: FileContextInjector, auto_compact_threshold: usize) -> Self {
        Self {
            runner,
            conversation: ConversationStore::new(),
            injector,
            auto_compact_threshold,
        }
    }

    /// 处理单条用户输入：必要时先自动压缩，注入文件上下文后跑一次顶层运行
    pub async fn process_message(&mut self, input: &str) -> Result<RunOutcome, AgentError> {
        if self.auto_compact_threshold > 0 && self.conversation.len() >= self.auto_compact_threshold {
            match self.compact().await {
                Ok(status) => tracing::info!(%status, "auto compaction"),
                Err(e) => tracing::warn!(error = %e, "auto compaction failed, continuing with full history"),
            }
        }
        let content = self.injector.inject(input);
        self.runner.run(&mut self.conversation, &content).await
    }

    /// 压缩历史：少于 4 条时不做任何事；否则请求一次摘要，并原子替换为两条消息
    pub async fn compact(&mut self) -> Result<CompactionStatus, AgentError> {
        let before = self.conversation.len();
        if before < MIN_MESSAGES_TO_COMPACT {
            return Ok(CompactionStatus::Skipped {
                reason: format!(
                    "only {} messages in history, need at least {}",
                    before, MIN_MESSAGES_TO_COMPACT
                ),
                messages: before,
            });
        }

        let mut transcript = vec![Message::system(COMPACT_PROMPT)];
        transcript.extend(self.conversation.messages().iter().cloned());
        transcript.push(Message::user(
            "Summarize the conversation above so it can replace the full history.",
        ));
        let summary = self.runner.complete_text(transcript).await?;
        let summary = summary.trim();
        if summary.is_empty() {
            return Ok(CompactionStatus::Skipped {
                reason: "the model returned an empty summary".to_string(),
                messages: before,
            });
        }

        self.conversation.replace_with_summary(summary);
        tracing::info!(before, after = self.conversation.len(), "history compacted");
        Ok(CompactionStatus::Compacted {
            before,
            summary_chars: summary.chars().count(),
        })
    }

    /// Plan -> Execute -> Review；成功后历史只多出「任务 + 汇总」两条
    pub async fn run_pipeline(&mut self, task: &str) -> Result<PipelineReport, AgentError> {
        MultiAgentPipeline::new(&mut self.runner, &mut self.conversation)
            .run(task)
            .await
    }

    pub fn history(&self) -> &[Message] {
        self.conversation.messages()
    }

    pub fn clear_history(&mut self) {
        self.conversation.clear();
    }

    pub fn token_usage(&self) -> UsageSnapshot {
        self.runner.usage().get()
    }

    pub fn model_status(&self) -> Vec<ModelStatus> {
        self.runner.tracker().status_snapshot()
    }

    pub fn set_observer(&mut self, observer: Arc<dyn AgentObserver>) {
        self.runner.set_observer(observer);
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.runner.cancellation_token()
    }
}
