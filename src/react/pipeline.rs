//! 多智能体流水线：Planner -> Executor -> Reviewer
//!
//! 计划与评审各是一次不带工具的补全；执行阶段是一次完整运行，在 HistorySandbox 中对空历史进行，
//! 结束后恢复原历史，只追加「任务 + 汇总」两条消息。任一阶段失败即中止，原历史保持不变。

use crate::core::{AgentError, AgentRunLoop, RunOutcome};
use crate::memory::{ConversationStore, HistorySandbox, Message};

const PLANNER_PROMPT: &str = "You are the planner in a three-step pipeline (plan, execute, review). \
Break the user's task into a short numbered list of concrete steps. Do not execute anything; output only the plan.";

const REVIEWER_PROMPT: &str = "You are the reviewer in a three-step pipeline (plan, execute, review). \
Given the task, the plan and the executor's result, check whether the task was completed. \
Point out problems or missing steps briefly, then give a one-paragraph final verdict.";

/// 流水线各阶段的产出
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub plan: String,
    pub execution: RunOutcome,
    pub review: String,
    /// 追加到历史中的汇总
    pub summary: String,
}

/// 借用运行循环与对话历史，完成一次三阶段任务
pub struct MultiAgentPipeline<'a> {
    runner: &'a mut AgentRunLoop,
    store: &'a mut ConversationStore,
}

impl<'a> MultiAgentPipeline<'a> {
    pub fn new(runner: &'a mut AgentRunLoop, store: &'a mut ConversationStore) -> Self {
        Self { runner, store }
    }

    pub async fn run(self, task: &str) -> Result<PipelineReport, AgentError> {
        let Self { runner, store } = self;

        runner.observer().on_phase("plan", "Planning the task");
        let plan = runner
            .complete_text(vec![Message::system(PLANNER_PROMPT), Message::user(task)])
            .await?;
        tracing::info!(plan_chars = plan.len(), "pipeline plan ready");

        runner.observer().on_phase("execute", "Executing the plan");
        let execution = {
            let mut sandbox = HistorySandbox::enter(store);
            runner
                .run(
                    &mut sandbox,
                    &format!(
                        "Task:\n{}\n\nPlan:\n{}\n\nCarry out this plan step by step using the available tools, \
                         then report what was done and the outcome.",
                        task, plan
                    ),
                )
                .await?
        };
        tracing::info!(
            model = %execution.model,
            tool_calls = execution.tool_calls,
            "pipeline execution finished"
        );

        runner.observer().on_phase("review", "Reviewing the result");
        let review = runner
            .complete_text(vec![
                Message::system(REVIEWER_PROMPT),
                Message::user(format!(
                    "Task:\n{}\n\nPlan:\n{}\n\nExecutor result:\n{}",
                    task, plan, execution.response
                )),
            ])
            .await?;

        let summary = format!(
            "## Plan\n{}\n\n## Result\n{}\n\n## Review\n{}",
            plan.trim(),
            execution.response.trim(),
            review.trim()
        );
        store.push(Message::user(task));
        store.push(Message::assistant(summary.clone()));
        runner.observer().on_phase("done", "Pipeline finished");

        Ok(PipelineReport {
            plan,
            execution,
            review,
            summary,
        })
    }
}
