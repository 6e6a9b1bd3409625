//! Agent 构建器：统一的 Agent 初始化逻辑
//!
//! 进程启动时构建一次 Agent，之后按引用传给各调用点；不使用全局单例。
//! 未指定的组件按配置创建：传输层用 OpenAI 兼容 HTTP，工具用内置注册表，时钟用系统时钟。

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::agent::Agent;
use crate::config::AppConfig;
use crate::core::{AgentError, AgentRunLoop, RecoveryEngine, RunConfig};
use crate::llm::{
    default_catalog, ordered_pool, Clock, CompletionSession, CompletionTransport,
    ModelAvailabilityTracker, OpenAiTransport, SamplingParams, SystemClock, TokenUsage,
};
use crate::memory::FileContextInjector;
use crate::react::AgentObserver;
use crate::tools::{EchoTool, ToolDispatcher, ToolExecutor, ToolRegistry};

/// Agent 构建器：统一配置和初始化 Agent 的各个组件
pub struct AgentBuilder {
    config: AppConfig,
    transport: Option<Arc<dyn CompletionTransport>>,
    dispatcher: Option<Arc<dyn ToolDispatcher>>,
    clock: Option<Arc<dyn Clock>>,
    observer: Option<Arc<dyn AgentObserver>>,
    cancel: Option<CancellationToken>,
    injector: Option<FileContextInjector>,
}

impl AgentBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            transport: None,
            dispatcher: None,
            clock: None,
            observer: None,
            cancel: None,
            injector: None,
        }
    }

    pub fn with_transport(mut self, transport: Arc<dyn CompletionTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_dispatcher(mut self, dispatcher: Arc<dyn ToolDispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// 用给定注册表创建带超时的执行器
    pub fn with_tools(self, registry: ToolRegistry) -> Self {
        let timeout = self.config.tools.tool_timeout_secs;
        self.with_dispatcher(Arc::new(ToolExecutor::new(registry, timeout)))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn AgentObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn with_file_injector(mut self, injector: FileContextInjector) -> Self {
        self.injector = Some(injector);
        self
    }

    /// 默认工具注册表（仅 echo；具体工具由宿主通过 with_tools 提供）
    pub fn build_tool_registry(&self) -> ToolRegistry {
        let mut tools = ToolRegistry::new();
        tools.register(EchoTool);
        tools
    }

    pub fn build(self) -> Result<Agent, AgentError> {
        let cfg = &self.config;

        let catalog = if cfg.models.is_empty() {
            default_catalog()
        } else {
            cfg.models.clone()
        };
        let pool = ordered_pool(&catalog, cfg.agent.preferred_model.as_deref());
        let clock = self.clock.clone().unwrap_or_else(|| Arc::new(SystemClock));
        let tracker = ModelAvailabilityTracker::new(pool, clock.clone())?;
        tracing::info!(
            pool = ?tracker.pool().iter().map(|m| m.id.as_str()).collect::<Vec<_>>(),
            "model pool ready"
        );

        let transport = self
            .transport
            .clone()
            .unwrap_or_else(|| Arc::new(OpenAiTransport::from_config(&cfg.llm)));
        let session = CompletionSession::new(
            transport,
            TokenUsage::new(),
            SamplingParams {
                temperature: cfg.llm.temperature,
                max_tokens: cfg.llm.max_tokens,
            },
        );

        let dispatcher = match self.dispatcher.clone() {
            Some(d) => d,
            None => Arc::new(ToolExecutor::new(
                self.build_tool_registry(),
                cfg.tools.tool_timeout_secs,
            )),
        };

        let defaults = RunConfig::default();
        let run_config = RunConfig {
            max_retries: cfg.agent.max_retries,
            max_tool_calls: cfg.agent.max_tool_calls,
            plan_mode: cfg.agent.plan_mode,
            system_prompt: cfg
                .agent
                .system_prompt
                .clone()
                .unwrap_or(defaults.system_prompt),
        };

        let mut runner = AgentRunLoop::new(tracker, session, dispatcher, clock, run_config)
            .with_recovery(RecoveryEngine::from_config(&cfg.classifier));
        if let Some(observer) = self.observer {
            runner = runner.with_observer(observer);
        }
        if let Some(cancel) = self.cancel {
            runner = runner.with_cancellation(cancel);
        }

        let injector = self
            .injector
            .unwrap_or_else(|| FileContextInjector::from_config(&cfg.context));

        Ok(Agent::new(runner, injector, cfg.context.auto_compact_threshold))
    }
}
