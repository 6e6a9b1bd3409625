//! 模型可用性追踪：按模型记录冷却到期时间，选择当前可用模型
//!
//! 池很小（个位数），线性扫描即可。冷却只延长不缩短；未记录过的模型视为可用。
//! 单个 Agent 内只有运行循环会修改冷却表；多实例共享时调用方需串行化「选择或等待」。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::core::AgentError;
use crate::llm::{Clock, ModelCandidate};

/// select_available 的结果：选中的模型，以及（全部冷却时）需要等待的时长
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub model: ModelCandidate,
    pub wait: Option<Duration>,
}

impl Selection {
    pub fn is_immediate(&self) -> bool {
        self.wait.is_none()
    }
}

/// 单个模型的可用状态（供观测）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Availability {
    Available,
    Cooldown { remaining_secs: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelStatus {
    pub id: String,
    pub label: String,
    #[serde(flatten)]
    pub availability: Availability,
}

/// 可用性追踪器：持有有序模型池与冷却表
pub struct ModelAvailabilityTracker {
    pool: Vec<ModelCandidate>,
    cooldown_until: HashMap<String, Instant>,
    clock: Arc<dyn Clock>,
}

impl ModelAvailabilityTracker {
    /// pool 需已按「首选在前」排好序（见 catalog::ordered_pool）
    pub fn new(pool: Vec<ModelCandidate>, clock: Arc<dyn Clock>) -> Result<Self, AgentError> {
        if pool.is_empty() {
            return Err(AgentError::ConfigError("model pool is empty".to_string()));
        }
        Ok(Self {
            pool,
            cooldown_until: HashMap::new(),
            clock,
        })
    }

    pub fn pool(&self) -> &[ModelCandidate] {
        &self.pool
    }

    pub fn len(&self) -> usize {
        self.pool.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }

    fn remaining(&self, id: &str, now: Instant) -> Duration {
        self.cooldown_until
            .get(id)
            .map(|until| until.saturating_duration_since(now))
            .unwrap_or(Duration::ZERO)
    }

    /// 返回第一个冷却已过（或从未限流）的模型；全部冷却时返回最早恢复者及剩余等待，平局按池顺序
    pub fn select_available(&self) -> Selection {
        let now = self.clock.now();
        if let Some(model) = self
            .pool
            .iter()
            .find(|m| self.remaining(&m.id, now).is_zero())
        {
            return Selection {
                model: model.clone(),
                wait: None,
            };
        }
        // 池非空由构造保证
        let (model, wait) = self
            .pool
            .iter()
            .map(|m| (m, self.remaining(&m.id, now)))
            .min_by_key(|(_, wait)| *wait)
            .unwrap_or((&self.pool[0], Duration::ZERO));
        Selection {
            model: model.clone(),
            wait: Some(wait),
        }
    }

    /// 标记模型被限流：冷却到期时间 = now + 该模型自身的冷却时长；已有更晚的到期时间则保留
    pub fn record_rate_limited(&mut self, model_id: &str) {
        let Some(model) = self.pool.iter().find(|m| m.id == model_id) else {
            tracing::warn!(model = %model_id, "rate limit recorded for unknown model, ignored");
            return;
        };
        let until = self.clock.now() + model.cooldown();
        let entry = self.cooldown_until.entry(model.id.clone()).or_insert(until);
        if until > *entry {
            *entry = until;
        }
        tracing::info!(
            model = %model.id,
            cooldown_secs = model.cooldown_secs,
            "model marked rate-limited"
        );
    }

    /// 每个模型的 {available | cooldown, 剩余秒数}
    pub fn status_snapshot(&self) -> Vec<ModelStatus> {
        let now = self.clock.now();
        self.pool
            .iter()
            .map(|m| {
                let remaining = self.remaining(&m.id, now);
                let availability = if remaining.is_zero() {
                    Availability::Available
                } else {
                    Availability::Cooldown {
                        remaining_secs: remaining.as_secs_f64().ceil() as u64,
                    }
                };
                ModelStatus {
                    id: m.id.clone(),
                    label: m.display_label().to_string(),
                    availability,
                }
            })
            .collect()
    }
}
