//! 模型目录：不可变的候选模型（id / 展示名 / 冷却时长）
//!
//! 冷却时长是模型自身属性：小而快的模型通常恢复得更快。

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// 未知首选模型插入池首时使用的冷却时长
pub const DEFAULT_COOLDOWN_SECS: u64 = 60;

/// 候选模型
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelCandidate {
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

fn default_cooldown_secs() -> u64 {
    DEFAULT_COOLDOWN_SECS
}

impl ModelCandidate {
    pub fn new(id: impl Into<String>, label: impl Into<String>, cooldown_secs: u64) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            cooldown_secs,
        }
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    /// 展示名；未配置 label 时退回 id
    pub fn display_label(&self) -> &str {
        if self.label.is_empty() {
            &self.id
        } else {
            &self.label
        }
    }
}

/// 内置目录（按推荐顺序）
pub fn default_catalog() -> Vec<ModelCandidate> {
    vec![
        ModelCandidate::new("llama-3.3-70b-versatile", "Llama 3.3 70B", 60),
        ModelCandidate::new("openai/gpt-oss-120b", "GPT-OSS 120B", 60),
        ModelCandidate::new("qwen/qwen3-32b", "Qwen3 32B", 45),
        ModelCandidate::new("llama-3.1-8b-instant", "Llama 3.1 8B Instant", 20),
    ]
}

/// 按「首选模型在前，其余保持目录顺序」构建模型池；首选不在目录中时以默认冷却插入池首
pub fn ordered_pool(catalog: &[ModelCandidate], preferred: Option<&str>) -> Vec<ModelCandidate> {
    let Some(preferred) = preferred.filter(|p| !p.is_empty()) else {
        return catalog.to_vec();
    };
    let head = catalog
        .iter()
        .find(|m| m.id == preferred)
        .cloned()
        .unwrap_or_else(|| {
            tracing::warn!(model = %preferred, "preferred model not in catalog, adding it");
            ModelCandidate::new(preferred, preferred, DEFAULT_COOLDOWN_SECS)
        });
    std::iter::once(head)
        .chain(catalog.iter().filter(|m| m.id != preferred).cloned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Vec<ModelCandidate> {
        vec![
            ModelCandidate::new("a", "A", 60),
            ModelCandidate::new("b", "B", 30),
            ModelCandidate::new("c", "", 10),
        ]
    }

    #[test]
    fn test_preferred_moves_to_front() {
        let pool = ordered_pool(&catalog(), Some("c"));
        let ids: Vec<_> = pool.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["c", "a", "b"]);
    }

    #[test]
    fn test_no_preferred_keeps_catalog_order() {
        let pool = ordered_pool(&catalog(), None);
        let ids: Vec<_> = pool.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
    }

    #[test]
    fn test_unknown_preferred_is_inserted() {
        let pool = ordered_pool(&catalog(), Some("custom"));
        assert_eq!(pool.len(), 4);
        assert_eq!(pool[0].id, "custom");
        assert_eq!(pool[0].cooldown_secs, DEFAULT_COOLDOWN_SECS);
    }

    #[test]
    fn test_display_label_falls_back_to_id() {
        assert_eq!(catalog()[2].display_label(), "c");
        assert_eq!(catalog()[0].display_label(), "A");
    }
}
