//! 错误恢复引擎
//!
//! classify：把传输层的原始错误文本按子串标记归类为 AgentError（限流优先于鉴权，
//! 避免 "Used 5401" 这类数字误判）；handle：把 AgentError 映射为 RecoveryAction。

use crate::config::ClassifierSection;
use crate::core::{AgentError, RecoveryAction};

/// 语义化错误恢复：分类 + 动作
#[derive(Debug, Clone)]
pub struct RecoveryEngine {
    rate_limit: Vec<String>,
    unavailable: Vec<String>,
    auth: Vec<String>,
}

impl Default for RecoveryEngine {
    fn default() -> Self {
        Self::from_config(&ClassifierSection::default())
    }
}

fn lowered(markers: &[String]) -> Vec<String> {
    markers.iter().map(|m| m.to_lowercase()).collect()
}

impl RecoveryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(cfg: &ClassifierSection) -> Self {
        Self {
            rate_limit: lowered(&cfg.rate_limit_markers),
            unavailable: lowered(&cfg.unavailable_markers),
            auth: lowered(&cfg.auth_markers),
        }
    }

    /// 将 model 上的一次传输失败归类
    pub fn classify(&self, model: &str, raw: &str) -> AgentError {
        let text = raw.to_lowercase();
        let hit = |markers: &[String]| markers.iter().any(|m| text.contains(m.as_str()));
        if hit(&self.rate_limit) {
            AgentError::RateLimited {
                model: model.to_string(),
                message: raw.to_string(),
            }
        } else if hit(&self.auth) {
            AgentError::AuthenticationFailure(raw.to_string())
        } else if hit(&self.unavailable) {
            AgentError::ModelUnavailable {
                model: model.to_string(),
                message: raw.to_string(),
            }
        } else {
            AgentError::TransientFailure(raw.to_string())
        }
    }

    /// 根据错误类型返回建议的恢复动作
    pub fn handle(&self, err: &AgentError) -> RecoveryAction {
        match err {
            AgentError::RateLimited { .. } | AgentError::ModelUnavailable { .. } => {
                RecoveryAction::RotateModel
            }
            AgentError::TransientFailure(msg) => RecoveryAction::RetryWithPrompt(format!(
                "[system note] The previous request failed with: {}. \
                 If this was caused by your last output (for example malformed tool arguments \
                 or an invalid tool name), correct it and continue the task.",
                truncate(msg, 500)
            )),
            _ => RecoveryAction::Abort,
        }
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        format!("{}...", s.chars().take(max_chars).collect::<String>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_rate_limit() {
        let engine = RecoveryEngine::new();
        let err = engine.classify(
            "m",
            "HTTP 429: Rate limit reached for model. Limit 6000, Used 5401, Requested 900",
        );
        assert!(matches!(err, AgentError::RateLimited { ref model, .. } if model == "m"));
        assert!(matches!(
            engine.classify("m", "You exceeded your current quota"),
            AgentError::RateLimited { .. }
        ));
    }

    #[test]
    fn test_classify_model_unavailable() {
        let engine = RecoveryEngine::new();
        let err = engine.classify("m", "HTTP 404: The model `m` does not exist");
        assert!(matches!(err, AgentError::ModelUnavailable { .. }));
        assert!(err.is_rate_limit());
    }

    #[test]
    fn test_classify_auth() {
        let engine = RecoveryEngine::new();
        assert!(matches!(
            engine.classify("m", "HTTP 401: Invalid API Key"),
            AgentError::AuthenticationFailure(_)
        ));
        assert!(matches!(
            engine.classify("m", "Unauthorized: API key missing"),
            AgentError::AuthenticationFailure(_)
        ));
    }

    #[test]
    fn test_classify_transient() {
        let engine = RecoveryEngine::new();
        assert!(matches!(
            engine.classify("m", "error sending request: operation timed out"),
            AgentError::TransientFailure(_)
        ));
    }

    #[test]
    fn test_handle_actions() {
        let engine = RecoveryEngine::new();
        let rl = engine.classify("m", "too many requests");
        assert_eq!(engine.handle(&rl), RecoveryAction::RotateModel);

        let auth = AgentError::AuthenticationFailure("x".into());
        assert_eq!(engine.handle(&auth), RecoveryAction::Abort);

        match engine.handle(&AgentError::TransientFailure("bad json".into())) {
            RecoveryAction::RetryWithPrompt(note) => assert!(note.contains("bad json")),
            other => panic!("Expected RetryWithPrompt, got {:?}", other),
        }
    }

    #[test]
    fn test_custom_markers() {
        let cfg = ClassifierSection {
            rate_limit_markers: vec!["SLOW_DOWN".into()],
            unavailable_markers: vec![],
            auth_markers: vec![],
        };
        let engine = RecoveryEngine::from_config(&cfg);
        assert!(engine.classify("m", "server says slow_down").is_rate_limit());
        assert!(matches!(
            engine.classify("m", "HTTP 401"),
            AgentError::TransientFailure(_)
        ));
    }
}
