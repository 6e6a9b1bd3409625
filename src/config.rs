//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `BEELINE__*` 覆盖（双下划线表示嵌套，如 `BEELINE__AGENT__MAX_RETRIES=5`）。

use std::path::PathBuf;

use serde::Deserialize;

use crate::llm::ModelCandidate;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub agent: AgentSection,
    pub llm: LlmSection,
    /// 模型目录覆盖；为空时使用内置目录
    pub models: Vec<ModelCandidate>,
    pub context: ContextSection,
    pub tools: ToolsSection,
    pub classifier: ClassifierSection,
}

/// [agent] 段：首选模型、重试预算、计划模式、工具调用上限
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    /// 首选模型 id，总是排在模型池第一位
    pub preferred_model: Option<String>,
    /// 非限流失败的重试预算；总尝试次数为 max(max_retries, 池大小 + 2)
    pub max_retries: usize,
    /// 计划模式：要求模型先输出计划再行动
    pub plan_mode: bool,
    /// 单次顶层运行内累计工具调用上限
    pub max_tool_calls: usize,
    pub system_prompt: Option<String>,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            preferred_model: None,
            max_retries: default_max_retries(),
            plan_mode: false,
            max_tool_calls: default_max_tool_calls(),
            system_prompt: None,
        }
    }
}

fn default_max_retries() -> usize {
    3
}

fn default_max_tool_calls() -> usize {
    20
}

/// [llm] 段：OpenAI 兼容端点与采样参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    pub base_url: String,
    /// 存放 API Key 的环境变量名
    pub api_key_env: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub request_timeout_secs: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            base_url: "https://api.groq.com/openai/v1".to_string(),
            api_key_env: "GROQ_API_KEY".to_string(),
            temperature: 0.3,
            max_tokens: Some(4096),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    60
}

/// [context] 段：文件上下文注入与自动压缩
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ContextSection {
    pub inject_files: bool,
    /// 相对路径的解析根目录，未设置时用当前目录
    pub workspace_root: Option<PathBuf>,
    pub max_file_bytes: usize,
    pub max_files: usize,
    /// 历史条数达到该值时，顶层运行前自动压缩；0 表示关闭
    pub auto_compact_threshold: usize,
}

impl Default for ContextSection {
    fn default() -> Self {
        Self {
            inject_files: true,
            workspace_root: None,
            max_file_bytes: 8000,
            max_files: 3,
            auto_compact_threshold: 40,
        }
    }
}

/// [tools] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    pub tool_timeout_secs: u64,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: default_tool_timeout_secs(),
        }
    }
}

fn default_tool_timeout_secs() -> u64 {
    30
}

/// [classifier] 段：传输层错误文本的子串标记（大小写不敏感）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClassifierSection {
    pub rate_limit_markers: Vec<String>,
    pub unavailable_markers: Vec<String>,
    pub auth_markers: Vec<String>,
}

impl Default for ClassifierSection {
    fn default() -> Self {
        let own = |xs: &[&str]| xs.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            rate_limit_markers: own(&[
                "rate limit",
                "rate_limit",
                "ratelimit",
                "quota",
                "http 429",
                "too many requests",
                "overloaded",
                "resource_exhausted",
                "tokens per minute",
            ]),
            unavailable_markers: own(&[
                "model_not_found",
                "not found",
                "does not exist",
                "unavailable",
                "decommissioned",
                "http 503",
            ]),
            auth_markers: own(&[
                "unauthorized",
                "invalid api key",
                "invalid_api_key",
                "invalid credential",
                "authentication",
                "http 401",
                "http 403",
            ]),
        }
    }
}

/// 从 config 目录加载配置，环境变量 BEELINE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 BEELINE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("BEELINE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.agent.max_retries, 3);
        assert_eq!(cfg.agent.max_tool_calls, 20);
        assert!(!cfg.agent.plan_mode);
        assert!(cfg.models.is_empty());
        assert!(cfg.classifier.auth_markers.iter().any(|m| m == "unauthorized"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("beeline.toml");
        std::fs::write(
            &path,
            r#"
[agent]
preferred_model = "small"
max_retries = 5
plan_mode = true

[[models]]
id = "big"
label = "Big"
cooldown_secs = 60

[[models]]
id = "small"
label = "Small"
cooldown_secs = 30
"#,
        )
        .unwrap();

        let cfg = load_config(Some(path)).unwrap();
        assert_eq!(cfg.agent.preferred_model.as_deref(), Some("small"));
        assert_eq!(cfg.agent.max_retries, 5);
        assert!(cfg.agent.plan_mode);
        assert_eq!(cfg.agent.max_tool_calls, 20);
        assert_eq!(cfg.models.len(), 2);
        assert_eq!(cfg.models[1].cooldown_secs, 30);
    }
}
