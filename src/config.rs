//! 应用配置：从 ~/.study/config.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件（`--config` 指定时用指定文件），再用环境变量 `STUDY__*` 覆盖
//! （双下划线表示嵌套，如 `STUDY__LLM__CONNECTOR=openai`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub vault: VaultSection,
}

/// [llm] 段：连接器选择与超时
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 连接器：ollama / openai / anthropic / mock
    #[serde(default = "default_connector")]
    pub connector: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    /// 未设置时从 OPENAI_API_KEY / ANTHROPIC_API_KEY 读取
    pub api_key: Option<String>,
    /// 仅 Anthropic 需要
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            connector: default_connector(),
            model: default_model(),
            base_url: None,
            api_key: None,
            max_tokens: default_max_tokens(),
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

fn default_connector() -> String {
    "ollama".to_string()
}

fn default_model() -> String {
    "qwen2.5:7b".to_string()
}

fn default_max_tokens() -> u32 {
    2048
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmTimeoutsSection {
    /// 单次连接器调用超时（秒）
    #[serde(default = "default_request_timeout")]
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: default_request_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    120
}

/// [vault] 段：笔记库根目录，支持 `~` 前缀
#[derive(Debug, Clone, Deserialize)]
pub struct VaultSection {
    #[serde(default = "default_vault_path")]
    pub path: String,
}

impl Default for VaultSection {
    fn default() -> Self {
        Self {
            path: default_vault_path(),
        }
    }
}

fn default_vault_path() -> String {
    "~/Documents/study-vault".to_string()
}

impl VaultSection {
    /// 展开 `~` 后的笔记库路径
    pub fn resolved_path(&self) -> PathBuf {
        expand_tilde(&self.path)
    }
}

/// `~` 或 `~/x` 展开为主目录；无法确定主目录时原样返回
pub fn expand_tilde(path: &str) -> PathBuf {
    let home = dirs::home_dir();
    match (path, home) {
        ("~", Some(home)) => home,
        (p, Some(home)) if p.starts_with("~/") => home.join(&p[2..]),
        (p, _) => PathBuf::from(p),
    }
}

/// 默认配置文件位置：~/.study/config.toml
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".study").join("config.toml"))
}

/// 加载配置，环境变量 STUDY__* 可覆盖
///
/// 1. 传入 config_path 时使用该文件（必须存在）；否则使用 ~/.study/config.toml（可缺省）
/// 2. 叠加环境变量 STUDY__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    match config_path {
        Some(path) => {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        None => {
            if let Some(path) = default_config_path().filter(|p| p.exists()) {
                builder = builder.add_source(config::File::from(path).required(false));
            }
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("STUDY")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}

/// 从配置文件或环境变量中取 API Key
pub fn api_key_for(llm: &LlmSection) -> Option<String> {
    if let Some(key) = llm.api_key.as_ref().filter(|k| !k.trim().is_empty()) {
        return Some(key.clone());
    }
    let var = match llm.connector.to_lowercase().as_str() {
        "openai" => "OPENAI_API_KEY",
        "anthropic" => "ANTHROPIC_API_KEY",
        _ => return None,
    };
    std::env::var(var).ok().filter(|k| !k.trim().is_empty())
}
