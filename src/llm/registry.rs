//! 连接器工厂：按配置中的名字创建后端

use std::sync::Arc;

use crate::config::{api_key_for, LlmSection};
use crate::llm::{AnthropicConnector, Connector, MockConnector, OllamaConnector, OpenAiConnector};

pub const AVAILABLE_CONNECTORS: &[&str] = &["ollama", "openai", "anthropic", "mock"];

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("unknown connector '{name}' (available: {})", AVAILABLE_CONNECTORS.join(", "))]
    Unknown { name: String },

    #[error("connector '{connector}' needs an API key: set {env} or llm.api_key")]
    MissingApiKey { connector: String, env: &'static str },

    #[error("failed to build connector '{connector}': {detail}")]
    Build { connector: String, detail: String },
}

/// 根据 [llm] 段创建连接器；未知名字立即失败并列出可用项
pub fn create_connector(llm: &LlmSection) -> Result<Arc<dyn Connector>, RegistryError> {
    let name = llm.connector.trim().to_lowercase();
    let timeout = llm.timeouts.request;
    let build_err = |e: crate::llm::ConnectorError| RegistryError::Build {
        connector: name.clone(),
        detail: e.to_string(),
    };

    let connector: Arc<dyn Connector> = match name.as_str() {
        "ollama" => Arc::new(OllamaConnector::new(llm.base_url.clone(), &llm.model, timeout).map_err(build_err)?),
        "openai" => {
            let key = api_key_for(llm).ok_or(RegistryError::MissingApiKey {
                connector: name.clone(),
                env: "OPENAI_API_KEY",
            })?;
            Arc::new(OpenAiConnector::new(llm.base_url.clone(), &llm.model, key, timeout).map_err(build_err)?)
        }
        "anthropic" => {
            let key = api_key_for(llm).ok_or(RegistryError::MissingApiKey {
                connector: name.clone(),
                env: "ANTHROPIC_API_KEY",
            })?;
            Arc::new(
                AnthropicConnector::new(llm.base_url.clone(), &llm.model, key, llm.max_tokens, timeout)
                    .map_err(build_err)?,
            )
        }
        "mock" => Arc::new(MockConnector::new()),
        _ => return Err(RegistryError::Unknown { name: llm.connector.clone() }),
    };
    tracing::info!(connector = %connector.name(), model = %connector.model(), "connector selected");
    Ok(connector)
}
