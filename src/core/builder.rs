//! 会话构建器：统一的 StudySession 初始化逻辑
//!
//! 初始化笔记库 → 注册工具并校验完整性 → 组装系统提示 → 创建会话。CLI 与测试共用同一条路径。

use std::sync::Arc;
use std::time::Duration;

use crate::commands::{CommandRouter, TextExtractor};
use crate::config::AppConfig;
use crate::core::{StudyError, StudySession};
use crate::llm::{create_connector, Connector};
use crate::react::prompt::system_prompt;
use crate::tools::{build_vault_registry, ToolExecutor, DECLARED_TOOLS};
use crate::vault::{sanitize_topic, templates, VaultStore};

/// 会话构建器
pub struct SessionBuilder {
    store: Arc<VaultStore>,
    connector: Arc<dyn Connector>,
    topic: String,
    request_timeout: Option<Duration>,
    extractor: Option<Arc<dyn TextExtractor>>,
}

impl SessionBuilder {
    pub fn new(store: Arc<VaultStore>, connector: Arc<dyn Connector>) -> Self {
        Self {
            store,
            connector,
            topic: "general".to_string(),
            request_timeout: None,
            extractor: None,
        }
    }

    /// 从配置创建：笔记库路径、连接器、请求超时
    pub fn from_config(config: &AppConfig) -> Result<Self, StudyError> {
        let store = Arc::new(VaultStore::new(config.vault.resolved_path()));
        let connector = create_connector(&config.llm)?;
        Ok(Self::new(store, connector).with_request_timeout(Duration::from_secs(config.llm.timeouts.request)))
    }

    /// 设置主题（按主题名规范清洗）
    pub fn with_topic(mut self, topic: &str) -> Self {
        self.topic = sanitize_topic(topic);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// 替换附件文本提取器
    pub fn with_extractor(mut self, extractor: Arc<dyn TextExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn build(self) -> Result<StudySession, StudyError> {
        self.store.init()?;

        let registry = build_vault_registry(Arc::clone(&self.store)).map_err(|e| StudyError::Tooling(e.to_string()))?;
        registry
            .ensure_complete(DECLARED_TOOLS)
            .map_err(|e| StudyError::Tooling(e.to_string()))?;

        let framework = self
            .store
            .read_framework()?
            .unwrap_or_else(|| templates::FRAMEWORK.to_string());
        let profile = self.store.read_profile()?.map(|p| p.content);
        let note = self.store.read_topic(&self.topic)?.map(|n| n.content);
        let subtopics = self.store.subtopics(&self.topic)?;
        let prompt = system_prompt(&framework, profile.as_deref(), &self.topic, note.as_deref(), &subtopics);

        let router = match self.extractor {
            Some(extractor) => CommandRouter::with_extractor(Arc::clone(&self.store), extractor),
            None => CommandRouter::new(Arc::clone(&self.store)),
        };
        tracing::info!(
            topic = %self.topic,
            connector = self.connector.name(),
            model = self.connector.model(),
            tools = registry.len(),
            "session ready"
        );
        let executor = ToolExecutor::new(registry, self.topic.clone());
        let mut session = StudySession::new(self.topic, self.store, self.connector, executor, router, prompt);
        session.set_request_timeout(self.request_timeout);
        Ok(session)
    }
}
