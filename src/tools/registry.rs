//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / parameters_schema / execute），由 ToolRegistry
//! 按注册顺序保存；工具声明列表（ToolSpec）按同一顺序生成，会话内不变。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::llm::ToolSpec;
use crate::vault::{Bucket, VaultError};

/// 工具层错误
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("unknown tool '{0}'")]
    UnknownTool(String),

    #[error("invalid arguments for {tool}: {detail}")]
    InvalidArguments { tool: String, detail: String },

    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error("tool '{0}' is registered twice")]
    Duplicate(String),

    #[error("declared tools without an implementation: {}", .0.join(", "))]
    Incomplete(Vec<String>),

    #[error("tool task failed: {0}")]
    Internal(String),
}

impl ToolError {
    /// 致命错误终止工具循环；其余作为失败结果回馈给 LLM
    pub fn is_fatal(&self) -> bool {
        match self {
            ToolError::Vault(e) => e.is_fatal(),
            ToolError::Internal(_) => true,
            _ => false,
        }
    }
}

/// 工具对笔记库造成的可统计变化
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VaultEffect {
    ConceptAdded,
    Understanding { concept: String, bucket: Bucket },
    SourceAdded,
    Synthesis,
}

/// 工具执行结果：回馈给 LLM 的文本 + 可选的变化记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub content: String,
    pub effect: Option<VaultEffect>,
}

impl ToolOutput {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            effect: None,
        }
    }

    pub fn with_effect(mut self, effect: VaultEffect) -> Self {
        self.effect = Some(effect);
        self
    }
}

/// 工具 trait：名称、描述（供 LLM 理解）、参数 schema、异步执行（args 为已校验的 JSON）
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// 参数 JSON Schema
    fn parameters_schema(&self) -> Value;

    /// 是否写入 `topic` 参数指定的主题（执行器据此把主题限定在会话主题及其子主题内）
    fn writes_topic(&self) -> bool {
        false
    }

    async fn execute(&self, args: Value) -> Result<ToolOutput, ToolError>;
}

/// 工具注册表：保持注册顺序，按名查找
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) -> Result<(), ToolError> {
        self.register_arc(Arc::new(tool))
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) -> Result<(), ToolError> {
        let name = tool.name().to_string();
        if self.index.contains_key(&name) {
            return Err(ToolError::Duplicate(name));
        }
        self.index.insert(name, self.tools.len());
        self.tools.push(tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.index.get(name).map(|&i| Arc::clone(&self.tools[i]))
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name().to_string()).collect()
    }

    /// 按注册顺序生成工具声明
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools
            .iter()
            .map(|t| ToolSpec {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect()
    }

    /// 每个声明的工具名都必须有实现
    pub fn ensure_complete(&self, declared: &[&str]) -> Result<(), ToolError> {
        let missing: Vec<String> = declared
            .iter()
            .filter(|name| !self.index.contains_key(**name))
            .map(|name| name.to_string())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ToolError::Incomplete(missing))
        }
    }
}
