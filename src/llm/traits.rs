//! LLM 连接器抽象
//!
//! 所有后端（Ollama / OpenAI / Anthropic / Mock）实现 Connector：complete（非流式，携带工具 schema）
//! 与 stream（仅供渲染层逐段输出文本）。后端各自把线上格式映射为规范的 Response / ToolCall / StopReason。

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::{stream, Stream};
use serde::Serialize;
use thiserror::Error;

use crate::memory::{Message, ToolCall};

/// 文本片段流
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String, ConnectorError>> + Send>>;

/// 连接器错误；连接器内部不重试
#[derive(Error, Debug)]
pub enum ConnectorError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

/// 停止原因（规范化）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Stop,
    ToolCalls,
    Length,
    Error,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

/// 规范化的模型响应
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub stop_reason: StopReason,
    pub usage: Option<Usage>,
}

impl Response {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
            stop_reason: StopReason::Stop,
            usage: None,
        }
    }

    pub fn tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            content: content.into(),
            tool_calls,
            stop_reason: StopReason::ToolCalls,
            usage: None,
        }
        .normalized()
    }

    pub fn with_stop_reason(mut self, stop_reason: StopReason) -> Self {
        self.stop_reason = stop_reason;
        self.normalized()
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }

    /// 带工具调用的响应一律视为 ToolCalls；声称 ToolCalls 却没有调用的视为 Stop
    pub fn normalized(mut self) -> Self {
        if !self.tool_calls.is_empty() && self.stop_reason != StopReason::Error {
            self.stop_reason = StopReason::ToolCalls;
        } else if self.tool_calls.is_empty() && self.stop_reason == StopReason::ToolCalls {
            self.stop_reason = StopReason::Stop;
        }
        self
    }
}

/// 工具声明（名称、描述、参数 JSON Schema），进程内不可变
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// LLM 连接器
#[async_trait]
pub trait Connector: Send + Sync {
    /// 后端名（ollama / openai / anthropic / mock）
    fn name(&self) -> &str;

    fn model(&self) -> &str;

    /// 非流式完成：可能返回工具调用
    async fn complete(&self, messages: &[Message], tools: &[ToolSpec]) -> Result<Response, ConnectorError>;

    /// 流式文本；默认退化为一次 complete 的整段输出
    async fn stream(&self, messages: &[Message], tools: &[ToolSpec]) -> Result<TokenStream, ConnectorError> {
        let response = self.complete(messages, tools).await?;
        Ok(Box::pin(stream::iter(vec![Ok(response.content)])))
    }
}
