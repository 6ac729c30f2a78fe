//! 各 HTTP 后端共用的请求发送与错误映射

use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;

use crate::llm::ConnectorError;

/// 带整体超时的 HTTP 客户端
pub(crate) fn build_client(timeout_secs: u64) -> Result<Client, ConnectorError> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ConnectorError::Unavailable(format!("failed to create HTTP client: {e}")))
}

/// 发送请求；非 2xx 按状态码映射错误，成功时解析 JSON
pub(crate) async fn send_json(request: RequestBuilder, provider: &str) -> Result<Value, ConnectorError> {
    let response = send(request, provider).await?;
    response
        .json::<Value>()
        .await
        .map_err(|e| ConnectorError::MalformedResponse(format!("{provider}: {e}")))
}

/// 发送请求并检查状态码（流式后端直接消费 body）
pub(crate) async fn send(request: RequestBuilder, provider: &str) -> Result<reqwest::Response, ConnectorError> {
    let start = std::time::Instant::now();
    let response = request.send().await.map_err(|e| from_reqwest(provider, e))?;
    let status = response.status();
    tracing::debug!(provider, %status, elapsed_ms = start.elapsed().as_millis() as u64, "llm response");
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(from_status(provider, status, &body))
}

pub(crate) fn from_reqwest(provider: &str, e: reqwest::Error) -> ConnectorError {
    if e.is_timeout() {
        ConnectorError::Timeout(format!("{provider}: {e}"))
    } else if e.is_connect() {
        ConnectorError::Unavailable(format!("cannot connect to {provider}: {e}"))
    } else {
        ConnectorError::Network(format!("{provider}: {e}"))
    }
}

pub(crate) fn from_status(provider: &str, status: StatusCode, body: &str) -> ConnectorError {
    let detail = format!("{provider} ({status}): {}", truncate(body, 300));
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ConnectorError::Auth(detail),
        StatusCode::TOO_MANY_REQUESTS => ConnectorError::RateLimited(detail),
        s if s.is_server_error() => ConnectorError::Unavailable(detail),
        _ => ConnectorError::Provider(detail),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        format!("{}...", s.chars().take(max).collect::<String>())
    } else {
        s.to_string()
    }
}

/// 把工具参数规范为 JSON 值：字符串形式先尝试解析；解析失败保留原串，交由参数校验回馈给模型
pub(crate) fn normalize_arguments(raw: Option<&Value>) -> Value {
    match raw {
        None | Some(Value::Null) => Value::Object(Default::default()),
        Some(Value::String(s)) if s.trim().is_empty() => Value::Object(Default::default()),
        Some(Value::String(s)) => serde_json::from_str(s).unwrap_or_else(|_| Value::String(s.clone())),
        Some(v) => v.clone(),
    }
}
