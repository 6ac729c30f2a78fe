//! Ollama 本地后端（/api/chat）
//!
//! 工具参数为 JSON 对象且不带调用 id，这里为每个调用分配 uuid；流式接口为 NDJSON，逐行解析。

use async_trait::async_trait;
use futures_util::{future, stream, StreamExt};
use reqwest::Client;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::llm::http::{self, normalize_arguments};
use crate::llm::{Connector, ConnectorError, Response, StopReason, TokenStream, ToolSpec, Usage};
use crate::memory::{Message, Role, ToolCall};

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

pub struct OllamaConnector {
    base_url: String,
    model: String,
    client: Client,
}

impl OllamaConnector {
    pub fn new(base_url: Option<String>, model: impl Into<String>, timeout_secs: u64) -> Result<Self, ConnectorError> {
        Ok(Self {
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            model: model.into(),
            client: http::build_client(timeout_secs)?,
        })
    }

    fn request_body(&self, messages: &[Message], tools: &[ToolSpec], stream: bool) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": messages.iter().map(to_wire_message).collect::<Vec<_>>(),
            "stream": stream,
        });
        if !tools.is_empty() {
            body["tools"] = Value::Array(tools.iter().map(to_wire_tool).collect());
        }
        body
    }
}

fn to_wire_message(msg: &Message) -> Value {
    let role = match msg.role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    };
    let mut wire = json!({ "role": role, "content": msg.content });
    if !msg.tool_calls.is_empty() {
        wire["tool_calls"] = msg
            .tool_calls
            .iter()
            .map(|c| json!({ "function": { "name": c.name, "arguments": c.arguments } }))
            .collect();
    }
    if let Some(name) = &msg.name {
        wire["tool_name"] = json!(name);
    }
    wire
}

fn to_wire_tool(tool: &ToolSpec) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.parameters,
        }
    })
}

/// 解析非流式响应
pub(crate) fn parse_response(body: &Value) -> Result<Response, ConnectorError> {
    let message = body
        .get("message")
        .ok_or_else(|| ConnectorError::MalformedResponse("ollama: missing 'message'".into()))?;
    let content = message.get("content").and_then(Value::as_str).unwrap_or_default().to_string();
    let tool_calls: Vec<ToolCall> = message
        .get("tool_calls")
        .and_then(Value::as_array)
        .map(|calls| {
            calls
                .iter()
                .filter_map(|c| {
                    let function = c.get("function")?;
                    let name = function.get("name")?.as_str()?.to_string();
                    Some(ToolCall::new(
                        Uuid::new_v4().to_string(),
                        name,
                        normalize_arguments(function.get("arguments")),
                    ))
                })
                .collect()
        })
        .unwrap_or_default();

    let stop_reason = match body.get("done_reason").and_then(Value::as_str) {
        Some("length") => StopReason::Length,
        _ => StopReason::Stop,
    };
    let mut response = Response {
        content,
        tool_calls,
        stop_reason,
        usage: None,
    }
    .normalized();
    if let (Some(p), Some(c)) = (
        body.get("prompt_eval_count").and_then(Value::as_u64),
        body.get("eval_count").and_then(Value::as_u64),
    ) {
        response = response.with_usage(Usage {
            prompt_tokens: p,
            completion_tokens: c,
        });
    }
    Ok(response)
}

/// 解析一行 NDJSON：返回 (文本片段, 是否结束)
pub(crate) fn parse_stream_line(line: &str) -> Result<(String, bool), ConnectorError> {
    let v: Value = serde_json::from_str(line)
        .map_err(|e| ConnectorError::MalformedResponse(format!("ollama stream: {e}")))?;
    if let Some(err) = v.get("error").and_then(Value::as_str) {
        return Err(ConnectorError::Provider(format!("ollama: {err}")));
    }
    let text = v
        .pointer("/message/content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let done = v.get("done").and_then(Value::as_bool).unwrap_or(false);
    Ok((text, done))
}

#[async_trait]
impl Connector for OllamaConnector {
    fn name(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[Message], tools: &[ToolSpec]) -> Result<Response, ConnectorError> {
        let url = format!("{}/api/chat", self.base_url);
        let request = self.client.post(&url).json(&self.request_body(messages, tools, false));
        let body = http::send_json(request, "ollama").await?;
        parse_response(&body)
    }

    async fn stream(&self, messages: &[Message], tools: &[ToolSpec]) -> Result<TokenStream, ConnectorError> {
        let url = format!("{}/api/chat", self.base_url);
        let request = self.client.post(&url).json(&self.request_body(messages, tools, true));
        let response = http::send(request, "ollama").await?;
        let bytes = Box::pin(response.bytes_stream());

        let lines = stream::unfold((bytes, Vec::<u8>::new(), false), |(mut bytes, mut buf, finished)| async move {
            if finished {
                return None;
            }
            loop {
                if let Some(pos) = buf.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buf.drain(..=pos).collect();
                    let line = String::from_utf8_lossy(&line).trim().to_string();
                    if line.is_empty() {
                        continue;
                    }
                    return Some(match parse_stream_line(&line) {
                        Ok((text, done)) => (Ok(text), (bytes, buf, done)),
                        Err(e) => (Err(e), (bytes, buf, true)),
                    });
                }
                match bytes.next().await {
                    Some(Ok(chunk)) => buf.extend_from_slice(&chunk),
                    Some(Err(e)) => return Some((Err(http::from_reqwest("ollama", e)), (bytes, buf, true))),
                    None => {
                        let rest = String::from_utf8_lossy(&buf).trim().to_string();
                        buf.clear();
                        if rest.is_empty() {
                            return None;
                        }
                        let item = parse_stream_line(&rest).map(|(text, _)| text);
                        return Some((item, (bytes, buf, true)));
                    }
                }
            }
        });

        Ok(Box::pin(lines.filter(|item| future::ready(!matches!(item, Ok(t) if t.is_empty())))))
    }
}
