//! OpenAI 兼容后端（/chat/completions）
//!
//! 工具调用参数在线上是 JSON 字符串，这里解析为 JSON 值；finish_reason 映射为 StopReason。

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::llm::http::{self, normalize_arguments};
use crate::llm::{Connector, ConnectorError, Response, StopReason, ToolSpec, Usage};
use crate::memory::{Message, Role, ToolCall};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAiConnector {
    base_url: String,
    model: String,
    api_key: String,
    client: Client,
}

impl OpenAiConnector {
    pub fn new(
        base_url: Option<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self, ConnectorError> {
        Ok(Self {
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            model: model.into(),
            api_key: api_key.into(),
            client: http::build_client(timeout_secs)?,
        })
    }

    fn request_body(&self, messages: &[Message], tools: &[ToolSpec]) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": messages.iter().map(to_wire_message).collect::<Vec<_>>(),
        });
        if !tools.is_empty() {
            body["tools"] = tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect();
        }
        body
    }
}

fn to_wire_message(msg: &Message) -> Value {
    match msg.role {
        Role::System => json!({ "role": "system", "content": msg.content }),
        Role::User => json!({ "role": "user", "content": msg.content }),
        Role::Tool => json!({
            "role": "tool",
            "tool_call_id": msg.tool_call_id,
            "content": msg.content,
        }),
        Role::Assistant if msg.tool_calls.is_empty() => json!({ "role": "assistant", "content": msg.content }),
        Role::Assistant => {
            let content = if msg.content.is_empty() {
                Value::Null
            } else {
                json!(msg.content)
            };
            json!({
                "role": "assistant",
                "content": content,
                "tool_calls": msg.tool_calls.iter().map(|c| json!({
                    "id": c.id,
                    "type": "function",
                    "function": { "name": c.name, "arguments": c.arguments.to_string() },
                })).collect::<Vec<_>>(),
            })
        }
    }
}

pub(crate) fn parse_response(body: &Value) -> Result<Response, ConnectorError> {
    let choice = body
        .pointer("/choices/0")
        .ok_or_else(|| ConnectorError::MalformedResponse("openai: no choices".into()))?;
    let message = choice
        .get("message")
        .ok_or_else(|| ConnectorError::MalformedResponse("openai: choice without message".into()))?;
    let content = message.get("content").and_then(Value::as_str).unwrap_or_default().to_string();

    let mut tool_calls = Vec::new();
    for call in message.get("tool_calls").and_then(Value::as_array).into_iter().flatten() {
        let id = call.get("id").and_then(Value::as_str);
        let name = call.pointer("/function/name").and_then(Value::as_str);
        let (Some(id), Some(name)) = (id, name) else {
            return Err(ConnectorError::MalformedResponse(format!("openai: incomplete tool call {call}")));
        };
        tool_calls.push(ToolCall::new(id, name, normalize_arguments(call.pointer("/function/arguments"))));
    }

    let stop_reason = match choice.get("finish_reason").and_then(Value::as_str) {
        Some("tool_calls") | Some("function_call") => StopReason::ToolCalls,
        Some("length") => StopReason::Length,
        Some("content_filter") => StopReason::Error,
        _ => StopReason::Stop,
    };

    let mut response = Response {
        content,
        tool_calls,
        stop_reason,
        usage: None,
    }
    .normalized();
    if let Some(usage) = body.get("usage") {
        response = response.with_usage(Usage {
            prompt_tokens: usage.get("prompt_tokens").and_then(Value::as_u64).unwrap_or(0),
            completion_tokens: usage.get("completion_tokens").and_then(Value::as_u64).unwrap_or(0),
        });
    }
    Ok(response)
}

#[async_trait]
impl Connector for OpenAiConnector {
    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[Message], tools: &[ToolSpec]) -> Result<Response, ConnectorError> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(messages, tools));
        let body = http::send_json(request, "openai").await?;
        parse_response(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tool_calls_with_string_arguments() {
        let body = json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": { "name": "add_concept", "arguments": "{\"topic\":\"heaps\",\"concept\":\"Heap\"}" }
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": { "prompt_tokens": 100, "completion_tokens": 20 }
        });
        let r = parse_response(&body).unwrap();
        assert_eq!(r.stop_reason, StopReason::ToolCalls);
        assert_eq!(r.content, "");
        assert_eq!(r.tool_calls[0].id, "call_1");
        assert_eq!(r.tool_calls[0].arguments["concept"], "Heap");
        assert_eq!(r.usage.unwrap().completion_tokens, 20);
    }

    #[test]
    fn maps_finish_reasons() {
        let mk = |reason: &str| json!({"choices": [{"message": {"content": "x"}, "finish_reason": reason}]});
        assert_eq!(parse_response(&mk("stop")).unwrap().stop_reason, StopReason::Stop);
        assert_eq!(parse_response(&mk("length")).unwrap().stop_reason, StopReason::Length);
        assert_eq!(parse_response(&mk("content_filter")).unwrap().stop_reason, StopReason::Error);
        // 声称 tool_calls 但没有调用
        assert_eq!(parse_response(&mk("tool_calls")).unwrap().stop_reason, StopReason::Stop);
        assert!(parse_response(&json!({"choices": []})).is_err());
    }

    #[test]
    fn assistant_tool_calls_are_serialized_with_string_arguments() {
        let c = OpenAiConnector::new(None, "gpt-4o-mini", "sk-test", 5).unwrap();
        let messages = vec![
            Message::assistant_with_tools("", vec![ToolCall::new("c1", "list_topics", json!({}))]),
            Message::tool("c1", "list_topics", "heaps"),
        ];
        let body = c.request_body(&messages, &[]);
        assert!(body.get("tools").is_none());
        assert_eq!(body["messages"][0]["content"], Value::Null);
        assert_eq!(body["messages"][0]["tool_calls"][0]["function"]["arguments"], "{}");
        assert_eq!(body["messages"][1]["tool_call_id"], "c1");
    }
}
