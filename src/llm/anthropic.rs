//! Anthropic Messages API 后端（/v1/messages）
//!
//! system 消息提取为顶层 system 字段；工具结果以 tool_result 块放入 user 轮；
//! 相邻同角色消息合并，保证 user / assistant 交替。

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::llm::http;
use crate::llm::{Connector, ConnectorError, Response, StopReason, ToolSpec, Usage};
use crate::memory::{Message, Role, ToolCall};

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";

pub struct AnthropicConnector {
    base_url: String,
    model: String,
    api_key: String,
    max_tokens: u32,
    client: Client,
}

impl AnthropicConnector {
    pub fn new(
        base_url: Option<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
        max_tokens: u32,
        timeout_secs: u64,
    ) -> Result<Self, ConnectorError> {
        Ok(Self {
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            model: model.into(),
            api_key: api_key.into(),
            max_tokens,
            client: http::build_client(timeout_secs)?,
        })
    }

    fn request_body(&self, messages: &[Message], tools: &[ToolSpec]) -> Value {
        let system: Vec<&str> = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();
        let mut body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "messages": to_wire_messages(messages),
        });
        if !system.is_empty() {
            body["system"] = json!(system.join("\n\n"));
        }
        if !tools.is_empty() {
            body["tools"] = tools
                .iter()
                .map(|t| json!({ "name": t.name, "description": t.description, "input_schema": t.parameters }))
                .collect();
        }
        body
    }
}

fn to_wire_messages(messages: &[Message]) -> Vec<Value> {
    let mut out: Vec<(String, Vec<Value>)> = Vec::new();
    for msg in messages {
        let (role, blocks) = match msg.role {
            Role::System => continue,
            Role::User => ("user", vec![json!({ "type": "text", "text": msg.content })]),
            Role::Tool => (
                "user",
                vec![json!({
                    "type": "tool_result",
                    "tool_use_id": msg.tool_call_id,
                    "content": msg.content,
                })],
            ),
            Role::Assistant => {
                let mut blocks = Vec::new();
                if !msg.content.is_empty() {
                    blocks.push(json!({ "type": "text", "text": msg.content }));
                }
                for call in &msg.tool_calls {
                    blocks.push(json!({
                        "type": "tool_use",
                        "id": call.id,
                        "name": call.name,
                        "input": call.arguments,
                    }));
                }
                if blocks.is_empty() {
                    continue;
                }
                ("assistant", blocks)
            }
        };
        match out.last_mut() {
            Some((last_role, last_blocks)) if last_role == role => last_blocks.extend(blocks),
            _ => out.push((role.to_string(), blocks)),
        }
    }
    out.into_iter()
        .map(|(role, content)| json!({ "role": role, "content": content }))
        .collect()
}

pub(crate) fn parse_response(body: &Value) -> Result<Response, ConnectorError> {
    let blocks = body
        .get("content")
        .and_then(Value::as_array)
        .ok_or_else(|| ConnectorError::MalformedResponse("anthropic: missing 'content'".into()))?;

    let mut text = String::new();
    let mut tool_calls = Vec::new();
    for block in blocks {
        match block.get("type").and_then(Value::as_str) {
            Some("text") => text.push_str(block.get("text").and_then(Value::as_str).unwrap_or_default()),
            Some("tool_use") => {
                let id = block.get("id").and_then(Value::as_str);
                let name = block.get("name").and_then(Value::as_str);
                let (Some(id), Some(name)) = (id, name) else {
                    return Err(ConnectorError::MalformedResponse(format!("anthropic: incomplete tool_use {block}")));
                };
                let input = block.get("input").cloned().unwrap_or_else(|| json!({}));
                tool_calls.push(ToolCall::new(id, name, input));
            }
            _ => {}
        }
    }

    let stop_reason = match body.get("stop_reason").and_then(Value::as_str) {
        Some("tool_use") => StopReason::ToolCalls,
        Some("max_tokens") => StopReason::Length,
        _ => StopReason::Stop,
    };
    let mut response = Response {
        content: text,
        tool_calls,
        stop_reason,
        usage: None,
    }
    .normalized();
    if let Some(usage) = body.get("usage") {
        response = response.with_usage(Usage {
            prompt_tokens: usage.get("input_tokens").and_then(Value::as_u64).unwrap_or(0),
            completion_tokens: usage.get("output_tokens").and_then(Value::as_u64).unwrap_or(0),
        });
    }
    Ok(response)
}

#[async_trait]
impl Connector for AnthropicConnector {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[Message], tools: &[ToolSpec]) -> Result<Response, ConnectorError> {
        let url = format!("{}/v1/messages", self.base_url);
        let request = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&self.request_body(messages, tools));
        let body = http::send_json(request, "anthropic").await?;
        parse_response(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_text_and_tool_use_blocks() {
        let body = json!({
            "content": [
                { "type": "text", "text": "Let me record that." },
                { "type": "tool_use", "id": "toolu_1", "name": "record_understanding",
                  "input": { "topic": "heaps", "concept": "heapify", "bucket": "Solid" } }
            ],
            "stop_reason": "tool_use",
            "usage": { "input_tokens": 50, "output_tokens": 10 }
        });
        let r = parse_response(&body).unwrap();
        assert_eq!(r.content, "Let me record that.");
        assert_eq!(r.stop_reason, StopReason::ToolCalls);
        assert_eq!(r.tool_calls[0].name, "record_understanding");
        assert_eq!(r.tool_calls[0].arguments["bucket"], "Solid");
    }

    #[test]
    fn max_tokens_maps_to_length() {
        let r = parse_response(&json!({"content": [{"type": "text", "text": "cut"}], "stop_reason": "max_tokens"})).unwrap();
        assert_eq!(r.stop_reason, StopReason::Length);
    }

    #[test]
    fn system_is_lifted_and_tool_results_merge_into_user_turn() {
        let c = AnthropicConnector::new(None, "claude-sonnet-4-5", "key", 1024, 5).unwrap();
        let messages = vec![
            Message::system("be socratic"),
            Message::user("hi"),
            Message::assistant_with_tools(
                "",
                vec![
                    ToolCall::new("a", "read_note", json!({"topic": "heaps"})),
                    ToolCall::new("b", "list_topics", json!({})),
                ],
            ),
            Message::tool("a", "read_note", "body"),
            Message::tool("b", "list_topics", "heaps"),
        ];
        let body = c.request_body(&messages, &[]);
        assert_eq!(body["system"], "be socratic");
        let wire = body["messages"].as_array().unwrap();
        assert_eq!(wire.len(), 3);
        assert_eq!(wire[1]["content"][0]["type"], "tool_use");
        assert_eq!(wire[2]["role"], "user");
        assert_eq!(wire[2]["content"].as_array().unwrap().len(), 2);
        assert_eq!(wire[2]["content"][1]["tool_use_id"], "b");
    }
}
