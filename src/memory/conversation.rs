//! 短期记忆：会话内对话历史
//!
//! 一次会话一份，不落盘。assistant 消息可携带工具调用，每个调用必须由一条携带相同
//! tool_call_id 的 tool 消息应答；历史在任何时刻都保持这一配对关系。

use serde::{Deserialize, Serialize};

/// 消息角色（与 LLM API 一致）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// LLM 请求的一次工具调用（规范化后的形态）
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// 同一 assistant 回合内唯一
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// 单条消息
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// 仅 assistant
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// 仅 tool：应答的调用 id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// 仅 tool：工具名（部分后端需要）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    pub fn assistant_with_tools(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls,
            ..Self::plain(Role::Assistant, content)
        }
    }

    pub fn tool(tool_call_id: impl Into<String>, name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            name: Some(name.into()),
            ..Self::plain(Role::Tool, content)
        }
    }
}

/// 会话历史：首条为 system 提示，其后按时间顺序追加
#[derive(Clone, Debug, Default)]
pub struct ConversationHistory {
    messages: Vec<Message>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_system(prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::system(prompt)],
        }
    }

    pub fn push(&mut self, msg: Message) {
        self.messages.push(msg);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// 尚未被 tool 消息应答的工具调用 id（按出现顺序）
    pub fn unanswered_tool_calls(&self) -> Vec<(String, String)> {
        let mut pending: Vec<(String, String)> = Vec::new();
        for msg in &self.messages {
            match msg.role {
                Role::Assistant => {
                    for call in &msg.tool_calls {
                        pending.push((call.id.clone(), call.name.clone()));
                    }
                }
                Role::Tool => {
                    if let Some(id) = &msg.tool_call_id {
                        pending.retain(|(p, _)| p != id);
                    }
                }
                _ => {}
            }
        }
        pending
    }

    /// 为悬空的工具调用补一条「已取消」应答，恢复配对关系；返回补齐的数量
    pub fn seal_dangling_tool_calls(&mut self) -> usize {
        let pending = self.unanswered_tool_calls();
        for (id, name) in &pending {
            self.messages
                .push(Message::tool(id, name, "Cancelled before this tool call ran; nothing was written."));
        }
        pending.len()
    }

    /// 校验配对：每个 tool 消息对应此前某个 assistant 调用，且所有调用均已应答
    pub fn check_tool_pairing(&self) -> Result<(), String> {
        let mut issued: Vec<&str> = Vec::new();
        for msg in &self.messages {
            match msg.role {
                Role::Assistant => issued.extend(msg.tool_calls.iter().map(|c| c.id.as_str())),
                Role::Tool => {
                    let id = msg.tool_call_id.as_deref().ok_or("tool message without tool_call_id")?;
                    if !issued.contains(&id) {
                        return Err(format!("tool message answers unknown call '{id}'"));
                    }
                }
                _ => {}
            }
        }
        let pending = self.unanswered_tool_calls();
        if pending.is_empty() {
            Ok(())
        } else {
            Err(format!("unanswered tool calls: {pending:?}"))
        }
    }
}
