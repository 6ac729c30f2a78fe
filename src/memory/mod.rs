//! 记忆层：单次会话内的对话历史（不落盘，持久知识只写入笔记库）

pub mod conversation;

pub use conversation::{ConversationHistory, Message, Role, ToolCall};
