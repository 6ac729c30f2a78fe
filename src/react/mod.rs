//! 对话层：有界工具循环、循环事件、系统提示组装

pub mod events;
pub mod loop_;
pub mod prompt;

pub use events::LoopEvent;
pub use loop_::{ToolLoop, MAX_TOOL_ROUNDS};
