//! study-buddy：命令行苏格拉底式学习伙伴
//!
//! 模块划分：
//! - **cli**: 命令行（clap）与交互式会话
//! - **commands**: `!` 本地指令与纯文本渲染
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 会话编排、循环状态、取消、错误类型
//! - **llm**: 连接器抽象与实现（Ollama / OpenAI / Anthropic / Mock）
//! - **memory**: 会话内对话历史
//! - **observability**: 日志初始化
//! - **react**: 有界工具循环、循环事件、系统提示
//! - **tools**: 工具注册、参数校验、笔记库工具集、执行器
//! - **vault**: Markdown 知识库

pub mod cli;
pub mod commands;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod react;
pub mod tools;
pub mod vault;

pub use crate::core::{Reply, SessionBuilder, SessionSummary, StudyError, StudySession};
