//! Mock 连接器（用于测试，无需 API）
//!
//! 按脚本依次返回预设响应；脚本耗尽后回显最后一条 User 消息。记录每次调用的消息，便于断言。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{Connector, ConnectorError, Response, ToolSpec};
use crate::memory::{Message, Role};

/// 脚本中的一步
#[derive(Debug)]
pub enum MockStep {
    Respond(Response),
    Fail(ConnectorError),
    /// 永不返回，用于测试取消与超时
    Hang,
}

/// 一次调用的记录
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub messages: Vec<Message>,
    pub tool_names: Vec<String>,
}

#[derive(Debug, Default)]
pub struct MockConnector {
    script: Mutex<VecDeque<MockStep>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scripted(steps: impl IntoIterator<Item = MockStep>) -> Self {
        Self {
            script: Mutex::new(steps.into_iter().collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// 追加一步
    pub fn push(&self, step: MockStep) {
        self.script.lock().unwrap_or_else(|p| p.into_inner()).push_back(step);
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().unwrap_or_else(|p| p.into_inner()).len()
    }
}

#[async_trait]
impl Connector for MockConnector {
    fn name(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock"
    }

    async fn complete(&self, messages: &[Message], tools: &[ToolSpec]) -> Result<Response, ConnectorError> {
        self.calls.lock().unwrap_or_else(|p| p.into_inner()).push(RecordedCall {
            messages: messages.to_vec(),
            tool_names: tools.iter().map(|t| t.name.clone()).collect(),
        });
        let step = self.script.lock().unwrap_or_else(|p| p.into_inner()).pop_front();
        match step {
            Some(MockStep::Respond(response)) => Ok(response),
            Some(MockStep::Fail(err)) => Err(err),
            Some(MockStep::Hang) => std::future::pending().await,
            None => {
                let last_user = messages
                    .iter()
                    .rev()
                    .find(|m| m.role == Role::User)
                    .map(|m| m.content.as_str())
                    .unwrap_or("(no input)");
                Ok(Response::text(format!("Echo from Mock: {last_user}")))
            }
        }
    }
}
