//! 集成测试共用：临时笔记库 + 脚本化 Mock 连接器

#![allow(dead_code)]

use std::sync::Arc;

use serde_json::Value;
use study::llm::{Connector, MockConnector, MockStep, Response};
use study::memory::ToolCall;
use study::vault::VaultStore;
use study::{SessionBuilder, StudySession};

pub struct Fixture {
    pub dir: tempfile::TempDir,
    pub store: Arc<VaultStore>,
    pub mock: Arc<MockConnector>,
    pub session: StudySession,
}

pub fn fixture(topic: &str, steps: Vec<MockStep>) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(VaultStore::new(dir.path()));
    let mock = Arc::new(MockConnector::scripted(steps));
    let connector: Arc<dyn Connector> = mock.clone();
    let session = SessionBuilder::new(Arc::clone(&store), connector)
        .with_topic(topic)
        .build()
        .unwrap();
    Fixture {
        dir,
        store,
        mock,
        session,
    }
}

pub fn call(id: &str, name: &str, args: Value) -> ToolCall {
    ToolCall::new(id, name, args)
}

/// 一轮工具调用
pub fn tools(content: &str, calls: Vec<ToolCall>) -> MockStep {
    MockStep::Respond(Response::tool_calls(content, calls))
}

pub fn text(content: &str) -> MockStep {
    MockStep::Respond(Response::text(content))
}

pub fn note_text(store: &VaultStore, topic: &str) -> Option<String> {
    store.read_topic(topic).unwrap().map(|n| n.content)
}
