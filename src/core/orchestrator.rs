//! 会话编排器：一次学习会话的主控
//!
//! 负责：本地指令分流、附件前缀、对话历史、每轮取消令牌、驱动有界工具循环，
//! 以及开场回顾与结束时的笔记整理、每日日志、会话总结。

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

use crate::commands::{render, CommandRouter};
use crate::core::session_supervisor::CancelHandle;
use crate::core::{SessionSupervisor, StudyError, TurnOutcome};
use crate::llm::Connector;
use crate::memory::{ConversationHistory, Message};
use crate::react::prompt::{FLUSH_PROMPT, RECAP_PROMPT};
use crate::react::{LoopEvent, ToolLoop};
use crate::tools::{SessionStats, ToolExecutor};
use crate::vault::VaultStore;

/// 一次 send 的结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reply {
    pub text: String,
    /// 本地指令渲染，未调用连接器
    pub local: bool,
    pub rounds: usize,
    pub truncated: bool,
}

impl Reply {
    pub fn local(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            local: true,
            rounds: 0,
            truncated: false,
        }
    }
}

impl From<TurnOutcome> for Reply {
    fn from(outcome: TurnOutcome) -> Self {
        Self {
            text: outcome.text,
            local: false,
            rounds: outcome.rounds,
            truncated: outcome.truncated,
        }
    }
}

/// 会话结束时的总结
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub topic: String,
    pub duration: Duration,
    pub exchanges: usize,
    pub words: usize,
    pub stats: SessionStats,
}

/// 一次学习会话：一个主题、一份历史、一个笔记库
pub struct StudySession {
    topic: String,
    store: Arc<VaultStore>,
    connector: Arc<dyn Connector>,
    executor: ToolExecutor,
    router: CommandRouter,
    history: ConversationHistory,
    supervisor: SessionSupervisor,
    request_timeout: Option<Duration>,
    event_tx: Option<UnboundedSender<LoopEvent>>,
    started: Instant,
    exchanges: usize,
    words: usize,
}

impl StudySession {
    /// 由 SessionBuilder 调用；system_prompt 在此固定
    pub(crate) fn new(
        topic: String,
        store: Arc<VaultStore>,
        connector: Arc<dyn Connector>,
        executor: ToolExecutor,
        router: CommandRouter,
        system_prompt: String,
    ) -> Self {
        Self {
            topic,
            store,
            connector,
            executor,
            router,
            history: ConversationHistory::with_system(system_prompt),
            supervisor: SessionSupervisor::new(),
            request_timeout: None,
            event_tx: None,
            started: Instant::now(),
            exchanges: 0,
            words: 0,
        }
    }

    pub(crate) fn set_request_timeout(&mut self, timeout: Option<Duration>) {
        self.request_timeout = timeout;
    }

    /// 设置事件推送通道
    pub fn with_events(mut self, tx: UnboundedSender<LoopEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    pub fn stats(&self) -> &SessionStats {
        self.executor.stats()
    }

    pub fn exchanges(&self) -> usize {
        self.exchanges
    }

    pub fn store(&self) -> &Arc<VaultStore> {
        &self.store
    }

    pub fn connector(&self) -> &Arc<dyn Connector> {
        &self.connector
    }

    /// 供前端（Ctrl+C）取消当前轮
    pub fn cancel_handle(&self) -> CancelHandle {
        self.supervisor.cancel_handle()
    }

    /// 处理一条输入：本地指令直接渲染，其余进入工具循环
    pub async fn send(&mut self, input: &str) -> Result<Reply, StudyError> {
        if let Some(text) = self.router.try_handle(input, &self.topic) {
            return Ok(Reply::local(text));
        }

        let sealed = self.history.seal_dangling_tool_calls();
        if sealed > 0 {
            tracing::debug!(sealed, "dangling tool calls sealed before new input");
        }
        let message = match self.router.take_attachment() {
            Some(attachment) => attachment.prefix(input),
            None => input.to_string(),
        };
        self.exchanges += 1;
        self.words += input.split_whitespace().count();
        self.history.push(Message::user(message));

        self.run_loop().await.map(Reply::from)
    }

    /// 开场快照（本地渲染）
    pub fn snapshot(&self) -> Result<String, StudyError> {
        let note = self.store.read_topic(&self.topic)?;
        let links = self.store.wikilinks(&self.topic)?;
        Ok(render::boot_snapshot(&self.topic, note.as_ref(), &links))
    }

    /// 主题已有学习记录时请求一次回顾；否则返回 None
    pub async fn boot(&mut self) -> Result<Option<Reply>, StudyError> {
        let has_prior = self
            .store
            .read_topic(&self.topic)?
            .is_some_and(|note| note.has_prior_data());
        if !has_prior {
            return Ok(None);
        }
        self.history.push(Message::user(RECAP_PROMPT));
        self.run_loop().await.map(|outcome| Some(Reply::from(outcome)))
    }

    /// 结束会话：有过交流则让模型整理笔记，随后写每日日志并返回总结。
    /// 整理阶段的失败只记录告警；每日日志写入失败上报。
    pub async fn end_session(&mut self) -> Result<SessionSummary, StudyError> {
        let entry = if self.exchanges == 0 {
            "Session ended with no exchanges.".to_string()
        } else {
            self.history.seal_dangling_tool_calls();
            self.history.push(Message::user(FLUSH_PROMPT));
            if let Err(e) = self.run_loop().await {
                tracing::warn!(error = %e, "session flush failed");
                self.history.seal_dangling_tool_calls();
            }
            self.store
                .latest_session_log_entry(&self.topic)?
                .unwrap_or_else(|| format!("{} exchange(s) on '{}'.", self.exchanges, self.topic))
        };
        self.store.append_daily_log(&self.topic, &entry)?;
        tracing::info!(topic = %self.topic, exchanges = self.exchanges, "session ended");
        Ok(self.summary())
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            topic: self.topic.clone(),
            duration: self.started.elapsed(),
            exchanges: self.exchanges,
            words: self.words,
            stats: self.executor.stats().clone(),
        }
    }

    async fn run_loop(&mut self) -> Result<TurnOutcome, StudyError> {
        let token = self.supervisor.begin_turn();
        let mut tool_loop = ToolLoop::new(self.connector.as_ref(), &mut self.executor, token);
        if let Some(timeout) = self.request_timeout {
            tool_loop = tool_loop.with_request_timeout(timeout);
        }
        if let Some(tx) = &self.event_tx {
            tool_loop = tool_loop.with_event_tx(tx);
        }
        tool_loop.run(&mut self.history).await
    }
}
