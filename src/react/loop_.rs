//! 有界工具循环
//!
//! 连接器调用 → 按 stop_reason 分派 → 顺序执行工具 → 回到连接器，最多 MAX_TOOL_ROUNDS 轮。
//! 每个工具调用都得到一条 tool 消息应答；致命错误返回前补齐剩余调用的应答，历史始终保持配对。
//! 可选 event_tx：向前端推送 RoundStarted / ToolCall / ToolResult / Truncated / Done。

use std::collections::HashSet;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::core::{LoopState, StudyError, TurnOutcome};
use crate::llm::{Connector, ConnectorError, Response, StopReason};
use crate::memory::{ConversationHistory, Message};
use crate::react::LoopEvent;
use crate::tools::{ToolExecutor, ToolResult};

/// 单次用户输入内最多的连接器调用轮数
pub const MAX_TOOL_ROUNDS: usize = 10;
/// ToolResult 事件预览最大字符数
const RESULT_PREVIEW_CHARS: usize = 200;

/// 一次工具循环的配置
pub struct ToolLoop<'a> {
    /// 连接器（必需）
    pub connector: &'a dyn Connector,
    /// 工具执行器（必需）
    pub executor: &'a mut ToolExecutor,
    /// 本轮取消令牌（必需）
    pub cancel_token: CancellationToken,
    /// 可选：单次连接器调用的超时
    pub request_timeout: Option<Duration>,
    /// 可选：事件推送通道
    pub event_tx: Option<&'a UnboundedSender<LoopEvent>>,
}

impl<'a> ToolLoop<'a> {
    pub fn new(connector: &'a dyn Connector, executor: &'a mut ToolExecutor, cancel_token: CancellationToken) -> Self {
        Self {
            connector,
            executor,
            cancel_token,
            request_timeout: None,
            event_tx: None,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn with_event_tx(mut self, tx: &'a UnboundedSender<LoopEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// 驱动循环直到 Done；history 已包含本轮用户消息
    pub async fn run(self, history: &mut ConversationHistory) -> Result<TurnOutcome, StudyError> {
        let ToolLoop {
            connector,
            executor,
            cancel_token,
            request_timeout,
            event_tx,
        } = self;

        let mut state = LoopState::AwaitingConnector { round: 1 };
        let mut last_text = String::new();
        let mut last_invalid: Option<ToolResult> = None;

        loop {
            tracing::debug!(phase = state.phase(), round = ?state.round(), "tool loop");
            state = match state {
                LoopState::AwaitingConnector { round } => {
                    send_event(&event_tx, LoopEvent::RoundStarted { round, max_rounds: MAX_TOOL_ROUNDS });
                    let response = call_connector(connector, executor, history, &cancel_token, request_timeout).await?;
                    if response.stop_reason == StopReason::Error {
                        return Err(StudyError::Connector(ConnectorError::Provider(format!(
                            "response stopped with an error: {}",
                            response.content.trim()
                        ))));
                    }
                    let response = with_unique_call_ids(response);
                    history.push(Message::assistant_with_tools(
                        response.content.clone(),
                        response.tool_calls.clone(),
                    ));
                    if !response.content.trim().is_empty() {
                        last_text = response.content.clone();
                    }
                    LoopState::Dispatch { round, response }
                }

                LoopState::Dispatch { round, response } => match response.stop_reason {
                    StopReason::ToolCalls => LoopState::ExecutingTools {
                        round,
                        calls: response.tool_calls,
                    },
                    reason => LoopState::Done(TurnOutcome {
                        text: last_text.clone(),
                        rounds: round,
                        truncated: reason == StopReason::Length,
                    }),
                },

                LoopState::ExecutingTools { round, calls } => {
                    last_invalid = None;
                    for call in &calls {
                        send_event(
                            &event_tx,
                            LoopEvent::ToolCall {
                                tool: call.name.clone(),
                                args: call.arguments.clone(),
                            },
                        );
                        let result = match executor.execute(call).await {
                            Ok(result) => result,
                            Err(err) => {
                                history.push(Message::tool(&call.id, &call.name, format!("Error: {err}")));
                                let sealed = history.seal_dangling_tool_calls();
                                tracing::warn!(tool = %call.name, error = %err, sealed, "tool loop aborted");
                                return Err(err);
                            }
                        };
                        let content = result.content();
                        send_event(
                            &event_tx,
                            LoopEvent::ToolResult {
                                tool: result.tool.clone(),
                                ok: !result.is_failure(),
                                preview: preview(&content),
                            },
                        );
                        history.push(Message::tool(&result.call_id, &result.tool, content));
                        if result.is_invalid() {
                            last_invalid = Some(result);
                        }
                    }

                    if round < MAX_TOOL_ROUNDS {
                        LoopState::AwaitingConnector { round: round + 1 }
                    } else if let Some(invalid) = last_invalid.take() {
                        tracing::warn!(rounds = round, tool = %invalid.tool, "round cap reached with invalid tool calls");
                        return Err(StudyError::ToolValidation {
                            tool: invalid.tool.clone(),
                            detail: invalid.content(),
                        });
                    } else {
                        tracing::warn!(rounds = round, "round cap reached");
                        send_event(&event_tx, LoopEvent::Truncated { rounds: round });
                        LoopState::Done(TurnOutcome {
                            text: last_text.clone(),
                            rounds: round,
                            truncated: true,
                        })
                    }
                }

                LoopState::Done(outcome) => {
                    send_event(&event_tx, LoopEvent::Done);
                    return Ok(outcome);
                }
            };
        }
    }
}

/// 调用前检查取消；调用与取消令牌竞争，并受超时约束
async fn call_connector(
    connector: &dyn Connector,
    executor: &ToolExecutor,
    history: &ConversationHistory,
    cancel_token: &CancellationToken,
    request_timeout: Option<Duration>,
) -> Result<Response, StudyError> {
    if cancel_token.is_cancelled() {
        return Err(StudyError::Cancelled);
    }
    let call = connector.complete(history.messages(), executor.specs());
    let bounded = async {
        match request_timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(result) => result,
                Err(_) => Err(ConnectorError::Timeout(format!("no response within {:?}", limit))),
            },
            None => call.await,
        }
    };
    tokio::select! {
        _ = cancel_token.cancelled() => Err(StudyError::Cancelled),
        result = bounded => result.map_err(StudyError::from),
    }
}

/// 同一回合内重复或缺失的调用 id 改为新生成的 id
fn with_unique_call_ids(mut response: Response) -> Response {
    let mut seen = HashSet::new();
    for call in &mut response.tool_calls {
        if call.id.is_empty() || !seen.insert(call.id.clone()) {
            let fresh = format!("call_{}", uuid::Uuid::new_v4().simple());
            tracing::debug!(old = %call.id, new = %fresh, "tool call id replaced");
            call.id = fresh.clone();
            seen.insert(fresh);
        }
    }
    response
}

fn send_event(tx: &Option<&UnboundedSender<LoopEvent>>, ev: LoopEvent) {
    if let Some(t) = tx {
        let _ = t.send(ev);
    }
}

fn preview(text: &str) -> String {
    if text.chars().count() > RESULT_PREVIEW_CHARS {
        format!("{}...", text.chars().take(RESULT_PREVIEW_CHARS).collect::<String>())
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::llm::{MockConnector, MockStep};
    use crate::memory::ToolCall;
    use crate::tools::build_vault_registry;
    use crate::vault::VaultStore;
    use serde_json::json;

    fn setup() -> (tempfile::TempDir, Arc<VaultStore>, ToolExecutor, ConversationHistory) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(VaultStore::new(dir.path()));
        store.init().unwrap();
        let registry = build_vault_registry(Arc::clone(&store)).unwrap();
        let mut history = ConversationHistory::with_system("system");
        history.push(Message::user("hi"));
        (dir, store, ToolExecutor::new(registry, "heaps"), history)
    }

    #[test]
    fn duplicate_ids_are_replaced() {
        let response = Response::tool_calls(
            "",
            vec![
                ToolCall::new("a", "list_topics", json!({})),
                ToolCall::new("a", "list_topics", json!({})),
                ToolCall::new("", "list_topics", json!({})),
            ],
        );
        let ids: Vec<String> = with_unique_call_ids(response).tool_calls.into_iter().map(|c| c.id).collect();
        assert_eq!(ids[0], "a");
        assert!(ids[1].starts_with("call_") && ids[2].starts_with("call_"));
        assert_ne!(ids[1], ids[2]);
    }

    #[tokio::test]
    async fn plain_reply_finishes_in_one_round() {
        let (_dir, _store, mut exec, mut history) = setup();
        let mock = MockConnector::scripted([MockStep::Respond(Response::text("Exactly."))]);
        let outcome = ToolLoop::new(&mock, &mut exec, CancellationToken::new())
            .run(&mut history)
            .await
            .unwrap();
        assert_eq!(outcome, TurnOutcome { text: "Exactly.".into(), rounds: 1, truncated: false });
        assert_eq!(history.len(), 3);
    }

    #[tokio::test]
    async fn length_stop_marks_truncated() {
        let (_dir, _store, mut exec, mut history) = setup();
        let mock = MockConnector::scripted([MockStep::Respond(
            Response::text("A heap is").with_stop_reason(StopReason::Length),
        )]);
        let outcome = ToolLoop::new(&mock, &mut exec, CancellationToken::new())
            .run(&mut history)
            .await
            .unwrap();
        assert!(outcome.truncated);
        assert_eq!(outcome.text, "A heap is");
    }

    #[tokio::test]
    async fn error_stop_is_a_connector_failure_and_not_recorded() {
        let (_dir, _store, mut exec, mut history) = setup();
        let mock = MockConnector::scripted([MockStep::Respond(
            Response::text("boom").with_stop_reason(StopReason::Error),
        )]);
        let err = ToolLoop::new(&mock, &mut exec, CancellationToken::new())
            .run(&mut history)
            .await
            .unwrap_err();
        assert!(matches!(err, StudyError::Connector(_)));
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn events_follow_the_rounds() {
        let (_dir, _store, mut exec, mut history) = setup();
        let mock = MockConnector::scripted([
            MockStep::Respond(Response::tool_calls("", vec![ToolCall::new("c1", "list_topics", json!({}))])),
            MockStep::Respond(Response::text("No topics yet.")),
        ]);
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        ToolLoop::new(&mock, &mut exec, CancellationToken::new())
            .with_event_tx(&tx)
            .run(&mut history)
            .await
            .unwrap();
        drop(tx);
        let mut events = Vec::new();
        while let Some(ev) = rx.recv().await {
            events.push(ev);
        }
        assert_eq!(events.first(), Some(&LoopEvent::RoundStarted { round: 1, max_rounds: MAX_TOOL_ROUNDS }));
        assert!(events.iter().any(|e| matches!(e, LoopEvent::ToolResult { tool, ok: true, .. } if tool == "list_topics")));
        assert!(events.contains(&LoopEvent::RoundStarted { round: 2, max_rounds: MAX_TOOL_ROUNDS }));
        assert_eq!(events.last(), Some(&LoopEvent::Done));
    }

    #[tokio::test]
    async fn timeout_is_reported_as_connector_failure() {
        let (_dir, _store, mut exec, mut history) = setup();
        let mock = MockConnector::scripted([MockStep::Hang]);
        let err = ToolLoop::new(&mock, &mut exec, CancellationToken::new())
            .with_request_timeout(Duration::from_millis(20))
            .run(&mut history)
            .await
            .unwrap_err();
        assert!(matches!(err, StudyError::Connector(ConnectorError::Timeout(_))));
        history.check_tool_pairing().unwrap();
    }
}
