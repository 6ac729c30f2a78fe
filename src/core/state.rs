//! 工具循环的显式状态
//!
//! AwaitingConnector → Dispatch → ExecutingTools → AwaitingConnector … → Done。
//! 轮次计数只在连接器调用返回后前进，且严格递增。

use serde::Serialize;

use crate::llm::Response;
use crate::memory::ToolCall;

/// 循环所处阶段（round 从 1 开始）
#[derive(Debug, Clone, PartialEq)]
pub enum LoopState {
    /// 等待一次连接器调用
    AwaitingConnector { round: usize },
    /// 根据 stop_reason 分派
    Dispatch { round: usize, response: Response },
    /// 顺序执行本轮工具调用
    ExecutingTools { round: usize, calls: Vec<ToolCall> },
    Done(TurnOutcome),
}

impl LoopState {
    pub fn round(&self) -> Option<usize> {
        match self {
            LoopState::AwaitingConnector { round }
            | LoopState::Dispatch { round, .. }
            | LoopState::ExecutingTools { round, .. } => Some(*round),
            LoopState::Done(outcome) => Some(outcome.rounds),
        }
    }

    /// 日志用的阶段名
    pub fn phase(&self) -> &'static str {
        match self {
            LoopState::AwaitingConnector { .. } => "awaiting_connector",
            LoopState::Dispatch { .. } => "dispatch",
            LoopState::ExecutingTools { .. } => "executing_tools",
            LoopState::Done(_) => "done",
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, LoopState::Done(_))
    }
}

/// 一轮用户输入的最终结果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TurnOutcome {
    pub text: String,
    /// 实际发生的连接器调用次数
    pub rounds: usize,
    /// 因 length 截断或触及轮次上限
    pub truncated: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_is_reported_for_every_phase() {
        assert_eq!(LoopState::AwaitingConnector { round: 1 }.round(), Some(1));
        let state = LoopState::ExecutingTools { round: 3, calls: Vec::new() };
        assert_eq!((state.round(), state.phase()), (Some(3), "executing_tools"));
        let done = LoopState::Done(TurnOutcome { text: "ok".into(), rounds: 2, truncated: false });
        assert!(done.is_done());
        assert_eq!(done.round(), Some(2));
    }
}
