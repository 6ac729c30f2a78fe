//! 工具循环过程事件：供前端展示轮次、工具调用与结果

use serde::Serialize;

/// 单步过程事件（可序列化为 JSON）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LoopEvent {
    /// 第几轮连接器调用
    RoundStarted { round: usize, max_rounds: usize },
    ToolCall {
        tool: String,
        args: serde_json::Value,
    },
    /// 工具返回（预览，避免过长）
    ToolResult { tool: String, ok: bool, preview: String },
    /// 触及轮次上限
    Truncated { rounds: usize },
    Done,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_type_tag() {
        let ev = LoopEvent::RoundStarted { round: 1, max_rounds: 10 };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "round_started");
        assert_eq!(json["max_rounds"], 10);
        assert_eq!(serde_json::to_value(LoopEvent::Done).unwrap()["type"], "done");
    }
}
