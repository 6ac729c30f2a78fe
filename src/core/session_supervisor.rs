//! 会话监管：每轮输入一个新的 CancellationToken
//!
//! 前端（Ctrl+C）通过 CancelHandle 取消当前轮；取消只影响正在进行的轮，下一轮重新开始。

use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
pub struct SessionSupervisor {
    current: Arc<Mutex<CancellationToken>>,
}

impl SessionSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// 开始新的一轮：替换为新 token 并返回其副本
    pub fn begin_turn(&self) -> CancellationToken {
        let token = CancellationToken::new();
        let mut current = self.current.lock().unwrap_or_else(|p| p.into_inner());
        *current = token.clone();
        token
    }

    /// 取消当前轮
    pub fn cancel(&self) {
        self.current.lock().unwrap_or_else(|p| p.into_inner()).cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.current.lock().unwrap_or_else(|p| p.into_inner()).is_cancelled()
    }

    /// 可跨任务持有的取消句柄
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            current: Arc::clone(&self.current),
        }
    }
}

/// 取消句柄：总是作用于调用时刻的当前轮
#[derive(Debug, Clone)]
pub struct CancelHandle {
    current: Arc<Mutex<CancellationToken>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.current.lock().unwrap_or_else(|p| p.into_inner()).cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_turn_gets_a_fresh_token() {
        let supervisor = SessionSupervisor::new();
        let first = supervisor.begin_turn();
        supervisor.cancel_handle().cancel();
        assert!(first.is_cancelled());
        assert!(supervisor.is_cancelled());

        let second = supervisor.begin_turn();
        assert!(!second.is_cancelled());
        assert!(!supervisor.is_cancelled());
    }
}
