//! 会话错误类型
//!
//! 工具循环中出现、需要上报给调用方的错误：连接器失败、参数校验在轮次上限时仍未通过、
//! 笔记库写入/形态异常、取消。可回馈给 LLM 的失败（未知工具、参数不合法、非法主题名）不在此列。

use thiserror::Error;

use crate::llm::{ConnectorError, RegistryError};
use crate::vault::VaultError;

#[derive(Error, Debug)]
pub enum StudyError {
    #[error("connector failed: {0}")]
    Connector(#[from] ConnectorError),

    /// 达到轮次上限时最后一轮仍有参数不合法的工具调用
    #[error("tool '{tool}' was called with invalid arguments: {detail}")]
    ToolValidation { tool: String, detail: String },

    #[error("vault write failed: {0}")]
    VaultWrite(#[source] VaultError),

    #[error("vault note refused: {0}")]
    VaultConsistency(#[source] VaultError),

    #[error("config error: {0}")]
    Config(String),

    #[error("cancelled")]
    Cancelled,

    #[error("tooling error: {0}")]
    Tooling(String),
}

impl From<VaultError> for StudyError {
    fn from(e: VaultError) -> Self {
        match e {
            VaultError::Consistency { .. } | VaultError::InvalidTopic(_) => StudyError::VaultConsistency(e),
            _ => StudyError::VaultWrite(e),
        }
    }
}

impl From<RegistryError> for StudyError {
    fn from(e: RegistryError) -> Self {
        StudyError::Config(e.to_string())
    }
}

impl From<config::ConfigError> for StudyError {
    fn from(e: config::ConfigError) -> Self {
        StudyError::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vault_errors_split_by_kind() {
        let refused = VaultError::Consistency {
            path: "topics/heaps.md".into(),
            detail: "duplicate '## Sources'".into(),
        };
        assert!(matches!(StudyError::from(refused), StudyError::VaultConsistency(_)));
        let io = VaultError::Write {
            path: "topics/heaps.md".into(),
            source: std::io::Error::other("disk full"),
        };
        assert!(matches!(StudyError::from(io), StudyError::VaultWrite(_)));
    }
}
