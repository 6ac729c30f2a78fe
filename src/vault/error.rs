//! 知识库错误类型
//!
//! 区分「可回馈给 LLM 的拒绝」（非法主题名）与「必须上报的致命错误」（读写、锁、文档形态异常）。

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VaultError {
    #[error("invalid topic name '{0}': use lowercase words joined by '-', with '/' between parent and subtopic")]
    InvalidTopic(String),

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to lock {path}: {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 文档结构不可预测地偏离模板（frontmatter 缺失、标题重复或乱序），拒绝写入
    #[error("{path} is not in the expected shape: {detail}")]
    Consistency { path: PathBuf, detail: String },
}

impl VaultError {
    /// 致命错误终止当前工具循环；非致命错误作为工具失败回馈给 LLM
    pub fn is_fatal(&self) -> bool {
        !matches!(self, VaultError::InvalidTopic(_))
    }

    pub(crate) fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        VaultError::Read {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        VaultError::Write {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn consistency(path: impl Into<PathBuf>, detail: impl Into<String>) -> Self {
        VaultError::Consistency {
            path: path.into(),
            detail: detail.into(),
        }
    }
}
