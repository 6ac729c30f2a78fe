//! 知识库目录布局
//!
//! - 主题笔记：topics/<topic>.md（子主题为子目录，如 topics/heaps/binary-heap.md）
//! - 每日日志：_daily/YYYY-MM-DD.md
//! - 学习者画像：_profile.md；导师框架：_framework.md
//! - 文档锁：.study/locks/

use std::path::{Path, PathBuf};

use crate::vault::VaultError;

/// 主题目录：topics/
pub fn topics_dir(root: &Path) -> PathBuf {
    root.join("topics")
}

/// 每日日志目录：_daily/
pub fn daily_dir(root: &Path) -> PathBuf {
    root.join("_daily")
}

/// 某日日志路径：_daily/YYYY-MM-DD.md
pub fn daily_log_path(root: &Path, date: &str) -> PathBuf {
    daily_dir(root).join(format!("{date}.md"))
}

pub fn profile_path(root: &Path) -> PathBuf {
    root.join("_profile.md")
}

pub fn framework_path(root: &Path) -> PathBuf {
    root.join("_framework.md")
}

pub fn locks_dir(root: &Path) -> PathBuf {
    root.join(".study").join("locks")
}

/// 主题笔记路径；主题名不合法时拒绝（防止路径逃逸）
pub fn topic_path(root: &Path, topic: &str) -> Result<PathBuf, VaultError> {
    validate_topic(topic)?;
    let mut path = topics_dir(root);
    for segment in topic.split('/') {
        path.push(segment);
    }
    path.set_extension("md");
    Ok(path)
}

/// 合法主题名：非空、已是 kebab-case（与 sanitize_topic 结果一致）
pub fn validate_topic(topic: &str) -> Result<(), VaultError> {
    if topic.is_empty() || sanitize_topic(topic) != topic {
        return Err(VaultError::InvalidTopic(topic.to_string()));
    }
    Ok(())
}

/// 将任意输入规范为 kebab-case 主题名，保留 '/' 作为子主题分隔；全空时为 "untitled"
pub fn sanitize_topic(raw: &str) -> String {
    let segments: Vec<String> = raw
        .split('/')
        .map(sanitize_segment)
        .filter(|s| !s.is_empty())
        .collect();
    if segments.is_empty() {
        "untitled".to_string()
    } else {
        segments.join("/")
    }
}

fn sanitize_segment(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_dash = false;
    for c in raw.trim().chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(c);
        } else {
            pending_dash = true;
        }
    }
    out
}

/// 子主题判断：`heaps/binary-heap` 属于 `heaps`
pub fn is_same_or_subtopic(candidate: &str, topic: &str) -> bool {
    candidate == topic
        || candidate
            .strip_prefix(topic)
            .is_some_and(|rest| rest.starts_with('/'))
}

/// 锁文件路径：.study/locks/<相对路径以 __ 连接>.lock
pub fn lock_path_for(root: &Path, doc: &Path) -> PathBuf {
    let rel = doc.strip_prefix(root).unwrap_or(doc);
    let name: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    locks_dir(root).join(format!("{}.lock", name.join("__")))
}
