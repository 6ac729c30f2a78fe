//! 知识库（vault）：人类可读的 Markdown 笔记
//!
//! - **document**: frontmatter 与 section 的纯文本代数
//! - **store**: VaultStore，按文档加锁的读-改-写
//! - **atomic**: 排他锁守卫与原子写
//! - **layout**: 目录布局与主题名规范

pub mod atomic;
pub mod document;
pub mod error;
pub mod layout;
pub mod store;
pub mod templates;

pub use document::Bucket;
pub use error::VaultError;
pub use layout::sanitize_topic;
pub use store::{
    today, ConceptChange, DailyLog, LearnerProfile, SynthesisWrite, TopicNote, UnderstandingChange,
    VaultStore, Wikilinks,
};
