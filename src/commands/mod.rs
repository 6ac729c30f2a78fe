//! 本地指令路由：`!` 开头的输入在本地渲染，从不调用连接器
//!
//! `!add <path>` 暂存一个附件，随下一条消息一起发送。

pub mod render;

use std::path::Path;
use std::sync::Arc;

use crate::config::expand_tilde;
use crate::vault::{VaultError, VaultStore};

/// `!timeline` 显示的天数
pub const TIMELINE_DAYS: usize = 30;

/// 已解析的本地指令
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// 可选主题，缺省为当前主题
    Status(Option<String>),
    Graph,
    Timeline,
    Topics,
    Help,
    Add(Option<String>),
    Unknown(String),
}

impl Directive {
    /// 非 `!` 开头返回 None
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        let body = input.strip_prefix('!')?;
        let (cmd, arg) = match body.split_once(char::is_whitespace) {
            Some((cmd, arg)) => (cmd, Some(arg.trim().to_string()).filter(|a| !a.is_empty())),
            None => (body, None),
        };
        Some(match cmd.to_lowercase().as_str() {
            "status" => Directive::Status(arg),
            "graph" => Directive::Graph,
            "timeline" => Directive::Timeline,
            "topics" => Directive::Topics,
            "help" => Directive::Help,
            "add" => Directive::Add(arg),
            _ => Directive::Unknown(input.to_string()),
        })
    }
}

/// 主题树（含最近一次学习日期），`!topics` 与 `study ls` 共用
pub fn topics_listing(store: &VaultStore) -> Result<String, VaultError> {
    let mut entries = Vec::new();
    for t in store.list_topics()? {
        let last = store.read_topic(&t)?.and_then(|n| n.frontmatter.last_session);
        entries.push((t, last));
    }
    Ok(render::topics(&entries))
}

/// 附件文本提取边界：内置实现只处理纯文本 / Markdown
pub trait TextExtractor: Send + Sync {
    fn extract(&self, path: &Path) -> Result<String, String>;
}

#[derive(Debug, Default)]
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extract(&self, path: &Path) -> Result<String, String> {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if ext == "pdf" {
            return Err("PDF extraction is not supported; convert it to text or markdown first".to_string());
        }
        let text = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
        if text.trim().is_empty() {
            return Err("file is empty".to_string());
        }
        Ok(text)
    }
}

/// 暂存的附件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub name: String,
    pub text: String,
}

impl Attachment {
    /// 把附件内容放在用户消息之前
    pub fn prefix(&self, message: &str) -> String {
        format!("[Attached: {}]\n{}\n\n---\n\n{message}", self.name, self.text.trim())
    }
}

pub struct CommandRouter {
    store: Arc<VaultStore>,
    extractor: Arc<dyn TextExtractor>,
    pending: Option<Attachment>,
}

impl CommandRouter {
    pub fn new(store: Arc<VaultStore>) -> Self {
        Self::with_extractor(store, Arc::new(PlainTextExtractor))
    }

    pub fn with_extractor(store: Arc<VaultStore>, extractor: Arc<dyn TextExtractor>) -> Self {
        Self {
            store,
            extractor,
            pending: None,
        }
    }

    /// 处理本地指令；非指令返回 None
    pub fn try_handle(&mut self, input: &str, topic: &str) -> Option<String> {
        let directive = Directive::parse(input)?;
        tracing::debug!(?directive, "local directive");
        Some(self.handle(directive, topic).unwrap_or_else(|e| format!("Could not read the vault: {e}")))
    }

    fn handle(&mut self, directive: Directive, topic: &str) -> Result<String, VaultError> {
        let store = Arc::clone(&self.store);
        Ok(match directive {
            Directive::Status(target) => {
                let target = target.unwrap_or_else(|| topic.to_string());
                let note = store.read_topic(&target)?;
                render::status(&target, note.as_ref())
            }
            Directive::Graph => {
                let mut entries = Vec::new();
                for t in store.list_topics()? {
                    let links = store.wikilinks(&t)?;
                    entries.push((t, links));
                }
                render::graph(&entries, topic)
            }
            Directive::Timeline => render::timeline(&store.daily_logs(TIMELINE_DAYS)?),
            Directive::Topics => topics_listing(&store)?,
            Directive::Help => render::help(),
            Directive::Add(None) => "Usage: !add path/to/file".to_string(),
            Directive::Add(Some(raw)) => self.stage(&raw),
            Directive::Unknown(raw) => format!("Unknown command: {raw}. Type !help for the list."),
        })
    }

    fn stage(&mut self, raw: &str) -> String {
        let path = expand_tilde(raw.trim_matches(|c| c == '"' || c == '\''));
        match self.extractor.extract(&path) {
            Ok(text) => {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| raw.to_string());
                let chars = text.chars().count();
                tracing::info!(file = %path.display(), chars, "attachment staged");
                self.pending = Some(Attachment { name: name.clone(), text });
                format!("Attached {name} ({chars} chars). It will be sent with your next message.")
            }
            Err(e) => format!("Could not attach {}: {e}", path.display()),
        }
    }

    pub fn has_attachment(&self) -> bool {
        self.pending.is_some()
    }

    /// 取出暂存附件（只用一次）
    pub fn take_attachment(&mut self) -> Option<Attachment> {
        self.pending.take()
    }
}
