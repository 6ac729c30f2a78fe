//! VaultStore：按文档加锁的类型化读写
//!
//! 每个变更操作 = 一次「加锁 → 读取（或按模板新建）→ 结构校验/补全 → 修改目标 section → 原子写」，
//! 锁在守卫 Drop 时释放。读取操作不加锁。

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::vault::atomic::{atomic_write, FileLock};
use crate::vault::document::{
    self, bullet_concept, content_lines, defuse_headings, get_section, replace_section,
    replace_span, same_concept, single_line, subsection_span, Bucket, Frontmatter,
};
use crate::vault::{layout, templates, VaultError};

/// 已解析的主题笔记（只读快照）
#[derive(Debug, Clone)]
pub struct TopicNote {
    pub topic: String,
    pub frontmatter: Frontmatter,
    pub content: String,
}

impl TopicNote {
    pub fn section(&self, path: &str) -> Option<&str> {
        get_section(&self.content, path)
    }

    /// 某个桶里的概念名（非 wikilink 列表项取整行文本）
    pub fn bucket(&self, bucket: Bucket) -> Vec<String> {
        self.section(&bucket.section_path())
            .map(content_lines)
            .unwrap_or_default()
            .into_iter()
            .map(|line| {
                bullet_concept(&line).unwrap_or_else(|| {
                    line.trim().trim_start_matches("- ").trim().to_string()
                })
            })
            .collect()
    }

    pub fn bucket_of(&self, concept: &str) -> Option<Bucket> {
        Bucket::ALL
            .into_iter()
            .find(|b| self.bucket(*b).iter().any(|c| same_concept(c, concept)))
    }

    /// 是否已有先前学习记录（决定开场是否回顾）
    pub fn has_prior_data(&self) -> bool {
        ["Session Log", "Core Concepts", "Understanding/Solid", "Understanding/Shaky"]
            .into_iter()
            .any(|path| self.section(path).is_some_and(|s| !s.trim().is_empty()))
    }
}

/// record_understanding 的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnderstandingChange {
    /// 操作前概念所在的桶
    pub previous: Option<Bucket>,
    pub changed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConceptChange {
    Added,
    /// 已存在，补充了新的关联
    Extended(Vec<String>),
    Unchanged,
}

/// append_synthesis 的结果：若该概念已有条目，返回被替换前的内容
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisWrite {
    pub previous: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyLog {
    pub date: String,
    pub entries: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LearnerProfile {
    /// 最近一次修订时间（RFC 3339）
    pub revised: Option<String>,
    pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Wikilinks {
    pub concepts: Vec<String>,
    pub cross_topic: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ProfileMeta {
    revised: Option<String>,
}

/// 今日日期 YYYY-MM-DD（本地时区）
pub fn today() -> String {
    chrono::Local::now().date_naive().format("%Y-%m-%d").to_string()
}

/// Markdown 知识库存储
#[derive(Debug)]
pub struct VaultStore {
    root: PathBuf,
    lock_acquisitions: AtomicU64,
}

impl VaultStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            lock_acquisitions: AtomicU64::new(0),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 累计加锁次数（每次读-改-写恰好一次）
    pub fn lock_acquisitions(&self) -> u64 {
        self.lock_acquisitions.load(Ordering::SeqCst)
    }

    /// 创建目录结构，缺失时写入框架与画像模板
    pub fn init(&self) -> Result<(), VaultError> {
        for dir in [layout::topics_dir(&self.root), layout::daily_dir(&self.root)] {
            fs::create_dir_all(&dir).map_err(|e| VaultError::write(&dir, e))?;
        }
        let framework = layout::framework_path(&self.root);
        if !framework.exists() {
            atomic_write(&framework, templates::FRAMEWORK)?;
        }
        let profile = layout::profile_path(&self.root);
        if !profile.exists() {
            atomic_write(&profile, templates::PROFILE)?;
        }
        Ok(())
    }

    fn lock(&self, doc: &Path) -> Result<FileLock, VaultError> {
        let guard = FileLock::acquire(&layout::lock_path_for(&self.root, doc))?;
        self.lock_acquisitions.fetch_add(1, Ordering::SeqCst);
        Ok(guard)
    }

    // ---------------------------------------------------------------------
    // 主题：读取与列举
    // ---------------------------------------------------------------------

    pub fn topic_path(&self, topic: &str) -> Result<PathBuf, VaultError> {
        layout::topic_path(&self.root, topic)
    }

    pub fn topic_exists(&self, topic: &str) -> bool {
        self.topic_path(topic).map(|p| p.exists()).unwrap_or(false)
    }

    pub fn read_topic(&self, topic: &str) -> Result<Option<TopicNote>, VaultError> {
        let path = self.topic_path(topic)?;
        let Some(content) = read_optional(&path)? else {
            return Ok(None);
        };
        let frontmatter = document::parse_frontmatter(&content).unwrap_or_else(|e| {
            tracing::warn!(topic, error = %e, "topic note frontmatter unreadable");
            Frontmatter {
                topic: topic.to_string(),
                ..Frontmatter::default()
            }
        });
        Ok(Some(TopicNote {
            topic: topic.to_string(),
            frontmatter,
            content,
        }))
    }

    /// 所有主题（含子主题，形如 `heaps/binary-heap`），按名排序
    pub fn list_topics(&self) -> Result<Vec<String>, VaultError> {
        let dir = layout::topics_dir(&self.root);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut topics = Vec::new();
        for entry in WalkDir::new(&dir).follow_links(false) {
            let entry = entry.map_err(|e| {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| dir.clone());
                VaultError::read(path, std::io::Error::other(e.to_string()))
            })?;
            let path = entry.path();
            if !entry.file_type().is_file() || path.extension().and_then(|e| e.to_str()) != Some("md") {
                continue;
            }
            let Ok(rel) = path.with_extension("").strip_prefix(&dir).map(Path::to_path_buf) else {
                continue;
            };
            let name = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            if layout::validate_topic(&name).is_ok() {
                topics.push(name);
            } else {
                tracing::debug!(file = %path.display(), "skipping note with non-topic name");
            }
        }
        topics.sort();
        Ok(topics)
    }

    pub fn subtopics(&self, topic: &str) -> Result<Vec<String>, VaultError> {
        Ok(self
            .list_topics()?
            .into_iter()
            .filter(|t| t != topic && layout::is_same_or_subtopic(t, topic))
            .collect())
    }

    /// 主题笔记中的 wikilink：指向已有主题的为跨主题链接，其余为概念
    pub fn wikilinks(&self, topic: &str) -> Result<Wikilinks, VaultError> {
        let Some(note) = self.read_topic(topic)? else {
            return Ok(Wikilinks::default());
        };
        let all_topics = self.list_topics()?;
        let mut links = Wikilinks::default();
        for target in document::wikilinks(&note.content) {
            if target == topic {
                continue;
            }
            if all_topics.contains(&target) {
                links.cross_topic.push(target);
            } else {
                links.concepts.push(target);
            }
        }
        Ok(links)
    }

    // ---------------------------------------------------------------------
    // 主题：变更
    // ---------------------------------------------------------------------

    /// 主题不存在时按模板创建；返回是否新建
    pub fn ensure_topic(&self, topic: &str) -> Result<bool, VaultError> {
        let path = self.topic_path(topic)?;
        let _lock = self.lock(&path)?;
        if path.exists() {
            return Ok(false);
        }
        let today = today();
        atomic_write(&path, &templates::topic_note(topic, &today, &today))?;
        tracing::info!(topic, "topic note created");
        Ok(true)
    }

    /// 一次加锁的读-改-写事务。`apply` 返回 Err 时不写入。
    fn modify_topic<T>(
        &self,
        topic: &str,
        apply: impl FnOnce(&mut String) -> Result<T, String>,
    ) -> Result<T, VaultError> {
        let path = self.topic_path(topic)?;
        let _lock = self.lock(&path)?;

        let original = read_optional(&path)?;
        let mut doc = match &original {
            Some(text) => {
                let (doc, inserted) = document::normalize_structure(text).map_err(|detail| {
                    tracing::warn!(topic, %detail, "refusing to write malformed topic note");
                    VaultError::consistency(&path, detail)
                })?;
                if !inserted.is_empty() {
                    tracing::warn!(topic, sections = ?inserted, "restored missing sections");
                }
                doc
            }
            None => {
                let today = today();
                templates::topic_note(topic, &today, &today)
            }
        };

        let before = doc.clone();
        let out = apply(&mut doc).map_err(|detail| VaultError::consistency(&path, detail))?;
        if doc != before {
            doc = document::set_frontmatter_field(&doc, "last_session", &today())
                .ok_or_else(|| VaultError::consistency(&path, "frontmatter vanished during update"))?;
        }
        if original.as_deref() != Some(doc.as_str()) {
            atomic_write(&path, &doc)?;
        }
        Ok(out)
    }

    /// 将概念放入目标桶并从其它桶移除。已在目标桶时原位更新，重复调用结果不变。
    /// `notes` 为空时沿用原有备注。
    pub fn record_understanding(
        &self,
        topic: &str,
        concept: &str,
        bucket: Bucket,
        notes: Option<&str>,
    ) -> Result<UnderstandingChange, VaultError> {
        let concept = concept_name(concept);
        let notes = notes.map(single_line).filter(|n| !n.is_empty());
        self.modify_topic(topic, |doc| {
            let mut previous = None;
            let mut carried = notes.clone();
            let mut placed = false;
            let mut changed = false;

            // 先从非目标桶移除，记下原备注
            for b in Bucket::ALL {
                let path = b.section_path();
                let body = get_section(doc, &path).ok_or_else(|| format!("missing '{path}'"))?;
                let lines = content_lines(body);
                let mut kept = Vec::with_capacity(lines.len());
                let mut touched = false;
                for line in lines {
                    if bullet_concept(&line).is_some_and(|c| same_concept(&c, &concept)) {
                        previous.get_or_insert(b);
                        if carried.is_none() {
                            carried = entry_notes(&line);
                        }
                        if b == bucket && !placed {
                            placed = true;
                            let entry = understanding_entry(&concept, carried.as_deref());
                            if entry != line && notes.is_some() {
                                kept.push(entry);
                                touched = true;
                            } else {
                                kept.push(line);
                            }
                        } else {
                            touched = true;
                        }
                        continue;
                    }
                    kept.push(line);
                }
                if touched {
                    *doc = replace_section(doc, &path, &kept.join("\n"))
                        .ok_or_else(|| format!("missing '{path}'"))?;
                    changed = true;
                }
            }

            if !placed {
                let path = bucket.section_path();
                let body = get_section(doc, &path).ok_or_else(|| format!("missing '{path}'"))?;
                let mut lines = content_lines(body);
                lines.push(understanding_entry(&concept, carried.as_deref()));
                *doc = replace_section(doc, &path, &lines.join("\n"))
                    .ok_or_else(|| format!("missing '{path}'"))?;
                changed = true;
            }

            Ok(UnderstandingChange { previous, changed })
        })
    }

    /// 在 Core Concepts 中登记概念及其关联；关联去重并排除概念自身与主题名
    pub fn add_concept(&self, topic: &str, concept: &str, links: &[String]) -> Result<ConceptChange, VaultError> {
        let concept = concept_name(concept);
        let topic_leaf = topic.rsplit('/').next().unwrap_or(topic);
        let mut filtered: Vec<String> = Vec::new();
        for link in links.iter().map(|l| concept_name(l)) {
            if link.is_empty()
                || same_concept(&link, &concept)
                || same_concept(&link, topic)
                || same_concept(&link, topic_leaf)
                || filtered.iter().any(|f| same_concept(f, &link))
            {
                continue;
            }
            filtered.push(link);
        }
        self.modify_topic(topic, |doc| merge_concept_line(doc, &concept, &filtered))
    }

    /// 记录跨主题关联：在 from_topic 的 Core Concepts 中写 `- [[concept]] → [[to_topic]]`
    pub fn link_to_topic(&self, concept: &str, from_topic: &str, to_topic: &str) -> Result<ConceptChange, VaultError> {
        layout::validate_topic(to_topic)?;
        let concept = concept_name(concept);
        let links = if to_topic == from_topic {
            Vec::new()
        } else {
            vec![to_topic.to_string()]
        };
        self.modify_topic(from_topic, |doc| merge_concept_line(doc, &concept, &links))
    }

    /// 添加来源；已存在（忽略大小写）时不重复
    pub fn add_source(&self, topic: &str, source: &str) -> Result<bool, VaultError> {
        let source = single_line(source);
        self.modify_topic(topic, |doc| {
            let body = get_section(doc, "Sources").ok_or("missing 'Sources'")?;
            let mut lines = content_lines(body);
            let exists = lines
                .iter()
                .any(|l| same_concept(l.trim().trim_start_matches("- "), &source));
            if exists {
                return Ok(false);
            }
            lines.push(format!("- {source}"));
            *doc = replace_section(doc, "Sources", &lines.join("\n")).ok_or("missing 'Sources'")?;
            Ok(true)
        })
    }

    /// 删除包含 `needle`（忽略大小写）的来源行，返回被删除的行；主题不存在时不创建
    pub fn remove_source(&self, topic: &str, needle: &str) -> Result<Vec<String>, VaultError> {
        if !self.topic_exists(topic) {
            self.topic_path(topic)?;
            return Ok(Vec::new());
        }
        let needle = needle.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }
        self.modify_topic(topic, |doc| {
            let body = get_section(doc, "Sources").ok_or("missing 'Sources'")?;
            let (removed, kept): (Vec<String>, Vec<String>) = content_lines(body)
                .into_iter()
                .partition(|l| l.to_lowercase().contains(&needle));
            if !removed.is_empty() {
                *doc = replace_section(doc, "Sources", &kept.join("\n")).ok_or("missing 'Sources'")?;
            }
            Ok(removed)
        })
    }

    /// 写入（或替换）某概念的综述条目：学习者原话作为引用块，可附导师备注
    pub fn append_synthesis(
        &self,
        topic: &str,
        concept: &str,
        learner_text: &str,
        note: Option<&str>,
    ) -> Result<SynthesisWrite, VaultError> {
        let concept = single_line(concept);
        let mut entry: String = learner_text
            .trim()
            .lines()
            .map(|l| if l.trim().is_empty() { ">".to_string() } else { format!("> {l}") })
            .collect::<Vec<_>>()
            .join("\n");
        if let Some(note) = note.map(single_line).filter(|n| !n.is_empty()) {
            entry.push_str(&format!("\n\n*Note:* {note}"));
        }
        self.modify_topic(topic, |doc| {
            if let Some(span) = subsection_span(doc, "My Synthesis", &concept) {
                let previous = doc[span.clone()].trim().to_string();
                *doc = replace_span(doc, span, &entry);
                return Ok(SynthesisWrite {
                    previous: Some(previous),
                });
            }
            let body = get_section(doc, "My Synthesis").ok_or("missing 'My Synthesis'")?;
            let block = format!("### {concept}\n\n{entry}");
            let merged = join_blocks(body, &block);
            *doc = replace_section(doc, "My Synthesis", &merged).ok_or("missing 'My Synthesis'")?;
            Ok(SynthesisWrite { previous: None })
        })
    }

    /// 追加带日期标题的会话记录
    pub fn append_session_log(&self, topic: &str, entry: &str) -> Result<(), VaultError> {
        let block = format!("### {}\n{}", today(), defuse_headings(entry));
        self.modify_topic(topic, |doc| {
            let body = get_section(doc, "Session Log").ok_or("missing 'Session Log'")?;
            let merged = join_blocks(body, &block);
            *doc = replace_section(doc, "Session Log", &merged).ok_or("missing 'Session Log'")?;
            Ok(())
        })
    }

    /// 最新一条会话记录的正文（不含日期标题）
    pub fn latest_session_log_entry(&self, topic: &str) -> Result<Option<String>, VaultError> {
        let Some(note) = self.read_topic(topic)? else {
            return Ok(None);
        };
        let log = note.section("Session Log").unwrap_or_default();
        let latest = log
            .split("\n### ")
            .last()
            .map(|block| {
                let block = block.trim_start_matches("### ");
                match block.split_once('\n') {
                    Some((_, text)) if log.contains("### ") => text.trim().to_string(),
                    _ => String::new(),
                }
            })
            .filter(|t| !t.is_empty());
        Ok(latest)
    }

    /// 将主题重置为空白模板，保留 created 日期
    pub fn reset_topic(&self, topic: &str) -> Result<(), VaultError> {
        let path = self.topic_path(topic)?;
        let _lock = self.lock(&path)?;
        let today = today();
        let created = read_optional(&path)?
            .and_then(|t| document::parse_frontmatter(&t).ok())
            .and_then(|fm| fm.created)
            .unwrap_or_else(|| today.clone());
        atomic_write(&path, &templates::topic_note(topic, &created, &today))
    }

    /// 删除全部主题笔记，返回删除数量
    pub fn reset_all_topics(&self) -> Result<usize, VaultError> {
        let mut removed = 0;
        for topic in self.list_topics()? {
            let path = self.topic_path(&topic)?;
            let _lock = self.lock(&path)?;
            fs::remove_file(&path).map_err(|e| VaultError::write(&path, e))?;
            removed += 1;
        }
        Ok(removed)
    }

    // ---------------------------------------------------------------------
    // 每日日志
    // ---------------------------------------------------------------------

    /// 追加今日日志条目 `- **topic**: summary`（多行摘要缩进续行）
    pub fn append_daily_log(&self, topic: &str, summary: &str) -> Result<(), VaultError> {
        let date = today();
        let path = layout::daily_log_path(&self.root, &date);
        let _lock = self.lock(&path)?;
        let mut text = read_optional(&path)?.unwrap_or_else(|| format!("# Study Log {date}\n\n"));
        let mut lines = summary.trim().lines().filter(|l| !l.trim().is_empty());
        let first = lines.next().unwrap_or("(no summary)");
        let mut entry = format!("- **{topic}**: {}", first.trim());
        for line in lines {
            entry.push_str(&format!("\n  {}", line.trim()));
        }
        if !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(&entry);
        text.push('\n');
        atomic_write(&path, &text)
    }

    /// 最近的每日日志（新→旧），最多 `limit` 天
    pub fn daily_logs(&self, limit: usize) -> Result<Vec<DailyLog>, VaultError> {
        let dir = layout::daily_dir(&self.root);
        let pattern = format!("{}/*.md", glob::Pattern::escape(&dir.to_string_lossy()));
        let mut files: Vec<PathBuf> = glob::glob(&pattern)
            .map_err(|e| VaultError::read(&dir, std::io::Error::other(e.to_string())))?
            .filter_map(Result::ok)
            .collect();
        files.sort();
        files.reverse();

        let mut logs = Vec::new();
        for file in files.into_iter().take(limit) {
            let date = file
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let text = fs::read_to_string(&file).map_err(|e| VaultError::read(&file, e))?;
            let mut entries: Vec<String> = Vec::new();
            for line in text.lines() {
                if let Some(item) = line.strip_prefix("- ") {
                    entries.push(item.trim().to_string());
                } else if line.starts_with("  ") && !line.trim().is_empty() {
                    if let Some(last) = entries.last_mut() {
                        last.push(' ');
                        last.push_str(line.trim());
                    }
                }
            }
            logs.push(DailyLog { date, entries });
        }
        Ok(logs)
    }

    /// 删除全部每日日志，返回删除数量
    pub fn reset_daily_logs(&self) -> Result<usize, VaultError> {
        let logs = self.daily_logs(usize::MAX)?;
        for log in &logs {
            let path = layout::daily_log_path(&self.root, &log.date);
            let _lock = self.lock(&path)?;
            fs::remove_file(&path).map_err(|e| VaultError::write(&path, e))?;
        }
        Ok(logs.len())
    }

    // ---------------------------------------------------------------------
    // 画像与框架
    // ---------------------------------------------------------------------

    pub fn read_profile(&self) -> Result<Option<LearnerProfile>, VaultError> {
        let path = layout::profile_path(&self.root);
        let Some(text) = read_optional(&path)? else {
            return Ok(None);
        };
        let profile = match document::frontmatter_span(&text) {
            Some((yaml, body)) => LearnerProfile {
                revised: serde_yaml::from_str::<ProfileMeta>(&text[yaml])
                    .unwrap_or_default()
                    .revised,
                content: text[body..].trim().to_string(),
            },
            None => LearnerProfile {
                revised: None,
                content: text.trim().to_string(),
            },
        };
        Ok(Some(profile))
    }

    /// 整体覆盖画像正文并记录修订时间
    pub fn update_profile(&self, content: &str) -> Result<LearnerProfile, VaultError> {
        let path = layout::profile_path(&self.root);
        let _lock = self.lock(&path)?;
        let revised = chrono::Local::now().to_rfc3339();
        let content = content.trim().to_string();
        atomic_write(&path, &format!("---\nrevised: {revised}\n---\n\n{content}\n"))?;
        Ok(LearnerProfile {
            revised: Some(revised),
            content,
        })
    }

    pub fn reset_profile(&self) -> Result<(), VaultError> {
        let path = layout::profile_path(&self.root);
        let _lock = self.lock(&path)?;
        atomic_write(&path, templates::PROFILE)
    }

    pub fn read_framework(&self) -> Result<Option<String>, VaultError> {
        read_optional(&layout::framework_path(&self.root))
    }
}

fn read_optional(path: &Path) -> Result<Option<String>, VaultError> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(VaultError::read(path, e)),
    }
}

/// 概念名去掉方括号：条目以 `[[name]]` 写入，名字里不能再含 `[[` 或 `]]`
fn concept_name(raw: &str) -> String {
    single_line(raw).replace("[[", "").replace("]]", "").trim().to_string()
}

fn understanding_entry(concept: &str, notes: Option<&str>) -> String {
    match notes {
        Some(n) if !n.is_empty() => format!("- [[{concept}]]: {n}"),
        _ => format!("- [[{concept}]]"),
    }
}

/// `- [[Heap]]: notes` → `notes`
fn entry_notes(line: &str) -> Option<String> {
    let (_, rest) = line.split_once("]]")?;
    let rest = rest.trim_start_matches(|c: char| c == ':' || c == ' ' || c == '—' || c == '-');
    let rest = rest.trim();
    (!rest.is_empty()).then(|| rest.to_string())
}

fn concept_entry(concept: &str, links: &[String]) -> String {
    if links.is_empty() {
        format!("- [[{concept}]]")
    } else {
        let linked: Vec<String> = links.iter().map(|l| format!("[[{l}]]")).collect();
        format!("- [[{concept}]] → {}", linked.join(", "))
    }
}

/// 合并 Core Concepts 中某概念的行：不存在则追加，存在则并入新关联
fn merge_concept_line(doc: &mut String, concept: &str, links: &[String]) -> Result<ConceptChange, String> {
    let body = get_section(doc, "Core Concepts").ok_or("missing 'Core Concepts'")?;
    let mut lines = content_lines(body);
    let existing = lines
        .iter()
        .position(|l| bullet_concept(l).is_some_and(|c| same_concept(&c, concept)));

    let change = match existing {
        None => {
            lines.push(concept_entry(concept, links));
            ConceptChange::Added
        }
        Some(idx) => {
            let mut targets = document::literal_links(&lines[idx]);
            let name = if targets.is_empty() {
                concept.to_string()
            } else {
                targets.remove(0)
            };
            let fresh: Vec<String> = links
                .iter()
                .filter(|l| !targets.iter().any(|t| same_concept(t, l)))
                .cloned()
                .collect();
            if fresh.is_empty() {
                return Ok(ConceptChange::Unchanged);
            }
            targets.extend(fresh.iter().cloned());
            lines[idx] = concept_entry(&name, &targets);
            ConceptChange::Extended(fresh)
        }
    };
    *doc = replace_section(doc, "Core Concepts", &lines.join("\n")).ok_or("missing 'Core Concepts'")?;
    Ok(change)
}

fn join_blocks(existing: &str, block: &str) -> String {
    let existing = existing.trim();
    if existing.is_empty() {
        block.to_string()
    } else {
        format!("{existing}\n\n{block}")
    }
}
