//! 主题笔记文档代数
//!
//! 纯文本层面的操作：frontmatter 读取与单字段改写、按标题路径（如 `Understanding/Solid`）定位 section、
//! 只替换目标 section 正文，其余字节原样保留；以及结构校验与可预测的补全。

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Range;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// 主题笔记的固定二级标题（按规范顺序）
pub const TOP_SECTIONS: [&str; 5] = [
    "Sources",
    "Core Concepts",
    "Understanding",
    "My Synthesis",
    "Session Log",
];

pub const UNDERSTANDING: &str = "Understanding";

/// 理解程度分桶：每个概念任一时刻只在一个桶里
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum Bucket {
    Solid,
    Shaky,
    #[serde(rename = "Not Yet Engaged")]
    NotYetEngaged,
}

impl Bucket {
    pub const ALL: [Bucket; 3] = [Bucket::Solid, Bucket::Shaky, Bucket::NotYetEngaged];

    pub fn heading(self) -> &'static str {
        match self {
            Bucket::Solid => "Solid",
            Bucket::Shaky => "Shaky",
            Bucket::NotYetEngaged => "Not Yet Engaged",
        }
    }

    pub fn section_path(self) -> String {
        format!("{UNDERSTANDING}/{}", self.heading())
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.heading())
    }
}

impl FromStr for Bucket {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Bucket::ALL
            .into_iter()
            .find(|b| b.heading().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown bucket '{s}'"))
    }
}

/// 主题笔记 frontmatter；未知键原样保留
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Frontmatter {
    pub topic: String,
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub last_session: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

fn wikilink_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[\[([^\]|#]+?)(?:\|[^\]]+)?\]\]").expect("static regex"))
}

/// 提取文本中所有 wikilink 目标（去重，保持出现顺序）
pub fn wikilinks(text: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for cap in wikilink_re().captures_iter(text) {
        let target = cap[1].trim().to_string();
        if !out.contains(&target) {
            out.push(target);
        }
    }
    out
}

/// 拆出 frontmatter：返回 (YAML 文本范围, 正文起始偏移)
pub fn frontmatter_span(text: &str) -> Option<(Range<usize>, usize)> {
    let mut offset = 0;
    let mut lines = text.split_inclusive('\n');
    let first = lines.next()?;
    if first.trim_end() != "---" {
        return None;
    }
    offset += first.len();
    let yaml_start = offset;
    for line in lines {
        if line.trim_end() == "---" {
            return Some((yaml_start..offset, offset + line.len()));
        }
        offset += line.len();
    }
    None
}

pub fn parse_frontmatter(text: &str) -> Result<Frontmatter, String> {
    let (yaml, _) = frontmatter_span(text).ok_or("missing YAML frontmatter")?;
    let fm: Frontmatter = serde_yaml::from_str(&text[yaml])
        .map_err(|e| format!("unparsable frontmatter: {e}"))?;
    if fm.topic.trim().is_empty() {
        return Err("frontmatter has an empty 'topic'".to_string());
    }
    Ok(fm)
}

/// 原位改写 frontmatter 中的单个键（不存在则追加在结束分隔符前），其余行不动
pub fn set_frontmatter_field(text: &str, key: &str, value: &str) -> Option<String> {
    let (yaml, _) = frontmatter_span(text)?;
    let prefix = format!("{key}:");
    let new_line = format!("{key}: {value}\n");
    let mut offset = yaml.start;
    for line in text[yaml.clone()].split_inclusive('\n') {
        if line.starts_with(&prefix) {
            let mut out = String::with_capacity(text.len() + value.len());
            out.push_str(&text[..offset]);
            out.push_str(&new_line);
            out.push_str(&text[offset + line.len()..]);
            return Some(out);
        }
        offset += line.len();
    }
    let mut out = String::with_capacity(text.len() + new_line.len());
    out.push_str(&text[..yaml.end]);
    out.push_str(&new_line);
    out.push_str(&text[yaml.end..]);
    Some(out)
}

/// 一行 Markdown 标题
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heading {
    pub level: usize,
    pub title: String,
    /// 标题行起始偏移
    pub start: usize,
    /// 标题行之后（正文起始）偏移
    pub body_start: usize,
}

/// 扫描正文中的 ATX 标题（跳过 frontmatter 与围栏代码块）
pub fn headings(text: &str) -> Vec<Heading> {
    let mut offset = frontmatter_span(text).map(|(_, body)| body).unwrap_or(0);
    let mut out = Vec::new();
    let mut in_fence = false;
    for line in text[offset..].split_inclusive('\n') {
        let trimmed = line.trim_end();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
        } else if !in_fence {
            if let Some((level, title)) = parse_heading(trimmed) {
                out.push(Heading {
                    level,
                    title,
                    start: offset,
                    body_start: offset + line.len(),
                });
            }
        }
        offset += line.len();
    }
    out
}

fn parse_heading(line: &str) -> Option<(usize, String)> {
    let level = line.chars().take_while(|c| *c == '#').count();
    if level == 0 || level > 6 {
        return None;
    }
    let rest = &line[level..];
    if !rest.is_empty() && !rest.starts_with(' ') {
        return None;
    }
    Some((level, rest.trim().to_string()))
}

/// 定位 section 正文范围。路径第 i 段对应 i+2 级标题；section 到下一个同级或更高级标题为止。
pub fn section_span(text: &str, path: &str) -> Option<Range<usize>> {
    let all = headings(text);
    let mut scope = 0..text.len();
    let mut body = None;
    for (depth, segment) in path.split('/').enumerate() {
        let level = depth + 2;
        let idx = all.iter().position(|h| {
            h.level == level && h.start >= scope.start && h.start < scope.end && h.title == segment
        })?;
        let heading = &all[idx];
        let end = all[idx + 1..]
            .iter()
            .find(|h| h.level <= level)
            .map(|h| h.start)
            .unwrap_or(text.len())
            .min(scope.end);
        scope = heading.body_start..end;
        body = Some(scope.clone());
    }
    body
}

pub fn get_section<'a>(text: &'a str, path: &str) -> Option<&'a str> {
    section_span(text, path).map(|r| &text[r])
}

/// 规范化 section 正文：标题后空一行，内容，末尾空一行
pub fn format_body(content: &str) -> String {
    let content = content.trim_matches('\n').trim_end();
    if content.is_empty() {
        "\n".to_string()
    } else {
        format!("\n{content}\n\n")
    }
}

/// 仅替换目标 section 的正文；section 不存在返回 None
pub fn replace_section(text: &str, path: &str, content: &str) -> Option<String> {
    let span = section_span(text, path)?;
    Some(replace_span(text, span, content))
}

/// 以规范化正文替换给定范围
pub fn replace_span(text: &str, span: Range<usize>, content: &str) -> String {
    let mut body = format_body(content);
    // 文件末尾的 section 不额外留空行
    if span.end == text.len() && body.ends_with("\n\n") {
        body.pop();
    }
    let mut out = String::with_capacity(text.len() + content.len());
    out.push_str(&text[..span.start]);
    out.push_str(&body);
    out.push_str(&text[span.end..]);
    out
}

/// 二级 section 下标题（不区分大小写）为 `title` 的三级小节正文范围。
/// 与 section_span 不同，标题中可以含 '/'（如 `TCP/IP`）。
pub fn subsection_span(text: &str, parent: &str, title: &str) -> Option<Range<usize>> {
    let scope = section_span(text, parent)?;
    let all = headings(text);
    let idx = all.iter().position(|h| {
        h.level == 3 && h.start >= scope.start && h.start < scope.end && same_concept(&h.title, title)
    })?;
    let end = all[idx + 1..]
        .iter()
        .find(|h| h.level <= 3)
        .map(|h| h.start)
        .unwrap_or(text.len())
        .min(scope.end);
    Some(all[idx].body_start..end)
}

/// section 正文里的非空行
pub fn content_lines(body: &str) -> Vec<String> {
    body.lines()
        .filter(|l| !l.trim().is_empty())
        .map(str::to_string)
        .collect()
}

/// 列表项开头的 wikilink 原文：`- [[Heap]]: ...` → `Heap`
///
/// 取 `[[` 到其后第一个 `]]` 之间的字面内容，不解析别名与锚点，
/// 因此 `[[C#]]`、`[[A|B]]` 读回的名字与写入时一致。
pub fn bullet_concept(line: &str) -> Option<String> {
    let rest = line
        .trim_start()
        .strip_prefix("- ")
        .or_else(|| line.trim_start().strip_prefix("* "))?
        .trim_start();
    let inner = rest.strip_prefix("[[")?;
    let end = inner.find("]]")?;
    let concept = inner[..end].trim();
    (!concept.is_empty()).then(|| concept.to_string())
}

/// 文本中所有 `[[...]]` 的字面内容，按出现顺序
pub fn literal_links(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find("[[") {
        let after = &rest[start + 2..];
        let Some(end) = after.find("]]") else {
            break;
        };
        let inner = after[..end].trim();
        if !inner.is_empty() {
            out.push(inner.to_string());
        }
        rest = &after[end + 2..];
    }
    out
}

pub fn same_concept(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

/// LLM 给出的多行文本中以 '#' 开头的行会被当作标题，破坏固定结构；转义之
pub fn defuse_headings(text: &str) -> String {
    text.trim()
        .lines()
        .map(|l| {
            if l.trim_start().starts_with('#') {
                format!("\\{}", l.trim_start())
            } else {
                l.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// 单行化（列表项内容）
pub fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 校验并补全固定结构。
///
/// 缺失的规范 section / 桶按规范位置插入（返回插入的路径列表）；
/// frontmatter 缺失、规范标题重复或乱序时返回 Err，调用方应拒绝写入。
pub fn normalize_structure(text: &str) -> Result<(String, Vec<String>), String> {
    parse_frontmatter(text)?;
    let mut doc = text.to_string();
    let mut inserted = Vec::new();

    check_order(&doc, 2, &TOP_SECTIONS, None)?;
    for (i, title) in TOP_SECTIONS.iter().enumerate() {
        if section_span(&doc, title).is_some() {
            continue;
        }
        let at = TOP_SECTIONS[i + 1..]
            .iter()
            .find_map(|next| heading_start(&doc, 2, next, None))
            .unwrap_or(doc.len());
        doc = insert_heading(&doc, at, 2, title);
        inserted.push(title.to_string());
    }

    let buckets: Vec<&str> = Bucket::ALL.iter().map(|b| b.heading()).collect();
    let scope = section_span(&doc, UNDERSTANDING).ok_or("Understanding section vanished")?;
    check_order(&doc, 3, &buckets, Some(scope))?;
    for (i, title) in buckets.iter().enumerate() {
        let scope = section_span(&doc, UNDERSTANDING).ok_or("Understanding section vanished")?;
        if heading_start(&doc, 3, title, Some(scope.clone())).is_some() {
            continue;
        }
        let at = buckets[i + 1..]
            .iter()
            .find_map(|next| heading_start(&doc, 3, next, Some(scope.clone())))
            .unwrap_or(scope.end);
        doc = insert_heading(&doc, at, 3, title);
        inserted.push(format!("{UNDERSTANDING}/{title}"));
    }

    Ok((doc, inserted))
}

fn heading_start(text: &str, level: usize, title: &str, scope: Option<Range<usize>>) -> Option<usize> {
    headings(text)
        .into_iter()
        .find(|h| {
            h.level == level
                && h.title == title
                && scope.as_ref().map_or(true, |s| h.start >= s.start && h.start < s.end)
        })
        .map(|h| h.start)
}

fn check_order(text: &str, level: usize, canonical: &[&str], scope: Option<Range<usize>>) -> Result<(), String> {
    let mut seen: Vec<usize> = Vec::new();
    for h in headings(text) {
        if h.level != level {
            continue;
        }
        if let Some(s) = &scope {
            if h.start < s.start || h.start >= s.end {
                continue;
            }
        }
        if let Some(rank) = canonical.iter().position(|c| *c == h.title) {
            if seen.contains(&rank) {
                return Err(format!("duplicate '{}' heading", h.title));
            }
            if seen.last().is_some_and(|last| *last > rank) {
                return Err(format!("'{}' heading is out of order", h.title));
            }
            seen.push(rank);
        }
    }
    Ok(())
}

fn insert_heading(text: &str, at: usize, level: usize, title: &str) -> String {
    let hashes = "#".repeat(level);
    let mut out = String::with_capacity(text.len() + title.len() + 8);
    out.push_str(&text[..at]);
    if !out.ends_with('\n') {
        out.push('\n');
    }
    if at == text.len() && !out.ends_with("\n\n") {
        out.push('\n');
    }
    out.push_str(&format!("{hashes} {title}\n\n"));
    out.push_str(&text[at..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOTE: &str = "---\ntopic: heaps\ncreated: 2024-01-01\nlast_session: 2024-01-02\n---\n## Sources\n\n- CLRS\n\n## Core Concepts\n\n## Understanding\n\n### Solid\n\n- [[Heap]]: shape property\n\n### Shaky\n\n### Not Yet Engaged\n\n## My Synthesis\n\n## Session Log\n";

    #[test]
    fn frontmatter_parses_and_keeps_extra_keys() {
        let text = NOTE.replace("topic: heaps\n", "topic: heaps\ntags: [ds]\n");
        let fm = parse_frontmatter(&text).unwrap();
        assert_eq!(fm.topic, "heaps");
        assert_eq!(fm.created.as_deref(), Some("2024-01-01"));
        assert!(fm.extra.contains_key("tags"));
    }

    #[test]
    fn set_field_rewrites_only_that_line() {
        let out = set_frontmatter_field(NOTE, "last_session", "2024-03-03").unwrap();
        assert!(out.contains("last_session: 2024-03-03\n"));
        assert!(out.contains("created: 2024-01-01\n"));
        assert_eq!(out.len(), NOTE.len());
    }

    #[test]
    fn nested_section_lookup_stops_at_sibling() {
        assert_eq!(get_section(NOTE, "Understanding/Solid").unwrap().trim(), "- [[Heap]]: shape property");
        assert_eq!(get_section(NOTE, "Understanding/Shaky").unwrap().trim(), "");
        assert_eq!(get_section(NOTE, "Sources").unwrap().trim(), "- CLRS");
        assert!(get_section(NOTE, "Understanding").unwrap().contains("### Shaky"));
        assert!(get_section(NOTE, "Missing").is_none());
    }

    #[test]
    fn replace_keeps_every_other_byte() {
        let out = replace_section(NOTE, "Understanding/Shaky", "- [[Sift Down]]").unwrap();
        let span = section_span(NOTE, "Understanding/Shaky").unwrap();
        assert_eq!(&out[..span.start], &NOTE[..span.start]);
        let tail = &NOTE[span.end..];
        assert!(out.ends_with(tail));
        assert_eq!(get_section(&out, "Understanding/Shaky").unwrap().trim(), "- [[Sift Down]]");
    }

    #[test]
    fn headings_inside_code_fences_are_ignored() {
        let text = NOTE.replace("- CLRS\n", "```\n## Sources\n```\n");
        assert!(normalize_structure(&text).is_ok());
        assert_eq!(headings(&text).iter().filter(|h| h.title == "Sources").count(), 1);
    }

    #[test]
    fn bullet_concept_extracts_leading_wikilink_only() {
        assert_eq!(bullet_concept("- [[Heap]]: notes").as_deref(), Some("Heap"));
        assert_eq!(bullet_concept("- [[Heap]] → [[Tree]]").as_deref(), Some("Heap"));
        assert_eq!(bullet_concept("- [[C#]]: pattern matching").as_deref(), Some("C#"));
        assert_eq!(bullet_concept("* [[A|B]]").as_deref(), Some("A|B"));
        assert_eq!(bullet_concept("- [[]] stray"), None);
        assert_eq!(bullet_concept("- see [[Heap]]"), None);
        assert_eq!(bullet_concept("plain text"), None);
    }

    #[test]
    fn literal_links_keep_hash_and_pipe() {
        assert_eq!(literal_links("- [[F#]] → [[A|B]], [[Tree]]"), vec!["F#", "A|B", "Tree"]);
        assert!(literal_links("[[unclosed").is_empty());
    }

    #[test]
    fn normalize_inserts_missing_sections_in_canonical_place() {
        let text = "---\ntopic: heaps\n---\n## Sources\n\n## Understanding\n\n### Shaky\n\n## Session Log\n";
        let (doc, inserted) = normalize_structure(text).unwrap();
        assert_eq!(
            inserted,
            vec!["Core Concepts", "My Synthesis", "Understanding/Solid", "Understanding/Not Yet Engaged"]
        );
        let order: Vec<String> = headings(&doc).into_iter().map(|h| h.title).collect();
        assert_eq!(
            order,
            vec!["Sources", "Core Concepts", "Understanding", "Solid", "Shaky", "Not Yet Engaged", "My Synthesis", "Session Log"]
        );
    }

    #[test]
    fn normalize_is_identity_on_complete_note() {
        let (doc, inserted) = normalize_structure(NOTE).unwrap();
        assert!(inserted.is_empty());
        assert_eq!(doc, NOTE);
    }

    #[test]
    fn normalize_refuses_unpredictable_shapes() {
        assert!(normalize_structure("## Sources\n").is_err());
        let dup = format!("{NOTE}\n## Sources\n");
        assert!(normalize_structure(&dup).unwrap_err().contains("duplicate"));
        let swapped = NOTE.replace("## Sources", "## Tmp").replace("## Session Log", "## Sources");
        assert!(normalize_structure(&swapped).unwrap_err().contains("out of order"));
    }

    #[test]
    fn defuse_escapes_heading_lines() {
        assert_eq!(defuse_headings("ok\n## Boom\n  # x"), "ok\n\\## Boom\n\\# x");
    }

    #[test]
    fn bucket_round_trips_through_names() {
        assert_eq!("not yet engaged".parse::<Bucket>().unwrap(), Bucket::NotYetEngaged);
        assert_eq!(serde_json::to_string(&Bucket::NotYetEngaged).unwrap(), "\"Not Yet Engaged\"");
        assert!("mastered".parse::<Bucket>().is_err());
    }
}
