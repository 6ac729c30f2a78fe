//! 纯文本渲染：理解程度表、概念图、时间线、主题树、帮助、开场快照、会话总结
//!
//! 只读取笔记库快照并格式化为字符串，不做任何 I/O。

use std::time::Duration;

use crate::core::SessionSummary;
use crate::vault::{Bucket, DailyLog, TopicNote, Wikilinks};

/// 概念图中每个主题最多列出的概念数
const GRAPH_MAX_CONCEPTS: usize = 8;
/// 开场快照中每个桶列出的概念数
const SNAPSHOT_PER_BUCKET: usize = 3;

/// 树节点
struct TreeNode {
    label: String,
    children: Vec<TreeNode>,
}

impl TreeNode {
    fn leaf(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            children: Vec::new(),
        }
    }
}

fn draw_tree(title: &str, nodes: &[TreeNode]) -> String {
    let mut out = String::from(title);
    out.push('\n');
    draw_children(&mut out, nodes, "");
    out.truncate(out.trim_end().len());
    out
}

fn draw_children(out: &mut String, nodes: &[TreeNode], prefix: &str) {
    for (i, node) in nodes.iter().enumerate() {
        let last = i + 1 == nodes.len();
        out.push_str(prefix);
        out.push_str(if last { "└── " } else { "├── " });
        out.push_str(&node.label);
        out.push('\n');
        let child_prefix = format!("{prefix}{}", if last { "    " } else { "│   " });
        draw_children(out, &node.children, &child_prefix);
    }
}

fn width(s: &str) -> usize {
    s.chars().count()
}

fn pad(s: &str, w: usize) -> String {
    format!("{s}{}", " ".repeat(w.saturating_sub(width(s))))
}

/// `!status`：三列理解程度表
pub fn status(topic: &str, note: Option<&TopicNote>) -> String {
    let Some(note) = note else {
        return format!("No note found for topic '{topic}'.");
    };
    let columns: Vec<(&str, Vec<String>)> = Bucket::ALL.iter().map(|b| (b.heading(), note.bucket(*b))).collect();
    let rows = columns.iter().map(|(_, c)| c.len()).max().unwrap_or(0).max(1);
    let widths: Vec<usize> = columns
        .iter()
        .map(|(h, items)| items.iter().map(|s| width(s)).chain([width(h)]).max().unwrap_or(0))
        .collect();

    let line = |cells: Vec<&str>| -> String {
        cells
            .iter()
            .zip(&widths)
            .map(|(c, w)| pad(c, *w))
            .collect::<Vec<_>>()
            .join(" | ")
            .trim_end()
            .to_string()
    };

    let mut out = vec![format!("Understanding: {topic}")];
    out.push(line(columns.iter().map(|(h, _)| *h).collect()));
    out.push(widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>().join("-+-"));
    for i in 0..rows {
        out.push(line(
            columns
                .iter()
                .map(|(_, items)| items.get(i).map(String::as_str).unwrap_or(""))
                .collect(),
        ));
    }
    out.join("\n")
}

/// `!timeline`：最近的每日日志
pub fn timeline(logs: &[DailyLog]) -> String {
    if logs.is_empty() {
        return "No daily logs found.".to_string();
    }
    let mut out = vec!["Study timeline".to_string()];
    for log in logs {
        if log.entries.is_empty() {
            out.push(format!("{}  (empty)", log.date));
            continue;
        }
        for (i, entry) in log.entries.iter().enumerate() {
            let date = if i == 0 { log.date.clone() } else { " ".repeat(width(&log.date)) };
            out.push(format!("{date}  {}", entry.replace("**", "")));
        }
    }
    out.join("\n")
}

/// `!graph`：主题 → 概念与跨主题关联，当前主题以 ● 标记
pub fn graph(entries: &[(String, Wikilinks)], current_topic: &str) -> String {
    if entries.is_empty() {
        return "No topics in vault yet.".to_string();
    }
    let nodes: Vec<TreeNode> = entries
        .iter()
        .map(|(topic, links)| {
            let marker = if topic == current_topic { "●" } else { " " };
            let mut children = Vec::new();
            if !links.concepts.is_empty() {
                let mut concepts: Vec<TreeNode> =
                    links.concepts.iter().take(GRAPH_MAX_CONCEPTS).map(TreeNode::leaf).collect();
                if links.concepts.len() > GRAPH_MAX_CONCEPTS {
                    concepts.push(TreeNode::leaf(format!("... +{} more", links.concepts.len() - GRAPH_MAX_CONCEPTS)));
                }
                children.push(TreeNode {
                    label: "concepts".to_string(),
                    children: concepts,
                });
            }
            children.extend(links.cross_topic.iter().map(|t| TreeNode::leaf(format!("→ {t}"))));
            TreeNode {
                label: format!("{marker} {topic}"),
                children,
            }
        })
        .collect();
    draw_tree("Concept graph", &nodes)
}

/// `!topics`：嵌套主题树与最近学习日期
pub fn topics(entries: &[(String, Option<String>)]) -> String {
    if entries.is_empty() {
        return "No topics yet. Start a session with: study --topic <name>".to_string();
    }
    let names: Vec<&str> = entries.iter().map(|(t, _)| t.as_str()).collect();
    draw_tree("Topics", &topic_nodes(None, entries, &names))
}

/// 最近的已存在祖先主题
fn nearest_parent<'a>(topic: &str, names: &[&'a str]) -> Option<&'a str> {
    let mut current = topic;
    while let Some((head, _)) = current.rsplit_once('/') {
        if let Some(found) = names.iter().find(|n| **n == head) {
            return Some(found);
        }
        current = head;
    }
    None
}

fn topic_nodes(parent: Option<&str>, entries: &[(String, Option<String>)], names: &[&str]) -> Vec<TreeNode> {
    entries
        .iter()
        .filter(|(topic, _)| nearest_parent(topic, names) == parent)
        .map(|(topic, last)| {
            let name = match parent {
                Some(p) => &topic[p.len() + 1..],
                None => topic.as_str(),
            };
            TreeNode {
                label: format!("{name}  {}", last.as_deref().unwrap_or("—")),
                children: topic_nodes(Some(topic), entries, names),
            }
        })
        .collect()
}

/// `!help`
pub fn help() -> String {
    [
        "commands",
        "  !status [topic]  understanding table for the current (or given) topic",
        "  !graph           concept graph tree",
        "  !timeline        last 30 daily logs",
        "  !topics          all topics + last session dates",
        "  !add <path>      attach a text file to your next message",
        "  !help            show this help",
        "",
        "  /exit            end session",
    ]
    .join("\n")
}

/// 会话开场的紧凑快照
pub fn boot_snapshot(topic: &str, note: Option<&TopicNote>, links: &Wikilinks) -> String {
    let mut lines = vec![format!("[{topic}]")];
    if let Some(note) = note {
        for (bucket, label) in [
            (Bucket::Solid, "Solid"),
            (Bucket::Shaky, "Shaky"),
            (Bucket::NotYetEngaged, "Not Yet"),
        ] {
            let items = note.bucket(bucket);
            if !items.is_empty() {
                let head: Vec<&str> = items.iter().take(SNAPSHOT_PER_BUCKET).map(String::as_str).collect();
                lines.push(format!("{label} ({}): {}", items.len(), head.join(", ")));
            }
        }
        if !links.cross_topic.is_empty() {
            lines.push(format!("Linked topics: {}", links.cross_topic.join(", ")));
        }
    }
    if lines.len() == 1 {
        lines.push("No notes yet. Let's build them together.".to_string());
    }
    lines.join("\n")
}

/// `Xm Ys`
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    format!("{}m {}s", secs / 60, secs % 60)
}

/// 结束时的会话总结
pub fn session_summary(summary: &SessionSummary) -> String {
    let mut lines = vec![
        "session summary".to_string(),
        format!("topic: {}   duration: {}", summary.topic, format_duration(summary.duration)),
        format!("{} exchange(s) · {} word(s) written", summary.exchanges, summary.words),
    ];

    let stats = &summary.stats;
    let mut vault = Vec::new();
    if stats.concepts_added > 0 {
        vault.push(format!("  + {} concept(s) added", stats.concepts_added));
    }
    if !stats.understanding_updates.is_empty() {
        let parts: Vec<String> = [
            (Bucket::Solid, "Solid"),
            (Bucket::Shaky, "Shaky"),
            (Bucket::NotYetEngaged, "Not Yet"),
        ]
        .into_iter()
        .filter_map(|(bucket, label)| {
            let n = stats.understanding_updates.iter().filter(|(_, b)| *b == bucket).count();
            (n > 0).then(|| format!("{n} → {label}"))
        })
        .collect();
        vault.push(format!("  ↑ {}", parts.join("  ~ ")));
    }
    if stats.sources_added > 0 {
        vault.push(format!("  ◉ {} source(s) added", stats.sources_added));
    }
    if stats.synthesis > 0 {
        vault.push(format!("  ✎ {} synthesis entr{} written", stats.synthesis, if stats.synthesis == 1 { "y" } else { "ies" }));
    }
    if !vault.is_empty() {
        lines.push(String::new());
        lines.push("vault".to_string());
        lines.extend(vault);
    }
    lines.join("\n")
}
