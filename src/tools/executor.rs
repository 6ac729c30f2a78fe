//! 工具执行器
//!
//! 持有 ToolRegistry 与会话主题。execute(call) 依次：查找工具 → 规范化 topic 参数 → schema 校验 →
//! 执行 → 统计 → 输出结构化审计日志（JSON）。可回馈的失败作为 ToolOutcome::Invalid / Failure 返回，
//! 致命的笔记库错误作为 Err 上报并终止工具循环。

use std::time::Instant;

use serde::Serialize;
use serde_json::Value;

use crate::core::StudyError;
use crate::llm::ToolSpec;
use crate::memory::ToolCall;
use crate::tools::schema::{declared_properties, validate_args};
use crate::tools::{ToolError, ToolRegistry, VaultEffect};
use crate::vault::layout::is_same_or_subtopic;
use crate::vault::Bucket;

/// 单次工具调用的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolOutcome {
    Success(String),
    /// 未知工具或参数不合法
    Invalid(String),
    /// 工具拒绝执行（如非法主题名）
    Failure(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolResult {
    pub call_id: String,
    pub tool: String,
    pub outcome: ToolOutcome,
}

impl ToolResult {
    pub fn is_failure(&self) -> bool {
        !matches!(self.outcome, ToolOutcome::Success(_))
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self.outcome, ToolOutcome::Invalid(_))
    }

    /// 写回对话历史的文本
    pub fn content(&self) -> String {
        match &self.outcome {
            ToolOutcome::Success(text) => text.clone(),
            ToolOutcome::Invalid(text) | ToolOutcome::Failure(text) => format!("Error: {text}"),
        }
    }
}

/// 会话统计（结束时展示）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub concepts_added: usize,
    pub understanding_updates: Vec<(String, Bucket)>,
    pub sources_added: usize,
    pub synthesis: usize,
}

impl SessionStats {
    fn record(&mut self, effect: &VaultEffect) {
        match effect {
            VaultEffect::ConceptAdded => self.concepts_added += 1,
            VaultEffect::Understanding { concept, bucket } => {
                self.understanding_updates.push((concept.clone(), *bucket));
            }
            VaultEffect::SourceAdded => self.sources_added += 1,
            VaultEffect::Synthesis => self.synthesis += 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == SessionStats::default()
    }
}

/// 工具执行器：按会话主题规范化参数，执行并记录审计日志
pub struct ToolExecutor {
    registry: ToolRegistry,
    specs: Vec<ToolSpec>,
    topic: String,
    stats: SessionStats,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, topic: impl Into<String>) -> Self {
        let specs = registry.specs();
        Self {
            registry,
            specs,
            topic: topic.into(),
            stats: SessionStats::default(),
        }
    }

    /// 会话内不变的工具声明列表
    pub fn specs(&self) -> &[ToolSpec] {
        &self.specs
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }

    /// 执行一次工具调用
    pub async fn execute(&mut self, call: &ToolCall) -> Result<ToolResult, StudyError> {
        let start = Instant::now();
        let (outcome, fatal) = self.run(call).await;

        let (ok, label) = match (&outcome, &fatal) {
            (_, Some(_)) => (false, "fatal"),
            (ToolOutcome::Success(_), _) => (true, "ok"),
            (ToolOutcome::Invalid(_), _) => (false, "invalid"),
            (ToolOutcome::Failure(_), _) => (false, "rejected"),
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": call.name,
            "call_id": call.id,
            "ok": ok,
            "outcome": label,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview(&call.arguments),
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        if let Some(err) = fatal {
            return Err(err);
        }
        Ok(ToolResult {
            call_id: call.id.clone(),
            tool: call.name.clone(),
            outcome,
        })
    }

    async fn run(&mut self, call: &ToolCall) -> (ToolOutcome, Option<StudyError>) {
        let Some(tool) = self.registry.get(&call.name) else {
            let err = ToolError::UnknownTool(call.name.clone());
            return (
                ToolOutcome::Invalid(format!("{err}. Available tools: {}", self.registry.tool_names().join(", "))),
                None,
            );
        };

        let schema = tool.parameters_schema();
        let mut args = call.arguments.clone();
        let note = if declared_properties(&schema).contains(&"topic") {
            normalize_topic(&mut args, &self.topic, tool.writes_topic())
        } else {
            None
        };

        if let Err(detail) = validate_args(&schema, &args) {
            let err = ToolError::InvalidArguments {
                tool: call.name.clone(),
                detail,
            };
            return (ToolOutcome::Invalid(err.to_string()), None);
        }

        match tool.execute(args).await {
            Ok(output) => {
                if let Some(effect) = &output.effect {
                    self.stats.record(effect);
                }
                let text = match note {
                    Some(note) => format!("{note}\n{}", output.content),
                    None => output.content,
                };
                (ToolOutcome::Success(text), None)
            }
            Err(e) if e.is_fatal() => {
                tracing::warn!(tool = %call.name, error = %e, "tool failed fatally");
                let message = e.to_string();
                let fatal = match e {
                    ToolError::Vault(v) => StudyError::from(v),
                    other => StudyError::Tooling(other.to_string()),
                };
                (ToolOutcome::Failure(message), Some(fatal))
            }
            Err(e @ ToolError::InvalidArguments { .. }) => (ToolOutcome::Invalid(e.to_string()), None),
            Err(e) => (ToolOutcome::Failure(e.to_string()), None),
        }
    }
}

/// 补全缺失的 topic；写工具的 topic 超出会话主题（及其子主题）时改为会话主题。返回附加说明。
fn normalize_topic(args: &mut Value, session_topic: &str, writes_topic: bool) -> Option<String> {
    let obj = args.as_object_mut()?;
    match obj.get("topic") {
        None | Some(Value::Null) => {
            obj.insert("topic".into(), Value::String(session_topic.to_string()));
            Some(format!("[auto-added topic='{session_topic}']"))
        }
        Some(Value::String(given)) if writes_topic && !is_same_or_subtopic(given, session_topic) => {
            let note = format!("[auto-corrected topic '{given}' → '{session_topic}']");
            tracing::warn!(given = %given, session_topic, "topic argument corrected");
            obj.insert("topic".into(), Value::String(session_topic.to_string()));
            Some(note)
        }
        _ => None,
    }
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::tools::build_vault_registry;
    use crate::vault::VaultStore;
    use serde_json::json;

    fn executor(topic: &str) -> (tempfile::TempDir, Arc<VaultStore>, ToolExecutor) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(VaultStore::new(dir.path()));
        store.init().unwrap();
        let registry = build_vault_registry(Arc::clone(&store)).unwrap();
        (dir, store, ToolExecutor::new(registry, topic))
    }

    #[tokio::test]
    async fn unknown_tool_is_fed_back_without_touching_the_vault() {
        let (_dir, store, mut exec) = executor("heaps");
        let result = exec
            .execute(&ToolCall::new("c1", "delete_everything", json!({})))
            .await
            .unwrap();
        assert!(result.is_invalid());
        assert_eq!(result.call_id, "c1");
        assert!(result.content().contains("unknown tool 'delete_everything'"));
        assert_eq!(store.lock_acquisitions(), 0);
    }

    #[tokio::test]
    async fn schema_violations_never_reach_the_store() {
        let (_dir, store, mut exec) = executor("heaps");
        let result = exec
            .execute(&ToolCall::new("c1", "record_understanding", json!({"topic": "heaps", "concept": "heapify", "bucket": "Mastered"})))
            .await
            .unwrap();
        assert!(result.is_invalid());
        assert!(result.content().contains("must be one of"));
        let result = exec
            .execute(&ToolCall::new("c2", "add_concept", json!("{not json")))
            .await
            .unwrap();
        assert!(result.is_failure());
        assert_eq!(store.lock_acquisitions(), 0);
        assert!(!store.topic_exists("heaps"));
    }

    #[tokio::test]
    async fn topic_is_filled_and_corrected_for_writes() {
        let (_dir, store, mut exec) = executor("heaps");
        let r = exec
            .execute(&ToolCall::new("c1", "add_source", json!({"source": "CLRS ch. 6"})))
            .await
            .unwrap();
        assert!(r.content().starts_with("[auto-added topic='heaps']"));
        let r = exec
            .execute(&ToolCall::new("c2", "add_concept", json!({"topic": "graphs", "concept": "Heap"})))
            .await
            .unwrap();
        assert!(r.content().contains("auto-corrected topic 'graphs' → 'heaps'"));
        assert!(!store.topic_exists("graphs"));
        // 子主题保持不变
        let r = exec
            .execute(&ToolCall::new("c3", "add_concept", json!({"topic": "heaps/heapify", "concept": "Sift Down"})))
            .await
            .unwrap();
        assert!(!r.content().contains("auto-corrected"));
        assert!(store.topic_exists("heaps/heapify"));
        // 读工具可以读其它主题
        let r = exec
            .execute(&ToolCall::new("c4", "read_note", json!({"topic": "graphs"})))
            .await
            .unwrap();
        assert_eq!(r.content(), "No note for 'graphs' yet.");
    }

    #[tokio::test]
    async fn stats_accumulate_from_effects() {
        let (_dir, _store, mut exec) = executor("heaps");
        let calls = [
            ToolCall::new("1", "add_concept", json!({"topic": "heaps", "concept": "Heap", "links": ["Tree"]})),
            ToolCall::new("2", "add_concept", json!({"topic": "heaps", "concept": "Heap"})),
            ToolCall::new("3", "record_understanding", json!({"topic": "heaps", "concept": "Heap", "bucket": "Solid"})),
            ToolCall::new("4", "add_source", json!({"topic": "heaps", "source": "CLRS"})),
            ToolCall::new("5", "append_synthesis", json!({"topic": "heaps", "concept": "Heap", "learner_text": "A tree where parents beat children."})),
        ];
        for call in &calls {
            assert!(!exec.execute(call).await.unwrap().is_failure());
        }
        let stats = exec.stats();
        assert_eq!(stats.concepts_added, 1);
        assert_eq!(stats.understanding_updates, vec![("Heap".to_string(), Bucket::Solid)]);
        assert_eq!((stats.sources_added, stats.synthesis), (1, 1));
    }

    #[tokio::test]
    async fn malformed_note_escalates_as_fatal() {
        let (dir, _store, mut exec) = executor("heaps");
        let path = dir.path().join("topics").join("heaps.md");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "no frontmatter here\n## Sources\n").unwrap();
        let err = exec
            .execute(&ToolCall::new("c1", "add_source", json!({"topic": "heaps", "source": "x"})))
            .await
            .unwrap_err();
        assert!(matches!(err, StudyError::VaultConsistency(_)));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "no frontmatter here\n## Sources\n");
    }
}
