//! 笔记库工具集
//!
//! 每个工具对应一次 VaultStore 操作。参数结构体上的文档注释即 schema 中的参数说明（写给 LLM，英文）。
//! 文件锁可能阻塞，操作放到 spawn_blocking 中执行。

use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::tools::schema::{parse_args, schema_for_args};
use crate::tools::{Tool, ToolError, ToolOutput, ToolRegistry, VaultEffect};
use crate::vault::{Bucket, ConceptChange, VaultError, VaultStore};

/// 会话向 LLM 声明的全部工具（按声明顺序）
pub const DECLARED_TOOLS: &[&str] = &[
    "read_note",
    "list_topics",
    "read_profile",
    "add_concept",
    "add_source",
    "remove_source",
    "record_understanding",
    "link_to_topic",
    "append_synthesis",
    "append_session_log",
    "update_profile",
];

/// 注册全部笔记库工具并校验与声明列表一致
pub fn build_vault_registry(store: Arc<VaultStore>) -> Result<ToolRegistry, ToolError> {
    let mut registry = ToolRegistry::new();
    registry.register(ReadNoteTool::new(Arc::clone(&store)))?;
    registry.register(ListTopicsTool::new(Arc::clone(&store)))?;
    registry.register(ReadProfileTool::new(Arc::clone(&store)))?;
    registry.register(AddConceptTool::new(Arc::clone(&store)))?;
    registry.register(AddSourceTool::new(Arc::clone(&store)))?;
    registry.register(RemoveSourceTool::new(Arc::clone(&store)))?;
    registry.register(RecordUnderstandingTool::new(Arc::clone(&store)))?;
    registry.register(LinkToTopicTool::new(Arc::clone(&store)))?;
    registry.register(AppendSynthesisTool::new(Arc::clone(&store)))?;
    registry.register(AppendSessionLogTool::new(Arc::clone(&store)))?;
    registry.register(UpdateProfileTool::new(store))?;
    registry.ensure_complete(DECLARED_TOOLS)?;
    Ok(registry)
}

/// 在阻塞线程池中执行一次笔记库操作
async fn blocking<T, F>(store: &Arc<VaultStore>, op: F) -> Result<T, ToolError>
where
    T: Send + 'static,
    F: FnOnce(&VaultStore) -> Result<T, VaultError> + Send + 'static,
{
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || op(&store))
        .await
        .map_err(|e| ToolError::Internal(e.to_string()))?
        .map_err(ToolError::from)
}

macro_rules! vault_tool {
    ($ty:ident) => {
        pub struct $ty {
            store: Arc<VaultStore>,
        }

        impl $ty {
            pub fn new(store: Arc<VaultStore>) -> Self {
                Self { store }
            }
        }
    };
}

// ---------------------------------------------------------------------------
// 只读工具
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema)]
struct TopicArgs {
    /// Topic name in kebab-case, '/' between parent and subtopic (e.g. "heaps" or "heaps/heapify")
    topic: String,
}

vault_tool!(ReadNoteTool);

#[async_trait]
impl Tool for ReadNoteTool {
    fn name(&self) -> &str {
        "read_note"
    }

    fn description(&self) -> &str {
        "Read the full markdown note for a topic from the vault."
    }

    fn parameters_schema(&self) -> Value {
        schema_for_args::<TopicArgs>()
    }

    async fn execute(&self, args: Value) -> Result<ToolOutput, ToolError> {
        let args: TopicArgs = parse_args(self.name(), args)?;
        let topic = args.topic.clone();
        let note = blocking(&self.store, move |s| s.read_topic(&args.topic)).await?;
        Ok(ToolOutput::text(match note {
            Some(note) => note.content,
            None => format!("No note for '{topic}' yet."),
        }))
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct NoArgs {}

vault_tool!(ListTopicsTool);

#[async_trait]
impl Tool for ListTopicsTool {
    fn name(&self) -> &str {
        "list_topics"
    }

    fn description(&self) -> &str {
        "List all topic names stored in the vault."
    }

    fn parameters_schema(&self) -> Value {
        schema_for_args::<NoArgs>()
    }

    async fn execute(&self, _args: Value) -> Result<ToolOutput, ToolError> {
        let topics = blocking(&self.store, |s| s.list_topics()).await?;
        Ok(ToolOutput::text(if topics.is_empty() {
            "No topics yet.".to_string()
        } else {
            topics.join("\n")
        }))
    }
}

vault_tool!(ReadProfileTool);

#[async_trait]
impl Tool for ReadProfileTool {
    fn name(&self) -> &str {
        "read_profile"
    }

    fn description(&self) -> &str {
        "Read the learner profile: background, preferences and metacognitive notes."
    }

    fn parameters_schema(&self) -> Value {
        schema_for_args::<NoArgs>()
    }

    async fn execute(&self, _args: Value) -> Result<ToolOutput, ToolError> {
        let profile = blocking(&self.store, |s| s.read_profile()).await?;
        Ok(ToolOutput::text(match profile {
            Some(p) if !p.content.trim().is_empty() => p.content,
            _ => "No learner profile yet.".to_string(),
        }))
    }
}

// ---------------------------------------------------------------------------
// 主题写入工具
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema)]
struct AddConceptArgs {
    /// Topic slug
    topic: String,
    /// Concept noun phrase
    concept: String,
    /// Related concept names to link to
    #[serde(default)]
    links: Vec<String>,
}

vault_tool!(AddConceptTool);

#[async_trait]
impl Tool for AddConceptTool {
    fn name(&self) -> &str {
        "add_concept"
    }

    fn description(&self) -> &str {
        "Add a concept wikilink to the Core Concepts section of a topic note, with links to related concepts."
    }

    fn parameters_schema(&self) -> Value {
        schema_for_args::<AddConceptArgs>()
    }

    fn writes_topic(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value) -> Result<ToolOutput, ToolError> {
        let args: AddConceptArgs = parse_args(self.name(), args)?;
        let (topic, concept) = (args.topic.clone(), args.concept.clone());
        let change = blocking(&self.store, move |s| s.add_concept(&args.topic, &args.concept, &args.links)).await?;
        Ok(match change {
            ConceptChange::Added => ToolOutput::text(format!("Concept '[[{concept}]]' added to '{topic}'."))
                .with_effect(VaultEffect::ConceptAdded),
            ConceptChange::Extended(links) => ToolOutput::text(format!(
                "Concept '[[{concept}]]' already in '{topic}'; new links: {}.",
                links.join(", ")
            )),
            ConceptChange::Unchanged => {
                ToolOutput::text(format!("Concept '[[{concept}]]' is already recorded in '{topic}'."))
            }
        })
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct SourceArgs {
    /// Topic slug
    topic: String,
    /// Source description or URL
    source: String,
}

vault_tool!(AddSourceTool);

#[async_trait]
impl Tool for AddSourceTool {
    fn name(&self) -> &str {
        "add_source"
    }

    fn description(&self) -> &str {
        "Add a source reference to the Sources section of a topic note. Only when the learner names a source."
    }

    fn parameters_schema(&self) -> Value {
        schema_for_args::<SourceArgs>()
    }

    fn writes_topic(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value) -> Result<ToolOutput, ToolError> {
        let args: SourceArgs = parse_args(self.name(), args)?;
        let topic = args.topic.clone();
        let added = blocking(&self.store, move |s| s.add_source(&args.topic, &args.source)).await?;
        Ok(if added {
            ToolOutput::text(format!("Source added to '{topic}'.")).with_effect(VaultEffect::SourceAdded)
        } else {
            ToolOutput::text(format!("Source already listed in '{topic}'."))
        })
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct RemoveSourceArgs {
    /// Topic slug
    topic: String,
    /// The source text to remove (partial match is fine)
    source: String,
}

vault_tool!(RemoveSourceTool);

#[async_trait]
impl Tool for RemoveSourceTool {
    fn name(&self) -> &str {
        "remove_source"
    }

    fn description(&self) -> &str {
        "Remove a source entry from the Sources section of a topic note. Use this immediately if a source was added by mistake."
    }

    fn parameters_schema(&self) -> Value {
        schema_for_args::<RemoveSourceArgs>()
    }

    fn writes_topic(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value) -> Result<ToolOutput, ToolError> {
        let args: RemoveSourceArgs = parse_args(self.name(), args)?;
        let (topic, source) = (args.topic.clone(), args.source.clone());
        let removed = blocking(&self.store, move |s| s.remove_source(&args.topic, &args.source)).await?;
        Ok(ToolOutput::text(if removed.is_empty() {
            format!("Source '{source}' not found in '{topic}'.")
        } else {
            format!("Removed from '{topic}':\n{}", removed.join("\n"))
        }))
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct RecordUnderstandingArgs {
    /// Topic slug
    topic: String,
    /// Concept name
    concept: String,
    /// Understanding level; the concept is removed from the other levels
    bucket: Bucket,
    /// Brief explanation of the learner's current understanding
    notes: Option<String>,
}

vault_tool!(RecordUnderstandingTool);

#[async_trait]
impl Tool for RecordUnderstandingTool {
    fn name(&self) -> &str {
        "record_understanding"
    }

    fn description(&self) -> &str {
        "Move a concept to an understanding level: 'Solid', 'Shaky' or 'Not Yet Engaged'. \
         The concept is removed from all other levels automatically."
    }

    fn parameters_schema(&self) -> Value {
        schema_for_args::<RecordUnderstandingArgs>()
    }

    fn writes_topic(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value) -> Result<ToolOutput, ToolError> {
        let args: RecordUnderstandingArgs = parse_args(self.name(), args)?;
        let (topic, concept, bucket) = (args.topic.clone(), args.concept.clone(), args.bucket);
        let change = blocking(&self.store, move |s| {
            s.record_understanding(&args.topic, &args.concept, args.bucket, args.notes.as_deref())
        })
        .await?;
        if !change.changed {
            return Ok(ToolOutput::text(format!("'{concept}' is already {bucket} in '{topic}'; nothing changed.")));
        }
        let text = match change.previous {
            Some(previous) if previous != bucket => {
                format!("'{concept}' moved from {previous} to {bucket} in '{topic}'.")
            }
            Some(_) => format!("'{concept}' updated in {bucket} in '{topic}'."),
            None => format!("'{concept}' recorded as {bucket} in '{topic}'."),
        };
        Ok(ToolOutput::text(text).with_effect(VaultEffect::Understanding { concept, bucket }))
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct LinkArgs {
    /// Concept that connects the two topics
    concept: String,
    /// Topic whose note records the link
    from_topic: String,
    /// Topic being linked to
    to_topic: String,
}

vault_tool!(LinkToTopicTool);

#[async_trait]
impl Tool for LinkToTopicTool {
    fn name(&self) -> &str {
        "link_to_topic"
    }

    fn description(&self) -> &str {
        "Record a cross-topic link: a concept in from_topic connects to to_topic."
    }

    fn parameters_schema(&self) -> Value {
        schema_for_args::<LinkArgs>()
    }

    async fn execute(&self, args: Value) -> Result<ToolOutput, ToolError> {
        let args: LinkArgs = parse_args(self.name(), args)?;
        let text = format!("Cross-topic link: [[{}]] in {} → {}.", args.concept, args.from_topic, args.to_topic);
        blocking(&self.store, move |s| s.link_to_topic(&args.concept, &args.from_topic, &args.to_topic)).await?;
        Ok(ToolOutput::text(text))
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct SynthesisArgs {
    /// Topic slug
    topic: String,
    /// Concept name in title case (e.g. "Beam Search")
    concept: String,
    /// The learner's explanation in their own words, verbatim or very lightly edited
    learner_text: String,
    /// Optional annotation: corrections or precision the learner missed. Brief and specific.
    assistant_note: Option<String>,
}

vault_tool!(AppendSynthesisTool);

#[async_trait]
impl Tool for AppendSynthesisTool {
    fn name(&self) -> &str {
        "append_synthesis"
    }

    fn description(&self) -> &str {
        "Capture the learner's explanation of a concept in their own words, optionally annotated. \
         Call this whenever the learner gives a substantive explanation. Use the learner's actual words. \
         Calling it again for the same concept replaces the entry, so merge old and new explanations."
    }

    fn parameters_schema(&self) -> Value {
        schema_for_args::<SynthesisArgs>()
    }

    fn writes_topic(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value) -> Result<ToolOutput, ToolError> {
        let args: SynthesisArgs = parse_args(self.name(), args)?;
        let (topic, concept) = (args.topic.clone(), args.concept.clone());
        let write = blocking(&self.store, move |s| {
            s.append_synthesis(&args.topic, &args.concept, &args.learner_text, args.assistant_note.as_deref())
        })
        .await?;
        let text = match write.previous {
            Some(previous) => format!("Synthesis entry for '{concept}' in '{topic}' replaced. Previous entry:\n\n{previous}"),
            None => format!("Synthesis entry added for '{concept}' in '{topic}'."),
        };
        Ok(ToolOutput::text(text).with_effect(VaultEffect::Synthesis))
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct SessionLogArgs {
    /// Topic slug
    topic: String,
    /// Session summary or key points
    entry: String,
}

vault_tool!(AppendSessionLogTool);

#[async_trait]
impl Tool for AppendSessionLogTool {
    fn name(&self) -> &str {
        "append_session_log"
    }

    fn description(&self) -> &str {
        "Append a dated entry to the Session Log section of a topic note."
    }

    fn parameters_schema(&self) -> Value {
        schema_for_args::<SessionLogArgs>()
    }

    fn writes_topic(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value) -> Result<ToolOutput, ToolError> {
        let args: SessionLogArgs = parse_args(self.name(), args)?;
        let topic = args.topic.clone();
        blocking(&self.store, move |s| s.append_session_log(&args.topic, &args.entry)).await?;
        Ok(ToolOutput::text(format!("Session log updated for '{topic}'.")))
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ProfileArgs {
    /// Full markdown content for the learner profile
    content: String,
}

vault_tool!(UpdateProfileTool);

#[async_trait]
impl Tool for UpdateProfileTool {
    fn name(&self) -> &str {
        "update_profile"
    }

    fn description(&self) -> &str {
        "Overwrite the learner profile with updated content. \
         Use this to record learner preferences, background, or metacognitive notes."
    }

    fn parameters_schema(&self) -> Value {
        schema_for_args::<ProfileArgs>()
    }

    async fn execute(&self, args: Value) -> Result<ToolOutput, ToolError> {
        let args: ProfileArgs = parse_args(self.name(), args)?;
        blocking(&self.store, move |s| s.update_profile(&args.content)).await?;
        Ok(ToolOutput::text("Learner profile updated."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> (tempfile::TempDir, Arc<VaultStore>) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(VaultStore::new(dir.path()));
        store.init().unwrap();
        (dir, store)
    }

    #[test]
    fn registry_declares_every_tool_in_order() {
        let (_dir, store) = store();
        let registry = build_vault_registry(store).unwrap();
        assert_eq!(registry.tool_names(), DECLARED_TOOLS);
        for spec in registry.specs() {
            assert_eq!(spec.parameters["type"], "object", "{}", spec.name);
        }
    }

    #[tokio::test]
    async fn record_understanding_reports_moves() {
        let (_dir, store) = store();
        let tool = RecordUnderstandingTool::new(Arc::clone(&store));
        let out = tool
            .execute(json!({"topic": "heaps", "concept": "heapify", "bucket": "Shaky"}))
            .await
            .unwrap();
        assert!(out.content.contains("recorded as Shaky"));
        let out = tool
            .execute(json!({"topic": "heaps", "concept": "heapify", "bucket": "Solid"}))
            .await
            .unwrap();
        assert!(out.content.contains("moved from Shaky to Solid"));
        assert_eq!(
            out.effect,
            Some(VaultEffect::Understanding {
                concept: "heapify".into(),
                bucket: Bucket::Solid
            })
        );
        let out = tool
            .execute(json!({"topic": "heaps", "concept": "heapify", "bucket": "Solid"}))
            .await
            .unwrap();
        assert!(out.content.contains("nothing changed"));
        assert_eq!(out.effect, None);
    }

    #[tokio::test]
    async fn read_note_does_not_create_topics() {
        let (_dir, store) = store();
        let out = ReadNoteTool::new(Arc::clone(&store))
            .execute(json!({"topic": "graphs"}))
            .await
            .unwrap();
        assert_eq!(out.content, "No note for 'graphs' yet.");
        assert!(!store.topic_exists("graphs"));
    }

    #[tokio::test]
    async fn invalid_topic_is_a_recoverable_error() {
        let (_dir, store) = store();
        let err = AddSourceTool::new(store)
            .execute(json!({"topic": "../etc", "source": "x"}))
            .await
            .unwrap_err();
        assert!(!err.is_fatal());
    }
}
