//! 系统提示词组装与会话内固定提示
//!
//! 系统提示在会话构造时组装一次：导师框架 + 学习者画像 + 主题笔记 + 已有子主题 + 角色说明。

/// 开场回顾（主题已有学习记录时发送）
pub const RECAP_PROMPT: &str = "Briefly summarize what the learner covered last session and what's in \
their synthesis notes. No question, just the recap.";

/// 会话结束时让模型整理笔记库
pub const FLUSH_PROMPT: &str = "Session ending. Call tools to finalize, no reply text needed:
1. `add_concept` for any concepts not yet recorded.
2. `record_understanding` for all concepts based on the full session.
3. `append_session_log` with a structured entry: what was covered, what the learner understands well, \
what's still shaky, what to revisit next session.
4. `update_profile` if you learned anything new about the learner.";

const ROLE_INSTRUCTIONS: &str = "## Your Role

You are a knowledge capture assistant. The learner thinks out loud and explains concepts to you.
Your job is to validate their thinking and organize it, not to teach, quiz, or lead the session.

### Step 1: Record (before writing any reply)

- `add_concept` for every concept mentioned
- `append_synthesis` if the learner gave a substantive explanation (two or more sentences in their
  own words); use their actual words verbatim and add `assistant_note` only for corrections
- `record_understanding` based on what their explanation demonstrates:
  - \"Solid\": explained correctly and completely
  - \"Shaky\": partially correct or incomplete
  - \"Not Yet Engaged\": mentioned but not explained
- `add_source` if they named a specific source
- `update_profile` if you learned something about their background or goals
- `link_to_topic` if a concept clearly belongs to another topic already in the vault

### Step 2: Respond (1-3 sentences)

- If correct: affirm briefly.
- If wrong or incomplete: correct the specific error once, clearly, without expanding.
- Do NOT summarize what they said back to them. Do NOT lecture.

### Step 3: Optional clarifying question

Ask ONE question only if something was ambiguous and a follow-up would get more of their own
words on paper. Never ask questions to test recall.

## Tool Rules

- `append_session_log`: ONLY when the message begins with \"Session ending.\", never mid-session
- `add_concept` links: other concept names this concept depends on, never the concept itself
  or the topic slug
- Always pass the session topic slug as `topic`, never a concept name";

/// 组装系统提示
pub fn system_prompt(
    framework: &str,
    profile: Option<&str>,
    topic: &str,
    topic_note: Option<&str>,
    subtopics: &[String],
) -> String {
    let profile = profile
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .unwrap_or("(no profile yet)");
    let note = topic_note
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or("(new topic, no notes yet)");
    let subtopics = if subtopics.is_empty() {
        "(none)".to_string()
    } else {
        subtopics.iter().map(|s| format!("- {s}")).collect::<Vec<_>>().join("\n")
    };
    format!(
        "{framework}\n\n---\n\n## Learner Profile\n{profile}\n\n---\n\n## Current Topic: {topic}\n\n{note}\n\n---\n\n\
## Existing Subtopics of {topic}\n\n{subtopics}\n\n---\n\n{ROLE_INSTRUCTIONS}\n",
        framework = framework.trim(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_placeholders_for_a_fresh_vault() {
        let prompt = system_prompt("# Framework", None, "heaps", None, &[]);
        assert!(prompt.starts_with("# Framework"));
        assert!(prompt.contains("## Learner Profile\n(no profile yet)"));
        assert!(prompt.contains("## Current Topic: heaps\n\n(new topic, no notes yet)"));
        assert!(prompt.contains("## Existing Subtopics of heaps\n\n(none)"));
        assert!(prompt.contains("record_understanding"));
    }

    #[test]
    fn lists_subtopics() {
        let subs = vec!["heaps/heapify".to_string(), "heaps/priority-queue".to_string()];
        let prompt = system_prompt("F", Some("Likes proofs."), "heaps", Some("---\ntopic: heaps\n---"), &subs);
        assert!(prompt.contains("- heaps/heapify\n- heaps/priority-queue"));
        assert!(prompt.contains("Likes proofs."));
    }

    #[test]
    fn flush_prompt_is_recognisable() {
        assert!(FLUSH_PROMPT.starts_with("Session ending."));
        assert!(ROLE_INSTRUCTIONS.contains("\"Session ending.\""));
    }
}
