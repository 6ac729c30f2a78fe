//! 会话生命周期：本地指令、取消、连接器失败、开场回顾、结束整理、附件

mod common;

use std::time::Duration;

use common::{call, fixture, note_text, text, tools};
use serde_json::json;
use study::llm::{ConnectorError, MockStep};
use study::memory::Role;
use study::react::prompt::{FLUSH_PROMPT, RECAP_PROMPT};
use study::vault::Bucket;
use study::StudyError;

#[tokio::test]
async fn directives_never_reach_the_connector() {
    let mut fx = fixture("heaps", vec![]);
    for input in ["!status", "!graph", "!timeline", "!topics", "!help", "!add", "!bogus"] {
        let reply = fx.session.send(input).await.unwrap();
        assert!(reply.local, "{input} should be local");
        assert_eq!(reply.rounds, 0);
    }
    assert_eq!(fx.mock.call_count(), 0);
    assert_eq!(fx.session.exchanges(), 0);
    assert_eq!(fx.session.history().len(), 1);
}

#[tokio::test]
async fn connector_failure_preserves_history() {
    let mut fx = fixture(
        "heaps",
        vec![MockStep::Fail(ConnectorError::Network("connection refused".into()))],
    );
    let err = fx.session.send("what is a heap?").await.unwrap_err();
    assert!(matches!(err, StudyError::Connector(ConnectorError::Network(_))));

    let history = fx.session.history().messages();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].role, Role::User);
    assert_eq!(fx.store.lock_acquisitions(), 0);

    let reply = fx.session.send("retry").await.unwrap();
    assert_eq!(reply.text, "Echo from Mock: retry");
    let seen = &fx.mock.calls()[1].messages;
    assert!(seen.iter().any(|m| m.content == "what is a heap?"));
}

#[tokio::test]
async fn cancellation_interrupts_pending_connector_call() {
    let mut fx = fixture(
        "heaps",
        vec![
            tools("", vec![call("c1", "add_concept", json!({"topic": "heaps", "concept": "Heap"}))]),
            MockStep::Hang,
        ],
    );
    let cancel = fx.session.cancel_handle();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
    });

    let err = fx.session.send("heaps!").await.unwrap_err();

    assert!(matches!(err, StudyError::Cancelled));
    // 第一轮的工具已执行完毕并应答
    assert_eq!(fx.store.lock_acquisitions(), 1);
    assert!(note_text(&fx.store, "heaps").unwrap().contains("[[Heap]]"));
    fx.session.history().check_tool_pairing().unwrap();

    // 新的一轮使用新的取消令牌
    let reply = fx.session.send("go on").await.unwrap();
    assert_eq!(reply.text, "Echo from Mock: go on");
}

#[tokio::test]
async fn boot_recaps_only_when_prior_data_exists() {
    let mut fx = fixture("heaps", vec![text("Last time you covered heapify.")]);
    assert!(fx.session.boot().await.unwrap().is_none());
    assert_eq!(fx.mock.call_count(), 0);

    fx.store
        .record_understanding("heaps", "heapify", Bucket::Solid, None)
        .unwrap();
    let reply = fx.session.boot().await.unwrap().unwrap();
    assert_eq!(reply.text, "Last time you covered heapify.");
    let last_user = fx.mock.calls()[0]
        .messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.clone());
    assert_eq!(last_user.as_deref(), Some(RECAP_PROMPT));
    // 回顾不计入学习者的交流次数
    assert_eq!(fx.session.exchanges(), 0);
}

#[tokio::test]
async fn end_session_flushes_and_writes_daily_log() {
    let mut fx = fixture(
        "heaps",
        vec![
            text("Right."),
            tools(
                "",
                vec![call(
                    "f1",
                    "append_session_log",
                    json!({"topic": "heaps", "entry": "Covered heapify; sift-down still shaky."}),
                )],
            ),
            text(""),
        ],
    );
    fx.session.send("heapify runs bottom up").await.unwrap();

    let summary = fx.session.end_session().await.unwrap();

    assert_eq!(summary.topic, "heaps");
    assert_eq!((summary.exchanges, summary.words), (1, 4));
    let flush = &fx.mock.calls()[1].messages;
    assert_eq!(flush.last().map(|m| m.content.as_str()), Some(FLUSH_PROMPT));
    let note = note_text(&fx.store, "heaps").unwrap();
    assert!(note.contains("Covered heapify; sift-down still shaky."));
    let logs = fx.store.daily_logs(1).unwrap();
    assert_eq!(logs[0].entries, vec!["**heaps**: Covered heapify; sift-down still shaky."]);
}

#[tokio::test]
async fn end_session_without_exchanges_skips_flush() {
    let mut fx = fixture("heaps", vec![]);
    let summary = fx.session.end_session().await.unwrap();
    assert_eq!(summary.exchanges, 0);
    assert_eq!(fx.mock.call_count(), 0);
    let logs = fx.store.daily_logs(1).unwrap();
    assert_eq!(logs[0].entries, vec!["**heaps**: Session ended with no exchanges."]);
}

#[tokio::test]
async fn end_session_falls_back_when_no_log_entry_written() {
    let mut fx = fixture("heaps", vec![text("Sure."), text("")]);
    fx.session.send("a heap is a tree").await.unwrap();
    fx.session.end_session().await.unwrap();
    let logs = fx.store.daily_logs(1).unwrap();
    assert_eq!(logs[0].entries, vec!["**heaps**: 1 exchange(s) on 'heaps'."]);
}

#[tokio::test]
async fn staged_attachment_prefixes_next_message_once() {
    let mut fx = fixture("heaps", vec![text("Got it."), text("Sure.")]);
    let file = fx.dir.path().join("lecture.md");
    std::fs::write(&file, "Binary heaps support O(log n) insert.").unwrap();

    let staged = fx.session.send(&format!("!add {}", file.display())).await.unwrap();
    assert!(staged.local);
    fx.session.send("summarize this").await.unwrap();
    fx.session.send("and again").await.unwrap();

    let calls = fx.mock.calls();
    let first = calls[0].messages.last().unwrap();
    assert!(first.content.starts_with("[Attached: lecture.md]\nBinary heaps support O(log n) insert."));
    assert!(first.content.ends_with("summarize this"));
    assert_eq!(calls[1].messages.last().unwrap().content, "and again");
}

#[tokio::test]
async fn topic_argument_is_corrected_to_session_topic() {
    let mut fx = fixture(
        "heaps",
        vec![
            tools("", vec![call("c1", "add_concept", json!({"topic": "Heapify", "concept": "Heapify"}))]),
            text("Noted."),
        ],
    );
    fx.session.send("heapify is linear").await.unwrap();
    assert!(!fx.store.topic_exists("Heapify"));
    assert!(note_text(&fx.store, "heaps").unwrap().contains("[[Heapify]]"));
    let tool_msg = fx.session.history().messages().iter().find(|m| m.role == Role::Tool).unwrap();
    assert!(tool_msg.content.starts_with("[auto-corrected topic 'Heapify' → 'heaps']"));
}
