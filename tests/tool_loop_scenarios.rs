//! 工具循环端到端场景：纯文本回复、桶移动、未知工具、连接器超时、轮次上限、致命写入错误

mod common;

use common::{call, fixture, note_text, text, tools};
use serde_json::json;
use study::llm::{ConnectorError, MockStep};
use study::memory::Role;
use study::react::MAX_TOOL_ROUNDS;
use study::vault::Bucket;
use study::StudyError;

#[tokio::test]
async fn plain_question_returns_content_without_touching_vault() {
    let mut fx = fixture("heaps", vec![text("A heap is a tree with an ordering property. What made you ask?")]);

    let reply = fx.session.send("what is a heap?").await.unwrap();

    assert_eq!(reply.text, "A heap is a tree with an ordering property. What made you ask?");
    assert_eq!((reply.rounds, reply.truncated, reply.local), (1, false, false));
    assert_eq!(fx.store.lock_acquisitions(), 0);
    assert!(note_text(&fx.store, "heaps").is_none());
    fx.session.history().check_tool_pairing().unwrap();
}

#[tokio::test]
async fn record_understanding_moves_concept_then_stops() {
    let mut fx = fixture(
        "heaps",
        vec![
            tools(
                "",
                vec![call(
                    "c1",
                    "record_understanding",
                    json!({"topic": "heaps", "concept": "heapify", "bucket": "Solid"}),
                )],
            ),
            text("Exactly."),
        ],
    );
    fx.store
        .record_understanding("heaps", "heapify", Bucket::Shaky, Some("confused about sift direction"))
        .unwrap();
    let locks_before = fx.store.lock_acquisitions();

    let reply = fx.session.send("heapify builds the heap bottom-up in O(n)").await.unwrap();

    assert_eq!(reply.text, "Exactly.");
    assert_eq!(reply.rounds, 2);
    assert_eq!(fx.store.lock_acquisitions() - locks_before, 1);
    let note = fx.store.read_topic("heaps").unwrap().unwrap();
    assert_eq!(note.bucket_of("heapify"), Some(Bucket::Solid));
    assert!(note.bucket(Bucket::Shaky).is_empty());
    assert_eq!(fx.session.stats().understanding_updates, vec![("heapify".to_string(), Bucket::Solid)]);

    let tool_msg = fx
        .session
        .history()
        .messages()
        .iter()
        .find(|m| m.role == Role::Tool)
        .unwrap();
    assert_eq!(tool_msg.tool_call_id.as_deref(), Some("c1"));
    fx.session.history().check_tool_pairing().unwrap();
}

#[tokio::test]
async fn unknown_tool_is_fed_back_and_loop_continues() {
    let mut fx = fixture(
        "heaps",
        vec![
            tools("", vec![call("c1", "delete_everything", json!({}))]),
            text("I can't do that, but let's keep going."),
        ],
    );

    let reply = fx.session.send("wipe my notes").await.unwrap();

    assert_eq!(reply.rounds, 2);
    assert_eq!(fx.store.lock_acquisitions(), 0);
    let second_call = &fx.mock.calls()[1];
    let fed_back = second_call.messages.iter().find(|m| m.role == Role::Tool).unwrap();
    assert!(fed_back.content.starts_with("Error: unknown tool 'delete_everything'"));
    assert!(fed_back.content.contains("read_note"));
}

#[tokio::test]
async fn timeout_on_third_round_keeps_earlier_writes_only() {
    let mut fx = fixture(
        "heaps",
        vec![
            tools("", vec![call("c1", "add_concept", json!({"topic": "heaps", "concept": "Heap"}))]),
            tools("", vec![call("c2", "add_source", json!({"topic": "heaps", "source": "CLRS ch. 6"}))]),
            MockStep::Fail(ConnectorError::Timeout("no response within 120s".into())),
        ],
    );

    let err = fx.session.send("heaps are complete binary trees").await.unwrap_err();

    assert!(matches!(err, StudyError::Connector(ConnectorError::Timeout(_))));
    assert_eq!(fx.mock.call_count(), 3);
    assert_eq!(fx.store.lock_acquisitions(), 2);
    let note = note_text(&fx.store, "heaps").unwrap();
    assert!(note.contains("- [[Heap]]"));
    assert!(note.contains("- CLRS ch. 6"));
    let last = fx.session.history().last().unwrap();
    assert_eq!(last.role, Role::Tool);
    fx.session.history().check_tool_pairing().unwrap();

    // 后续输入仍可正常进行
    let reply = fx.session.send("still there?").await.unwrap();
    assert_eq!(reply.text, "Echo from Mock: still there?");
}

#[tokio::test]
async fn misbehaving_model_is_stopped_at_round_cap() {
    let steps = (1..=MAX_TOOL_ROUNDS + 1)
        .map(|i| {
            tools(
                &format!("round {i}"),
                vec![call(
                    &format!("c{i}"),
                    "add_concept",
                    json!({"topic": "heaps", "concept": format!("Concept {i}")}),
                )],
            )
        })
        .collect();
    let mut fx = fixture("heaps", steps);

    let reply = fx.session.send("go").await.unwrap();

    assert!(reply.truncated);
    assert_eq!(reply.rounds, MAX_TOOL_ROUNDS);
    assert_eq!(reply.text, format!("round {MAX_TOOL_ROUNDS}"));
    assert_eq!(fx.mock.call_count(), MAX_TOOL_ROUNDS);
    assert_eq!(fx.mock.remaining(), 1);
    let note = note_text(&fx.store, "heaps").unwrap();
    for i in 1..=MAX_TOOL_ROUNDS {
        assert!(note.contains(&format!("[[Concept {i}]]")), "missing concept {i}");
    }
    assert!(!note.contains(&format!("[[Concept {}]]", MAX_TOOL_ROUNDS + 1)));
    assert_eq!(fx.session.stats().concepts_added, MAX_TOOL_ROUNDS);
    fx.session.history().check_tool_pairing().unwrap();
}

#[tokio::test]
async fn invalid_arguments_at_round_cap_surface_as_error() {
    let steps = (1..=MAX_TOOL_ROUNDS)
        .map(|i| tools("", vec![call(&format!("c{i}"), "record_understanding", json!({"concept": "heapify"}))]))
        .collect();
    let mut fx = fixture("heaps", steps);

    let err = fx.session.send("go").await.unwrap_err();

    match err {
        StudyError::ToolValidation { tool, detail } => {
            assert_eq!(tool, "record_understanding");
            assert!(detail.contains("bucket"));
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(fx.store.lock_acquisitions(), 0);
    fx.session.history().check_tool_pairing().unwrap();
}

#[tokio::test]
async fn tool_specs_are_sent_in_registration_order_every_round() {
    let mut fx = fixture(
        "heaps",
        vec![tools("", vec![call("c1", "list_topics", json!({}))]), text("ok")],
    );
    fx.session.send("what do I have?").await.unwrap();
    let calls = fx.mock.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].tool_names, study::tools::DECLARED_TOOLS);
    assert_eq!(calls[0].tool_names, calls[1].tool_names);
}

#[tokio::test]
async fn fatal_vault_error_ends_turn_and_seals_remaining_calls() {
    let mut fx = fixture(
        "heaps",
        vec![
            tools(
                "",
                vec![
                    call("c1", "add_source", json!({"topic": "heaps", "source": "CLRS ch. 6"})),
                    call("c2", "add_concept", json!({"topic": "heaps", "concept": "Heap"})),
                ],
            ),
            text("should never be requested"),
        ],
    );
    let path = fx.store.topic_path("heaps").unwrap();
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let broken = "no frontmatter here\n## Sources\n";
    std::fs::write(&path, broken).unwrap();

    let err = fx.session.send("add my textbook").await.unwrap_err();

    assert!(matches!(err, StudyError::VaultConsistency(_)), "unexpected error {err:?}");
    assert_eq!(fx.mock.call_count(), 1);
    assert_eq!(fx.mock.remaining(), 1);
    assert_eq!(fx.store.lock_acquisitions(), 1);
    assert_eq!(std::fs::read_to_string(&path).unwrap(), broken);

    let replies: Vec<_> = fx
        .session
        .history()
        .messages()
        .iter()
        .filter(|m| m.role == Role::Tool)
        .collect();
    assert_eq!(replies.len(), 2);
    assert_eq!(replies[0].tool_call_id.as_deref(), Some("c1"));
    assert!(replies[0].content.starts_with("Error:"));
    assert_eq!(replies[1].tool_call_id.as_deref(), Some("c2"));
    assert!(replies[1].content.contains("nothing was written"));
    fx.session.history().check_tool_pairing().unwrap();
}
