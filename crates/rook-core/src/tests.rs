// Copyright (c) 2024-2026 Rook Contributors
//
// SPDX-License-Identifier: Apache-2.0
//! End-to-end tests for the agent runtime, driven by the scripted model so
//! every scenario is deterministic and needs no network access.
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use rook_config::Settings;
use rook_model::{
    Message, MessagePayload, MessageSource, ScriptedModel, ScriptedReply, ToolCallMsg,
};
use rook_tools::{ApprovalGate, Tool, ToolInvocation, ToolManager, ToolOutput, ToolRegistry};

use crate::{
    agent::{Agent, ApprovalDecider, ApprovalDecision},
    compact::Compactor,
    driver::{DriverError, Outcome, ReactDriver, CANCELLED_BY_USER},
    events::AgentEvent,
    persist::MemoryHistory,
    store::MessageStore,
    AutoApprove,
};

// ── Helpers ───────────────────────────────────────────────────────────────────

fn test_settings(dir: &std::path::Path) -> Settings {
    Settings {
        backend: "mock".into(),
        working_dir: dir.to_string_lossy().into_owned(),
        max_iterations: 25,
        enable_thinking: true,
        ..Settings::default()
    }
}

fn agent_with(model: ScriptedModel, dir: &std::path::Path) -> Agent {
    Agent::new(
        &test_settings(dir),
        Arc::new(model),
        Box::new(MemoryHistory),
    )
    .unwrap()
}

fn args(pairs: &[(&str, Value)]) -> Map<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

/// Drain all buffered events after the invoke returned.
fn drain(rx: &mut mpsc::Receiver<AgentEvent>) -> Vec<AgentEvent> {
    let mut events = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        events.push(ev);
    }
    events
}

fn channel() -> (mpsc::Sender<AgentEvent>, mpsc::Receiver<AgentEvent>) {
    mpsc::channel(256)
}

struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }
    fn description(&self) -> &str {
        "echoes"
    }
    fn parameters_schema(&self) -> Value {
        json!({"type": "object"})
    }
    async fn execute(&self, call: &ToolInvocation) -> ToolOutput {
        let what = call.args.get("what").and_then(Value::as_str).unwrap_or("?");
        ToolOutput::ok(&call.call_id, format!("echo:{what}"))
    }
}

fn echo_driver(model: ScriptedModel, max_iterations: u32) -> ReactDriver {
    let model = Arc::new(model);
    let mut reg = ToolRegistry::new();
    reg.register(EchoTool);
    let store = Arc::new(RwLock::new(MessageStore::in_memory()));
    ReactDriver::new(
        Arc::clone(&model) as Arc<dyn rook_model::LanguageModel>,
        Some(Arc::new(reg) as Arc<dyn ToolManager>),
        store,
        Compactor::new(model, 1_000_000),
        ApprovalGate::new(vec!["ls".into()]),
        max_iterations,
        false,
    )
}

// ── S1: simple question and answer ────────────────────────────────────────────

#[tokio::test]
async fn simple_qa_returns_terminal_answer() {
    let dir = tempfile::tempdir().unwrap();
    let mut agent = agent_with(ScriptedModel::always_text("hi"), dir.path());
    let (tx, mut rx) = channel();

    let reply = agent
        .invoke("code", "hello", vec![], tx, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(reply.text(), Some("hi"));

    let store = agent.store();
    let guard = store.read().unwrap();
    let user: Vec<_> = guard
        .messages()
        .iter()
        .filter(|m| matches!(m.payload, MessagePayload::UserChat { .. }))
        .collect();
    assert_eq!(user.len(), 1);
    assert_eq!(user[0].text(), Some("hello"));
    assert!(guard.messages().iter().all(|m| !m.is_tool_call()));

    let events = drain(&mut rx);
    assert!(events
        .iter()
        .any(|e| matches!(e, AgentEvent::Response(m) if m.text() == Some("hi"))));
}

#[tokio::test]
async fn skill_prompt_and_catalog_injected_once() {
    let dir = tempfile::tempdir().unwrap();
    let model = ScriptedModel::new(vec![
        ScriptedReply::of(Message::assistant("one")),
        ScriptedReply::of(Message::assistant("two")),
    ]);
    let mut agent = agent_with(model, dir.path());

    let (tx, _rx) = channel();
    agent
        .invoke("code", "same input", vec![], tx.clone(), CancellationToken::new())
        .await
        .unwrap();
    agent
        .invoke("code", "same input", vec![], tx, CancellationToken::new())
        .await
        .unwrap();

    let store = agent.store();
    let guard = store.read().unwrap();
    let catalogs = guard
        .messages()
        .iter()
        .filter(|m| {
            m.text()
                .map(|t| t.starts_with(rook_skills::CATALOG_MARKER))
                .unwrap_or(false)
        })
        .count();
    assert_eq!(catalogs, 1, "catalog injected exactly once for same content");

    let prompts = guard
        .messages()
        .iter()
        .filter(|m| {
            m.text()
                .map(|t| t.starts_with("[[SKILL_PROMPT:code]]"))
                .unwrap_or(false)
        })
        .count();
    assert_eq!(prompts, 1, "same input renders the same prompt — no duplicate");
}

#[tokio::test]
async fn changed_input_replaces_stale_skill_prompt() {
    // The rendered prompt differs per input (the arguments trailer), so a
    // second turn must replace the first prompt message, not add another.
    let dir = tempfile::tempdir().unwrap();
    let model = ScriptedModel::new(vec![
        ScriptedReply::of(Message::assistant("one")),
        ScriptedReply::of(Message::assistant("two")),
    ]);
    let mut agent = agent_with(model, dir.path());

    let (tx, _rx) = channel();
    agent
        .invoke("code", "first input", vec![], tx.clone(), CancellationToken::new())
        .await
        .unwrap();
    agent
        .invoke("code", "second input", vec![], tx, CancellationToken::new())
        .await
        .unwrap();

    let store = agent.store();
    let guard = store.read().unwrap();
    let prompts: Vec<&str> = guard
        .messages()
        .iter()
        .filter_map(|m| m.text())
        .filter(|t| t.starts_with("[[SKILL_PROMPT:code]]"))
        .collect();
    assert_eq!(prompts.len(), 1, "stale prompt variant must be replaced");
    assert!(prompts[0].contains("second input"));
}

#[tokio::test]
async fn unknown_skill_is_a_validation_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut agent = agent_with(ScriptedModel::always_text("x"), dir.path());
    let (tx, _rx) = channel();
    let err = agent
        .invoke("no-such-skill", "q", vec![], tx, CancellationToken::new())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("unknown skill"));
}

// ── S2: single tool round-trip ────────────────────────────────────────────────

#[tokio::test]
async fn tool_round_trip_pairs_call_and_result() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("x"), "contents").unwrap();
    let model = ScriptedModel::tool_then_text(
        "c1",
        "read_file",
        args(&[("path", json!("x"))]),
        "done",
    );
    let mut agent = agent_with(model, dir.path());
    let (tx, mut rx) = channel();

    let reply = agent
        .invoke("code", "read x", vec![], tx, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(reply.text(), Some("done"));

    let store = agent.store();
    let guard = store.read().unwrap();
    let call_idx = guard
        .messages()
        .iter()
        .position(|m| m.tool_call_ids() == vec!["c1"])
        .expect("tool call recorded");
    let result_idx = guard
        .messages()
        .iter()
        .position(|m| m.result_call_id() == Some("c1"))
        .expect("tool result recorded");
    assert!(call_idx < result_idx);
    match &guard.messages()[result_idx].payload {
        MessagePayload::ToolResult { text, error, .. } => {
            assert!(text.contains("contents"));
            assert!(error.is_empty());
        }
        other => panic!("wrong payload: {other:?}"),
    }
    assert!(
        guard
            .messages()
            .iter()
            .all(|m| m.source != MessageSource::Situation),
        "no situation message survives the run"
    );

    // Event order: start → result → response.
    let events = drain(&mut rx);
    let start = events
        .iter()
        .position(|e| matches!(e, AgentEvent::ToolCallStart { tool_name, .. } if tool_name == "read_file"));
    let result = events
        .iter()
        .position(|e| matches!(e, AgentEvent::ToolResult { .. }));
    let response = events
        .iter()
        .position(|e| matches!(e, AgentEvent::Response(_)));
    assert!(start.unwrap() < result.unwrap());
    assert!(result.unwrap() < response.unwrap());
}

#[tokio::test]
async fn thinking_deltas_forwarded_as_events() {
    let dir = tempfile::tempdir().unwrap();
    let model = ScriptedModel::new(vec![ScriptedReply::of(Message::assistant("ok"))
        .with_thinking(&["first", "second"])]);
    let mut agent = agent_with(model, dir.path());
    let (tx, mut rx) = channel();

    agent
        .invoke("code", "q", vec![], tx, CancellationToken::new())
        .await
        .unwrap();
    let deltas: Vec<String> = drain(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            AgentEvent::ThinkingDelta(t) => Some(t),
            _ => None,
        })
        .collect();
    assert_eq!(deltas, vec!["first", "second"]);
}

// ── S3: approval flow ─────────────────────────────────────────────────────────

struct Scripted {
    decisions: Mutex<Vec<ApprovalDecision>>,
    staged: Mutex<Vec<String>>,
}

#[async_trait]
impl ApprovalDecider for Scripted {
    async fn decide(&self, _call_id: &str, tool_name: &str) -> ApprovalDecision {
        self.staged.lock().unwrap().push(tool_name.to_string());
        self.decisions
            .lock()
            .unwrap()
            .pop()
            .unwrap_or(ApprovalDecision::Approve)
    }
}

#[tokio::test]
async fn declined_write_yields_cancelled_result_and_continues() {
    let dir = tempfile::tempdir().unwrap();
    let model = ScriptedModel::new(vec![
        ScriptedReply::of(Message::tool_call(
            "w1",
            "write_file",
            args(&[("path", json!("f")), ("content", json!("data"))]),
        )),
        ScriptedReply::of(Message::assistant("understood, not writing")),
    ]);
    let decider = Arc::new(Scripted {
        decisions: Mutex::new(vec![ApprovalDecision::Deny]),
        staged: Mutex::new(vec![]),
    });
    let mut agent = agent_with(model, dir.path()).with_decider(decider.clone());
    let (tx, mut rx) = channel();

    let reply = agent
        .invoke("code", "write the file", vec![], tx, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(reply.text(), Some("understood, not writing"));
    assert_eq!(*decider.staged.lock().unwrap(), vec!["write_file"]);

    let store = agent.store();
    let guard = store.read().unwrap();
    let declined = guard
        .messages()
        .iter()
        .find(|m| m.result_call_id() == Some("w1"))
        .expect("declined call still paired");
    match &declined.payload {
        MessagePayload::ToolResult { error, .. } => assert_eq!(error, CANCELLED_BY_USER),
        other => panic!("wrong payload: {other:?}"),
    }
    assert!(!dir.path().join("f").exists(), "file was never written");

    let events = drain(&mut rx);
    assert!(events
        .iter()
        .any(|e| matches!(e, AgentEvent::WaitingForApproval { tool_name, .. } if tool_name == "write_file")));
}

#[tokio::test]
async fn approved_write_executes() {
    let dir = tempfile::tempdir().unwrap();
    let model = ScriptedModel::new(vec![
        ScriptedReply::of(Message::tool_call(
            "w1",
            "write_file",
            args(&[("path", json!("approved.txt")), ("content", json!("yes"))]),
        )),
        ScriptedReply::of(Message::assistant("written")),
    ]);
    let decider = Arc::new(Scripted {
        decisions: Mutex::new(vec![ApprovalDecision::Approve]),
        staged: Mutex::new(vec![]),
    });
    let mut agent = agent_with(model, dir.path()).with_decider(decider);
    let (tx, _rx) = channel();

    agent
        .invoke("code", "write it", vec![], tx, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(
        std::fs::read_to_string(dir.path().join("approved.txt")).unwrap(),
        "yes"
    );
}

#[tokio::test]
async fn whitelisted_bash_skips_the_gate() {
    let dir = tempfile::tempdir().unwrap();
    let model = ScriptedModel::new(vec![
        ScriptedReply::of(Message::tool_call(
            "b1",
            "bash",
            args(&[("command", json!("ls"))]),
        )),
        ScriptedReply::of(Message::assistant("listed")),
    ]);
    // A decider that would fail the test if consulted.
    struct Panicking;
    #[async_trait]
    impl ApprovalDecider for Panicking {
        async fn decide(&self, _c: &str, _t: &str) -> ApprovalDecision {
            panic!("whitelisted command must not reach the decider");
        }
    }
    let mut agent = agent_with(model, dir.path()).with_decider(Arc::new(Panicking));
    let (tx, _rx) = channel();
    let reply = agent
        .invoke("code", "list", vec![], tx, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(reply.text(), Some("listed"));
}

// ── S5: skill tool filter ─────────────────────────────────────────────────────

#[tokio::test]
async fn respond_skill_denies_write_file_in_band() {
    let dir = tempfile::tempdir().unwrap();
    let model = ScriptedModel::new(vec![
        ScriptedReply::of(Message::tool_call(
            "w1",
            "write_file",
            args(&[("path", json!("f")), ("content", json!("x"))]),
        )),
        ScriptedReply::of(Message::assistant("cannot write")),
    ]);
    let mut agent = agent_with(model, dir.path());
    let (tx, _rx) = channel();

    let reply = agent
        .invoke("respond", "please write", vec![], tx, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(reply.text(), Some("cannot write"));

    let store = agent.store();
    let guard = store.read().unwrap();
    let denial = guard
        .messages()
        .iter()
        .find(|m| m.result_call_id() == Some("w1"))
        .unwrap();
    match &denial.payload {
        MessagePayload::ToolResult { error, .. } => {
            assert_eq!(error, "tool 'write_file' is not allowed by the active skill");
        }
        other => panic!("wrong payload: {other:?}"),
    }
    assert!(!dir.path().join("f").exists());
}

#[tokio::test]
async fn filtered_schema_list_reaches_the_model() {
    let dir = tempfile::tempdir().unwrap();
    let model = ScriptedModel::always_text("ok");
    let last_tools = Arc::clone(&model.last_tools);
    let mut agent = agent_with(model, dir.path());
    let (tx, _rx) = channel();
    agent
        .invoke("respond", "q", vec![], tx, CancellationToken::new())
        .await
        .unwrap();
    let names = last_tools.lock().unwrap().clone();
    assert_eq!(names, vec!["glob", "read_file", "todo_write"]);
}

// ── Batches ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn batch_children_execute_in_order_before_next_turn() {
    let batch = Message::tool_call_batch(vec![
        ToolCallMsg {
            call_id: "b1".into(),
            tool_name: "echo".into(),
            args: args(&[("what", json!("one"))]),
        },
        ToolCallMsg {
            call_id: "b2".into(),
            tool_name: "echo".into(),
            args: args(&[("what", json!("two"))]),
        },
        ToolCallMsg {
            call_id: "b3".into(),
            tool_name: "echo".into(),
            args: args(&[("what", json!("three"))]),
        },
    ]);
    let model = ScriptedModel::new(vec![
        ScriptedReply::of(batch),
        ScriptedReply::of(Message::assistant("all done")),
    ]);
    let mut driver = echo_driver(model, 10);
    let (tx, mut rx) = channel();

    let outcome = driver
        .run("go", vec![], &tx, &CancellationToken::new())
        .await
        .unwrap();
    let Outcome::Completed(msg) = outcome else {
        panic!("expected completion");
    };
    assert_eq!(msg.text(), Some("all done"));

    let events = drain(&mut rx);
    let result_ids: Vec<String> = events
        .iter()
        .filter_map(|e| match e {
            AgentEvent::ToolResult { call_id, .. } => Some(call_id.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(result_ids, vec!["b1", "b2", "b3"], "N children → N results in order");
}

// ── Iteration cap ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn iteration_cap_returns_loop_limit_error() {
    let replies: Vec<ScriptedReply> = (0..10)
        .map(|i| ScriptedReply::of(Message::reasoning(format!("thinking more ({i})"))))
        .collect();
    let mut driver = echo_driver(ScriptedModel::new(replies), 3);
    let (tx, _rx) = channel();

    let err = driver
        .run("loop forever", vec![], &tx, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, DriverError::IterationLimit(3)));
    assert!(err.to_string().contains("exceeded maximum loop limit"));
}

// ── Cancellation ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn pre_cancelled_token_returns_cancelled_without_model_call() {
    let mut driver = echo_driver(ScriptedModel::always_text("never"), 10);
    let (tx, _rx) = channel();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = driver.run("q", vec![], &tx, &cancel).await.unwrap_err();
    assert!(matches!(err, DriverError::Cancelled));
}

#[tokio::test]
async fn cancellation_before_tool_child_preserves_history() {
    // The model emits a tool call; the token is cancelled after the first
    // model turn via a tool that cancels it — simulate by cancelling
    // between run attempts: use a batch whose first child cancels.
    struct CancellingTool {
        token: CancellationToken,
    }
    #[async_trait]
    impl Tool for CancellingTool {
        fn name(&self) -> &str {
            "trip"
        }
        fn description(&self) -> &str {
            "cancels the token"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }
        async fn execute(&self, call: &ToolInvocation) -> ToolOutput {
            self.token.cancel();
            ToolOutput::ok(&call.call_id, "tripped")
        }
    }

    let cancel = CancellationToken::new();
    let batch = Message::tool_call_batch(vec![
        ToolCallMsg {
            call_id: "t1".into(),
            tool_name: "trip".into(),
            args: Map::new(),
        },
        ToolCallMsg {
            call_id: "t2".into(),
            tool_name: "trip".into(),
            args: Map::new(),
        },
    ]);
    let model = Arc::new(ScriptedModel::new(vec![ScriptedReply::of(batch)]));
    let mut reg = ToolRegistry::new();
    reg.register(CancellingTool {
        token: cancel.clone(),
    });
    let store = Arc::new(RwLock::new(MessageStore::in_memory()));
    let mut driver = ReactDriver::new(
        Arc::clone(&model) as Arc<dyn rook_model::LanguageModel>,
        Some(Arc::new(reg) as Arc<dyn ToolManager>),
        Arc::clone(&store),
        Compactor::new(model, 1_000_000),
        ApprovalGate::default(),
        10,
        false,
    );
    let (tx, _rx) = channel();

    let err = driver.run("go", vec![], &tx, &cancel).await.unwrap_err();
    assert!(matches!(err, DriverError::Cancelled));

    let guard = store.read().unwrap();
    // First child ran and its result is recorded; the second was never
    // started and no partial result exists for it.
    assert!(guard.messages().iter().any(|m| m.result_call_id() == Some("t1")));
    assert!(guard.messages().iter().all(|m| m.result_call_id() != Some("t2")));
}

// ── Tool manager failure ──────────────────────────────────────────────────────

#[tokio::test]
async fn manager_infrastructure_error_becomes_in_band_result() {
    struct FailingManager;
    #[async_trait]
    impl ToolManager for FailingManager {
        fn tools(&self) -> Vec<rook_tools::ToolSchema> {
            vec![rook_tools::ToolSchema {
                name: "flaky".into(),
                description: "d".into(),
                parameters: json!({"type": "object"}),
            }]
        }
        async fn call(&self, _i: &ToolInvocation) -> anyhow::Result<ToolOutput> {
            anyhow::bail!("transport exploded")
        }
    }

    let model = Arc::new(ScriptedModel::new(vec![
        ScriptedReply::of(Message::tool_call("f1", "flaky", Map::new())),
        ScriptedReply::of(Message::assistant("recovered")),
    ]));
    let store = Arc::new(RwLock::new(MessageStore::in_memory()));
    let mut driver = ReactDriver::new(
        Arc::clone(&model) as Arc<dyn rook_model::LanguageModel>,
        Some(Arc::new(FailingManager) as Arc<dyn ToolManager>),
        Arc::clone(&store),
        Compactor::new(model, 1_000_000),
        ApprovalGate::default(),
        10,
        false,
    );
    let (tx, _rx) = channel();

    let outcome = driver
        .run("go", vec![], &tx, &CancellationToken::new())
        .await
        .unwrap();
    assert!(matches!(outcome, Outcome::Completed(_)), "loop continued past the failure");

    let guard = store.read().unwrap();
    let result = guard
        .messages()
        .iter()
        .find(|m| m.result_call_id() == Some("f1"))
        .unwrap();
    match &result.payload {
        MessagePayload::ToolResult { error, .. } => {
            assert!(error.starts_with("Tool execution failed:"));
            assert!(error.contains("transport exploded"));
        }
        other => panic!("wrong payload: {other:?}"),
    }
}

// ── Pairing invariant under the full pipeline ────────────────────────────────

#[tokio::test]
async fn call_and_result_counts_balance_after_full_run() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a"), "A").unwrap();
    std::fs::write(dir.path().join("b"), "B").unwrap();
    let model = ScriptedModel::new(vec![
        ScriptedReply::of(Message::tool_call("r1", "read_file", args(&[("path", json!("a"))]))),
        ScriptedReply::of(Message::tool_call("r2", "read_file", args(&[("path", json!("b"))]))),
        ScriptedReply::of(Message::assistant("read both")),
    ]);
    let mut agent = agent_with(model, dir.path());
    let (tx, _rx) = channel();
    agent
        .invoke("code", "read them", vec![], tx, CancellationToken::new())
        .await
        .unwrap();

    let store = agent.store();
    let guard = store.read().unwrap();
    use std::collections::HashMap;
    let mut calls: HashMap<String, i32> = HashMap::new();
    for m in guard.messages() {
        for id in m.tool_call_ids() {
            *calls.entry(id.to_string()).or_default() += 1;
        }
        if let Some(id) = m.result_call_id() {
            *calls.entry(id.to_string()).or_default() -= 1;
        }
    }
    assert!(
        calls.values().all(|v| *v == 0),
        "every call id pairs exactly once: {calls:?}"
    );
}

// ── AutoApprove used by server-style embeddings ──────────────────────────────

#[tokio::test]
async fn auto_approve_runs_gated_tools_without_interaction() {
    let dir = tempfile::tempdir().unwrap();
    let model = ScriptedModel::new(vec![
        ScriptedReply::of(Message::tool_call(
            "w1",
            "write_file",
            args(&[("path", json!("out.txt")), ("content", json!("auto"))]),
        )),
        ScriptedReply::of(Message::assistant("done")),
    ]);
    let mut agent = agent_with(model, dir.path()).with_decider(Arc::new(AutoApprove));
    let (tx, _rx) = channel();
    agent
        .invoke("code", "write", vec![], tx, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(
        std::fs::read_to_string(dir.path().join("out.txt")).unwrap(),
        "auto"
    );
}
