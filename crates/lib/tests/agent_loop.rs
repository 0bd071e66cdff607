//! Integration tests: drive the engine with scripted fake models and closure-backed tools.
//! No Ollama server is needed.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use agentloop::agent::{Engine, EngineError, LoopState};
use agentloop::llm::{Model, ModelError};
use agentloop::message::{AssistantMessage, Message, ToolArgs, ToolCall};
use agentloop::session::{MemorySessionStore, Session, SessionStore};
use agentloop::tools::{FieldKind, InputSchema, Tool, ToolError, ToolRegistry, ToolSpec};
use async_trait::async_trait;
use serde_json::json;

enum Step {
    Reply(AssistantMessage),
    Fail(&'static str),
    Slow(Duration, AssistantMessage),
}

/// Replays a fixed script and records every transcript it was shown.
#[derive(Default)]
struct ScriptedModel {
    steps: Mutex<VecDeque<Step>>,
    seen: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedModel {
    fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into()),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn seen(&self) -> Vec<Vec<Message>> {
        self.seen.lock().expect("seen lock").clone()
    }
}

#[async_trait]
impl Model for ScriptedModel {
    async fn invoke(
        &self,
        transcript: &[Message],
        _tools: &[ToolSpec],
    ) -> Result<AssistantMessage, ModelError> {
        self.seen.lock().expect("seen lock").push(transcript.to_vec());
        let step = self.steps.lock().expect("steps lock").pop_front();
        match step {
            Some(Step::Reply(m)) => Ok(m),
            Some(Step::Fail(e)) => Err(ModelError::Api(e.to_string())),
            Some(Step::Slow(d, m)) => {
                tokio::time::sleep(d).await;
                Ok(m)
            }
            None => Err(ModelError::Api("script exhausted".to_string())),
        }
    }
}

/// Stateless model: a human message triggers one `echo` call, a tool result is answered.
/// With `always_call`, it never stops calling tools.
#[derive(Default)]
struct EchoModel {
    next_id: AtomicU64,
    always_call: bool,
}

#[async_trait]
impl Model for EchoModel {
    async fn invoke(
        &self,
        transcript: &[Message],
        _tools: &[ToolSpec],
    ) -> Result<AssistantMessage, ModelError> {
        tokio::task::yield_now().await;
        match transcript.last() {
            Some(Message::ToolResult { text, .. }) if !self.always_call => {
                Ok(AssistantMessage::text(format!("done: {}", text)))
            }
            Some(last) => {
                let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                Ok(AssistantMessage::with_tool_calls(
                    "",
                    vec![call(&format!("e{}", id), "echo", json!({"text": last.text()}))],
                ))
            }
            None => Err(ModelError::Api("empty transcript".to_string())),
        }
    }
}

fn args(v: serde_json::Value) -> ToolArgs {
    v.as_object().cloned().unwrap_or_default()
}

fn call(id: &str, name: &str, v: serde_json::Value) -> ToolCall {
    ToolCall::new(id, name, args(v))
}

fn registry() -> Arc<ToolRegistry> {
    let mut reg = ToolRegistry::new();
    reg.register(Tool::from_fn(
        "search",
        "Search for a query",
        InputSchema::new().required("q", FieldKind::String, "Query"),
        |_args| async { Ok("result text".to_string()) },
    ))
    .expect("register search");
    reg.register(Tool::from_fn(
        "echo",
        "Echo text back",
        InputSchema::new().required("text", FieldKind::String, "Text"),
        |args| async move {
            Ok(args
                .get("text")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string())
        },
    ))
    .expect("register echo");
    reg.register(Tool::from_fn(
        "sleep",
        "Sleep then report",
        InputSchema::new().required("ms", FieldKind::Integer, "Milliseconds"),
        |args| async move {
            let ms = args.get("ms").and_then(|v| v.as_u64()).unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok(format!("slept {}", ms))
        },
    ))
    .expect("register sleep");
    reg.register(Tool::from_fn(
        "fail",
        "Always fails",
        InputSchema::new(),
        |_args| async {
            Err(ToolError::Command {
                status: "exit status: 2".to_string(),
                stdout: "partial".to_string(),
                stderr: "no such file".to_string(),
            })
        },
    ))
    .expect("register fail");
    Arc::new(reg)
}

fn engine(model: Arc<dyn Model>) -> Engine {
    Engine::builder()
        .model(model)
        .tools(registry())
        .build()
        .expect("build engine")
}

/// Every tool call is answered, in order, before the next assistant message.
fn assert_correlated(transcript: &[Message]) {
    let mut pending: VecDeque<String> = VecDeque::new();
    for m in transcript {
        match m {
            Message::Assistant(a) => {
                assert!(pending.is_empty(), "unanswered calls before assistant: {:?}", pending);
                pending = a.tool_calls.iter().map(|c| c.id.clone()).collect();
            }
            Message::ToolResult { tool_call_id, .. } => {
                assert_eq!(pending.pop_front().as_deref(), Some(tool_call_id.as_str()));
            }
            Message::Human { .. } | Message::System { .. } => {
                assert!(pending.is_empty(), "unanswered calls before {:?}", m);
            }
        }
    }
    assert!(pending.is_empty(), "unanswered calls at end: {:?}", pending);
}

#[tokio::test]
async fn plain_answer_ends_the_turn() {
    let model = ScriptedModel::new(vec![Step::Reply(AssistantMessage::text("hello"))]);
    let store = Arc::new(MemorySessionStore::new());
    let engine = Engine::builder()
        .model(model.clone())
        .tools(registry())
        .store(store.clone())
        .build()
        .expect("build engine");

    store
        .save(&Session::seeded("t", vec![Message::system("sys"), Message::human("hi")]))
        .await
        .expect("seed");
    let out = engine.resume("t").await.expect("resume");

    assert_eq!(
        out.transcript,
        vec![
            Message::system("sys"),
            Message::human("hi"),
            Message::assistant("hello"),
        ]
    );
    assert_eq!(out.reply, "hello");
    assert_eq!(out.model_calls, 1);
    assert_eq!(engine.state("t").await.expect("state"), LoopState::Done);
}

#[tokio::test]
async fn tool_result_is_appended_and_model_reinvoked() {
    let model = ScriptedModel::new(vec![
        Step::Reply(AssistantMessage::with_tool_calls(
            "",
            vec![call("1", "search", json!({"q": "X"}))],
        )),
        Step::Reply(AssistantMessage::text("found it")),
    ]);
    let engine = engine(model.clone());
    let out = engine.send("t", "search X").await.expect("send");

    assert_eq!(out.transcript.len(), 4);
    assert_eq!(out.transcript[2], Message::tool_result("1", "result text"));
    let seen = model.seen();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[1].len(), 3);
    assert_eq!(seen[1][2], Message::tool_result("1", "result text"));
    assert_eq!(out.reply, "found it");
}

#[tokio::test]
async fn unknown_tool_becomes_error_result() {
    let model = ScriptedModel::new(vec![
        Step::Reply(AssistantMessage::with_tool_calls(
            "",
            vec![call("1", "unknown_tool", json!({}))],
        )),
        Step::Reply(AssistantMessage::text("sorry")),
    ]);
    let engine = engine(model.clone());
    let out = engine.send("t", "do it").await.expect("send");

    assert_eq!(
        out.transcript[2],
        Message::tool_result("1", "Error: unknown tool 'unknown_tool'")
    );
    assert_eq!(model.seen().len(), 2);
    assert_eq!(out.reply, "sorry");
}

#[tokio::test]
async fn tool_failures_and_bad_arguments_are_folded_into_transcript() {
    let model = ScriptedModel::new(vec![
        Step::Reply(AssistantMessage::with_tool_calls(
            "",
            vec![
                call("a", "fail", json!({})),
                call("b", "search", json!({"q": 3})),
            ],
        )),
        Step::Reply(AssistantMessage::text("ok")),
    ]);
    let engine = engine(model);
    let out = engine.send("t", "go").await.expect("send");

    let failed = out.transcript[2].text();
    assert!(failed.starts_with("Error: command failed (exit status: 2)"));
    assert!(failed.contains("partial"));
    assert!(failed.contains("no such file"));
    assert!(out.transcript[3].text().starts_with("Error: invalid arguments"));
    assert_correlated(&out.transcript);
}

#[tokio::test]
async fn results_follow_call_order_not_completion_order() {
    let model = ScriptedModel::new(vec![
        Step::Reply(AssistantMessage::with_tool_calls(
            "",
            vec![
                call("slow", "sleep", json!({"ms": 120})),
                call("fast", "sleep", json!({"ms": 0})),
                call("mid", "sleep", json!({"ms": 40})),
            ],
        )),
        Step::Reply(AssistantMessage::text("all done")),
    ]);
    let engine = engine(model);
    let started = std::time::Instant::now();
    let out = engine.send("t", "sleep a lot").await.expect("send");

    let results: Vec<(&str, &str)> = out
        .transcript
        .iter()
        .filter_map(|m| match m {
            Message::ToolResult { tool_call_id, text } => Some((tool_call_id.as_str(), text.as_str())),
            _ => None,
        })
        .collect();
    assert_eq!(
        results,
        vec![("slow", "slept 120"), ("fast", "slept 0"), ("mid", "slept 40")]
    );
    // Run concurrently: well under the 160ms a sequential run would need.
    assert!(started.elapsed() < Duration::from_millis(1000));
    assert_correlated(&out.transcript);
}

#[tokio::test]
async fn empty_tool_call_list_is_final() {
    let model = ScriptedModel::new(vec![Step::Reply(AssistantMessage::with_tool_calls(
        "nothing to do",
        vec![],
    ))]);
    let engine = engine(model.clone());
    let out = engine.send("t", "hi").await.expect("send");
    assert_eq!(out.transcript.len(), 2);
    assert_eq!(model.seen().len(), 1);
}

#[tokio::test]
async fn done_state_is_idempotent() {
    let model = ScriptedModel::new(vec![Step::Reply(AssistantMessage::text("hello"))]);
    let engine = engine(model.clone());
    let out = engine.send("t", "hi").await.expect("send");

    let first = engine.transcript("t").await.expect("transcript");
    let second = engine.transcript("t").await.expect("transcript");
    assert_eq!(first, out.transcript);
    assert_eq!(first, second);

    let again = engine.resume("t").await.expect("resume done thread");
    assert_eq!(again.transcript, out.transcript);
    assert_eq!(again.model_calls, 0);
    assert_eq!(model.seen().len(), 1);
}

#[tokio::test]
async fn system_prompt_is_injected_exactly_once() {
    let model = ScriptedModel::new(vec![
        Step::Reply(AssistantMessage::text("one")),
        Step::Reply(AssistantMessage::text("two")),
    ]);
    let engine = Engine::builder()
        .model(model.clone())
        .tools(registry())
        .system_prompt("## Skills\n\n- **foo**: Foo tool")
        .build()
        .expect("build engine");

    engine.send("t", "first").await.expect("send");
    let out = engine.send("t", "second").await.expect("send");

    let systems = out
        .transcript
        .iter()
        .filter(|m| matches!(m, Message::System { .. }))
        .count();
    assert_eq!(systems, 1);
    assert!(matches!(&out.transcript[0], Message::System { text } if text.contains("**foo**")));

    let seen = model.seen();
    assert!(matches!(seen[0][0], Message::System { .. }));
    assert_eq!(seen[0].len(), 2);
    assert_eq!(seen[1].len(), 4);
}

#[tokio::test]
async fn caller_system_message_is_kept_after_prompt() {
    let model = ScriptedModel::new(vec![Step::Reply(AssistantMessage::text("ok"))]);
    let store = Arc::new(MemorySessionStore::new());
    let engine = Engine::builder()
        .model(model)
        .tools(registry())
        .store(store.clone())
        .system_prompt("SKILLS")
        .build()
        .expect("build engine");
    store
        .save(&Session::seeded(
            "t",
            vec![Message::system("Answer in French."), Message::human("hi")],
        ))
        .await
        .expect("seed");

    let out = engine.resume("t").await.expect("resume");
    assert_eq!(out.transcript[0], Message::system("SKILLS\n\nAnswer in French."));
    assert_eq!(out.transcript.len(), 3);
}

#[tokio::test]
async fn model_error_commits_nothing_and_thread_can_resume() {
    let model = ScriptedModel::new(vec![
        Step::Fail("model overloaded"),
        Step::Reply(AssistantMessage::text("back")),
    ]);
    let engine = engine(model);
    let err = engine.send("t", "hi").await.unwrap_err();
    assert!(matches!(err, EngineError::Model(ModelError::Api(_))));
    assert_eq!(
        engine.transcript("t").await.expect("transcript"),
        vec![Message::human("hi")]
    );
    assert_eq!(engine.state("t").await.expect("state"), LoopState::AwaitingModel);

    let out = engine.resume("t").await.expect("resume");
    assert_eq!(out.transcript, vec![Message::human("hi"), Message::assistant("back")]);
}

#[tokio::test]
async fn timeout_during_tools_leaves_consistent_transcript() {
    let model = ScriptedModel::new(vec![
        Step::Reply(AssistantMessage::with_tool_calls(
            "",
            vec![call("1", "sleep", json!({"ms": 5000}))],
        )),
        Step::Reply(AssistantMessage::text("recovered")),
    ]);
    let engine = Engine::builder()
        .model(model)
        .tools(registry())
        .reply_timeout(Some(Duration::from_millis(100)))
        .build()
        .expect("build engine");

    let err = engine.send("t", "slow please").await.unwrap_err();
    assert!(matches!(err, EngineError::Timeout(_)));
    let transcript = engine.transcript("t").await.expect("transcript");
    assert_eq!(transcript, vec![Message::human("slow please")]);

    let out = engine.resume("t").await.expect("resume");
    assert_eq!(out.reply, "recovered");
    assert_correlated(&out.transcript);
}

#[tokio::test]
async fn timeout_during_model_call() {
    let model = ScriptedModel::new(vec![Step::Slow(
        Duration::from_secs(5),
        AssistantMessage::text("too late"),
    )]);
    let engine = Engine::builder()
        .model(model)
        .tools(registry())
        .reply_timeout(Some(Duration::from_millis(50)))
        .build()
        .expect("build engine");
    let err = engine.send("t", "hi").await.unwrap_err();
    assert!(matches!(err, EngineError::Timeout(d) if d == Duration::from_millis(50)));
    assert_eq!(engine.transcript("t").await.expect("transcript").len(), 1);
}

#[tokio::test]
async fn turn_limit_stops_runaway_tool_loops() {
    let model = Arc::new(EchoModel {
        always_call: true,
        ..Default::default()
    });
    let engine = Engine::builder()
        .model(model)
        .tools(registry())
        .max_turns(Some(3))
        .build()
        .expect("build engine");

    let err = engine.send("t", "loop").await.unwrap_err();
    assert!(matches!(err, EngineError::TurnLimit(3)));
    let transcript = engine.transcript("t").await.expect("transcript");
    assert_eq!(transcript.iter().filter(|m| m.is_assistant()).count(), 3);
    assert_correlated(&transcript);
    assert_eq!(engine.state("t").await.expect("state"), LoopState::AwaitingModel);
}

#[tokio::test]
async fn distinct_threads_run_independently() {
    let engine = Arc::new(engine(Arc::new(EchoModel::default())));
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let engine = engine.clone();
            tokio::spawn(async move {
                let thread = format!("thread-{}", i);
                engine.send(&thread, &format!("msg {}", i)).await
            })
        })
        .collect();

    for (i, h) in handles.into_iter().enumerate() {
        let out = h.await.expect("join").expect("send");
        assert_eq!(out.reply, format!("done: msg {}", i));
        assert_eq!(out.transcript.len(), 4);
        assert_correlated(&out.transcript);
    }
    assert_eq!(engine.store().list().await.expect("list").len(), 8);
}

#[tokio::test]
async fn same_thread_sends_are_serialized() {
    let engine = Arc::new(engine(Arc::new(EchoModel::default())));
    let a = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.send("shared", "a").await })
    };
    let b = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.send("shared", "b").await })
    };
    a.await.expect("join").expect("send a");
    b.await.expect("join").expect("send b");

    let transcript = engine.transcript("shared").await.expect("transcript");
    assert_eq!(transcript.len(), 8);
    assert_correlated(&transcript);
    for turn in transcript.chunks(4) {
        assert!(matches!(turn[0], Message::Human { .. }));
        assert_eq!(turn[3].text(), format!("done: {}", turn[0].text()));
    }
}

#[tokio::test]
async fn missing_collaborators_fail_at_build() {
    let err = Engine::builder().tools(registry()).build().err();
    assert!(matches!(err, Some(EngineError::Config(_))));
    let err = Engine::builder()
        .model(Arc::new(EchoModel::default()))
        .build()
        .err();
    assert!(matches!(err, Some(EngineError::Config(_))));
}

#[tokio::test]
async fn resume_unknown_thread_is_not_found() {
    let engine = engine(Arc::new(EchoModel::default()));
    let err = engine.resume("nope").await.unwrap_err();
    assert!(matches!(err, EngineError::Store(_)));
}

#[tokio::test]
async fn end_waits_for_the_drive_in_flight() {
    let model = ScriptedModel::new(vec![
        Step::Slow(Duration::from_millis(300), AssistantMessage::text("reply for A")),
        Step::Reply(AssistantMessage::text("reply for B")),
    ]);
    let engine = Arc::new(engine(model));

    let first = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.send("t", "A").await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(engine.end("t").await.expect("end"));

    let a = first.await.expect("join").expect("send A");
    assert_eq!(a.transcript, vec![Message::human("A"), Message::assistant("reply for A")]);

    let b = engine.send("t", "B").await.expect("send B");
    assert_eq!(b.transcript, vec![Message::human("B"), Message::assistant("reply for B")]);
    assert_eq!(engine.transcript("t").await.expect("transcript"), b.transcript);
}
