use super::*;
use crate::core::aggregator::{StreamFragment, ToolCallDelta};
use crate::core::sink::ChannelSink;
use async_trait::async_trait;
use rust_mcp_schema::{CallToolResult, Tool};
use serde_json::{json, Map, Value};
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::mpsc;

type Script = Result<Vec<StreamMessage>, String>;

/// Replays one scripted stream per request and records what was asked.
#[derive(Default)]
struct ScriptedCompletions {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<(ResolvedProvider, ChatRequest)>>,
}

impl ScriptedCompletions {
    fn new(scripts: Vec<Script>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<(ResolvedProvider, ChatRequest)> {
        self.requests.lock().expect("requests lock").clone()
    }
}

#[async_trait]
impl CompletionClient for ScriptedCompletions {
    async fn open_stream(
        &self,
        provider: &ResolvedProvider,
        request: ChatRequest,
        _cancel_token: CancellationToken,
    ) -> Result<mpsc::UnboundedReceiver<StreamMessage>, String> {
        self.requests
            .lock()
            .expect("requests lock")
            .push((provider.clone(), request));
        let script = self
            .scripts
            .lock()
            .expect("scripts lock")
            .pop_front()
            .unwrap_or_else(|| Err("no scripted response left".to_string()))?;

        let (tx, rx) = mpsc::unbounded_channel();
        for message in script {
            tx.send(message).expect("receiver open");
        }
        Ok(rx)
    }
}

#[derive(Default)]
struct RecordingTools {
    fail_listing: bool,
    calls: Mutex<Vec<(String, Map<String, Value>)>>,
}

impl RecordingTools {
    fn calls(&self) -> Vec<(String, Map<String, Value>)> {
        self.calls.lock().expect("calls lock").clone()
    }
}

#[async_trait]
impl ToolService for RecordingTools {
    async fn list_tools(&self) -> Result<Vec<Tool>, String> {
        if self.fail_listing {
            return Err("connection refused".to_string());
        }
        Ok(serde_json::from_value(json!([
            {"name": "get_x", "inputSchema": {"type": "object", "properties": {}, "required": []}}
        ]))
        .expect("tools"))
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<CallToolResult, String> {
        self.calls
            .lock()
            .expect("calls lock")
            .push((name.to_string(), arguments));
        Ok(serde_json::from_value(json!({
            "content": [{"type": "text", "text": "x is 7"}]
        }))
        .expect("call result"))
    }
}

fn text_stream(text: &str) -> Script {
    Ok(vec![
        StreamMessage::Fragment(StreamFragment::text(text)),
        StreamMessage::End,
    ])
}

fn delta(id: Option<&str>, name: Option<&str>, arguments: &str) -> StreamMessage {
    indexed_delta(0, id, name, arguments)
}

fn indexed_delta(index: usize, id: Option<&str>, name: Option<&str>, arguments: &str) -> StreamMessage {
    StreamMessage::Fragment(StreamFragment::tool_call(ToolCallDelta {
        index,
        id: id.map(str::to_string),
        name: name.map(str::to_string),
        arguments: Some(arguments.to_string()),
    }))
}

fn get_x_stream(id: &str) -> Script {
    Ok(vec![
        delta(Some(id), Some("get_x"), "{\"n\""),
        delta(None, None, ":1"),
        delta(None, None, "}"),
        StreamMessage::End,
    ])
}

fn config() -> Config {
    Config {
        system_prompt: Some("be brief".to_string()),
        ..Config::default()
    }
}

async fn session(
    config: &Config,
    completions: Arc<ScriptedCompletions>,
    tools: Arc<RecordingTools>,
) -> (ChatSession, mpsc::UnboundedReceiver<String>) {
    let (sink, rx) = ChannelSink::new();
    let providers = ProviderRegistry::from_config_with_env(config, |_| None);
    let session = ChatSession::start(config, completions, tools, providers, Arc::new(sink))
        .await
        .expect("session should start");
    (session, rx)
}

fn drain(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<String> {
    let mut out = Vec::new();
    while let Ok(text) = rx.try_recv() {
        out.push(text);
    }
    out
}

#[tokio::test]
async fn plain_answer_ends_turn_after_one_request() {
    let completions = ScriptedCompletions::new(vec![text_stream("Hello there")]);
    let tools = Arc::new(RecordingTools::default());
    let (mut session, mut rx) = session(&config(), completions.clone(), tools.clone()).await;

    let outcome = session
        .handle_message(TurnRequest::new("hi"))
        .await
        .expect("turn");

    assert_eq!(outcome, TurnOutcome::Answered);
    assert_eq!(completions.requests().len(), 1);
    assert!(tools.calls().is_empty());
    assert_eq!(drain(&mut rx), vec!["Hello there".to_string()]);
    assert_eq!(
        session.history(),
        &[
            Message::System("be brief".to_string()),
            Message::User("hi".to_string()),
            Message::assistant_text("Hello there"),
        ]
    );
}

#[tokio::test]
async fn tool_round_continues_with_results_in_history() {
    let completions = ScriptedCompletions::new(vec![get_x_stream("c1"), text_stream("x is 7")]);
    let tools = Arc::new(RecordingTools::default());
    let (mut session, mut rx) = session(&config(), completions.clone(), tools.clone()).await;

    let outcome = session
        .handle_message(TurnRequest::new("what is x?"))
        .await
        .expect("turn");

    assert_eq!(outcome, TurnOutcome::Answered);
    let calls = tools.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "get_x");
    assert_eq!(Value::Object(calls[0].1.clone()), json!({"n": 1}));

    let requests = completions.requests();
    assert_eq!(requests.len(), 2);
    let second = serde_json::to_value(&requests[1].1.messages).expect("messages");
    assert_eq!(second[2]["role"], "assistant");
    assert_eq!(second[2]["content"], Value::Null);
    assert_eq!(second[2]["tool_calls"][0]["id"], "c1");
    assert_eq!(second[2]["tool_calls"][0]["function"]["arguments"], "{\"n\":1}");
    assert_eq!(second[3]["role"], "tool");
    assert_eq!(second[3]["tool_call_id"], "c1");
    assert_eq!(second[3]["content"], "\"x is 7\"");

    assert_eq!(
        drain(&mut rx),
        vec![
            "🤖 Calling `get_x` with {\"n\":1}".to_string(),
            "x is 7".to_string()
        ]
    );
    assert_eq!(session.history().len(), 5);
}

#[tokio::test]
async fn request_failure_reports_error_without_assistant_message() {
    let completions = ScriptedCompletions::new(vec![Err("API Error: 401".to_string())]);
    let tools = Arc::new(RecordingTools::default());
    let (mut session, mut rx) = session(&config(), completions, tools).await;

    let outcome = session
        .handle_message(TurnRequest::new("hi"))
        .await
        .expect("turn");

    assert_eq!(outcome, TurnOutcome::ProviderFailed);
    assert_eq!(
        drain(&mut rx),
        vec!["Error from LLM provider: API Error: 401".to_string()]
    );
    assert_eq!(session.history().len(), 2);
    assert_eq!(session.history()[1], Message::User("hi".to_string()));
}

#[tokio::test]
async fn mid_stream_error_discards_partial_answer() {
    let completions = ScriptedCompletions::new(vec![Ok(vec![
        StreamMessage::Fragment(StreamFragment::text("partial")),
        StreamMessage::Error("stream reset".to_string()),
        StreamMessage::End,
    ])]);
    let tools = Arc::new(RecordingTools::default());
    let (mut session, mut rx) = session(&config(), completions, tools).await;

    let outcome = session
        .handle_message(TurnRequest::new("hi"))
        .await
        .expect("turn");

    assert_eq!(outcome, TurnOutcome::ProviderFailed);
    assert_eq!(
        drain(&mut rx),
        vec!["Error from LLM provider: stream reset".to_string()]
    );
    assert!(!session
        .history()
        .iter()
        .any(|message| matches!(message, Message::Assistant(_))));
}

#[tokio::test]
async fn round_limit_stops_without_another_request() {
    let config = Config {
        max_tool_rounds: Some(2),
        ..config()
    };
    let completions = ScriptedCompletions::new(vec![
        get_x_stream("c1"),
        get_x_stream("c2"),
        get_x_stream("c3"),
        text_stream("never sent"),
    ]);
    let tools = Arc::new(RecordingTools::default());
    let (mut session, mut rx) = session(&config, completions.clone(), tools.clone()).await;

    let outcome = session
        .handle_message(TurnRequest::new("loop forever"))
        .await
        .expect("turn");

    assert_eq!(outcome, TurnOutcome::RoundLimitReached);
    assert_eq!(completions.requests().len(), 3);
    assert_eq!(tools.calls().len(), 2);
    let output = drain(&mut rx);
    assert_eq!(
        output.last().map(String::as_str),
        Some("Stopped after 2 rounds of tool calls without a final answer.")
    );
    // The unanswered third batch is not recorded.
    assert!(matches!(
        session.history().last(),
        Some(Message::Tool { tool_call_id, .. }) if tool_call_id == "c2"
    ));
}

#[tokio::test]
async fn disabled_tools_are_not_advertised() {
    let completions = ScriptedCompletions::new(vec![text_stream("a"), text_stream("b")]);
    let tools = Arc::new(RecordingTools::default());
    let (mut session, _rx) = session(&config(), completions.clone(), tools).await;

    let request = TurnRequest {
        use_tools: false,
        ..TurnRequest::new("no tools please")
    };
    session.handle_message(request).await.expect("turn");
    session
        .handle_message(TurnRequest::new("tools please"))
        .await
        .expect("turn");

    let requests = completions.requests();
    assert!(requests[0].1.tools.is_none());
    assert!(requests[0].1.tool_choice.is_none());
    let advertised = requests[1].1.tools.as_ref().expect("tools advertised");
    assert_eq!(advertised[0].function.name, "get_x");
    assert_eq!(requests[1].1.tool_choice.as_deref(), Some("auto"));
    assert!(requests.iter().all(|(_, request)| request.stream));
}

#[tokio::test]
async fn blank_message_is_ignored() {
    let completions = ScriptedCompletions::new(Vec::new());
    let tools = Arc::new(RecordingTools::default());
    let (mut session, _rx) = session(&config(), completions.clone(), tools).await;

    let outcome = session
        .handle_message(TurnRequest::new("   "))
        .await
        .expect("turn");

    assert_eq!(outcome, TurnOutcome::Ignored);
    assert!(completions.requests().is_empty());
    assert_eq!(session.history().len(), 1);
}

#[tokio::test]
async fn provider_and_model_follow_the_request() {
    let completions = ScriptedCompletions::new(vec![text_stream("ok")]);
    let tools = Arc::new(RecordingTools::default());
    let (mut session, _rx) = session(&config(), completions.clone(), tools).await;

    let request = TurnRequest {
        provider: Some("ollama".to_string()),
        model: Some("qwen2.5:7b".to_string()),
        ..TurnRequest::new("hi")
    };
    session.handle_message(request).await.expect("turn");

    let (provider, request) = &completions.requests()[0];
    assert_eq!(provider.id, "ollama");
    assert_eq!(request.model, "qwen2.5:7b");
}

#[tokio::test]
async fn resource_selection_reaches_context_tools() {
    let config = Config {
        context_tools: Some(vec!["get_x".to_string()]),
        ..config()
    };
    let completions = ScriptedCompletions::new(vec![get_x_stream("c1"), text_stream("done")]);
    let tools = Arc::new(RecordingTools::default());
    let (mut session, _rx) = session(&config, completions, tools.clone()).await;

    let request = TurnRequest {
        resource: Some("warehouse".to_string()),
        ..TurnRequest::new("what is x?")
    };
    session.handle_message(request).await.expect("turn");

    assert_eq!(
        Value::Object(tools.calls()[0].1.clone()),
        json!({"n": 1, "db_connection_name": "warehouse"})
    );
}

#[tokio::test]
async fn unreachable_tool_server_fails_session_start() {
    let completions = ScriptedCompletions::new(Vec::new());
    let tools = Arc::new(RecordingTools {
        fail_listing: true,
        ..RecordingTools::default()
    });
    let (sink, mut rx) = ChannelSink::new();
    let config = config();
    let providers = ProviderRegistry::from_config_with_env(&config, |_| None);

    let result = ChatSession::start(&config, completions, tools, providers, Arc::new(sink)).await;

    assert!(matches!(result, Err(SessionError::ToolServer(_))));
    assert_eq!(drain(&mut rx), vec![CONNECT_FAILURE_NOTICE.to_string()]);
}

#[tokio::test]
async fn closed_sink_ends_the_session() {
    let completions = ScriptedCompletions::new(vec![text_stream("hello")]);
    let tools = Arc::new(RecordingTools::default());
    let (mut session, rx) = session(&config(), completions, tools).await;
    drop(rx);

    let err = session
        .handle_message(TurnRequest::new("hi"))
        .await
        .expect_err("sink is closed");
    assert!(matches!(err, SessionError::Sink(_)));
}

#[tokio::test]
async fn sparse_tool_call_index_runs_only_named_calls() {
    let completions = ScriptedCompletions::new(vec![
        Ok(vec![
            indexed_delta(1, Some("c1"), Some("get_x"), "{}"),
            StreamMessage::End,
        ]),
        text_stream("x is 7"),
    ]);
    let tools = Arc::new(RecordingTools::default());
    let (mut session, _rx) = session(&config(), completions.clone(), tools.clone()).await;

    let outcome = session
        .handle_message(TurnRequest::new("what is x?"))
        .await
        .expect("turn");

    assert_eq!(outcome, TurnOutcome::Answered);
    let called: Vec<String> = tools.calls().into_iter().map(|(name, _)| name).collect();
    assert_eq!(called, vec!["get_x".to_string()]);

    let second = serde_json::to_value(&completions.requests()[1].1.messages).expect("messages");
    let replayed = second[2]["tool_calls"].as_array().expect("tool calls");
    assert_eq!(replayed.len(), 1);
    assert_eq!(replayed[0]["id"], "c1");
    assert_eq!(replayed[0]["function"]["name"], "get_x");
    assert_eq!(second[3]["tool_call_id"], "c1");
}

#[tokio::test]
async fn oversized_tool_call_index_fails_the_turn() {
    let completions = ScriptedCompletions::new(vec![Ok(vec![
        indexed_delta(u32::MAX as usize, Some("c1"), Some("get_x"), "{}"),
        StreamMessage::End,
    ])]);
    let tools = Arc::new(RecordingTools::default());
    let (mut session, mut rx) = session(&config(), completions, tools.clone()).await;

    let outcome = session
        .handle_message(TurnRequest::new("what is x?"))
        .await
        .expect("turn");

    assert_eq!(outcome, TurnOutcome::ProviderFailed);
    assert!(tools.calls().is_empty());
    assert_eq!(
        drain(&mut rx),
        vec![format!(
            "Error from LLM provider: Tool call index {} exceeds the limit of 128 calls per response",
            u32::MAX
        )]
    );
    assert_eq!(session.history().len(), 2);
}
