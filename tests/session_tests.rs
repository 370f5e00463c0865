//! End-to-end sessions over a scripted transport.

use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;

use agentchat::agents;
use agentchat::export::ExportFormat;
use agentchat::{
    ChatRequest, ConfigOverrides, ContentPart, Error, HttpResponse, RequestExecutor, Result,
    RetryPolicy, Role, Session, Sleeper, Transport,
};

struct Scripted {
    responses: Mutex<VecDeque<HttpResponse>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl Scripted {
    fn new(responses: Vec<HttpResponse>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for Scripted {
    async fn post(&self, request: &ChatRequest, _: Duration) -> Result<HttpResponse> {
        self.requests.lock().unwrap().push(request.clone());
        let next = self.responses.lock().unwrap().pop_front();
        next.ok_or_else(|| Error::connection("script exhausted", None))
    }
}

#[derive(Default)]
struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.delays.lock().unwrap().push(duration);
    }
}

fn open(
    workspace: &Path,
    id: &str,
    transport: Arc<Scripted>,
    sleeper: Arc<RecordingSleeper>,
) -> Session {
    let executor = RequestExecutor::with_parts(transport, sleeper, RetryPolicy::default());
    Session::with_executor(workspace, id, Some("gpt-5-nano"), executor).unwrap()
}

fn buffered(text: &str) -> HttpResponse {
    let body = serde_json::json!({"choices": [{"message": {"role": "assistant", "content": text}}]});
    HttpResponse::from_bytes(200, body.to_string())
}

fn streamed(fragments: &[&str]) -> HttpResponse {
    let mut chunks: Vec<Bytes> = fragments
        .iter()
        .map(|f| {
            let event = serde_json::json!({"choices": [{"delta": {"content": f}}]});
            Bytes::from(format!("data: {event}\n\n"))
        })
        .collect();
    chunks.push(Bytes::from_static(b"data: [DONE]\n\n"));
    HttpResponse::from_chunks(200, chunks)
}

fn last_user_text(request: &ChatRequest) -> String {
    let message = request.messages.last().unwrap();
    assert_eq!(message.role, Role::User);
    match &message.content[0] {
        ContentPart::Text { text } => text.clone(),
    }
}

#[tokio::test]
async fn conversation_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let transport = Scripted::new(vec![streamed(&["Hi", " there"]), buffered("Bye")]);
    let sleeper = Arc::new(RecordingSleeper::default());

    let mut session = open(dir.path(), "demo", transport.clone(), sleeper.clone());
    let out: Vec<String> = session
        .send("hello", &ConfigOverrides::default())
        .collect()
        .await;
    assert_eq!(out, vec!["Hi", " there"]);
    drop(session);

    let mut session = open(dir.path(), "demo", transport.clone(), sleeper);
    assert_eq!(session.history().len(), 2);
    assert_eq!(session.history().messages()[1].content, "Hi there");

    let overrides = ConfigOverrides::default().with_stream(false);
    let out: Vec<String> = session.send("goodbye", &overrides).collect().await;
    assert_eq!(out, vec!["Bye"]);

    let requests = transport.requests();
    assert_eq!(requests[0].stream, Some(true));
    assert_eq!(requests[1].stream, None);
    assert_eq!(requests[1].messages.len(), 3);

    let stats = session.statistics();
    assert_eq!(stats.total_messages, 4);
    assert_eq!(stats.user_messages, 2);
    assert_eq!(stats.assistant_messages, 2);
}

#[tokio::test]
async fn rate_limited_turn_is_retried() {
    let dir = tempfile::tempdir().unwrap();
    let transport = Scripted::new(vec![
        HttpResponse::from_bytes(429, "slow down"),
        buffered("ok"),
    ]);
    let sleeper = Arc::new(RecordingSleeper::default());
    let mut session = open(dir.path(), "retry", transport.clone(), sleeper.clone());

    let overrides = ConfigOverrides::default().with_stream(false);
    let out: Vec<String> = session.send("ping", &overrides).collect().await;
    assert_eq!(out, vec!["ok"]);
    assert_eq!(transport.requests().len(), 2);
    assert_eq!(*sleeper.delays.lock().unwrap(), vec![Duration::from_secs(1)]);
    assert_eq!(session.history().len(), 2);
}

#[tokio::test]
async fn abandoned_stream_commits_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let transport = Scripted::new(vec![streamed(&["partial", " reply"])]);
    let mut session = open(
        dir.path(),
        "abandon",
        transport,
        Arc::new(RecordingSleeper::default()),
    );

    let first: Vec<String> = session
        .send("tell me a story", &ConfigOverrides::default())
        .take(1)
        .collect()
        .await;
    assert_eq!(first, vec!["partial"]);
    assert_eq!(session.history().len(), 1);
    assert_eq!(session.history().messages()[0].role, Role::User);
}

#[tokio::test]
async fn included_files_reach_the_request_only() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("notes.txt"), "remember the milk").unwrap();
    let transport = Scripted::new(vec![buffered("noted")]);
    let mut session = open(
        dir.path(),
        "files",
        transport.clone(),
        Arc::new(RecordingSleeper::default()),
    );

    let overrides = ConfigOverrides::default().with_stream(false);
    let _: Vec<String> = session
        .send("Summarize {notes.txt} and {missing.txt}", &overrides)
        .collect()
        .await;

    let sent = last_user_text(&transport.requests()[0]);
    assert!(sent.contains("remember the milk"));
    assert!(sent.contains("[ERROR: File missing.txt not found]"));
    assert_eq!(
        session.history().messages()[0].content,
        "Summarize {notes.txt} and {missing.txt}"
    );
    assert!(
        session
            .list_includable_files()
            .iter()
            .any(|f| f.starts_with("notes.txt"))
    );
}

#[tokio::test]
async fn history_is_capped_and_backed_up() {
    let dir = tempfile::tempdir().unwrap();
    let replies = (0..3).map(|i| buffered(&format!("reply {i}"))).collect();
    let transport = Scripted::new(replies);
    let mut session = open(
        dir.path(),
        "capped",
        transport,
        Arc::new(RecordingSleeper::default()),
    );
    session.update_config(|c| c.max_history_size = 4).unwrap();

    let overrides = ConfigOverrides::default().with_stream(false);
    for i in 0..3 {
        let _: Vec<String> = session
            .send(&format!("question {i}"), &overrides)
            .collect()
            .await;
    }
    let contents: Vec<_> = session
        .history()
        .messages()
        .iter()
        .map(|m| m.content.as_str())
        .collect();
    assert_eq!(contents, vec!["question 1", "reply 1", "question 2", "reply 2"]);
    assert!(
        fs::read_dir(&session.paths().backups)
            .unwrap()
            .next()
            .is_some()
    );

    let hits = session.search("REPLY", 1);
    assert_eq!(hits.len(), 1);
    assert!(session.search("question 0", 10).is_empty());
}

#[tokio::test]
async fn listing_info_and_exports() {
    let dir = tempfile::tempdir().unwrap();
    let transport = Scripted::new(vec![buffered("<b>bold</b>")]);
    let mut session = open(
        dir.path(),
        "exporter",
        transport,
        Arc::new(RecordingSleeper::default()),
    );
    let overrides = ConfigOverrides::default().with_stream(false);
    let _: Vec<String> = session.send("show html", &overrides).collect().await;

    for format in ExportFormat::ALL {
        let path = session.export(format).unwrap();
        assert_eq!(
            path.extension().unwrap().to_str().unwrap(),
            format.extension()
        );
    }
    let html = fs::read_dir(&session.paths().exports)
        .unwrap()
        .filter_map(|e| e.ok())
        .find(|e| e.path().extension().is_some_and(|x| x == "html"))
        .map(|e| fs::read_to_string(e.path()).unwrap())
        .unwrap();
    assert!(html.contains("&lt;b&gt;bold&lt;/b&gt;"));

    let listed = agents::list_agents(dir.path()).unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, "exporter");
    assert_eq!(listed[0].model, "gpt-5-nano");
    assert_eq!(listed[0].message_count, 2);

    let info = agents::agent_info(dir.path(), "exporter").unwrap();
    assert_eq!(info.statistics.total_messages, 2);
    assert!(info.files.iter().any(|(p, _)| p.starts_with("exports")));
}
