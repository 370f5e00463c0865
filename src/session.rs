//! One open agent: its config, history, and the machinery for a turn.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use futures::stream::{self, BoxStream};
use tracing::{error, info};

use crate::agents::{AgentPaths, validate_agent_id};
use crate::backup::BackupRotation;
use crate::client::HttpTransport;
use crate::config::{AgentConfig, ConfigOverrides};
use crate::error::{Error, Result};
use crate::export::{self, Conversation, ExportFormat};
use crate::history::{History, SearchHit, Statistics};
use crate::include::FileIncluder;
use crate::models;
use crate::observability::{TURN_FAILURES, TURNS};
use crate::payload;
use crate::reconcile::{StreamingReply, buffered_reply};
use crate::retry::RequestExecutor;
use crate::types::Message;
use crate::utils::time::now;

/// The text of a reply, fragment by fragment.
pub type TextStream<'a> = BoxStream<'a, String>;

/// An open agent.
pub struct Session {
    paths: AgentPaths,
    config: AgentConfig,
    history: History,
    includer: FileIncluder,
    executor: RequestExecutor,
}

impl Session {
    /// Open agent `agent_id` under `workspace`, talking to the hosted API with `api_key`.
    ///
    /// When `model` is given it must be supported and it replaces the stored
    /// model; otherwise the stored model (or the default for a new agent) is
    /// used.
    pub fn open(
        workspace: &Path,
        agent_id: &str,
        model: Option<&str>,
        api_key: &str,
    ) -> Result<Self> {
        if let Some(model) = model {
            models::lookup(model)?;
        }
        let transport = HttpTransport::new(api_key)?;
        Self::with_executor(
            workspace,
            agent_id,
            model,
            RequestExecutor::new(Arc::new(transport)),
        )
    }

    /// Open an agent with a caller-supplied executor.
    pub fn with_executor(
        workspace: &Path,
        agent_id: &str,
        model: Option<&str>,
        executor: RequestExecutor,
    ) -> Result<Self> {
        validate_agent_id(agent_id)?;
        if let Some(model) = model {
            models::lookup(model)?;
        }
        let paths = AgentPaths::new(workspace, agent_id);
        paths.create_dirs()?;
        let mut config = AgentConfig::load_or_create(&paths.config, model);
        if config.repair() {
            config.save(&paths.config);
        }
        config.validate()?;
        let history = History::load(
            &paths.history,
            BackupRotation::new(&paths.backups),
            config.max_history_size,
        );
        let includer = FileIncluder::new(workspace, &paths.uploads)?;
        info!(
            agent = agent_id,
            model = %config.model,
            messages = history.len(),
            "Agent initialized"
        );
        Ok(Self {
            paths,
            config,
            history,
            includer,
            executor,
        })
    }

    /// The agent id.
    pub fn agent_id(&self) -> &str {
        &self.paths.id
    }

    /// The agent's paths.
    pub fn paths(&self) -> &AgentPaths {
        &self.paths
    }

    /// Run one turn.
    ///
    /// The user message is committed before the request is sent and stays
    /// committed whatever happens next.  The reply is yielded as it arrives
    /// when streaming and in one piece otherwise.  Failures are yielded as a
    /// single `API call failed: ...` item.
    pub fn send<'a>(&'a mut self, text: &str, overrides: &ConfigOverrides) -> TextStream<'a> {
        TURNS.click();
        if let Err(err) = overrides.validate() {
            return failure(err);
        }
        let snapshot = self.history.snapshot();
        self.history.append(Message::user(text));
        let request = payload::build(text, &snapshot, &self.config, overrides, &self.includer);
        let streaming = request.is_streaming();
        info!(
            model = %request.model,
            effort = %request.reasoning_effort,
            streaming,
            context = request.messages.len(),
            "Sending turn"
        );

        let executor = &self.executor;
        let history = &mut self.history;
        let reply = async move {
            match executor.execute(&request).await {
                Ok(response) if streaming => StreamingReply::new(response, history)
                    .into_stream()
                    .boxed(),
                Ok(response) => stream::once(buffered_reply(response, history)).boxed(),
                Err(err) => failure(err),
            }
        };
        stream::once(reply).flatten().boxed()
    }

    /// The current configuration.
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Change the configuration through `update`, validate, and persist.
    ///
    /// An invalid result leaves the configuration untouched.
    pub fn update_config<F>(&mut self, update: F) -> Result<()>
    where
        F: FnOnce(&mut AgentConfig),
    {
        let mut next = self.config.clone();
        update(&mut next);
        self.replace_config(next)
    }

    /// Replace the configuration wholesale, validate, and persist.
    pub fn replace_config(&mut self, mut config: AgentConfig) -> Result<()> {
        config.validate()?;
        config.save(&self.paths.config);
        self.history.set_cap(config.max_history_size);
        self.config = config;
        info!(model = %self.config.model, "Configuration updated");
        Ok(())
    }

    /// The per-attempt timeout for the current model and effort.
    pub fn timeout(&self) -> Duration {
        models::timeout_for(&self.config.model, self.config.reasoning_effort)
    }

    /// The conversation history.
    pub fn history(&self) -> &History {
        &self.history
    }

    /// Statistics of the conversation.
    pub fn statistics(&self) -> Statistics {
        self.history.statistics()
    }

    /// Case-insensitive search of the conversation.
    pub fn search(&self, term: &str, limit: usize) -> Vec<SearchHit> {
        self.history.search(term, limit)
    }

    /// Files that `{name}` tokens can include.
    pub fn list_includable_files(&self) -> Vec<String> {
        self.includer.list_files()
    }

    /// Back up and empty the history.
    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Write the conversation to the agent's exports directory.
    pub fn export(&self, format: ExportFormat) -> Result<PathBuf> {
        let conversation = Conversation {
            agent_id: self.agent_id(),
            config: &self.config,
            messages: self.history.messages(),
            statistics: self.history.statistics(),
            exported_at: now(),
        };
        export::export(&self.paths.exports, format, &conversation)
    }
}

fn failure<'a>(err: Error) -> TextStream<'a> {
    TURN_FAILURES.click();
    error!("API call failed: {err}");
    stream::once(async move { format!("API call failed: {err}") }).boxed()
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use bytes::Bytes;

    use super::*;
    use crate::client::{HttpResponse, Transport};
    use crate::models::ReasoningEffort;
    use crate::retry::{RetryPolicy, Sleeper};
    use crate::types::{ChatRequest, Role};

    struct Canned {
        responses: Mutex<VecDeque<HttpResponse>>,
        requests: Mutex<Vec<ChatRequest>>,
    }

    #[async_trait]
    impl Transport for Canned {
        async fn post(&self, request: &ChatRequest, _: Duration) -> Result<HttpResponse> {
            self.requests.lock().unwrap().push(request.clone());
            let next = self.responses.lock().unwrap().pop_front();
            next.ok_or_else(|| Error::connection("no more responses", None))
        }
    }

    struct NoSleep;

    #[async_trait]
    impl Sleeper for NoSleep {
        async fn sleep(&self, _: Duration) {}
    }

    fn open(dir: &Path, responses: Vec<HttpResponse>) -> (Session, Arc<Canned>) {
        let transport = Arc::new(Canned {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        });
        let executor =
            RequestExecutor::with_parts(transport.clone(), Arc::new(NoSleep), RetryPolicy::default());
        let session = Session::with_executor(dir, "test", None, executor).unwrap();
        (session, transport)
    }

    fn buffered(text: &str) -> HttpResponse {
        let body = serde_json::json!({"choices": [{"message": {"content": text}}]});
        HttpResponse::from_bytes(200, body.to_string())
    }

    #[tokio::test]
    async fn buffered_turn_commits_both_messages() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, transport) = open(dir.path(), vec![buffered("pong")]);
        let overrides = ConfigOverrides::default().with_stream(false);
        let out: Vec<String> = session.send("ping", &overrides).collect().await;
        assert_eq!(out, vec!["pong"]);
        let roles: Vec<_> = session.history().messages().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant]);

        let requests = transport.requests.lock().unwrap();
        assert_eq!(requests[0].messages.len(), 1);
        assert_eq!(requests[0].stream, None);
    }

    #[tokio::test]
    async fn streamed_turn_yields_fragments() {
        let dir = tempfile::tempdir().unwrap();
        let body = [
            r#"data: {"choices":[{"delta":{"content":"Hi"}}]}"#,
            r#"data: {"choices":[{"delta":{"content":" there"}}]}"#,
            "data: [DONE]",
        ]
        .iter()
        .map(|l| Bytes::from(format!("{l}\n\n")))
        .collect();
        let (mut session, _) = open(dir.path(), vec![HttpResponse::from_chunks(200, body)]);
        let out: Vec<String> = session.send("hello", &ConfigOverrides::default()).collect().await;
        assert_eq!(out, vec!["Hi", " there"]);
        assert_eq!(session.history().messages()[1].content, "Hi there");
    }

    #[tokio::test]
    async fn failed_turn_keeps_user_message() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, transport) = open(dir.path(), vec![HttpResponse::from_bytes(401, "")]);
        let out: Vec<String> = session.send("hello", &ConfigOverrides::default()).collect().await;
        assert_eq!(out.len(), 1);
        assert!(out[0].starts_with("API call failed: "));
        assert!(out[0].contains("Invalid API key"));
        assert_eq!(session.history().len(), 1);
        assert_eq!(transport.requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn new_message_is_sent_once() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, transport) =
            open(dir.path(), vec![buffered("one"), buffered("two")]);
        let overrides = ConfigOverrides::default().with_stream(false);
        let _: Vec<String> = session.send("first", &overrides).collect().await;
        let _: Vec<String> = session.send("second", &overrides).collect().await;
        let requests = transport.requests.lock().unwrap();
        let second = &requests[1];
        assert_eq!(second.messages.len(), 3);
        assert_eq!(second.messages.last().unwrap().role, Role::User);
    }

    #[tokio::test]
    async fn invalid_overrides_send_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, transport) = open(dir.path(), vec![]);
        let overrides = ConfigOverrides::default().with_temperature(3.0);
        let out: Vec<String> = session.send("hello", &overrides).collect().await;
        assert!(out[0].starts_with("API call failed: "));
        assert!(session.history().is_empty());
        assert!(transport.requests.lock().unwrap().is_empty());
    }

    #[test]
    fn config_updates_persist_and_validate() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, _) = open(dir.path(), vec![]);
        session
            .update_config(|c| c.reasoning_effort = ReasoningEffort::High)
            .unwrap();
        assert_eq!(session.timeout(), Duration::from_secs(720));
        assert!(session.update_config(|c| c.temperature = 5.0).is_err());
        assert_eq!(session.config().temperature, 1.0);

        let reloaded = AgentConfig::load(&session.paths().config).unwrap();
        assert_eq!(reloaded.reasoning_effort, ReasoningEffort::High);
    }

    #[test]
    fn model_is_checked_before_any_io() {
        let dir = tempfile::tempdir().unwrap();
        let executor = RequestExecutor::new(Arc::new(HttpTransport::new("k").unwrap()));
        let err = Session::with_executor(dir.path(), "x", Some("gpt-4"), executor)
            .err()
            .unwrap();
        assert!(matches!(err, Error::UnsupportedModel { .. }));
        assert!(!dir.path().join("agents").exists());
    }

    fn executor() -> RequestExecutor {
        RequestExecutor::new(Arc::new(HttpTransport::new("k").unwrap()))
    }

    fn write_config(dir: &Path, id: &str, yaml: &str) {
        let paths = AgentPaths::new(dir, id);
        paths.create_dirs().unwrap();
        std::fs::write(&paths.config, yaml).unwrap();
    }

    #[test]
    fn stored_unsupported_model_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_config(dir.path(), "stale", "model: gpt-4o\n");
        let err = Session::with_executor(dir.path(), "stale", None, executor())
            .err()
            .unwrap();
        assert!(matches!(err, Error::UnsupportedModel { .. }));
        assert!(err.to_string().contains("gpt-4o"));

        let forced = Session::with_executor(dir.path(), "stale", Some("gpt-5-mini"), executor())
            .unwrap();
        assert_eq!(forced.config().model, "gpt-5-mini");
    }

    #[test]
    fn stored_out_of_range_values_fall_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        write_config(
            dir.path(),
            "odd",
            "model: gpt-5-nano\nmax_history_size: 0\ntemperature: 9.0\ntop_p: 3.0\n",
        );
        let session = Session::with_executor(dir.path(), "odd", None, executor()).unwrap();
        assert_eq!(session.config().model, "gpt-5-nano");
        assert_eq!(session.config().temperature, 1.0);
        assert_eq!(session.config().top_p, 1.0);
        assert_eq!(session.config().max_history_size, 1000);

        let saved = AgentConfig::load(&session.paths().config).unwrap();
        assert_eq!(saved.temperature, 1.0);
        assert_eq!(saved.max_history_size, 1000);
    }

    #[tokio::test]
    async fn zero_history_cap_keeps_the_user_message() {
        let dir = tempfile::tempdir().unwrap();
        write_config(dir.path(), "test", "model: gpt-5-nano\nmax_history_size: 0\n");
        let (mut session, _) = open(dir.path(), vec![HttpResponse::from_bytes(500, "")]);
        let overrides = ConfigOverrides::default().with_stream(false);
        let _: Vec<String> = session.send("still here?", &overrides).collect().await;
        assert_eq!(session.history().messages()[0].content, "still here?");
    }

    #[test]
    fn export_lands_in_exports_dir() {
        let dir = tempfile::tempdir().unwrap();
        let (session, _) = open(dir.path(), vec![]);
        let path = session.export(ExportFormat::Json).unwrap();
        assert!(path.starts_with(&session.paths().exports));
        assert!(path.exists());
    }
}
