use async_trait::async_trait;
use parley_core::*;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc::unbounded_channel;

// ── Mock client ──────────────────────────────────────────────────────────────

#[derive(Clone)]
enum Reply {
    Text(&'static str),
    Stream(Vec<&'static str>),
    Fail(ProviderError),
    /// Streams the parts, then closes without `Done`.
    CutShort(Vec<&'static str>),
    Hang,
}

struct MockLlm {
    reply: Reply,
    requests: Requests,
}

impl MockLlm {
    fn new(reply: Reply) -> (Self, Requests) {
        let requests = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                reply,
                requests: requests.clone(),
            },
            requests,
        )
    }
}

#[async_trait]
impl LlmClient for MockLlm {
    async fn chat(&self, messages: &[Message]) -> Result<LlmResponse> {
        self.requests.lock().unwrap().push(messages.to_vec());
        match &self.reply {
            Reply::Text(text) => Ok(LlmResponse {
                message: Message::assistant(*text),
                usage: None,
            }),
            Reply::Stream(parts) | Reply::CutShort(parts) => Ok(LlmResponse {
                message: Message::assistant(parts.concat()),
                usage: None,
            }),
            Reply::Fail(e) => Err(e.clone().into()),
            Reply::Hang => std::future::pending().await,
        }
    }

    async fn chat_stream(
        &self,
        messages: &[Message],
    ) -> Result<futures::channel::mpsc::UnboundedReceiver<StreamEvent>> {
        self.requests.lock().unwrap().push(messages.to_vec());
        let (tx, rx) = futures::channel::mpsc::unbounded();
        match &self.reply {
            Reply::Text(text) => {
                let _ = tx.unbounded_send(StreamEvent::TextDelta(text.to_string()));
                let _ = tx.unbounded_send(StreamEvent::Done);
            }
            Reply::Stream(parts) => {
                for part in parts {
                    let _ = tx.unbounded_send(StreamEvent::TextDelta(part.to_string()));
                }
                let _ = tx.unbounded_send(StreamEvent::Done);
            }
            Reply::Fail(e) => {
                let _ = tx.unbounded_send(StreamEvent::Error(e.clone()));
            }
            Reply::CutShort(parts) => {
                for part in parts {
                    let _ = tx.unbounded_send(StreamEvent::TextDelta(part.to_string()));
                }
            }
            Reply::Hang => {
                // Keep the sender alive so the stream never ends.
                std::mem::forget(tx);
            }
        }
        Ok(rx)
    }

    fn provider_name(&self) -> &str {
        "Mock"
    }

    fn model(&self) -> &str {
        "mock-model"
    }
}

// ── Fixtures ─────────────────────────────────────────────────────────────────

fn settings(dir: &TempDir) -> Settings {
    let mut settings = Settings::default();
    settings.openai.api_key = Some("sk-test-openai-0123456789abcdef".to_string());
    settings.anthropic.api_key = Some("sk-ant-REDACTED".to_string());
    settings.data_dir = Some(dir.path().to_path_buf());
    settings
}

type Requests = Arc<Mutex<Vec<Vec<Message>>>>;

fn engine_with(settings: &Settings, reply: Reply) -> (ChatEngine, Requests) {
    let (mock, requests) = MockLlm::new(reply);
    let data_dir = settings.data_dir();
    let engine = ChatEngine::new(
        Box::new(mock),
        ProviderId::OpenAI,
        SessionStore::open(&data_dir).unwrap(),
        ContextManager::open(&data_dir).unwrap(),
        ProviderRegistry::from_settings(settings),
    )
    .with_timeout(Duration::from_secs(5));
    (engine, requests)
}

fn engine(reply: Reply) -> (TempDir, ChatEngine, Requests) {
    let dir = TempDir::new().unwrap();
    let settings = settings(&dir);
    let (engine, requests) = engine_with(&settings, reply);
    (dir, engine, requests)
}

// ========================================================================
// Sending
// ========================================================================

#[tokio::test]
async fn test_send_appends_turn_and_autosaves() {
    let (dir, mut engine, requests) = engine(Reply::Text("Hi! How can I help?"));

    let reply = engine.send("  hello there  ", None).await.unwrap();
    assert_eq!(reply, "Hi! How can I help?");
    assert_eq!(engine.last_response(), Some("Hi! How can I help?"));

    let history = engine.history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].role, Role::User);
    assert_eq!(history[0].content, "hello there");
    assert_eq!(history[1].role, Role::Assistant);

    let sent = requests.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].len(), 1);
    assert_eq!(sent[0][0].content, "hello there");
    drop(sent);

    let store = SessionStore::open(dir.path()).unwrap();
    let saved = store.resume(&engine.session().id).unwrap();
    assert_eq!(saved.messages().len(), 2);
    assert_eq!(saved.title, "hello there");
}

#[tokio::test]
async fn test_send_includes_prior_history() {
    let (_dir, mut engine, requests) = engine(Reply::Text("ok"));
    engine.send("first", None).await.unwrap();
    engine.send("second", None).await.unwrap();

    let sent = requests.lock().unwrap();
    let contents: Vec<&str> = sent[1].iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["first", "ok", "second"]);
}

#[tokio::test]
async fn test_empty_input_rejected_without_calling_provider() {
    let (_dir, mut engine, requests) = engine(Reply::Text("unused"));
    assert!(matches!(
        engine.send("   ", None).await,
        Err(ParleyError::Validation(_))
    ));
    assert!(requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_streaming_emits_deltas_then_complete() {
    let (_dir, engine, _) = engine(Reply::Stream(vec!["Hel", "lo", "!"]));
    let mut engine = engine.with_streaming(true);
    let (tx, mut rx) = unbounded_channel();

    let reply = engine.send("greet me", Some(&tx)).await.unwrap();
    assert_eq!(reply, "Hello!");

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    assert_eq!(
        events,
        vec![
            ChatEvent::TextDelta("Hel".into()),
            ChatEvent::TextDelta("lo".into()),
            ChatEvent::TextDelta("!".into()),
            ChatEvent::Complete,
        ]
    );
    assert_eq!(engine.history()[1].content, "Hello!");
}

// ========================================================================
// Failures leave state untouched
// ========================================================================

#[tokio::test]
async fn test_provider_error_leaves_history_unchanged() {
    let (_dir, mut engine, _) = engine(Reply::Fail(ProviderError::RateLimit(
        "slow down".into(),
    )));

    let err = engine.send("hello", None).await.unwrap_err();
    assert!(matches!(
        err,
        ParleyError::Provider(ProviderError::RateLimit(_))
    ));
    assert!(engine.history().is_empty());
    assert!(engine.list_sessions().unwrap().is_empty());
}

#[tokio::test]
async fn test_stream_error_leaves_history_unchanged() {
    let (_dir, engine, _) = engine(Reply::Fail(ProviderError::Authentication(
        "bad key".into(),
    )));
    let mut engine = engine.with_streaming(true);

    let err = engine.send("hello", None).await.unwrap_err();
    assert!(matches!(
        err,
        ParleyError::Provider(ProviderError::Authentication(_))
    ));
    assert!(engine.history().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_timeout_is_network_error_and_appends_nothing() {
    let (_dir, mut engine, _) = engine(Reply::Hang);

    let err = engine.send("are you there?", None).await.unwrap_err();
    match err {
        ParleyError::Provider(ProviderError::Network(msg)) => {
            assert!(msg.contains("timed out"), "unexpected message: {msg}");
        }
        other => panic!("expected network error, got {other:?}"),
    }
    assert!(engine.history().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_stalled_stream_times_out() {
    let (_dir, engine, _) = engine(Reply::Hang);
    let mut engine = engine.with_streaming(true);

    assert!(matches!(
        engine.send("hello", None).await,
        Err(ParleyError::Provider(ProviderError::Network(_)))
    ));
    assert!(engine.history().is_empty());
}

#[tokio::test]
async fn test_stream_closed_before_done_appends_nothing() {
    let (_dir, engine, _) = engine(Reply::CutShort(vec!["Half an ", "ans"]));
    let mut engine = engine.with_streaming(true);
    let (tx, mut rx) = unbounded_channel();

    match engine.send("explain borrowing", Some(&tx)).await {
        Err(ParleyError::Provider(ProviderError::Network(msg))) => {
            assert!(msg.contains("ended before completion"), "unexpected message: {msg}");
        }
        other => panic!("expected network error, got {other:?}"),
    }
    assert!(engine.history().is_empty());
    assert!(engine.last_response().is_none());
    assert!(engine.list_sessions().unwrap().is_empty());

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    assert!(!events.contains(&ChatEvent::Complete));
}

#[tokio::test(start_paused = true)]
async fn test_dropping_send_mid_flight_leaves_session_untouched() {
    let (dir, mut engine, requests) = engine(Reply::Hang);
    engine.save(Some("Kept")).unwrap();
    let path = dir
        .path()
        .join("sessions")
        .join(format!("{}.json", engine.session().id));
    let before = std::fs::read(&path).unwrap();

    let cancelled = tokio::select! {
        _ = engine.send("never answered", None) => false,
        _ = tokio::time::sleep(Duration::from_millis(50)) => true,
    };
    assert!(cancelled);
    assert_eq!(requests.lock().unwrap().len(), 1);

    assert!(engine.history().is_empty());
    assert_eq!(engine.session().title, "Kept");
    assert_eq!(std::fs::read(&path).unwrap(), before);
}

#[tokio::test(start_paused = true)]
async fn test_dropping_first_send_writes_no_session_file() {
    let (dir, mut engine, _) = engine(Reply::Hang);

    tokio::select! {
        _ = engine.send("hello?", None) => panic!("hung provider answered"),
        _ = tokio::time::sleep(Duration::from_millis(50)) => {}
    }

    assert!(engine.history().is_empty());
    let path = dir
        .path()
        .join("sessions")
        .join(format!("{}.json", engine.session().id));
    assert!(!path.exists());
    assert!(engine.list_sessions().unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_autosave_rolls_back_turn() {
    let (dir, mut engine, _) = engine(Reply::Text("reply"));

    let sessions = dir.path().join("sessions");
    std::fs::remove_dir_all(&sessions).unwrap();
    std::fs::write(&sessions, "not a directory").unwrap();

    assert!(matches!(
        engine.send("hello", None).await,
        Err(ParleyError::Storage(_))
    ));
    assert!(engine.history().is_empty());
    assert_eq!(engine.session().title, "Untitled");
}

#[tokio::test]
async fn test_failed_index_write_restores_whole_session() {
    let (dir, mut engine, _) = engine(Reply::Text("reply"));
    engine.send("first", None).await.unwrap();
    let before = engine.session().clone();

    let index = dir.path().join("sessions").join("index.json");
    std::fs::remove_file(&index).unwrap();
    std::fs::create_dir_all(index.join("blocker")).unwrap();

    assert!(matches!(
        engine.send("second", None).await,
        Err(ParleyError::Storage(_))
    ));
    assert_eq!(engine.session(), &before);

    let on_disk = SessionStore::open(dir.path())
        .unwrap()
        .resume(&before.id)
        .unwrap();
    assert_eq!(on_disk, before);
}

// ========================================================================
// Memory injection
// ========================================================================

#[tokio::test]
async fn test_relevant_memories_injected_as_system_message() {
    let (_dir, mut engine, requests) = engine(Reply::Text("Use read_csv."));
    engine
        .create_context("Data work", "", BTreeSet::new())
        .unwrap();
    engine
        .add_memory(
            None,
            NewMemory::new("Prefers pandas for dataframes")
                .importance(0.8)
                .kind(MemoryKind::Preference),
        )
        .unwrap();
    engine
        .add_memory(None, NewMemory::new("Owns a cat named Miso"))
        .unwrap();

    let (tx, mut rx) = unbounded_channel();
    engine
        .send("how do I load dataframes?", Some(&tx))
        .await
        .unwrap();

    let sent = requests.lock().unwrap();
    let request = &sent[0];
    assert_eq!(request[0].role, Role::System);
    assert!(request[0].content.contains("pandas"));
    assert!(!request[0].content.contains("Miso"));
    assert_eq!(request.last().unwrap().content, "how do I load dataframes?");
    drop(sent);

    assert_eq!(rx.try_recv().unwrap(), ChatEvent::MemoriesInjected(1));
    // The note is per request only.
    assert_eq!(engine.history().len(), 2);
    assert!(engine.history().iter().all(|m| m.role != Role::System));
}

#[tokio::test]
async fn test_memory_search_targets_named_context() {
    let (_dir, mut engine, _) = engine(Reply::Text("ok"));
    engine.create_context("Work", "", BTreeSet::new()).unwrap();
    engine
        .add_memory(None, NewMemory::new("Deploys on Fridays are banned"))
        .unwrap();
    engine.create_context("Home", "", BTreeSet::new()).unwrap();
    engine
        .add_memory(None, NewMemory::new("Deploys the garden sprinkler on Fridays"))
        .unwrap();

    let active = engine.search_memories("fridays", None).unwrap();
    assert_eq!(active.len(), 1);
    assert!(active[0].memory.content.contains("garden"));

    let work = engine.search_memories("fridays", Some("work")).unwrap();
    assert_eq!(work.len(), 1);
    assert!(work[0].memory.content.contains("banned"));

    assert!(matches!(
        engine.search_memories("fridays", Some("gym")),
        Err(ParleyError::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_no_injection_without_overlap() {
    let (_dir, mut engine, requests) = engine(Reply::Text("ok"));
    engine.create_context("Pets", "", BTreeSet::new()).unwrap();
    engine
        .add_memory(None, NewMemory::new("Owns a cat named Miso"))
        .unwrap();

    engine.send("explain lifetimes", None).await.unwrap();
    let sent = requests.lock().unwrap();
    assert!(sent[0].iter().all(|m| m.role != Role::System));
}

// ========================================================================
// Session operations
// ========================================================================

#[tokio::test]
async fn test_clear_starts_new_root_branch() {
    let (_dir, mut engine, _) = engine(Reply::Text("ok"));
    engine.send("hello", None).await.unwrap();
    let first = engine.session().active_branch_id.clone();

    engine.clear().unwrap();
    assert!(engine.history().is_empty());
    assert_eq!(engine.session().branches.len(), 2);
    let active = engine.session().active_branch().unwrap();
    assert!(active.is_root());
    assert_eq!(active.title, "main 2");
    assert_eq!(engine.session().branch(&first).unwrap().messages.len(), 2);
}

#[tokio::test]
async fn test_fork_then_send_only_touches_fork() {
    let (_dir, mut engine, _) = engine(Reply::Text("ok"));
    engine.send("base", None).await.unwrap();
    let root = engine.session().active_branch_id.clone();

    let fork = engine.fork_branch(None, "try again").unwrap();
    assert_eq!(engine.session().active_branch_id, fork);
    engine.send("different question", None).await.unwrap();

    assert_eq!(engine.session().branch(&root).unwrap().messages.len(), 2);
    assert_eq!(engine.session().branch(&fork).unwrap().messages.len(), 4);
}

#[tokio::test]
async fn test_save_resume_and_delete_current_session() {
    let (_dir, mut engine, _) = engine(Reply::Text("ok"));
    engine.send("hello", None).await.unwrap();
    let id = engine.save(Some("Greetings")).unwrap().id.clone();

    engine.clear().unwrap();
    let resumed = engine.resume(&id[..8]).unwrap();
    assert_eq!(resumed.title, "Greetings");
    assert_eq!(engine.last_response(), Some("ok"));

    engine.delete_session(&id).unwrap();
    assert_ne!(engine.session().id, id);
    assert!(engine.history().is_empty());
    assert!(matches!(
        engine.resume(&id),
        Err(ParleyError::NotFound { .. })
    ));
}

// ========================================================================
// Provider switching
// ========================================================================

#[tokio::test]
async fn test_set_provider_and_model() {
    let (_dir, mut engine, _) = engine(Reply::Text("ok"));

    engine.set_provider("anthropic").unwrap();
    assert_eq!(engine.provider(), ProviderId::Anthropic);
    assert_eq!(engine.model(), "claude-3-5-sonnet-20241022");

    engine.set_model("gpt-4o-mini").unwrap();
    assert_eq!(engine.provider(), ProviderId::OpenAI);
    assert_eq!(engine.session().model, "gpt-4o-mini");

    assert!(matches!(
        engine.set_provider("gemini"),
        Err(ParleyError::Validation(_))
    ));
    assert_eq!(engine.provider(), ProviderId::OpenAI);
}

#[tokio::test]
async fn test_set_provider_without_key_keeps_current() {
    let dir = TempDir::new().unwrap();
    let mut settings = settings(&dir);
    settings.anthropic.api_key = None;
    let (mut engine, _) = engine_with(&settings, Reply::Text("ok"));

    assert!(matches!(
        engine.set_provider("anthropic"),
        Err(ParleyError::Config(_))
    ));
    assert_eq!(engine.provider(), ProviderId::OpenAI);
    assert_eq!(engine.model(), "mock-model");
    assert_eq!(engine.available_providers(), vec![ProviderId::OpenAI]);
}
