use crate::config::Settings;
use crate::constants::defaults;
use crate::context::{Context, ContextManager, Memory, MemoryMatch, NewMemory};
use crate::error::{ParleyError, ProviderError, Result};
use crate::llm::{LlmClient, Message, ProviderId, ProviderRegistry, StreamEvent};
use crate::session::{
    render_export, BranchMatch, DeletePolicy, ExportFormat, MergeStrategy, Session,
    SessionStore, SessionSummary,
};
use futures::StreamExt;
use std::collections::BTreeSet;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;

/// Events emitted while a chat turn is in flight.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    /// Memories from the active context were added to the request.
    MemoriesInjected(usize),
    TextDelta(String),
    Complete,
}

/// Owns all conversation state: the current session, contexts, storage and
/// the provider client. Every user-visible operation goes through here.
pub struct ChatEngine {
    session: Session,
    store: SessionStore,
    contexts: ContextManager,
    registry: ProviderRegistry,
    client: Box<dyn LlmClient>,
    streaming: bool,
    autosave: bool,
    timeout: Duration,
    last_response: Option<String>,
}

impl ChatEngine {
    pub fn new(
        client: Box<dyn LlmClient>,
        provider: ProviderId,
        store: SessionStore,
        contexts: ContextManager,
        registry: ProviderRegistry,
    ) -> Self {
        let session = store.create(provider, client.model());
        let timeout = registry.timeout();
        Self {
            session,
            store,
            contexts,
            registry,
            client,
            streaming: false,
            autosave: true,
            timeout,
            last_response: None,
        }
    }

    /// Wire everything up from loaded settings.
    pub fn from_settings(settings: &Settings, provider: ProviderId, model: &str) -> Result<Self> {
        let registry = ProviderRegistry::from_settings(settings);
        let client = registry.build_client(provider, model)?;
        let data_dir = settings.data_dir();
        let store = SessionStore::open(&data_dir)?;
        let contexts = ContextManager::open(&data_dir)?;

        Ok(Self::new(client, provider, store, contexts, registry)
            .with_streaming(settings.stream)
            .with_autosave(settings.autosave))
    }

    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    pub fn with_autosave(mut self, autosave: bool) -> Self {
        self.autosave = autosave;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    // ── State ────────────────────────────────────────────────────────────

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn history(&self) -> &[Message] {
        self.session.messages()
    }

    pub fn contexts(&self) -> &ContextManager {
        &self.contexts
    }

    pub fn provider(&self) -> ProviderId {
        self.session.provider
    }

    pub fn model(&self) -> &str {
        self.client.model()
    }

    pub fn streaming(&self) -> bool {
        self.streaming
    }

    pub fn toggle_streaming(&mut self) -> bool {
        self.streaming = !self.streaming;
        self.streaming
    }

    pub fn last_response(&self) -> Option<&str> {
        self.last_response.as_deref()
    }

    pub fn available_providers(&self) -> Vec<ProviderId> {
        self.registry.available_providers()
    }

    // ── Chat ─────────────────────────────────────────────────────────────

    /// Run one chat turn. State is only touched after the provider call has
    /// finished, so dropping this future or any error leaves the session
    /// exactly as it was.
    pub async fn send(
        &mut self,
        input: &str,
        events: Option<&UnboundedSender<ChatEvent>>,
    ) -> Result<String> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ParleyError::validation("message cannot be empty"));
        }

        let user_message = Message::user(input);
        let mut request = Vec::with_capacity(self.history().len() + 2);
        if let Some(note) = self.memory_note(input) {
            if let Some(tx) = events {
                let _ = tx.send(ChatEvent::MemoriesInjected(note.1));
            }
            request.push(Message::system(note.0));
        }
        request.extend_from_slice(self.history());
        request.push(user_message.clone());

        tracing::info!(
            provider = %self.session.provider,
            model = %self.client.model(),
            messages = request.len(),
            stream = self.streaming,
            "sending chat request"
        );

        let content = if self.streaming {
            self.call_streaming(&request, events).await?
        } else {
            self.call(&request).await?
        };

        if let Some(tx) = events {
            let _ = tx.send(ChatEvent::Complete);
        }

        self.commit_turn(user_message, Message::assistant(content.clone()))?;
        self.last_response = Some(content.clone());
        Ok(content)
    }

    async fn call(&self, request: &[Message]) -> Result<String> {
        let response = tokio::time::timeout(self.timeout, self.client.chat(request))
            .await
            .map_err(|_| self.timed_out())??;
        if let Some(usage) = &response.usage {
            tracing::debug!(
                input_tokens = usage.input_tokens,
                output_tokens = usage.output_tokens,
                "usage"
            );
        }
        Ok(response.message.content)
    }

    async fn call_streaming(
        &self,
        request: &[Message],
        events: Option<&UnboundedSender<ChatEvent>>,
    ) -> Result<String> {
        let mut rx = tokio::time::timeout(self.timeout, self.client.chat_stream(request))
            .await
            .map_err(|_| self.timed_out())??;

        let mut content = String::new();
        loop {
            let event = tokio::time::timeout(self.timeout, rx.next())
                .await
                .map_err(|_| self.timed_out())?;
            match event {
                Some(StreamEvent::TextDelta(text)) => {
                    if let Some(tx) = events {
                        let _ = tx.send(ChatEvent::TextDelta(text.clone()));
                    }
                    content.push_str(&text);
                }
                Some(StreamEvent::Error(e)) => return Err(e.into()),
                Some(StreamEvent::Done) => break,
                None => {
                    return Err(
                        ProviderError::stream_truncated(self.client.provider_name()).into(),
                    )
                }
            }
        }
        Ok(content)
    }

    fn timed_out(&self) -> ParleyError {
        tracing::warn!(timeout_secs = self.timeout.as_secs(), "provider request timed out");
        ProviderError::Network(format!(
            "{} request timed out after {}s",
            self.client.provider_name(),
            self.timeout.as_secs()
        ))
        .into()
    }

    /// System note listing the active context's memories relevant to `input`.
    fn memory_note(&self, input: &str) -> Option<(String, usize)> {
        let ctx = self.contexts.active()?;
        let memories = self
            .contexts
            .relevant_memories(input, defaults::INJECTED_MEMORIES);
        if memories.is_empty() {
            return None;
        }

        let mut note = format!("Context: {}. {}\nRelevant memories:", ctx.name, ctx.description);
        for m in &memories {
            note.push_str(&format!("\n- ({}) {}", m.kind, m.content));
        }
        Some((note, memories.len()))
    }

    fn commit_turn(&mut self, user: Message, assistant: Message) -> Result<()> {
        let snapshot = self.session.clone();

        let committed = self
            .session
            .append(user)
            .and_then(|_| self.session.append(assistant))
            .and_then(|_| if self.autosave { self.persist() } else { Ok(()) });

        if let Err(e) = committed {
            self.session = snapshot;
            return Err(e);
        }
        Ok(())
    }

    fn persist(&mut self) -> Result<()> {
        self.session.context_id = self.contexts.active_id().map(str::to_string);
        self.session.generate_title_from_first_message();
        self.store.save(&self.session)
    }

    /// Save after a structural change when autosave is on and there is
    /// something worth keeping.
    fn autosave(&mut self) -> Result<()> {
        if self.autosave && !self.session.is_empty() {
            self.persist()?;
        }
        Ok(())
    }

    // ── Provider ─────────────────────────────────────────────────────────

    pub fn set_provider(&mut self, name: &str) -> Result<()> {
        let provider = ProviderId::parse(name).ok_or_else(|| {
            ParleyError::validation(format!(
                "unknown provider '{name}' (expected openai or anthropic)"
            ))
        })?;
        self.switch_client(provider, provider.default_model())
    }

    /// Switch model. Known models of the other provider switch provider too.
    pub fn set_model(&mut self, model: &str) -> Result<()> {
        let model = model.trim();
        if model.is_empty() {
            return Err(ParleyError::validation("model name cannot be empty"));
        }
        let provider = ProviderRegistry::provider_for_model(model).unwrap_or(self.session.provider);
        if !provider.known_models().contains(&model) {
            tracing::warn!(model, provider = %provider, "model not in the known list");
        }
        self.switch_client(provider, model)
    }

    fn switch_client(&mut self, provider: ProviderId, model: &str) -> Result<()> {
        self.client = self.registry.build_client(provider, model)?;
        self.session.provider = provider;
        self.session.model = model.to_string();
        tracing::info!(provider = %provider, model, "switched model");
        self.autosave()
    }

    // ── Sessions ─────────────────────────────────────────────────────────

    /// Start a new empty root branch and make it active.
    pub fn clear(&mut self) -> Result<()> {
        let roots = self.session.branches.values().filter(|b| b.is_root()).count();
        let title = format!("{} {}", defaults::ROOT_BRANCH_TITLE, roots + 1);
        let id = self.session.create_branch(&title, None)?.id.clone();
        self.session.switch_branch(&id)?;
        self.autosave()
    }

    /// Save the current session, optionally naming it.
    pub fn save(&mut self, title: Option<&str>) -> Result<&Session> {
        if let Some(title) = title.map(str::trim).filter(|t| !t.is_empty()) {
            self.session.set_title(title);
        }
        self.persist()?;
        Ok(&self.session)
    }

    /// Load a saved session, restoring its provider, model and context.
    pub fn resume(&mut self, key: &str) -> Result<&Session> {
        let mut session = self.store.resume(key)?;

        match self.registry.build_client(session.provider, &session.model) {
            Ok(client) => self.client = client,
            Err(e) => {
                tracing::warn!(error = %e, "keeping current provider for resumed session");
                session.provider = self.session.provider;
                session.model = self.client.model().to_string();
            }
        }

        self.contexts.restore_active(session.context_id.as_deref());
        self.session = session;
        self.last_response = self
            .history()
            .iter()
            .rev()
            .find(|m| m.role == crate::llm::Role::Assistant)
            .map(|m| m.content.clone());
        Ok(&self.session)
    }

    pub fn list_sessions(&self) -> Result<Vec<SessionSummary>> {
        self.store.list()
    }

    /// Export a saved session, or the current one when `key` is `None`.
    pub fn export(&self, key: Option<&str>, format: ExportFormat) -> Result<String> {
        match key {
            Some(key) => self.store.export(key, format),
            None => render_export(&self.session, format),
        }
    }

    /// Delete a saved session. Deleting the current one starts afresh.
    pub fn delete_session(&mut self, key: &str) -> Result<String> {
        let id = self.store.delete(key)?;
        if id == self.session.id {
            self.session = self.store.create(self.session.provider, self.client.model());
            self.last_response = None;
        }
        Ok(id)
    }

    // ── Branches ─────────────────────────────────────────────────────────

    /// Create an empty branch under `parent` (a root when `None`) and switch to it.
    pub fn create_branch(&mut self, title: &str, parent: Option<&str>) -> Result<String> {
        let parent = parent.map(|p| self.session.resolve_branch(p)).transpose()?;
        let id = self.session.create_branch(title, parent.as_deref())?.id.clone();
        self.session.switch_branch(&id)?;
        self.autosave()?;
        Ok(id)
    }

    /// Fork `from` (the active branch when `None`) and switch to the fork.
    pub fn fork_branch(&mut self, from: Option<&str>, title: &str) -> Result<String> {
        let source = match from {
            Some(key) => self.session.resolve_branch(key)?,
            None => self.session.active_branch_id.clone(),
        };
        let id = self.session.fork(&source, title)?.id.clone();
        self.session.switch_branch(&id)?;
        self.autosave()?;
        Ok(id)
    }

    pub fn switch_branch(&mut self, key: &str) -> Result<String> {
        let id = self.session.resolve_branch(key)?;
        self.session.switch_branch(&id)?;
        self.autosave()?;
        Ok(id)
    }

    /// Merge two branches into a new one and switch to it.
    pub fn merge_branches(&mut self, a: &str, b: &str, strategy: MergeStrategy) -> Result<String> {
        let a = self.session.resolve_branch(a)?;
        let b = self.session.resolve_branch(b)?;
        let id = self.session.merge(&a, &b, strategy, None)?.id.clone();
        self.session.switch_branch(&id)?;
        self.autosave()?;
        Ok(id)
    }

    pub fn delete_branch(&mut self, key: &str, policy: DeletePolicy) -> Result<Vec<String>> {
        let id = self.session.resolve_branch(key)?;
        let removed = self.session.delete_branch(&id, policy)?;
        self.autosave()?;
        Ok(removed)
    }

    pub fn search_branches(&self, query: &str) -> Result<Vec<BranchMatch<'_>>> {
        self.session
            .search_branches(query, defaults::BRANCH_SEARCH_LIMIT)
    }

    // ── Contexts and memories ────────────────────────────────────────────

    /// Create a context and make it active.
    pub fn create_context(
        &mut self,
        name: &str,
        description: &str,
        tags: BTreeSet<String>,
    ) -> Result<&Context> {
        let id = self.contexts.create_context(name, description, tags)?.id.clone();
        self.switch_context(&id)
    }

    pub fn switch_context(&mut self, key: &str) -> Result<&Context> {
        let id = self.contexts.switch_context(key)?.id.clone();
        self.session.context_id = Some(id.clone());
        self.autosave()?;
        self.contexts.context(&id)
    }

    pub fn delete_context(&mut self, key: &str) -> Result<Context> {
        let removed = self.contexts.delete_context(key)?;
        if self.session.context_id.as_deref() == Some(removed.id.as_str()) {
            self.session.context_id = None;
            self.autosave()?;
        }
        Ok(removed)
    }

    /// Render a context (the active one when `key` is `None`).
    pub fn export_context(
        &self,
        key: Option<&str>,
        format: ExportFormat,
    ) -> Result<(&Context, String)> {
        self.contexts.export_context(key, format)
    }

    pub fn add_memory(&mut self, context: Option<&str>, memory: NewMemory) -> Result<Memory> {
        self.contexts.add_memory(context, memory)
    }

    /// Search `context` when given, otherwise the active context (or every
    /// context when none is active).
    pub fn search_memories(
        &self,
        query: &str,
        context: Option<&str>,
    ) -> Result<Vec<MemoryMatch<'_>>> {
        self.contexts
            .search_memories(query, context, defaults::MEMORY_SEARCH_LIMIT)
    }

    pub fn list_memories(&self, context: Option<&str>) -> Result<&[Memory]> {
        self.contexts.list_memories(context)
    }

    pub fn delete_memory(&mut self, context: Option<&str>, memory: &str) -> Result<Memory> {
        self.contexts.delete_memory(context, memory)
    }
}
