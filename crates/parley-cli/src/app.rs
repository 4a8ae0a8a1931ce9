use anyhow::Result;
use parley_core::{
    analysis::{Language, Linter, Severity},
    storage::{short_id, write_atomic},
    ChatEngine, ChatEvent, NewMemory, ParleyError, ProviderError, ProviderId, ProviderRegistry,
    Role, Settings,
};
use std::io::{self, Write};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::commands::{
    help_text, parse_command, BranchCommand, Command, ContextCommand, MemoryCommand,
};
use crate::render::{Line, Renderer, Span};
use crate::theme::Theme;

/// Startup choices taken from the command line.
#[derive(Debug, Clone, Default)]
pub struct StartOptions {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub stream: bool,
    pub resume: Option<String>,
}

/// Whether the REPL should keep going after a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Pick the provider and model and build the engine. Fails with
/// `ParleyError::Config` when no usable provider is configured.
pub fn build_engine(settings: &Settings, options: &StartOptions) -> parley_core::Result<ChatEngine> {
    let explicit = match options.provider.as_deref() {
        Some(name) => Some(ProviderId::parse(name).ok_or_else(|| {
            ParleyError::Config(format!(
                "unknown provider '{name}' (expected openai or anthropic)"
            ))
        })?),
        None => options
            .model
            .as_deref()
            .and_then(ProviderRegistry::provider_for_model),
    };

    let provider = match explicit {
        Some(p) => p,
        None => settings.require_provider()?,
    };
    let model = options
        .model
        .clone()
        .unwrap_or_else(|| settings.model_for(provider));

    let engine = ChatEngine::from_settings(settings, provider, &model)?;
    Ok(if options.stream {
        engine.with_streaming(true)
    } else {
        engine
    })
}

pub struct App<W: Write = io::Stdout> {
    engine: ChatEngine,
    renderer: Renderer,
    out: W,
}

impl App<io::Stdout> {
    pub fn new(engine: ChatEngine, theme: Theme) -> Self {
        Self {
            engine,
            renderer: Renderer::new(theme),
            out: io::stdout(),
        }
    }
}

impl<W: Write> App<W> {
    pub fn with_writer(engine: ChatEngine, renderer: Renderer, out: W) -> Self {
        Self {
            engine,
            renderer,
            out,
        }
    }

    pub fn engine(&self) -> &ChatEngine {
        &self.engine
    }

    pub fn writer(&self) -> &W {
        &self.out
    }

    pub fn theme(&self) -> &Theme {
        self.renderer.theme()
    }

    /// Interactive loop. Ctrl-C at the prompt quits; during a request it
    /// only cancels that request.
    pub async fn run(&mut self, resume: Option<&str>) -> Result<()> {
        self.welcome()?;
        if let Some(key) = resume {
            self.handle_line(&format!("/resume {key}")).await?;
        }

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            self.prompt()?;
            let line = tokio::select! {
                line = lines.next_line() => line?,
                _ = tokio::signal::ctrl_c() => {
                    writeln!(self.out)?;
                    break;
                }
            };
            let Some(line) = line else {
                // EOF
                writeln!(self.out)?;
                break;
            };
            if self.handle_line(&line).await? == Flow::Quit {
                break;
            }
        }

        self.renderer.note(&mut self.out, "Goodbye.")?;
        Ok(())
    }

    fn welcome(&mut self) -> Result<()> {
        let text = format!(
            "parley v{}\nProvider: {} · Model: {}\nStreaming: {} · Type /help for commands, /quit to exit.",
            env!("CARGO_PKG_VERSION"),
            self.engine.provider(),
            self.engine.model(),
            on_off(self.engine.streaming()),
        );
        self.renderer.system(&mut self.out, &text)?;
        Ok(())
    }

    fn prompt(&mut self) -> Result<()> {
        let branch = self
            .engine
            .session()
            .active_branch()
            .map(|b| b.title.clone())
            .unwrap_or_default();
        let context = self
            .engine
            .contexts()
            .active()
            .map(|c| format!(" @{}", c.name))
            .unwrap_or_default();
        write!(self.out, "[{branch}{context}] › ")?;
        self.out.flush()?;
        Ok(())
    }

    /// Handle one line of input. Recoverable errors are shown inline.
    pub async fn handle_line(&mut self, line: &str) -> Result<Flow> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(Flow::Continue);
        }

        let outcome = match parse_command(line) {
            Ok(Some(command)) => self.dispatch(command),
            Ok(None) => self.chat(line).await.map(|_| Flow::Continue),
            Err(e) => Err(e.into()),
        };

        match outcome {
            Ok(flow) => Ok(flow),
            Err(e) => {
                self.report(&e)?;
                Ok(Flow::Continue)
            }
        }
    }

    fn report(&mut self, err: &anyhow::Error) -> io::Result<()> {
        tracing::warn!(error = %err, "command failed");
        let text = match err.downcast_ref::<ParleyError>() {
            Some(ParleyError::Provider(ProviderError::Authentication(msg))) => format!(
                "{msg}\nCheck your API key. The conversation is unchanged."
            ),
            Some(ParleyError::Provider(ProviderError::RateLimit(msg))) => format!(
                "{msg}\nRate limited; wait a moment and send again. The conversation is unchanged."
            ),
            Some(ParleyError::Provider(e)) => {
                format!("{e}\nThe conversation is unchanged; you can retry.")
            }
            Some(ParleyError::Cancelled) => "Request cancelled.".to_string(),
            Some(e) => e.to_string(),
            None => format!("{err:#}"),
        };
        self.renderer.error(&mut self.out, &text)
    }

    // ── Chat ─────────────────────────────────────────────────────────────

    async fn chat(&mut self, input: &str) -> Result<()> {
        let streaming = self.engine.streaming();
        let model = self.engine.model().to_string();
        self.renderer.user(&mut self.out, input)?;
        if !streaming {
            self.renderer
                .note(&mut self.out, &format!("… waiting for {model}"))?;
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut started = false;
        let outcome = {
            let send = self.engine.send(input, Some(&tx));
            tokio::pin!(send);
            let cancel = tokio::signal::ctrl_c();
            tokio::pin!(cancel);

            loop {
                tokio::select! {
                    biased;
                    Some(event) = rx.recv() => {
                        handle_event(&self.renderer, &mut self.out, event, &model, &mut started)?;
                    }
                    result = &mut send => break result,
                    _ = &mut cancel => break Err(ParleyError::Cancelled),
                }
            }
        };

        while let Ok(event) = rx.try_recv() {
            handle_event(&self.renderer, &mut self.out, event, &model, &mut started)?;
        }
        if started {
            self.renderer.stream_end(&mut self.out)?;
        }

        let reply = outcome?;
        if !streaming {
            self.renderer.assistant(&mut self.out, &reply, &model)?;
        }
        Ok(())
    }

    // ── Commands ─────────────────────────────────────────────────────────

    fn dispatch(&mut self, command: Command) -> Result<Flow> {
        match command {
            Command::Help => self.renderer.lines(
                &mut self.out,
                "Commands",
                &help_text().lines().map(Line::plain).collect::<Vec<_>>(),
            )?,
            Command::Quit => return Ok(Flow::Quit),
            Command::Clear => {
                self.engine.clear()?;
                self.system("Started a new branch. Earlier messages remain in /branch tree.")?;
            }
            Command::History => self.show_history()?,
            Command::ToggleStream => {
                let on = self.engine.toggle_streaming();
                self.system(&format!("Streaming {}.", on_off(on)))?;
            }
            Command::Analyze(code) => self.analyze(&code)?,
            Command::Highlight(code) => {
                let language = Language::detect(&code);
                self.renderer.code(&mut self.out, &code, language.extension())?;
            }
            Command::Context(cmd) => self.context_command(cmd)?,
            Command::Branch(cmd) => self.branch_command(cmd)?,
            Command::Memory(cmd) => self.memory_command(cmd)?,
            Command::Save(title) => {
                let session = self.engine.save(title.as_deref())?;
                let text = format!("Saved session {} \"{}\".", short_id(&session.id), session.title);
                self.system(&text)?;
            }
            Command::Resume(key) => {
                let session = self.engine.resume(&key)?;
                let text = format!(
                    "Resumed \"{}\" ({}), {} messages on branch \"{}\", {} / {}.",
                    session.title,
                    short_id(&session.id),
                    session.messages().len(),
                    session.active_branch()?.title,
                    session.provider,
                    session.model,
                );
                self.system(&text)?;
                self.show_history()?;
            }
            Command::ListSessions => self.list_sessions()?,
            Command::Export { format, session } => {
                let text = self.engine.export(session.as_deref(), format)?;
                let id = session.unwrap_or_else(|| self.engine.session().id.clone());
                let path = std::path::PathBuf::from(format!(
                    "parley-{}.{}",
                    short_id(&id),
                    format.extension()
                ));
                write_atomic(&path, text.as_bytes())?;
                self.system(&format!("Exported to {}.", path.display()))?;
            }
            Command::DeleteSession(key) => {
                let id = self.engine.delete_session(&key)?;
                self.system(&format!("Deleted session {}.", short_id(&id)))?;
            }
            Command::SetProvider(name) => {
                self.engine.set_provider(&name)?;
                let text = format!(
                    "Provider set to {} (model {}).",
                    self.engine.provider(),
                    self.engine.model()
                );
                self.system(&text)?;
            }
            Command::SetModel(model) => {
                self.engine.set_model(&model)?;
                let text = format!(
                    "Model set to {} ({}).",
                    self.engine.model(),
                    self.engine.provider()
                );
                self.system(&text)?;
            }
            Command::Models => self.list_models()?,
            Command::Providers => self.list_providers()?,
            Command::Theme(None) => {
                let text = format!(
                    "Current theme: {}\nAvailable: {}",
                    self.renderer.theme().name,
                    Theme::all_names().join(", ")
                );
                self.system(&text)?;
            }
            Command::Theme(Some(name)) => {
                let theme = Theme::by_name(&name).ok_or_else(|| {
                    ParleyError::validation(format!(
                        "unknown theme '{name}' (available: {})",
                        Theme::all_names().join(", ")
                    ))
                })?;
                self.renderer.set_theme(theme);
                self.system(&format!("Theme set to {}.", self.renderer.theme().name))?;
            }
            Command::Copy => match self.engine.last_response() {
                Some(text) => {
                    crate::clipboard::copy(text)?;
                    self.system("Copied the last response to the clipboard.")?;
                }
                None => self.system("Nothing to copy yet.")?,
            },
            Command::Stats => self.show_stats()?,
        }
        Ok(Flow::Continue)
    }

    fn system(&mut self, text: &str) -> io::Result<()> {
        self.renderer.system(&mut self.out, text)
    }

    fn show_history(&mut self) -> Result<()> {
        let messages = self.engine.history().to_vec();
        if messages.is_empty() {
            return Ok(self.system("No conversation history yet.")?);
        }
        let model = self.engine.session().model.clone();
        for message in &messages {
            match message.role {
                Role::User => self.renderer.user(&mut self.out, &message.content)?,
                Role::Assistant => self.renderer.assistant(&mut self.out, &message.content, &model)?,
                Role::System => self.renderer.system(&mut self.out, &message.content)?,
            }
        }
        Ok(())
    }

    fn analyze(&mut self, code: &str) -> Result<()> {
        let analysis = Linter::analyze(code, None);
        let m = &analysis.metrics;
        let theme = self.renderer.theme().clone();

        let mut lines = vec![
            Line::plain(format!("Language: {}", analysis.language)),
            Line::plain(format!(
                "Lines: {} ({} blank, {} comment) · Characters: {}",
                m.lines, m.blank_lines, m.comment_lines, m.characters
            )),
            Line::plain(format!(
                "Functions: {} · Classes: {} · Imports: {} · Complexity: {}",
                list_or_dash(&m.functions),
                list_or_dash(&m.classes),
                list_or_dash(&m.imports),
                m.complexity
            )),
        ];
        if !analysis.issues.is_empty() {
            lines.push(Line::default());
            for issue in &analysis.issues {
                let color = match issue.severity {
                    Severity::Warning => theme.warning,
                    Severity::Info => theme.muted,
                };
                lines.push(Line(vec![Span::colored(
                    format!("line {}: {}", issue.line, issue.message),
                    color,
                )]));
            }
        }
        if !analysis.suggestions.is_empty() {
            lines.push(Line::default());
            for s in &analysis.suggestions {
                lines.push(Line(vec![Span::colored(format!("• {s}"), theme.success)]));
            }
        }

        self.renderer.lines(&mut self.out, "Code analysis", &lines)?;
        self.renderer
            .code(&mut self.out, code, analysis.language.extension())?;
        Ok(())
    }

    // ── Contexts ─────────────────────────────────────────────────────────

    fn context_command(&mut self, cmd: ContextCommand) -> Result<()> {
        match cmd {
            ContextCommand::Create {
                name,
                description,
                tags,
            } => {
                let ctx = self.engine.create_context(&name, &description, tags)?;
                let text = format!(
                    "Created context \"{}\" ({}) and made it active.",
                    ctx.name,
                    short_id(&ctx.id)
                );
                self.system(&text)?;
            }
            ContextCommand::Switch(key) => {
                let ctx = self.engine.switch_context(&key)?;
                let text = format!(
                    "Switched to context \"{}\" ({} memories).",
                    ctx.name,
                    ctx.memories.len()
                );
                self.system(&text)?;
            }
            ContextCommand::Info => {
                let text = match self.engine.contexts().active() {
                    Some(ctx) => format!(
                        "Context: {} ({})\n{}\nTags: {}\nMemories: {}\nCreated: {}",
                        ctx.name,
                        short_id(&ctx.id),
                        ctx.description,
                        join_or_dash(ctx.tags.iter()),
                        ctx.memories.len(),
                        ctx.created_at.format("%Y-%m-%d %H:%M"),
                    ),
                    None => "No active context. Use /context create <name>.".to_string(),
                };
                self.system(&text)?;
            }
            ContextCommand::List => {
                let active = self.engine.contexts().active_id().map(str::to_string);
                let contexts = self.engine.contexts().list_contexts();
                let text = if contexts.is_empty() {
                    "No contexts yet.".to_string()
                } else {
                    contexts
                        .iter()
                        .map(|c| {
                            let marker = if active.as_deref() == Some(c.id.as_str()) { "*" } else { " " };
                            format!(
                                "{marker} {}  {:<20}  {} memories  {}",
                                short_id(&c.id),
                                c.name,
                                c.memories.len(),
                                c.description
                            )
                        })
                        .collect::<Vec<_>>()
                        .join("\n")
                };
                self.system(&text)?;
            }
            ContextCommand::Delete(key) => {
                let removed = self.engine.delete_context(&key)?;
                let text = format!(
                    "Deleted context \"{}\" and {} memories.",
                    removed.name,
                    removed.memories.len()
                );
                self.system(&text)?;
            }
            ContextCommand::Export { format, context } => {
                let (ctx, text) = self.engine.export_context(context.as_deref(), format)?;
                let path = std::path::PathBuf::from(format!(
                    "parley-context-{}.{}",
                    short_id(&ctx.id),
                    format.extension()
                ));
                let name = ctx.name.clone();
                write_atomic(&path, text.as_bytes())?;
                self.system(&format!("Exported context \"{name}\" to {}.", path.display()))?;
            }
        }
        Ok(())
    }

    fn memory_command(&mut self, cmd: MemoryCommand) -> Result<()> {
        match cmd {
            MemoryCommand::Add {
                content,
                importance,
                tags,
                kind,
            } => {
                let memory = self.engine.add_memory(
                    None,
                    NewMemory::new(content)
                        .importance(importance)
                        .tags(tags)
                        .kind(kind),
                )?;
                let text = format!(
                    "Remembered ({}, importance {:.2}) {}.",
                    memory.kind,
                    memory.importance,
                    short_id(&memory.id)
                );
                self.system(&text)?;
            }
            MemoryCommand::Search { query, context } => {
                let results = self.engine.search_memories(&query, context.as_deref())?;
                let text = if results.is_empty() {
                    "No memories found.".to_string()
                } else {
                    results
                        .iter()
                        .map(|r| {
                            format!(
                                "{:.2}  {}  [{}] {}",
                                r.score,
                                short_id(&r.memory.id),
                                r.memory.kind,
                                r.memory.content
                            )
                        })
                        .collect::<Vec<_>>()
                        .join("\n")
                };
                self.system(&text)?;
            }
            MemoryCommand::List => {
                let memories = self.engine.list_memories(None)?;
                let text = if memories.is_empty() {
                    "This context has no memories.".to_string()
                } else {
                    memories
                        .iter()
                        .map(|m| {
                            format!(
                                "{}  {:.2}  [{}] {}{}",
                                short_id(&m.id),
                                m.importance,
                                m.kind,
                                m.content,
                                if m.tags.is_empty() {
                                    String::new()
                                } else {
                                    format!("  #{}", m.tags.iter().cloned().collect::<Vec<_>>().join(" #"))
                                }
                            )
                        })
                        .collect::<Vec<_>>()
                        .join("\n")
                };
                self.system(&text)?;
            }
            MemoryCommand::Delete(key) => {
                let removed = self.engine.delete_memory(None, &key)?;
                self.system(&format!("Forgot \"{}\".", removed.content))?;
            }
        }
        Ok(())
    }

    // ── Branches ─────────────────────────────────────────────────────────

    fn branch_command(&mut self, cmd: BranchCommand) -> Result<()> {
        match cmd {
            BranchCommand::Create { title, parent } => {
                self.engine.create_branch(&title, parent.as_deref())?;
                self.system(&format!("Created and switched to branch \"{title}\"."))?;
            }
            BranchCommand::Fork { title, from } => {
                let title = match title {
                    Some(t) => t,
                    None => {
                        let session = self.engine.session();
                        let source = match from.as_deref() {
                            Some(key) => session.branch(&session.resolve_branch(key)?)?,
                            None => session.active_branch()?,
                        };
                        format!("{} (fork)", source.title)
                    }
                };
                self.engine.fork_branch(from.as_deref(), &title)?;
                let count = self.engine.history().len();
                self.system(&format!(
                    "Forked into \"{title}\" with {count} messages. Now on the fork."
                ))?;
            }
            BranchCommand::Switch(key) => {
                let id = self.engine.switch_branch(&key)?;
                let branch = self.engine.session().branch(&id)?;
                let text = format!(
                    "Switched to branch \"{}\" ({} messages).",
                    branch.title,
                    branch.messages.len()
                );
                self.system(&text)?;
            }
            BranchCommand::Tree => {
                let session = self.engine.session();
                let lines: Vec<Line> = session
                    .tree()
                    .map(|(branch, depth)| {
                        let active = branch.id == session.active_branch_id;
                        let marker = if active { "● " } else { "○ " };
                        let text = format!(
                            "{}{marker}{}  {}  ({} messages)",
                            "  ".repeat(depth),
                            branch.title,
                            short_id(&branch.id),
                            branch.messages.len()
                        );
                        if active {
                            Line(vec![Span::colored(text, self.renderer.theme().accent)])
                        } else {
                            Line::plain(text)
                        }
                    })
                    .collect();
                self.renderer.lines(&mut self.out, "Branches", &lines)?;
            }
            BranchCommand::Info => {
                let session = self.engine.session();
                let branch = session.active_branch()?;
                let parent = branch
                    .parent_id
                    .as_deref()
                    .and_then(|p| session.branches.get(p))
                    .map(|p| p.title.clone())
                    .unwrap_or_else(|| "none (root)".to_string());
                let children = session
                    .branches
                    .values()
                    .filter(|b| b.parent_id.as_deref() == Some(branch.id.as_str()))
                    .count();
                let text = format!(
                    "Branch: {} ({})\nParent: {}\nChildren: {}\nMessages: {}\nTags: {}\nCreated: {}",
                    branch.title,
                    short_id(&branch.id),
                    parent,
                    children,
                    branch.messages.len(),
                    join_or_dash(branch.tags.iter()),
                    branch.created_at.format("%Y-%m-%d %H:%M"),
                );
                self.system(&text)?;
            }
            BranchCommand::Search(query) => {
                let session = self.engine.session();
                let hits = self.engine.search_branches(&query)?;
                let text = if hits.is_empty() {
                    format!("No branches match \"{query}\".")
                } else {
                    hits.iter()
                        .map(|h| {
                            let marker = if h.branch.id == session.active_branch_id { "●" } else { " " };
                            format!(
                                "{marker} {:>4.1}  {}  {}  ({} messages)",
                                h.score,
                                short_id(&h.branch.id),
                                h.branch.title,
                                h.branch.messages.len()
                            )
                        })
                        .collect::<Vec<_>>()
                        .join("\n")
                };
                self.system(&text)?;
            }
            BranchCommand::Merge { a, b, strategy } => {
                let id = self.engine.merge_branches(&a, &b, strategy)?;
                let branch = self.engine.session().branch(&id)?;
                let text = format!(
                    "Merged into \"{}\" ({} messages). Now on the merged branch.",
                    branch.title,
                    branch.messages.len()
                );
                self.system(&text)?;
            }
            BranchCommand::Delete { branch, policy } => {
                let removed = self.engine.delete_branch(&branch, policy)?;
                let active = self.engine.session().active_branch()?.title.clone();
                self.system(&format!(
                    "Deleted {} branch(es). Active branch: \"{active}\".",
                    removed.len()
                ))?;
            }
        }
        Ok(())
    }

    // ── Listings ─────────────────────────────────────────────────────────

    fn list_sessions(&mut self) -> Result<()> {
        let sessions = self.engine.list_sessions()?;
        if sessions.is_empty() {
            return Ok(self.system("No saved sessions.")?);
        }
        let current = self.engine.session().id.clone();
        let lines: Vec<Line> = sessions
            .iter()
            .map(|s| {
                let marker = if s.id == current { "*" } else { " " };
                Line::plain(format!(
                    "{marker} {}  {}  {:>3} msgs  {:>2} br  {:<9} {:<26}  {}",
                    short_id(&s.id),
                    s.updated_at.format("%Y-%m-%d %H:%M"),
                    s.message_count,
                    s.branch_count,
                    s.provider,
                    s.model,
                    s.title
                ))
            })
            .collect();
        self.renderer.lines(&mut self.out, "Saved sessions", &lines)?;
        Ok(())
    }

    fn show_stats(&mut self) -> Result<()> {
        let session = self.engine.session().stats();
        let contexts = self.engine.contexts().stats();
        let kinds = contexts
            .by_kind
            .iter()
            .map(|(kind, n)| format!("{kind} {n}"))
            .collect::<Vec<_>>()
            .join(", ");
        let average = contexts
            .average_importance
            .map(|a| format!("{a:.2}"))
            .unwrap_or_else(|| "-".to_string());

        let lines = vec![
            Line(vec![Span::colored("Session", self.renderer.theme().accent)]),
            Line::plain(format!(
                "  Branches: {} ({} roots, deepest at depth {})",
                session.branches, session.roots, session.max_depth
            )),
            Line::plain(format!(
                "  Messages: {} ({} user, {} assistant, {:.1} per branch)",
                session.messages,
                session.user_messages,
                session.assistant_messages,
                session.average_messages()
            )),
            Line(vec![Span::colored("Contexts", self.renderer.theme().accent)]),
            Line::plain(format!("  Contexts: {}", contexts.contexts)),
            Line::plain(format!("  Memories: {} ({kinds})", contexts.memories)),
            Line::plain(format!("  Average importance: {average}")),
        ];
        self.renderer.lines(&mut self.out, "Stats", &lines)?;
        Ok(())
    }

    fn list_models(&mut self) -> Result<()> {
        let current = self.engine.model().to_string();
        let mut lines = Vec::new();
        for provider in ProviderId::all() {
            lines.push(Line(vec![Span::colored(
                provider.name(),
                self.renderer.theme().accent,
            )]));
            for model in provider.known_models() {
                let marker = if *model == current { "●" } else { " " };
                lines.push(Line::plain(format!("  {marker} {model}")));
            }
        }
        self.renderer.lines(&mut self.out, "Models", &lines)?;
        Ok(())
    }

    fn list_providers(&mut self) -> Result<()> {
        let available = self.engine.available_providers();
        let current = self.engine.provider();
        let text = ProviderId::all()
            .into_iter()
            .map(|p| {
                let marker = if p == current { "●" } else { " " };
                let status = if available.contains(&p) {
                    "key configured"
                } else {
                    "no key"
                };
                format!("{marker} {:<10} {:<15} default model {}", p.key(), status, p.default_model())
            })
            .collect::<Vec<_>>()
            .join("\n");
        self.system(&text)?;
        Ok(())
    }
}

fn handle_event<W: Write>(
    renderer: &Renderer,
    out: &mut W,
    event: ChatEvent,
    model: &str,
    started: &mut bool,
) -> io::Result<()> {
    match event {
        ChatEvent::MemoriesInjected(n) => {
            renderer.note(out, &format!("(using {n} memories from the active context)"))
        }
        ChatEvent::TextDelta(text) => {
            if !*started {
                renderer.stream_start(out, model)?;
                *started = true;
            }
            renderer.stream_delta(out, &text)
        }
        ChatEvent::Complete => Ok(()),
    }
}

fn on_off(flag: bool) -> &'static str {
    if flag {
        "on"
    } else {
        "off"
    }
}

fn list_or_dash(items: &[String]) -> String {
    if items.is_empty() {
        "-".to_string()
    } else {
        items.join(", ")
    }
}

fn join_or_dash<'a>(items: impl Iterator<Item = &'a String>) -> String {
    let joined = items.cloned().collect::<Vec<_>>().join(", ");
    if joined.is_empty() {
        "-".to_string()
    } else {
        joined
    }
}
