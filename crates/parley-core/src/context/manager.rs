use super::export;
use super::model::{Context, Memory, MemoryKind, MemoryMatch, NewMemory};
use crate::constants::{ranking, storage as layout};
use crate::error::{ParleyError, Result};
use crate::session::ExportFormat;
use crate::storage::{self, resolve_prefix};
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

/// Totals across every context.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextStats {
    pub contexts: usize,
    pub memories: usize,
    /// One entry per [`MemoryKind`], in declaration order.
    pub by_kind: Vec<(MemoryKind, usize)>,
    /// `None` when there are no memories.
    pub average_importance: Option<f32>,
}

/// Owns every context, one JSON file each, and the current selection.
pub struct ContextManager {
    base_dir: PathBuf,
    contexts: BTreeMap<String, Context>,
    active: Option<String>,
}

impl ContextManager {
    /// Manager under `<data_dir>/contexts`.
    pub fn open(data_dir: &Path) -> Result<Self> {
        Self::with_dir(data_dir.join(layout::CONTEXTS_DIR))
    }

    pub fn with_dir(base_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&base_dir).map_err(|e| {
            ParleyError::storage(format!("Failed to create contexts directory: {e}"))
        })?;

        let mut contexts = BTreeMap::new();
        let entries = fs::read_dir(&base_dir).map_err(|e| {
            ParleyError::storage(format!("Failed to read contexts directory: {e}"))
        })?;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match storage::read_json::<Context>(&path) {
                Ok(ctx) => {
                    contexts.insert(ctx.id.clone(), ctx);
                }
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping unreadable context"),
            }
        }
        tracing::debug!(count = contexts.len(), "loaded contexts");

        Ok(Self {
            base_dir,
            contexts,
            active: None,
        })
    }

    fn context_path(&self, id: &str) -> PathBuf {
        self.base_dir.join(format!("{id}.json"))
    }

    fn persist(&self, ctx: &Context) -> Result<()> {
        storage::write_json(&self.context_path(&ctx.id), ctx)
    }

    // ── Contexts ─────────────────────────────────────────────────────────

    pub fn create_context(
        &mut self,
        name: &str,
        description: &str,
        tags: BTreeSet<String>,
    ) -> Result<&Context> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ParleyError::validation("context name cannot be empty"));
        }
        if self.contexts.values().any(|c| c.name.eq_ignore_ascii_case(name)) {
            return Err(ParleyError::validation(format!(
                "a context named '{name}' already exists"
            )));
        }

        let description = match description.trim() {
            "" => format!("Conversation about {name}"),
            d => d.to_string(),
        };
        let ctx = Context {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            description,
            tags: normalize_tags(tags),
            memories: Vec::new(),
            created_at: Utc::now(),
        };
        self.persist(&ctx)?;

        tracing::info!(context = %ctx.id, name = %ctx.name, "context created");
        Ok(self.contexts.entry(ctx.id.clone()).or_insert(ctx))
    }

    /// Id for an id, unique id prefix or name (case-insensitive).
    pub fn resolve_context(&self, key: &str) -> Result<String> {
        if let Some(id) = resolve_prefix("Context", key, self.contexts.keys().map(String::as_str))? {
            return Ok(id);
        }
        self.contexts
            .values()
            .find(|c| c.name.eq_ignore_ascii_case(key.trim()))
            .map(|c| c.id.clone())
            .ok_or_else(|| ParleyError::not_found("Context", key))
    }

    /// Make a context active. On failure the previous selection stays.
    pub fn switch_context(&mut self, key: &str) -> Result<&Context> {
        let id = self.resolve_context(key)?;
        self.active = Some(id.clone());
        self.context(&id)
    }

    pub fn context(&self, id: &str) -> Result<&Context> {
        self.contexts
            .get(id)
            .ok_or_else(|| ParleyError::not_found("Context", id))
    }

    pub fn active(&self) -> Option<&Context> {
        self.active.as_deref().and_then(|id| self.contexts.get(id))
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active.as_deref()
    }

    /// Restore a selection recorded elsewhere, e.g. in a resumed session.
    /// Unknown ids clear the selection.
    pub fn restore_active(&mut self, id: Option<&str>) {
        self.active = match id {
            Some(id) if self.contexts.contains_key(id) => Some(id.to_string()),
            Some(id) => {
                tracing::warn!(context = %id, "recorded context no longer exists");
                None
            }
            None => None,
        };
    }

    /// Contexts in creation order.
    pub fn list_contexts(&self) -> Vec<&Context> {
        let mut list: Vec<&Context> = self.contexts.values().collect();
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.name.cmp(&b.name)));
        list
    }

    /// Delete a context and all of its memories.
    pub fn delete_context(&mut self, key: &str) -> Result<Context> {
        let id = self.resolve_context(key)?;
        let path = self.context_path(&id);
        if path.exists() {
            storage::remove_file(&path)?;
        }
        if self.active.as_deref() == Some(id.as_str()) {
            self.active = None;
        }
        tracing::info!(context = %id, "context deleted");
        self.contexts
            .remove(&id)
            .ok_or_else(|| ParleyError::not_found("Context", id))
    }

    /// Render `key`, or the active context when `None`, with its memories.
    pub fn export_context(&self, key: Option<&str>, format: ExportFormat) -> Result<(&Context, String)> {
        let ctx = self.context(&self.target_id(key)?)?;
        let text = export::render(ctx, format)?;
        tracing::debug!(context = %ctx.id, ?format, "context exported");
        Ok((ctx, text))
    }

    pub fn stats(&self) -> ContextStats {
        let memories: Vec<&Memory> = self.contexts.values().flat_map(|c| &c.memories).collect();
        let by_kind = [
            MemoryKind::Fact,
            MemoryKind::Preference,
            MemoryKind::Instruction,
            MemoryKind::Example,
        ]
        .into_iter()
        .map(|kind| (kind, memories.iter().filter(|m| m.kind == kind).count()))
        .collect();
        let average_importance = (!memories.is_empty()).then(|| {
            memories.iter().map(|m| m.importance).sum::<f32>() / memories.len() as f32
        });

        ContextStats {
            contexts: self.contexts.len(),
            memories: memories.len(),
            by_kind,
            average_importance,
        }
    }

    // ── Memories ─────────────────────────────────────────────────────────

    fn target_id(&self, context: Option<&str>) -> Result<String> {
        match context {
            Some(key) => self.resolve_context(key),
            None => self.active.clone().ok_or_else(|| {
                ParleyError::validation("no active context; create or switch to one first")
            }),
        }
    }

    /// Store a memory in `context`, or the active context when `None`.
    pub fn add_memory(&mut self, context: Option<&str>, new: NewMemory) -> Result<Memory> {
        if !new.importance.is_finite() || !(0.0..=1.0).contains(&new.importance) {
            return Err(ParleyError::validation(format!(
                "importance must be between 0 and 1, got {}",
                new.importance
            )));
        }
        let content = new.content.trim();
        if content.is_empty() {
            return Err(ParleyError::validation("memory content cannot be empty"));
        }

        let id = self.target_id(context)?;
        let memory = Memory {
            id: uuid::Uuid::new_v4().to_string(),
            content: content.to_string(),
            importance: new.importance,
            tags: normalize_tags(new.tags),
            kind: new.kind,
            created_at: Utc::now(),
        };

        let mut updated = self.context(&id)?.clone();
        updated.memories.push(memory.clone());
        self.persist(&updated)?;
        self.contexts.insert(id.clone(), updated);

        tracing::debug!(context = %id, memory = %memory.id, "memory added");
        Ok(memory)
    }

    pub fn list_memories(&self, context: Option<&str>) -> Result<&[Memory]> {
        let id = self.target_id(context)?;
        Ok(&self.context(&id)?.memories)
    }

    pub fn delete_memory(&mut self, context: Option<&str>, memory_key: &str) -> Result<Memory> {
        let id = self.target_id(context)?;
        let ctx = self.context(&id)?;
        let memory_id = resolve_prefix("Memory", memory_key, ctx.memories.iter().map(|m| m.id.as_str()))?
            .ok_or_else(|| ParleyError::not_found("Memory", memory_key))?;

        let mut updated = ctx.clone();
        let pos = updated
            .memories
            .iter()
            .position(|m| m.id == memory_id)
            .ok_or_else(|| ParleyError::not_found("Memory", memory_key))?;
        let removed = updated.memories.remove(pos);
        self.persist(&updated)?;
        self.contexts.insert(id, updated);
        Ok(removed)
    }

    /// Rank memories against `query`. Searches `context` when given, the
    /// active context otherwise, and every context when nothing is active.
    pub fn search_memories(
        &self,
        query: &str,
        context: Option<&str>,
        limit: usize,
    ) -> Result<Vec<MemoryMatch<'_>>> {
        let scope: Vec<&Context> = match context {
            Some(key) => vec![self.context(&self.resolve_context(key)?)?],
            None => match self.active() {
                Some(ctx) => vec![ctx],
                None => self.contexts.values().collect(),
            },
        };

        let keywords = keywords(query);
        let mut matches: Vec<MemoryMatch<'_>> = scope
            .into_iter()
            .flat_map(|ctx| {
                let keywords = &keywords;
                ctx.memories.iter().map(move |memory| {
                    let overlap = keyword_overlap(keywords, memory);
                    MemoryMatch {
                        memory,
                        context_id: ctx.id.as_str(),
                        overlap,
                        score: ranking::TEXT_MATCH_WEIGHT * overlap
                            + ranking::IMPORTANCE_WEIGHT * memory.importance,
                    }
                })
            })
            .collect();

        matches.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| b.memory.created_at.cmp(&a.memory.created_at))
        });
        matches.truncate(limit);
        Ok(matches)
    }

    /// Memories of the active context that share at least one keyword with
    /// `query`, best first.
    pub fn relevant_memories(&self, query: &str, limit: usize) -> Vec<&Memory> {
        let Some(ctx) = self.active() else {
            return Vec::new();
        };
        let keywords = keywords(query);
        let mut scored: Vec<(f32, &Memory)> = ctx
            .memories
            .iter()
            .filter_map(|m| {
                let overlap = keyword_overlap(&keywords, m);
                (overlap > 0.0).then(|| {
                    (
                        ranking::TEXT_MATCH_WEIGHT * overlap + ranking::IMPORTANCE_WEIGHT * m.importance,
                        m,
                    )
                })
            })
            .collect();
        scored.sort_by(|a, b| {
            b.0.total_cmp(&a.0)
                .then_with(|| b.1.created_at.cmp(&a.1.created_at))
        });
        scored.into_iter().take(limit).map(|(_, m)| m).collect()
    }
}

fn normalize_tags(tags: BTreeSet<String>) -> BTreeSet<String> {
    tags.into_iter()
        .map(|t| t.trim().trim_start_matches('#').to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Lowercase alphanumeric words, deduplicated.
pub(crate) fn keywords(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .filter(|w| seen.insert(w.clone()))
        .collect()
}

fn keyword_overlap(query: &[String], memory: &Memory) -> f32 {
    if query.is_empty() {
        return 0.0;
    }
    let words: HashSet<String> = keywords(&memory.content).into_iter().collect();
    let matched = query
        .iter()
        .filter(|k| words.contains(*k) || memory.tags.iter().any(|t| t.contains(k.as_str())))
        .count();
    matched as f32 / query.len() as f32
}
