use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MemoryKind {
    #[default]
    Fact,
    Preference,
    Instruction,
    Example,
}

impl MemoryKind {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "fact" => Some(Self::Fact),
            "preference" | "pref" => Some(Self::Preference),
            "instruction" => Some(Self::Instruction),
            "example" => Some(Self::Example),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fact => "fact",
            Self::Preference => "preference",
            Self::Instruction => "instruction",
            Self::Example => "example",
        }
    }
}

impl fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Memory {
    pub id: String,
    pub content: String,
    /// Always within `[0, 1]`.
    pub importance: f32,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub kind: MemoryKind,
    pub created_at: DateTime<Utc>,
}

/// Input for [`super::ContextManager::add_memory`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewMemory {
    pub content: String,
    pub importance: f32,
    pub tags: BTreeSet<String>,
    pub kind: MemoryKind,
}

impl NewMemory {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            importance: 0.5,
            tags: BTreeSet::new(),
            kind: MemoryKind::Fact,
        }
    }

    pub fn importance(mut self, importance: f32) -> Self {
        self.importance = importance;
        self
    }

    pub fn kind(mut self, kind: MemoryKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

/// A named scope of memories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Context {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub memories: Vec<Memory>,
    pub created_at: DateTime<Utc>,
}

/// A memory and how well it matched a search.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryMatch<'a> {
    pub memory: &'a Memory,
    pub context_id: &'a str,
    /// Fraction of query keywords found in the memory.
    pub overlap: f32,
    pub score: f32,
}
