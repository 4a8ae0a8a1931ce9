use crate::constants::defaults;
use crate::llm::{Message, ProviderId, Role};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A named, ordered message history. `parent_id` is a back-reference only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Branch {
    pub id: String,
    pub parent_id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
}

impl Branch {
    pub fn new(title: impl Into<String>, parent_id: Option<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            parent_id,
            title: title.into(),
            tags: BTreeSet::new(),
            messages: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// The unit of save, resume, export and delete.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub id: String,
    pub title: String,
    /// Set once the user names the session; stops automatic titling.
    #[serde(default)]
    pub custom_title: bool,
    pub provider: ProviderId,
    pub model: String,
    pub active_branch_id: String,
    pub branches: BTreeMap<String, Branch>,
    #[serde(default)]
    pub context_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const UNTITLED: &str = "Untitled";

impl Session {
    /// A new session holding one empty root branch.
    pub fn new(provider: ProviderId, model: impl Into<String>) -> Self {
        let root = Branch::new(defaults::ROOT_BRANCH_TITLE, None);
        let now = root.created_at;
        let active_branch_id = root.id.clone();
        let mut branches = BTreeMap::new();
        branches.insert(root.id.clone(), root);

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: UNTITLED.to_string(),
            custom_title: false,
            provider,
            model: model.into(),
            active_branch_id,
            branches,
            context_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
        self.custom_title = true;
        self.touch();
    }

    /// Total messages across every branch.
    pub fn message_count(&self) -> usize {
        self.branches.values().map(|b| b.messages.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.message_count() == 0
    }

    /// Title from the first user message, cut to fit.
    pub fn generate_title_from_first_message(&mut self) {
        if self.custom_title {
            return;
        }
        let first = self
            .tree()
            .flat_map(|(branch, _)| branch.messages.iter())
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone());

        if let Some(content) = first {
            self.title = truncate_title(&content);
        }
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            provider: self.provider,
            model: self.model.clone(),
            updated_at: self.updated_at,
            message_count: self.message_count(),
            branch_count: self.branches.len(),
        }
    }
}

pub(crate) fn truncate_title(content: &str) -> String {
    let flat = content.split_whitespace().collect::<Vec<_>>().join(" ");
    let max = defaults::TITLE_MAX_CHARS;
    if flat.chars().count() > max {
        let cut: String = flat.chars().take(max).collect();
        format!("{}...", cut.trim_end())
    } else {
        flat
    }
}

/// Index entry for listing sessions without loading them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSummary {
    pub id: String,
    pub title: String,
    pub provider: ProviderId,
    pub model: String,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub message_count: usize,
    #[serde(default)]
    pub branch_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_has_single_root() {
        let session = Session::new(ProviderId::OpenAI, "gpt-4o");
        assert_eq!(session.branches.len(), 1);
        let root = &session.branches[&session.active_branch_id];
        assert!(root.is_root());
        assert_eq!(root.title, "main");
        assert!(session.is_empty());
    }

    #[test]
    fn test_title_generation() {
        let mut session = Session::new(ProviderId::OpenAI, "gpt-4o");
        session.append(Message::user("How do   I parse\nJSON?")).unwrap();
        session.generate_title_from_first_message();
        assert_eq!(session.title, "How do I parse JSON?");

        let mut long = Session::new(ProviderId::OpenAI, "gpt-4o");
        long.append(Message::user("a".repeat(80))).unwrap();
        long.generate_title_from_first_message();
        assert!(long.title.ends_with("..."));
        assert_eq!(long.title.chars().count(), 53);
    }

    #[test]
    fn test_custom_title_is_kept() {
        let mut session = Session::new(ProviderId::Anthropic, "claude-3-haiku-20240307");
        session.set_title("Rust questions");
        session.append(Message::user("something else")).unwrap();
        session.generate_title_from_first_message();
        assert_eq!(session.title, "Rust questions");
    }
}
