//! Branch tree operations on a [`Session`].
//!
//! Branches live in an arena keyed by id. `parent_id` links are checked on
//! every operation that can change them, so the graph stays a forest.

use super::model::{Branch, Session};
use crate::constants::ranking;
use crate::error::{ParleyError, Result};
use crate::llm::{Message, Role};
use crate::storage::resolve_prefix;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStrategy {
    /// Shared history, then the rest of A, then the rest of B.
    Append,
    /// Shared history, then both remainders ordered by timestamp.
    Interleave,
}

impl MergeStrategy {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "append" => Some(Self::Append),
            "interleave" | "interleave-by-timestamp" | "timestamp" => Some(Self::Interleave),
            _ => None,
        }
    }
}

/// What to do with the children of a branch being deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeletePolicy {
    /// Fail if the branch has children.
    #[default]
    Refuse,
    /// Delete the whole subtree.
    Cascade,
    /// Hand the children to the deleted branch's parent.
    Reparent,
}

/// A branch and how well it matched [`Session::search_branches`].
#[derive(Debug, Clone, PartialEq)]
pub struct BranchMatch<'a> {
    pub branch: &'a Branch,
    pub score: f32,
}

/// Counts over every branch of a session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionStats {
    pub branches: usize,
    pub roots: usize,
    pub messages: usize,
    pub user_messages: usize,
    pub assistant_messages: usize,
    /// Depth of the deepest branch; roots are depth 0.
    pub max_depth: usize,
}

impl SessionStats {
    pub fn average_messages(&self) -> f32 {
        if self.branches == 0 {
            0.0
        } else {
            self.messages as f32 / self.branches as f32
        }
    }
}

impl Session {
    pub fn active_branch(&self) -> Result<&Branch> {
        self.branch(&self.active_branch_id)
    }

    pub fn branch(&self, id: &str) -> Result<&Branch> {
        self.branches
            .get(id)
            .ok_or_else(|| ParleyError::not_found("Branch", id))
    }

    /// Messages of the active branch.
    pub fn messages(&self) -> &[Message] {
        self.branches
            .get(&self.active_branch_id)
            .map(|b| b.messages.as_slice())
            .unwrap_or(&[])
    }

    /// Append to the active branch.
    pub fn append(&mut self, message: Message) -> Result<()> {
        let id = self.active_branch_id.clone();
        let branch = self
            .branches
            .get_mut(&id)
            .ok_or_else(|| ParleyError::not_found("Branch", id))?;
        branch.messages.push(message);
        self.touch();
        Ok(())
    }

    /// New empty branch. `parent` must exist when given.
    pub fn create_branch(&mut self, title: &str, parent: Option<&str>) -> Result<&Branch> {
        if let Some(parent) = parent {
            self.branch(parent)?;
        }
        let branch = Branch::new(non_empty_title(title)?, parent.map(str::to_string));
        tracing::debug!(branch = %branch.id, ?parent, "created branch");
        self.touch();
        Ok(self.branches.entry(branch.id.clone()).or_insert(branch))
    }

    /// Copy `branch_id`'s full history into a new child branch. The source is
    /// not touched.
    pub fn fork(&mut self, branch_id: &str, title: &str) -> Result<&Branch> {
        let source = self.branch(branch_id)?;
        let mut branch = Branch::new(non_empty_title(title)?, Some(source.id.clone()));
        branch.messages = source.messages.clone();
        branch.tags = source.tags.clone();

        tracing::debug!(from = %branch_id, branch = %branch.id, "forked branch");
        self.touch();
        Ok(self.branches.entry(branch.id.clone()).or_insert(branch))
    }

    pub fn switch_branch(&mut self, branch_id: &str) -> Result<()> {
        self.branch(branch_id)?;
        self.active_branch_id = branch_id.to_string();
        self.touch();
        Ok(())
    }

    /// Combine two branches into a new child of `a`. Neither input changes.
    ///
    /// History the two share through a fork appears once. With
    /// [`MergeStrategy::Interleave`] equal timestamps go to the branch created
    /// first, then to `a`.
    pub fn merge(
        &mut self,
        a: &str,
        b: &str,
        strategy: MergeStrategy,
        title: Option<&str>,
    ) -> Result<&Branch> {
        if a == b {
            return Err(ParleyError::validation("cannot merge a branch with itself"));
        }
        let left = self.branch(a)?;
        let right = self.branch(b)?;

        let shared = left
            .messages
            .iter()
            .zip(&right.messages)
            .take_while(|(x, y)| x == y)
            .count();

        let mut messages = left.messages[..shared].to_vec();
        let rest_a = &left.messages[shared..];
        let rest_b = &right.messages[shared..];

        match strategy {
            MergeStrategy::Append => {
                messages.extend_from_slice(rest_a);
                messages.extend_from_slice(rest_b);
            }
            MergeStrategy::Interleave => {
                let a_first = left.created_at <= right.created_at;
                let (mut i, mut j) = (0, 0);
                while i < rest_a.len() && j < rest_b.len() {
                    let (ta, tb) = (rest_a[i].timestamp, rest_b[j].timestamp);
                    if ta < tb || (ta == tb && a_first) {
                        messages.push(rest_a[i].clone());
                        i += 1;
                    } else {
                        messages.push(rest_b[j].clone());
                        j += 1;
                    }
                }
                messages.extend_from_slice(&rest_a[i..]);
                messages.extend_from_slice(&rest_b[j..]);
            }
        }

        let title = match title {
            Some(t) => non_empty_title(t)?,
            None => format!("merge: {} + {}", left.title, right.title),
        };
        let mut merged = Branch::new(title, Some(left.id.clone()));
        merged.messages = messages;
        merged.tags = left.tags.union(&right.tags).cloned().collect();

        tracing::debug!(a, b, ?strategy, branch = %merged.id, "merged branches");
        self.touch();
        Ok(self.branches.entry(merged.id.clone()).or_insert(merged))
    }

    /// Delete a branch. Returns the ids actually removed.
    pub fn delete_branch(&mut self, branch_id: &str, policy: DeletePolicy) -> Result<Vec<String>> {
        let target = self.branch(branch_id)?;
        let parent = target.parent_id.clone();
        let children = self.children_of(branch_id);

        let removed: Vec<String> = match policy {
            DeletePolicy::Refuse if !children.is_empty() => {
                return Err(ParleyError::validation(format!(
                    "branch '{}' has {} child branch(es); use --cascade or --reparent",
                    target.title,
                    children.len()
                )));
            }
            DeletePolicy::Cascade => self.subtree_ids(branch_id),
            DeletePolicy::Refuse | DeletePolicy::Reparent => vec![branch_id.to_string()],
        };

        if removed.len() >= self.branches.len() {
            return Err(ParleyError::validation("cannot delete the last branch"));
        }

        if policy == DeletePolicy::Reparent {
            for child in &children {
                if let Some(branch) = self.branches.get_mut(child) {
                    branch.parent_id = parent.clone();
                }
            }
        }

        for id in &removed {
            self.branches.remove(id);
        }

        if removed.contains(&self.active_branch_id) {
            let next = parent
                .filter(|p| self.branches.contains_key(p))
                .or_else(|| self.oldest_root());
            if let Some(next) = next {
                self.active_branch_id = next;
            }
        }

        tracing::debug!(branch = %branch_id, ?policy, removed = removed.len(), "deleted branch");
        self.touch();
        Ok(removed)
    }

    /// Move a branch under a new parent (or make it a root).
    pub fn reparent(&mut self, branch_id: &str, new_parent: Option<&str>) -> Result<()> {
        self.branch(branch_id)?;
        if let Some(parent) = new_parent {
            self.branch(parent)?;
            let mut cursor = Some(parent.to_string());
            while let Some(id) = cursor {
                if id == branch_id {
                    return Err(ParleyError::validation(
                        "reparenting would create a cycle",
                    ));
                }
                cursor = self.branches.get(&id).and_then(|b| b.parent_id.clone());
            }
        }

        if let Some(branch) = self.branches.get_mut(branch_id) {
            branch.parent_id = new_parent.map(str::to_string);
        }
        self.touch();
        Ok(())
    }

    /// Look a branch up by id, unique id prefix or exact title.
    pub fn resolve_branch(&self, key: &str) -> Result<String> {
        if let Some(id) = resolve_prefix("Branch", key, self.branches.keys().map(String::as_str))? {
            return Ok(id);
        }

        let by_title: Vec<&Branch> = self.branches.values().filter(|b| b.title == key).collect();
        match by_title.as_slice() {
            [one] => Ok(one.id.clone()),
            [] => Err(ParleyError::not_found("Branch", key)),
            _ => Err(ParleyError::validation(format!(
                "several branches are titled '{key}'; use an id"
            ))),
        }
    }

    pub fn add_branch_tag(&mut self, branch_id: &str, tag: &str) -> Result<()> {
        let branch = self
            .branches
            .get_mut(branch_id)
            .ok_or_else(|| ParleyError::not_found("Branch", branch_id))?;
        branch.tags.insert(tag.trim_start_matches('#').to_lowercase());
        self.touch();
        Ok(())
    }

    /// Case-insensitive search over branch titles, tags and message text.
    /// Only branches with at least one hit are returned, best first, newer
    /// branches winning ties.
    pub fn search_branches(&self, query: &str, limit: usize) -> Result<Vec<BranchMatch<'_>>> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Err(ParleyError::validation("search query cannot be empty"));
        }

        let mut matches: Vec<BranchMatch<'_>> = self
            .branches
            .values()
            .filter_map(|branch| {
                let mut score = 0.0;
                if branch.title.to_lowercase().contains(&needle) {
                    score += ranking::BRANCH_TITLE_WEIGHT;
                }
                let tags = branch.tags.iter().filter(|t| t.contains(&needle)).count();
                score += ranking::BRANCH_TAG_WEIGHT * tags as f32;
                let hits = branch
                    .messages
                    .iter()
                    .filter(|m| m.content.to_lowercase().contains(&needle))
                    .count();
                score += ranking::BRANCH_MESSAGE_WEIGHT * hits as f32;
                (score > 0.0).then_some(BranchMatch { branch, score })
            })
            .collect();

        matches.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| b.branch.created_at.cmp(&a.branch.created_at))
                .then_with(|| a.branch.id.cmp(&b.branch.id))
        });
        matches.truncate(limit);
        tracing::debug!(query, hits = matches.len(), "searched branches");
        Ok(matches)
    }

    pub fn stats(&self) -> SessionStats {
        let mut stats = SessionStats::default();
        for (branch, depth) in self.tree() {
            stats.branches += 1;
            if depth == 0 {
                stats.roots += 1;
            }
            stats.max_depth = stats.max_depth.max(depth);
            stats.messages += branch.messages.len();
            for msg in &branch.messages {
                match msg.role {
                    Role::User => stats.user_messages += 1,
                    Role::Assistant => stats.assistant_messages += 1,
                    Role::System => {}
                }
            }
        }
        stats
    }

    /// Pre-order walk of the forest, yielding each branch with its depth.
    /// Roots and siblings come in creation order.
    pub fn tree(&self) -> BranchTree<'_> {
        let mut children: HashMap<Option<&str>, Vec<&Branch>> = HashMap::new();
        for branch in self.branches.values() {
            let parent = branch
                .parent_id
                .as_deref()
                .filter(|p| self.branches.contains_key(*p));
            children.entry(parent).or_default().push(branch);
        }
        for list in children.values_mut() {
            list.sort_by(|x, y| x.created_at.cmp(&y.created_at).then_with(|| x.id.cmp(&y.id)));
        }

        let stack = children
            .get(&None)
            .map(|roots| roots.iter().rev().map(|b| (*b, 0)).collect())
            .unwrap_or_default();

        BranchTree { children, stack }
    }

    /// Check the structural invariants: the active branch and every parent
    /// exist, and no branch is its own ancestor.
    pub fn validate(&self) -> Result<()> {
        if !self.branches.contains_key(&self.active_branch_id) {
            return Err(ParleyError::storage(format!(
                "active branch {} does not exist",
                self.active_branch_id
            )));
        }
        for (id, branch) in &self.branches {
            if &branch.id != id {
                return Err(ParleyError::storage(format!("branch key {id} does not match its id")));
            }
            let mut seen = HashSet::new();
            let mut cursor = branch.parent_id.as_deref();
            while let Some(parent) = cursor {
                if !seen.insert(parent) || parent == id {
                    return Err(ParleyError::storage(format!("branch {id} is part of a cycle")));
                }
                let parent_branch = self.branches.get(parent).ok_or_else(|| {
                    ParleyError::storage(format!("branch {id} has missing parent {parent}"))
                })?;
                cursor = parent_branch.parent_id.as_deref();
            }
        }
        Ok(())
    }

    fn children_of(&self, branch_id: &str) -> Vec<String> {
        self.branches
            .values()
            .filter(|b| b.parent_id.as_deref() == Some(branch_id))
            .map(|b| b.id.clone())
            .collect()
    }

    fn subtree_ids(&self, branch_id: &str) -> Vec<String> {
        let mut ids = vec![branch_id.to_string()];
        let mut i = 0;
        while i < ids.len() {
            let next = self.children_of(&ids[i]);
            ids.extend(next);
            i += 1;
        }
        ids
    }

    fn oldest_root(&self) -> Option<String> {
        self.branches
            .values()
            .filter(|b| b.is_root())
            .min_by(|x, y| x.created_at.cmp(&y.created_at).then_with(|| x.id.cmp(&y.id)))
            .map(|b| b.id.clone())
    }
}

fn non_empty_title(title: &str) -> Result<String> {
    let title = title.trim();
    if title.is_empty() {
        return Err(ParleyError::validation("branch title cannot be empty"));
    }
    Ok(title.to_string())
}

/// Lazy pre-order iterator returned by [`Session::tree`].
pub struct BranchTree<'a> {
    children: HashMap<Option<&'a str>, Vec<&'a Branch>>,
    stack: Vec<(&'a Branch, usize)>,
}

impl<'a> Iterator for BranchTree<'a> {
    type Item = (&'a Branch, usize);

    fn next(&mut self) -> Option<Self::Item> {
        let (branch, depth) = self.stack.pop()?;
        if let Some(kids) = self.children.get(&Some(branch.id.as_str())) {
            self.stack.extend(kids.iter().rev().map(|b| (*b, depth + 1)));
        }
        Some((branch, depth))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ProviderId;
    use chrono::{Duration, Utc};

    fn session() -> Session {
        Session::new(ProviderId::OpenAI, "gpt-4o")
    }

    #[test]
    fn test_merge_strategy_parse() {
        assert_eq!(MergeStrategy::parse("append"), Some(MergeStrategy::Append));
        assert_eq!(MergeStrategy::parse("Interleave"), Some(MergeStrategy::Interleave));
        assert_eq!(MergeStrategy::parse("smart"), None);
    }

    #[test]
    fn test_create_branch_requires_existing_parent() {
        let mut s = session();
        let err = s.create_branch("orphan", Some("missing")).unwrap_err();
        assert!(matches!(err, ParleyError::NotFound { .. }));
        assert!(matches!(
            s.create_branch("   ", None),
            Err(ParleyError::Validation(_))
        ));
    }

    #[test]
    fn test_interleave_tie_goes_to_older_branch() {
        let mut s = session();
        let root = s.active_branch_id.clone();
        let t = Utc::now();

        let a = s.fork(&root, "a").unwrap().id.clone();
        let b = s.fork(&root, "b").unwrap().id.clone();
        s.branches.get_mut(&b).unwrap().created_at = t - Duration::seconds(10);

        s.branches.get_mut(&a).unwrap().messages.push(Message::user("from a").with_timestamp(t));
        s.branches.get_mut(&b).unwrap().messages.push(Message::user("from b").with_timestamp(t));

        let merged = s.merge(&a, &b, MergeStrategy::Interleave, None).unwrap();
        let contents: Vec<&str> = merged.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["from b", "from a"]);
        assert_eq!(merged.parent_id.as_deref(), Some(a.as_str()));
    }

    #[test]
    fn test_reparent_rejects_cycle() {
        let mut s = session();
        let root = s.active_branch_id.clone();
        let child = s.fork(&root, "child").unwrap().id.clone();
        let grandchild = s.fork(&child, "grandchild").unwrap().id.clone();

        assert!(matches!(
            s.reparent(&root, Some(&grandchild)),
            Err(ParleyError::Validation(_))
        ));
        s.reparent(&grandchild, None).unwrap();
        assert!(s.branch(&grandchild).unwrap().is_root());
        s.validate().unwrap();
    }

    #[test]
    fn test_resolve_branch_by_title_and_prefix() {
        let mut s = session();
        let root = s.active_branch_id.clone();
        let id = s.fork(&root, "Experiment").unwrap().id.clone();

        assert_eq!(s.resolve_branch("Experiment").unwrap(), id);
        assert_eq!(s.resolve_branch(&id[..8]).unwrap(), id);
        assert!(matches!(
            s.resolve_branch("nope"),
            Err(ParleyError::NotFound { .. })
        ));
    }

    #[test]
    fn test_search_branches_ranks_title_over_content() {
        let mut s = session();
        let root = s.active_branch_id.clone();
        s.append(Message::user("should I use SQLite here?")).unwrap();
        let sql = s.fork(&root, "SQL experiments").unwrap().id.clone();
        let other = s.create_branch("Cooking", None).unwrap().id.clone();
        s.add_branch_tag(&other, "dinner").unwrap();

        let hits = s.search_branches("sql", 5).unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.branch.id.as_str()).collect();
        // The fork carries the message too, so it scores title + message.
        assert_eq!(ids, vec![sql.as_str(), root.as_str()]);
        assert_eq!(hits[0].score, 3.5);

        let tagged = s.search_branches("DINNER", 5).unwrap();
        assert_eq!(tagged.len(), 1);
        assert_eq!(tagged[0].branch.id, other);

        assert!(s.search_branches("nothing like this", 5).unwrap().is_empty());
        assert!(matches!(
            s.search_branches("  ", 5),
            Err(ParleyError::Validation(_))
        ));
    }

    #[test]
    fn test_search_branches_respects_limit() {
        let mut s = session();
        let root = s.active_branch_id.clone();
        for i in 0..4 {
            s.fork(&root, &format!("idea {i}")).unwrap();
        }
        assert_eq!(s.search_branches("idea", 2).unwrap().len(), 2);
    }

    #[test]
    fn test_stats_counts_roles_and_depth() {
        let mut s = session();
        let root = s.active_branch_id.clone();
        s.append(Message::user("q")).unwrap();
        s.append(Message::assistant("a")).unwrap();
        let child = s.fork(&root, "child").unwrap().id.clone();
        s.fork(&child, "grandchild").unwrap();
        s.create_branch("second root", None).unwrap();

        let stats = s.stats();
        assert_eq!(stats.branches, 4);
        assert_eq!(stats.roots, 2);
        assert_eq!(stats.max_depth, 2);
        assert_eq!(stats.messages, 6);
        assert_eq!(stats.user_messages, 3);
        assert_eq!(stats.assistant_messages, 3);
        assert_eq!(stats.average_messages(), 1.5);
    }

    #[test]
    fn test_validate_detects_missing_parent() {
        let mut s = session();
        let root = s.active_branch_id.clone();
        s.branches.get_mut(&root).unwrap().parent_id = Some("ghost".into());
        assert!(matches!(s.validate(), Err(ParleyError::Storage(_))));
    }
}
