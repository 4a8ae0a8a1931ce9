use parley_core::*;
use std::collections::HashSet;

fn session() -> Session {
    Session::new(ProviderId::OpenAI, "gpt-4o")
}

// ========================================================================
// Fork
// ========================================================================

#[test]
fn test_fork_copies_history_and_isolates_source() {
    let mut s = session();
    let b0 = s.active_branch_id.clone();
    s.append(Message::user("what is rust?")).unwrap();
    s.append(Message::assistant("a systems language")).unwrap();
    let before = s.branch(&b0).unwrap().messages.clone();

    let b1 = s.fork(&b0, "Experiment").unwrap().id.clone();
    s.switch_branch(&b1).unwrap();
    s.append(Message::user("hello")).unwrap();

    let source = s.branch(&b0).unwrap();
    let fork = s.branch(&b1).unwrap();
    assert_eq!(source.messages, before);
    assert_eq!(fork.parent_id.as_deref(), Some(b0.as_str()));
    assert_eq!(fork.title, "Experiment");
    assert_eq!(fork.messages.len(), before.len() + 1);
    assert_eq!(&fork.messages[..before.len()], before.as_slice());
    assert_eq!(fork.messages.last().unwrap().content, "hello");
}

#[test]
fn test_fork_inherits_tags() {
    let mut s = session();
    let root = s.active_branch_id.clone();
    s.add_branch_tag(&root, "#Research").unwrap();

    let fork = s.fork(&root, "child").unwrap();
    assert!(fork.tags.contains("research"));
}

#[test]
fn test_fork_and_switch_missing_branch() {
    let mut s = session();
    assert!(matches!(
        s.fork("missing", "x"),
        Err(ParleyError::NotFound { kind: "Branch", .. })
    ));
    let active = s.active_branch_id.clone();
    assert!(matches!(
        s.switch_branch("missing"),
        Err(ParleyError::NotFound { .. })
    ));
    assert_eq!(s.active_branch_id, active);
}

// ========================================================================
// Tree traversal
// ========================================================================

#[test]
fn test_tree_visits_each_branch_once_parent_first() {
    let mut s = session();
    let root = s.active_branch_id.clone();
    let a = s.fork(&root, "a").unwrap().id.clone();
    let b = s.fork(&root, "b").unwrap().id.clone();
    let a1 = s.fork(&a, "a1").unwrap().id.clone();
    s.fork(&b, "b1").unwrap();
    s.fork(&a1, "a1x").unwrap();
    s.create_branch("second root", None).unwrap();

    let visited: Vec<(String, usize)> = s
        .tree()
        .map(|(branch, depth)| (branch.id.clone(), depth))
        .collect();

    assert_eq!(visited.len(), s.branches.len());
    let unique: HashSet<&String> = visited.iter().map(|(id, _)| id).collect();
    assert_eq!(unique.len(), visited.len());

    let mut seen = HashSet::new();
    for (id, _) in &visited {
        if let Some(parent) = &s.branches[id].parent_id {
            assert!(seen.contains(parent), "child visited before its parent");
        }
        seen.insert(id.clone());
    }
}

#[test]
fn test_tree_depth_and_creation_order() {
    use chrono::Duration;

    let mut s = session();
    let root = s.active_branch_id.clone();
    let first = s.fork(&root, "first").unwrap().id.clone();
    let deep = s.fork(&first, "deep").unwrap().id.clone();
    let second = s.fork(&root, "second").unwrap().id.clone();

    let t0 = s.branches[&root].created_at;
    for (i, id) in [&first, &deep, &second].into_iter().enumerate() {
        s.branches.get_mut(id).unwrap().created_at = t0 + Duration::seconds(i as i64 + 1);
    }

    let titles: Vec<(String, usize)> = s
        .tree()
        .map(|(b, depth)| (b.title.clone(), depth))
        .collect();

    assert_eq!(
        titles,
        vec![
            ("main".to_string(), 0),
            ("first".to_string(), 1),
            ("deep".to_string(), 2),
            ("second".to_string(), 1),
        ]
    );
}

// ========================================================================
// Merge
// ========================================================================

#[test]
fn test_merge_append_keeps_shared_history_once() {
    let mut s = session();
    let root = s.active_branch_id.clone();
    s.append(Message::user("shared question")).unwrap();

    let a = s.fork(&root, "a").unwrap().id.clone();
    let b = s.fork(&root, "b").unwrap().id.clone();
    s.switch_branch(&a).unwrap();
    s.append(Message::user("only in a")).unwrap();
    s.switch_branch(&b).unwrap();
    s.append(Message::user("only in b")).unwrap();

    let a_before = s.branch(&a).unwrap().clone();
    let b_before = s.branch(&b).unwrap().clone();

    let merged = s.merge(&a, &b, MergeStrategy::Append, Some("combined")).unwrap();
    let contents: Vec<&str> = merged.messages.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["shared question", "only in a", "only in b"]);
    assert_eq!(merged.title, "combined");

    assert_eq!(s.branch(&a).unwrap(), &a_before);
    assert_eq!(s.branch(&b).unwrap(), &b_before);
}

#[test]
fn test_merge_interleave_orders_by_timestamp() {
    use chrono::{Duration, Utc};

    let mut s = session();
    let root = s.active_branch_id.clone();
    let a = s.fork(&root, "a").unwrap().id.clone();
    let b = s.fork(&root, "b").unwrap().id.clone();
    let t0 = Utc::now();

    s.switch_branch(&a).unwrap();
    s.append(Message::user("a1").with_timestamp(t0)).unwrap();
    s.append(Message::user("a2").with_timestamp(t0 + Duration::seconds(20))).unwrap();
    s.switch_branch(&b).unwrap();
    s.append(Message::user("b1").with_timestamp(t0 + Duration::seconds(10))).unwrap();
    s.append(Message::user("b2").with_timestamp(t0 + Duration::seconds(30))).unwrap();

    let merged = s.merge(&a, &b, MergeStrategy::Interleave, None).unwrap();
    let contents: Vec<&str> = merged.messages.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["a1", "b1", "a2", "b2"]);
    assert_eq!(merged.title, "merge: a + b");
}

#[test]
fn test_merge_with_itself_is_rejected() {
    let mut s = session();
    let root = s.active_branch_id.clone();
    assert!(matches!(
        s.merge(&root, &root, MergeStrategy::Append, None),
        Err(ParleyError::Validation(_))
    ));
}

// ========================================================================
// Delete
// ========================================================================

#[test]
fn test_delete_refuses_branch_with_children() {
    let mut s = session();
    let root = s.active_branch_id.clone();
    let child = s.fork(&root, "child").unwrap().id.clone();
    s.fork(&child, "grandchild").unwrap();

    assert!(matches!(
        s.delete_branch(&child, DeletePolicy::Refuse),
        Err(ParleyError::Validation(_))
    ));
    assert_eq!(s.branches.len(), 3);
}

#[test]
fn test_delete_cascade_removes_subtree() {
    let mut s = session();
    let root = s.active_branch_id.clone();
    let child = s.fork(&root, "child").unwrap().id.clone();
    let grandchild = s.fork(&child, "grandchild").unwrap().id.clone();
    s.switch_branch(&grandchild).unwrap();

    let removed = s.delete_branch(&child, DeletePolicy::Cascade).unwrap();
    assert_eq!(removed.len(), 2);
    assert_eq!(s.branches.len(), 1);
    assert_eq!(s.active_branch_id, root);
    s.validate().unwrap();
}

#[test]
fn test_delete_reparent_moves_children_up() {
    let mut s = session();
    let root = s.active_branch_id.clone();
    let child = s.fork(&root, "child").unwrap().id.clone();
    let grandchild = s.fork(&child, "grandchild").unwrap().id.clone();
    s.switch_branch(&child).unwrap();

    s.delete_branch(&child, DeletePolicy::Reparent).unwrap();
    assert_eq!(
        s.branch(&grandchild).unwrap().parent_id.as_deref(),
        Some(root.as_str())
    );
    assert_eq!(s.active_branch_id, root);
    s.validate().unwrap();
}

#[test]
fn test_cannot_delete_last_branch() {
    let mut s = session();
    let root = s.active_branch_id.clone();
    assert!(matches!(
        s.delete_branch(&root, DeletePolicy::Cascade),
        Err(ParleyError::Validation(_))
    ));

    let other = s.create_branch("other", None).unwrap().id.clone();
    s.delete_branch(&root, DeletePolicy::Refuse).unwrap();
    assert_eq!(s.active_branch_id, other);
}
