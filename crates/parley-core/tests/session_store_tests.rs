use chrono::{Duration, Utc};
use parley_core::*;
use tempfile::TempDir;

fn store() -> (TempDir, SessionStore) {
    let dir = TempDir::new().unwrap();
    let store = SessionStore::with_dir(dir.path().join("sessions")).unwrap();
    (dir, store)
}

fn session_with_history(store: &SessionStore) -> Session {
    let mut s = store.create(ProviderId::Anthropic, "claude-3-5-haiku-20241022");
    s.append(Message::user("Explain ownership in Rust")).unwrap();
    s.append(Message::assistant("Every value has a single owner.")).unwrap();
    let root = s.active_branch_id.clone();
    let fork = s.fork(&root, "borrowing").unwrap().id.clone();
    s.switch_branch(&fork).unwrap();
    s.append(Message::user("And borrowing?")).unwrap();
    s.generate_title_from_first_message();
    s
}

// ========================================================================
// Save / resume
// ========================================================================

#[test]
fn test_save_then_resume_round_trips() {
    let (_dir, store) = store();
    let session = session_with_history(&store);
    store.save(&session).unwrap();

    let loaded = store.resume(&session.id).unwrap();
    assert_eq!(loaded, session);
    assert_eq!(loaded.title, "Explain ownership in Rust");
}

#[test]
fn test_resume_by_prefix() {
    let (_dir, store) = store();
    let session = session_with_history(&store);
    store.save(&session).unwrap();

    let loaded = store.resume(&session.id[..6]).unwrap();
    assert_eq!(loaded.id, session.id);
}

#[test]
fn test_save_is_idempotent() {
    let (_dir, store) = store();
    let session = session_with_history(&store);
    store.save(&session).unwrap();
    store.save(&session).unwrap();

    assert_eq!(store.list().unwrap().len(), 1);
}

/// Turn `index.json` into a non-empty directory so renaming onto it fails.
fn break_index(dir: &TempDir) {
    let index = dir.path().join("sessions").join("index.json");
    let _ = std::fs::remove_file(&index);
    std::fs::create_dir_all(index.join("blocker")).unwrap();
}

#[test]
fn test_failed_index_write_restores_session_file() {
    let (dir, store) = store();
    let saved = session_with_history(&store);
    store.save(&saved).unwrap();

    break_index(&dir);
    let mut changed = saved.clone();
    changed.append(Message::assistant("Borrowing lends access.")).unwrap();
    assert!(matches!(store.save(&changed), Err(ParleyError::Storage(_))));

    assert_eq!(store.resume(&saved.id).unwrap(), saved);
}

#[test]
fn test_failed_index_write_leaves_no_new_session_file() {
    let (dir, store) = store();
    break_index(&dir);

    let session = session_with_history(&store);
    assert!(store.save(&session).is_err());
    assert!(!dir
        .path()
        .join("sessions")
        .join(format!("{}.json", session.id))
        .exists());
}

#[test]
fn test_resume_missing_is_not_found() {
    let (_dir, store) = store();
    assert!(matches!(
        store.resume("does-not-exist"),
        Err(ParleyError::NotFound { kind: "Session", .. })
    ));
}

// ========================================================================
// List / delete
// ========================================================================

#[test]
fn test_list_newest_first() {
    let (_dir, store) = store();
    let now = Utc::now();

    for (i, title) in ["old", "newest", "middle"].iter().enumerate() {
        let mut s = store.create(ProviderId::OpenAI, "gpt-4o");
        s.set_title(*title);
        s.updated_at = now + Duration::minutes([0, 10, 5][i]);
        store.save(&s).unwrap();
    }

    let titles: Vec<String> = store.list().unwrap().into_iter().map(|s| s.title).collect();
    assert_eq!(titles, vec!["newest", "middle", "old"]);
}

#[test]
fn test_delete_removes_session() {
    let (_dir, store) = store();
    let session = session_with_history(&store);
    store.save(&session).unwrap();

    let deleted = store.delete(&session.id).unwrap();
    assert_eq!(deleted, session.id);
    assert!(store.list().unwrap().is_empty());
    assert!(matches!(
        store.resume(&session.id),
        Err(ParleyError::NotFound { .. })
    ));
}

#[test]
fn test_delete_missing_is_not_found() {
    let (_dir, store) = store();
    assert!(matches!(
        store.delete("nope"),
        Err(ParleyError::NotFound { .. })
    ));
}

// ========================================================================
// Export / import
// ========================================================================

#[test]
fn test_json_export_import_preserves_tree() {
    let (_dir, store) = store();
    let session = session_with_history(&store);
    store.save(&session).unwrap();

    let json = store.export(&session.id, ExportFormat::Json).unwrap();
    let imported = SessionStore::import_json(&json).unwrap();

    assert_eq!(imported, session);
    let shape = |s: &Session| {
        s.tree()
            .map(|(b, depth)| (b.id.clone(), depth, b.messages.clone()))
            .collect::<Vec<_>>()
    };
    assert_eq!(shape(&imported), shape(&session));
}

#[test]
fn test_markdown_export_lists_every_branch() {
    let (_dir, store) = store();
    let session = session_with_history(&store);
    store.save(&session).unwrap();

    let md = store.export(&session.id, ExportFormat::Markdown).unwrap();
    assert!(md.starts_with("# Explain ownership in Rust"));
    assert!(md.contains("Branch: main"));
    assert!(md.contains("Branch: borrowing (active)"));
    assert!(md.contains("And borrowing?"));
}
