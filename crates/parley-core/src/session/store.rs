use super::export::{self, ExportFormat};
use super::model::{Session, SessionSummary};
use crate::constants::storage as layout;
use crate::error::{ParleyError, Result};
use crate::llm::ProviderId;
use crate::storage::{self, resolve_prefix};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Index of all sessions, newest first.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct SessionIndex {
    sessions: Vec<SessionSummary>,
}

/// Persists sessions as one JSON file each plus an index for listing.
pub struct SessionStore {
    base_dir: PathBuf,
}

impl SessionStore {
    /// Store under `<data_dir>/sessions`.
    pub fn open(data_dir: &Path) -> Result<Self> {
        Self::with_dir(data_dir.join(layout::SESSIONS_DIR))
    }

    /// Store rooted directly at `base_dir` (useful for testing).
    pub fn with_dir(base_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&base_dir).map_err(|e| {
            ParleyError::storage(format!("Failed to create sessions directory: {e}"))
        })?;
        Ok(Self { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn index_path(&self) -> PathBuf {
        self.base_dir.join(layout::INDEX_FILE)
    }

    fn session_path(&self, id: &str) -> PathBuf {
        self.base_dir.join(format!("{id}.json"))
    }

    fn load_index(&self) -> Result<SessionIndex> {
        let path = self.index_path();
        if !path.exists() {
            return self.rebuild_index();
        }
        match storage::read_json(&path) {
            Ok(index) => Ok(index),
            Err(e) => {
                tracing::warn!(error = %e, "session index unreadable, rebuilding");
                self.rebuild_index()
            }
        }
    }

    fn save_index(&self, index: &SessionIndex) -> Result<()> {
        storage::write_json(&self.index_path(), index)
    }

    /// Rebuild the index from the session files on disk.
    fn rebuild_index(&self) -> Result<SessionIndex> {
        let mut index = SessionIndex::default();
        for id in self.ids_on_disk()? {
            match storage::read_json::<Session>(&self.session_path(&id)) {
                Ok(session) => index.sessions.push(session.summary()),
                Err(e) => tracing::warn!(session = %id, error = %e, "skipping unreadable session"),
            }
        }
        index.sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(index)
    }

    fn ids_on_disk(&self) -> Result<Vec<String>> {
        let entries = fs::read_dir(&self.base_dir).map_err(|e| {
            ParleyError::storage(format!("Failed to read sessions directory: {e}"))
        })?;
        let mut ids = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if path.file_name().and_then(|n| n.to_str()) != Some(layout::INDEX_FILE) {
                    ids.push(stem.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// A fresh, unsaved session.
    pub fn create(&self, provider: ProviderId, model: &str) -> Session {
        Session::new(provider, model)
    }

    /// Upsert the full session and refresh its index entry.
    /// When the index cannot be written the session file is put back the
    /// way it was, so a failed save leaves nothing half-committed.
    pub fn save(&self, session: &Session) -> Result<()> {
        let mut index = self.load_index()?;
        index.sessions.retain(|s| s.id != session.id);
        index.sessions.push(session.summary());
        index.sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

        let path = self.session_path(&session.id);
        let previous = fs::read(&path).ok();
        storage::write_json(&path, session)?;

        if let Err(e) = self.save_index(&index) {
            let restored = match &previous {
                Some(bytes) => storage::write_atomic(&path, bytes),
                None => storage::remove_file(&path),
            };
            if let Err(restore) = restored {
                tracing::warn!(session = %session.id, error = %restore, "could not restore session file");
            }
            return Err(e);
        }

        tracing::info!(session = %session.id, messages = session.message_count(), "session saved");
        Ok(())
    }

    /// Full id for an id or unique id prefix.
    pub fn resolve_id(&self, key: &str) -> Result<String> {
        let ids = self.ids_on_disk()?;
        resolve_prefix("Session", key, ids.iter().map(String::as_str))?
            .ok_or_else(|| ParleyError::not_found("Session", key))
    }

    /// Load a session. Missing and corrupted records both report NotFound.
    pub fn resume(&self, key: &str) -> Result<Session> {
        let id = self.resolve_id(key)?;
        let session: Session = match storage::read_json(&self.session_path(&id)) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(session = %id, error = %e, "corrupted session file");
                return Err(ParleyError::not_found("Session", id));
            }
        };
        if let Err(e) = session.validate() {
            tracing::warn!(session = %id, error = %e, "session failed validation");
            return Err(ParleyError::not_found("Session", id));
        }
        Ok(session)
    }

    /// Summaries ordered by `updated_at`, newest first.
    pub fn list(&self) -> Result<Vec<SessionSummary>> {
        Ok(self.load_index()?.sessions)
    }

    /// Remove a session and everything in it. Missing ids are NotFound.
    pub fn delete(&self, key: &str) -> Result<String> {
        let id = self.resolve_id(key)?;
        storage::remove_file(&self.session_path(&id))?;

        let mut index = self.load_index()?;
        index.sessions.retain(|s| s.id != id);
        self.save_index(&index)?;

        tracing::info!(session = %id, "session deleted");
        Ok(id)
    }

    pub fn export(&self, key: &str, format: ExportFormat) -> Result<String> {
        let session = self.resume(key)?;
        export::render(&session, format)
    }

    /// Parse a JSON export back into a session, checking its branch graph.
    pub fn import_json(text: &str) -> Result<Session> {
        let session: Session = serde_json::from_str(text)
            .map_err(|e| ParleyError::storage(format!("Invalid session JSON: {e}")))?;
        session.validate()?;
        Ok(session)
    }
}
