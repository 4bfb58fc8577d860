//! JSON file persistence for contexts.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use ensemble_core::context::AgentState;
use ensemble_core::{Context, Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// The serializable subset of a context. Live task objects are not
/// persisted; only their ids are, so `active_tasks` is empty after a
/// reload by contract.
#[derive(Debug, Serialize, Deserialize)]
struct ContextRecord {
    conversation_id: String,
    user_id: String,
    session_data: HashMap<String, JsonValue>,
    shared_memory: HashMap<String, JsonValue>,
    agent_states: HashMap<String, AgentState>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    task_ids: Vec<String>,
}

impl ContextRecord {
    fn from_context(context: &Context) -> Self {
        Self {
            conversation_id: context.conversation_id.clone(),
            user_id: context.user_id.clone(),
            session_data: context.session_data.clone(),
            shared_memory: context.shared_memory.clone(),
            agent_states: context.agent_states.clone(),
            created_at: context.created_at,
            updated_at: context.updated_at,
            task_ids: context.active_tasks.iter().map(|task| task.id.clone()).collect(),
        }
    }

    fn into_context(self) -> Context {
        Context {
            conversation_id: self.conversation_id,
            user_id: self.user_id,
            session_data: self.session_data,
            shared_memory: self.shared_memory,
            active_tasks: Vec::new(),
            agent_states: self.agent_states,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// One JSON record per conversation id under a storage directory, with an
/// `archived/` subdirectory holding expired records. Archival renames
/// rather than deletes, preserving forensic history.
#[derive(Debug)]
pub struct ContextStore {
    root: PathBuf,
}

impl ContextStore {
    /// Opens (creating if needed) a store rooted at the given directory.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be created.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .map_err(|error| Error::Config(format!("failed to create context storage: {error}")))?;
        Ok(Self { root })
    }

    fn record_path(&self, conversation_id: &str) -> PathBuf {
        self.root.join(format!("{conversation_id}.json"))
    }

    /// Writes the full serializable subset of a context.
    ///
    /// # Errors
    /// Returns an error if serialization or the write fails.
    pub fn save(&self, context: &Context) -> Result<()> {
        let record = ContextRecord::from_context(context);
        let encoded = serde_json::to_string_pretty(&record)?;
        fs::write(self.record_path(&context.conversation_id), encoded)?;
        Ok(())
    }

    /// Loads a context by conversation id; `None` if no record exists.
    ///
    /// # Errors
    /// Returns an error if the record exists but cannot be read or parsed.
    pub fn load(&self, conversation_id: &str) -> Result<Option<Context>> {
        let path = self.record_path(conversation_id);
        if !path.exists() {
            return Ok(None);
        }

        let contents = fs::read_to_string(path)?;
        let record: ContextRecord = serde_json::from_str(&contents)?;
        Ok(Some(record.into_context()))
    }

    /// Moves a record into `archived/` with a timestamp suffix. Returns
    /// `false` if no record existed.
    ///
    /// # Errors
    /// Returns an error if the archive directory cannot be created or the
    /// rename fails.
    pub fn archive(&self, conversation_id: &str) -> Result<bool> {
        let path = self.record_path(conversation_id);
        if !path.exists() {
            return Ok(false);
        }

        let archive_dir = self.root.join("archived");
        fs::create_dir_all(&archive_dir)?;
        let stamp = Utc::now().format("%Y%m%d_%H%M%S");
        fs::rename(&path, archive_dir.join(format!("{conversation_id}_{stamp}.json")))?;
        Ok(true)
    }

    /// Scans live (non-archived) records for a user's conversation ids.
    ///
    /// # Errors
    /// Returns an error if the storage directory cannot be listed.
    /// Unparseable records are skipped.
    pub fn find_by_user(&self, user_id: &str) -> Result<Vec<String>> {
        let mut found = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let Ok(contents) = fs::read_to_string(&path) else {
                continue;
            };
            let Ok(record) = serde_json::from_str::<ContextRecord>(&contents) else {
                continue;
            };
            if record.user_id == user_id {
                found.push(record.conversation_id);
            }
        }
        found.sort();
        Ok(found)
    }

    /// The storage root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}
