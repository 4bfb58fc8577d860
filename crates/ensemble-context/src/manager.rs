//! The context manager: active contexts, indexes, and TTL cleanup.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use ensemble_core::context::AgentState;
use ensemble_core::{Context, Result, Task};
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::config::ContextConfig;
use crate::store::ContextStore;

/// Counters accumulated across context operations.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ContextStats {
    /// Contexts created.
    pub contexts_created: u64,
    /// Contexts re-activated from persistent storage.
    pub contexts_loaded: u64,
    /// Contexts expired by the cleanup sweep.
    pub contexts_expired: u64,
    /// Shared-memory reads and writes.
    pub memory_operations: u64,
    /// Merge operations performed.
    pub context_merges: u64,
}

/// A batch of updates applied to a context in one operation.
#[derive(Debug, Clone, Default)]
pub struct ContextUpdate {
    /// Session-data entries to merge in.
    pub session_data: Option<HashMap<String, JsonValue>>,
    /// Shared-memory entries to merge in.
    pub shared_memory: Option<HashMap<String, JsonValue>>,
    /// Per-agent state blobs to merge in (replacing whole blobs).
    pub agent_states: Option<HashMap<String, AgentState>>,
    /// Tasks to associate with the context, de-duplicated by id.
    pub active_tasks: Option<Vec<Task>>,
}

impl ContextUpdate {
    /// Creates an empty update.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds session-data entries.
    #[must_use]
    pub fn with_session_data(mut self, session_data: HashMap<String, JsonValue>) -> Self {
        self.session_data = Some(session_data);
        self
    }

    /// Adds shared-memory entries.
    #[must_use]
    pub fn with_shared_memory(mut self, shared_memory: HashMap<String, JsonValue>) -> Self {
        self.shared_memory = Some(shared_memory);
        self
    }

    /// Adds tasks to append.
    #[must_use]
    pub fn with_active_tasks(mut self, tasks: Vec<Task>) -> Self {
        self.active_tasks = Some(tasks);
        self
    }
}

/// Owns per-conversation shared state and its secondary indexes.
///
/// All collections live inside the instance; callers that share a manager
/// across concurrent call sites wrap it in their own lock, preserving the
/// single-writer discipline the framework assumes.
#[derive(Debug)]
pub struct ContextManager {
    config: ContextConfig,
    store: Option<ContextStore>,
    active: HashMap<String, Context>,
    user_index: HashMap<String, HashSet<String>>,
    agent_index: HashMap<String, HashSet<String>>,
    stats: ContextStats,
    last_cleanup: DateTime<Utc>,
}

impl ContextManager {
    /// Creates a manager, opening the persistent store when persistence is
    /// enabled.
    ///
    /// # Errors
    /// Returns an error if the storage directory cannot be created.
    pub fn new(config: ContextConfig) -> Result<Self> {
        let store = if config.enable_persistence {
            Some(ContextStore::new(config.storage_path.clone())?)
        } else {
            None
        };

        Ok(Self {
            config,
            store,
            active: HashMap::new(),
            user_index: HashMap::new(),
            agent_index: HashMap::new(),
            stats: ContextStats::default(),
            last_cleanup: Utc::now(),
        })
    }

    /// Creates a purely in-memory manager with persistence disabled.
    #[must_use]
    pub fn in_memory() -> Self {
        let config = ContextConfig {
            enable_persistence: false,
            ..ContextConfig::default()
        };
        Self {
            config,
            store: None,
            active: HashMap::new(),
            user_index: HashMap::new(),
            agent_index: HashMap::new(),
            stats: ContextStats::default(),
            last_cleanup: Utc::now(),
        }
    }

    /// Accumulated statistics.
    #[must_use]
    pub fn stats(&self) -> &ContextStats {
        &self.stats
    }

    /// Number of currently active contexts.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Creates a context for a conversation. Idempotent: if the id is
    /// already active the existing context is returned unchanged.
    pub fn create_context(
        &mut self,
        conversation_id: &str,
        user_id: &str,
        initial_data: Option<HashMap<String, JsonValue>>,
    ) -> Context {
        if let Some(existing) = self.active.get(conversation_id) {
            tracing::warn!("context {conversation_id} already exists, returning existing");
            return existing.clone();
        }

        if self.active.len() >= self.config.max_contexts {
            tracing::warn!(
                "active context count {} at or above configured maximum {}",
                self.active.len(),
                self.config.max_contexts
            );
        }

        let mut context = Context::new(conversation_id, user_id);
        if let Some(initial) = initial_data {
            context.session_data = initial;
        }

        self.index_context(&context);
        self.persist(&context);
        self.active.insert(conversation_id.to_owned(), context.clone());
        self.stats.contexts_created += 1;
        tracing::info!("created context {conversation_id} for user {user_id}");
        context
    }

    /// Retrieves a context, checking the active set first and falling back
    /// to persistent storage. A hit refreshes `updated_at`.
    pub fn get_context(&mut self, conversation_id: &str) -> Option<Context> {
        if !self.activate(conversation_id) {
            return None;
        }
        let context = self.active.get_mut(conversation_id)?;
        context.touch();
        Some(context.clone())
    }

    /// Applies a batch of updates to a context. Returns `false` if the
    /// context is unknown.
    pub fn update_context(&mut self, conversation_id: &str, updates: ContextUpdate) -> bool {
        self.mutate(conversation_id, |context| {
            if let Some(session_data) = updates.session_data {
                context.session_data.extend(session_data);
            }
            if let Some(shared_memory) = updates.shared_memory {
                context.shared_memory.extend(shared_memory);
            }
            if let Some(agent_states) = updates.agent_states {
                context.agent_states.extend(agent_states);
            }
            if let Some(tasks) = updates.active_tasks {
                for task in tasks {
                    if !context.has_task(&task.id) {
                        context.active_tasks.push(task);
                    }
                }
            }
        })
    }

    /// Sets one shared-memory key. Returns `false` if the context is
    /// unknown.
    pub fn set_shared_memory(
        &mut self,
        conversation_id: &str,
        key: impl Into<String>,
        value: JsonValue,
    ) -> bool {
        let key = key.into();
        let updated = self.mutate(conversation_id, |context| {
            context.shared_memory.insert(key, value);
        });
        if updated {
            self.stats.memory_operations += 1;
        }
        updated
    }

    /// Reads one shared-memory key; `None` if the context or key is
    /// unknown.
    pub fn get_shared_memory(&mut self, conversation_id: &str, key: &str) -> Option<JsonValue> {
        if !self.activate(conversation_id) {
            return None;
        }
        self.stats.memory_operations += 1;
        let context = self.active.get_mut(conversation_id)?;
        context.touch();
        context.shared_memory.get(key).cloned()
    }

    /// Merges entries into one agent's private state within a context.
    /// Returns `false` if the context is unknown.
    pub fn update_agent_state(
        &mut self,
        conversation_id: &str,
        agent_name: &str,
        agent_state: AgentState,
    ) -> bool {
        let updated = self.mutate(conversation_id, |context| {
            context
                .agent_states
                .entry(agent_name.to_owned())
                .or_default()
                .extend(agent_state);
        });
        if updated {
            self.agent_index
                .entry(agent_name.to_owned())
                .or_default()
                .insert(conversation_id.to_owned());
        }
        updated
    }

    /// Reads one agent's private state within a context. Like every other
    /// context access, the read keeps the context alive by refreshing
    /// `updated_at`.
    pub fn get_agent_state(
        &mut self,
        conversation_id: &str,
        agent_name: &str,
    ) -> Option<AgentState> {
        if !self.activate(conversation_id) {
            return None;
        }
        let context = self.active.get_mut(conversation_id)?;
        context.touch();
        context.agent_states.get(agent_name).cloned()
    }

    /// Associates a task with a context, de-duplicated by task id. Returns
    /// `false` if the context is unknown.
    pub fn add_task_to_context(&mut self, conversation_id: &str, task: Task) -> bool {
        self.mutate(conversation_id, |context| {
            if !context.has_task(&task.id) {
                context.active_tasks.push(task);
            }
        })
    }

    /// Removes a task association by id. Returns `false` if the context is
    /// unknown.
    pub fn remove_task_from_context(&mut self, conversation_id: &str, task_id: &str) -> bool {
        self.mutate(conversation_id, |context| {
            context.active_tasks.retain(|task| task.id != task_id);
        })
    }

    /// Deep-merges the source context into the target: session data,
    /// shared memory, and per-agent states union with source winning on
    /// key conflicts; source tasks not already present are appended. The
    /// source context is left untouched.
    ///
    /// Returns `false` if context sharing is disabled or either context is
    /// unknown.
    pub fn merge_contexts(&mut self, target_id: &str, source_id: &str) -> bool {
        if !self.config.enable_context_sharing {
            tracing::warn!("context sharing is disabled");
            return false;
        }
        if !self.activate(target_id) || !self.activate(source_id) {
            tracing::warn!("cannot merge contexts: {target_id} <- {source_id}, one side unknown");
            return false;
        }

        let Some(source) = self.active.get(source_id).cloned() else {
            return false;
        };

        let merged = self.mutate(target_id, |target| {
            target.session_data.extend(source.session_data);
            target.shared_memory.extend(source.shared_memory);
            for (agent_name, agent_state) in source.agent_states {
                target
                    .agent_states
                    .entry(agent_name)
                    .or_default()
                    .extend(agent_state);
            }
            for task in source.active_tasks {
                if !target.has_task(&task.id) {
                    target.active_tasks.push(task);
                }
            }
        });

        if merged {
            self.stats.context_merges += 1;
            tracing::info!("merged context {source_id} into {target_id}");
            // The target may now hold state for agents it did not before.
            let agent_names: Vec<String> = self
                .active
                .get(target_id)
                .map(|context| context.agent_states.keys().cloned().collect())
                .unwrap_or_default();
            for agent_name in agent_names {
                self.agent_index
                    .entry(agent_name)
                    .or_default()
                    .insert(target_id.to_owned());
            }
        }
        merged
    }

    /// Conversation ids active for a user, sorted.
    #[must_use]
    pub fn find_contexts_by_user(&self, user_id: &str) -> Vec<String> {
        let mut ids: Vec<String> = self
            .user_index
            .get(user_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    /// Conversation ids holding state for an agent, sorted.
    #[must_use]
    pub fn find_contexts_with_agent(&self, agent_name: &str) -> Vec<String> {
        let mut ids: Vec<String> = self
            .agent_index
            .get(agent_name)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    /// Expires contexts unmutated past the TTL, archiving their backing
    /// records. Self-throttling: runs at most once per configured
    /// interval. Returns the number of contexts expired.
    pub fn cleanup_expired_contexts(&mut self) -> usize {
        let now = Utc::now();
        let since_last = (now - self.last_cleanup).num_seconds();
        if since_last < self.config.cleanup_interval_secs as i64 {
            return 0;
        }

        let ttl = Duration::hours(self.config.context_ttl_hours as i64);
        let expired: Vec<String> = self
            .active
            .iter()
            .filter(|&(_, context)| now - context.updated_at > ttl)
            .map(|(id, _)| id.clone())
            .collect();

        for conversation_id in &expired {
            if let Some(context) = self.active.remove(conversation_id) {
                self.unindex_context(&context);
                if let Some(store) = &self.store {
                    if let Err(error) = store.archive(conversation_id) {
                        tracing::error!("failed to archive context {conversation_id}: {error}");
                    }
                }
            }
        }

        self.stats.contexts_expired += expired.len() as u64;
        self.last_cleanup = now;
        if !expired.is_empty() {
            tracing::info!("cleaned up {} expired contexts", expired.len());
        }
        expired.len()
    }

    /// Ensures a context is in the active set, loading from storage on a
    /// miss. Returns `false` if it exists in neither tier.
    fn activate(&mut self, conversation_id: &str) -> bool {
        if self.active.contains_key(conversation_id) {
            return true;
        }

        let Some(store) = &self.store else {
            return false;
        };
        match store.load(conversation_id) {
            Ok(Some(context)) => {
                self.index_context(&context);
                self.active.insert(conversation_id.to_owned(), context);
                self.stats.contexts_loaded += 1;
                tracing::info!("loaded context from persistence: {conversation_id}");
                true
            }
            Ok(None) => false,
            Err(error) => {
                tracing::error!("failed to load context {conversation_id}: {error}");
                false
            }
        }
    }

    /// Applies a mutation to an active context, refreshing `updated_at`
    /// and re-persisting the full record.
    fn mutate(&mut self, conversation_id: &str, apply: impl FnOnce(&mut Context)) -> bool {
        if !self.activate(conversation_id) {
            tracing::warn!("context not found for update: {conversation_id}");
            return false;
        }
        let Some(context) = self.active.get_mut(conversation_id) else {
            return false;
        };
        apply(context);
        context.touch();
        let snapshot = context.clone();
        self.persist(&snapshot);
        true
    }

    fn persist(&self, context: &Context) {
        if let Some(store) = &self.store {
            if let Err(error) = store.save(context) {
                tracing::error!(
                    "failed to persist context {}: {error}",
                    context.conversation_id
                );
            }
        }
    }

    fn index_context(&mut self, context: &Context) {
        self.user_index
            .entry(context.user_id.clone())
            .or_default()
            .insert(context.conversation_id.clone());
        for agent_name in context.agent_states.keys() {
            self.agent_index
                .entry(agent_name.clone())
                .or_default()
                .insert(context.conversation_id.clone());
        }
    }

    fn unindex_context(&mut self, context: &Context) {
        if let Some(set) = self.user_index.get_mut(&context.user_id) {
            set.remove(&context.conversation_id);
            if set.is_empty() {
                self.user_index.remove(&context.user_id);
            }
        }
        for agent_name in context.agent_states.keys() {
            if let Some(set) = self.agent_index.get_mut(agent_name) {
                set.remove(&context.conversation_id);
                if set.is_empty() {
                    self.agent_index.remove(agent_name);
                }
            }
        }
    }
}
