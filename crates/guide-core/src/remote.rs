//! Remote guide store contract.
//!
//! Implementations:
//! - `MemoryRemote` - In-process reference store, used by tests and guide-cli
//! - An HTTP client in the application shell (not part of this workspace)

use crate::model::{now_millis, Guide, GuidePatch, NewGuide, Scope};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    #[error("conversationId is required for conversation guide")]
    MissingConversation,

    #[error("Guide not found: {0}")]
    NotFound(String),

    #[error("Remote store unavailable: {0}")]
    Unavailable(String),

    #[error("Request rejected: {0}")]
    Rejected(String),
}

pub type Result<T> = std::result::Result<T, RemoteError>;

/// Guide CRUD and ordering operations offered by the remote store.
#[async_trait]
pub trait GuideRemote: Send + Sync {
    /// Create a guide. The store assigns the id.
    async fn create_guide(&self, scope: Scope, guide: NewGuide) -> Result<Guide>;

    /// List guides ordered by persisted index, then creation time.
    async fn list_guides(&self, scope: Scope, conversation_id: Option<&str>) -> Result<Vec<Guide>>;

    /// Update a guide. `files`, when present, replaces the stored list.
    async fn update_guide(&self, scope: Scope, id: &str, patch: GuidePatch) -> Result<Guide>;

    async fn delete_guide(&self, scope: Scope, id: &str, conversation_id: Option<&str>) -> Result<()>;

    /// Persist a list order. Ids unknown to the caller may be appended by the store.
    async fn reorder_guides(
        &self,
        scope: Scope,
        conversation_id: Option<&str>,
        ordered_ids: &[String],
    ) -> Result<()>;
}

#[async_trait]
impl<T: GuideRemote + ?Sized> GuideRemote for Arc<T> {
    async fn create_guide(&self, scope: Scope, guide: NewGuide) -> Result<Guide> {
        (**self).create_guide(scope, guide).await
    }

    async fn list_guides(&self, scope: Scope, conversation_id: Option<&str>) -> Result<Vec<Guide>> {
        (**self).list_guides(scope, conversation_id).await
    }

    async fn update_guide(&self, scope: Scope, id: &str, patch: GuidePatch) -> Result<Guide> {
        (**self).update_guide(scope, id, patch).await
    }

    async fn delete_guide(&self, scope: Scope, id: &str, conversation_id: Option<&str>) -> Result<()> {
        (**self).delete_guide(scope, id, conversation_id).await
    }

    async fn reorder_guides(
        &self,
        scope: Scope,
        conversation_id: Option<&str>,
        ordered_ids: &[String],
    ) -> Result<()> {
        (**self).reorder_guides(scope, conversation_id, ordered_ids).await
    }
}

/// Operation kinds, for call accounting and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteOp {
    Create,
    List,
    Update,
    Delete,
    Reorder,
}

/// A guide as the store keeps it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredGuide {
    #[serde(flatten)]
    pub guide: Guide,
    #[serde(default)]
    pub sort_index: Option<u64>,
}

/// Serializable contents of a [`MemoryRemote`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteState {
    #[serde(default)]
    pub guides: Vec<StoredGuide>,
    /// Last timestamp handed out; keeps stamps strictly increasing.
    #[serde(default)]
    pub clock: u64,
}

impl RemoteState {
    fn tick(&mut self) -> u64 {
        self.clock = now_millis().max(self.clock + 1);
        self.clock
    }

    fn in_scope(stored: &StoredGuide, scope: Scope, conversation_id: Option<&str>) -> bool {
        let guide = &stored.guide;
        guide.scope == scope
            && (scope == Scope::Global || guide.conversation_id.as_deref() == conversation_id)
    }

    fn position(&self, scope: Scope, id: &str, conversation_id: Option<&str>) -> Option<usize> {
        self.guides
            .iter()
            .position(|g| g.guide.id == id && Self::in_scope(g, scope, conversation_id))
    }

    fn ordered(&self, scope: Scope, conversation_id: Option<&str>) -> Vec<&StoredGuide> {
        let mut visible: Vec<&StoredGuide> = self
            .guides
            .iter()
            .filter(|g| Self::in_scope(g, scope, conversation_id))
            .collect();
        // Indexed guides first, then unindexed; creation time breaks ties.
        visible.sort_by_key(|g| (g.sort_index.is_none(), g.sort_index, g.guide.created_at));
        visible
    }
}

/// In-process remote store with the backend's ordering semantics.
#[derive(Default)]
pub struct MemoryRemote {
    state: Mutex<RemoteState>,
    calls: Mutex<HashMap<RemoteOp, usize>>,
    failing: Mutex<HashSet<RemoteOp>>,
    latency: Mutex<Duration>,
    updates: Mutex<Vec<(String, GuidePatch)>>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_state(state: RemoteState) -> Self {
        Self {
            state: Mutex::new(state),
            ..Self::default()
        }
    }

    /// Copy of the current contents.
    pub fn export_state(&self) -> RemoteState {
        self.lock_state().clone()
    }

    /// Insert a guide as if it had been stored earlier.
    pub fn seed(&self, guide: Guide) {
        let mut state = self.lock_state();
        state.clock = state.clock.max(guide.updated_at);
        state.guides.push(StoredGuide {
            guide,
            sort_index: None,
        });
    }

    /// Stored copy of a guide, regardless of scope.
    pub fn guide(&self, id: &str) -> Option<Guide> {
        self.lock_state()
            .guides
            .iter()
            .find(|g| g.guide.id == id)
            .map(|g| g.guide.clone())
    }

    /// Make every subsequent call of `op` fail (or succeed again).
    pub fn set_failing(&self, op: RemoteOp, failing: bool) {
        let mut ops = self.failing.lock().unwrap_or_else(|e| e.into_inner());
        if failing {
            ops.insert(op);
        } else {
            ops.remove(&op);
        }
    }

    /// Delay every call by `latency` before it touches the store.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap_or_else(|e| e.into_inner()) = latency;
    }

    /// Number of attempted calls of `op`, failed ones included.
    pub fn calls(&self, op: RemoteOp) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&op)
            .copied()
            .unwrap_or(0)
    }

    /// Every update payload received, in arrival order.
    pub fn updates(&self) -> Vec<(String, GuidePatch)> {
        self.updates.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, RemoteState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Count the call, wait out the latency and apply failure injection.
    async fn enter(&self, op: RemoteOp) -> Result<()> {
        *self
            .calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(op)
            .or_insert(0) += 1;

        let latency = *self.latency.lock().unwrap_or_else(|e| e.into_inner());
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        if self
            .failing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&op)
        {
            return Err(RemoteError::Unavailable(format!("{:?} failed", op)));
        }
        Ok(())
    }
}

fn require_conversation(scope: Scope, conversation_id: Option<&str>) -> Result<()> {
    if scope == Scope::Conversation && conversation_id.is_none() {
        return Err(RemoteError::MissingConversation);
    }
    Ok(())
}

#[async_trait]
impl GuideRemote for MemoryRemote {
    async fn create_guide(&self, scope: Scope, new: NewGuide) -> Result<Guide> {
        self.enter(RemoteOp::Create).await?;
        require_conversation(scope, new.conversation_id.as_deref())?;

        let mut state = self.lock_state();
        let now = state.tick();
        let guide = Guide {
            id: uuid::Uuid::new_v4().to_string(),
            scope,
            conversation_id: match scope {
                Scope::Global => None,
                Scope::Conversation => new.conversation_id,
            },
            title: new.title,
            content: new.content,
            files: new.files,
            created_at: now,
            updated_at: now,
        };
        debug!("Created {} guide {}", scope, guide.id);
        state.guides.push(StoredGuide {
            guide: guide.clone(),
            sort_index: None,
        });
        Ok(guide)
    }

    async fn list_guides(&self, scope: Scope, conversation_id: Option<&str>) -> Result<Vec<Guide>> {
        self.enter(RemoteOp::List).await?;
        require_conversation(scope, conversation_id)?;

        let state = self.lock_state();
        Ok(state
            .ordered(scope, conversation_id)
            .into_iter()
            .map(|g| g.guide.clone())
            .collect())
    }

    async fn update_guide(&self, scope: Scope, id: &str, patch: GuidePatch) -> Result<Guide> {
        self.enter(RemoteOp::Update).await?;
        require_conversation(scope, patch.conversation_id.as_deref())?;

        self.updates
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((id.to_string(), patch.clone()));

        let mut state = self.lock_state();
        let index = state
            .position(scope, id, patch.conversation_id.as_deref())
            .ok_or_else(|| RemoteError::NotFound(id.to_string()))?;
        let now = state.tick();

        let guide = &mut state.guides[index].guide;
        if let Some(title) = patch.title {
            guide.title = title;
        }
        if let Some(content) = patch.content {
            guide.content = content;
        }
        if let Some(files) = patch.files {
            guide.files = files;
        }
        guide.updated_at = now;
        Ok(guide.clone())
    }

    async fn delete_guide(&self, scope: Scope, id: &str, conversation_id: Option<&str>) -> Result<()> {
        self.enter(RemoteOp::Delete).await?;
        require_conversation(scope, conversation_id)?;

        let mut state = self.lock_state();
        let index = state
            .position(scope, id, conversation_id)
            .ok_or_else(|| RemoteError::NotFound(id.to_string()))?;
        state.guides.remove(index);
        Ok(())
    }

    async fn reorder_guides(
        &self,
        scope: Scope,
        conversation_id: Option<&str>,
        ordered_ids: &[String],
    ) -> Result<()> {
        self.enter(RemoteOp::Reorder).await?;
        require_conversation(scope, conversation_id)?;

        let mut state = self.lock_state();
        let current: Vec<String> = state
            .ordered(scope, conversation_id)
            .into_iter()
            .map(|g| g.guide.id.clone())
            .collect();
        let mut remaining: HashSet<&str> = current.iter().map(String::as_str).collect();

        let mut order: Vec<String> = Vec::with_capacity(current.len());
        for id in ordered_ids {
            if remaining.remove(id.as_str()) {
                order.push(id.clone());
            }
        }
        // Guides the caller did not mention keep their relative order at the end.
        order.extend(current.iter().filter(|id| remaining.contains(id.as_str())).cloned());

        for (index, id) in order.iter().enumerate() {
            if let Some(pos) = state.position(scope, id, conversation_id) {
                state.guides[pos].sort_index = Some(index as u64);
            }
        }
        Ok(())
    }
}
