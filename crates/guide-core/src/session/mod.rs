//! Guide editing session.
//!
//! Owns one in-memory guide list and wires the draft store, snapshot
//! reconciler, autosave scheduler, selection restorer, reordering and merging
//! around it:
//! - `navigation` - open/close, tabs, conversations, list loads, selection
//! - `editing` - edits, debounced flushes, rename, explicit send
//! - `bulk` - delete, reorder, merge
//!
//! `GuideSession` is cheap to clone. Its state sits behind a mutex that is
//! never held across an `.await`; code resuming after a remote call
//! re-validates the state before applying anything.

mod bulk;
mod editing;
mod navigation;

pub use bulk::MergeReport;

use crate::autosave::{Debouncer, FlushError, RateLimiter, SaveQueue};
use crate::config::EngineConfig;
use crate::drafts::{Draft, DraftStore};
use crate::events::{EventBus, GuideEvent, SaveStatus, Subscription};
use crate::model::{Guide, Scope, ScopeKey};
use crate::remote::{GuideRemote, RemoteError};
use crate::selection::{choose, SelectionStore};
use crate::snapshot::AckedSnapshots;
use crate::storage::LocalStore;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tokio::task::JoinHandle;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Guide not found in the current list: {0}")]
    UnknownGuide(String),

    #[error("No guide is open for editing")]
    NothingSelected,

    #[error("The conversation tab has no active conversation")]
    NoConversation,

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Flush(#[from] FlushError),
}

pub type Result<T> = std::result::Result<T, SessionError>;

/// Mutable session state. Only touched with the session lock held.
struct SessionState {
    is_open: bool,
    tab: Scope,
    conversation_id: Option<String>,
    /// Key of the list currently held in `guides`
    list_key: Option<ScopeKey>,
    /// Bumped on every list load; stale loads are discarded
    load_generation: u64,
    guides: Vec<Guide>,
    editing: Option<Guide>,
    /// Latest edit not yet handed to the save queue
    pending: Option<Guide>,
    drafts: DraftStore,
    acked: AckedSnapshots,
    debouncer: Debouncer,
    limiter: RateLimiter,
    /// Set by explicit selection; the next restoration pass keeps the editor as is
    manual_selection: bool,
    renaming: Option<String>,
    rename_text: String,
    merge_selection: Vec<String>,
    save_status: SaveStatus,
    status_generation: u64,
    status_reset: Option<JoinHandle<()>>,
}

impl SessionState {
    fn scope_key(&self) -> Option<ScopeKey> {
        ScopeKey::resolve(self.tab, self.conversation_id.as_deref())
    }

    fn contains(&self, id: &str) -> bool {
        self.guides.iter().any(|g| g.id == id)
    }

    fn editing_id(&self) -> Option<&str> {
        self.editing.as_ref().map(|g| g.id.as_str())
    }

    fn list_event(&self) -> GuideEvent {
        let key = self.scope_key();
        GuideEvent::ListChanged {
            scope: self.tab,
            conversation_id: key.and_then(|k| k.conversation_id().map(str::to_string)),
            count: self.guides.len(),
        }
    }

    fn selection_event(&self) -> GuideEvent {
        GuideEvent::SelectionChanged {
            guide_id: self.editing_id().map(str::to_string),
            renaming: self.renaming.is_some(),
        }
    }

    fn start_rename(&mut self) {
        if let Some(guide) = &self.editing {
            self.renaming = Some(guide.id.clone());
            self.rename_text = guide.title.clone();
        }
    }

    fn clear_selection(&mut self) {
        self.editing = None;
        self.renaming = None;
        self.rename_text.clear();
        self.manual_selection = false;
    }

    fn clear_pending(&mut self, id: &str) {
        if self.pending.as_ref().is_some_and(|p| p.id == id) {
            self.pending = None;
            self.debouncer.cancel();
        }
    }

    /// Drop every trace of a deleted guide.
    fn forget(&mut self, id: &str) {
        self.guides.retain(|g| g.id != id);
        self.drafts.remove_draft(id);
        self.acked.forget(id);
        self.merge_selection.retain(|m| m != id);
        self.clear_pending(id);
    }

    /// Re-open a guide after a list load. Never writes anything.
    ///
    /// Returns whether the editor or rename state changed.
    fn restore(&mut self, persisted: Option<&str>) -> bool {
        let before = (self.editing_id().map(str::to_string), self.renaming.clone());
        let current = before.0.clone();

        let manual = std::mem::take(&mut self.manual_selection);
        let chosen = match current.as_deref() {
            Some(id) if manual && self.contains(id) => Some(id.to_string()),
            _ => {
                let choice = choose(&self.guides, persisted, current.as_deref());
                self.renaming = None;
                if choice.starts_rename() {
                    self.renaming = choice.guide_id().map(str::to_string);
                }
                choice.guide_id().map(str::to_string)
            }
        };

        let conversation_id = self.conversation_id.clone();
        self.editing = chosen.and_then(|id| {
            self.guides
                .iter()
                .find(|g| g.id == id)
                .cloned()
                .map(|g| g.with_context(conversation_id.as_deref()))
        });
        if self.renaming.is_some() && self.renaming.as_deref() != self.editing_id() {
            self.renaming = None;
        }
        if let (Some(_), Some(guide)) = (&self.renaming, &self.editing) {
            if before.1.as_deref() != Some(guide.id.as_str()) {
                self.rename_text = guide.title.clone();
            }
        }

        before != (self.editing_id().map(str::to_string), self.renaming.clone())
    }
}

struct Inner<R> {
    remote: R,
    selection: SelectionStore,
    config: EngineConfig,
    state: Mutex<SessionState>,
    queue: SaveQueue,
    events: Arc<EventBus>,
}

/// One user's guide panel: a list per scope, an editor and its autosave.
pub struct GuideSession<R: GuideRemote + 'static> {
    inner: Arc<Inner<R>>,
}

impl<R: GuideRemote + 'static> Clone for GuideSession<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: GuideRemote + 'static> GuideSession<R> {
    /// Create a session. Must be called inside a tokio runtime.
    ///
    /// Loads the draft map; the panel stays closed until [`GuideSession::open`].
    pub fn new(remote: R, store: Arc<dyn LocalStore>, config: EngineConfig) -> Self {
        let selection = SelectionStore::new(Arc::clone(&store));
        let drafts = DraftStore::load(store);
        let limiter = RateLimiter::new(config.min_flush_interval);

        // No conversation is active yet, so a persisted conversation tab
        // comes back once `set_conversation` provides one.
        let state = SessionState {
            is_open: false,
            tab: Scope::Global,
            conversation_id: None,
            list_key: None,
            load_generation: 0,
            guides: Vec::new(),
            editing: None,
            pending: None,
            drafts,
            acked: AckedSnapshots::new(),
            debouncer: Debouncer::new(),
            limiter,
            manual_selection: false,
            renaming: None,
            rename_text: String::new(),
            merge_selection: Vec::new(),
            save_status: SaveStatus::Idle,
            status_generation: 0,
            status_reset: None,
        };

        Self {
            inner: Arc::new(Inner {
                remote,
                selection,
                config,
                state: Mutex::new(state),
                queue: SaveQueue::spawn(),
                events: Arc::new(EventBus::new()),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, event: GuideEvent) {
        self.inner.events.emit(event);
    }

    fn emit_all(&self, events: Vec<GuideEvent>) {
        for event in events {
            self.emit(event);
        }
    }

    /// The remote store this session writes to.
    pub fn remote(&self) -> &R {
        &self.inner.remote
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Subscribe to session events. Dropping the handle unsubscribes.
    pub fn subscribe(&self, callback: impl Fn(GuideEvent) + Send + Sync + 'static) -> Subscription {
        self.inner.events.subscribe(callback)
    }

    /// The current list, drafts applied, in display order.
    pub fn guides(&self) -> Vec<Guide> {
        self.lock().guides.clone()
    }

    /// The guide open in the editor.
    pub fn editing(&self) -> Option<Guide> {
        self.lock().editing.clone()
    }

    pub fn tab(&self) -> Scope {
        self.lock().tab
    }

    pub fn conversation_id(&self) -> Option<String> {
        self.lock().conversation_id.clone()
    }

    pub fn scope_key(&self) -> Option<ScopeKey> {
        self.lock().scope_key()
    }

    pub fn is_open(&self) -> bool {
        self.lock().is_open
    }

    pub fn save_status(&self) -> SaveStatus {
        self.lock().save_status
    }

    /// Id of the guide whose title is being renamed.
    pub fn renaming(&self) -> Option<String> {
        self.lock().renaming.clone()
    }

    pub fn rename_text(&self) -> String {
        self.lock().rename_text.clone()
    }

    pub fn merge_selection(&self) -> Vec<String> {
        self.lock().merge_selection.clone()
    }

    pub fn draft(&self, id: &str) -> Option<Draft> {
        self.lock().drafts.get(id).cloned()
    }

    pub fn drafts(&self) -> Vec<Draft> {
        self.lock().drafts.iter().cloned().collect()
    }

    /// Whether an edit is waiting for its flush.
    pub fn has_pending(&self) -> bool {
        self.lock().pending.is_some()
    }

    /// Add or remove a guide from the merge selection. Returns whether it is selected now.
    pub fn toggle_merge_selection(&self, id: &str) -> Result<bool> {
        let mut state = self.lock();
        if !state.contains(id) {
            return Err(SessionError::UnknownGuide(id.to_string()));
        }
        if let Some(pos) = state.merge_selection.iter().position(|m| m == id) {
            state.merge_selection.remove(pos);
            Ok(false)
        } else {
            state.merge_selection.push(id.to_string());
            Ok(true)
        }
    }

    pub fn clear_merge_selection(&self) {
        self.lock().merge_selection.clear();
    }
}
