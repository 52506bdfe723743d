//! Panel lifecycle, tabs, conversations, list loads and selection.

use super::editing::FlushMode;
use super::{GuideSession, Result, SessionError};
use crate::autosave::FlushResult;
use crate::events::SaveStatus;
use crate::model::{Guide, NewGuide, Scope};
use crate::remote::GuideRemote;
use std::collections::HashSet;
use tracing::{debug, info, warn};

impl<R: GuideRemote + 'static> GuideSession<R> {
    /// Open the panel: load the current list and restore the selection.
    ///
    /// Returns the number of guides loaded.
    pub async fn open(&self) -> Result<usize> {
        self.lock().is_open = true;
        self.reload().await
    }

    /// Close the panel. The debounce timer is cancelled and pending edits
    /// are flushed right away; the editor is cleared either way.
    pub async fn close(&self) -> FlushResult {
        self.lock().debouncer.cancel();
        self.set_status(SaveStatus::Idle);

        let result = self.flush_with(None, FlushMode::Immediate).await;
        if let Err(e) = &result {
            warn!("Flush on close failed, edits stay in the draft store: {}", e);
        }

        let event = {
            let mut state = self.lock();
            state.is_open = false;
            state.pending = None;
            state.debouncer.cancel();
            state.merge_selection.clear();
            state.clear_selection();
            state.selection_event()
        };
        self.emit(event);
        result
    }

    /// Switch between the global and conversation lists. The choice is remembered.
    pub async fn switch_tab(&self, tab: Scope) -> Result<()> {
        if self.lock().tab == tab {
            return Ok(());
        }
        self.leave_list().await;
        self.lock().tab = tab;
        self.inner.selection.save_tab(tab);
        debug!("Switched guide tab to {}", tab);

        if self.is_open() {
            self.reload().await?;
        }
        Ok(())
    }

    /// Change the active conversation.
    ///
    /// Losing the conversation while on its tab falls back to the global tab
    /// without remembering that; gaining one returns to the conversation tab
    /// if that was the last tab the user picked.
    pub async fn set_conversation(&self, conversation_id: Option<String>) -> Result<()> {
        if self.lock().conversation_id == conversation_id {
            return Ok(());
        }
        self.leave_list().await;

        let preferred = self.inner.selection.load_tab();
        {
            let mut state = self.lock();
            match &conversation_id {
                None if state.tab == Scope::Conversation => state.tab = Scope::Global,
                Some(_) if preferred == Some(Scope::Conversation) => state.tab = Scope::Conversation,
                _ => {}
            }
            state.conversation_id = conversation_id;
        }

        if self.is_open() {
            self.reload().await?;
        }
        Ok(())
    }

    /// Flush whatever is being edited and drop the current list.
    async fn leave_list(&self) {
        self.lock().debouncer.cancel();
        if let Err(e) = self.flush_with(None, FlushMode::Immediate).await {
            warn!("Flush before leaving the guide list failed: {}", e);
        }

        let events = {
            let mut state = self.lock();
            state.pending = None;
            state.merge_selection.clear();
            state.clear_selection();
            state.guides.clear();
            state.list_key = None;
            vec![state.list_event(), state.selection_event()]
        };
        self.emit_all(events);
    }

    /// Load the current list from the remote store, apply fresher drafts and
    /// restore the selection. Returns the number of guides loaded.
    pub async fn reload(&self) -> Result<usize> {
        let (key, generation) = {
            let mut state = self.lock();
            state.load_generation += 1;
            (state.scope_key(), state.load_generation)
        };

        let Some(key) = key else {
            let events = {
                let mut state = self.lock();
                state.guides.clear();
                state.list_key = None;
                state.clear_selection();
                vec![state.list_event(), state.selection_event()]
            };
            self.emit_all(events);
            return Ok(0);
        };

        let fetched = self
            .inner
            .remote
            .list_guides(key.scope(), key.conversation_id())
            .await?;
        let persisted = self.inner.selection.load_active(&key);

        let events = {
            let mut guard = self.lock();
            let state = &mut *guard;
            if state.load_generation != generation {
                debug!("Discarding stale guide list for {}", key);
                return Ok(fetched.len());
            }

            // What the server returns is acknowledged by definition.
            for guide in &fetched {
                state.acked.record(guide);
            }
            let listed: HashSet<&str> = fetched.iter().map(|g| g.id.as_str()).collect();
            state.drafts.prune(&key, &listed);
            state.guides = fetched
                .iter()
                .map(|g| state.drafts.apply_if_fresher(g))
                .collect();
            state.list_key = Some(key.clone());

            let mut events = vec![state.list_event()];
            if state.restore(persisted.as_deref()) {
                events.push(state.selection_event());
            }
            events
        };
        self.emit_all(events);

        debug!("Loaded {} guide(s) for {}", fetched.len(), key);
        Ok(fetched.len())
    }

    /// Open `id` in the editor and remember it for this list.
    ///
    /// Unsaved edits of the guide being left are flushed before the new
    /// selection is persisted.
    pub async fn select(&self, id: &str, start_rename: bool) -> Result<()> {
        let (known, leaving) = {
            let state = self.lock();
            let leaving = state.editing_id().is_some_and(|current| current != id);
            (state.contains(id), leaving)
        };
        if !known {
            return Err(SessionError::UnknownGuide(id.to_string()));
        }

        if leaving {
            self.lock().debouncer.cancel();
            if let Err(e) = self.flush_with(None, FlushMode::Immediate).await {
                warn!("Flush before switching guides failed: {}", e);
            }
            self.set_status(SaveStatus::Idle);
        }

        let (event, record) = {
            let mut guard = self.lock();
            let state = &mut *guard;
            // Deleted while the flush was in flight.
            let Some(entry) = state.guides.iter().find(|g| g.id == id) else {
                return Err(SessionError::UnknownGuide(id.to_string()));
            };
            let guide = state
                .drafts
                .apply_if_fresher(entry)
                .with_context(state.conversation_id.as_deref());
            state.drafts.save_draft(&guide);
            if let Some(entry) = state.guides.iter_mut().find(|g| g.id == id) {
                *entry = guide.clone();
            }

            state.editing = Some(guide.clone());
            state.manual_selection = true;
            state.renaming = None;
            state.rename_text.clear();
            if start_rename {
                state.start_rename();
            }
            (state.selection_event(), state.scope_key().map(|key| (key, guide)))
        };

        if let Some((key, guide)) = record {
            self.inner.selection.save_active(&key, &guide);
        }
        self.emit(event);
        Ok(())
    }

    /// Create an empty guide in the current list, open it and start renaming it.
    pub async fn create_guide(&self) -> Result<Guide> {
        let key = self.lock().scope_key().ok_or(SessionError::NoConversation)?;
        let new = NewGuide {
            conversation_id: key.conversation_id().map(str::to_string),
            ..Default::default()
        };
        let created = self.inner.remote.create_guide(key.scope(), new).await?;
        info!("Created {} guide {}", key.scope(), created.id);

        let event = {
            let mut state = self.lock();
            if state.list_key.as_ref() != Some(&key) {
                debug!("Guide list changed while creating {}", created.id);
                return Ok(created);
            }
            state.acked.record(&created);
            state.guides.push(created.clone());
            state.list_event()
        };
        self.emit(event);

        self.select(&created.id, true).await?;
        Ok(created)
    }
}
