//! Delete, reorder and merge.

use super::editing::FlushMode;
use super::{GuideSession, Result, SessionError};
use crate::autosave::FlushOutcome;
use crate::merge;
use crate::model::{now_millis, Guide};
use crate::remote::GuideRemote;
use crate::reorder::{move_item, ordered_ids};
use crate::snapshot::Snapshot;
use tracing::{debug, info, warn};

/// Result of a merge whose primary update succeeded.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeReport {
    /// The primary guide as acknowledged by the remote store.
    pub merged: Guide,
    pub deleted: Vec<String>,
    /// Guides whose deletion failed; they stay in the list.
    pub failed: Vec<String>,
}

impl<R: GuideRemote + 'static> GuideSession<R> {
    /// Delete a guide from the current list.
    ///
    /// Any pending edit and debounce timer for it are cancelled first, so a
    /// later flush cannot resurrect it.
    pub async fn delete_guide(&self, id: &str) -> Result<()> {
        let (guide, cancelled) = {
            let mut state = self.lock();
            let guide = state
                .guides
                .iter()
                .find(|g| g.id == id)
                .cloned()
                .ok_or_else(|| SessionError::UnknownGuide(id.to_string()))?;
            let cancelled = if state.pending.as_ref().is_some_and(|p| p.id == id) {
                state.debouncer.cancel();
                state.pending.take()
            } else {
                None
            };
            (guide.with_context(state.conversation_id.as_deref()), cancelled)
        };

        if let Err(e) = self
            .inner
            .remote
            .delete_guide(guide.scope, &guide.id, guide.conversation_id.as_deref())
            .await
        {
            warn!("Failed to delete guide {}: {}", id, e);
            if let Some(pending) = cancelled {
                let mut state = self.lock();
                if state.pending.is_none() && state.contains(id) {
                    state.pending = Some(pending);
                    self.arm_debounce(&mut state, self.inner.config.debounce);
                }
            }
            return Err(e.into());
        }
        info!("Deleted guide {}", id);

        let (events, cleared_key) = {
            let mut state = self.lock();
            state.forget(id);
            let mut events = vec![state.list_event()];
            let mut cleared_key = None;
            if state.editing_id() == Some(id) {
                state.clear_selection();
                cleared_key = state.list_key.clone();
                state.restore(None);
                events.push(state.selection_event());
            }
            (events, cleared_key)
        };

        if let Some(key) = cleared_key {
            self.inner.selection.clear_active(&key);
        }
        self.emit_all(events);
        Ok(())
    }

    /// Move the guide at `from` to `to` and persist the new order.
    ///
    /// The move is applied immediately. If the remote store rejects it, the
    /// list is reloaded so it matches the server again. Returns false when
    /// nothing moved.
    pub async fn reorder(&self, from: usize, to: usize) -> Result<bool> {
        let (key, ids, event) = {
            let mut state = self.lock();
            let Some(key) = state.list_key.clone() else {
                return Ok(false);
            };
            if !move_item(&mut state.guides, from, to) {
                return Ok(false);
            }
            (key, ordered_ids(&state.guides), state.list_event())
        };
        self.emit(event);

        match self
            .inner
            .remote
            .reorder_guides(key.scope(), key.conversation_id(), &ids)
            .await
        {
            Ok(()) => {
                debug!("Persisted order of {} guide(s) for {}", ids.len(), key);
                Ok(true)
            }
            Err(e) => {
                warn!("Failed to persist guide order for {}, reloading: {}", key, e);
                if let Err(reload) = self.reload().await {
                    warn!("Reload after failed reorder failed: {}", reload);
                }
                Err(e.into())
            }
        }
    }

    /// Merge the guides in the merge selection into the first of them.
    ///
    /// Returns `Ok(None)` when fewer than two guides are selected. Nothing is
    /// deleted unless the merged primary was saved.
    pub async fn merge_selected(&self) -> Result<Option<MergeReport>> {
        let (plan, original) = {
            let mut guard = self.lock();
            let state = &mut *guard;
            let conversation_id = state.conversation_id.clone();
            let selected: Vec<Guide> = state
                .guides
                .iter()
                .filter(|g| state.merge_selection.contains(&g.id))
                .map(|g| g.clone().with_context(conversation_id.as_deref()))
                .collect();
            let Some(plan) = merge::plan(&selected, now_millis()) else {
                debug!("Merge needs at least two guides from one list");
                return Ok(None);
            };

            // Pending edits are already part of the list entries being merged.
            if let Some(pending) = state.pending.as_ref().map(|p| p.id.clone()) {
                if selected.iter().any(|g| g.id == pending) {
                    state.clear_pending(&pending);
                }
            }

            let Some(index) = state.guides.iter().position(|g| g.id == plan.merged.id) else {
                return Ok(None);
            };
            let original = std::mem::replace(&mut state.guides[index], plan.merged.clone());
            if state.editing_id() == Some(plan.merged.id.as_str()) {
                state.editing = Some(plan.merged.clone());
            }
            (plan, original)
        };

        let merged = match self
            .flush_with(Some(plan.merged.clone()), FlushMode::Immediate)
            .await
        {
            Ok(FlushOutcome::Saved(saved)) => saved,
            Ok(_) => plan.merged.clone(),
            Err(e) => {
                warn!("Merge aborted, guide {} was not saved: {}", plan.merged.id, e);
                self.revert_merge(&plan.merged, original);
                return Err(e.into());
            }
        };

        let mut deleted = Vec::new();
        let mut failed = Vec::new();
        for id in &plan.removed {
            match self
                .inner
                .remote
                .delete_guide(merged.scope, id, merged.conversation_id.as_deref())
                .await
            {
                Ok(()) => deleted.push(id.clone()),
                Err(e) => {
                    warn!("Failed to delete merged guide {}: {}", id, e);
                    failed.push(id.clone());
                }
            }
        }

        let (events, record) = {
            let mut state = self.lock();
            for id in &deleted {
                state.forget(id);
            }
            state.merge_selection.clear();
            let primary = state.guides.iter().find(|g| g.id == merged.id).cloned();
            if let Some(primary) = &primary {
                state.editing = Some(primary.clone());
                state.manual_selection = true;
                state.renaming = None;
            }
            let record = state.scope_key().zip(primary);
            (vec![state.list_event(), state.selection_event()], record)
        };
        if let Some((key, primary)) = record {
            self.inner.selection.save_active(&key, &primary);
        }
        self.emit_all(events);

        if let Err(e) = self.reload().await {
            warn!("Failed to reload guides after merge: {}", e);
        }
        info!(
            "Merged {} guide(s) into {}",
            deleted.len() + 1,
            merged.id
        );

        Ok(Some(MergeReport {
            merged,
            deleted,
            failed,
        }))
    }

    /// Put the primary back the way it was if the merge never reached the server.
    fn revert_merge(&self, merged: &Guide, original: Guide) {
        let event = {
            let mut state = self.lock();
            let staged = Snapshot::of(merged);
            if state
                .editing
                .as_ref()
                .is_some_and(|g| g.id == original.id && Snapshot::of(g) == staged)
            {
                state.editing = Some(original.clone());
            }
            if let Some(entry) = state
                .guides
                .iter_mut()
                .find(|g| g.id == original.id && Snapshot::of(g) == staged)
            {
                *entry = original;
            }
            state.list_event()
        };
        self.emit(event);
    }
}
