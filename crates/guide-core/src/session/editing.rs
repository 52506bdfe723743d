//! Edits, the debounced flush path, rename and explicit send.

use super::{GuideSession, Result, SessionError, SessionState};
use crate::autosave::{FlushError, FlushOutcome, FlushResult};
use crate::events::{GuideEvent, SaveStatus};
use crate::model::{now_millis, Guide, GuideFile};
use crate::remote::GuideRemote;
use crate::snapshot::Snapshot;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// How a flush treats the rate limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum FlushMode {
    /// Debounce timer or a plain `flush()` call. Honors the rate limit.
    Scheduled,
    /// Navigation, close, send and merge. Nothing would retry these later.
    Immediate,
}

impl<R: GuideRemote + 'static> GuideSession<R> {
    pub fn edit_title(&self, title: impl Into<String>) -> Result<bool> {
        let title = title.into();
        self.mutate_editing(|guide| {
            if guide.title == title {
                return false;
            }
            guide.title = title;
            true
        })
    }

    pub fn edit_content(&self, content: impl Into<String>) -> Result<bool> {
        let content = content.into();
        self.mutate_editing(|guide| {
            if guide.content == content {
                return false;
            }
            guide.content = content;
            true
        })
    }

    /// Attach files to the open guide, skipping ones already attached
    /// (same name and size). Returns how many were added.
    pub fn attach_files(&self, files: Vec<GuideFile>) -> Result<usize> {
        let mut added = 0;
        self.mutate_editing(|guide| {
            for file in files {
                if guide.files.iter().any(|f| f.signature() == file.signature()) {
                    debug!("Skipping duplicate attachment {}", file.file_name);
                    continue;
                }
                guide.files.push(file);
                added += 1;
            }
            added > 0
        })?;
        Ok(added)
    }

    fn mutate_editing(&self, apply: impl FnOnce(&mut Guide) -> bool) -> Result<bool> {
        let mut state = self.lock();
        let Some(mut edited) = state.editing.clone() else {
            return Err(SessionError::NothingSelected);
        };
        if !apply(&mut edited) {
            return Ok(false);
        }
        // Local edits always sort after the copy they were made on.
        edited.updated_at = now_millis().max(edited.updated_at + 1);
        self.stage(&mut state, edited);
        Ok(true)
    }

    /// Make an edit visible everywhere and restart the quiet period.
    fn stage(&self, state: &mut SessionState, edited: Guide) {
        if let Some(entry) = state.guides.iter_mut().find(|g| g.id == edited.id) {
            *entry = edited.clone();
        }
        state.drafts.save_draft(&edited);
        state.editing = Some(edited.clone());
        state.pending = Some(edited);
        self.arm_debounce(state, self.inner.config.debounce);
    }

    pub(super) fn arm_debounce(&self, state: &mut SessionState, delay: Duration) {
        let generation = state.debouncer.rearm();
        let session = self.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let fired = session.lock().debouncer.fire(generation);
            if !fired {
                return;
            }
            match session.flush_with(None, FlushMode::Scheduled).await {
                Ok(outcome) => debug!("Debounced guide flush: wrote={}", outcome.wrote()),
                Err(e) => warn!("Debounced guide flush failed: {}", e),
            }
        });
        state.debouncer.attach(generation, handle);
    }

    /// Flush the latest edit now, subject to the minimum flush interval.
    pub async fn flush(&self) -> FlushResult {
        self.flush_with(None, FlushMode::Scheduled).await
    }

    /// Flush a given copy of a guide instead of the latest edit.
    pub async fn flush_guide(&self, guide: Guide) -> FlushResult {
        self.flush_with(Some(guide), FlushMode::Scheduled).await
    }

    /// Resolve a candidate and, if the remote store needs it, queue its write.
    ///
    /// `candidate` overrides the pending edit and the editor.
    pub(super) async fn flush_with(&self, candidate: Option<Guide>, mode: FlushMode) -> FlushResult {
        let explicit = candidate.is_some();
        let job = {
            let mut state = self.lock();
            let Some(candidate) = candidate
                .or_else(|| state.pending.clone())
                .or_else(|| state.editing.clone())
            else {
                return Ok(FlushOutcome::NothingPending);
            };

            let candidate = candidate.with_context(state.conversation_id.as_deref());
            if !candidate.has_scope_context() {
                warn!(
                    "Not saving conversation guide {}: no conversation to save into",
                    candidate.id
                );
                return Err(FlushError::MissingScopeContext(candidate.id));
            }

            let snapshot = Snapshot::of(&candidate);
            if state.acked.is_acknowledged(&candidate.id, &snapshot) {
                state.clear_pending(&candidate.id);
                return Ok(FlushOutcome::Unchanged);
            }
            // Same content already queued: wait behind it instead of writing twice.
            let in_flight = state.acked.is_submitted(&candidate.id, &snapshot);

            if mode == FlushMode::Scheduled && !in_flight {
                if let Some(retry_in) = state.limiter.remaining(Instant::now()) {
                    debug!("Deferring save of guide {} by {:?}", candidate.id, retry_in);
                    state.pending = Some(candidate);
                    self.arm_debounce(&mut state, retry_in);
                    return Ok(FlushOutcome::RateLimited { retry_in });
                }
            }

            state.clear_pending(&candidate.id);
            let write = if in_flight {
                debug!("Guide {} is already being saved with this content", candidate.id);
                None
            } else {
                state.acked.mark_submitted(&candidate.id, snapshot);
                Some(candidate)
            };
            let session = self.clone();
            self.inner.queue.submit(async move {
                match write {
                    Some(candidate) => session.write(candidate, explicit).await,
                    None => Ok(FlushOutcome::Unchanged),
                }
            })
        };
        job.await?
    }

    /// Runs on the save queue, one write at a time.
    async fn write(&self, candidate: Guide, explicit: bool) -> FlushResult {
        let patch = candidate.to_patch();
        match self
            .inner
            .remote
            .update_guide(candidate.scope, &candidate.id, patch)
            .await
        {
            Ok(saved) => {
                debug!("Saved guide {}", saved.id);
                self.acknowledge(&candidate, &saved);
                Ok(FlushOutcome::Saved(saved))
            }
            Err(e) => {
                warn!("Failed to save guide {}: {}", candidate.id, e);
                self.lock()
                    .acked
                    .settle(&candidate.id, &Snapshot::of(&candidate));
                if !explicit {
                    self.retain_pending(candidate);
                }
                Err(FlushError::Remote(e))
            }
        }
    }

    fn acknowledge(&self, submitted: &Guide, saved: &Guide) {
        let mut guard = self.lock();
        let state = &mut *guard;
        state.limiter.record(Instant::now());
        let submitted = Snapshot::of(submitted);
        state.acked.settle(&saved.id, &submitted);

        let Some(index) = state.guides.iter().position(|g| g.id == saved.id) else {
            debug!("Guide {} left the list before its save completed", saved.id);
            return;
        };
        state.acked.record(saved);

        // Copies edited after the submission keep their newer fields.
        if Snapshot::of(&state.guides[index]) == submitted {
            state.guides[index] = saved.clone();
            state.drafts.save_draft(saved);
        }
        if state
            .editing
            .as_ref()
            .is_some_and(|g| g.id == saved.id && Snapshot::of(g) == submitted)
        {
            state.editing = Some(saved.clone());
        }
    }

    fn retain_pending(&self, candidate: Guide) {
        let mut state = self.lock();
        if state.pending.is_none() && state.contains(&candidate.id) {
            state.pending = Some(candidate);
        }
    }

    /// Enter rename mode for `id`, opening it first if needed.
    pub async fn begin_rename(&self, id: &str) -> Result<()> {
        let already_open = self.lock().editing_id() == Some(id);
        if !already_open {
            return self.select(id, true).await;
        }
        let event = {
            let mut state = self.lock();
            state.start_rename();
            state.selection_event()
        };
        self.emit(event);
        Ok(())
    }

    /// Update the rename text box. Ignored outside rename mode.
    pub fn set_rename_text(&self, text: impl Into<String>) -> bool {
        let mut state = self.lock();
        if state.renaming.is_none() {
            return false;
        }
        state.rename_text = text.into();
        true
    }

    /// Apply the trimmed rename text as the title and save it right away.
    ///
    /// Returns whether the title changed.
    pub async fn commit_rename(&self) -> Result<bool> {
        let (changed, event) = {
            let mut state = self.lock();
            let Some(id) = state.renaming.take() else {
                return Ok(false);
            };
            let title = std::mem::take(&mut state.rename_text).trim().to_string();
            let changed = match state.editing.clone() {
                Some(mut guide) if guide.id == id && guide.title != title => {
                    guide.title = title;
                    guide.updated_at = now_millis().max(guide.updated_at + 1);
                    self.stage(&mut state, guide);
                    true
                }
                _ => false,
            };
            (changed, state.selection_event())
        };
        self.emit(event);

        if changed {
            self.flush_with(None, FlushMode::Immediate).await?;
        }
        Ok(changed)
    }

    /// Leave rename mode without touching the title.
    pub fn cancel_rename(&self) {
        let event = {
            let mut state = self.lock();
            if state.renaming.take().is_none() {
                return;
            }
            state.rename_text.clear();
            state.selection_event()
        };
        self.emit(event);
    }

    /// Explicit send: commit a pending rename, save the editor now and
    /// report progress through the save status.
    pub async fn send(&self) -> Result<()> {
        self.set_status(SaveStatus::Sending);
        self.lock().debouncer.cancel();

        let renaming = self.lock().renaming.is_some();
        let mut result = Ok(());
        if renaming {
            result = self.commit_rename().await.map(|_| ());
        }
        if result.is_ok() {
            result = self
                .flush_with(None, FlushMode::Immediate)
                .await
                .map(|_| ())
                .map_err(SessionError::from);
        }

        match &result {
            Ok(()) => {
                info!("Guide sent");
                self.set_status(SaveStatus::Success);
            }
            Err(e) => {
                warn!("Sending guide failed: {}", e);
                self.set_status(SaveStatus::Error);
            }
        }
        self.schedule_status_reset();
        result
    }

    pub(super) fn set_status(&self, status: SaveStatus) {
        let changed = {
            let mut state = self.lock();
            state.status_generation += 1;
            if let Some(handle) = state.status_reset.take() {
                handle.abort();
            }
            let changed = state.save_status != status;
            state.save_status = status;
            changed
        };
        if changed {
            self.emit(GuideEvent::SaveStatusChanged { status });
        }
    }

    fn schedule_status_reset(&self) {
        let delay = self.inner.config.status_reset;
        let session = self.clone();
        let mut state = self.lock();
        let generation = state.status_generation;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let reset = {
                let mut state = session.lock();
                if state.status_generation != generation {
                    false
                } else {
                    // Dropping our own handle detaches; it does not abort.
                    state.status_reset = None;
                    let changed = state.save_status != SaveStatus::Idle;
                    state.save_status = SaveStatus::Idle;
                    changed
                }
            };
            if reset {
                session.emit(GuideEvent::SaveStatusChanged {
                    status: SaveStatus::Idle,
                });
            }
        });
        state.status_reset = Some(handle);
    }
}
