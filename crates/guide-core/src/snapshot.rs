//! Snapshot Reconciler: canonical serialization of a guide's saveable fields.
//!
//! Two guides are equivalent for save purposes iff their snapshots are
//! byte-equal. File order is meaningful and kept as is.

use crate::model::{Guide, GuideFile, Scope};
use serde::Serialize;
use std::collections::HashMap;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotView<'a> {
    id: &'a str,
    scope: Scope,
    conversation_id: Option<&'a str>,
    title: &'a str,
    content: &'a str,
    files: Vec<FileView<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FileView<'a> {
    id: &'a str,
    file_name: &'a str,
    file_size: Option<u64>,
    mime_type: Option<&'a str>,
    storage_key: Option<&'a str>,
    download_url: Option<&'a str>,
    created_at: Option<u64>,
}

impl<'a> From<&'a GuideFile> for FileView<'a> {
    fn from(file: &'a GuideFile) -> Self {
        Self {
            id: &file.id,
            file_name: &file.file_name,
            file_size: file.file_size,
            mime_type: file.mime_type.as_deref(),
            storage_key: file.storage_key.as_deref(),
            download_url: file.download_url.as_deref(),
            created_at: file.created_at,
        }
    }
}

/// Canonical serialized form of a guide's saveable fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Snapshot(String);

impl Snapshot {
    pub fn of(guide: &Guide) -> Self {
        let view = SnapshotView {
            id: &guide.id,
            scope: guide.scope,
            conversation_id: guide.conversation_id.as_deref(),
            title: &guide.title,
            content: &guide.content,
            files: guide.files.iter().map(FileView::from).collect(),
        };
        // Strings, integers and options only: serialization cannot fail.
        Self(serde_json::to_string(&view).unwrap_or_default())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Whether two guides would produce the same write.
pub fn equivalent(a: &Guide, b: &Guide) -> bool {
    Snapshot::of(a) == Snapshot::of(b)
}

/// Last acknowledged snapshot per guide id, plus the latest one handed to
/// the save queue and not settled yet.
#[derive(Debug, Default)]
pub struct AckedSnapshots {
    snapshots: HashMap<String, Snapshot>,
    submitted: HashMap<String, Snapshot>,
}

impl AckedSnapshots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the acknowledged form of a guide.
    pub fn record(&mut self, guide: &Guide) {
        self.snapshots.insert(guide.id.clone(), Snapshot::of(guide));
    }

    /// True when `snapshot` matches what the remote store already has for `id`.
    pub fn is_acknowledged(&self, id: &str, snapshot: &Snapshot) -> bool {
        self.snapshots.get(id) == Some(snapshot)
    }

    pub fn get(&self, id: &str) -> Option<&Snapshot> {
        self.snapshots.get(id)
    }

    /// Remember that a write of `snapshot` is queued or in flight.
    pub fn mark_submitted(&mut self, id: &str, snapshot: Snapshot) {
        self.submitted.insert(id.to_string(), snapshot);
    }

    /// True when the latest queued write for `id` carries `snapshot`.
    pub fn is_submitted(&self, id: &str, snapshot: &Snapshot) -> bool {
        self.submitted.get(id) == Some(snapshot)
    }

    /// A write of `snapshot` finished, either way. A later submission stays.
    pub fn settle(&mut self, id: &str, snapshot: &Snapshot) {
        if self.submitted.get(id) == Some(snapshot) {
            self.submitted.remove(id);
        }
    }

    pub fn forget(&mut self, id: &str) {
        self.snapshots.remove(id);
        self.submitted.remove(id);
    }
}
