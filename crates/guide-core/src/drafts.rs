//! Draft Store: local shadows of guides the user has typed into.
//!
//! The whole draft map is persisted as one JSON array under [`DRAFTS_KEY`]
//! on every write. Drafts are the source of truth for edits that have not
//! been acknowledged by the remote store yet.

use crate::model::{now_millis, Guide, Scope, ScopeKey};
use crate::storage::LocalStore;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// Storage key holding the serialized draft map.
pub const DRAFTS_KEY: &str = "guide_drafts";

/// Local shadow of a guide's saveable text fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Draft {
    pub id: String,
    #[serde(default)]
    pub scope: Scope,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub updated_at: u64,
}

impl Draft {
    fn from_guide(guide: &Guide, now_ms: u64) -> Self {
        Self {
            id: guide.id.clone(),
            scope: guide.scope,
            conversation_id: guide.conversation_id.clone(),
            title: guide.title.clone(),
            content: guide.content.clone(),
            updated_at: if guide.updated_at > 0 {
                guide.updated_at
            } else {
                now_ms
            },
        }
    }
}

/// Key -> draft cache backed by durable local storage.
pub struct DraftStore {
    store: Arc<dyn LocalStore>,
    drafts: BTreeMap<String, Draft>,
}

impl DraftStore {
    /// Load the persisted draft map. Unreadable storage means "no drafts".
    pub fn load(store: Arc<dyn LocalStore>) -> Self {
        let drafts = match store.get(DRAFTS_KEY) {
            Ok(Some(raw)) => parse_drafts(&raw),
            Ok(None) => BTreeMap::new(),
            Err(e) => {
                warn!("Failed to read guide drafts: {}", e);
                BTreeMap::new()
            }
        };
        debug!("Loaded {} guide draft(s)", drafts.len());
        Self { store, drafts }
    }

    /// Upsert the draft for a guide and persist the whole map.
    pub fn save_draft(&mut self, guide: &Guide) {
        let draft = Draft::from_guide(guide, now_millis());
        self.drafts.insert(draft.id.clone(), draft);
        self.persist();
    }

    /// Drop the draft for a guide. Persists only when something was removed.
    pub fn remove_draft(&mut self, id: &str) -> bool {
        if self.drafts.remove(id).is_none() {
            return false;
        }
        self.persist();
        true
    }

    /// Drop drafts of `key`'s list whose guide is not in `listed`.
    ///
    /// `listed` must be a complete, freshly loaded list for `key`. Returns how
    /// many drafts were removed.
    pub fn prune(&mut self, key: &ScopeKey, listed: &HashSet<&str>) -> usize {
        let before = self.drafts.len();
        self.drafts.retain(|id, draft| {
            let in_list = draft.scope == key.scope()
                && draft.conversation_id.as_deref() == key.conversation_id();
            !in_list || listed.contains(id.as_str())
        });
        let removed = before - self.drafts.len();
        if removed > 0 {
            debug!("Pruned {} draft(s) of guides gone from {}", removed, key);
            self.persist();
        }
        removed
    }

    pub fn get(&self, id: &str) -> Option<&Draft> {
        self.drafts.get(id)
    }

    pub fn len(&self) -> usize {
        self.drafts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drafts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Draft> {
        self.drafts.values()
    }

    /// Return the guide with the draft applied when the draft should win.
    ///
    /// Rules, in order:
    /// 1. No draft, or the draft belongs to another scope: the guide as is.
    /// 2. Draft strictly newer than the guide: draft title and content.
    /// 3. Guide lacks a title or content the draft has: fill those in.
    /// 4. Otherwise the guide.
    pub fn apply_if_fresher(&self, guide: &Guide) -> Guide {
        let Some(draft) = self.drafts.get(&guide.id) else {
            return guide.clone();
        };
        if draft.scope != guide.scope {
            return guide.clone();
        }

        let mut base = guide.clone();
        if base.scope == Scope::Conversation && base.conversation_id.is_none() {
            base.conversation_id = draft.conversation_id.clone();
        }

        if draft.updated_at > guide.updated_at {
            base.title = draft.title.clone();
            base.content = draft.content.clone();
            base.updated_at = draft.updated_at;
            return base;
        }

        let fills_content = base.content.is_empty() && !draft.content.is_empty();
        let fills_title = base.title.is_empty() && !draft.title.is_empty();
        if fills_content || fills_title {
            if fills_title {
                base.title = draft.title.clone();
            }
            if fills_content {
                base.content = draft.content.clone();
            }
            base.updated_at = draft.updated_at;
        }
        base
    }

    fn persist(&self) {
        let drafts: Vec<&Draft> = self.drafts.values().collect();
        let serialized = match serde_json::to_string(&drafts) {
            Ok(s) => s,
            Err(e) => {
                warn!("Failed to serialize guide drafts: {}", e);
                return;
            }
        };
        if let Err(e) = self.store.set(DRAFTS_KEY, &serialized) {
            warn!("Failed to persist guide drafts: {}", e);
        }
    }
}

/// Lenient per-entry parse. Entries without an id are skipped.
fn parse_drafts(raw: &str) -> BTreeMap<String, Draft> {
    let entries: Vec<serde_json::Value> = match serde_json::from_str(raw) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Discarding unreadable guide drafts: {}", e);
            return BTreeMap::new();
        }
    };

    entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value::<Draft>(entry) {
            Ok(draft) => Some((draft.id.clone(), draft)),
            Err(e) => {
                debug!("Skipping malformed guide draft: {}", e);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn guide(id: &str, title: &str, content: &str, updated_at: u64) -> Guide {
        Guide {
            id: id.into(),
            scope: Scope::Global,
            conversation_id: None,
            title: title.into(),
            content: content.into(),
            files: Vec::new(),
            created_at: 0,
            updated_at,
        }
    }

    fn store() -> Arc<dyn LocalStore> {
        Arc::new(MemoryStore::new())
    }

    #[test]
    fn test_save_draft_persists_and_reloads() {
        let store = store();
        {
            let mut drafts = DraftStore::load(Arc::clone(&store));
            drafts.save_draft(&guide("a", "Title", "Body", 100));
            drafts.save_draft(&guide("b", "Other", "", 200));
        }

        let reloaded = DraftStore::load(store);
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.get("a").unwrap().content, "Body");
        assert_eq!(reloaded.get("a").unwrap().updated_at, 100);
    }

    #[test]
    fn test_save_draft_stamps_missing_timestamp() {
        let mut drafts = DraftStore::load(store());
        drafts.save_draft(&guide("a", "", "x", 0));
        assert!(drafts.get("a").unwrap().updated_at > 0);
    }

    #[test]
    fn test_remove_draft() {
        let store = store();
        let mut drafts = DraftStore::load(Arc::clone(&store));
        drafts.save_draft(&guide("a", "t", "c", 1));

        assert!(drafts.remove_draft("a"));
        assert!(!drafts.remove_draft("a"));
        assert!(DraftStore::load(store).is_empty());
    }

    #[test]
    fn test_prune_only_touches_the_loaded_list() {
        let store = store();
        let mut drafts = DraftStore::load(Arc::clone(&store));
        drafts.save_draft(&guide("kept", "t", "c", 1));
        drafts.save_draft(&guide("gone", "t", "c", 1));
        let mut other = guide("elsewhere", "t", "c", 1);
        other.scope = Scope::Conversation;
        other.conversation_id = Some("r1".into());
        drafts.save_draft(&other);

        let listed: HashSet<&str> = ["kept"].into_iter().collect();
        assert_eq!(drafts.prune(&ScopeKey::Global, &listed), 1);
        assert!(drafts.get("gone").is_none());
        assert!(drafts.get("elsewhere").is_some());

        let reloaded = DraftStore::load(store);
        assert_eq!(reloaded.len(), 2);

        let mut drafts = reloaded;
        let none = HashSet::new();
        assert_eq!(drafts.prune(&ScopeKey::Conversation("r2".into()), &none), 0);
        assert_eq!(drafts.prune(&ScopeKey::Conversation("r1".into()), &none), 1);
        assert!(drafts.get("elsewhere").is_none());
    }

    #[test]
    fn test_unparseable_storage_means_no_drafts() {
        let store = store();
        store.set(DRAFTS_KEY, "{not json").unwrap();
        assert!(DraftStore::load(store).is_empty());
    }

    #[test]
    fn test_malformed_entries_are_skipped() {
        let store = store();
        store
            .set(
                DRAFTS_KEY,
                r#"[{"id":"ok","title":"t"},{"title":"no id"},42,{"id":"c","scope":"conversation","conversationId":"r1"}]"#,
            )
            .unwrap();

        let drafts = DraftStore::load(store);
        assert_eq!(drafts.len(), 2);
        assert_eq!(drafts.get("ok").unwrap().scope, Scope::Global);
        assert_eq!(drafts.get("c").unwrap().conversation_id.as_deref(), Some("r1"));
    }

    #[test]
    fn test_apply_without_draft_returns_guide() {
        let drafts = DraftStore::load(store());
        let g = guide("a", "t", "c", 10);
        assert_eq!(drafts.apply_if_fresher(&g), g);
    }

    #[test]
    fn test_apply_newer_draft_wins() {
        let mut drafts = DraftStore::load(store());
        drafts.save_draft(&guide("a", "Draft title", "draft body", 200));

        let applied = drafts.apply_if_fresher(&guide("a", "Server", "server body", 100));
        assert_eq!(applied.title, "Draft title");
        assert_eq!(applied.content, "draft body");
        assert_eq!(applied.updated_at, 200);
    }

    #[test]
    fn test_apply_older_draft_loses() {
        let mut drafts = DraftStore::load(store());
        drafts.save_draft(&guide("a", "Draft", "old", 100));

        let server = guide("a", "Server", "new", 200);
        assert_eq!(drafts.apply_if_fresher(&server), server);
    }

    #[test]
    fn test_apply_fills_empty_server_guide() {
        let mut drafts = DraftStore::load(store());
        drafts.save_draft(&guide("a", "Named", "typed", 100));

        // Freshly created on the server with a later timestamp but no text
        let applied = drafts.apply_if_fresher(&guide("a", "", "", 500));
        assert_eq!(applied.title, "Named");
        assert_eq!(applied.content, "typed");
    }

    #[test]
    fn test_apply_fill_keeps_existing_server_fields() {
        let mut drafts = DraftStore::load(store());
        drafts.save_draft(&guide("a", "", "typed", 100));

        let applied = drafts.apply_if_fresher(&guide("a", "Server title", "", 500));
        assert_eq!(applied.title, "Server title");
        assert_eq!(applied.content, "typed");
    }

    #[test]
    fn test_apply_ignores_draft_from_other_scope() {
        let mut drafts = DraftStore::load(store());
        let mut conv = guide("a", "Conv", "draft", 900);
        conv.scope = Scope::Conversation;
        conv.conversation_id = Some("r1".into());
        drafts.save_draft(&conv);

        let server = guide("a", "Global", "server", 100);
        assert_eq!(drafts.apply_if_fresher(&server), server);
    }

    #[test]
    fn test_apply_restores_conversation_id() {
        let mut drafts = DraftStore::load(store());
        let mut conv = guide("a", "t", "c", 100);
        conv.scope = Scope::Conversation;
        conv.conversation_id = Some("r1".into());
        drafts.save_draft(&conv);

        let mut server = guide("a", "t", "c", 100);
        server.scope = Scope::Conversation;
        let applied = drafts.apply_if_fresher(&server);
        assert_eq!(applied.conversation_id.as_deref(), Some("r1"));
    }
}
