//! Active-Selection Restorer.
//!
//! Remembers which guide was open per scope key and which tab was last used,
//! and decides what to open when a list is (re)loaded.

use crate::model::{now_millis, Guide, Scope, ScopeKey};
use crate::storage::LocalStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Storage key for the last-used tab.
pub const TAB_KEY: &str = "guide_panel.tab";

const ACTIVE_PREFIX: &str = "guide_panel.active";

/// Storage key for the active guide of one list.
pub fn active_key(key: &ScopeKey) -> String {
    format!("{}.{}", ACTIVE_PREFIX, key)
}

/// Persisted active selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveRecord {
    pub guide_id: String,
    pub scope: Scope,
    #[serde(default)]
    pub updated_at: u64,
}

/// Reads and writes selection state. Every failure degrades to "nothing saved".
#[derive(Clone)]
pub struct SelectionStore {
    store: Arc<dyn LocalStore>,
}

impl SelectionStore {
    pub fn new(store: Arc<dyn LocalStore>) -> Self {
        Self { store }
    }

    pub fn load_active(&self, key: &ScopeKey) -> Option<String> {
        let raw = match self.store.get(&active_key(key)) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!("Failed to read active guide for {}: {}", key, e);
                return None;
            }
        };
        match serde_json::from_str::<ActiveRecord>(&raw) {
            Ok(record) if !record.guide_id.is_empty() => Some(record.guide_id),
            Ok(_) => None,
            Err(e) => {
                debug!("Ignoring unreadable active guide for {}: {}", key, e);
                None
            }
        }
    }

    pub fn save_active(&self, key: &ScopeKey, guide: &Guide) {
        let record = ActiveRecord {
            guide_id: guide.id.clone(),
            scope: guide.scope,
            updated_at: if guide.updated_at > 0 {
                guide.updated_at
            } else {
                now_millis()
            },
        };
        let serialized = match serde_json::to_string(&record) {
            Ok(s) => s,
            Err(e) => {
                warn!("Failed to serialize active guide: {}", e);
                return;
            }
        };
        if let Err(e) = self.store.set(&active_key(key), &serialized) {
            warn!("Failed to persist active guide for {}: {}", key, e);
        }
    }

    pub fn clear_active(&self, key: &ScopeKey) {
        if let Err(e) = self.store.remove(&active_key(key)) {
            warn!("Failed to clear active guide for {}: {}", key, e);
        }
    }

    pub fn load_tab(&self) -> Option<Scope> {
        match self.store.get(TAB_KEY) {
            Ok(raw) => raw.as_deref().and_then(Scope::parse),
            Err(e) => {
                warn!("Failed to read last guide tab: {}", e);
                None
            }
        }
    }

    pub fn save_tab(&self, tab: Scope) {
        if let Err(e) = self.store.set(TAB_KEY, tab.as_str()) {
            warn!("Failed to persist guide tab: {}", e);
        }
    }
}

/// What to open after a list load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Restoration {
    /// The persisted active guide is still in the list.
    Persisted(String),
    /// Newest guide without title or content; opens in rename mode.
    NewestBlank(String),
    /// The guide already open is still in the list.
    Current(String),
    First(String),
    Empty,
}

impl Restoration {
    pub fn guide_id(&self) -> Option<&str> {
        match self {
            Restoration::Persisted(id)
            | Restoration::NewestBlank(id)
            | Restoration::Current(id)
            | Restoration::First(id) => Some(id),
            Restoration::Empty => None,
        }
    }

    pub fn starts_rename(&self) -> bool {
        matches!(self, Restoration::NewestBlank(_))
    }
}

/// Pick the guide to open. Pure: reading never writes anything back.
pub fn choose(list: &[Guide], persisted: Option<&str>, current: Option<&str>) -> Restoration {
    let contains = |id: &str| list.iter().any(|g| g.id == id);

    if let Some(id) = persisted.filter(|id| contains(id)) {
        return Restoration::Persisted(id.to_string());
    }
    // max_by_key keeps the last of equal keys, so later list entries win ties.
    if let Some(blank) = list.iter().filter(|g| g.is_blank()).max_by_key(|g| g.created_at) {
        return Restoration::NewestBlank(blank.id.clone());
    }
    if let Some(id) = current.filter(|id| contains(id)) {
        return Restoration::Current(id.to_string());
    }
    match list.first() {
        Some(first) => Restoration::First(first.id.clone()),
        None => Restoration::Empty,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn guide(id: &str, title: &str, created_at: u64) -> Guide {
        Guide {
            id: id.into(),
            scope: Scope::Global,
            conversation_id: None,
            title: title.into(),
            content: String::new(),
            files: Vec::new(),
            created_at,
            updated_at: created_at,
        }
    }

    #[test]
    fn test_active_key_per_scope() {
        assert_eq!(active_key(&ScopeKey::Global), "guide_panel.active.global");
        assert_eq!(
            active_key(&ScopeKey::Conversation("c9".into())),
            "guide_panel.active.conversation.c9"
        );
    }

    #[test]
    fn test_active_round_trip_is_keyed_by_scope() {
        let store = SelectionStore::new(Arc::new(MemoryStore::new()));
        let c1 = ScopeKey::Conversation("c1".into());
        let c2 = ScopeKey::Conversation("c2".into());

        store.save_active(&c1, &guide("g1", "T", 5));
        assert_eq!(store.load_active(&c1).as_deref(), Some("g1"));
        assert_eq!(store.load_active(&c2), None);
        assert_eq!(store.load_active(&ScopeKey::Global), None);

        store.clear_active(&c1);
        assert_eq!(store.load_active(&c1), None);
    }

    #[test]
    fn test_unreadable_active_record_is_absent() {
        let raw = Arc::new(MemoryStore::new());
        raw.set("guide_panel.active.global", "not json").unwrap();
        let store = SelectionStore::new(raw);
        assert_eq!(store.load_active(&ScopeKey::Global), None);
    }

    #[test]
    fn test_tab_round_trip() {
        let raw = Arc::new(MemoryStore::new());
        let store = SelectionStore::new(raw.clone());
        assert_eq!(store.load_tab(), None);

        store.save_tab(Scope::Conversation);
        assert_eq!(store.load_tab(), Some(Scope::Conversation));

        raw.set(TAB_KEY, "sideways").unwrap();
        assert_eq!(store.load_tab(), None);
    }

    #[test]
    fn test_choose_prefers_persisted() {
        let list = vec![guide("a", "A", 1), guide("b", "", 2)];
        assert_eq!(
            choose(&list, Some("a"), None),
            Restoration::Persisted("a".into())
        );
    }

    #[test]
    fn test_choose_newest_blank_enters_rename() {
        let list = vec![guide("a", "A", 1), guide("b", "", 2), guide("c", "", 3)];
        let choice = choose(&list, Some("gone"), Some("a"));
        assert_eq!(choice, Restoration::NewestBlank("c".into()));
        assert!(choice.starts_rename());
    }

    #[test]
    fn test_choose_falls_back_to_current_then_first() {
        let list = vec![guide("a", "A", 1), guide("b", "B", 2)];
        assert_eq!(choose(&list, None, Some("b")), Restoration::Current("b".into()));
        assert_eq!(choose(&list, None, Some("gone")), Restoration::First("a".into()));
        assert_eq!(choose(&[], Some("a"), Some("b")), Restoration::Empty);
    }
}
