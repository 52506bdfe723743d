//! Guide data model shared by every engine component.
//!
//! Timestamps are milliseconds since the Unix epoch. The remote store is the
//! only party that assigns guide ids.

use serde::{Deserialize, Serialize};
use std::fmt;
use web_time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time in milliseconds since epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Whether a guide belongs to the global list or to one conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    #[default]
    Global,
    Conversation,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Global => "global",
            Scope::Conversation => "conversation",
        }
    }

    /// Parse the persisted form. Anything unknown is rejected.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "global" => Some(Scope::Global),
            "conversation" => Some(Scope::Conversation),
            _ => None,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of one guide list: the global list or a specific conversation's list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScopeKey {
    Global,
    Conversation(String),
}

impl ScopeKey {
    /// Resolve the key for a tab. A conversation tab needs an active conversation.
    pub fn resolve(tab: Scope, conversation_id: Option<&str>) -> Option<Self> {
        match tab {
            Scope::Global => Some(ScopeKey::Global),
            Scope::Conversation => conversation_id.map(|id| ScopeKey::Conversation(id.to_string())),
        }
    }

    pub fn scope(&self) -> Scope {
        match self {
            ScopeKey::Global => Scope::Global,
            ScopeKey::Conversation(_) => Scope::Conversation,
        }
    }

    pub fn conversation_id(&self) -> Option<&str> {
        match self {
            ScopeKey::Global => None,
            ScopeKey::Conversation(id) => Some(id),
        }
    }
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeKey::Global => f.write_str("global"),
            ScopeKey::Conversation(id) => write!(f, "conversation.{}", id),
        }
    }
}

/// Metadata for a file attached to a guide. The bytes live in object storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GuideFile {
    pub id: String,
    pub file_name: String,
    #[serde(default)]
    pub file_size: Option<u64>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub storage_key: Option<String>,
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(default)]
    pub created_at: Option<u64>,
}

impl GuideFile {
    /// Signature used to reject re-attaching the same local file twice.
    pub fn signature(&self) -> (&str, Option<u64>) {
        (&self.file_name, self.file_size)
    }
}

/// A titled text note, global or attached to one conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Guide {
    pub id: String,
    pub scope: Scope,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub files: Vec<GuideFile>,
    #[serde(default)]
    pub created_at: u64,
    #[serde(default)]
    pub updated_at: u64,
}

impl Guide {
    /// False only for a conversation guide that lost its conversation id.
    pub fn has_scope_context(&self) -> bool {
        self.scope == Scope::Global || self.conversation_id.is_some()
    }

    /// Freshly created guides carry neither a title nor content.
    pub fn is_blank(&self) -> bool {
        self.title.is_empty() && self.content.is_empty()
    }

    /// Fill in the conversation id from the surrounding context when missing.
    pub fn with_context(mut self, conversation_id: Option<&str>) -> Self {
        if self.scope == Scope::Conversation && self.conversation_id.is_none() {
            self.conversation_id = conversation_id.map(str::to_string);
        }
        self
    }

    /// The update payload carrying every saveable field.
    pub fn to_patch(&self) -> GuidePatch {
        GuidePatch {
            title: Some(self.title.clone()),
            content: Some(self.content.clone()),
            conversation_id: self.conversation_id.clone(),
            files: Some(self.files.clone()),
        }
    }
}

/// Create payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewGuide {
    pub title: String,
    pub content: String,
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub files: Vec<GuideFile>,
}

/// Update payload. `files`, when present, replaces the whole list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuidePatch {
    pub title: Option<String>,
    pub content: Option<String>,
    pub conversation_id: Option<String>,
    pub files: Option<Vec<GuideFile>>,
}
