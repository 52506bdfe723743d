//! guide-core: Draft synchronization and autosave for guide notes.
//!
//! This crate provides the core functionality for:
//! - Caching unsaved edits locally so they survive reloads and network faults
//! - Coalescing rapid edits into debounced, serialized remote writes
//! - Restoring the guide that was open per global/conversation list
//! - Reordering and merging guides against the remote store
//! - LocalStore and GuideRemote trait abstractions

pub mod autosave;
pub mod config;
pub mod drafts;
pub mod events;
pub mod merge;
pub mod model;
pub mod remote;
pub mod reorder;
pub mod selection;
pub mod session;
pub mod snapshot;
pub mod storage;

pub use autosave::{FlushError, FlushOutcome, FlushResult};
pub use config::{ConfigError, EngineConfig};
pub use drafts::{Draft, DraftStore};
pub use events::{EventBus, GuideEvent, SaveStatus, Subscription};
pub use merge::MergePlan;
pub use model::{Guide, GuideFile, GuidePatch, NewGuide, Scope, ScopeKey};
pub use remote::{GuideRemote, MemoryRemote, RemoteError, RemoteOp, RemoteState};
pub use selection::{Restoration, SelectionStore};
pub use session::{GuideSession, MergeReport, SessionError};
pub use snapshot::{AckedSnapshots, Snapshot};
pub use storage::{LocalStore, MemoryStore, StorageError};
