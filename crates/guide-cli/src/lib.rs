//! guide-cli library: file-backed stores for driving a guide session from
//! the command line.
//!
//! Exposed as a library so integration tests can reuse the same backends.

pub mod native_store;
pub mod remote_file;

pub use native_store::FileStore;
pub use remote_file::{RemoteFile, REMOTE_FILE};
