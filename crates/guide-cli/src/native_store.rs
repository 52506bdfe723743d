//! Durable local store on the native filesystem: one file per key.

use guide_core::storage::{LocalStore, Result, StorageError};
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

/// Directory-backed [`LocalStore`].
pub struct FileStore {
    base_path: PathBuf,
}

impl FileStore {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn full_path(&self, key: &str) -> PathBuf {
        self.base_path.join(file_name(key))
    }
}

/// Map a storage key to a file name. Injective, so distinct keys never share a file.
fn file_name(key: &str) -> String {
    let mut name = String::with_capacity(key.len());
    for (i, byte) in key.bytes().enumerate() {
        let keep = byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' || (byte == b'.' && i > 0);
        if keep {
            name.push(byte as char);
        } else {
            name.push_str(&format!("%{:02X}", byte));
        }
    }
    name
}

impl LocalStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.full_path(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io(e.to_string())),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        fs::create_dir_all(&self.base_path).map_err(|e| StorageError::Io(e.to_string()))?;
        fs::write(self.full_path(key), value).map_err(|e| StorageError::Io(e.to_string()))
    }

    fn remove(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.full_path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_store_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path().join("local"));

        assert_eq!(store.get("guide_drafts").unwrap(), None);

        store.set("guide_drafts", "[{\"id\":\"a\"}]").unwrap();
        assert_eq!(
            store.get("guide_drafts").unwrap().as_deref(),
            Some("[{\"id\":\"a\"}]")
        );

        store.remove("guide_drafts").unwrap();
        store.remove("guide_drafts").unwrap();
        assert_eq!(store.get("guide_drafts").unwrap(), None);
    }

    #[test]
    fn test_keys_with_path_characters_stay_inside_the_store() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path().to_path_buf());

        store.set("guide_panel.active.conversation.../x", "1").unwrap();
        store.set("guide_panel.active.conversation..._x", "2").unwrap();

        assert_eq!(store.get("guide_panel.active.conversation.../x").unwrap().as_deref(), Some("1"));
        assert_eq!(store.get("guide_panel.active.conversation..._x").unwrap().as_deref(), Some("2"));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[test]
    fn test_file_name_escapes_leading_dot() {
        assert_eq!(file_name(".."), "%2E.");
        assert_eq!(file_name("guide_panel.tab"), "guide_panel.tab");
        assert_eq!(file_name("a b"), "a%20b");
    }
}
