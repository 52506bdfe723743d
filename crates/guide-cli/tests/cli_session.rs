//! Runs a guide session over the file-backed stores twice, the way two
//! separate guide-cli invocations would.

use std::sync::Arc;

use guide_cli::{FileStore, RemoteFile};
use guide_core::{EngineConfig, GuideSession, LocalStore, MemoryRemote, RemoteOp};
use tempfile::TempDir;

fn open(dir: &TempDir, remote_file: &RemoteFile) -> (Arc<MemoryRemote>, GuideSession<Arc<MemoryRemote>>) {
    let remote = Arc::new(remote_file.open_remote().unwrap());
    let store: Arc<dyn LocalStore> = Arc::new(FileStore::new(dir.path().join("local")));
    let session = GuideSession::new(Arc::clone(&remote), store, EngineConfig::default());
    (remote, session)
}

#[tokio::test(start_paused = true)]
async fn test_edits_persist_across_runs() {
    let dir = TempDir::new().unwrap();
    let remote_file = RemoteFile::new(dir.path());

    let (remote, session) = open(&dir, &remote_file);
    session.open().await.unwrap();
    let created = session.create_guide().await.unwrap();
    session.set_rename_text("Packing list");
    session.commit_rename().await.unwrap();
    session.edit_content("tent, stove").unwrap();
    assert!(session.close().await.unwrap().wrote());
    remote_file.save(&remote).unwrap();

    let (_remote, session) = open(&dir, &remote_file);
    session.open().await.unwrap();
    let editing = session.editing().unwrap();
    assert_eq!(editing.id, created.id);
    assert_eq!(editing.title, "Packing list");
    assert_eq!(editing.content, "tent, stove");
}

#[tokio::test(start_paused = true)]
async fn test_unsaved_edit_comes_back_from_local_drafts() {
    let dir = TempDir::new().unwrap();
    let remote_file = RemoteFile::new(dir.path());

    let (remote, session) = open(&dir, &remote_file);
    session.open().await.unwrap();
    let created = session.create_guide().await.unwrap();
    session.cancel_rename();
    remote_file.save(&remote).unwrap();

    remote.set_failing(RemoteOp::Update, true);
    session.edit_content("offline edit").unwrap();
    assert!(session.close().await.is_err());

    let (remote, session) = open(&dir, &remote_file);
    session.open().await.unwrap();
    assert_eq!(remote.guide(&created.id).unwrap().content, "");
    assert_eq!(session.editing().unwrap().content, "offline edit");
}
