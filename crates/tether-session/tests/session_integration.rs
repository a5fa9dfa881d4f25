#![allow(clippy::unwrap_used, clippy::expect_used)]

use tether_core::{Message, MessagePart, Role};
use tether_session::{ConversationStore, FileConversationStore};

#[tokio::test]
async fn test_persistence_across_store_instances() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().to_path_buf();

    {
        let store = FileConversationStore::new(dir.clone()).await.unwrap();
        let msg = Message::new(
            Role::User,
            vec![
                MessagePart::text("make the header blue"),
                MessagePart::file("image/png", "https://cdn.example.com/shot.png"),
            ],
        );
        store.append("app_7", &[msg]).await.unwrap();
    }

    let store = FileConversationStore::new(dir).await.unwrap();
    let entries = store.read("app_7").await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].thread_id, "app_7");
    assert_eq!(entries[0].message.file_count(), 1);
}

#[tokio::test]
async fn test_threads_are_isolated() {
    let tmp = tempfile::tempdir().unwrap();
    let store = FileConversationStore::new(tmp.path().to_path_buf())
        .await
        .unwrap();

    store.append("a", &[Message::user("for a")]).await.unwrap();
    store.append("b", &[Message::user("for b")]).await.unwrap();
    store.append("b", &[Message::assistant("reply b")]).await.unwrap();

    assert_eq!(store.read("a").await.unwrap().len(), 1);
    assert_eq!(store.read("b").await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_concurrent_appends_keep_unique_sequences() {
    let tmp = tempfile::tempdir().unwrap();
    let store = std::sync::Arc::new(
        FileConversationStore::new(tmp.path().to_path_buf())
            .await
            .unwrap(),
    );

    let mut handles = Vec::new();
    for i in 0..8 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store
                .append("shared", &[Message::assistant(format!("chunk {i}"))])
                .await
                .unwrap();
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    let mut seqs: Vec<u64> = store
        .read("shared")
        .await
        .unwrap()
        .iter()
        .map(|e| e.sequence)
        .collect();
    seqs.sort_unstable();
    assert_eq!(seqs, (0..8).collect::<Vec<_>>());
}
