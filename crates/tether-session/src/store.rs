//! Durable conversation stores.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tether_core::{Message, TetherError, TetherResult};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// ConversationEntry
// ---------------------------------------------------------------------------

/// One persisted message of a conversation thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationEntry {
    /// Unique entry id.
    pub id: Uuid,
    /// Thread the entry belongs to.
    pub thread_id: String,
    /// When the entry was appended.
    pub timestamp: DateTime<Utc>,
    /// Position within the thread, starting at 0.
    pub sequence: u64,
    /// The stored message.
    pub message: Message,
}

// ---------------------------------------------------------------------------
// ConversationStore trait
// ---------------------------------------------------------------------------

/// Append-only message history keyed by thread id.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Appends messages in order. Returns the number appended.
    async fn append(&self, thread_id: &str, messages: &[Message]) -> TetherResult<usize>;

    /// Reads a thread in sequence order. Unknown threads are empty.
    async fn read(&self, thread_id: &str) -> TetherResult<Vec<ConversationEntry>>;
}

fn entries_for(thread_id: &str, start: u64, messages: &[Message]) -> Vec<ConversationEntry> {
    messages
        .iter()
        .zip(start..)
        .map(|(message, sequence)| ConversationEntry {
            id: Uuid::new_v4(),
            thread_id: thread_id.to_string(),
            timestamp: Utc::now(),
            sequence,
            message: message.clone(),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// FileConversationStore
// ---------------------------------------------------------------------------

/// JSONL file per thread. Appends are serialized within the process.
pub struct FileConversationStore {
    dir: PathBuf,
    write_lock: AsyncMutex<()>,
}

impl FileConversationStore {
    /// Opens a store under `dir`, creating it if needed.
    pub async fn new(dir: PathBuf) -> TetherResult<Self> {
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            write_lock: AsyncMutex::new(()),
        })
    }

    fn thread_path(&self, thread_id: &str) -> TetherResult<PathBuf> {
        if thread_id.is_empty()
            || !thread_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(TetherError::Session(format!(
                "Invalid thread id: {thread_id:?}"
            )));
        }
        Ok(self.dir.join(format!("{thread_id}.jsonl")))
    }
}

#[async_trait]
impl ConversationStore for FileConversationStore {
    async fn append(&self, thread_id: &str, messages: &[Message]) -> TetherResult<usize> {
        if messages.is_empty() {
            return Ok(0);
        }
        let path = self.thread_path(thread_id)?;
        let _guard = self.write_lock.lock().await;

        let start = self.read(thread_id).await?.len() as u64;
        let mut buf = String::new();
        for entry in entries_for(thread_id, start, messages) {
            buf.push_str(&serde_json::to_string(&entry)?);
            buf.push('\n');
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(buf.as_bytes()).await?;
        file.flush().await?;
        tracing::debug!(thread_id, count = messages.len(), "Appended conversation messages");
        Ok(messages.len())
    }

    async fn read(&self, thread_id: &str) -> TetherResult<Vec<ConversationEntry>> {
        let path = self.thread_path(thread_id)?;
        if !path.exists() {
            return Ok(Vec::new());
        }
        let data = tokio::fs::read_to_string(&path).await?;
        let mut entries: Vec<ConversationEntry> = data
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(serde_json::from_str)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| TetherError::Session(format!("Corrupt thread {thread_id}: {e}")))?;
        entries.sort_by_key(|e| e.sequence);
        Ok(entries)
    }
}

// ---------------------------------------------------------------------------
// MemoryConversationStore
// ---------------------------------------------------------------------------

/// In-process store for tests and throwaway servers.
#[derive(Default)]
pub struct MemoryConversationStore {
    threads: Mutex<HashMap<String, Vec<ConversationEntry>>>,
}

impl MemoryConversationStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn append(&self, thread_id: &str, messages: &[Message]) -> TetherResult<usize> {
        let mut threads = self.threads.lock();
        let thread = threads.entry(thread_id.to_string()).or_default();
        let new = entries_for(thread_id, thread.len() as u64, messages);
        thread.extend(new);
        Ok(messages.len())
    }

    async fn read(&self, thread_id: &str) -> TetherResult<Vec<ConversationEntry>> {
        Ok(self.threads.lock().get(thread_id).cloned().unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
