//! Durable, append-only conversation history.
//!
//! Generations write the messages they produced here; on abort the partial
//! output that the engine had not persisted yet is flushed here too.

pub mod store;

pub use store::{ConversationEntry, ConversationStore, FileConversationStore, MemoryConversationStore};
