//! Client for the shared coordination store.
//!
//! The coordination store is a key-value store with per-key expiry and a
//! publish/subscribe facility, reachable from every process. Tether uses it as
//! a soft-lock/heartbeat ledger (generation claims) and as a control-signal bus
//! (abort events).
//!
//! The store is treated as unreliable: [`CoordinationStore`] logs every backend
//! failure and answers with a neutral value instead of an error.

pub mod backend;
pub mod client;
pub mod config;
pub mod memory;
#[cfg(feature = "redis")]
pub mod redis_backend;
pub mod stash;

pub use backend::{CoordinationBackend, PayloadStream};
pub use client::{ClaimOutcome, CoordinationStore, Lookup, Subscription};
pub use config::CoordinationConfig;
pub use memory::MemoryBackend;
#[cfg(feature = "redis")]
pub use redis_backend::RedisBackend;
pub use stash::MessageStash;
