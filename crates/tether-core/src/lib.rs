//! Core types and error definitions for the Tether workspace.
//!
//! This crate provides the foundational types shared by every Tether crate:
//! the unified error enum, the conversation message model, session keys and
//! the control events exchanged over the coordination store.
//!
//! # Main types
//!
//! - [`TetherError`]: Unified error enum for all Tether subsystems.
//! - [`TetherResult`]: Convenience alias for `Result<T, TetherError>`.
//! - [`SessionId`]: Opaque session identifier and the keys derived from it.
//! - [`Message`] / [`MessagePart`]: A chat message made of text and file parts.
//! - [`ControlEvent`]: Out-of-band signal published on a session's event channel.
//! - [`PendingMessage`]: An initial message parked until a session is ready.

/// Control events published on the coordination store.
pub mod event;
/// Message and message part types.
pub mod message;
/// Session identifiers and derived store keys.
pub mod session;

mod error;

pub use error::{TetherError, TetherResult};
pub use event::ControlEvent;
pub use message::{Message, MessagePart, PendingMessage, Role};
pub use session::SessionId;
