//! Resumable stream registry.
//!
//! A generation's output is registered once per session and buffered, so a
//! reader that disconnects can come back and continue from the live point
//! instead of starting a new generation.
//!
//! # Main types
//!
//! - [`StreamRegistry`]: Session-keyed registry of open streams.
//! - [`ResumableStream`]: Handle returned on registration; can cancel delivery.
//! - [`ResumableReader`]: A cursor over one stream's chunks.
//! - [`Utf8ChunkDecoder`]: Incremental byte-to-text decoding.

pub mod decoder;
pub mod headers;
pub mod reader;
pub mod registry;

pub use decoder::Utf8ChunkDecoder;
pub use headers::STREAM_HEADERS;
pub use reader::ResumableReader;
pub use registry::{ByteStream, ResumableStream, StreamRegistry, StreamStatus};
