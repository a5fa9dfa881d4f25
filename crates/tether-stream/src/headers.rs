//! Response headers for streamed output.

/// Headers every streamed response carries, fresh or resumed.
///
/// Event-stream content, no caching, a persistent connection, the UI message
/// stream protocol marker, and no buffering in reverse proxies.
pub const STREAM_HEADERS: [(&str, &str); 5] = [
    ("content-type", "text/event-stream"),
    ("cache-control", "no-cache"),
    ("connection", "keep-alive"),
    ("x-vercel-ai-ui-message-stream", "v1"),
    ("x-accel-buffering", "no"),
];
