//! Transport-only client primitives for the chat streaming API.
//!
//! This crate owns request building, the chat event-stream decoder, and the
//! live-update subscription transport. It holds no conversation state: folding
//! events into messages is the job of `convo_stream`.
//!
//! The chat stream is a line-framed protocol (`event:` / `data:` lines) whose
//! payloads are classified by shape into [`StreamEvent`]s. Malformed payloads
//! are logged and skipped; an `event: close` ends the stream.

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod headers;
pub mod live;
pub mod payload;
pub mod reconnect;
pub mod sse;
pub mod url;

pub use client::{CancellationSignal, ChatApiClient, StreamResult};
pub use config::ChatApiConfig;
pub use error::ChatApiError;
pub use events::{
    Attachment, ConfirmationRequest, LiveEvent, LiveNotification, StreamEnd, StreamEvent,
    ToolCallDelta,
};
pub use live::LiveEventParser;
pub use payload::{ConfirmRequest, SendRequest};
pub use reconnect::ReconnectPolicy;
pub use sse::StreamDecoder;
