//! Async runtime and CLI for the streaming chat client.
//!
//! [`ChatRuntime`] is a single actor task that owns the conversation
//! [`Reconciler`](convo_stream::Reconciler). It spawns one task per stream,
//! history fetch, conversation-list refresh and live-update subscription;
//! their output comes back over one ordered channel, so conversation state is
//! never shared or locked. Consumers drive it through a [`ChatHandle`] and
//! observe [`ConversationView`](convo_stream::ConversationView) snapshots
//! through a watch channel.
//!
//! ## Configuration
//!
//! [`ClientConfig::from_env`] reads:
//!
//! - `CONVO_BASE_URL` (required by the CLI)
//! - `CONVO_ACCESS_TOKEN`, `CONVO_PROFILE_ID`, `CONVO_LOCATION`
//! - `CONVO_INTERFACE_TYPE` (default `web`)
//! - `CONVO_TIMEOUT_SEC` for non-streaming requests
//! - `CONVO_LIVE_CONNECT_DELAY_MS` (default 1000) and
//!   `CONVO_LIVE_RECONNECT_DELAY_MS` (default 3000)
//! - `CONVO_LOG`, a `tracing` filter that falls back to `RUST_LOG`
//!
//! Blank values are treated as unset.

pub mod backend;
pub mod config;
pub mod error;
pub mod http;
mod live;
pub mod logging;
pub mod runtime;

pub use backend::ChatBackend;
pub use config::ClientConfig;
pub use error::{BackendError, ConfigError, RuntimeClosed};
pub use http::HttpBackend;
pub use runtime::{ChatHandle, ChatRuntime, RuntimeCommand, RuntimeOptions};
