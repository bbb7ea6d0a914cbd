use async_trait::async_trait;
use chat_api::{
    CancellationSignal, ConfirmRequest, LiveEvent, SendRequest, StreamEnd, StreamEvent,
};
use convo_stream::Message;
use history_store::ConversationSummary;

use crate::error::BackendError;

pub type StreamEventSink<'a> = &'a mut (dyn FnMut(StreamEvent) + Send);
pub type LiveEventSink<'a> = &'a mut (dyn FnMut(LiveEvent) + Send);

/// Server operations the runtime depends on.
///
/// Every method may be aborted by dropping its future; long-running calls also
/// observe `cancellation` so a cancelled stream stops delivering events before
/// the task is torn down.
#[async_trait]
pub trait ChatBackend: Send + Sync + 'static {
    /// Send one prompt and deliver decoded events in arrival order.
    async fn stream(
        &self,
        request: &SendRequest,
        cancellation: &CancellationSignal,
        on_event: StreamEventSink<'_>,
    ) -> Result<StreamEnd, BackendError>;

    async fn confirm(&self, request: &ConfirmRequest) -> Result<(), BackendError>;

    /// Fetch a persisted conversation already converted to the streamed
    /// message shape.
    async fn load_history(
        &self,
        conversation_id: &str,
        cancellation: &CancellationSignal,
    ) -> Result<Vec<Message>, BackendError>;

    async fn refresh_conversations(
        &self,
        cancellation: &CancellationSignal,
    ) -> Result<Vec<ConversationSummary>, BackendError>;

    /// Hold one live-update connection open until the server ends it, the
    /// transport fails, or `cancellation` fires.
    async fn subscribe_live(
        &self,
        conversation_id: &str,
        cancellation: &CancellationSignal,
        on_event: LiveEventSink<'_>,
    ) -> Result<(), BackendError>;
}
