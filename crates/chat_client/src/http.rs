use async_trait::async_trait;
use chat_api::{
    CancellationSignal, ChatApiClient, ChatApiConfig, ConfirmRequest, SendRequest, StreamEnd,
};
use convo_stream::Message;
use history_store::{load_messages, ConversationList, ConversationSummary, Transcript};
use tracing::debug;

use crate::backend::{ChatBackend, LiveEventSink, StreamEventSink};
use crate::error::BackendError;

/// [`ChatBackend`] over the HTTP chat API.
pub struct HttpBackend {
    client: ChatApiClient,
}

impl HttpBackend {
    pub fn new(config: ChatApiConfig) -> Result<Self, BackendError> {
        Ok(Self {
            client: ChatApiClient::new(config)?,
        })
    }

    pub fn client(&self) -> &ChatApiClient {
        &self.client
    }
}

#[async_trait]
impl ChatBackend for HttpBackend {
    async fn stream(
        &self,
        request: &SendRequest,
        cancellation: &CancellationSignal,
        on_event: StreamEventSink<'_>,
    ) -> Result<StreamEnd, BackendError> {
        let end = self
            .client
            .stream_with_handler(request, Some(cancellation), |event| on_event(event))
            .await?;
        debug!(
            conversation_id = %request.conversation_id,
            end = end.as_str(),
            "stream ended"
        );
        Ok(end)
    }

    async fn confirm(&self, request: &ConfirmRequest) -> Result<(), BackendError> {
        self.client.confirm(request).await?;
        Ok(())
    }

    async fn load_history(
        &self,
        conversation_id: &str,
        cancellation: &CancellationSignal,
    ) -> Result<Vec<Message>, BackendError> {
        let transcript: Transcript = self
            .client
            .fetch_conversation(conversation_id, Some(cancellation))
            .await?;
        Ok(load_messages(&transcript)?)
    }

    async fn refresh_conversations(
        &self,
        cancellation: &CancellationSignal,
    ) -> Result<Vec<ConversationSummary>, BackendError> {
        let list: ConversationList = self.client.fetch_conversations(Some(cancellation)).await?;
        Ok(list.into_summaries())
    }

    async fn subscribe_live(
        &self,
        conversation_id: &str,
        cancellation: &CancellationSignal,
        on_event: LiveEventSink<'_>,
    ) -> Result<(), BackendError> {
        self.client
            .subscribe_live(conversation_id, Some(cancellation), |event| on_event(event))
            .await?;
        Ok(())
    }
}
