use std::future::Future;
use std::sync::{atomic::AtomicBool, atomic::Ordering, Arc};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::config::ChatApiConfig;
use crate::error::{parse_error_message, ChatApiError};
use crate::events::{LiveEvent, StreamEnd, StreamEvent};
use crate::headers::{build_headers, ACCEPT_EVENT_STREAM, ACCEPT_JSON};
use crate::live::LiveEventParser;
use crate::payload::{ConfirmRequest, SendRequest};
use crate::sse::StreamDecoder;
use crate::url::{
    conversation_url, endpoint, live_url, login_redirect_url, normalize_base_url, CONFIRM_PATH,
    CONVERSATIONS_PATH, STREAM_PATH,
};

/// Optional cancellation signal shared across request and stream loops.
///
/// Setting it is idempotent; a signal set after the stream ended has no
/// effect.
pub type CancellationSignal = Arc<AtomicBool>;

const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug)]
pub struct ChatApiClient {
    http: Client,
    config: ChatApiConfig,
    base: Url,
}

#[derive(Debug, Clone)]
pub struct StreamResult {
    pub events: Vec<StreamEvent>,
    pub end: StreamEnd,
}

impl ChatApiClient {
    pub fn new(config: ChatApiConfig) -> Result<Self, ChatApiError> {
        let base = normalize_base_url(&config.base_url)?;
        let http = Client::builder().build().map_err(ChatApiError::from)?;
        Ok(Self { http, config, base })
    }

    pub fn config(&self) -> &ChatApiConfig {
        &self.config
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    pub fn header_map(&self, accept: &str) -> Result<HeaderMap, ChatApiError> {
        let mut out = HeaderMap::new();
        for (key, value) in build_headers(&self.config, accept) {
            out.insert(
                HeaderName::from_bytes(key.as_bytes()).map_err(|_| {
                    ChatApiError::InvalidHeader(format!("invalid header key: {key}"))
                })?,
                HeaderValue::from_str(&value).map_err(|_| {
                    ChatApiError::InvalidHeader(format!("invalid header value for {key}"))
                })?,
            );
        }
        Ok(out)
    }

    /// Login URL carrying the configured return location.
    pub fn login_url(&self) -> Result<Url, ChatApiError> {
        login_redirect_url(&self.base, self.config.login_return_to.as_deref())
    }

    pub fn build_send_request(
        &self,
        request: &SendRequest,
    ) -> Result<RequestBuilder, ChatApiError> {
        Ok(self
            .http
            .post(endpoint(&self.base, STREAM_PATH)?)
            .headers(self.header_map(ACCEPT_EVENT_STREAM)?)
            .json(request))
    }

    pub fn build_confirm_request(
        &self,
        request: &ConfirmRequest,
    ) -> Result<RequestBuilder, ChatApiError> {
        Ok(self.with_timeout(
            self.http
                .post(endpoint(&self.base, CONFIRM_PATH)?)
                .headers(self.header_map(ACCEPT_JSON)?)
                .json(request),
        ))
    }

    /// Open the event stream for one send. Never retried.
    pub async fn send(
        &self,
        request: &SendRequest,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<Response, ChatApiError> {
        let response = await_or_cancel(self.build_send_request(request)?.send(), cancellation)
            .await?
            .map_err(ChatApiError::from)?;
        self.ensure_success(response, cancellation, true).await
    }

    /// Stream one send, invoking `on_event` for every decoded event in
    /// arrival order.
    ///
    /// Cancellation resolves to `Ok(StreamEnd::Cancelled)` and no event is
    /// delivered after the signal is observed. An `{error}` payload or a read
    /// failure resolves to `Err` once; nothing is delivered after it.
    pub async fn stream_with_handler<F>(
        &self,
        request: &SendRequest,
        cancellation: Option<&CancellationSignal>,
        mut on_event: F,
    ) -> Result<StreamEnd, ChatApiError>
    where
        F: FnMut(StreamEvent),
    {
        match self.stream_events(request, cancellation, &mut on_event).await {
            Err(ChatApiError::Cancelled) => Ok(StreamEnd::Cancelled),
            other => other,
        }
    }

    pub async fn stream(
        &self,
        request: &SendRequest,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<StreamResult, ChatApiError> {
        let mut events = Vec::new();
        let end = self
            .stream_with_handler(request, cancellation, |event| {
                events.push(event);
            })
            .await?;

        Ok(StreamResult { events, end })
    }

    async fn stream_events<F>(
        &self,
        request: &SendRequest,
        cancellation: Option<&CancellationSignal>,
        on_event: &mut F,
    ) -> Result<StreamEnd, ChatApiError>
    where
        F: FnMut(StreamEvent),
    {
        let response = self.send(request, cancellation).await?;
        let mut bytes = response.bytes_stream();
        let mut decoder = StreamDecoder::default();

        loop {
            let Some(chunk) = await_or_cancel(bytes.next(), cancellation).await? else {
                break;
            };
            let chunk = chunk.map_err(ChatApiError::from)?;
            deliver_events(decoder.feed(&chunk), cancellation, on_event)?;
            if decoder.is_closed() {
                debug!("stream closed by server close event");
                return Ok(StreamEnd::Completed);
            }
        }

        if !decoder.is_empty_buffer() {
            debug!("stream ended inside an unterminated frame");
        }
        deliver_events(decoder.finish(), cancellation, on_event)?;
        if is_cancelled(cancellation) {
            return Err(ChatApiError::Cancelled);
        }

        Ok(StreamEnd::Completed)
    }

    /// Fire a confirmation response. The body of a success reply is ignored.
    pub async fn confirm(&self, request: &ConfirmRequest) -> Result<(), ChatApiError> {
        let response = self
            .build_confirm_request(request)?
            .send()
            .await
            .map_err(ChatApiError::from)?;
        self.ensure_success(response, None, false).await?;
        Ok(())
    }

    /// Fetch one persisted conversation transcript.
    pub async fn fetch_conversation<T>(
        &self,
        conversation_id: &str,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<T, ChatApiError>
    where
        T: DeserializeOwned,
    {
        self.get_json(conversation_url(&self.base, conversation_id)?, cancellation)
            .await
    }

    /// Fetch conversation-list metadata.
    pub async fn fetch_conversations<T>(
        &self,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<T, ChatApiError>
    where
        T: DeserializeOwned,
    {
        self.get_json(endpoint(&self.base, CONVERSATIONS_PATH)?, cancellation)
            .await
    }

    /// Hold the live-update subscription open until the server ends it, the
    /// transport fails, or `cancellation` fires (`Err(Cancelled)`).
    pub async fn subscribe_live<F>(
        &self,
        conversation_id: &str,
        cancellation: Option<&CancellationSignal>,
        mut on_event: F,
    ) -> Result<(), ChatApiError>
    where
        F: FnMut(LiveEvent),
    {
        let url = live_url(&self.base, conversation_id, &self.config.interface_type)?;
        let builder = self
            .http
            .get(url)
            .headers(self.header_map(ACCEPT_EVENT_STREAM)?);
        let response = await_or_cancel(builder.send(), cancellation)
            .await?
            .map_err(ChatApiError::from)?;
        let response = self.ensure_success(response, cancellation, false).await?;

        let mut bytes = response.bytes_stream();
        let mut parser = LiveEventParser::default();
        while let Some(chunk) = await_or_cancel(bytes.next(), cancellation).await? {
            let chunk = chunk.map_err(ChatApiError::from)?;
            for event in parser.feed(&chunk) {
                if is_cancelled(cancellation) {
                    return Err(ChatApiError::Cancelled);
                }
                on_event(event);
            }
        }

        Ok(())
    }

    async fn get_json<T>(
        &self,
        url: Url,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<T, ChatApiError>
    where
        T: DeserializeOwned,
    {
        let builder = self.with_timeout(self.http.get(url).headers(self.header_map(ACCEPT_JSON)?));
        let response = await_or_cancel(builder.send(), cancellation)
            .await?
            .map_err(ChatApiError::from)?;
        let response = self.ensure_success(response, cancellation, false).await?;
        let body = await_or_cancel(response.bytes(), cancellation)
            .await?
            .map_err(ChatApiError::from)?;
        serde_json::from_slice(&body).map_err(ChatApiError::from)
    }

    fn with_timeout(&self, builder: RequestBuilder) -> RequestBuilder {
        match self.config.timeout {
            Some(timeout) => builder.timeout(timeout),
            None => builder,
        }
    }

    async fn ensure_success(
        &self,
        response: Response,
        cancellation: Option<&CancellationSignal>,
        redirect_on_unauthorized: bool,
    ) -> Result<Response, ChatApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if redirect_on_unauthorized && status == StatusCode::UNAUTHORIZED {
            return Err(ChatApiError::Unauthorized {
                login_url: self.login_url()?.to_string(),
            });
        }

        let body = await_or_cancel(response.text(), cancellation)
            .await?
            .unwrap_or_default();
        Err(ChatApiError::Status(status, parse_error_message(status, &body)))
    }
}

fn deliver_events<F>(
    events: Vec<StreamEvent>,
    cancellation: Option<&CancellationSignal>,
    on_event: &mut F,
) -> Result<(), ChatApiError>
where
    F: FnMut(StreamEvent),
{
    for event in events {
        if is_cancelled(cancellation) {
            return Err(ChatApiError::Cancelled);
        }
        if let StreamEvent::Error { message } = event {
            return Err(ChatApiError::StreamFailed { message });
        }
        on_event(event);
    }
    Ok(())
}

pub fn is_cancelled(cancel: Option<&CancellationSignal>) -> bool {
    cancel.is_some_and(|token| token.load(Ordering::Acquire))
}

async fn await_or_cancel<F>(
    future: F,
    cancellation: Option<&CancellationSignal>,
) -> Result<F::Output, ChatApiError>
where
    F: Future,
{
    if cancellation.is_none() {
        return Ok(future.await);
    }

    let mut future = Box::pin(future);

    loop {
        if is_cancelled(cancellation) {
            return Err(ChatApiError::Cancelled);
        }

        if let Ok(output) = tokio::time::timeout(CANCEL_POLL_INTERVAL, &mut future).await {
            if is_cancelled(cancellation) {
                return Err(ChatApiError::Cancelled);
            }
            return Ok(output);
        }
    }
}
