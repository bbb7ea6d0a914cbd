#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chat_api::{
    CancellationSignal, ConfirmRequest, LiveEvent, SendRequest, StreamEnd, StreamEvent,
};
use chat_client::backend::{LiveEventSink, StreamEventSink};
use chat_client::{BackendError, ChatBackend, ChatHandle, ChatRuntime, RuntimeOptions};
use convo_stream::{ConversationView, Message};
use history_store::ConversationSummary;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;

pub enum StreamStep {
    Event(StreamEvent),
    End(Result<StreamEnd, BackendError>),
}

/// Test-side end of one scripted stream. Steps are buffered until the
/// runtime opens the stream.
pub struct StreamScript {
    steps: UnboundedSender<StreamStep>,
}

impl StreamScript {
    pub fn event(&self, event: StreamEvent) {
        let _ = self.steps.send(StreamStep::Event(event));
    }

    pub fn text(&self, content: &str) {
        self.event(StreamEvent::text(content));
    }

    pub fn complete(&self) {
        let _ = self.steps.send(StreamStep::End(Ok(StreamEnd::Completed)));
    }

    pub fn fail(&self, error: BackendError) {
        let _ = self.steps.send(StreamStep::End(Err(error)));
    }
}

pub enum LiveStep {
    Event(LiveEvent),
    End(Result<(), BackendError>),
}

pub struct LiveScript {
    steps: UnboundedSender<LiveStep>,
}

impl LiveScript {
    pub fn event(&self, event: LiveEvent) {
        let _ = self.steps.send(LiveStep::Event(event));
    }

    pub fn end(&self, outcome: Result<(), BackendError>) {
        let _ = self.steps.send(LiveStep::End(outcome));
    }
}

/// In-memory [`ChatBackend`] driven step by step from tests.
pub struct ScriptedBackend {
    streams: Mutex<VecDeque<UnboundedReceiver<StreamStep>>>,
    lives: Mutex<VecDeque<UnboundedReceiver<LiveStep>>>,
    histories: Mutex<HashMap<String, Vec<Message>>>,
    conversations: Mutex<Vec<ConversationSummary>>,
    sent: Mutex<Vec<SendRequest>>,
    confirms: Mutex<Vec<ConfirmRequest>>,
    failing_confirms: Mutex<bool>,
    history_loads: AtomicUsize,
    history_gates: Mutex<VecDeque<oneshot::Receiver<()>>>,
    live_connect_tx: UnboundedSender<Instant>,
    live_connect_rx: Mutex<Option<UnboundedReceiver<Instant>>>,
}

/// Holds one history load until released. The stored history is read when
/// the load starts, not when it is released.
pub struct HistoryGate {
    release: oneshot::Sender<()>,
}

impl HistoryGate {
    pub fn release(self) {
        let _ = self.release.send(());
    }
}

impl ScriptedBackend {
    pub fn new() -> Arc<Self> {
        let (live_connect_tx, live_connect_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            streams: Mutex::new(VecDeque::new()),
            lives: Mutex::new(VecDeque::new()),
            histories: Mutex::new(HashMap::new()),
            conversations: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            confirms: Mutex::new(Vec::new()),
            failing_confirms: Mutex::new(false),
            history_loads: AtomicUsize::new(0),
            history_gates: Mutex::new(VecDeque::new()),
            live_connect_tx,
            live_connect_rx: Mutex::new(Some(live_connect_rx)),
        })
    }

    /// Queue the script for the next stream the runtime opens.
    pub fn script_stream(&self) -> StreamScript {
        let (steps, receiver) = mpsc::unbounded_channel();
        lock_unpoisoned(&self.streams).push_back(receiver);
        StreamScript { steps }
    }

    /// Queue the script for the next live connection. Connections without a
    /// script stay open until torn down.
    pub fn script_live(&self) -> LiveScript {
        let (steps, receiver) = mpsc::unbounded_channel();
        lock_unpoisoned(&self.lives).push_back(receiver);
        LiveScript { steps }
    }

    pub fn set_history(&self, conversation_id: &str, messages: Vec<Message>) {
        lock_unpoisoned(&self.histories).insert(conversation_id.to_string(), messages);
    }

    /// Hold the next history load until the returned gate is released.
    pub fn gate_history(&self) -> HistoryGate {
        let (release, receiver) = oneshot::channel();
        lock_unpoisoned(&self.history_gates).push_back(receiver);
        HistoryGate { release }
    }

    pub fn set_conversations(&self, conversations: Vec<ConversationSummary>) {
        *lock_unpoisoned(&self.conversations) = conversations;
    }

    pub fn fail_confirms(&self) {
        *lock_unpoisoned(&self.failing_confirms) = true;
    }

    pub fn sent(&self) -> Vec<SendRequest> {
        lock_unpoisoned(&self.sent).clone()
    }

    pub fn confirms(&self) -> Vec<ConfirmRequest> {
        lock_unpoisoned(&self.confirms).clone()
    }

    pub fn history_loads(&self) -> usize {
        self.history_loads.load(Ordering::SeqCst)
    }

    /// Receiver of the instant each live connection attempt started.
    pub fn live_connects(&self) -> UnboundedReceiver<Instant> {
        lock_unpoisoned(&self.live_connect_rx)
            .take()
            .expect("live connect receiver already taken")
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn stream(
        &self,
        request: &SendRequest,
        cancellation: &CancellationSignal,
        on_event: StreamEventSink<'_>,
    ) -> Result<StreamEnd, BackendError> {
        lock_unpoisoned(&self.sent).push(request.clone());
        let script = lock_unpoisoned(&self.streams).pop_front();
        let Some(mut script) = script else {
            return Ok(StreamEnd::Completed);
        };

        while let Some(step) = script.recv().await {
            if cancellation.load(Ordering::SeqCst) {
                return Ok(StreamEnd::Cancelled);
            }
            match step {
                StreamStep::Event(event) => on_event(event),
                StreamStep::End(outcome) => return outcome,
            }
        }
        Ok(StreamEnd::Completed)
    }

    async fn confirm(&self, request: &ConfirmRequest) -> Result<(), BackendError> {
        lock_unpoisoned(&self.confirms).push(request.clone());
        if *lock_unpoisoned(&self.failing_confirms) {
            return Err(BackendError::Api(chat_api::ChatApiError::Unknown(
                "confirm rejected".to_string(),
            )));
        }
        Ok(())
    }

    async fn load_history(
        &self,
        conversation_id: &str,
        _cancellation: &CancellationSignal,
    ) -> Result<Vec<Message>, BackendError> {
        self.history_loads.fetch_add(1, Ordering::SeqCst);
        let history = lock_unpoisoned(&self.histories)
            .get(conversation_id)
            .cloned()
            .unwrap_or_default();
        let gate = lock_unpoisoned(&self.history_gates).pop_front();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        Ok(history)
    }

    async fn refresh_conversations(
        &self,
        _cancellation: &CancellationSignal,
    ) -> Result<Vec<ConversationSummary>, BackendError> {
        Ok(lock_unpoisoned(&self.conversations).clone())
    }

    async fn subscribe_live(
        &self,
        _conversation_id: &str,
        _cancellation: &CancellationSignal,
        on_event: LiveEventSink<'_>,
    ) -> Result<(), BackendError> {
        let _ = self.live_connect_tx.send(Instant::now());
        let script = lock_unpoisoned(&self.lives).pop_front();
        if let Some(mut script) = script {
            while let Some(step) = script.recv().await {
                match step {
                    LiveStep::Event(event) => on_event(event),
                    LiveStep::End(outcome) => return outcome,
                }
            }
        }
        std::future::pending::<()>().await;
        Ok(())
    }
}

pub fn offline_options() -> RuntimeOptions {
    RuntimeOptions {
        live_updates: false,
        ..RuntimeOptions::default()
    }
}

pub fn spawn_runtime(
    backend: &Arc<ScriptedBackend>,
    options: RuntimeOptions,
) -> (ChatHandle, JoinHandle<()>) {
    let backend: Arc<dyn ChatBackend> = Arc::clone(backend) as Arc<dyn ChatBackend>;
    ChatRuntime::spawn(backend, options)
}

pub async fn wait_for_view(
    handle: &ChatHandle,
    ready: impl FnMut(&ConversationView) -> bool,
) -> ConversationView {
    let mut views = handle.subscribe();
    let waited = tokio::time::timeout(Duration::from_secs(5), async move {
        let view = views.wait_for(ready).await.map(|view| view.clone());
        view
    })
    .await;
    waited
        .expect("view condition timed out")
        .expect("runtime closed")
}

/// Open `conversation_id` and wait for its history to land.
pub async fn open_conversation(handle: &ChatHandle, conversation_id: &str) -> ConversationView {
    handle
        .switch_conversation(conversation_id)
        .expect("runtime running");
    wait_for_view(handle, |view| {
        view.conversation_id.as_deref() == Some(conversation_id) && !view.loading
    })
    .await
}

/// Let every spawned task run until the runtime is idle. Relies on a paused
/// clock only advancing once no task can make progress.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(5)).await;
}

pub fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
