use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chat_api::config::DEFAULT_INTERFACE_TYPE;
use chat_api::{
    Attachment, CancellationSignal, LiveEvent, ReconnectPolicy, SendRequest, StreamEnd,
    StreamEvent,
};
use convo_stream::{ConversationView, Message, Reconciler, SessionId, StreamSession};
use history_store::ConversationSummary;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::backend::ChatBackend;
use crate::error::{BackendError, RuntimeClosed};
use crate::live::{LiveChannelState, LiveGeneration};

/// Request from a [`ChatHandle`] to the runtime actor.
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeCommand {
    SendMessage {
        prompt: String,
        attachments: Vec<Attachment>,
    },
    SwitchConversation {
        conversation_id: String,
    },
    RespondToConfirmation {
        key: String,
        approved: bool,
    },
    Cancel,
    RefreshConversations,
    Shutdown,
}

/// Output of a task spawned by the runtime. All producers share one ordered
/// channel.
#[derive(Debug)]
pub(crate) enum RuntimeMessage {
    Stream {
        session_id: SessionId,
        event: StreamEvent,
    },
    StreamEnded {
        session_id: SessionId,
        outcome: Result<StreamEnd, BackendError>,
    },
    HistoryLoaded {
        conversation_id: String,
        mode: LoadMode,
        result: Result<Vec<Message>, BackendError>,
    },
    ConversationsLoaded {
        result: Result<Vec<ConversationSummary>, BackendError>,
    },
    Live {
        conversation_id: String,
        generation: LiveGeneration,
        event: LiveEvent,
    },
    ConfirmSent {
        request_id: String,
        result: Result<(), BackendError>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LoadMode {
    /// Requested by a conversation switch; clears the loading flag.
    Initial,
    /// Triggered by a live notification; never touches the loading flag.
    /// Carries the last session id at the time the load started.
    Background { started_after: SessionId },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeOptions {
    pub interface_type: String,
    pub profile_id: Option<String>,
    pub live: ReconnectPolicy,
    /// Subscribe to live updates for the displayed conversation.
    pub live_updates: bool,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            interface_type: DEFAULT_INTERFACE_TYPE.to_string(),
            profile_id: None,
            live: ReconnectPolicy::default(),
            live_updates: true,
        }
    }
}

/// Cloneable front end of the runtime actor.
#[derive(Clone)]
pub struct ChatHandle {
    commands: UnboundedSender<RuntimeCommand>,
    view: watch::Receiver<ConversationView>,
    conversations: watch::Receiver<Vec<ConversationSummary>>,
}

impl ChatHandle {
    pub fn send_message(
        &self,
        prompt: impl Into<String>,
        attachments: Vec<Attachment>,
    ) -> Result<(), RuntimeClosed> {
        self.dispatch(RuntimeCommand::SendMessage {
            prompt: prompt.into(),
            attachments,
        })
    }

    pub fn switch_conversation(
        &self,
        conversation_id: impl Into<String>,
    ) -> Result<(), RuntimeClosed> {
        self.dispatch(RuntimeCommand::SwitchConversation {
            conversation_id: conversation_id.into(),
        })
    }

    pub fn respond_to_confirmation(
        &self,
        key: impl Into<String>,
        approved: bool,
    ) -> Result<(), RuntimeClosed> {
        self.dispatch(RuntimeCommand::RespondToConfirmation {
            key: key.into(),
            approved,
        })
    }

    pub fn cancel(&self) -> Result<(), RuntimeClosed> {
        self.dispatch(RuntimeCommand::Cancel)
    }

    pub fn refresh_conversations(&self) -> Result<(), RuntimeClosed> {
        self.dispatch(RuntimeCommand::RefreshConversations)
    }

    pub fn shutdown(&self) -> Result<(), RuntimeClosed> {
        self.dispatch(RuntimeCommand::Shutdown)
    }

    /// Latest published view.
    pub fn view(&self) -> ConversationView {
        self.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConversationView> {
        self.view.clone()
    }

    pub fn conversations(&self) -> watch::Receiver<Vec<ConversationSummary>> {
        self.conversations.clone()
    }

    fn dispatch(&self, command: RuntimeCommand) -> Result<(), RuntimeClosed> {
        self.commands.send(command).map_err(|_| RuntimeClosed)
    }
}

enum Input {
    Command(Option<RuntimeCommand>),
    Message(RuntimeMessage),
}

struct BackgroundTask {
    cancellation: CancellationSignal,
    task: JoinHandle<()>,
}

struct HistoryTask {
    mode: LoadMode,
    task: BackgroundTask,
}

impl BackgroundTask {
    fn abort(self) {
        self.cancellation.store(true, Ordering::SeqCst);
        self.task.abort();
    }
}

struct StreamTask {
    session_id: SessionId,
    task: JoinHandle<()>,
}

/// Actor that exclusively owns the [`Reconciler`].
///
/// Commands arrive from [`ChatHandle`]s; stream, history, list and live tasks
/// report back through one ordered channel. Every state change publishes a
/// fresh [`ConversationView`].
pub struct ChatRuntime {
    backend: Arc<dyn ChatBackend>,
    options: RuntimeOptions,
    reconciler: Reconciler,
    login_redirect: Option<String>,
    commands: UnboundedReceiver<RuntimeCommand>,
    messages: UnboundedReceiver<RuntimeMessage>,
    sender: UnboundedSender<RuntimeMessage>,
    view: watch::Sender<ConversationView>,
    conversations: watch::Sender<Vec<ConversationSummary>>,
    stream_task: Option<StreamTask>,
    history_task: Option<HistoryTask>,
    list_task: Option<BackgroundTask>,
    live: LiveChannelState,
}

impl ChatRuntime {
    pub fn new(backend: Arc<dyn ChatBackend>, options: RuntimeOptions) -> (Self, ChatHandle) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (message_tx, message_rx) = mpsc::unbounded_channel();
        let (view_tx, view_rx) = watch::channel(ConversationView::default());
        let (conversations_tx, conversations_rx) = watch::channel(Vec::new());

        let runtime = Self {
            backend,
            options,
            reconciler: Reconciler::new(),
            login_redirect: None,
            commands: command_rx,
            messages: message_rx,
            sender: message_tx,
            view: view_tx,
            conversations: conversations_tx,
            stream_task: None,
            history_task: None,
            list_task: None,
            live: LiveChannelState::default(),
        };
        let handle = ChatHandle {
            commands: command_tx,
            view: view_rx,
            conversations: conversations_rx,
        };
        (runtime, handle)
    }

    /// Spawn the actor on the current tokio runtime.
    pub fn spawn(
        backend: Arc<dyn ChatBackend>,
        options: RuntimeOptions,
    ) -> (ChatHandle, JoinHandle<()>) {
        let (runtime, handle) = Self::new(backend, options);
        (handle, tokio::spawn(runtime.run()))
    }

    /// Process commands and task output until shut down or every handle is
    /// dropped.
    pub async fn run(mut self) {
        loop {
            let input = tokio::select! {
                command = self.commands.recv() => Input::Command(command),
                Some(message) = self.messages.recv() => Input::Message(message),
            };

            let changed = match input {
                Input::Command(Some(RuntimeCommand::Shutdown) | None) => break,
                Input::Command(Some(command)) => self.handle_command(command),
                Input::Message(message) => self.handle_message(message),
            };

            if changed {
                self.publish();
            }
        }

        self.shutdown();
        self.publish();
        debug!("chat runtime stopped");
    }

    fn handle_command(&mut self, command: RuntimeCommand) -> bool {
        match command {
            RuntimeCommand::SendMessage {
                prompt,
                attachments,
            } => self.send_message(prompt, attachments),
            RuntimeCommand::SwitchConversation { conversation_id } => {
                self.switch_conversation(conversation_id)
            }
            RuntimeCommand::RespondToConfirmation { key, approved } => {
                self.respond_to_confirmation(&key, approved)
            }
            RuntimeCommand::Cancel => {
                let cancelled = self.reconciler.cancel_active();
                self.abort_stream(cancelled.as_ref());
                cancelled.is_some()
            }
            RuntimeCommand::RefreshConversations => {
                self.refresh_conversations();
                false
            }
            RuntimeCommand::Shutdown => false,
        }
    }

    fn handle_message(&mut self, message: RuntimeMessage) -> bool {
        match message {
            RuntimeMessage::Stream { session_id, event } => {
                self.reconciler.apply(session_id, event)
            }
            RuntimeMessage::StreamEnded {
                session_id,
                outcome,
            } => self.finish_stream(session_id, outcome),
            RuntimeMessage::HistoryLoaded {
                conversation_id,
                mode,
                result,
            } => self.finish_history(&conversation_id, mode, result),
            RuntimeMessage::ConversationsLoaded { result } => {
                self.list_task = None;
                match result {
                    Ok(summaries) => {
                        self.conversations.send_replace(summaries);
                    }
                    Err(error) if error.is_cancelled() => {}
                    Err(error) => warn!(%error, "conversation list refresh failed"),
                }
                false
            }
            RuntimeMessage::Live {
                conversation_id,
                generation,
                event,
            } => self.handle_live(&conversation_id, generation, event),
            RuntimeMessage::ConfirmSent { request_id, result } => {
                match result {
                    Ok(()) => debug!(request_id, "confirmation delivered"),
                    Err(error) => warn!(request_id, %error, "confirmation request failed"),
                }
                false
            }
        }
    }

    fn send_message(&mut self, prompt: String, attachments: Vec<Attachment>) -> bool {
        let request_attachments = attachments.clone();
        let (session, cancelled) = match self.reconciler.begin_turn(prompt.clone(), attachments) {
            Ok(started) => started,
            Err(error) => {
                warn!(%error, "ignoring send");
                return false;
            }
        };
        self.abort_stream(cancelled.as_ref());
        self.abort_background_load();
        self.login_redirect = None;

        let mut request = SendRequest::new(
            prompt,
            session.conversation_id.clone(),
            self.options.interface_type.clone(),
        )
        .with_attachments(request_attachments);
        if let Some(profile_id) = self.options.profile_id.as_deref() {
            request = request.with_profile_id(profile_id);
        }

        self.spawn_stream(session, request);
        true
    }

    fn spawn_stream(&mut self, session: StreamSession, request: SendRequest) {
        let backend = Arc::clone(&self.backend);
        let sender = self.sender.clone();
        let session_id = session.id;
        let cancellation = Arc::clone(&session.cancellation);

        let task = tokio::spawn(async move {
            let mut forward = |event: StreamEvent| {
                let _ = sender.send(RuntimeMessage::Stream { session_id, event });
            };
            let outcome = backend.stream(&request, &cancellation, &mut forward).await;
            let _ = sender.send(RuntimeMessage::StreamEnded {
                session_id,
                outcome,
            });
        });

        debug!(
            session_id,
            conversation_id = %session.conversation_id,
            "stream started"
        );
        self.stream_task = Some(StreamTask { session_id, task });
    }

    fn finish_stream(
        &mut self,
        session_id: SessionId,
        outcome: Result<StreamEnd, BackendError>,
    ) -> bool {
        if self
            .stream_task
            .as_ref()
            .is_some_and(|stream| stream.session_id == session_id)
        {
            self.stream_task = None;
        }

        match outcome {
            Ok(StreamEnd::Completed) => {
                let refresh = self.reconciler.complete(session_id);
                if refresh {
                    self.refresh_conversations();
                }
                refresh
            }
            Ok(StreamEnd::Cancelled) => self.reconciler.cancel_session(session_id).is_some(),
            Ok(StreamEnd::Failed) => self.reconciler.fail(session_id, "stream failed"),
            Err(error) if error.is_cancelled() => {
                self.reconciler.cancel_session(session_id).is_some()
            }
            Err(error) => match error.login_url() {
                Some(login_url) => {
                    warn!(session_id, login_url, "send rejected, login required");
                    self.login_redirect = Some(login_url.to_owned());
                    self.reconciler.cancel_session(session_id);
                    true
                }
                None => self.reconciler.fail(session_id, &error.to_string()),
            },
        }
    }

    fn abort_stream(&mut self, cancelled: Option<&StreamSession>) {
        let Some(cancelled) = cancelled else {
            return;
        };
        cancelled.cancel();
        if let Some(stream) = self.stream_task.take() {
            if stream.session_id == cancelled.id {
                stream.task.abort();
                debug!(session_id = cancelled.id, "stream aborted");
            } else {
                self.stream_task = Some(stream);
            }
        }
    }

    fn switch_conversation(&mut self, conversation_id: String) -> bool {
        info!(conversation_id = %conversation_id, "switching conversation");
        let cancelled = self.reconciler.switch_conversation(conversation_id.clone());
        self.abort_stream(cancelled.as_ref());
        self.login_redirect = None;

        if let Some(history) = self.history_task.take() {
            history.task.abort();
        }
        if let Some(task) = self.list_task.take() {
            task.abort();
        }
        self.live.stop();

        self.load_history(conversation_id.clone(), LoadMode::Initial);
        if self.options.live_updates {
            self.live.start(
                Arc::clone(&self.backend),
                &conversation_id,
                self.options.live,
                self.sender.clone(),
            );
        }
        true
    }

    fn load_history(&mut self, conversation_id: String, mode: LoadMode) {
        let backend = Arc::clone(&self.backend);
        let sender = self.sender.clone();
        let cancellation: CancellationSignal = Arc::new(AtomicBool::new(false));
        let task_cancellation = Arc::clone(&cancellation);

        let task = tokio::spawn(async move {
            let result = backend
                .load_history(&conversation_id, &task_cancellation)
                .await;
            let _ = sender.send(RuntimeMessage::HistoryLoaded {
                conversation_id,
                mode,
                result,
            });
        });
        self.history_task = Some(HistoryTask {
            mode,
            task: BackgroundTask { cancellation, task },
        });
    }

    /// A background reload in flight was fetched before the turn that is
    /// starting now.
    fn abort_background_load(&mut self) {
        if let Some(history) = self.history_task.take() {
            if matches!(history.mode, LoadMode::Background { .. }) {
                history.task.abort();
                debug!("background reload aborted by new turn");
            } else {
                self.history_task = Some(history);
            }
        }
    }

    fn finish_history(
        &mut self,
        conversation_id: &str,
        mode: LoadMode,
        result: Result<Vec<Message>, BackendError>,
    ) -> bool {
        if self.reconciler.conversation_id() == Some(conversation_id)
            && self
                .history_task
                .as_ref()
                .is_some_and(|history| history.mode == mode)
        {
            self.history_task = None;
        }

        match (mode, result) {
            (LoadMode::Initial, Ok(history)) => {
                self.reconciler.finish_load(conversation_id, history)
            }
            (LoadMode::Background { started_after }, Ok(history)) => self
                .reconciler
                .apply_background_reload(conversation_id, started_after, history),
            (_, Err(error)) if error.is_cancelled() => false,
            (mode, Err(error)) => {
                warn!(conversation_id, ?mode, %error, "conversation load failed");
                mode == LoadMode::Initial && self.reconciler.fail_load(conversation_id)
            }
        }
    }

    fn handle_live(
        &mut self,
        subscribed_to: &str,
        generation: LiveGeneration,
        event: LiveEvent,
    ) -> bool {
        if !self.live.is_current(subscribed_to) {
            trace!(
                subscribed_to,
                generation,
                "dropping event from replaced live subscription"
            );
            return false;
        }

        match event {
            LiveEvent::Connected => debug!(generation, "live subscription connected"),
            LiveEvent::Heartbeat => trace!(generation, "live heartbeat"),
            LiveEvent::Message(notification) => {
                if !self.reconciler.should_reload(&notification) {
                    return false;
                }
                if self.history_task.is_some() {
                    debug!("conversation load already in flight, skipping live reload");
                    return false;
                }
                if let Some(conversation_id) = self.reconciler.conversation_id() {
                    let conversation_id = conversation_id.to_owned();
                    let started_after = self.reconciler.last_session_id();
                    self.load_history(conversation_id, LoadMode::Background { started_after });
                }
            }
        }
        false
    }

    fn respond_to_confirmation(&mut self, key: &str, approved: bool) -> bool {
        let Some(request) = self.reconciler.respond_to_confirmation(key, approved) else {
            debug!(key, "no pending confirmation for key");
            return false;
        };

        let backend = Arc::clone(&self.backend);
        let sender = self.sender.clone();
        tokio::spawn(async move {
            let result = backend.confirm(&request).await;
            let _ = sender.send(RuntimeMessage::ConfirmSent {
                request_id: request.request_id,
                result,
            });
        });
        true
    }

    fn refresh_conversations(&mut self) {
        if let Some(task) = self.list_task.take() {
            task.abort();
        }

        let backend = Arc::clone(&self.backend);
        let sender = self.sender.clone();
        let cancellation: CancellationSignal = Arc::new(AtomicBool::new(false));
        let task_cancellation = Arc::clone(&cancellation);
        let task = tokio::spawn(async move {
            let result = backend.refresh_conversations(&task_cancellation).await;
            let _ = sender.send(RuntimeMessage::ConversationsLoaded { result });
        });
        self.list_task = Some(BackgroundTask { cancellation, task });
    }

    fn shutdown(&mut self) {
        let cancelled = self.reconciler.cancel_active();
        self.abort_stream(cancelled.as_ref());
        if let Some(stream) = self.stream_task.take() {
            stream.task.abort();
        }
        if let Some(history) = self.history_task.take() {
            history.task.abort();
        }
        if let Some(task) = self.list_task.take() {
            task.abort();
        }
        self.live.stop();
    }

    fn publish(&self) {
        let mut view = self.reconciler.snapshot();
        view.login_redirect = self.login_redirect.clone();
        self.view.send_replace(view);
    }
}
