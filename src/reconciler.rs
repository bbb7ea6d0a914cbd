use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chat_api::{Attachment, CancellationSignal, ConfirmRequest, LiveNotification, StreamEvent};
use tracing::{debug, error};

use crate::confirmations::PendingConfirmations;
use crate::error::ReconcileError;
use crate::ledger::ToolCallLedger;
use crate::message::{
    ContentPart, Message, MessageId, MessageStatus, Role, ToolCallPart, APOLOGY_TEXT,
};
use crate::view::ConversationView;

pub type SessionId = u64;

/// One send, from request to terminal event.
///
/// Every stream event is tagged with the session id it was produced for; the
/// reconciler drops events whose session is no longer the active one.
#[derive(Debug, Clone)]
pub struct StreamSession {
    pub id: SessionId,
    pub conversation_id: String,
    /// Placeholder message created when the turn began.
    pub text_message_id: MessageId,
    pub cancellation: CancellationSignal,
}

impl StreamSession {
    /// Idempotent.
    pub fn cancel(&self) {
        self.cancellation.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    /// Placeholder only, nothing received yet.
    Pending,
    Active,
}

#[derive(Debug)]
struct TurnState {
    session: StreamSession,
    /// Message that receives text; moves to a trailing message when text
    /// arrives after tool calls.
    text_message_id: MessageId,
    /// Nominated by the first tool-call event of the turn.
    tool_message_id: Option<MessageId>,
    ledger: ToolCallLedger,
}

impl TurnState {
    fn message_ids(&self) -> Vec<MessageId> {
        let mut ids = vec![self.session.text_message_id.clone()];
        for id in [Some(&self.text_message_id), self.tool_message_id.as_ref()]
            .into_iter()
            .flatten()
        {
            if !ids.contains(id) {
                ids.push(id.clone());
            }
        }
        ids
    }
}

/// Owns the message list of the displayed conversation and folds stream
/// events into it.
#[derive(Debug, Default)]
pub struct Reconciler {
    conversation_id: Option<String>,
    messages: Vec<Message>,
    turn: Option<TurnState>,
    last_session_id: SessionId,
    confirmations: PendingConfirmations,
    loading: bool,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn is_streaming(&self) -> bool {
        self.turn.is_some()
    }

    /// Id of the most recently started turn, `0` before the first send.
    /// Background reloads record it when they start.
    pub fn last_session_id(&self) -> SessionId {
        self.last_session_id
    }

    pub fn active_session(&self) -> Option<&StreamSession> {
        self.turn.as_ref().map(|turn| &turn.session)
    }

    pub fn pending_confirmations(&self) -> &PendingConfirmations {
        &self.confirmations
    }

    /// Tool-call ledger of the active turn.
    pub fn ledger(&self) -> Option<&ToolCallLedger> {
        self.turn.as_ref().map(|turn| &turn.ledger)
    }

    pub fn turn_phase(&self) -> Option<TurnPhase> {
        let turn = self.turn.as_ref()?;
        let pending = turn.text_message_id == turn.session.text_message_id
            && turn.tool_message_id.is_none()
            && self
                .message(&turn.text_message_id)
                .is_some_and(Message::has_loading_text);
        Some(if pending {
            TurnPhase::Pending
        } else {
            TurnPhase::Active
        })
    }

    pub fn message(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|message| message.id == id)
    }

    pub fn snapshot(&self) -> ConversationView {
        ConversationView {
            conversation_id: self.conversation_id.clone(),
            messages: self.messages.clone(),
            loading: self.loading,
            streaming: self.is_streaming(),
            pending_confirmations: self.confirmations.entries().to_vec(),
            login_redirect: None,
        }
    }

    /// Switch the displayed conversation. Cancels the active turn, drops
    /// pending confirmations and messages, and raises the loading flag.
    /// Returns the cancelled session so the caller can abort its transport.
    pub fn switch_conversation(
        &mut self,
        conversation_id: impl Into<String>,
    ) -> Option<StreamSession> {
        let cancelled = self.cancel_active();
        self.confirmations.clear();
        self.messages.clear();
        self.conversation_id = Some(conversation_id.into());
        self.loading = true;
        cancelled
    }

    /// Install a loaded transcript. Ignored when the user switched away in the
    /// meantime. Messages of a turn started during the load stay after it.
    pub fn finish_load(&mut self, conversation_id: &str, history: Vec<Message>) -> bool {
        if self.conversation_id.as_deref() != Some(conversation_id) {
            debug!(conversation_id, "dropping history for inactive conversation");
            return false;
        }

        let live = std::mem::replace(&mut self.messages, history);
        self.messages.extend(live);
        self.loading = false;
        true
    }

    pub fn fail_load(&mut self, conversation_id: &str) -> bool {
        if self.conversation_id.as_deref() != Some(conversation_id) {
            return false;
        }
        self.loading = false;
        true
    }

    /// Whether a live notification should trigger a background reload: it
    /// must concern the displayed conversation and no stream may be active
    /// for it.
    pub fn should_reload(&self, notification: &LiveNotification) -> bool {
        let Some(current) = self.conversation_id.as_deref() else {
            return false;
        };
        if notification
            .conversation_id
            .as_deref()
            .is_some_and(|id| id != current)
        {
            return false;
        }

        let streaming_here = self
            .turn
            .as_ref()
            .is_some_and(|turn| turn.session.conversation_id == current);
        if streaming_here {
            debug!(conversation_id = current, "suppressing live reload during stream");
        }
        !streaming_here
    }

    /// Replace messages from a background reload started when
    /// `last_session_id` was `started_after`. Never touches the loading flag.
    /// Dropped when a stream is active or any turn began after the reload
    /// started, since its snapshot predates that turn.
    pub fn apply_background_reload(
        &mut self,
        conversation_id: &str,
        started_after: SessionId,
        history: Vec<Message>,
    ) -> bool {
        if self.conversation_id.as_deref() != Some(conversation_id) {
            debug!(
                conversation_id,
                "dropping background reload for inactive conversation"
            );
            return false;
        }
        if self.turn.is_some() {
            debug!(conversation_id, "dropping background reload during stream");
            return false;
        }
        if self.last_session_id != started_after {
            debug!(
                conversation_id,
                started_after,
                last_session_id = self.last_session_id,
                "dropping background reload that predates a turn"
            );
            return false;
        }

        self.messages = history;
        true
    }

    /// Start a turn: appends the user message and an assistant placeholder.
    /// An active turn is cancelled first and returned alongside the new
    /// session.
    pub fn begin_turn(
        &mut self,
        prompt: impl Into<String>,
        attachments: Vec<Attachment>,
    ) -> Result<(StreamSession, Option<StreamSession>), ReconcileError> {
        let conversation_id = self
            .conversation_id
            .clone()
            .ok_or(ReconcileError::NoConversation)?;
        let cancelled = self.cancel_active();

        self.messages.push(Message::user(prompt, attachments));
        let placeholder = Message::assistant_placeholder();
        let placeholder_id = placeholder.id.clone();
        self.messages.push(placeholder);

        self.last_session_id += 1;
        let session = StreamSession {
            id: self.last_session_id,
            conversation_id,
            text_message_id: placeholder_id.clone(),
            cancellation: Arc::new(AtomicBool::new(false)),
        };
        self.turn = Some(TurnState {
            session: session.clone(),
            text_message_id: placeholder_id,
            tool_message_id: None,
            ledger: ToolCallLedger::new(),
        });

        Ok((session, cancelled))
    }

    /// Apply one decoded event produced for `session_id`. Returns whether the
    /// event changed state; events of stale sessions return `false`.
    pub fn apply(&mut self, session_id: SessionId, event: StreamEvent) -> bool {
        if let StreamEvent::Error { message } = &event {
            return self.fail(session_id, message);
        }

        let turn = match self.turn.as_mut() {
            Some(turn) if is_live(turn, session_id) => turn,
            _ => {
                debug!(session_id, "dropping event for stale session");
                return false;
            }
        };
        let messages = &mut self.messages;

        match event {
            StreamEvent::TextDelta { content } => apply_text(messages, turn, &content),
            StreamEvent::ToolCalls { calls } => {
                let ids = turn.ledger.apply_calls(&calls);
                sync_tool_parts(messages, turn, &ids)
            }
            StreamEvent::ToolResult {
                tool_call_id,
                result,
                attachments,
            } => {
                turn.ledger.apply_result(&tool_call_id, result, attachments)
                    && sync_tool_parts(messages, turn, &[tool_call_id])
            }
            StreamEvent::SyntheticAttachments {
                attachment_ids,
                attachments,
            } => {
                let part = ToolCallPart::synthetic_attachments(&attachment_ids, attachments);
                turn.ledger.insert_resolved(&part)
                    && sync_tool_parts(messages, turn, &[part.tool_call_id])
            }
            StreamEvent::ConfirmationRequested(request) => {
                self.confirmations.insert(request);
                true
            }
            StreamEvent::ConfirmationResolved { request_id, .. } => {
                self.confirmations.resolve(&request_id).is_some()
            }
            StreamEvent::Error { .. } => false,
        }
    }

    /// Finish the turn normally. Tool-call parts move onto the final text
    /// message. Returns `true` when the caller should refresh the
    /// conversation list.
    pub fn complete(&mut self, session_id: SessionId) -> bool {
        let Some(turn) = self.take_turn(session_id) else {
            return false;
        };

        let text_id = turn.text_message_id.clone();
        if let Some(tool_id) = turn.tool_message_id.as_ref().filter(|id| **id != text_id) {
            self.merge_tool_message(tool_id, &text_id);
        }

        if let Some(index) = self.position(&text_id) {
            let message = &mut self.messages[index];
            message.remove_loading_text();
            message.is_loading = false;
            if message.is_empty() {
                self.messages.remove(index);
            } else {
                message.status = Some(if message.all_tools_resolved() {
                    MessageStatus::Complete
                } else {
                    MessageStatus::Incomplete
                });
            }
        }

        debug!(session_id, "turn completed");
        true
    }

    /// End the turn with the fixed apology text. Never retried.
    pub fn fail(&mut self, session_id: SessionId, reason: &str) -> bool {
        let Some(turn) = self.take_turn(session_id) else {
            return false;
        };
        error!(
            session_id,
            conversation_id = %turn.session.conversation_id,
            reason,
            "turn failed"
        );

        if let Some(tool_id) = turn
            .tool_message_id
            .as_ref()
            .filter(|id| **id != turn.text_message_id)
        {
            self.settle_partial(tool_id);
        }

        if let Some(message) = self.message_mut(&turn.text_message_id) {
            message.content = vec![ContentPart::text(APOLOGY_TEXT)];
            message.status = Some(MessageStatus::Error);
            message.is_loading = false;
        }
        true
    }

    /// Cancel the active turn, if any. Empty placeholders are removed and
    /// partially filled messages are marked incomplete.
    pub fn cancel_active(&mut self) -> Option<StreamSession> {
        let turn = self.turn.take()?;
        turn.session.cancel();
        for id in turn.message_ids() {
            self.settle_partial(&id);
        }
        debug!(session_id = turn.session.id, "turn cancelled");
        Some(turn.session)
    }

    /// Cancel only if `session_id` is still the active turn.
    pub fn cancel_session(&mut self, session_id: SessionId) -> Option<StreamSession> {
        if self.active_session()?.id != session_id {
            return None;
        }
        self.cancel_active()
    }

    /// Record the user's answer to a pending confirmation.
    pub fn respond_to_confirmation(
        &mut self,
        key: &str,
        approved: bool,
    ) -> Option<ConfirmRequest> {
        let conversation_id = self.conversation_id.as_deref()?;
        self.confirmations.respond(key, approved, conversation_id)
    }

    fn take_turn(&mut self, session_id: SessionId) -> Option<TurnState> {
        if !self.turn.as_ref().is_some_and(|turn| is_live(turn, session_id)) {
            debug!(session_id, "ignoring terminal event for stale session");
            return None;
        }
        self.turn.take()
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.messages.iter().position(|message| message.id == id)
    }

    fn message_mut(&mut self, id: &str) -> Option<&mut Message> {
        self.messages.iter_mut().find(|message| message.id == id)
    }

    fn merge_tool_message(&mut self, tool_id: &str, text_id: &str) {
        let Some(tool_index) = self.position(tool_id) else {
            return;
        };
        if self.position(text_id).is_none() {
            return;
        }

        let mut tool_message = self.messages.remove(tool_index);
        let parts = tool_message.take_tool_calls();
        let Some(text_message) = self.message_mut(text_id) else {
            return;
        };

        let mut content: Vec<ContentPart> = parts
            .into_iter()
            .filter(|part| text_message.tool_call(&part.tool_call_id).is_none())
            .map(ContentPart::ToolCall)
            .collect();
        content.append(&mut text_message.content);
        text_message.content = content;
    }

    fn settle_partial(&mut self, id: &str) {
        let Some(index) = self.position(id) else {
            return;
        };
        let message = &mut self.messages[index];
        message.remove_loading_text();
        message.is_loading = false;
        if message.is_empty() {
            self.messages.remove(index);
        } else {
            message.status = Some(MessageStatus::Incomplete);
        }
    }
}

fn is_live(turn: &TurnState, session_id: SessionId) -> bool {
    turn.session.id == session_id && !turn.session.is_cancelled()
}

fn apply_text(messages: &mut Vec<Message>, turn: &mut TurnState, content: &str) -> bool {
    let Some(index) = messages
        .iter()
        .position(|message| message.id == turn.text_message_id)
    else {
        return false;
    };

    let current = &mut messages[index];
    if current.has_tool_calls() && !current.has_text() {
        current.remove_loading_text();
        current.is_loading = false;

        let mut trailing = Message::new(Role::Assistant, vec![ContentPart::text(content)]);
        trailing.status = Some(MessageStatus::Running);
        trailing.is_loading = true;
        turn.text_message_id = trailing.id.clone();
        messages.insert(index + 1, trailing);
        return true;
    }

    current.set_text(content);
    true
}

fn sync_tool_parts(messages: &mut [Message], turn: &mut TurnState, ids: &[String]) -> bool {
    let tool_id = match &turn.tool_message_id {
        Some(id) => id.clone(),
        None => {
            let id = turn.text_message_id.clone();
            turn.tool_message_id = Some(id.clone());
            id
        }
    };
    let Some(message) = messages.iter_mut().find(|message| message.id == tool_id) else {
        return false;
    };

    for id in ids {
        if let Some(entry) = turn.ledger.get(id) {
            message.upsert_tool_call(entry.to_part());
        }
    }
    message.status = Some(if message.all_tools_resolved() {
        MessageStatus::Complete
    } else {
        MessageStatus::Running
    });
    true
}

#[cfg(test)]
mod tests {
    use chat_api::{LiveNotification, StreamEvent, ToolCallDelta};

    use super::{Reconciler, TurnPhase};
    use crate::message::{MessageStatus, Role, LOADING_TEXT};

    fn notification(conversation_id: Option<&str>) -> LiveNotification {
        LiveNotification {
            internal_id: None,
            timestamp: None,
            new_messages: None,
            role: None,
            content: None,
            conversation_id: conversation_id.map(ToString::to_string),
        }
    }

    fn reconciler() -> Reconciler {
        let mut reconciler = Reconciler::new();
        reconciler.switch_conversation("c-1");
        reconciler.finish_load("c-1", Vec::new());
        reconciler
    }

    #[test]
    fn begin_turn_requires_conversation() {
        let mut reconciler = Reconciler::new();
        assert!(reconciler.begin_turn("hi", Vec::new()).is_err());
    }

    #[test]
    fn begin_turn_appends_user_and_placeholder() {
        let mut reconciler = reconciler();
        let (session, cancelled) = reconciler.begin_turn("hello", Vec::new()).expect("turn");

        assert!(cancelled.is_none());
        assert_eq!(reconciler.messages().len(), 2);
        assert_eq!(reconciler.messages()[0].role, Role::User);
        let placeholder = reconciler.message(&session.text_message_id).expect("placeholder");
        assert!(placeholder.is_loading);
        assert_eq!(reconciler.turn_phase(), Some(TurnPhase::Pending));
    }

    #[test]
    fn text_leaves_pending_for_good() {
        let mut reconciler = reconciler();
        let (session, _) = reconciler.begin_turn("hello", Vec::new()).expect("turn");

        assert!(reconciler.apply(session.id, StreamEvent::text("")));
        assert_eq!(reconciler.turn_phase(), Some(TurnPhase::Active));
        assert!(!reconciler.messages().iter().any(|m| m.text().contains(LOADING_TEXT)));
    }

    #[test]
    fn stale_session_events_are_dropped() {
        let mut reconciler = reconciler();
        let (old, _) = reconciler.begin_turn("one", Vec::new()).expect("turn");
        let (new, cancelled) = reconciler.begin_turn("two", Vec::new()).expect("turn");

        assert_eq!(cancelled.map(|session| session.id), Some(old.id));
        assert!(old.is_cancelled());
        assert!(!reconciler.apply(old.id, StreamEvent::text("stale")));
        assert!(!reconciler.complete(old.id));
        assert_eq!(reconciler.active_session().map(|session| session.id), Some(new.id));
    }

    #[test]
    fn cancel_removes_empty_placeholder_and_marks_partial_incomplete() {
        let mut reconciler = reconciler();
        let (_, _) = reconciler.begin_turn("one", Vec::new()).expect("turn");
        reconciler.cancel_active();
        assert_eq!(reconciler.messages().len(), 1);

        let (session, _) = reconciler.begin_turn("two", Vec::new()).expect("turn");
        reconciler.apply(session.id, StreamEvent::text("half"));
        reconciler.cancel_active();

        let last = reconciler.messages().last().expect("partial message");
        assert_eq!(last.text(), "half");
        assert_eq!(last.status, Some(MessageStatus::Incomplete));
        assert!(!last.is_loading);
        assert!(reconciler.cancel_active().is_none());
    }

    #[test]
    fn error_event_writes_apology() {
        let mut reconciler = reconciler();
        let (session, _) = reconciler.begin_turn("hi", Vec::new()).expect("turn");
        reconciler.apply(session.id, StreamEvent::text("partial"));

        assert!(reconciler.apply(
            session.id,
            StreamEvent::Error {
                message: "boom".to_string()
            }
        ));

        let last = reconciler.messages().last().expect("apology");
        assert_eq!(last.text(), crate::message::APOLOGY_TEXT);
        assert_eq!(last.status, Some(MessageStatus::Error));
        assert!(!reconciler.is_streaming());
    }

    #[test]
    fn tool_status_tracks_results() {
        let mut reconciler = reconciler();
        let (session, _) = reconciler.begin_turn("hi", Vec::new()).expect("turn");
        reconciler.apply(
            session.id,
            StreamEvent::ToolCalls {
                calls: vec![ToolCallDelta::new("t1"), ToolCallDelta::new("t2")],
            },
        );
        reconciler.apply(session.id, StreamEvent::tool_result("t1", "ok"));

        let message = reconciler.message(&session.text_message_id).expect("tool message");
        assert_eq!(message.status, Some(MessageStatus::Running));

        reconciler.apply(session.id, StreamEvent::tool_result("t2", "ok"));
        let message = reconciler.message(&session.text_message_id).expect("tool message");
        assert_eq!(message.status, Some(MessageStatus::Complete));
    }

    #[test]
    fn reload_rules_follow_stream_state() {
        let mut reconciler = reconciler();
        assert!(reconciler.should_reload(&notification(Some("c-1"))));
        assert!(reconciler.should_reload(&notification(None)));
        assert!(!reconciler.should_reload(&notification(Some("other"))));

        let (session, _) = reconciler.begin_turn("hi", Vec::new()).expect("turn");
        assert!(!reconciler.should_reload(&notification(Some("c-1"))));
        assert!(!reconciler.apply_background_reload("c-1", session.id, Vec::new()));

        reconciler.apply(session.id, StreamEvent::text("done"));
        assert!(reconciler.complete(session.id));
        assert!(reconciler.should_reload(&notification(Some("c-1"))));
    }

    #[test]
    fn reload_started_before_a_turn_is_dropped_after_it_completes() {
        let mut reconciler = reconciler();
        let started_after = reconciler.last_session_id();

        let (session, _) = reconciler.begin_turn("hello", Vec::new()).expect("turn");
        reconciler.apply(session.id, StreamEvent::text("hi"));
        assert!(reconciler.complete(session.id));
        let settled = reconciler.messages().to_vec();

        assert!(!reconciler.apply_background_reload("c-1", started_after, Vec::new()));
        assert_eq!(reconciler.messages(), settled.as_slice());
        assert_eq!(settled.len(), 2);

        let current = reconciler.last_session_id();
        assert!(reconciler.apply_background_reload("c-1", current, Vec::new()));
        assert!(reconciler.messages().is_empty());
    }

    #[test]
    fn finish_load_ignores_other_conversations() {
        let mut reconciler = Reconciler::new();
        reconciler.switch_conversation("c-1");
        reconciler.switch_conversation("c-2");

        assert!(!reconciler.finish_load("c-1", Vec::new()));
        assert!(reconciler.is_loading());
        assert!(reconciler.finish_load("c-2", Vec::new()));
        assert!(!reconciler.is_loading());
    }
}
