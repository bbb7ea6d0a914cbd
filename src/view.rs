use serde::Serialize;

use crate::confirmations::PendingConfirmation;
use crate::message::Message;

/// Immutable snapshot of the displayed conversation, published after every
/// state change.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConversationView {
    pub conversation_id: Option<String>,
    pub messages: Vec<Message>,
    /// A conversation load is in flight. Background reloads never set it.
    pub loading: bool,
    pub streaming: bool,
    pub pending_confirmations: Vec<PendingConfirmation>,
    /// Set after the server rejected a send with 401.
    pub login_redirect: Option<String>,
}

impl ConversationView {
    /// True while the composer should stay disabled.
    pub fn is_busy(&self) -> bool {
        self.loading || self.streaming
    }
}
