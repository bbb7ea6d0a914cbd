//! Conversation state for a streaming chat client.
//!
//! [`Reconciler`] owns the ordered message list of the displayed conversation
//! and folds decoded stream events into it. Each send is represented by a
//! [`StreamSession`]; events carry the session id they were produced for and
//! events from a cancelled or superseded session are discarded.
//!
//! A turn normally produces one assistant message. When tool calls arrive
//! before any text, the text goes into a trailing message and the tool-call
//! parts are merged into it when the turn completes.

pub mod confirmations;
pub mod error;
pub mod ledger;
pub mod message;
pub mod reconciler;
pub mod view;

pub use confirmations::{PendingConfirmation, PendingConfirmations};
pub use error::ReconcileError;
pub use ledger::{ToolCallLedger, ToolCallLedgerEntry};
pub use message::{
    ContentPart, Message, MessageId, MessageStatus, Role, ToolCallPart, APOLOGY_TEXT,
    ATTACH_TO_RESPONSE_TOOL, LOADING_TEXT,
};
pub use reconciler::{Reconciler, SessionId, StreamSession, TurnPhase};
pub use view::ConversationView;
