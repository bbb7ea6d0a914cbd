mod error;
mod loader;
mod schema;

pub use error::HistoryError;
pub use loader::{load_messages, parse_transcript};
pub use schema::{
    ConversationList, ConversationSummary, Transcript, TranscriptFunction, TranscriptMessage,
    TranscriptToolCall, ROLE_ASSISTANT, ROLE_SYSTEM, ROLE_TOOL, ROLE_USER,
};
