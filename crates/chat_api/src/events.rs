use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// File metadata attached to a tool result or to a whole response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Server fields this client does not interpret, kept for display adapters.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Attachment {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            mime_type: None,
            url: None,
            size: None,
            extra: Map::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// One start/update fragment for a tool invocation.
///
/// `arguments` is a raw text fragment; callers concatenate fragments for the
/// same `id` until they form parseable JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallDelta {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

impl ToolCallDelta {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            arguments: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_arguments(mut self, arguments: impl Into<String>) -> Self {
        self.arguments = Some(arguments.into());
        self
    }
}

/// Server request to approve or deny a tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmationRequest {
    pub request_id: String,
    pub tool_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
    /// Server-side timeout in seconds. Carried for display only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

/// Decoded stream event, normalized from the structural payload shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Cumulative assistant text observed so far in this turn.
    TextDelta { content: String },
    /// One or more tool-call starts/updates, applied as a unit. A single
    /// `tool_call` payload decodes to a batch of one.
    ToolCalls { calls: Vec<ToolCallDelta> },
    ToolResult {
        tool_call_id: String,
        result: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        attachments: Option<Vec<Attachment>>,
    },
    ConfirmationRequested(ConfirmationRequest),
    ConfirmationResolved { request_id: String, approved: bool },
    /// Files attached to the response without an explicit tool invocation.
    SyntheticAttachments {
        attachment_ids: Vec<String>,
        attachments: Vec<Attachment>,
    },
    Error { message: String },
}

impl StreamEvent {
    pub fn text(content: impl Into<String>) -> Self {
        Self::TextDelta {
            content: content.into(),
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, result: impl Into<Value>) -> Self {
        Self::ToolResult {
            tool_call_id: tool_call_id.into(),
            result: result.into(),
            attachments: None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

/// Why a stream ended. Exactly one outcome is reported per stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamEnd {
    /// The body ended or an `event: close` frame arrived.
    Completed,
    /// The caller cancelled; not an error.
    Cancelled,
    /// A read error or an `{error}` payload ended the stream.
    Failed,
}

impl StreamEnd {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }
}

/// Event published by the live-update subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LiveEvent {
    Connected,
    Message(LiveNotification),
    Heartbeat,
}

/// Payload of a live `message` event: the conversation changed in storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveNotification {
    /// Storage-side identifier; servers send either a string or a number.
    #[serde(default)]
    pub internal_id: Option<Value>,
    #[serde(default)]
    pub timestamp: Option<Value>,
    /// Count or flag, depending on the server version.
    #[serde(default)]
    pub new_messages: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}
