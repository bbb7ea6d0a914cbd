use chat_api::Attachment;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

pub type MessageId = String;

/// Text shown in an assistant placeholder until the first real content
/// arrives. Never survives the end of a turn.
pub const LOADING_TEXT: &str = "Thinking...";

/// Fixed user-facing text written into a turn that failed.
pub const APOLOGY_TEXT: &str =
    "Sorry, something went wrong while generating a response. Please try again.";

/// Tool name of the pseudo call that carries response-level attachments.
pub const ATTACH_TO_RESPONSE_TOOL: &str = "attach_to_response";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Running,
    Complete,
    Incomplete,
    Error,
}

/// One tool invocation rendered inside a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallPart {
    pub tool_call_id: String,
    pub tool_name: String,
    /// Parsed arguments, or `{"raw": text}` when the text is not JSON.
    pub args: Value,
    pub args_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<Attachment>>,
}

impl ToolCallPart {
    pub fn has_result(&self) -> bool {
        self.result.is_some()
    }

    /// Pseudo call for attachments delivered without an explicit tool
    /// invocation. Streaming and history loading both build it here so the
    /// two paths agree on its shape.
    pub fn synthetic_attachments(attachment_ids: &[String], attachments: Vec<Attachment>) -> Self {
        let args = json!({ "attachment_ids": attachment_ids });
        Self {
            tool_call_id: synthetic_attachment_call_id(attachment_ids),
            tool_name: ATTACH_TO_RESPONSE_TOOL.to_owned(),
            args_text: args.to_string(),
            args,
            result: Some(json!({ "attached": attachment_ids.len() })),
            attachments: Some(attachments),
        }
    }
}

pub fn synthetic_attachment_call_id(attachment_ids: &[String]) -> String {
    format!("{ATTACH_TO_RESPONSE_TOOL}:{}", attachment_ids.join(","))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ToolCall(ToolCallPart),
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            Self::ToolCall(_) => None,
        }
    }

    pub fn as_tool_call(&self) -> Option<&ToolCallPart> {
        match self {
            Self::ToolCall(part) => Some(part),
            Self::Text { .. } => None,
        }
    }

    fn is_loading_text(&self) -> bool {
        self.as_text() == Some(LOADING_TEXT)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    pub content: Vec<ContentPart>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    /// RFC3339 timestamp.
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<MessageStatus>,
    #[serde(default)]
    pub is_loading: bool,
}

impl Message {
    pub fn new(role: Role, content: Vec<ContentPart>) -> Self {
        Self {
            id: new_message_id(),
            role,
            content,
            attachments: Vec::new(),
            created_at: now_rfc3339(),
            status: None,
            is_loading: false,
        }
    }

    pub fn user(text: impl Into<String>, attachments: Vec<Attachment>) -> Self {
        let mut message = Self::new(Role::User, vec![ContentPart::text(text)]);
        message.attachments = attachments;
        message.status = Some(MessageStatus::Complete);
        message
    }

    /// Assistant placeholder shown while a turn waits for its first event.
    pub fn assistant_placeholder() -> Self {
        let mut message = Self::new(Role::Assistant, vec![ContentPart::text(LOADING_TEXT)]);
        message.status = Some(MessageStatus::Running);
        message.is_loading = true;
        message
    }

    pub fn with_id(mut self, id: impl Into<MessageId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_created_at(mut self, created_at: impl Into<String>) -> Self {
        self.created_at = created_at.into();
        self
    }

    pub fn with_status(mut self, status: MessageStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Concatenation of every real text part.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter(|part| !part.is_loading_text())
            .filter_map(ContentPart::as_text)
            .collect()
    }

    pub fn has_text(&self) -> bool {
        self.content
            .iter()
            .any(|part| part.as_text().is_some() && !part.is_loading_text())
    }

    pub fn has_loading_text(&self) -> bool {
        self.content.iter().any(ContentPart::is_loading_text)
    }

    pub fn tool_calls(&self) -> impl Iterator<Item = &ToolCallPart> {
        self.content.iter().filter_map(ContentPart::as_tool_call)
    }

    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls().next().is_some()
    }

    pub fn tool_call(&self, tool_call_id: &str) -> Option<&ToolCallPart> {
        self.tool_calls()
            .find(|part| part.tool_call_id == tool_call_id)
    }

    /// True when every tool-call part carries a result.
    pub fn all_tools_resolved(&self) -> bool {
        self.tool_calls().all(ToolCallPart::has_result)
    }

    pub fn is_empty(&self) -> bool {
        !self.has_text() && !self.has_tool_calls()
    }

    /// Replace the message's text with `text`, keeping tool-call parts where
    /// they are. The loading sentinel goes away with the old text.
    pub fn set_text(&mut self, text: &str) {
        let mut placed = false;
        self.content.retain_mut(|part| match part {
            ContentPart::Text { text: existing } if !placed => {
                existing.clear();
                existing.push_str(text);
                placed = true;
                true
            }
            ContentPart::Text { .. } => false,
            ContentPart::ToolCall(_) => true,
        });
        if !placed {
            self.content.push(ContentPart::text(text));
        }
    }

    /// Insert or replace a tool-call part by id. New calls go after the
    /// existing ones and ahead of any text.
    pub fn upsert_tool_call(&mut self, part: ToolCallPart) {
        if let Some(existing) = self.content.iter_mut().find_map(|content| match content {
            ContentPart::ToolCall(existing) if existing.tool_call_id == part.tool_call_id => {
                Some(existing)
            }
            _ => None,
        }) {
            *existing = part;
        } else {
            let index = self
                .content
                .iter()
                .rposition(|content| matches!(content, ContentPart::ToolCall(_)))
                .map_or(0, |last| last + 1);
            self.content.insert(index, ContentPart::ToolCall(part));
        }
    }

    pub fn remove_loading_text(&mut self) {
        self.content.retain(|part| !part.is_loading_text());
    }

    /// Take every tool-call part out of the message, in order.
    pub fn take_tool_calls(&mut self) -> Vec<ToolCallPart> {
        let mut taken = Vec::new();
        let mut kept = Vec::with_capacity(self.content.len());
        for part in std::mem::take(&mut self.content) {
            match part {
                ContentPart::ToolCall(call) => taken.push(call),
                other => kept.push(other),
            }
        }
        self.content = kept;
        taken
    }
}

pub fn new_message_id() -> MessageId {
    uuid::Uuid::new_v4().to_string()
}

pub fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_owned())
}
