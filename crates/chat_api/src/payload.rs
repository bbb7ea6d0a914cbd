use serde::{Deserialize, Serialize};

use crate::events::Attachment;

/// Body of a send request; the response is an event stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendRequest {
    pub prompt: String,
    pub conversation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_id: Option<String>,
    pub interface_type: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

impl SendRequest {
    pub fn new(
        prompt: impl Into<String>,
        conversation_id: impl Into<String>,
        interface_type: impl Into<String>,
    ) -> Self {
        Self {
            prompt: prompt.into(),
            conversation_id: conversation_id.into(),
            profile_id: None,
            interface_type: interface_type.into(),
            attachments: Vec::new(),
        }
    }

    pub fn with_profile_id(mut self, profile_id: impl Into<String>) -> Self {
        self.profile_id = Some(profile_id.into());
        self
    }

    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = attachments;
        self
    }
}

/// Body of a confirmation response for a pending tool invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmRequest {
    pub request_id: String,
    pub approved: bool,
    pub conversation_id: String,
}
