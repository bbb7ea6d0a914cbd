use chat_api::{ConfirmRequest, ConfirmationRequest};
use serde::Serialize;
use serde_json::Value;

/// A tool invocation waiting for the user's approval.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingConfirmation {
    /// `tool_call_id` when the request names one, else `request_id`.
    pub key: String,
    pub request_id: String,
    pub tool_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
    /// Server-side timeout in seconds; not enforced here.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    /// The user's answer once given. The entry stays until the server
    /// confirms the resolution.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<bool>,
}

impl From<ConfirmationRequest> for PendingConfirmation {
    fn from(request: ConfirmationRequest) -> Self {
        Self {
            key: request
                .tool_call_id
                .clone()
                .unwrap_or_else(|| request.request_id.clone()),
            request_id: request.request_id,
            tool_name: request.tool_name,
            message: request.message,
            arguments: request.arguments,
            timeout: request.timeout,
            response: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingConfirmations {
    entries: Vec<PendingConfirmation>,
}

impl PendingConfirmations {
    pub fn entries(&self) -> &[PendingConfirmation] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&PendingConfirmation> {
        self.entries.iter().find(|entry| entry.key == key)
    }

    /// Register a request, replacing any earlier one under the same key.
    pub fn insert(&mut self, request: ConfirmationRequest) {
        let pending = PendingConfirmation::from(request);
        match self.entries.iter_mut().find(|entry| entry.key == pending.key) {
            Some(existing) => *existing = pending,
            None => self.entries.push(pending),
        }
    }

    /// Drop the entry resolved by `request_id`.
    pub fn resolve(&mut self, request_id: &str) -> Option<PendingConfirmation> {
        let index = self
            .entries
            .iter()
            .position(|entry| entry.request_id == request_id)?;
        Some(self.entries.remove(index))
    }

    /// Record the user's answer and build the request to send. Returns
    /// `None` for unknown keys.
    pub fn respond(
        &mut self,
        key: &str,
        approved: bool,
        conversation_id: &str,
    ) -> Option<ConfirmRequest> {
        let entry = self.entries.iter_mut().find(|entry| entry.key == key)?;
        entry.response = Some(approved);
        Some(ConfirmRequest {
            request_id: entry.request_id.clone(),
            approved,
            conversation_id: conversation_id.to_owned(),
        })
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
