use thiserror::Error;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("failed to parse conversation transcript: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("message {index} has unsupported role '{role}'")]
    UnsupportedRole { index: usize, role: String },

    #[error("message {index} has invalid RFC3339 timestamp in field '{field}': {value}")]
    InvalidTimestamp {
        index: usize,
        field: &'static str,
        value: String,
    },

    #[error("tool message {index} has no tool_call_id")]
    MalformedToolMessage { index: usize },
}

impl HistoryError {
    #[must_use]
    pub fn invalid_timestamp(index: usize, field: &'static str, value: impl Into<String>) -> Self {
        Self::InvalidTimestamp {
            index,
            field,
            value: value.into(),
        }
    }
}
