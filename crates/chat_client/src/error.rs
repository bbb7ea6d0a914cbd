use chat_api::ChatApiError;
use history_store::HistoryError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error(transparent)]
    Api(#[from] ChatApiError),

    #[error(transparent)]
    History(#[from] HistoryError),
}

impl BackendError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Api(error) if error.is_cancelled())
    }

    /// Login URL carried by a 401 from the server.
    pub fn login_url(&self) -> Option<&str> {
        match self {
            Self::Api(ChatApiError::Unauthorized { login_url }) => Some(login_url),
            _ => None,
        }
    }
}

/// The runtime actor is gone; commands can no longer be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("chat runtime has shut down")]
pub struct RuntimeClosed;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} is required")]
    Missing { name: &'static str },

    #[error("{name} must be a positive integer, got '{value}'")]
    InvalidNumber { name: &'static str, value: String },
}
