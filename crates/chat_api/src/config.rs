use std::collections::BTreeMap;
use std::time::Duration;

/// Default value sent as `interface_type` on send and live requests.
pub const DEFAULT_INTERFACE_TYPE: &str = "web";

/// Transport configuration for chat API requests.
#[derive(Debug, Clone)]
pub struct ChatApiConfig {
    /// Base URL; endpoint paths are joined onto it.
    pub base_url: String,
    /// Optional bearer token passed to `Authorization`.
    pub access_token: Option<String>,
    /// Interface identifier reported to the server.
    pub interface_type: String,
    /// Location a login redirect should return to after a 401.
    pub login_return_to: Option<String>,
    /// Optional `User-Agent` override.
    pub user_agent: Option<String>,
    /// Additional headers merged into request headers.
    pub extra_headers: BTreeMap<String, String>,
    /// Optional timeout for non-streaming requests.
    pub timeout: Option<Duration>,
}

impl ChatApiConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            access_token: None,
            interface_type: DEFAULT_INTERFACE_TYPE.to_string(),
            login_return_to: None,
            user_agent: None,
            extra_headers: BTreeMap::new(),
            timeout: None,
        }
    }

    pub fn with_access_token(mut self, access_token: impl Into<String>) -> Self {
        self.access_token = Some(access_token.into());
        self
    }

    pub fn with_interface_type(mut self, interface_type: impl Into<String>) -> Self {
        self.interface_type = interface_type.into();
        self
    }

    pub fn with_login_return_to(mut self, location: impl Into<String>) -> Self {
        self.login_return_to = Some(location.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn insert_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.insert(key.into(), value.into());
        self
    }

    pub fn with_headers(mut self, headers: impl IntoIterator<Item = (String, String)>) -> Self {
        self.extra_headers.extend(headers);
        self
    }
}
