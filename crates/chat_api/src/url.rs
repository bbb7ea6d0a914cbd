use url::Url;

use crate::error::ChatApiError;

pub const STREAM_PATH: &str = "chat/stream";
pub const CONFIRM_PATH: &str = "chat/confirm";
pub const CONVERSATIONS_PATH: &str = "conversations";
pub const LIVE_PATH: &str = "conversations/live";
pub const LOGIN_PATH: &str = "login";

/// Parse a base URL and guarantee a trailing slash so relative joins keep
/// every existing path segment.
///
/// `https://host/api` and `https://host/api/` both normalize to
/// `https://host/api/`.
pub fn normalize_base_url(input: &str) -> Result<Url, ChatApiError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ChatApiError::InvalidBaseUrl("base URL is empty".to_owned()));
    }

    let with_slash = if trimmed.ends_with('/') {
        trimmed.to_owned()
    } else {
        format!("{trimmed}/")
    };

    let url = Url::parse(&with_slash)
        .map_err(|error| ChatApiError::InvalidBaseUrl(format!("{trimmed}: {error}")))?;
    if url.cannot_be_a_base() {
        return Err(ChatApiError::InvalidBaseUrl(format!(
            "{trimmed}: cannot be used as a base"
        )));
    }
    Ok(url)
}

/// Join a relative endpoint path onto a normalized base.
pub fn endpoint(base: &Url, path: &str) -> Result<Url, ChatApiError> {
    base.join(path.trim_start_matches('/'))
        .map_err(|error| ChatApiError::InvalidBaseUrl(format!("{path}: {error}")))
}

/// Endpoint for one persisted conversation transcript.
pub fn conversation_url(base: &Url, conversation_id: &str) -> Result<Url, ChatApiError> {
    let mut url = endpoint(base, CONVERSATIONS_PATH)?;
    url.path_segments_mut()
        .map_err(|_| ChatApiError::InvalidBaseUrl(base.to_string()))?
        .push(conversation_id);
    Ok(url)
}

/// Endpoint for the live-update subscription of one conversation.
pub fn live_url(
    base: &Url,
    conversation_id: &str,
    interface_type: &str,
) -> Result<Url, ChatApiError> {
    let mut url = endpoint(base, LIVE_PATH)?;
    url.query_pairs_mut()
        .append_pair("conversation_id", conversation_id)
        .append_pair("interface_type", interface_type);
    Ok(url)
}

/// Login URL that returns to `location` after authentication.
pub fn login_redirect_url(base: &Url, location: Option<&str>) -> Result<Url, ChatApiError> {
    let mut url = endpoint(base, LOGIN_PATH)?;
    if let Some(location) = location.map(str::trim).filter(|value| !value.is_empty()) {
        url.query_pairs_mut().append_pair("next", location);
    }
    Ok(url)
}
