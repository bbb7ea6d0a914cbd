use std::time::Duration;

use chat_api::config::DEFAULT_INTERFACE_TYPE;
use chat_api::{ChatApiConfig, ReconnectPolicy};

use crate::error::ConfigError;
use crate::runtime::RuntimeOptions;

pub const BASE_URL_ENV_VAR: &str = "CONVO_BASE_URL";
pub const ACCESS_TOKEN_ENV_VAR: &str = "CONVO_ACCESS_TOKEN";
pub const PROFILE_ID_ENV_VAR: &str = "CONVO_PROFILE_ID";
pub const INTERFACE_TYPE_ENV_VAR: &str = "CONVO_INTERFACE_TYPE";
pub const LOCATION_ENV_VAR: &str = "CONVO_LOCATION";
pub const TIMEOUT_SEC_ENV_VAR: &str = "CONVO_TIMEOUT_SEC";
pub const LIVE_CONNECT_DELAY_ENV_VAR: &str = "CONVO_LIVE_CONNECT_DELAY_MS";
pub const LIVE_RECONNECT_DELAY_ENV_VAR: &str = "CONVO_LIVE_RECONNECT_DELAY_MS";
pub const LOG_ENV_VAR: &str = "CONVO_LOG";

/// Client settings resolved from `CONVO_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub base_url: Option<String>,
    pub access_token: Option<String>,
    pub profile_id: Option<String>,
    pub interface_type: String,
    pub location: Option<String>,
    pub timeout: Option<Duration>,
    pub live: ReconnectPolicy,
    pub log_filter: Option<String>,
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolve settings through `lookup`. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let read = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let mut live = ReconnectPolicy::default();
        if let Some(delay) = read_millis(&read, LIVE_CONNECT_DELAY_ENV_VAR)? {
            live = live.with_connect_delay(delay);
        }
        if let Some(delay) = read_millis(&read, LIVE_RECONNECT_DELAY_ENV_VAR)? {
            live = live.with_reconnect_delay(delay);
        }

        Ok(Self {
            base_url: read(BASE_URL_ENV_VAR),
            access_token: read(ACCESS_TOKEN_ENV_VAR),
            profile_id: read(PROFILE_ID_ENV_VAR),
            interface_type: read(INTERFACE_TYPE_ENV_VAR)
                .unwrap_or_else(|| DEFAULT_INTERFACE_TYPE.to_string()),
            location: read(LOCATION_ENV_VAR),
            timeout: read_number(&read, TIMEOUT_SEC_ENV_VAR)?.map(Duration::from_secs),
            live,
            log_filter: read(LOG_ENV_VAR),
        })
    }

    pub fn api_config(&self) -> Result<ChatApiConfig, ConfigError> {
        let base_url = self.base_url.as_deref().ok_or(ConfigError::Missing {
            name: BASE_URL_ENV_VAR,
        })?;

        let mut config =
            ChatApiConfig::new(base_url).with_interface_type(self.interface_type.clone());
        if let Some(token) = self.access_token.as_deref() {
            config = config.with_access_token(token);
        }
        if let Some(location) = self.location.as_deref() {
            config = config.with_login_return_to(location);
        }
        if let Some(timeout) = self.timeout {
            config = config.with_timeout(timeout);
        }
        Ok(config)
    }

    pub fn runtime_options(&self) -> RuntimeOptions {
        RuntimeOptions {
            interface_type: self.interface_type.clone(),
            profile_id: self.profile_id.clone(),
            live: self.live,
            live_updates: true,
        }
    }
}

fn read_number(
    read: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<u64>, ConfigError> {
    let Some(value) = read(name) else {
        return Ok(None);
    };
    match value.parse::<u64>() {
        Ok(number) if number > 0 => Ok(Some(number)),
        _ => Err(ConfigError::InvalidNumber { name, value }),
    }
}

fn read_millis(
    read: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<Duration>, ConfigError> {
    Ok(read_number(read, name)?.map(Duration::from_millis))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::error::ConfigError;

    fn config_from(pairs: &[(&str, &str)]) -> Result<ClientConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        ClientConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_unset_or_blank() {
        let config = config_from(&[(PROFILE_ID_ENV_VAR, "   ")]).expect("config");

        assert_eq!(config.base_url, None);
        assert_eq!(config.profile_id, None);
        assert_eq!(config.interface_type, "web");
        assert_eq!(config.live, ReconnectPolicy::default());
        assert!(matches!(
            config.api_config(),
            Err(ConfigError::Missing {
                name: BASE_URL_ENV_VAR
            })
        ));
    }

    #[test]
    fn values_flow_into_transport_and_runtime() {
        let config = config_from(&[
            (BASE_URL_ENV_VAR, "https://chat.test/api"),
            (ACCESS_TOKEN_ENV_VAR, "secret"),
            (PROFILE_ID_ENV_VAR, "p-7"),
            (INTERFACE_TYPE_ENV_VAR, "cli"),
            (LOCATION_ENV_VAR, "/c/42"),
            (TIMEOUT_SEC_ENV_VAR, "30"),
            (LIVE_CONNECT_DELAY_ENV_VAR, "250"),
            (LIVE_RECONNECT_DELAY_ENV_VAR, "500"),
        ])
        .expect("config");

        let api = config.api_config().expect("api config");
        assert_eq!(api.base_url, "https://chat.test/api");
        assert_eq!(api.access_token.as_deref(), Some("secret"));
        assert_eq!(api.interface_type, "cli");
        assert_eq!(api.login_return_to.as_deref(), Some("/c/42"));
        assert_eq!(api.timeout, Some(Duration::from_secs(30)));

        let options = config.runtime_options();
        assert_eq!(options.profile_id.as_deref(), Some("p-7"));
        assert_eq!(options.live.connect_delay, Duration::from_millis(250));
        assert_eq!(options.live.reconnect_delay, Duration::from_millis(500));
    }

    #[test]
    fn invalid_numbers_are_rejected() {
        let error = config_from(&[(TIMEOUT_SEC_ENV_VAR, "soon")]).expect_err("invalid");
        assert_eq!(
            error.to_string(),
            "CONVO_TIMEOUT_SEC must be a positive integer, got 'soon'"
        );
        assert!(config_from(&[(LIVE_RECONNECT_DELAY_ENV_VAR, "0")]).is_err());
    }
}
