use tracing_subscriber::EnvFilter;

pub const DEFAULT_LOG_FILTER: &str = "warn";

/// Filter from `configured` (usually `CONVO_LOG`), else `RUST_LOG`, else
/// [`DEFAULT_LOG_FILTER`]. Invalid directives fall through to the next source.
pub fn env_filter(configured: Option<&str>) -> EnvFilter {
    configured
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// Install the stderr subscriber. Later calls are no-ops.
pub fn init(configured: Option<&str>) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(configured))
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::env_filter;

    #[test]
    fn configured_directives_take_precedence() {
        assert_eq!(
            env_filter(Some("chat_client=debug")).to_string(),
            "chat_client=debug"
        );
    }
}
