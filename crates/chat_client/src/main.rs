use std::process::ExitCode;
use std::sync::Arc;

use chat_client::{
    logging, BackendError, ChatRuntime, ClientConfig, ConfigError, HttpBackend, RuntimeClosed,
};
use convo_stream::ConversationView;
use thiserror::Error;
use tokio::sync::watch;

#[derive(Debug, Error)]
enum CliError {
    #[error("usage: chat_client <conversation-id> [prompt...]")]
    Usage,
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Closed(#[from] RuntimeClosed),
    #[error("failed to encode messages: {0}")]
    Encode(#[from] serde_json::Error),
}

#[tokio::main]
async fn main() -> ExitCode {
    let config = match ClientConfig::from_env() {
        Ok(config) => config,
        Err(error) => {
            eprintln!("chat_client: {error}");
            return ExitCode::FAILURE;
        }
    };
    logging::init(config.log_filter.as_deref());

    match run(config, std::env::args().skip(1).collect()).await {
        Ok(code) => code,
        Err(error) => {
            eprintln!("chat_client: {error}");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: ClientConfig, args: Vec<String>) -> Result<ExitCode, CliError> {
    let mut args = args.into_iter();
    let conversation_id = args.next().ok_or(CliError::Usage)?;
    let prompt = args.collect::<Vec<_>>().join(" ");

    let backend = HttpBackend::new(config.api_config()?)?;
    let mut options = config.runtime_options();
    options.live_updates = false;
    let (handle, runtime) = ChatRuntime::spawn(Arc::new(backend), options);
    let mut views = handle.subscribe();

    handle.switch_conversation(conversation_id.as_str())?;
    let loaded = wait_for(&mut views, |view| {
        view.conversation_id.as_deref() == Some(conversation_id.as_str()) && !view.loading
    })
    .await?;

    let view = if prompt.trim().is_empty() {
        loaded
    } else {
        let before = loaded.messages.len();
        handle.send_message(prompt, Vec::new())?;
        wait_for(&mut views, |view| {
            view.login_redirect.is_some() || (view.messages.len() > before && !view.is_busy())
        })
        .await?
    };

    handle.shutdown()?;
    let _ = runtime.await;

    if let Some(login_url) = view.login_redirect.as_deref() {
        eprintln!("chat_client: login required: {login_url}");
        return Ok(ExitCode::from(2));
    }

    println!("{}", serde_json::to_string_pretty(&view.messages)?);
    Ok(ExitCode::SUCCESS)
}

async fn wait_for(
    views: &mut watch::Receiver<ConversationView>,
    ready: impl FnMut(&ConversationView) -> bool,
) -> Result<ConversationView, RuntimeClosed> {
    let view = views.wait_for(ready).await.map_err(|_| RuntimeClosed)?;
    Ok(view.clone())
}
