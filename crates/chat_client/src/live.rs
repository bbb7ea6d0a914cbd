use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chat_api::{CancellationSignal, LiveEvent, ReconnectPolicy};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::backend::ChatBackend;
use crate::runtime::RuntimeMessage;

/// Connection attempt counter, bumped on every connect and reconnect. Only
/// reported in logs.
pub(crate) type LiveGeneration = u64;

/// The live-update subscription currently owned by the runtime.
#[derive(Default)]
pub(crate) struct LiveChannelState {
    generation: Arc<AtomicU64>,
    active: Option<ActiveSubscription>,
}

struct ActiveSubscription {
    conversation_id: String,
    cancellation: CancellationSignal,
    task: JoinHandle<()>,
}

impl LiveChannelState {
    /// Whether events from a subscription to `conversation_id` still belong
    /// to the running subscription.
    pub(crate) fn is_current(&self, conversation_id: &str) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| active.conversation_id == conversation_id)
    }

    /// Replace any running subscription with one for `conversation_id`.
    pub(crate) fn start(
        &mut self,
        backend: Arc<dyn ChatBackend>,
        conversation_id: &str,
        policy: ReconnectPolicy,
        sender: UnboundedSender<RuntimeMessage>,
    ) {
        self.stop();

        let cancellation = Arc::new(AtomicBool::new(false));
        let task = tokio::spawn(run_subscription(
            backend,
            conversation_id.to_owned(),
            policy,
            Arc::clone(&self.generation),
            Arc::clone(&cancellation),
            sender,
        ));
        self.active = Some(ActiveSubscription {
            conversation_id: conversation_id.to_owned(),
            cancellation,
            task,
        });
    }

    /// Tear down the running subscription. Idempotent.
    pub(crate) fn stop(&mut self) {
        if let Some(active) = self.active.take() {
            active.cancellation.store(true, Ordering::SeqCst);
            active.task.abort();
            debug!(
                conversation_id = %active.conversation_id,
                generation = self.generation.load(Ordering::SeqCst),
                "live subscription stopped"
            );
        }
    }
}

/// Connect after the initial delay, then reconnect after every error or end
/// of stream until cancelled.
pub(crate) async fn run_subscription(
    backend: Arc<dyn ChatBackend>,
    conversation_id: String,
    policy: ReconnectPolicy,
    generations: Arc<AtomicU64>,
    cancellation: CancellationSignal,
    sender: UnboundedSender<RuntimeMessage>,
) {
    let mut attempt = 0u64;
    loop {
        tokio::time::sleep(policy.delay_for(attempt)).await;
        if cancellation.load(Ordering::SeqCst) {
            return;
        }

        let generation: LiveGeneration = generations.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(conversation_id = %conversation_id, generation, "live subscription connecting");
        let mut forward = |event: LiveEvent| {
            let _ = sender.send(RuntimeMessage::Live {
                conversation_id: conversation_id.clone(),
                generation,
                event,
            });
        };
        let outcome = backend
            .subscribe_live(&conversation_id, &cancellation, &mut forward)
            .await;

        match outcome {
            Err(error) if error.is_cancelled() => return,
            Err(error) => warn!(
                conversation_id = %conversation_id,
                %error,
                delay_ms = policy.reconnect_delay.as_millis() as u64,
                "live subscription failed, reconnecting"
            ),
            Ok(()) => debug!(
                conversation_id = %conversation_id,
                "live subscription ended, reconnecting"
            ),
        }

        if cancellation.load(Ordering::SeqCst) || sender.is_closed() {
            return;
        }
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    use super::{ActiveSubscription, LiveChannelState};

    #[tokio::test]
    async fn only_the_running_subscription_is_current() {
        let mut state = LiveChannelState::default();
        assert!(!state.is_current("c-1"));

        state.active = Some(ActiveSubscription {
            conversation_id: "c-1".to_string(),
            cancellation: Arc::new(AtomicBool::new(false)),
            task: tokio::spawn(async {}),
        });
        assert!(state.is_current("c-1"));
        assert!(!state.is_current("c-2"));

        state.stop();
        assert!(!state.is_current("c-1"));
    }
}
