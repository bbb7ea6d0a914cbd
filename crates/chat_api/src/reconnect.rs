use std::time::Duration;

/// Delay between component readiness and the first live-update connect.
pub const DEFAULT_CONNECT_DELAY: Duration = Duration::from_millis(1000);
/// Fixed delay before reconnecting a dropped live-update subscription.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(3000);

/// Connect/reconnect timing for the live-update subscription.
///
/// Reconnects use a fixed delay and never give up; the subscription ends only
/// when its owner tears it down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub connect_delay: Duration,
    pub reconnect_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            connect_delay: DEFAULT_CONNECT_DELAY,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

impl ReconnectPolicy {
    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = delay;
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Delay before connection attempt `attempt` (0 is the initial connect).
    pub fn delay_for(&self, attempt: u64) -> Duration {
        if attempt == 0 {
            self.connect_delay
        } else {
            self.reconnect_delay
        }
    }
}
