use tracing::{trace, warn};

use crate::events::{LiveEvent, LiveNotification};

pub const EVENT_CONNECTED: &str = "connected";
pub const EVENT_MESSAGE: &str = "message";
pub const EVENT_HEARTBEAT: &str = "heartbeat";

/// Incremental parser for the live-update subscription.
///
/// Unlike the chat stream this channel uses regular SSE block semantics: an
/// `event:` name and its `data:` lines are dispatched together at the blank
/// line that ends the block. A block without a name is a `message`.
#[derive(Debug, Default)]
pub struct LiveEventParser {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl LiveEventParser {
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<LiveEvent> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();

        while let Some(newline) = self.buffer.iter().position(|byte| *byte == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                if let Some(event) = self.dispatch() {
                    events.push(event);
                }
            } else if let Some(name) = line.strip_prefix("event:") {
                self.event = Some(name.trim().to_owned());
            } else if let Some(data) = line.strip_prefix("data:") {
                self.data.push(data.trim().to_owned());
            }
        }

        events
    }

    pub fn parse_blocks(input: &str) -> Vec<LiveEvent> {
        Self::default().feed(input.as_bytes())
    }

    fn dispatch(&mut self) -> Option<LiveEvent> {
        let name = self.event.take();
        let data = std::mem::take(&mut self.data).join("\n");
        if name.is_none() && data.is_empty() {
            return None;
        }

        match name.as_deref().unwrap_or(EVENT_MESSAGE) {
            EVENT_CONNECTED => Some(LiveEvent::Connected),
            EVENT_HEARTBEAT => Some(LiveEvent::Heartbeat),
            EVENT_MESSAGE => match serde_json::from_str::<LiveNotification>(&data) {
                Ok(notification) => Some(LiveEvent::Message(notification)),
                Err(error) => {
                    warn!(%error, data, "skipping malformed live-update message");
                    None
                }
            },
            other => {
                trace!(event = other, "ignoring unknown live-update event");
                None
            }
        }
    }
}
