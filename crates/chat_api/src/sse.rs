use serde_json::{Map, Value};
use tracing::{trace, warn};

use crate::events::{Attachment, ConfirmationRequest, StreamEvent, ToolCallDelta};

/// Payload that marks the logical end of data. Carries no event.
pub const DONE_SENTINEL: &str = "[DONE]";
/// Event name that ends the stream immediately.
pub const CLOSE_EVENT: &str = "close";

/// Incremental decoder for the chat event stream.
///
/// Lines are buffered as bytes until a newline arrives, so frames and UTF-8
/// sequences split across transport chunks decode as if they arrived whole.
/// After an `event: close` line every further byte is discarded.
#[derive(Debug, Default)]
pub struct StreamDecoder {
    buffer: Vec<u8>,
    closed: bool,
}

impl StreamDecoder {
    /// Feed arbitrary bytes into the decoder and drain complete events.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if self.closed {
            return events;
        }

        self.buffer.extend_from_slice(bytes);

        while let Some(newline) = self.buffer.iter().position(|byte| *byte == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&raw);
            self.process_line(line.trim_end_matches(['\n', '\r']), &mut events);

            if self.closed {
                self.buffer.clear();
                break;
            }
        }

        events
    }

    /// Decode a trailing line that was never newline-terminated.
    ///
    /// Called once the transport reports end of body.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if self.closed || self.buffer.is_empty() {
            self.buffer.clear();
            return events;
        }

        let raw = std::mem::take(&mut self.buffer);
        let line = String::from_utf8_lossy(&raw);
        self.process_line(line.trim_end_matches('\r'), &mut events);
        events
    }

    /// Decode a complete stream body in one shot.
    pub fn parse_frames(input: &str) -> Vec<StreamEvent> {
        let mut decoder = Self::default();
        let mut events = decoder.feed(input.as_bytes());
        events.extend(decoder.finish());
        events
    }

    /// True once an `event: close` line has been seen.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn is_empty_buffer(&self) -> bool {
        self.buffer.iter().all(u8::is_ascii_whitespace)
    }

    fn process_line(&mut self, line: &str, events: &mut Vec<StreamEvent>) {
        if let Some(kind) = field_value(line, "event") {
            if kind == CLOSE_EVENT {
                self.closed = true;
            }
            return;
        }

        let Some(payload) = field_value(line, "data") else {
            return;
        };
        if payload.is_empty() || payload == DONE_SENTINEL {
            return;
        }

        match serde_json::from_str::<Value>(payload) {
            Ok(value) => match decode_payload(value) {
                Some(event) => events.push(event),
                None => trace!(payload, "ignoring unrecognized stream payload"),
            },
            Err(error) => warn!(%error, payload, "skipping malformed stream payload"),
        }
    }
}

fn field_value<'a>(line: &'a str, field: &str) -> Option<&'a str> {
    line.strip_prefix(field)?
        .strip_prefix(':')
        .map(str::trim)
}

/// Map one decoded JSON payload to a stream event by its shape.
///
/// An explicit `type` of `confirmation_request` / `confirmation_result` wins
/// over structural detection.
pub fn decode_payload(value: Value) -> Option<StreamEvent> {
    let Value::Object(object) = value else {
        return None;
    };

    if let Some(error) = object.get("error").filter(|error| !error.is_null()) {
        return Some(StreamEvent::Error {
            message: error_message(error),
        });
    }

    match object.get("type").and_then(Value::as_str) {
        Some("confirmation_request") => return confirmation_request(&object),
        Some("confirmation_result") => return confirmation_result(&object),
        _ => {}
    }

    if let (Some(tool_call_id), Some(result)) = (
        object.get("tool_call_id").and_then(Value::as_str),
        object.get("result"),
    ) {
        return Some(StreamEvent::ToolResult {
            tool_call_id: tool_call_id.to_owned(),
            result: result.clone(),
            attachments: object.get("attachments").map(attachment_list),
        });
    }

    if object.contains_key("request_id") {
        if object.contains_key("tool_name") {
            return confirmation_request(&object);
        }
        if object.contains_key("approved") {
            return confirmation_result(&object);
        }
    }

    if let Some(calls) = object.get("tool_calls").and_then(Value::as_array) {
        let calls: Vec<ToolCallDelta> = calls.iter().filter_map(tool_call_delta).collect();
        return (!calls.is_empty()).then_some(StreamEvent::ToolCalls { calls });
    }

    if let Some(call) = object.get("tool_call") {
        return tool_call_delta(call).map(|call| StreamEvent::ToolCalls { calls: vec![call] });
    }

    if let (Some(ids), Some(attachments)) = (
        object.get("attachment_ids").and_then(Value::as_array),
        object.get("attachments"),
    ) {
        return Some(StreamEvent::SyntheticAttachments {
            attachment_ids: ids
                .iter()
                .filter_map(Value::as_str)
                .map(ToString::to_string)
                .collect(),
            attachments: attachment_list(attachments),
        });
    }

    object
        .get("content")
        .and_then(Value::as_str)
        .map(|content| StreamEvent::TextDelta {
            content: content.to_owned(),
        })
}

fn tool_call_delta(value: &Value) -> Option<ToolCallDelta> {
    let Some(id) = value.get("id").and_then(Value::as_str) else {
        warn!(%value, "tool call payload has no id");
        return None;
    };
    let function = value.get("function");
    let name = function
        .and_then(|function| function.get("name"))
        .or_else(|| value.get("name"))
        .and_then(Value::as_str)
        .map(ToString::to_string);
    let arguments = function
        .and_then(|function| function.get("arguments"))
        .or_else(|| value.get("arguments"))
        .and_then(|arguments| match arguments {
            Value::Null => None,
            Value::String(text) => Some(text.clone()),
            other => Some(other.to_string()),
        });

    Some(ToolCallDelta {
        id: id.to_owned(),
        name,
        arguments,
    })
}

fn confirmation_request(object: &Map<String, Value>) -> Option<StreamEvent> {
    match serde_json::from_value::<ConfirmationRequest>(Value::Object(object.clone())) {
        Ok(request) => Some(StreamEvent::ConfirmationRequested(request)),
        Err(error) => {
            warn!(%error, "skipping malformed confirmation request");
            None
        }
    }
}

fn confirmation_result(object: &Map<String, Value>) -> Option<StreamEvent> {
    let request_id = object.get("request_id").and_then(Value::as_str)?;
    let approved = object.get("approved").and_then(Value::as_bool)?;
    Some(StreamEvent::ConfirmationResolved {
        request_id: request_id.to_owned(),
        approved,
    })
}

pub(crate) fn attachment_list(value: &Value) -> Vec<Attachment> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| serde_json::from_value::<Attachment>(item.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}

fn error_message(error: &Value) -> String {
    match error {
        Value::String(message) => message.clone(),
        Value::Object(fields) => fields
            .get("message")
            .and_then(Value::as_str)
            .map(ToString::to_string)
            .unwrap_or_else(|| error.to_string()),
        other => other.to_string(),
    }
}
