use std::collections::{HashMap, HashSet};

use chat_api::Attachment;
use convo_stream::ledger::parse_arguments;
use convo_stream::message::now_rfc3339;
use convo_stream::{ContentPart, Message, MessageStatus, Role, ToolCallPart};
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::warn;

use crate::error::HistoryError;
use crate::schema::{
    Transcript, TranscriptMessage, ROLE_ASSISTANT, ROLE_SYSTEM, ROLE_TOOL, ROLE_USER,
};

struct ToolOutcome {
    result: Value,
    attachments: Option<Vec<Attachment>>,
}

pub fn parse_transcript(body: &str) -> Result<Transcript, HistoryError> {
    Ok(serde_json::from_str(body)?)
}

/// Convert a persisted transcript into the message shape a finished stream
/// leaves behind.
///
/// `tool` messages are folded into the assistant tool-call parts they answer.
/// An assistant message that only carries tool calls is merged into the next
/// assistant text message, and attachment metadata that no tool result
/// accounts for becomes an `attach_to_response` call.
pub fn load_messages(transcript: &Transcript) -> Result<Vec<Message>, HistoryError> {
    let results = collect_tool_results(&transcript.messages)?;
    let id_prefix = transcript.id.as_deref().unwrap_or("history");

    let mut loaded = Vec::new();
    let mut tool_only: Option<Message> = None;

    for (index, entry) in transcript.messages.iter().enumerate() {
        let created_at = validated_timestamp(index, entry)?;
        let id = entry
            .storage_id()
            .unwrap_or_else(|| format!("{id_prefix}-{index}"));

        match entry.role.as_str() {
            ROLE_TOOL => {}
            ROLE_USER | ROLE_SYSTEM => {
                loaded.extend(tool_only.take().map(finalize_assistant));
                let role = if entry.role == ROLE_USER {
                    Role::User
                } else {
                    Role::System
                };
                let content = entry
                    .text()
                    .filter(|text| !text.is_empty())
                    .map(ContentPart::text)
                    .into_iter()
                    .collect();
                let mut message = Message::new(role, content)
                    .with_id(id)
                    .with_created_at(created_at)
                    .with_status(MessageStatus::Complete);
                message.attachments = entry.attachments.clone();
                loaded.push(message);
            }
            ROLE_ASSISTANT => {
                let content = assistant_content(entry, &results);
                let mut message = Message::new(Role::Assistant, content)
                    .with_id(id)
                    .with_created_at(created_at);

                if message.has_text() {
                    if let Some(mut pending) = tool_only.take() {
                        let mut content: Vec<ContentPart> = pending
                            .take_tool_calls()
                            .into_iter()
                            .map(ContentPart::ToolCall)
                            .collect();
                        content.append(&mut message.content);
                        message.content = content;
                    }
                    loaded.push(finalize_assistant(message));
                } else if message.has_tool_calls() {
                    if let Some(mut pending) = tool_only.take() {
                        for part in message.take_tool_calls() {
                            pending.upsert_tool_call(part);
                        }
                        message = pending;
                    }
                    tool_only = Some(message);
                }
            }
            other => {
                return Err(HistoryError::UnsupportedRole {
                    index,
                    role: other.to_owned(),
                });
            }
        }
    }

    loaded.extend(tool_only.take().map(finalize_assistant));
    Ok(loaded)
}

fn collect_tool_results(
    messages: &[TranscriptMessage],
) -> Result<HashMap<String, ToolOutcome>, HistoryError> {
    let known_calls: HashSet<&str> = messages
        .iter()
        .filter(|message| message.role == ROLE_ASSISTANT)
        .flat_map(|message| message.tool_calls.iter().map(|call| call.id.as_str()))
        .collect();

    let mut results = HashMap::new();
    for (index, message) in messages.iter().enumerate() {
        if message.role != ROLE_TOOL {
            continue;
        }

        let tool_call_id = message
            .tool_call_id
            .as_deref()
            .ok_or(HistoryError::MalformedToolMessage { index })?;
        if !known_calls.contains(tool_call_id) {
            warn!(index, tool_call_id, "skipping tool message without matching call");
            continue;
        }

        results
            .entry(tool_call_id.to_owned())
            .or_insert_with(|| ToolOutcome {
                result: tool_result_value(message),
                attachments: (!message.attachments.is_empty())
                    .then(|| message.attachments.clone()),
            });
    }

    Ok(results)
}

/// Stored tool output is usually text; JSON objects and arrays serialized
/// into it are decoded so the result matches what the stream delivered.
fn tool_result_value(message: &TranscriptMessage) -> Value {
    match message.content.clone() {
        None => Value::Null,
        Some(Value::String(text)) => match serde_json::from_str::<Value>(&text) {
            Ok(decoded @ (Value::Object(_) | Value::Array(_))) => decoded,
            _ => Value::String(text),
        },
        Some(other) => other,
    }
}

fn assistant_content(
    entry: &TranscriptMessage,
    results: &HashMap<String, ToolOutcome>,
) -> Vec<ContentPart> {
    let mut parts: Vec<ToolCallPart> = entry
        .tool_calls
        .iter()
        .map(|call| {
            let args_text = call.arguments_text();
            let outcome = results.get(&call.id);
            ToolCallPart {
                tool_call_id: call.id.clone(),
                tool_name: call.tool_name(),
                args: parse_arguments(&args_text),
                args_text,
                result: outcome.map(|outcome| outcome.result.clone()),
                attachments: outcome.and_then(|outcome| outcome.attachments.clone()),
            }
        })
        .collect();

    if let Some(synthetic) = implicit_attachments(entry, &parts) {
        parts.push(synthetic);
    }

    let mut content: Vec<ContentPart> = parts.into_iter().map(ContentPart::ToolCall).collect();
    if let Some(text) = entry.text().filter(|text| !text.is_empty()) {
        content.push(ContentPart::text(text));
    }
    content
}

/// Attachments on the message that no tool result already carries.
fn implicit_attachments(
    entry: &TranscriptMessage,
    parts: &[ToolCallPart],
) -> Option<ToolCallPart> {
    let covered: HashSet<&str> = parts
        .iter()
        .filter_map(|part| part.attachments.as_ref())
        .flatten()
        .map(|attachment| attachment.id.as_str())
        .collect();

    let mut ids: Vec<String> = Vec::new();
    let declared = entry
        .attachment_ids
        .iter()
        .chain(entry.attachments.iter().map(|attachment| &attachment.id));
    for id in declared {
        if !covered.contains(id.as_str()) && !ids.contains(id) {
            ids.push(id.clone());
        }
    }
    if ids.is_empty() {
        return None;
    }

    let attachments = ids
        .iter()
        .map(|id| {
            entry
                .attachments
                .iter()
                .find(|attachment| attachment.id == *id)
                .cloned()
                .unwrap_or_else(|| Attachment::new(id.clone()))
        })
        .collect();
    Some(ToolCallPart::synthetic_attachments(&ids, attachments))
}

fn finalize_assistant(message: Message) -> Message {
    let status = if message.all_tools_resolved() {
        MessageStatus::Complete
    } else {
        MessageStatus::Incomplete
    };
    message.with_status(status)
}

fn validated_timestamp(index: usize, entry: &TranscriptMessage) -> Result<String, HistoryError> {
    match entry.created_at.as_deref() {
        None => Ok(now_rfc3339()),
        Some(value) => {
            if OffsetDateTime::parse(value, &Rfc3339).is_err() {
                return Err(HistoryError::invalid_timestamp(index, "created_at", value));
            }
            Ok(value.to_owned())
        }
    }
}
