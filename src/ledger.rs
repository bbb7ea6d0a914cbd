use chat_api::{Attachment, StreamEvent, ToolCallDelta};
use serde_json::{json, Value};
use tracing::debug;

use crate::message::ToolCallPart;

/// Accumulated state of one tool invocation within a turn.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallLedgerEntry {
    pub tool_call_id: String,
    pub tool_name: String,
    arguments_text: String,
    finalized: bool,
    pub result: Option<Value>,
    pub attachments: Option<Vec<Attachment>>,
}

impl ToolCallLedgerEntry {
    fn new(tool_call_id: &str) -> Self {
        Self {
            tool_call_id: tool_call_id.to_owned(),
            tool_name: String::new(),
            arguments_text: String::new(),
            finalized: false,
            result: None,
            attachments: None,
        }
    }

    pub fn arguments_text(&self) -> &str {
        &self.arguments_text
    }

    /// True once the accumulated argument text parsed as JSON.
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Parsed arguments; text that is not (yet) JSON is wrapped as
    /// `{"raw": text}`.
    pub fn arguments(&self) -> Value {
        parse_arguments(&self.arguments_text)
    }

    pub fn to_part(&self) -> ToolCallPart {
        ToolCallPart {
            tool_call_id: self.tool_call_id.clone(),
            tool_name: self.tool_name.clone(),
            args: self.arguments(),
            args_text: self.arguments_text.clone(),
            result: self.result.clone(),
            attachments: self.attachments.clone(),
        }
    }

    fn merge(&mut self, delta: &ToolCallDelta) {
        if let Some(name) = delta.name.as_deref().filter(|name| !name.is_empty()) {
            self.tool_name = name.to_owned();
        }

        let Some(fragment) = delta.arguments.as_deref() else {
            return;
        };

        if self.finalized {
            if serde_json::from_str::<Value>(fragment).is_ok() {
                self.arguments_text = fragment.to_owned();
            } else {
                debug!(
                    tool_call_id = %self.tool_call_id,
                    "ignoring argument fragment for finalized tool call"
                );
            }
            return;
        }

        self.arguments_text.push_str(fragment);
        self.finalized = serde_json::from_str::<Value>(&self.arguments_text).is_ok();
    }
}

pub fn parse_arguments(text: &str) -> Value {
    if text.trim().is_empty() {
        return json!({});
    }
    serde_json::from_str(text).unwrap_or_else(|_| json!({ "raw": text }))
}

/// Tool invocations of one turn, ordered by first sighting of their id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolCallLedger {
    entries: Vec<ToolCallLedgerEntry>,
}

impl ToolCallLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[ToolCallLedgerEntry] {
        &self.entries
    }

    pub fn get(&self, tool_call_id: &str) -> Option<&ToolCallLedgerEntry> {
        self.entries
            .iter()
            .find(|entry| entry.tool_call_id == tool_call_id)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fold a sequence of stream events into the ledger. Events that carry no
    /// tool-call state are ignored.
    pub fn apply<'a>(
        &mut self,
        events: impl IntoIterator<Item = &'a StreamEvent>,
    ) -> &[ToolCallLedgerEntry] {
        for event in events {
            match event {
                StreamEvent::ToolCalls { calls } => {
                    self.apply_calls(calls);
                }
                StreamEvent::ToolResult {
                    tool_call_id,
                    result,
                    attachments,
                } => {
                    self.apply_result(tool_call_id, result.clone(), attachments.clone());
                }
                StreamEvent::SyntheticAttachments {
                    attachment_ids,
                    attachments,
                } => {
                    self.insert_resolved(&ToolCallPart::synthetic_attachments(
                        attachment_ids,
                        attachments.clone(),
                    ));
                }
                _ => {}
            }
        }
        &self.entries
    }

    /// Start or update calls. Returns the ids touched, in batch order.
    pub fn apply_calls(&mut self, calls: &[ToolCallDelta]) -> Vec<String> {
        calls
            .iter()
            .map(|delta| {
                self.entry_mut(&delta.id).merge(delta);
                delta.id.clone()
            })
            .collect()
    }

    /// Record the first result for a known call. Unknown ids and repeated
    /// results are ignored; returns whether the ledger changed.
    pub fn apply_result(
        &mut self,
        tool_call_id: &str,
        result: Value,
        attachments: Option<Vec<Attachment>>,
    ) -> bool {
        let Some(entry) = self
            .entries
            .iter_mut()
            .find(|entry| entry.tool_call_id == tool_call_id)
        else {
            debug!(tool_call_id, "ignoring result for unknown tool call");
            return false;
        };

        if entry.result.is_some() {
            debug!(tool_call_id, "ignoring repeated tool result");
            return false;
        }

        entry.result = Some(result);
        entry.attachments = attachments;
        true
    }

    /// Insert an already complete call. Existing ids are left untouched.
    pub fn insert_resolved(&mut self, part: &ToolCallPart) -> bool {
        if self.get(&part.tool_call_id).is_some() {
            return false;
        }

        self.entries.push(ToolCallLedgerEntry {
            tool_call_id: part.tool_call_id.clone(),
            tool_name: part.tool_name.clone(),
            arguments_text: part.args_text.clone(),
            finalized: true,
            result: part.result.clone(),
            attachments: part.attachments.clone(),
        });
        true
    }

    fn entry_mut(&mut self, tool_call_id: &str) -> &mut ToolCallLedgerEntry {
        let index = match self
            .entries
            .iter()
            .position(|entry| entry.tool_call_id == tool_call_id)
        {
            Some(index) => index,
            None => {
                self.entries.push(ToolCallLedgerEntry::new(tool_call_id));
                self.entries.len() - 1
            }
        };
        &mut self.entries[index]
    }
}

#[cfg(test)]
mod tests {
    use chat_api::{StreamEvent, ToolCallDelta};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::ToolCallLedger;

    fn calls(deltas: Vec<ToolCallDelta>) -> StreamEvent {
        StreamEvent::ToolCalls { calls: deltas }
    }

    #[test]
    fn argument_fragments_concatenate_until_parseable() {
        let mut ledger = ToolCallLedger::new();
        ledger.apply(&[
            calls(vec![ToolCallDelta::new("t1")
                .with_name("search")
                .with_arguments("{\"q\":")]),
            calls(vec![ToolCallDelta::new("t1").with_arguments("\"rust\"}")]),
        ]);

        let entry = ledger.get("t1").expect("t1 entry");
        assert!(entry.is_finalized());
        assert_eq!(entry.tool_name, "search");
        assert_eq!(entry.arguments(), json!({"q": "rust"}));
    }

    #[test]
    fn partial_arguments_surface_as_raw() {
        let mut ledger = ToolCallLedger::new();
        ledger.apply(&[calls(vec![ToolCallDelta::new("t1").with_arguments("{\"q\":")])]);

        assert_eq!(
            ledger.get("t1").expect("t1 entry").arguments(),
            json!({"raw": "{\"q\":"})
        );
    }

    #[test]
    fn finalized_arguments_change_only_by_valid_replacement() {
        let mut ledger = ToolCallLedger::new();
        ledger.apply(&[
            calls(vec![ToolCallDelta::new("t1").with_arguments("{\"a\":1}")]),
            calls(vec![ToolCallDelta::new("t1").with_arguments("garbage")]),
        ]);
        assert_eq!(ledger.get("t1").expect("t1").arguments(), json!({"a": 1}));

        ledger.apply(&[calls(vec![ToolCallDelta::new("t1").with_arguments("{\"a\":1}")])]);
        assert_eq!(ledger.get("t1").expect("t1").arguments_text(), "{\"a\":1}");

        ledger.apply(&[calls(vec![ToolCallDelta::new("t1").with_arguments("{\"a\":2}")])]);
        assert_eq!(ledger.get("t1").expect("t1").arguments(), json!({"a": 2}));
    }

    #[test]
    fn entries_keep_first_seen_order() {
        let mut ledger = ToolCallLedger::new();
        ledger.apply(&[
            calls(vec![ToolCallDelta::new("b"), ToolCallDelta::new("a")]),
            calls(vec![ToolCallDelta::new("b").with_name("late")]),
        ]);

        let ids: Vec<&str> = ledger
            .entries()
            .iter()
            .map(|entry| entry.tool_call_id.as_str())
            .collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn repeated_result_is_ignored() {
        let mut ledger = ToolCallLedger::new();
        ledger.apply(&[calls(vec![ToolCallDelta::new("t1")])]);

        assert!(ledger.apply_result("t1", json!("ok"), None));
        let after_first = ledger.clone();
        assert!(!ledger.apply_result("t1", json!("other"), None));
        assert_eq!(ledger, after_first);
    }

    #[test]
    fn result_for_unknown_id_is_a_no_op() {
        let mut ledger = ToolCallLedger::new();
        ledger.apply(&[
            calls(vec![ToolCallDelta::new("t1").with_name("x")]),
            StreamEvent::tool_result("t2", "ok"),
        ]);

        assert_eq!(ledger.entries().len(), 1);
        assert!(ledger.get("t2").is_none());
        assert_eq!(ledger.get("t1").expect("t1").result, None);
    }
}
