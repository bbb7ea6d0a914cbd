use chat_api::{StreamDecoder, StreamEvent, ToolCallDelta};
use pretty_assertions::assert_eq;

#[test]
fn chunked_byte_stream_decodes_like_a_single_body() {
    let body = concat!(
        "data: {\"content\":\"Hel\"}\n\n",
        "data: {\"tool_call\":{\"id\":\"t1\",\"name\":\"search\",\"arguments\":\"{\\\"q\\\":1}\"}}\n\n",
        "data: {\"tool_call_id\":\"t1\",\"result\":\"ok\"}\n\n",
        "data: {\"content\":\"Hello\"}\n\n",
        "data: [DONE]\n\n",
    );
    let whole = StreamDecoder::parse_frames(body);

    for size in [1, 3, 7, 16] {
        let mut decoder = StreamDecoder::default();
        let mut events = Vec::new();
        for chunk in body.as_bytes().chunks(size) {
            events.extend(decoder.feed(chunk));
        }
        events.extend(decoder.finish());
        assert_eq!(events, whole, "chunk size {size}");
    }

    assert_eq!(
        whole,
        vec![
            StreamEvent::text("Hel"),
            StreamEvent::ToolCalls {
                calls: vec![ToolCallDelta::new("t1")
                    .with_name("search")
                    .with_arguments("{\"q\":1}")],
            },
            StreamEvent::tool_result("t1", "ok"),
            StreamEvent::text("Hello"),
        ]
    );
}

#[test]
fn malformed_payload_is_skipped_and_decoding_continues() {
    let events = StreamDecoder::parse_frames(concat!(
        "data: {\"content\":\"a\"\n\n",
        "data: {\"content\":\"b\"}\n\n",
    ));
    assert_eq!(events, vec![StreamEvent::text("b")]);
}

#[test]
fn crlf_line_endings_are_accepted() {
    let events = StreamDecoder::parse_frames("data: {\"content\":\"x\"}\r\n\r\n");
    assert_eq!(events, vec![StreamEvent::text("x")]);
}

#[test]
fn lines_without_known_fields_are_ignored() {
    let events = StreamDecoder::parse_frames(concat!(
        ": keep-alive comment\n",
        "id: 42\n",
        "retry: 1000\n",
        "data: {\"content\":\"y\"}\n",
    ));
    assert_eq!(events, vec![StreamEvent::text("y")]);
}
