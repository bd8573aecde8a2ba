// Copyright 2026 The Thinkgate Project
// SPDX-License-Identifier: Apache-2.0

// Tests for the streaming response transformer.
//
// Covered:
//  1. Reassembly across arbitrary fragment boundaries (no loss, no dupes)
//  2. Trailing unterminated bytes held back, then discarded at stream end
//  3. Frame decoding: data/terminal/blank/comment/malformed/missing-delta
//  4. Channel merging under show and hide policies, including the
//     both-channels-in-one-event and dangling-open-block cases
//  5. End-to-end transform: re-emitted framing, metadata preservation,
//     [DONE] halt, malformed-frame tolerance, silent upstream-error close

use super::merger::{REASONING_CLOSE, REASONING_OPEN};
use super::*;
use bytes::Bytes;
use std::convert::Infallible;
use tokio_stream::StreamExt;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn delta_chunk(reasoning: Option<&str>, answer: Option<&str>) -> String {
    let mut delta = serde_json::Map::new();
    if let Some(r) = reasoning {
        delta.insert("reasoning_content".into(), r.into());
    }
    if let Some(a) = answer {
        delta.insert("content".into(), a.into());
    }
    serde_json::json!({
        "id": "chatcmpl-1",
        "model": "deepseek-r1",
        "choices": [{"index": 0, "delta": delta, "finish_reason": null}]
    })
    .to_string()
}

fn delta_event(reasoning: Option<&str>, answer: Option<&str>) -> DeltaEvent {
    match decode_frame(&format!("data: {}", delta_chunk(reasoning, answer))) {
        Some(Event::Delta(d)) => d,
        other => panic!("expected delta event, got {other:?}"),
    }
}

/// Build an in-memory byte stream from raw fragments (no added newlines,
/// so tests control fragmentation exactly).
fn fragment_stream(
    fragments: Vec<String>,
) -> impl tokio_stream::Stream<Item = Result<Bytes, Infallible>> + Unpin + Send {
    byte_fragment_stream(fragments.into_iter().map(String::into_bytes).collect())
}

/// Like `fragment_stream`, but raw bytes: fragments need not be valid
/// UTF-8 on their own, so boundaries can fall inside a character.
fn byte_fragment_stream(
    fragments: Vec<Vec<u8>>,
) -> impl tokio_stream::Stream<Item = Result<Bytes, Infallible>> + Unpin + Send {
    let chunks: Vec<Result<Bytes, Infallible>> =
        fragments.into_iter().map(|f| Ok(Bytes::from(f))).collect();
    tokio_stream::iter(chunks)
}

/// Collect all transformer output into one string.
async fn collect_output(stream: impl tokio_stream::Stream<Item = Bytes> + Unpin) -> String {
    let mut output = String::new();
    tokio::pin!(stream);
    while let Some(chunk) = stream.next().await {
        output.push_str(&String::from_utf8_lossy(&chunk));
    }
    output
}

/// Parse every emitted `data:` payload except the terminal sentinel, and
/// return the content text of each.
fn emitted_contents(output: &str) -> Vec<String> {
    output
        .split("\n\n")
        .filter(|s| !s.is_empty())
        .filter_map(|frame| frame.strip_prefix("data: "))
        .filter(|data| *data != "[DONE]")
        .map(|data| {
            let json: serde_json::Value =
                serde_json::from_str(data).expect("emitted frame should be valid JSON");
            json["choices"][0]["delta"]["content"]
                .as_str()
                .unwrap_or("")
                .to_string()
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Frame reassembly
// ---------------------------------------------------------------------------

#[test]
fn whole_lines_emitted_in_order() {
    let mut r = FrameReassembler::new();
    let frames = r.push(b"a\nb\nc\n");
    assert_eq!(frames, vec!["a", "b", "c"]);
    assert_eq!(r.pending(), b"");
}

#[test]
fn line_split_across_fragments_reassembled() {
    let mut r = FrameReassembler::new();
    assert!(r.push(b"data: {\"choi").is_empty());
    let frames = r.push(b"ces\":[]}\n");
    assert_eq!(frames, vec!["data: {\"choices\":[]}"]);
}

#[test]
fn no_loss_under_byte_granular_fragmentation() {
    // One byte per fragment, including mid-character splits in "é" and "日".
    let original = "first liné\nsecond line\n日本語 line\n";
    let mut r = FrameReassembler::new();
    let mut frames = Vec::new();
    for &b in original.as_bytes() {
        frames.extend(r.push(&[b]));
    }
    assert_eq!(frames, vec!["first liné", "second line", "日本語 line"]);
    assert_eq!(r.pending(), b"");
}

#[test]
fn multibyte_char_split_across_fragments_survives() {
    // "é" is 0xC3 0xA9; a fragment boundary between the two bytes must not
    // corrupt the decoded line.
    let mut r = FrameReassembler::new();
    assert!(r.push(b"caf\xC3").is_empty());
    let frames = r.push(b"\xA9\n");
    assert_eq!(frames, vec!["café"]);
}

#[test]
fn unterminated_tail_is_held_back() {
    let mut r = FrameReassembler::new();
    let frames = r.push(b"complete\npartial");
    assert_eq!(frames, vec!["complete"]);
    assert_eq!(r.pending(), b"partial");
}

#[test]
fn empty_lines_are_frames_too() {
    // SSE event separators arrive as empty lines; they must not be eaten
    // by the reassembler (the decoder skips them).
    let mut r = FrameReassembler::new();
    let frames = r.push(b"data: x\n\ndata: y\n");
    assert_eq!(frames, vec!["data: x", "", "data: y"]);
}

// ---------------------------------------------------------------------------
// Frame decoding
// ---------------------------------------------------------------------------

#[test]
fn data_frame_decodes_both_channels() {
    let frame = format!("data: {}", delta_chunk(Some("hmm"), Some("hi")));
    match decode_frame(&frame) {
        Some(Event::Delta(d)) => {
            assert_eq!(d.reasoning.as_deref(), Some("hmm"));
            assert_eq!(d.answer.as_deref(), Some("hi"));
        }
        other => panic!("expected delta, got {other:?}"),
    }
}

#[test]
fn done_sentinel_decodes_as_terminal() {
    assert_eq!(decode_frame("data: [DONE]"), Some(Event::Terminal));
    assert_eq!(decode_frame("  data:[DONE]  "), Some(Event::Terminal));
}

#[test]
fn blank_and_comment_frames_are_skipped() {
    assert_eq!(decode_frame(""), None);
    assert_eq!(decode_frame("   "), None);
    assert_eq!(decode_frame(": keep-alive"), None);
    assert_eq!(decode_frame("event: ping"), None);
}

#[test]
fn malformed_json_is_dropped() {
    assert_eq!(decode_frame("data: {not json"), None);
}

#[test]
fn chunk_without_delta_is_skipped() {
    assert_eq!(decode_frame(r#"data: {"object":"ping"}"#), None);
    assert_eq!(decode_frame(r#"data: {"choices":[]}"#), None);
}

#[test]
fn empty_channel_strings_read_as_absent() {
    let frame = r#"data: {"choices":[{"delta":{"reasoning_content":"","content":""}}]}"#;
    match decode_frame(frame) {
        Some(Event::Delta(d)) => {
            assert_eq!(d.reasoning, None);
            assert_eq!(d.answer, None);
        }
        other => panic!("expected delta, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Channel merging
// ---------------------------------------------------------------------------

#[test]
fn show_policy_wraps_reasoning_in_markers() {
    // Sequence: {reasoning:"a"}, {reasoning:"b"}, {answer:"c"}
    let mut m = ChannelMerger::new(ReasoningDisplay::Show);
    assert_eq!(
        m.merge(&delta_event(Some("a"), None)),
        format!("{REASONING_OPEN}a")
    );
    assert_eq!(m.state(), BlockState::Open);
    assert_eq!(m.merge(&delta_event(Some("b"), None)), "b");
    assert_eq!(
        m.merge(&delta_event(None, Some("c"))),
        format!("{REASONING_CLOSE}c")
    );
    assert_eq!(m.state(), BlockState::Closed);
}

#[test]
fn hide_policy_discards_reasoning_and_never_opens() {
    let mut m = ChannelMerger::new(ReasoningDisplay::Hide);
    assert_eq!(m.merge(&delta_event(Some("a"), None)), "");
    assert_eq!(m.merge(&delta_event(Some("b"), None)), "");
    assert_eq!(m.merge(&delta_event(None, Some("c"))), "c");
    assert_eq!(m.state(), BlockState::Closed);
}

#[test]
fn both_channels_in_one_event_open_then_close() {
    let mut m = ChannelMerger::new(ReasoningDisplay::Show);
    assert_eq!(
        m.merge(&delta_event(Some("r"), Some("a"))),
        format!("{REASONING_OPEN}r{REASONING_CLOSE}a")
    );
    assert_eq!(m.state(), BlockState::Closed);
}

#[test]
fn both_channels_while_open_close_without_reopening() {
    let mut m = ChannelMerger::new(ReasoningDisplay::Show);
    m.merge(&delta_event(Some("x"), None));
    assert_eq!(
        m.merge(&delta_event(Some("r"), Some("a"))),
        format!("r{REASONING_CLOSE}a")
    );
    assert_eq!(m.state(), BlockState::Closed);
}

#[test]
fn answer_while_closed_passes_through_bare() {
    let mut m = ChannelMerger::new(ReasoningDisplay::Show);
    assert_eq!(m.merge(&delta_event(None, Some("plain"))), "plain");
    assert_eq!(m.state(), BlockState::Closed);
}

#[test]
fn empty_event_produces_empty_output_and_keeps_state() {
    let mut m = ChannelMerger::new(ReasoningDisplay::Show);
    m.merge(&delta_event(Some("x"), None));
    assert_eq!(m.merge(&delta_event(None, None)), "");
    assert_eq!(m.state(), BlockState::Open);
}

#[test]
fn marker_pairing_over_repeated_blocks() {
    // N reasoning blocks, each answered before the next: exactly N open
    // and N close markers, correctly nested.
    let mut m = ChannelMerger::new(ReasoningDisplay::Show);
    let mut combined = String::new();
    for _ in 0..3 {
        combined.push_str(&m.merge(&delta_event(Some("think"), None)));
        combined.push_str(&m.merge(&delta_event(None, Some("answer"))));
    }
    assert_eq!(combined.matches(REASONING_OPEN).count(), 3);
    assert_eq!(combined.matches(REASONING_CLOSE).count(), 3);
    assert_eq!(m.state(), BlockState::Closed);
}

// ---------------------------------------------------------------------------
// End-to-end transform
// ---------------------------------------------------------------------------

#[tokio::test]
async fn show_policy_stream_rewrites_deltas_and_terminates() {
    let input = fragment_stream(vec![
        format!("data: {}\n\n", delta_chunk(Some("a"), None)),
        format!("data: {}\n\n", delta_chunk(Some("b"), None)),
        format!("data: {}\n\n", delta_chunk(None, Some("c"))),
        "data: [DONE]\n\n".to_string(),
    ]);

    let output = collect_output(StreamTransformer::new(ReasoningDisplay::Show).transform(input)).await;

    assert_eq!(
        emitted_contents(&output),
        vec![
            format!("{REASONING_OPEN}a"),
            "b".to_string(),
            format!("{REASONING_CLOSE}c"),
        ]
    );
    assert!(output.ends_with("data: [DONE]\n\n"));
    assert!(
        !output.contains("reasoning_content"),
        "reasoning field must be removed from emitted frames"
    );
}

#[tokio::test]
async fn hide_policy_stream_emits_empty_content_for_reasoning_deltas() {
    let input = fragment_stream(vec![
        format!("data: {}\n\n", delta_chunk(Some("a"), None)),
        format!("data: {}\n\n", delta_chunk(Some("b"), None)),
        format!("data: {}\n\n", delta_chunk(None, Some("c"))),
        "data: [DONE]\n\n".to_string(),
    ]);

    let output = collect_output(StreamTransformer::new(ReasoningDisplay::Hide).transform(input)).await;

    assert_eq!(emitted_contents(&output), vec!["", "", "c"]);
    assert!(!output.contains(REASONING_OPEN));
}

#[tokio::test]
async fn arbitrary_fragmentation_does_not_change_output() {
    // One frame split mid-JSON across two reads.
    let input = fragment_stream(vec![
        "data: {\"choi".to_string(),
        "ces\":[{\"delta\":{\"content\":\"hi\"}}]}\n\ndata: [DONE]\n\n".to_string(),
    ]);

    let output = collect_output(StreamTransformer::new(ReasoningDisplay::Show).transform(input)).await;

    assert_eq!(emitted_contents(&output), vec!["hi"]);
    assert!(output.ends_with("data: [DONE]\n\n"));
}

#[tokio::test]
async fn chunk_boundary_inside_multibyte_char_does_not_corrupt_output() {
    // Transport chunks split "café" between the two bytes of "é". The
    // emitted content must carry the character intact, not replacements.
    let sse = format!("data: {}\n\ndata: [DONE]\n\n", delta_chunk(None, Some("café")));
    let bytes = sse.into_bytes();
    let split = bytes.iter().position(|&b| b == 0xC3).unwrap() + 1;
    let input = byte_fragment_stream(vec![bytes[..split].to_vec(), bytes[split..].to_vec()]);

    let output = collect_output(StreamTransformer::new(ReasoningDisplay::Show).transform(input)).await;

    assert_eq!(emitted_contents(&output), vec!["café"]);
    assert!(!output.contains('\u{FFFD}'), "got: {output}");
}

#[tokio::test]
async fn byte_granular_chunks_preserve_multibyte_text() {
    // Worst-case transport: one byte per chunk, with multibyte text in
    // both channels.
    let sse = format!(
        "data: {}\n\ndata: [DONE]\n\n",
        delta_chunk(Some("考える"), Some("réponse"))
    );
    let input = byte_fragment_stream(sse.into_bytes().iter().map(|&b| vec![b]).collect());

    let output = collect_output(StreamTransformer::new(ReasoningDisplay::Show).transform(input)).await;

    assert_eq!(
        emitted_contents(&output),
        vec![format!("{REASONING_OPEN}考える{REASONING_CLOSE}réponse")]
    );
    assert!(!output.contains('\u{FFFD}'), "got: {output}");
}

#[tokio::test]
async fn malformed_frame_skipped_without_disrupting_stream() {
    let input = fragment_stream(vec![
        format!("data: {}\n\n", delta_chunk(None, Some("before"))),
        "data: {broken json\n\n".to_string(),
        format!("data: {}\n\n", delta_chunk(None, Some("after"))),
        "data: [DONE]\n\n".to_string(),
    ]);

    let output = collect_output(StreamTransformer::new(ReasoningDisplay::Show).transform(input)).await;

    assert_eq!(emitted_contents(&output), vec!["before", "after"]);
}

#[tokio::test]
async fn frames_after_terminal_are_not_processed() {
    let input = fragment_stream(vec![
        format!("data: {}\n\n", delta_chunk(None, Some("kept"))),
        "data: [DONE]\n\n".to_string(),
        format!("data: {}\n\n", delta_chunk(None, Some("dropped"))),
    ]);

    let output = collect_output(StreamTransformer::new(ReasoningDisplay::Show).transform(input)).await;

    assert_eq!(emitted_contents(&output), vec!["kept"]);
    assert_eq!(output.matches("[DONE]").count(), 1);
    assert!(!output.contains("dropped"));
}

#[tokio::test]
async fn chunk_metadata_survives_the_rewrite() {
    let input = fragment_stream(vec![
        format!("data: {}\n\n", delta_chunk(None, Some("hi"))),
        "data: [DONE]\n\n".to_string(),
    ]);

    let output = collect_output(StreamTransformer::new(ReasoningDisplay::Show).transform(input)).await;

    let first = output
        .split("\n\n")
        .next()
        .and_then(|f| f.strip_prefix("data: "))
        .unwrap();
    let json: serde_json::Value = serde_json::from_str(first).unwrap();
    assert_eq!(json["id"], "chatcmpl-1");
    assert_eq!(json["model"], "deepseek-r1");
    assert_eq!(json["choices"][0]["finish_reason"], serde_json::Value::Null);
}

#[tokio::test]
async fn upstream_error_closes_stream_without_error_frame() {
    let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
        Ok(Bytes::from(format!(
            "data: {}\n\n",
            delta_chunk(None, Some("partial"))
        ))),
        Err(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "backend died",
        )),
    ];
    let input = tokio_stream::iter(chunks);

    let output = collect_output(StreamTransformer::new(ReasoningDisplay::Show).transform(input)).await;

    assert_eq!(emitted_contents(&output), vec!["partial"]);
    assert!(!output.contains("[DONE]"));
    assert!(!output.contains("error"));
}

#[tokio::test]
async fn dangling_open_block_is_not_force_closed() {
    // A stream that opens a reasoning block and ends without an answer.
    // The close marker is never synthesized; this is pinned behavior.
    let input = fragment_stream(vec![
        format!("data: {}\n\n", delta_chunk(Some("thinking..."), None)),
        "data: [DONE]\n\n".to_string(),
    ]);

    let output = collect_output(StreamTransformer::new(ReasoningDisplay::Show).transform(input)).await;

    assert!(output.contains(REASONING_OPEN));
    assert!(!output.contains(REASONING_CLOSE));
    assert!(output.ends_with("data: [DONE]\n\n"));
}

#[tokio::test]
async fn input_ending_without_terminal_just_ends() {
    // Unterminated trailing bytes in the reassembler are discarded.
    let input = fragment_stream(vec![
        format!("data: {}\n\n", delta_chunk(None, Some("hi"))),
        "data: {\"choices\":[{\"delta\":{\"content\":\"trunc".to_string(),
    ]);

    let output = collect_output(StreamTransformer::new(ReasoningDisplay::Show).transform(input)).await;

    assert_eq!(emitted_contents(&output), vec!["hi"]);
    assert!(!output.contains("trunc"));
    assert!(!output.contains("[DONE]"));
}
