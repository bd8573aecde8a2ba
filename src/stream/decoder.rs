// Copyright 2026 The Thinkgate Project
// SPDX-License-Identifier: Apache-2.0

// Frame decoding
//
// Classifies one complete SSE line into a typed event. Stateless and
// synchronous: frames arrive already newline-complete, so a JSON parse
// failure here means the upstream event is genuinely malformed, not
// partially received. Malformed frames are dropped, never surfaced.

/// SSE data-line marker.
pub(crate) const DATA_PREFIX: &str = "data:";

/// Literal sentinel ending an OpenAI-style stream.
pub(crate) const DONE_SENTINEL: &str = "[DONE]";

/// One incremental update from the backend.
///
/// The backend splits generated text across two channels: `reasoning`
/// (the model's chain of thought, `delta.reasoning_content` on the wire)
/// and `answer` (the final response, `delta.content`). Either or both may
/// be absent on any given event.
#[derive(Debug, Clone, PartialEq)]
pub struct DeltaEvent {
    pub reasoning: Option<String>,
    pub answer: Option<String>,
    /// The full parsed chunk, retained so the re-emitter can preserve
    /// id/model/usage metadata when rewriting the delta.
    pub payload: serde_json::Value,
}

/// A decoded frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// `data: [DONE]` — end of stream.
    Terminal,
    /// A chunk carrying a `choices[0].delta` object.
    Delta(DeltaEvent),
}

/// Decode one frame. Returns `None` for anything that produces no output
/// event: blank lines, SSE comments, non-data lines, malformed JSON, and
/// chunks without a `choices[0].delta`.
pub fn decode_frame(frame: &str) -> Option<Event> {
    let trimmed = frame.trim();
    if trimmed.is_empty() {
        return None;
    }

    let data = trimmed.strip_prefix(DATA_PREFIX)?.trim();

    if data == DONE_SENTINEL {
        return Some(Event::Terminal);
    }

    // Frames are newline-complete by construction, so a failure here is a
    // genuinely malformed upstream event. Drop it; the stream continues.
    let payload: serde_json::Value = serde_json::from_str(data).ok()?;

    let delta = payload.get("choices").and_then(|c| c.get(0))?.get("delta")?;

    let reasoning = delta
        .get("reasoning_content")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    let answer = delta
        .get("content")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    Some(Event::Delta(DeltaEvent {
        reasoning,
        answer,
        payload,
    }))
}
