// Copyright 2026 The Thinkgate Project
// SPDX-License-Identifier: Apache-2.0

// Stream transformer
//
// Consumes the backend byte stream, runs reassembly → decode → merge, and
// re-emits client-facing frames: `data: {...}\n\n` per delta, closing with
// `data: [DONE]\n\n`. Strictly FIFO; the whole pipeline runs on one
// spawned task, so the pending buffer and merger state need no locking.

use super::decoder::{decode_frame, DeltaEvent, Event, DONE_SENTINEL};
use super::framing::FrameReassembler;
use super::merger::{ChannelMerger, ReasoningDisplay};
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};

/// Transforms a backend SSE stream into a client-facing SSE stream.
pub struct StreamTransformer {
    display: ReasoningDisplay,
}

impl StreamTransformer {
    pub fn new(display: ReasoningDisplay) -> Self {
        Self { display }
    }

    /// Run the pipeline over an input byte stream.
    ///
    /// Upstream errors end the output stream without an error frame; the
    /// connection simply closes. (The non-streaming path returns a JSON
    /// error payload instead — a deliberate asymmetry, see `upstream`.)
    /// If the client disconnects, sends fail and the task returns,
    /// dropping — and thereby aborting — the upstream stream.
    pub fn transform<E>(
        &self,
        mut input: impl Stream<Item = Result<Bytes, E>> + Unpin + Send + 'static,
    ) -> impl Stream<Item = Bytes>
    where
        E: std::fmt::Display + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<Bytes>(64);
        let display = self.display;

        tokio::spawn(async move {
            let mut reassembler = FrameReassembler::new();
            let mut merger = ChannelMerger::new(display);

            while let Some(chunk) = input.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        tracing::warn!(error = %e, "upstream stream error; closing client stream");
                        return;
                    }
                };

                // Raw bytes go straight to the reassembler: a chunk boundary
                // may fall inside a multibyte UTF-8 sequence, so decoding
                // happens per complete line, never per chunk.
                for frame in reassembler.push(&chunk) {
                    match decode_frame(&frame) {
                        Some(Event::Terminal) => {
                            let _ = tx
                                .send(Bytes::from(format!("data: {DONE_SENTINEL}\n\n")))
                                .await;
                            // No frame after the terminal is processed.
                            return;
                        }
                        Some(Event::Delta(delta)) => {
                            let text = merger.merge(&delta);
                            let payload = rewrite_payload(delta, text);
                            if tx
                                .send(Bytes::from(format!("data: {payload}\n\n")))
                                .await
                                .is_err()
                            {
                                return; // Client disconnected
                            }
                        }
                        None => {} // blank / comment / malformed — skip
                    }
                }
            }
            // Input ended without [DONE]; any unterminated bytes left in
            // the reassembler cannot form a frame and are discarded.
        });

        ReceiverStream::new(rx)
    }
}

/// Rewrite one backend chunk into the outbound shape: the reasoning field
/// is removed and the merged text overwrites the single content field.
/// All other metadata (id, model, usage, finish_reason) passes through.
fn rewrite_payload(delta: DeltaEvent, text: String) -> serde_json::Value {
    let mut payload = delta.payload;

    if let Some(d) = payload
        .get_mut("choices")
        .and_then(|c| c.get_mut(0))
        .and_then(|c| c.get_mut("delta"))
        .and_then(|d| d.as_object_mut())
    {
        d.remove("reasoning_content");
        d.insert("content".to_string(), serde_json::Value::String(text));
    }

    payload
}
