// Copyright 2026 The Thinkgate Project
// SPDX-License-Identifier: Apache-2.0

// Streaming response transformer
//
// Responsibilities:
// - Reassemble backend SSE bytes into complete lines across arbitrary
//   chunk boundaries
// - Decode each data frame into a typed event (delta / terminal / skip)
// - Merge the backend's two-channel delta (reasoning_content + content)
//   into the single client-facing content channel
// - Re-emit OpenAI-compliant `data: {...}\n\n` frames, ending with
//   `data: [DONE]\n\n`

mod decoder;
mod framing;
mod merger;
mod processor;

pub use decoder::{decode_frame, DeltaEvent, Event};
pub use framing::FrameReassembler;
pub use merger::{BlockState, ChannelMerger, ReasoningDisplay};
pub use processor::StreamTransformer;

#[cfg(test)]
mod tests;
