// Copyright 2026 The Thinkgate Project
// SPDX-License-Identifier: Apache-2.0

// Frame reassembly
//
// The backend transport delivers bytes with no alignment to SSE line
// boundaries — not even UTF-8 character boundaries. The reassembler owns
// the single pending buffer and turns fragments into complete lines.

/// Reassembles newline-delimited frames from arbitrarily split fragments.
///
/// Invariants:
/// - A line is never emitted before its `\n` terminator has arrived.
/// - No byte is dropped or duplicated across fragment boundaries.
/// - After each `push`, the buffer holds at most one incomplete line.
///
/// The buffer is raw bytes and splitting happens on `b'\n'`: a multibyte
/// UTF-8 character split across two fragments stays intact, because text
/// decoding only ever sees complete lines.
///
/// If the stream ends while bytes remain buffered, those bytes are
/// discarded: they cannot form a complete frame. There is deliberately no
/// flush method.
#[derive(Debug, Default)]
pub struct FrameReassembler {
    pending: Vec<u8>,
}

impl FrameReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment and drain every complete line, in arrival order.
    ///
    /// The final segment after the last `\n` (possibly empty, possibly
    /// mid-character) is retained as the new pending buffer.
    pub fn push(&mut self, fragment: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(fragment);

        let mut frames = Vec::new();
        while let Some(newline_pos) = self.pending.iter().position(|&b| b == b'\n') {
            let rest = self.pending.split_off(newline_pos + 1);
            let mut line = std::mem::replace(&mut self.pending, rest);
            line.pop(); // the terminator itself
            frames.push(String::from_utf8_lossy(&line).into_owned());
        }
        frames
    }

    /// Bytes currently held back waiting for a terminator.
    #[cfg(test)]
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }
}
