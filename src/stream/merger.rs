// Copyright 2026 The Thinkgate Project
// SPDX-License-Identifier: Apache-2.0

// Channel merging
//
// The backend delivers reasoning and final-answer text on separate delta
// fields; the client protocol has a single content channel. The merger is
// the only stateful piece of the transformer: one two-state machine
// tracking whether a reasoning block is currently open on the client side.

use super::decoder::DeltaEvent;

/// Marker opening an inline reasoning block.
pub const REASONING_OPEN: &str = "<think>";

/// Marker closing an inline reasoning block.
pub const REASONING_CLOSE: &str = "</think>";

/// Whether reasoning text is exposed to the client or discarded.
///
/// Fixed per merger instance (injected at construction). Promoting this to
/// a per-request parameter is a possible future change; today it is
/// deployment-level configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasoningDisplay {
    /// Drop reasoning text entirely; only `content` reaches the client.
    Hide,
    /// Emit reasoning inline, wrapped in `<think>`/`</think>` markers.
    Show,
}

/// Whether a reasoning block is currently open on the client side.
///
/// `Open` means an open marker has been emitted and no matching close
/// marker has followed yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockState {
    Closed,
    Open,
}

/// Merges two-channel deltas into single-channel output text.
#[derive(Debug)]
pub struct ChannelMerger {
    display: ReasoningDisplay,
    state: BlockState,
}

impl ChannelMerger {
    /// Create a merger for one outbound stream. State starts `Closed`.
    pub fn new(display: ReasoningDisplay) -> Self {
        Self {
            display,
            state: BlockState::Closed,
        }
    }

    /// Produce the outbound text for one delta, advancing the state.
    ///
    /// When both channels are present in the same event the reasoning
    /// transition applies first, then the answer transition, and the two
    /// outputs are concatenated — up to one open marker and one close
    /// marker in the same emitted text.
    ///
    /// A reasoning block left open at stream end is never force-closed:
    /// the terminal frame carries no synthetic close marker. This mirrors
    /// the backend's observable behavior and is covered by tests.
    pub fn merge(&mut self, delta: &DeltaEvent) -> String {
        match self.display {
            ReasoningDisplay::Hide => {
                // Reasoning is discarded; the state machine never engages.
                delta.answer.clone().unwrap_or_default()
            }
            ReasoningDisplay::Show => {
                let mut out = String::new();

                if let Some(reasoning) = &delta.reasoning {
                    match self.state {
                        BlockState::Closed => {
                            out.push_str(REASONING_OPEN);
                            out.push_str(reasoning);
                            self.state = BlockState::Open;
                        }
                        BlockState::Open => out.push_str(reasoning),
                    }
                }

                if let Some(answer) = &delta.answer {
                    match self.state {
                        BlockState::Open => {
                            out.push_str(REASONING_CLOSE);
                            out.push_str(answer);
                            self.state = BlockState::Closed;
                        }
                        BlockState::Closed => out.push_str(answer),
                    }
                }

                out
            }
        }
    }

    pub fn state(&self) -> BlockState {
        self.state
    }
}
