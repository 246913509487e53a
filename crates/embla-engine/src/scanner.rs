// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde_json::Value;
use tracing::warn;

use crate::types::ToolCall;

const OPEN_MARKER: &str = "<tool_call>";
const CLOSE_MARKER: &str = "</tool_call>";

/// Output of feeding one decoded piece through the scanner.
#[derive(Debug, Clone, PartialEq)]
pub enum Scanned {
    /// Text outside any marker block, to be forwarded verbatim.
    Text(String),
    /// A marker block closed and its payload parsed.
    Call(ToolCall),
}

/// What remained in the scanner when generation ended.
#[derive(Debug, Default)]
pub struct ScannerFlush {
    /// Withheld text that turned out not to be a marker.
    pub text: Option<String>,
    /// A parseable call from a still-open buffer.
    pub call: Option<ToolCall>,
}

/// Detects `<tool_call>…</tool_call>` blocks in the decoded token stream.
///
/// The markers are plain text and may arrive split across token pieces, so
/// the scanner withholds any trailing run that is a prefix of the marker it
/// is currently looking for.  Text inside a block is buffered and never
/// forwarded; blocks are non-overlapping (an open marker must close before
/// another opens).
#[derive(Debug, Default)]
pub struct MarkerScanner {
    inside: bool,
    /// Text not yet classified (tail may be a partial marker).
    pending: String,
    /// Payload accumulated between markers.
    payload: String,
}

impl MarkerScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one decoded piece; returns the events it completes.
    pub fn push(&mut self, piece: &str) -> Vec<Scanned> {
        let mut out = Vec::new();
        self.pending.push_str(piece);
        loop {
            if self.inside {
                if let Some(idx) = self.pending.find(CLOSE_MARKER) {
                    self.payload.push_str(&self.pending[..idx]);
                    self.pending.drain(..idx + CLOSE_MARKER.len());
                    self.inside = false;
                    let payload = std::mem::take(&mut self.payload);
                    match parse_tool_call(&payload) {
                        Some(call) => out.push(Scanned::Call(call)),
                        None => warn!(payload = %payload, "discarding unparseable tool call"),
                    }
                } else {
                    let hold = partial_marker_len(&self.pending, CLOSE_MARKER);
                    let cut = self.pending.len() - hold;
                    self.payload.push_str(&self.pending[..cut]);
                    self.pending.drain(..cut);
                    return out;
                }
            } else if let Some(idx) = self.pending.find(OPEN_MARKER) {
                if idx > 0 {
                    out.push(Scanned::Text(self.pending[..idx].to_string()));
                }
                self.pending.drain(..idx + OPEN_MARKER.len());
                self.inside = true;
            } else {
                let hold = partial_marker_len(&self.pending, OPEN_MARKER);
                let cut = self.pending.len() - hold;
                if cut > 0 {
                    out.push(Scanned::Text(self.pending[..cut].to_string()));
                    self.pending.drain(..cut);
                }
                return out;
            }
        }
    }

    /// Drain the scanner at end of generation.
    ///
    /// An open buffer is parsed as a final tool call (the model hit
    /// end-of-generation before emitting the closing marker); withheld
    /// partial-marker text outside a block is returned as ordinary text.
    pub fn finish(&mut self) -> ScannerFlush {
        let mut flush = ScannerFlush::default();
        if self.inside {
            self.payload.push_str(&self.pending);
            self.pending.clear();
            self.inside = false;
            let payload = std::mem::take(&mut self.payload);
            match parse_tool_call(&payload) {
                Some(call) => flush.call = Some(call),
                None => warn!(payload = %payload, "discarding unparseable tool call at end of generation"),
            }
        } else if !self.pending.is_empty() {
            flush.text = Some(std::mem::take(&mut self.pending));
        }
        flush
    }
}

/// Length of the longest suffix of `text` that is a proper prefix of
/// `marker`.  Both markers are ASCII, so a suffix that starts mid-way
/// through a multi-byte character can never match and is skipped.
fn partial_marker_len(text: &str, marker: &str) -> usize {
    let max = text.len().min(marker.len() - 1);
    for len in (1..=max).rev() {
        if let Some(tail) = text.get(text.len() - len..) {
            if marker.starts_with(tail) {
                return len;
            }
        }
    }
    0
}

/// Parse a buffered marker payload into a [`ToolCall`].
///
/// The payload must be a JSON object with a string `name`.  `arguments`
/// may be a nested object (re-serialized to a string) or a string literal
/// (taken as-is); anything else falls back to `"{}"`.  A fresh call id is
/// generated per parse.
pub fn parse_tool_call(payload: &str) -> Option<ToolCall> {
    let value: Value = serde_json::from_str(payload.trim()).ok()?;
    let name = value.get("name")?.as_str()?.to_string();
    let arguments = match value.get("arguments") {
        Some(Value::String(s)) => s.clone(),
        Some(obj @ Value::Object(_)) => obj.to_string(),
        _ => "{}".to_string(),
    };
    Some(ToolCall::new(name, arguments))
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
