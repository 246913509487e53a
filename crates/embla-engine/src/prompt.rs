// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use crate::types::Message;

/// Serialize a conversation into a ChatML prompt string.
///
/// Every message becomes `<|im_start|>{role}\n{content}<|im_end|>\n` in
/// order, followed by an open assistant header that primes the decode
/// phase.  No content escaping is applied; the tokenizer owns the marker
/// tokens.  Tool messages are framed with `role = "tool"`.
pub fn format_chatml(messages: &[Message]) -> String {
    let mut prompt = String::new();
    for message in messages {
        prompt.push_str("<|im_start|>");
        prompt.push_str(&message.role.to_string());
        prompt.push('\n');
        prompt.push_str(&message.content);
        prompt.push_str("<|im_end|>\n");
    }
    prompt.push_str("<|im_start|>assistant\n");
    prompt
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
