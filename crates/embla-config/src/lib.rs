// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Serde default helpers.
///
/// `#[serde(default)]` on a numeric field falls back to `0`/`0.0`, which is
/// never the right answer for sampling parameters, so every field gets a
/// named function.
fn default_context_size() -> u32 {
    4096
}

fn default_gpu_layers() -> u32 {
    // llama.cpp convention: any value >= the layer count offloads everything.
    999
}

fn default_temperature() -> f32 {
    0.7
}

fn default_top_p() -> f32 {
    0.95
}

fn default_top_k() -> u32 {
    40
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_repeat_penalty() -> f32 {
    1.1
}

/// Static configuration for one engine instance.
///
/// Values come from the embedding application (the model manager supplies
/// `model_path`, `context_size`, and `gpu_layers` for the active model);
/// there is no config file owned by the runtime itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Path to the quantized GGUF weights file.
    pub model_path: PathBuf,
    /// Requested context window in tokens.  The engine raises anything below
    /// 512 to 512 at load time.
    #[serde(default = "default_context_size")]
    pub context_size: u32,
    /// Number of transformer layers to offload to the GPU backend.
    /// 0 keeps everything on CPU; 999 offloads all layers.
    #[serde(default = "default_gpu_layers")]
    pub gpu_layers: u32,
    /// Default sampling temperature for generations that do not override it.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Default nucleus-sampling threshold.
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    /// Fixed sampler seed.  `None` draws a fresh seed per generation.
    #[serde(default)]
    pub seed: Option<u32>,
}

impl EngineConfig {
    /// Configuration for the model at `path` with all defaults.
    pub fn for_model(path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: path.into(),
            context_size: default_context_size(),
            gpu_layers: default_gpu_layers(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            seed: None,
        }
    }
}

/// Per-generation sampling parameters.
///
/// All numeric fields are range-clamped at the start of every generation via
/// [`GenerationParams::clamped`]; callers may pass anything.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationParams {
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default = "default_top_k")]
    pub top_k: u32,
    /// Upper bound on generated tokens for one engine call.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_repeat_penalty")]
    pub repeat_penalty: f32,
    /// Declared stop sequences.  Carried for callers that post-process the
    /// text stream; the decode loop itself does not enforce them.
    #[serde(default)]
    pub stop_sequences: Vec<String>,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            top_p: default_top_p(),
            top_k: default_top_k(),
            max_tokens: default_max_tokens(),
            repeat_penalty: default_repeat_penalty(),
            stop_sequences: Vec::new(),
        }
    }
}

impl GenerationParams {
    /// Return a copy with every numeric field forced into its valid range:
    /// `temperature ∈ [0.01, 2.0]`, `top_p ∈ [0.0, 1.0]`, `top_k ≥ 1`,
    /// `max_tokens ≥ 1`, `repeat_penalty ∈ [1.0, 2.0]`.
    pub fn clamped(&self) -> Self {
        Self {
            temperature: self.temperature.clamp(0.01, 2.0),
            top_p: self.top_p.clamp(0.0, 1.0),
            top_k: self.top_k.max(1),
            max_tokens: self.max_tokens.max(1),
            repeat_penalty: self.repeat_penalty.clamp(1.0, 2.0),
            stop_sequences: self.stop_sequences.clone(),
        }
    }
}

/// Assistant persona injected into the synthesized system prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Persona {
    /// Name the assistant refers to itself by.
    pub name: String,
    /// Style instructions appended to the identity paragraph.
    pub style: String,
}

impl Default for Persona {
    fn default() -> Self {
        Self {
            name: "Embla".into(),
            style: "Keep replies short and conversational; this is a voice-first, \
                    on-device assistant. Never mention the tool-call mechanics to \
                    the user."
                .into(),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
