// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use embla_config::GenerationParams;
use llama_cpp_2::sampling::LlamaSampler;

/// Window of recent tokens the repetition penalty looks back over.
const PENALTY_LAST_N: i32 = 64;

/// Resolve the sampler seed for one generation.
///
/// Drawn here, at sampler-creation time, so each generation is
/// independently reproducible when the configuration pins a seed.
pub fn resolve_seed(configured: Option<u32>) -> u32 {
    configured.unwrap_or_else(rand::random)
}

/// Compose the sampler chain for one generation, in fixed order:
/// repetition penalty, top-k, top-p, temperature, seeded draw.
///
/// Frequency and presence penalties stay at zero; only the multiplicative
/// repeat penalty from the parameters applies.  The temperature floor of
/// 0.01 guards the division even if the caller skipped clamping.
pub fn build_chain(params: &GenerationParams, seed: u32) -> LlamaSampler {
    LlamaSampler::chain_simple([
        LlamaSampler::penalties(PENALTY_LAST_N, params.repeat_penalty, 0.0, 0.0),
        LlamaSampler::top_k(params.top_k as i32),
        LlamaSampler::top_p(params.top_p, 1),
        LlamaSampler::temp(params.temperature.max(0.01)),
        LlamaSampler::dist(seed),
    ])
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_seed_is_used_verbatim() {
        assert_eq!(resolve_seed(Some(1234)), 1234);
    }

    #[test]
    fn unconfigured_seed_varies() {
        // Two draws colliding is possible but vanishingly unlikely; three
        // identical draws would mean the source is broken.
        let draws = [resolve_seed(None), resolve_seed(None), resolve_seed(None)];
        assert!(!(draws[0] == draws[1] && draws[1] == draws[2]));
    }
}
