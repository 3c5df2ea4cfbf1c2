//! Deterministic primitives.
//!
//! Every reproducible decision in the engine (fallback sides, confidence
//! jitter, idempotency keys) flows through these functions. Identical
//! inputs yield identical outputs across process restarts; no other
//! randomness source may influence a trading decision.

use crate::types::AgentId;

/// FNV-1a offset basis (32-bit).
const FNV_OFFSET: u32 = 0x811c_9dc5;
/// FNV-1a prime (32-bit).
const FNV_PRIME: u32 = 0x0100_0193;

/// Canonical seed for a `(agent, market, index)` triple: colon-joined,
/// used both as a cache key and as hash input.
pub fn seed(agent_id: AgentId, market_id: &str, index: u32) -> String {
    format!("{}:{}:{}", agent_id.as_str(), market_id, index)
}

/// 32-bit FNV-1a hash. Non-cryptographic; used for jitter and
/// pseudo-random draws only.
pub fn hash32(input: &str) -> u32 {
    let mut hash = FNV_OFFSET;
    for byte in input.as_bytes() {
        hash ^= u32::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Deterministic uniform draw in `[0, 1)` from a seed string.
pub fn draw01(seed: &str) -> f64 {
    f64::from(hash32(seed)) / (u32::MAX as f64 + 1.0)
}

/// Clamp `x` into `[lo, hi]`.
pub fn clamp(x: f64, lo: f64, hi: f64) -> f64 {
    x.max(lo).min(hi)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
