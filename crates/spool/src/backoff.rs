//! Send-retry backoff: jittered exponential, capped at 30 s.

const BASE_MS: f64 = 500.0;
const CAP_MS: f64 = 30_000.0;
const MAX_EXPONENT: u32 = 10;

/// Delay before the next send attempt after `consecutive_failures` failures:
/// `min(30_000, round(500 · 2^min(10, k) · jitter))` with jitter ∈ [0.8, 1.2).
pub fn backoff_delay_ms(consecutive_failures: u32) -> u64 {
    let k = consecutive_failures.min(MAX_EXPONENT);
    let base = BASE_MS * 2f64.powi(k as i32);
    let jitter = 0.8 + 0.4 * pseudo_random_fraction(consecutive_failures);
    (base * jitter).round().min(CAP_MS) as u64
}

/// Cheap deterministic "random" fraction [0, 1) from the failure count.
/// Not cryptographically secure — just enough to spread retry storms.
fn pseudo_random_fraction(seed: u32) -> f64 {
    let hash = seed.wrapping_add(1).wrapping_mul(2654435761); // Knuth multiplicative hash
    (hash as f64) / (u32::MAX as f64 + 1.0)
}
