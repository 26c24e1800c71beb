//! Exponential backoff with jitter.

use std::time::Duration;

use rand::Rng;

/// Jitter band applied around the exponential delay (±25%).
pub const JITTER_RATIO: f64 = 0.25;

/// Un-jittered delay before retry `attempt` (1-indexed), capped at `max`.
pub fn expected_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }
    let factor = 2u32.saturating_pow(attempt - 1);
    base.saturating_mul(factor).min(max)
}

/// Delay before retry `attempt` for a given jitter sample in `[-1.0, 1.0]`.
///
/// `min(base * 2^(attempt-1) * (1 + sample * 25%), max)`
pub fn jittered_delay(attempt: u32, base: Duration, max: Duration, sample: f64) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }
    let factor = 2u32.saturating_pow(attempt - 1);
    let raw = base.saturating_mul(factor);
    let scale = 1.0 + sample.clamp(-1.0, 1.0) * JITTER_RATIO;
    let jittered = Duration::try_from_secs_f64(raw.as_secs_f64() * scale).unwrap_or(max);
    jittered.min(max)
}

/// Calculate exponential backoff delay with uniformly distributed jitter.
pub fn calculate_backoff(attempt: u32, base: Duration, max: Duration) -> Duration {
    let sample = rand::thread_rng().gen_range(-1.0..=1.0);
    jittered_delay(attempt, base, max, sample)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: Duration = Duration::from_millis(1000);
    const MAX: Duration = Duration::from_millis(10_000);

    #[test]
    fn test_expected_delay_doubles_and_caps() {
        assert_eq!(expected_delay(0, BASE, MAX), Duration::ZERO);
        assert_eq!(expected_delay(1, BASE, MAX), Duration::from_millis(1000));
        assert_eq!(expected_delay(2, BASE, MAX), Duration::from_millis(2000));
        assert_eq!(expected_delay(3, BASE, MAX), Duration::from_millis(4000));
        assert_eq!(expected_delay(5, BASE, MAX), MAX);
        assert_eq!(expected_delay(64, BASE, MAX), MAX);
    }

    #[test]
    fn test_jitter_band_edges() {
        assert_eq!(jittered_delay(1, BASE, MAX, -1.0), Duration::from_millis(750));
        assert_eq!(jittered_delay(1, BASE, MAX, 1.0), Duration::from_millis(1250));
        assert_eq!(jittered_delay(2, BASE, MAX, 0.0), Duration::from_millis(2000));
        // 8s * 1.25 reaches the cap exactly; 16s * 0.75 is above it.
        assert_eq!(jittered_delay(4, BASE, MAX, 1.0), MAX);
        assert_eq!(jittered_delay(5, BASE, MAX, -1.0), MAX);
    }

    #[test]
    fn test_backoff_stays_within_bounds() {
        for attempt in 1..=3 {
            let expected = expected_delay(attempt, BASE, MAX);
            let low = expected.mul_f64(0.75);
            let high = expected.mul_f64(1.25).min(MAX);
            for _ in 0..200 {
                let delay = calculate_backoff(attempt, BASE, MAX);
                assert!(delay >= low && delay <= high, "attempt {attempt}: {delay:?}");
                assert!(delay <= MAX);
            }
        }
    }

    #[test]
    fn test_jitter_spreads_delays() {
        let delays: std::collections::HashSet<_> =
            (0..50).map(|_| calculate_backoff(1, BASE, MAX)).collect();
        assert!(delays.len() > 1);
    }
}
