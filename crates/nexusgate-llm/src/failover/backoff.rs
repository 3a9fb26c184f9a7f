use std::time::Duration;

use nexusgate_config::BackoffConfig;
use rand::Rng;

/// Delay before the retry following attempt `attempt_index` (zero-based)
///
/// `min(max, base * exponent^n)` plus up to `jitter_factor` of that value.
pub fn backoff_delay(config: &BackoffConfig, attempt_index: u32) -> Duration {
    backoff_delay_with_rng(config, attempt_index, &mut rand::rng())
}

#[allow(clippy::cast_precision_loss)]
pub fn backoff_delay_with_rng<R: Rng + ?Sized>(config: &BackoffConfig, attempt_index: u32, rng: &mut R) -> Duration {
    let base = config.base_delay_ms as f64;
    let max = config.max_delay_ms as f64;
    let growth = config.exponent.powi(i32::try_from(attempt_index).unwrap_or(i32::MAX));

    let capped = (base * growth).min(max).max(0.0);
    let jitter = capped * config.jitter_factor.clamp(0.0, 1.0) * rng.random::<f64>();

    Duration::try_from_secs_f64((capped + jitter) / 1000.0).unwrap_or(Duration::from_millis(config.max_delay_ms))
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    fn config(jitter_factor: f64) -> BackoffConfig {
        BackoffConfig {
            base_delay_ms: 100,
            max_delay_ms: 2_000,
            exponent: 2.0,
            jitter_factor,
        }
    }

    #[test]
    fn grows_exponentially_without_jitter() {
        let config = config(0.0);
        let mut rng = StdRng::seed_from_u64(1);

        let delays: Vec<u128> = (0..6)
            .map(|n| backoff_delay_with_rng(&config, n, &mut rng).as_millis())
            .collect();

        assert_eq!(delays, vec![100, 200, 400, 800, 1_600, 2_000]);
    }

    #[test]
    fn never_exceeds_cap_plus_jitter() {
        let config = config(0.25);
        let mut rng = StdRng::seed_from_u64(42);
        let bound = Duration::from_secs_f64(2.0 * 1.25);

        for n in 0..64 {
            for _ in 0..50 {
                assert!(backoff_delay_with_rng(&config, n, &mut rng) <= bound);
            }
        }
    }

    #[test]
    fn huge_attempt_index_saturates_at_cap() {
        let config = config(0.0);
        assert_eq!(backoff_delay(&config, u32::MAX), Duration::from_millis(2_000));
    }
}
