//! Weighted candidate ordering

use rand::Rng;

use crate::candidate::Candidate;

/// Order up to `count` candidates by weighted sampling without replacement
///
/// When `count` covers every candidate the input order is kept as is.
pub fn select(candidates: &[Candidate], count: usize) -> Vec<Candidate> {
    select_with_rng(candidates, count, &mut rand::rng())
}

pub fn select_with_rng<R: Rng + ?Sized>(candidates: &[Candidate], count: usize, rng: &mut R) -> Vec<Candidate> {
    if count >= candidates.len() {
        return candidates.to_vec();
    }

    let mut pool = candidates.to_vec();
    let mut picked = Vec::with_capacity(count);

    while picked.len() < count && !pool.is_empty() {
        let total: u64 = pool.iter().map(|c| u64::from(c.weight())).sum();

        let chosen = if total == 0 {
            pool.len() - 1
        } else {
            let mut target = rng.random_range(0..total);
            pool.iter()
                .position(|c| {
                    let weight = u64::from(c.weight());
                    if target < weight {
                        true
                    } else {
                        target -= weight;
                        false
                    }
                })
                .unwrap_or(pool.len() - 1)
        };

        picked.push(pool.remove(chosen));
    }

    picked
}

#[cfg(test)]
mod tests {
    use nexusgate_config::ProviderType;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;
    use crate::candidate::testing::candidate;

    fn pool(weights: &[(&str, u32)]) -> Vec<Candidate> {
        weights
            .iter()
            .map(|(id, weight)| candidate(id, ProviderType::Openai, None, *weight))
            .collect()
    }

    fn ids(candidates: &[Candidate]) -> Vec<&str> {
        candidates.iter().map(Candidate::provider_id).collect()
    }

    #[test]
    fn full_count_keeps_input_order() {
        let candidates = pool(&[("a", 1), ("b", 100), ("c", 0)]);

        assert_eq!(ids(&select(&candidates, 3)), ["a", "b", "c"]);
        assert_eq!(ids(&select(&candidates, 10)), ["a", "b", "c"]);
    }

    #[test]
    fn first_pick_follows_weights() {
        let candidates = pool(&[("light", 1), ("medium", 3), ("heavy", 6)]);
        let mut rng = StdRng::seed_from_u64(7);
        let trials = 20_000;

        let mut firsts = [0u32; 3];
        for _ in 0..trials {
            let picked = select_with_rng(&candidates, 2, &mut rng);
            let index = candidates
                .iter()
                .position(|c| c.provider_id() == picked[0].provider_id())
                .unwrap();
            firsts[index] += 1;
        }

        let share = |n: u32| f64::from(n) / f64::from(trials);
        assert!((share(firsts[0]) - 0.1).abs() < 0.02, "{firsts:?}");
        assert!((share(firsts[1]) - 0.3).abs() < 0.02, "{firsts:?}");
        assert!((share(firsts[2]) - 0.6).abs() < 0.02, "{firsts:?}");
    }

    #[test]
    fn picks_are_distinct() {
        let candidates = pool(&[("a", 5), ("b", 5), ("c", 5), ("d", 5)]);
        let mut rng = StdRng::seed_from_u64(3);

        let picked = select_with_rng(&candidates, 3, &mut rng);
        let mut seen = ids(&picked);
        seen.sort_unstable();
        seen.dedup();

        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn zero_weights_fall_back_to_last_remaining() {
        let candidates = pool(&[("a", 0), ("b", 0), ("c", 0)]);

        assert_eq!(ids(&select(&candidates, 2)), ["c", "b"]);
    }

    #[test]
    fn zero_weight_is_only_picked_after_positive_ones() {
        let candidates = pool(&[("never-first", 0), ("x", 1), ("y", 1)]);
        let mut rng = StdRng::seed_from_u64(11);

        for _ in 0..200 {
            let picked = select_with_rng(&candidates, 2, &mut rng);
            assert!(!ids(&picked).contains(&"never-first"));
        }
    }
}
