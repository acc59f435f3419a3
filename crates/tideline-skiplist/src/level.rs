use oorandom::Rand32;

/// Thread-safe random source required by [`generate_level`].
///
/// `oorandom::Rand32` is `!Sync` (it mutates its internal state on every draw), so callers
/// are expected to guard it behind a lock, the way the list guards its own level generator.
pub(crate) trait LevelRng {
    fn next_unit_interval(&mut self) -> f32;
}

impl LevelRng for Rand32 {
    #[inline]
    fn next_unit_interval(&mut self) -> f32 {
        // `rand_float` draws from [0, 1); a fresh draw per trial keeps the geometric
        // distribution memoryless, matching the repeated-Bernoulli-trial definition.
        self.rand_float()
    }
}

/// Returns the smallest `level >= 0` such that a Bernoulli trial with success probability
/// `promotion_probability` fails, capped at `max_levels - 1`.
///
/// The returned value is a zero-based top level; the node's height (the number of forward
/// pointers it owns) is `level + 1`.
pub(crate) fn generate_level<R: LevelRng>(
    rng:                    &mut R,
    max_levels:             usize,
    promotion_probability:  f64,
) -> usize {
    debug_assert!(max_levels > 0, "max_levels must be validated by the caller");

    let mut level = 0;
    while level + 1 < max_levels && f64::from(rng.next_unit_interval()) < promotion_probability {
        level += 1;
    }
    level
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StepRng(Vec<f32>, usize);

    impl LevelRng for StepRng {
        fn next_unit_interval(&mut self) -> f32 {
            let value = self.0[self.1 % self.0.len()];
            self.1 += 1;
            value
        }
    }

    #[test]
    fn never_exceeds_max_levels_minus_one() {
        let mut rng = StepRng(vec![0.0], 0);
        assert_eq!(generate_level(&mut rng, 4, 0.5), 3);
    }

    #[test]
    fn stops_at_first_failed_trial() {
        let mut rng = StepRng(vec![0.0, 0.0, 0.9, 0.0], 0);
        assert_eq!(generate_level(&mut rng, 8, 0.5), 2);
    }

    #[test]
    fn zero_probability_never_promotes() {
        let mut rng = StepRng(vec![0.0], 0);
        assert_eq!(generate_level(&mut rng, 8, 0.0), 0);
    }
}
