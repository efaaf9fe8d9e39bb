use continuum_core::prelude::*;
use rand::{rngs::StdRng, SeedableRng};

use crate::LearningError;

/// Parameters shared by the learners and oracles of this crate. Values are set with the
/// chained `with_*` methods and checked by [`LearnerConfig::validate`].
///
/// ```
/// use continuum_learning::LearnerConfig;
/// let config = LearnerConfig::default().with_budget(500).with_revision_ratio(0.2);
/// assert!(config.validate::<char>().is_ok());
/// assert!(config.with_alpha(1.0).validate::<char>().is_err());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct LearnerConfig {
    /// Probability with which a sampled test word is extended by one more symbol.
    pub alpha: f64,
    /// Probability with which the oldest cached query is revised instead of posing a test word.
    pub revision_ratio: f64,
    /// Continuation probability for random test words of the reviser.
    pub length_factor: f64,
    /// Number of queries after which learning stops.
    pub budget: usize,
    /// A snapshot of the hypothesis is recorded every `sample_every` queries.
    pub sample_every: usize,
    /// Seed of the random number generator.
    pub seed: u64,
}

impl Default for LearnerConfig {
    fn default() -> Self {
        Self {
            alpha: 0.9,
            revision_ratio: 0.1,
            length_factor: 0.9,
            budget: 10_000,
            sample_every: 100,
            seed: 0,
        }
    }
}

impl LearnerConfig {
    /// Sets [`Self::alpha`].
    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    /// Sets [`Self::revision_ratio`].
    pub fn with_revision_ratio(mut self, revision_ratio: f64) -> Self {
        self.revision_ratio = revision_ratio;
        self
    }

    /// Sets [`Self::length_factor`].
    pub fn with_length_factor(mut self, length_factor: f64) -> Self {
        self.length_factor = length_factor;
        self
    }

    /// Sets [`Self::budget`].
    pub fn with_budget(mut self, budget: usize) -> Self {
        self.budget = budget;
        self
    }

    /// Sets [`Self::sample_every`].
    pub fn with_sample_every(mut self, sample_every: usize) -> Self {
        self.sample_every = sample_every;
        self
    }

    /// Sets [`Self::seed`].
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Creates the random number generator that is determined by [`Self::seed`].
    pub fn rng(&self) -> StdRng {
        StdRng::seed_from_u64(self.seed)
    }

    /// Checks that all values are in range. Probabilities that control the length of words
    /// must be strictly below one, otherwise sampling would not terminate.
    pub fn validate<S: Symbol>(&self) -> Result<(), LearningError<S>> {
        let invalid = |name: &'static str, value: String| {
            Err(LearningError::InvalidParameter { name, value })
        };
        if !(0.0..1.0).contains(&self.alpha) {
            return invalid("alpha", self.alpha.to_string());
        }
        if !(0.0..1.0).contains(&self.length_factor) {
            return invalid("length_factor", self.length_factor.to_string());
        }
        if !(0.0..=1.0).contains(&self.revision_ratio) {
            return invalid("revision_ratio", self.revision_ratio.to_string());
        }
        if self.sample_every == 0 {
            return invalid("sample_every", "0".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_log::test]
    fn validation_rejects_out_of_range_values() {
        let config = LearnerConfig::default();
        assert_eq!(config.validate::<char>(), Ok(()));
        assert_eq!(
            config.clone().with_revision_ratio(1.5).validate::<char>(),
            Err(LearningError::InvalidParameter {
                name: "revision_ratio",
                value: "1.5".to_string()
            })
        );
        assert!(config
            .clone()
            .with_sample_every(0)
            .validate::<char>()
            .is_err());
        assert!(config.with_length_factor(-0.1).validate::<char>().is_err());
    }
}
