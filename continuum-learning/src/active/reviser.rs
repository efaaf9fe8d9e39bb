use std::collections::VecDeque;

use continuum_core::{prelude::*, random::random_word};
use itertools::Itertools;
use rand::{rngs::StdRng, Rng};
use tracing::{debug, trace};

use crate::{
    datastructure::CacheTree,
    semantics::{OutputOf, Semantics},
    LearnerConfig, LearningError,
};

use super::{Counterexample, EquivalenceOracle, Hypothesis, MembershipOracle};

/// Strategies for producing test words to check a hypothesis with.
#[derive(Debug, Clone, PartialEq)]
pub enum TestWords {
    /// Random words whose length is geometrically distributed. Each batch has the given size.
    Random {
        /// Probability with which a word is extended by another symbol.
        length_factor: f64,
        /// Number of words per batch.
        batch: usize,
    },
    /// Every access sequence of the hypothesis, followed by every word of length at most
    /// `depth`, followed by every suffix that separates two states of the hypothesis.
    StateCover {
        /// Maximal length of the middle part.
        depth: usize,
    },
}

impl TestWords {
    /// Produces the next batch of test words for `hypothesis`. Words are never shorter than
    /// [`Semantics::MIN_SAMPLE_LEN`].
    pub fn generate<A, M, R>(
        &self,
        hypothesis: &Hypothesis<A, M>,
        rng: &mut R,
    ) -> Vec<Vec<A::Symbol>>
    where
        A: Alphabet,
        M: Semantics<A::Symbol>,
        R: Rng + ?Sized,
    {
        match self {
            TestWords::Random {
                length_factor,
                batch,
            } => (0..*batch)
                .map(|_| {
                    random_word(
                        rng,
                        hypothesis.alphabet(),
                        *length_factor,
                        M::MIN_SAMPLE_LEN,
                    )
                })
                .collect(),
            TestWords::StateCover { depth } => state_cover_words(hypothesis, *depth),
        }
    }
}

fn state_cover_words<A: Alphabet, M: Semantics<A::Symbol>>(
    hypothesis: &Hypothesis<A, M>,
    depth: usize,
) -> Vec<Vec<A::Symbol>> {
    let states: Vec<_> = hypothesis.states().collect();
    let mut suffixes = math::OrderedSet::from_iter([vec![]]);
    for (left, right) in states.iter().tuple_combinations() {
        if let Some(suffix) = hypothesis.separating_suffix(left, right) {
            suffixes.insert(suffix);
        }
    }

    let mut middles = vec![vec![]];
    let mut layer = vec![vec![]];
    for _ in 0..depth {
        layer = layer
            .iter()
            .flat_map(|word: &Vec<A::Symbol>| {
                hypothesis
                    .alphabet()
                    .universe()
                    .map(move |sym| word.with_symbol(sym))
            })
            .collect();
        middles.extend(layer.iter().cloned());
    }

    let mut words = math::Set::default();
    for access in &states {
        for middle in &middles {
            for suffix in &suffixes {
                let word = access.followed_by(middle).followed_by(suffix);
                if word.len() >= M::MIN_SAMPLE_LEN {
                    words.insert(word);
                }
            }
        }
    }
    words.into_iter().collect()
}

/// Sits between a learner and the system under learning and keeps every answer in a
/// [`CacheTree`]. If the system contradicts a cached answer, the cache is revised and the query
/// fails with [`LearningError::Conflict`] so the learner can discard what it derived from the
/// stale answer.
///
/// As an equivalence oracle it first re-checks cached words on which the hypothesis is wrong,
/// then poses test words. With probability `revision_ratio` a test word is replaced by the
/// cached word that has not been confirmed for the longest time, so facts that may have gone
/// stale are revisited. Unless a limit on the number of tests is set, the search only ends with
/// a counterexample or when the system under learning refuses further queries.
#[derive(Debug, Clone)]
pub struct Reviser<O: MembershipOracle, R = StdRng> {
    sul: O,
    cache: CacheTree<O::Alphabet, O::Semantics>,
    caching: bool,
    revision_ratio: f64,
    test_words: TestWords,
    max_tests: Option<usize>,
    rng: R,
    queries: usize,
}

impl<O: MembershipOracle> Reviser<O, StdRng> {
    /// Creates a reviser that draws random test words with the length factor, revision ratio
    /// and seed of the configuration.
    pub fn with_config(
        sul: O,
        config: &LearnerConfig,
    ) -> Result<Self, LearningError<SymbolOf<O::Alphabet>>> {
        config.validate()?;
        Ok(Self::new(
            sul,
            TestWords::Random {
                length_factor: config.length_factor,
                batch: 100,
            },
            config.revision_ratio,
            config.rng(),
        ))
    }
}

impl<O: MembershipOracle, R: Rng> Reviser<O, R> {
    /// Creates a reviser with caching enabled.
    pub fn new(sul: O, test_words: TestWords, revision_ratio: f64, rng: R) -> Self {
        let cache = CacheTree::new(sul.alphabet().clone());
        Self {
            sul,
            cache,
            caching: true,
            revision_ratio: revision_ratio.clamp(0.0, 1.0),
            test_words,
            max_tests: None,
            rng,
            queries: 0,
        }
    }

    /// Enables or disables answering membership queries from the cache. Answers are stored
    /// and checked for conflicts either way.
    pub fn with_caching(mut self, caching: bool) -> Self {
        self.caching = caching;
        self
    }

    /// Returns true if membership queries are answered from the cache.
    pub fn caching(&self) -> bool {
        self.caching
    }

    /// Switches answering from the cache on or off.
    pub fn set_caching(&mut self, caching: bool) {
        self.caching = caching;
    }

    /// Gives up the search for a counterexample after `max_tests` test words.
    pub fn with_max_tests(mut self, max_tests: usize) -> Self {
        self.max_tests = Some(max_tests);
        self
    }

    /// The wrapped system under learning.
    pub fn sul(&self) -> &O {
        &self.sul
    }

    /// The cache of answers.
    pub fn cache(&self) -> &CacheTree<O::Alphabet, O::Semantics> {
        &self.cache
    }

    /// Number of queries that were passed on to the system under learning.
    pub fn queries(&self) -> usize {
        self.queries
    }

    fn query(
        &mut self,
        word: &[SymbolOf<O::Alphabet>],
    ) -> Result<OutputOf<O::Alphabet, O::Semantics>, LearningError<SymbolOf<O::Alphabet>>> {
        let answer = self.sul.answer(word)?;
        self.queries += 1;
        trace!("{} -> {}", word.as_string(), answer.show());
        if let Err(conflict) = self.cache.insert(word, &answer) {
            debug!("query {} revealed a conflict", self.queries);
            self.cache.revise(word, &answer);
            return Err(conflict);
        }
        Ok(answer)
    }

    fn next_test(
        &mut self,
        batch: &mut VecDeque<Vec<SymbolOf<O::Alphabet>>>,
        hypothesis: &Hypothesis<O::Alphabet, O::Semantics>,
    ) -> Option<Vec<SymbolOf<O::Alphabet>>> {
        if self.rng.gen_bool(self.revision_ratio) {
            if let Some(oldest) = self.cache.oldest_input() {
                trace!("revising {}", oldest.as_string());
                return Some(oldest);
            }
        }
        if batch.is_empty() {
            batch.extend(self.test_words.generate(hypothesis, &mut self.rng));
        }
        batch.pop_front()
    }
}

impl<O: MembershipOracle, R: Rng> MembershipOracle for Reviser<O, R> {
    type Alphabet = O::Alphabet;
    type Semantics = O::Semantics;

    fn alphabet(&self) -> &O::Alphabet {
        self.sul.alphabet()
    }

    fn answer(
        &mut self,
        word: &[SymbolOf<O::Alphabet>],
    ) -> Result<OutputOf<O::Alphabet, O::Semantics>, LearningError<SymbolOf<O::Alphabet>>> {
        if self.caching {
            if let Some(answer) = self.cache.lookup(word) {
                return Ok(answer);
            }
        }
        self.query(word)
    }
}

impl<O: MembershipOracle, R: Rng> EquivalenceOracle for Reviser<O, R> {
    type Alphabet = O::Alphabet;
    type Semantics = O::Semantics;

    fn find_counterexample(
        &mut self,
        hypothesis: &Hypothesis<O::Alphabet, O::Semantics>,
    ) -> Result<
        Option<Counterexample<O::Alphabet, O::Semantics>>,
        LearningError<SymbolOf<O::Alphabet>>,
    > {
        while let Some(word) = self.cache.find_separating_word(hypothesis) {
            let answer = self.query(&word)?;
            if hypothesis.output(&word).as_ref() != Some(&answer) {
                debug!("cached word {} is a counterexample", word.as_string());
                return Ok(Some((word, answer)));
            }
        }

        let mut batch = VecDeque::new();
        let mut tests = 0;
        while self.max_tests.map_or(true, |max| tests < max) {
            let Some(word) = self.next_test(&mut batch, hypothesis) else {
                break;
            };
            tests += 1;
            let answer = self.query(&word)?;
            if hypothesis.output(&word).as_ref() != Some(&answer) {
                debug!(
                    "test word {} is a counterexample after {tests} tests",
                    word.as_string()
                );
                return Ok(Some((word, answer)));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        active::{LimitOracle, MutatingOracle, SimulatorOracle},
        semantics::Acceptor,
    };
    use rand::SeedableRng;

    /// Single state machine that outputs `on_a` for every a and 0 for every b.
    fn constant(on_a: usize) -> MealyMachine<CharAlphabet, usize> {
        MealyMachine::builder()
            .with_transitions([(0, 'a', on_a, 0), (0, 'b', 0, 0)])
            .into_mealy_with_initial(0)
    }

    fn parity() -> Dfa {
        Dfa::builder()
            .with_state_colors([true, false])
            .with_transitions([(0, 'a', 1), (0, 'b', 0), (1, 'a', 0), (1, 'b', 1)])
            .into_dfa_with_initial(0)
    }

    fn accept_all() -> Hypothesis<CharAlphabet, Acceptor> {
        Hypothesis::from_parts(
            alphabet!('a', 'b'),
            false,
            Some(vec![]),
            math::OrderedMap::from_iter([(vec![], Some(true))]),
            [(vec![], 'a', vec![]), (vec![], 'b', vec![])],
        )
    }

    fn random_tests() -> TestWords {
        TestWords::Random {
            length_factor: 0.8,
            batch: 20,
        }
    }

    #[test_log::test]
    fn caches_answers() {
        let mut reviser = Reviser::new(
            SimulatorOracle::new(parity()),
            random_tests(),
            0.0,
            StdRng::seed_from_u64(1),
        );
        assert_eq!(reviser.answer(&['a', 'b']), Ok(false));
        assert_eq!(reviser.answer(&['a', 'b']), Ok(false));
        assert_eq!(reviser.queries(), 1);

        let mut uncached = reviser.clone().with_caching(false);
        assert_eq!(uncached.answer(&['a', 'b']), Ok(false));
        assert_eq!(uncached.queries(), 2);
    }

    #[test_log::test]
    fn detects_conflicts() {
        let mut changed = parity();
        changed.set_accepting(0, false);
        let sul = MutatingOracle::new(vec![parity(), changed], 1);
        let mut reviser =
            Reviser::new(sul, random_tests(), 0.0, StdRng::seed_from_u64(1)).with_caching(false);
        assert_eq!(reviser.answer(&[]), Ok(true));
        assert_eq!(
            reviser.answer(&[]),
            Err(LearningError::Conflict { word: vec![] })
        );
        // the cache holds the revised answer now
        assert_eq!(reviser.cache().lookup(&[]), Some(false));
        assert_eq!(reviser.answer(&[]), Ok(false));
    }

    #[test_log::test]
    fn detects_conflicts_on_output_prefixes() {
        let sul = MutatingOracle::new(vec![constant(0), constant(1)], 1);
        let mut reviser =
            Reviser::new(sul, random_tests(), 0.0, StdRng::seed_from_u64(1)).with_caching(false);
        assert_eq!(reviser.answer(&['a', 'b']), Ok(vec![0, 0]));
        // agrees with what is cached for b
        assert_eq!(reviser.answer(&['b']), Ok(vec![0]));
        // the stored answer for ab says a produces 0
        assert_eq!(
            reviser.answer(&['a']),
            Err(LearningError::Conflict { word: vec!['a'] })
        );
        assert_eq!(reviser.queries(), 3);

        assert_eq!(reviser.cache().lookup(&['a']), Some(vec![1]));
        assert_eq!(reviser.cache().lookup(&['a', 'b']), None);
        assert_eq!(reviser.cache().lookup(&['b']), Some(vec![0]));
        assert_eq!(reviser.answer(&['a', 'b']), Ok(vec![1, 0]));
        assert_eq!(reviser.cache().lookup(&['a', 'b']), Some(vec![1, 0]));
    }

    #[test_log::test]
    fn finds_counterexamples() {
        let mut reviser = Reviser::new(
            SimulatorOracle::new(parity()),
            random_tests(),
            0.5,
            StdRng::seed_from_u64(5),
        );
        // the cached answer already refutes the hypothesis
        reviser.answer(&['a']).unwrap();
        assert_eq!(
            reviser.find_counterexample(&accept_all()),
            Ok(Some((vec!['a'], false)))
        );

        let mut fresh = Reviser::new(
            SimulatorOracle::new(parity()),
            TestWords::StateCover { depth: 1 },
            0.0,
            StdRng::seed_from_u64(5),
        );
        let (word, output) = fresh
            .find_counterexample(&accept_all())
            .unwrap()
            .expect("state cover words contain a");
        assert!(!output);
        assert!(!parity().accepts(&word));
    }

    #[test_log::test]
    fn search_ends_at_the_limit() {
        let sul = LimitOracle::new(SimulatorOracle::new(parity()), 10);
        let hypothesis = Hypothesis::<_, Acceptor>::from_parts(
            alphabet!('a', 'b'),
            false,
            Some(vec![]),
            math::OrderedMap::from_iter([(vec![], Some(true)), (vec!['a'], Some(false))]),
            [
                (vec![], 'a', vec!['a']),
                (vec![], 'b', vec![]),
                (vec!['a'], 'a', vec![]),
                (vec!['a'], 'b', vec!['a']),
            ],
        );
        let mut reviser = Reviser::new(sul, random_tests(), 0.3, StdRng::seed_from_u64(2));
        assert_eq!(
            reviser.find_counterexample(&hypothesis),
            Err(LearningError::LimitReached { limit: 10 })
        );

        let mut bounded = Reviser::new(
            SimulatorOracle::new(parity()),
            random_tests(),
            0.3,
            StdRng::seed_from_u64(2),
        )
        .with_max_tests(50);
        assert_eq!(bounded.find_counterexample(&hypothesis), Ok(None));
    }

    #[test_log::test]
    fn state_cover_words() {
        let words = TestWords::StateCover { depth: 1 }
            .generate(&accept_all(), &mut StdRng::seed_from_u64(0));
        let mut words: Vec<String> = words.iter().map(|w| w.as_string()).collect();
        words.sort();
        assert_eq!(words, vec!["a", "b", "ε"]);
    }
}
