use continuum_core::prelude::*;
use tracing::trace;

use crate::{
    semantics::{Acceptor, OutputOf, Semantics, Transducer},
    LearningError,
};

use super::Hypothesis;

/// A counterexample consists of an input word together with the answer that the system under
/// learning gave for it.
pub type Counterexample<A, M> = (Vec<SymbolOf<A>>, OutputOf<A, M>);

/// A query that is yet to be answered, used for batched processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query<S, O> {
    input: Vec<S>,
    output: Option<O>,
}

impl<S, O> Query<S, O> {
    /// Creates an unanswered query for `input`.
    pub fn new(input: Vec<S>) -> Self {
        Self {
            input,
            output: None,
        }
    }

    /// The input word.
    pub fn input(&self) -> &[S] {
        &self.input
    }

    /// The answer, once the query was processed.
    pub fn output(&self) -> Option<&O> {
        self.output.as_ref()
    }

    /// Stores the answer.
    pub fn answer(&mut self, output: O) {
        self.output = Some(output);
    }
}

/// Answers membership queries about the system under learning. An implementation must answer
/// according to the current truth at the time of the call, for a system that changes over
/// time two calls with the same word may therefore yield different answers.
pub trait MembershipOracle {
    /// The input alphabet.
    type Alphabet: Alphabet;
    /// Determines the type of answers.
    type Semantics: Semantics<SymbolOf<Self::Alphabet>>;

    /// Returns a reference to the input alphabet.
    fn alphabet(&self) -> &Self::Alphabet;

    /// Answers a single query.
    fn answer(
        &mut self,
        word: &[SymbolOf<Self::Alphabet>],
    ) -> Result<OutputOf<Self::Alphabet, Self::Semantics>, LearningError<SymbolOf<Self::Alphabet>>>;

    /// Answers the query for the concatenation of `prefix` and `suffix`.
    fn answer_split(
        &mut self,
        prefix: &[SymbolOf<Self::Alphabet>],
        suffix: &[SymbolOf<Self::Alphabet>],
    ) -> Result<OutputOf<Self::Alphabet, Self::Semantics>, LearningError<SymbolOf<Self::Alphabet>>>
    {
        self.answer(&prefix.followed_by(suffix))
    }

    /// Fills in the answers of all given queries, in order. Stops at the first error.
    fn process(
        &mut self,
        queries: &mut [Query<SymbolOf<Self::Alphabet>, OutputOf<Self::Alphabet, Self::Semantics>>],
    ) -> Result<(), LearningError<SymbolOf<Self::Alphabet>>> {
        for query in queries.iter_mut() {
            let output = self.answer(query.input())?;
            query.answer(output);
        }
        Ok(())
    }
}

/// Searches for words on which a hypothesis is wrong. `Ok(None)` only means that no such word
/// was found, not that the hypothesis is correct.
pub trait EquivalenceOracle {
    /// The input alphabet.
    type Alphabet: Alphabet;
    /// Determines the type of answers.
    type Semantics: Semantics<SymbolOf<Self::Alphabet>>;

    /// Looks for a counterexample to `hypothesis`.
    #[allow(clippy::type_complexity)]
    fn find_counterexample(
        &mut self,
        hypothesis: &Hypothesis<Self::Alphabet, Self::Semantics>,
    ) -> Result<
        Option<Counterexample<Self::Alphabet, Self::Semantics>>,
        LearningError<SymbolOf<Self::Alphabet>>,
    >;
}

/// A model that can serve as the system under learning.
pub trait Target: Clone {
    /// The input alphabet.
    type Alphabet: Alphabet;
    /// Determines the type of answers.
    type Semantics: Semantics<SymbolOf<Self::Alphabet>>;

    /// Returns a reference to the input alphabet.
    fn alphabet(&self) -> &Self::Alphabet;

    /// Computes the answer to a membership query.
    fn respond(
        &self,
        word: &[SymbolOf<Self::Alphabet>],
    ) -> OutputOf<Self::Alphabet, Self::Semantics>;

    /// Computes a shortest word on which `hypothesis` and `self` differ.
    fn separating_word(
        &self,
        hypothesis: &Hypothesis<Self::Alphabet, Self::Semantics>,
    ) -> Option<Vec<SymbolOf<Self::Alphabet>>>;
}

impl<A: Alphabet> Target for Dfa<A> {
    type Alphabet = A;
    type Semantics = Acceptor;

    fn alphabet(&self) -> &A {
        Dfa::alphabet(self)
    }

    fn respond(&self, word: &[A::Symbol]) -> bool {
        self.accepts(word)
    }

    fn separating_word(&self, hypothesis: &Hypothesis<A, Acceptor>) -> Option<Vec<A::Symbol>> {
        let (dfa, _) = hypothesis.to_dfa();
        Dfa::separating_word(self, &dfa)
    }
}

impl<A: Alphabet, O: Color + Ord + Show> Target for MealyMachine<A, O> {
    type Alphabet = A;
    type Semantics = Transducer<O>;

    fn alphabet(&self) -> &A {
        MealyMachine::alphabet(self)
    }

    fn respond(&self, word: &[A::Symbol]) -> Vec<O> {
        self.transform(word)
            .expect("target Mealy machine must be complete")
    }

    fn separating_word(
        &self,
        hypothesis: &Hypothesis<A, Transducer<O>>,
    ) -> Option<Vec<A::Symbol>> {
        let (mealy, _) = hypothesis.to_mealy();
        MealyMachine::separating_word(self, &mealy)
    }
}

/// Answers queries by simulating a fixed [`Target`]. As an equivalence oracle it is exact and
/// returns a shortest counterexample.
#[derive(Debug, Clone)]
pub struct SimulatorOracle<T> {
    target: T,
}

impl<T: Target> SimulatorOracle<T> {
    /// Creates an oracle for the given target.
    pub fn new(target: T) -> Self {
        Self { target }
    }

    /// Returns a reference to the simulated target.
    pub fn target(&self) -> &T {
        &self.target
    }
}

impl<T: Target> MembershipOracle for SimulatorOracle<T> {
    type Alphabet = T::Alphabet;
    type Semantics = T::Semantics;

    fn alphabet(&self) -> &T::Alphabet {
        self.target.alphabet()
    }

    fn answer(
        &mut self,
        word: &[SymbolOf<T::Alphabet>],
    ) -> Result<OutputOf<T::Alphabet, T::Semantics>, LearningError<SymbolOf<T::Alphabet>>> {
        Ok(self.target.respond(word))
    }
}

impl<T: Target> EquivalenceOracle for SimulatorOracle<T> {
    type Alphabet = T::Alphabet;
    type Semantics = T::Semantics;

    fn find_counterexample(
        &mut self,
        hypothesis: &Hypothesis<T::Alphabet, T::Semantics>,
    ) -> Result<
        Option<Counterexample<T::Alphabet, T::Semantics>>,
        LearningError<SymbolOf<T::Alphabet>>,
    > {
        Ok(self.target.separating_word(hypothesis).map(|word| {
            let output = self.target.respond(&word);
            (word, output)
        }))
    }
}

/// Simulates a system that changes over time: the first `limit` queries are answered by the
/// first target, the next `limit` queries by the second one and so on. Once the last target is
/// reached, it stays active.
#[derive(Debug, Clone)]
pub struct MutatingOracle<T> {
    targets: Vec<T>,
    limit: usize,
    count: usize,
}

impl<T: Target> MutatingOracle<T> {
    /// Creates a new oracle that switches to the next target every `limit` queries.
    ///
    /// # Panics
    /// If `targets` is empty or `limit` is zero.
    pub fn new(targets: Vec<T>, limit: usize) -> Self {
        assert!(!targets.is_empty(), "at least one target is needed");
        assert!(limit > 0, "targets must be active for at least one query");
        Self {
            targets,
            limit,
            count: 0,
        }
    }

    /// Number of queries answered so far.
    pub fn count(&self) -> usize {
        self.count
    }

    /// The target that answers (or answered) the `n`-th query, counting from one.
    pub fn target_at(&self, n: usize) -> &T {
        let position = n.saturating_sub(1) / self.limit;
        &self.targets[position.min(self.targets.len() - 1)]
    }

    /// The target that answers the next query.
    pub fn current(&self) -> &T {
        self.target_at(self.count + 1)
    }

    /// All targets, in the order in which they become active.
    pub fn targets(&self) -> &[T] {
        &self.targets
    }
}

impl<T: Target> MembershipOracle for MutatingOracle<T> {
    type Alphabet = T::Alphabet;
    type Semantics = T::Semantics;

    fn alphabet(&self) -> &T::Alphabet {
        self.targets[0].alphabet()
    }

    fn answer(
        &mut self,
        word: &[SymbolOf<T::Alphabet>],
    ) -> Result<OutputOf<T::Alphabet, T::Semantics>, LearningError<SymbolOf<T::Alphabet>>> {
        self.count += 1;
        if self.count > 1 && (self.count - 1) % self.limit == 0 {
            trace!("switching target before query {}", self.count);
        }
        Ok(self.target_at(self.count).respond(word))
    }
}

/// Passes queries on to an inner oracle until a budget is used up, from then on every query
/// fails with [`LearningError::LimitReached`].
#[derive(Debug, Clone)]
pub struct LimitOracle<O> {
    inner: O,
    limit: usize,
    count: usize,
}

impl<O: MembershipOracle> LimitOracle<O> {
    /// Wraps `inner` with the given budget.
    pub fn new(inner: O, limit: usize) -> Self {
        Self {
            inner,
            limit,
            count: 0,
        }
    }

    /// Number of queries that were passed on.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Returns true if the budget is used up.
    pub fn exhausted(&self) -> bool {
        self.count >= self.limit
    }

    /// Returns a reference to the wrapped oracle.
    pub fn inner(&self) -> &O {
        &self.inner
    }
}

impl<O: MembershipOracle> MembershipOracle for LimitOracle<O> {
    type Alphabet = O::Alphabet;
    type Semantics = O::Semantics;

    fn alphabet(&self) -> &O::Alphabet {
        self.inner.alphabet()
    }

    fn answer(
        &mut self,
        word: &[SymbolOf<O::Alphabet>],
    ) -> Result<OutputOf<O::Alphabet, O::Semantics>, LearningError<SymbolOf<O::Alphabet>>> {
        if self.exhausted() {
            return Err(LearningError::LimitReached { limit: self.limit });
        }
        self.count += 1;
        self.inner.answer(word)
    }
}

/// Counts the queries that pass through it.
#[derive(Debug, Clone)]
pub struct CountingOracle<O> {
    inner: O,
    count: usize,
}

impl<O: MembershipOracle> CountingOracle<O> {
    /// Wraps `inner`.
    pub fn new(inner: O) -> Self {
        Self { inner, count: 0 }
    }

    /// Number of queries answered so far.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Returns a reference to the wrapped oracle.
    pub fn inner(&self) -> &O {
        &self.inner
    }
}

impl<O: MembershipOracle> MembershipOracle for CountingOracle<O> {
    type Alphabet = O::Alphabet;
    type Semantics = O::Semantics;

    fn alphabet(&self) -> &O::Alphabet {
        self.inner.alphabet()
    }

    fn answer(
        &mut self,
        word: &[SymbolOf<O::Alphabet>],
    ) -> Result<OutputOf<O::Alphabet, O::Semantics>, LearningError<SymbolOf<O::Alphabet>>> {
        self.count += 1;
        self.inner.answer(word)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parity() -> Dfa {
        Dfa::builder()
            .with_state_colors([true, false])
            .with_transitions([(0, 'a', 1), (0, 'b', 0), (1, 'a', 0), (1, 'b', 1)])
            .into_dfa_with_initial(0)
    }

    #[test_log::test]
    fn limit_and_counting_oracles() {
        let mut oracle = LimitOracle::new(CountingOracle::new(SimulatorOracle::new(parity())), 2);
        assert_eq!(oracle.answer(&['a', 'a']), Ok(true));
        let mut queries = vec![Query::new(vec!['a']), Query::new(vec!['b'])];
        assert_eq!(
            oracle.process(&mut queries),
            Err(LearningError::LimitReached { limit: 2 })
        );
        assert_eq!(queries[0].output(), Some(&false));
        assert_eq!(queries[1].output(), None);
        assert_eq!(oracle.inner().count(), 2);
        assert!(oracle.exhausted());
    }

    #[test_log::test]
    fn mutating_oracle_switches_targets() {
        let mut changed = parity();
        changed.set_accepting(0, false);
        let mut oracle = MutatingOracle::new(vec![parity(), changed], 2);
        assert_eq!(oracle.answer(&[]), Ok(true));
        assert_eq!(oracle.answer(&[]), Ok(true));
        assert_eq!(oracle.answer(&[]), Ok(false));
        assert_eq!(oracle.answer(&['a', 'a']), Ok(false));
        assert_eq!(oracle.count(), 4);
        assert!(oracle.target_at(2).accepts(""));
        assert!(!oracle.target_at(100).accepts(""));
        assert!(!oracle.current().accepts(""));
    }

    #[test_log::test]
    fn simulator_finds_shortest_counterexamples() {
        let hypothesis = Hypothesis::<_, Acceptor>::from_parts(
            alphabet!('a', 'b'),
            false,
            Some(vec![]),
            continuum_core::math::OrderedMap::from_iter([(vec![], Some(true))]),
            [(vec![], 'a', vec![]), (vec![], 'b', vec![])],
        );
        let mut oracle = SimulatorOracle::new(parity());
        assert_eq!(
            oracle.find_counterexample(&hypothesis),
            Ok(Some((vec!['a'], false)))
        );
        assert_eq!(oracle.answer_split(&['a'], &['b', 'a']), Ok(true));
    }
}
