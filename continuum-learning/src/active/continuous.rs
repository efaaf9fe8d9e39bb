use continuum_core::{prelude::*, random::random_word};
use rand::{rngs::StdRng, Rng};
use tracing::{debug, info, trace};

use crate::{
    datastructure::{DiscriminationTree, Fact},
    semantics::Semantics,
    LearnerConfig, LearningError,
};

use super::{Activity, Bisection, Hypothesis, MembershipOracle};

type Word<A> = Vec<SymbolOf<A>>;

/// Learns a target that may change while it is being learned. The learner poses exactly one
/// query at a time and incorporates every answer into its [`DiscriminationTree`] immediately,
/// so there is no separate equivalence check: counterexamples are found by testing sampled
/// words and analysed with the same single-query loop.
///
/// Every answer is first applied as a fact, which removes states and moves transitions that
/// it contradicts, and then used to advance the tree. Afterwards the current [`Activity`]
/// decides on the next query.
pub struct ContinuousLearner<A: Alphabet, M: Semantics<A::Symbol>, R = StdRng> {
    tree: DiscriminationTree<A, M>,
    hypothesis: Hypothesis<A, M>,
    activity: Activity<A::Symbol, M::Output>,
    query: Word<A>,
    filler: M::Filler,
    alpha: f64,
    rng: R,
    steps: usize,
    revisions: usize,
}

impl<A: Alphabet, M: Semantics<A::Symbol>> ContinuousLearner<A, M, StdRng> {
    /// Creates a learner whose sampling parameter and random number generator are taken from
    /// the given configuration.
    pub fn with_config(
        alphabet: A,
        filler: M::Filler,
        config: &LearnerConfig,
    ) -> Result<Self, LearningError<A::Symbol>> {
        config.validate()?;
        Ok(Self::new(alphabet, filler, config.alpha, config.rng()))
    }
}

impl<A: Alphabet, M: Semantics<A::Symbol>, R: Rng> ContinuousLearner<A, M, R> {
    /// Creates a learner. Unknown observations are reported as `filler`, sampled test words
    /// are extended by another symbol with probability `alpha`.
    pub fn new(alphabet: A, filler: M::Filler, alpha: f64, rng: R) -> Self {
        let tree = DiscriminationTree::new(alphabet);
        let hypothesis = tree.extract(filler.clone());
        let mut learner = Self {
            tree,
            hypothesis,
            activity: Activity::Hyp,
            query: vec![],
            filler,
            alpha,
            rng,
            steps: 0,
            revisions: 0,
        };
        let (activity, query) = learner.hyp();
        learner.activity = activity;
        learner.query = query;
        learner
    }

    /// The query that has to be answered next.
    pub fn query(&self) -> &[A::Symbol] {
        &self.query
    }

    /// The current hypothesis.
    pub fn hypothesis(&self) -> &Hypothesis<A, M> {
        &self.hypothesis
    }

    /// The current activity.
    pub fn activity(&self) -> &Activity<A::Symbol, M::Output> {
        &self.activity
    }

    /// The discrimination tree the hypothesis is extracted from.
    pub fn tree(&self) -> &DiscriminationTree<A, M> {
        &self.tree
    }

    /// Number of answers that were processed.
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Number of answers that contradicted the tree and removed at least one state.
    pub fn revisions(&self) -> usize {
        self.revisions
    }

    /// Processes the answer to [`Self::query`].
    pub fn step(&mut self, answer: &M::Output) {
        self.steps += 1;
        let query = std::mem::take(&mut self.query);
        trace!(
            "[{}] {} answered {}",
            self.activity.name(),
            query.as_string(),
            answer.show()
        );

        if self.tree.apply(&[(query.clone(), answer.clone())]) {
            self.revisions += 1;
            debug!(
                "answer {} to {} removed states, {} are left",
                answer.show(),
                query.as_string(),
                self.tree.leaf_count()
            );
        }
        self.tree = self.tree.advance(&query, answer);
        self.hypothesis = self.tree.extract(self.filler.clone());

        let activity = std::mem::replace(&mut self.activity, Activity::Hyp);
        let (activity, next) = self.process(activity, answer);
        if matches!(activity, Activity::Hyp) {
            // finishing a counterexample restructures the tree
            self.hypothesis = self.tree.extract(self.filler.clone());
        }
        self.activity = activity;
        self.query = next;
    }

    /// Poses up to `budget` queries to the oracle and returns snapshots of the hypothesis,
    /// taken every `sample_every` queries and after the last one. Query indices count all
    /// steps of this learner. Running into the query limit of the oracle ends learning
    /// regularly.
    pub fn learn<O>(
        &mut self,
        oracle: &mut O,
        budget: usize,
        sample_every: usize,
    ) -> Result<Vec<(usize, Hypothesis<A, M>)>, LearningError<A::Symbol>>
    where
        O: MembershipOracle<Alphabet = A, Semantics = M>,
    {
        info!("learning continuously for {budget} queries");
        let sample_every = sample_every.max(1);
        let mut snapshots: Vec<(usize, Hypothesis<A, M>)> = vec![];
        for _ in 0..budget {
            let answer = match oracle.answer(&self.query) {
                Ok(answer) => answer,
                Err(LearningError::LimitReached { limit }) => {
                    info!("query limit of {limit} reached after {} steps", self.steps);
                    break;
                }
                Err(e) => return Err(e),
            };
            self.step(&answer);
            if self.steps % sample_every == 0 {
                snapshots.push((self.steps, self.hypothesis.clone()));
            }
        }
        if snapshots.last().map(|(index, _)| *index) != Some(self.steps) {
            snapshots.push((self.steps, self.hypothesis.clone()));
        }
        info!(
            "stopped after {} steps with {} states",
            self.steps,
            self.hypothesis.size()
        );
        Ok(snapshots)
    }

    fn process(
        &mut self,
        activity: Activity<A::Symbol, M::Output>,
        answer: &M::Output,
    ) -> (Activity<A::Symbol, M::Output>, Word<A>) {
        match activity {
            Activity::Hyp => self.hyp(),
            Activity::Test { word } => self.test(word, answer),
            Activity::Init {
                access,
                word,
                answer: test_answer,
            } => self.init(access, word, test_answer, answer),
            Activity::Cex {
                bisection,
                access,
                lower_access,
                lower,
            } => self.cex(bisection, access, lower_access, lower, answer),
        }
    }

    fn hyp(&mut self) -> (Activity<A::Symbol, M::Output>, Word<A>) {
        if let Some(query) = self.tree.pending_query() {
            return (Activity::Hyp, query);
        }
        self.sample()
    }

    fn sample(&mut self) -> (Activity<A::Symbol, M::Output>, Word<A>) {
        let word = random_word(
            &mut self.rng,
            self.tree.alphabet(),
            self.alpha,
            M::MIN_SAMPLE_LEN,
        );
        (Activity::Test { word: word.clone() }, word)
    }

    fn test(
        &mut self,
        word: Word<A>,
        answer: &M::Output,
    ) -> (Activity<A::Symbol, M::Output>, Word<A>) {
        if !self.hypothesis.is_complete() || self.tree.pending_query().is_some() {
            return self.hyp();
        }
        match self.hypothesis.output(&word) {
            Some(predicted) if &predicted == answer => self.sample(),
            Some(predicted) => {
                debug!(
                    "hypothesis predicts {} on {} but got {}",
                    predicted.show(),
                    word.as_string(),
                    answer.show()
                );
                let Some(access) = self.hypothesis.initial().map(<[_]>::to_vec) else {
                    return self.hyp();
                };
                let query = access.followed_by(&word);
                let activity = Activity::Init {
                    access,
                    word,
                    answer: answer.clone(),
                };
                (activity, query)
            }
            None => self.hyp(),
        }
    }

    fn init(
        &mut self,
        access: Word<A>,
        word: Word<A>,
        test_answer: M::Output,
        answer: &M::Output,
    ) -> (Activity<A::Symbol, M::Output>, Word<A>) {
        let Some(predicted) = self.hypothesis.output_from(&access, &word) else {
            return self.hyp();
        };
        if M::agree(&predicted, answer, word.len()) {
            // the initial state behaves as predicted, so the empty word leads elsewhere
            let short_key = M::classify(answer, word.len());
            let long_key = M::classify(&test_answer, word.len());
            self.finish(access, short_key, vec![], long_key, word, None);
            return self.hyp();
        }
        self.bisect(Bisection::new(word), access, answer.clone())
    }

    fn bisect(
        &mut self,
        bisection: Bisection<A::Symbol>,
        lower_access: Word<A>,
        lower: M::Output,
    ) -> (Activity<A::Symbol, M::Output>, Word<A>) {
        if bisection.middle().is_empty() {
            return self.hyp();
        }
        let (u, v) = bisection.halves();
        let Some(access) = self
            .hypothesis
            .state(&bisection.pre().followed_by(u))
            .map(<[_]>::to_vec)
        else {
            return self.hyp();
        };
        let query = access.followed_by(v).followed_by(bisection.post());
        trace!(
            "probing index {} of {}",
            bisection.probe(),
            bisection.pre().followed_by(bisection.middle()).followed_by(bisection.post()).as_string()
        );
        let activity = Activity::Cex {
            bisection,
            access,
            lower_access,
            lower,
        };
        (activity, query)
    }

    fn cex(
        &mut self,
        bisection: Bisection<A::Symbol>,
        access: Word<A>,
        lower_access: Word<A>,
        lower: M::Output,
        answer: &M::Output,
    ) -> (Activity<A::Symbol, M::Output>, Word<A>) {
        if bisection.is_final() {
            let post = bisection.post();
            let long = lower_access.followed_by(bisection.middle());
            let lower_len = lower_access.len() + 1 + post.len();
            let fact = M::prefix_answer(&lower, lower_len, long.len()).map(|o| (long.clone(), o));
            self.finish(
                access,
                M::classify(answer, post.len()),
                long,
                M::classify(&lower, post.len()),
                post.to_vec(),
                fact,
            );
            return self.hyp();
        }

        let (_, v) = bisection.halves();
        let suffix = v.followed_by(bisection.post());
        let Some(predicted) = self.hypothesis.output_from(&access, &suffix) else {
            return self.hyp();
        };
        if M::agree(&predicted, answer, suffix.len()) {
            self.bisect(bisection.narrow(true), lower_access, lower)
        } else {
            self.bisect(bisection.narrow(false), access, answer.clone())
        }
    }

    /// Separates the state `short` from the word `long` by `suffix` if their keys differ. If
    /// they do not, the disagreement stems from the output of the transition that leads to
    /// `long`, which is described by `fact`.
    fn finish(
        &mut self,
        short: Word<A>,
        short_key: Option<M::Output>,
        long: Word<A>,
        long_key: Option<M::Output>,
        suffix: Word<A>,
        fact: Option<Fact<A::Symbol, M::Output>>,
    ) {
        let (Some(short_key), Some(long_key)) = (short_key, long_key) else {
            return;
        };
        if short_key == long_key {
            if let Some(fact) = fact {
                debug!(
                    "transition into {} produces {}",
                    fact.0.as_string(),
                    fact.1.show()
                );
                self.tree.apply(&[fact]);
            }
            return;
        }
        if short == long {
            return;
        }

        let witness = (short.followed_by(&suffix), short_key.clone());
        if self.tree.find_leaf(&long).is_some() {
            debug!("{} is a state already", long.as_string());
            self.tree.apply(&[witness]);
            return;
        }
        let Some(leaf) = self.tree.find_leaf(&short) else {
            debug!("{} is not a state anymore", short.as_string());
            return;
        };

        debug!(
            "separating {} from {} by {}",
            short.as_string(),
            long.as_string(),
            suffix.as_string()
        );
        self.tree
            .split_leaf(leaf, suffix, short_key, long_key, long.clone());
        let origins: Vec<_> = self
            .tree
            .alphabet()
            .universe()
            .map(|sym| long.with_symbol(sym))
            .collect();
        self.tree.add_root_origins(origins);
        let mut facts = self.tree.implications(&long);
        facts.push(witness);
        self.tree.apply(&facts);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        active::{SimulatorOracle, Target},
        semantics::{Acceptor, Transducer},
    };
    use rand::SeedableRng;

    fn parity() -> Dfa {
        Dfa::builder()
            .with_state_colors([true, false])
            .with_transitions([(0, 'a', 1), (0, 'b', 0), (1, 'a', 0), (1, 'b', 1)])
            .into_dfa_with_initial(0)
    }

    /// Accepts words whose number of a's is divisible by three.
    fn mod_three() -> Dfa {
        Dfa::builder()
            .with_state_colors([true, false, false])
            .with_transitions([
                (0, 'a', 1),
                (0, 'b', 0),
                (1, 'a', 2),
                (1, 'b', 1),
                (2, 'a', 0),
                (2, 'b', 2),
            ])
            .into_dfa_with_initial(0)
    }

    fn learner() -> ContinuousLearner<CharAlphabet, Acceptor> {
        ContinuousLearner::new(alphabet!('a', 'b'), false, 0.8, StdRng::seed_from_u64(7))
    }

    fn run<T: Target<Alphabet = CharAlphabet>>(
        learner: &mut ContinuousLearner<CharAlphabet, T::Semantics>,
        target: &T,
        steps: usize,
    ) {
        for _ in 0..steps {
            let answer = target.respond(learner.query());
            learner.step(&answer);
        }
    }

    #[test_log::test]
    fn first_query_is_pending() {
        let learner = learner();
        assert_eq!(learner.query(), &[] as &[char]);
        assert_eq!(learner.activity(), &Activity::Hyp);
        assert_eq!(learner.hypothesis().size(), 1);

        let mealy: ContinuousLearner<CharAlphabet, Transducer<usize>> =
            ContinuousLearner::new(alphabet!('a', 'b'), 0, 0.8, StdRng::seed_from_u64(7));
        assert_eq!(mealy.query(), &['a']);
    }

    #[test_log::test]
    fn learns_parity() {
        let mut learner = learner();
        let target = parity();
        run(&mut learner, &target, 400);
        let (dfa, _) = learner.hypothesis().to_dfa();
        assert!(dfa.equivalent(&target));
        assert_eq!(learner.tree().leaf_count(), 2);
    }

    #[test_log::test]
    fn relearns_after_a_change() {
        let mut learner = learner();
        run(&mut learner, &parity(), 400);
        let target = mod_three();
        run(&mut learner, &target, 1500);
        let (dfa, _) = learner.hypothesis().to_dfa();
        assert!(dfa.equivalent(&target));
    }

    #[test_log::test]
    fn contradicted_states_are_removed() {
        let mut learner = learner();
        run(&mut learner, &parity(), 400);
        let before = learner.revisions();

        let mut complement = parity();
        complement.set_accepting(0, false);
        complement.set_accepting(1, true);
        run(&mut learner, &complement, 1500);
        assert!(learner.revisions() > before);
        assert_eq!(learner.steps(), 1900);
    }

    #[test_log::test]
    fn learns_a_transducer() {
        // outputs 1 on every second a
        let target: MealyMachine<CharAlphabet, usize> = MealyMachine::builder()
            .with_transitions([
                (0, 'a', 0, 1),
                (0, 'b', 0, 0),
                (1, 'a', 1, 0),
                (1, 'b', 0, 1),
            ])
            .into_mealy_with_initial(0);
        let mut learner: ContinuousLearner<CharAlphabet, Transducer<usize>> =
            ContinuousLearner::new(alphabet!('a', 'b'), 0, 0.8, StdRng::seed_from_u64(3));
        run(&mut learner, &target, 600);
        let (mealy, _) = learner.hypothesis().to_mealy();
        assert!(mealy.equivalent(&target));
    }

    #[test_log::test]
    fn learn_returns_snapshots() {
        let mut learner = learner();
        let mut oracle = SimulatorOracle::new(parity());
        let snapshots = learner.learn(&mut oracle, 250, 100).unwrap();
        let indices: Vec<_> = snapshots.iter().map(|(i, _)| *i).collect();
        assert_eq!(indices, vec![100, 200, 250]);
        assert_eq!(learner.steps(), 250);
    }
}
