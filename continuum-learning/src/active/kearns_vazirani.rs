use std::collections::VecDeque;

use continuum_core::prelude::*;
use tracing::{debug, info, trace};

use crate::{
    datastructure::{DiscriminationTree, NodeId, Sifted},
    semantics::Semantics,
    LearningError,
};

use super::{Bisection, Counterexample, EquivalenceOracle, Hypothesis, MembershipOracle};

type Word<A> = Vec<SymbolOf<A>>;

/// Learner in the style of Kearns and Vazirani. States are the leaves of a
/// [`DiscriminationTree`], the successor of a state on a symbol is found by sifting the
/// extended access sequence through the tree. Counterexamples are analysed by binary search and
/// split exactly one leaf.
///
/// The learner is incremental in two ways: refining only re-sifts the transitions that pointed
/// to the split leaf, and [`KearnsVazirani::resume`] continues from the tree that was built for
/// another target.
#[derive(Debug, Clone)]
pub struct KearnsVazirani<A: Alphabet, M: Semantics<A::Symbol>> {
    tree: DiscriminationTree<A, M>,
    transitions: math::OrderedMap<(Word<A>, A::Symbol), Word<A>>,
    hypothesis: Hypothesis<A, M>,
    filler: M::Filler,
}

impl<A: Alphabet, M: Semantics<A::Symbol>> KearnsVazirani<A, M> {
    /// Creates a learner that has not posed any query yet.
    pub fn new(alphabet: A, filler: M::Filler) -> Self {
        let hypothesis = Hypothesis::from_parts(
            alphabet.clone(),
            filler.clone(),
            None,
            math::OrderedMap::new(),
            [],
        );
        Self {
            tree: DiscriminationTree::single_leaf(alphabet, M::Observation::default()),
            transitions: math::OrderedMap::new(),
            hypothesis,
            filler,
        }
    }

    /// Continues from the tree of `previous`, which may have been learned for a different
    /// target. All observations are gathered anew, leaves that do not sift to themselves are
    /// merged away and all transitions are sifted again.
    pub fn resume<O>(previous: &Self, oracle: &mut O) -> Result<Self, LearningError<A::Symbol>>
    where
        O: MembershipOracle<Alphabet = A, Semantics = M>,
    {
        info!(
            "resuming Kearns-Vazirani from a tree with {} states",
            previous.tree.leaf_count()
        );
        let mut learner = previous.clone();
        learner.tree.clear_observations();
        learner.fill_all(oracle)?;
        learner.minimize(oracle)?;
        learner.transitions.clear();
        learner.close(oracle, VecDeque::new())?;
        learner.rebuild();
        Ok(learner)
    }

    /// The current hypothesis.
    pub fn hypothesis(&self) -> &Hypothesis<A, M> {
        &self.hypothesis
    }

    /// The discrimination tree whose leaves are the states of the hypothesis.
    pub fn tree(&self) -> &DiscriminationTree<A, M> {
        &self.tree
    }

    /// Builds the first hypothesis, discarding everything that was learned before.
    pub fn start<O>(&mut self, oracle: &mut O) -> Result<(), LearningError<A::Symbol>>
    where
        O: MembershipOracle<Alphabet = A, Semantics = M>,
    {
        info!("starting Kearns-Vazirani");
        self.tree =
            DiscriminationTree::single_leaf(self.tree.alphabet().clone(), M::Observation::default());
        self.transitions.clear();
        self.fill_all(oracle)?;
        self.close(oracle, VecDeque::new())?;
        self.rebuild();
        Ok(())
    }

    /// Processes a counterexample. Returns false if the hypothesis already agrees with it.
    pub fn refine<O>(
        &mut self,
        counterexample: &Counterexample<A, M>,
        oracle: &mut O,
    ) -> Result<bool, LearningError<A::Symbol>>
    where
        O: MembershipOracle<Alphabet = A, Semantics = M>,
    {
        let (word, output) = counterexample;
        if self.hypothesis.output(word).as_ref() == Some(output) {
            trace!("{} is not a counterexample", word.as_string());
            return Ok(false);
        }
        if word.is_empty() {
            return Ok(false);
        }

        // the analysis relies on the state reached by the whole word being observed correctly
        let reached = self.state_of(word);
        let answer = oracle.answer(&reached)?;
        let predicted = self
            .hypothesis
            .output_from(&reached, &[])
            .expect("states of the hypothesis are known");
        if !M::agree(&predicted, &answer, 0) {
            debug!("observation of {} is outdated", reached.as_string());
            if let Some(leaf) = self.tree.find_leaf(&reached) {
                if let Some(observation) = self.tree.try_observation_mut(leaf) {
                    M::record(observation, &reached, &reached, &answer);
                }
            }
            self.rebuild();
            return Ok(true);
        }
        debug!(
            "refining with counterexample {} -> {}",
            word.as_string(),
            output.show()
        );

        let mut lower_access: Word<A> = vec![];
        let mut lower = output.clone();
        let mut search = Bisection::new(word.clone());
        while !search.is_final() {
            let (u, v) = search.halves();
            let access = self.state_of(&search.pre().followed_by(u));
            let suffix = v.followed_by(search.post());
            let answer = oracle.answer_split(&access, &suffix)?;
            let predicted = self
                .hypothesis
                .output_from(&access, &suffix)
                .expect("hypothesis is complete after closing");
            let agrees = M::agree(&predicted, &answer, suffix.len());
            if !agrees {
                lower_access = access;
                lower = answer;
            }
            search = search.narrow(agrees);
        }

        let post = search.post().to_vec();
        let short = self.state_of(&search.pre().followed_by(search.middle()));
        let long = lower_access.followed_by(search.middle());
        let answer = oracle.answer_split(&short, &post)?;
        let short_key = M::classify(&answer, post.len());
        let long_key = M::classify(&lower, post.len());

        match (short_key, long_key) {
            (Some(short_key), Some(long_key)) if short_key != long_key && short != long => {
                if self.tree.find_leaf(&long).is_some() {
                    debug!("redirecting transition into existing state {}", long.as_string());
                    if let Some(sym) = search.middle().first() {
                        self.transitions
                            .insert((lower_access.clone(), *sym), long.clone());
                    }
                    self.rebuild();
                    return Ok(true);
                }
                self.split(short, post, short_key, long_key, long, oracle)?;
                self.rebuild();
                Ok(true)
            }
            _ => {
                // the disagreement lies in the output of the transition itself
                let lower_len = lower_access.len() + 1 + post.len();
                let changed = match (
                    M::prefix_answer(&lower, lower_len, long.len()),
                    self.tree.find_leaf(&lower_access),
                ) {
                    (Some(fact), Some(leaf)) => self
                        .tree
                        .try_observation_mut(leaf)
                        .is_some_and(|observation| {
                            let before = observation.clone();
                            M::record(observation, &lower_access, &long, &fact);
                            *observation != before
                        }),
                    _ => false,
                };
                self.rebuild();
                Ok(changed)
            }
        }
    }

    /// Merges leaves whose access sequence sifts to a different leaf, keeping the empty word
    /// as the access sequence of the initial state. Returns true if a leaf was merged.
    pub fn minimize<O>(&mut self, oracle: &mut O) -> Result<bool, LearningError<A::Symbol>>
    where
        O: MembershipOracle<Alphabet = A, Semantics = M>,
    {
        let mut changed = false;
        'search: loop {
            let leaves: Vec<_> = self.tree.leaves().collect();
            for leaf in leaves {
                let Some(access) = self.tree.try_access(leaf).map(<[_]>::to_vec) else {
                    continue;
                };
                if self.tree.sift(&access, oracle)? == Sifted::Leaf(leaf) {
                    continue;
                }
                debug!("state {} does not sift to itself, merging", access.as_string());
                let removed = math::OrderedSet::from_iter([access.clone()]);
                if !self.tree.remove_leaves(&removed) {
                    self.tree = DiscriminationTree::single_leaf(
                        self.tree.alphabet().clone(),
                        M::Observation::default(),
                    );
                }
                if access.is_empty() {
                    self.ensure_initial(oracle)?;
                }
                changed = true;
                continue 'search;
            }
            break;
        }

        if changed {
            self.fill_all(oracle)?;
            self.transitions.clear();
            self.close(oracle, VecDeque::new())?;
            self.rebuild();
        }
        Ok(changed)
    }

    fn ensure_initial<O>(&mut self, oracle: &mut O) -> Result<(), LearningError<A::Symbol>>
    where
        O: MembershipOracle<Alphabet = A, Semantics = M>,
    {
        let leaf = match self.tree.sift(&[], oracle)? {
            Sifted::Leaf(leaf) => {
                self.tree.set_access(leaf, vec![]);
                if let Some(observation) = self.tree.try_observation_mut(leaf) {
                    *observation = M::Observation::default();
                }
                leaf
            }
            Sifted::Unknown { node, key } => {
                self.tree
                    .add_leaf(node, key, vec![], M::Observation::default())
            }
        };
        self.fill(leaf, oracle)
    }

    fn state_of(&self, word: &[A::Symbol]) -> Word<A> {
        self.hypothesis
            .state(word)
            .expect("hypothesis is complete after closing")
            .to_vec()
    }

    fn split<O>(
        &mut self,
        short: Word<A>,
        discriminator: Word<A>,
        short_key: M::Output,
        long_key: M::Output,
        long: Word<A>,
        oracle: &mut O,
    ) -> Result<(), LearningError<A::Symbol>>
    where
        O: MembershipOracle<Alphabet = A, Semantics = M>,
    {
        let leaf = self
            .tree
            .find_leaf(&short)
            .expect("states of the hypothesis are leaves");
        let new = self
            .tree
            .split_leaf(leaf, discriminator, short_key, long_key, long);
        self.fill(new, oracle)?;

        let node = self
            .tree
            .try_parent(leaf)
            .expect("a split leaf has a parent");
        let mut pending = VecDeque::new();
        self.transitions.retain(|(source, sym), target| {
            if *target == short {
                pending.push_back((node, source.clone(), *sym));
                false
            } else {
                true
            }
        });
        self.close(oracle, pending)
    }

    fn fill_all<O>(&mut self, oracle: &mut O) -> Result<(), LearningError<A::Symbol>>
    where
        O: MembershipOracle<Alphabet = A, Semantics = M>,
    {
        let leaves: Vec<_> = self.tree.leaves().collect();
        for leaf in leaves {
            self.fill(leaf, oracle)?;
        }
        Ok(())
    }

    fn fill<O>(&mut self, leaf: NodeId, oracle: &mut O) -> Result<(), LearningError<A::Symbol>>
    where
        O: MembershipOracle<Alphabet = A, Semantics = M>,
    {
        let Some(access) = self.tree.try_access(leaf).map(<[_]>::to_vec) else {
            return Ok(());
        };
        loop {
            let Some(query) = self.tree.try_observation(leaf).and_then(|observation| {
                M::missing(observation, &access, self.tree.alphabet().universe())
            }) else {
                return Ok(());
            };
            let answer = oracle.answer(&query)?;
            let recorded = self
                .tree
                .try_observation_mut(leaf)
                .is_some_and(|observation| M::record(observation, &access, &query, &answer));
            if !recorded {
                return Ok(());
            }
        }
    }

    /// Sifts the given transitions starting at the given nodes, followed by every transition
    /// that is not yet known. States discovered along the way are added to the tree.
    fn close<O>(
        &mut self,
        oracle: &mut O,
        mut pending: VecDeque<(NodeId, Word<A>, A::Symbol)>,
    ) -> Result<(), LearningError<A::Symbol>>
    where
        O: MembershipOracle<Alphabet = A, Semantics = M>,
    {
        let root = self.tree.root();
        for leaf in self.tree.leaves() {
            let Some(access) = self.tree.try_access(leaf) else {
                continue;
            };
            for sym in self.tree.alphabet().universe() {
                let key = (access.to_vec(), sym);
                if !self.transitions.contains_key(&key)
                    && !pending.iter().any(|(_, s, a)| s == &key.0 && *a == sym)
                {
                    pending.push_back((root, key.0, sym));
                }
            }
        }

        while let Some((start, source, sym)) = pending.pop_front() {
            let word = source.with_symbol(sym);
            let target = match self.tree.sift_from(start, &word, oracle)? {
                Sifted::Leaf(leaf) => self
                    .tree
                    .try_access(leaf)
                    .map(<[_]>::to_vec)
                    .expect("sifting ends in a leaf"),
                Sifted::Unknown { node, key } => {
                    debug!("sifting {} revealed a new state", word.as_string());
                    let leaf =
                        self.tree
                            .add_leaf(node, key, word.clone(), M::Observation::default());
                    self.fill(leaf, oracle)?;
                    let root = self.tree.root();
                    for next in self.tree.alphabet().universe() {
                        pending.push_back((root, word.clone(), next));
                    }
                    word
                }
            };
            self.transitions.insert((source, sym), target);
        }
        Ok(())
    }

    fn rebuild(&mut self) {
        let states = self
            .tree
            .leaves()
            .filter_map(|leaf| {
                Some((
                    self.tree.try_access(leaf)?.to_vec(),
                    self.tree.try_observation(leaf)?.clone(),
                ))
            })
            .collect();
        self.hypothesis = Hypothesis::from_parts(
            self.tree.alphabet().clone(),
            self.filler.clone(),
            Some(vec![]),
            states,
            self.transitions
                .iter()
                .map(|((source, sym), target)| (source.clone(), *sym, target.clone())),
        );
    }

    /// Learns until the equivalence oracle does not find a counterexample anymore.
    pub fn learn<O>(&mut self, oracle: &mut O) -> Result<(), LearningError<A::Symbol>>
    where
        O: MembershipOracle<Alphabet = A, Semantics = M>
            + EquivalenceOracle<Alphabet = A, Semantics = M>,
    {
        self.start(oracle)?;
        while let Some(counterexample) = oracle.find_counterexample(&self.hypothesis)? {
            if !self.refine(&counterexample, oracle)? {
                break;
            }
        }
        info!(
            "Kearns-Vazirani finished with {} states",
            self.hypothesis.size()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        active::{CountingOracle, SimulatorOracle},
        semantics::{Acceptor, Transducer},
    };

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

    #[test_log::test]
    fn learns_mod_three() {
        let mut oracle = SimulatorOracle::new(mod_three());
        let mut learner: KearnsVazirani<_, Acceptor> = KearnsVazirani::new(alphabet!('a', 'b'), false);
        learner.learn(&mut oracle).unwrap();
        let (dfa, _) = learner.hypothesis().to_dfa();
        assert!(dfa.equivalent(&mod_three()));
        assert_eq!(learner.tree().leaf_count(), 3);
        assert_eq!(learner.hypothesis().initial(), Some(&[][..]));
    }

    #[test_log::test]
    fn refine_ignores_words_that_agree() {
        let mut oracle = SimulatorOracle::new(mod_three());
        let mut learner: KearnsVazirani<_, Acceptor> = KearnsVazirani::new(alphabet!('a', 'b'), false);
        learner.start(&mut oracle).unwrap();
        assert_eq!(learner.hypothesis().size(), 1);
        assert_eq!(learner.refine(&(vec!['b'], true), &mut oracle), Ok(false));
        assert_eq!(learner.refine(&(vec!['a'], false), &mut oracle), Ok(true));
        assert_eq!(learner.hypothesis().size(), 2);
    }

    #[test_log::test]
    fn learns_a_transducer() {
        let target: MealyMachine<CharAlphabet, usize> = MealyMachine::builder()
            .with_transitions([
                (0, 'a', 0, 1),
                (0, 'b', 0, 0),
                (1, 'a', 1, 0),
                (1, 'b', 0, 1),
            ])
            .into_mealy_with_initial(0);
        let mut oracle = SimulatorOracle::new(target.clone());
        let mut learner: KearnsVazirani<_, Transducer<usize>> =
            KearnsVazirani::new(alphabet!('a', 'b'), 0);
        learner.learn(&mut oracle).unwrap();
        let (mealy, _) = learner.hypothesis().to_mealy();
        assert!(mealy.equivalent(&target));
    }

    #[test_log::test]
    fn every_state_observes_all_transition_outputs() {
        let target: MealyMachine<CharAlphabet, usize> = MealyMachine::builder()
            .with_transitions([
                (0, 'a', 0, 1),
                (0, 'b', 2, 0),
                (1, 'a', 1, 0),
                (1, 'b', 0, 1),
            ])
            .into_mealy_with_initial(0);
        let mut oracle = SimulatorOracle::new(target.clone());
        let mut learner: KearnsVazirani<_, Transducer<usize>> =
            KearnsVazirani::new(alphabet!('a', 'b'), 0);
        learner.learn(&mut oracle).unwrap();

        let tree = learner.tree();
        assert_eq!(tree.leaf_count(), 2);
        for leaf in tree.leaves() {
            let access = tree.try_access(leaf).unwrap();
            let observation = tree.try_observation(leaf).unwrap();
            assert_eq!(
                <Transducer<usize> as Semantics<char>>::missing(observation, access, ['a', 'b']),
                None,
                "{} has unobserved transitions",
                access.as_string()
            );
        }
        assert_eq!(learner.hypothesis().output(&['b', 'a', 'a']), Some(vec![2, 0, 1]));
    }

    #[test_log::test]
    fn resume_merges_states_of_the_old_target() {
        let mut oracle = SimulatorOracle::new(mod_three());
        let mut learner: KearnsVazirani<_, Acceptor> = KearnsVazirani::new(alphabet!('a', 'b'), false);
        learner.learn(&mut oracle).unwrap();

        // accepts words with an even number of a's
        let parity = Dfa::builder()
            .with_state_colors([true, false])
            .with_transitions([(0, 'a', 1), (0, 'b', 0), (1, 'a', 0), (1, 'b', 1)])
            .into_dfa_with_initial(0);
        let mut counting = CountingOracle::new(SimulatorOracle::new(parity.clone()));
        let mut resumed = KearnsVazirani::resume(&learner, &mut counting).unwrap();
        assert!(counting.count() > 0);
        assert_eq!(resumed.hypothesis().initial(), Some(&[][..]));

        let mut oracle = SimulatorOracle::new(parity.clone());
        while let Some(cex) = oracle.find_counterexample(resumed.hypothesis()).unwrap() {
            assert!(resumed.refine(&cex, &mut oracle).unwrap());
        }
        let (dfa, _) = resumed.hypothesis().to_dfa();
        assert!(dfa.equivalent(&parity));
    }
}
