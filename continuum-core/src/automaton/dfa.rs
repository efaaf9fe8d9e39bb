use std::collections::VecDeque;
use std::fmt::Debug;

use itertools::Itertools;

use crate::{
    alphabet::{Alphabet, CharAlphabet},
    math,
    word::FiniteWord,
    Show,
};

use super::{access_sequences, reachable_in_bfs_order, refine_partition, StateIndex};

/// A deterministic finite automaton. States are numbered consecutively starting from zero, each
/// state is either accepting or rejecting and has at most one successor per symbol. A word whose
/// run leaves the defined transitions is rejected.
#[derive(Clone)]
pub struct Dfa<A: Alphabet = CharAlphabet> {
    alphabet: A,
    initial: StateIndex,
    accepting: Vec<bool>,
    transitions: Vec<math::OrderedMap<A::Symbol, StateIndex>>,
}

impl<A: Alphabet> Dfa<A> {
    /// Creates an automaton with a single state, which is initial and accepting iff `accepting`
    /// is true. The state has no outgoing transitions.
    pub fn new(alphabet: A, accepting: bool) -> Self {
        Self {
            alphabet,
            initial: 0,
            accepting: vec![accepting],
            transitions: vec![math::OrderedMap::new()],
        }
    }

    /// Returns a reference to the alphabet.
    pub fn alphabet(&self) -> &A {
        &self.alphabet
    }

    /// Returns the number of states.
    pub fn size(&self) -> usize {
        self.accepting.len()
    }

    /// Returns the initial state.
    pub fn initial(&self) -> StateIndex {
        self.initial
    }

    /// Makes `state` the initial state.
    pub fn set_initial(&mut self, state: StateIndex) {
        assert!(state < self.size(), "state {state} does not exist");
        self.initial = state;
    }

    /// Iterates over all state indices.
    pub fn states(&self) -> std::ops::Range<StateIndex> {
        0..self.size()
    }

    /// Adds a state without outgoing transitions and returns its index.
    pub fn add_state(&mut self, accepting: bool) -> StateIndex {
        self.accepting.push(accepting);
        self.transitions.push(math::OrderedMap::new());
        self.size() - 1
    }

    /// Returns whether `state` is accepting.
    pub fn is_accepting(&self, state: StateIndex) -> bool {
        self.accepting[state]
    }

    /// Sets whether `state` is accepting.
    pub fn set_accepting(&mut self, state: StateIndex, accepting: bool) {
        self.accepting[state] = accepting;
    }

    /// Sets the transition from `source` on `symbol` to `target`, returning the previous target.
    pub fn set_transition(
        &mut self,
        source: StateIndex,
        symbol: A::Symbol,
        target: StateIndex,
    ) -> Option<StateIndex> {
        assert!(
            source < self.size() && target < self.size(),
            "transition ({source}, {symbol:?}, {target}) between unknown states"
        );
        debug_assert!(self.alphabet.contains(symbol));
        self.transitions[source].insert(symbol, target)
    }

    /// Returns the successor of `state` on `symbol`.
    pub fn successor(&self, state: StateIndex, symbol: A::Symbol) -> Option<StateIndex> {
        self.transitions.get(state)?.get(&symbol).copied()
    }

    /// Returns the state that is reached by reading `word` from `state`.
    pub fn reached_from<W: FiniteWord<A::Symbol> + ?Sized>(
        &self,
        state: StateIndex,
        word: &W,
    ) -> Option<StateIndex> {
        word.symbols()
            .try_fold(state, |current, sym| self.successor(current, sym))
    }

    /// Returns the state that is reached by reading `word` from the initial state.
    pub fn reached<W: FiniteWord<A::Symbol> + ?Sized>(&self, word: &W) -> Option<StateIndex> {
        self.reached_from(self.initial, word)
    }

    /// Decides whether `word` is accepted.
    pub fn accepts<W: FiniteWord<A::Symbol> + ?Sized>(&self, word: &W) -> bool {
        self.reached(word)
            .map(|q| self.is_accepting(q))
            .unwrap_or(false)
    }

    /// Returns true if every state has a successor on every symbol.
    pub fn is_complete(&self) -> bool {
        self.states().all(|q| {
            self.alphabet
                .universe()
                .all(|sym| self.successor(q, sym).is_some())
        })
    }

    /// Shortest access sequence for each reachable state.
    pub fn access_sequences(&self) -> math::OrderedMap<StateIndex, Vec<A::Symbol>> {
        access_sequences(&self.alphabet, self.initial, |q, a| self.successor(q, a))
    }

    /// Returns the automaton restricted to the states that are reachable from the initial
    /// state. States are renumbered in breadth-first order, the initial state becomes `0`.
    pub fn trim(&self) -> Self {
        let order = reachable_in_bfs_order(&self.alphabet, self.initial, |q, a| self.successor(q, a));
        let renaming: math::Map<StateIndex, StateIndex> =
            order.iter().enumerate().map(|(new, old)| (*old, new)).collect();

        let mut out = Self::new(self.alphabet.clone(), self.is_accepting(self.initial));
        for old in order.iter().skip(1) {
            out.add_state(self.is_accepting(*old));
        }
        for (old, new) in &renaming {
            for (sym, target) in &self.transitions[*old] {
                out.set_transition(*new, *sym, renaming[target]);
            }
        }
        out
    }

    /// Computes the minimal automaton accepting the same language, restricted to the reachable
    /// part. Missing transitions are treated as leading into a rejecting sink, which is only
    /// materialized if it is reachable.
    pub fn minimize(&self) -> Self {
        let complete = self.trim().completed();
        let classes = refine_partition(
            &complete.alphabet,
            complete.size(),
            |q| complete.is_accepting(q),
            |q, a| complete.successor(q, a),
        );
        let count = classes.iter().max().map_or(0, |m| m + 1);
        let mut accepting = vec![false; count];
        for q in complete.states() {
            accepting[classes[q]] = complete.is_accepting(q);
        }

        let mut out = Self::new(complete.alphabet.clone(), accepting[0]);
        for class_accepting in accepting.iter().skip(1) {
            out.add_state(*class_accepting);
        }
        out.set_initial(classes[complete.initial]);
        for q in complete.states() {
            for (sym, target) in &complete.transitions[q] {
                out.set_transition(classes[q], *sym, classes[*target]);
            }
        }
        out.trim()
    }

    /// Adds a rejecting sink for all missing transitions, if there are any.
    fn completed(&self) -> Self {
        if self.is_complete() {
            return self.clone();
        }
        let mut out = self.clone();
        let sink = out.add_state(false);
        for q in out.states() {
            for sym in self.alphabet.universe() {
                if out.successor(q, sym).is_none() {
                    out.set_transition(q, sym, sink);
                }
            }
        }
        out
    }

    /// Finds a shortest word on which `self` and `other` disagree, or `None` if they accept
    /// the same language. Runs that leave the defined transitions count as rejecting.
    pub fn separating_word(&self, other: &Dfa<A>) -> Option<Vec<A::Symbol>> {
        type Pair = (Option<StateIndex>, Option<StateIndex>);
        let accepting = |pair: &Pair| {
            (
                pair.0.map(|q| self.is_accepting(q)).unwrap_or(false),
                pair.1.map(|q| other.is_accepting(q)).unwrap_or(false),
            )
        };

        let start: Pair = (Some(self.initial), Some(other.initial));
        let mut seen = math::Set::from_iter([start]);
        let mut queue = VecDeque::from([(start, vec![])]);
        while let Some((pair, word)) = queue.pop_front() {
            let (left, right) = accepting(&pair);
            if left != right {
                return Some(word);
            }
            for sym in self.alphabet.universe() {
                let next = (
                    pair.0.and_then(|q| self.successor(q, sym)),
                    pair.1.and_then(|q| other.successor(q, sym)),
                );
                if next != (None, None) && seen.insert(next) {
                    queue.push_back((next, word.with_symbol(sym)));
                }
            }
        }
        None
    }

    /// Returns true if both automata accept the same language.
    pub fn equivalent(&self, other: &Dfa<A>) -> bool {
        self.separating_word(other).is_none()
    }
}

impl<A: Alphabet> Debug for Dfa<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "DFA over {:?} with initial state {}", self.alphabet, self.initial)?;
        for q in self.states() {
            writeln!(
                f,
                "{}{} {}",
                q,
                if self.is_accepting(q) { "+" } else { "-" },
                self.transitions[q]
                    .iter()
                    .map(|(sym, p)| format!("{}->{}", sym.show(), p))
                    .join(" ")
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::prelude::*;

    /// Accepts words over {a, b} with an even number of a's.
    fn even_as() -> Dfa {
        Dfa::builder()
            .with_state_colors([true, false])
            .with_transitions([(0, 'a', 1), (0, 'b', 0), (1, 'a', 0), (1, 'b', 1)])
            .into_dfa_with_initial(0)
    }

    #[test_log::test]
    fn runs_and_acceptance() {
        let dfa = even_as();
        assert!(dfa.accepts(""));
        assert!(dfa.accepts("abba"));
        assert!(!dfa.accepts("ab"));
        assert_eq!(dfa.reached("bab"), Some(1));
        assert!(dfa.is_complete());
        assert_eq!(dfa.access_sequences()[&1], vec!['a']);
    }

    #[test_log::test]
    fn minimization_merges_equivalent_states() {
        let redundant = Dfa::builder()
            .with_state_colors([true, false, true, false])
            .with_transitions([
                (0, 'a', 1),
                (0, 'b', 2),
                (1, 'a', 2),
                (1, 'b', 3),
                (2, 'a', 3),
                (2, 'b', 0),
                (3, 'a', 0),
                (3, 'b', 1),
            ])
            .into_dfa_with_initial(0);
        let minimal = redundant.minimize();
        assert_eq!(minimal.size(), 2);
        assert!(minimal.equivalent(&redundant));
        assert!(minimal.equivalent(&even_as()));
    }

    #[test_log::test]
    fn separating_words_are_shortest() {
        let dfa = even_as();
        let mut other = dfa.clone();
        other.set_accepting(1, true);
        assert_eq!(dfa.separating_word(&other), Some(vec!['a']));
        assert_eq!(dfa.separating_word(&dfa), None);

        let partial = Dfa::builder()
            .with_state_colors([true])
            .with_transitions([(0, 'b', 0)])
            .with_alphabet(alphabet!('a', 'b'))
            .into_dfa_with_initial(0);
        assert_eq!(dfa.separating_word(&partial), Some(vec!['a', 'a']));
        assert_eq!(partial.minimize().size(), 2);
    }

    #[test_log::test]
    fn trimming_removes_unreachable_states() {
        let mut dfa = even_as();
        let unreachable = dfa.add_state(true);
        dfa.set_transition(unreachable, 'a', 0);
        assert_eq!(dfa.size(), 3);
        let trimmed = dfa.trim();
        assert_eq!(trimmed.size(), 2);
        assert!(trimmed.equivalent(&dfa));
    }
}
