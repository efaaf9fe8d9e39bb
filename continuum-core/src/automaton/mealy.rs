use std::collections::VecDeque;
use std::fmt::Debug;

use itertools::Itertools;

use crate::{
    alphabet::{Alphabet, CharAlphabet},
    math,
    word::FiniteWord,
    Color, Show,
};

use super::{access_sequences, reachable_in_bfs_order, refine_partition, StateIndex};

/// A Mealy machine: a deterministic transition system where every transition emits an output.
/// Reading a word produces an output word of the same length.
#[derive(Clone)]
pub struct MealyMachine<A: Alphabet = CharAlphabet, O = usize> {
    alphabet: A,
    initial: StateIndex,
    transitions: Vec<math::OrderedMap<A::Symbol, (StateIndex, O)>>,
}

impl<A: Alphabet, O: Color> MealyMachine<A, O> {
    /// Creates a machine with a single state and no transitions.
    pub fn new(alphabet: A) -> Self {
        Self {
            alphabet,
            initial: 0,
            transitions: vec![math::OrderedMap::new()],
        }
    }

    /// Returns a reference to the alphabet.
    pub fn alphabet(&self) -> &A {
        &self.alphabet
    }

    /// Returns the number of states.
    pub fn size(&self) -> usize {
        self.transitions.len()
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
    pub fn add_state(&mut self) -> StateIndex {
        self.transitions.push(math::OrderedMap::new());
        self.size() - 1
    }

    /// Sets the transition from `source` on `symbol`, returning the previous target and output.
    pub fn set_transition(
        &mut self,
        source: StateIndex,
        symbol: A::Symbol,
        output: O,
        target: StateIndex,
    ) -> Option<(StateIndex, O)> {
        assert!(
            source < self.size() && target < self.size(),
            "transition ({source}, {symbol:?}, {target}) between unknown states"
        );
        debug_assert!(self.alphabet.contains(symbol));
        self.transitions[source].insert(symbol, (target, output))
    }

    /// Returns the successor and the output of the transition from `state` on `symbol`.
    pub fn transition(&self, state: StateIndex, symbol: A::Symbol) -> Option<(StateIndex, &O)> {
        self.transitions
            .get(state)?
            .get(&symbol)
            .map(|(target, output)| (*target, output))
    }

    /// Returns the successor of `state` on `symbol`.
    pub fn successor(&self, state: StateIndex, symbol: A::Symbol) -> Option<StateIndex> {
        self.transition(state, symbol).map(|(target, _)| target)
    }

    /// Returns the state that is reached by reading `word` from the initial state.
    pub fn reached<W: FiniteWord<A::Symbol> + ?Sized>(&self, word: &W) -> Option<StateIndex> {
        word.symbols()
            .try_fold(self.initial, |current, sym| self.successor(current, sym))
    }

    /// Produces the output word for `word`, or `None` if the run leaves the defined transitions.
    pub fn transform<W: FiniteWord<A::Symbol> + ?Sized>(&self, word: &W) -> Option<Vec<O>> {
        let mut state = self.initial;
        let mut out = Vec::new();
        for sym in word.symbols() {
            let (target, output) = self.transition(state, sym)?;
            out.push(output.clone());
            state = target;
        }
        Some(out)
    }

    /// Returns the output that is produced on the last symbol of `word`.
    pub fn last_output<W: FiniteWord<A::Symbol> + ?Sized>(&self, word: &W) -> Option<O> {
        self.transform(word)?.pop()
    }

    /// Returns true if every state has a transition on every symbol.
    pub fn is_complete(&self) -> bool {
        self.states().all(|q| {
            self.alphabet
                .universe()
                .all(|sym| self.transition(q, sym).is_some())
        })
    }

    /// Shortest access sequence for each reachable state.
    pub fn access_sequences(&self) -> math::OrderedMap<StateIndex, Vec<A::Symbol>> {
        access_sequences(&self.alphabet, self.initial, |q, a| self.successor(q, a))
    }

    /// Returns the machine restricted to its reachable states, renumbered in breadth-first order.
    pub fn trim(&self) -> Self {
        let order = reachable_in_bfs_order(&self.alphabet, self.initial, |q, a| self.successor(q, a));
        let renaming: math::Map<StateIndex, StateIndex> =
            order.iter().enumerate().map(|(new, old)| (*old, new)).collect();

        let mut out = Self::new(self.alphabet.clone());
        for _ in 1..renaming.len() {
            out.add_state();
        }
        for (old, new) in &renaming {
            for (sym, (target, output)) in &self.transitions[*old] {
                out.set_transition(*new, *sym, output.clone(), renaming[target]);
            }
        }
        out
    }

    /// Computes the minimal machine with the same behaviour on the reachable part. Missing
    /// transitions are kept missing, two states are only merged if they agree on which
    /// transitions are defined.
    pub fn minimize(&self) -> Self {
        let trimmed = self.trim();
        let mut interned: math::Map<&O, usize> = math::Map::new();
        let signatures = trimmed
            .states()
            .map(|q| {
                trimmed
                    .alphabet
                    .universe()
                    .map(|sym| {
                        trimmed.transition(q, sym).map(|(_, o)| {
                            let next = interned.len();
                            *interned.entry(o).or_insert(next)
                        })
                    })
                    .collect_vec()
            })
            .collect_vec();
        let classes = refine_partition(
            &trimmed.alphabet,
            trimmed.size(),
            |q| signatures[q].clone(),
            |q, a| trimmed.successor(q, a),
        );
        let count = classes.iter().max().map_or(0, |m| m + 1);
        let mut out = Self::new(trimmed.alphabet.clone());
        for _ in 1..count {
            out.add_state();
        }
        out.set_initial(classes[trimmed.initial]);
        for q in trimmed.states() {
            for (sym, (target, output)) in &trimmed.transitions[q] {
                out.set_transition(classes[q], *sym, output.clone(), classes[*target]);
            }
        }
        out.trim()
    }

    /// Finds a shortest word on which the two machines produce different outputs, a word on
    /// which only one of them is defined also separates them.
    pub fn separating_word(&self, other: &MealyMachine<A, O>) -> Option<Vec<A::Symbol>> {
        let start = (self.initial, other.initial);
        let mut seen = math::Set::from_iter([start]);
        let mut queue = VecDeque::from([(start, Vec::new())]);
        while let Some(((p, q), word)) = queue.pop_front() {
            for sym in self.alphabet.universe() {
                match (self.transition(p, sym), other.transition(q, sym)) {
                    (Some((p2, o1)), Some((q2, o2))) => {
                        if o1 != o2 {
                            return Some(word.with_symbol(sym));
                        }
                        if seen.insert((p2, q2)) {
                            queue.push_back(((p2, q2), word.with_symbol(sym)));
                        }
                    }
                    (None, None) => {}
                    _ => return Some(word.with_symbol(sym)),
                }
            }
        }
        None
    }

    /// Returns true if both machines produce the same output on every word.
    pub fn equivalent(&self, other: &MealyMachine<A, O>) -> bool {
        self.separating_word(other).is_none()
    }
}

impl<A: Alphabet, O: Debug> Debug for MealyMachine<A, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "Mealy machine over {:?} with initial state {}",
            self.alphabet, self.initial
        )?;
        for (q, edges) in self.transitions.iter().enumerate() {
            writeln!(
                f,
                "{} {}",
                q,
                edges
                    .iter()
                    .map(|(sym, (p, o))| format!("{}|{:?}->{}", sym.show(), o, p))
                    .join(" ")
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::prelude::*;

    /// Outputs 1 whenever the symbol read equals the previous one.
    fn repeat_detector() -> MealyMachine<CharAlphabet, usize> {
        MealyMachine::builder()
            .with_transitions([
                (0, 'a', 0, 1),
                (0, 'b', 0, 2),
                (1, 'a', 1, 1),
                (1, 'b', 0, 2),
                (2, 'a', 0, 1),
                (2, 'b', 1, 2),
            ])
            .into_mealy_with_initial(0)
    }

    #[test_log::test]
    fn transforms_words() {
        let mealy = repeat_detector();
        assert_eq!(mealy.transform("aabbb"), Some(vec![0, 1, 0, 1, 1]));
        assert_eq!(mealy.transform(""), Some(vec![]));
        assert_eq!(mealy.last_output("ab"), Some(0));
        assert!(mealy.is_complete());
        assert_eq!(mealy.reached("ab"), Some(2));
    }

    #[test_log::test]
    fn minimization_and_separation() {
        let mealy = repeat_detector();
        assert_eq!(mealy.minimize().size(), 3);
        assert!(mealy.minimize().equivalent(&mealy));

        let mut changed = mealy.clone();
        changed.set_transition(2, 'b', 0, 2);
        assert_eq!(mealy.separating_word(&changed), Some(vec!['b', 'b']));

        let constant = MealyMachine::builder()
            .with_transitions([(0, 'a', 0, 1), (0, 'b', 0, 1), (1, 'a', 0, 0), (1, 'b', 0, 0)])
            .into_mealy_with_initial(0);
        assert_eq!(constant.minimize().size(), 1);
    }
}
