use itertools::Itertools;

use crate::{alphabet::CharAlphabet, Color};

use super::{Dfa, MealyMachine, StateIndex};

/// Helper for constructing a [`Dfa`] over characters from a list of state colors and
/// transitions. If no alphabet is given explicitly, it consists of the symbols that
/// appear on the transitions.
///
/// ```
/// use continuum_core::prelude::*;
/// let dfa = Dfa::builder()
///     .with_state_colors([false, true])
///     .with_transitions([(0, 'a', 1), (1, 'a', 0)])
///     .into_dfa_with_initial(0);
/// assert!(dfa.accepts("aaa"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct DfaBuilder {
    alphabet: Option<CharAlphabet>,
    colors: Vec<bool>,
    transitions: Vec<(StateIndex, char, StateIndex)>,
}

impl DfaBuilder {
    /// Sets the acceptance of the states `0, 1, ...` in order.
    pub fn with_state_colors<I: IntoIterator<Item = bool>>(mut self, colors: I) -> Self {
        self.colors = colors.into_iter().collect();
        self
    }

    /// Adds the given transitions.
    pub fn with_transitions<I: IntoIterator<Item = (StateIndex, char, StateIndex)>>(
        mut self,
        transitions: I,
    ) -> Self {
        self.transitions.extend(transitions);
        self
    }

    /// Uses the given alphabet instead of the one derived from the transitions.
    pub fn with_alphabet(mut self, alphabet: CharAlphabet) -> Self {
        self.alphabet = Some(alphabet);
        self
    }

    /// Builds the automaton.
    ///
    /// # Panics
    /// If a transition or the initial state refers to a state without a color.
    pub fn into_dfa_with_initial(self, initial: StateIndex) -> Dfa<CharAlphabet> {
        let alphabet = self.alphabet.unwrap_or_else(|| {
            CharAlphabet::new(self.transitions.iter().map(|(_, sym, _)| *sym).sorted())
        });
        assert!(!self.colors.is_empty(), "at least one state color is needed");

        let mut dfa = Dfa::new(alphabet, self.colors[0]);
        for color in self.colors.iter().skip(1) {
            dfa.add_state(*color);
        }
        for (source, sym, target) in self.transitions {
            dfa.set_transition(source, sym, target);
        }
        dfa.set_initial(initial);
        dfa
    }
}

impl Dfa<CharAlphabet> {
    /// Returns a [`DfaBuilder`].
    pub fn builder() -> DfaBuilder {
        DfaBuilder::default()
    }
}

/// Helper for constructing a [`MealyMachine`] over characters. The number of states is
/// determined by the largest state index that appears in a transition.
#[derive(Debug, Clone)]
pub struct MealyBuilder<O> {
    alphabet: Option<CharAlphabet>,
    transitions: Vec<(StateIndex, char, O, StateIndex)>,
}

impl<O> Default for MealyBuilder<O> {
    fn default() -> Self {
        Self {
            alphabet: None,
            transitions: vec![],
        }
    }
}

impl<O: Color> MealyBuilder<O> {
    /// Adds the given transitions, each given as `(source, symbol, output, target)`.
    pub fn with_transitions<I: IntoIterator<Item = (StateIndex, char, O, StateIndex)>>(
        mut self,
        transitions: I,
    ) -> Self {
        self.transitions.extend(transitions);
        self
    }

    /// Uses the given alphabet instead of the one derived from the transitions.
    pub fn with_alphabet(mut self, alphabet: CharAlphabet) -> Self {
        self.alphabet = Some(alphabet);
        self
    }

    /// Builds the machine.
    pub fn into_mealy_with_initial(self, initial: StateIndex) -> MealyMachine<CharAlphabet, O> {
        let alphabet = self.alphabet.unwrap_or_else(|| {
            CharAlphabet::new(self.transitions.iter().map(|(_, sym, _, _)| *sym).sorted())
        });
        let size = self
            .transitions
            .iter()
            .flat_map(|(p, _, _, q)| [*p, *q])
            .chain(std::iter::once(initial))
            .max()
            .map_or(1, |max| max + 1);

        let mut mealy = MealyMachine::new(alphabet);
        for _ in 1..size {
            mealy.add_state();
        }
        for (source, sym, output, target) in self.transitions {
            mealy.set_transition(source, sym, output, target);
        }
        mealy.set_initial(initial);
        mealy
    }
}

impl<O: Color> MealyMachine<CharAlphabet, O> {
    /// Returns a [`MealyBuilder`].
    pub fn builder() -> MealyBuilder<O> {
        MealyBuilder::default()
    }
}
