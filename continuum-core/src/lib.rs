//! Basic building blocks for learning finite-state models: alphabets and symbols, finite words,
//! the models that serve as targets of a learner and random generation of such targets.
#![deny(missing_docs)]
use std::{fmt::Debug, hash::Hash};

/// Type aliases for the collections that are used throughout the workspace.
pub mod math;

mod show;
pub use show::{show_duration, Show};

/// Defines what symbols and alphabets are.
pub mod alphabet;

/// Finite words over some alphabet.
pub mod word;

/// Deterministic finite automata and Mealy machines, which are used as targets for learning
/// and as the result of exporting a learned hypothesis.
pub mod automaton;

/// Random generation of targets and words, as well as mutation operators on targets.
pub mod random;

/// A color is simply a type that can be used to label states or transitions, for example
/// the outputs of a Mealy machine.
pub trait Color: Clone + Eq + Hash + Debug {}

impl<T: Eq + Clone + Hash + Debug> Color for T {}

/// Re-exports the most commonly used items.
pub mod prelude {
    pub use super::{
        alphabet,
        alphabet::{Alphabet, CharAlphabet, Symbol, SymbolOf},
        automaton::{Dfa, DfaBuilder, MealyBuilder, MealyMachine, StateIndex},
        math,
        word::FiniteWord,
        Color, Show,
    };
}
