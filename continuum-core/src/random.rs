use rand::{seq::SliceRandom, Rng};
use tracing::trace;

use crate::{
    alphabet::Alphabet,
    automaton::{Dfa, MealyMachine, StateIndex},
    Color,
};

/// Draws a random word. Starting from a word of length `min_len`, further symbols are appended
/// as long as a coin with success probability `continue_probability` comes up heads, so the
/// length of the word follows a geometric distribution. Every symbol is drawn uniformly.
pub fn random_word<A: Alphabet, R: Rng + ?Sized>(
    rng: &mut R,
    alphabet: &A,
    continue_probability: f64,
    min_len: usize,
) -> Vec<A::Symbol> {
    let mut word = Vec::with_capacity(min_len);
    while word.len() < min_len || rng.gen_bool(continue_probability.clamp(0.0, 1.0)) {
        word.push(random_symbol(rng, alphabet));
    }
    word
}

/// Draws a symbol uniformly from the alphabet.
///
/// # Panics
/// If the alphabet is empty.
pub fn random_symbol<A: Alphabet, R: Rng + ?Sized>(rng: &mut R, alphabet: &A) -> A::Symbol {
    let position = rng.gen_range(0..alphabet.size());
    alphabet
        .nth(position)
        .expect("position is within the alphabet")
}

/// Fills the transitions of states `0..size` randomly. To keep all states reachable, every
/// state `q > 0` first receives one transition from a state with a smaller index, the remaining
/// transitions point to uniformly drawn states.
fn random_structure<A: Alphabet, R: Rng + ?Sized>(
    rng: &mut R,
    alphabet: &A,
    size: usize,
) -> Vec<(StateIndex, A::Symbol, StateIndex)> {
    let symbols: Vec<_> = alphabet.universe().collect();
    let mut free: Vec<(StateIndex, A::Symbol)> = vec![];
    let mut edges = vec![];
    for sym in &symbols {
        free.push((0, *sym));
    }
    for target in 1..size {
        let pick = rng.gen_range(0..free.len());
        let (source, sym) = free.swap_remove(pick);
        edges.push((source, sym, target));
        free.extend(symbols.iter().map(|sym| (target, *sym)));
    }
    for (source, sym) in free {
        edges.push((source, sym, rng.gen_range(0..size)));
    }
    edges
}

/// Generates a random complete [`Dfa`] whose minimal automaton has exactly `size` states.
/// Candidates are drawn until one of them is minimal, so `size` should be realizable over the
/// given alphabet (a single symbol alphabet for example admits only few shapes).
///
/// # Panics
/// If `size` is zero or the alphabet is empty.
pub fn random_dfa<A: Alphabet, R: Rng + ?Sized>(rng: &mut R, alphabet: &A, size: usize) -> Dfa<A> {
    assert!(size > 0 && !alphabet.is_empty());
    let mut attempts = 0usize;
    loop {
        attempts += 1;
        let mut dfa = Dfa::new(alphabet.clone(), rng.gen_bool(0.5));
        for _ in 1..size {
            dfa.add_state(rng.gen_bool(0.5));
        }
        for (source, sym, target) in random_structure(rng, alphabet, size) {
            dfa.set_transition(source, sym, target);
        }
        if dfa.minimize().size() == size {
            trace!("drew minimal random DFA of size {size} after {attempts} attempts");
            return dfa;
        }
    }
}

/// Generates a random complete [`MealyMachine`] with `size` states, outputs are drawn uniformly
/// from `outputs`. As for [`random_dfa`], candidates are drawn until one is minimal.
///
/// # Panics
/// If `size` is zero, the alphabet is empty or there are no outputs.
pub fn random_mealy<A: Alphabet, O: Color, R: Rng + ?Sized>(
    rng: &mut R,
    alphabet: &A,
    size: usize,
    outputs: &[O],
) -> MealyMachine<A, O> {
    assert!(size > 0 && !alphabet.is_empty() && !outputs.is_empty());
    loop {
        let mut mealy = MealyMachine::new(alphabet.clone());
        for _ in 1..size {
            mealy.add_state();
        }
        for (source, sym, target) in random_structure(rng, alphabet, size) {
            let output = outputs[rng.gen_range(0..outputs.len())].clone();
            mealy.set_transition(source, sym, output, target);
        }
        if mealy.minimize().size() == size {
            return mealy;
        }
    }
}

/// The mutation operators that are used to derive a changed target from an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    /// Redirects one transition to a random state.
    RedirectTransition,
    /// Flips the acceptance of a state, or changes the output of a transition.
    FlipOutput,
    /// Adds a new state that receives one random transition per symbol, its own transitions
    /// lead to random existing states.
    AddState,
    /// Removes a non-initial state, its incoming transitions are rerouted to other states.
    RemoveState,
    /// Adds a random sub-automaton with the given number of states, which is entered from
    /// randomly chosen transitions.
    AddFeature(usize),
}

/// Applies a mutation to a complete [`Dfa`]. The result is complete and trimmed.
pub fn mutate_dfa<A: Alphabet, R: Rng + ?Sized>(
    rng: &mut R,
    dfa: &Dfa<A>,
    mutation: Mutation,
) -> Dfa<A> {
    let mut out = dfa.clone();
    let symbols: Vec<_> = dfa.alphabet().universe().collect();
    match mutation {
        Mutation::RedirectTransition => {
            let source = rng.gen_range(0..out.size());
            let sym = *symbols.choose(rng).expect("alphabet is not empty");
            out.set_transition(source, sym, rng.gen_range(0..out.size()));
        }
        Mutation::FlipOutput => {
            let state = rng.gen_range(0..out.size());
            out.set_accepting(state, !out.is_accepting(state));
        }
        Mutation::AddState => {
            let new = out.add_state(rng.gen_bool(0.5));
            for sym in &symbols {
                let source = rng.gen_range(0..new);
                out.set_transition(source, *sym, new);
            }
            for sym in &symbols {
                out.set_transition(new, *sym, rng.gen_range(0..new));
            }
        }
        Mutation::RemoveState => {
            if out.size() > 1 {
                let removed = pick_other_than(rng, out.size(), out.initial());
                for q in out.states() {
                    for sym in &symbols {
                        if out.successor(q, *sym) == Some(removed) {
                            let replacement = pick_other_than(rng, out.size(), removed);
                            out.set_transition(q, *sym, replacement);
                        }
                    }
                }
            }
        }
        Mutation::AddFeature(feature_size) => {
            let feature = random_dfa(rng, dfa.alphabet(), feature_size.max(1));
            let entries: Vec<(StateIndex, A::Symbol)> = (0..feature.size() * symbols.len())
                .map(|_| {
                    (
                        rng.gen_range(0..dfa.size()),
                        *symbols.choose(rng).expect("alphabet is not empty"),
                    )
                })
                .collect();
            let offset = out.size();
            for q in feature.states() {
                out.add_state(feature.is_accepting(q));
            }
            for q in feature.states() {
                for sym in &symbols {
                    if let Some(p) = feature.successor(q, *sym) {
                        out.set_transition(offset + q, *sym, offset + p);
                    }
                }
            }
            for (source, sym) in entries {
                out.set_transition(source, sym, offset + feature.initial());
            }
        }
    }
    out.trim()
}

/// Applies a mutation to a complete [`MealyMachine`], new outputs are drawn from `outputs`.
/// The result is complete and trimmed.
pub fn mutate_mealy<A: Alphabet, O: Color, R: Rng + ?Sized>(
    rng: &mut R,
    mealy: &MealyMachine<A, O>,
    mutation: Mutation,
    outputs: &[O],
) -> MealyMachine<A, O> {
    let mut out = mealy.clone();
    let symbols: Vec<_> = mealy.alphabet().universe().collect();
    let draw_output = |rng: &mut R| outputs[rng.gen_range(0..outputs.len())].clone();
    match mutation {
        Mutation::RedirectTransition => {
            let source = rng.gen_range(0..out.size());
            let sym = *symbols.choose(rng).expect("alphabet is not empty");
            if let Some((_, output)) = out.transition(source, sym) {
                let output = output.clone();
                let target = rng.gen_range(0..out.size());
                out.set_transition(source, sym, output, target);
            }
        }
        Mutation::FlipOutput => {
            let source = rng.gen_range(0..out.size());
            let sym = *symbols.choose(rng).expect("alphabet is not empty");
            if let Some((target, current)) = out.transition(source, sym) {
                let current = current.clone();
                let alternatives: Vec<&O> = outputs.iter().filter(|o| **o != current).collect();
                if let Some(replacement) = alternatives.choose(rng) {
                    out.set_transition(source, sym, (*replacement).clone(), target);
                }
            }
        }
        Mutation::AddState => {
            let new = out.add_state();
            for sym in &symbols {
                let source = rng.gen_range(0..new);
                let output = draw_output(rng);
                out.set_transition(source, *sym, output, new);
            }
            for sym in &symbols {
                let output = draw_output(rng);
                out.set_transition(new, *sym, output, rng.gen_range(0..new));
            }
        }
        Mutation::RemoveState => {
            if out.size() > 1 {
                let removed = pick_other_than(rng, out.size(), out.initial());
                for q in out.states() {
                    for sym in &symbols {
                        if let Some((target, output)) = out.transition(q, *sym) {
                            if target == removed {
                                let output = output.clone();
                                let replacement = pick_other_than(rng, out.size(), removed);
                                out.set_transition(q, *sym, output, replacement);
                            }
                        }
                    }
                }
            }
        }
        Mutation::AddFeature(feature_size) => {
            let feature = random_mealy(rng, mealy.alphabet(), feature_size.max(1), outputs);
            let offset = out.size();
            for _ in feature.states() {
                out.add_state();
            }
            for q in feature.states() {
                for sym in &symbols {
                    if let Some((p, output)) = feature.transition(q, *sym) {
                        out.set_transition(offset + q, *sym, output.clone(), offset + p);
                    }
                }
            }
            for _ in 0..feature.size() * symbols.len() {
                let source = rng.gen_range(0..mealy.size());
                let sym = *symbols.choose(rng).expect("alphabet is not empty");
                let output = draw_output(rng);
                out.set_transition(source, sym, output, offset + feature.initial());
            }
        }
    }
    out.trim()
}

fn pick_other_than<R: Rng + ?Sized>(rng: &mut R, size: usize, excluded: StateIndex) -> StateIndex {
    debug_assert!(size > 1);
    let pick = rng.gen_range(0..size - 1);
    if pick >= excluded {
        pick + 1
    } else {
        pick
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;
    use crate::prelude::*;

    #[test_log::test]
    fn random_words_respect_minimal_length() {
        let mut rng = StdRng::seed_from_u64(7);
        let alphabet = CharAlphabet::of_size(3);
        for _ in 0..100 {
            let word = random_word(&mut rng, &alphabet, 0.5, 2);
            assert!(word.len() >= 2);
            assert!(word.iter().all(|sym| alphabet.contains(*sym)));
        }
        assert!(random_word(&mut rng, &alphabet, 0.0, 0).is_empty());
    }

    #[test_log::test]
    fn random_targets_are_minimal_and_complete() {
        let mut rng = StdRng::seed_from_u64(42);
        let alphabet = CharAlphabet::of_size(3);
        let dfa = random_dfa(&mut rng, &alphabet, 10);
        assert_eq!(dfa.size(), 10);
        assert!(dfa.is_complete());
        assert_eq!(dfa.minimize().size(), 10);

        let mealy = random_mealy(&mut rng, &alphabet, 5, &[0usize, 1]);
        assert!(mealy.is_complete());
        assert_eq!(mealy.minimize().size(), 5);
    }

    #[test_log::test]
    fn mutations_keep_targets_complete() {
        let mut rng = StdRng::seed_from_u64(3);
        let alphabet = CharAlphabet::of_size(2);
        let base = random_dfa(&mut rng, &alphabet, 6);
        for mutation in [
            Mutation::RedirectTransition,
            Mutation::FlipOutput,
            Mutation::AddState,
            Mutation::RemoveState,
            Mutation::AddFeature(3),
        ] {
            let mutated = mutate_dfa(&mut rng, &base, mutation);
            assert!(mutated.is_complete(), "{mutation:?} left a partial DFA");
        }

        let flipped = mutate_dfa(&mut rng, &base, Mutation::FlipOutput);
        assert!(!flipped.equivalent(&base));

        let mealy = random_mealy(&mut rng, &alphabet, 4, &['x', 'y']);
        for mutation in [Mutation::AddState, Mutation::RemoveState, Mutation::AddFeature(2)] {
            assert!(mutate_mealy(&mut rng, &mealy, mutation, &['x', 'y']).is_complete());
        }
        let changed = mutate_mealy(&mut rng, &mealy, Mutation::FlipOutput, &['x', 'y']);
        assert!(!changed.equivalent(&mealy));
    }
}
