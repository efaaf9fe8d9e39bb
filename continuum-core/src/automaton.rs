use std::collections::VecDeque;

use crate::{alphabet::Alphabet, math};

mod dfa;
pub use dfa::Dfa;

mod mealy;
pub use mealy::MealyMachine;

mod builder;
pub use builder::{DfaBuilder, MealyBuilder};

/// States of the models in this crate are addressed by their position.
pub type StateIndex = usize;

/// Computes shortest access sequences for all states that are reachable from `initial`, where
/// `successor` gives the successor of a state on a symbol. Ties between words of equal length
/// are broken by the order of the alphabet's universe, so the result is the length-lexicographic
/// minimal access sequence of each state.
pub(crate) fn access_sequences<A, F>(
    alphabet: &A,
    initial: StateIndex,
    successor: F,
) -> math::OrderedMap<StateIndex, Vec<A::Symbol>>
where
    A: Alphabet,
    F: Fn(StateIndex, A::Symbol) -> Option<StateIndex>,
{
    let mut access = math::OrderedMap::new();
    access.insert(initial, vec![]);
    let mut queue = VecDeque::from([initial]);

    while let Some(state) = queue.pop_front() {
        let word = access[&state].clone();
        for sym in alphabet.universe() {
            if let Some(target) = successor(state, sym) {
                if !access.contains_key(&target) {
                    let mut extended = word.clone();
                    extended.push(sym);
                    access.insert(target, extended);
                    queue.push_back(target);
                }
            }
        }
    }
    access
}

/// Lists the states reachable from `initial` in breadth-first order, starting with `initial`.
pub(crate) fn reachable_in_bfs_order<A, F>(
    alphabet: &A,
    initial: StateIndex,
    successor: F,
) -> Vec<StateIndex>
where
    A: Alphabet,
    F: Fn(StateIndex, A::Symbol) -> Option<StateIndex>,
{
    let mut order = vec![initial];
    let mut seen = math::Set::from_iter([initial]);
    let mut queue = VecDeque::from([initial]);
    while let Some(q) = queue.pop_front() {
        for sym in alphabet.universe() {
            if let Some(p) = successor(q, sym) {
                if seen.insert(p) {
                    order.push(p);
                    queue.push_back(p);
                }
            }
        }
    }
    order
}

/// Refines the partition given by `initial_class` until it is stable under `successor`, the result
/// assigns to each state in `0..size` the index of its class. This is Moore's algorithm, the
/// classes are numbered in order of their smallest member so that equal partitions yield equal
/// numberings.
pub(crate) fn refine_partition<A, K, F>(
    alphabet: &A,
    size: usize,
    initial_class: impl Fn(StateIndex) -> K,
    successor: F,
) -> Vec<usize>
where
    A: Alphabet,
    K: Ord,
    F: Fn(StateIndex, A::Symbol) -> Option<StateIndex>,
{
    let mut classes = renumber((0..size).map(&initial_class).collect());
    loop {
        let signatures: Vec<(usize, Vec<Option<usize>>)> = (0..size)
            .map(|q| {
                let successors = alphabet
                    .universe()
                    .map(|sym| successor(q, sym).map(|p| classes[p]))
                    .collect();
                (classes[q], successors)
            })
            .collect();
        let refined = renumber(signatures);
        let before = classes.iter().max().map_or(0, |m| m + 1);
        let after = refined.iter().max().map_or(0, |m| m + 1);
        classes = refined;
        if before == after {
            return classes;
        }
    }
}

fn renumber<K: Ord>(keys: Vec<K>) -> Vec<usize> {
    let mut seen: math::OrderedMap<&K, usize> = math::OrderedMap::new();
    let mut first_seen = Vec::with_capacity(keys.len());
    for key in &keys {
        let next = seen.len();
        first_seen.push(*seen.entry(key).or_insert(next));
    }
    first_seen
}
