use std::{fmt::Debug, hash::Hash, marker::PhantomData};

use continuum_core::{math, prelude::*};

/// The answer type of the semantics `M` over the alphabet `A`.
pub type OutputOf<A, M> = <M as Semantics<SymbolOf<A>>>::Output;

/// Abstracts over the kind of model that is learned. All algorithms in this crate are written
/// once against this trait and work for acceptors (membership queries are answered with a
/// `bool`) as well as for transducers (a query is answered with one output per input symbol).
///
/// Answers are always aligned to the *end* of the word they belong to. For a transducer this
/// allows partial answers: a fact `(w, o)` where `o` is shorter than `w` only states what the
/// last `|o|` outputs produced on `w` are.
pub trait Semantics<S: Symbol>: Clone + Debug + Default + PartialEq + Eq {
    /// The answer to a membership query.
    type Output: Clone + Debug + Eq + Ord + Hash + Show;
    /// What is known about a single state, for example its acceptance.
    type Observation: Clone + Debug + Default + Eq;
    /// Used in place of observations that are not yet known.
    type Filler: Clone + Debug;

    /// Minimal length of the words that are sampled as tests.
    const MIN_SAMPLE_LEN: usize;

    /// Projects an answer onto the part that is produced while reading the last `suffix_len`
    /// symbols of the word. This is the key under which the answer is filed in a discrimination
    /// tree whose discriminator has length `suffix_len`. Returns `None` if the answer is too
    /// short to say anything about that suffix.
    fn classify(answer: &Self::Output, suffix_len: usize) -> Option<Self::Output>;

    /// Decides whether two answers agree on the last `suffix_len` symbols.
    fn agree(left: &Self::Output, right: &Self::Output, suffix_len: usize) -> bool {
        match (
            Self::classify(left, suffix_len),
            Self::classify(right, suffix_len),
        ) {
            (Some(l), Some(r)) => l == r,
            _ => false,
        }
    }

    /// Records what the answer for `word` reveals about the state whose access sequence is
    /// `access`. Returns true if the observation was touched.
    fn record(
        observation: &mut Self::Observation,
        access: &[S],
        word: &[S],
        answer: &Self::Output,
    ) -> bool;

    /// Returns a query whose answer is still missing in `observation`, if any.
    fn missing<I: IntoIterator<Item = S>>(
        observation: &Self::Observation,
        access: &[S],
        symbols: I,
    ) -> Option<Vec<S>>;

    /// Computes the output for a run. `steps` holds the observation of every state that is
    /// left together with the symbol it is left on, `last` is the observation of the state
    /// that is reached in the end.
    fn compute<'a, I>(steps: I, last: &'a Self::Observation, filler: &Self::Filler) -> Self::Output
    where
        I: IntoIterator<Item = (&'a Self::Observation, S)>,
        Self::Observation: 'a;

    /// Given the answer for a word of length `word_len`, returns what it states about the
    /// prefix of length `keep_len`.
    fn prefix_answer(answer: &Self::Output, word_len: usize, keep_len: usize) -> Option<Self::Output>;

    /// Splits the answer for a word of length `word_len` into facts about single prefixes,
    /// each given by the length of the prefix it belongs to.
    fn decompose(answer: &Self::Output, word_len: usize) -> Vec<(usize, Self::Output)>;

    /// Reassembles the answer for a word of length `path.len() - 1`, where `path[i]` holds the
    /// fact that is known about the prefix of length `i`.
    fn compose(path: &[Option<&Self::Output>]) -> Option<Self::Output>;
}

/// Semantics of deterministic acceptors, a word is either accepted or rejected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Acceptor;

impl<S: Symbol> Semantics<S> for Acceptor {
    type Output = bool;
    type Observation = Option<bool>;
    type Filler = bool;

    const MIN_SAMPLE_LEN: usize = 0;

    fn classify(answer: &bool, _suffix_len: usize) -> Option<bool> {
        Some(*answer)
    }

    fn record(observation: &mut Option<bool>, access: &[S], word: &[S], answer: &bool) -> bool {
        if access == word {
            *observation = Some(*answer);
            true
        } else {
            false
        }
    }

    fn missing<I: IntoIterator<Item = S>>(
        observation: &Option<bool>,
        access: &[S],
        _symbols: I,
    ) -> Option<Vec<S>> {
        observation.is_none().then(|| access.to_vec())
    }

    fn compute<'a, I>(_steps: I, last: &'a Option<bool>, filler: &bool) -> bool
    where
        I: IntoIterator<Item = (&'a Option<bool>, S)>,
    {
        last.unwrap_or(*filler)
    }

    fn prefix_answer(_answer: &bool, _word_len: usize, _keep_len: usize) -> Option<bool> {
        None
    }

    fn decompose(answer: &bool, word_len: usize) -> Vec<(usize, bool)> {
        vec![(word_len, *answer)]
    }

    fn compose(path: &[Option<&bool>]) -> Option<bool> {
        path.last().copied().flatten().copied()
    }
}

/// Semantics of Mealy-style transducers. The answer to a query is the word of outputs that
/// is produced while reading the input, the observation of a state maps each input symbol to
/// the output of the transition on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transducer<O>(PhantomData<O>);

impl<O> Default for Transducer<O> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

impl<S: Symbol, O: Color + Ord + Show> Semantics<S> for Transducer<O> {
    type Output = Vec<O>;
    type Observation = math::OrderedMap<S, O>;
    type Filler = O;

    const MIN_SAMPLE_LEN: usize = 1;

    fn classify(answer: &Vec<O>, suffix_len: usize) -> Option<Vec<O>> {
        (answer.len() >= suffix_len).then(|| answer[answer.len() - suffix_len..].to_vec())
    }

    fn record(
        observation: &mut math::OrderedMap<S, O>,
        access: &[S],
        word: &[S],
        answer: &Vec<O>,
    ) -> bool {
        match (word.split_last(), answer.last()) {
            (Some((sym, prefix)), Some(output)) if prefix == access => {
                observation.insert(*sym, output.clone());
                true
            }
            _ => false,
        }
    }

    fn missing<I: IntoIterator<Item = S>>(
        observation: &math::OrderedMap<S, O>,
        access: &[S],
        symbols: I,
    ) -> Option<Vec<S>> {
        symbols
            .into_iter()
            .find(|sym| !observation.contains_key(sym))
            .map(|sym| access.with_symbol(sym))
    }

    fn compute<'a, I>(steps: I, _last: &'a math::OrderedMap<S, O>, filler: &O) -> Vec<O>
    where
        I: IntoIterator<Item = (&'a math::OrderedMap<S, O>, S)>,
    {
        steps
            .into_iter()
            .map(|(observation, sym)| observation.get(&sym).unwrap_or(filler).clone())
            .collect()
    }

    fn prefix_answer(answer: &Vec<O>, word_len: usize, keep_len: usize) -> Option<Vec<O>> {
        let start = word_len.checked_sub(answer.len())?;
        (keep_len > start && keep_len <= word_len).then(|| answer[..keep_len - start].to_vec())
    }

    fn decompose(answer: &Vec<O>, word_len: usize) -> Vec<(usize, Vec<O>)> {
        let start = word_len.saturating_sub(answer.len());
        answer
            .iter()
            .enumerate()
            .map(|(i, output)| (start + i + 1, vec![output.clone()]))
            .collect()
    }

    fn compose(path: &[Option<&Vec<O>>]) -> Option<Vec<O>> {
        let mut out = Vec::with_capacity(path.len().saturating_sub(1));
        for fact in path.iter().skip(1) {
            out.extend(fact.as_ref()?.iter().cloned());
        }
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Dfa = Acceptor;
    type Mealy = Transducer<usize>;

    fn acceptor_record(observation: &mut Option<bool>, access: &[char], word: &[char]) -> bool {
        <Dfa as Semantics<char>>::record(observation, access, word, &true)
    }

    #[test_log::test]
    fn acceptor_observations() {
        let mut observation = None;
        assert!(!acceptor_record(&mut observation, &['a'], &['a', 'b']));
        assert!(acceptor_record(&mut observation, &['a'], &['a']));
        assert_eq!(observation, Some(true));
        assert_eq!(
            <Dfa as Semantics<char>>::missing(&None, &['a'], ['a', 'b']),
            Some(vec!['a'])
        );
        assert_eq!(
            <Dfa as Semantics<char>>::missing(&observation, &['a'], ['a', 'b']),
            None
        );
        assert_eq!(
            <Dfa as Semantics<char>>::compose(&[None, Some(&true)]),
            Some(true)
        );
        assert_eq!(<Dfa as Semantics<char>>::compose(&[Some(&true), None]), None);
    }

    #[test_log::test]
    fn transducer_answers_are_aligned_to_the_end() {
        let answer = vec![1, 2, 3];
        assert_eq!(
            <Mealy as Semantics<char>>::classify(&answer, 2),
            Some(vec![2, 3])
        );
        assert_eq!(<Mealy as Semantics<char>>::classify(&answer, 4), None);
        assert!(<Mealy as Semantics<char>>::agree(&answer, &vec![9, 2, 3], 2));
        assert!(!<Mealy as Semantics<char>>::agree(&answer, &vec![9, 2, 3], 3));

        assert_eq!(
            <Mealy as Semantics<char>>::prefix_answer(&answer, 3, 2),
            Some(vec![1, 2])
        );
        // the answer only covers the last two symbols of the word
        assert_eq!(
            <Mealy as Semantics<char>>::prefix_answer(&vec![5, 6], 4, 3),
            Some(vec![5])
        );
        assert_eq!(<Mealy as Semantics<char>>::prefix_answer(&vec![5, 6], 4, 2), None);

        let facts = <Mealy as Semantics<char>>::decompose(&vec![5, 6], 4);
        assert_eq!(facts, vec![(3, vec![5]), (4, vec![6])]);
        let (one, two) = (vec![1], vec![2]);
        assert_eq!(
            <Mealy as Semantics<char>>::compose(&[None, Some(&one), Some(&two)]),
            Some(vec![1, 2])
        );
        assert_eq!(
            <Mealy as Semantics<char>>::compose(&[None, None, Some(&two)]),
            None
        );
    }

    #[test_log::test]
    fn transducer_observations() {
        let mut observation: math::OrderedMap<char, usize> = math::OrderedMap::new();
        assert!(<Mealy as Semantics<char>>::record(
            &mut observation,
            &['a'],
            &['a', 'b'],
            &vec![0, 7]
        ));
        assert!(!<Mealy as Semantics<char>>::record(
            &mut observation,
            &['b'],
            &['a', 'b'],
            &vec![0, 7]
        ));
        assert_eq!(observation.get(&'b'), Some(&7));
        assert_eq!(
            <Mealy as Semantics<char>>::missing(&observation, &['a'], ['a', 'b']),
            Some(vec!['a', 'a'])
        );
        let steps = [(&observation, 'b'), (&observation, 'a')];
        assert_eq!(
            <Mealy as Semantics<char>>::compute(steps, &observation, &4),
            vec![7, 4]
        );
    }
}
