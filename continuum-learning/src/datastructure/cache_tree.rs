use continuum_core::prelude::*;
use tracing::{debug, trace};

use crate::{active::Hypothesis, semantics::Semantics, LearningError};

#[derive(Debug, Clone)]
struct CacheNode<S, O> {
    fact: Option<O>,
    stamp: usize,
    /// Smallest stamp of a fact in the subtree rooted here.
    oldest: Option<usize>,
    children: math::OrderedMap<S, usize>,
}

impl<S, O> Default for CacheNode<S, O> {
    fn default() -> Self {
        Self {
            fact: None,
            stamp: 0,
            oldest: None,
            children: math::OrderedMap::new(),
        }
    }
}

/// A prefix tree that remembers the answers of the system under learning. Every answer is
/// broken up into per-prefix facts (see [`Semantics::decompose`]), a node stores the fact for
/// the word that leads to it together with the time at which the fact was last confirmed.
///
/// Inserting a fact that contradicts a stored one fails, such a conflict is only resolved by an
/// explicit [`CacheTree::revise`].
#[derive(Debug, Clone)]
pub struct CacheTree<A: Alphabet, M: Semantics<A::Symbol>> {
    alphabet: A,
    nodes: Vec<CacheNode<A::Symbol, M::Output>>,
    clock: usize,
}

impl<A: Alphabet, M: Semantics<A::Symbol>> CacheTree<A, M> {
    /// Creates an empty cache.
    pub fn new(alphabet: A) -> Self {
        Self {
            alphabet,
            nodes: vec![CacheNode::default()],
            clock: 0,
        }
    }

    /// Returns a reference to the alphabet.
    pub fn alphabet(&self) -> &A {
        &self.alphabet
    }

    /// Number of stored facts.
    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|n| n.fact.is_some()).count()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn find(&self, word: &[A::Symbol]) -> Option<usize> {
        word.iter()
            .try_fold(0, |node, sym| self.nodes[node].children.get(sym).copied())
    }

    fn child_or_insert(&mut self, node: usize, sym: A::Symbol) -> usize {
        if let Some(child) = self.nodes[node].children.get(&sym) {
            return *child;
        }
        self.nodes.push(CacheNode::default());
        let child = self.nodes.len() - 1;
        self.nodes[node].children.insert(sym, child);
        child
    }

    /// Looks up the answer for `word`. For transducers this also succeeds for prefixes of
    /// stored words.
    pub fn lookup(&self, word: &[A::Symbol]) -> Option<M::Output> {
        let mut path = Vec::with_capacity(word.len() + 1);
        let mut node = Some(0);
        path.push(self.nodes[0].fact.as_ref());
        for sym in word {
            node = node.and_then(|n| self.nodes[n].children.get(sym).copied());
            path.push(node.and_then(|n| self.nodes[n].fact.as_ref()));
        }
        M::compose(&path)
    }

    /// Stores the answer for `word`. Facts that are already known have their stamp refreshed.
    /// If a stored fact contradicts the answer, nothing is written and a
    /// [`LearningError::Conflict`] is returned.
    pub fn insert(
        &mut self,
        word: &[A::Symbol],
        answer: &M::Output,
    ) -> Result<(), LearningError<A::Symbol>> {
        let facts = M::decompose(answer, word.len());
        for (depth, output) in &facts {
            let stored = self
                .find(&word[..*depth])
                .and_then(|n| self.nodes[n].fact.as_ref());
            if stored.is_some_and(|fact| fact != output) {
                debug!(
                    "cached answer for {} conflicts with {}",
                    word.as_string(),
                    answer.show()
                );
                return Err(LearningError::Conflict {
                    word: word.to_vec(),
                });
            }
        }
        self.write(word, facts, false);
        Ok(())
    }

    /// Stores the answer for `word`, overwriting contradicting facts. Everything below a node
    /// whose fact was overwritten is dropped since it was learned from the stale system.
    pub fn revise(&mut self, word: &[A::Symbol], answer: &M::Output) {
        let facts = M::decompose(answer, word.len());
        if self.write(word, facts, true) {
            self.compact();
        }
    }

    fn write(
        &mut self,
        word: &[A::Symbol],
        facts: Vec<(usize, M::Output)>,
        prune: bool,
    ) -> bool {
        self.clock += 1;
        let stamp = self.clock;
        let facts: math::OrderedMap<_, _> = facts.into_iter().collect();

        let mut pruned = false;
        let mut path = Vec::with_capacity(word.len() + 1);
        let mut node = 0;
        for depth in 0..=word.len() {
            if depth > 0 {
                node = self.child_or_insert(node, word[depth - 1]);
            }
            path.push(node);
            let Some(output) = facts.get(&depth) else {
                continue;
            };
            let entry = &mut self.nodes[node];
            if prune && entry.fact.as_ref().is_some_and(|fact| fact != output) {
                debug!(
                    "revising {}, dropping {} cached successors",
                    word[..depth].as_string(),
                    entry.children.len()
                );
                entry.children.clear();
                pruned = true;
            }
            entry.fact = Some(output.clone());
            entry.stamp = stamp;
        }
        for node in path.into_iter().rev() {
            self.refresh_oldest(node);
        }
        pruned
    }

    fn refresh_oldest(&mut self, node: usize) {
        let entry = &self.nodes[node];
        let below = entry
            .children
            .values()
            .filter_map(|child| self.nodes[*child].oldest)
            .min();
        let own = entry.fact.as_ref().map(|_| entry.stamp);
        self.nodes[node].oldest = own.into_iter().chain(below).min();
    }

    fn compact(&mut self) {
        let mut nodes = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![(0, None)];
        while let Some((old, parent)) = stack.pop() {
            let node = &self.nodes[old];
            nodes.push(CacheNode {
                fact: node.fact.clone(),
                stamp: node.stamp,
                oldest: node.oldest,
                children: math::OrderedMap::new(),
            });
            let new = nodes.len() - 1;
            if let Some((parent, sym)) = parent {
                let parent: &mut CacheNode<_, _> = &mut nodes[parent];
                parent.children.insert(sym, new);
            }
            for (sym, child) in &node.children {
                stack.push((*child, Some((new, *sym))));
            }
        }
        trace!("compacted cache from {} to {} nodes", self.nodes.len(), nodes.len());
        self.nodes = nodes;
    }

    /// The word whose stored fact has not been confirmed for the longest time. All facts of
    /// one answer share a stamp and lie on one path, the longest of them is returned.
    pub fn oldest_input(&self) -> Option<Vec<A::Symbol>> {
        let target = self.nodes[0].oldest?;
        let mut word = vec![];
        let mut node = 0;
        while let Some((sym, child)) = self.nodes[node]
            .children
            .iter()
            .find(|(_, child)| self.nodes[**child].oldest == Some(target))
        {
            word.push(*sym);
            node = *child;
        }
        Some(word)
    }

    /// Finds a stored word on which `hypothesis` gives a different answer than the cache,
    /// preferring words whose facts are oldest.
    pub fn find_separating_word(&self, hypothesis: &Hypothesis<A, M>) -> Option<Vec<A::Symbol>> {
        let mut best: Option<(usize, Vec<A::Symbol>)> = None;
        let mut stack = vec![(0, vec![])];
        while let Some((node, word)) = stack.pop() {
            let entry = &self.nodes[node];
            for (sym, child) in &entry.children {
                stack.push((*child, word.with_symbol(*sym)));
            }
            let Some(fact) = entry.fact.as_ref() else {
                continue;
            };
            // oldest first, longer words first among facts of the same age
            let better = best.as_ref().map_or(true, |(stamp, other)| {
                entry
                    .stamp
                    .cmp(stamp)
                    .then(other.len().cmp(&word.len()))
                    .then(word.cmp(other))
                    .is_lt()
            });
            if !better {
                continue;
            }
            let Some(cached) = self.lookup(&word) else {
                continue;
            };
            if hypothesis.output(&word).is_some_and(|predicted| predicted != cached) {
                trace!("{} separates, stored {}", word.as_string(), fact.show());
                best = Some((entry.stamp, word));
            }
        }
        best.map(|(_, word)| word)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantics::{Acceptor, Transducer};
    use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

    fn word(w: &str) -> Vec<char> {
        w.chars().collect()
    }

    #[test_log::test]
    fn acceptor_cache() {
        let mut cache: CacheTree<_, Acceptor> = CacheTree::new(alphabet!('a', 'b'));
        assert!(cache.is_empty());
        assert_eq!(cache.insert(&word("ab"), &true), Ok(()));
        assert_eq!(cache.insert(&word("a"), &false), Ok(()));
        assert_eq!(cache.lookup(&word("ab")), Some(true));
        assert_eq!(cache.lookup(&word("b")), None);
        assert_eq!(cache.len(), 2);

        assert_eq!(
            cache.insert(&word("ab"), &false),
            Err(LearningError::Conflict { word: word("ab") })
        );
        // nothing was written
        assert_eq!(cache.lookup(&word("ab")), Some(true));

        cache.revise(&word("a"), &true);
        assert_eq!(cache.lookup(&word("a")), Some(true));
        // the stale extension is gone
        assert_eq!(cache.lookup(&word("ab")), None);
        assert_eq!(cache.len(), 1);
    }

    #[test_log::test]
    fn transducer_prefixes() {
        let mut cache: CacheTree<_, Transducer<usize>> = CacheTree::new(alphabet!('a', 'b'));
        cache.insert(&word("ab"), &vec![0, 1]).unwrap();
        assert_eq!(cache.lookup(&word("a")), Some(vec![0]));
        assert_eq!(cache.lookup(&word("")), Some(vec![]));
        assert_eq!(cache.lookup(&word("abb")), None);
        assert!(cache.insert(&word("aa"), &vec![1, 0]).is_err());
        assert!(cache.insert(&word("aa"), &vec![0, 0]).is_ok());
        assert_eq!(cache.len(), 3);

        cache.revise(&word("a"), &vec![2]);
        assert_eq!(cache.lookup(&word("a")), Some(vec![2]));
        assert_eq!(cache.lookup(&word("ab")), None);
    }

    #[test_log::test]
    fn oldest_input_and_separating_words() {
        let mut cache: CacheTree<_, Acceptor> = CacheTree::new(alphabet!('a'));
        cache.insert(&word("a"), &true).unwrap();
        cache.insert(&word("aa"), &false).unwrap();
        cache.insert(&word(""), &true).unwrap();
        assert_eq!(cache.oldest_input(), Some(word("a")));
        cache.insert(&word("a"), &true).unwrap();
        assert_eq!(cache.oldest_input(), Some(word("aa")));

        // accepts everything
        let hypothesis = Hypothesis::<_, Acceptor>::from_parts(
            alphabet!('a'),
            false,
            Some(vec![]),
            math::OrderedMap::from_iter([(vec![], Some(true))]),
            [(vec![], 'a', vec![])],
        );
        assert_eq!(cache.find_separating_word(&hypothesis), Some(word("aa")));
        cache.revise(&word("aa"), &true);
        assert_eq!(cache.find_separating_word(&hypothesis), None);
    }

    #[test_log::test]
    fn oldest_input_follows_confirmation_order() {
        let mut words: Vec<Vec<char>> = (0..=6usize)
            .flat_map(|len| {
                (0..1usize << len).map(move |bits| {
                    (0..len)
                        .map(|i| if (bits >> i) & 1 == 1 { 'b' } else { 'a' })
                        .collect()
                })
            })
            .collect();
        words.shuffle(&mut StdRng::seed_from_u64(11));
        fn even(w: &[char]) -> bool {
            w.len() % 2 == 0
        }

        let mut cache: CacheTree<_, Acceptor> = CacheTree::new(alphabet!('a', 'b'));
        for w in &words {
            cache.insert(w, &even(w)).unwrap();
        }
        assert_eq!(cache.len(), words.len());
        // confirming the oldest word hands the role to the next one
        for w in &words {
            assert_eq!(cache.oldest_input().as_ref(), Some(w));
            cache.insert(w, &even(w)).unwrap();
        }
        assert_eq!(cache.oldest_input().as_ref(), words.first());

        // revising drops the extensions of the revised word together with their stamps
        let revised = words.iter().find(|w| w.len() == 5).unwrap().clone();
        cache.revise(&revised, &!even(&revised));
        assert_eq!(cache.len(), words.len() - 2);
        let expected = words
            .iter()
            .find(|w| **w != revised && !(w.len() > revised.len() && w.starts_with(&revised)));
        assert_eq!(cache.oldest_input().as_ref(), expected);
        assert_eq!(cache.lookup(&revised), Some(!even(&revised)));
    }
}
