use std::fmt::Debug;

use continuum_core::prelude::*;
use itertools::Itertools;
use tracing::{debug, trace, warn};

use crate::{
    active::{Hypothesis, MembershipOracle},
    semantics::Semantics,
    LearningError,
};

type Word<A> = Vec<SymbolOf<A>>;

/// A fact states that the given input produces the given answer. For transducers the answer
/// may be partial, it then describes the outputs on the last symbols of the input only.
pub type Fact<S, O> = (Vec<S>, O);

fn fact_for<'a, S: Symbol, O>(facts: &'a [Fact<S, O>], word: &[S]) -> Option<&'a O> {
    facts
        .iter()
        .find(|(input, _)| input.as_slice() == word)
        .map(|(_, output)| output)
}

/// Nodes are addressed by their position in one of the two arenas of a tree.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeId {
    /// An inner node.
    Inner(usize),
    /// A leaf.
    Leaf(usize),
}
pub use NodeId::*;

impl NodeId {
    /// The position of the node in its arena.
    pub fn index(&self) -> usize {
        match self {
            NodeId::Inner(n) => *n,
            NodeId::Leaf(n) => *n,
        }
    }

    /// Returns the index if `self` is an inner node.
    pub fn try_inner(&self) -> Option<usize> {
        let Self::Inner(n) = self else {
            return None;
        };
        Some(*n)
    }

    /// Returns the index if `self` is a leaf.
    pub fn try_leaf(&self) -> Option<usize> {
        let Self::Leaf(n) = self else {
            return None;
        };
        Some(*n)
    }
}

impl Debug for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (a, b) = match self {
            NodeId::Inner(n) => ("N", n),
            NodeId::Leaf(n) => ("L", n),
        };
        write!(f, "{a}({b})")
    }
}

/// An inner node routes words by the answer they produce when extended with the
/// discriminator. Its origins are words whose classification below this node is unknown.
#[derive(Clone, PartialEq, Eq)]
pub struct InnerNode<S, K> {
    parent: Option<usize>,
    discriminator: Vec<S>,
    children: math::OrderedMap<K, NodeId>,
    origins: math::OrderedSet<Vec<S>>,
}

/// A leaf represents a state. The origins of a leaf are the words that lead into the state.
#[derive(Clone, PartialEq, Eq)]
pub struct Leaf<S, X> {
    parent: Option<usize>,
    access: Vec<S>,
    observation: X,
    origins: math::OrderedSet<Vec<S>>,
}

/// Outcome of sifting a word through a [`DiscriminationTree`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sifted<K> {
    /// The word reaches the given leaf.
    Leaf(NodeId),
    /// At the inner node `node` the word produced `key`, for which no child exists yet.
    Unknown {
        /// The inner node at which sifting stopped.
        node: NodeId,
        /// The key of the missing child.
        key: K,
    },
}

enum Adjusted<S> {
    Kept(NodeId),
    Removed(math::OrderedSet<Vec<S>>),
}

/// A discrimination tree whose leaves are the states of a hypothesis. Every inner node holds
/// a discriminator and children keyed by the answer that is produced on the discriminator.
///
/// Besides the classical operations that are needed by Kearns–Vazirani style learners (sifting
/// and splitting leaves) the tree supports the operations of a learner for a changing target:
/// words whose classification is not completed yet are kept as *origins* at the node where
/// their classification stopped, [`DiscriminationTree::advance`] moves an origin one step
/// further and [`DiscriminationTree::apply`] repairs the tree when facts change. Both rebuild
/// the arena from scratch, so the result never shares anything with the previous tree.
#[derive(Clone)]
pub struct DiscriminationTree<A: Alphabet, M: Semantics<A::Symbol>> {
    alphabet: A,
    inner: Vec<InnerNode<A::Symbol, M::Output>>,
    leaves: Vec<Leaf<A::Symbol, M::Observation>>,
    root: NodeId,
}

impl<A: Alphabet, M: Semantics<A::Symbol>> DiscriminationTree<A, M> {
    /// Creates a tree with a single leaf for the empty word, which collects the empty word
    /// and all one-letter words as origins.
    pub fn new(alphabet: A) -> Self {
        let mut tree = Self::empty(alphabet);
        let origins = std::iter::once(vec![])
            .chain(tree.alphabet.universe().map(|sym| vec![sym]))
            .collect();
        tree.root = tree.push_leaf(vec![], M::Observation::default(), origins);
        tree
    }

    /// Creates a tree consisting of one leaf for the empty word without any origins.
    pub fn single_leaf(alphabet: A, observation: M::Observation) -> Self {
        let mut tree = Self::empty(alphabet);
        tree.root = tree.push_leaf(vec![], observation, math::OrderedSet::new());
        tree
    }

    fn empty(alphabet: A) -> Self {
        Self {
            alphabet,
            inner: vec![],
            leaves: vec![],
            root: Leaf(0),
        }
    }

    fn push_leaf(
        &mut self,
        access: Word<A>,
        observation: M::Observation,
        origins: math::OrderedSet<Word<A>>,
    ) -> NodeId {
        self.leaves.push(Leaf {
            parent: None,
            access,
            observation,
            origins,
        });
        Leaf(self.leaves.len() - 1)
    }

    fn push_inner(
        &mut self,
        discriminator: Word<A>,
        children: math::OrderedMap<M::Output, NodeId>,
        origins: math::OrderedSet<Word<A>>,
    ) -> NodeId {
        let id = self.inner.len();
        for child in children.values() {
            self.set_parent(*child, Some(id));
        }
        self.inner.push(InnerNode {
            parent: None,
            discriminator,
            children,
            origins,
        });
        Inner(id)
    }

    fn set_parent(&mut self, node: NodeId, parent: Option<usize>) {
        match node {
            Inner(n) => self.inner[n].parent = parent,
            Leaf(n) => self.leaves[n].parent = parent,
        }
    }

    fn origins_mut(&mut self, node: NodeId) -> &mut math::OrderedSet<Word<A>> {
        match node {
            Inner(n) => &mut self.inner[n].origins,
            Leaf(n) => &mut self.leaves[n].origins,
        }
    }

    /// Returns a reference to the alphabet.
    pub fn alphabet(&self) -> &A {
        &self.alphabet
    }

    /// The root node.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of leaves, which is the number of states.
    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    /// Iterates over all leaves.
    pub fn leaves(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.leaves.len()).map(Leaf)
    }

    /// Access sequences of all leaves, in length-lexicographic order.
    pub fn leaf_accesses(&self) -> Vec<&[A::Symbol]> {
        self.leaves
            .iter()
            .map(|leaf| leaf.access.as_slice())
            .sorted_by(|x, y| x.len().cmp(&y.len()).then(x.cmp(y)))
            .collect()
    }

    /// Finds the leaf with the given access sequence.
    pub fn find_leaf(&self, access: &[A::Symbol]) -> Option<NodeId> {
        self.leaves
            .iter()
            .position(|leaf| leaf.access == access)
            .map(Leaf)
    }

    /// Returns the access sequence of a leaf.
    pub fn try_access(&self, node: NodeId) -> Option<&[A::Symbol]> {
        let leaf = node.try_leaf()?;
        assert!(leaf < self.leaves.len(), "invalid leaf index");
        Some(&self.leaves[leaf].access)
    }

    /// Overwrites the access sequence of a leaf.
    pub fn set_access(&mut self, node: NodeId, access: Word<A>) {
        let leaf = node.try_leaf().expect("only leaves have access sequences");
        self.leaves[leaf].access = access;
    }

    /// Returns the observation that was gathered for a leaf.
    pub fn try_observation(&self, node: NodeId) -> Option<&M::Observation> {
        let leaf = node.try_leaf()?;
        assert!(leaf < self.leaves.len(), "invalid leaf index");
        Some(&self.leaves[leaf].observation)
    }

    /// Mutable access to the observation of a leaf.
    pub fn try_observation_mut(&mut self, node: NodeId) -> Option<&mut M::Observation> {
        let leaf = node.try_leaf()?;
        assert!(leaf < self.leaves.len(), "invalid leaf index");
        Some(&mut self.leaves[leaf].observation)
    }

    /// Forgets everything that was observed about the leaves.
    pub fn clear_observations(&mut self) {
        for leaf in &mut self.leaves {
            leaf.observation = M::Observation::default();
        }
    }

    /// Returns the discriminator of an inner node.
    pub fn try_discriminator(&self, node: NodeId) -> Option<&[A::Symbol]> {
        let inner = node.try_inner()?;
        assert!(inner < self.inner.len(), "invalid inner node index");
        Some(&self.inner[inner].discriminator)
    }

    /// Returns the children of an inner node.
    pub fn try_children(&self, node: NodeId) -> Option<&math::OrderedMap<M::Output, NodeId>> {
        let inner = node.try_inner()?;
        assert!(inner < self.inner.len(), "invalid inner node index");
        Some(&self.inner[inner].children)
    }

    /// Returns the origins that are stored at `node`.
    pub fn origins(&self, node: NodeId) -> &math::OrderedSet<Word<A>> {
        match node {
            Inner(n) => &self.inner[n].origins,
            Leaf(n) => &self.leaves[n].origins,
        }
    }

    /// Number of origins stored in the whole tree.
    pub fn origin_count(&self) -> usize {
        self.inner.iter().map(|n| n.origins.len()).sum::<usize>()
            + self.leaves.iter().map(|l| l.origins.len()).sum::<usize>()
    }

    /// Adds origins to the root.
    pub fn add_root_origins<I: IntoIterator<Item = Word<A>>>(&mut self, origins: I) {
        let root = self.root;
        self.origins_mut(root).extend(origins);
    }

    /// Returns the parent of `node`, or `None` for the root.
    pub fn try_parent(&self, node: NodeId) -> Option<NodeId> {
        match node {
            Inner(n) => {
                assert!(n < self.inner.len(), "invalid inner node index");
                self.inner[n].parent.map(Inner)
            }
            Leaf(n) => {
                assert!(n < self.leaves.len(), "invalid leaf index");
                self.leaves[n].parent.map(Inner)
            }
        }
    }

    /// Lists the ancestors of `node`, starting with its parent.
    pub fn ancestors_vec(&self, node: NodeId) -> Vec<NodeId> {
        let mut ancestors = Vec::new();
        let mut current = node;
        while let Some(parent) = self.try_parent(current) {
            ancestors.push(parent);
            current = parent;
        }
        ancestors
    }

    /// Computes the lowest common ancestor of two nodes.
    pub fn lowest_common_ancestor(&self, a: NodeId, b: NodeId) -> NodeId {
        if a == b {
            return a;
        }
        let ancestors_a = self.ancestors_vec(a);
        if ancestors_a.contains(&b) {
            return b;
        }

        let mut current = b;
        while let Some(parent) = self.try_parent(current) {
            if parent == a || ancestors_a.contains(&parent) {
                return parent;
            }
            current = parent;
        }

        unreachable!("nodes must always have a common ancestor")
    }

    /// The key under which `node` hangs below its parent.
    pub fn key_of(&self, node: NodeId) -> Option<&M::Output> {
        let parent = self.try_parent(node)?;
        self.try_children(parent)?
            .iter()
            .find(|(_, child)| **child == node)
            .map(|(key, _)| key)
    }

    /// For two distinct leaves, returns the discriminator of their lowest common ancestor
    /// together with the keys of the branches that lead to `a` and to `b`.
    pub fn separation(
        &self,
        a: NodeId,
        b: NodeId,
    ) -> Option<(&[A::Symbol], &M::Output, &M::Output)> {
        let lca = self.lowest_common_ancestor(a, b);
        let towards = |node: NodeId| {
            std::iter::once(node)
                .chain(self.ancestors_vec(node))
                .find(|n| self.try_parent(*n) == Some(lca))
                .and_then(|n| self.key_of(n))
        };
        Some((self.try_discriminator(lca)?, towards(a)?, towards(b)?))
    }

    fn leaves_below(&self, node: NodeId) -> Vec<NodeId> {
        match node {
            Leaf(_) => vec![node],
            Inner(n) => self.inner[n]
                .children
                .values()
                .flat_map(|child| self.leaves_below(*child))
                .collect(),
        }
    }

    fn origins_below(&self, node: NodeId) -> Vec<Word<A>> {
        let mut out: Vec<_> = self.origins(node).iter().cloned().collect();
        if let Inner(n) = node {
            for child in self.inner[n].children.values() {
                out.extend(self.origins_below(*child));
            }
        }
        out
    }

    /// Sifts `word` from the root, asking the oracle for the answer on every discriminator
    /// along the way.
    pub fn sift<O>(
        &self,
        word: &[A::Symbol],
        oracle: &mut O,
    ) -> Result<Sifted<M::Output>, LearningError<A::Symbol>>
    where
        O: MembershipOracle<Alphabet = A, Semantics = M>,
    {
        self.sift_from(self.root, word, oracle)
    }

    /// Sifts `word` starting at `node` instead of the root.
    pub fn sift_from<O>(
        &self,
        node: NodeId,
        word: &[A::Symbol],
        oracle: &mut O,
    ) -> Result<Sifted<M::Output>, LearningError<A::Symbol>>
    where
        O: MembershipOracle<Alphabet = A, Semantics = M>,
    {
        let mut current = node;
        while let Inner(n) = current {
            let inner = &self.inner[n];
            let answer = oracle.answer_split(word, &inner.discriminator)?;
            let Some(key) = M::classify(&answer, inner.discriminator.len()) else {
                panic!(
                    "answer {} for {} does not cover the discriminator",
                    answer.show(),
                    word.as_string()
                );
            };
            match inner.children.get(&key) {
                Some(child) => current = *child,
                None => return Ok(Sifted::Unknown { node: current, key }),
            }
        }
        Ok(Sifted::Leaf(current))
    }

    /// Adds a leaf below the inner node `parent` under a key that is not present yet.
    pub fn add_leaf(
        &mut self,
        parent: NodeId,
        key: M::Output,
        access: Word<A>,
        observation: M::Observation,
    ) -> NodeId {
        let n = parent.try_inner().expect("leaves can only be added below inner nodes");
        assert!(
            !self.inner[n].children.contains_key(&key),
            "child for key {} exists already",
            key.show()
        );
        let leaf = self.push_leaf(access, observation, math::OrderedSet::new());
        self.set_parent(leaf, Some(n));
        self.inner[n].children.insert(key, leaf);
        leaf
    }

    /// Turns `leaf` into an inner node with the given discriminator. The old leaf keeps its
    /// access sequence and observation and is filed under `old_key`, a new leaf with access
    /// sequence `new_access` is filed under `new_key`. The origins of the old leaf are
    /// moved to the new inner node since their classification is not known yet. Returns the
    /// new leaf.
    pub fn split_leaf(
        &mut self,
        leaf: NodeId,
        discriminator: Word<A>,
        old_key: M::Output,
        new_key: M::Output,
        new_access: Word<A>,
    ) -> NodeId {
        let l = leaf.try_leaf().expect("only leaves can be split");
        assert!(old_key != new_key, "split needs two different keys");
        debug!(
            "splitting {} by {} into {} -> {} and {} -> {}",
            self.leaves[l].access.as_string(),
            discriminator.as_string(),
            old_key.show(),
            self.leaves[l].access.as_string(),
            new_key.show(),
            new_access.as_string()
        );

        let parent = self.leaves[l].parent;
        let origins = std::mem::take(&mut self.leaves[l].origins);
        let new_leaf = self.push_leaf(new_access, M::Observation::default(), math::OrderedSet::new());
        let node = self.push_inner(
            discriminator,
            math::OrderedMap::from_iter([(old_key, leaf), (new_key, new_leaf)]),
            origins,
        );
        self.set_parent(node, parent);
        match parent {
            Some(p) => {
                for child in self.inner[p].children.values_mut() {
                    if *child == leaf {
                        *child = node;
                    }
                }
            }
            None => self.root = node,
        }
        new_leaf
    }

    /// Returns a query that is needed to complete the hypothesis: either an origin that
    /// still has to be classified at an inner node, extended by the discriminator of that
    /// node, or a query for an observation that is missing at a leaf.
    pub fn pending_query(&self) -> Option<Word<A>> {
        self.pending_below(self.root)
    }

    fn pending_below(&self, node: NodeId) -> Option<Word<A>> {
        match node {
            Leaf(n) => {
                let leaf = &self.leaves[n];
                M::missing(&leaf.observation, &leaf.access, self.alphabet.universe())
            }
            Inner(n) => {
                let inner = &self.inner[n];
                inner
                    .origins
                    .first()
                    .map(|origin| origin.followed_by(&inner.discriminator))
                    .or_else(|| {
                        inner
                            .children
                            .values()
                            .find_map(|child| self.pending_below(*child))
                    })
            }
        }
    }

    /// Extracts the hypothesis that the tree currently represents. Origins that are stuck at
    /// an inner node are passed on to the child with the smallest key, unknown observations
    /// are replaced by `filler`. The traversal order is fixed, so extracting twice from the
    /// same tree gives equal hypotheses.
    pub fn extract(&self, filler: M::Filler) -> Hypothesis<A, M> {
        let mut states = math::OrderedMap::new();
        let mut initial = None;
        let mut transitions = vec![];
        self.extract_below(
            self.root,
            math::OrderedSet::new(),
            &mut states,
            &mut initial,
            &mut transitions,
        );
        Hypothesis::from_parts(self.alphabet.clone(), filler, initial, states, transitions)
    }

    #[allow(clippy::type_complexity)]
    fn extract_below(
        &self,
        node: NodeId,
        extra: math::OrderedSet<Word<A>>,
        states: &mut math::OrderedMap<Word<A>, M::Observation>,
        initial: &mut Option<Word<A>>,
        transitions: &mut Vec<(Word<A>, A::Symbol, Word<A>)>,
    ) {
        match node {
            Leaf(n) => {
                let leaf = &self.leaves[n];
                for origin in leaf.origins.iter().chain(extra.iter()) {
                    match origin.split_last() {
                        Some((sym, prefix)) => {
                            transitions.push((prefix.to_vec(), *sym, leaf.access.clone()))
                        }
                        None => {
                            initial.get_or_insert_with(|| leaf.access.clone());
                        }
                    }
                }
                states.insert(leaf.access.clone(), leaf.observation.clone());
            }
            Inner(n) => {
                let inner = &self.inner[n];
                let mut passed: Option<math::OrderedSet<_>> =
                    Some(inner.origins.union(&extra).cloned().collect());
                for child in inner.children.values() {
                    let extra = passed.take().unwrap_or_default();
                    self.extract_below(*child, extra, states, initial, transitions);
                }
            }
        }
    }

    /// Collects the facts that the tree implies about the leaf with the given access
    /// sequence: for every ancestor, the leaf's access sequence extended by the discriminator
    /// produces the key of the branch that leads to the leaf.
    pub fn implications(&self, access: &[A::Symbol]) -> Vec<Fact<A::Symbol, M::Output>> {
        let Some(leaf) = self.find_leaf(access) else {
            return vec![];
        };
        let mut facts = vec![];
        let mut current = leaf;
        while let Some(parent) = self.try_parent(current) {
            if let (Some(discriminator), Some(key)) =
                (self.try_discriminator(parent), self.key_of(current))
            {
                facts.push((access.followed_by(discriminator), key.clone()));
            }
            current = parent;
        }
        facts
    }

    /// Produces a new tree that incorporates the answer to `query`. Every origin `t` at an
    /// inner node with discriminator `d` and `t·d = query` is moved to the child that matches
    /// the answer, if no such child exists, a new leaf with access sequence `t` is created and
    /// its outgoing transitions are added as origins at the root. Leaves record what the
    /// answer reveals about them.
    pub fn advance(&self, query: &[A::Symbol], answer: &M::Output) -> Self {
        let mut out = Self::empty(self.alphabet.clone());
        let mut fresh = math::OrderedSet::new();
        let root = self.advance_node(
            self.root,
            query,
            answer,
            math::OrderedSet::new(),
            &mut out,
            &mut fresh,
        );
        out.root = root;
        out.add_root_origins(fresh);
        out
    }

    fn advance_node(
        &self,
        node: NodeId,
        query: &[A::Symbol],
        answer: &M::Output,
        extra: math::OrderedSet<Word<A>>,
        out: &mut Self,
        fresh: &mut math::OrderedSet<Word<A>>,
    ) -> NodeId {
        match node {
            Leaf(n) => {
                let leaf = &self.leaves[n];
                let mut observation = leaf.observation.clone();
                M::record(&mut observation, &leaf.access, query, answer);
                let origins = leaf.origins.union(&extra).cloned().collect();
                out.push_leaf(leaf.access.clone(), observation, origins)
            }
            Inner(n) => {
                let inner = &self.inner[n];
                let (moved, mut remaining): (math::OrderedSet<_>, math::OrderedSet<_>) = inner
                    .origins
                    .union(&extra)
                    .cloned()
                    .partition(|origin| origin.followed_by(&inner.discriminator) == query);
                let key = if moved.is_empty() {
                    None
                } else {
                    M::classify(answer, inner.discriminator.len())
                };

                let mut moved = Some(moved);
                let mut children = math::OrderedMap::new();
                for (k, child) in &inner.children {
                    let extra = if key.as_ref() == Some(k) {
                        trace!("moving origin towards {}", k.show());
                        moved.take().unwrap_or_default()
                    } else {
                        math::OrderedSet::new()
                    };
                    let advanced = self.advance_node(*child, query, answer, extra, out, fresh);
                    children.insert(k.clone(), advanced);
                }

                if let Some(moved) = moved.filter(|m| !m.is_empty()) {
                    match key {
                        Some(key) => {
                            for origin in moved {
                                if self.find_leaf(&origin).is_some() {
                                    warn!(
                                        "origin {} reached an unknown branch but is a state already",
                                        origin.as_string()
                                    );
                                    remaining.insert(origin);
                                    continue;
                                }
                                debug!(
                                    "new state {} for unseen answer {}",
                                    origin.as_string(),
                                    key.show()
                                );
                                let mut observation = M::Observation::default();
                                M::record(&mut observation, &origin, query, answer);
                                fresh.extend(
                                    self.alphabet.universe().map(|sym| origin.with_symbol(sym)),
                                );
                                let leaf = out.push_leaf(
                                    origin.clone(),
                                    observation,
                                    math::OrderedSet::from_iter([origin]),
                                );
                                children.insert(key.clone(), leaf);
                            }
                        }
                        None => remaining.extend(moved),
                    }
                }

                out.push_inner(inner.discriminator.clone(), children, remaining)
            }
        }
    }

    /// Makes the tree consistent with the given facts, which must hold from now on.
    ///
    /// First, every leaf whose access sequence is classified differently by a fact than by
    /// its position in the tree is removed. The origins of removed leaves become homeless and
    /// are stored at the nearest surviving ancestor, an inner node that is left with a single
    /// child is replaced by that child. If no leaf survives, the tree is reset. Second, origins
    /// are restricted to the empty word and the one-letter extensions of the remaining access
    /// sequences. Finally, origins that a fact classifies differently are moved to the branch
    /// the fact points to and leaves record what the facts reveal about them.
    ///
    /// Returns true if a leaf was removed.
    pub fn apply(&mut self, facts: &[Fact<A::Symbol, M::Output>]) -> bool {
        let mut out = Self::empty(self.alphabet.clone());
        let mut removed_any = false;
        match self.adjust_states(
            self.root,
            facts,
            &math::OrderedSet::new(),
            &mut out,
            &mut removed_any,
        ) {
            Adjusted::Kept(root) => out.root = root,
            Adjusted::Removed(_) => {
                debug!("no state survived, resetting the tree");
                out = Self::new(self.alphabet.clone());
            }
        }
        out.restrict_origins();
        let root = out.root;
        out.adjust_structure(root, facts, &math::OrderedSet::new());
        *self = out;
        removed_any
    }

    /// Removes the leaves with the given access sequences, collapsing inner nodes that are
    /// left with a single child. Returns false and leaves the tree untouched if this would
    /// remove every leaf.
    pub fn remove_leaves(&mut self, accesses: &math::OrderedSet<Word<A>>) -> bool {
        let mut out = Self::empty(self.alphabet.clone());
        let mut removed_any = false;
        match self.adjust_states(self.root, &[], accesses, &mut out, &mut removed_any) {
            Adjusted::Kept(root) => {
                out.root = root;
                *self = out;
                true
            }
            Adjusted::Removed(_) => false,
        }
    }

    fn adjust_states(
        &self,
        node: NodeId,
        facts: &[Fact<A::Symbol, M::Output>],
        removed: &math::OrderedSet<Word<A>>,
        out: &mut Self,
        removed_any: &mut bool,
    ) -> Adjusted<A::Symbol> {
        match node {
            Leaf(n) => {
                let leaf = &self.leaves[n];
                if removed.contains(&leaf.access) {
                    debug!("removing state {}", leaf.access.as_string());
                    *removed_any = true;
                    return Adjusted::Removed(leaf.origins.clone());
                }
                Adjusted::Kept(out.push_leaf(
                    leaf.access.clone(),
                    leaf.observation.clone(),
                    leaf.origins.clone(),
                ))
            }
            Inner(n) => {
                let inner = &self.inner[n];
                let len = inner.discriminator.len();
                let mut homeless = math::OrderedSet::new();
                let mut survivors = math::OrderedMap::new();

                for (key, child) in &inner.children {
                    let mut remove = removed.clone();
                    for leaf in self.leaves_below(*child) {
                        let access = &self.leaves[leaf.index()].access;
                        let contradicted = fact_for(facts, &access.followed_by(&inner.discriminator))
                            .and_then(|answer| M::classify(answer, len))
                            .is_some_and(|actual| &actual != key);
                        if contradicted {
                            remove.insert(access.clone());
                        }
                    }
                    match self.adjust_states(*child, facts, &remove, out, removed_any) {
                        Adjusted::Kept(id) => {
                            survivors.insert(key.clone(), id);
                        }
                        Adjusted::Removed(origins) => homeless.extend(origins),
                    }
                }
                homeless.extend(inner.origins.iter().cloned());

                if survivors.len() == 1 {
                    if let Some((_, only)) = survivors.pop_first() {
                        debug!(
                            "collapsing node with discriminator {}",
                            inner.discriminator.as_string()
                        );
                        out.origins_mut(only).extend(homeless);
                        return Adjusted::Kept(only);
                    }
                }
                if survivors.is_empty() {
                    return Adjusted::Removed(homeless);
                }
                Adjusted::Kept(out.push_inner(inner.discriminator.clone(), survivors, homeless))
            }
        }
    }

    fn restrict_origins(&mut self) {
        let mut allowed = math::OrderedSet::from_iter([vec![]]);
        for leaf in &self.leaves {
            allowed.extend(
                self.alphabet
                    .universe()
                    .map(|sym| leaf.access.with_symbol(sym)),
            );
        }
        for inner in &mut self.inner {
            inner.origins.retain(|origin| allowed.contains(origin));
        }
        for leaf in &mut self.leaves {
            leaf.origins.retain(|origin| allowed.contains(origin));
        }
    }

    fn adjust_structure(
        &mut self,
        node: NodeId,
        facts: &[Fact<A::Symbol, M::Output>],
        removed: &math::OrderedSet<Word<A>>,
    ) {
        match node {
            Leaf(n) => {
                let leaf = &mut self.leaves[n];
                leaf.origins.retain(|origin| !removed.contains(origin));
                for (input, answer) in facts {
                    M::record(&mut leaf.observation, &leaf.access, input, answer);
                }
            }
            Inner(n) => {
                let discriminator = self.inner[n].discriminator.clone();
                let children: Vec<_> = self.inner[n]
                    .children
                    .iter()
                    .map(|(key, child)| (key.clone(), *child))
                    .collect();

                let mut moves = vec![];
                for (key, child) in children {
                    let mut remove = removed.clone();
                    for origin in self.origins_below(child) {
                        if removed.contains(&origin) {
                            continue;
                        }
                        let target = fact_for(facts, &origin.followed_by(&discriminator))
                            .and_then(|answer| M::classify(answer, discriminator.len()));
                        if let Some(target) = target.filter(|target| target != &key) {
                            remove.insert(origin.clone());
                            moves.push((origin, target));
                        }
                    }
                    self.adjust_structure(child, facts, &remove);
                }

                self.inner[n]
                    .origins
                    .retain(|origin| !removed.contains(origin));
                for (origin, target) in moves {
                    trace!(
                        "fact moves origin {} to branch {}",
                        origin.as_string(),
                        target.show()
                    );
                    match self.inner[n].children.get(&target).copied() {
                        Some(child) => {
                            self.origins_mut(child).insert(origin);
                        }
                        None => {
                            self.inner[n].origins.insert(origin);
                        }
                    }
                }
            }
        }
    }

    /// Renders the nodes of the tree as a table.
    pub fn table(&self) -> String {
        let mut builder = tabled::builder::Builder::default();
        builder.push_record(["Node", "Parent", "Label", "Origins", "Children"]);
        let show_origins =
            |origins: &math::OrderedSet<Word<A>>| origins.iter().map(|o| o.as_string()).join(", ");
        for (n, inner) in self.inner.iter().enumerate() {
            builder.push_record([
                format!("{:?}", Inner(n)),
                format!("{:?}", inner.parent.map(Inner)),
                inner.discriminator.as_string(),
                show_origins(&inner.origins),
                inner
                    .children
                    .iter()
                    .map(|(key, child)| format!("{} -> {child:?}", key.show()))
                    .join(", "),
            ]);
        }
        for (n, leaf) in self.leaves.iter().enumerate() {
            builder.push_record([
                format!("{:?}", Leaf(n)),
                format!("{:?}", leaf.parent.map(Inner)),
                format!("{} {:?}", leaf.access.as_string(), leaf.observation),
                show_origins(&leaf.origins),
                String::new(),
            ]);
        }
        builder
            .build()
            .with(tabled::settings::Style::rounded())
            .to_string()
    }
}

impl<A: Alphabet, M: Semantics<A::Symbol>> Debug for DiscriminationTree<A, M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "root {:?}", self.root)?;
        write!(f, "{}", self.table())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        active::SimulatorOracle,
        semantics::{Acceptor, Transducer},
    };

    fn word(w: &str) -> Vec<char> {
        w.chars().collect()
    }

    /// Accepts words with an even number of a's.
    fn parity() -> Dfa {
        Dfa::builder()
            .with_state_colors([true, false])
            .with_transitions([(0, 'a', 1), (0, 'b', 0), (1, 'a', 0), (1, 'b', 1)])
            .into_dfa_with_initial(0)
    }

    /// Tree with a single split of ε and a by the empty discriminator.
    fn split_tree() -> DiscriminationTree<CharAlphabet, Acceptor> {
        let mut tree = DiscriminationTree::new(alphabet!('a', 'b'));
        let root = tree.root();
        let new = tree.split_leaf(root, vec![], true, false, word("a"));
        tree.add_root_origins([word("aa"), word("ab")]);
        assert_eq!(new, Leaf(1));
        tree
    }

    #[test_log::test]
    fn new_tree_has_all_initial_origins() {
        let tree: DiscriminationTree<_, Acceptor> = DiscriminationTree::new(alphabet!('a', 'b'));
        assert_eq!(tree.leaf_count(), 1);
        assert_eq!(tree.origin_count(), 3);
        assert_eq!(tree.pending_query(), Some(vec![]));
        let hyp = tree.extract(false);
        assert_eq!(hyp.size(), 1);
        assert!(hyp.is_complete());
    }

    #[test_log::test]
    fn split_moves_origins_to_the_new_node() {
        let tree = split_tree();
        let root = tree.root();
        assert!(matches!(root, Inner(0)));
        assert_eq!(tree.origins(root).len(), 5);
        assert_eq!(tree.try_parent(Leaf(0)), Some(root));
        assert_eq!(tree.key_of(Leaf(1)), Some(&false));
        assert_eq!(tree.lowest_common_ancestor(Leaf(0), Leaf(1)), root);
        assert_eq!(
            tree.separation(Leaf(0), Leaf(1)),
            Some((&[][..], &true, &false))
        );
        // the smallest origin is the empty word, its query is the empty word itself
        assert_eq!(tree.pending_query(), Some(vec![]));
        assert_eq!(tree.implications(&word("a")), vec![(word("a"), false)]);
    }

    #[test_log::test]
    fn advancing_classifies_origins() {
        let mut tree = split_tree();
        let target = parity();
        while let Some(query) = tree.pending_query() {
            let answer = target.accepts(&query);
            tree = tree.advance(&query, &answer);
        }
        assert_eq!(tree.origin_count(), 5);
        assert_eq!(tree.origins(tree.root()).len(), 0);

        let hyp = tree.extract(false);
        assert!(hyp.is_complete());
        let (dfa, _) = hyp.to_dfa();
        assert!(dfa.equivalent(&parity()));
        assert_eq!(hyp, tree.extract(false));
    }

    #[test_log::test]
    fn facts_remove_contradicted_states() {
        let mut tree = split_tree();
        let target = parity();
        while let Some(query) = tree.pending_query() {
            tree = tree.advance(&query, &target.accepts(&query));
        }
        // a is now claimed to be accepting, so it cannot be separated from ε anymore
        let removed = tree.apply(&[(word("a"), true)]);
        assert!(removed);
        assert_eq!(tree.leaf_count(), 1);
        assert_eq!(tree.try_access(tree.root()), Some(&[][..]));
        // ε, a and b remain, the extensions of a are gone
        assert_eq!(tree.origin_count(), 3);

        let unchanged = tree.apply(&[(word(""), true)]);
        assert!(!unchanged);
        assert_eq!(tree.try_observation(tree.root()), Some(&Some(true)));
    }

    #[test_log::test]
    fn facts_move_origins() {
        let mut tree = split_tree();
        let target = parity();
        while let Some(query) = tree.pending_query() {
            tree = tree.advance(&query, &target.accepts(&query));
        }
        // b currently leads to ε, the fact claims b is rejecting
        let initial = tree.find_leaf(&word("")).expect("state ε exists");
        assert!(tree.origins(initial).contains(&word("b")));
        let removed = tree.apply(&[(word("b"), false)]);
        assert!(!removed);
        let rejecting = tree.find_leaf(&word("a")).expect("state a survives");
        assert!(tree.origins(rejecting).contains(&word("b")));
    }

    #[test_log::test]
    fn unseen_answers_create_new_states() {
        type Mealy = Transducer<usize>;
        let mut tree: DiscriminationTree<CharAlphabet, Mealy> =
            DiscriminationTree::single_leaf(alphabet!('a'), math::OrderedMap::new());
        let root = tree.root();
        tree.split_leaf(root, word("a"), vec![0], vec![1], word("a"));
        tree.add_root_origins([word(""), word("a"), word("aa")]);

        // aa·a produces an output that has not been seen below the root
        let advanced = tree.advance(&word("aaa"), &vec![0, 0, 2]);
        assert_eq!(advanced.leaf_count(), 3);
        let new = advanced.find_leaf(&word("aa")).expect("new state");
        assert_eq!(advanced.key_of(new), Some(&vec![2]));
        assert!(advanced.origins(advanced.root()).contains(&word("aaa")));
        // the new state learned the output of its a-transition
        assert_eq!(
            advanced.try_observation(new).and_then(|o| o.get(&'a')),
            Some(&2)
        );
    }

    #[test_log::test]
    fn sifting_with_an_oracle() {
        let mut tree = split_tree();
        let mut oracle = SimulatorOracle::new(parity());
        assert_eq!(
            tree.sift(&word("ab"), &mut oracle),
            Ok(Sifted::Leaf(Leaf(1)))
        );
        assert_eq!(tree.sift(&word("bb"), &mut oracle), Ok(Sifted::Leaf(Leaf(0))));

        assert!(tree.remove_leaves(&math::OrderedSet::from_iter([word("a")])));
        assert_eq!(tree.leaf_count(), 1);
        assert!(!tree.remove_leaves(&math::OrderedSet::from_iter([word("")])));
        assert_eq!(tree.leaf_count(), 1);
    }
}
