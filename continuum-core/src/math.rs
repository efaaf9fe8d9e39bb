use std::collections::{BTreeMap, BTreeSet};

/// Type alias for sets whose iteration order matters, we use this whenever the order in which
/// elements are visited can influence the observable behaviour of an algorithm.
pub type OrderedSet<S> = BTreeSet<S>;
/// Type alias for sets that are unordered.
pub type Set<S> = indexmap::IndexSet<S>;

/// Type alias for maps whose iteration order matters.
pub type OrderedMap<K, V> = BTreeMap<K, V>;
/// Type alias for maps that are unordered.
pub type Map<K, V> = indexmap::IndexMap<K, V>;

/// Represents a bijective mapping between `L` and `R`, that is a mapping which associates
/// each `L` with precisely one `R` and vice versa.
pub type Bijection<L, R> = bimap::BiBTreeMap<L, R>;
