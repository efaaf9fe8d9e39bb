use std::{fmt::Debug, hash::Hash};

use itertools::Itertools;

use crate::Show;

/// A symbol of an alphabet, which is also the type of the symbols in a word. Symbols are
/// small values that are cheap to copy, they are ordered so that the algorithms which are
/// built on top of them can iterate in a deterministic fashion.
pub trait Symbol: PartialEq + Eq + Debug + Copy + Ord + PartialOrd + Hash + Show {}
impl<S: PartialEq + Eq + Debug + Copy + Ord + PartialOrd + Hash + Show> Symbol for S {}

/// The symbol type of an [`Alphabet`].
pub type SymbolOf<A> = <A as Alphabet>::Symbol;

/// An alphabet is a finite, non-empty collection of [`Symbol`]s.
pub trait Alphabet: Clone + Debug {
    /// The type of symbols in this alphabet.
    type Symbol: Symbol;

    /// Type for an iterator over all symbols in the alphabet.
    type Universe<'this>: Iterator<Item = Self::Symbol>
    where
        Self: 'this;

    /// Returns an iterator over all symbols in the alphabet, always in the same order.
    fn universe(&self) -> Self::Universe<'_>;

    /// Returns true if the given symbol is present in the alphabet.
    fn contains(&self, symbol: Self::Symbol) -> bool;

    /// Returns the number of symbols in the alphabet.
    fn size(&self) -> usize;

    /// Returns true if the alphabet has no symbols.
    fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Returns the symbol at the given position of [`Self::universe`].
    fn nth(&self, position: usize) -> Option<Self::Symbol> {
        self.universe().nth(position)
    }

    /// Returns the position of `symbol` in [`Self::universe`].
    fn position(&self, symbol: Self::Symbol) -> Option<usize> {
        self.universe().position(|sym| sym == symbol)
    }
}

impl<A: Alphabet> Alphabet for &A {
    type Symbol = A::Symbol;
    type Universe<'this> = A::Universe<'this> where Self: 'this;

    fn universe(&self) -> Self::Universe<'_> {
        A::universe(self)
    }

    fn contains(&self, symbol: Self::Symbol) -> bool {
        A::contains(self, symbol)
    }

    fn size(&self) -> usize {
        A::size(self)
    }
}

/// The simplest alphabet, a list of distinct characters.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct CharAlphabet(Vec<char>);

impl CharAlphabet {
    /// Creates an alphabet from the given characters. Duplicates are removed, the first
    /// occurrence of a character determines its position.
    pub fn new<I: IntoIterator<Item = char>>(symbols: I) -> Self {
        Self(symbols.into_iter().unique().collect())
    }

    /// Creates an alphabet of the given size, consisting of the first `size` lowercase
    /// latin characters.
    ///
    /// # Panics
    /// If `size` exceeds 26.
    pub fn of_size(size: usize) -> Self {
        assert!(size <= 26, "an alphabet can have at most 26 letters");
        Self((0..size).map(|i| (b'a' + i as u8) as char).collect())
    }

    /// Creates an alphabet of the given size, consisting of the characters `'0'`, `'1'` and so on.
    ///
    /// # Panics
    /// If `size` exceeds 10.
    pub fn digits(size: usize) -> Self {
        assert!(size <= 10, "there are only 10 digits");
        Self((0..size).map(|i| (b'0' + i as u8) as char).collect())
    }

    /// Returns the symbols of the alphabet as a slice.
    pub fn symbols(&self) -> &[char] {
        &self.0
    }
}

impl Debug for CharAlphabet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{{}}}", self.0.iter().join(", "))
    }
}

impl std::ops::Index<usize> for CharAlphabet {
    type Output = char;
    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

impl FromIterator<char> for CharAlphabet {
    fn from_iter<T: IntoIterator<Item = char>>(iter: T) -> Self {
        Self::new(iter)
    }
}

impl Alphabet for CharAlphabet {
    type Symbol = char;
    type Universe<'this> = std::iter::Copied<std::slice::Iter<'this, char>>;

    fn universe(&self) -> Self::Universe<'_> {
        self.0.iter().copied()
    }

    fn contains(&self, symbol: char) -> bool {
        self.0.contains(&symbol)
    }

    fn size(&self) -> usize {
        self.0.len()
    }
}

/// Creates a [`CharAlphabet`] from the given characters.
///
/// ```
/// use continuum_core::prelude::*;
/// let alphabet = alphabet!('a', 'b', 'c');
/// assert_eq!(alphabet.size(), 3);
/// ```
#[macro_export]
macro_rules! alphabet {
    ($($c:literal),* $(,)?) => {
        $crate::alphabet::CharAlphabet::new([$($c),*])
    };
}
