use crate::alphabet::Symbol;

/// A finite word is a finite sequence of symbols. Owned words are simply `Vec<S>`, this trait
/// provides the operations that the learning algorithms need on top of slices, vectors and
/// strings. All operations that produce a word return a fresh `Vec<S>`.
///
/// Method names are chosen such that they do not collide with the inherent methods of
/// slices and vectors.
pub trait FiniteWord<S: Symbol> {
    /// Returns an iterator over the symbols of the word.
    fn symbols(&self) -> impl Iterator<Item = S> + '_;

    /// Collects the symbols into an owned word.
    fn to_word(&self) -> Vec<S> {
        self.symbols().collect()
    }

    /// Returns the number of symbols in the word.
    fn word_len(&self) -> usize {
        self.symbols().count()
    }

    /// Returns the concatenation of `self` and `other`.
    fn followed_by<W: FiniteWord<S> + ?Sized>(&self, other: &W) -> Vec<S> {
        self.symbols().chain(other.symbols()).collect()
    }

    /// Returns the word that is obtained by appending `symbol` to `self`.
    fn with_symbol(&self, symbol: S) -> Vec<S> {
        self.symbols().chain(std::iter::once(symbol)).collect()
    }

    /// Returns the prefix of length `len`, or the whole word if it is shorter.
    fn prefix(&self, len: usize) -> Vec<S> {
        self.symbols().take(len).collect()
    }

    /// Returns the suffix of length `len`, or the whole word if it is shorter.
    fn suffix(&self, len: usize) -> Vec<S> {
        let skip = self.word_len().saturating_sub(len);
        self.symbols().skip(skip).collect()
    }

    /// Returns the last symbol, if the word is not empty.
    fn last_symbol(&self) -> Option<S> {
        self.symbols().last()
    }

    /// Splits off the last symbol, returning the remaining prefix together with the symbol.
    /// Gives `None` on the empty word.
    fn split_last_symbol(&self) -> Option<(Vec<S>, S)> {
        let mut word = self.to_word();
        let last = word.pop()?;
        Some((word, last))
    }

    /// Renders the word using [`Show`](crate::Show).
    fn as_string(&self) -> String {
        S::show_collection(self.to_word().iter())
    }
}

impl<S: Symbol> FiniteWord<S> for [S] {
    fn symbols(&self) -> impl Iterator<Item = S> + '_ {
        self.iter().copied()
    }

    fn word_len(&self) -> usize {
        self.len()
    }
}

impl<S: Symbol> FiniteWord<S> for Vec<S> {
    fn symbols(&self) -> impl Iterator<Item = S> + '_ {
        self.iter().copied()
    }

    fn word_len(&self) -> usize {
        self.len()
    }
}

impl<S: Symbol, const N: usize> FiniteWord<S> for [S; N] {
    fn symbols(&self) -> impl Iterator<Item = S> + '_ {
        self.iter().copied()
    }

    fn word_len(&self) -> usize {
        N
    }
}

impl FiniteWord<char> for str {
    fn symbols(&self) -> impl Iterator<Item = char> + '_ {
        self.chars()
    }
}

impl FiniteWord<char> for String {
    fn symbols(&self) -> impl Iterator<Item = char> + '_ {
        self.chars()
    }
}

impl<S: Symbol, W: FiniteWord<S> + ?Sized> FiniteWord<S> for &W {
    fn symbols(&self) -> impl Iterator<Item = S> + '_ {
        W::symbols(*self)
    }
}

#[cfg(test)]
mod tests {
    use super::FiniteWord;

    #[test_log::test]
    fn word_operations() {
        let word = "abcab".to_word();
        assert_eq!(word.word_len(), 5);
        assert_eq!(word.prefix(2), vec!['a', 'b']);
        assert_eq!(word.suffix(2), vec!['a', 'b']);
        assert_eq!(word.suffix(9), word);
        assert_eq!("ab".followed_by("ba"), "abba".to_word());
        assert_eq!("ab".with_symbol('c'), "abc".to_word());
        assert_eq!(word.last_symbol(), Some('b'));
        assert_eq!(word.split_last_symbol(), Some(("abca".to_word(), 'b')));
        assert_eq!(Vec::<char>::new().split_last_symbol(), None);
        assert_eq!(word.as_string(), "abcab");
        assert_eq!("".to_word().as_string(), "ε");
    }
}
