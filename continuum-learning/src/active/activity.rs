use continuum_core::prelude::*;

/// Binary search for the breakpoint of a counterexample in the style of Rivest and Schapire.
///
/// The word is split into `pre·middle·post`. Write `α(i)` for the answer to the query that
/// replaces the first `i` symbols of the word by the access sequence of the state they lead to.
/// The search maintains that `α(|pre|)` disagrees with the hypothesis and that
/// `α(|pre| + |middle|)` agrees with it. Probing the index after the first half `u` of the
/// middle narrows the search to one of the two halves, until the middle consists of a single
/// symbol. The breakpoint is then between `pre` and `pre·u`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bisection<S> {
    pre: Vec<S>,
    middle: Vec<S>,
    post: Vec<S>,
}

impl<S: Symbol> Bisection<S> {
    /// Starts a search over the whole word.
    pub fn new(word: Vec<S>) -> Self {
        Self {
            pre: vec![],
            middle: word,
            post: vec![],
        }
    }

    /// Symbols before the search interval.
    pub fn pre(&self) -> &[S] {
        &self.pre
    }

    /// Symbols after the search interval.
    pub fn post(&self) -> &[S] {
        &self.post
    }

    /// The search interval.
    pub fn middle(&self) -> &[S] {
        &self.middle
    }

    /// Splits the middle into its first half `u`, which is the longer one if the length is
    /// odd, and the remaining symbols `v`.
    pub fn halves(&self) -> (&[S], &[S]) {
        self.middle.split_at(self.middle.len().div_ceil(2))
    }

    /// The index that is probed next, namely `|pre·u|`.
    pub fn probe(&self) -> usize {
        self.pre.len() + self.halves().0.len()
    }

    /// Returns true once the middle consists of a single symbol.
    pub fn is_final(&self) -> bool {
        self.middle.len() == 1
    }

    /// Narrows the search with the outcome of the probe. If the answer at the probed index
    /// agrees with the hypothesis, the breakpoint lies in `u`, otherwise in `v`.
    pub fn narrow(self, agrees: bool) -> Self {
        let split = self.middle.len().div_ceil(2);
        let (u, v) = self.middle.split_at(split);
        if agrees {
            Self {
                post: v.followed_by(&self.post),
                middle: u.to_vec(),
                pre: self.pre,
            }
        } else {
            Self {
                pre: self.pre.followed_by(u),
                middle: v.to_vec(),
                post: self.post,
            }
        }
    }
}

/// What the continuous learner is currently doing. Every activity determines the query that is
/// in flight, the answer to that query decides which activity follows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Activity<S, O> {
    /// Completing the hypothesis by classifying origins and filling in observations.
    Hyp,
    /// Checking the hypothesis on a sampled word.
    Test {
        /// The sampled word.
        word: Vec<S>,
    },
    /// The sampled word is answered differently by the hypothesis. The query that is in flight
    /// is the word prefixed by the access sequence of the initial state.
    Init {
        /// Access sequence of the initial state.
        access: Vec<S>,
        /// The counterexample candidate.
        word: Vec<S>,
        /// The answer to the candidate itself.
        answer: O,
    },
    /// Searching for the breakpoint of a counterexample.
    Cex {
        /// Current state of the search.
        bisection: Bisection<S>,
        /// Access sequence of the state reached by `pre·u`, which prefixes the query in flight.
        access: Vec<S>,
        /// Access sequence that prefixed the last query that disagreed with the hypothesis.
        lower_access: Vec<S>,
        /// Answer to that query.
        lower: O,
    },
}

impl<S, O> Activity<S, O> {
    /// A short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Activity::Hyp => "hyp",
            Activity::Test { .. } => "test",
            Activity::Init { .. } => "init",
            Activity::Cex { .. } => "cex",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_log::test]
    fn bisection_narrows_towards_the_breakpoint() {
        let search = Bisection::new("abcde".chars().collect());
        assert_eq!(search.halves(), (&['a', 'b', 'c'][..], &['d', 'e'][..]));
        assert_eq!(search.probe(), 3);

        let search = search.narrow(false);
        assert_eq!(search.pre(), &['a', 'b', 'c']);
        assert_eq!(search.middle(), &['d', 'e']);
        assert_eq!(search.probe(), 4);

        let search = search.narrow(true);
        assert!(search.is_final());
        assert_eq!(search.pre(), &['a', 'b', 'c']);
        assert_eq!(search.middle(), &['d']);
        assert_eq!(search.post(), &['e']);
    }

    #[test_log::test]
    fn activity_names() {
        let activity: Activity<char, bool> = Activity::Test { word: vec!['a'] };
        assert_eq!(activity.name(), "test");
        assert_eq!(Activity::<char, bool>::Hyp.name(), "hyp");
    }
}
